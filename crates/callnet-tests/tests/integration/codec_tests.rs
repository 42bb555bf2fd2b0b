use std::sync::Arc;

use callnet_core::engine::errors::CallNetError;
use callnet_core::storage::jbif::{decode, encode, encoded_size_upper_bound, MAGIC};
use callnet_core::storage::{load_network, read_network, save_network, write_network};
use callnet_core::{build_network, CallModel};
use crate::fixtures::{m, receiver, three_groups};

#[test]
fn built_network_survives_roundtrip_bit_for_bit() {
    let net = build_network(&receiver(), three_groups()).unwrap();
    let bytes = encode(&net).unwrap();
    assert!(bytes.len() <= encoded_size_upper_bound(&net));
    assert_eq!(&bytes[..4], &MAGIC.to_be_bytes());

    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.name(), net.name());
    for (a, b) in net.nodes().iter().zip(decoded.nodes()) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.outcomes(), b.outcomes());
        assert_eq!(a.parents(), b.parents());
        let bits_a: Vec<u64> = a.probabilities().iter().map(|p| p.to_bits()).collect();
        let bits_b: Vec<u64> = b.probabilities().iter().map(|p| p.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }
}

#[test]
fn every_truncation_is_rejected() {
    let net = build_network(&receiver(), three_groups()).unwrap();
    let bytes = encode(&net).unwrap();
    for len in 0..bytes.len() {
        match decode(&bytes[..len]) {
            Err(CallNetError::Decode(_)) => {}
            other => panic!("prefix of {} bytes decoded to {:?}", len, other.map(|n| n.len())),
        }
    }
}

#[test]
fn wrong_version_is_rejected() {
    let net = build_network(&receiver(), three_groups()).unwrap();
    let mut bytes = encode(&net).unwrap();
    bytes[7] = bytes[7].wrapping_add(1);
    assert!(matches!(decode(&bytes), Err(CallNetError::Decode(_))));
}

#[test]
fn file_roundtrip_feeds_a_call_model() {
    let net = build_network(&receiver(), three_groups()).unwrap();
    let path = std::env::temp_dir().join(format!("callnet-codec-{}.jbif", std::process::id()));
    save_network(&path, &net).unwrap();
    let loaded = load_network(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded, net);

    let mut model = CallModel::new(receiver(), Arc::new(loaded)).unwrap();
    model.set_method_context(Some(&m("LApp.ctx1()V"))).unwrap();
    assert!(model.recommend_call(&m("Ljava/io/File.delete()Z")).unwrap() > 0.99);
}

#[test]
fn model_loads_from_a_stream() {
    let net = build_network(&receiver(), three_groups()).unwrap();
    let mut buf = Vec::new();
    write_network(&mut buf, &net).unwrap();

    let reread = read_network(buf.as_slice()).unwrap();
    assert_eq!(reread, net);

    let model = CallModel::load(buf.as_slice(), receiver()).unwrap();
    assert_eq!(model.method_calls().len(), 5);
    assert_eq!(model.receiver_type(), &receiver());
}
