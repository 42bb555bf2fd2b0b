//! Integration tests for JSON snapshots of call networks.

#[cfg(feature = "serde")]
mod serde_tests {
    use callnet_core::engine::errors::CallNetError;
    use callnet_core::storage::{load_network_json, save_network_json};
    use callnet_core::{build_network, MethodName, ReceiverCallGroup, Recommendation};
    use crate::fixtures::{m, receiver, three_groups};

    #[test]
    fn test_network_json_roundtrip() {
        let net = build_network(&receiver(), three_groups()).unwrap();
        let json = save_network_json(&net).unwrap();
        assert!(json.contains("Ljava/io/File.exists()Z"));

        let loaded = load_network_json(&json).unwrap();
        assert_eq!(loaded, net);
        for node in net.nodes() {
            assert_eq!(loaded.node_id(node.name()), Some(node.id()));
        }
    }

    #[test]
    fn test_malformed_json_is_a_decode_error() {
        let err = load_network_json("{\"name\": 3}").unwrap_err();
        assert!(matches!(err, CallNetError::Decode(_)));
    }

    #[test]
    fn test_repeated_node_id_is_a_decode_error() {
        let net = build_network(&receiver(), three_groups()).unwrap();
        let mut value: serde_json::Value =
            serde_json::from_str(&save_network_json(&net).unwrap()).unwrap();
        value["nodes"][1]["id"] = serde_json::json!(0);

        let err = load_network_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, CallNetError::Decode(_)));
    }

    #[test]
    fn test_repeated_node_name_is_a_decode_error() {
        let net = build_network(&receiver(), three_groups()).unwrap();
        let mut value: serde_json::Value =
            serde_json::from_str(&save_network_json(&net).unwrap()).unwrap();
        let first = value["nodes"][2]["name"].clone();
        value["nodes"][3]["name"] = first;

        let err = load_network_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, CallNetError::Decode(_)));
    }

    #[test]
    fn test_cyclic_snapshot_is_a_decode_error() {
        let json = r#"{
            "name": "cycle",
            "nodes": [
                {"id": 0, "name": "a", "outcomes": ["x", "y"], "parents": [1],
                 "probabilities": [0.5, 0.5, 0.5, 0.5]},
                {"id": 1, "name": "b", "outcomes": ["x", "y"], "parents": [0],
                 "probabilities": [0.5, 0.5, 0.5, 0.5]}
            ]
        }"#;
        let err = load_network_json(json).unwrap_err();
        assert!(matches!(err, CallNetError::Decode(_)));
    }

    #[test]
    fn test_call_group_serde_roundtrip() {
        let groups = three_groups();
        let json = serde_json::to_string(&groups).unwrap();
        let back: Vec<ReceiverCallGroup> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, groups);
    }

    #[test]
    fn test_method_names_are_validated_on_deserialize() {
        let ok: MethodName = serde_json::from_str("\"LApp.ctx1()V\"").unwrap();
        assert_eq!(ok, m("LApp.ctx1()V"));
        assert!(serde_json::from_str::<MethodName>("\"no-signature\"").is_err());
    }

    #[test]
    fn test_recommendation_serializes_item_and_probability() {
        let rec = Recommendation::new(m("LApp.ctx1()V"), 0.25);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["item"], "LApp.ctx1()V");
        assert_eq!(json["probability"], 0.25);
    }
}
