use std::sync::Arc;

use callnet_core::engine::errors::CallNetError;
use callnet_core::model::builder::{
    build_network_with_config, NetworkBuilder, NODE_CALLING_CONTEXT, NODE_CALL_GROUPS,
    NODE_DEFINITION,
};
use callnet_core::model::names::{DUMMY_METHOD, STATE_DUMMY_DEFINITION};
use callnet_core::model::prob::{P_MAX, P_MIN};
use callnet_core::{
    build_network, build_networks, BuilderConfig, CallModel, ReceiverCallGroup, TypeName,
};
use crate::fixtures::{m, receiver, three_groups};

#[test]
fn calling_context_node_orders_dummy_then_contexts() {
    let mut builder = NetworkBuilder::new(&receiver(), three_groups()).unwrap();
    builder.build_calling_context_node().unwrap();
    let names: Vec<&str> = builder.contexts().iter().map(|c| c.as_str()).collect();
    assert_eq!(
        names,
        vec![
            DUMMY_METHOD,
            "LApp.ctx1()V",
            "LApp.ctx2()V",
            "LApp.ctx3()V",
            "LApp.ctx4()V"
        ]
    );

    let net = builder.finish().unwrap();
    let node = net.node_by_name(NODE_CALLING_CONTEXT).unwrap();
    let prior = node.probabilities();
    assert!((prior[0] - (1.0 - 4.0 * P_MIN)).abs() < 1e-12);
    for p in &prior[1..] {
        assert_eq!(*p, P_MIN);
    }
}

#[test]
fn full_network_layout() {
    let net = build_network(&receiver(), three_groups()).unwrap();
    assert_eq!(net.name(), "Ljava/io/File");

    let names: Vec<&str> = net.nodes().iter().map(|n| n.name()).collect();
    assert_eq!(
        names,
        vec![
            NODE_CALLING_CONTEXT,
            NODE_CALL_GROUPS,
            "Ljava/io/File.<init>(Ljava/lang/String;)V",
            "Ljava/io/File.delete()Z",
            "Ljava/io/File.exists()Z",
            "Ljava/io/File.getName()Ljava/lang/String;",
            "Ljava/io/File.listFiles()[Ljava/io/File;",
            NODE_DEFINITION,
        ]
    );

    // dummy group plus three real groups
    let groups = net.node_by_name(NODE_CALL_GROUPS).unwrap();
    assert_eq!(groups.outcome_count(), 4);
    assert_eq!(groups.probabilities().len(), 5 * 4);

    let definition = net.node_by_name(NODE_DEFINITION).unwrap();
    assert_eq!(definition.outcomes()[0], STATE_DUMMY_DEFINITION);
    assert_eq!(definition.outcome_count(), 5);
    assert_eq!(definition.parents(), &[groups.id()]);
}

#[test]
fn context_rows_split_by_usage() {
    let net = build_network(&receiver(), three_groups()).unwrap();
    let groups = net.node_by_name(NODE_CALL_GROUPS).unwrap();

    // ctx2 is seen twice in the cleanup group and twice in the browse group
    let row = groups.cpt_row(2).unwrap();
    assert!((row[1] - 0.5).abs() < 1e-4);
    assert!((row[2] - 0.5).abs() < 1e-4);
    assert_eq!(row[0], P_MIN);
    assert_eq!(row[3], P_MIN);

    // the dummy context belongs to the dummy group only
    let dummy_row = groups.cpt_row(0).unwrap();
    assert!(dummy_row[0] > 0.9999);
}

#[test]
fn every_entry_is_smoothed_and_rows_are_normalized() {
    let net = build_network(&receiver(), three_groups()).unwrap();
    net.validate_normalization(1e-6).unwrap();
    for node in net.nodes() {
        for p in node.probabilities() {
            assert!(
                (P_MIN..=P_MAX).contains(p),
                "node '{}' has unsmoothed entry {}",
                node.name(),
                p
            );
        }
    }
}

#[test]
fn group_without_definitions_defaults_to_dummy_definition() {
    let mut plain = ReceiverCallGroup::with_calls([m("Ljava/io/File.exists()Z")]);
    plain.observe_context(m("LApp.ctx1()V"), 2);
    let net = build_network(&receiver(), vec![plain]).unwrap();
    let definition = net.node_by_name(NODE_DEFINITION).unwrap();
    // dummy state plus the synthetic unknown state
    assert_eq!(definition.outcome_count(), 2);
    let row = definition.cpt_row(1).unwrap();
    assert!(row[0] > 0.9999);
}

#[test]
fn higher_precision_config_still_normalizes() {
    let config = BuilderConfig {
        rounding_precision: 8,
        ..BuilderConfig::default()
    };
    let net = build_network_with_config(&receiver(), three_groups(), config).unwrap();
    net.validate_normalization(1e-6).unwrap();
}

#[test]
fn builds_many_types_in_input_order() {
    let list = TypeName::new("Ljava/util/List").unwrap();
    let mut add = ReceiverCallGroup::with_calls([m("Ljava/util/List.add(Ljava/lang/Object;)Z")]);
    add.observe_context(m("LApp.fill()V"), 1);

    let nets = build_networks(vec![(receiver(), three_groups()), (list, vec![add])]).unwrap();
    let names: Vec<&str> = nets.iter().map(|n| n.name()).collect();
    assert_eq!(names, vec!["Ljava/io/File", "Ljava/util/List"]);
}

#[test]
fn one_failing_type_fails_the_batch() {
    let empty = TypeName::new("Ljava/lang/Empty").unwrap();
    let result = build_networks(vec![(receiver(), three_groups()), (empty, Vec::new())]);
    assert!(result.is_err());
}

#[test]
fn calls_on_another_type_are_rejected() {
    let mut groups = three_groups();
    groups[0].calls.insert(m("Ljava/lang/Object.hashCode()I"));
    let err = build_network(&receiver(), groups).unwrap_err();
    assert!(matches!(err, CallNetError::InvalidInput(_)));
}

#[test]
fn every_built_call_can_be_observed() {
    let net = build_network(&receiver(), three_groups()).unwrap();
    let model = CallModel::new(receiver(), Arc::new(net)).unwrap();
    for call in model.method_calls() {
        let mut session = model.fork();
        assert!(session.set_called(&call).unwrap(), "{} cannot be observed", call);
        assert!(session.recommend_calls().unwrap().iter().all(|r| r.item != call));
    }
}

#[test]
fn zero_count_context_is_not_an_outcome() {
    let mut group = ReceiverCallGroup::with_calls([m("Ljava/io/File.exists()Z")]);
    group
        .observe_context(m("LApp.a()V"), 2)
        .observe_context(m("LApp.b()V"), 0);
    let net = build_network(&receiver(), vec![group]).unwrap();
    let context = net.node_by_name(NODE_CALLING_CONTEXT).unwrap();
    assert_eq!(context.outcomes(), &[DUMMY_METHOD, "LApp.a()V"]);
    net.validate_normalization(1e-6).unwrap();
}

#[test]
fn zero_counts_set_directly_are_ignored() {
    let mut group = ReceiverCallGroup::with_calls([m("Ljava/io/File.exists()Z")]);
    group.contexts.insert(m("LApp.a()V"), 2);
    group.contexts.insert(m("LApp.b()V"), 0);
    group.definitions.insert("field#<>".to_string(), 0);
    let net = build_network(&receiver(), vec![group]).unwrap();

    let context = net.node_by_name(NODE_CALLING_CONTEXT).unwrap();
    assert_eq!(context.outcome_count(), 2);
    let definition = net.node_by_name(NODE_DEFINITION).unwrap();
    assert_eq!(definition.outcomes(), &[STATE_DUMMY_DEFINITION, "unknown#<>"]);
    net.validate_normalization(1e-6).unwrap();
}
