use std::sync::Arc;

use callnet_core::engine::errors::CallNetError;
use callnet_core::engine::junction_tree::{JunctionTree, JunctionTreeConfig, JunctionTreeEngine};
use callnet_core::engine::triangulation::EliminationHeuristic;
use callnet_core::model::builder::{NODE_CALLING_CONTEXT, NODE_DEFINITION};
use callnet_core::{build_network, BayesNet, NodeId};
use crate::fixtures::{assert_close, brute_force_marginal, ranking_network, receiver, three_groups};

fn built() -> Arc<BayesNet> {
    Arc::new(build_network(&receiver(), three_groups()).unwrap())
}

fn id(net: &BayesNet, name: &str) -> NodeId {
    net.node_id(name).unwrap()
}

fn check_all_marginals(engine: &mut JunctionTreeEngine, evidence: &[(NodeId, usize)]) {
    let net = Arc::clone(engine.network());
    for node in net.nodes() {
        let expected = brute_force_marginal(&net, evidence, node.id()).unwrap();
        let actual = engine.beliefs(node.id()).unwrap().to_vec();
        assert_close(&actual, &expected, 1e-9);
    }
}

#[test]
fn priors_match_enumeration() {
    let mut engine = JunctionTreeEngine::new(built()).unwrap();
    check_all_marginals(&mut engine, &[]);
}

#[test]
fn posteriors_match_enumeration_under_mixed_evidence() {
    let net = built();
    let mut engine = JunctionTreeEngine::new(Arc::clone(&net)).unwrap();
    let context = id(&net, NODE_CALLING_CONTEXT);
    let exists = id(&net, "Ljava/io/File.exists()Z");
    let definition = id(&net, NODE_DEFINITION);

    engine.add_evidence(context, 2).unwrap();
    engine.add_evidence(exists, 0).unwrap();
    check_all_marginals(&mut engine, &[(context, 2), (exists, 0)]);

    engine.add_evidence_outcome(definition, "field#<>").unwrap();
    let field = net.node(definition).unwrap().outcome_index("field#<>").unwrap();
    check_all_marginals(&mut engine, &[(context, 2), (exists, 0), (definition, field)]);

    assert!(engine.remove_evidence(exists));
    check_all_marginals(&mut engine, &[(context, 2), (definition, field)]);
}

#[test]
fn fill_in_heuristic_gives_the_same_answers() {
    let net = built();
    let config = JunctionTreeConfig {
        heuristic: EliminationHeuristic::MinFillIn,
    };
    let mut engine = JunctionTreeEngine::with_config(Arc::clone(&net), config).unwrap();
    let delete = id(&net, "Ljava/io/File.delete()Z");
    engine.add_evidence(delete, 1).unwrap();
    check_all_marginals(&mut engine, &[(delete, 1)]);
}

#[test]
fn built_networks_compile_to_valid_trees() {
    let net = built();
    let tree = JunctionTree::build(&net, EliminationHeuristic::MinDegree).unwrap();
    assert!(tree.has_running_intersection());
    assert_eq!(tree.separators().len(), tree.cliques().len() - 1);
    for node in net.nodes() {
        let home = tree.home_clique(node.id()).unwrap();
        let clique = &tree.cliques()[home];
        assert!(clique.contains(&node.id().index()));
        for parent in node.parents() {
            assert!(clique.contains(&parent.index()));
        }
    }
}

#[test]
fn sessions_are_independent() {
    let net = Arc::new(ranking_network());
    let mut first = JunctionTreeEngine::new(Arc::clone(&net)).unwrap();
    let mut second = first.fork();
    let b = id(&net, "LT.b()V");
    let groups = id(&net, "call groups");

    first.add_evidence(groups, 1).unwrap();
    let prior = second.beliefs(groups).unwrap().to_vec();
    let pinned = first.beliefs(groups).unwrap().to_vec();
    assert_eq!(pinned, vec![0.0, 1.0]);
    assert!(prior[0] > 0.4 && prior[0] < 0.5);
    assert!((second.beliefs(b).unwrap()[0] - 0.9).abs() < 1e-12);
}

#[test]
fn unknown_outcome_label_is_invalid_input() {
    let net = built();
    let mut engine = JunctionTreeEngine::new(Arc::clone(&net)).unwrap();
    let definition = id(&net, NODE_DEFINITION);
    let err = engine.add_evidence_outcome(definition, "static#<>").unwrap_err();
    assert!(matches!(err, CallNetError::InvalidInput(_)));
    assert!(engine.evidence().is_empty());
}
