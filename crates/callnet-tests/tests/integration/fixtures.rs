//! Fixtures shared by the integration and property test targets.

use callnet_core::model::builder::{NODE_CALLING_CONTEXT, NODE_CALL_GROUPS};
use callnet_core::{BayesNet, MethodName, NodeId, ReceiverCallGroup, TypeName};

pub fn m(identifier: &str) -> MethodName {
    MethodName::new(identifier).expect("fixture method names are well formed")
}

pub fn receiver() -> TypeName {
    TypeName::new("Ljava/io/File").expect("fixture type name is well formed")
}

/// Three call-groups with overlapping call sets, four weighted calling
/// contexts and a few definition sites.
pub fn three_groups() -> Vec<ReceiverCallGroup> {
    let exists = m("Ljava/io/File.exists()Z");
    let delete = m("Ljava/io/File.delete()Z");
    let name = m("Ljava/io/File.getName()Ljava/lang/String;");
    let list = m("Ljava/io/File.listFiles()[Ljava/io/File;");
    let init = m("Ljava/io/File.<init>(Ljava/lang/String;)V");

    let mut cleanup = ReceiverCallGroup::with_calls([exists.clone(), delete]);
    cleanup
        .observe_context(m("LApp.ctx1()V"), 6)
        .observe_context(m("LApp.ctx2()V"), 2)
        .observe_definition("field#<>", 5)
        .observe_definition("param#LApp.ctx1()V", 3);

    let mut browse = ReceiverCallGroup::with_calls([exists, name.clone(), list]);
    browse
        .observe_context(m("LApp.ctx2()V"), 2)
        .observe_context(m("LApp.ctx3()V"), 4)
        .observe_definition("return#LApp.root()Ljava/io/File;", 6);

    let mut create = ReceiverCallGroup::with_calls([init.clone(), name]);
    create
        .observe_context(m("LApp.ctx4()V"), 3)
        .observe_definition(format!("new#{}", init), 3);

    vec![cleanup, browse, create]
}

/// Static-call network whose call nodes are roots with fixed `True` beliefs:
/// `LT.b()V` 0.9, `LT.a()V` 0.7, `LT.c()V` 0.7, `LT.d()V` 0.2.
pub fn ranking_network() -> BayesNet {
    let mut net = BayesNet::new("LT");
    let context = net
        .add_node(NODE_CALLING_CONTEXT, ["LDummy.dummy()V", "LCtx.c()V"])
        .expect("context node");
    let groups = net
        .add_node(NODE_CALL_GROUPS, ["group 0", "group 1"])
        .expect("call groups node");
    net.set_parents(groups, &[context]).expect("parents");
    net.set_probabilities(context, vec![0.5, 0.5]).expect("context cpt");
    net.set_probabilities(groups, vec![0.6, 0.4, 0.3, 0.7])
        .expect("groups cpt");
    for (name, p) in [("LT.b()V", 0.9), ("LT.a()V", 0.7), ("LT.c()V", 0.7), ("LT.d()V", 0.2)] {
        let call = net.add_node(name, ["True", "False"]).expect("call node");
        net.set_probabilities(call, vec![p, 1.0 - p]).expect("call cpt");
    }
    net
}

/// Exact marginal of `query` given `evidence`, by enumerating every joint
/// assignment. Returns `None` when the evidence has probability zero.
pub fn brute_force_marginal(
    net: &BayesNet,
    evidence: &[(NodeId, usize)],
    query: NodeId,
) -> Option<Vec<f64>> {
    let cards: Vec<usize> = net.nodes().iter().map(|n| n.outcome_count()).collect();
    let mut marginal = vec![0.0; cards[query.index()]];
    let mut assignment = vec![0usize; cards.len()];

    loop {
        let consistent = evidence
            .iter()
            .all(|(node, outcome)| assignment[node.index()] == *outcome);
        if consistent {
            let joint: f64 = net
                .nodes()
                .iter()
                .map(|node| {
                    let row = node
                        .parents()
                        .iter()
                        .fold(0, |acc, p| acc * cards[p.index()] + assignment[p.index()]);
                    node.probabilities()[row * node.outcome_count() + assignment[node.id().index()]]
                })
                .product();
            marginal[assignment[query.index()]] += joint;
        }

        // odometer over all assignments, last variable fastest
        let mut pos = cards.len();
        loop {
            if pos == 0 {
                let total: f64 = marginal.iter().sum();
                if total <= 0.0 {
                    return None;
                }
                return Some(marginal.iter().map(|v| v / total).collect());
            }
            pos -= 1;
            assignment[pos] += 1;
            if assignment[pos] < cards[pos] {
                break;
            }
            assignment[pos] = 0;
        }
    }
}

pub fn assert_close(actual: &[f64], expected: &[f64], eps: f64) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (a - e).abs() < eps,
            "expected {:?}, got {:?} (eps {})",
            expected,
            actual,
            eps
        );
    }
}
