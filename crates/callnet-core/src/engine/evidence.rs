//! Evidence: temporary pinning of nodes to observed outcomes.

use rustc_hash::FxHashMap;

use crate::engine::errors::{CallNetError, Result};
use crate::engine::network::{BayesNet, NodeId};

/// Mapping from node to the index of its observed outcome.
///
/// Entries are checked against the network on insertion, so every stored
/// outcome index is valid for the node it refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    observed: FxHashMap<NodeId, usize>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `node` to `outcome`, replacing any previous observation of it.
    pub fn observe(&mut self, net: &BayesNet, node: NodeId, outcome: usize) -> Result<()> {
        let bayes_node = net.node(node).ok_or_else(|| {
            CallNetError::InvalidInput(format!("evidence for unknown node id {}", node.0))
        })?;
        if outcome >= bayes_node.outcome_count() {
            return Err(CallNetError::InvalidInput(format!(
                "outcome index {} is out of range for node '{}' ({} outcomes)",
                outcome,
                bayes_node.name(),
                bayes_node.outcome_count()
            )));
        }
        self.observed.insert(node, outcome);
        Ok(())
    }

    pub fn get(&self, node: NodeId) -> Option<usize> {
        self.observed.get(&node).copied()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.observed.contains_key(&node)
    }

    pub fn remove(&mut self, node: NodeId) -> Option<usize> {
        self.observed.remove(&node)
    }

    pub fn clear(&mut self) {
        self.observed.clear();
    }

    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    /// Observations sorted by node id.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, usize)> + '_ {
        let mut entries: Vec<(NodeId, usize)> =
            self.observed.iter().map(|(n, o)| (*n, *o)).collect();
        entries.sort_unstable();
        entries.into_iter()
    }
}
