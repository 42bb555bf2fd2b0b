//! # Discrete Bayesian Network
//!
//! In-memory model of a call-recommendation network: an arena of named nodes,
//! each with an ordered outcome alphabet, an ordered parent list and a flat
//! conditional probability table (CPT).
//!
//! ## Layout
//!
//! - Node identity is the position in insertion order ([`NodeId`]). Parents are
//!   stored as ids, never as references, so the structure maps one-to-one onto
//!   the JBIF declaration/definition sections.
//! - CPT entries are laid out as
//!   `probabilities[parent_configuration * outcome_count + outcome]`, where the
//!   parent configuration is enumerated row-major over the parent list (the
//!   first parent varies slowest).
//!
//! A network is immutable once built or decoded and can be shared read-only
//! across threads behind an `Arc`.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::{CallNetError, Result};

/// Tolerance used when checking that every CPT row sums to one.
pub const CPT_SUM_TOLERANCE: f64 = 1e-4;

/// Identifier of a node: its 0-based position in declaration order.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position of the node inside the network arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single random variable of the network.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BayesNode {
    id: NodeId,
    name: String,
    outcomes: Vec<String>,
    parents: SmallVec<[NodeId; 2]>,
    probabilities: Vec<f64>,
}

impl BayesNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered outcome labels. Order is significant: the CPT is indexed by it.
    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    pub fn outcome_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcome_index(&self, outcome: &str) -> Option<usize> {
        self.outcomes.iter().position(|o| o == outcome)
    }

    pub fn outcome_name(&self, index: usize) -> Option<&str> {
        self.outcomes.get(index).map(String::as_str)
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Flat CPT, see the module documentation for the layout.
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Probabilities of all outcomes for one parent configuration.
    pub fn cpt_row(&self, parent_configuration: usize) -> Option<&[f64]> {
        let width = self.outcomes.len();
        let start = parent_configuration.checked_mul(width)?;
        self.probabilities.get(start..start + width)
    }
}

/// A named, directed acyclic collection of [`BayesNode`]s.
#[derive(Debug, Clone, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "NetworkRepr", into = "NetworkRepr")
)]
pub struct BayesNet {
    name: String,
    nodes: Vec<BayesNode>,
    by_name: FxHashMap<String, NodeId>,
}

impl PartialEq for BayesNet {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.nodes == other.nodes
    }
}

impl BayesNet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[BayesNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&BayesNode> {
        self.nodes.get(id.index())
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn node_by_name(&self, name: &str) -> Option<&BayesNode> {
        self.node_id(name).and_then(|id| self.node(id))
    }

    /// Declares a new node without parents and with an empty CPT.
    ///
    /// Fails if the name is already taken, the outcome list is empty or contains
    /// duplicate labels.
    pub fn add_node<I, S>(&mut self, name: impl Into<String>, outcomes: I) -> Result<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(CallNetError::InvalidInput(format!(
                "duplicate node name '{}'",
                name
            )));
        }
        let outcomes: Vec<String> = outcomes.into_iter().map(Into::into).collect();
        if outcomes.is_empty() {
            return Err(CallNetError::InvalidInput(format!(
                "node '{}' declares no outcomes",
                name
            )));
        }
        for (i, outcome) in outcomes.iter().enumerate() {
            if outcomes[..i].contains(outcome) {
                return Err(CallNetError::InvalidInput(format!(
                    "node '{}' declares outcome '{}' twice",
                    name, outcome
                )));
            }
        }
        let id = NodeId(u32::try_from(self.nodes.len()).map_err(|_| {
            CallNetError::InvalidInput("network exceeds u32::MAX nodes".into())
        })?);
        self.by_name.insert(name.clone(), id);
        self.nodes.push(BayesNode {
            id,
            name,
            outcomes,
            parents: SmallVec::new(),
            probabilities: Vec::new(),
        });
        Ok(id)
    }

    /// Sets the ordered parent list of `id`. Parents may be declared later than
    /// the child, acyclicity is checked by [`BayesNet::validate`].
    pub fn set_parents(&mut self, id: NodeId, parents: &[NodeId]) -> Result<()> {
        self.require(id)?;
        for (i, parent) in parents.iter().enumerate() {
            self.require(*parent)?;
            if *parent == id {
                return Err(CallNetError::InvalidInput(format!(
                    "node '{}' cannot be its own parent",
                    self.nodes[id.index()].name
                )));
            }
            if parents[..i].contains(parent) {
                return Err(CallNetError::InvalidInput(format!(
                    "node '{}' lists parent {} twice",
                    self.nodes[id.index()].name,
                    parent.0
                )));
            }
        }
        self.nodes[id.index()].parents = parents.iter().copied().collect();
        Ok(())
    }

    /// Installs the CPT of `id`. Parents must be set first since they determine
    /// the expected table size.
    pub fn set_probabilities(&mut self, id: NodeId, probabilities: Vec<f64>) -> Result<()> {
        let expected = self.cpt_len(id)?;
        if probabilities.len() != expected {
            return Err(CallNetError::InvalidInput(format!(
                "node '{}' expects {} probabilities, got {}",
                self.nodes[id.index()].name,
                expected,
                probabilities.len()
            )));
        }
        if let Some(bad) = probabilities.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(CallNetError::InvalidInput(format!(
                "node '{}' has invalid probability {}",
                self.nodes[id.index()].name,
                bad
            )));
        }
        self.nodes[id.index()].probabilities = probabilities;
        Ok(())
    }

    /// Number of CPT entries `id` needs: its outcome count times the outcome
    /// counts of all parents.
    pub fn cpt_len(&self, id: NodeId) -> Result<usize> {
        let node = self.require(id)?;
        node.parents.iter().try_fold(node.outcomes.len(), |acc, parent| {
            let width = self.require(*parent)?.outcomes.len();
            acc.checked_mul(width).ok_or_else(|| {
                CallNetError::InvalidInput(format!("CPT of node '{}' is too large", node.name))
            })
        })
    }

    /// Checks CPT sizes and that the parent relation is acyclic.
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            let expected = self.cpt_len(node.id)?;
            if node.probabilities.len() != expected {
                return Err(CallNetError::InvalidInput(format!(
                    "incomplete probability definition for node '{}': expected {}, got {}",
                    node.name,
                    expected,
                    node.probabilities.len()
                )));
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Checks that for every node and parent configuration the outcome
    /// probabilities sum to one within `tolerance`.
    pub fn validate_normalization(&self, tolerance: f64) -> Result<()> {
        for node in &self.nodes {
            let width = node.outcomes.len();
            for (row, chunk) in node.probabilities.chunks(width).enumerate() {
                let sum: f64 = chunk.iter().sum();
                if (sum - 1.0).abs() > tolerance {
                    return Err(CallNetError::InvalidInput(format!(
                        "node '{}' row {} sums to {:.6}",
                        node.name, row, sum
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns node ids ordered so that parents precede children.
    ///
    /// Ties are resolved by declaration order, which keeps the result stable.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let n = self.nodes.len();
        let mut pending: Vec<usize> = self.nodes.iter().map(|node| node.parents.len()).collect();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        for node in &self.nodes {
            for parent in &node.parents {
                children[parent.index()].push(node.id.index());
            }
        }

        let mut ready: std::collections::BTreeSet<usize> =
            (0..n).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(next) = ready.pop_first() {
            order.push(self.nodes[next].id);
            for &child in &children[next] {
                pending[child] -= 1;
                if pending[child] == 0 {
                    ready.insert(child);
                }
            }
        }

        if order.len() != n {
            return Err(CallNetError::InvalidInput(format!(
                "network '{}' contains a directed cycle",
                self.name
            )));
        }
        Ok(order)
    }

    fn require(&self, id: NodeId) -> Result<&BayesNode> {
        self.nodes.get(id.index()).ok_or_else(|| {
            CallNetError::InvalidInput(format!(
                "node id {} out of range (network has {} nodes)",
                id.0,
                self.nodes.len()
            ))
        })
    }
}

#[cfg(feature = "serde")]
#[derive(Clone, serde::Serialize, serde::Deserialize)]
struct NetworkRepr {
    name: String,
    nodes: Vec<BayesNode>,
}

/// Rebuilds the network through the checked mutators, so a snapshot can only
/// describe a network that could have been built in code.
#[cfg(feature = "serde")]
impl TryFrom<NetworkRepr> for BayesNet {
    type Error = CallNetError;

    fn try_from(repr: NetworkRepr) -> Result<Self> {
        let mut net = BayesNet::new(repr.name);
        for (position, node) in repr.nodes.iter().enumerate() {
            let id = net.add_node(node.name.clone(), node.outcomes.iter().cloned())?;
            if node.id != id {
                return Err(CallNetError::InvalidInput(format!(
                    "node '{}' has id {} but is stored at position {}",
                    node.name, node.id.0, position
                )));
            }
        }
        for node in repr.nodes {
            net.set_parents(node.id, &node.parents)?;
            net.set_probabilities(node.id, node.probabilities)?;
        }
        net.validate()?;
        Ok(net)
    }
}

#[cfg(feature = "serde")]
impl From<BayesNet> for NetworkRepr {
    fn from(net: BayesNet) -> Self {
        Self {
            name: net.name,
            nodes: net.nodes,
        }
    }
}
