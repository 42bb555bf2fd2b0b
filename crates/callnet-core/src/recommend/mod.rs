//! Call recommendations over a compiled call network.
//!
//! A [`CallModel`] is a query session: it owns the evidence of one completion
//! request. Observed calls and the enclosing method are entered as evidence,
//! then beliefs of the remaining call nodes are ranked. Call [`CallModel::reset`]
//! before handing a model to the next request, or [`CallModel::fork`] one
//! session per request.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::Arc;

use crate::engine::errors::{CallNetError, Result};
use crate::engine::junction_tree::{JunctionTreeConfig, JunctionTreeEngine};
use crate::engine::network::{BayesNet, BayesNode, NodeId};
use crate::model::builder::{
    NODE_CALLING_CONTEXT, NODE_CALL_GROUPS, NODE_DEFINITION, STATE_FALSE, STATE_TRUE,
};
use crate::model::names::{is_placeholder_definition, MethodName, TypeName, DUMMY_METHOD};
use crate::storage;

/// A recommended item with its posterior probability.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Recommendation<T> {
    pub item: T,
    pub probability: f64,
}

impl<T> Recommendation<T> {
    pub fn new(item: T, probability: f64) -> Self {
        Self { item, probability }
    }
}

/// Noise floors for pattern and definition recommendations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendationConfig {
    /// Patterns below this belief are not reported.
    pub pattern_floor: f64,
    /// Definitions at or below this belief are not reported.
    pub definition_floor: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            pattern_floor: 0.01,
            definition_floor: 0.01,
        }
    }
}

impl RecommendationConfig {
    pub fn validate(self) -> Result<Self> {
        for (name, value) in [
            ("pattern_floor", self.pattern_floor),
            ("definition_floor", self.definition_floor),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(CallNetError::InvalidInput(format!(
                    "call model: {} must be in [0, 1)",
                    name
                )));
            }
        }
        Ok(self)
    }
}

/// Object-call networks carry a definition node; static-call networks don't.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    ObjectCalls,
    StaticCalls,
}

#[derive(Debug, Clone, Copy)]
struct CallNode {
    id: NodeId,
    true_index: usize,
    false_index: usize,
}

/// Recommendation session over one receiver type's network.
#[derive(Debug, Clone)]
pub struct CallModel {
    receiver: TypeName,
    kind: ModelKind,
    engine: JunctionTreeEngine,
    context_node: NodeId,
    dummy_context: usize,
    call_groups_node: NodeId,
    definition_node: Option<NodeId>,
    calls: BTreeMap<MethodName, CallNode>,
    config: RecommendationConfig,
}

impl CallModel {
    pub fn new(receiver: TypeName, net: Arc<BayesNet>) -> Result<Self> {
        Self::with_config(
            receiver,
            net,
            RecommendationConfig::default(),
            JunctionTreeConfig::default(),
        )
    }

    pub fn with_config(
        receiver: TypeName,
        net: Arc<BayesNet>,
        config: RecommendationConfig,
        engine_config: JunctionTreeConfig,
    ) -> Result<Self> {
        let config = config.validate()?;
        let required = |name: &str| {
            net.node_id(name).ok_or_else(|| {
                CallNetError::InvalidInput(format!(
                    "network '{}' has no '{}' node",
                    net.name(),
                    name
                ))
            })
        };
        let context_node = required(NODE_CALLING_CONTEXT)?;
        let call_groups_node = required(NODE_CALL_GROUPS)?;
        let definition_node = net.node_id(NODE_DEFINITION);
        let dummy_context = net
            .nodes()[context_node.index()]
            .outcome_index(DUMMY_METHOD)
            .unwrap_or(0);

        let mut calls = BTreeMap::new();
        for node in net.nodes() {
            if matches!(node.name(), NODE_CALLING_CONTEXT | NODE_CALL_GROUPS | NODE_DEFINITION) {
                continue;
            }
            calls.insert(MethodName::new(node.name())?, call_node(node)?);
        }

        let kind = if definition_node.is_some() {
            ModelKind::ObjectCalls
        } else {
            ModelKind::StaticCalls
        };
        let engine = JunctionTreeEngine::with_config(net, engine_config)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            receiver = receiver.as_str(),
            ?kind,
            calls = calls.len(),
            "loaded call model"
        );

        Ok(Self {
            receiver,
            kind,
            engine,
            context_node,
            dummy_context,
            call_groups_node,
            definition_node,
            calls,
            config,
        })
    }

    /// Reads a JBIF network from `reader` and wraps it.
    pub fn load<R: Read>(reader: R, receiver: TypeName) -> Result<Self> {
        let net = storage::read_network(reader)?;
        Self::new(receiver, Arc::new(net))
    }

    /// A fresh, evidence-free session over the same compiled network.
    pub fn fork(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            engine: self.engine.fork(),
            calls: self.calls.clone(),
            ..*self
        }
    }

    pub fn receiver_type(&self) -> &TypeName {
        &self.receiver
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn network(&self) -> &Arc<BayesNet> {
        self.engine.network()
    }

    // ---------------------------------------------------------------------
    // Evidence
    // ---------------------------------------------------------------------

    /// Marks `method` as already called. Returns `false` if the network does
    /// not know the call.
    pub fn set_called(&mut self, method: &MethodName) -> Result<bool> {
        let Some(node) = self.call_node(method) else {
            return Ok(false);
        };
        self.engine.add_evidence(node.id, node.true_index)?;
        Ok(true)
    }

    /// Replaces the observed calls with `calls`. Returns whether every call
    /// was known to the network.
    pub fn set_observed_calls<'a, I>(&mut self, calls: I) -> Result<bool>
    where
        I: IntoIterator<Item = &'a MethodName>,
    {
        for node in self.observed_call_nodes() {
            self.engine.remove_evidence(node.id);
        }
        let mut all_known = true;
        for method in calls {
            all_known &= self.set_called(method)?;
        }
        Ok(all_known)
    }

    /// Pins the calling context to `method`, or to the dummy context when
    /// `method` is absent or unknown to the network.
    pub fn set_method_context(&mut self, method: Option<&MethodName>) -> Result<()> {
        let outcome = method
            .and_then(|m| self.context().outcome_index(m.as_str()))
            .unwrap_or(self.dummy_context);
        self.engine.add_evidence(self.context_node, outcome)
    }

    /// Pins the call-groups node to `pattern`; `None` removes the observation.
    /// Returns `false` for unknown patterns.
    pub fn set_pattern(&mut self, pattern: Option<&str>) -> Result<bool> {
        let node = self.call_groups_node;
        self.set_outcome(node, pattern)
    }

    /// Pins the definition node to `state`; `None` removes the observation.
    /// Returns `false` for unknown states and for models without definitions.
    pub fn set_observed_definition(&mut self, state: Option<&str>) -> Result<bool> {
        match self.definition_node {
            Some(node) => self.set_outcome(node, state),
            None => Ok(state.is_none()),
        }
    }

    /// Pins every constructor call node to `False`.
    pub fn negate_constructors(&mut self) -> Result<()> {
        let constructors: Vec<CallNode> = self
            .calls
            .iter()
            .filter(|(method, _)| method.is_init())
            .map(|(_, node)| *node)
            .collect();
        for node in constructors {
            self.engine.add_evidence(node.id, node.false_index)?;
        }
        Ok(())
    }

    pub fn clear_evidence(&mut self) {
        self.engine.clear_evidence();
    }

    /// Returns the session to its evidence-free state.
    pub fn reset(&mut self) {
        self.clear_evidence();
    }

    pub fn observed_calls(&self) -> BTreeSet<MethodName> {
        self.calls
            .iter()
            .filter(|(_, node)| self.engine.evidence().get(node.id) == Some(node.true_index))
            .map(|(method, _)| method.clone())
            .collect()
    }

    pub fn observed_context(&self) -> Result<Option<MethodName>> {
        self.observed_outcome(self.context_node)
            .map(MethodName::new)
            .transpose()
    }

    pub fn observed_pattern(&self) -> Option<String> {
        self.observed_outcome(self.call_groups_node)
    }

    pub fn observed_definition(&self) -> Option<String> {
        self.definition_node
            .and_then(|node| self.observed_outcome(node))
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Unobserved calls with a `True` belief of at least `min_probability`,
    /// most likely first, ties by method name. With `max_count` only the first
    /// `max_count` entries are returned.
    pub fn recommended_method_calls(
        &mut self,
        min_probability: f64,
        max_count: Option<usize>,
    ) -> Result<Vec<Recommendation<MethodName>>> {
        let candidates: Vec<(MethodName, CallNode)> = self
            .calls
            .iter()
            .filter(|(_, node)| !self.engine.evidence().contains(node.id))
            .map(|(method, node)| (method.clone(), *node))
            .collect();

        let mut recommendations = Vec::with_capacity(candidates.len());
        for (method, node) in candidates {
            let probability = self.engine.beliefs(node.id)?[node.true_index];
            if probability >= min_probability {
                recommendations.push(Recommendation::new(method, probability));
            }
        }
        recommendations.sort_by(by_probability_then_item);
        if let Some(max) = max_count {
            recommendations.truncate(max);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            receiver = self.receiver.as_str(),
            evidence = self.engine.evidence().len(),
            results = recommendations.len(),
            top = ?recommendations.first().map(|r| (r.item.as_str(), r.probability)),
            "recommended method calls"
        );

        Ok(recommendations)
    }

    /// All unobserved calls, ranked.
    ///
    /// Only calls are returned; pattern labels with their beliefs come from
    /// [`CallModel::patterns_with_probability`].
    pub fn recommend_calls(&mut self) -> Result<Vec<Recommendation<MethodName>>> {
        self.recommended_method_calls(0.0, None)
    }

    /// `True` belief of `method`; `0.0` if the network does not know it.
    pub fn recommend_call(&mut self, method: &MethodName) -> Result<f64> {
        match self.call_node(method) {
            Some(node) => Ok(self.engine.beliefs(node.id)?[node.true_index]),
            None => Ok(0.0),
        }
    }

    /// Call-group beliefs at or above the pattern floor, in outcome order.
    pub fn patterns_with_probability(&mut self) -> Result<Vec<Recommendation<String>>> {
        let floor = self.config.pattern_floor;
        let node = self.call_groups_node;
        let beliefs = self.engine.beliefs(node)?.to_vec();
        Ok(self
            .engine
            .network()
            .nodes()[node.index()]
            .outcomes()
            .iter()
            .zip(beliefs)
            .filter(|(_, p)| *p >= floor)
            .map(|(outcome, p)| Recommendation::new(outcome.clone(), p))
            .collect())
    }

    /// Definition states above the definition floor, most likely first.
    /// Placeholder states are never reported.
    pub fn recommend_definitions(&mut self) -> Result<Vec<Recommendation<String>>> {
        let Some(node) = self.definition_node else {
            return Ok(Vec::new());
        };
        let floor = self.config.definition_floor;
        let beliefs = self.engine.beliefs(node)?.to_vec();
        let mut recommendations: Vec<Recommendation<String>> = self
            .engine
            .network()
            .nodes()[node.index()]
            .outcomes()
            .iter()
            .zip(beliefs)
            .filter(|(state, p)| *p > floor && !is_placeholder_definition(state))
            .map(|(state, p)| Recommendation::new(state.clone(), p))
            .collect();
        recommendations.sort_by(by_probability_then_item);
        Ok(recommendations)
    }

    // ---------------------------------------------------------------------
    // Vocabulary
    // ---------------------------------------------------------------------

    /// Every call the network has a node for, in identifier order.
    pub fn method_calls(&self) -> Vec<MethodName> {
        self.calls.keys().cloned().collect()
    }

    /// Every calling context, dummy included.
    pub fn contexts(&self) -> Result<Vec<MethodName>> {
        self.context()
            .outcomes()
            .iter()
            .map(|o| MethodName::new(o.as_str()))
            .collect()
    }

    pub fn patterns(&self) -> Vec<String> {
        self.outcomes_of(self.call_groups_node)
    }

    pub fn definitions(&self) -> Vec<String> {
        self.definition_node
            .map(|node| self.outcomes_of(node))
            .unwrap_or_default()
    }

    fn context(&self) -> &BayesNode {
        &self.engine.network().nodes()[self.context_node.index()]
    }

    fn outcomes_of(&self, node: NodeId) -> Vec<String> {
        self.engine.network().nodes()[node.index()].outcomes().to_vec()
    }

    fn observed_outcome(&self, node: NodeId) -> Option<String> {
        let outcome = self.engine.evidence().get(node)?;
        self.engine.network().nodes()[node.index()]
            .outcome_name(outcome)
            .map(str::to_string)
    }

    fn call_node(&self, method: &MethodName) -> Option<CallNode> {
        match self.kind {
            ModelKind::ObjectCalls => self.calls.get(&method.rebase(&self.receiver)),
            ModelKind::StaticCalls => self.calls.get(method),
        }
        .copied()
    }

    fn observed_call_nodes(&self) -> Vec<CallNode> {
        self.calls
            .values()
            .filter(|node| self.engine.evidence().get(node.id) == Some(node.true_index))
            .copied()
            .collect()
    }

    fn set_outcome(&mut self, node: NodeId, outcome: Option<&str>) -> Result<bool> {
        let Some(outcome) = outcome else {
            self.engine.remove_evidence(node);
            return Ok(true);
        };
        match self.engine.network().nodes()[node.index()].outcome_index(outcome) {
            Some(index) => {
                self.engine.add_evidence(node, index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn call_node(node: &BayesNode) -> Result<CallNode> {
    match (node.outcome_index(STATE_TRUE), node.outcome_index(STATE_FALSE)) {
        (Some(true_index), Some(false_index)) => Ok(CallNode {
            id: node.id(),
            true_index,
            false_index,
        }),
        _ => Err(CallNetError::InvalidInput(format!(
            "call node '{}' must have outcomes '{}' and '{}'",
            node.name(),
            STATE_TRUE,
            STATE_FALSE
        ))),
    }
}

fn by_probability_then_item<T: Ord>(a: &Recommendation<T>, b: &Recommendation<T>) -> Ordering {
    b.probability
        .total_cmp(&a.probability)
        .then_with(|| a.item.cmp(&b.item))
}
