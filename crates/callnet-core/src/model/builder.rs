//! Construction of call networks from mined call-group statistics.
//!
//! One network is built per receiver type:
//!
//! ```text
//!   calling context ──► call groups ──► <one True/False node per call>
//!                                   └─► definition
//! ```
//!
//! A dummy call-group is always prepended at index 0. It observed the dummy
//! calling context and the dummy definition once and invokes nothing, so every
//! network has at least two groups and the dummy context has a well-defined
//! row.
//!
//! Every CPT entry is an empirical frequency clamped into `[P_MIN, P_MAX]`,
//! rounded, and each row is corrected to sum to one with
//! [`scale_maximal_value_with`].

use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::errors::{CallNetError, Result};
use crate::engine::network::{BayesNet, BayesNode, NodeId, CPT_SUM_TOLERANCE};
use crate::model::names::{MethodName, TypeName, STATE_DUMMY_DEFINITION, DUMMY_METHOD};
use crate::model::prob::{
    ensure_all_probabilities_in_valid_range, prior_probabilities_for_context_node, round,
    safe_div_max_min, scale_maximal_value_with, MAX_PROBABILITY_DELTA, P_MAX, P_MIN,
    P_ROUNDING_PRECISION,
};

pub const NODE_CALLING_CONTEXT: &str = "calling context";
pub const NODE_CALL_GROUPS: &str = "call groups";
pub const NODE_DEFINITION: &str = "definition";
pub const STATE_TRUE: &str = "True";
pub const STATE_FALSE: &str = "False";

/// Outcome added to the definition node when no group observed a definition.
const STATE_UNKNOWN_DEFINITION: &str = "unknown#<>";

/// Co-occurring calls on one receiver type, with how often the group was seen
/// in each calling context and with each definition state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReceiverCallGroup {
    pub calls: BTreeSet<MethodName>,
    pub contexts: BTreeMap<MethodName, u32>,
    pub definitions: BTreeMap<String, u32>,
}

impl ReceiverCallGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_calls<I: IntoIterator<Item = MethodName>>(calls: I) -> Self {
        Self {
            calls: calls.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Adds `count` observations of the group inside `context`. A zero count
    /// records nothing.
    pub fn observe_context(&mut self, context: MethodName, count: u32) -> &mut Self {
        if count == 0 {
            return self;
        }
        let entry = self.contexts.entry(context).or_insert(0);
        *entry = entry.saturating_add(count);
        self
    }

    /// Adds `count` observations of the receiver being defined as `state`.
    pub fn observe_definition(&mut self, state: impl Into<String>, count: u32) -> &mut Self {
        if count == 0 {
            return self;
        }
        let entry = self.definitions.entry(state.into()).or_insert(0);
        *entry = entry.saturating_add(count);
        self
    }

    pub fn usages_in_context(&self, context: &MethodName) -> u32 {
        self.contexts.get(context).copied().unwrap_or(0)
    }

    pub fn definition_count(&self, state: &str) -> u32 {
        self.definitions.get(state).copied().unwrap_or(0)
    }

    fn dummy() -> Self {
        let mut group = Self::new();
        group
            .observe_context(MethodName::dummy(), 1)
            .observe_definition(STATE_DUMMY_DEFINITION, 1);
        group
    }
}

/// Numeric knobs of the builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuilderConfig {
    /// Decimal places estimated probabilities are rounded to.
    pub rounding_precision: u32,
    /// Largest sum-to-one correction applied to a CPT row.
    pub max_probability_delta: f64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            rounding_precision: P_ROUNDING_PRECISION,
            max_probability_delta: MAX_PROBABILITY_DELTA,
        }
    }
}

impl BuilderConfig {
    pub fn validate(self) -> Result<Self> {
        // P_MIN itself needs five decimal places.
        if !(5..=15).contains(&self.rounding_precision) {
            return Err(CallNetError::InvalidInput(
                "build_network: rounding_precision must be in [5, 15]".into(),
            ));
        }
        if !(self.max_probability_delta > 0.0 && self.max_probability_delta < 1.0) {
            return Err(CallNetError::InvalidInput(
                "build_network: max_probability_delta must be in (0, 1)".into(),
            ));
        }
        Ok(self)
    }
}

/// Step-wise builder for one receiver type's network.
///
/// Nodes must be built in dependency order: calling context, call groups,
/// then calls and definition in any order. [`build_network`] runs all steps.
#[derive(Debug)]
pub struct NetworkBuilder {
    config: BuilderConfig,
    groups: Vec<ReceiverCallGroup>,
    contexts: Vec<MethodName>,
    definitions: Vec<String>,
    net: BayesNet,
    context_node: Option<NodeId>,
    call_groups_node: Option<NodeId>,
}

impl NetworkBuilder {
    pub fn new(receiver: &TypeName, groups: Vec<ReceiverCallGroup>) -> Result<Self> {
        Self::with_config(receiver, groups, BuilderConfig::default())
    }

    pub fn with_config(
        receiver: &TypeName,
        groups: Vec<ReceiverCallGroup>,
        config: BuilderConfig,
    ) -> Result<Self> {
        let config = config.validate()?;
        for group in &groups {
            if let Some(foreign) = group.calls.iter().find(|c| c.declaring_type() != *receiver) {
                return Err(CallNetError::InvalidInput(format!(
                    "call '{}' is not declared on receiver type '{}'",
                    foreign,
                    receiver.as_str()
                )));
            }
        }
        let mut all_groups = Vec::with_capacity(groups.len() + 1);
        all_groups.push(ReceiverCallGroup::dummy());
        all_groups.extend(groups);

        let dummy = MethodName::dummy();
        let observed: BTreeSet<&MethodName> = all_groups
            .iter()
            .flat_map(|g| g.contexts.iter())
            .filter(|(c, count)| **count > 0 && **c != dummy)
            .map(|(c, _)| c)
            .collect();
        let mut contexts = Vec::with_capacity(observed.len() + 1);
        contexts.push(dummy.clone());
        contexts.extend(observed.into_iter().cloned());
        ensure_dummy_context_at_index0(&contexts)?;

        let states: BTreeSet<&String> = all_groups
            .iter()
            .flat_map(|g| g.definitions.iter())
            .filter(|(s, count)| **count > 0 && s.as_str() != STATE_DUMMY_DEFINITION)
            .map(|(s, _)| s)
            .collect();
        let mut definitions = Vec::with_capacity(states.len() + 1);
        definitions.push(STATE_DUMMY_DEFINITION.to_string());
        definitions.extend(states.into_iter().cloned());
        if definitions.len() < 2 {
            definitions.push(STATE_UNKNOWN_DEFINITION.to_string());
        }

        Ok(Self {
            config,
            groups: all_groups,
            contexts,
            definitions,
            net: BayesNet::new(receiver.as_str()),
            context_node: None,
            call_groups_node: None,
        })
    }

    /// Call groups including the leading dummy group.
    pub fn groups(&self) -> &[ReceiverCallGroup] {
        &self.groups
    }

    /// Calling contexts in outcome order, dummy first.
    pub fn contexts(&self) -> &[MethodName] {
        &self.contexts
    }

    pub fn build_calling_context_node(&mut self) -> Result<NodeId> {
        let id = self.net.add_node(
            NODE_CALLING_CONTEXT,
            self.contexts.iter().map(|c| c.as_str().to_string()),
        )?;
        let prior = prior_probabilities_for_context_node(self.contexts.len());
        ensure_all_probabilities_in_valid_range(&prior)?;
        self.net.set_probabilities(id, prior)?;
        self.check_node(id)?;
        self.context_node = Some(id);
        Ok(id)
    }

    pub fn build_call_groups_node(&mut self) -> Result<NodeId> {
        let context_node = self.context_node.ok_or_else(|| {
            CallNetError::InvalidInput(
                "calling context node must be built before the call groups node".into(),
            )
        })?;
        let states = (0..self.groups.len()).map(|i| format!("group {}", i));
        let id = self.net.add_node(NODE_CALL_GROUPS, states)?;
        self.net.set_parents(id, &[context_node])?;

        let mut cpt = Vec::with_capacity(self.contexts.len() * self.groups.len());
        for context in &self.contexts {
            let total: u64 = self
                .groups
                .iter()
                .map(|g| u64::from(g.usages_in_context(context)))
                .sum();
            let mut row: Vec<f64> = self
                .groups
                .iter()
                .map(|g| {
                    let p = safe_div_max_min(u64::from(g.usages_in_context(context)), total);
                    round(p, self.config.rounding_precision)
                })
                .collect();
            self.scale_row(&mut row)?;
            cpt.extend(row);
        }
        ensure_all_probabilities_in_valid_range(&cpt)?;
        self.net.set_probabilities(id, cpt)?;
        self.check_node(id)?;
        self.call_groups_node = Some(id);
        Ok(id)
    }

    /// One boolean node per distinct call, in identifier order.
    pub fn build_method_call_nodes(&mut self) -> Result<Vec<NodeId>> {
        let call_groups = self.require_call_groups_node()?;
        let calls: BTreeSet<&MethodName> = self.groups.iter().flat_map(|g| &g.calls).collect();

        let mut ids = Vec::with_capacity(calls.len());
        for call in calls {
            let id = self.net.add_node(call.as_str(), [STATE_TRUE, STATE_FALSE])?;
            self.net.set_parents(id, &[call_groups])?;
            let cpt: Vec<f64> = self
                .groups
                .iter()
                .flat_map(|g| {
                    if g.calls.contains(call) {
                        [P_MAX, P_MIN]
                    } else {
                        [P_MIN, P_MAX]
                    }
                })
                .collect();
            self.net.set_probabilities(id, cpt)?;
            self.check_node(id)?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Definition-state node, one row per call group.
    ///
    /// Groups without any definition observations put their mass on the dummy
    /// definition.
    pub fn build_definition_node(&mut self) -> Result<NodeId> {
        let call_groups = self.require_call_groups_node()?;
        let id = self.net.add_node(NODE_DEFINITION, self.definitions.iter().cloned())?;
        self.net.set_parents(id, &[call_groups])?;

        let mut cpt = Vec::with_capacity(self.groups.len() * self.definitions.len());
        for group in &self.groups {
            let total: u64 = group.definitions.values().map(|c| u64::from(*c)).sum();
            let mut row: Vec<f64> = if total == 0 {
                prior_probabilities_for_context_node(self.definitions.len())
            } else {
                self.definitions
                    .iter()
                    .map(|state| {
                        let p = safe_div_max_min(u64::from(group.definition_count(state)), total);
                        round(p, self.config.rounding_precision)
                    })
                    .collect()
            };
            self.scale_row(&mut row)?;
            cpt.extend(row);
        }
        ensure_all_probabilities_in_valid_range(&cpt)?;
        self.net.set_probabilities(id, cpt)?;
        self.check_node(id)?;
        Ok(id)
    }

    /// Validates and returns the network built so far.
    pub fn finish(self) -> Result<BayesNet> {
        self.net.validate()?;
        self.net.validate_normalization(CPT_SUM_TOLERANCE)?;
        Ok(self.net)
    }

    fn scale_row(&self, row: &mut [f64]) -> Result<()> {
        scale_maximal_value_with(
            row,
            self.config.rounding_precision,
            self.config.max_probability_delta,
        )
    }

    fn require_call_groups_node(&self) -> Result<NodeId> {
        self.call_groups_node.ok_or_else(|| {
            CallNetError::InvalidInput("call groups node must be built first".into())
        })
    }

    fn check_node(&self, id: NodeId) -> Result<()> {
        let node = self
            .net
            .node(id)
            .ok_or_else(|| CallNetError::Internal(format!("node id {} vanished", id.0)))?;
        ensure_minimum_two_states(node)?;
        ensure_correct_number_of_probabilities(&self.net, id)
    }
}

/// Builds the complete network of `receiver`: calling context, call groups,
/// call nodes and definition node.
pub fn build_network(receiver: &TypeName, groups: Vec<ReceiverCallGroup>) -> Result<BayesNet> {
    build_network_with_config(receiver, groups, BuilderConfig::default())
}

pub fn build_network_with_config(
    receiver: &TypeName,
    groups: Vec<ReceiverCallGroup>,
    config: BuilderConfig,
) -> Result<BayesNet> {
    let group_count = groups.len();
    let mut builder = NetworkBuilder::with_config(receiver, groups, config)?;
    builder.build_calling_context_node()?;
    builder.build_call_groups_node()?;
    let calls = builder.build_method_call_nodes()?;
    builder.build_definition_node()?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        receiver = receiver.as_str(),
        groups = group_count,
        contexts = builder.contexts.len(),
        calls = calls.len(),
        definitions = builder.definitions.len(),
        "built call network"
    );
    #[cfg(not(feature = "tracing"))]
    let _ = (group_count, calls);

    builder.finish()
}

/// Builds one network per receiver type, preserving input order.
///
/// With the `parallel` feature the types are built concurrently.
pub fn build_networks(inputs: Vec<(TypeName, Vec<ReceiverCallGroup>)>) -> Result<Vec<BayesNet>> {
    #[cfg(feature = "parallel")]
    {
        inputs
            .into_par_iter()
            .map(|(receiver, groups)| build_network(&receiver, groups))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        inputs
            .into_iter()
            .map(|(receiver, groups)| build_network(&receiver, groups))
            .collect()
    }
}

pub fn ensure_minimum_two_states(node: &BayesNode) -> Result<()> {
    if node.outcome_count() < 2 {
        return Err(CallNetError::InvalidInput(format!(
            "node '{}' has less than 2 states: {:?}",
            node.name(),
            node.outcomes()
        )));
    }
    Ok(())
}

pub fn ensure_correct_number_of_probabilities(net: &BayesNet, id: NodeId) -> Result<()> {
    let expected = net.cpt_len(id)?;
    let actual = net.node(id).map_or(0, |n| n.probabilities().len());
    if expected != actual {
        return Err(CallNetError::InvalidInput(format!(
            "incomplete probability definition: expected {}, got {}",
            expected, actual
        )));
    }
    Ok(())
}

pub fn ensure_dummy_context_at_index0(contexts: &[MethodName]) -> Result<()> {
    match contexts.first() {
        Some(first) if first.as_str() == DUMMY_METHOD => Ok(()),
        other => Err(CallNetError::InvalidInput(format!(
            "dummy context is not the first context: {:?}",
            other
        ))),
    }
}
