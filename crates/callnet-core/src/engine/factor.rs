//! Dense potential tables over discrete variables.
//!
//! A [`Factor`] stores one value per joint assignment of its variables in
//! row-major order (the last variable varies fastest), which matches the CPT
//! layout of [`BayesNode`](crate::engine::network::BayesNode) when the
//! variables are `parents ++ [node]`.
//!
//! Multiplication and marginalization between a factor and a factor over a
//! subset of its variables go through a *prepared projection*: a precomputed
//! index map from every entry of the larger table to the entry of the smaller
//! one. The junction tree computes these once per network and replays them on
//! every propagation.

use smallvec::SmallVec;

use crate::engine::errors::{CallNetError, Result};
use crate::engine::network::{BayesNet, NodeId};

pub(crate) type VarList = SmallVec<[usize; 4]>;

#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    vars: VarList,
    cards: VarList,
    values: Vec<f64>,
}

impl Factor {
    /// Creates a factor over `vars` with all entries set to one.
    pub fn ones(vars: &[usize], cards: &[usize]) -> Result<Self> {
        if vars.len() != cards.len() {
            return Err(CallNetError::Internal(format!(
                "factor has {} variables but {} cardinalities",
                vars.len(),
                cards.len()
            )));
        }
        let size = cards
            .iter()
            .try_fold(1usize, |acc, &c| acc.checked_mul(c))
            .ok_or_else(|| CallNetError::InvalidInput("potential table too large".into()))?;
        Ok(Self {
            vars: vars.iter().copied().collect(),
            cards: cards.iter().copied().collect(),
            values: vec![1.0; size],
        })
    }

    /// Wraps the CPT of `node` as a factor over `parents ++ [node]`.
    pub fn from_cpt(net: &BayesNet, node: NodeId) -> Result<Self> {
        let bayes_node = net
            .node(node)
            .ok_or_else(|| CallNetError::Internal(format!("unknown node id {}", node.0)))?;
        let mut vars: VarList = bayes_node.parents().iter().map(|p| p.index()).collect();
        vars.push(node.index());
        let cards: VarList = vars
            .iter()
            .map(|&v| net.nodes()[v].outcome_count())
            .collect();
        let mut factor = Self::ones(&vars, &cards)?;
        if factor.values.len() != bayes_node.probabilities().len() {
            return Err(CallNetError::InvalidInput(format!(
                "node '{}' has {} CPT entries, expected {}",
                bayes_node.name(),
                bayes_node.probabilities().len(),
                factor.values.len()
            )));
        }
        factor.values.copy_from_slice(bayes_node.probabilities());
        Ok(factor)
    }

    pub fn vars(&self) -> &[usize] {
        &self.vars
    }

    pub fn cards(&self) -> &[usize] {
        &self.cards
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn fill(&mut self, value: f64) {
        self.values.fill(value);
    }

    pub fn copy_values_from(&mut self, other: &Factor) {
        self.values.copy_from_slice(&other.values);
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn position(&self, var: usize) -> Option<usize> {
        self.vars.iter().position(|&v| v == var)
    }

    fn strides(&self) -> VarList {
        let mut strides: VarList = SmallVec::from_elem(1, self.vars.len());
        for i in (0..self.vars.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.cards[i + 1];
        }
        strides
    }

    /// Index map from every entry of `self` to the matching entry of `target`.
    ///
    /// `target` must range over a subset of `self`'s variables.
    pub fn prepare_projection(&self, target: &Factor) -> Result<Vec<usize>> {
        if let Some(missing) = target.vars.iter().find(|v| self.position(**v).is_none()) {
            return Err(CallNetError::Internal(format!(
                "variable {} of the target factor is not in the source factor",
                missing
            )));
        }
        let target_strides = target.strides();
        let mapped: VarList = self
            .vars
            .iter()
            .map(|v| target.position(*v).map_or(0, |p| target_strides[p]))
            .collect();

        let mut map = Vec::with_capacity(self.values.len());
        let mut counter: VarList = SmallVec::from_elem(0, self.vars.len());
        let mut index = 0usize;
        for _ in 0..self.values.len() {
            map.push(index);
            for pos in (0..counter.len()).rev() {
                counter[pos] += 1;
                index += mapped[pos];
                if counter[pos] < self.cards[pos] {
                    break;
                }
                index -= mapped[pos] * self.cards[pos];
                counter[pos] = 0;
            }
        }
        Ok(map)
    }

    /// `self[i] *= other[map[i]]` for every entry.
    pub fn multiply_prepared(&mut self, other: &[f64], map: &[usize]) {
        for (value, &j) in self.values.iter_mut().zip(map) {
            *value *= other[j];
        }
    }

    /// Marginalizes `self` onto the factor described by `map`, writing into `out`.
    pub fn sum_prepared(&self, out: &mut [f64], map: &[usize]) {
        out.fill(0.0);
        for (value, &j) in self.values.iter().zip(map) {
            out[j] += *value;
        }
    }

    /// Zeroes every entry in which `var` is not in state `outcome`.
    pub fn select(&mut self, var: usize, outcome: usize) {
        let Some(pos) = self.position(var) else {
            return;
        };
        let stride = self.strides()[pos];
        let card = self.cards[pos];
        for (i, value) in self.values.iter_mut().enumerate() {
            if (i / stride) % card != outcome {
                *value = 0.0;
            }
        }
    }
}
