//! Exact inference by junction-tree (clique-tree) propagation.
//!
//! Pipeline, run once per network:
//!
//! 1. moralize the DAG and triangulate it ([`triangulation`](crate::engine::triangulation)),
//! 2. connect the maximal cliques into a maximum-weight spanning tree, where the
//!    weight of an edge is the size of the clique intersection (this gives the
//!    running-intersection property),
//! 3. assign every CPT to the first clique containing its family and multiply
//!    it into that clique's potential,
//! 4. precompute index maps between cliques, separators and single variables.
//!
//! Per query session ([`JunctionTreeEngine`]):
//!
//! 5. reset potentials, enter evidence by zeroing inconsistent entries in every
//!    clique that contains an observed variable,
//! 6. run a Hugin-style collect/distribute pass from a root clique,
//! 7. read the marginal of a node from the smallest clique containing it.
//!
//! Propagation is lazy: evidence changes only invalidate cached beliefs, and
//! the next belief query re-propagates from the stored prior potentials.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::engine::errors::{CallNetError, Result};
use crate::engine::evidence::Evidence;
use crate::engine::factor::{Factor, VarList};
use crate::engine::network::{BayesNet, NodeId};
use crate::engine::triangulation::{moral_graph, triangulate, EliminationHeuristic};

/// Configuration for junction-tree compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JunctionTreeConfig {
    /// Vertex elimination heuristic used during triangulation.
    pub heuristic: EliminationHeuristic,
}

/// Edge of the clique tree together with the variables both cliques share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Separator {
    /// Clique indices at both ends, lower index first.
    pub cliques: (usize, usize),
    /// Shared variables, sorted ascending. Empty when the edge only joins two
    /// otherwise disconnected components.
    pub vars: Vec<usize>,
}

/// Structure of a clique tree; depends on the network structure only.
#[derive(Debug, Clone)]
pub struct JunctionTree {
    cliques: Vec<Vec<usize>>,
    separators: Vec<Separator>,
    neighbors: Vec<Vec<(usize, usize)>>,
    concerned: Vec<Vec<usize>>,
    home: Vec<usize>,
    query: Vec<usize>,
}

impl JunctionTree {
    pub fn build(net: &BayesNet, heuristic: EliminationHeuristic) -> Result<Self> {
        let cards: Vec<usize> = net.nodes().iter().map(|n| n.outcome_count()).collect();
        let cliques = triangulate(&moral_graph(net), heuristic);
        let separators = connect_cliques(&cliques);

        let mut neighbors = vec![Vec::new(); cliques.len()];
        for (s, separator) in separators.iter().enumerate() {
            let (a, b) = separator.cliques;
            neighbors[a].push((b, s));
            neighbors[b].push((a, s));
        }

        let mut concerned = vec![Vec::new(); net.len()];
        for (c, clique) in cliques.iter().enumerate() {
            for &var in clique {
                concerned[var].push(c);
            }
        }

        let mut home = Vec::with_capacity(net.len());
        for node in net.nodes() {
            let mut family: Vec<usize> = node.parents().iter().map(|p| p.index()).collect();
            family.push(node.id().index());
            let clique = cliques
                .iter()
                .position(|clique| family.iter().all(|v| clique.binary_search(v).is_ok()))
                .ok_or_else(|| {
                    CallNetError::Internal(format!(
                        "no clique covers the family of node '{}'",
                        node.name()
                    ))
                })?;
            home.push(clique);
        }

        let table_size = |c: usize| -> usize { cliques[c].iter().map(|&v| cards[v]).product() };
        let mut query = Vec::with_capacity(net.len());
        for (var, candidates) in concerned.iter().enumerate() {
            let best = candidates
                .iter()
                .copied()
                .min_by_key(|&c| (table_size(c), c))
                .ok_or_else(|| {
                    CallNetError::Internal(format!("variable {} is in no clique", var))
                })?;
            query.push(best);
        }

        Ok(Self {
            cliques,
            separators,
            neighbors,
            concerned,
            home,
            query,
        })
    }

    pub fn cliques(&self) -> &[Vec<usize>] {
        &self.cliques
    }

    pub fn separators(&self) -> &[Separator] {
        &self.separators
    }

    /// Clique holding the CPT of `node`.
    pub fn home_clique(&self, node: NodeId) -> Option<usize> {
        self.home.get(node.index()).copied()
    }

    /// Cliques containing `node`.
    pub fn cliques_containing(&self, node: NodeId) -> &[usize] {
        self.concerned.get(node.index()).map_or(&[], Vec::as_slice)
    }

    /// Checks that, for every variable, the cliques containing it induce a
    /// connected subtree.
    pub fn has_running_intersection(&self) -> bool {
        self.concerned.iter().enumerate().all(|(var, holders)| {
            let Some(&start) = holders.first() else {
                return true;
            };
            let mut seen = vec![false; self.cliques.len()];
            let mut queue = VecDeque::from([start]);
            seen[start] = true;
            let mut reached = 0;
            while let Some(c) = queue.pop_front() {
                reached += 1;
                for &(next, _) in &self.neighbors[c] {
                    if !seen[next] && self.cliques[next].binary_search(&var).is_ok() {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
            reached == holders.len()
        })
    }

    /// Breadth-first order from `root`; every entry but the root carries the
    /// clique it was reached from and the separator in between.
    fn traversal(&self, root: usize) -> Vec<(usize, Option<(usize, usize)>)> {
        let mut order = Vec::with_capacity(self.cliques.len());
        if self.cliques.is_empty() {
            return order;
        }
        let mut seen = vec![false; self.cliques.len()];
        let mut queue = VecDeque::from([(root, None)]);
        seen[root] = true;
        while let Some((clique, link)) = queue.pop_front() {
            order.push((clique, link));
            for &(next, separator) in &self.neighbors[clique] {
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back((next, Some((clique, separator))));
                }
            }
        }
        order
    }
}

/// Kruskal over all clique pairs, heaviest intersection first. Zero-weight
/// edges are kept so that disconnected networks still yield a single tree.
fn connect_cliques(cliques: &[Vec<usize>]) -> Vec<Separator> {
    let mut candidates = Vec::new();
    for i in 0..cliques.len() {
        for j in i + 1..cliques.len() {
            let shared: Vec<usize> = cliques[i]
                .iter()
                .copied()
                .filter(|v| cliques[j].binary_search(v).is_ok())
                .collect();
            candidates.push((i, j, shared));
        }
    }
    candidates.sort_by(|a, b| b.2.len().cmp(&a.2.len()).then((a.0, a.1).cmp(&(b.0, b.1))));

    let mut sets: Vec<usize> = (0..cliques.len()).collect();
    fn find(sets: &mut [usize], mut x: usize) -> usize {
        while sets[x] != x {
            sets[x] = sets[sets[x]];
            x = sets[x];
        }
        x
    }

    let mut separators = Vec::with_capacity(cliques.len().saturating_sub(1));
    for (i, j, vars) in candidates {
        let (ri, rj) = (find(&mut sets, i), find(&mut sets, j));
        if ri == rj {
            continue;
        }
        sets[ri] = rj;
        separators.push(Separator {
            cliques: (i, j),
            vars,
        });
        if separators.len() + 1 == cliques.len() {
            break;
        }
    }
    separators
}

/// Immutable, shareable result of compiling a network: tree structure, prior
/// clique potentials and all prepared index maps.
#[derive(Debug)]
struct CompiledTree {
    tree: JunctionTree,
    initial_potentials: Vec<Factor>,
    separator_templates: Vec<Factor>,
    separator_maps: Vec<[Vec<usize>; 2]>,
    query_maps: Vec<Vec<usize>>,
    scratch_len: usize,
}

impl CompiledTree {
    fn compile(net: &BayesNet, heuristic: EliminationHeuristic) -> Result<Self> {
        let tree = JunctionTree::build(net, heuristic)?;
        let cards: Vec<usize> = net.nodes().iter().map(|n| n.outcome_count()).collect();
        let cards_of = |vars: &[usize]| -> VarList { vars.iter().map(|&v| cards[v]).collect() };

        let mut initial_potentials = tree
            .cliques
            .iter()
            .map(|clique| Factor::ones(clique, &cards_of(clique)))
            .collect::<Result<Vec<_>>>()?;
        for node in net.nodes() {
            let cpt = Factor::from_cpt(net, node.id())?;
            let home = &mut initial_potentials[tree.home[node.id().index()]];
            let map = home.prepare_projection(&cpt)?;
            home.multiply_prepared(cpt.values(), &map);
        }

        let separator_templates = tree
            .separators
            .iter()
            .map(|s| Factor::ones(&s.vars, &cards_of(&s.vars)))
            .collect::<Result<Vec<_>>>()?;
        let separator_maps = tree
            .separators
            .iter()
            .zip(&separator_templates)
            .map(|(s, template)| {
                Ok([
                    initial_potentials[s.cliques.0].prepare_projection(template)?,
                    initial_potentials[s.cliques.1].prepare_projection(template)?,
                ])
            })
            .collect::<Result<Vec<_>>>()?;
        let query_maps = (0..net.len())
            .map(|var| {
                let target = Factor::ones(&[var], &[cards[var]])?;
                initial_potentials[tree.query[var]].prepare_projection(&target)
            })
            .collect::<Result<Vec<_>>>()?;
        let scratch_len = separator_templates.iter().map(Factor::len).max().unwrap_or(0);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            network = net.name(),
            nodes = net.len(),
            cliques = tree.cliques.len(),
            largest_clique = tree.cliques.iter().map(Vec::len).max().unwrap_or(0),
            "compiled junction tree"
        );

        Ok(Self {
            tree,
            initial_potentials,
            separator_templates,
            separator_maps,
            query_maps,
            scratch_len,
        })
    }
}

/// One inference session over one network.
///
/// The compiled tree is shared (cheap to [`fork`](Self::fork)); evidence,
/// working potentials and cached beliefs are owned by the session. A session
/// is bound to its network at construction and is not meant to be shared
/// between threads while a query is in flight.
#[derive(Debug, Clone)]
pub struct JunctionTreeEngine {
    net: Arc<BayesNet>,
    compiled: Arc<CompiledTree>,
    potentials: Vec<Factor>,
    separators: Vec<Factor>,
    evidence: Evidence,
    beliefs: Vec<Option<Vec<f64>>>,
    propagated: bool,
    scratch: Vec<f64>,
}

impl JunctionTreeEngine {
    pub fn new(net: Arc<BayesNet>) -> Result<Self> {
        Self::with_config(net, JunctionTreeConfig::default())
    }

    pub fn with_config(net: Arc<BayesNet>, config: JunctionTreeConfig) -> Result<Self> {
        net.validate()?;
        let compiled = Arc::new(CompiledTree::compile(&net, config.heuristic)?);
        Ok(Self::from_compiled(net, compiled))
    }

    fn from_compiled(net: Arc<BayesNet>, compiled: Arc<CompiledTree>) -> Self {
        Self {
            potentials: compiled.initial_potentials.clone(),
            separators: compiled.separator_templates.clone(),
            beliefs: vec![None; net.len()],
            scratch: vec![0.0; compiled.scratch_len],
            evidence: Evidence::new(),
            propagated: false,
            net,
            compiled,
        }
    }

    /// A fresh, evidence-free session sharing this session's compiled tree.
    pub fn fork(&self) -> Self {
        Self::from_compiled(Arc::clone(&self.net), Arc::clone(&self.compiled))
    }

    pub fn network(&self) -> &Arc<BayesNet> {
        &self.net
    }

    pub fn tree(&self) -> &JunctionTree {
        &self.compiled.tree
    }

    pub fn evidence(&self) -> &Evidence {
        &self.evidence
    }

    /// Pins `node` to the outcome with index `outcome`.
    pub fn add_evidence(&mut self, node: NodeId, outcome: usize) -> Result<()> {
        if self.evidence.get(node) == Some(outcome) {
            return Ok(());
        }
        self.evidence.observe(&self.net, node, outcome)?;
        self.invalidate();
        Ok(())
    }

    /// Pins `node` to the outcome labelled `outcome`.
    pub fn add_evidence_outcome(&mut self, node: NodeId, outcome: &str) -> Result<()> {
        let bayes_node = self.net.node(node).ok_or_else(|| {
            CallNetError::InvalidInput(format!("evidence for unknown node id {}", node.0))
        })?;
        let index = bayes_node.outcome_index(outcome).ok_or_else(|| {
            CallNetError::InvalidInput(format!(
                "node '{}' has no outcome '{}'",
                bayes_node.name(),
                outcome
            ))
        })?;
        self.add_evidence(node, index)
    }

    /// Returns whether `node` was observed.
    pub fn remove_evidence(&mut self, node: NodeId) -> bool {
        let removed = self.evidence.remove(node).is_some();
        if removed {
            self.invalidate();
        }
        removed
    }

    pub fn clear_evidence(&mut self) {
        if !self.evidence.is_empty() {
            self.evidence.clear();
            self.invalidate();
        }
    }

    /// Posterior distribution of `node` given the current evidence.
    ///
    /// Observed nodes report a one-hot vector on their observed outcome.
    pub fn beliefs(&mut self, node: NodeId) -> Result<&[f64]> {
        let var = node.index();
        let card = self
            .net
            .node(node)
            .ok_or_else(|| CallNetError::InvalidInput(format!("unknown node id {}", node.0)))?
            .outcome_count();

        if !self.propagated {
            self.propagate();
            self.propagated = true;
        }

        if self.beliefs[var].is_none() {
            let mut belief = vec![0.0; card];
            if let Some(outcome) = self.evidence.get(node) {
                belief[outcome] = 1.0;
            } else {
                let clique = self.compiled.tree.query[var];
                self.potentials[clique].sum_prepared(&mut belief, &self.compiled.query_maps[var]);
                normalize(&mut belief).map_err(|sum| {
                    CallNetError::Numerical(format!(
                        "beliefs of node '{}' sum to {} under evidence {:?}",
                        self.net.nodes()[var].name(),
                        sum,
                        self.evidence.iter().collect::<Vec<_>>()
                    ))
                })?;
            }
            self.beliefs[var] = Some(belief);
        }

        self.beliefs[var]
            .as_deref()
            .ok_or_else(|| CallNetError::Internal("belief cache miss after update".into()))
    }

    fn invalidate(&mut self) {
        self.propagated = false;
        self.beliefs.iter_mut().for_each(|b| *b = None);
    }

    fn propagate(&mut self) {
        for (potential, initial) in self
            .potentials
            .iter_mut()
            .zip(&self.compiled.initial_potentials)
        {
            potential.copy_values_from(initial);
        }
        for separator in &mut self.separators {
            separator.fill(1.0);
        }

        let mut observed = vec![false; self.net.len()];
        let mut root = 0;
        for (node, outcome) in self.evidence.iter() {
            let var = node.index();
            observed[var] = true;
            for &clique in &self.compiled.tree.concerned[var] {
                self.potentials[clique].select(var, outcome);
            }
            root = self.compiled.tree.query[var];
        }

        let compiled = Arc::clone(&self.compiled);
        let order = compiled.tree.traversal(root);
        for &(clique, link) in order.iter().rev() {
            if let Some((parent, separator)) = link {
                self.pass_message(clique, parent, separator, &observed);
            }
        }
        for &(clique, link) in &order {
            if let Some((parent, separator)) = link {
                self.pass_message(parent, clique, separator, &observed);
            }
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(
            network = self.net.name(),
            evidence = self.evidence.len(),
            root,
            "propagated junction tree"
        );
    }

    fn pass_message(&mut self, from: usize, to: usize, separator: usize, observed: &[bool]) {
        let compiled = &self.compiled;
        let shape = &compiled.tree.separators[separator];
        // A fully observed separator only carries a constant factor.
        if shape.vars.iter().all(|&v| observed[v]) {
            return;
        }
        let [map_a, map_b] = &compiled.separator_maps[separator];
        let (from_map, to_map) = if shape.cliques.0 == from {
            (map_a, map_b)
        } else {
            (map_b, map_a)
        };

        let message = &mut self.separators[separator];
        let ratio = &mut self.scratch[..message.len()];
        ratio.copy_from_slice(message.values());
        self.potentials[from].sum_prepared(message.values_mut(), from_map);
        for (old, new) in ratio.iter_mut().zip(message.values()) {
            *old = if *old == 0.0 { 0.0 } else { *new / *old };
        }
        self.potentials[to].multiply_prepared(ratio, to_map);
    }
}

fn normalize(values: &mut [f64]) -> std::result::Result<(), f64> {
    let sum: f64 = values.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return Err(sum);
    }
    values.iter_mut().for_each(|v| *v /= sum);
    Ok(())
}
