//! Moralization and triangulation of a Bayesian network.
//!
//! The elimination order is chosen greedily: at each step the heuristic picks
//! the cheapest remaining vertex of the elimination graph, the vertex and its
//! current neighbors form a candidate clique, the neighbors are connected
//! pairwise (fill-in edges) and the vertex is removed. Candidate cliques that
//! are contained in an already recorded clique are dropped, so the result is
//! the set of maximal cliques of the triangulated graph.
//!
//! All ties are broken by the lowest node index, which makes the result a pure
//! function of the network structure.

use std::collections::BTreeSet;

use crate::engine::network::BayesNet;

/// Greedy cost function used to pick the next vertex to eliminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EliminationHeuristic {
    /// Fewest neighbors in the current elimination graph.
    #[default]
    MinDegree,
    /// Fewest fill-in edges that elimination would add; degree breaks ties.
    MinFillIn,
}

/// Undirected adjacency of the moral graph: every node is linked to its
/// parents, and all parents of a node are linked pairwise.
pub fn moral_graph(net: &BayesNet) -> Vec<BTreeSet<usize>> {
    let mut adjacency = vec![BTreeSet::new(); net.len()];
    for node in net.nodes() {
        let child = node.id().index();
        let parents = node.parents();
        for (i, parent) in parents.iter().enumerate() {
            let p = parent.index();
            adjacency[child].insert(p);
            adjacency[p].insert(child);
            for other in &parents[i + 1..] {
                let o = other.index();
                adjacency[p].insert(o);
                adjacency[o].insert(p);
            }
        }
    }
    adjacency
}

/// Eliminates every vertex of `graph` and returns the maximal cliques in the
/// order they were discovered. Each clique is sorted ascending.
pub fn triangulate(graph: &[BTreeSet<usize>], heuristic: EliminationHeuristic) -> Vec<Vec<usize>> {
    let mut remaining: Vec<BTreeSet<usize>> = graph.to_vec();
    let mut eliminated = vec![false; graph.len()];
    let mut cliques: Vec<BTreeSet<usize>> = Vec::new();

    for _ in 0..graph.len() {
        let Some(next) = pick_vertex(&remaining, &eliminated, heuristic) else {
            break;
        };

        let neighbors: Vec<usize> = remaining[next].iter().copied().collect();
        let mut clique: BTreeSet<usize> = neighbors.iter().copied().collect();
        clique.insert(next);

        for (i, &a) in neighbors.iter().enumerate() {
            for &b in &neighbors[i + 1..] {
                remaining[a].insert(b);
                remaining[b].insert(a);
            }
            remaining[a].remove(&next);
        }
        remaining[next].clear();
        eliminated[next] = true;

        if !cliques.iter().any(|known| clique.is_subset(known)) {
            cliques.push(clique);
        }
    }

    cliques
        .into_iter()
        .map(|clique| clique.into_iter().collect())
        .collect()
}

fn pick_vertex(
    remaining: &[BTreeSet<usize>],
    eliminated: &[bool],
    heuristic: EliminationHeuristic,
) -> Option<usize> {
    (0..remaining.len())
        .filter(|&v| !eliminated[v])
        .min_by_key(|&v| {
            let degree = remaining[v].len();
            match heuristic {
                EliminationHeuristic::MinDegree => (degree, 0, v),
                EliminationHeuristic::MinFillIn => (fill_in(remaining, v), degree, v),
            }
        })
}

fn fill_in(remaining: &[BTreeSet<usize>], v: usize) -> usize {
    let neighbors: Vec<usize> = remaining[v].iter().copied().collect();
    let mut missing = 0;
    for (i, &a) in neighbors.iter().enumerate() {
        for &b in &neighbors[i + 1..] {
            if !remaining[a].contains(&b) {
                missing += 1;
            }
        }
    }
    missing
}
