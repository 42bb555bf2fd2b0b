//! Inference engine for call-recommendation networks.
//!
//! This module provides:
//! - **errors**: Error type shared by the whole crate
//! - **network**: Discrete Bayesian network model (nodes, parents, CPTs)
//! - **factor**: Dense potential tables with prepared projections
//! - **triangulation**: Moralization and greedy elimination
//! - **evidence**: Observed outcomes per node
//! - **junction_tree**: Exact inference by clique-tree propagation

pub mod errors;
pub mod evidence;
pub mod factor;
pub mod junction_tree;
pub mod network;
pub mod triangulation;
