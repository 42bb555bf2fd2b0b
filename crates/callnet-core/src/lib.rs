//! # Callnet Core
//!
//! Bayesian call-recommendation networks: construction from mined call
//! groups, the JBIF model format, exact junction-tree inference and a
//! ranking facade for code completion.

pub mod engine;
pub mod model;
pub mod recommend;
pub mod storage;

// Re-export commonly used types
pub use engine::errors::{CallNetError, Result};
pub use engine::junction_tree::{JunctionTreeConfig, JunctionTreeEngine};
pub use engine::network::{BayesNet, BayesNode, NodeId};
pub use model::builder::{build_network, build_networks, BuilderConfig, ReceiverCallGroup};
pub use model::names::{MethodName, TypeName};
pub use recommend::{CallModel, Recommendation, RecommendationConfig};
