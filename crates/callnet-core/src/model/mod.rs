//! Call-recommendation model construction.
//!
//! - **prob**: Probability clamping, rounding and sum-to-one correction
//! - **names**: JVM-style method and type identifiers, definition states
//! - **builder**: Network construction from mined call groups

pub mod builder;
pub mod names;
pub mod prob;
