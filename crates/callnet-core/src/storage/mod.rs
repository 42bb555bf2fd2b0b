//! Persistence of call networks.
//!
//! JBIF is the model file format. With the `serde` feature a network can also
//! be snapshotted to JSON for inspection.

pub mod jbif;

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::engine::errors::Result;
use crate::engine::network::BayesNet;

/// Reads one JBIF network from `reader`, consuming it to the end.
pub fn read_network<R: Read>(mut reader: R) -> Result<BayesNet> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    jbif::decode(&bytes)
}

/// Writes `net` as JBIF to `writer`.
pub fn write_network<W: Write>(mut writer: W, net: &BayesNet) -> Result<()> {
    let bytes = jbif::encode(net)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

pub fn load_network(path: impl AsRef<Path>) -> Result<BayesNet> {
    let bytes = fs::read(path)?;
    jbif::decode(&bytes)
}

pub fn save_network(path: impl AsRef<Path>, net: &BayesNet) -> Result<()> {
    fs::write(path, jbif::encode(net)?)?;
    Ok(())
}

/// Serializes `net` to pretty-printed JSON.
#[cfg(feature = "serde")]
pub fn save_network_json(net: &BayesNet) -> Result<String> {
    serde_json::to_string_pretty(net).map_err(|e| {
        crate::engine::errors::CallNetError::Encode(format!("failed to serialize network: {}", e))
    })
}

/// Parses a JSON snapshot and checks it like a decoded JBIF network.
#[cfg(feature = "serde")]
pub fn load_network_json(json: &str) -> Result<BayesNet> {
    serde_json::from_str(json).map_err(|e| {
        crate::engine::errors::CallNetError::Decode(format!("failed to deserialize network: {}", e))
    })
}
