//! JBIF: compact binary encoding of a [`BayesNet`].
//!
//! All integers are big-endian.
//!
//! ```text
//! header       magic: i32 = 0xBA7E5B1F, version: i32 = 1
//! name         len: u16, utf8[len]
//! network      name, node_count: i32,
//!              declaration × node_count,
//!              definition × node_count     (declaration order)
//! declaration  name, outcome_count: i32, name × outcome_count
//! definition   parent_count: u8, parent_id: i32 × parent_count,
//!              cpt_len: i32, f64 × cpt_len
//! ```
//!
//! Parent ids are 0-based positions in declaration order. Decoding is
//! all-or-nothing: a bad header, truncated input, trailing bytes or a network
//! that fails validation yields [`CallNetError::Decode`].

use crate::engine::errors::{CallNetError, Result};
use crate::engine::network::{BayesNet, NodeId};

pub const MAGIC: u32 = 0xBA7E_5B1F;
pub const FORMAT_VERSION: i32 = 1;

const HEADER_LEN: usize = 8;

/// Worst-case encoded size of `net`, counting four bytes per character of
/// every name.
pub fn encoded_size_upper_bound(net: &BayesNet) -> usize {
    let name = |s: &str| 2 + 4 * s.chars().count();
    let mut size = HEADER_LEN + name(net.name()) + 4;
    for node in net.nodes() {
        size += name(node.name()) + 4;
        size += node.outcomes().iter().map(|o| name(o)).sum::<usize>();
        size += 1 + 4 * node.parents().len() + 4 + 8 * node.probabilities().len();
    }
    size
}

/// Encodes a complete, valid network.
pub fn encode(net: &BayesNet) -> Result<Vec<u8>> {
    net.validate()
        .map_err(|e| CallNetError::Encode(format!("network '{}' is not valid: {}", net.name(), e)))?;

    let mut out = Vec::with_capacity(encoded_size_upper_bound(net));
    out.extend_from_slice(&MAGIC.to_be_bytes());
    out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    write_name(&mut out, net.name())?;
    write_count(&mut out, net.len(), "node count")?;

    for node in net.nodes() {
        write_name(&mut out, node.name())?;
        write_count(&mut out, node.outcome_count(), "outcome count")?;
        for outcome in node.outcomes() {
            write_name(&mut out, outcome)?;
        }
    }

    for node in net.nodes() {
        let parents = u8::try_from(node.parents().len()).map_err(|_| {
            CallNetError::Encode(format!(
                "node '{}' has {} parents, at most 255 are supported",
                node.name(),
                node.parents().len()
            ))
        })?;
        out.push(parents);
        for parent in node.parents() {
            write_count(&mut out, parent.index(), "parent id")?;
        }
        write_count(&mut out, node.probabilities().len(), "CPT length")?;
        for p in node.probabilities() {
            out.extend_from_slice(&p.to_be_bytes());
        }
    }

    out.shrink_to_fit();

    #[cfg(feature = "tracing")]
    tracing::debug!(network = net.name(), bytes = out.len(), "encoded JBIF network");

    Ok(out)
}

fn write_name(out: &mut Vec<u8>, name: &str) -> Result<()> {
    let len = u16::try_from(name.len()).map_err(|_| {
        CallNetError::Encode(format!(
            "name of {} bytes exceeds the 65535 byte limit",
            name.len()
        ))
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

fn write_count(out: &mut Vec<u8>, value: usize, what: &str) -> Result<()> {
    let value = i32::try_from(value)
        .map_err(|_| CallNetError::Encode(format!("{} {} exceeds i32::MAX", what, value)))?;
    out.extend_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Decodes a network, rejecting anything but a complete, valid JBIF image.
pub fn decode(bytes: &[u8]) -> Result<BayesNet> {
    let mut reader = Reader::new(bytes);

    let magic = reader.u32()?;
    if magic != MAGIC {
        return Err(CallNetError::Decode(format!(
            "bad magic number 0x{:08X}, expected 0x{:08X}",
            magic, MAGIC
        )));
    }
    let version = reader.i32()?;
    if version != FORMAT_VERSION {
        return Err(CallNetError::Decode(format!(
            "unsupported format version {}, expected {}",
            version, FORMAT_VERSION
        )));
    }

    let mut net = BayesNet::new(reader.name()?);
    let node_count = reader.count("node count")?;
    for _ in 0..node_count {
        let name = reader.name()?;
        let outcome_count = reader.count("outcome count")?;
        let outcomes = (0..outcome_count)
            .map(|_| reader.name())
            .collect::<Result<Vec<_>>>()?;
        net.add_node(name, outcomes).map_err(invalid)?;
    }

    for index in 0..node_count {
        let id = NodeId(index as u32);
        let parent_count = reader.u8()?;
        let parents = (0..parent_count)
            .map(|_| {
                let parent = reader.count("parent id")?;
                if parent >= node_count {
                    return Err(CallNetError::Decode(format!(
                        "parent id {} out of range ({} nodes)",
                        parent, node_count
                    )));
                }
                Ok(NodeId(parent as u32))
            })
            .collect::<Result<Vec<_>>>()?;
        net.set_parents(id, &parents).map_err(invalid)?;

        let cpt_len = reader.count("CPT length")?;
        let raw = reader.take(cpt_len.checked_mul(8).ok_or_else(|| {
            CallNetError::Decode(format!("CPT length {} overflows", cpt_len))
        })?)?;
        let probabilities = raw
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                f64::from_be_bytes(buf)
            })
            .collect();
        net.set_probabilities(id, probabilities).map_err(invalid)?;
    }

    if reader.remaining() != 0 {
        return Err(CallNetError::Decode(format!(
            "{} trailing bytes after the last node definition",
            reader.remaining()
        )));
    }
    net.validate().map_err(invalid)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(network = net.name(), nodes = net.len(), bytes = bytes.len(), "decoded JBIF network");

    Ok(net)
}

fn invalid(err: CallNetError) -> CallNetError {
    match err {
        CallNetError::InvalidInput(msg) => CallNetError::Decode(msg),
        other => other,
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(CallNetError::Decode(format!(
                "unexpected end of input at offset {}: needed {} bytes, {} left",
                self.pos,
                len,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    /// Non-negative `i32` as a length or index.
    fn count(&mut self, what: &str) -> Result<usize> {
        let offset = self.pos;
        let value = self.i32()?;
        usize::try_from(value).map_err(|_| {
            CallNetError::Decode(format!("negative {} {} at offset {}", what, value, offset))
        })
    }

    fn name(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let offset = self.pos;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| CallNetError::Decode(format!("invalid UTF-8 name at offset {}: {}", offset, e)))
    }
}
