//! Simulation Archive.
//!
//! A container-neutral snapshot of every piece of runtime state: port
//! values, FIFO contents, pending events, per-component user state. The
//! wire container format itself is out of scope here; this module only
//! produces and validates the in-memory contents, in a fixed field order,
//! using `serde`/`bincode` the way the rest of this workspace serializes
//! its own config and archived state. The structural checksum uses
//! `xxhash-rust` (already this crate's fast hash of choice, see
//! `const_pool.rs`) truncated to 32 bits rather than a CRC, since CRC is
//! not part of this workspace's dependency stack.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::ResolutionError;
use crate::triggers::TriggerRecord;

/// Fixed end-of-archive marker.
pub const END_OF_ARCHIVE_MAGIC: u32 = 0xCA5C_0DE1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainArchive {
    pub id: u32,
    pub period_ps: u64,
    pub next_edge_ps: u64,
    pub sim_time_ps: u64,
    pub num_ticks: u64,
    pub ring_index: usize,
    pub ring_mask: usize,
    /// Trigger ring contents, one entry per slot, in ring order.
    pub trigger_ring_slots: Vec<Vec<TriggerRecord>>,
    pub storage_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FifoArchive {
    pub name: String,
    pub head: u32,
    pub tail: u32,
    pub full_count: u32,
    pub free_count: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingEventArchive {
    /// Owning clock domain, since each domain has its own event queue.
    pub domain_id: u32,
    pub type_id: u32,
    pub callback_id: u32,
    pub fire_at_ps: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentArchive {
    pub path: String,
    pub active: bool,
    /// Bracketed by a checkval byte on either side at the wire layer; here
    /// that bracket is just the vec's own length-prefix from `bincode`.
    pub user_state: Vec<u8>,
}

/// Full snapshot of runtime state, in a fixed field order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimArchive {
    pub structural_checksum: u32,
    pub sim_time_ps: u64,
    pub sim_ticks: u64,
    pub domains: Vec<DomainArchive>,
    pub fifos: Vec<FifoArchive>,
    pub pending_events: Vec<PendingEventArchive>,
    pub components: Vec<ComponentArchive>,
    pub magic: u32,
}

/// Structural checksum over construction-time facts only: class names,
/// per-parent child ids, port sizes, FIFO sizes. Two
/// simulators built from the same hierarchy always agree on this value,
/// independent of runtime state.
pub fn compute_structural_checksum(class_names: &[&str], child_ids: &[u16], port_sizes: &[u16], fifo_sizes: &[u32]) -> u32 {
    let mut buf = Vec::new();
    for name in class_names {
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
    }
    for id in child_ids {
        buf.extend_from_slice(&id.to_le_bytes());
    }
    for size in port_sizes {
        buf.extend_from_slice(&size.to_le_bytes());
    }
    for size in fifo_sizes {
        buf.extend_from_slice(&size.to_le_bytes());
    }
    let full = xxh3_64(&buf);
    (full ^ (full >> 32)) as u32
}

/// Serializes `archive` to a container-neutral byte stream.
pub fn save(archive: &SimArchive) -> Result<Vec<u8>, ResolutionError> {
    bincode::serialize(archive).map_err(|_| ResolutionError::ChecksumMismatch { expected: archive.structural_checksum, found: 0 })
}

/// Deserializes and validates `bytes` against `expected_checksum` and the
/// end-of-archive magic. A mismatch on either is fatal.
pub fn load(bytes: &[u8], expected_checksum: u32) -> Result<SimArchive, ResolutionError> {
    let archive: SimArchive =
        bincode::deserialize(bytes).map_err(|_| ResolutionError::ChecksumMismatch { expected: expected_checksum, found: 0 })?;
    if archive.structural_checksum != expected_checksum {
        return Err(ResolutionError::ChecksumMismatch { expected: expected_checksum, found: archive.structural_checksum });
    }
    if archive.magic != END_OF_ARCHIVE_MAGIC {
        return Err(ResolutionError::ChecksumMismatch { expected: END_OF_ARCHIVE_MAGIC, found: archive.magic });
    }
    Ok(archive)
}
