//! Deduplicated constant pool.
//!
//! Ports wired to a constant value share a backing buffer; membership in
//! the pool is the fast "is this port wired to a constant?" test the
//! resolver and storage planner both rely on. Dedup keys on the content
//! bytes themselves rather than a digest, since the pool is expected to
//! stay small relative to the hashing cost it would save.

use rustc_hash::FxHashMap;

/// Handle into the constant pool. Stable for the lifetime of the `Sim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstId(u32);

/// Deduplicated byte-buffer pool.
#[derive(Debug, Default)]
pub struct ConstantPool {
    buffers: Vec<Box<[u8]>>,
    index: FxHashMap<Box<[u8]>, ConstId>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `bytes`, returning the existing handle if an identical
    /// buffer was already interned.
    pub fn intern(&mut self, bytes: &[u8]) -> ConstId {
        if let Some(&id) = self.index.get(bytes) {
            return id;
        }
        let id = ConstId(self.buffers.len() as u32);
        let boxed: Box<[u8]> = bytes.into();
        self.buffers.push(boxed.clone());
        self.index.insert(boxed, id);
        id
    }

    pub fn get(&self, id: ConstId) -> &[u8] {
        &self.buffers[id.0 as usize]
    }

    /// True if the "active" condition for a stuck trigger holds: an
    /// active-high trigger fires if any byte is nonzero, an active-low
    /// trigger fires if every byte is zero.
    pub fn is_stuck_active(&self, id: ConstId, active_high: bool) -> bool {
        let bytes = self.get(id);
        let any_nonzero = bytes.iter().any(|&b| b != 0);
        if active_high {
            any_nonzero
        } else {
            !any_nonzero
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
