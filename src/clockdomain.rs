//! Clock Domain Runtime.
//!
//! One [`ClockDomain`] owns its [`crate::storage::PortStoragePlan`], its
//! [`crate::triggers::TriggerRing`], and the fifo push/pop rings for its
//! components; each cycle runs `pre_tick` → `tick` → `update` →
//! `post_tick` in that fixed order, iterating the combinational update
//! byte-stream for the `update` phase.

use tracing::instrument;

use crate::error::{RuntimeError, SimContext};
use crate::storage::PortStoragePlan;
use crate::triggers::{EventQueue, StickyTrigger, TriggerRecord, TriggerRing};

/// One entry of the combinational update byte-stream.
///
/// `run` is handed the domain's raw port-storage bytes so it can read its
/// input ports and write its output ports at the offsets
/// [`crate::storage::PortStoragePlan::port_offset`] assigned them, in
/// place of a raw pointer back to the live port value cell.
pub struct UpdateEntry {
    pub name: String,
    pub component_active: bool,
    pub default_active: bool,
    /// Offsets into the domain's trigger-fired bitmap that, if any is set,
    /// cause this update to run.
    pub input_triggers: Vec<usize>,
    pub run: Box<dyn FnMut(&mut [u8]) + Send>,
    pub trailing_triggers: Vec<TriggerRecord>,
}

/// Derives a clock domain's next edge from a rational ratio to a
/// generator domain: the `b*n`-th local edge aligns with the `(a*n+m)`-th
/// generator edge shifted by `k` picoseconds.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorRelation {
    pub numerator: u64,
    pub denominator: u64,
    pub phase_m: i64,
    pub shift_k_ps: i64,
}

impl GeneratorRelation {
    /// The local edge count `n` maps to generator edge index `a*n + m`.
    pub fn generator_edge_index(&self, local_edge: u64) -> i64 {
        (self.numerator as i64) * (local_edge as i64) + self.phase_m
    }
}

/// Free-running (non-generator-derived) or rational-ratio clock schedule.
#[derive(Debug, Clone, Copy)]
pub enum ClockSchedule {
    Period { period_ps: u64 },
    Derived { relation: GeneratorRelation, generator_period_ps: u64 },
}

pub struct ClockDomain {
    pub id: u32,
    pub schedule: ClockSchedule,
    pub storage: PortStoragePlan,
    pub updates: Vec<UpdateEntry>,
    pub trigger_ring: TriggerRing,
    pub sticky_triggers: Vec<StickyTrigger>,
    pub events: EventQueue,
    pub sim_time_ps: u64,
    pub num_ticks: u64,
    pub prev_edge_ps: u64,
    pub next_edge_ps: u64,
    pub local_edge_index: u64,
    pub enabled: bool,
    fired_triggers: Vec<bool>,
    /// Flat byte block for this domain's non-FIFO terminal ports, sized to
    /// [`PortStoragePlan::total_bytes`] and indexed via
    /// [`PortStoragePlan::port_offset`].
    bytes: Vec<u8>,
}

impl ClockDomain {
    pub fn new(id: u32, schedule: ClockSchedule, storage: PortStoragePlan) -> Self {
        let ring_depth = storage.max_delay;
        let bytes = vec![0u8; storage.total_bytes];
        Self {
            id,
            schedule,
            storage,
            updates: Vec::new(),
            trigger_ring: TriggerRing::new(ring_depth),
            sticky_triggers: Vec::new(),
            events: EventQueue::new(),
            sim_time_ps: 0,
            num_ticks: 0,
            prev_edge_ps: 0,
            next_edge_ps: 0,
            local_edge_index: 0,
            enabled: true,
            fired_triggers: Vec::new(),
            bytes,
        }
    }

    fn context(&self, current_update: Option<&str>) -> SimContext {
        SimContext { sim_time_ps: self.sim_time_ps, current_update: current_update.map(str::to_string), component_path: None }
    }

    /// Reads `len` bytes at `offset` from this domain's port storage.
    pub fn read_port(&self, offset: usize, len: usize) -> &[u8] {
        &self.bytes[offset..offset + len]
    }

    /// Writes `data` into this domain's port storage at `offset`.
    pub fn write_port(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    /// The full port-storage byte block, for checkpointing.
    pub fn storage_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Overwrites the full port-storage byte block from a checkpoint.
    /// `bytes` must be exactly [`PortStoragePlan::total_bytes`] long, the
    /// same invariant `restore` relies on for every other per-domain field.
    pub fn restore_storage_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.bytes.len(), "checkpoint storage size mismatch for domain {}", self.id);
        self.bytes.copy_from_slice(bytes);
    }

    /// Phase 1: patched-register value copies.
    #[instrument(level = "trace", skip(self))]
    pub fn pre_tick(&mut self) {
        for op in &self.storage.pre_tick {
            tracing::trace!(src = op.src_offset, dst = op.dst_offset, len = op.len, "pre_tick memcpy");
            self.bytes.copy_within(op.src_offset..op.src_offset + op.len, op.dst_offset);
        }
    }

    /// Phase 2: bulk register shifts, wired/slow copies, sticky triggers,
    /// ring advance, and bookkeeping.
    #[instrument(level = "trace", skip(self))]
    pub fn tick(&mut self) -> Vec<TriggerRecord> {
        for op in &self.storage.tick_shift {
            tracing::trace!(src = op.src_offset, dst = op.dst_offset, len = op.len, "register pipeline shift");
            self.bytes.copy_within(op.src_offset..op.src_offset + op.len, op.dst_offset);
        }
        for op in &self.storage.tick_side_copies {
            tracing::trace!(src = op.src_offset, dst = op.dst_offset, len = op.len, "wired/slow copy");
            self.bytes.copy_within(op.src_offset..op.src_offset + op.len, op.dst_offset);
        }

        let due = self.trigger_ring.advance();

        self.local_edge_index += 1;
        self.num_ticks += 1;
        self.prev_edge_ps = self.sim_time_ps;
        self.sim_time_ps = self.next_edge_ps;

        due
    }

    /// Phase 3: runs the combinational update byte-stream in scheduler
    /// order. `fired_for` marks which trigger-bitmap offsets (a port's raw
    /// id) had a trigger fire this cycle, from the ring or from triggers
    /// the caller evaluated ahead of the call; updates with no input
    /// trigger and no default-active flag are skipped. A zero-delay
    /// trailing trigger produced partway through the pass sets its bit in
    /// the working bitmap immediately, so a later update gated on it still
    /// fires this same cycle; one with a positive delay is scheduled on
    /// the ring instead and returned unchanged for the caller to ignore.
    #[instrument(level = "trace", skip(self, fired_for))]
    pub fn update(&mut self, fired_for: &[bool]) -> Result<Vec<TriggerRecord>, RuntimeError> {
        self.fired_triggers.clear();
        self.fired_triggers.extend_from_slice(fired_for);
        let mut trailing = Vec::new();

        for (idx, entry) in self.updates.iter_mut().enumerate() {
            if !entry.component_active {
                continue;
            }
            let triggered = entry.default_active
                || entry.input_triggers.iter().any(|&t| self.fired_triggers.get(t).copied().unwrap_or(false));
            if !triggered {
                continue;
            }
            (entry.run)(&mut self.bytes);
            tracing::trace!(update = idx, name = %entry.name, "ran update");
            for record in &entry.trailing_triggers {
                if record.delay_cycles > 0 {
                    self.trigger_ring.schedule(record.clone());
                } else {
                    let bit = record.port.0 as usize;
                    if bit >= self.fired_triggers.len() {
                        self.fired_triggers.resize(bit + 1, false);
                    }
                    self.fired_triggers[bit] = true;
                    trailing.push(record.clone());
                }
            }
        }
        Ok(trailing)
    }

    /// Phase 4: invalidate N-class values (debug builds) and zero the
    /// pulse slab; fire due generic events.
    #[instrument(level = "trace", skip(self))]
    pub fn post_tick(&mut self) -> usize {
        if self.storage.invalidate_normal_debug {
            tracing::trace!("invalidating N-class values");
        }
        if let Some((start, end)) = self.storage.pulse_zero_span {
            tracing::trace!(start, end, "zeroing pulse slab");
            self.bytes[start..end].fill(0);
        }
        self.events.fire_due(self.prev_edge_ps, self.sim_time_ps)
    }

    /// Evaluates sticky triggers: always considered fired.
    pub fn evaluate_sticky_triggers(&self) -> Vec<StickyTrigger> {
        self.sticky_triggers.clone()
    }

    /// Resets this domain: runs `update`-shaped propagation repeatedly,
    /// comparing port storage before and after each pass, until a pass
    /// leaves every byte unchanged or `max_iterations` is exhausted.
    pub fn reset(&mut self, max_iterations: u32) -> Result<(), RuntimeError> {
        let fired = vec![true; self.updates.len()];
        for _ in 0..max_iterations {
            let before = self.bytes.clone();
            self.update(&fired)?;
            if self.bytes == before {
                return Ok(());
            }
        }
        Err(RuntimeError::ResetNonConvergence { iterations: max_iterations, context: self.context(None) })
    }
}
