//! Trigger/Event Dispatch.
//!
//! Three kinds of triggers share one dispatch surface: port triggers
//! embedded in update trailing records, sticky triggers from constants
//! whose active condition holds, and generic scheduled events. The
//! synchronous-trigger ring is a plain power-of-two-sized `Vec` per slot
//! rather than a shared lock-free queue, since it is owned outright by one
//! clock domain and never touched from another thread.

use std::collections::BinaryHeap;
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::ports::PortId;

/// One trailing trigger record emitted after an update runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub port: PortId,
    /// Tag bit 0 of the original callback pointer: `Some(token)` for a
    /// callback trigger, `None` for a plain activate.
    pub callback_token: Option<usize>,
    pub size_bits: u16,
    pub active_low: bool,
    pub latch: bool,
    /// "Was active on previous cycle" sticky bit.
    pub was_active: bool,
    pub delay_cycles: u32,
}

/// Fixed-size power-of-two ring for synchronous (delayed) trigger records,
/// indexed modulo the domain's max synchronous delay.
pub struct TriggerRing {
    slots: Vec<Vec<TriggerRecord>>,
    mask: usize,
    index: usize,
}

impl TriggerRing {
    /// `depth` is rounded up to the next power of two; the ring is always
    /// indexed modulo its power-of-two depth.
    pub fn new(depth: u32) -> Self {
        let pow2 = depth.max(1).next_power_of_two() as usize;
        Self { slots: vec![Vec::new(); pow2], mask: pow2 - 1, index: 0 }
    }

    pub fn schedule(&mut self, record: TriggerRecord) {
        let delay = record.delay_cycles as usize;
        let slot = (self.index + delay) & self.mask;
        self.slots[slot].push(record);
    }

    /// Drains this cycle's due records and advances the ring index.
    pub fn advance(&mut self) -> Vec<TriggerRecord> {
        let due = std::mem::take(&mut self.slots[self.index]);
        self.index = (self.index + 1) & self.mask;
        due
    }

    /// Current write/read cursor, for archiving.
    pub fn index(&self) -> usize {
        self.index
    }

    /// `slots.len() - 1`; the ring's depth is `mask + 1`.
    pub fn mask(&self) -> usize {
        self.mask
    }

    /// Snapshot of every slot's queued records, in ring order, for archiving.
    pub fn slots(&self) -> &[Vec<TriggerRecord>] {
        &self.slots
    }

    /// Replaces the ring's cursor and contents wholesale; `slots` must have
    /// the same length as this ring (same depth) or slots beyond the
    /// shorter length are left untouched.
    pub fn restore(&mut self, index: usize, slots: Vec<Vec<TriggerRecord>>) {
        self.index = index & self.mask;
        for (slot, restored) in self.slots.iter_mut().zip(slots) {
            *slot = restored;
        }
    }
}

/// A sticky trigger fires every cycle once armed.
#[derive(Debug, Clone, Copy)]
pub struct StickyTrigger {
    pub port: PortId,
    pub active: bool,
}

/// Global, monotonically-assigned id for a user event type, populated by a
/// static registration helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventTypeId(pub u32);

#[derive(Default)]
pub struct EventTypeRegistry {
    next: u32,
}

impl EventTypeRegistry {
    pub fn register(&mut self) -> EventTypeId {
        let id = EventTypeId(self.next);
        self.next += 1;
        id
    }
}

/// A user-constructed scheduled event.
pub trait ScheduledEvent: Send {
    fn type_id(&self) -> EventTypeId;
    /// Callback id within its type, used by archives to address this
    /// specific event instance.
    fn callback_id(&self) -> u32;
    fn fire(&mut self);
    fn archive(&self) -> Vec<u8>;
    fn equals(&self, other: &dyn ScheduledEvent) -> bool {
        self.type_id() == other.type_id() && self.callback_id() == other.callback_id()
    }
}

struct QueuedEvent {
    fire_at_ps: u64,
    seq: u64,
    event: Box<dyn ScheduledEvent>,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at_ps == other.fire_at_ps && self.seq == other.seq
    }
}
impl Eq for QueuedEvent {}
impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap (a max-heap) pops the earliest time first;
        // `seq` breaks ties in scheduling order.
        other.fire_at_ps.cmp(&self.fire_at_ps).then(other.seq.cmp(&self.seq))
    }
}

/// Min-time-ordered queue of generic scheduled events, fired in `postTick`
///.
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, fire_at_ps: u64, event: Box<dyn ScheduledEvent>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedEvent { fire_at_ps, seq, event });
    }

    /// Fires every event due in `(prev_edge_ps, sim_time_ps]`, in time order.
    pub fn fire_due(&mut self, prev_edge_ps: u64, sim_time_ps: u64) -> usize {
        let mut fired = 0;
        while let Some(top) = self.heap.peek() {
            if top.fire_at_ps <= prev_edge_ps || top.fire_at_ps > sim_time_ps {
                break;
            }
            let mut due = self.heap.pop().unwrap();
            due.event.fire();
            fired += 1;
        }
        fired
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Snapshots every pending event as `(fire_at_ps, type_id, callback_id,
    /// payload)` for archiving. The heap's internal order isn't preserved —
    /// `schedule` re-establishes time ordering on restore from `fire_at_ps`
    /// alone, same as if the events had just been scheduled fresh.
    pub fn snapshot(&self) -> Vec<(u64, u32, u32, Vec<u8>)> {
        self.heap
            .iter()
            .map(|q| (q.fire_at_ps, q.event.type_id().0, q.event.callback_id(), q.event.archive()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingEvent {
        type_id: EventTypeId,
        callback_id: u32,
        fired: std::sync::Arc<std::sync::atomic::AtomicU32>,
    }

    impl ScheduledEvent for CountingEvent {
        fn type_id(&self) -> EventTypeId {
            self.type_id
        }
        fn callback_id(&self) -> u32 {
            self.callback_id
        }
        fn fire(&mut self) {
            self.fired.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        fn archive(&self) -> Vec<u8> {
            self.callback_id.to_le_bytes().to_vec()
        }
    }

    #[test]
    fn ring_schedules_record_at_delayed_slot() {
        let mut ring = TriggerRing::new(4);
        ring.schedule(TriggerRecord {
            port: PortId(0),
            callback_token: None,
            size_bits: 32,
            active_low: false,
            latch: false,
            was_active: false,
            delay_cycles: 2,
        });
        assert!(ring.advance().is_empty());
        assert!(ring.advance().is_empty());
        assert_eq!(ring.advance().len(), 1);
    }

    #[test]
    fn events_fire_in_time_order() {
        let mut q = EventQueue::new();
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let mut registry = EventTypeRegistry::default();
        let ty = registry.register();
        q.schedule(20, Box::new(CountingEvent { type_id: ty, callback_id: 1, fired: fired.clone() }));
        q.schedule(10, Box::new(CountingEvent { type_id: ty, callback_id: 2, fired: fired.clone() }));
        let count = q.fire_due(0, 20);
        assert_eq!(count, 2);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn events_outside_window_do_not_fire() {
        let mut q = EventQueue::new();
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let mut registry = EventTypeRegistry::default();
        let ty = registry.register();
        q.schedule(50, Box::new(CountingEvent { type_id: ty, callback_id: 1, fired: fired.clone() }));
        let count = q.fire_due(0, 20);
        assert_eq!(count, 0);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn event_type_registry_assigns_increasing_ids() {
        let mut registry = EventTypeRegistry::default();
        let a = registry.register();
        let b = registry.register();
        assert_ne!(a, b);
    }
}
