//! FIFO Runtime.
//!
//! A FIFO's shape is fixed at resolve time (bit-bucket, wired-to-zero,
//! combinational trigger, or ring buffer); `push`/`pop` assert rather than
//! return a recoverable error on capacity violations, since the resolver
//! (`resolver::resolve_fifos`) has already sized every ring to its
//! minimum, making an over/under-run a construction bug rather than a
//! runtime condition. Ring state is four explicit counters
//! (head/tail/full/free) over an owned `Vec<u8>` byte ring, since entries
//! are fixed-size raw port values rather than boxed tasks.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoKind {
    /// Size 0, a default trigger fires on every push.
    BitBucket,
    /// Always empty; reads are forbidden.
    WiredToZero,
    /// Delay 0, size 0 — push calls the trigger inline.
    CombinationalTrigger,
    Ring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    ActivateConsumerNow,
    ScheduledPush { delay_cycles: u32 },
    CombinationalInline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopOutcome {
    FreedImmediately,
    ScheduledFree { delay_cycles: u32 },
}

/// Ring-buffer FIFO storage plus flow-control bookkeeping.
#[derive(Debug)]
pub struct GenericFifo {
    pub kind: FifoKind,
    pub capacity: u32,
    pub entry_size: u32,
    pub delay_cycles: u32,
    pub flow_control: bool,
    head: u32,
    tail: u32,
    full_count: u32,
    free_count: u32,
    pub min_free_watermark: u32,
    buffer: Vec<u8>,
}

impl GenericFifo {
    pub fn bit_bucket() -> Self {
        Self::new_ring(FifoKind::BitBucket, 0, 0, 0, true)
    }

    pub fn wired_to_zero() -> Self {
        Self::new_ring(FifoKind::WiredToZero, 0, 0, 0, true)
    }

    pub fn combinational_trigger() -> Self {
        Self::new_ring(FifoKind::CombinationalTrigger, 0, 0, 0, true)
    }

    pub fn ring(capacity: u32, entry_size: u32, delay_cycles: u32, flow_control: bool) -> Self {
        Self::new_ring(FifoKind::Ring, capacity, entry_size, delay_cycles, flow_control)
    }

    fn new_ring(kind: FifoKind, capacity: u32, entry_size: u32, delay_cycles: u32, flow_control: bool) -> Self {
        let buffer = vec![0u8; capacity as usize * entry_size as usize];
        Self {
            kind,
            capacity,
            entry_size,
            delay_cycles,
            flow_control,
            head: 0,
            tail: 0,
            full_count: 0,
            free_count: capacity,
            min_free_watermark: capacity,
            buffer,
        }
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.full_count == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.full_count == 0
    }

    pub fn free_count(&self) -> u32 {
        self.free_count
    }

    pub fn full_count(&self) -> u32 {
        self.full_count
    }

    /// Copies `entry` into the ring (if this isn't a size-0 variant),
    /// advances the tail with wraparound, and reports whether the
    /// consumer activates now or a delayed push event must be scheduled.
    pub fn push(&mut self, entry: &[u8]) -> PushOutcome {
        debug_assert!(!matches!(self.kind, FifoKind::WiredToZero), "push into a wired-to-zero fifo");
        if matches!(self.kind, FifoKind::CombinationalTrigger) {
            return PushOutcome::CombinationalInline;
        }
        if self.capacity > 0 {
            debug_assert!(!self.is_full(), "push into full fifo");
            let len = entry.len().min(self.entry_size as usize);
            let offset = self.tail as usize * self.entry_size as usize;
            self.buffer[offset..offset + len].copy_from_slice(&entry[..len]);
            self.tail = (self.tail + 1) % self.capacity;
            self.free_count -= 1;
            self.min_free_watermark = self.min_free_watermark.min(self.free_count);
        }
        if self.delay_cycles > 0 {
            PushOutcome::ScheduledPush { delay_cycles: self.delay_cycles }
        } else {
            self.full_count += 1;
            PushOutcome::ActivateConsumerNow
        }
    }

    /// Advances the head with wraparound and reports whether `freeCount`
    /// rises immediately or only after a delayed pop-visible event.
    pub fn pop(&mut self) -> PopOutcome {
        debug_assert!(!self.is_empty(), "pop from empty fifo");
        self.full_count -= 1;
        if self.capacity > 0 {
            self.head = (self.head + 1) % self.capacity;
        }
        if !self.flow_control || self.delay_cycles == 0 {
            self.free_count += 1;
            PopOutcome::FreedImmediately
        } else {
            PopOutcome::ScheduledFree { delay_cycles: self.delay_cycles }
        }
    }

    /// Called when a previously scheduled push event (from a nonzero-delay
    /// push) takes effect at the consumer.
    pub fn complete_scheduled_push(&mut self) {
        self.full_count += 1;
    }

    /// Called when a previously scheduled pop-visible event (flow control
    /// enabled, nonzero delay) reaches the producer.
    pub fn complete_scheduled_free(&mut self) {
        self.free_count += 1;
    }

    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn tail(&self) -> u32 {
        self.tail
    }

    /// The raw ring buffer, for checkpointing.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Overwrites every piece of ring state from a checkpoint. `data` must
    /// be exactly this fifo's buffer length.
    pub fn restore_state(&mut self, head: u32, tail: u32, full_count: u32, free_count: u32, data: &[u8]) {
        debug_assert_eq!(data.len(), self.buffer.len(), "checkpoint fifo buffer size mismatch");
        self.head = head;
        self.tail = tail;
        self.full_count = full_count;
        self.free_count = free_count;
        self.buffer.copy_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_delay_push_activates_consumer_immediately() {
        let mut fifo = GenericFifo::ring(4, 4, 0, true);
        assert_eq!(fifo.push(&[1, 0, 0, 0]), PushOutcome::ActivateConsumerNow);
        assert_eq!(fifo.full_count(), 1);
    }

    #[test]
    fn delayed_push_schedules_an_event_instead_of_activating() {
        let mut fifo = GenericFifo::ring(4, 4, 2, true);
        assert_eq!(fifo.push(&[1, 0, 0, 0]), PushOutcome::ScheduledPush { delay_cycles: 2 });
        assert_eq!(fifo.full_count(), 0);
        fifo.complete_scheduled_push();
        assert_eq!(fifo.full_count(), 1);
    }

    #[test]
    fn pop_with_flow_control_and_delay_schedules_free() {
        let mut fifo = GenericFifo::ring(4, 4, 2, true);
        fifo.push(&[1, 0, 0, 0]);
        fifo.complete_scheduled_push();
        let before = fifo.free_count();
        assert_eq!(fifo.pop(), PopOutcome::ScheduledFree { delay_cycles: 2 });
        assert_eq!(fifo.free_count(), before);
        fifo.complete_scheduled_free();
        assert_eq!(fifo.free_count(), before + 1);
    }

    #[test]
    fn pop_without_flow_control_frees_immediately() {
        let mut fifo = GenericFifo::ring(4, 4, 2, false);
        fifo.push(&[1, 0, 0, 0]);
        fifo.complete_scheduled_push();
        let before = fifo.free_count();
        assert_eq!(fifo.pop(), PopOutcome::FreedImmediately);
        assert_eq!(fifo.free_count(), before + 1);
    }

    #[test]
    fn combinational_trigger_fifo_never_buffers() {
        let mut fifo = GenericFifo::combinational_trigger();
        assert_eq!(fifo.push(&[]), PushOutcome::CombinationalInline);
        assert_eq!(fifo.full_count(), 0);
    }

    #[test]
    fn watermark_tracks_minimum_free_count() {
        let mut fifo = GenericFifo::ring(4, 4, 0, true);
        fifo.push(&[0; 4]);
        fifo.push(&[0; 4]);
        fifo.push(&[0; 4]);
        assert_eq!(fifo.min_free_watermark, 1);
    }

    #[test]
    fn ring_wraps_around_at_capacity() {
        let mut fifo = GenericFifo::ring(2, 4, 0, true);
        fifo.push(&[1, 0, 0, 0]);
        fifo.pop();
        fifo.push(&[2, 0, 0, 0]);
        fifo.push(&[3, 0, 0, 0]);
        assert!(fifo.is_full());
    }
}
