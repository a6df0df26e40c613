//! Bounded telemetry queue between the poll step and the console emission step.
//!
//! Backed by a heapless [`Deque`] so capacity is fixed at compile time and no
//! operation allocates. Pushing onto a full buffer is rejected, never
//! overwritten; rejected pushes are counted so loss stays observable.
//!
//! Producer and consumer are both the polling task, so the buffer is a plain
//! owned value with no synchronization.

use heapless::Deque;

use crate::{error::BufferError, record::TelemetryRecord};

/// Buffer capacity used by the firmware.
pub const TELEMETRY_CAPACITY: usize = 50;

/// Fixed-capacity FIFO of telemetry records.
pub struct TelemetryBuffer<const N: usize = TELEMETRY_CAPACITY> {
    queue: Deque<TelemetryRecord, N>,
    dropped: u32,
}

impl<const N: usize> TelemetryBuffer<N> {
    /// Create a new empty buffer.
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
            dropped: 0,
        }
    }

    /// Append a record, failing with [`BufferError::Full`] when `N` records are resident.
    pub fn push_back(&mut self, record: TelemetryRecord) -> Result<(), BufferError> {
        self.queue.push_back(record).map_err(|_| {
            self.dropped = self.dropped.saturating_add(1);
            BufferError::Full
        })
    }

    /// Remove and return the oldest record. An empty buffer is left untouched.
    pub fn pop_front(&mut self) -> Result<TelemetryRecord, BufferError> {
        self.queue.pop_front().ok_or(BufferError::Empty)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of records rejected because the buffer was full.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl<const N: usize> Default for TelemetryBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
