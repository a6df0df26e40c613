//! Per-device liveness flags shared between the polling and supervision tasks.
//!
//! The polling task is the only writer, one slot per tick. The supervisor
//! reads the whole table. Every flag is an [`AtomicBool`] so the table is
//! sound on any memory model without a lock.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::ConfigError;

/// Compile-time cap on the configured fleet size.
pub const MAX_DEVICES: usize = 128;

/// One configured device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSlot {
    index: u8,
}

impl DeviceSlot {
    pub(crate) const fn new(index: u8) -> Self {
        Self { index }
    }

    /// Position in `[0, device_count)`.
    pub const fn index(&self) -> usize {
        self.index as usize
    }

    /// Bus address of the device, `index + 1`.
    pub const fn address(&self) -> u8 {
        self.index + 1
    }
}

/// Aggregate view of the table taken in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessSnapshot {
    pub alive: usize,
    pub total: usize,
}

/// Fixed arena of liveness flags indexed by device slot.
pub struct DeviceLivenessTable<const MAX: usize = MAX_DEVICES> {
    flags: [AtomicBool; MAX],
    device_count: AtomicUsize,
}

impl<const MAX: usize> DeviceLivenessTable<MAX> {
    /// Create an unconfigured table, suitable for a `static`.
    pub const fn new() -> Self {
        // Bus addresses are `index + 1` and must fit a single Modbus unit id.
        assert!(MAX <= 247);
        Self {
            flags: [const { AtomicBool::new(false) }; MAX],
            device_count: AtomicUsize::new(0),
        }
    }

    /// Size the table for `count` devices and mark them all as not alive.
    ///
    /// Fails fast when `count` is zero or larger than `MAX`.
    pub fn configure<E: core::fmt::Debug>(&self, count: usize) -> Result<(), ConfigError<E>> {
        if count == 0 {
            return Err(ConfigError::ZeroCount);
        }
        if count > MAX {
            return Err(ConfigError::TooManyDevices { count, max: MAX });
        }
        for flag in &self.flags[..count] {
            flag.store(false, Ordering::Release);
        }
        self.device_count.store(count, Ordering::Release);
        Ok(())
    }

    pub fn device_count(&self) -> usize {
        self.device_count.load(Ordering::Acquire)
    }

    /// The configured slots, in index order.
    pub fn slots(&self) -> impl Iterator<Item = DeviceSlot> + '_ {
        (0..self.device_count()).map(|i| DeviceSlot::new(i as u8))
    }

    /// Slot at `index`, if it is configured.
    pub fn slot(&self, index: usize) -> Option<DeviceSlot> {
        (index < self.device_count()).then(|| DeviceSlot::new(index as u8))
    }

    /// Overwrite the flag for `slot`.
    pub fn set_alive(&self, slot: DeviceSlot, alive: bool) {
        if let Some(flag) = self.flags.get(slot.index()) {
            flag.store(alive, Ordering::Release);
        }
    }

    pub fn is_alive(&self, slot: DeviceSlot) -> bool {
        self.flags
            .get(slot.index())
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Count alive devices among the configured slots.
    pub fn snapshot(&self) -> LivenessSnapshot {
        let total = self.device_count();
        let alive = self.flags[..total]
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count();
        LivenessSnapshot { alive, total }
    }
}

impl<const MAX: usize> Default for DeviceLivenessTable<MAX> {
    fn default() -> Self {
        Self::new()
    }
}
