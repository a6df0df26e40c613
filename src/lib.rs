//! Polling and health supervision for a fleet of Modbus RTU field devices.
//!
//! A controller polls up to [`MAX_DEVICES`] devices round-robin over a serial
//! field bus, one device per tick. Decoded samples are queued in a bounded
//! [`TelemetryBuffer`] and drained to the operator console at a fixed
//! cadence. A second task samples the shared [`DeviceLivenessTable`],
//! classifies the fleet and drives a tri-colour status indicator, reacting
//! to degradation only after it has persisted for several cycles.
//!
//! It supports `no_std` environments by use of the `no_std` feature flag.
//!
//! The field bus serial port should be configured like so:
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! Devices answer at Modbus unit `slot + 1` with 20 holding registers
//! starting at register 0.

#![cfg_attr(feature = "no_std", no_std)]

pub mod boot;
pub mod buffer;
pub mod bus;
pub mod config;
pub mod console;
pub mod error;
pub mod indicator;
pub mod liveness;
pub mod record;
pub mod runtime;
pub mod scheduler;
pub mod supervisor;

#[cfg(test)]
mod mock;

pub use buffer::{TELEMETRY_CAPACITY, TelemetryBuffer};
pub use bus::{FieldBus, ModbusMaster};
pub use config::{CONFIG_MAGIC, ConfigStore, FleetSettings, KeyValueStore, MemoryStore};
pub use liveness::{DeviceLivenessTable, DeviceSlot, MAX_DEVICES};
pub use record::{HOLDING_REGISTERS, TelemetryRecord};
pub use scheduler::{PollingScheduler, TickOutcome};
pub use supervisor::{FleetHealthState, HealthSupervisor};
