//! Our error types for the fleet monitor.

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Error type for Modbus master communications with a field device.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Serial communication error")]
    SerialError(I),
    #[error("Modbus protocol error: {0}")]
    ModbusError(rmodbus::ErrorKind),
    #[error("Communication timeout")]
    Timeout,
    #[error("No device configured at slot {0}")]
    NotFound(usize),
    #[error("Invalid response received")]
    InvalidResponse,
    #[error("Frame does not fit the transfer buffer")]
    BufferError,
}

impl<I: embedded_io::Error> From<rmodbus::ErrorKind> for Error<I> {
    fn from(err: rmodbus::ErrorKind) -> Self {
        Error::ModbusError(err)
    }
}

/// Failures of the bounded telemetry queue.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("Telemetry buffer is full")]
    Full,
    #[error("Telemetry buffer is empty")]
    Empty,
}

/// A register block could not be turned into a telemetry record.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Register block too short: expected {expected} registers, found {found}")]
    ShortBlock { expected: usize, found: usize },
}

/// Problems with the persisted device count.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError<E: core::fmt::Debug> {
    #[error("Config sentinel mismatch (found {found:#06x})")]
    SentinelMismatch { found: u16 },
    #[error("Configured device count is zero")]
    ZeroCount,
    #[error("Device count {count} exceeds capacity of {max}")]
    TooManyDevices { count: usize, max: usize },
    #[error("Persistent storage failure: {0:?}")]
    Storage(E),
}

/// Unrecoverable conditions met while bringing the firmware up.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BootError<E: core::fmt::Debug> {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(ConfigError<E>),
    #[error("Persistent storage failure: {0:?}")]
    Storage(E),
}

impl<E: core::fmt::Debug> From<ConfigError<E>> for BootError<E> {
    fn from(err: ConfigError<E>) -> Self {
        match err {
            ConfigError::Storage(e) => BootError::Storage(e),
            other => BootError::InvalidConfig(other),
        }
    }
}
