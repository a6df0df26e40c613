//! Field-bus access: the [`FieldBus`] seam and its Modbus RTU master.

use embedded_io::Error as _;
use log::trace;

use crate::{
    error::{Error, Result},
    liveness::DeviceSlot,
    record::HOLDING_REGISTERS,
};

/// Largest register block a query may return.
pub const MAX_BLOCK_REGISTERS: usize = 64;

/// Raw holding registers read from one device.
pub type RegisterBlock = heapless::Vec<u16, MAX_BLOCK_REGISTERS>;

/// Request/response access to the devices on the shared bus.
///
/// A query blocks until the device answers or the transport's own timeout
/// elapses.
pub trait FieldBus {
    type Error: core::fmt::Debug;

    /// Read the telemetry holding block of the device in `slot`.
    fn query(&mut self, slot: DeviceSlot) -> core::result::Result<RegisterBlock, Self::Error>;
}

/// Modbus RTU master reading each device's holding block with function 0x03.
///
/// Works over any interface which implements [embedded_io::Read] & [embedded_io::Write].
/// The device in slot `i` answers on unit id `i + 1`.
pub struct ModbusMaster<S: embedded_io::Read + embedded_io::Write, const L: usize = 128> {
    interface: S,
    device_count: usize,
    start_register: u16,
    register_count: u16,
}

impl<S: embedded_io::Read + embedded_io::Write, const L: usize> ModbusMaster<S, L> {
    /// Create a master for `device_count` devices, each reporting
    /// [`HOLDING_REGISTERS`] registers from register 0.
    pub fn new(interface: S, device_count: usize) -> Self {
        Self {
            interface,
            device_count,
            start_register: 0,
            register_count: HOLDING_REGISTERS,
        }
    }

    pub fn interface(&self) -> &S {
        &self.interface
    }

    /// Read `register_count` holding registers from the device in `slot`.
    pub fn read_holding_block(&mut self, slot: DeviceSlot) -> Result<RegisterBlock, S::Error> {
        if slot.index() >= self.device_count {
            return Err(Error::NotFound(slot.index()));
        }

        let mut buff: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut req = rmodbus::client::ModbusRequest::new(slot.address(), rmodbus::ModbusProto::Rtu);
        req.generate_get_holdings(self.start_register, self.register_count, &mut buff)?;

        self.interface
            .write_all(&buff)
            .map_err(Error::SerialError)?;

        // Reuse same buffer when reading back
        buff.clear();

        // unit id + function + byte count + data + CRC
        let expected = 3 + 2 * self.register_count as usize + 2;
        let mut temp_buf = [0u8; 16];
        while buff.len() < expected {
            match self.interface.read(&mut temp_buf) {
                Ok(0) => break,
                Ok(bytes_read) => {
                    buff.extend_from_slice(&temp_buf[..bytes_read])
                        .map_err(|_| Error::BufferError)?;
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        embedded_io::ErrorKind::Other | embedded_io::ErrorKind::TimedOut
                    ) =>
                {
                    // Nothing arrived before the port gave up.
                    if buff.is_empty() {
                        return Err(Error::Timeout);
                    }
                    // A short frame may still be an exception response.
                    break;
                }
                Err(e) => return Err(Error::SerialError(e)),
            }
        }
        if buff.is_empty() {
            return Err(Error::Timeout);
        }
        trace!("Unit {} answered {} bytes", slot.address(), buff.len());

        let mut registers = RegisterBlock::new();
        req.parse_u16(&buff, &mut registers)?;
        if registers.len() != self.register_count as usize {
            return Err(Error::InvalidResponse);
        }
        Ok(registers)
    }
}

impl<S: embedded_io::Read + embedded_io::Write, const L: usize> FieldBus for ModbusMaster<S, L> {
    type Error = Error<S::Error>;

    fn query(&mut self, slot: DeviceSlot) -> core::result::Result<RegisterBlock, Self::Error> {
        self.read_holding_block(slot)
    }
}
