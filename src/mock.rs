//! Test doubles: a serial port, output pins, a scripted field bus and a stepping clock.

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::rc::Rc;
use std::vec::Vec;

use thiserror::Error;

use crate::{
    bus::{FieldBus, RegisterBlock},
    liveness::DeviceSlot,
    record::RECORD_WORDS,
    runtime::{Clock, Instant, SystemReset},
};

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Everything written to the port
    write_buffer: heapless::Vec<u8, 1024>,
    /// Pre-configured data to be read
    read_buffer: heapless::Vec<u8, 256>,
    /// Current position in the read buffer
    read_position: usize,
    should_error_on_write: bool,
    should_error_on_read: bool,
}

#[derive(Debug, Error)]
pub enum MockSerialError {
    /// Simulated buffer overflow
    #[error("Mock buffer overflow")]
    BufferOverflow,
    /// Generic simulated error for testing
    #[error("Simulated serial error")]
    SimulatedError,
    /// Would block - no data available
    #[error("No data available")]
    WouldBlock,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::BrokenPipe,
            MockSerialError::WouldBlock => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        self.write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::SimulatedError);
        }
        let pending = &self.read_buffer[self.read_position..];
        if pending.is_empty() {
            return Err(MockSerialError::WouldBlock);
        }
        let n = core::cmp::min(buf.len(), pending.len());
        buf[..n].copy_from_slice(&pending[..n]);
        self.read_position += n;
        Ok(n)
    }
}

impl embedded_io::ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(self.read_position < self.read_buffer.len())
    }
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            should_error_on_write: false,
            should_error_on_read: false,
        }
    }

    /// Replace the data that will be returned when read() is called
    pub fn set_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer.clear();
        self.read_position = 0;
        self.push_read_data(data)
    }

    /// Queue more data behind whatever is still unread
    pub fn push_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Get a reference to the data that was written to this mock serial port
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    pub fn written_text(&self) -> &str {
        core::str::from_utf8(&self.write_buffer).unwrap()
    }

    pub fn clear_written_data(&mut self) {
        self.write_buffer.clear();
    }

    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }
}

/// Output pin remembering its level.
#[derive(Debug, Default)]
pub struct MockPin {
    high: bool,
    writes: usize,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.high
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl embedded_hal::digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.writes += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.writes += 1;
        Ok(())
    }
}

/// Failure returned by [`ScriptedBus`] for a silent device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoAnswer;

/// Field bus answering from a per-slot script and logging every query.
pub struct ScriptedBus {
    responses: Vec<Option<RegisterBlock>>,
    log: Rc<RefCell<Vec<usize>>>,
}

impl ScriptedBus {
    /// Every slot starts silent.
    pub fn new(device_count: usize) -> Self {
        Self {
            responses: vec![None; device_count],
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Make `slot` answer with the first words of a holding block.
    pub fn answer(&mut self, slot: usize, words: &[u32]) {
        let mut block = RegisterBlock::new();
        for i in 0..RECORD_WORDS {
            let w = words.get(i).copied().unwrap_or(0);
            block.push(w as u16).unwrap();
            block.push((w >> 16) as u16).unwrap();
        }
        self.responses[slot] = Some(block);
    }

    /// Make `slot` answer with a block too short to decode.
    pub fn answer_short(&mut self, slot: usize) {
        let mut block = RegisterBlock::new();
        block.push(1).unwrap();
        self.responses[slot] = Some(block);
    }

    pub fn silence(&mut self, slot: usize) {
        self.responses[slot] = None;
    }

    /// Shared handle on the slot indices queried so far.
    pub fn log(&self) -> Rc<RefCell<Vec<usize>>> {
        Rc::clone(&self.log)
    }
}

impl FieldBus for ScriptedBus {
    type Error = NoAnswer;

    fn query(&mut self, slot: DeviceSlot) -> Result<RegisterBlock, Self::Error> {
        self.log.borrow_mut().push(slot.index());
        self.responses
            .get(slot.index())
            .cloned()
            .flatten()
            .ok_or(NoAnswer)
    }
}

/// Clock whose time only moves when something delays on it.
#[derive(Debug, Clone, Default)]
pub struct StepClock {
    now_ms: Rc<Cell<u64>>,
}

impl StepClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.set(ms);
    }
}

impl Clock for StepClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.now_ms.get())
    }
}

impl embedded_hal::delay::DelayNs for StepClock {
    fn delay_ns(&mut self, ns: u32) {
        self.now_ms.set(self.now_ms.get() + u64::from(ns / 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now_ms.set(self.now_ms.get() + u64::from(ms));
    }
}

/// Delay that advances a [`StepClock`] and panics once its call budget is spent.
///
/// Used to stop loops that never return.
pub struct BudgetDelay {
    clock: StepClock,
    remaining: usize,
}

impl BudgetDelay {
    pub fn new(clock: &StepClock, calls: usize) -> Self {
        Self {
            clock: clock.clone(),
            remaining: calls,
        }
    }

    fn spend(&mut self) {
        if self.remaining == 0 {
            panic!("delay budget spent");
        }
        self.remaining -= 1;
    }
}

impl embedded_hal::delay::DelayNs for BudgetDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.spend();
        self.clock.delay_ns(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.spend();
        self.clock.delay_ms(ms);
    }
}

/// Reset that unwinds instead of rebooting.
pub struct PanicReset;

impl SystemReset for PanicReset {
    fn reset(&mut self) -> ! {
        panic!("controller reset")
    }
}

/// Text of a panic raised with a literal message.
pub fn panic_text(payload: &(dyn core::any::Any + Send)) -> &str {
    payload.downcast_ref::<&str>().copied().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Read, ReadReady, Write};

    #[test]
    fn serial_reads_back_queued_data() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"Hello").unwrap();
        mock.push_read_data(b" World").unwrap();

        let mut buffer = [0u8; 5];
        assert_eq!(mock.read(&mut buffer).unwrap(), 5);
        assert_eq!(&buffer, b"Hello");
        assert!(mock.read_ready().unwrap());

        let mut rest = [0u8; 16];
        assert_eq!(mock.read(&mut rest).unwrap(), 6);
        assert!(!mock.read_ready().unwrap());
        assert!(matches!(mock.read(&mut rest), Err(MockSerialError::WouldBlock)));
    }

    #[test]
    fn serial_write_error_simulation() {
        let mut mock = MockSerial::new();
        mock.write_all(b"ok").unwrap();
        mock.set_write_error(true);
        assert!(mock.write(b"test").is_err());
        assert_eq!(mock.written_text(), "ok");

        mock.clear_written_data();
        assert!(mock.written_data().is_empty());
    }

    #[test]
    fn serial_errors_map_to_io_kinds() {
        use embedded_io::Error as _;
        let mut mock = MockSerial::new();
        mock.set_read_error(true);
        let err = mock.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), embedded_io::ErrorKind::BrokenPipe);
        assert_eq!(err.to_string(), "Simulated serial error");
        assert_eq!(MockSerialError::WouldBlock.kind(), embedded_io::ErrorKind::Other);
    }

    #[test]
    fn budget_delay_stops_after_its_calls() {
        use embedded_hal::delay::DelayNs;
        let clock = StepClock::new();
        let mut delay = BudgetDelay::new(&clock, 2);
        delay.delay_ms(10);
        delay.delay_ms(10);

        let stopped = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| delay.delay_ms(10)));

        assert_eq!(panic_text(&*stopped.unwrap_err()), "delay budget spent");
        assert_eq!(clock.now().ticks(), 20);
    }

    #[test]
    fn scripted_bus_logs_queries() {
        let mut bus = ScriptedBus::new(2);
        bus.answer(1, &[5, 6]);
        let log = bus.log();

        assert_eq!(bus.query(DeviceSlot::new(0)), Err(NoAnswer));
        let block = bus.query(DeviceSlot::new(1)).unwrap();
        assert_eq!(&block[..4], &[5, 0, 6, 0]);
        assert_eq!(*log.borrow(), vec![0, 1]);
    }

    #[test]
    fn step_clock_advances_on_delay() {
        use embedded_hal::delay::DelayNs;
        let mut clock = StepClock::new();
        clock.delay_ms(15);
        clock.delay_us(2_000);
        assert_eq!(clock.now().ticks(), 17);
    }
}
