//! Round-robin polling of the fleet.
//!
//! Each tick queries exactly one device, so every device is polled once per
//! `device_count` ticks. Decoded samples go into the [`TelemetryBuffer`]; every
//! `emit_period` ticks the oldest buffered sample is written to the console.
//! Buffer production and consumption both happen here, on the polling task.

use log::{debug, trace};

use crate::{
    buffer::{TELEMETRY_CAPACITY, TelemetryBuffer},
    bus::FieldBus,
    config::{FleetSettings, Millis},
    console::{Console, ConsoleCommand},
    liveness::{DeviceLivenessTable, DeviceSlot, MAX_DEVICES},
    record::TelemetryRecord,
};

/// What the caller must do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// The operator asked for an immediate reset.
    RestartRequested,
}

/// Round-robin scheduler owning the bus, the console and the telemetry buffer.
pub struct PollingScheduler<'a, B, S, const N: usize = TELEMETRY_CAPACITY, const MAX: usize = MAX_DEVICES>
where
    B: FieldBus,
    S: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady,
{
    bus: B,
    console: Console<S>,
    buffer: TelemetryBuffer<N>,
    liveness: &'a DeviceLivenessTable<MAX>,
    period: Millis,
    /// Slot polled on the next tick.
    cursor: usize,
    /// Ticks since the last emission attempt.
    emit_counter: u8,
    emit_period: u8,
}

impl<'a, B, S, const N: usize, const MAX: usize> PollingScheduler<'a, B, S, N, MAX>
where
    B: FieldBus,
    S: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady,
{
    /// The liveness table must already be configured with the fleet size.
    pub fn new(
        bus: B,
        console: Console<S>,
        liveness: &'a DeviceLivenessTable<MAX>,
        settings: &FleetSettings,
    ) -> Self {
        Self {
            bus,
            console,
            buffer: TelemetryBuffer::new(),
            liveness,
            period: settings.poll_period,
            cursor: 0,
            emit_counter: 0,
            emit_period: settings.emit_period.max(1),
        }
    }

    /// Interval between two ticks.
    pub fn period(&self) -> Millis {
        self.period
    }

    /// Slot the next tick will query.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn buffer(&self) -> &TelemetryBuffer<N> {
        &self.buffer
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn console(&self) -> &Console<S> {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console<S> {
        &mut self.console
    }

    /// Run one polling tick.
    pub fn tick(&mut self) -> TickOutcome {
        let device_count = self.liveness.device_count();
        if let Some(slot) = self.liveness.slot(self.cursor) {
            self.poll(slot);
        }
        self.cursor = if device_count == 0 {
            0
        } else {
            (self.cursor + 1) % device_count
        };

        if let Some(ConsoleCommand::Restart) = self.console.poll_command() {
            return TickOutcome::RestartRequested;
        }

        self.emit_counter += 1;
        if self.emit_counter >= self.emit_period {
            self.emit_counter = 0;
            if let Ok(record) = self.buffer.pop_front() {
                self.console.emit(&record);
            }
        }
        TickOutcome::Continue
    }

    /// Query one device and record the outcome. No retry: the next round is the retry.
    fn poll(&mut self, slot: DeviceSlot) {
        let decoded = match self.bus.query(slot) {
            Ok(block) => TelemetryRecord::decode(slot.index() as u8, &block).map_err(|e| {
                debug!("Unit {} sent an undecodable block: {}", slot.address(), e);
            }),
            Err(e) => {
                trace!("Unit {} did not answer: {:?}", slot.address(), e);
                Err(())
            }
        };

        let Ok(record) = decoded else {
            self.liveness.set_alive(slot, false);
            return;
        };
        self.liveness.set_alive(slot, true);

        if record.is_meaningful() && self.buffer.push_back(record).is_err() {
            trace!(
                "Telemetry buffer full, dropped record {} from unit {}",
                record.record_id,
                slot.address()
            );
        }
    }
}
