//! Telemetry records as reported by the field devices.

use core::fmt;

use crate::error::DecodeError;

/// Number of 32-bit words a device reports in its holding block.
pub const RECORD_WORDS: usize = 10;

/// Holding registers (16-bit) that make up one device block.
pub const HOLDING_REGISTERS: u16 = (RECORD_WORDS * 2) as u16;

/// Word offsets inside the holding block.
#[derive(Debug, Copy, Clone)]
#[repr(usize)]
enum RecordWord {
    Id = 0,
    Reference = 1,
    Steps = 2,
    TimeOfRest = 3,
    RestStandCount = 4,
    RecordId = 5,
}

/// Registers needed to reach the last decoded word.
const DECODED_REGISTERS: usize = (RecordWord::RecordId as usize + 1) * 2;

/// One polled sample. Never mutated once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryRecord {
    /// Slot index of the device this sample was polled from.
    pub slot: u8,
    pub id: u32,
    pub reference: u32,
    pub steps: u16,
    pub time_of_rest: u8,
    pub rest_stand_count: u8,
    /// Assigned by the device, increasing per sample.
    pub record_id: u32,
}

impl TelemetryRecord {
    /// Decode a raw holding block read from the device in `slot`.
    ///
    /// Each word is transferred low register first. The narrower fields
    /// keep only their low bits.
    pub fn decode(slot: u8, registers: &[u16]) -> Result<Self, DecodeError> {
        if registers.len() < DECODED_REGISTERS {
            return Err(DecodeError::ShortBlock {
                expected: DECODED_REGISTERS,
                found: registers.len(),
            });
        }

        let word = |w: RecordWord| {
            let at = w as usize * 2;
            registers[at] as u32 | (registers[at + 1] as u32) << 16
        };

        Ok(Self {
            slot,
            id: word(RecordWord::Id),
            reference: word(RecordWord::Reference),
            steps: word(RecordWord::Steps) as u16,
            time_of_rest: word(RecordWord::TimeOfRest) as u8,
            rest_stand_count: word(RecordWord::RestStandCount) as u8,
            record_id: word(RecordWord::RecordId),
        })
    }

    /// A zero identifier or zero record id marks "no sample"; such records
    /// are never enqueued.
    pub fn is_meaningful(&self) -> bool {
        self.id != 0 && self.record_id != 0
    }
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.slot)?;
        writeln!(f, "id: {}", self.id)?;
        writeln!(f, "ref: {}", self.reference)?;
        writeln!(f, "step: {}", self.steps)?;
        writeln!(f, "time of rest: {}", self.time_of_rest)?;
        writeln!(f, "rest stand: {}", self.rest_stand_count)?;
        writeln!(f, "rec ID: {}", self.record_id)
    }
}
