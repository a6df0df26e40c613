//! Operator console: startup prompt, restart command and telemetry output.
//!
//! The console is used in two distinct phases. At boot a [`StartupPrompt`]
//! blocks while the operator may type a device count. Afterwards the polling
//! task only peeks for single command bytes with [`Console::poll_command`]
//! and never waits on the port.

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use log::warn;

use crate::{config::FleetSettings, record::TelemetryRecord};

/// Longest line the console formats in one go.
const LINE_CAPACITY: usize = 192;

/// Most digits accepted for the device count.
const MAX_DIGITS: usize = 3;

/// Commands the operator can issue while the firmware runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Reset the controller immediately.
    Restart,
}

/// Byte-oriented console over any non-blocking capable port.
pub struct Console<S: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady> {
    port: S,
    restart_byte: u8,
}

impl<S: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady> Console<S> {
    pub fn new(port: S, settings: &FleetSettings) -> Self {
        Self {
            port,
            restart_byte: settings.restart_byte,
        }
    }

    pub fn port(&self) -> &S {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut S {
        &mut self.port
    }

    /// Take one pending byte without waiting. `None` when nothing is pending.
    pub fn read_byte(&mut self) -> Option<u8> {
        match self.port.read_ready() {
            Ok(true) => {}
            _ => return None,
        }
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    /// Check for a pending operator command.
    pub fn poll_command(&mut self) -> Option<ConsoleCommand> {
        match self.read_byte() {
            Some(b) if b == self.restart_byte => Some(ConsoleCommand::Restart),
            _ => None,
        }
    }

    /// Write text as is. Failures are logged and otherwise ignored.
    pub fn write_str(&mut self, text: &str) {
        if let Err(e) = self.port.write_all(text.as_bytes()) {
            warn!("Console write failed: {:?}", e);
        }
    }

    /// Format and write one buffered record.
    pub fn emit(&mut self, record: &TelemetryRecord) {
        let mut line: heapless::String<LINE_CAPACITY> = heapless::String::new();
        if write!(line, "{}", record).is_err() {
            warn!("Record from slot {} does not fit a console line", record.slot);
            return;
        }
        self.write_str(&line);
    }

    /// Write a decimal value followed by a newline.
    pub fn write_number(&mut self, value: usize) {
        let mut line: heapless::String<24> = heapless::String::new();
        if writeln!(line, "{}", value).is_ok() {
            self.write_str(&line);
        }
    }

    pub fn release(self) -> S {
        self.port
    }
}

/// How the startup prompt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The operator typed a count and pressed Enter.
    Entered(u16),
    /// No digit arrived; use the persisted count.
    NoInput,
}

/// Result of feeding one poll to the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptEvent {
    /// Keep polling.
    Waiting,
    /// A digit was accepted and should be echoed.
    Accepted(u8),
    Finished(PromptOutcome),
}

/// Blocking prompt asking for the device count at boot.
///
/// Up to three digits are collected until newline. If no digit arrives
/// within the window the prompt gives up; once a digit has been typed the
/// window no longer applies.
#[derive(Debug)]
pub struct StartupPrompt {
    digits: heapless::Vec<u8, MAX_DIGITS>,
    polls: u32,
    max_polls: u32,
    poll_ms: u32,
}

impl StartupPrompt {
    pub const TEXT: &'static str = "Enter the receiver number: ";

    pub fn new(settings: &FleetSettings) -> Self {
        let poll_ms = settings.prompt_poll.to_millis().max(1);
        Self {
            digits: heapless::Vec::new(),
            polls: 0,
            max_polls: u32::try_from(settings.prompt_window.to_millis() / poll_ms).unwrap_or(u32::MAX),
            poll_ms: u32::try_from(poll_ms).unwrap_or(u32::MAX),
        }
    }

    fn locked(&self) -> bool {
        !self.digits.is_empty()
    }

    fn finish(&self) -> PromptOutcome {
        if !self.locked() {
            return PromptOutcome::NoInput;
        }
        let value = self
            .digits
            .iter()
            .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
        PromptOutcome::Entered(value)
    }

    /// Advance by one poll, given the byte read during it (if any).
    pub fn feed(&mut self, byte: Option<u8>) -> PromptEvent {
        if byte == Some(b'\n') || (self.polls > self.max_polls && !self.locked()) {
            return PromptEvent::Finished(self.finish());
        }
        self.polls = self.polls.saturating_add(1);

        match byte {
            Some(d) if d.is_ascii_digit() && self.digits.push(d).is_ok() => PromptEvent::Accepted(d),
            _ => PromptEvent::Waiting,
        }
    }

    /// Print the prompt and poll the console until it finishes.
    pub fn run<S, D>(mut self, console: &mut Console<S>, delay: &mut D) -> PromptOutcome
    where
        S: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady,
        D: DelayNs,
    {
        console.write_str(Self::TEXT);
        loop {
            delay.delay_ms(self.poll_ms);
            match self.feed(console.read_byte()) {
                PromptEvent::Waiting => {}
                PromptEvent::Accepted(d) => {
                    let echo = [d, b'\n'];
                    // Digits are ASCII, so this never fails.
                    if let Ok(text) = core::str::from_utf8(&echo) {
                        console.write_str(text);
                    }
                }
                PromptEvent::Finished(outcome) => return outcome,
            }
        }
    }
}
