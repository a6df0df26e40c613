//! Tri-colour status indicator and its one-shot confirmation timer.
//!
//! The LED channels are wired active-low: driving a pin low lights the
//! channel. Everything above [`StatusIndicator`] speaks in lit/dark terms.

use embedded_hal::digital::OutputPin;
use modular_bitfield::prelude::*;
use strum_macros::{EnumIter, IntoStaticStr};

use crate::{config::Millis, runtime::Instant};

/// Which channels are lit, packed into one byte.
#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLevels {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    #[skip]
    __: B5,
}

impl ChannelLevels {
    /// Build a pattern from lit flags.
    pub fn lit(red: bool, green: bool, blue: bool) -> Self {
        Self::new()
            .with_red(red)
            .with_green(green)
            .with_blue(blue)
    }
}

/// Every pattern the firmware shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum IndicatorColor {
    /// Every device answered.
    Healthy,
    /// Some devices are missing.
    Degraded,
    /// No device answers.
    Outage,
    /// Confirmation flash: all channels dark for one timer period.
    Flash,
    /// Lit half of the fatal configuration blink.
    ConfigFault,
}

impl IndicatorColor {
    pub fn levels(self) -> ChannelLevels {
        match self {
            IndicatorColor::Healthy => ChannelLevels::lit(false, true, false),
            IndicatorColor::Degraded => ChannelLevels::lit(true, true, false),
            IndicatorColor::Outage => ChannelLevels::lit(true, false, false),
            IndicatorColor::Flash => ChannelLevels::lit(false, false, false),
            IndicatorColor::ConfigFault => ChannelLevels::lit(false, false, true),
        }
    }
}

/// Three active-low output lines.
pub struct StatusIndicator<P: OutputPin> {
    red: P,
    green: P,
    blue: P,
    shown: Option<ChannelLevels>,
}

impl<P: OutputPin> StatusIndicator<P> {
    pub fn new(red: P, green: P, blue: P) -> Self {
        Self {
            red,
            green,
            blue,
            shown: None,
        }
    }

    /// Drive all three lines to `color`.
    pub fn show(&mut self, color: IndicatorColor) -> Result<(), P::Error> {
        self.apply(color.levels())
    }

    pub fn apply(&mut self, levels: ChannelLevels) -> Result<(), P::Error> {
        drive(&mut self.red, levels.red())?;
        drive(&mut self.green, levels.green())?;
        drive(&mut self.blue, levels.blue())?;
        self.shown = Some(levels);
        Ok(())
    }

    /// Last pattern written, if any.
    pub fn shown(&self) -> Option<ChannelLevels> {
        self.shown
    }

    pub fn release(self) -> (P, P, P) {
        (self.red, self.green, self.blue)
    }
}

fn drive<P: OutputPin>(pin: &mut P, lit: bool) -> Result<(), P::Error> {
    if lit { pin.set_low() } else { pin.set_high() }
}

/// One-shot countdown that forces the confirmation flash on expiry.
///
/// Arming a running timer does nothing; it does not repeat.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationTimer {
    period: Millis,
    deadline: Option<Instant>,
}

impl ConfirmationTimer {
    pub const fn new(period: Millis) -> Self {
        Self {
            period,
            deadline: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Start the countdown unless it is already running. Returns whether it started.
    pub fn arm(&mut self, now: Instant) -> bool {
        if self.is_running() {
            return false;
        }
        self.deadline = Some(now + self.period);
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Stop the timer if it has run out at `now`, reporting the expiry once.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Alternates the config-fault pattern with all channels dark.
#[derive(Debug, Default)]
pub struct FatalBlink {
    lit: bool,
}

impl FatalBlink {
    pub const fn new() -> Self {
        Self { lit: false }
    }

    /// Next half period of the blink.
    pub fn step(&mut self) -> IndicatorColor {
        self.lit = !self.lit;
        if self.lit {
            IndicatorColor::ConfigFault
        } else {
            IndicatorColor::Flash
        }
    }
}
