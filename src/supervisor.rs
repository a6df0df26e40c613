//! Debounced fleet-health classification driving the status indicator.
//!
//! A degraded or down fleet must persist for `debounce_threshold` consecutive
//! cycles before the indicator follows. Partial and total outage share one
//! counter, so flapping between them keeps counting; only a fully healthy
//! fleet resets it.
//!
//! The supervisor is the only writer of the indicator. It also owns the
//! confirmation timer, whose expiry the supervision loop delivers through
//! [`HealthSupervisor::on_timer`].

use embedded_hal::digital::OutputPin;
use log::{debug, info};
use strum_macros::{EnumIter, IntoStaticStr};

use crate::{
    config::{FleetSettings, Millis},
    indicator::{ConfirmationTimer, IndicatorColor, StatusIndicator},
    liveness::{DeviceLivenessTable, LivenessSnapshot, MAX_DEVICES},
    runtime::Instant,
};

/// Aggregate health of the configured fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum FleetHealthState {
    AllHealthy,
    PartiallyDegraded,
    FullyDown,
}

impl FleetHealthState {
    /// Classify `alive` answering devices out of `total`.
    pub fn classify(snapshot: LivenessSnapshot) -> Self {
        match snapshot.alive {
            n if n >= snapshot.total => FleetHealthState::AllHealthy,
            0 => FleetHealthState::FullyDown,
            _ => FleetHealthState::PartiallyDegraded,
        }
    }

    pub fn color(self) -> IndicatorColor {
        match self {
            FleetHealthState::AllHealthy => IndicatorColor::Healthy,
            FleetHealthState::PartiallyDegraded => IndicatorColor::Degraded,
            FleetHealthState::FullyDown => IndicatorColor::Outage,
        }
    }
}

pub struct HealthSupervisor<'a, P: OutputPin, const MAX: usize = MAX_DEVICES> {
    liveness: &'a DeviceLivenessTable<MAX>,
    indicator: StatusIndicator<P>,
    timer: ConfirmationTimer,
    period: Millis,
    threshold: u32,
    /// Consecutive cycles spent degraded or down.
    debounce: u32,
    /// State last shown on the indicator.
    reported: Option<FleetHealthState>,
}

impl<'a, P: OutputPin, const MAX: usize> HealthSupervisor<'a, P, MAX> {
    pub fn new(
        liveness: &'a DeviceLivenessTable<MAX>,
        indicator: StatusIndicator<P>,
        settings: &FleetSettings,
    ) -> Self {
        Self {
            liveness,
            indicator,
            timer: ConfirmationTimer::new(settings.confirm_period),
            period: settings.supervise_period,
            threshold: settings.debounce_threshold.max(1),
            debounce: 0,
            reported: None,
        }
    }

    /// Interval between two supervisor cycles.
    pub fn period(&self) -> Millis {
        self.period
    }

    pub fn debounce_count(&self) -> u32 {
        self.debounce
    }

    /// The state currently shown, `None` before the first indicator write.
    pub fn reported(&self) -> Option<FleetHealthState> {
        self.reported
    }

    pub fn indicator(&self) -> &StatusIndicator<P> {
        &self.indicator
    }

    /// When the confirmation timer runs out, if it is running.
    pub fn timer_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// One supervisor cycle: sample liveness, classify, update the indicator.
    ///
    /// Returns the classification observed this cycle, debounced or not.
    pub fn on_tick(&mut self, now: Instant) -> Result<FleetHealthState, P::Error> {
        let snapshot = self.liveness.snapshot();
        let observed = FleetHealthState::classify(snapshot);

        if observed == FleetHealthState::AllHealthy {
            self.debounce = 0;
            self.report(observed, now)?;
            return Ok(observed);
        }

        self.debounce = self.debounce.saturating_add(1);
        debug!(
            "{} of {} devices alive, degraded for {} cycles",
            snapshot.alive, snapshot.total, self.debounce
        );
        if self.debounce >= self.threshold {
            self.report(observed, now)?;
        }
        Ok(observed)
    }

    /// Deliver a timer expiry. Returns whether the confirmation flash was shown.
    pub fn on_timer(&mut self, now: Instant) -> Result<bool, P::Error> {
        if !self.timer.expire(now) {
            return Ok(false);
        }
        self.indicator.show(IndicatorColor::Flash)?;
        Ok(true)
    }

    fn report(&mut self, state: FleetHealthState, now: Instant) -> Result<(), P::Error> {
        if self.reported != Some(state) {
            let name: &'static str = state.into();
            info!("Fleet health now {}", name);
        }
        self.indicator.show(state.color())?;
        self.reported = Some(state);
        self.timer.arm(now);
        Ok(())
    }
}
