//! The two periodic task loops and the time primitives they run on.
//!
//! Both loops wake at `last_wake + period` rather than `now + period`, so a
//! slow tick does not push every later tick back.

use embedded_hal::{delay::DelayNs, digital::OutputPin};
use log::{info, warn};

use crate::{
    bus::FieldBus,
    config::Millis,
    scheduler::{PollingScheduler, TickOutcome},
    supervisor::HealthSupervisor,
};

/// Monotonic millisecond timestamp.
pub type Instant = fugit::Instant<u64, 1, 1000>;

/// Source of monotonic time.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Unconditional controller reset, the equivalent of a power cycle.
pub trait SystemReset {
    fn reset(&mut self) -> !;
}

/// Fixed-rate deadline tracker.
#[derive(Debug, Clone, Copy)]
pub struct Periodic {
    next: Instant,
    period: Millis,
}

impl Periodic {
    /// First deadline is one period after `start`.
    pub fn new(start: Instant, period: Millis) -> Self {
        Self {
            next: start + period,
            period,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.next
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next
    }

    /// Move to the following deadline. Overruns are caught up, not skipped.
    pub fn advance(&mut self) {
        self.next = self.next + self.period;
    }
}

/// Sleep until `deadline`. Returns at once if it has already passed.
pub fn wait_until<C: Clock, D: DelayNs>(clock: &C, delay: &mut D, deadline: Instant) {
    if let Some(remaining) = deadline.checked_duration_since(clock.now()) {
        delay.delay_ms(u32::try_from(remaining.to_millis()).unwrap_or(u32::MAX));
    }
}

/// Polling task body. Only returns by resetting the controller.
pub fn run_polling<B, S, C, D, R, const N: usize, const MAX: usize>(
    scheduler: &mut PollingScheduler<'_, B, S, N, MAX>,
    clock: &C,
    delay: &mut D,
    reset: &mut R,
) -> !
where
    B: FieldBus,
    S: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady,
    C: Clock,
    D: DelayNs,
    R: SystemReset,
{
    let mut periodic = Periodic::new(clock.now(), scheduler.period());
    loop {
        wait_until(clock, delay, periodic.deadline());
        periodic.advance();
        if scheduler.tick() == TickOutcome::RestartRequested {
            info!("Restart requested from console");
            reset.reset();
        }
    }
}

/// One wake-up of the supervision task.
///
/// A due cycle runs before a due timer so that an expiry landing on a cycle
/// boundary still shows the flash for a full period.
pub fn supervise_once<P: OutputPin, const MAX: usize>(
    supervisor: &mut HealthSupervisor<'_, P, MAX>,
    periodic: &mut Periodic,
    now: Instant,
) {
    if periodic.is_due(now) {
        periodic.advance();
        if let Err(e) = supervisor.on_tick(now) {
            warn!("Indicator write failed: {:?}", e);
        }
    }
    if let Err(e) = supervisor.on_timer(now) {
        warn!("Indicator write failed: {:?}", e);
    }
}

/// Next instant the supervision task has work to do.
pub fn supervision_wake<P: OutputPin, const MAX: usize>(
    supervisor: &HealthSupervisor<'_, P, MAX>,
    periodic: &Periodic,
) -> Instant {
    match supervisor.timer_deadline() {
        Some(timer) if timer < periodic.deadline() => timer,
        _ => periodic.deadline(),
    }
}

/// Supervision task body. Never returns.
pub fn run_supervision<P, C, D, const MAX: usize>(
    supervisor: &mut HealthSupervisor<'_, P, MAX>,
    clock: &C,
    delay: &mut D,
) -> !
where
    P: OutputPin,
    C: Clock,
    D: DelayNs,
{
    let mut periodic = Periodic::new(clock.now(), supervisor.period());
    loop {
        wait_until(clock, delay, supervision_wake(supervisor, &periodic));
        supervise_once(supervisor, &mut periodic, clock.now());
    }
}

/// Host clock and delay backed by `std::time`.
#[cfg(not(feature = "no_std"))]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(not(feature = "no_std"))]
impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(not(feature = "no_std"))]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(feature = "no_std"))]
impl Clock for StdClock {
    fn now(&self) -> Instant {
        let elapsed = self.origin.elapsed().as_millis();
        Instant::from_ticks(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }
}

#[cfg(not(feature = "no_std"))]
impl DelayNs for StdClock {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}
