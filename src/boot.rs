//! Boot sequence: device count resolution and scheduler construction.
//!
//! The field bus is only handed to a scheduler once the configuration is
//! known to be valid; a bad configuration never reaches the bus.

use embedded_hal::{delay::DelayNs, digital::OutputPin};
use log::{error, info, warn};

use crate::{
    bus::FieldBus,
    config::{ConfigStore, FleetSettings, KeyValueStore, validate_count},
    console::{Console, PromptOutcome, StartupPrompt},
    error::BootError,
    indicator::{FatalBlink, StatusIndicator},
    liveness::DeviceLivenessTable,
    scheduler::PollingScheduler,
};

/// Where the device count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSource {
    Operator,
    Persisted,
}

/// Ask the operator for a device count, falling back to the persisted one.
///
/// An entered count is validated and persisted before it is used.
pub fn resolve_device_count<S, K, D>(
    console: &mut Console<S>,
    config: &mut ConfigStore<K>,
    delay: &mut D,
    settings: &FleetSettings,
) -> Result<(usize, CountSource), BootError<K::Error>>
where
    S: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady,
    K: KeyValueStore,
    D: DelayNs,
{
    match StartupPrompt::new(settings).run(console, delay) {
        PromptOutcome::Entered(value) => {
            let count = validate_count::<K::Error>(usize::from(value), config.max_devices())?;
            console.write_number(count);
            config.save(count)?;
            Ok((count, CountSource::Operator))
        }
        PromptOutcome::NoInput => {
            let count = config.load()?;
            console.write_number(count);
            Ok((count, CountSource::Persisted))
        }
    }
}

/// Resolve the configuration, size the liveness table and build the scheduler.
pub fn bring_up<'a, B, S, K, D, const N: usize, const MAX: usize>(
    liveness: &'a DeviceLivenessTable<MAX>,
    mut console: Console<S>,
    config: &mut ConfigStore<K>,
    delay: &mut D,
    bus: B,
    settings: &FleetSettings,
) -> Result<PollingScheduler<'a, B, S, N, MAX>, BootError<K::Error>>
where
    B: FieldBus,
    S: embedded_io::Read + embedded_io::Write + embedded_io::ReadReady,
    K: KeyValueStore,
    D: DelayNs,
{
    let (count, source) = match resolve_device_count(&mut console, config, delay, settings) {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("Boot aborted: {}", e);
            return Err(e);
        }
    };
    liveness.configure::<K::Error>(count)?;
    info!("Polling {} devices ({:?} count)", count, source);
    Ok(PollingScheduler::new(bus, console, liveness, settings))
}

/// Signal an invalid configuration forever. Polling and supervision never start.
pub fn fatal_blink<P: OutputPin, D: DelayNs>(
    indicator: &mut StatusIndicator<P>,
    delay: &mut D,
    settings: &FleetSettings,
) -> ! {
    let half_period = u32::try_from(settings.blink_half_period.to_millis()).unwrap_or(u32::MAX);
    let mut blink = FatalBlink::new();
    loop {
        delay.delay_ms(half_period);
        if let Err(e) = indicator.show(blink.step()) {
            warn!("Indicator write failed: {:?}", e);
        }
    }
}
