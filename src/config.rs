//! Firmware tunables and the persisted device count.

use fugit::Duration;
use log::{debug, info};

use crate::{error::ConfigError, liveness::MAX_DEVICES};

/// Millisecond duration used for every period in the firmware.
pub type Millis = Duration<u64, 1, 1000>;

/// Namespace the two configuration keys live under.
pub const CONFIG_NAMESPACE: &str = "storage";
/// Key of the validity sentinel.
pub const SENTINEL_KEY: &str = "halfword";
/// Key of the device count.
pub const DEVICE_COUNT_KEY: &str = "receiver_count";
/// Sentinel value marking a valid persisted configuration.
pub const CONFIG_MAGIC: u16 = 0x1234;

/// Every tunable of the polling and supervision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetSettings {
    /// Interval between two polling ticks.
    pub poll_period: Millis,
    /// Interval between two supervisor cycles.
    pub supervise_period: Millis,
    /// Length of the one-shot confirmation timer.
    pub confirm_period: Millis,
    /// A buffered record is emitted every `emit_period` polling ticks.
    pub emit_period: u8,
    /// Consecutive degraded cycles before the indicator reacts.
    pub debounce_threshold: u32,
    /// Console byte that triggers an immediate reset.
    pub restart_byte: u8,
    /// How long the startup prompt waits for a first digit.
    pub prompt_window: Millis,
    /// Console poll interval while prompting.
    pub prompt_poll: Millis,
    /// Half period of the fatal configuration blink.
    pub blink_half_period: Millis,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            poll_period: Millis::millis(200),
            supervise_period: Millis::millis(500),
            confirm_period: Millis::millis(1000),
            emit_period: 8,
            debounce_threshold: 6,
            restart_byte: b'\n',
            prompt_window: Millis::millis(7000),
            prompt_poll: Millis::millis(10),
            blink_half_period: Millis::millis(150),
        }
    }
}

/// Persistent key-value storage holding unsigned 16-bit values.
///
/// Keys are grouped under namespaces; the same key in two namespaces names
/// two values. Writes become durable on [`KeyValueStore::commit`].
pub trait KeyValueStore {
    type Error: core::fmt::Debug;

    fn get_u16(&self, namespace: &str, key: &str) -> Option<u16>;

    fn set_u16(
        &mut self,
        namespace: &'static str,
        key: &'static str,
        value: u16,
    ) -> Result<(), Self::Error>;

    fn commit(&mut self) -> Result<(), Self::Error>;
}

/// The two persisted values, as read back from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedConfig {
    pub sentinel: u16,
    pub device_count: u16,
}

impl PersistedConfig {
    /// Trust the count only when the sentinel matches and the count fits `1..=max`.
    pub fn validate<E: core::fmt::Debug>(&self, max: usize) -> Result<usize, ConfigError<E>> {
        if self.sentinel != CONFIG_MAGIC {
            return Err(ConfigError::SentinelMismatch {
                found: self.sentinel,
            });
        }
        validate_count(self.device_count as usize, max)
    }
}

/// Check an operator- or storage-supplied device count against the capacity.
pub fn validate_count<E: core::fmt::Debug>(count: usize, max: usize) -> Result<usize, ConfigError<E>> {
    match count {
        0 => Err(ConfigError::ZeroCount),
        n if n > max => Err(ConfigError::TooManyDevices { count: n, max }),
        n => Ok(n),
    }
}

/// Reads and writes the persisted device count through a [`KeyValueStore`].
pub struct ConfigStore<K: KeyValueStore> {
    store: K,
    max_devices: usize,
}

impl<K: KeyValueStore> ConfigStore<K> {
    pub fn new(store: K) -> Self {
        Self {
            store,
            max_devices: MAX_DEVICES,
        }
    }

    /// Use a capacity other than [`MAX_DEVICES`].
    pub fn with_max_devices(mut self, max_devices: usize) -> Self {
        self.max_devices = max_devices;
        self
    }

    pub fn max_devices(&self) -> usize {
        self.max_devices
    }

    /// Read back both values. Missing keys read as zero.
    pub fn read(&self) -> PersistedConfig {
        PersistedConfig {
            sentinel: self.store.get_u16(CONFIG_NAMESPACE, SENTINEL_KEY).unwrap_or(0),
            device_count: self.store.get_u16(CONFIG_NAMESPACE, DEVICE_COUNT_KEY).unwrap_or(0),
        }
    }

    /// Read and validate the persisted device count.
    pub fn load(&self) -> Result<usize, ConfigError<K::Error>> {
        let persisted = self.read();
        debug!(
            "Persisted config: sentinel {:#06x}, count {}",
            persisted.sentinel, persisted.device_count
        );
        persisted.validate(self.max_devices)
    }

    /// Validate `count`, then write the sentinel and count and commit.
    pub fn save(&mut self, count: usize) -> Result<(), ConfigError<K::Error>> {
        let count = validate_count(count, self.max_devices)?;
        self.store
            .set_u16(CONFIG_NAMESPACE, SENTINEL_KEY, CONFIG_MAGIC)
            .map_err(ConfigError::Storage)?;
        self.store
            .set_u16(CONFIG_NAMESPACE, DEVICE_COUNT_KEY, count as u16)
            .map_err(ConfigError::Storage)?;
        self.store.commit().map_err(ConfigError::Storage)?;
        info!("Persisted device count {}", count);
        Ok(())
    }

    pub fn into_inner(self) -> K {
        self.store
    }
}

/// Failure of the in-memory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStoreError {
    /// No room for another key.
    Full,
}

/// Namespace, key and value of one stored entry.
type Entry = (&'static str, &'static str, u16);

/// RAM-backed [`KeyValueStore`] with NVS-like commit semantics.
///
/// Staged writes are visible to reads at once but only survive
/// [`MemoryStore::power_cycle`] after a commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore<const N: usize = 8> {
    staged: heapless::Vec<Entry, N>,
    committed: heapless::Vec<Entry, N>,
}

impl<const N: usize> MemoryStore<N> {
    pub const fn new() -> Self {
        Self {
            staged: heapless::Vec::new(),
            committed: heapless::Vec::new(),
        }
    }

    /// Drop every uncommitted write, as a reboot would.
    pub fn power_cycle(&mut self) {
        self.staged = self.committed.clone();
    }

    /// Overwrite a value and commit it in one go, bypassing validation.
    pub fn preload(
        &mut self,
        namespace: &'static str,
        key: &'static str,
        value: u16,
    ) -> Result<(), MemoryStoreError> {
        self.set_u16(namespace, key, value)?;
        self.commit()
    }
}

impl<const N: usize> KeyValueStore for MemoryStore<N> {
    type Error = MemoryStoreError;

    fn get_u16(&self, namespace: &str, key: &str) -> Option<u16> {
        self.staged
            .iter()
            .find(|(ns, k, _)| *ns == namespace && *k == key)
            .map(|(_, _, v)| *v)
    }

    fn set_u16(
        &mut self,
        namespace: &'static str,
        key: &'static str,
        value: u16,
    ) -> Result<(), Self::Error> {
        if let Some(entry) = self
            .staged
            .iter_mut()
            .find(|(ns, k, _)| *ns == namespace && *k == key)
        {
            entry.2 = value;
            return Ok(());
        }
        self.staged
            .push((namespace, key, value))
            .map_err(|_| MemoryStoreError::Full)
    }

    fn commit(&mut self) -> Result<(), Self::Error> {
        self.committed = self.staged.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store whose writes always fail, to check error propagation.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        type Error = &'static str;

        fn get_u16(&self, _namespace: &str, _key: &str) -> Option<u16> {
            None
        }

        fn set_u16(
            &mut self,
            _namespace: &'static str,
            _key: &'static str,
            _value: u16,
        ) -> Result<(), Self::Error> {
            Err("flash write failed")
        }

        fn commit(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn round_trip_after_power_cycle() {
        let mut config = ConfigStore::new(MemoryStore::<4>::new());
        config.save(12).unwrap();

        let mut store = config.into_inner();
        store.power_cycle();
        let config = ConfigStore::new(store);

        assert_eq!(
            config.read(),
            PersistedConfig {
                sentinel: CONFIG_MAGIC,
                device_count: 12
            }
        );
        assert_eq!(config.load(), Ok(12));
    }

    #[test]
    fn uncommitted_writes_are_lost() {
        let mut store = MemoryStore::<4>::new();
        store.set_u16(CONFIG_NAMESPACE, SENTINEL_KEY, CONFIG_MAGIC).unwrap();
        store.set_u16(CONFIG_NAMESPACE, DEVICE_COUNT_KEY, 3).unwrap();
        assert_eq!(store.get_u16(CONFIG_NAMESPACE, DEVICE_COUNT_KEY), Some(3));

        store.power_cycle();
        assert_eq!(store.get_u16(CONFIG_NAMESPACE, DEVICE_COUNT_KEY), None);
        assert_eq!(
            ConfigStore::new(store).load(),
            Err(ConfigError::SentinelMismatch { found: 0 })
        );
    }

    #[test]
    fn sentinel_mismatch_and_zero_count() {
        let mut store = MemoryStore::<4>::new();
        store.preload(CONFIG_NAMESPACE, SENTINEL_KEY, 0xFFFF).unwrap();
        store.preload(CONFIG_NAMESPACE, DEVICE_COUNT_KEY, 5).unwrap();
        assert_eq!(
            ConfigStore::new(store.clone()).load(),
            Err(ConfigError::SentinelMismatch { found: 0xFFFF })
        );

        store.preload(CONFIG_NAMESPACE, SENTINEL_KEY, CONFIG_MAGIC).unwrap();
        store.preload(CONFIG_NAMESPACE, DEVICE_COUNT_KEY, 0).unwrap();
        assert_eq!(ConfigStore::new(store).load(), Err(ConfigError::ZeroCount));
    }

    #[test]
    fn count_above_capacity_is_rejected() {
        let mut config = ConfigStore::new(MemoryStore::<4>::new()).with_max_devices(10);
        assert_eq!(
            config.save(11),
            Err(ConfigError::TooManyDevices { count: 11, max: 10 })
        );
        // Nothing was written.
        assert_eq!(config.read().sentinel, 0);
    }

    #[test]
    fn keys_outside_the_config_namespace_are_ignored() {
        let mut store = MemoryStore::<4>::new();
        store.preload("calibration", SENTINEL_KEY, CONFIG_MAGIC).unwrap();
        store.preload("calibration", DEVICE_COUNT_KEY, 4).unwrap();
        assert_eq!(
            ConfigStore::new(store.clone()).load(),
            Err(ConfigError::SentinelMismatch { found: 0 })
        );

        let mut config = ConfigStore::new(store);
        config.save(2).unwrap();
        let store = config.into_inner();
        assert_eq!(store.get_u16(CONFIG_NAMESPACE, DEVICE_COUNT_KEY), Some(2));
        assert_eq!(store.get_u16("calibration", DEVICE_COUNT_KEY), Some(4));
    }

    #[test]
    fn storage_failure_is_propagated() {
        let mut config = ConfigStore::new(BrokenStore);
        assert_eq!(
            config.save(2),
            Err(ConfigError::Storage("flash write failed"))
        );
    }

    #[test]
    fn defaults_match_firmware_timing() {
        let settings = FleetSettings::default();
        assert_eq!(settings.poll_period.to_millis(), 200);
        assert_eq!(settings.supervise_period.to_millis(), 500);
        assert_eq!(settings.confirm_period.to_millis(), 1000);
        assert_eq!(settings.emit_period, 8);
        assert_eq!(settings.debounce_threshold, 6);
        assert_eq!(settings.restart_byte, b'\n');
    }
}
