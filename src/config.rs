//! Engine configuration.

use std::time::Duration;

use crate::protocol::DsoSettings;

/// Default multimeter reading update interval.
pub const DEFAULT_MULTIMETER_UPDATE_INTERVAL_MS: u32 = 200;
/// Default oscilloscope acquisition window.
pub const DEFAULT_DSO_WINDOW_US: u32 = 100_000;
/// Default oscilloscope sample count.
pub const DEFAULT_DSO_SAMPLES: u16 = 1000;
/// Default reading idle timeout for both services.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(500);
/// Default scan duration.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(30);
/// Default number of scaled samples kept in the waveform trace.
pub const DEFAULT_WAVEFORM_CAPACITY: usize = 8192;

/// Configuration for a [`Session`](crate::Session).
///
/// Build one with [`Config::default`] and the `with_*` setters.
///
/// # Example
///
/// ```
/// use pokit_ble::Config;
/// use std::time::Duration;
///
/// let config = Config::default()
///     .with_dso_samples(20_000)
///     .with_scan_duration(Duration::from_secs(10));
/// assert_eq!(config.dso_samples, 8192);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Interval the meter is asked to send multimeter readings at.
    pub multimeter_update_interval_ms: u32,
    /// Oscilloscope acquisition window in microseconds.
    pub dso_window_us: u32,
    /// Oscilloscope sample count, 1 to 8192.
    pub dso_samples: u16,
    /// Oscilloscope trigger level in physical units.
    pub dso_trigger_level: f32,
    /// Multimeter readings older than this reset the display to idle.
    pub multimeter_idle_timeout: Duration,
    /// Oscilloscope blocks older than this mark acquisition as stopped.
    pub dso_idle_timeout: Duration,
    /// How long a scan runs before it is stopped.
    pub scan_duration: Duration,
    /// Capacity of the waveform trace.
    pub waveform_capacity: usize,
    /// Only report peripherals whose name contains this string.
    pub name_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            multimeter_update_interval_ms: DEFAULT_MULTIMETER_UPDATE_INTERVAL_MS,
            dso_window_us: DEFAULT_DSO_WINDOW_US,
            dso_samples: DEFAULT_DSO_SAMPLES,
            dso_trigger_level: 0.0,
            multimeter_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            dso_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            scan_duration: DEFAULT_SCAN_DURATION,
            waveform_capacity: DEFAULT_WAVEFORM_CAPACITY,
            name_filter: None,
        }
    }
}

impl Config {
    /// Set the multimeter update interval.
    pub fn with_multimeter_update_interval(mut self, interval_ms: u32) -> Self {
        self.multimeter_update_interval_ms = interval_ms;
        self
    }

    /// Set the oscilloscope acquisition window.
    pub fn with_dso_window(mut self, window_us: u32) -> Self {
        self.dso_window_us = window_us;
        self
    }

    /// Set the oscilloscope sample count, clamped to 1..=8192.
    pub fn with_dso_samples(mut self, samples: u16) -> Self {
        self.dso_samples = clamp_samples(samples);
        self
    }

    /// Set the oscilloscope trigger level.
    pub fn with_dso_trigger_level(mut self, level: f32) -> Self {
        self.dso_trigger_level = level;
        self
    }

    /// Set both reading idle timeouts.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.multimeter_idle_timeout = timeout;
        self.dso_idle_timeout = timeout;
        self
    }

    /// Set the scan duration.
    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Set the waveform trace capacity.
    pub fn with_waveform_capacity(mut self, capacity: usize) -> Self {
        self.waveform_capacity = capacity;
        self
    }

    /// Only report peripherals whose name contains `filter`.
    pub fn with_name_filter(mut self, filter: impl Into<String>) -> Self {
        self.name_filter = Some(filter.into());
        self
    }

    /// Sample count actually sent to the meter.
    ///
    /// Fields may have been set directly, so the clamp is applied again here.
    pub fn effective_dso_samples(&self) -> u16 {
        clamp_samples(self.dso_samples)
    }

    /// Check a peripheral name against the name filter.
    ///
    /// Unnamed peripherals never match.
    pub fn accepts_name(&self, name: Option<&str>) -> bool {
        match (name, &self.name_filter) {
            (None, _) => false,
            (Some(name), _) if name.is_empty() => false,
            (Some(_), None) => true,
            (Some(name), Some(filter)) => name.contains(filter.as_str()),
        }
    }
}

fn clamp_samples(samples: u16) -> u16 {
    samples.clamp(1, DsoSettings::MAX_SAMPLES)
}
