//! Presentation snapshots derived from decoded records.
//!
//! These are the values a front end shows: labels, derived scales and
//! indicator flags. They carry no protocol state of their own.

use crate::data::ranges::{
    dso_full_scale, dso_range_label, multimeter_range_label, HORIZONTAL_DIVISIONS,
    VERTICAL_DIVISIONS,
};
use crate::protocol::{
    DeviceInfo, DeviceStatus, DsoMetadata, DsoMode, DsoStatus, MultimeterMode, MultimeterReading,
    Range, ReadingFlags,
};

/// Static device details for display.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceDetails {
    /// Firmware version, "major.minor".
    pub firmware: String,
    /// MAC address, colon separated.
    pub mac_address: String,
    /// Maximum input voltage in V.
    pub max_voltage: u16,
    /// Maximum input current in A.
    pub max_current: u16,
    /// Maximum resistance in kOhm.
    pub max_resistance: u16,
    /// Maximum sampling rate in kHz.
    pub max_sampling_rate: u16,
    /// Maximum sample buffer size.
    pub max_buffer_size: u16,
}

impl From<&DeviceInfo> for DeviceDetails {
    fn from(info: &DeviceInfo) -> Self {
        Self {
            firmware: info.firmware_version(),
            mac_address: info.mac_address_string(),
            max_voltage: info.max_voltage,
            max_current: info.max_current,
            max_resistance: info.max_resistance,
            max_sampling_rate: info.max_sampling_rate,
            max_buffer_size: info.max_buffer_size,
        }
    }
}

/// Device status for display.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StatusDisplay {
    /// Device state label ("MM DC Voltage", ...).
    pub state_label: &'static str,
    /// Battery charge, 0.0 to 1.0.
    pub battery_fraction: f32,
    /// Raw battery voltage.
    pub battery_voltage: f32,
    /// Mode switch position label.
    pub mode_switch_label: &'static str,
}

impl From<&DeviceStatus> for StatusDisplay {
    fn from(status: &DeviceStatus) -> Self {
        Self {
            state_label: status.state.label(),
            battery_fraction: status.battery_fraction(),
            battery_voltage: status.battery_voltage,
            mode_switch_label: status.mode_switch.label(),
        }
    }
}

/// Live multimeter display.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MultimeterDisplay {
    /// Measured value.
    pub value: f32,
    /// Mode of the reading.
    pub mode: MultimeterMode,
    /// Range of the reading.
    pub range: Range,
    /// Mode label; "Idle" once readings stop.
    pub mode_label: &'static str,
    /// Range label ("0~300mV", "AUTO", ...).
    pub range_label: &'static str,
    /// Indicator flags.
    pub flags: ReadingFlags,
    /// Whether readings are arriving.
    pub active: bool,
}

impl MultimeterDisplay {
    /// Display for a fresh reading.
    pub fn from_reading(reading: &MultimeterReading) -> Self {
        Self {
            value: reading.value,
            mode: reading.mode,
            range: reading.range,
            mode_label: reading.mode.label(),
            range_label: multimeter_range_label(reading.mode, reading.range),
            flags: reading.flags(),
            active: true,
        }
    }

    /// The same display after readings stopped arriving.
    pub fn idle(&self) -> Self {
        Self {
            mode_label: MultimeterMode::Idle.label(),
            active: false,
            ..self.clone()
        }
    }
}

impl Default for MultimeterDisplay {
    fn default() -> Self {
        Self {
            value: 0.0,
            mode: MultimeterMode::Idle,
            range: Range::AUTO,
            mode_label: MultimeterMode::Idle.label(),
            range_label: multimeter_range_label(MultimeterMode::Idle, Range::AUTO),
            flags: ReadingFlags::default(),
            active: false,
        }
    }
}

/// Oscilloscope axes and status derived from acquisition metadata.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScopeDisplay {
    /// Measurement mode.
    pub mode: DsoMode,
    /// Range code.
    pub range: Range,
    /// Mode label ("VDC", ...).
    pub mode_label: &'static str,
    /// Range label ("0~300mV", ...).
    pub range_label: &'static str,
    /// Sample multiplier.
    pub scale: f32,
    /// Volts (or amperes) per vertical division.
    pub units_per_division: f32,
    /// Milliseconds per horizontal division.
    pub ms_per_division: f32,
    /// Milliseconds between samples.
    pub sample_interval_ms: f32,
    /// Acquisition window in microseconds.
    pub window_us: u32,
    /// Samples in the acquisition.
    pub samples: u16,
    /// Sampling rate in Hz.
    pub sampling_rate: u32,
    /// The meter is acquiring.
    pub sampling: bool,
    /// The meter reported an error.
    pub error: bool,
}

impl ScopeDisplay {
    /// Derive the display from metadata.
    ///
    /// The grid is five horizontal by three vertical divisions.
    pub fn from_metadata(metadata: &DsoMetadata) -> Self {
        let window_ms = metadata.window_us as f32 / 1000.0;
        let sample_interval_ms = if metadata.samples == 0 {
            0.0
        } else {
            window_ms / metadata.samples as f32
        };

        Self {
            mode: metadata.mode,
            range: metadata.range,
            mode_label: metadata.mode.label(),
            range_label: dso_range_label(metadata.mode, metadata.range),
            scale: metadata.scale,
            units_per_division: dso_full_scale(metadata.mode, metadata.range)
                / VERTICAL_DIVISIONS as f32,
            ms_per_division: window_ms / HORIZONTAL_DIVISIONS as f32,
            sample_interval_ms,
            window_us: metadata.window_us,
            samples: metadata.samples,
            sampling_rate: metadata.sampling_rate,
            sampling: metadata.status == DsoStatus::Sampling,
            error: metadata.status == DsoStatus::Error,
        }
    }
}
