//! Multimeter service records.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::protocol::codec::WireRecord;

/// Measurement range code.
///
/// Bands are numbered from 0 upwards within a mode; [`Range::AUTO`] asks the
/// meter to select the band itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Range(pub u8);

impl Range {
    /// Automatic range selection.
    pub const AUTO: Self = Self(255);

    /// Check if this is the automatic range.
    pub fn is_auto(&self) -> bool {
        *self == Self::AUTO
    }

    /// Get the raw range code.
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::AUTO
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_auto() {
            write!(f, "AUTO")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Multimeter measurement function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MultimeterMode {
    /// No measurement.
    #[default]
    Idle = 0,
    /// DC voltage.
    DcVoltage = 1,
    /// AC voltage.
    AcVoltage = 2,
    /// DC current.
    DcCurrent = 3,
    /// AC current.
    AcCurrent = 4,
    /// Resistance.
    Resistance = 5,
    /// Diode test.
    Diode = 6,
    /// Continuity test.
    Continuity = 7,
    /// Temperature.
    Temperature = 8,
}

impl MultimeterMode {
    /// Every mode, in wire order.
    pub const ALL: [Self; 9] = [
        Self::Idle,
        Self::DcVoltage,
        Self::AcVoltage,
        Self::DcCurrent,
        Self::AcCurrent,
        Self::Resistance,
        Self::Diode,
        Self::Continuity,
        Self::Temperature,
    ];

    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Result<Self> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(Error::InvalidEnum {
                field: "multimeter mode",
                value,
            })
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }

    /// Check if this mode measures voltage.
    pub fn is_voltage(&self) -> bool {
        matches!(self, Self::DcVoltage | Self::AcVoltage)
    }

    /// Check if this mode measures current.
    pub fn is_current(&self) -> bool {
        matches!(self, Self::DcCurrent | Self::AcCurrent)
    }

    /// Check if the meter can autorange in this mode.
    pub fn supports_autorange(&self) -> bool {
        self.is_voltage() || self.is_current() || matches!(self, Self::Resistance)
    }

    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::DcVoltage => "DC Voltage",
            Self::AcVoltage => "AC Voltage",
            Self::DcCurrent => "DC Current",
            Self::AcCurrent => "AC Current",
            Self::Resistance => "Resistance",
            Self::Diode => "Diode",
            Self::Continuity => "Continuity",
            Self::Temperature => "Temperature",
        }
    }
}

impl std::fmt::Display for MultimeterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Settings written to the multimeter settings characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MultimeterSettings {
    /// Measurement function.
    pub mode: MultimeterMode,
    /// Range code.
    pub range: Range,
    /// Reading update interval in milliseconds.
    pub update_interval_ms: u32,
}

impl WireRecord for MultimeterSettings {
    const NAME: &'static str = "MultimeterSettings";
    const SIZE: usize = 6;

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.mode.to_raw());
        buf.put_u8(self.range.0);
        buf.put_u32_le(self.update_interval_ms);
    }

    fn read_fields<B: Buf>(buf: &mut B) -> Result<Self> {
        let mode = MultimeterMode::from_raw(buf.get_u8())?;
        let range = Range(buf.get_u8());
        let update_interval_ms = buf.get_u32_le();
        Ok(Self {
            mode,
            range,
            update_interval_ms,
        })
    }
}

/// Reading status byte meaning a normal reading.
pub const READING_STATUS_OK: u8 = 0;
/// Reading status byte meaning autorange (or continuity) is active.
pub const READING_STATUS_ACTIVE: u8 = 1;
/// Reading status byte meaning the meter reported an error.
pub const READING_STATUS_ERROR: u8 = 255;

/// Indicator flags derived from a reading's status and mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadingFlags {
    /// The meter is autoranging.
    pub autorange: bool,
    /// Continuity detected.
    pub continuity: bool,
    /// The meter reported an error.
    pub error: bool,
}

/// Reading notified by the multimeter reading characteristic.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MultimeterReading {
    /// Status byte; its meaning depends on `mode`.
    pub status: u8,
    /// Measured value.
    pub value: f32,
    /// Mode the reading was taken in.
    pub mode: MultimeterMode,
    /// Range the reading was taken in.
    pub range: Range,
}

impl MultimeterReading {
    /// Derive indicator flags from the status byte.
    ///
    /// The active status means autorange for voltage, current and resistance
    /// readings, and continuity for continuity readings. It carries no
    /// meaning for the other modes.
    pub fn flags(&self) -> ReadingFlags {
        let active = self.status == READING_STATUS_ACTIVE;
        ReadingFlags {
            autorange: active && self.mode.supports_autorange(),
            continuity: active && self.mode == MultimeterMode::Continuity,
            error: self.status == READING_STATUS_ERROR,
        }
    }
}

impl WireRecord for MultimeterReading {
    const NAME: &'static str = "MultimeterReading";
    const SIZE: usize = 7;

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.status);
        buf.put_f32_le(self.value);
        buf.put_u8(self.mode.to_raw());
        buf.put_u8(self.range.0);
    }

    fn read_fields<B: Buf>(buf: &mut B) -> Result<Self> {
        let status = buf.get_u8();
        let value = buf.get_f32_le();
        let mode = MultimeterMode::from_raw(buf.get_u8())?;
        let range = Range(buf.get_u8());
        Ok(Self {
            status,
            value,
            mode,
            range,
        })
    }
}
