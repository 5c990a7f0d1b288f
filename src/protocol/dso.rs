//! Oscilloscope (DSO) service records.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::protocol::codec::WireRecord;
use crate::protocol::multimeter::Range;

/// Acquisition trigger policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DsoCommand {
    /// Acquire without waiting for a trigger.
    FreeRunning = 0,
    /// Trigger on a rising edge through the trigger level.
    RisingEdge = 1,
    /// Trigger on a falling edge through the trigger level.
    #[default]
    FallingEdge = 2,
    /// Resend the last acquisition.
    Resend = 3,
    /// Acquire continuously.
    Continuous = 5,
}

impl DsoCommand {
    /// Create from raw byte value.
    ///
    /// Value 4 is an undocumented spare and is rejected like any other
    /// unknown value.
    pub fn from_raw(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::FreeRunning),
            1 => Ok(Self::RisingEdge),
            2 => Ok(Self::FallingEdge),
            3 => Ok(Self::Resend),
            5 => Ok(Self::Continuous),
            _ => Err(Error::InvalidEnum {
                field: "oscilloscope command",
                value,
            }),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }

    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FreeRunning => "Free running",
            Self::RisingEdge => "Rising edge",
            Self::FallingEdge => "Falling edge",
            Self::Resend => "Resend",
            Self::Continuous => "Continuous",
        }
    }
}

impl std::fmt::Display for DsoCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Oscilloscope measurement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DsoMode {
    /// Stopped.
    #[default]
    Idle = 0,
    /// DC voltage.
    Vdc = 1,
    /// AC voltage.
    Vac = 2,
    /// DC current.
    Adc = 3,
    /// AC current.
    Aac = 4,
}

impl DsoMode {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Idle),
            1 => Ok(Self::Vdc),
            2 => Ok(Self::Vac),
            3 => Ok(Self::Adc),
            4 => Ok(Self::Aac),
            _ => Err(Error::InvalidEnum {
                field: "oscilloscope mode",
                value,
            }),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }

    /// Check if this mode measures voltage.
    pub fn is_voltage(&self) -> bool {
        matches!(self, Self::Vdc | Self::Vac)
    }

    /// Check if this mode measures current.
    pub fn is_current(&self) -> bool {
        matches!(self, Self::Adc | Self::Aac)
    }

    /// Short label ("VDC", "AAC", ...).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Vdc => "VDC",
            Self::Vac => "VAC",
            Self::Adc => "ADC",
            Self::Aac => "AAC",
        }
    }

    /// Long description ("DC Voltage", ...).
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Vdc => "DC Voltage",
            Self::Vac => "AC Voltage",
            Self::Adc => "DC Current",
            Self::Aac => "AC Current",
        }
    }
}

impl std::fmt::Display for DsoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Acquisition status reported in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DsoStatus {
    /// Acquisition complete.
    Done = 0,
    /// Acquisition in progress.
    Sampling = 1,
    /// Acquisition failed.
    Error = 255,
}

impl DsoStatus {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Done),
            1 => Ok(Self::Sampling),
            255 => Ok(Self::Error),
            _ => Err(Error::InvalidEnum {
                field: "oscilloscope status",
                value,
            }),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }
}

/// Settings written to the oscilloscope settings characteristic.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DsoSettings {
    /// Trigger policy.
    pub command: DsoCommand,
    /// Trigger level in physical units.
    pub trigger_level: f32,
    /// Measurement mode; [`DsoMode::Idle`] stops acquisition.
    pub mode: DsoMode,
    /// Range code.
    pub range: Range,
    /// Acquisition window in microseconds.
    pub window_us: u32,
    /// Number of samples, 1 to 8192.
    pub samples: u16,
}

impl DsoSettings {
    /// Largest sample count the meter accepts.
    pub const MAX_SAMPLES: u16 = 8192;
}

impl WireRecord for DsoSettings {
    const NAME: &'static str = "DsoSettings";
    const SIZE: usize = 13;

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.command.to_raw());
        buf.put_f32_le(self.trigger_level);
        buf.put_u8(self.mode.to_raw());
        buf.put_u8(self.range.0);
        buf.put_u32_le(self.window_us);
        buf.put_u16_le(self.samples);
    }

    fn read_fields<B: Buf>(buf: &mut B) -> Result<Self> {
        let command = DsoCommand::from_raw(buf.get_u8())?;
        let trigger_level = buf.get_f32_le();
        let mode = DsoMode::from_raw(buf.get_u8())?;
        let range = Range(buf.get_u8());
        let window_us = buf.get_u32_le();
        let samples = buf.get_u16_le();
        Ok(Self {
            command,
            trigger_level,
            mode,
            range,
            window_us,
            samples,
        })
    }
}

/// Metadata notified ahead of each acquisition's sample blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DsoMetadata {
    /// Acquisition status.
    pub status: DsoStatus,
    /// Multiplier converting raw samples to physical units.
    pub scale: f32,
    /// Measurement mode.
    pub mode: DsoMode,
    /// Range code.
    pub range: Range,
    /// Acquisition window in microseconds.
    pub window_us: u32,
    /// Number of samples in the acquisition.
    pub samples: u16,
    /// Sampling rate in Hz.
    pub sampling_rate: u32,
    /// Undocumented trailing bytes.
    pub spare: [u8; 5],
}

impl WireRecord for DsoMetadata {
    const NAME: &'static str = "DsoMetadata";
    const SIZE: usize = 22;

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.status.to_raw());
        buf.put_f32_le(self.scale);
        buf.put_u8(self.mode.to_raw());
        buf.put_u8(self.range.0);
        buf.put_u32_le(self.window_us);
        buf.put_u16_le(self.samples);
        buf.put_u32_le(self.sampling_rate);
        buf.put_slice(&self.spare);
    }

    fn read_fields<B: Buf>(buf: &mut B) -> Result<Self> {
        let status = DsoStatus::from_raw(buf.get_u8())?;
        let scale = buf.get_f32_le();
        let mode = DsoMode::from_raw(buf.get_u8())?;
        let range = Range(buf.get_u8());
        let window_us = buf.get_u32_le();
        let samples = buf.get_u16_le();
        let sampling_rate = buf.get_u32_le();
        let mut spare = [0u8; 5];
        buf.copy_to_slice(&mut spare);
        Ok(Self {
            status,
            scale,
            mode,
            range,
            window_us,
            samples,
            sampling_rate,
            spare,
        })
    }
}

/// A block of raw oscilloscope samples.
///
/// The characteristic declares room for [`DsoReading::CAPACITY`] samples but
/// the meter usually sends fewer; the sample count is always taken from the
/// received payload length.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DsoReading {
    samples: Vec<i16>,
}

impl DsoReading {
    /// Declared sample capacity of one reading.
    pub const CAPACITY: usize = 88;
    /// Declared capacity in bytes.
    pub const CAPACITY_BYTES: usize = Self::CAPACITY * 2;

    /// Create a reading, keeping at most [`DsoReading::CAPACITY`] samples.
    pub fn new(mut samples: Vec<i16>) -> Self {
        samples.truncate(Self::CAPACITY);
        Self { samples }
    }

    /// The raw samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the reading carries no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples multiplied by an acquisition scale.
    pub fn scaled(&self, scale: f32) -> Vec<f32> {
        self.samples.iter().map(|&s| s as f32 * scale).collect()
    }

    /// Decode a sample block.
    ///
    /// Any even length up to [`DsoReading::CAPACITY_BYTES`] is valid.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() % 2 != 0 || data.len() > Self::CAPACITY_BYTES {
            return Err(Error::InvalidLength {
                record: "DsoReading",
                actual: data.len(),
            });
        }

        let mut buf = data;
        let mut samples = Vec::with_capacity(data.len() / 2);
        while buf.has_remaining() {
            samples.push(buf.get_i16_le());
        }
        Ok(Self { samples })
    }

    /// Encode the samples.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for &sample in &self.samples {
            out.put_i16_le(sample);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_settings_layout() {
        let settings = DsoSettings {
            command: DsoCommand::FallingEdge,
            trigger_level: 0.0,
            mode: DsoMode::Vdc,
            range: Range(0),
            window_us: 100_000,
            samples: 1000,
        };
        assert_eq!(
            settings.encode(),
            vec![2, 0, 0, 0, 0, 1, 0, 0xA0, 0x86, 0x01, 0x00, 0xE8, 0x03]
        );
    }

    #[test]
    fn test_command_spare_rejected() {
        assert!(DsoCommand::from_raw(4).is_err());
        assert_eq!(DsoCommand::from_raw(5).unwrap(), DsoCommand::Continuous);
    }

    #[test]
    fn test_metadata_layout() {
        let mut data = vec![1u8];
        data.extend_from_slice(&0.5f32.to_le_bytes());
        data.extend_from_slice(&[3, 2]);
        data.extend_from_slice(&100_000u32.to_le_bytes());
        data.extend_from_slice(&1000u16.to_le_bytes());
        data.extend_from_slice(&10_000u32.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3, 4, 5]);

        let metadata = DsoMetadata::decode(&data).unwrap();
        assert_eq!(metadata.status, DsoStatus::Sampling);
        assert_eq!(metadata.scale, 0.5);
        assert_eq!(metadata.mode, DsoMode::Adc);
        assert_eq!(metadata.range, Range(2));
        assert_eq!(metadata.window_us, 100_000);
        assert_eq!(metadata.samples, 1000);
        assert_eq!(metadata.sampling_rate, 10_000);
        assert_eq!(metadata.spare, [1, 2, 3, 4, 5]);
        assert_eq!(metadata.encode(), data);
    }

    #[test]
    fn test_metadata_status_error() {
        let mut data = vec![255u8];
        data.extend_from_slice(&[0; 21]);
        assert_eq!(
            DsoMetadata::decode(&data).unwrap().status,
            DsoStatus::Error
        );

        data[0] = 2;
        assert!(DsoMetadata::decode(&data).is_err());
    }

    #[test]
    fn test_reading_uses_received_length() {
        let data: Vec<u8> = (0..44).collect();
        let reading = DsoReading::decode(&data).unwrap();
        assert_eq!(reading.len(), 22);
        assert_eq!(reading.samples()[0], i16::from_le_bytes([0, 1]));
    }

    #[test]
    fn test_reading_length_limits() {
        assert!(DsoReading::decode(&[]).unwrap().is_empty());
        assert_eq!(DsoReading::decode(&[0u8; 176]).unwrap().len(), 88);
        assert!(matches!(
            DsoReading::decode(&[0u8; 178]),
            Err(Error::InvalidLength { actual: 178, .. })
        ));
        assert!(DsoReading::decode(&[0u8; 3]).is_err());
    }

    #[test]
    fn test_reading_scaled() {
        let reading = DsoReading::new(vec![100, -50, 0]);
        assert_eq!(reading.scaled(2.0), vec![200.0, -100.0, 0.0]);
    }

    #[test]
    fn test_new_truncates_to_capacity() {
        let reading = DsoReading::new(vec![1; 100]);
        assert_eq!(reading.len(), DsoReading::CAPACITY);
    }
}
