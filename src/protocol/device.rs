//! Status service records.
//!
//! Device information, device status, button events and the torch byte, all
//! carried by characteristics of the status service.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::protocol::codec::WireRecord;
use crate::utils::{battery_fraction, format_mac_address};

/// Overall operating state reported by the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DeviceState {
    /// Multimeter idle.
    #[default]
    Idle = 0,
    /// Multimeter measuring DC voltage.
    DcVoltage = 1,
    /// Multimeter measuring AC voltage.
    AcVoltage = 2,
    /// Multimeter measuring DC current.
    DcCurrent = 3,
    /// Multimeter measuring AC current.
    AcCurrent = 4,
    /// Multimeter measuring resistance.
    Resistance = 5,
    /// Multimeter in diode test.
    Diode = 6,
    /// Multimeter in continuity test.
    Continuity = 7,
    /// Multimeter measuring temperature.
    Temperature = 8,
    /// Oscilloscope acquisition.
    Oscilloscope = 9,
    /// Datalogger running.
    Datalogger = 10,
}

impl DeviceState {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Idle,
            1 => Self::DcVoltage,
            2 => Self::AcVoltage,
            3 => Self::DcCurrent,
            4 => Self::AcCurrent,
            5 => Self::Resistance,
            6 => Self::Diode,
            7 => Self::Continuity,
            8 => Self::Temperature,
            9 => Self::Oscilloscope,
            10 => Self::Datalogger,
            _ => {
                return Err(Error::InvalidEnum {
                    field: "device state",
                    value,
                })
            }
        })
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }

    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::DcVoltage => "MM DC Voltage",
            Self::AcVoltage => "MM AC Voltage",
            Self::DcCurrent => "MM DC Current",
            Self::AcCurrent => "MM AC Current",
            Self::Resistance => "MM Resistance",
            Self::Diode => "MM Diode",
            Self::Continuity => "MM Continuity",
            Self::Temperature => "MM Temperature",
            Self::Oscilloscope => "Oscilloscope",
            Self::Datalogger => "Datalogger",
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Position of the physical selector on the meter.
///
/// The position limits which multimeter functions are electrically valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ModeSwitchPosition {
    /// Voltage inputs.
    Voltage = 0,
    /// Mixed voltage/current inputs.
    Mixed = 1,
    /// Current inputs.
    Current = 2,
}

impl ModeSwitchPosition {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Voltage),
            1 => Ok(Self::Mixed),
            2 => Ok(Self::Current),
            _ => Err(Error::InvalidEnum {
                field: "mode switch position",
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
            Self::Voltage => "Voltage",
            Self::Mixed => "Mixed",
            Self::Current => "Current",
        }
    }
}

impl std::fmt::Display for ModeSwitchPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Action carried by a button notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ButtonAction {
    /// Button released.
    Release = 0,
    /// Button pressed.
    Press = 1,
    /// Button held.
    LongPress = 2,
}

impl ButtonAction {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Release),
            1 => Ok(Self::Press),
            2 => Ok(Self::LongPress),
            _ => Err(Error::InvalidEnum {
                field: "button action",
                value,
            }),
        }
    }

    /// Convert to raw byte value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }
}

/// Static device information, read once after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    /// Firmware major version.
    pub firmware_major: u8,
    /// Firmware minor version.
    pub firmware_minor: u8,
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
    /// Reserved.
    pub reserved: u16,
    /// Bluetooth MAC address.
    pub mac_address: [u8; 6],
}

impl DeviceInfo {
    /// Firmware version as "major.minor".
    pub fn firmware_version(&self) -> String {
        format!("{}.{}", self.firmware_major, self.firmware_minor)
    }

    /// MAC address as colon separated lowercase hex.
    pub fn mac_address_string(&self) -> String {
        format_mac_address(&self.mac_address)
    }
}

impl WireRecord for DeviceInfo {
    const NAME: &'static str = "DeviceInfo";
    const SIZE: usize = 20;

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.firmware_major);
        buf.put_u8(self.firmware_minor);
        buf.put_u16_le(self.max_voltage);
        buf.put_u16_le(self.max_current);
        buf.put_u16_le(self.max_resistance);
        buf.put_u16_le(self.max_sampling_rate);
        buf.put_u16_le(self.max_buffer_size);
        buf.put_u16_le(self.reserved);
        buf.put_slice(&self.mac_address);
    }

    fn read_fields<B: Buf>(buf: &mut B) -> Result<Self> {
        let firmware_major = buf.get_u8();
        let firmware_minor = buf.get_u8();
        let max_voltage = buf.get_u16_le();
        let max_current = buf.get_u16_le();
        let max_resistance = buf.get_u16_le();
        let max_sampling_rate = buf.get_u16_le();
        let max_buffer_size = buf.get_u16_le();
        let reserved = buf.get_u16_le();
        let mut mac_address = [0u8; 6];
        buf.copy_to_slice(&mut mac_address);

        Ok(Self {
            firmware_major,
            firmware_minor,
            max_voltage,
            max_current,
            max_resistance,
            max_sampling_rate,
            max_buffer_size,
            reserved,
            mac_address,
        })
    }
}

/// Device status, notified whenever the meter state changes.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStatus {
    /// Current device state.
    pub state: DeviceState,
    /// Battery voltage (0 - 3.3 V as reported).
    pub battery_voltage: f32,
    /// Undocumented.
    pub spare0: u8,
    /// Physical mode switch position.
    pub mode_switch: ModeSwitchPosition,
    /// Undocumented.
    pub spare1: u8,
}

impl DeviceStatus {
    /// Battery charge as a fraction of the 4.2 V maximum, clamped to 0..=1.
    pub fn battery_fraction(&self) -> f32 {
        battery_fraction(self.battery_voltage)
    }
}

impl WireRecord for DeviceStatus {
    const NAME: &'static str = "DeviceStatus";
    const SIZE: usize = 8;

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.state.to_raw());
        buf.put_f32_le(self.battery_voltage);
        buf.put_u8(self.spare0);
        buf.put_u8(self.mode_switch.to_raw());
        buf.put_u8(self.spare1);
    }

    fn read_fields<B: Buf>(buf: &mut B) -> Result<Self> {
        let state = DeviceState::from_raw(buf.get_u8())?;
        let battery_voltage = buf.get_f32_le();
        let spare0 = buf.get_u8();
        let mode_switch = ModeSwitchPosition::from_raw(buf.get_u8())?;
        let spare1 = buf.get_u8();

        Ok(Self {
            state,
            battery_voltage,
            spare0,
            mode_switch,
            spare1,
        })
    }
}

/// Button notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ButtonEvent {
    /// Unused.
    pub spare: u8,
    /// The button action.
    pub action: ButtonAction,
}

impl WireRecord for ButtonEvent {
    const NAME: &'static str = "ButtonEvent";
    const SIZE: usize = 2;

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.spare);
        buf.put_u8(self.action.to_raw());
    }

    fn read_fields<B: Buf>(buf: &mut B) -> Result<Self> {
        let spare = buf.get_u8();
        let action = ButtonAction::from_raw(buf.get_u8())?;
        Ok(Self { spare, action })
    }
}

/// Torch characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TorchState {
    /// Whether the torch LED is lit.
    pub on: bool,
}

impl WireRecord for TorchState {
    const NAME: &'static str = "TorchState";
    const SIZE: usize = 1;

    fn write_fields<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(u8::from(self.on));
    }

    fn read_fields<B: Buf>(buf: &mut B) -> Result<Self> {
        Ok(Self {
            on: buf.get_u8() != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_device_info_layout() {
        let data = [
            1, 3, // firmware 1.3
            0x3C, 0x00, // 60 V
            0x02, 0x00, // 2 A
            0x40, 0x00, // 64 kOhm
            0x01, 0x01, // 257 kHz
            0x00, 0x20, // 8192
            0x00, 0x00, // reserved
            0x5C, 0x02, 0x72, 0xAB, 0xCD, 0xEF,
        ];
        let info = DeviceInfo::decode(&data).unwrap();
        assert_eq!(info.firmware_version(), "1.3");
        assert_eq!(info.max_voltage, 60);
        assert_eq!(info.max_current, 2);
        assert_eq!(info.max_resistance, 64);
        assert_eq!(info.max_sampling_rate, 257);
        assert_eq!(info.max_buffer_size, 8192);
        assert_eq!(info.mac_address_string(), "5c:02:72:ab:cd:ef");
        assert_eq!(info.encode(), data.to_vec());
    }

    #[test]
    fn test_device_status_layout() {
        let mut data = vec![9u8];
        data.extend_from_slice(&2.1f32.to_le_bytes());
        data.extend_from_slice(&[0x7F, 2, 0x01]);

        let status = DeviceStatus::decode(&data).unwrap();
        assert_eq!(status.state, DeviceState::Oscilloscope);
        assert_eq!(status.battery_voltage, 2.1);
        assert_eq!(status.spare0, 0x7F);
        assert_eq!(status.mode_switch, ModeSwitchPosition::Current);
        assert_eq!(status.spare1, 0x01);
        assert!((status.battery_fraction() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_device_status_rejects_unknown_values() {
        let mut data = vec![11u8];
        data.extend_from_slice(&[0; 7]);
        assert!(matches!(
            DeviceStatus::decode(&data),
            Err(Error::InvalidEnum {
                field: "device state",
                value: 11
            })
        ));

        let mut data = vec![0u8];
        data.extend_from_slice(&[0, 0, 0, 0, 0, 3, 0]);
        assert!(matches!(
            DeviceStatus::decode(&data),
            Err(Error::InvalidEnum {
                field: "mode switch position",
                value: 3
            })
        ));
    }

    #[test]
    fn test_device_state_labels() {
        assert_eq!(DeviceState::Idle.label(), "Idle");
        assert_eq!(DeviceState::DcCurrent.label(), "MM DC Current");
        assert_eq!(DeviceState::Datalogger.to_string(), "Datalogger");
    }

    #[test]
    fn test_button_event() {
        let event = ButtonEvent::decode(&[0x00, 0x01]).unwrap();
        assert_eq!(event.action, ButtonAction::Press);
        assert!(ButtonEvent::decode(&[0x00, 0x03]).is_err());
        assert!(ButtonEvent::decode(&[0x00]).is_err());
    }

    #[test]
    fn test_torch_state() {
        assert!(TorchState::decode(&[0x01]).unwrap().on);
        assert!(TorchState::decode(&[0xFF]).unwrap().on);
        assert!(!TorchState::decode(&[0x00]).unwrap().on);
        assert_eq!(TorchState { on: true }.encode(), vec![1]);
        assert!(TorchState::decode(&[]).is_err());
    }
}
