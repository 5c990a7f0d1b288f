//! Fixed-layout record encoding and decoding.
//!
//! Every record the meter exchanges is a packed little-endian structure with
//! no padding. Each record type implements [`WireRecord`], which supplies the
//! field-by-field layout; length checks and the dispatching [`decode`]
//! function live here.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::protocol::device::{ButtonEvent, DeviceInfo, DeviceStatus, TorchState};
use crate::protocol::dso::{DsoMetadata, DsoReading, DsoSettings};
use crate::protocol::multimeter::{MultimeterReading, MultimeterSettings};

/// A record with a fixed little-endian wire layout.
pub trait WireRecord: Sized {
    /// Record name used in error messages and logs.
    const NAME: &'static str;
    /// Exact encoded size in bytes.
    const SIZE: usize;

    /// Write the fields in wire order.
    fn write_fields<B: BufMut>(&self, buf: &mut B);

    /// Read the fields in wire order. The buffer holds at least `SIZE` bytes.
    fn read_fields<B: Buf>(buf: &mut B) -> Result<Self>;

    /// Encode into a freshly allocated buffer of exactly `SIZE` bytes.
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.write_fields(&mut out);
        out
    }

    /// Decode from a payload.
    ///
    /// Payloads shorter than `SIZE` are rejected; trailing bytes beyond
    /// `SIZE` are ignored.
    fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(Self::NAME, Self::SIZE, data)?;
        let mut buf = &data[..Self::SIZE];
        Self::read_fields(&mut buf)
    }
}

/// Reject payloads shorter than a record's fixed size.
pub(crate) fn ensure_len(record: &'static str, expected: usize, data: &[u8]) -> Result<()> {
    if data.len() < expected {
        return Err(Error::TooShort {
            record,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// The kind of record carried by a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Static device information.
    DeviceInfo,
    /// Device status.
    DeviceStatus,
    /// Torch on/off byte.
    TorchState,
    /// Button event.
    ButtonEvent,
    /// Outgoing multimeter settings.
    MultimeterSettings,
    /// Incoming multimeter reading.
    MultimeterReading,
    /// Outgoing oscilloscope settings.
    DsoSettings,
    /// Oscilloscope acquisition metadata.
    DsoMetadata,
    /// Oscilloscope sample block.
    DsoReading,
}

/// Any decoded record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Static device information.
    DeviceInfo(DeviceInfo),
    /// Device status.
    DeviceStatus(DeviceStatus),
    /// Torch on/off byte.
    TorchState(TorchState),
    /// Button event.
    ButtonEvent(ButtonEvent),
    /// Outgoing multimeter settings.
    MultimeterSettings(MultimeterSettings),
    /// Incoming multimeter reading.
    MultimeterReading(MultimeterReading),
    /// Outgoing oscilloscope settings.
    DsoSettings(DsoSettings),
    /// Oscilloscope acquisition metadata.
    DsoMetadata(DsoMetadata),
    /// Oscilloscope sample block.
    DsoReading(DsoReading),
}

impl Record {
    /// Get the kind of this record.
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::DeviceInfo(_) => RecordKind::DeviceInfo,
            Self::DeviceStatus(_) => RecordKind::DeviceStatus,
            Self::TorchState(_) => RecordKind::TorchState,
            Self::ButtonEvent(_) => RecordKind::ButtonEvent,
            Self::MultimeterSettings(_) => RecordKind::MultimeterSettings,
            Self::MultimeterReading(_) => RecordKind::MultimeterReading,
            Self::DsoSettings(_) => RecordKind::DsoSettings,
            Self::DsoMetadata(_) => RecordKind::DsoMetadata,
            Self::DsoReading(_) => RecordKind::DsoReading,
        }
    }

    /// Encode the record to its wire bytes. Never fails.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::DeviceInfo(r) => r.encode(),
            Self::DeviceStatus(r) => r.encode(),
            Self::TorchState(r) => r.encode(),
            Self::ButtonEvent(r) => r.encode(),
            Self::MultimeterSettings(r) => r.encode(),
            Self::MultimeterReading(r) => r.encode(),
            Self::DsoSettings(r) => r.encode(),
            Self::DsoMetadata(r) => r.encode(),
            Self::DsoReading(r) => r.encode(),
        }
    }
}

/// Decode a payload as the given record kind.
pub fn decode(kind: RecordKind, data: &[u8]) -> Result<Record> {
    Ok(match kind {
        RecordKind::DeviceInfo => Record::DeviceInfo(DeviceInfo::decode(data)?),
        RecordKind::DeviceStatus => Record::DeviceStatus(DeviceStatus::decode(data)?),
        RecordKind::TorchState => Record::TorchState(TorchState::decode(data)?),
        RecordKind::ButtonEvent => Record::ButtonEvent(ButtonEvent::decode(data)?),
        RecordKind::MultimeterSettings => {
            Record::MultimeterSettings(MultimeterSettings::decode(data)?)
        }
        RecordKind::MultimeterReading => {
            Record::MultimeterReading(MultimeterReading::decode(data)?)
        }
        RecordKind::DsoSettings => Record::DsoSettings(DsoSettings::decode(data)?),
        RecordKind::DsoMetadata => Record::DsoMetadata(DsoMetadata::decode(data)?),
        RecordKind::DsoReading => Record::DsoReading(DsoReading::decode(data)?),
    })
}

/// Format the first bytes of a payload for trace logging.
pub(crate) fn hex_preview(data: &[u8]) -> String {
    format!("{:02X?}", &data[..std::cmp::min(data.len(), 24)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::device::{ButtonAction, DeviceState, ModeSwitchPosition};
    use crate::protocol::dso::{DsoCommand, DsoMode, DsoStatus};
    use crate::protocol::multimeter::{MultimeterMode, Range};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(DeviceInfo::SIZE, 20);
        assert_eq!(DeviceStatus::SIZE, 8);
        assert_eq!(MultimeterSettings::SIZE, 6);
        assert_eq!(MultimeterReading::SIZE, 7);
        assert_eq!(ButtonEvent::SIZE, 2);
        assert_eq!(DsoSettings::SIZE, 13);
        assert_eq!(DsoMetadata::SIZE, 22);
    }

    #[test]
    fn test_decode_dispatch() {
        let data = [0x01, 0x02];
        let record = decode(RecordKind::ButtonEvent, &data).unwrap();
        assert_eq!(record.kind(), RecordKind::ButtonEvent);
        assert_eq!(
            record,
            Record::ButtonEvent(ButtonEvent {
                spare: 1,
                action: ButtonAction::LongPress,
            })
        );
        assert_eq!(record.encode(), data.to_vec());
    }

    #[test]
    fn test_decode_too_short() {
        let err = decode(RecordKind::DeviceStatus, &[0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::TooShort {
                record: "DeviceStatus",
                expected: 8,
                actual: 3,
            }
        ));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut data = MultimeterReading {
            status: 0,
            value: 1.5,
            mode: MultimeterMode::DcVoltage,
            range: Range(2),
        }
        .encode();
        data.extend_from_slice(&[0xAA, 0xBB]);
        let reading = MultimeterReading::decode(&data).unwrap();
        assert_eq!(reading.value, 1.5);
        assert_eq!(reading.range, Range(2));
    }

    #[test]
    fn test_hex_preview_truncates() {
        let data = vec![0xABu8; 100];
        let preview = hex_preview(&data);
        assert_eq!(preview.matches("AB").count(), 24);
    }

    fn finite_f32() -> impl Strategy<Value = f32> {
        -1.0e6f32..1.0e6f32
    }

    fn any_mm_mode() -> impl Strategy<Value = MultimeterMode> {
        (0u8..=8).prop_map(|v| MultimeterMode::from_raw(v).unwrap())
    }

    fn any_dso_mode() -> impl Strategy<Value = DsoMode> {
        (0u8..=4).prop_map(|v| DsoMode::from_raw(v).unwrap())
    }

    fn any_record() -> impl Strategy<Value = Record> {
        prop_oneof![
            (
                any::<[u8; 2]>(),
                any::<[u16; 6]>(),
                any::<[u8; 6]>()
            )
                .prop_map(|(fw, words, mac)| Record::DeviceInfo(DeviceInfo {
                    firmware_major: fw[0],
                    firmware_minor: fw[1],
                    max_voltage: words[0],
                    max_current: words[1],
                    max_resistance: words[2],
                    max_sampling_rate: words[3],
                    max_buffer_size: words[4],
                    reserved: words[5],
                    mac_address: mac,
                })),
            (0u8..=10, 0.0f32..3.3, any::<[u8; 2]>(), 0u8..=2).prop_map(
                |(state, battery, spare, sw)| Record::DeviceStatus(DeviceStatus {
                    state: DeviceState::from_raw(state).unwrap(),
                    battery_voltage: battery,
                    spare0: spare[0],
                    mode_switch: ModeSwitchPosition::from_raw(sw).unwrap(),
                    spare1: spare[1],
                })
            ),
            any::<bool>().prop_map(|on| Record::TorchState(TorchState { on })),
            (any::<u8>(), 0u8..=2).prop_map(|(spare, action)| Record::ButtonEvent(
                ButtonEvent {
                    spare,
                    action: ButtonAction::from_raw(action).unwrap(),
                }
            )),
            (any_mm_mode(), any::<u8>(), any::<u32>()).prop_map(|(mode, range, interval)| {
                Record::MultimeterSettings(MultimeterSettings {
                    mode,
                    range: Range(range),
                    update_interval_ms: interval,
                })
            }),
            (any::<u8>(), finite_f32(), any_mm_mode(), any::<u8>()).prop_map(
                |(status, value, mode, range)| Record::MultimeterReading(MultimeterReading {
                    status,
                    value,
                    mode,
                    range: Range(range),
                })
            ),
            (
                prop_oneof![Just(0u8), Just(1), Just(2), Just(3), Just(5)],
                finite_f32(),
                any_dso_mode(),
                any::<u8>(),
                any::<u32>(),
                1u16..=8192
            )
                .prop_map(|(command, trigger, mode, range, window, samples)| {
                    Record::DsoSettings(DsoSettings {
                        command: DsoCommand::from_raw(command).unwrap(),
                        trigger_level: trigger,
                        mode,
                        range: Range(range),
                        window_us: window,
                        samples,
                    })
                }),
            (
                prop_oneof![Just(0u8), Just(1), Just(255)],
                finite_f32(),
                any_dso_mode(),
                any::<u8>(),
                any::<u32>(),
                any::<u16>(),
                any::<u32>(),
                any::<[u8; 5]>()
            )
                .prop_map(
                    |(status, scale, mode, range, window, samples, rate, spare)| {
                        Record::DsoMetadata(DsoMetadata {
                            status: DsoStatus::from_raw(status).unwrap(),
                            scale,
                            mode,
                            range: Range(range),
                            window_us: window,
                            samples,
                            sampling_rate: rate,
                            spare,
                        })
                    }
                ),
            proptest::collection::vec(any::<i16>(), 0..=88)
                .prop_map(|samples| Record::DsoReading(DsoReading::new(samples))),
        ]
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(record in any_record()) {
            let bytes = record.encode();
            let decoded = decode(record.kind(), &bytes).unwrap();
            prop_assert_eq!(decoded, record);
        }
    }
}
