//! Error types for the pokit-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The specified peripheral was not found among discovered devices.
    #[error("Peripheral not found: {identifier}")]
    PeripheralNotFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// Failed to connect to a meter.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The reason the connection failed.
        reason: String,
    },

    /// Operation requires a connection but no meter is connected.
    #[error("Meter not connected")]
    NotConnected,

    /// A record payload was shorter than its fixed wire size.
    #[error("{record} payload too short: {actual} bytes (need {expected})")]
    TooShort {
        /// Name of the record being decoded.
        record: &'static str,
        /// The fixed size of the record.
        expected: usize,
        /// The number of bytes received.
        actual: usize,
    },

    /// A variable-length payload had a length the record cannot hold.
    #[error("{record} payload has invalid length {actual}")]
    InvalidLength {
        /// Name of the record being decoded.
        record: &'static str,
        /// The number of bytes received.
        actual: usize,
    },

    /// An enumeration field carried a value outside its closed set.
    #[error("Unrecognized {field} value: {value}")]
    InvalidEnum {
        /// Name of the enumerated field.
        field: &'static str,
        /// The raw value received.
        value: u8,
    },

    /// An oscilloscope reading was longer than the declared capacity.
    #[error("Oscilloscope reading size mismatch: received {received} bytes, capacity {capacity}")]
    SizeMismatch {
        /// The number of bytes received.
        received: usize,
        /// The declared capacity in bytes.
        capacity: usize,
    },

    /// A range code is not legal for the selected mode.
    #[error("Range {range} is not valid for mode {mode}")]
    InvalidRange {
        /// Display name of the mode.
        mode: String,
        /// The rejected range code.
        range: u8,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error came from decoding a wire record.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::TooShort { .. } | Self::InvalidLength { .. } | Self::InvalidEnum { .. }
        )
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_classification() {
        let err = Error::TooShort {
            record: "DeviceStatus",
            expected: 8,
            actual: 3,
        };
        assert!(err.is_decode_error());
        assert!(Error::InvalidEnum {
            field: "mode",
            value: 42
        }
        .is_decode_error());
        assert!(!Error::NotConnected.is_decode_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::SizeMismatch {
            received: 200,
            capacity: 176,
        };
        assert_eq!(
            err.to_string(),
            "Oscilloscope reading size mismatch: received 200 bytes, capacity 176"
        );
    }
}
