//! Protocol module for encoding and decoding meter records.
//!
//! This module contains the implementations for:
//! - The fixed-layout record codec
//! - Status service records (device info, status, button, torch)
//! - Multimeter records
//! - Oscilloscope records

pub mod codec;
pub mod device;
pub mod dso;
pub mod multimeter;

pub use codec::{decode, Record, RecordKind, WireRecord};
pub use device::{
    ButtonAction, ButtonEvent, DeviceInfo, DeviceState, DeviceStatus, ModeSwitchPosition,
    TorchState,
};
pub use dso::{DsoCommand, DsoMetadata, DsoMode, DsoReading, DsoSettings, DsoStatus};
pub use multimeter::{
    MultimeterMode, MultimeterReading, MultimeterSettings, Range, ReadingFlags,
};
