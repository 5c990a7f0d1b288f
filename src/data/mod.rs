//! Presentation data derived from meter records.
//!
//! This module contains the range tables, the display snapshots published to
//! front ends, and the oscilloscope waveform trace.

pub mod display;
pub mod ranges;
pub mod waveform;

pub use display::{DeviceDetails, MultimeterDisplay, ScopeDisplay, StatusDisplay};
pub use ranges::{
    dso_full_scale, dso_legal_ranges, dso_range_label, is_legal_multimeter_range,
    multimeter_legal_ranges, multimeter_range_label, HORIZONTAL_DIVISIONS, VERTICAL_DIVISIONS,
};
pub use waveform::WaveformTrace;
