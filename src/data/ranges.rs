//! Range tables for both services.
//!
//! Legal range sets, range labels and oscilloscope full-scale values, keyed
//! by mode and range code.

use crate::protocol::{DsoMode, MultimeterMode, Range};

/// Horizontal divisions of the oscilloscope grid.
pub const HORIZONTAL_DIVISIONS: u32 = 5;
/// Vertical divisions of the oscilloscope grid.
pub const VERTICAL_DIVISIONS: u32 = 3;

/// Voltage range labels, indexed by range code.
pub const VOLTAGE_RANGE_LABELS: [&str; 6] = [
    "0~300mV",
    "300mV~2V",
    "2V~6V",
    "6V~12V",
    "12V~30V",
    "30V~60V",
];

/// Current range labels, indexed by range code.
pub const CURRENT_RANGE_LABELS: [&str; 5] = [
    "0~10mA",
    "10mA~30mA",
    "30mA~150mA",
    "150mA~300mA",
    "300mA~3A",
];

/// Resistance range labels, indexed by range code.
pub const RESISTANCE_RANGE_LABELS: [&str; 8] = [
    "0R~160R",
    "160R~330R",
    "330R~890R",
    "890R~1K5",
    "1K5~10K",
    "10K~100K",
    "100K~470K",
    "470K~1M",
];

/// Upper bound of each voltage range in volts.
pub const VOLTAGE_FULL_SCALE: [f32; 6] = [0.3, 2.0, 6.0, 12.0, 30.0, 60.0];
/// Upper bound of each current range in amperes.
pub const CURRENT_FULL_SCALE: [f32; 5] = [0.01, 0.03, 0.15, 0.3, 3.0];

/// Label shown for the automatic range.
pub const AUTO_LABEL: &str = "AUTO";
/// Label shown when a range code has no meaning for the mode.
pub const UNKNOWN_RANGE_LABEL: &str = "---";

fn multimeter_band_labels(mode: MultimeterMode) -> &'static [&'static str] {
    if mode.is_voltage() {
        &VOLTAGE_RANGE_LABELS
    } else if mode.is_current() {
        &CURRENT_RANGE_LABELS
    } else if mode == MultimeterMode::Resistance {
        &RESISTANCE_RANGE_LABELS
    } else {
        &[]
    }
}

fn dso_band_labels(mode: DsoMode) -> &'static [&'static str] {
    if mode.is_voltage() {
        &VOLTAGE_RANGE_LABELS
    } else if mode.is_current() {
        &CURRENT_RANGE_LABELS
    } else {
        &[]
    }
}

/// Legal multimeter ranges for a mode.
///
/// Voltage, current and resistance modes offer their bands followed by
/// [`Range::AUTO`]. Every other mode has no range selection.
pub fn multimeter_legal_ranges(mode: MultimeterMode) -> Vec<Range> {
    let bands = multimeter_band_labels(mode).len();
    if bands == 0 {
        return Vec::new();
    }
    (0..bands as u8)
        .map(Range)
        .chain(std::iter::once(Range::AUTO))
        .collect()
}

/// Check if a range is legal for a multimeter mode.
pub fn is_legal_multimeter_range(mode: MultimeterMode, range: Range) -> bool {
    multimeter_legal_ranges(mode).contains(&range)
}

/// Label of a multimeter range ("0~300mV", "AUTO", ...).
///
/// Modes without a range table are labelled "---" whatever the range.
pub fn multimeter_range_label(mode: MultimeterMode, range: Range) -> &'static str {
    let bands = multimeter_band_labels(mode);
    if bands.is_empty() {
        return UNKNOWN_RANGE_LABEL;
    }
    if range.is_auto() {
        return AUTO_LABEL;
    }
    bands
        .get(range.0 as usize)
        .copied()
        .unwrap_or(UNKNOWN_RANGE_LABEL)
}

/// Legal oscilloscope ranges for a mode. The oscilloscope has no auto range.
pub fn dso_legal_ranges(mode: DsoMode) -> Vec<Range> {
    (0..dso_band_labels(mode).len() as u8).map(Range).collect()
}

/// Label of an oscilloscope range.
pub fn dso_range_label(mode: DsoMode, range: Range) -> &'static str {
    dso_band_labels(mode)
        .get(range.0 as usize)
        .copied()
        .unwrap_or(UNKNOWN_RANGE_LABEL)
}

/// Full-scale value of an oscilloscope range in volts or amperes.
///
/// Returns 1.0 for pairs outside the tables so derived scales stay finite.
pub fn dso_full_scale(mode: DsoMode, range: Range) -> f32 {
    let table: &[f32] = if mode.is_voltage() {
        &VOLTAGE_FULL_SCALE
    } else if mode.is_current() {
        &CURRENT_FULL_SCALE
    } else {
        &[]
    };
    table.get(range.0 as usize).copied().unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_multimeter_legal_ranges() {
        for mode in MultimeterMode::ALL {
            let ranges = multimeter_legal_ranges(mode);
            let expected = match mode {
                MultimeterMode::DcVoltage | MultimeterMode::AcVoltage => 7,
                MultimeterMode::DcCurrent | MultimeterMode::AcCurrent => 6,
                MultimeterMode::Resistance => 9,
                _ => 0,
            };
            assert_eq!(ranges.len(), expected, "{mode}");
            if expected > 0 {
                assert_eq!(ranges.last(), Some(&Range::AUTO));
                assert_eq!(ranges[0], Range(0));
                assert_eq!(ranges[expected - 2], Range(expected as u8 - 2));
            }
        }
    }

    #[test]
    fn test_range_legality_is_per_mode() {
        assert!(is_legal_multimeter_range(MultimeterMode::Resistance, Range(7)));
        assert!(!is_legal_multimeter_range(MultimeterMode::DcVoltage, Range(7)));
        assert!(!is_legal_multimeter_range(MultimeterMode::DcCurrent, Range(5)));
        assert!(!is_legal_multimeter_range(MultimeterMode::Diode, Range::AUTO));
    }

    #[test]
    fn test_multimeter_range_labels() {
        assert_eq!(
            multimeter_range_label(MultimeterMode::DcVoltage, Range(0)),
            "0~300mV"
        );
        assert_eq!(
            multimeter_range_label(MultimeterMode::AcVoltage, Range(5)),
            "30V~60V"
        );
        assert_eq!(
            multimeter_range_label(MultimeterMode::AcCurrent, Range(4)),
            "300mA~3A"
        );
        assert_eq!(
            multimeter_range_label(MultimeterMode::Resistance, Range(3)),
            "890R~1K5"
        );
        assert_eq!(
            multimeter_range_label(MultimeterMode::DcVoltage, Range::AUTO),
            "AUTO"
        );
        assert_eq!(
            multimeter_range_label(MultimeterMode::Diode, Range::AUTO),
            "---"
        );
        assert_eq!(
            multimeter_range_label(MultimeterMode::Continuity, Range::AUTO),
            "---"
        );
        assert_eq!(
            multimeter_range_label(MultimeterMode::Idle, Range::AUTO),
            "---"
        );
        assert_eq!(
            multimeter_range_label(MultimeterMode::Temperature, Range(0)),
            "---"
        );
        assert_eq!(
            multimeter_range_label(MultimeterMode::DcCurrent, Range(5)),
            "---"
        );
    }

    #[test]
    fn test_dso_ranges() {
        assert_eq!(dso_legal_ranges(DsoMode::Vac).len(), 6);
        assert_eq!(dso_legal_ranges(DsoMode::Adc).len(), 5);
        assert!(dso_legal_ranges(DsoMode::Idle).is_empty());
        assert_eq!(dso_range_label(DsoMode::Vdc, Range(1)), "300mV~2V");
        assert_eq!(dso_range_label(DsoMode::Aac, Range(2)), "30mA~150mA");
    }

    #[test]
    fn test_full_scale_table() {
        let voltage = [0.3, 2.0, 6.0, 12.0, 30.0, 60.0];
        for (code, expected) in voltage.iter().enumerate() {
            for mode in [DsoMode::Vdc, DsoMode::Vac] {
                assert_eq!(dso_full_scale(mode, Range(code as u8)), *expected);
            }
        }
        let current = [0.01, 0.03, 0.15, 0.3, 3.0];
        for (code, expected) in current.iter().enumerate() {
            for mode in [DsoMode::Adc, DsoMode::Aac] {
                assert_eq!(dso_full_scale(mode, Range(code as u8)), *expected);
            }
        }
        assert_eq!(dso_full_scale(DsoMode::Adc, Range(5)), 1.0);
        assert_eq!(dso_full_scale(DsoMode::Idle, Range(0)), 1.0);
    }
}
