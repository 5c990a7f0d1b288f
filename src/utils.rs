//! Utility functions for the pokit-ble crate.

/// Battery voltage treated as a full charge.
pub const MAX_BATTERY_VOLTAGE: f32 = 4.2;

/// Convert a battery voltage to a charge fraction.
///
/// # Arguments
///
/// * `voltage` - Battery voltage as reported in the device status
///
/// # Returns
///
/// The fraction of [`MAX_BATTERY_VOLTAGE`], clamped to `0.0..=1.0`
///
/// # Example
///
/// ```
/// use pokit_ble::battery_fraction;
///
/// assert!((battery_fraction(2.1) - 0.5).abs() < 0.001);
/// assert_eq!(battery_fraction(5.0), 1.0);
/// ```
#[inline]
pub fn battery_fraction(voltage: f32) -> f32 {
    if voltage.is_nan() {
        return 0.0;
    }
    (voltage / MAX_BATTERY_VOLTAGE).clamp(0.0, 1.0)
}

/// Format a MAC address as colon separated lowercase hex.
///
/// # Example
///
/// ```
/// use pokit_ble::format_mac_address;
///
/// assert_eq!(
///     format_mac_address(&[0x5C, 0x02, 0x72, 0x0A, 0xBC, 0x01]),
///     "5c:02:72:0a:bc:01"
/// );
/// ```
pub fn format_mac_address(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
