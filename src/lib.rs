// Allow derivable impls for clarity
#![allow(clippy::derivable_impls)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # pokit-ble
//!
//! A cross-platform Rust library for Pokit multimeter/oscilloscope meters
//! over Bluetooth Low Energy.
//!
//! The crate is a client-side protocol engine: it discovers meters, resolves
//! their GATT services, switches measurement modes, and turns raw
//! notifications into display values and waveforms.
//!
//! ## Features
//!
//! - **Meter Discovery**: Scan for named meters with a bounded scan window
//! - **Multimeter**: Mode and range selection with live readings
//! - **Oscilloscope**: Triggered acquisition with scaled waveform samples
//! - **Device Status**: Battery, mode switch position, torch and button
//! - **Testable Core**: The [`Session`] runs against any [`ble::Transport`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pokit_ble::{Config, DeviceManager, MultimeterMode, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = DeviceManager::new(Config::default()).await?;
//!     manager.start_scan();
//!
//!     // Wait for meters to be discovered
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     if let Some(meter) = manager.nearest_peripheral() {
//!         println!("Connecting to {} ({})", meter.name, meter.id);
//!         manager.connect(&meter.id)?;
//!
//!         tokio::time::sleep(std::time::Duration::from_secs(3)).await;
//!         manager.select_multimeter_mode(MultimeterMode::DcVoltage);
//!
//!         tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!         let display = manager.multimeter_display();
//!         println!("{:.3} ({})", display.value, display.range_label);
//!     }
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization for data types

// Public modules
pub mod ble;
pub mod config;
pub mod data;
pub mod device_manager;
pub mod error;
pub mod events;
pub mod modes;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod timer;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use device_manager::{CallbackHandle, DeviceManager};
pub use error::{Error, Result};
pub use events::EngineEvent;
pub use session::{DiscoveredPeripheral, Session};
pub use utils::{battery_fraction, format_mac_address};

// Re-export commonly used types from submodules
pub use ble::connection::ConnectionState;
pub use ble::discovery::DiscoveryState;
pub use ble::transport::PeripheralId;
pub use data::{
    DeviceDetails, MultimeterDisplay, ScopeDisplay, StatusDisplay, WaveformTrace,
};
pub use modes::{MultimeterSelection, OscilloscopeSelection};
pub use protocol::{
    ButtonAction, DeviceInfo, DeviceState, DeviceStatus, DsoCommand, DsoMetadata, DsoMode,
    DsoReading, DsoSettings, DsoStatus, ModeSwitchPosition, MultimeterMode, MultimeterReading,
    MultimeterSettings, Range, ReadingFlags,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        let _ = std::any::TypeId::of::<DeviceManager>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<EngineEvent>();
        let _ = std::any::TypeId::of::<MultimeterDisplay>();
        let _ = std::any::TypeId::of::<ScopeDisplay>();
        let _ = std::any::TypeId::of::<DsoSettings>();
    }

    #[test]
    fn test_battery_fraction_export() {
        assert!((battery_fraction(2.1) - 0.5).abs() < 0.001);
        assert_eq!(format_mac_address(&[0xAB, 0, 1, 2, 3, 0xFF]), "ab:00:01:02:03:ff");
    }
}
