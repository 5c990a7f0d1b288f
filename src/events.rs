//! Events published to the presentation layer.

use crate::ble::connection::ConnectionState;
use crate::ble::discovery::DiscoveryState;
use crate::ble::transport::PeripheralId;
use crate::data::{DeviceDetails, MultimeterDisplay, ScopeDisplay, StatusDisplay};
use crate::protocol::{ButtonAction, MultimeterMode};
use crate::session::DiscoveredPeripheral;

/// An event published by the session.
///
/// Delivered through a `tokio::sync::broadcast` channel; slow receivers may
/// miss events.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Scanning started; the discovered list was cleared.
    ScanStarted,
    /// Scanning stopped.
    ScanStopped,
    /// A named peripheral was discovered or seen again.
    PeripheralDiscovered(DiscoveredPeripheral),
    /// The connection to a peripheral changed state.
    ConnectionChanged {
        /// The peripheral.
        peripheral: PeripheralId,
        /// The new state.
        state: ConnectionState,
    },
    /// Discovery progressed.
    DiscoveryProgress(DiscoveryState),
    /// Device information was read.
    DeviceInfo(DeviceDetails),
    /// Device status changed.
    Status(StatusDisplay),
    /// The set of selectable multimeter modes changed.
    ModeAvailability(Vec<(MultimeterMode, bool)>),
    /// The multimeter display changed.
    Multimeter(MultimeterDisplay),
    /// New oscilloscope acquisition metadata.
    Scope(ScopeDisplay),
    /// A block of scaled oscilloscope samples.
    Waveform(Vec<f32>),
    /// Oscilloscope data started or stopped arriving.
    Acquiring(bool),
    /// An oscilloscope reading exceeded its declared capacity.
    SizeMismatch {
        /// Bytes received.
        received: usize,
        /// Declared capacity in bytes.
        capacity: usize,
    },
    /// The meter's button was used.
    Button(ButtonAction),
    /// The torch was switched.
    Torch(bool),
}
