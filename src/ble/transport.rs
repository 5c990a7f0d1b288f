//! Transport capability consumed by the session.
//!
//! The session never talks to a BLE stack directly. It issues requests
//! through [`Transport`] and receives their outcomes later as
//! [`TransportEvent`]s, in whatever order the stack delivers them.

use uuid::Uuid;

/// Opaque identifier of a peripheral, as assigned by the BLE stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralId(pub String);

impl PeripheralId {
    /// Create a new identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A service on a specific peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceHandle {
    /// The peripheral hosting the service.
    pub peripheral: PeripheralId,
    /// The service UUID.
    pub uuid: Uuid,
}

impl ServiceHandle {
    /// Create a new service handle.
    pub fn new(peripheral: PeripheralId, uuid: Uuid) -> Self {
        Self { peripheral, uuid }
    }

    /// Handle of a characteristic within this service.
    pub fn characteristic(&self, uuid: Uuid) -> CharacteristicHandle {
        CharacteristicHandle {
            peripheral: self.peripheral.clone(),
            service: self.uuid,
            uuid,
        }
    }
}

/// A characteristic on a specific peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    /// The peripheral hosting the characteristic.
    pub peripheral: PeripheralId,
    /// UUID of the owning service.
    pub service: Uuid,
    /// The characteristic UUID.
    pub uuid: Uuid,
}

/// Outcome of a transport request, or an unsolicited notification.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A peripheral was seen while scanning.
    PeripheralDiscovered {
        /// Peripheral identifier.
        id: PeripheralId,
        /// Advertised local name.
        name: Option<String>,
        /// Signal strength in dBm.
        rssi: Option<i16>,
    },
    /// Scanning stopped on the stack's side.
    ScanStopped,
    /// A connection was established.
    Connected(PeripheralId),
    /// A connection was lost or closed.
    Disconnected(PeripheralId),
    /// Service discovery completed.
    ServicesDiscovered {
        /// The peripheral.
        peripheral: PeripheralId,
        /// UUIDs of every primary service found.
        services: Vec<Uuid>,
    },
    /// Characteristic discovery for a service completed.
    CharacteristicsDiscovered {
        /// The service.
        service: ServiceHandle,
        /// UUIDs of the characteristics found.
        characteristics: Vec<Uuid>,
    },
    /// A characteristic value was read or notified.
    ValueUpdated {
        /// The characteristic.
        characteristic: CharacteristicHandle,
        /// The raw value.
        data: Vec<u8>,
    },
    /// A write was confirmed.
    ValueWritten {
        /// The characteristic.
        characteristic: CharacteristicHandle,
        /// The bytes that were written.
        data: Vec<u8>,
    },
    /// A subscription request completed.
    SubscribeStatus {
        /// The characteristic.
        characteristic: CharacteristicHandle,
        /// Whether notifications are now enabled.
        ok: bool,
    },
}

impl TransportEvent {
    /// The peripheral an event concerns, if any.
    pub fn peripheral(&self) -> Option<&PeripheralId> {
        match self {
            Self::PeripheralDiscovered { id, .. } => Some(id),
            Self::ScanStopped => None,
            Self::Connected(id) | Self::Disconnected(id) => Some(id),
            Self::ServicesDiscovered { peripheral, .. } => Some(peripheral),
            Self::CharacteristicsDiscovered { service, .. } => Some(&service.peripheral),
            Self::ValueUpdated { characteristic, .. }
            | Self::ValueWritten { characteristic, .. }
            | Self::SubscribeStatus { characteristic, .. } => Some(&characteristic.peripheral),
        }
    }
}

/// Requests the session issues to the BLE stack.
///
/// Every method only queues the request; completion is reported through a
/// [`TransportEvent`]. Implementations must not call back into the session
/// synchronously.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Start scanning for peripherals.
    fn start_scan(&mut self);

    /// Stop scanning.
    fn stop_scan(&mut self);

    /// Connect to a peripheral.
    fn connect(&mut self, peripheral: &PeripheralId);

    /// Disconnect from a peripheral.
    fn disconnect(&mut self, peripheral: &PeripheralId);

    /// Discover the primary services of a peripheral.
    fn discover_services(&mut self, peripheral: &PeripheralId);

    /// Discover the characteristics of a service.
    fn discover_characteristics(&mut self, service: &ServiceHandle);

    /// Read a characteristic value.
    fn read_value(&mut self, characteristic: &CharacteristicHandle);

    /// Write a characteristic value.
    fn write_value(&mut self, characteristic: &CharacteristicHandle, data: &[u8]);

    /// Enable notifications on a characteristic.
    fn subscribe(&mut self, characteristic: &CharacteristicHandle);
}
