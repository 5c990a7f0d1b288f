//! BLE communication module.
//!
//! The session-facing transport abstraction, the discovery orchestrator and
//! UUID registry, and the btleplug glue that drives a real adapter.

pub mod backend;
pub mod characteristics;
pub mod connection;
pub mod discovery;
pub mod link;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use backend::BtleBackend;
pub use characteristics::CharacteristicHandler;
pub use connection::{ConnectionManager, ConnectionState};
pub use discovery::{DiscoveryOrchestrator, DiscoveryState, SubscriptionState};
pub use link::{BtleLink, GattBackend, GattRequest};
pub use scanner::BleScanner;
pub use transport::{CharacteristicHandle, PeripheralId, ServiceHandle, Transport, TransportEvent};
pub use uuids::*;
