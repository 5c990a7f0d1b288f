//! btleplug implementation of [`GattBackend`].

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ble::characteristics::CharacteristicHandler;
use crate::ble::connection::ConnectionManager;
use crate::ble::link::GattBackend;
use crate::ble::scanner::BleScanner;
use crate::ble::transport::{CharacteristicHandle, PeripheralId, ServiceHandle, TransportEvent};
use crate::error::{Error, Result};

/// Connection and GATT state for one meter.
struct MeterLink {
    connection: ConnectionManager,
    characteristics: CharacteristicHandler,
}

/// GATT backend on the system Bluetooth adapter.
pub struct BtleBackend {
    scanner: BleScanner,
    links: RwLock<HashMap<PeripheralId, Arc<MeterLink>>>,
    events: RwLock<Option<mpsc::UnboundedSender<TransportEvent>>>,
}

impl BtleBackend {
    /// Create a backend on the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Ok(Self::with_scanner(BleScanner::new().await?))
    }

    /// Create a backend around an existing scanner.
    pub fn with_scanner(scanner: BleScanner) -> Self {
        Self {
            scanner,
            links: RwLock::new(HashMap::new()),
            events: RwLock::new(None),
        }
    }

    /// The scanner used for discovery.
    pub fn scanner(&self) -> &BleScanner {
        &self.scanner
    }

    fn link(&self, id: &PeripheralId) -> Result<Arc<MeterLink>> {
        self.links.read().get(id).cloned().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl GattBackend for BtleBackend {
    async fn start(&self, events: mpsc::UnboundedSender<TransportEvent>) -> Result<()> {
        *self.events.write() = Some(events.clone());
        self.scanner.listen(events).await
    }

    async fn start_scan(&self) -> Result<()> {
        self.scanner.start_scanning().await
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scanner.stop_scanning().await
    }

    async fn connect(&self, peripheral: &PeripheralId) -> Result<()> {
        let handle = self.scanner.peripheral(peripheral)?;
        let link = Arc::new(MeterLink {
            connection: ConnectionManager::new(handle.clone()),
            characteristics: CharacteristicHandler::new(peripheral.clone(), handle),
        });

        link.connection.connect().await?;
        debug!("Link to {} is {}", peripheral, link.connection.state());

        if let Some(previous) = self.links.write().insert(peripheral.clone(), link) {
            previous.characteristics.stop_notifications();
        }
        Ok(())
    }

    async fn disconnect(&self, peripheral: &PeripheralId) -> Result<()> {
        let removed = self.links.write().remove(peripheral);
        let Some(link) = removed else {
            debug!("No link to {}", peripheral);
            return Ok(());
        };

        link.characteristics.stop_notifications();
        link.connection.disconnect().await
    }

    async fn discover_services(&self, peripheral: &PeripheralId) -> Result<Vec<Uuid>> {
        let link = self.link(peripheral)?;
        let services = link.characteristics.discover_services().await?;

        let events = self.events.read().clone();
        match events {
            Some(events) => link.characteristics.start_notifications(events).await?,
            None => warn!("Backend not started, notifications from {} dropped", peripheral),
        }

        Ok(services)
    }

    async fn discover_characteristics(&self, service: &ServiceHandle) -> Result<Vec<Uuid>> {
        let link = self.link(&service.peripheral)?;
        Ok(link.characteristics.characteristics(service.uuid))
    }

    async fn read(&self, characteristic: &CharacteristicHandle) -> Result<Vec<u8>> {
        let link = self.link(&characteristic.peripheral)?;
        link.characteristics
            .read(characteristic.service, characteristic.uuid)
            .await
    }

    async fn write(&self, characteristic: &CharacteristicHandle, data: &[u8]) -> Result<()> {
        let link = self.link(&characteristic.peripheral)?;
        link.characteristics
            .write(characteristic.service, characteristic.uuid, data)
            .await
    }

    async fn subscribe(&self, characteristic: &CharacteristicHandle) -> Result<()> {
        let link = self.link(&characteristic.peripheral)?;
        link.characteristics
            .subscribe(characteristic.service, characteristic.uuid)
            .await
    }
}
