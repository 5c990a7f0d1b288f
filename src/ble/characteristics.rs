//! GATT characteristic handling.
//!
//! Service and characteristic discovery, reads, writes and notification
//! subscriptions on one connected meter.

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::ble::transport::{CharacteristicHandle, PeripheralId, TransportEvent};
use crate::error::{Error, Result};
use crate::protocol::codec::hex_preview;

/// Handler for GATT characteristics on a meter.
pub struct CharacteristicHandler {
    /// Identifier reported in forwarded events.
    id: PeripheralId,
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// Cached characteristics by service and characteristic UUID.
    characteristics: Arc<RwLock<HashMap<(Uuid, Uuid), Characteristic>>>,
    /// Handle to the notification listener task.
    listener_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl CharacteristicHandler {
    /// Create a new characteristic handler for a peripheral.
    pub fn new(id: PeripheralId, peripheral: Peripheral) -> Self {
        Self {
            id,
            peripheral,
            characteristics: Arc::new(RwLock::new(HashMap::new())),
            listener_handle: RwLock::new(None),
        }
    }

    /// Discover services and cache their characteristics.
    ///
    /// Returns the UUIDs of every service found.
    pub async fn discover_services(&self) -> Result<Vec<Uuid>> {
        self.peripheral
            .discover_services()
            .await
            .map_err(Error::Bluetooth)?;

        let services = self.peripheral.services();

        let mut chars = self.characteristics.write();
        chars.clear();

        let mut uuids = Vec::with_capacity(services.len());
        for service in services {
            for characteristic in service.characteristics {
                trace!(
                    "Found characteristic: {} in service {}",
                    characteristic.uuid,
                    service.uuid
                );
                chars.insert((service.uuid, characteristic.uuid), characteristic);
            }
            uuids.push(service.uuid);
        }

        debug!(
            "Discovered {} services, {} characteristics",
            uuids.len(),
            chars.len()
        );

        Ok(uuids)
    }

    /// Characteristic UUIDs of a discovered service.
    pub fn characteristics(&self, service: Uuid) -> Vec<Uuid> {
        self.characteristics
            .read()
            .keys()
            .filter(|(s, _)| *s == service)
            .map(|(_, c)| *c)
            .collect()
    }

    /// Check if a characteristic exists.
    pub fn has_characteristic(&self, service: Uuid, uuid: Uuid) -> bool {
        self.characteristics.read().contains_key(&(service, uuid))
    }

    /// Read a characteristic value.
    pub async fn read(&self, service: Uuid, uuid: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.lookup(service, uuid)?;

        let data = self
            .peripheral
            .read(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Read {} bytes from characteristic {}", data.len(), uuid);

        Ok(data)
    }

    /// Write to a characteristic, waiting for the response.
    pub async fn write(&self, service: Uuid, uuid: Uuid, data: &[u8]) -> Result<()> {
        let characteristic = self.lookup(service, uuid)?;

        self.peripheral
            .write(&characteristic, data, WriteType::WithResponse)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Wrote {} to characteristic {}", hex_preview(data), uuid);

        Ok(())
    }

    /// Subscribe to notifications from a characteristic.
    pub async fn subscribe(&self, service: Uuid, uuid: Uuid) -> Result<()> {
        let characteristic = self.lookup(service, uuid)?;

        debug!(
            "Subscribing to {}, properties: {:?}",
            uuid, characteristic.properties
        );

        self.peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| {
                debug!("Failed to subscribe to {}: {:?}", uuid, e);
                Error::Bluetooth(e)
            })?;

        debug!("Subscribed to notifications from {}", uuid);

        Ok(())
    }

    /// Forward notifications to `events` as value updates.
    pub async fn start_notifications(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<()> {
        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(Error::Bluetooth)?;

        let id = self.id.clone();
        let characteristics = self.characteristics.clone();

        let handle = tokio::spawn(async move {
            debug!("Notification listener started for {}", id);

            while let Some(notification) = notifications.next().await {
                trace!(
                    "Notification from {}: {} bytes, data: {}",
                    notification.uuid,
                    notification.value.len(),
                    hex_preview(&notification.value)
                );

                let service = characteristics
                    .read()
                    .keys()
                    .find(|(_, c)| *c == notification.uuid)
                    .map(|(s, _)| *s);

                let Some(service) = service else {
                    error!("Notification from unknown characteristic {}", notification.uuid);
                    continue;
                };

                let event = TransportEvent::ValueUpdated {
                    characteristic: CharacteristicHandle {
                        peripheral: id.clone(),
                        service,
                        uuid: notification.uuid,
                    },
                    data: notification.value,
                };
                if events.send(event).is_err() {
                    break;
                }
            }

            debug!("Notification listener stopped");
        });

        if let Some(previous) = self.listener_handle.write().replace(handle) {
            previous.abort();
        }

        Ok(())
    }

    /// Stop forwarding notifications.
    pub fn stop_notifications(&self) {
        if let Some(handle) = self.listener_handle.write().take() {
            handle.abort();
        }
    }

    fn lookup(&self, service: Uuid, uuid: Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(&(service, uuid))
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }
}

impl Drop for CharacteristicHandler {
    fn drop(&mut self) {
        self.stop_notifications();
    }
}
