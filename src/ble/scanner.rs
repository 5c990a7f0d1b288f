//! BLE scanning functionality.
//!
//! Wraps the adapter: starts and stops scans, and forwards central events as
//! [`TransportEvent`]s.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::ble::transport::{PeripheralId, TransportEvent};
use crate::error::{Error, Result};

/// BLE scanner for discovering meters.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Whether scanning is currently active.
    is_scanning: Arc<RwLock<bool>>,
    /// Peripherals seen so far, by identifier.
    known: Arc<RwLock<HashMap<String, Peripheral>>>,
    /// Handle to the central event task.
    listener_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl BleScanner {
    /// Create a scanner on the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            is_scanning: Arc::new(RwLock::new(false)),
            known: Arc::new(RwLock::new(HashMap::new())),
            listener_handle: RwLock::new(None),
        }
    }

    /// Forward central events to `events` until the scanner is dropped.
    ///
    /// Discoveries are forwarded only while scanning; disconnections always.
    pub async fn listen(&self, events: mpsc::UnboundedSender<TransportEvent>) -> Result<()> {
        let mut central_events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        let adapter = self.adapter.clone();
        let is_scanning = self.is_scanning.clone();
        let known = self.known.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                if let Some(event) = Self::handle_event(event, &adapter, &is_scanning, &known).await
                {
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }

            debug!("Central event loop ended");
        });

        if let Some(previous) = self.listener_handle.write().replace(handle) {
            previous.abort();
        }

        Ok(())
    }

    /// Start scanning for meters.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning cannot be started.
    pub async fn start_scanning(&self) -> Result<()> {
        if self.is_scanning() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan for meters");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        *self.is_scanning.write() = true;
        Ok(())
    }

    /// Stop scanning for meters.
    pub async fn stop_scanning(&self) -> Result<()> {
        if !self.is_scanning() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        *self.is_scanning.write() = false;
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        *self.is_scanning.read()
    }

    /// Look up a peripheral seen by this scanner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeripheralNotFound`] if it was never seen.
    pub fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral> {
        self.known
            .read()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| Error::PeripheralNotFound {
                identifier: id.to_string(),
            })
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn handle_event(
        event: CentralEvent,
        adapter: &Adapter,
        is_scanning: &RwLock<bool>,
        known: &RwLock<HashMap<String, Peripheral>>,
    ) -> Option<TransportEvent> {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                if !*is_scanning.read() {
                    return None;
                }
                trace!("Device seen: {:?}", id);
                Self::process_peripheral(adapter, id, known).await
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
                Some(TransportEvent::Disconnected(PeripheralId::new(id.to_string())))
            }
            CentralEvent::DeviceConnected(id) => {
                debug!("Device connected: {:?}", id);
                None
            }
            _ => None,
        }
    }

    async fn process_peripheral(
        adapter: &Adapter,
        id: btleplug::platform::PeripheralId,
        known: &RwLock<HashMap<String, Peripheral>>,
    ) -> Option<TransportEvent> {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            Ok(None) => return None,
            Err(e) => {
                error!("Failed to read properties of {:?}: {}", id, e);
                return None;
            }
        };

        let identifier = id.to_string();
        let event = discovery_event(&identifier, properties.local_name, properties.rssi)?;
        known.write().insert(identifier, peripheral);
        Some(event)
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        *self.is_scanning.write() = false;
        if let Some(handle) = self.listener_handle.write().take() {
            handle.abort();
        }
    }
}

/// Build a discovery event, dropping peripherals that advertise no name.
pub(crate) fn discovery_event(
    identifier: &str,
    name: Option<String>,
    rssi: Option<i16>,
) -> Option<TransportEvent> {
    let name = name.filter(|n| !n.is_empty())?;

    Some(TransportEvent::PeripheralDiscovered {
        id: PeripheralId::new(identifier),
        name: Some(name),
        rssi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unnamed_peripherals_dropped() {
        assert!(discovery_event("aa", None, Some(-50)).is_none());
        assert!(discovery_event("aa", Some(String::new()), Some(-50)).is_none());
    }

    #[test]
    fn test_named_peripheral_event() {
        let event = discovery_event("aa", Some("PokitPro".to_string()), Some(-42));
        assert_eq!(
            event,
            Some(TransportEvent::PeripheralDiscovered {
                id: PeripheralId::new("aa"),
                name: Some("PokitPro".to_string()),
                rssi: Some(-42),
            })
        );
    }
}
