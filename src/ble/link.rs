//! Asynchronous link between the session and a GATT backend.
//!
//! [`BtleLink`] implements [`Transport`] by queuing [`GattRequest`]s on a
//! channel. An executor task performs them one at a time against a
//! [`GattBackend`] and reports each outcome as a [`TransportEvent`].

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::ble::transport::{
    CharacteristicHandle, PeripheralId, ServiceHandle, Transport, TransportEvent,
};
use crate::error::Result;

/// A queued request for the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum GattRequest {
    /// Start scanning.
    StartScan,
    /// Stop scanning.
    StopScan,
    /// Connect to a peripheral.
    Connect(PeripheralId),
    /// Disconnect from a peripheral.
    Disconnect(PeripheralId),
    /// Discover the services of a peripheral.
    DiscoverServices(PeripheralId),
    /// Discover the characteristics of a service.
    DiscoverCharacteristics(ServiceHandle),
    /// Read a characteristic.
    Read(CharacteristicHandle),
    /// Write a characteristic.
    Write(CharacteristicHandle, Vec<u8>),
    /// Enable notifications on a characteristic.
    Subscribe(CharacteristicHandle),
    /// Stop the executor once earlier requests are done.
    Close,
}

/// Asynchronous GATT operations.
#[async_trait]
pub trait GattBackend: Send + Sync + 'static {
    /// Begin forwarding unsolicited events such as advertisements,
    /// notifications and link losses.
    async fn start(&self, events: mpsc::UnboundedSender<TransportEvent>) -> Result<()> {
        let _ = events;
        Ok(())
    }

    /// Start scanning.
    async fn start_scan(&self) -> Result<()>;

    /// Stop scanning.
    async fn stop_scan(&self) -> Result<()>;

    /// Connect to a peripheral.
    async fn connect(&self, peripheral: &PeripheralId) -> Result<()>;

    /// Disconnect from a peripheral.
    async fn disconnect(&self, peripheral: &PeripheralId) -> Result<()>;

    /// Discover services, returning their UUIDs.
    async fn discover_services(&self, peripheral: &PeripheralId) -> Result<Vec<Uuid>>;

    /// Characteristic UUIDs of a service.
    async fn discover_characteristics(&self, service: &ServiceHandle) -> Result<Vec<Uuid>>;

    /// Read a characteristic.
    async fn read(&self, characteristic: &CharacteristicHandle) -> Result<Vec<u8>>;

    /// Write a characteristic.
    async fn write(&self, characteristic: &CharacteristicHandle, data: &[u8]) -> Result<()>;

    /// Enable notifications.
    async fn subscribe(&self, characteristic: &CharacteristicHandle) -> Result<()>;
}

/// Request queue implementing [`Transport`].
#[derive(Debug, Clone)]
pub struct BtleLink {
    requests: mpsc::UnboundedSender<GattRequest>,
}

impl BtleLink {
    /// Spawn the executor task for `backend`.
    ///
    /// Returns the link, the receiver of transport events, and the task
    /// handle. The task ends after [`BtleLink::close`] or once every link
    /// clone is dropped.
    pub fn spawn<B: GattBackend>(
        backend: Arc<B>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>, JoinHandle<()>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(run(backend, request_rx, event_tx));

        (
            Self {
                requests: request_tx,
            },
            event_rx,
            handle,
        )
    }

    /// Stop the executor after the requests already queued.
    pub fn close(&self) {
        self.send(GattRequest::Close);
    }

    fn send(&self, request: GattRequest) {
        trace!("Queuing {:?}", request);
        if self.requests.send(request).is_err() {
            warn!("Link executor has stopped, request dropped");
        }
    }
}

impl Transport for BtleLink {
    fn start_scan(&mut self) {
        self.send(GattRequest::StartScan);
    }

    fn stop_scan(&mut self) {
        self.send(GattRequest::StopScan);
    }

    fn connect(&mut self, peripheral: &PeripheralId) {
        self.send(GattRequest::Connect(peripheral.clone()));
    }

    fn disconnect(&mut self, peripheral: &PeripheralId) {
        self.send(GattRequest::Disconnect(peripheral.clone()));
    }

    fn discover_services(&mut self, peripheral: &PeripheralId) {
        self.send(GattRequest::DiscoverServices(peripheral.clone()));
    }

    fn discover_characteristics(&mut self, service: &ServiceHandle) {
        self.send(GattRequest::DiscoverCharacteristics(service.clone()));
    }

    fn read_value(&mut self, characteristic: &CharacteristicHandle) {
        self.send(GattRequest::Read(characteristic.clone()));
    }

    fn write_value(&mut self, characteristic: &CharacteristicHandle, data: &[u8]) {
        self.send(GattRequest::Write(characteristic.clone(), data.to_vec()));
    }

    fn subscribe(&mut self, characteristic: &CharacteristicHandle) {
        self.send(GattRequest::Subscribe(characteristic.clone()));
    }
}

async fn run<B: GattBackend>(
    backend: Arc<B>,
    mut requests: mpsc::UnboundedReceiver<GattRequest>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    if let Err(e) = backend.start(events.clone()).await {
        error!("Failed to start backend event forwarding: {}", e);
    }

    while let Some(request) = requests.recv().await {
        if request == GattRequest::Close {
            break;
        }
        if let Some(event) = execute(backend.as_ref(), request).await {
            if events.send(event).is_err() {
                break;
            }
        }
    }

    debug!("Link executor stopped");
}

/// Perform one request, mapping its outcome to an event.
async fn execute<B: GattBackend + ?Sized>(
    backend: &B,
    request: GattRequest,
) -> Option<TransportEvent> {
    match request {
        GattRequest::StartScan => match backend.start_scan().await {
            Ok(()) => None,
            Err(e) => {
                warn!("Failed to start scan: {}", e);
                Some(TransportEvent::ScanStopped)
            }
        },
        GattRequest::StopScan => {
            if let Err(e) = backend.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
            None
        }
        GattRequest::Connect(id) => match backend.connect(&id).await {
            Ok(()) => Some(TransportEvent::Connected(id)),
            Err(e) => {
                warn!("Failed to connect to {}: {}", id, e);
                Some(TransportEvent::Disconnected(id))
            }
        },
        GattRequest::Disconnect(id) => {
            if let Err(e) = backend.disconnect(&id).await {
                warn!("Failed to disconnect from {}: {}", id, e);
            }
            None
        }
        GattRequest::DiscoverServices(id) => match backend.discover_services(&id).await {
            Ok(services) => Some(TransportEvent::ServicesDiscovered {
                peripheral: id,
                services,
            }),
            Err(e) => {
                warn!("Service discovery on {} failed: {}", id, e);
                None
            }
        },
        GattRequest::DiscoverCharacteristics(service) => {
            match backend.discover_characteristics(&service).await {
                Ok(characteristics) => Some(TransportEvent::CharacteristicsDiscovered {
                    service,
                    characteristics,
                }),
                Err(e) => {
                    warn!(
                        "Characteristic discovery for {} failed: {}",
                        service.uuid, e
                    );
                    None
                }
            }
        }
        GattRequest::Read(characteristic) => match backend.read(&characteristic).await {
            Ok(data) => Some(TransportEvent::ValueUpdated {
                characteristic,
                data,
            }),
            Err(e) => {
                warn!("Read of {} failed: {}", characteristic.uuid, e);
                None
            }
        },
        GattRequest::Write(characteristic, data) => {
            match backend.write(&characteristic, &data).await {
                Ok(()) => Some(TransportEvent::ValueWritten {
                    characteristic,
                    data,
                }),
                Err(e) => {
                    warn!("Write to {} failed: {}", characteristic.uuid, e);
                    None
                }
            }
        }
        GattRequest::Subscribe(characteristic) => {
            let ok = match backend.subscribe(&characteristic).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Subscribe to {} failed: {}", characteristic.uuid, e);
                    false
                }
            };
            Some(TransportEvent::SubscribeStatus { characteristic, ok })
        }
        GattRequest::Close => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ble::uuids::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// Records requests and answers from canned data.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub(crate) requests: Mutex<Vec<GattRequest>>,
        fail_connect: bool,
    }

    #[async_trait]
    impl GattBackend for FakeBackend {
        async fn start_scan(&self) -> Result<()> {
            self.requests.lock().push(GattRequest::StartScan);
            Ok(())
        }

        async fn stop_scan(&self) -> Result<()> {
            self.requests.lock().push(GattRequest::StopScan);
            Ok(())
        }

        async fn connect(&self, peripheral: &PeripheralId) -> Result<()> {
            self.requests
                .lock()
                .push(GattRequest::Connect(peripheral.clone()));
            if self.fail_connect {
                return Err(Error::ConnectionFailed {
                    reason: "out of range".to_string(),
                });
            }
            Ok(())
        }

        async fn disconnect(&self, peripheral: &PeripheralId) -> Result<()> {
            self.requests
                .lock()
                .push(GattRequest::Disconnect(peripheral.clone()));
            Ok(())
        }

        async fn discover_services(&self, _peripheral: &PeripheralId) -> Result<Vec<Uuid>> {
            Ok(vec![STATUS_SERVICE_UUID])
        }

        async fn discover_characteristics(&self, _service: &ServiceHandle) -> Result<Vec<Uuid>> {
            Ok(vec![TORCH_CHARACTERISTIC_UUID])
        }

        async fn read(&self, _characteristic: &CharacteristicHandle) -> Result<Vec<u8>> {
            Ok(vec![1])
        }

        async fn write(&self, characteristic: &CharacteristicHandle, data: &[u8]) -> Result<()> {
            self.requests
                .lock()
                .push(GattRequest::Write(characteristic.clone(), data.to_vec()));
            Ok(())
        }

        async fn subscribe(&self, characteristic: &CharacteristicHandle) -> Result<()> {
            Err(Error::CharacteristicNotFound {
                uuid: characteristic.uuid.to_string(),
            })
        }
    }

    fn torch() -> CharacteristicHandle {
        ServiceHandle::new(PeripheralId::new("m"), STATUS_SERVICE_UUID)
            .characteristic(TORCH_CHARACTERISTIC_UUID)
    }

    #[tokio::test]
    async fn test_requests_map_to_events() {
        let backend = Arc::new(FakeBackend::default());
        let (mut link, mut events, _task) = BtleLink::spawn(backend.clone());
        let id = PeripheralId::new("m");

        link.connect(&id);
        link.discover_services(&id);
        link.write_value(&torch(), &[1]);
        link.subscribe(&torch());

        assert_eq!(events.recv().await, Some(TransportEvent::Connected(id.clone())));
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::ServicesDiscovered {
                peripheral: id.clone(),
                services: vec![STATUS_SERVICE_UUID],
            })
        );
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::ValueWritten {
                characteristic: torch(),
                data: vec![1],
            })
        );
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::SubscribeStatus {
                characteristic: torch(),
                ok: false,
            })
        );

        assert_eq!(
            backend.requests.lock().clone(),
            vec![
                GattRequest::Connect(id),
                GattRequest::Write(torch(), vec![1]),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_connect_reports_disconnect() {
        let backend = Arc::new(FakeBackend {
            fail_connect: true,
            ..Default::default()
        });
        let (mut link, mut events, _task) = BtleLink::spawn(backend);
        let id = PeripheralId::new("m");

        link.connect(&id);
        assert_eq!(events.recv().await, Some(TransportEvent::Disconnected(id)));
    }

    #[tokio::test]
    async fn test_read_reports_value() {
        let (mut link, mut events, _task) = BtleLink::spawn(Arc::new(FakeBackend::default()));

        link.start_scan();
        link.read_value(&torch());

        assert_eq!(
            events.recv().await,
            Some(TransportEvent::ValueUpdated {
                characteristic: torch(),
                data: vec![1],
            })
        );
    }

    #[tokio::test]
    async fn test_close_drains_queue() {
        let backend = Arc::new(FakeBackend::default());
        let (mut link, _events, task) = BtleLink::spawn(backend.clone());
        let id = PeripheralId::new("m");

        link.connect(&id);
        link.disconnect(&id);
        link.close();
        link.start_scan();

        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            backend.requests.lock().clone(),
            vec![GattRequest::Connect(id.clone()), GattRequest::Disconnect(id)]
        );
    }
}
