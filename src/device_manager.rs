//! Async driver for the protocol engine.
//!
//! [`DeviceManager`] owns a [`Session`] behind a mutex and runs it on a
//! background task: transport events are fed in as they arrive and timers
//! fire at their deadlines. The presentation layer calls the manager's
//! methods from any task and observes [`EngineEvent`]s through a broadcast
//! receiver or registered callbacks.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ble::backend::BtleBackend;
use crate::ble::connection::ConnectionState;
use crate::ble::discovery::DiscoveryState;
use crate::ble::link::{BtleLink, GattBackend};
use crate::ble::transport::{PeripheralId, Transport, TransportEvent};
use crate::config::Config;
use crate::data::{MultimeterDisplay, ScopeDisplay};
use crate::error::Result;
use crate::events::EngineEvent;
use crate::modes::{MultimeterSelection, OscilloscopeSelection};
use crate::protocol::{
    DeviceInfo, DeviceStatus, DsoCommand, DsoMode, MultimeterMode, Range,
};
use crate::session::{DiscoveredPeripheral, Session};

/// Callback handle for unregistering callbacks.
///
/// The callback is unregistered when the handle is dropped.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// How long shutdown waits for queued link requests to finish.
const LINK_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The executor task behind a [`BtleLink`].
struct LinkTask {
    link: BtleLink,
    handle: JoinHandle<()>,
}

/// Drives a [`Session`] on a background task.
pub struct DeviceManager<T: Transport + 'static = BtleLink> {
    session: Arc<Mutex<Session<T>>>,
    wake: Arc<Notify>,
    callback_counter: AtomicU64,
    driver_handle: RwLock<Option<JoinHandle<()>>>,
    link_task: RwLock<Option<LinkTask>>,
}

impl DeviceManager<BtleLink> {
    /// Create a manager on the system Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(config: Config) -> Result<Self> {
        let backend = Arc::new(BtleBackend::new().await?);
        Ok(Self::with_backend(backend, config))
    }

    /// Create a manager on any GATT backend.
    ///
    /// Must be called within a tokio runtime.
    pub fn with_backend<B: GattBackend>(backend: Arc<B>, config: Config) -> Self {
        let (link, events, handle) = BtleLink::spawn(backend);
        let manager = Self::with_transport(link.clone(), events, config);
        *manager.link_task.write() = Some(LinkTask { link, handle });
        manager
    }
}

impl<T: Transport + 'static> DeviceManager<T> {
    /// Create a manager around an existing transport and its event stream.
    ///
    /// Must be called within a tokio runtime.
    pub fn with_transport(
        transport: T,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        config: Config,
    ) -> Self {
        let session = Arc::new(Mutex::new(Session::new(transport, config)));
        let wake = Arc::new(Notify::new());

        let handle = tokio::spawn(drive(session.clone(), events, wake.clone()));

        Self {
            session,
            wake,
            callback_counter: AtomicU64::new(0),
            driver_handle: RwLock::new(Some(handle)),
            link_task: RwLock::new(None),
        }
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.session.lock().subscribe()
    }

    /// Run `f` with exclusive access to the session.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session<T>) -> R) -> R {
        let result = f(&mut *self.session.lock());
        self.wake.notify_one();
        result
    }

    // === Scanning and connection ===

    /// Start scanning for meters.
    pub fn start_scan(&self) {
        self.with_session(|s| s.start_scan(Instant::now()));
    }

    /// Stop scanning.
    pub fn stop_scan(&self) {
        self.with_session(|s| s.stop_scan());
    }

    /// Check if scanning is active.
    pub fn is_scanning(&self) -> bool {
        self.session.lock().is_scanning()
    }

    /// Meters found by the last scan.
    pub fn discovered_peripherals(&self) -> Vec<DiscoveredPeripheral> {
        self.session.lock().discovered_peripherals()
    }

    /// The discovered meter with the strongest signal.
    pub fn nearest_peripheral(&self) -> Option<DiscoveredPeripheral> {
        self.discovered_peripherals()
            .into_iter()
            .max_by_key(|p| p.rssi.unwrap_or(i16::MIN))
    }

    /// Connect to a discovered meter.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::PeripheralNotFound`] if it was not discovered.
    pub fn connect(&self, id: &PeripheralId) -> Result<()> {
        self.with_session(|s| s.connect(id))
    }

    /// Disconnect from the active meter.
    pub fn disconnect(&self) -> bool {
        self.with_session(|s| s.disconnect())
    }

    /// Connection state of the active meter.
    pub fn connection_state(&self) -> ConnectionState {
        self.session.lock().connection_state()
    }

    /// Discovery progress of the active meter.
    pub fn discovery_state(&self) -> DiscoveryState {
        self.session.lock().discovery_state()
    }

    // === Multimeter ===

    /// Select a multimeter mode.
    pub fn select_multimeter_mode(&self, mode: MultimeterMode) -> bool {
        self.with_session(|s| s.select_multimeter_mode(mode))
    }

    /// Select a multimeter range.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRange`] if the range is not legal.
    pub fn select_multimeter_range(&self, range: Range) -> Result<bool> {
        self.with_session(|s| s.select_multimeter_range(range))
    }

    /// Current multimeter selection.
    pub fn multimeter_selection(&self) -> MultimeterSelection {
        self.session.lock().multimeter_selection()
    }

    /// Legal ranges for a multimeter mode.
    pub fn legal_ranges(&self, mode: MultimeterMode) -> Vec<Range> {
        self.session.lock().legal_ranges(mode)
    }

    /// Multimeter modes with their availability under the mode switch.
    pub fn mode_availability(&self) -> Vec<(MultimeterMode, bool)> {
        self.session.lock().mode_availability()
    }

    /// Current multimeter display.
    pub fn multimeter_display(&self) -> MultimeterDisplay {
        self.session.lock().multimeter_display()
    }

    // === Oscilloscope ===

    /// Select the oscilloscope mode.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidParameter`] for [`DsoMode::Idle`].
    pub fn select_dso_mode(&self, mode: DsoMode) -> Result<bool> {
        self.with_session(|s| s.select_dso_mode(mode))
    }

    /// Select the oscilloscope range.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRange`] if the range is not legal.
    pub fn select_dso_range(&self, range: Range) -> Result<bool> {
        self.with_session(|s| s.select_dso_range(range))
    }

    /// Select the trigger command.
    pub fn select_dso_command(&self, command: DsoCommand) -> bool {
        self.with_session(|s| s.select_dso_command(command))
    }

    /// Set the trigger level.
    pub fn set_trigger_level(&self, level: f32) -> bool {
        self.with_session(|s| s.set_trigger_level(level))
    }

    /// Start acquisition.
    pub fn start_oscilloscope(&self) -> bool {
        self.with_session(|s| s.start_oscilloscope())
    }

    /// Stop acquisition.
    pub fn stop_oscilloscope(&self) -> bool {
        self.with_session(|s| s.stop_oscilloscope())
    }

    /// Current oscilloscope selection.
    pub fn oscilloscope_selection(&self) -> OscilloscopeSelection {
        self.session.lock().oscilloscope_selection()
    }

    /// Legal ranges for an oscilloscope mode.
    pub fn dso_legal_ranges(&self, mode: DsoMode) -> Vec<Range> {
        self.session.lock().dso_legal_ranges(mode)
    }

    /// Current oscilloscope display.
    pub fn scope_display(&self) -> Option<ScopeDisplay> {
        self.session.lock().scope_display()
    }

    /// Samples of the current acquisition, oldest first.
    pub fn waveform(&self) -> Vec<f32> {
        self.session.lock().waveform().samples()
    }

    /// Whether oscilloscope data is arriving.
    pub fn is_acquiring(&self) -> bool {
        self.session.lock().is_acquiring()
    }

    // === Status ===

    /// Switch the torch.
    pub fn set_torch(&self, on: bool) -> bool {
        self.with_session(|s| s.set_torch(on))
    }

    /// Last torch state.
    pub fn torch(&self) -> Option<bool> {
        self.session.lock().torch()
    }

    /// Last device information.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.session.lock().device_info()
    }

    /// Last device status.
    pub fn device_status(&self) -> Option<DeviceStatus> {
        self.session.lock().device_status()
    }

    // === Callbacks ===

    /// Register a callback for every engine event.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!("Callback {} lagged, {} events missed", callback_id, missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Register a callback for discovered meters.
    pub fn on_peripheral_discovered<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&DiscoveredPeripheral) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let EngineEvent::PeripheralDiscovered(peripheral) = event {
                callback(&peripheral);
            }
        })
    }

    /// Register a callback for multimeter display updates.
    pub fn on_multimeter_updated<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&MultimeterDisplay) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let EngineEvent::Multimeter(display) = event {
                callback(&display);
            }
        })
    }

    /// Register a callback for blocks of oscilloscope samples.
    pub fn on_waveform<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&[f32]) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let EngineEvent::Waveform(samples) = event {
                callback(&samples);
            }
        })
    }

    /// Register a callback for connection state changes.
    pub fn on_connection_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&PeripheralId, ConnectionState) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let EngineEvent::ConnectionChanged { peripheral, state } = event {
                callback(&peripheral, state);
            }
        })
    }

    /// Stop scanning, disconnect, and stop the driver task.
    pub async fn shutdown(&self) {
        info!("Shutting down device manager");

        self.with_session(|s| {
            s.stop_scan();
            s.disconnect();
        });

        let handle = self.driver_handle.write().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }

        let task = self.link_task.write().take();
        if let Some(LinkTask { link, mut handle }) = task {
            link.close();
            if tokio::time::timeout(LINK_DRAIN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                warn!("Link requests still pending after {:?}, aborting", LINK_DRAIN_TIMEOUT);
                handle.abort();
            }
        }
    }

    /// Check if the driver task is running.
    pub fn is_running(&self) -> bool {
        self.driver_handle
            .read()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl<T: Transport + 'static> Drop for DeviceManager<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.driver_handle.write().take() {
            handle.abort();
        }
        if let Some(task) = self.link_task.write().take() {
            task.handle.abort();
        }
    }
}

async fn drive<T: Transport + 'static>(
    session: Arc<Mutex<Session<T>>>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    wake: Arc<Notify>,
) {
    loop {
        let deadline = session.lock().next_deadline();

        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    session.lock().handle_event(event, Instant::now());
                }
                None => break,
            },
            _ = sleep_until(deadline) => {
                session.lock().poll_timers(Instant::now());
            }
            _ = wake.notified() => {}
        }
    }

    debug!("Device manager driver ended");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
