//! The protocol engine session.
//!
//! A [`Session`] owns every piece of engine state for one client: the
//! discovered peripheral list, the discovery orchestrator, the mode state
//! machine and the reading pipeline. It is driven by [`TransportEvent`]s and
//! by timer polls, and issues requests through its [`Transport`]. All
//! methods complete synchronously; the async driver lives in
//! [`DeviceManager`](crate::DeviceManager).

use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::ble::connection::ConnectionState;
use crate::ble::discovery::{DiscoveryOrchestrator, DiscoveryState};
use crate::ble::transport::{PeripheralId, Transport, TransportEvent};
use crate::ble::uuids::CharacteristicRole;
use crate::config::Config;
use crate::data::{MultimeterDisplay, ScopeDisplay, WaveformTrace};
use crate::error::{Error, Result};
use crate::events::EngineEvent;
use crate::modes::{ModeStateMachine, MultimeterSelection, OscilloscopeSelection};
use crate::pipeline::ReadingPipeline;
use crate::protocol::codec::hex_preview;
use crate::protocol::{
    DeviceInfo, DeviceStatus, DsoCommand, DsoMode, DsoSettings, MultimeterMode, Range,
    TorchState, WireRecord,
};
use crate::timer::IdleTimer;

/// Capacity of the engine event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A named peripheral seen while scanning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveredPeripheral {
    /// Identifier to connect with.
    pub id: PeripheralId,
    /// Advertised name.
    pub name: String,
    /// Last signal strength in dBm.
    pub rssi: Option<i16>,
    /// When the peripheral was last seen.
    pub last_seen: DateTime<Utc>,
}

/// Client-side engine for one meter.
pub struct Session<T: Transport> {
    transport: T,
    config: Config,
    discovery: DiscoveryOrchestrator,
    modes: ModeStateMachine,
    pipeline: ReadingPipeline,
    discovered: Vec<DiscoveredPeripheral>,
    scanning: bool,
    scan_timer: IdleTimer,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl<T: Transport> Session<T> {
    /// Create a session issuing requests through `transport`.
    pub fn new(transport: T, config: Config) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            transport,
            discovery: DiscoveryOrchestrator::new(),
            modes: ModeStateMachine::new(&config),
            pipeline: ReadingPipeline::new(&config),
            discovered: Vec::new(),
            scanning: false,
            scan_timer: IdleTimer::new(config.scan_duration),
            event_tx,
            config,
        }
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// The session configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // === Transport events ===

    /// Process one transport event.
    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::PeripheralDiscovered { id, name, rssi } => {
                self.on_peripheral_discovered(id, name, rssi);
            }
            TransportEvent::ScanStopped => {
                if self.scanning {
                    self.finish_scan();
                }
            }
            TransportEvent::Connected(id) => {
                if self.discovery.on_connected(&id, &mut self.transport) {
                    self.publish(EngineEvent::ConnectionChanged {
                        peripheral: id,
                        state: ConnectionState::Connected,
                    });
                    self.publish(EngineEvent::DiscoveryProgress(DiscoveryState::Connected));
                }
            }
            TransportEvent::Disconnected(id) => {
                if self.discovery.on_disconnected(&id) {
                    self.reset_readings();
                    self.publish(EngineEvent::ConnectionChanged {
                        peripheral: id,
                        state: ConnectionState::Disconnected,
                    });
                }
            }
            TransportEvent::ServicesDiscovered {
                peripheral,
                services,
            } => {
                let before = self.discovery.state();
                self.discovery
                    .on_services_discovered(&peripheral, &services, &mut self.transport);
                self.publish_progress(before);
            }
            TransportEvent::CharacteristicsDiscovered {
                service,
                characteristics,
            } => {
                let before = self.discovery.state();
                self.discovery.on_characteristics_discovered(
                    &service,
                    &characteristics,
                    &mut self.transport,
                );
                self.publish_progress(before);
            }
            TransportEvent::ValueUpdated {
                characteristic,
                data,
            } => {
                let Some(role) = self.discovery.role_of(&characteristic) else {
                    trace!("Ignoring value from unresolved {}", characteristic.uuid);
                    return;
                };
                let events = self.pipeline.handle_value(role, &data, now);
                let status_changed = role == CharacteristicRole::Status && !events.is_empty();
                for event in events {
                    self.publish(event);
                }
                if status_changed {
                    self.apply_mode_switch();
                }
            }
            TransportEvent::ValueWritten {
                characteristic,
                data,
            } => {
                if let Some(role) = self.discovery.role_of(&characteristic) {
                    for event in self.pipeline.handle_written(role, &data) {
                        self.publish(event);
                    }
                }
            }
            TransportEvent::SubscribeStatus { characteristic, ok } => {
                self.discovery.on_subscribe_status(&characteristic, ok);
            }
        }
    }

    // === Timers ===

    /// Fire every timer whose deadline has passed.
    pub fn poll_timers(&mut self, now: Instant) {
        for event in self.pipeline.poll_timers(now) {
            if event == EngineEvent::Acquiring(false) && self.modes.halt_oscilloscope() {
                debug!("Oscilloscope acquisition ended");
            }
            self.publish(event);
        }

        if self.scan_timer.poll(now) {
            info!("Scan duration elapsed");
            self.stop_scan();
        }
    }

    /// Earliest armed timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.pipeline.next_deadline(), self.scan_timer.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    // === Scanning and connection ===

    /// Start scanning. The discovered list is cleared and the scan stops by
    /// itself after the configured duration.
    pub fn start_scan(&mut self, now: Instant) {
        if self.scanning {
            debug!("Already scanning, ignoring start request");
            return;
        }

        info!("Starting scan for meters");
        self.discovered.clear();
        self.transport.start_scan();
        self.scanning = true;
        self.scan_timer.restart(now);
        self.publish(EngineEvent::ScanStarted);
    }

    /// Stop scanning.
    pub fn stop_scan(&mut self) {
        if !self.scanning {
            return;
        }
        info!("Stopping scan");
        self.transport.stop_scan();
        self.finish_scan();
    }

    /// Check if scanning.
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Peripherals discovered by the last scan.
    pub fn discovered_peripherals(&self) -> Vec<DiscoveredPeripheral> {
        self.discovered.clone()
    }

    /// Connect to a discovered peripheral.
    ///
    /// Scanning stops, and any other active peripheral is disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeripheralNotFound`] if `id` was not discovered.
    pub fn connect(&mut self, id: &PeripheralId) -> Result<()> {
        if !self.discovered.iter().any(|p| &p.id == id) {
            return Err(Error::PeripheralNotFound {
                identifier: id.to_string(),
            });
        }

        self.stop_scan();

        if self.discovery.is_active(id) {
            debug!("Already connected or connecting to {}", id);
            return Ok(());
        }
        self.disconnect();

        info!("Connecting to {}", id);
        self.discovery.begin(id.clone());
        self.transport.connect(id);
        self.publish(EngineEvent::ConnectionChanged {
            peripheral: id.clone(),
            state: ConnectionState::Connecting,
        });
        Ok(())
    }

    /// Disconnect from the active peripheral.
    ///
    /// Returns `false` if there was none.
    pub fn disconnect(&mut self) -> bool {
        let Some(id) = self.discovery.peripheral().cloned() else {
            return false;
        };

        info!("Disconnecting from {}", id);
        self.transport.disconnect(&id);
        self.discovery.reset();
        self.reset_readings();
        self.publish(EngineEvent::ConnectionChanged {
            peripheral: id,
            state: ConnectionState::Disconnected,
        });
        true
    }

    /// Connection state of the active peripheral.
    pub fn connection_state(&self) -> ConnectionState {
        match self.discovery.state() {
            DiscoveryState::Disconnected => ConnectionState::Disconnected,
            DiscoveryState::Connecting => ConnectionState::Connecting,
            _ => ConnectionState::Connected,
        }
    }

    /// Discovery progress on the active peripheral.
    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    /// The active peripheral.
    pub fn active_peripheral(&self) -> Option<&PeripheralId> {
        self.discovery.peripheral()
    }

    // === Selections ===

    /// Select a multimeter mode. Returns `true` if the settings were written.
    pub fn select_multimeter_mode(&mut self, mode: MultimeterMode) -> bool {
        let settings = self.modes.select_multimeter_mode(mode);
        self.write_record(CharacteristicRole::MultimeterSettings, settings.encode())
    }

    /// Select a multimeter range. Returns `true` if the settings were written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if the range is not legal for the
    /// selected mode.
    pub fn select_multimeter_range(&mut self, range: Range) -> Result<bool> {
        let settings = self.modes.select_multimeter_range(range)?;
        Ok(self.write_record(CharacteristicRole::MultimeterSettings, settings.encode()))
    }

    /// Select the oscilloscope mode. Settings are written only while running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for [`DsoMode::Idle`].
    pub fn select_dso_mode(&mut self, mode: DsoMode) -> Result<bool> {
        let settings = self.modes.select_dso_mode(mode)?;
        Ok(self.write_dso(settings))
    }

    /// Select the oscilloscope range. Settings are written only while running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if the range is not legal for the mode.
    pub fn select_dso_range(&mut self, range: Range) -> Result<bool> {
        let settings = self.modes.select_dso_range(range)?;
        Ok(self.write_dso(settings))
    }

    /// Select the trigger command. Settings are written only while running.
    pub fn select_dso_command(&mut self, command: DsoCommand) -> bool {
        let settings = self.modes.select_dso_command(command);
        self.write_dso(settings)
    }

    /// Set the trigger level. Settings are written only while running.
    pub fn set_trigger_level(&mut self, level: f32) -> bool {
        let settings = self.modes.set_trigger_level(level);
        self.write_dso(settings)
    }

    /// Start oscilloscope acquisition.
    pub fn start_oscilloscope(&mut self) -> bool {
        let settings = self.modes.start_oscilloscope();
        self.write_record(CharacteristicRole::DsoSettings, settings.encode())
    }

    /// Stop oscilloscope acquisition.
    pub fn stop_oscilloscope(&mut self) -> bool {
        let settings = self.modes.stop_oscilloscope();
        self.write_record(CharacteristicRole::DsoSettings, settings.encode())
    }

    /// Switch the torch on or off.
    pub fn set_torch(&mut self, on: bool) -> bool {
        self.write_record(CharacteristicRole::Torch, TorchState { on }.encode())
    }

    // === Queries ===

    /// Last device information.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.pipeline.device_info().copied()
    }

    /// Last device status.
    pub fn device_status(&self) -> Option<DeviceStatus> {
        self.pipeline.device_status().copied()
    }

    /// Last torch state.
    pub fn torch(&self) -> Option<bool> {
        self.pipeline.torch()
    }

    /// Current multimeter selection.
    pub fn multimeter_selection(&self) -> MultimeterSelection {
        self.modes.multimeter_selection()
    }

    /// Current oscilloscope selection.
    pub fn oscilloscope_selection(&self) -> OscilloscopeSelection {
        self.modes.oscilloscope_selection()
    }

    /// Legal ranges for a multimeter mode.
    pub fn legal_ranges(&self, mode: MultimeterMode) -> Vec<Range> {
        self.modes.legal_ranges(mode)
    }

    /// Legal ranges for an oscilloscope mode.
    pub fn dso_legal_ranges(&self, mode: DsoMode) -> Vec<Range> {
        self.modes.dso_legal_ranges(mode)
    }

    /// Every multimeter mode with its availability under the mode switch.
    pub fn mode_availability(&self) -> Vec<(MultimeterMode, bool)> {
        self.modes.mode_availability()
    }

    /// Current multimeter display.
    pub fn multimeter_display(&self) -> MultimeterDisplay {
        self.pipeline.multimeter().clone()
    }

    /// Current oscilloscope display.
    pub fn scope_display(&self) -> Option<ScopeDisplay> {
        self.pipeline.scope().cloned()
    }

    /// Waveform trace of the current acquisition.
    pub fn waveform(&self) -> &WaveformTrace {
        self.pipeline.waveform()
    }

    /// Whether oscilloscope data is arriving.
    pub fn is_acquiring(&self) -> bool {
        self.pipeline.is_acquiring()
    }

    // === Internals ===

    fn on_peripheral_discovered(
        &mut self,
        id: PeripheralId,
        name: Option<String>,
        rssi: Option<i16>,
    ) {
        if !self.config.accepts_name(name.as_deref()) {
            trace!("Filtered peripheral {} ({:?})", id, name);
            return;
        }
        let name = name.unwrap_or_default();
        let last_seen = Utc::now();

        let peripheral = match self.discovered.iter_mut().find(|p| p.id == id) {
            Some(existing) => {
                existing.name = name;
                existing.rssi = rssi.or(existing.rssi);
                existing.last_seen = last_seen;
                existing.clone()
            }
            None => {
                info!("Discovered {} ({})", name, id);
                let peripheral = DiscoveredPeripheral {
                    id,
                    name,
                    rssi,
                    last_seen,
                };
                self.discovered.push(peripheral.clone());
                peripheral
            }
        };

        self.publish(EngineEvent::PeripheralDiscovered(peripheral));
    }

    fn finish_scan(&mut self) {
        self.scanning = false;
        self.scan_timer.stop();
        self.publish(EngineEvent::ScanStopped);
    }

    fn reset_readings(&mut self) {
        for event in self.pipeline.reset() {
            self.publish(event);
        }
        self.modes.halt_oscilloscope();
    }

    fn apply_mode_switch(&mut self) {
        let Some(status) = self.pipeline.device_status() else {
            return;
        };
        if self.modes.set_mode_switch(status.mode_switch) {
            self.publish(EngineEvent::ModeAvailability(self.modes.mode_availability()));
        }
    }

    fn write_dso(&mut self, settings: Option<DsoSettings>) -> bool {
        match settings {
            Some(settings) => {
                self.write_record(CharacteristicRole::DsoSettings, settings.encode())
            }
            None => false,
        }
    }

    fn write_record(&mut self, role: CharacteristicRole, data: Vec<u8>) -> bool {
        let Some(handle) = self.discovery.resolve(role) else {
            debug!("{:?} characteristic not resolved, nothing written", role);
            return false;
        };

        debug!("Writing {:?}: {}", role, hex_preview(&data));
        self.transport.write_value(handle, &data);
        true
    }

    fn publish_progress(&self, before: DiscoveryState) {
        let after = self.discovery.state();
        if after != before {
            self.publish(EngineEvent::DiscoveryProgress(after));
        }
    }

    fn publish(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peripheral", &self.discovery.peripheral())
            .field("discovery", &self.discovery.state())
            .field("scanning", &self.scanning)
            .field("discovered", &self.discovered.len())
            .finish()
    }
}
