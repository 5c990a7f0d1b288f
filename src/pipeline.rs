//! Reading pipeline.
//!
//! Decodes values from subscribed characteristics, keeps the latest
//! snapshots and turns them into [`EngineEvent`]s. Undecodable payloads are
//! dropped without touching any snapshot.

use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::ble::uuids::CharacteristicRole;
use crate::config::Config;
use crate::data::{DeviceDetails, MultimeterDisplay, ScopeDisplay, StatusDisplay, WaveformTrace};
use crate::error::Result;
use crate::events::EngineEvent;
use crate::protocol::codec::hex_preview;
use crate::protocol::{
    ButtonEvent, DeviceInfo, DeviceStatus, DsoMetadata, DsoReading, MultimeterReading, TorchState,
    WireRecord,
};
use crate::timer::IdleTimer;

/// Decoded state of the connected meter.
#[derive(Debug)]
pub struct ReadingPipeline {
    device_info: Option<DeviceInfo>,
    status: Option<DeviceStatus>,
    torch: Option<bool>,
    multimeter: MultimeterDisplay,
    multimeter_timer: IdleTimer,
    scope: Option<ScopeDisplay>,
    dso_scale: f32,
    waveform: WaveformTrace,
    acquiring: bool,
    dso_timer: IdleTimer,
}

impl ReadingPipeline {
    /// Create a pipeline with timers and trace capacity from `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            device_info: None,
            status: None,
            torch: None,
            multimeter: MultimeterDisplay::default(),
            multimeter_timer: IdleTimer::new(config.multimeter_idle_timeout),
            scope: None,
            dso_scale: 1.0,
            waveform: WaveformTrace::new(config.waveform_capacity),
            acquiring: false,
            dso_timer: IdleTimer::new(config.dso_idle_timeout),
        }
    }

    /// Process a value read or notified from a characteristic.
    pub fn handle_value(
        &mut self,
        role: CharacteristicRole,
        data: &[u8],
        now: Instant,
    ) -> Vec<EngineEvent> {
        trace!(
            "{:?} value: {} bytes, data: {}",
            role,
            data.len(),
            hex_preview(data)
        );

        let result = match role {
            CharacteristicRole::DeviceInfo => self.on_device_info(data),
            CharacteristicRole::Status => self.on_status(data),
            CharacteristicRole::Torch => self.on_torch(data),
            CharacteristicRole::Button => self.on_button(data),
            CharacteristicRole::MultimeterReading => self.on_multimeter_reading(data, now),
            CharacteristicRole::DsoMetadata => self.on_dso_metadata(data),
            CharacteristicRole::DsoReading => Ok(self.on_dso_reading(data, now)),
            CharacteristicRole::FlashLed
            | CharacteristicRole::MultimeterSettings
            | CharacteristicRole::DsoSettings => {
                debug!("Ignoring value of write-only {:?} characteristic", role);
                Ok(Vec::new())
            }
        };

        result.unwrap_or_else(|e| {
            warn!("Dropping {:?} payload ({}): {}", role, hex_preview(data), e);
            Vec::new()
        })
    }

    /// Process a confirmed write.
    ///
    /// Only the torch reflects written values back into the display.
    pub fn handle_written(&mut self, role: CharacteristicRole, data: &[u8]) -> Vec<EngineEvent> {
        match role {
            CharacteristicRole::Torch => self.on_torch(data).unwrap_or_else(|e| {
                debug!("Ignoring torch write confirmation: {}", e);
                Vec::new()
            }),
            _ => {
                trace!("{:?} write confirmed", role);
                Vec::new()
            }
        }
    }

    /// Fire expired idle timers.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        if self.multimeter_timer.poll(now) {
            debug!("No multimeter reading received, display idle");
            self.multimeter = self.multimeter.idle();
            events.push(EngineEvent::Multimeter(self.multimeter.clone()));
        }

        if self.dso_timer.poll(now) {
            debug!("No oscilloscope data received, acquisition stopped");
            self.acquiring = false;
            events.push(EngineEvent::Acquiring(false));
        }

        events
    }

    /// Earliest armed timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.multimeter_timer.next_deadline(),
            self.dso_timer.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Stop the idle timers after a disconnect and return the display to
    /// idle.
    ///
    /// The last values stay visible. Returns the events for whatever
    /// changed.
    pub fn reset(&mut self) -> Vec<EngineEvent> {
        self.multimeter_timer.stop();
        self.dso_timer.stop();

        let mut events = Vec::new();
        if self.multimeter.active {
            self.multimeter = self.multimeter.idle();
            events.push(EngineEvent::Multimeter(self.multimeter.clone()));
        }
        if self.acquiring {
            self.acquiring = false;
            events.push(EngineEvent::Acquiring(false));
        }
        events
    }

    /// Last device information.
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    /// Last device status.
    pub fn device_status(&self) -> Option<&DeviceStatus> {
        self.status.as_ref()
    }

    /// Last torch state.
    pub fn torch(&self) -> Option<bool> {
        self.torch
    }

    /// Current multimeter display.
    pub fn multimeter(&self) -> &MultimeterDisplay {
        &self.multimeter
    }

    /// Current oscilloscope display.
    pub fn scope(&self) -> Option<&ScopeDisplay> {
        self.scope.as_ref()
    }

    /// The waveform trace of the current acquisition.
    pub fn waveform(&self) -> &WaveformTrace {
        &self.waveform
    }

    /// Whether oscilloscope data is arriving.
    pub fn is_acquiring(&self) -> bool {
        self.acquiring
    }

    fn on_device_info(&mut self, data: &[u8]) -> Result<Vec<EngineEvent>> {
        let info = DeviceInfo::decode(data)?;
        debug!(
            "Device info: firmware {}, MAC {}",
            info.firmware_version(),
            info.mac_address_string()
        );
        self.device_info = Some(info);
        Ok(vec![EngineEvent::DeviceInfo(DeviceDetails::from(&info))])
    }

    fn on_status(&mut self, data: &[u8]) -> Result<Vec<EngineEvent>> {
        let status = DeviceStatus::decode(data)?;
        debug!(
            "Status: {}, battery {:.2} V, switch {}",
            status.state, status.battery_voltage, status.mode_switch
        );
        self.status = Some(status);
        Ok(vec![EngineEvent::Status(StatusDisplay::from(&status))])
    }

    fn on_torch(&mut self, data: &[u8]) -> Result<Vec<EngineEvent>> {
        let torch = TorchState::decode(data)?;
        self.torch = Some(torch.on);
        Ok(vec![EngineEvent::Torch(torch.on)])
    }

    fn on_button(&mut self, data: &[u8]) -> Result<Vec<EngineEvent>> {
        let event = ButtonEvent::decode(data)?;
        debug!("Button {:?}", event.action);
        Ok(vec![EngineEvent::Button(event.action)])
    }

    fn on_multimeter_reading(
        &mut self,
        data: &[u8],
        now: Instant,
    ) -> Result<Vec<EngineEvent>> {
        let reading = MultimeterReading::decode(data)?;
        self.multimeter = MultimeterDisplay::from_reading(&reading);
        self.multimeter_timer.restart(now);
        Ok(vec![EngineEvent::Multimeter(self.multimeter.clone())])
    }

    fn on_dso_metadata(&mut self, data: &[u8]) -> Result<Vec<EngineEvent>> {
        let metadata = DsoMetadata::decode(data)?;
        let scope = ScopeDisplay::from_metadata(&metadata);
        debug!(
            "Oscilloscope metadata: {} {} scale {}, {} samples over {} us",
            scope.mode_label,
            scope.range_label,
            metadata.scale,
            metadata.samples,
            metadata.window_us
        );

        self.dso_scale = metadata.scale;
        self.waveform.reset(scope.sample_interval_ms);
        self.scope = Some(scope.clone());
        Ok(vec![EngineEvent::Scope(scope)])
    }

    fn on_dso_reading(&mut self, data: &[u8], now: Instant) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        let payload = if data.len() > DsoReading::CAPACITY_BYTES {
            warn!(
                "Oscilloscope reading size mismatch, received {}, expected {}",
                data.len(),
                DsoReading::CAPACITY_BYTES
            );
            events.push(EngineEvent::SizeMismatch {
                received: data.len(),
                capacity: DsoReading::CAPACITY_BYTES,
            });
            &data[..DsoReading::CAPACITY_BYTES]
        } else {
            data
        };

        let reading = match DsoReading::decode(payload) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Dropping oscilloscope reading: {}", e);
                return events;
            }
        };

        let block = reading.scaled(self.dso_scale);
        self.waveform.extend(&block);
        self.dso_timer.restart(now);
        if !self.acquiring {
            self.acquiring = true;
            events.push(EngineEvent::Acquiring(true));
        }
        events.push(EngineEvent::Waveform(block));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        ButtonAction, DeviceState, DsoMode, DsoStatus, ModeSwitchPosition, MultimeterMode, Range,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn pipeline() -> ReadingPipeline {
        ReadingPipeline::new(&Config::default())
    }

    fn metadata_bytes(scale: f32) -> Vec<u8> {
        DsoMetadata {
            status: DsoStatus::Sampling,
            scale,
            mode: DsoMode::Vdc,
            range: Range(1),
            window_us: 100_000,
            samples: 1000,
            sampling_rate: 10_000,
            spare: [0; 5],
        }
        .encode()
    }

    fn reading_bytes(mode: MultimeterMode, value: f32) -> Vec<u8> {
        MultimeterReading {
            status: 0,
            value,
            mode,
            range: Range(2),
        }
        .encode()
    }

    #[test]
    fn test_scaled_waveform() {
        let mut pipeline = pipeline();
        let now = Instant::now();
        pipeline.handle_value(CharacteristicRole::DsoMetadata, &metadata_bytes(2.0), now);

        let events = pipeline.handle_value(
            CharacteristicRole::DsoReading,
            &100i16.to_le_bytes(),
            now,
        );
        assert_eq!(
            events,
            vec![EngineEvent::Acquiring(true), EngineEvent::Waveform(vec![200.0])]
        );
        assert_eq!(pipeline.waveform().samples(), vec![200.0]);
    }

    #[test]
    fn test_reading_sample_count_from_length() {
        let mut pipeline = pipeline();
        let events = pipeline.handle_value(
            CharacteristicRole::DsoReading,
            &[0u8; 44],
            Instant::now(),
        );
        match events.last() {
            Some(EngineEvent::Waveform(block)) => assert_eq!(block.len(), 22),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_oversized_reading() {
        let mut pipeline = pipeline();
        let events = pipeline.handle_value(
            CharacteristicRole::DsoReading,
            &[1u8; 200],
            Instant::now(),
        );
        assert_eq!(
            events[0],
            EngineEvent::SizeMismatch {
                received: 200,
                capacity: 176
            }
        );
        match events.last() {
            Some(EngineEvent::Waveform(block)) => assert_eq!(block.len(), 88),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(pipeline.waveform().len(), 88);
    }

    #[test]
    fn test_odd_reading_dropped() {
        let mut pipeline = pipeline();
        let events = pipeline.handle_value(
            CharacteristicRole::DsoReading,
            &[0u8; 5],
            Instant::now(),
        );
        assert!(events.is_empty());
        assert!(!pipeline.is_acquiring());
    }

    #[test]
    fn test_metadata_clears_trace() {
        let mut pipeline = pipeline();
        let now = Instant::now();
        pipeline.handle_value(CharacteristicRole::DsoReading, &[0u8; 8], now);
        assert_eq!(pipeline.waveform().len(), 4);

        pipeline.handle_value(CharacteristicRole::DsoMetadata, &metadata_bytes(0.5), now);
        assert!(pipeline.waveform().is_empty());
        let scope = pipeline.scope().unwrap();
        assert!((scope.units_per_division - 2.0 / 3.0).abs() < 1e-6);
        assert!((scope.ms_per_division - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_multimeter_idle_after_exactly_500ms() {
        let mut pipeline = pipeline();
        let start = Instant::now();
        let events = pipeline.handle_value(
            CharacteristicRole::MultimeterReading,
            &reading_bytes(MultimeterMode::DcVoltage, 1.25),
            start,
        );
        assert!(matches!(&events[..], [EngineEvent::Multimeter(d)] if d.active));
        assert_eq!(pipeline.next_deadline(), Some(start + Duration::from_millis(500)));

        assert!(pipeline
            .poll_timers(start + Duration::from_millis(499))
            .is_empty());
        assert_eq!(pipeline.multimeter().mode_label, "DC Voltage");

        let events = pipeline.poll_timers(start + Duration::from_millis(500));
        assert_eq!(events.len(), 1);
        assert_eq!(pipeline.multimeter().mode_label, "Idle");
        assert!(!pipeline.multimeter().active);
        assert_eq!(pipeline.multimeter().value, 1.25);
    }

    #[test]
    fn test_dso_timer_clears_acquiring() {
        let mut pipeline = pipeline();
        let start = Instant::now();
        pipeline.handle_value(CharacteristicRole::DsoReading, &[0u8; 2], start);
        assert!(pipeline.is_acquiring());

        let events = pipeline.poll_timers(start + Duration::from_millis(500));
        assert_eq!(events, vec![EngineEvent::Acquiring(false)]);
        assert!(!pipeline.is_acquiring());
    }

    #[test]
    fn test_decode_error_leaves_state() {
        let mut pipeline = pipeline();
        let now = Instant::now();
        pipeline.handle_value(
            CharacteristicRole::MultimeterReading,
            &reading_bytes(MultimeterMode::Resistance, 47.0),
            now,
        );

        let events = pipeline.handle_value(CharacteristicRole::MultimeterReading, &[0, 1], now);
        assert!(events.is_empty());
        assert_eq!(pipeline.multimeter().value, 47.0);
        assert_eq!(pipeline.multimeter().range_label, "330R~890R");
    }

    #[test]
    fn test_status_and_button() {
        let mut pipeline = pipeline();
        let now = Instant::now();
        let status = DeviceStatus {
            state: DeviceState::DcVoltage,
            battery_voltage: 4.2,
            spare0: 0,
            mode_switch: ModeSwitchPosition::Voltage,
            spare1: 0,
        };
        let events = pipeline.handle_value(CharacteristicRole::Status, &status.encode(), now);
        match &events[..] {
            [EngineEvent::Status(display)] => {
                assert_eq!(display.state_label, "MM DC Voltage");
                assert_eq!(display.battery_fraction, 1.0);
            }
            other => panic!("unexpected events {:?}", other),
        }
        assert_eq!(pipeline.device_status(), Some(&status));

        let events = pipeline.handle_value(CharacteristicRole::Button, &[0, 2], now);
        assert_eq!(events, vec![EngineEvent::Button(ButtonAction::LongPress)]);
    }

    #[test]
    fn test_torch_from_value_and_write() {
        let mut pipeline = pipeline();
        pipeline.handle_value(CharacteristicRole::Torch, &[1], Instant::now());
        assert_eq!(pipeline.torch(), Some(true));

        let events = pipeline.handle_written(CharacteristicRole::Torch, &[0]);
        assert_eq!(events, vec![EngineEvent::Torch(false)]);
        assert_eq!(pipeline.torch(), Some(false));

        assert!(pipeline
            .handle_written(CharacteristicRole::MultimeterSettings, &[1, 255, 0, 0, 0, 0])
            .is_empty());
    }

    #[test]
    fn test_reset_stops_timers() {
        let mut pipeline = pipeline();
        let now = Instant::now();
        pipeline.handle_value(
            CharacteristicRole::MultimeterReading,
            &reading_bytes(MultimeterMode::AcCurrent, 0.1),
            now,
        );
        pipeline.handle_value(CharacteristicRole::DsoReading, &[0u8; 2], now);

        let events = pipeline.reset();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], EngineEvent::Multimeter(d) if !d.active && d.mode_label == "Idle"));
        assert_eq!(events[1], EngineEvent::Acquiring(false));
        assert_eq!(pipeline.multimeter().value, 0.1);
        assert!(!pipeline.is_acquiring());

        assert_eq!(pipeline.next_deadline(), None);
        assert!(pipeline.poll_timers(now + Duration::from_secs(1)).is_empty());
        assert!(pipeline.reset().is_empty());
    }
}
