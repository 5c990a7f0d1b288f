//! Operating mode state machine.
//!
//! Tracks the selected multimeter mode and range, the oscilloscope mode,
//! range and trigger command, and the selector constraint imposed by the
//! meter's physical mode switch. Every selection yields the settings record
//! to write; the session decides whether a write is possible.

use tracing::{debug, warn};

use crate::config::Config;
use crate::data::ranges::{dso_legal_ranges, multimeter_legal_ranges};
use crate::error::{Error, Result};
use crate::protocol::{
    DsoCommand, DsoMode, DsoSettings, ModeSwitchPosition, MultimeterMode, MultimeterSettings,
    Range,
};

/// Current multimeter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MultimeterSelection {
    /// Selected function.
    pub mode: MultimeterMode,
    /// Selected range.
    pub range: Range,
}

/// Current oscilloscope selection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OscilloscopeSelection {
    /// Selected measurement mode; never [`DsoMode::Idle`].
    pub mode: DsoMode,
    /// Selected range.
    pub range: Range,
    /// Selected trigger policy.
    pub command: DsoCommand,
    /// Trigger level in physical units.
    pub trigger_level: f32,
    /// Whether acquisition has been started.
    pub running: bool,
}

impl Default for OscilloscopeSelection {
    fn default() -> Self {
        Self {
            mode: DsoMode::Vdc,
            range: Range(0),
            command: DsoCommand::FallingEdge,
            trigger_level: 0.0,
            running: false,
        }
    }
}

/// Multimeter modes disabled by a mode switch position.
fn disabled_modes(position: ModeSwitchPosition) -> &'static [MultimeterMode] {
    use MultimeterMode::*;

    match position {
        ModeSwitchPosition::Voltage => &[DcCurrent, AcCurrent, Resistance, Diode, Continuity],
        ModeSwitchPosition::Current => &[DcVoltage, AcVoltage, Resistance, Diode, Continuity],
        ModeSwitchPosition::Mixed => &[DcVoltage, AcVoltage],
    }
}

/// The multimeter and oscilloscope selection state.
#[derive(Debug, Clone)]
pub struct ModeStateMachine {
    multimeter: MultimeterSelection,
    oscilloscope: OscilloscopeSelection,
    mode_switch: Option<ModeSwitchPosition>,
    update_interval_ms: u32,
    dso_window_us: u32,
    dso_samples: u16,
}

impl ModeStateMachine {
    /// Create the state machine with defaults taken from `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            multimeter: MultimeterSelection::default(),
            oscilloscope: OscilloscopeSelection {
                trigger_level: config.dso_trigger_level,
                ..OscilloscopeSelection::default()
            },
            mode_switch: None,
            update_interval_ms: config.multimeter_update_interval_ms,
            dso_window_us: config.dso_window_us,
            dso_samples: config.effective_dso_samples(),
        }
    }

    // === Multimeter ===

    /// Current multimeter selection.
    pub fn multimeter_selection(&self) -> MultimeterSelection {
        self.multimeter
    }

    /// Legal ranges for a multimeter mode.
    pub fn legal_ranges(&self, mode: MultimeterMode) -> Vec<Range> {
        multimeter_legal_ranges(mode)
    }

    /// Settings record for the current multimeter selection.
    pub fn multimeter_settings(&self) -> MultimeterSettings {
        MultimeterSettings {
            mode: self.multimeter.mode,
            range: self.multimeter.range,
            update_interval_ms: self.update_interval_ms,
        }
    }

    /// Select a multimeter mode. The range resets to automatic.
    ///
    /// A mode disabled by the mode switch is still selected; the meter has
    /// the final say.
    pub fn select_multimeter_mode(&mut self, mode: MultimeterMode) -> MultimeterSettings {
        if !self.is_selectable(mode) {
            warn!(
                "{} is not available with the mode switch at {:?}",
                mode, self.mode_switch
            );
        }

        debug!("Multimeter mode {} selected", mode);
        self.multimeter = MultimeterSelection {
            mode,
            range: Range::AUTO,
        };
        self.multimeter_settings()
    }

    /// Select a range for the current multimeter mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if the range is not legal for the mode.
    pub fn select_multimeter_range(&mut self, range: Range) -> Result<MultimeterSettings> {
        let mode = self.multimeter.mode;
        if !multimeter_legal_ranges(mode).contains(&range) {
            return Err(Error::InvalidRange {
                mode: mode.to_string(),
                range: range.0,
            });
        }

        debug!("Multimeter range {} selected", range);
        self.multimeter.range = range;
        Ok(self.multimeter_settings())
    }

    // === Mode switch ===

    /// Last reported mode switch position.
    pub fn mode_switch(&self) -> Option<ModeSwitchPosition> {
        self.mode_switch
    }

    /// Apply the mode switch position reported in a status update.
    ///
    /// Returns `true` if the position changed.
    pub fn set_mode_switch(&mut self, position: ModeSwitchPosition) -> bool {
        if self.mode_switch == Some(position) {
            return false;
        }
        debug!("Mode switch moved to {}", position);
        self.mode_switch = Some(position);
        true
    }

    /// Check if a multimeter mode is enabled by the mode switch.
    ///
    /// Every mode is selectable until the first status arrives.
    pub fn is_selectable(&self, mode: MultimeterMode) -> bool {
        match self.mode_switch {
            Some(position) => !disabled_modes(position).contains(&mode),
            None => true,
        }
    }

    /// Every multimeter mode with its availability.
    pub fn mode_availability(&self) -> Vec<(MultimeterMode, bool)> {
        MultimeterMode::ALL
            .iter()
            .map(|&mode| (mode, self.is_selectable(mode)))
            .collect()
    }

    // === Oscilloscope ===

    /// Current oscilloscope selection.
    pub fn oscilloscope_selection(&self) -> OscilloscopeSelection {
        self.oscilloscope
    }

    /// Legal ranges for an oscilloscope mode.
    pub fn dso_legal_ranges(&self, mode: DsoMode) -> Vec<Range> {
        dso_legal_ranges(mode)
    }

    /// Select the oscilloscope measurement mode.
    ///
    /// Moving between the voltage and current families resets the range to
    /// the lowest band. Returns settings to write if acquisition is running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for [`DsoMode::Idle`]; use
    /// [`ModeStateMachine::stop_oscilloscope`] instead.
    pub fn select_dso_mode(&mut self, mode: DsoMode) -> Result<Option<DsoSettings>> {
        if mode == DsoMode::Idle {
            return Err(Error::InvalidParameter {
                name: "oscilloscope mode".to_string(),
                value: mode.to_string(),
            });
        }

        let current = self.oscilloscope.mode;
        if mode.is_voltage() != current.is_voltage() {
            self.oscilloscope.range = Range(0);
        }
        self.oscilloscope.mode = mode;
        debug!("Oscilloscope mode {} selected", mode);

        Ok(self.running_settings())
    }

    /// Select the oscilloscope range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if the range is not legal for the mode.
    pub fn select_dso_range(&mut self, range: Range) -> Result<Option<DsoSettings>> {
        let mode = self.oscilloscope.mode;
        if !dso_legal_ranges(mode).contains(&range) {
            return Err(Error::InvalidRange {
                mode: mode.description().to_string(),
                range: range.0,
            });
        }

        self.oscilloscope.range = range;
        debug!("Oscilloscope range {} selected", range);
        Ok(self.running_settings())
    }

    /// Select the trigger command.
    pub fn select_dso_command(&mut self, command: DsoCommand) -> Option<DsoSettings> {
        self.oscilloscope.command = command;
        debug!("Oscilloscope command {} selected", command);
        self.running_settings()
    }

    /// Set the trigger level.
    pub fn set_trigger_level(&mut self, level: f32) -> Option<DsoSettings> {
        self.oscilloscope.trigger_level = level;
        self.running_settings()
    }

    /// Start acquisition with the current selection.
    pub fn start_oscilloscope(&mut self) -> DsoSettings {
        self.oscilloscope.running = true;
        self.dso_settings(self.oscilloscope.mode)
    }

    /// Stop acquisition. The returned settings carry [`DsoMode::Idle`].
    pub fn stop_oscilloscope(&mut self) -> DsoSettings {
        self.oscilloscope.running = false;
        self.dso_settings(DsoMode::Idle)
    }

    /// Forget a running acquisition without writing anything, after the
    /// link dropped or data stopped arriving. Returns `true` if it was
    /// running.
    pub fn halt_oscilloscope(&mut self) -> bool {
        std::mem::replace(&mut self.oscilloscope.running, false)
    }

    fn running_settings(&self) -> Option<DsoSettings> {
        self.oscilloscope
            .running
            .then(|| self.dso_settings(self.oscilloscope.mode))
    }

    fn dso_settings(&self, mode: DsoMode) -> DsoSettings {
        DsoSettings {
            command: self.oscilloscope.command,
            trigger_level: self.oscilloscope.trigger_level,
            mode,
            range: self.oscilloscope.range,
            window_us: self.dso_window_us,
            samples: self.dso_samples,
        }
    }
}

impl Default for ModeStateMachine {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}
