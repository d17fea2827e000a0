use crate::profile::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatingMode {
    SquareWave = 0,
    LinearSweep = 1,
    Pulse = 2,
}

impl TryFrom<u16> for OperatingMode {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OperatingMode::SquareWave),
            1 => Ok(OperatingMode::LinearSweep),
            2 => Ok(OperatingMode::Pulse),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GainChannel(u8);

impl GainChannel {
    pub const MAX: u8 = 3;

    pub const fn new(channel: u8) -> Option<Self> {
        if channel <= Self::MAX {
            Some(Self(channel))
        } else {
            None
        }
    }

    pub const fn index(&self) -> u8 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ElectrodeChannel(u8);

impl ElectrodeChannel {
    pub const MAX: u8 = 7;

    pub const fn new(channel: u8) -> Option<Self> {
        if channel <= Self::MAX {
            Some(Self(channel))
        } else {
            None
        }
    }

    pub const fn index(&self) -> u8 {
        self.0
    }
}

/// Attributes of the configuration surface. Values travel as `u16` scalars.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parameter {
    VoltageStart,
    VoltageStop,
    VoltageStep,
    PulseHeight,
    SamplesPerPulse,
    PulseWidth,
    TimeBeforeTrial,
    TimeAfterTrial,
    GainChannel,
    ElectrodeChannel,
    OperatingMode,
    SweepRate,
    SweepSampleRate,
    TimeBeforePulse,
    TimeAfterPulse,
    RunExperiment,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MeasurementConfig {
    pub voltage_start_mv: u16,
    pub voltage_stop_mv: u16,
    pub voltage_step_mv: u16,
    pub pulse_height_mv: u16,
    pub samples_per_pulse: u16,
    pub pulse_width_ms: u16,
    pub time_before_trial_s: u16,
    pub time_after_trial_s: u16,
    pub gain_channel: GainChannel,
    pub electrode_channel: ElectrodeChannel,
    pub operating_mode: OperatingMode,
    pub sweep_rate_mv_per_s: u16,
    pub sweep_sample_rate_hz: u16,
    pub time_before_pulse_s: u16,
    pub time_after_pulse_s: u16,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementConfig {
    pub const fn new() -> Self {
        Self {
            voltage_start_mv: DEFAULT_VOLTAGE_START_MV,
            voltage_stop_mv: DEFAULT_VOLTAGE_STOP_MV,
            voltage_step_mv: DEFAULT_VOLTAGE_STEP_MV,
            pulse_height_mv: DEFAULT_PULSE_HEIGHT_MV,
            samples_per_pulse: DEFAULT_SAMPLES_PER_PULSE,
            pulse_width_ms: DEFAULT_PULSE_WIDTH_MS,
            time_before_trial_s: DEFAULT_TIME_BEFORE_TRIAL_S,
            time_after_trial_s: DEFAULT_TIME_AFTER_TRIAL_S,
            gain_channel: GainChannel(0),
            electrode_channel: ElectrodeChannel(0),
            operating_mode: OperatingMode::SquareWave,
            sweep_rate_mv_per_s: DEFAULT_SWEEP_RATE_MV_PER_S,
            sweep_sample_rate_hz: DEFAULT_SWEEP_SAMPLE_RATE_HZ,
            time_before_pulse_s: DEFAULT_TIME_BEFORE_PULSE_S,
            time_after_pulse_s: DEFAULT_TIME_AFTER_PULSE_S,
        }
    }

    /// Stores `value` if it is in range for `param`. Out of range values are
    /// dropped and the previous value stays in effect. Returns whether the
    /// value was stored. `RunExperiment` is a command, never stored here.
    pub fn write(&mut self, param: Parameter, value: u16) -> bool {
        match param {
            Parameter::VoltageStart => self.voltage_start_mv = value,
            Parameter::VoltageStop => self.voltage_stop_mv = value,
            Parameter::VoltageStep => self.voltage_step_mv = value,
            Parameter::PulseHeight => self.pulse_height_mv = value,
            Parameter::SamplesPerPulse => {
                // a square wave pulse needs a down and an up phase
                if value < 2 {
                    return false;
                }
                self.samples_per_pulse = value;
            }
            Parameter::PulseWidth => self.pulse_width_ms = value,
            Parameter::TimeBeforeTrial => self.time_before_trial_s = value,
            Parameter::TimeAfterTrial => self.time_after_trial_s = value,
            Parameter::GainChannel => match u8::try_from(value).ok().and_then(GainChannel::new) {
                Some(channel) => self.gain_channel = channel,
                None => return false,
            },
            Parameter::ElectrodeChannel => match u8::try_from(value).ok().and_then(ElectrodeChannel::new) {
                Some(channel) => self.electrode_channel = channel,
                None => return false,
            },
            Parameter::OperatingMode => match OperatingMode::try_from(value) {
                Ok(mode) => self.operating_mode = mode,
                Err(_) => return false,
            },
            Parameter::SweepRate => self.sweep_rate_mv_per_s = value,
            Parameter::SweepSampleRate => {
                if value == 0 {
                    return false;
                }
                self.sweep_sample_rate_hz = value;
            }
            Parameter::TimeBeforePulse => self.time_before_pulse_s = value,
            Parameter::TimeAfterPulse => self.time_after_pulse_s = value,
            Parameter::RunExperiment => return false,
        }

        true
    }

    pub fn read(&self, param: Parameter) -> Option<u16> {
        let value = match param {
            Parameter::VoltageStart => self.voltage_start_mv,
            Parameter::VoltageStop => self.voltage_stop_mv,
            Parameter::VoltageStep => self.voltage_step_mv,
            Parameter::PulseHeight => self.pulse_height_mv,
            Parameter::SamplesPerPulse => self.samples_per_pulse,
            Parameter::PulseWidth => self.pulse_width_ms,
            Parameter::TimeBeforeTrial => self.time_before_trial_s,
            Parameter::TimeAfterTrial => self.time_after_trial_s,
            Parameter::GainChannel => self.gain_channel.index() as u16,
            Parameter::ElectrodeChannel => self.electrode_channel.index() as u16,
            Parameter::OperatingMode => self.operating_mode as u16,
            Parameter::SweepRate => self.sweep_rate_mv_per_s,
            Parameter::SweepSampleRate => self.sweep_sample_rate_hz,
            Parameter::TimeBeforePulse => self.time_before_pulse_s,
            Parameter::TimeAfterPulse => self.time_after_pulse_s,
            Parameter::RunExperiment => return None,
        };

        Some(value)
    }

    // direction is only ever inferred, the host sends magnitudes
    pub fn sweeps_down(&self) -> bool {
        self.voltage_stop_mv < self.voltage_start_mv
    }

    pub fn packet_len(&self) -> usize {
        match self.operating_mode {
            OperatingMode::SquareWave => {
                (self.samples_per_pulse as usize).min(MAX_SAMPLES_PER_PACKET) * SAMPLE_RECORD_LEN
            }
            OperatingMode::LinearSweep | OperatingMode::Pulse => SWEEP_PACKET_LEN,
        }
    }

    // number of harvested samples after which a pending stop may be honored
    pub fn stop_boundary_samples(&self) -> u16 {
        match self.operating_mode {
            OperatingMode::SquareWave => self.samples_per_pulse,
            OperatingMode::LinearSweep | OperatingMode::Pulse => 1,
        }
    }
}
