/*
 * Output waveform state machines, one step per timer update edge.
 *
 * The generator never touches hardware. Each call to `tick` returns the next
 * output code and whether the waveform has run to its natural end. Applying
 * the code and turning the end signal into a deferred stop is the
 * acquisition engine's job.
 *
 * Codes are carried as i32 here: a square wave sitting near zero legitimately
 * computes `offset - pulse_height` below zero, the engine saturates on output.
 */

use crate::parameters::{MeasurementConfig, OperatingMode};
use crate::units::{mv_to_code, sweep_step, PulseTiming};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PulsePhase {
    BeforePulse,
    Active,
    AfterPulse,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SweepDirection {
    Forward,
    Backward,
}

/// Everything the state machines need, already scaled to codes and ticks.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaveformParameters {
    pub mode: OperatingMode,
    pub start: i32,
    pub stop: i32,
    // square wave staircase increment, signed towards `stop`
    pub step: i32,
    // signed towards `stop` in square wave mode, magnitude in pulse mode
    pub pulse_height: i32,
    pub samples_per_pulse: u16,
    pub sweep_step: i32,
    pub timing: PulseTiming,
}

impl WaveformParameters {
    pub const fn square_wave(start: i32, stop: i32, step: i32, pulse_height: i32, samples_per_pulse: u16) -> Self {
        Self {
            mode: OperatingMode::SquareWave,
            start,
            stop,
            step,
            pulse_height,
            samples_per_pulse,
            sweep_step: 0,
            timing: PulseTiming::new(1, 1, 1),
        }
    }

    pub const fn linear_sweep(start: i32, stop: i32, sweep_step: i32) -> Self {
        Self {
            mode: OperatingMode::LinearSweep,
            start,
            stop,
            step: 0,
            pulse_height: 0,
            samples_per_pulse: 1,
            sweep_step,
            timing: PulseTiming::new(1, 1, 1),
        }
    }

    pub const fn pulse(start: i32, stop: i32, pulse_height: i32, timing: PulseTiming) -> Self {
        Self {
            mode: OperatingMode::Pulse,
            start,
            stop,
            step: 0,
            pulse_height,
            samples_per_pulse: 1,
            sweep_step: 0,
            timing,
        }
    }

    pub fn from_config(config: &MeasurementConfig, vref: f32) -> Self {
        let start_code = mv_to_code(config.voltage_start_mv, vref);
        let stop_code = mv_to_code(config.voltage_stop_mv, vref);
        let sign = if config.sweeps_down() { -1 } else { 1 };

        let step = mv_to_code(config.voltage_step_mv, vref) as i32 * sign;
        let height = mv_to_code(config.pulse_height_mv, vref) as i32;
        let pulse_height = match config.operating_mode {
            OperatingMode::SquareWave => height * sign,
            OperatingMode::LinearSweep | OperatingMode::Pulse => height,
        };

        Self {
            mode: config.operating_mode,
            start: start_code as i32,
            stop: stop_code as i32,
            step,
            pulse_height,
            samples_per_pulse: config.samples_per_pulse,
            sweep_step: sweep_step(start_code, stop_code, config.sweep_rate_mv_per_s, config.sweep_sample_rate_hz, vref),
            timing: PulseTiming::from_durations(
                config.time_before_pulse_s,
                config.pulse_width_ms,
                config.time_after_pulse_s,
                config.sweep_sample_rate_hz,
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaveformState {
    pub code: i32,
    pub sample: u32,
    // square wave: position inside the current pulse
    pub cycle: u16,
    // square wave: staircase level the pulse is built on
    pub offset: i32,
    pub pulse_phase: PulsePhase,
    // pulse mode: ticks spent in the current phase
    pub phase_ticks: u32,
    pub direction: SweepDirection,
    pub sweep_done: bool,
}

impl WaveformState {
    pub const fn new(start: i32) -> Self {
        Self {
            code: start,
            sample: 0,
            cycle: 0,
            offset: start,
            pulse_phase: PulsePhase::BeforePulse,
            phase_ticks: 0,
            direction: SweepDirection::Forward,
            sweep_done: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaveformStep {
    pub code: i32,
    pub request_stop: bool,
}

pub struct WaveformGenerator {
    params: WaveformParameters,
    state: WaveformState,
}

impl WaveformGenerator {
    pub const fn new(params: WaveformParameters) -> Self {
        Self {
            params,
            state: WaveformState::new(params.start),
        }
    }

    pub fn state(&self) -> &WaveformState {
        &self.state
    }

    /// Loads new parameters and rewinds to the mode's initial state.
    pub fn reset(&mut self, params: WaveformParameters) {
        self.params = params;
        self.state = WaveformState::new(params.start);
    }

    pub fn tick(&mut self) -> WaveformStep {
        let request_stop = match self.params.mode {
            OperatingMode::SquareWave => self.square_wave_tick(),
            OperatingMode::LinearSweep => self.linear_sweep_tick(),
            OperatingMode::Pulse => self.pulse_tick(),
        };

        self.state.sample = self.state.sample.wrapping_add(1);

        WaveformStep {
            code: self.state.code,
            request_stop,
        }
    }

    ///////////////////
    //  Square Wave  //
    ///////////////////

    fn square_wave_tick(&mut self) -> bool {
        let samples_per_pulse = self.params.samples_per_pulse.max(2);
        let up_at = samples_per_pulse / 2;
        let mut exhausted = false;

        if self.state.cycle == 0 {
            self.state.code = self.state.offset - self.params.pulse_height;
        } else if self.state.cycle == up_at {
            self.state.offset += self.params.step;
            self.state.code = self.state.offset + self.params.pulse_height;
            exhausted = self.staircase_exhausted();
        }

        self.state.cycle += 1;
        if self.state.cycle >= samples_per_pulse {
            self.state.cycle = 0;
        }

        exhausted
    }

    fn staircase_exhausted(&self) -> bool {
        let step = self.params.step;
        if step > 0 {
            self.state.offset > self.params.stop
        } else if step < 0 {
            self.state.offset < self.params.stop
        } else {
            // a flat staircase only ends on an external stop
            false
        }
    }

    ////////////////////
    //  Linear Sweep  //
    ////////////////////

    fn linear_sweep_tick(&mut self) -> bool {
        if self.state.sweep_done {
            return true;
        }

        let step = self.params.sweep_step;
        match self.state.direction {
            SweepDirection::Forward => {
                let next = self.state.code + step;
                if passed(next, self.params.stop, step) {
                    self.state.code = self.params.stop;
                    self.state.direction = SweepDirection::Backward;
                } else {
                    self.state.code = next;
                }
                false
            }
            SweepDirection::Backward => {
                let next = self.state.code - step;
                if passed(next, self.params.start, -step) {
                    self.state.code = self.params.start;
                    self.state.sweep_done = true;
                    true
                } else {
                    self.state.code = next;
                    false
                }
            }
        }
    }

    /////////////
    //  Pulse  //
    /////////////

    fn pulse_tick(&mut self) -> bool {
        let timing = self.params.timing;

        if self.state.pulse_phase == PulsePhase::BeforePulse && self.state.phase_ticks >= timing.before_ticks {
            self.enter_pulse_phase(PulsePhase::Active);
        }
        if self.state.pulse_phase == PulsePhase::Active && self.state.phase_ticks >= timing.width_ticks {
            self.enter_pulse_phase(PulsePhase::AfterPulse);
        }
        if self.state.pulse_phase == PulsePhase::AfterPulse && self.state.phase_ticks >= timing.after_ticks {
            self.enter_pulse_phase(PulsePhase::Complete);
        }

        match self.state.pulse_phase {
            PulsePhase::BeforePulse => self.state.code = self.params.start,
            PulsePhase::Active => self.state.code = self.params.start + self.params.pulse_height,
            PulsePhase::AfterPulse => self.state.code = self.params.stop,
            PulsePhase::Complete => return true,
        }

        self.state.phase_ticks += 1;
        false
    }

    fn enter_pulse_phase(&mut self, phase: PulsePhase) {
        self.state.pulse_phase = phase;
        self.state.phase_ticks = 0;
    }
}

// whether `value` has reached or gone beyond `bound` when moving by `step`
fn passed(value: i32, bound: i32, step: i32) -> bool {
    if step >= 0 {
        value >= bound
    } else {
        value <= bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::Parameter;

    #[test]
    fn square_wave_holds_between_phase_edges() {
        let mut generator = WaveformGenerator::new(WaveformParameters::square_wave(100, 200, 10, 5, 4));

        let codes: [i32; 8] = core::array::from_fn(|_| generator.tick().code);
        assert_eq!(codes, [95, 95, 115, 115, 105, 105, 125, 125]);
    }

    #[test]
    fn square_wave_sweeping_down() {
        let mut generator = WaveformGenerator::new(WaveformParameters::square_wave(100, 80, -10, -5, 2));

        let mut codes = [0; 6];
        let mut stops = [false; 6];
        for i in 0..6 {
            let step = generator.tick();
            codes[i] = step.code;
            stops[i] = step.request_stop;
        }

        assert_eq!(codes, [105, 85, 95, 75, 85, 65]);
        assert_eq!(stops, [false, false, false, false, false, true]);
    }

    #[test]
    fn flat_square_wave_never_ends() {
        let mut generator = WaveformGenerator::new(WaveformParameters::square_wave(100, 200, 0, 5, 2));
        for _ in 0..1000 {
            assert!(!generator.tick().request_stop);
        }
    }

    #[test]
    fn equal_endpoint_sweep_terminates() {
        let mut generator = WaveformGenerator::new(WaveformParameters::linear_sweep(50, 50, 0));
        assert_eq!(generator.tick(), WaveformStep { code: 50, request_stop: false });
        assert_eq!(generator.tick(), WaveformStep { code: 50, request_stop: true });
    }

    #[test]
    fn sweep_clamps_on_reversal() {
        let mut generator = WaveformGenerator::new(WaveformParameters::linear_sweep(0, 10, 4));
        let codes: [i32; 6] = core::array::from_fn(|_| generator.tick().code);
        assert_eq!(codes, [4, 8, 10, 6, 2, 0]);
        assert_eq!(generator.state().direction, SweepDirection::Backward);
        assert!(generator.state().sweep_done);
    }

    #[test]
    fn reset_rewinds_state() {
        let params = WaveformParameters::linear_sweep(0, 10, 4);
        let mut generator = WaveformGenerator::new(params);
        for _ in 0..4 {
            generator.tick();
        }

        generator.reset(params);
        assert_eq!(*generator.state(), WaveformState::new(0));
    }

    #[test]
    fn parameters_from_config() {
        let mut config = MeasurementConfig::new();
        config.write(Parameter::VoltageStart, 1250);
        config.write(Parameter::VoltageStop, 625);
        config.write(Parameter::VoltageStep, 10);
        config.write(Parameter::PulseHeight, 25);

        let params = WaveformParameters::from_config(&config, 2.5);
        assert_eq!(params.start, 2048);
        assert_eq!(params.stop, 1024);
        assert_eq!(params.step, -16);
        assert_eq!(params.pulse_height, -41);
        assert!(params.sweep_step < 0);

        config.write(Parameter::OperatingMode, OperatingMode::Pulse as u16);
        let params = WaveformParameters::from_config(&config, 2.5);
        assert_eq!(params.pulse_height, 41);
    }
}
