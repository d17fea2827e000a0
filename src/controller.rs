use embedded_hal::delay::DelayNs;
use heapless::Deque;

use crate::acquisition::AcquisitionEngine;
use crate::drivers::{
    AcquisitionTimer, AnalogFrontEnd, AnalogOutput, ChannelSelect, RunStatus, TimerPeriod, Transport, TransportError,
};
use crate::parameters::{MeasurementConfig, OperatingMode, Parameter};
use crate::profile::{HardwareProfile, ReferenceConstants, ADC_FIFO_DEPTH};
use crate::units::{ticks_for_period, ticks_for_rate};
use crate::waveform::WaveformParameters;

const MS_PER_S: u32 = 1000;
const RUN_STATUS_DEPTH: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MeasurementState {
    Idle,
    Starting,
    Running,
    StopPending,
}

/// Main loop side of a measurement: configuration, start and stop
/// sequencing, and forwarding of sealed packets and run status to the host.
pub struct MeasurementController<'a, O, T, F, S, L, X>
where
    O: AnalogOutput,
    T: AcquisitionTimer,
    F: AnalogFrontEnd,
    S: ChannelSelect,
    L: DelayNs,
    X: Transport,
{
    engine: &'a AcquisitionEngine,
    output: &'a O,
    timer: &'a T,
    front_end: &'a F,
    selector: S,
    delay: L,
    transport: X,

    profile: HardwareProfile,
    config: MeasurementConfig,
    params: WaveformParameters,
    packet_len: usize,
    stop_boundary: u16,
    timer_period: TimerPeriod,

    state: MeasurementState,
    run_status: Deque<RunStatus, RUN_STATUS_DEPTH>,
}

impl<'a, O, T, F, S, L, X> MeasurementController<'a, O, T, F, S, L, X>
where
    O: AnalogOutput,
    T: AcquisitionTimer,
    F: AnalogFrontEnd,
    S: ChannelSelect,
    L: DelayNs,
    X: Transport,
{
    pub fn new(
        engine: &'a AcquisitionEngine,
        output: &'a O,
        timer: &'a T,
        front_end: &'a F,
        selector: S,
        delay: L,
        transport: X,
    ) -> Self {
        let profile = *engine.profile();
        let config = MeasurementConfig::new();

        let mut controller = Self {
            engine,
            output,
            timer,
            front_end,
            selector,
            delay,
            transport,
            profile,
            config,
            params: WaveformParameters::from_config(&config, profile.vref),
            packet_len: config.packet_len(),
            stop_boundary: config.stop_boundary_samples(),
            timer_period: TimerPeriod::from_top(0),
            state: MeasurementState::Idle,
            run_status: Deque::new(),
        };
        controller.recompute();

        controller
    }

    /// Parks the output at the reference level and publishes the reference
    /// constants to the host.
    pub fn boot(&mut self) -> Result<(), TransportError> {
        if self.profile.dual_output {
            self.output.set_reference_enabled(true);
        }
        self.park_output();
        self.apply_selectors();

        let reference = ReferenceConstants::from(&self.profile);
        info!("Measurement - reference {} mV, code {}", reference.reference_mv, reference.reference_code);
        self.transport.publish_reference(reference)
    }

    pub fn state(&self) -> MeasurementState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != MeasurementState::Idle
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    pub fn engine(&self) -> &'a AcquisitionEngine {
        self.engine
    }

    pub fn timer_period(&self) -> TimerPeriod {
        self.timer_period
    }

    pub fn transport(&self) -> &X {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut X {
        &mut self.transport
    }

    pub fn selector(&self) -> &S {
        &self.selector
    }

    pub fn delay(&self) -> &L {
        &self.delay
    }

    //////////////////////
    //  Configuration   //
    //////////////////////

    /// Applies one host write. Out of range values are dropped silently.
    /// Changes take effect at the next start, except channel selection
    /// which is driven immediately.
    pub fn write_parameter(&mut self, param: Parameter, value: u16) {
        if param == Parameter::RunExperiment {
            match value {
                1 => self.start(),
                0 => self.request_stop(),
                _ => debug!("Measurement - ignoring run command {}", value),
            }
            return;
        }

        if !self.config.write(param, value) {
            debug!("Measurement - rejected {:?} = {}", param, value);
            return;
        }

        match param {
            Parameter::GainChannel if self.profile.gain_select => self.selector.select_gain(self.config.gain_channel),
            Parameter::ElectrodeChannel if self.profile.electrode_select => {
                self.selector.select_electrode(self.config.electrode_channel)
            }
            _ => {}
        }

        self.recompute();
    }

    pub fn read_parameter(&self, param: Parameter) -> u16 {
        match param {
            Parameter::RunExperiment => self.is_running() as u16,
            _ => self.config.read(param).unwrap_or_default(),
        }
    }

    fn recompute(&mut self) {
        self.params = WaveformParameters::from_config(&self.config, self.profile.vref);
        self.packet_len = self.config.packet_len();
        self.stop_boundary = self.config.stop_boundary_samples();

        let top = match self.config.operating_mode {
            OperatingMode::SquareWave => ticks_for_period(self.config.pulse_width_ms, self.config.samples_per_pulse),
            OperatingMode::LinearSweep | OperatingMode::Pulse => ticks_for_rate(self.config.sweep_sample_rate_hz),
        };
        self.timer_period = TimerPeriod::from_top(top);
    }

    fn apply_selectors(&mut self) {
        if self.profile.electrode_select {
            self.selector.select_electrode(self.config.electrode_channel);
        }
        if self.profile.gain_select {
            self.selector.select_gain(self.config.gain_channel);
        }
    }

    //////////////////
    //  Lifecycle   //
    //////////////////

    pub fn start(&mut self) {
        if self.state != MeasurementState::Idle {
            return;
        }
        self.state = MeasurementState::Starting;
        info!("Measurement - starting {:?}", self.config.operating_mode);

        // stale results from a previous run would land in the first packet
        for _ in 0..ADC_FIFO_DEPTH {
            if self.front_end.next_result().is_none() {
                break;
            }
        }

        self.recompute();
        self.apply_selectors();

        let start_code = self.profile.clamp_code(self.params.start);
        if self.profile.dual_output {
            self.output.set_reference_enabled(true);
        }
        match self.config.operating_mode {
            OperatingMode::SquareWave | OperatingMode::LinearSweep => {
                self.output.set_enabled(true);
                self.output.write_code(start_code);
            }
            // pulse mode must not glitch through the previous level
            OperatingMode::Pulse => {
                self.output.write_code(start_code);
                self.output.set_enabled(true);
            }
        }
        self.engine.set_output_code(start_code);

        if self.config.time_before_trial_s > 0 {
            self.delay.delay_ms(self.config.time_before_trial_s as u32 * MS_PER_S);
        }

        self.engine.arm(self.params, self.packet_len, self.stop_boundary);
        self.timer.configure(self.timer_period);
        self.engine.set_active(true);
        self.timer.set_running(true);

        self.state = MeasurementState::Running;
        self.push_run_status(RunStatus::Running);
        info!(
            "Measurement - running, timer top {}, packet {} B",
            self.timer_period.top,
            self.packet_len
        );
    }

    /// Host stop. Honored by the harvester at the next pulse boundary.
    pub fn request_stop(&mut self) {
        if self.state != MeasurementState::Running {
            return;
        }

        self.engine.request_stop();
        self.state = MeasurementState::StopPending;
        info!("Measurement - stop requested");
    }

    /// Tears the measurement down immediately and parks the output at the
    /// reference level.
    pub fn stop(&mut self) {
        self.timer.set_running(false);
        self.engine.set_active(false);
        self.park_output();

        if self.profile.dual_output {
            self.output.set_enabled(false);
        }

        if self.state != MeasurementState::Idle {
            self.state = MeasurementState::Idle;
            self.push_run_status(RunStatus::Stopped);
            info!(
                "Measurement - stopped, {} samples, {} packets dropped",
                self.engine.samples_taken(),
                self.engine.dropped_packets()
            );
        }
    }

    fn park_output(&mut self) {
        let reference = self.profile.reference_code();
        self.output.write_code(reference);
        self.engine.set_output_code(reference);
    }

    fn finish(&mut self) {
        self.timer.set_running(false);
        self.engine.set_active(false);
        self.front_end.stop_scan();

        if self.config.time_after_trial_s > 0 {
            self.delay.delay_ms(self.config.time_after_trial_s as u32 * MS_PER_S);
        }

        self.stop();
    }

    //////////////////
    //  Main loop   //
    //////////////////

    pub fn poll(&mut self) {
        if self.engine.take_complete() {
            self.finish();
        } else if self.state == MeasurementState::Running && self.engine.stop_requested() {
            self.state = MeasurementState::StopPending;
            info!("Measurement - waveform finished, stopping at pulse boundary");
        }

        self.forward_run_status();
        self.forward_result();
    }

    /// Queues a transition for the host. The oldest transition is discarded
    /// if the link has fallen this far behind.
    fn push_run_status(&mut self, status: RunStatus) {
        if self.run_status.is_full() {
            self.run_status.pop_front();
        }
        let _ = self.run_status.push_back(status);
    }

    fn forward_run_status(&mut self) {
        if self.transport.is_busy() {
            return;
        }

        let Some(&status) = self.run_status.front() else {
            return;
        };

        match self.transport.send_run_status(status) {
            Ok(()) => {
                self.run_status.pop_front();
            }
            Err(err) => warn!("Measurement - run status send failed {:?}, retrying", err),
        }
    }

    fn forward_result(&mut self) {
        let engine = self.engine;
        if !engine.result_ready() || self.transport.is_busy() {
            return;
        }

        if let Ok(packet) = engine.queue().try_dequeue() {
            if let Err(err) = self.transport.send_result(packet.data()) {
                warn!("Measurement - result send failed {:?}, packet kept", err);
                packet.cancel();
            }
        }

        engine.refresh_result_ready();
    }
}
