use inflamanode_core::parameters::{MeasurementConfig, OperatingMode, Parameter};
use inflamanode_core::units::PulseTiming;
use inflamanode_core::waveform::{PulsePhase, WaveformGenerator, WaveformParameters};

#[test]
fn square_wave_staircase() {
    let mut generator = WaveformGenerator::new(WaveformParameters::square_wave(0, 40, 4, 10, 2));

    let mut codes = Vec::new();
    let mut stop_at = None;
    for tick in 1..=22 {
        let step = generator.tick();
        codes.push(step.code);
        if step.request_stop && stop_at.is_none() {
            stop_at = Some(tick);
        }
    }

    // 11 down/up pairs, each up sits one step above the previous
    let pairs: Vec<(i32, i32)> = codes.chunks(2).map(|pair| (pair[0], pair[1])).collect();
    assert_eq!(pairs.len(), 11);
    for (n, (down, up)) in pairs.iter().enumerate() {
        let offset = 4 * n as i32;
        assert_eq!(*down, offset - 10);
        assert_eq!(*up, offset + 4 + 10);
    }

    // offset reaches 44 on the last up phase
    assert_eq!(stop_at, Some(22));
    assert_eq!(generator.state().offset, 44);
}

#[test]
fn linear_sweep_round_trip() {
    let mut generator = WaveformGenerator::new(WaveformParameters::linear_sweep(0, 100, 5));

    for tick in 1..=20 {
        let step = generator.tick();
        assert_eq!(step.code, 5 * tick);
        assert!(!step.request_stop);
    }
    assert_eq!(generator.state().code, 100);

    for tick in 1..=20 {
        let step = generator.tick();
        assert_eq!(step.code, 100 - 5 * tick);
        assert!((0..=100).contains(&step.code));
        assert_eq!(step.request_stop, tick == 20);
    }

    // stays parked and keeps asking for the stop
    let step = generator.tick();
    assert_eq!(step.code, 0);
    assert!(step.request_stop);
}

#[test]
fn linear_sweep_downward_never_leaves_range() {
    let mut generator = WaveformGenerator::new(WaveformParameters::linear_sweep(100, 7, -6));

    let mut ticks = 0;
    loop {
        let step = generator.tick();
        assert!((7..=100).contains(&step.code), "{}", step.code);
        ticks += 1;
        if step.request_stop {
            assert_eq!(step.code, 100);
            break;
        }
        assert!(ticks < 100);
    }
}

#[test]
fn pulse_phase_sequence() {
    let start = 1000;
    let stop = 1200;
    let height = 50;
    let mut generator = WaveformGenerator::new(WaveformParameters::pulse(start, stop, height, PulseTiming::new(3, 2, 3)));

    let mut phases = Vec::new();
    let mut codes = Vec::new();
    for _ in 0..8 {
        let step = generator.tick();
        assert!(!step.request_stop);
        phases.push(generator.state().pulse_phase);
        codes.push(step.code);
    }

    use PulsePhase::*;
    assert_eq!(phases, [BeforePulse, BeforePulse, BeforePulse, Active, Active, AfterPulse, AfterPulse, AfterPulse]);
    assert_eq!(codes, [start, start, start, start + height, start + height, stop, stop, stop]);

    let step = generator.tick();
    assert!(step.request_stop);
    assert_eq!(generator.state().pulse_phase, Complete);

    // re-entering Complete signals again
    assert!(generator.tick().request_stop);
}

#[test]
fn config_drives_sweep_direction() {
    let mut config = MeasurementConfig::new();
    config.write(Parameter::OperatingMode, OperatingMode::LinearSweep as u16);
    config.write(Parameter::VoltageStart, 1500);
    config.write(Parameter::VoltageStop, 500);
    config.write(Parameter::SweepRate, 1);
    config.write(Parameter::SweepSampleRate, 1000);

    let params = WaveformParameters::from_config(&config, 2.5);
    assert_eq!(params.sweep_step, -1);

    let mut generator = WaveformGenerator::new(params);
    assert_eq!(generator.tick().code, params.start - 1);
}

#[test]
fn pulse_timing_from_config() {
    let mut config = MeasurementConfig::new();
    config.write(Parameter::OperatingMode, OperatingMode::Pulse as u16);
    config.write(Parameter::TimeBeforePulse, 0);
    config.write(Parameter::PulseWidth, 5);
    config.write(Parameter::TimeAfterPulse, 2);
    config.write(Parameter::SweepSampleRate, 100);

    let params = WaveformParameters::from_config(&config, 2.5);
    assert_eq!(params.timing, PulseTiming::new(1, 1, 200));
}
