// Conversions from the physical units the host configures (mV, ms, s, Hz)
// to the integer codes and tick counts the hardware consumes.

use libm::roundf;
use num_traits::clamp_min;

use crate::profile::LFTIMER_FREQUENCY_HZ;

// codes per mV for a reference expressed in volts: 4096 codes / (vref * 1000 mV)
const CODES_PER_MV_PER_VOLT: f32 = 4.096;
const LFTIMER_TICKS_PER_MS: f32 = LFTIMER_FREQUENCY_HZ as f32 / 1000.0;
const MS_PER_S: u32 = 1000;

/// Converts a millivolt value to a DAC code for a reference of `vref` volts.
/// Results past 16 bits saturate at `u16::MAX` rather than wrapping.
pub fn mv_to_code(mv: u16, vref: f32) -> u16 {
    // float to int `as` casts saturate
    roundf(mv as f32 * CODES_PER_MV_PER_VOLT / vref) as u16
}

/// Inverse of [`mv_to_code`], within one code of truncation error.
pub fn code_to_mv(code: u16, vref: f32) -> u16 {
    roundf(code as f32 * vref / CODES_PER_MV_PER_VOLT) as u16
}

/// Low frequency timer top value giving `samples_per_period` timer periods
/// over `period_ms`.
pub fn ticks_for_period(period_ms: u16, samples_per_period: u16) -> u32 {
    if samples_per_period == 0 {
        return 0;
    }

    roundf(period_ms as f32 * LFTIMER_TICKS_PER_MS / samples_per_period as f32) as u32
}

/// Low frequency timer top value for a fixed sample rate.
pub fn ticks_for_rate(sample_rate_hz: u16) -> u32 {
    if sample_rate_hz == 0 {
        return 0;
    }

    roundf(LFTIMER_FREQUENCY_HZ as f32 / sample_rate_hz as f32) as u32
}

/// Per-sample code increment of a linear sweep.
///
/// The sign always points from `start_code` towards `stop_code`. A rate too
/// slow to move at least one code per sample is clamped to one code so the
/// sweep cannot freeze; equal endpoints yield zero.
pub fn sweep_step(start_code: u16, stop_code: u16, sweep_rate_mv_per_s: u16, sample_rate_hz: u16, vref: f32) -> i32 {
    if start_code == stop_code {
        return 0;
    }

    let magnitude = if sample_rate_hz == 0 {
        0
    } else {
        roundf(sweep_rate_mv_per_s as f32 * CODES_PER_MV_PER_VOLT / vref / sample_rate_hz as f32) as i32
    };
    let magnitude = clamp_min(magnitude, 1);

    if stop_code > start_code {
        magnitude
    } else {
        -magnitude
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseTiming {
    pub before_ticks: u32,
    pub width_ticks: u32,
    pub after_ticks: u32,
}

impl PulseTiming {
    pub const fn new(before_ticks: u32, width_ticks: u32, after_ticks: u32) -> Self {
        Self {
            before_ticks,
            width_ticks,
            after_ticks,
        }
    }

    // every phase lasts at least one tick so the pulse state machine always advances
    pub fn from_durations(time_before_pulse_s: u16, pulse_width_ms: u16, time_after_pulse_s: u16, sample_rate_hz: u16) -> Self {
        let rate = sample_rate_hz as u32;

        Self {
            before_ticks: clamp_min(time_before_pulse_s as u32 * rate, 1),
            width_ticks: clamp_min(pulse_width_ms as u32 * rate / MS_PER_S, 1),
            after_ticks: clamp_min(time_after_pulse_s as u32 * rate, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VREF: f32 = 2.5;

    #[test]
    fn mv_to_code_full_scale() {
        assert_eq!(mv_to_code(2500, VREF), 4096);
        assert_eq!(mv_to_code(1250, VREF), 2048);
        assert_eq!(mv_to_code(0, VREF), 0);
    }

    #[test]
    fn mv_to_code_saturates_past_16_bits() {
        // 65535 mV at 2.5 V is 107373 codes
        assert_eq!(mv_to_code(u16::MAX, VREF), u16::MAX);
        assert_eq!(mv_to_code(40_000, 1.0), u16::MAX);
        assert_eq!(mv_to_code(15_999, 1.0), 65532);
    }

    #[test]
    fn mv_code_round_trip() {
        for mv in (0..=2500u16).step_by(7) {
            let back = code_to_mv(mv_to_code(mv, VREF), VREF);
            assert!((back as i32 - mv as i32).abs() <= 1, "{} -> {}", mv, back);
        }

        for mv in (0..=1250u16).step_by(3) {
            let back = code_to_mv(mv_to_code(mv, 1.25), 1.25);
            assert!((back as i32 - mv as i32).abs() <= 1, "{} -> {}", mv, back);
        }
    }

    #[test]
    fn timer_ticks() {
        // 10 ms pulse, 2 samples: 163.84 ticks
        assert_eq!(ticks_for_period(10, 2), 164);
        assert_eq!(ticks_for_period(1000, 1), 32768);
        assert_eq!(ticks_for_period(10, 0), 0);
        assert_eq!(ticks_for_rate(1000), 33);
        assert_eq!(ticks_for_rate(0), 0);
    }

    #[test]
    fn sweep_step_sign_follows_direction() {
        let up = sweep_step(100, 2000, 100, 100, VREF);
        let down = sweep_step(2000, 100, 100, 100, VREF);
        assert!(up > 0);
        assert!(down < 0);
        assert_eq!(up, -down);
    }

    #[test]
    fn sweep_step_never_zero_between_distinct_points() {
        for rate in [0u16, 1, 5, 50, 1000] {
            for sample_rate in [1u16, 10, 1000, u16::MAX] {
                assert!(sweep_step(10, 11, rate, sample_rate, VREF) >= 1);
                assert!(sweep_step(11, 10, rate, sample_rate, VREF) <= -1);
            }
        }
        assert_eq!(sweep_step(10, 10, 1000, 10, VREF), 0);
        // 1 mV/s at 1 kHz rounds to zero codes per sample
        assert_eq!(sweep_step(10, 500, 1, 1000, VREF), 1);
        assert_eq!(sweep_step(500, 10, 1, 1000, VREF), -1);
    }

    #[test]
    fn pulse_timing_minimum_one_tick() {
        let timing = PulseTiming::from_durations(0, 0, 0, 1);
        assert_eq!(timing, PulseTiming::new(1, 1, 1));

        let timing = PulseTiming::from_durations(2, 50, 3, 100);
        assert_eq!(timing, PulseTiming::new(200, 5, 300));
    }
}
