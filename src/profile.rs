// Board constants and the capability profile the engine is parameterized by.
// The acquisition core itself never looks at pins or peripheral numbers.

use crate::units::mv_to_code;

// low frequency timer runs from the 32.768 kHz crystal
pub const LFTIMER_FREQUENCY_HZ: u32 = 32_768;
// below this the trigger and update edges would collapse onto one tick
pub const LFTIMER_MIN_TOP: u32 = 2;

pub const SAMPLE_RECORD_LEN: usize = 10;
pub const MAX_SAMPLES_PER_PACKET: usize = 24;  // 240 B fits a 247 B ATT MTU notification
pub const MAX_PACKET_LEN: usize = MAX_SAMPLES_PER_PACKET * SAMPLE_RECORD_LEN;
pub const SWEEP_PACKET_LEN: usize = MAX_PACKET_LEN;
pub const PACKET_QUEUE_DEPTH: usize = 8;

pub const ADC_RESULT_MASK: u32 = 0x000F_FFFF;  // 20 bit conversions
pub const ADC_FIFO_DEPTH: usize = 4;  // results drained per scan-complete interrupt at most

// power-on experiment parameters
pub const DEFAULT_VOLTAGE_START_MV: u16 = 1000;
pub const DEFAULT_VOLTAGE_STOP_MV: u16 = 1500;
pub const DEFAULT_VOLTAGE_STEP_MV: u16 = 4;
pub const DEFAULT_PULSE_HEIGHT_MV: u16 = 25;
pub const DEFAULT_SAMPLES_PER_PULSE: u16 = 2;
pub const DEFAULT_PULSE_WIDTH_MS: u16 = 40;
pub const DEFAULT_TIME_BEFORE_TRIAL_S: u16 = 1;
pub const DEFAULT_TIME_AFTER_TRIAL_S: u16 = 0;
pub const DEFAULT_SWEEP_RATE_MV_PER_S: u16 = 100;
pub const DEFAULT_SWEEP_SAMPLE_RATE_HZ: u16 = 100;
pub const DEFAULT_TIME_BEFORE_PULSE_S: u16 = 1;
pub const DEFAULT_TIME_AFTER_PULSE_S: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HardwareProfile {
    // DAC reference in volts
    pub vref: f32,
    // output held between experiments, mV
    pub reference_mv: u16,
    pub dual_output: bool,
    pub gain_select: bool,
    pub electrode_select: bool,
    // identifiers the converter reports for channel 0 / channel 1 results
    pub scan_ids: [u8; 2],
    pub code_max: u16,
}

impl HardwareProfile {
    pub const DUAL_OUTPUT: HardwareProfile = HardwareProfile {
        vref: 2.5,
        reference_mv: 1250,
        dual_output: true,
        gain_select: true,
        electrode_select: true,
        scan_ids: [0, 1],
        code_max: 4095,
    };

    // first board spin, single output and a fixed gain network
    pub const SINGLE_OUTPUT: HardwareProfile = HardwareProfile {
        vref: 1.25,
        reference_mv: 625,
        dual_output: false,
        gain_select: false,
        electrode_select: true,
        scan_ids: [0, 1],
        code_max: 4095,
    };

    pub fn reference_code(&self) -> u16 {
        mv_to_code(self.reference_mv, self.vref).min(self.code_max)
    }

    pub fn vref_mv(&self) -> u16 {
        (self.vref * 1000.0) as u16
    }

    pub fn clamp_code(&self, code: i32) -> u16 {
        code.clamp(0, self.code_max as i32) as u16
    }
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self::DUAL_OUTPUT
    }
}

/// Values written to the status surface once at boot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReferenceConstants {
    pub vref_mv: u16,
    pub reference_mv: u16,
    pub reference_code: u16,
}

impl From<&HardwareProfile> for ReferenceConstants {
    fn from(profile: &HardwareProfile) -> Self {
        Self {
            vref_mv: profile.vref_mv(),
            reference_mv: profile.reference_mv,
            reference_code: profile.reference_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_codes() {
        assert_eq!(HardwareProfile::DUAL_OUTPUT.reference_code(), 2048);
        assert_eq!(HardwareProfile::SINGLE_OUTPUT.reference_code(), 2048);

        let constants = ReferenceConstants::from(&HardwareProfile::DUAL_OUTPUT);
        assert_eq!(constants.vref_mv, 2500);
        assert_eq!(constants.reference_mv, 1250);
    }

    #[test]
    fn clamp_code_to_dac_range() {
        let profile = HardwareProfile::DUAL_OUTPUT;
        assert_eq!(profile.clamp_code(-10), 0);
        assert_eq!(profile.clamp_code(5000), 4095);
        assert_eq!(profile.clamp_code(1234), 1234);
    }

    #[test]
    fn packet_fits_mtu() {
        assert!(MAX_PACKET_LEN <= 244);
        assert_eq!(SWEEP_PACKET_LEN % SAMPLE_RECORD_LEN, 0);
    }
}
