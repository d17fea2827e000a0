use core::convert::Infallible;

use embedded_hal::digital::{OutputPin, PinState};

use crate::parameters::{ElectrodeChannel, GainChannel};

// selector line levels, least significant line first
const ELECTRODE_LINES: [[bool; 3]; 8] = [
    [false, false, false],
    [true, false, false],
    [false, true, false],
    [true, true, false],
    [false, false, true],
    [true, false, true],
    [false, true, true],
    [true, true, true],
];

const GAIN_LINES: [[bool; 2]; 4] = [
    [false, false],
    [true, false],
    [false, true],
    [true, true],
];

pub trait ChannelSelect {
    fn select_electrode(&mut self, channel: ElectrodeChannel);
    fn select_gain(&mut self, channel: GainChannel);
}

pub struct SelectorLines<P: OutputPin<Error = Infallible>> {
    electrode: Option<[P; 3]>,
    gain: Option<[P; 2]>,
}

impl<P: OutputPin<Error = Infallible>> SelectorLines<P> {
    pub fn new(electrode: Option<[P; 3]>, gain: Option<[P; 2]>) -> Self {
        Self { electrode, gain }
    }
}

fn drive<P: OutputPin<Error = Infallible>>(pins: &mut [P], levels: &[bool]) {
    for (pin, level) in pins.iter_mut().zip(levels) {
        if let Err(never) = pin.set_state(PinState::from(*level)) {
            match never {}
        }
    }
}

impl<P: OutputPin<Error = Infallible>> ChannelSelect for SelectorLines<P> {
    fn select_electrode(&mut self, channel: ElectrodeChannel) {
        if let Some(pins) = self.electrode.as_mut() {
            drive(pins, &ELECTRODE_LINES[channel.index() as usize]);
        }
    }

    fn select_gain(&mut self, channel: GainChannel) {
        if let Some(pins) = self.gain.as_mut() {
            drive(pins, &GAIN_LINES[channel.index() as usize]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use embedded_hal::digital::ErrorType;

    struct TestPin<'a>(&'a Cell<bool>);

    impl ErrorType for TestPin<'_> {
        type Error = Infallible;
    }

    impl OutputPin for TestPin<'_> {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0.set(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0.set(true);
            Ok(())
        }
    }

    fn levels<const N: usize>(lines: &[Cell<bool>; N]) -> [bool; N] {
        core::array::from_fn(|i| lines[i].get())
    }

    #[test]
    fn tables_are_binary_weighted() {
        for (channel, lines) in ELECTRODE_LINES.iter().enumerate() {
            let encoded = lines.iter().enumerate().fold(0, |acc, (bit, high)| acc | ((*high as usize) << bit));
            assert_eq!(encoded, channel);
        }
        for (channel, lines) in GAIN_LINES.iter().enumerate() {
            let encoded = lines.iter().enumerate().fold(0, |acc, (bit, high)| acc | ((*high as usize) << bit));
            assert_eq!(encoded, channel);
        }
    }

    #[test]
    fn drives_selector_pins() {
        let electrode: [Cell<bool>; 3] = Default::default();
        let gain: [Cell<bool>; 2] = Default::default();
        let mut selector = SelectorLines::new(
            Some([TestPin(&electrode[0]), TestPin(&electrode[1]), TestPin(&electrode[2])]),
            Some([TestPin(&gain[0]), TestPin(&gain[1])]),
        );

        selector.select_electrode(ElectrodeChannel::new(5).unwrap());
        selector.select_gain(GainChannel::new(2).unwrap());
        assert_eq!(levels(&electrode), [true, false, true]);
        assert_eq!(levels(&gain), [false, true]);

        selector.select_electrode(ElectrodeChannel::new(2).unwrap());
        assert_eq!(levels(&electrode), [false, true, false]);
    }

    #[test]
    fn missing_lines_are_skipped() {
        let electrode: [Cell<bool>; 3] = Default::default();
        let mut selector = SelectorLines::new(
            Some([TestPin(&electrode[0]), TestPin(&electrode[1]), TestPin(&electrode[2])]),
            None,
        );

        selector.select_gain(GainChannel::new(3).unwrap());
        assert_eq!(levels(&electrode), [false, false, false]);

        selector.select_electrode(ElectrodeChannel::new(1).unwrap());
        assert_eq!(levels(&electrode), [true, false, false]);
    }
}
