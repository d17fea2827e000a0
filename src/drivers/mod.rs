// Capabilities the acquisition core needs from the board. Receivers are `&self`
// because the main loop and both interrupt handlers reach the same peripheral.

pub mod selector;

pub use selector::{ChannelSelect, SelectorLines};

use crate::profile::ReferenceConstants;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerPeriod {
    pub top: u32,
    pub compare: u32,
}

impl TimerPeriod {
    pub fn from_top(top: u32) -> Self {
        let top = top.max(crate::profile::LFTIMER_MIN_TOP);
        Self {
            top,
            compare: top / 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanResult {
    pub id: u8,
    pub value: u32,
}

pub trait AnalogOutput {
    fn write_code(&self, code: u16);
    fn set_enabled(&self, enabled: bool);
    fn set_reference_enabled(&self, enabled: bool);
}

/// Periodic low frequency timer. The trigger (underflow) edge fires at the
/// start of each period, the update (compare) edge half a period later.
pub trait AcquisitionTimer {
    fn configure(&self, period: TimerPeriod);
    fn set_running(&self, running: bool);
    fn clear_trigger_edge(&self);
    fn clear_update_edge(&self);
}

/// Two channel converter, one scan per trigger.
pub trait AnalogFrontEnd {
    fn start_scan(&self);
    fn stop_scan(&self);
    fn next_result(&self) -> Option<ScanResult>;
    fn clear_scan_complete(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunStatus {
    Stopped = 0,
    Running = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    Busy,
    Failed,
}

/// Wireless link to the host application.
pub trait Transport {
    fn is_busy(&self) -> bool;
    fn send_result(&mut self, packet: &[u8]) -> Result<(), TransportError>;
    fn send_run_status(&mut self, status: RunStatus) -> Result<(), TransportError>;
    fn publish_reference(&mut self, reference: ReferenceConstants) -> Result<(), TransportError>;
}
