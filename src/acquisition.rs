/*
 * Shared acquisition context.
 *
 * One instance lives in a static and is reached from three contexts:
 *   - timer interrupt: `on_trigger_edge` then `on_update_edge`, once per period
 *   - conversion complete interrupt: `on_scan_complete`
 *   - main loop: the measurement controller
 *
 * Each counter has exactly one writer context and is updated with
 * load + store, thumbv6m has no atomic read-modify-write. Lifecycle flags are
 * plain stores. The waveform sits behind a critical section mutex. Harvest
 * state is owned by the conversion complete handler so draining and packet
 * sealing run with interrupts enabled.
 *
 * Stop is a three stage handshake:
 *   request (waveform end or host) -> honored by the harvester on a pulse
 *   boundary -> executed by the main loop once `complete` is seen.
 */

use core::cell::{RefCell, UnsafeCell};
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::drivers::{AcquisitionTimer, AnalogFrontEnd, AnalogOutput};
use crate::packet::{PacketBuilder, SampleRecord};
use crate::profile::{HardwareProfile, ADC_FIFO_DEPTH, MAX_PACKET_LEN, PACKET_QUEUE_DEPTH};
use crate::queue::PacketQueue;
use crate::waveform::{WaveformGenerator, WaveformParameters};

pub type ResultQueue = PacketQueue<MAX_PACKET_LEN, PACKET_QUEUE_DEPTH>;

pub struct LifecycleFlags {
    active: AtomicBool,
    stop_requested: AtomicBool,
    complete: AtomicBool,
    result_ready: AtomicBool,
}

impl LifecycleFlags {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            complete: AtomicBool::new(false),
            result_ready: AtomicBool::new(false),
        }
    }

    fn clear(&self) {
        self.active.store(false, Ordering::Relaxed);
        self.stop_requested.store(false, Ordering::Relaxed);
        self.complete.store(false, Ordering::Relaxed);
        self.result_ready.store(false, Ordering::Relaxed);
    }
}

struct HarvestState {
    first_sample: bool,
    last_processed: Option<u16>,
    in_pulse: u16,
    stop_boundary: u16,
    builder: PacketBuilder,
}

impl HarvestState {
    const fn new() -> Self {
        Self {
            first_sample: true,
            last_processed: None,
            in_pulse: 0,
            stop_boundary: 1,
            builder: PacketBuilder::new(MAX_PACKET_LEN),
        }
    }
}

/// Touched by `on_scan_complete` while the engine is active, and by `arm`
/// only while it is inactive.
struct HarvestCell(UnsafeCell<HarvestState>);

unsafe impl Sync for HarvestCell {}

pub struct AcquisitionEngine {
    profile: HardwareProfile,
    flags: LifecycleFlags,

    // written by the trigger edge
    sample_counter: AtomicU16,
    trigger_code: AtomicU16,
    // written by the update edge, and by the main loop while inactive
    output_code: AtomicU16,
    // written by the harvester
    harvested: AtomicU32,

    waveform: Mutex<CriticalSectionRawMutex, RefCell<WaveformGenerator>>,
    harvest: HarvestCell,
    queue: ResultQueue,
}

impl AcquisitionEngine {
    pub const fn new(profile: HardwareProfile) -> Self {
        Self {
            profile,
            flags: LifecycleFlags::new(),
            sample_counter: AtomicU16::new(0),
            trigger_code: AtomicU16::new(0),
            output_code: AtomicU16::new(0),
            harvested: AtomicU32::new(0),
            waveform: Mutex::new(RefCell::new(WaveformGenerator::new(WaveformParameters::square_wave(0, 0, 0, 0, 2)))),
            harvest: HarvestCell(UnsafeCell::new(HarvestState::new())),
            queue: PacketQueue::new(),
        }
    }

    pub fn profile(&self) -> &HardwareProfile {
        &self.profile
    }

    /// Resets every per-measurement counter, flag and buffer and loads the
    /// waveform. Leaves the engine inactive.
    pub fn arm(&self, params: WaveformParameters, packet_len: usize, stop_boundary: u16) {
        self.flags.clear();

        self.sample_counter.store(0, Ordering::Relaxed);
        self.harvested.store(0, Ordering::Relaxed);
        let start_code = self.profile.clamp_code(params.start);
        self.output_code.store(start_code, Ordering::Relaxed);
        self.trigger_code.store(start_code, Ordering::Relaxed);

        self.waveform.lock(|waveform| waveform.borrow_mut().reset(params));
        // inactive, the harvester returns before touching its state
        let harvest = unsafe { &mut *self.harvest.0.get() };
        harvest.first_sample = true;
        harvest.last_processed = None;
        harvest.in_pulse = 0;
        harvest.stop_boundary = stop_boundary.max(1);
        harvest.builder.reset(packet_len);
        self.queue.reset();
    }

    pub fn is_active(&self) -> bool {
        self.flags.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.flags.active.store(active, Ordering::Release);
    }

    /// Asks for a stop at the next pulse boundary. Ignored while inactive.
    pub fn request_stop(&self) {
        if self.is_active() {
            self.flags.stop_requested.store(true, Ordering::Release);
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.flags.stop_requested.load(Ordering::Acquire)
    }

    /// Consumes the completion flag set by the harvester.
    pub fn take_complete(&self) -> bool {
        if self.flags.complete.load(Ordering::Acquire) {
            self.flags.complete.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub fn result_ready(&self) -> bool {
        self.flags.result_ready.load(Ordering::Acquire)
    }

    /// Re-arms "result ready" only while packets remain. The check and the
    /// store happen inside one critical section so a packet sealed by the
    /// harvester in between can't be left unsignaled.
    pub fn refresh_result_ready(&self) {
        critical_section::with(|_| {
            self.flags.result_ready.store(!self.queue.is_empty(), Ordering::Release);
        });
    }

    pub fn queue(&self) -> &ResultQueue {
        &self.queue
    }

    pub fn output_code(&self) -> u16 {
        self.output_code.load(Ordering::Relaxed)
    }

    /// Records a code the main loop applied directly. Only valid while inactive.
    pub fn set_output_code(&self, code: u16) {
        self.output_code.store(code, Ordering::Relaxed);
    }

    pub fn sample_index(&self) -> u16 {
        self.sample_counter.load(Ordering::Relaxed)
    }

    ////////////////////
    //  Diagnostics   //
    ////////////////////

    pub fn dropped_packets(&self) -> u32 {
        self.queue.dropped()
    }

    pub fn samples_taken(&self) -> u32 {
        self.harvested.load(Ordering::Relaxed)
    }

    pub fn queued_packets(&self) -> usize {
        self.queue.len()
    }

    /////////////////////////
    //  Interrupt context  //
    /////////////////////////

    /// Timer underflow: start one conversion.
    pub fn on_trigger_edge<T: AcquisitionTimer, F: AnalogFrontEnd>(&self, timer: &T, front_end: &F) {
        timer.clear_trigger_edge();
        if !self.is_active() {
            return;
        }

        let index = self.sample_counter.load(Ordering::Relaxed).wrapping_add(1);
        self.sample_counter.store(index, Ordering::Relaxed);
        self.trigger_code.store(self.output_code.load(Ordering::Relaxed), Ordering::Relaxed);

        front_end.start_scan();
        trace!("trigger {}", index);
    }

    /// Timer compare: advance the waveform and apply the new code.
    pub fn on_update_edge<T: AcquisitionTimer, O: AnalogOutput>(&self, timer: &T, output: &O) {
        timer.clear_update_edge();
        if !self.is_active() {
            return;
        }

        let step = self.waveform.lock(|waveform| waveform.borrow_mut().tick());
        let code = self.profile.clamp_code(step.code);
        output.write_code(code);
        self.output_code.store(code, Ordering::Relaxed);

        if step.request_stop && !self.flags.stop_requested.load(Ordering::Relaxed) {
            self.flags.stop_requested.store(true, Ordering::Release);
            trace!("waveform end at code {}", code);
        }
    }

    /// Conversion complete: collect the scan into the in-progress packet.
    pub fn on_scan_complete<F: AnalogFrontEnd>(&self, front_end: &F) {
        front_end.clear_scan_complete();
        if !self.is_active() {
            return;
        }

        let index = self.sample_counter.load(Ordering::Relaxed);
        // sole user while active
        let harvest = unsafe { &mut *self.harvest.0.get() };

        // first scan of a measurement is a settling artifact
        if harvest.first_sample {
            harvest.first_sample = false;
            harvest.last_processed = Some(index);
            self.drain(front_end);
            front_end.stop_scan();
            trace!("settling scan {} discarded", index);
            return;
        }

        if harvest.last_processed == Some(index) {
            return;
        }
        harvest.last_processed = Some(index);

        let (ch0, ch1) = self.drain(front_end);
        front_end.stop_scan();
        harvest.in_pulse = harvest.in_pulse.saturating_add(1);

        let record = SampleRecord {
            ch0,
            ch1,
            code: self.trigger_code.load(Ordering::Relaxed),
            index,
        };
        harvest.builder.push(&record);
        self.harvested.store(self.harvested.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);

        if harvest.builder.is_full() {
            if self.queue.enqueue(harvest.builder.as_bytes()) {
                self.flags.result_ready.store(true, Ordering::Release);
            } else {
                warn!("result queue full, packet dropped");
            }
            harvest.builder.clear();
        }

        if harvest.in_pulse >= harvest.stop_boundary {
            if self.flags.stop_requested.load(Ordering::Acquire) {
                self.flags.stop_requested.store(false, Ordering::Relaxed);
                self.flags.complete.store(true, Ordering::Release);
            }
            harvest.in_pulse = 0;
        }
    }

    fn drain<F: AnalogFrontEnd>(&self, front_end: &F) -> (u32, u32) {
        let [ch0_id, ch1_id] = self.profile.scan_ids;
        let mut channels = (0, 0);

        for _ in 0..ADC_FIFO_DEPTH {
            let Some(result) = front_end.next_result() else {
                break;
            };

            if result.id == ch0_id {
                channels.0 = result.value;
            } else if result.id == ch1_id {
                channels.1 = result.value;
            }
        }

        channels
    }
}
