use core::cell::UnsafeCell;

use critical_section;

#[derive(Clone, Copy)]
pub struct Buffer<const LENGTH: usize> {
    pub data: [u8; LENGTH],
    len: usize,
}

impl<const LENGTH: usize> Buffer<LENGTH> {
    pub const EMPTY: Buffer<LENGTH> = Buffer {
        data: [0_u8; LENGTH],
        len: 0,
    };
}

pub struct DequeueRef<'a, const LENGTH: usize, const DEPTH: usize> {
    queue: &'a PacketQueue<LENGTH, DEPTH>,
    data: &'a [u8],
}

impl<const LENGTH: usize, const DEPTH: usize> DequeueRef<'_, LENGTH, DEPTH> {
    pub fn data(&self) -> &[u8] {
        self.data
    }

    /// Leaves the packet at the head of the queue.
    pub fn cancel(self) {
        self.queue.cancel_dequeue();
    }
}

impl<const LENGTH: usize, const DEPTH: usize> Drop for DequeueRef<'_, LENGTH, DEPTH> {
    fn drop(&mut self) {
        self.queue.finish_dequeue();
    }
}

/// Write slot held by the producer. Dropping it publishes the packet.
struct EnqueueRef<'a, const LENGTH: usize, const DEPTH: usize> {
    queue: &'a PacketQueue<LENGTH, DEPTH>,
    data: &'a mut [u8],
    len: &'a mut usize,
}

impl<const LENGTH: usize, const DEPTH: usize> EnqueueRef<'_, LENGTH, DEPTH> {
    fn data(&mut self) -> &mut [u8] {
        self.data
    }

    fn len(&mut self) -> &mut usize {
        self.len
    }
}

impl<const LENGTH: usize, const DEPTH: usize> Drop for EnqueueRef<'_, LENGTH, DEPTH> {
    fn drop(&mut self) {
        self.queue.finish_enqueue();
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    QueueFullEmpty,
    InProgress,
}

/// Fixed depth ring of sealed packets between the harvester (producer,
/// interrupt context) and the main loop (consumer). A full queue rejects the
/// new packet and counts it as dropped, it never blocks or overwrites.
pub struct PacketQueue<const LENGTH: usize, const DEPTH: usize> {
    buffers: UnsafeCell<[Buffer<LENGTH>; DEPTH]>,
    read_index: UnsafeCell<usize>,
    read_in_progress: UnsafeCell<bool>,
    write_index: UnsafeCell<usize>,
    write_in_progress: UnsafeCell<bool>,
    size: UnsafeCell<usize>,
    dropped: UnsafeCell<u32>,
}

unsafe impl<const LENGTH: usize, const DEPTH: usize> Send for PacketQueue<LENGTH, DEPTH> {}
unsafe impl<const LENGTH: usize, const DEPTH: usize> Sync for PacketQueue<LENGTH, DEPTH> {}

impl<const LENGTH: usize, const DEPTH: usize> Default for PacketQueue<LENGTH, DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const LENGTH: usize, const DEPTH: usize> PacketQueue<LENGTH, DEPTH> {
    pub const fn new() -> Self {
        Self {
            buffers: UnsafeCell::new([Buffer::<LENGTH>::EMPTY; DEPTH]),
            read_index: UnsafeCell::new(0),
            read_in_progress: UnsafeCell::new(false),
            write_index: UnsafeCell::new(0),
            write_in_progress: UnsafeCell::new(false),
            size: UnsafeCell::new(0),
            dropped: UnsafeCell::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        DEPTH
    }

    pub fn len(&self) -> usize {
        critical_section::with(|_| unsafe { *self.size.get() })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= DEPTH
    }

    pub fn dropped(&self) -> u32 {
        critical_section::with(|_| unsafe { *self.dropped.get() })
    }

    /// Empties the queue and zeroes the drop counter. Only call while the
    /// consumer holds no `DequeueRef`.
    pub fn reset(&self) {
        critical_section::with(|_| unsafe {
            *self.read_index.get() = 0;
            *self.read_in_progress.get() = false;
            *self.write_index.get() = 0;
            *self.write_in_progress.get() = false;
            *self.size.get() = 0;
            *self.dropped.get() = 0;
        });
    }

    pub fn try_dequeue(&self) -> Result<DequeueRef<LENGTH, DEPTH>, Error> {
        critical_section::with(|_| unsafe {
            if *self.read_in_progress.get() {
                return Err(Error::InProgress);
            }

            if *self.size.get() > 0 {
                *self.read_in_progress.get() = true;
                let buf = &(*self.buffers.get())[*self.read_index.get()];
                let data = &buf.data[..buf.len];
                Ok(DequeueRef { queue: self, data })
            } else {
                Err(Error::QueueFullEmpty)
            }
        })
    }

    /// Copies the head packet into `out` and removes it. Returns the packet
    /// length, or `None` if the queue is empty or `out` is too small.
    pub fn dequeue(&self, out: &mut [u8]) -> Option<usize> {
        let packet = self.try_dequeue().ok()?;
        let len = packet.data().len();
        if out.len() < len {
            packet.cancel();
            return None;
        }

        out[..len].copy_from_slice(packet.data());
        Some(len)
    }

    fn cancel_dequeue(&self) {
        critical_section::with(|_| unsafe {
            *self.read_in_progress.get() = false;
        });
    }

    fn finish_dequeue(&self) {
        critical_section::with(|_| unsafe {
            let read_in_progress = self.read_in_progress.get();
            if *read_in_progress {
                *read_in_progress = false;
                *self.read_index.get() = (*self.read_index.get() + 1) % DEPTH;
                *self.size.get() -= 1;
            }
        });
    }

    fn try_enqueue(&self) -> Result<EnqueueRef<LENGTH, DEPTH>, Error> {
        critical_section::with(|_| unsafe {
            if *self.write_in_progress.get() {
                return Err(Error::InProgress);
            }

            if *self.size.get() < DEPTH {
                *self.write_in_progress.get() = true;
                let buf = &mut (*self.buffers.get())[*self.write_index.get()];
                buf.len = 0;

                Ok(EnqueueRef {
                    queue: self,
                    data: &mut buf.data,
                    len: &mut buf.len,
                })
            } else {
                Err(Error::QueueFullEmpty)
            }
        })
    }

    /// Copies `packet` into the next free slot. On a full queue, or a packet
    /// longer than a slot, the packet is dropped and counted.
    pub fn enqueue(&self, packet: &[u8]) -> bool {
        if packet.len() > LENGTH {
            self.count_drop();
            return false;
        }

        match self.try_enqueue() {
            Ok(mut slot) => {
                slot.data()[..packet.len()].copy_from_slice(packet);
                *slot.len() = packet.len();
                true
            }
            Err(_) => {
                self.count_drop();
                false
            }
        }
    }

    fn count_drop(&self) {
        critical_section::with(|_| unsafe {
            *self.dropped.get() = (*self.dropped.get()).wrapping_add(1);
        });
    }

    fn finish_enqueue(&self) {
        critical_section::with(|_| unsafe {
            let write_in_progress = self.write_in_progress.get();
            if *write_in_progress {
                *write_in_progress = false;
                *self.write_index.get() = (*self.write_index.get() + 1) % DEPTH;
                *self.size.get() += 1;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_writer_at_a_time() {
        let queue = PacketQueue::<4, 2>::new();

        let slot = queue.try_enqueue().unwrap();
        assert_eq!(queue.try_enqueue().err(), Some(Error::InProgress));
        drop(slot);

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn oversized_packet_is_dropped() {
        let queue = PacketQueue::<4, 2>::new();
        assert!(!queue.enqueue(&[0; 5]));
        assert_eq!(queue.dropped(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn small_output_leaves_packet_queued() {
        let queue = PacketQueue::<4, 2>::new();
        assert!(queue.enqueue(&[1, 2, 3]));

        let mut out = [0; 2];
        assert_eq!(queue.dequeue(&mut out), None);
        assert_eq!(queue.len(), 1);

        let mut out = [0; 4];
        assert_eq!(queue.dequeue(&mut out), Some(3));
        assert_eq!(&out[..3], &[1, 2, 3]);
    }
}
