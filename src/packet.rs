use heapless::Vec;

use crate::profile::{ADC_RESULT_MASK, MAX_PACKET_LEN, SAMPLE_RECORD_LEN};

/// One harvested scan: two 20 bit channel readings, the output code that was
/// applied when the conversion was triggered and the running sample index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleRecord {
    pub ch0: u32,
    pub ch1: u32,
    pub code: u16,
    pub index: u16,
}

impl SampleRecord {
    pub fn encode(&self) -> [u8; SAMPLE_RECORD_LEN] {
        let ch0 = (self.ch0 & ADC_RESULT_MASK).to_le_bytes();
        let ch1 = (self.ch1 & ADC_RESULT_MASK).to_le_bytes();
        let code = self.code.to_le_bytes();
        let index = self.index.to_le_bytes();

        [
            ch0[0], ch0[1], ch0[2],
            ch1[0], ch1[1], ch1[2],
            code[0], code[1],
            index[0], index[1],
        ]
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SAMPLE_RECORD_LEN {
            return None;
        }

        Some(Self {
            ch0: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            ch1: u32::from_le_bytes([bytes[3], bytes[4], bytes[5], 0]),
            code: u16::from_le_bytes([bytes[6], bytes[7]]),
            index: u16::from_le_bytes([bytes[8], bytes[9]]),
        })
    }
}

/// In-progress packet. Records are appended until `target_len` bytes are
/// buffered, at which point the caller seals it into the queue and clears it.
pub struct PacketBuilder {
    buf: Vec<u8, MAX_PACKET_LEN>,
    target_len: usize,
}

impl PacketBuilder {
    pub const fn new(target_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            target_len,
        }
    }

    /// Discards buffered bytes and sets a new seal length. Lengths are rounded
    /// down to whole records and capped to the packet buffer.
    pub fn reset(&mut self, target_len: usize) {
        let records = target_len.min(MAX_PACKET_LEN) / SAMPLE_RECORD_LEN;
        self.buf.clear();
        self.target_len = records.max(1) * SAMPLE_RECORD_LEN;
    }

    pub fn push(&mut self, record: &SampleRecord) -> bool {
        if self.is_full() {
            return false;
        }

        self.buf.extend_from_slice(&record.encode()).is_ok()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.target_len
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        let record = SampleRecord {
            ch0: 0x0A_BCDE,
            ch1: 0x01_2345,
            code: 0x0800,
            index: 0x1234,
        };

        assert_eq!(record.encode(), [0xDE, 0xBC, 0x0A, 0x45, 0x23, 0x01, 0x00, 0x08, 0x34, 0x12]);
        assert_eq!(SampleRecord::decode(&record.encode()), Some(record));
    }

    #[test]
    fn channel_values_masked_to_20_bits() {
        let record = SampleRecord {
            ch0: 0xFFFF_FFFF,
            ch1: 0x0100_0001,
            ..Default::default()
        };

        let bytes = record.encode();
        assert_eq!(&bytes[0..3], &[0xFF, 0xFF, 0x0F]);
        assert_eq!(&bytes[3..6], &[0x01, 0x00, 0x00]);
    }

    fn records_until_full(builder: &mut PacketBuilder) -> usize {
        let mut records = 0;
        while builder.push(&SampleRecord::default()) {
            records += 1;
        }
        records
    }

    #[test]
    fn builder_fills_to_target() {
        let mut builder = PacketBuilder::new(0);
        builder.reset(30);

        for index in 0..3 {
            assert!(!builder.is_full());
            assert!(builder.push(&SampleRecord { index, ..Default::default() }));
        }

        assert!(builder.is_full());
        assert!(!builder.push(&SampleRecord::default()));
        assert_eq!(builder.as_bytes().len(), 30);
        assert_eq!(SampleRecord::decode(&builder.as_bytes()[20..]).map(|r| r.index), Some(2));

        builder.clear();
        assert!(builder.as_bytes().is_empty());
        assert!(!builder.is_full());
    }

    #[test]
    fn target_len_is_whole_records() {
        let mut builder = PacketBuilder::new(0);

        builder.reset(25);
        assert_eq!(records_until_full(&mut builder), 2);

        builder.reset(0);
        assert_eq!(records_until_full(&mut builder), 1);

        builder.reset(10_000);
        assert_eq!(records_until_full(&mut builder), MAX_PACKET_LEN / SAMPLE_RECORD_LEN);
    }
}
