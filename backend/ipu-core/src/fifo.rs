//! The IPU output FIFO and the cursor that streams a finished macroblock into it

use crate::decoder::DecoderContext;
use bincode::{Decode, Encode};
use std::collections::VecDeque;

pub const OUTPUT_FIFO_QWORDS: usize = 8;

pub type Qword = [u32; 4];

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct OutputFifo {
    queue: VecDeque<Qword>,
}

impl OutputFifo {
    pub fn new() -> Self {
        Self { queue: VecDeque::with_capacity(OUTPUT_FIFO_QWORDS) }
    }

    /// Number of quadwords waiting to be read (OFC)
    pub fn len(&self) -> u32 {
        self.queue.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.len() == OUTPUT_FIFO_QWORDS
    }

    #[must_use]
    pub fn push(&mut self, qword: Qword) -> bool {
        if self.is_full() {
            return false;
        }

        self.queue.push_back(qword);
        true
    }

    pub fn pop(&mut self) -> Option<Qword> {
        self.queue.pop_front()
    }

    /// Move whole quadwords into `out` until either runs out. Returns the number of words written,
    /// which is always a multiple of 4.
    pub fn drain_into(&mut self, out: &mut [u32]) -> usize {
        let mut written = 0;
        for chunk in out.chunks_exact_mut(4) {
            let Some(qword) = self.queue.pop_front() else { break };
            chunk.copy_from_slice(&qword);
            written += 4;
        }

        written
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Which decoder buffer a command streams out, and its layout in output words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum OutputSource {
    /// Signed 16-bit YCbCr samples, two per word (BDEC)
    Macroblock16,
    /// One RGBA8888 pixel per word (IDEC/CSC)
    Rgb32,
    /// Two RGBA5551 pixels per word (IDEC/CSC/PACK)
    Rgb16,
    /// Eight 4-bit palette indices per word (PACK)
    Indexed,
}

impl OutputSource {
    #[must_use]
    pub fn qwords(self) -> usize {
        match self {
            Self::Macroblock16 => 48,
            Self::Rgb32 => 64,
            Self::Rgb16 => 32,
            Self::Indexed => 8,
        }
    }

    fn word(self, decoder: &DecoderContext, index: usize) -> u32 {
        match self {
            Self::Macroblock16 => {
                let low = decoder.mb16[2 * index] as u16;
                let high = decoder.mb16[2 * index + 1] as u16;
                u32::from(low) | (u32::from(high) << 16)
            }
            Self::Rgb32 => decoder.rgb32[index].to_word(),
            Self::Rgb16 => {
                let low = decoder.rgb16[2 * index].to_halfword();
                let high = decoder.rgb16[2 * index + 1].to_halfword();
                u32::from(low) | (u32::from(high) << 16)
            }
            Self::Indexed => {
                let bytes = &decoder.indexed[4 * index..4 * index + 4];
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
        }
    }

    fn qword(self, decoder: &DecoderContext, index: usize) -> Qword {
        std::array::from_fn(|i| self.word(decoder, 4 * index + i))
    }
}

/// Progress through streaming one output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct OutputCursor {
    source: OutputSource,
    next_qword: u8,
}

impl OutputCursor {
    #[must_use]
    pub fn new(source: OutputSource) -> Self {
        Self { source, next_qword: 0 }
    }

    /// Push as much of the buffer as fits. Returns true once the whole buffer has been pushed.
    #[must_use]
    pub fn flush(&mut self, fifo: &mut OutputFifo, decoder: &DecoderContext) -> bool {
        let total = self.source.qwords();
        while usize::from(self.next_qword) < total {
            if !fifo.push(self.source.qword(decoder, self.next_qword.into())) {
                return false;
            }
            self.next_qword += 1;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Rgb16, Rgb32};
    use test_log::test;

    #[test]
    fn fifo_capacity_and_order() {
        let mut fifo = OutputFifo::new();
        for i in 0..OUTPUT_FIFO_QWORDS as u32 {
            assert!(fifo.push([i; 4]));
        }
        assert!(fifo.is_full());
        assert!(!fifo.push([99; 4]));

        let mut out = [0; 10];
        assert_eq!(fifo.drain_into(&mut out), 8);
        assert_eq!(out[..8], [0, 0, 0, 0, 1, 1, 1, 1]);
        assert_eq!(fifo.len(), 6);
        assert_eq!(fifo.pop(), Some([2; 4]));
    }

    #[test]
    fn cursor_resumes_where_it_stopped() {
        let mut decoder = DecoderContext::new();
        for (i, pixel) in decoder.rgb32.iter_mut().enumerate() {
            *pixel = Rgb32::rgba(i as u8, 0, 0, 0x80);
        }

        let mut fifo = OutputFifo::new();
        let mut cursor = OutputCursor::new(OutputSource::Rgb32);

        let mut words = Vec::new();
        while !cursor.flush(&mut fifo, &decoder) {
            assert!(fifo.is_full());
            let mut out = [0; 32];
            let written = fifo.drain_into(&mut out);
            words.extend_from_slice(&out[..written]);
        }
        while let Some(qword) = fifo.pop() {
            words.extend_from_slice(&qword);
        }

        assert_eq!(words.len(), 256);
        assert!(words.iter().enumerate().all(|(i, &word)| word == 0x8000_0000 | i as u32));
    }

    #[test]
    fn word_packing() {
        let mut decoder = DecoderContext::new();
        decoder.mb16[0] = -1;
        decoder.mb16[1] = 0x123;
        decoder.rgb16[0] = Rgb16 { r: 0x1F, g: 0, b: 0, a: false };
        decoder.rgb16[1] = Rgb16 { r: 0, g: 0, b: 0, a: true };
        decoder.indexed[..4].copy_from_slice(&[0x10, 0x32, 0x54, 0x76]);

        assert_eq!(OutputSource::Macroblock16.word(&decoder, 0), 0x0123_FFFF);
        assert_eq!(OutputSource::Rgb16.word(&decoder, 0), 0x8000_001F);
        assert_eq!(OutputSource::Indexed.word(&decoder, 0), 0x7654_3210);
    }
}
