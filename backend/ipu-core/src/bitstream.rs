//! The IPU input FIFO and the bit reader that sits on top of it
//!
//! Input arrives one quadword (16 bytes) at a time. The reader keeps up to two quadwords in an
//! internal buffer, tracks a bit position within the first one, and only pulls a new quadword from
//! the FIFO when a caller asks for more bits than the buffer currently holds.

use bincode::{Decode, Encode};
use std::collections::VecDeque;

pub const QWORD_LEN: usize = 16;
pub const INPUT_FIFO_QWORDS: usize = 8;

const QWORD_BITS: u32 = 128;
const BUFFER_QWORDS: u32 = 2;

/// The input FIFO ran dry before a step could complete. The step can be retried once more input
/// has been pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Starved;

#[derive(Debug, Clone, Encode, Decode)]
pub struct Bitstream {
    fifo: VecDeque<[u8; QWORD_LEN]>,
    // Two buffered quadwords, plus padding so that unaligned peeks never go out of bounds
    buffer: [u8; 2 * QWORD_LEN + 8],
    bit_position: u32,
    buffered_qwords: u32,
}

impl Default for Bitstream {
    fn default() -> Self {
        Self::new()
    }
}

impl Bitstream {
    pub fn new() -> Self {
        Self {
            fifo: VecDeque::with_capacity(INPUT_FIFO_QWORDS),
            buffer: [0; 2 * QWORD_LEN + 8],
            bit_position: 0,
            buffered_qwords: 0,
        }
    }

    /// Push bytes into the input FIFO. Only whole quadwords are accepted, and only as many as fit
    /// in the FIFO; returns the number of bytes consumed.
    pub fn push_input(&mut self, bytes: &[u8]) -> usize {
        let mut consumed = 0;
        for chunk in bytes.chunks_exact(QWORD_LEN) {
            if self.fifo.len() == INPUT_FIFO_QWORDS {
                break;
            }

            let mut qword = [0; QWORD_LEN];
            qword.copy_from_slice(chunk);
            self.fifo.push_back(qword);
            consumed += QWORD_LEN;
        }

        consumed
    }

    /// Number of quadwords waiting in the input FIFO (IFC)
    pub fn fifo_qwords(&self) -> u32 {
        self.fifo.len() as u32
    }

    /// Number of quadwords held in the internal buffer (FP)
    pub fn buffered_qwords(&self) -> u32 {
        self.buffered_qwords
    }

    pub fn bit_position(&self) -> u32 {
        self.bit_position
    }

    /// Drop everything in the FIFO and the internal buffer, then start reading at the given bit
    /// offset of the next quadword
    pub fn clear(&mut self, bit_position: u32) {
        self.fifo.clear();
        self.buffer.fill(0);
        self.buffered_qwords = 0;
        self.bit_position = bit_position & 0x7F;
    }

    /// Ensure that at least `bits` bits past the current position are buffered. Returns false if
    /// the FIFO ran dry first; quadwords that were pulled before that point stay buffered.
    #[must_use]
    pub fn fill(&mut self, bits: u32) -> bool {
        while self.buffered_qwords * QWORD_BITS < self.bit_position + bits {
            if self.buffered_qwords == BUFFER_QWORDS {
                // Can only happen for requests larger than the buffer, which no caller makes
                log::error!(
                    "Bit reader asked for {bits} bits at position {}; buffer is full",
                    self.bit_position
                );
                return false;
            }

            let Some(qword) = self.fifo.pop_front() else {
                return false;
            };

            let start = self.buffered_qwords as usize * QWORD_LEN;
            self.buffer[start..start + QWORD_LEN].copy_from_slice(&qword);
            self.buffered_qwords += 1;
        }

        true
    }

    /// Like `fill`, but for use with `?` in resumable decode steps
    pub fn require(&mut self, bits: u32) -> Result<(), Starved> {
        if self.fill(bits) { Ok(()) } else { Err(Starved) }
    }

    fn peek_u64(&self) -> u64 {
        let byte_index = (self.bit_position / 8) as usize;
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&self.buffer[byte_index..byte_index + 8]);
        u64::from_be_bytes(bytes) << (self.bit_position & 7)
    }

    /// Peek the next `bits` bits (1-32) as an unsigned value, most significant bit first
    pub fn peek_unsigned(&self, bits: u32) -> u32 {
        debug_assert!((1..=32).contains(&bits));
        (self.peek_u64() >> (64 - bits)) as u32
    }

    /// Peek the next `bits` bits (1-32) as a sign-extended value
    pub fn peek_signed(&self, bits: u32) -> i32 {
        debug_assert!((1..=32).contains(&bits));
        ((self.peek_u64() as i64) >> (64 - bits)) as i32
    }

    pub fn advance(&mut self, bits: u32) {
        // Decode steps only advance over bits they already required. A command's skip count is
        // the exception and may run ahead of the buffered data.
        let _ = self.fill(bits);

        self.bit_position += bits;
        if self.bit_position >= QWORD_BITS {
            self.bit_position -= QWORD_BITS;

            if self.buffered_qwords == BUFFER_QWORDS {
                self.buffer.copy_within(QWORD_LEN..2 * QWORD_LEN, 0);
                self.buffered_qwords = 1;
            } else {
                self.buffered_qwords = 0;
            }
        }
    }

    pub fn get_bits(&mut self, bits: u32) -> u32 {
        let value = self.peek_unsigned(bits);
        self.advance(bits);
        value
    }

    /// Skip to the next byte boundary
    pub fn align(&mut self) {
        let remainder = self.bit_position & 7;
        if remainder != 0 {
            self.advance(8 - remainder);
        }
    }

    /// Read `N` bytes starting at the current bit position (which need not be byte-aligned),
    /// optionally consuming them. Returns None without side effects if not enough input is
    /// available.
    pub fn read_bytes<const N: usize>(&mut self, consume: bool) -> Option<[u8; N]> {
        debug_assert!(N <= 8);

        if !self.fill(8 * N as u32) {
            return None;
        }

        let byte_index = (self.bit_position / 8) as usize;
        let shift = self.bit_position & 7;
        let bytes = std::array::from_fn(|i| {
            let high = self.buffer[byte_index + i];
            if shift == 0 {
                high
            } else {
                let low = self.buffer[byte_index + i + 1];
                (high << shift) | (low >> (8 - shift))
            }
        });

        if consume {
            self.advance(8 * N as u32);
        }

        Some(bytes)
    }

    /// Peek the next 32 bits as a big-endian word
    pub fn peek_word(&mut self) -> Option<u32> {
        self.read_bytes::<4>(false).map(u32::from_be_bytes)
    }

    /// The BP register: bit position, FIFO depth, and buffered quadword count
    pub fn bp_register(&self) -> u32 {
        (self.bit_position & 0x7F) | (self.fifo_qwords() << 8) | (self.buffered_qwords << 16)
    }
}
