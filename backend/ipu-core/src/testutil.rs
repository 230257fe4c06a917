use crate::bitstream::{Bitstream, QWORD_LEN};
use crate::commands::{CommandContext, Stall};
use crate::decoder::DecoderContext;
use crate::fifo::OutputFifo;
use crate::registers::Registers;

/// Builds MSB-first bitstreams for tests, padded out to whole quadwords
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bits from a pattern string such as `"0000 01"`; spaces are ignored
    #[must_use]
    pub fn bits(mut self, pattern: &str) -> Self {
        for c in pattern.chars() {
            match c {
                '0' => self.push_bit(false),
                '1' => self.push_bit(true),
                ' ' | '_' => {}
                _ => panic!("invalid bit pattern character: {c}"),
            }
        }
        self
    }

    /// Append the low `len` bits of `value`, most significant first
    #[must_use]
    pub fn value(mut self, value: u32, len: u32) -> Self {
        for i in (0..len).rev() {
            self.push_bit(value & (1 << i) != 0);
        }
        self
    }

    #[must_use]
    pub fn bytes(mut self, bytes: &[u8]) -> Self {
        for &byte in bytes {
            self = self.value(byte.into(), 8);
        }
        self
    }

    #[must_use]
    pub fn align(mut self) -> Self {
        while self.bit_len % 8 != 0 {
            self.push_bit(false);
        }
        self
    }

    fn push_bit(&mut self, bit: bool) {
        if self.bit_len % 8 == 0 {
            self.bytes.push(0);
        }

        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn into_qwords(self) -> Vec<u8> {
        let mut bytes = self.bytes;
        bytes.resize(bytes.len().next_multiple_of(QWORD_LEN).max(QWORD_LEN), 0);
        bytes
    }

    pub fn into_bitstream(self) -> Bitstream {
        let mut bitstream = Bitstream::new();
        let bytes = self.into_qwords();
        assert_eq!(bitstream.push_input(&bytes), bytes.len(), "test bitstream too long for FIFO");
        bitstream
    }
}

/// The pieces of core state that command steps operate on, plus everything drained from the
/// output FIFO so far
#[derive(Default)]
pub struct Harness {
    pub bitstream: Bitstream,
    pub decoder: DecoderContext,
    pub output: OutputFifo,
    pub registers: Registers,
    pub words: Vec<u32>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ctx(&mut self) -> CommandContext<'_> {
        CommandContext {
            bitstream: &mut self.bitstream,
            decoder: &mut self.decoder,
            output: &mut self.output,
            registers: &mut self.registers,
        }
    }

    pub fn drain(&mut self) {
        while let Some(qword) = self.output.pop() {
            self.words.extend_from_slice(&qword);
        }
    }

    pub fn push_all(&mut self, bytes: &[u8]) {
        assert_eq!(self.bitstream.push_input(bytes), bytes.len(), "input too long for FIFO");
    }

    /// Feed one quadword each time the step starves and drain output each time it fills.
    /// Returns the number of input stalls.
    pub fn run<F>(&mut self, bytes: &[u8], mut step: F) -> usize
    where
        F: FnMut(&mut CommandContext<'_>) -> Result<(), Stall>,
    {
        let mut fed = 0;
        let mut stalls = 0;
        loop {
            let result = step(&mut self.ctx());
            self.drain();
            match result {
                Ok(()) => return stalls,
                Err(Stall::OutputFull) => {}
                Err(Stall::InputStarved) => {
                    assert!(fed < bytes.len(), "step starved after consuming all input");
                    fed += self.bitstream.push_input(&bytes[fed..fed + QWORD_LEN]);
                    stalls += 1;
                }
            }
        }
    }
}
