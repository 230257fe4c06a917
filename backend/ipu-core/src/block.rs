//! Per-block coefficient decoding, inverse quantization, and reconstruction
//!
//! Decoding a block can stop partway through whenever the input FIFO runs dry. `BlockProgress`
//! records how far the block got so that the next attempt picks up on the same coefficient
//! without re-reading any bits.

use crate::bitstream::{Bitstream, Starved};
use crate::decoder::{BlockTarget, DecoderContext};
use crate::idct;
use crate::vlc::{self, RunLevel};
use bincode::{Decode, Encode};
use ipu_config::ScanOrder;

const BLOCK_LEN: usize = 64;

// Fixed-length escape fields
const ESCAPE_RUN_LEN: u32 = 6;
const ESCAPE_LEVEL_LEN: u32 = 12;
const MPEG1_ESCAPE_LEVEL_LEN: u32 = 8;

// Row/column bit shuffle that matches the coefficient layout the IDCT expects
const fn permute_scan(order: [u8; BLOCK_LEN]) -> [u8; BLOCK_LEN] {
    let mut scan = [0; BLOCK_LEN];

    let mut i = 0;
    while i < BLOCK_LEN {
        let j = order[i];
        scan[i] = ((j & 0x36) >> 1) | ((j & 0x09) << 2);
        i += 1;
    }

    scan
}

#[rustfmt::skip]
pub const ZIGZAG_SCAN: [u8; BLOCK_LEN] = permute_scan([
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5,
    12, 19, 26, 33, 40, 48, 41, 34, 27, 20, 13, 6, 7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
]);

#[rustfmt::skip]
pub const ALTERNATE_SCAN: [u8; BLOCK_LEN] = permute_scan([
    0, 8, 16, 24, 1, 9, 2, 10, 17, 25, 32, 40, 48, 56, 57, 49,
    41, 33, 26, 18, 3, 11, 4, 12, 19, 27, 34, 42, 50, 58, 35, 43,
    51, 59, 20, 28, 5, 13, 6, 14, 21, 29, 36, 44, 52, 60, 37, 45,
    53, 61, 22, 30, 7, 15, 23, 31, 38, 46, 54, 62, 39, 47, 55, 63,
]);

fn scan_table(order: ScanOrder) -> &'static [u8; BLOCK_LEN] {
    match order {
        ScanOrder::Zigzag => &ZIGZAG_SCAN,
        ScanOrder::Alternate => &ALTERNATE_SCAN,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct BlockProgress {
    /// The intra DC differential has not been read yet
    dc_pending: bool,
    /// Coefficient index to resume at
    coefficient: u8,
    /// A run/level code that has been consumed but whose level bits have not
    pending: Option<RunLevel>,
}

#[cfg(test)]
impl BlockProgress {
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        *self == Self::default()
    }
}

#[inline]
fn saturate(value: i32) -> i16 {
    if (value + 2048) as u32 > 4095 { ((value >> 31) ^ 2047) as i16 } else { value as i16 }
}

// Adds -1 to non-negative values and 0 to negative values, then forces the result odd
#[inline]
fn oddify_escape(value: i32) -> i32 {
    (value + !(value >> 31)) | 1
}

// The MPEG-1 escape level: 8 bits, extended to 16 bits when the first 8 are 0x00 or 0x80
fn mpeg1_escape_level(bitstream: &mut Bitstream) -> i32 {
    let level = bitstream.peek_signed(MPEG1_ESCAPE_LEVEL_LEN);
    bitstream.advance(MPEG1_ESCAPE_LEVEL_LEN);

    if level & 0x7F == 0 {
        bitstream.get_bits(MPEG1_ESCAPE_LEVEL_LEN) as i32 + 2 * level
    } else {
        level
    }
}

fn read_sign(bitstream: &mut Bitstream) -> i32 {
    let sign = bitstream.peek_signed(1);
    bitstream.advance(1);
    sign
}

enum NextCoefficient {
    Code(RunLevel),
    EndOfBlock,
}

fn next_code(
    bitstream: &mut Bitstream,
    index: &mut usize,
    lookup: impl FnOnce(u32) -> Option<vlc::Vlc<RunLevel>>,
) -> NextCoefficient {
    let Some(entry) = lookup(bitstream.peek_unsigned(16)) else {
        log::debug!("Invalid DCT coefficient code at index {index}; ending block");
        return NextCoefficient::EndOfBlock;
    };

    bitstream.advance(entry.len.into());
    if entry.value.is_end_of_block() {
        return NextCoefficient::EndOfBlock;
    }

    *index += if entry.value.is_escape() {
        bitstream.get_bits(ESCAPE_RUN_LEN) as usize
    } else {
        entry.value.run.into()
    };

    if *index >= BLOCK_LEN {
        NextCoefficient::EndOfBlock
    } else {
        NextCoefficient::Code(entry.value)
    }
}

/// Decode and dequantize the AC coefficients of an intra block into the DCT block
pub fn decode_intra_coefficients(
    bitstream: &mut Bitstream,
    decoder: &mut DecoderContext,
    progress: &mut BlockProgress,
) -> Result<(), Starved> {
    let scan = scan_table(decoder.scan_order);
    let alternate = decoder.alternate_intra_table();
    let quantizer_scale = i32::from(decoder.quantizer_scale);

    let mut i = 1 + usize::from(progress.coefficient);
    loop {
        let code = match progress.pending.take() {
            Some(code) => code,
            None => {
                if bitstream.require(16).is_err() {
                    progress.coefficient = (i - 1) as u8;
                    return Err(Starved);
                }

                match next_code(bitstream, &mut i, |code| vlc::intra_coefficient(code, alternate)) {
                    NextCoefficient::Code(code) => code,
                    NextCoefficient::EndOfBlock => {
                        progress.coefficient = 0;
                        return Ok(());
                    }
                }
            }
        };

        if bitstream.require(16).is_err() {
            progress.coefficient = (i - 1) as u8;
            progress.pending = Some(code);
            return Err(Starved);
        }

        let weight = quantizer_scale * i32::from(decoder.intra_quantizer_matrix[i]);
        let value = if code.is_escape() {
            if decoder.mpeg1 {
                let level = mpeg1_escape_level(bitstream);
                oddify_escape((level * weight) >> 4)
            } else {
                let level = bitstream.peek_signed(ESCAPE_LEVEL_LEN);
                bitstream.advance(ESCAPE_LEVEL_LEN);
                (level * weight) >> 4
            }
        } else {
            let mut value = (i32::from(code.level) * weight) >> 4;
            if decoder.mpeg1 {
                value = (value - 1) | 1;
            }

            let sign = read_sign(bitstream);
            (value ^ sign) - sign
        };

        decoder.dct_block[scan[i] as usize] = saturate(value);
        i += 1;
    }
}

/// Decode and dequantize the coefficients of a non-intra block into the DCT block.
///
/// Returns the final coefficient position, which selects the reconstruction path.
pub fn decode_non_intra_coefficients(
    bitstream: &mut Bitstream,
    decoder: &mut DecoderContext,
    progress: &mut BlockProgress,
) -> Result<u32, Starved> {
    let scan = scan_table(decoder.scan_order);
    let quantizer_scale = i32::from(decoder.quantizer_scale);

    let mut i = usize::from(progress.coefficient);
    loop {
        let code = match progress.pending.take() {
            Some(code) => code,
            None => {
                if bitstream.require(16).is_err() {
                    progress.coefficient = i as u8;
                    return Err(Starved);
                }

                let first = i == 0;
                match next_code(bitstream, &mut i, |code| vlc::non_intra_coefficient(code, first)) {
                    NextCoefficient::Code(code) => code,
                    NextCoefficient::EndOfBlock => {
                        progress.coefficient = 0;
                        return Ok(i as u32);
                    }
                }
            }
        };

        if bitstream.require(16).is_err() {
            progress.coefficient = i as u8;
            progress.pending = Some(code);
            return Err(Starved);
        }

        let weight = quantizer_scale * i32::from(decoder.non_intra_quantizer_matrix[i]);
        let value = if code.is_escape() {
            if decoder.mpeg1 {
                let level = mpeg1_escape_level(bitstream);
                let value = ((2 * (level + (level >> 31)) + 1) * weight) / 32;
                oddify_escape(value)
            } else {
                let level = bitstream.peek_signed(ESCAPE_LEVEL_LEN) + bitstream.peek_signed(1);
                bitstream.advance(ESCAPE_LEVEL_LEN);
                ((2 * level + 1) * weight) >> 5
            }
        } else {
            let sign = bitstream.peek_signed(1);
            let value = ((2 * i32::from(code.level) + 1) * weight) >> 5;
            bitstream.advance(1);
            (value ^ sign) - sign
        };

        decoder.dct_block[scan[i] as usize] = saturate(value);
        i += 1;
    }
}

/// Decode one intra block (1-6) of the current macroblock and reconstruct it into the 8-bit
/// macroblock buffer.
///
/// `resuming` is set when a previous attempt at this same block ran out of input; the DC
/// differential is only read again if that attempt stopped before reading it.
pub fn decode_intra_block(
    bitstream: &mut Bitstream,
    decoder: &mut DecoderContext,
    progress: &mut BlockProgress,
    block: u8,
    resuming: bool,
) -> Result<(), Starved> {
    let target = BlockTarget::for_block(block, decoder.macroblock_modes);

    if !resuming || progress.dc_pending {
        progress.dc_pending = false;
        if bitstream.require(16).is_err() {
            progress.dc_pending = true;
            return Err(Starved);
        }

        let diff = if target.component == 0 {
            vlc::luma_dc_diff(bitstream)
        } else {
            vlc::chroma_dc_diff(bitstream)
        };

        let predictor = &mut decoder.dc_predictors[target.component];
        *predictor += diff;
        decoder.dct_block[0] = (*predictor << decoder.intra_dc_precision.dc_shift()) as i16;
    }

    decode_intra_coefficients(bitstream, decoder, progress)?;

    idct::idct_copy(&mut decoder.dct_block, &mut decoder.mb8, target.offset, target.stride);

    Ok(())
}

/// Decode one non-intra block (1-6) of the current macroblock and add its residual into the
/// 16-bit macroblock buffer
pub fn decode_non_intra_block(
    bitstream: &mut Bitstream,
    decoder: &mut DecoderContext,
    progress: &mut BlockProgress,
    block: u8,
    resuming: bool,
) -> Result<(), Starved> {
    let target = BlockTarget::for_block(block, decoder.macroblock_modes);

    if !resuming {
        decoder.dct_block.fill(0);
    }

    let last = decode_non_intra_coefficients(bitstream, decoder, progress)?;

    idct::idct_add(last, &mut decoder.dct_block, &mut decoder.mb16, target.offset, target.stride);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::BitWriter;
    use ipu_config::IntraDcPrecision;
    use test_log::test;

    fn unit_decoder() -> DecoderContext {
        let mut decoder = DecoderContext::new();
        decoder.quantizer_scale = 1;
        decoder.intra_quantizer_matrix = [16; 64];
        decoder.non_intra_quantizer_matrix = [16; 64];
        decoder
    }

    #[test]
    fn scan_tables_are_permutations() {
        for scan in [ZIGZAG_SCAN, ALTERNATE_SCAN] {
            let mut seen = [false; 64];
            for &index in &scan {
                assert!(!seen[index as usize]);
                seen[index as usize] = true;
            }
        }

        // Natural (0, 1) and (1, 0) in the IDCT's coefficient layout
        assert_eq!(ZIGZAG_SCAN[..4], [0, 4, 32, 8]);
        assert_eq!(ALTERNATE_SCAN[..2], [0, 32]);
    }

    #[test]
    fn saturation() {
        assert_eq!(saturate(2047), 2047);
        assert_eq!(saturate(2048), 2047);
        assert_eq!(saturate(-2048), -2048);
        assert_eq!(saturate(-2049), -2048);
        assert_eq!(saturate(100_000), 2047);
    }

    #[test]
    fn intra_coefficients() {
        // (0, 2)+, (1, 1)-, end of block
        let mut bitstream = BitWriter::new().bits("0100 0 011 1 10").into_bitstream();
        let mut decoder = unit_decoder();
        let mut progress = BlockProgress::default();

        assert_eq!(decode_intra_coefficients(&mut bitstream, &mut decoder, &mut progress), Ok(()));
        assert_eq!(decoder.dct_block[4], 2);
        assert_eq!(decoder.dct_block[8], -1);
        assert_eq!(decoder.dct_block.iter().filter(|&&c| c != 0).count(), 2);
        assert_eq!(bitstream.bit_position(), 11);
        assert!(progress.is_fresh());
    }

    #[test]
    fn intra_escape() {
        let mut bitstream = BitWriter::new()
            .bits("0000 01")
            .value(3, 6)
            .value(0xFFE, 12)
            .bits("10")
            .into_bitstream();
        let mut decoder = unit_decoder();
        decoder.quantizer_scale = 4;
        let mut progress = BlockProgress::default();

        assert_eq!(decode_intra_coefficients(&mut bitstream, &mut decoder, &mut progress), Ok(()));
        assert_eq!(decoder.dct_block[36], -8);
    }

    #[test]
    fn mpeg1_intra_oddification() {
        // (0, 2)+ and (0, 3)+
        let mut bitstream = BitWriter::new().bits("0100 0 0010 1 0 10").into_bitstream();
        let mut decoder = unit_decoder();
        decoder.mpeg1 = true;
        let mut progress = BlockProgress::default();

        assert_eq!(decode_intra_coefficients(&mut bitstream, &mut decoder, &mut progress), Ok(()));
        assert_eq!(decoder.dct_block[ZIGZAG_SCAN[1] as usize], 1);
        assert_eq!(decoder.dct_block[ZIGZAG_SCAN[2] as usize], 3);
    }

    #[test]
    fn mpeg1_extended_escape() {
        // 8-bit level of 0 extends to the next 8 bits
        let mut bitstream = BitWriter::new()
            .bits("0000 01")
            .value(0, 6)
            .value(0, 8)
            .value(200, 8)
            .bits("10")
            .into_bitstream();
        let mut decoder = unit_decoder();
        decoder.mpeg1 = true;
        let mut progress = BlockProgress::default();

        assert_eq!(decode_intra_coefficients(&mut bitstream, &mut decoder, &mut progress), Ok(()));
        assert_eq!(decoder.dct_block[ZIGZAG_SCAN[1] as usize], 199);
    }

    #[test]
    fn run_past_end_of_block() {
        let mut bitstream =
            BitWriter::new().bits("0000 01").value(63, 6).value(1, 12).into_bitstream();
        let mut decoder = unit_decoder();
        let mut progress = BlockProgress::default();

        assert_eq!(decode_intra_coefficients(&mut bitstream, &mut decoder, &mut progress), Ok(()));
        assert_eq!(decoder.dct_block, [0; 64]);
        assert_eq!(bitstream.bit_position(), 12);
    }

    #[test]
    fn non_intra_coefficients() {
        // First (0, 1)+, then (0, 2)-, end of block
        let mut bitstream = BitWriter::new().bits("1 0 0100 1 10").into_bitstream();
        let mut decoder = unit_decoder();
        let mut progress = BlockProgress::default();

        assert_eq!(
            decode_non_intra_coefficients(&mut bitstream, &mut decoder, &mut progress),
            Ok(2)
        );
        assert_eq!(decoder.dct_block[0], 1);
        assert_eq!(decoder.dct_block[4], -2);
    }

    #[test]
    fn non_intra_escape() {
        let mut bitstream =
            BitWriter::new().bits("0000 01").value(0, 6).value(5, 12).bits("10").into_bitstream();
        let mut decoder = unit_decoder();
        decoder.quantizer_scale = 2;
        let mut progress = BlockProgress::default();

        // ((2 * 5 + 1) * 2 * 16) >> 5
        assert_eq!(
            decode_non_intra_coefficients(&mut bitstream, &mut decoder, &mut progress),
            Ok(1)
        );
        assert_eq!(decoder.dct_block[0], 11);
    }

    #[test]
    fn mpeg1_non_intra_escape_oddification() {
        // Escaped levels +5 and -5, then end of block
        let writer = BitWriter::new()
            .bits("0000 01")
            .value(0, 6)
            .value(5, 8)
            .bits("0000 01")
            .value(0, 6)
            .value(0xFB, 8)
            .bits("10");
        let mut bitstream = writer.clone().into_bitstream();
        let mut decoder = unit_decoder();
        decoder.mpeg1 = true;
        decoder.quantizer_scale = 3;
        let mut progress = BlockProgress::default();

        // (11 * 48) / 32 = 16 and (-11 * 48) / 32 = -16, both forced odd toward zero
        assert_eq!(
            decode_non_intra_coefficients(&mut bitstream, &mut decoder, &mut progress),
            Ok(2)
        );
        assert_eq!(decoder.dct_block[0], 15);
        assert_eq!(decoder.dct_block[ZIGZAG_SCAN[1] as usize], -15);
        assert_eq!(bitstream.bit_position(), writer.bit_len() as u32);
    }

    #[test]
    fn alternate_scan_placement() {
        // (0, 2)+, (1, 1)-, end of block
        let mut bitstream = BitWriter::new().bits("0100 0 011 1 10").into_bitstream();
        let mut decoder = unit_decoder();
        decoder.scan_order = ScanOrder::Alternate;
        let mut progress = BlockProgress::default();

        assert_eq!(decode_intra_coefficients(&mut bitstream, &mut decoder, &mut progress), Ok(()));

        // Scan positions 1 and 3 run down the first column: natural (1, 0) and (3, 0)
        assert_eq!(decoder.dct_block[32], 2);
        assert_eq!(decoder.dct_block[40], -1);
        assert_eq!(decoder.dct_block.iter().filter(|&&c| c != 0).count(), 2);
    }

    fn split_stream() -> (Vec<u8>, BitWriter) {
        let mut writer = BitWriter::new();
        for _ in 0..50 {
            writer = writer.bits("11 0");
        }
        writer = writer.bits("0000 01").value(2, 6).value(0x7FF, 12).bits("10");
        (writer.clone().into_qwords(), writer)
    }

    #[test]
    fn intra_coefficients_resume_after_starving() {
        let (bytes, writer) = split_stream();

        let mut expected_bitstream = writer.into_bitstream();
        let mut expected = unit_decoder();
        let mut progress = BlockProgress::default();
        assert_eq!(
            decode_intra_coefficients(&mut expected_bitstream, &mut expected, &mut progress),
            Ok(())
        );

        let mut bitstream = Bitstream::new();
        let mut decoder = unit_decoder();
        let mut progress = BlockProgress::default();
        let mut fed = 0;
        loop {
            match decode_intra_coefficients(&mut bitstream, &mut decoder, &mut progress) {
                Ok(()) => break,
                Err(Starved) => {
                    assert!(fed < bytes.len(), "decoder starved with all input consumed");
                    fed += bitstream.push_input(&bytes[fed..fed + 16]);
                }
            }
        }

        assert_eq!(decoder.dct_block, expected.dct_block);
        assert_eq!(decoder.dct_block[ZIGZAG_SCAN[53] as usize], 2047);
        assert_eq!(bitstream.bit_position(), expected_bitstream.bit_position());
    }

    #[test]
    fn starving_mid_code_keeps_the_code() {
        // The (0, 2) code fits in the first quadword, but fewer than 16 bits remain after it
        let writer =
            BitWriter::new().bytes(&[0; 13]).value(0, 7).bits("0100 1 10").value(0, 32);
        let bytes = writer.into_qwords();

        let mut bitstream = Bitstream::new();
        bitstream.push_input(&bytes[..16]);
        bitstream.advance(111);

        let mut decoder = unit_decoder();
        let mut progress = BlockProgress::default();
        assert_eq!(
            decode_intra_coefficients(&mut bitstream, &mut decoder, &mut progress),
            Err(Starved)
        );
        assert_eq!(progress.pending, Some(RunLevel { run: 0, level: 2 }));

        bitstream.push_input(&bytes[16..]);
        assert_eq!(decode_intra_coefficients(&mut bitstream, &mut decoder, &mut progress), Ok(()));
        assert_eq!(decoder.dct_block[ZIGZAG_SCAN[1] as usize], -2);
        assert!(progress.is_fresh());
    }

    #[test]
    fn intra_block_reconstruction() {
        // Luma DC size 2 (01), differential +2 (10), then end of block
        let mut bitstream = BitWriter::new().bits("01 10 10").into_bitstream();
        let mut decoder = unit_decoder();
        decoder.intra_dc_precision = IntraDcPrecision::Nine;
        decoder.reset_dc_predictors();
        let mut progress = BlockProgress::default();

        assert_eq!(
            decode_intra_block(&mut bitstream, &mut decoder, &mut progress, 2, false),
            Ok(())
        );

        // (256 + 2) << 2 = 1032, reconstructed as (1032 + 4) >> 3 = 129
        assert_eq!(decoder.dc_predictors, [258, 256, 256]);
        for row in 0..8 {
            assert_eq!(decoder.mb8[row * 16..row * 16 + 8], [0; 8]);
            assert_eq!(decoder.mb8[row * 16 + 8..row * 16 + 16], [129; 8]);
        }
        assert_eq!(decoder.dct_block, [0; 64]);
    }

    #[test]
    fn intra_block_resumes_after_dc() {
        let mut decoder = unit_decoder();
        decoder.reset_dc_predictors();
        let mut progress = BlockProgress::default();

        // No input at all: the DC differential is still pending
        let mut bitstream = Bitstream::new();
        assert_eq!(
            decode_intra_block(&mut bitstream, &mut decoder, &mut progress, 5, false),
            Err(Starved)
        );
        assert!(progress.dc_pending);

        // Chroma DC size 0 (00), end of block
        bitstream.push_input(&BitWriter::new().bits("00 10").into_qwords());
        assert_eq!(
            decode_intra_block(&mut bitstream, &mut decoder, &mut progress, 5, true),
            Ok(())
        );
        assert_eq!(decoder.mb8[256..320], [128; 64]);
        assert_eq!(decoder.dc_predictors, [128; 3]);
    }

    #[test]
    fn non_intra_block_adds_residual() {
        let mut bitstream = BitWriter::new().bits("1 0 10").into_bitstream();
        let mut decoder = unit_decoder();
        decoder.quantizer_scale = 8;
        decoder.mb16.fill(3);
        let mut progress = BlockProgress::default();

        // First coefficient (3 * 8 * 16) >> 5 = 12, a flat residual of (12 + 4) >> 3 = 2
        assert_eq!(
            decode_non_intra_block(&mut bitstream, &mut decoder, &mut progress, 6, false),
            Ok(())
        );
        assert_eq!(decoder.mb16[320..384], [5; 64]);
        assert_eq!(decoder.mb16[..320], [3; 320]);
    }
}
