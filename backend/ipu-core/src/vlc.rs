//! Variable-length code decoding for macroblock headers, DC differentials, and DCT coefficients
//!
//! Every routine here assumes that the caller has already buffered enough input; the longest
//! sequence any of them reads fits within 32 bits.

mod tables;

use crate::bitstream::Bitstream;
use tables::{
    CBP_7, CBP_9, DC_CHROMA_5, DC_CHROMA_10, DC_LUMA_5, DC_LUMA_9, DCT_FIRST, DCT_NEXT, DCT_TAB0,
    DCT_TAB0A, DCT_TAB1, DCT_TAB1A, DCT_TAB2, DCT_TAB3, DCT_TAB4, DCT_TAB5, DCT_TAB6, DMV_2, MB_B,
    MB_I, MB_P, MBA_5, MBA_11, MV_4, MV_10,
};

pub use tables::{RunLevel, Vlc};

pub const MACROBLOCK_INTRA: u32 = 1 << 0;
pub const MACROBLOCK_PATTERN: u32 = 1 << 1;
pub const MACROBLOCK_MOTION_BACKWARD: u32 = 1 << 2;
pub const MACROBLOCK_MOTION_FORWARD: u32 = 1 << 3;
pub const MACROBLOCK_QUANT: u32 = 1 << 4;
pub const DCT_TYPE_INTERLACED: u32 = 1 << 5;

const MOTION_TYPE_BASE: u32 = 1 << 6;
const MOTION_TYPE_FRAME: u32 = 2 * MOTION_TYPE_BASE;

pub const I_PICTURE: u8 = 1;
pub const P_PICTURE: u8 = 2;
pub const B_PICTURE: u8 = 3;
pub const D_PICTURE: u8 = 4;

pub const FRAME_PICTURE: u8 = 3;

#[rustfmt::skip]
pub const NON_LINEAR_QUANTIZER_SCALE: [u8; 32] = [
    0, 1, 2, 3, 4, 5, 6, 7,
    8, 10, 12, 14, 16, 18, 20, 22,
    24, 28, 32, 36, 40, 44, 48, 52,
    56, 64, 72, 80, 88, 96, 104, 112,
];

const ADDRESS_ESCAPE_CODE: u32 = 0b0000_0001_000;
const ADDRESS_STUFFING_CODE: u32 = 0b0000_0001_111;
const ADDRESS_ESCAPE_DATA: u32 = (11 << 16) | 0x23;
const ADDRESS_STUFFING_DATA: u32 = (11 << 16) | 0x22;

#[must_use]
pub fn scale_from_code(code: u32, non_linear: bool) -> u8 {
    let code = code & 0x1F;
    if non_linear { NON_LINEAR_QUANTIZER_SCALE[code as usize] } else { (code << 1) as u8 }
}

/// Header fields that determine how `macroblock_type` is coded and what follows it
#[derive(Debug, Clone, Copy)]
pub struct PictureCoding {
    pub coding_type: u8,
    pub picture_structure: u8,
    pub frame_pred_frame_dct: bool,
}

/// Decode `macroblock_type` plus the motion type and DCT type fields that follow it.
///
/// Returns the macroblock mode flags. For B pictures the code length is also reported in bits
/// 16-23, which is what the hardware returns from VDEC. An undecodable code returns 0.
pub fn macroblock_modes(bitstream: &mut Bitstream, picture: PictureCoding) -> u32 {
    let frame_picture = picture.picture_structure == FRAME_PICTURE;

    match picture.coding_type {
        I_PICTURE => {
            let code = bitstream.peek_unsigned(2);
            if code == 0 {
                return 0;
            }

            let entry = MB_I[code as usize];
            bitstream.advance(entry.len.into());
            let mut modes = u32::from(entry.value);

            if !picture.frame_pred_frame_dct && frame_picture {
                modes |= bitstream.get_bits(1) * DCT_TYPE_INTERLACED;
            }

            modes
        }
        P_PICTURE => {
            let code = bitstream.peek_unsigned(6);
            if code == 0 {
                return 0;
            }

            let entry = MB_P[code as usize];
            bitstream.advance(entry.len.into());
            let mut modes = u32::from(entry.value);

            if !frame_picture {
                if modes & MACROBLOCK_MOTION_FORWARD != 0 {
                    modes |= bitstream.get_bits(2) * MOTION_TYPE_BASE;
                }
            } else if picture.frame_pred_frame_dct {
                if modes & MACROBLOCK_MOTION_FORWARD != 0 {
                    modes |= MOTION_TYPE_FRAME;
                }
            } else {
                if modes & MACROBLOCK_MOTION_FORWARD != 0 {
                    modes |= bitstream.get_bits(2) * MOTION_TYPE_BASE;
                }
                if modes & (MACROBLOCK_INTRA | MACROBLOCK_PATTERN) != 0 {
                    modes |= bitstream.get_bits(1) * DCT_TYPE_INTERLACED;
                }
            }

            modes
        }
        B_PICTURE => {
            let code = bitstream.peek_unsigned(6);
            if code == 0 {
                return 0;
            }

            let entry = MB_B[code as usize];
            bitstream.advance(entry.len.into());
            let mut modes = u32::from(entry.value);

            if !frame_picture {
                if modes & MACROBLOCK_INTRA == 0 {
                    modes |= bitstream.get_bits(2) * MOTION_TYPE_BASE;
                }
            } else if picture.frame_pred_frame_dct {
                modes |= MOTION_TYPE_FRAME;
            } else {
                if modes & MACROBLOCK_INTRA == 0 {
                    modes |= bitstream.get_bits(2) * MOTION_TYPE_BASE;
                }
                if modes & (MACROBLOCK_INTRA | MACROBLOCK_PATTERN) != 0 {
                    modes |= bitstream.get_bits(1) * DCT_TYPE_INTERLACED;
                }
            }

            modes | (u32::from(entry.len) << 16)
        }
        D_PICTURE => {
            log::warn!("Decoding macroblock type for a D picture");

            if bitstream.get_bits(1) == 0 {
                return 0;
            }

            MACROBLOCK_INTRA | (1 << 16)
        }
        _ => 0,
    }
}

pub fn quantizer_scale(bitstream: &mut Bitstream, non_linear: bool) -> u8 {
    scale_from_code(bitstream.get_bits(5), non_linear)
}

pub fn coded_block_pattern(bitstream: &mut Bitstream) -> u8 {
    let entry = if bitstream.peek_unsigned(16) >= 0x2000 {
        CBP_7[bitstream.peek_unsigned(7) as usize - 16]
    } else {
        CBP_9[bitstream.peek_unsigned(9) as usize]
    };

    bitstream.advance(entry.len.into());
    entry.value
}

/// Decode a signed `motion_code`. The result is in VDEC's format: the sign-extended motion code
/// with the code length (excluding the sign bit) ORed into bits 16-23.
pub fn motion_delta(bitstream: &mut Bitstream) -> u32 {
    let code = bitstream.peek_unsigned(16);
    if code & 0x8000 != 0 {
        bitstream.advance(1);
        return 1 << 16;
    }

    let entry = if code & 0xF000 != 0 || code & 0xFC00 == 0x0C00 {
        MV_4[bitstream.peek_unsigned(4) as usize]
    } else {
        MV_10[bitstream.peek_unsigned(10) as usize]
    };

    bitstream.advance(entry.len.into());
    let sign = bitstream.peek_signed(1);
    bitstream.advance(1);

    let delta = (i32::from(entry.value) ^ sign) - sign;
    (delta | (i32::from(entry.len) << 16)) as u32
}

/// Decode a dual-prime differential motion vector, in VDEC's format
pub fn dmvector(bitstream: &mut Bitstream) -> u32 {
    let entry = DMV_2[bitstream.peek_unsigned(2) as usize];
    bitstream.advance(entry.len.into());
    (i32::from(entry.value) | (i32::from(entry.len) << 16)) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressIncrement {
    Increment { value: u8, len: u8 },
    /// Adds 33 to the increment that follows; 11 bits long
    Escape,
    /// Padding that only MPEG-1 streams may contain; 11 bits long
    Stuffing,
    /// No code matches, which ends the slice
    Invalid,
}

impl AddressIncrement {
    pub const LONG_CODE_LEN: u32 = 11;
}

/// Identify the next `macroblock_address_increment` code without consuming it
pub fn peek_address_increment(bitstream: &Bitstream) -> AddressIncrement {
    let code = bitstream.peek_unsigned(16);
    let entry = if code >= 0x1000 {
        MBA_5[bitstream.peek_unsigned(5) as usize - 2]
    } else if code >= 0x0300 {
        MBA_11[bitstream.peek_unsigned(11) as usize - 24]
    } else {
        return match bitstream.peek_unsigned(11) {
            ADDRESS_ESCAPE_CODE => AddressIncrement::Escape,
            ADDRESS_STUFFING_CODE => AddressIncrement::Stuffing,
            _ => AddressIncrement::Invalid,
        };
    };

    AddressIncrement::Increment { value: entry.value, len: entry.len }
}

/// Decode a `macroblock_address_increment` code in VDEC's format: the increment with the code
/// length in bits 16-23, or 0 if the code is invalid
pub fn address_increment(bitstream: &mut Bitstream, mpeg1: bool) -> u32 {
    match peek_address_increment(bitstream) {
        AddressIncrement::Increment { value, len } => {
            bitstream.advance(len.into());
            u32::from(value) | (u32::from(len) << 16)
        }
        AddressIncrement::Escape => {
            bitstream.advance(AddressIncrement::LONG_CODE_LEN);
            ADDRESS_ESCAPE_DATA
        }
        AddressIncrement::Stuffing if mpeg1 => {
            bitstream.advance(AddressIncrement::LONG_CODE_LEN);
            ADDRESS_STUFFING_DATA
        }
        AddressIncrement::Stuffing | AddressIncrement::Invalid => 0,
    }
}

fn dc_differential(bitstream: &mut Bitstream, size: Vlc<u8>) -> i32 {
    bitstream.advance(size.len.into());

    let size = u32::from(size.value);
    if size == 0 {
        return 0;
    }

    let diff = bitstream.get_bits(size) as i32;
    if diff & (1 << (size - 1)) == 0 { diff - ((1 << size) - 1) } else { diff }
}

pub fn luma_dc_diff(bitstream: &mut Bitstream) -> i32 {
    let code = bitstream.peek_unsigned(5);
    let size = if code < 31 {
        DC_LUMA_5[code as usize]
    } else {
        DC_LUMA_9[bitstream.peek_unsigned(9) as usize - 0x1F0]
    };

    dc_differential(bitstream, size)
}

pub fn chroma_dc_diff(bitstream: &mut Bitstream) -> i32 {
    let code = bitstream.peek_unsigned(5);
    let size = if code < 31 {
        DC_CHROMA_5[code as usize]
    } else {
        DC_CHROMA_10[bitstream.peek_unsigned(10) as usize - 0x3E0]
    };

    dc_differential(bitstream, size)
}

// Codes that start with at least four zero bits; identical for both coefficient tables except
// for the 8- and 10-bit ranges
fn long_coefficient(code: u32, alternate: bool) -> Option<Vlc<RunLevel>> {
    let code = code as usize;
    let entry = match code {
        1024.. => {
            if alternate {
                DCT_TAB0A[(code >> 8) - 4]
            } else {
                DCT_TAB0[(code >> 8) - 4]
            }
        }
        512..=1023 => {
            if alternate {
                DCT_TAB1A[(code >> 6) - 8]
            } else {
                DCT_TAB1[(code >> 6) - 8]
            }
        }
        256..=511 => DCT_TAB2[(code >> 4) - 16],
        128..=255 => DCT_TAB3[(code >> 3) - 16],
        64..=127 => DCT_TAB4[(code >> 2) - 16],
        32..=63 => DCT_TAB5[(code >> 1) - 16],
        16..=31 => DCT_TAB6[code - 16],
        _ => return None,
    };

    Some(entry)
}

/// Look up an intra block AC coefficient from the next 16 bits. `alternate` selects table B-15
/// over table B-14. None means the stream is invalid, which ends the block.
#[must_use]
pub fn intra_coefficient(code: u32, alternate: bool) -> Option<Vlc<RunLevel>> {
    if code >= 16384 && !alternate {
        return Some(DCT_NEXT[(code >> 12) as usize - 4]);
    }

    long_coefficient(code, alternate)
}

/// Look up a non-intra block coefficient from the next 16 bits. The first coefficient of a block
/// has its own short code for (0, 1).
#[must_use]
pub fn non_intra_coefficient(code: u32, first: bool) -> Option<Vlc<RunLevel>> {
    if code >= 16384 {
        let table = if first { &DCT_FIRST } else { &DCT_NEXT };
        return Some(table[(code >> 12) as usize - 4]);
    }

    long_coefficient(code, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::BitWriter;
    use test_log::test;

    fn bitstream(bits: &str) -> Bitstream {
        let mut bitstream = BitWriter::new().bits(bits).into_bitstream();
        assert!(bitstream.fill(32));
        bitstream
    }

    const INTRA_FRAME: PictureCoding = PictureCoding {
        coding_type: I_PICTURE,
        picture_structure: FRAME_PICTURE,
        frame_pred_frame_dct: true,
    };

    #[test]
    fn address_increment_escape_consumes_eleven_bits() {
        for trailing in ["1", "0110", "0000 0000 0000"] {
            let mut bitstream = bitstream(&format!("0000 0001 000 {trailing}"));
            assert_eq!(peek_address_increment(&bitstream), AddressIncrement::Escape);
            assert_eq!(address_increment(&mut bitstream, false), 0xB0023);
            assert_eq!(bitstream.bit_position(), 11);
        }
    }

    #[test]
    fn address_increment_stuffing_requires_mpeg1() {
        let mut bitstream = bitstream("0000 0001 111 1");
        assert_eq!(address_increment(&mut bitstream, false), 0);
        assert_eq!(bitstream.bit_position(), 0);

        assert_eq!(address_increment(&mut bitstream, true), 0xB0022);
        assert_eq!(bitstream.bit_position(), 11);
    }

    #[test]
    fn address_increment_codes() {
        let mut bitstream = bitstream("1 010 0001 0 0000 0101 00 0000 0011 000");
        assert_eq!(address_increment(&mut bitstream, false), 1 | (1 << 16));
        assert_eq!(address_increment(&mut bitstream, false), 3 | (3 << 16));
        assert_eq!(address_increment(&mut bitstream, false), 7 | (5 << 16));
        assert_eq!(address_increment(&mut bitstream, false), 19 | (10 << 16));
        assert_eq!(address_increment(&mut bitstream, false), 33 | (11 << 16));
        assert_eq!(bitstream.bit_position(), 30);
    }

    #[test]
    fn address_increment_invalid() {
        let mut bitstream = bitstream("0000 0000 0001");
        assert_eq!(peek_address_increment(&bitstream), AddressIncrement::Invalid);
        assert_eq!(address_increment(&mut bitstream, true), 0);
        assert_eq!(bitstream.bit_position(), 0);
    }

    #[test]
    fn intra_macroblock_modes() {
        let mut bitstream = bitstream("1 01 00");
        assert_eq!(macroblock_modes(&mut bitstream, INTRA_FRAME), MACROBLOCK_INTRA);
        assert_eq!(
            macroblock_modes(&mut bitstream, INTRA_FRAME),
            MACROBLOCK_INTRA | MACROBLOCK_QUANT
        );
        assert_eq!(macroblock_modes(&mut bitstream, INTRA_FRAME), 0);
        assert_eq!(bitstream.bit_position(), 3);
    }

    #[test]
    fn intra_macroblock_modes_read_dct_type() {
        let picture = PictureCoding { frame_pred_frame_dct: false, ..INTRA_FRAME };
        let mut bitstream = bitstream("1 1 01 0");
        assert_eq!(
            macroblock_modes(&mut bitstream, picture),
            MACROBLOCK_INTRA | DCT_TYPE_INTERLACED
        );
        assert_eq!(
            macroblock_modes(&mut bitstream, picture),
            MACROBLOCK_INTRA | MACROBLOCK_QUANT
        );
        assert_eq!(bitstream.bit_position(), 5);
    }

    #[test]
    fn predicted_macroblock_modes() {
        let picture = PictureCoding { coding_type: P_PICTURE, ..INTRA_FRAME };

        // Motion-compensated, coded
        let mut bitstream = bitstream("1");
        assert_eq!(
            macroblock_modes(&mut bitstream, picture),
            MACROBLOCK_MOTION_FORWARD | MACROBLOCK_PATTERN | MOTION_TYPE_FRAME
        );
        assert_eq!(bitstream.bit_position(), 1);

        // Intra
        let mut bitstream = self::bitstream("0001 1");
        assert_eq!(macroblock_modes(&mut bitstream, picture), MACROBLOCK_INTRA);
        assert_eq!(bitstream.bit_position(), 5);
    }

    #[test]
    fn bidirectional_macroblock_modes_report_length() {
        let picture = PictureCoding { coding_type: B_PICTURE, ..INTRA_FRAME };

        // Interpolated, not coded
        let mut bitstream = bitstream("10");
        assert_eq!(
            macroblock_modes(&mut bitstream, picture),
            MACROBLOCK_MOTION_FORWARD | MACROBLOCK_MOTION_BACKWARD | MOTION_TYPE_FRAME | (2 << 16)
        );
        assert_eq!(bitstream.bit_position(), 2);
    }

    #[test]
    fn dc_picture_macroblock_modes() {
        let picture = PictureCoding { coding_type: D_PICTURE, ..INTRA_FRAME };
        let mut bitstream = bitstream("1 0");
        assert_eq!(macroblock_modes(&mut bitstream, picture), MACROBLOCK_INTRA | (1 << 16));
        assert_eq!(macroblock_modes(&mut bitstream, picture), 0);
    }

    #[test]
    fn unknown_coding_type() {
        let picture = PictureCoding { coding_type: 6, ..INTRA_FRAME };
        let mut bitstream = bitstream("1111");
        assert_eq!(macroblock_modes(&mut bitstream, picture), 0);
        assert_eq!(bitstream.bit_position(), 0);
    }

    #[test]
    fn quantizer_scale_types() {
        let mut bitstream = bitstream("10001 10001");
        assert_eq!(quantizer_scale(&mut bitstream, false), 34);
        assert_eq!(quantizer_scale(&mut bitstream, true), 28);
    }

    #[test]
    fn coded_block_patterns() {
        let mut bitstream = bitstream("111 1011 0011 01 0000 0001 0 0000 0000 1");
        assert_eq!(coded_block_pattern(&mut bitstream), 60);
        assert_eq!(coded_block_pattern(&mut bitstream), 16);
        assert_eq!(coded_block_pattern(&mut bitstream), 3);
        assert_eq!(coded_block_pattern(&mut bitstream), 39);
        assert_eq!(coded_block_pattern(&mut bitstream), 0);
        assert_eq!(bitstream.bit_position(), 3 + 4 + 6 + 9 + 9);
    }

    #[test]
    fn motion_deltas() {
        let mut bitstream = bitstream("1 01 0 001 1 0000 11 0 0000 0011 00 1");
        assert_eq!(motion_delta(&mut bitstream), 1 << 16);
        assert_eq!(motion_delta(&mut bitstream), 1 | (2 << 16));
        assert_eq!(motion_delta(&mut bitstream), (-2_i32 | (3 << 16)) as u32);
        assert_eq!(motion_delta(&mut bitstream), 4 | (6 << 16));
        assert_eq!(motion_delta(&mut bitstream), (-16_i32 | (10 << 16)) as u32);
        assert_eq!(bitstream.bit_position(), 1 + 3 + 4 + 7 + 11);
    }

    #[test]
    fn dual_prime_vectors() {
        let mut bitstream = bitstream("0 10 11");
        assert_eq!(dmvector(&mut bitstream), 1 << 16);
        assert_eq!(dmvector(&mut bitstream), 1 | (2 << 16));
        assert_eq!(dmvector(&mut bitstream), u32::MAX);
        assert_eq!(bitstream.bit_position(), 5);
    }

    #[test]
    fn luma_dc_differentials() {
        let mut bitstream = bitstream("100 01 10 01 01 1111 1111 1 0000 0000 000");
        assert_eq!(luma_dc_diff(&mut bitstream), 0);
        assert_eq!(luma_dc_diff(&mut bitstream), 2);
        assert_eq!(luma_dc_diff(&mut bitstream), -2);
        assert_eq!(luma_dc_diff(&mut bitstream), -2047);
        assert_eq!(bitstream.bit_position(), 3 + 4 + 4 + 20);
    }

    #[test]
    fn chroma_dc_differentials() {
        let mut bitstream = bitstream("00 01 1 01 0 1111 1111 11 1111 1111 111");
        assert_eq!(chroma_dc_diff(&mut bitstream), 0);
        assert_eq!(chroma_dc_diff(&mut bitstream), 1);
        assert_eq!(chroma_dc_diff(&mut bitstream), -1);
        assert_eq!(chroma_dc_diff(&mut bitstream), 2047);
        assert_eq!(bitstream.bit_position(), 2 + 3 + 3 + 21);
    }

    #[test]
    fn coefficient_table_selection() {
        let rl = |run, level| RunLevel { run, level };

        // 11s is (0, 1) in B-14 and 10 is end of block
        let entry = intra_coefficient(0b1100_0000_0000_0000, false);
        assert_eq!(entry, Some(Vlc { value: rl(0, 1), len: 2 }));
        assert!(intra_coefficient(0b1000_0000_0000_0000, false).unwrap().value.is_end_of_block());

        // 10s is (0, 1) in B-15 and 0110 is end of block
        let entry = intra_coefficient(0b1000_0000_0000_0000, true);
        assert_eq!(entry, Some(Vlc { value: rl(0, 1), len: 2 }));
        assert!(intra_coefficient(0b0110_0000_0000_0000, true).unwrap().value.is_end_of_block());

        // 1s is (0, 1) only for the first non-intra coefficient
        let entry = non_intra_coefficient(0b1000_0000_0000_0000, true);
        assert_eq!(entry, Some(Vlc { value: rl(0, 1), len: 1 }));
        let entry = non_intra_coefficient(0b1000_0000_0000_0000, false).unwrap();
        assert!(entry.value.is_end_of_block());

        // Escape is 0000 01 in both tables
        assert!(intra_coefficient(0b0000_0100_0000_0000, false).unwrap().value.is_escape());
        assert!(intra_coefficient(0b0000_0100_0000_0000, true).unwrap().value.is_escape());

        // 16-bit codes
        let entry = non_intra_coefficient(0b0000_0000_0001_0000, false);
        assert_eq!(entry, Some(Vlc { value: rl(1, 18), len: 16 }));
        let entry = intra_coefficient(0b0000_0000_0001_0011, true);
        assert_eq!(entry, Some(Vlc { value: rl(1, 15), len: 16 }));

        assert_eq!(intra_coefficient(0b0000_0000_0000_1111, false), None);
        assert_eq!(non_intra_coefficient(0, true), None);
    }
}
