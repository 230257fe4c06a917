//! Lookup tables for the MPEG-2 variable-length codes that the IPU understands
//!
//! Each table is indexed by a fixed number of upcoming stream bits. The tables are expanded at
//! compile time from the code lists in the MPEG-2 standard (tables B-1 through B-15) so that the
//! code patterns below can be compared directly against the standard.

use crate::vlc::{
    MACROBLOCK_INTRA, MACROBLOCK_MOTION_BACKWARD, MACROBLOCK_MOTION_FORWARD, MACROBLOCK_PATTERN,
    MACROBLOCK_QUANT,
};
use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Vlc<T> {
    pub value: T,
    pub len: u8,
}

#[derive(Debug, Clone, Copy)]
struct Code<T> {
    bits: u32,
    len: u8,
    value: T,
}

const fn code<T: Copy>(pattern: &str, value: T) -> Code<T> {
    let bytes = pattern.as_bytes();
    let mut bits = 0;
    let mut len = 0;

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'0' => {
                bits <<= 1;
                len += 1;
            }
            b'1' => {
                bits = (bits << 1) | 1;
                len += 1;
            }
            b' ' => {}
            _ => panic!("VLC patterns may only contain '0', '1', and spaces"),
        }
        i += 1;
    }

    Code { bits, len, value }
}

// Expands code lists into a table indexed by the next `width` bits, covering the index range
// `first..first + N`. Lists are searched in order and the first matching code wins; codes longer
// than `width` never match. Indices that no code matches hold `fill`.
const fn expand<T: Copy, const N: usize>(
    lists: &[&[Code<T>]],
    width: u8,
    first: u32,
    fill: Vlc<T>,
) -> [Vlc<T>; N] {
    let mut table = [fill; N];

    let mut i = 0;
    while i < N {
        let index = first + i as u32;

        let mut list = 0;
        'search: while list < lists.len() {
            let codes = lists[list];

            let mut j = 0;
            while j < codes.len() {
                let code = codes[j];
                if code.len <= width && index >> (width - code.len) as u32 == code.bits {
                    table[i] = Vlc { value: code.value, len: code.len };
                    break 'search;
                }
                j += 1;
            }

            list += 1;
        }

        i += 1;
    }

    table
}

// Table B-1: macroblock_address_increment (escape and stuffing are handled by the caller)
#[rustfmt::skip]
const MBA_CODES: &[Code<u8>] = &[
    code("1", 1),
    code("011", 2),
    code("010", 3),
    code("0011", 4),
    code("0010", 5),
    code("0001 1", 6),
    code("0001 0", 7),
    code("0000 111", 8),
    code("0000 110", 9),
    code("0000 1011", 10),
    code("0000 1010", 11),
    code("0000 1001", 12),
    code("0000 1000", 13),
    code("0000 0111", 14),
    code("0000 0110", 15),
    code("0000 0101 11", 16),
    code("0000 0101 10", 17),
    code("0000 0101 01", 18),
    code("0000 0101 00", 19),
    code("0000 0100 11", 20),
    code("0000 0100 10", 21),
    code("0000 0100 011", 22),
    code("0000 0100 010", 23),
    code("0000 0100 001", 24),
    code("0000 0100 000", 25),
    code("0000 0011 111", 26),
    code("0000 0011 110", 27),
    code("0000 0011 101", 28),
    code("0000 0011 100", 29),
    code("0000 0011 011", 30),
    code("0000 0011 010", 31),
    code("0000 0011 001", 32),
    code("0000 0011 000", 33),
];

const NO_INCREMENT: Vlc<u8> = Vlc { value: 0, len: 0 };

/// Indexed by the next 5 bits minus 2, used when the next 16 bits are >= 0x1000
pub const MBA_5: [Vlc<u8>; 30] = expand(&[MBA_CODES], 5, 2, NO_INCREMENT);

/// Indexed by the next 11 bits minus 24, used when the next 16 bits are >= 0x0300
pub const MBA_11: [Vlc<u8>; 104] = expand(&[MBA_CODES], 11, 24, NO_INCREMENT);

const NO_MODES: Vlc<u8> = Vlc { value: 0, len: 0 };

const QUANT: u8 = MACROBLOCK_QUANT as u8;
const INTRA: u8 = MACROBLOCK_INTRA as u8;
const PATTERN: u8 = MACROBLOCK_PATTERN as u8;
const FORWARD: u8 = MACROBLOCK_MOTION_FORWARD as u8;
const BACKWARD: u8 = MACROBLOCK_MOTION_BACKWARD as u8;

// Table B-2: macroblock_type in I-pictures
#[rustfmt::skip]
const MB_I_CODES: &[Code<u8>] = &[
    code("1", INTRA),
    code("01", INTRA | QUANT),
];

// Table B-3: macroblock_type in P-pictures
#[rustfmt::skip]
const MB_P_CODES: &[Code<u8>] = &[
    code("1", FORWARD | PATTERN),
    code("01", PATTERN),
    code("001", FORWARD),
    code("0001 1", INTRA),
    code("0001 0", FORWARD | PATTERN | QUANT),
    code("0000 1", PATTERN | QUANT),
    code("0000 01", INTRA | QUANT),
];

// Table B-4: macroblock_type in B-pictures
#[rustfmt::skip]
const MB_B_CODES: &[Code<u8>] = &[
    code("10", FORWARD | BACKWARD),
    code("11", FORWARD | BACKWARD | PATTERN),
    code("010", BACKWARD),
    code("011", BACKWARD | PATTERN),
    code("0010", FORWARD),
    code("0011", FORWARD | PATTERN),
    code("0001 1", INTRA),
    code("0001 0", FORWARD | BACKWARD | PATTERN | QUANT),
    code("0000 11", FORWARD | PATTERN | QUANT),
    code("0000 10", BACKWARD | PATTERN | QUANT),
    code("0000 01", INTRA | QUANT),
];

/// Indexed by the next 2 bits; index 0 is not a valid code
pub const MB_I: [Vlc<u8>; 4] = expand(&[MB_I_CODES], 2, 0, NO_MODES);

/// Indexed by the next 6 bits; index 0 is not a valid code
pub const MB_P: [Vlc<u8>; 64] = expand(&[MB_P_CODES], 6, 0, NO_MODES);

/// Indexed by the next 6 bits; index 0 is not a valid code
pub const MB_B: [Vlc<u8>; 64] = expand(&[MB_B_CODES], 6, 0, NO_MODES);

// Table B-9: coded_block_pattern (4:2:0 only)
#[rustfmt::skip]
const CBP_CODES: &[Code<u8>] = &[
    code("111", 60),
    code("1101", 4),
    code("1100", 8),
    code("1011", 16),
    code("1010", 32),
    code("1001 1", 12),
    code("1001 0", 48),
    code("1000 1", 20),
    code("1000 0", 40),
    code("0111 1", 28),
    code("0111 0", 44),
    code("0110 1", 52),
    code("0110 0", 56),
    code("0101 1", 1),
    code("0101 0", 61),
    code("0100 1", 2),
    code("0100 0", 62),
    code("0011 11", 24),
    code("0011 10", 36),
    code("0011 01", 3),
    code("0011 00", 63),
    code("0010 111", 5),
    code("0010 110", 9),
    code("0010 101", 17),
    code("0010 100", 33),
    code("0010 011", 6),
    code("0010 010", 10),
    code("0010 001", 18),
    code("0010 000", 34),
    code("0001 1111", 7),
    code("0001 1110", 11),
    code("0001 1101", 19),
    code("0001 1100", 35),
    code("0001 1011", 13),
    code("0001 1010", 49),
    code("0001 1001", 21),
    code("0001 1000", 41),
    code("0001 0111", 14),
    code("0001 0110", 50),
    code("0001 0101", 22),
    code("0001 0100", 42),
    code("0001 0011", 15),
    code("0001 0010", 51),
    code("0001 0001", 23),
    code("0001 0000", 43),
    code("0000 1111", 25),
    code("0000 1110", 37),
    code("0000 1101", 26),
    code("0000 1100", 38),
    code("0000 1011", 29),
    code("0000 1010", 45),
    code("0000 1001", 53),
    code("0000 1000", 57),
    code("0000 0111", 30),
    code("0000 0110", 46),
    code("0000 0101", 54),
    code("0000 0100", 58),
    code("0000 0011 1", 31),
    code("0000 0011 0", 47),
    code("0000 0010 1", 55),
    code("0000 0010 0", 59),
    code("0000 0001 1", 27),
    code("0000 0001 0", 39),
    code("0000 0000 1", 0),
];

/// Indexed by the next 7 bits minus 16, used when the next 16 bits are >= 0x2000
pub const CBP_7: [Vlc<u8>; 112] = expand(&[CBP_CODES], 7, 16, Vlc { value: 0, len: 0 });

/// Indexed by the next 9 bits, used when the next 16 bits are < 0x2000
pub const CBP_9: [Vlc<u8>; 64] = expand(&[CBP_CODES], 9, 0, Vlc { value: 0, len: 9 });

// Table B-10: motion_code magnitudes (the sign bit follows the code)
#[rustfmt::skip]
const MOTION_CODES: &[Code<u8>] = &[
    code("01", 1),
    code("001", 2),
    code("0001", 3),
    code("0000 11", 4),
    code("0000 101", 5),
    code("0000 100", 6),
    code("0000 011", 7),
    code("0000 0101 1", 8),
    code("0000 0101 0", 9),
    code("0000 0100 1", 10),
    code("0000 0100 01", 11),
    code("0000 0100 00", 12),
    code("0000 0011 11", 13),
    code("0000 0011 10", 14),
    code("0000 0011 01", 15),
    code("0000 0011 00", 16),
];

/// Indexed by the next 4 bits. Index 0 is only reached through the 6-bit code `0000 11`.
pub const MV_4: [Vlc<u8>; 8] = expand(&[MOTION_CODES], 4, 0, Vlc { value: 4, len: 6 });

/// Indexed by the next 10 bits, used when the next 6 bits are neither `1xxxxx` nor `0000 11`
pub const MV_10: [Vlc<u8>; 48] = expand(&[MOTION_CODES], 10, 0, Vlc { value: 1, len: 10 });

// Table B-11: dmvector
#[rustfmt::skip]
const DMV_CODES: &[Code<i8>] = &[
    code("0", 0),
    code("10", 1),
    code("11", -1),
];

/// Indexed by the next 2 bits
pub const DMV_2: [Vlc<i8>; 4] = expand(&[DMV_CODES], 2, 0, Vlc { value: 0, len: 0 });

// Table B-12: dct_dc_size_luminance
#[rustfmt::skip]
const DC_LUMA_CODES: &[Code<u8>] = &[
    code("100", 0),
    code("00", 1),
    code("01", 2),
    code("101", 3),
    code("110", 4),
    code("1110", 5),
    code("1111 0", 6),
    code("1111 10", 7),
    code("1111 110", 8),
    code("1111 1110", 9),
    code("1111 1111 0", 10),
    code("1111 1111 1", 11),
];

// Table B-13: dct_dc_size_chrominance
#[rustfmt::skip]
const DC_CHROMA_CODES: &[Code<u8>] = &[
    code("00", 0),
    code("01", 1),
    code("10", 2),
    code("110", 3),
    code("1110", 4),
    code("1111 0", 5),
    code("1111 10", 6),
    code("1111 110", 7),
    code("1111 1110", 8),
    code("1111 1111 0", 9),
    code("1111 1111 10", 10),
    code("1111 1111 11", 11),
];

const NO_SIZE: Vlc<u8> = Vlc { value: 0, len: 0 };

/// Indexed by the next 5 bits when they are not all 1s
pub const DC_LUMA_5: [Vlc<u8>; 31] = expand(&[DC_LUMA_CODES], 5, 0, NO_SIZE);

/// Indexed by the next 9 bits minus 0x1F0
pub const DC_LUMA_9: [Vlc<u8>; 16] = expand(&[DC_LUMA_CODES], 9, 0x1F0, NO_SIZE);

/// Indexed by the next 5 bits when they are not all 1s
pub const DC_CHROMA_5: [Vlc<u8>; 31] = expand(&[DC_CHROMA_CODES], 5, 0, NO_SIZE);

/// Indexed by the next 10 bits minus 0x3E0
pub const DC_CHROMA_10: [Vlc<u8>; 32] = expand(&[DC_CHROMA_CODES], 10, 0x3E0, NO_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct RunLevel {
    pub run: u8,
    pub level: u8,
}

impl RunLevel {
    pub const END_OF_BLOCK_RUN: u8 = 64;
    pub const ESCAPE_RUN: u8 = 65;

    const END_OF_BLOCK: Self = Self { run: Self::END_OF_BLOCK_RUN, level: 0 };
    const ESCAPE: Self = Self { run: Self::ESCAPE_RUN, level: 0 };

    pub fn is_end_of_block(self) -> bool {
        self.run == Self::END_OF_BLOCK_RUN
    }

    pub fn is_escape(self) -> bool {
        self.run == Self::ESCAPE_RUN
    }
}

const fn rl(run: u8, level: u8) -> RunLevel {
    RunLevel { run, level }
}

const EOB: RunLevel = RunLevel::END_OF_BLOCK;
const ESC: RunLevel = RunLevel::ESCAPE;

// Table B-14: DCT coefficients, codes of up to 10 bits. The first coefficient of a non-intra
// block uses `1s` for (0, 1) instead of `11s`.
#[rustfmt::skip]
const B14_CODES: &[Code<RunLevel>] = &[
    code("10", EOB),
    code("11", rl(0, 1)),
    code("011", rl(1, 1)),
    code("0100", rl(0, 2)),
    code("0101", rl(2, 1)),
    code("0010 1", rl(0, 3)),
    code("0011 1", rl(3, 1)),
    code("0011 0", rl(4, 1)),
    code("0001 10", rl(1, 2)),
    code("0001 11", rl(5, 1)),
    code("0001 01", rl(6, 1)),
    code("0001 00", rl(7, 1)),
    code("0000 110", rl(0, 4)),
    code("0000 100", rl(2, 2)),
    code("0000 111", rl(8, 1)),
    code("0000 101", rl(9, 1)),
    code("0000 01", ESC),
    code("0010 0110", rl(0, 5)),
    code("0010 0001", rl(0, 6)),
    code("0010 0101", rl(1, 3)),
    code("0010 0100", rl(3, 2)),
    code("0010 0111", rl(10, 1)),
    code("0010 0011", rl(11, 1)),
    code("0010 0010", rl(12, 1)),
    code("0010 0000", rl(13, 1)),
    code("0000 0010 10", rl(0, 7)),
    code("0000 0011 00", rl(1, 4)),
    code("0000 0010 11", rl(2, 3)),
    code("0000 0011 11", rl(4, 2)),
    code("0000 0010 01", rl(5, 2)),
    code("0000 0011 10", rl(14, 1)),
    code("0000 0011 01", rl(15, 1)),
    code("0000 0010 00", rl(16, 1)),
];

#[rustfmt::skip]
const B14_FIRST_CODES: &[Code<RunLevel>] = &[
    code("1", rl(0, 1)),
];

// Table B-15: DCT coefficients for intra blocks when intra_vlc_format is set, codes of up to 10
// bits. Longer codes are shared with table B-14.
#[rustfmt::skip]
const B15_CODES: &[Code<RunLevel>] = &[
    code("0110", EOB),
    code("10", rl(0, 1)),
    code("010", rl(1, 1)),
    code("110", rl(0, 2)),
    code("0010 1", rl(2, 1)),
    code("0111", rl(0, 3)),
    code("0011 1", rl(3, 1)),
    code("0001 10", rl(4, 1)),
    code("0011 0", rl(1, 2)),
    code("0001 11", rl(5, 1)),
    code("0001 01", rl(6, 1)),
    code("0001 00", rl(7, 1)),
    code("1110 0", rl(0, 4)),
    code("0000 110", rl(2, 2)),
    code("0000 111", rl(8, 1)),
    code("1111 000", rl(9, 1)),
    code("0000 01", ESC),
    code("1110 1", rl(0, 5)),
    code("0000 101", rl(0, 6)),
    code("1111 001", rl(1, 3)),
    code("0010 0110", rl(3, 2)),
    code("1111 010", rl(10, 1)),
    code("0010 0001", rl(11, 1)),
    code("0010 0101", rl(12, 1)),
    code("0010 0100", rl(13, 1)),
    code("0000 100", rl(0, 7)),
    code("0010 0111", rl(1, 4)),
    code("1111 1100", rl(2, 3)),
    code("1111 1101", rl(4, 2)),
    code("0000 0010 0", rl(5, 2)),
    code("0000 0010 1", rl(14, 1)),
    code("0000 0011 1", rl(15, 1)),
    code("0000 0011 01", rl(16, 1)),
    code("1111 011", rl(0, 8)),
    code("1111 100", rl(0, 9)),
    code("0010 0011", rl(0, 10)),
    code("0010 0010", rl(0, 11)),
    code("0010 0000", rl(1, 5)),
    code("0000 0011 00", rl(2, 4)),
    code("1111 1010", rl(0, 12)),
    code("1111 1011", rl(0, 13)),
    code("1111 1110", rl(0, 14)),
    code("1111 1111", rl(0, 15)),
];

const NO_COEFFICIENT: Vlc<RunLevel> = Vlc { value: EOB, len: 0 };

/// First coefficient of a non-intra block, indexed by the next 4 bits minus 4
pub const DCT_FIRST: [Vlc<RunLevel>; 12] =
    expand(&[B14_FIRST_CODES, B14_CODES], 4, 4, NO_COEFFICIENT);

/// Any other table B-14 coefficient, indexed by the next 4 bits minus 4
pub const DCT_NEXT: [Vlc<RunLevel>; 12] = expand(&[B14_CODES], 4, 4, NO_COEFFICIENT);

/// Indexed by the next 8 bits minus 4, used when the next 16 bits are >= 1024
pub const DCT_TAB0: [Vlc<RunLevel>; 60] = expand(&[B14_CODES], 8, 4, NO_COEFFICIENT);

/// Table B-15 variant of `DCT_TAB0`, which also covers the codes that `DCT_NEXT` handles for B-14
pub const DCT_TAB0A: [Vlc<RunLevel>; 252] = expand(&[B15_CODES], 8, 4, NO_COEFFICIENT);

/// Indexed by the next 10 bits minus 8, used when the next 16 bits are >= 512
pub const DCT_TAB1: [Vlc<RunLevel>; 8] = expand(&[B14_CODES], 10, 8, NO_COEFFICIENT);

/// Table B-15 variant of `DCT_TAB1`
pub const DCT_TAB1A: [Vlc<RunLevel>; 8] = expand(&[B15_CODES], 10, 8, NO_COEFFICIENT);

// The remaining codes are 12 to 16 bits long and share a 4-bit suffix layout, so they are listed
// directly in index order
const fn fixed_length(len: u8, entries: [(u8, u8); 16]) -> [Vlc<RunLevel>; 16] {
    let mut table = [NO_COEFFICIENT; 16];

    let mut i = 0;
    while i < 16 {
        table[i] = Vlc { value: rl(entries[i].0, entries[i].1), len };
        i += 1;
    }

    table
}

/// `0000 0001 xxxx`, indexed by the next 12 bits minus 16
#[rustfmt::skip]
pub const DCT_TAB2: [Vlc<RunLevel>; 16] = fixed_length(12, [
    (0, 11), (8, 2), (4, 3), (0, 10), (2, 4), (7, 2), (21, 1), (20, 1),
    (0, 9), (19, 1), (18, 1), (1, 5), (3, 3), (0, 8), (6, 2), (17, 1),
]);

/// `0000 0000 1xxxx`, indexed by the next 13 bits minus 16
#[rustfmt::skip]
pub const DCT_TAB3: [Vlc<RunLevel>; 16] = fixed_length(13, [
    (10, 2), (9, 2), (5, 3), (3, 4), (2, 5), (1, 7), (1, 6), (0, 15),
    (0, 14), (0, 13), (0, 12), (26, 1), (25, 1), (24, 1), (23, 1), (22, 1),
]);

/// `0000 0000 01xx xx`, indexed by the next 14 bits minus 16
#[rustfmt::skip]
pub const DCT_TAB4: [Vlc<RunLevel>; 16] = fixed_length(14, [
    (0, 31), (0, 30), (0, 29), (0, 28), (0, 27), (0, 26), (0, 25), (0, 24),
    (0, 23), (0, 22), (0, 21), (0, 20), (0, 19), (0, 18), (0, 17), (0, 16),
]);

/// `0000 0000 001x xxx`, indexed by the next 15 bits minus 16
#[rustfmt::skip]
pub const DCT_TAB5: [Vlc<RunLevel>; 16] = fixed_length(15, [
    (0, 40), (0, 39), (0, 38), (0, 37), (0, 36), (0, 35), (0, 34), (0, 33),
    (0, 32), (1, 14), (1, 13), (1, 12), (1, 11), (1, 10), (1, 9), (1, 8),
]);

/// `0000 0000 0001 xxxx`, indexed by the next 16 bits minus 16
#[rustfmt::skip]
pub const DCT_TAB6: [Vlc<RunLevel>; 16] = fixed_length(16, [
    (1, 18), (1, 17), (1, 16), (1, 15), (6, 3), (16, 2), (15, 2), (14, 2),
    (13, 2), (12, 2), (11, 2), (31, 1), (30, 1), (29, 1), (28, 1), (27, 1),
]);
