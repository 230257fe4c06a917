//! Macroblock pixel conversions: YCbCr to RGB32, alpha thresholding, ordered dithering to RGB16,
//! and vector quantization to 4-bit palette indices

use crate::decoder::{CB_OFFSET, CR_OFFSET, MACROBLOCK_BYTES};
use bincode::{Decode, Encode};
use ipu_common::num::GetBit;

pub const MACROBLOCK_PIXELS: usize = 256;
pub const INDEXED_BYTES: usize = MACROBLOCK_PIXELS / 2;
pub const PALETTE_LEN: usize = 16;

const Y_BIAS: i32 = 16;
const C_BIAS: i32 = 128;
const Y_COEFFICIENT: i32 = 0x95;
const RCR_COEFFICIENT: i32 = 0xCC;
const GCR_COEFFICIENT: i32 = -0x68;
const GCB_COEFFICIENT: i32 = -0x32;
const BCB_COEFFICIENT: i32 = 0x102;

const OPAQUE_ALPHA: u8 = 0x80;
const TRANSLUCENT_ALPHA: u8 = 0x40;

const SIGN_BIAS_MASK: u32 = 0x0080_8080;

#[rustfmt::skip]
const DITHER_MATRIX: [[i32; 4]; 4] = [
    [-4, 0, -3, 1],
    [2, -2, 3, -1],
    [-3, 1, -4, 0],
    [3, -1, 2, -2],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct Rgb32 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgb32 {
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Word as it appears in IPU output: R in the lowest byte, A in the highest
    #[must_use]
    pub fn to_word(self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, self.a])
    }

    #[must_use]
    pub fn from_word(word: u32) -> Self {
        let [r, g, b, a] = word.to_le_bytes();
        Self { r, g, b, a }
    }
}

/// 5:5:5:1 pixel; channel fields hold 5-bit values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct Rgb16 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: bool,
}

impl Rgb16 {
    #[must_use]
    pub fn to_halfword(self) -> u16 {
        u16::from(self.r & 0x1F)
            | (u16::from(self.g & 0x1F) << 5)
            | (u16::from(self.b & 0x1F) << 10)
            | (u16::from(self.a) << 15)
    }

    #[must_use]
    pub fn from_halfword(halfword: u16) -> Self {
        Self {
            r: (halfword & 0x1F) as u8,
            g: ((halfword >> 5) & 0x1F) as u8,
            b: ((halfword >> 10) & 0x1F) as u8,
            a: halfword.bit(15),
        }
    }

    fn distance_squared(self, other: Self) -> i32 {
        let dr = i32::from(self.r) - i32::from(other.r);
        let dg = i32::from(self.g) - i32::from(other.g);
        let db = i32::from(self.b) - i32::from(other.b);
        dr * dr + dg * dg + db * db
    }
}

/// Alpha thresholds set by SETTH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub struct Thresholds {
    /// Pixels with every channel below this become fully transparent
    pub transparent: u16,
    /// Pixels with every channel below this become translucent
    pub translucent: u16,
}

impl Thresholds {
    #[must_use]
    pub fn from_command(command: u32) -> Self {
        Self {
            transparent: (command & 0x1FF) as u16,
            translucent: ((command >> 16) & 0x1FF) as u16,
        }
    }
}

fn all_channels_below(pixel: Rgb32, threshold: u16) -> bool {
    [pixel.r, pixel.g, pixel.b].into_iter().all(|channel| u16::from(channel) < threshold)
}

/// Convert an 8-bit 4:2:0 YCbCr macroblock to RGB32, then apply alpha thresholds and the optional
/// sign bias toggle
pub fn ycbcr_to_rgb32(
    mb8: &[u8; MACROBLOCK_BYTES],
    thresholds: Thresholds,
    sign_bias: bool,
    rgb32: &mut [Rgb32; MACROBLOCK_PIXELS],
) {
    for y in 0..16 {
        for x in 0..16 {
            let chroma_idx = (y >> 1) * 8 + (x >> 1);
            let luma = i32::from(mb8[y * 16 + x]);
            let cb = i32::from(mb8[CB_OFFSET + chroma_idx]) - C_BIAS;
            let cr = i32::from(mb8[CR_OFFSET + chroma_idx]) - C_BIAS;

            let lum = (Y_COEFFICIENT * (luma - Y_BIAS).max(0)) >> 6;
            let rcr = (RCR_COEFFICIENT * cr) >> 6;
            let gcr = (GCR_COEFFICIENT * cr) >> 6;
            let gcb = (GCB_COEFFICIENT * cb) >> 6;
            let bcb = (BCB_COEFFICIENT * cb) >> 6;

            let clamp = |value: i32| value.clamp(0, 255) as u8;
            rgb32[y * 16 + x] = Rgb32::rgba(
                clamp((lum + rcr + 1) >> 1),
                clamp((lum + gcr + gcb + 1) >> 1),
                clamp((lum + bcb + 1) >> 1),
                OPAQUE_ALPHA,
            );
        }
    }

    if thresholds.transparent > 0 {
        for pixel in rgb32.iter_mut() {
            if all_channels_below(*pixel, thresholds.transparent) {
                *pixel = Rgb32::default();
            } else if all_channels_below(*pixel, thresholds.translucent) {
                pixel.a = TRANSLUCENT_ALPHA;
            }
        }
    } else if thresholds.translucent > 0 {
        for pixel in rgb32.iter_mut() {
            if all_channels_below(*pixel, thresholds.translucent) {
                pixel.a = TRANSLUCENT_ALPHA;
            }
        }
    }

    if sign_bias {
        for pixel in rgb32.iter_mut() {
            *pixel = Rgb32::from_word(pixel.to_word() ^ SIGN_BIAS_MASK);
        }
    }
}

/// Reduce RGB32 to RGB16, optionally applying the 4x4 ordered dither matrix first. The alpha bit is
/// set only for translucent pixels.
pub fn rgb32_to_rgb16(
    rgb32: &[Rgb32; MACROBLOCK_PIXELS],
    dither: bool,
    rgb16: &mut [Rgb16; MACROBLOCK_PIXELS],
) {
    for (i, (&pixel, out)) in rgb32.iter().zip(rgb16.iter_mut()).enumerate() {
        let offset = if dither { DITHER_MATRIX[(i >> 4) & 3][i & 3] } else { 0 };
        let reduce = |channel: u8| ((i32::from(channel) + offset).clamp(0, 255) >> 3) as u8;

        *out = Rgb16 {
            r: reduce(pixel.r),
            g: reduce(pixel.g),
            b: reduce(pixel.b),
            a: pixel.a == TRANSLUCENT_ALPHA,
        };
    }
}

fn closest_palette_index(pixel: Rgb16, palette: &[Rgb16; PALETTE_LEN]) -> u8 {
    let mut closest = 0;
    let mut min_distance = i32::MAX;
    for (i, &color) in palette.iter().enumerate() {
        let distance = pixel.distance_squared(color);
        // Ties go to the lowest index
        if distance < min_distance {
            closest = i as u8;
            min_distance = distance;
        }
    }

    closest
}

/// Map each pixel to its nearest palette color, two 4-bit indices per byte with the even column
/// in the low nibble
pub fn vector_quantize(
    rgb16: &[Rgb16; MACROBLOCK_PIXELS],
    palette: &[Rgb16; PALETTE_LEN],
    indexed: &mut [u8; INDEXED_BYTES],
) {
    for (out, pair) in indexed.iter_mut().zip(rgb16.chunks_exact(2)) {
        let low = closest_palette_index(pair[0], palette);
        let high = closest_palette_index(pair[1], palette);
        *out = (high << 4) | low;
    }
}
