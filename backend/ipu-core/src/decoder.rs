//! Decoder state that persists across macroblocks and commands

use crate::color::{INDEXED_BYTES, MACROBLOCK_PIXELS, PALETTE_LEN, Rgb16, Rgb32, Thresholds};
use crate::vlc::{DCT_TYPE_INTERLACED, FRAME_PICTURE, PictureCoding};
use bincode::{Decode, Encode};
use ipu_config::{IntraDcPrecision, IntraVlcFormat, OutputFormat, QuantizerScaleType, ScanOrder};

/// Y (16x16), then Cb (8x8), then Cr (8x8)
pub const MACROBLOCK_BYTES: usize = 384;
pub const CB_OFFSET: usize = 256;
pub const CR_OFFSET: usize = 320;

const LUMA_STRIDE: usize = 16;
const CHROMA_STRIDE: usize = 8;

/// Where one 8x8 block lands within a macroblock buffer, in elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTarget {
    /// Index into the DC predictors: 0 for luma, 1 for Cb, 2 for Cr
    pub component: usize,
    pub offset: usize,
    pub stride: usize,
}

impl BlockTarget {
    /// Target for block 1-6 of a macroblock. Interlaced DCT coding interleaves the rows of the four
    /// luma blocks instead of stacking them.
    #[must_use]
    pub fn for_block(block: u8, macroblock_modes: u32) -> Self {
        let (luma_offset, luma_stride) = if macroblock_modes & DCT_TYPE_INTERLACED != 0 {
            (LUMA_STRIDE, 2 * LUMA_STRIDE)
        } else {
            (8 * LUMA_STRIDE, LUMA_STRIDE)
        };

        let luma = |offset| Self { component: 0, offset, stride: luma_stride };
        match block {
            1 => luma(0),
            2 => luma(8),
            3 => luma(luma_offset),
            4 => luma(luma_offset + 8),
            5 => Self { component: 1, offset: CB_OFFSET, stride: CHROMA_STRIDE },
            _ => Self { component: 2, offset: CR_OFFSET, stride: CHROMA_STRIDE },
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct DecoderContext {
    pub coding_type: u8,
    pub picture_structure: u8,
    pub frame_pred_frame_dct: bool,
    pub mpeg1: bool,
    pub quantizer_scale_type: QuantizerScaleType,
    pub intra_vlc_format: IntraVlcFormat,
    pub scan_order: ScanOrder,
    pub intra_dc_precision: IntraDcPrecision,
    pub quantizer_scale: u8,
    pub macroblock_modes: u32,
    pub coded_block_pattern: u8,
    pub dc_predictors: [i32; 3],
    pub dc_reset: bool,
    pub sign_bias: bool,
    pub dither: bool,
    pub output_format: OutputFormat,
    pub intra_quantizer_matrix: [u8; 64],
    pub non_intra_quantizer_matrix: [u8; 64],
    pub dct_block: [i16; 64],
    pub mb8: [u8; MACROBLOCK_BYTES],
    pub mb16: [i16; MACROBLOCK_BYTES],
    pub rgb32: [Rgb32; MACROBLOCK_PIXELS],
    pub rgb16: [Rgb16; MACROBLOCK_PIXELS],
    pub indexed: [u8; INDEXED_BYTES],
    pub palette: [Rgb16; PALETTE_LEN],
    pub thresholds: Thresholds,
}

impl Default for DecoderContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderContext {
    pub fn new() -> Self {
        Self {
            coding_type: 0,
            picture_structure: FRAME_PICTURE,
            frame_pred_frame_dct: false,
            mpeg1: false,
            quantizer_scale_type: QuantizerScaleType::default(),
            intra_vlc_format: IntraVlcFormat::default(),
            scan_order: ScanOrder::default(),
            intra_dc_precision: IntraDcPrecision::default(),
            quantizer_scale: 0,
            macroblock_modes: 0,
            coded_block_pattern: 0,
            dc_predictors: [0; 3],
            dc_reset: false,
            sign_bias: false,
            dither: false,
            output_format: OutputFormat::default(),
            intra_quantizer_matrix: [0; 64],
            non_intra_quantizer_matrix: [0; 64],
            dct_block: [0; 64],
            mb8: [0; MACROBLOCK_BYTES],
            mb16: [0; MACROBLOCK_BYTES],
            rgb32: [Rgb32::default(); MACROBLOCK_PIXELS],
            rgb16: [Rgb16::default(); MACROBLOCK_PIXELS],
            indexed: [0; INDEXED_BYTES],
            palette: [Rgb16::default(); PALETTE_LEN],
            thresholds: Thresholds::default(),
        }
    }

    pub fn reset_dc_predictors(&mut self) {
        self.dc_predictors = [self.intra_dc_precision.dc_reset_value(); 3];
    }

    pub fn picture_coding(&self) -> PictureCoding {
        PictureCoding {
            coding_type: self.coding_type,
            picture_structure: self.picture_structure,
            frame_pred_frame_dct: self.frame_pred_frame_dct,
        }
    }

    /// Whether intra blocks use table B-15. MPEG-1 streams always use table B-14.
    pub fn alternate_intra_table(&self) -> bool {
        self.intra_vlc_format == IntraVlcFormat::Alternate && !self.mpeg1
    }

    /// Widen the 8-bit macroblock into the 16-bit buffer without sign extension
    pub fn widen_macroblock(&mut self) {
        for (wide, &narrow) in self.mb16.iter_mut().zip(&self.mb8) {
            *wide = narrow.into();
        }
    }

    pub fn clear_macroblocks(&mut self) {
        self.mb8.fill(0);
        self.mb16.fill(0);
    }
}
