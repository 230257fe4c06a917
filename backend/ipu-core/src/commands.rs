//! IPU command set: decoding the command word, and the resumable steps for every command that
//! consumes input over more than one worker tick

use crate::bitstream::{Bitstream, Starved};
use crate::color::{self, Rgb16, Rgb32};
use crate::decoder::DecoderContext;
use crate::fifo::{OutputCursor, OutputFifo, OutputSource};
use crate::registers::Registers;
use crate::slice::{BdecProgress, IdecProgress};
use crate::vlc::{self, DCT_TYPE_INTERLACED, I_PICTURE, MACROBLOCK_INTRA, MACROBLOCK_PATTERN};
use bincode::{Decode, Encode};
use ipu_common::num::GetBit;
use ipu_config::{OutputFormat, QuantizerScaleType};
use std::fmt::{self, Display};

const CHUNK_LEN: usize = 8;
const MATRIX_CHUNKS: u8 = 8;
const PALETTE_CHUNKS: u8 = 4;
const CSC_CHUNKS: u8 = 48;
const PACK_CHUNKS: u8 = 128;

/// Why a command step could not finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    /// Waiting for more input to be pushed
    InputStarved,
    /// Waiting for the output FIFO to be drained
    OutputFull,
}

impl From<Starved> for Stall {
    fn from(_: Starved) -> Self {
        Self::InputStarved
    }
}

fn read_chunk(bitstream: &mut Bitstream) -> Result<[u8; CHUNK_LEN], Stall> {
    bitstream.read_bytes::<CHUNK_LEN>(true).ok_or(Stall::InputStarved)
}

/// The core state that command steps operate on
pub struct CommandContext<'a> {
    pub bitstream: &'a mut Bitstream,
    pub decoder: &'a mut DecoderContext,
    pub output: &'a mut OutputFifo,
    pub registers: &'a mut Registers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Opcode {
    Bclr,
    Idec,
    Bdec,
    Vdec,
    Fdec,
    Setiq,
    Setvq,
    Csc,
    Pack,
    Setth,
}

impl Opcode {
    /// Opcode from bits 28-31 of a command word. 10-15 are not valid commands.
    #[must_use]
    pub fn from_command(command: u32) -> Option<Self> {
        match command >> 28 {
            0 => Some(Self::Bclr),
            1 => Some(Self::Idec),
            2 => Some(Self::Bdec),
            3 => Some(Self::Vdec),
            4 => Some(Self::Fdec),
            5 => Some(Self::Setiq),
            6 => Some(Self::Setvq),
            7 => Some(Self::Csc),
            8 => Some(Self::Pack),
            9 => Some(Self::Setth),
            _ => None,
        }
    }

    /// Whether the command decodes from the bitstream and reports through TOP as well as CMD
    #[must_use]
    pub fn sets_busy(self) -> bool {
        matches!(self, Self::Idec | Self::Bdec | Self::Vdec | Self::Fdec)
    }

    /// Whether the command word's low 6 bits are a count of bits to skip before starting
    #[must_use]
    pub fn skips_bits(self) -> bool {
        matches!(self, Self::Idec | Self::Bdec | Self::Vdec | Self::Fdec | Self::Setiq)
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bclr => "BCLR",
            Self::Idec => "IDEC",
            Self::Bdec => "BDEC",
            Self::Vdec => "VDEC",
            Self::Fdec => "FDEC",
            Self::Setiq => "SETIQ",
            Self::Setvq => "SETVQ",
            Self::Csc => "CSC",
            Self::Pack => "PACK",
            Self::Setth => "SETTH",
        };
        f.write_str(s)
    }
}

/// Which variable-length code VDEC decodes (TBL, bits 26-27)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum VdecTable {
    AddressIncrement,
    MacroblockType,
    MotionCode,
    DmVector,
}

impl VdecTable {
    fn from_command(command: u32) -> Self {
        match command.bits(26..=27) {
            0 => Self::AddressIncrement,
            1 => Self::MacroblockType,
            2 => Self::MotionCode,
            _ => Self::DmVector,
        }
    }
}

impl Display for VdecTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AddressIncrement => "macroblock address increment",
            Self::MacroblockType => "macroblock type",
            Self::MotionCode => "motion code",
            Self::DmVector => "dmvector",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct VdecProgress {
    table: VdecTable,
    decoded: bool,
}

impl VdecProgress {
    fn step(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), Stall> {
        if !self.decoded {
            ctx.bitstream.require(32)?;

            let data = match self.table {
                VdecTable::AddressIncrement => {
                    ctx.decoder.mpeg1 = ctx.registers.ctrl.mpeg1;
                    vlc::address_increment(ctx.bitstream, ctx.decoder.mpeg1)
                }
                VdecTable::MacroblockType => {
                    // Some software never sets a picture type; treat that as an I picture
                    let picture_coding_type = ctx.registers.ctrl.picture_coding_type;
                    ctx.decoder.frame_pred_frame_dct = true;
                    ctx.decoder.coding_type =
                        if picture_coding_type > 0 { picture_coding_type } else { I_PICTURE };
                    vlc::macroblock_modes(ctx.bitstream, ctx.decoder.picture_coding())
                }
                VdecTable::MotionCode => vlc::motion_delta(ctx.bitstream),
                VdecTable::DmVector => vlc::dmvector(ctx.bitstream),
            };

            ctx.registers.command_data = data;
            ctx.registers.ctrl.error_code_detected = data == 0;
            self.decoded = true;

            log::trace!("VDEC {} decoded {data:08X}", self.table);
        }

        ctx.registers.top = ctx.bitstream.peek_word().ok_or(Stall::InputStarved)?;

        Ok(())
    }
}

/// Progress through CSC or PACK, which convert a given number of macroblocks read raw from the
/// input FIFO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ConvertProgress {
    macroblocks: u16,
    index: u16,
    chunk: u8,
    dither: bool,
    rgb16: bool,
    cursor: Option<OutputCursor>,
}

impl ConvertProgress {
    fn from_command(command: u32) -> Self {
        Self {
            macroblocks: command.bits(0..=10) as u16,
            index: 0,
            chunk: 0,
            dither: command.bit(26),
            rgb16: command.bit(27),
            cursor: None,
        }
    }

    fn csc_step(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), Stall> {
        while self.index < self.macroblocks {
            if self.cursor.is_none() {
                let decoder = &mut *ctx.decoder;
                while self.chunk < CSC_CHUNKS {
                    let bytes = read_chunk(ctx.bitstream)?;
                    let start = usize::from(self.chunk) * CHUNK_LEN;
                    decoder.mb8[start..start + CHUNK_LEN].copy_from_slice(&bytes);
                    self.chunk += 1;
                }

                let thresholds = decoder.thresholds;
                color::ycbcr_to_rgb32(&decoder.mb8, thresholds, false, &mut decoder.rgb32);

                let source = if self.rgb16 {
                    color::rgb32_to_rgb16(&decoder.rgb32, self.dither, &mut decoder.rgb16);
                    OutputSource::Rgb16
                } else {
                    OutputSource::Rgb32
                };
                self.cursor = Some(OutputCursor::new(source));
            }

            self.flush(ctx)?;
        }

        Ok(())
    }

    fn pack_step(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), Stall> {
        while self.index < self.macroblocks {
            if self.cursor.is_none() {
                let decoder = &mut *ctx.decoder;
                while self.chunk < PACK_CHUNKS {
                    let bytes = read_chunk(ctx.bitstream)?;
                    let start = usize::from(self.chunk) * 2;
                    for (pixel, word) in
                        decoder.rgb32[start..start + 2].iter_mut().zip(bytes.chunks_exact(4))
                    {
                        *pixel = Rgb32::from_word(u32::from_le_bytes([
                            word[0], word[1], word[2], word[3],
                        ]));
                    }
                    self.chunk += 1;
                }

                color::rgb32_to_rgb16(&decoder.rgb32, self.dither, &mut decoder.rgb16);

                let source = if self.rgb16 {
                    OutputSource::Rgb16
                } else {
                    let palette = decoder.palette;
                    color::vector_quantize(&decoder.rgb16, &palette, &mut decoder.indexed);
                    OutputSource::Indexed
                };
                self.cursor = Some(OutputCursor::new(source));
            }

            self.flush(ctx)?;
        }

        Ok(())
    }

    fn flush(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), Stall> {
        let Some(cursor) = &mut self.cursor else { return Ok(()) };
        if !cursor.flush(ctx.output, ctx.decoder) {
            return Err(Stall::OutputFull);
        }

        self.cursor = None;
        self.chunk = 0;
        self.index += 1;

        Ok(())
    }
}

/// The command currently executing and exactly how far it has gotten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
pub enum CommandState {
    #[default]
    Idle,
    Idec(IdecProgress),
    Bdec(BdecProgress),
    Vdec(VdecProgress),
    Fdec,
    Setiq { non_intra: bool, chunk: u8 },
    Setvq { chunk: u8 },
    Csc(ConvertProgress),
    Pack(ConvertProgress),
}

impl CommandState {
    /// Apply a newly written command's parameters and return the state that will execute it.
    /// BCLR and SETTH complete here; every other command finishes in `step`.
    pub fn start(opcode: Opcode, command: u32, ctx: &mut CommandContext<'_>) -> Self {
        match opcode {
            Opcode::Bclr => {
                ctx.bitstream.clear(command);
                log::trace!("BCLR: input FIFO cleared, bit position {}", command & 0x7F);
                Self::Idle
            }
            Opcode::Setth => {
                ctx.decoder.thresholds = color::Thresholds::from_command(command);
                log::trace!("SETTH: {:?}", ctx.decoder.thresholds);
                Self::Idle
            }
            Opcode::Idec => {
                start_idec(command, ctx);
                Self::Idec(IdecProgress::new())
            }
            Opcode::Bdec => {
                start_bdec(command, ctx);
                Self::Bdec(BdecProgress::new())
            }
            Opcode::Vdec => {
                let table = VdecTable::from_command(command);
                log::trace!("VDEC: {table}");
                Self::Vdec(VdecProgress { table, decoded: false })
            }
            Opcode::Fdec => Self::Fdec,
            Opcode::Setiq => Self::Setiq { non_intra: command.bit(27), chunk: 0 },
            Opcode::Setvq => Self::Setvq { chunk: 0 },
            Opcode::Csc => Self::Csc(ConvertProgress::from_command(command)),
            Opcode::Pack => Self::Pack(ConvertProgress::from_command(command)),
        }
    }

    /// Advance the current command as far as input and output space allow
    pub fn step(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), Stall> {
        match self {
            Self::Idle => Ok(()),
            Self::Idec(progress) => progress.step(ctx),
            Self::Bdec(progress) => progress.step(ctx),
            Self::Vdec(progress) => progress.step(ctx),
            Self::Fdec => {
                let word = ctx.bitstream.peek_word().ok_or(Stall::InputStarved)?;
                ctx.registers.command_data = word;
                ctx.registers.top = word;
                log::trace!("FDEC read {word:08X}");
                Ok(())
            }
            Self::Setiq { non_intra, chunk } => {
                let matrix = if *non_intra {
                    &mut ctx.decoder.non_intra_quantizer_matrix
                } else {
                    &mut ctx.decoder.intra_quantizer_matrix
                };

                while *chunk < MATRIX_CHUNKS {
                    let bytes = read_chunk(ctx.bitstream)?;
                    let start = usize::from(*chunk) * CHUNK_LEN;
                    matrix[start..start + CHUNK_LEN].copy_from_slice(&bytes);
                    *chunk += 1;
                }

                let kind = if *non_intra { "Non-intra" } else { "Intra" };
                log::trace!("SETIQ: {kind} quantizer matrix {matrix:?}");
                Ok(())
            }
            Self::Setvq { chunk } => {
                while *chunk < PALETTE_CHUNKS {
                    let bytes = read_chunk(ctx.bitstream)?;
                    let start = usize::from(*chunk) * CHUNK_LEN / 2;
                    for (color, halfword) in ctx.decoder.palette[start..start + CHUNK_LEN / 2]
                        .iter_mut()
                        .zip(bytes.chunks_exact(2))
                    {
                        let halfword = u16::from_le_bytes([halfword[0], halfword[1]]);
                        *color = Rgb16::from_halfword(halfword);
                    }
                    *chunk += 1;
                }

                log::trace!("SETVQ: palette {:?}", ctx.decoder.palette);
                Ok(())
            }
            Self::Csc(progress) => progress.csc_step(ctx),
            Self::Pack(progress) => progress.pack_step(ctx),
        }
    }
}

fn start_idec(command: u32, ctx: &mut CommandContext<'_>) {
    let ctrl = &mut ctx.registers.ctrl;
    ctrl.picture_coding_type = I_PICTURE;

    let decoder = &mut *ctx.decoder;
    decoder.coding_type = I_PICTURE;
    decoder.mpeg1 = ctrl.mpeg1;
    decoder.quantizer_scale_type = ctrl.quantizer_scale_type;
    decoder.intra_vlc_format = ctrl.intra_vlc_format;
    decoder.scan_order = ctrl.scan_order;
    decoder.intra_dc_precision = ctrl.intra_dc_precision;

    decoder.quantizer_scale = command.bits(16..=20) as u8;
    decoder.frame_pred_frame_dct = !command.bit(24);
    decoder.sign_bias = command.bit(25);
    decoder.dither = command.bit(26);
    decoder.output_format = OutputFormat::from_bit(command.bit(27));
    decoder.dc_reset = true;

    log::trace!("IDEC: {command:08X}");
    log::trace!("  Skip bits: {}", command & 0x3F);
    log::trace!("  Quantizer step code: {}", decoder.quantizer_scale);
    log::trace!("  Decode DCT type: {}", !decoder.frame_pred_frame_dct);
    log::trace!("  Sign bias: {}", decoder.sign_bias);
    log::trace!("  Dither: {}", decoder.dither);
    log::trace!("  Output format: {:?}", decoder.output_format);
}

fn start_bdec(command: u32, ctx: &mut CommandContext<'_>) {
    let ctrl = &ctx.registers.ctrl;

    let decoder = &mut *ctx.decoder;
    decoder.coding_type = I_PICTURE;
    decoder.mpeg1 = ctrl.mpeg1;
    decoder.quantizer_scale_type = ctrl.quantizer_scale_type;
    decoder.intra_vlc_format = ctrl.intra_vlc_format;
    decoder.scan_order = ctrl.scan_order;
    decoder.intra_dc_precision = ctrl.intra_dc_precision;

    let non_linear = decoder.quantizer_scale_type == QuantizerScaleType::NonLinear;
    decoder.quantizer_scale = vlc::scale_from_code(command.bits(16..=20), non_linear);

    let intra = command.bit(27);
    let dct_type = if command.bit(25) { DCT_TYPE_INTERLACED } else { 0 };
    let block_type = if intra { MACROBLOCK_INTRA } else { MACROBLOCK_PATTERN };
    decoder.macroblock_modes = dct_type | block_type;
    decoder.dc_reset = command.bit(26);
    decoder.clear_macroblocks();

    log::trace!("BDEC: {command:08X}");
    log::trace!("  Skip bits: {}", command & 0x3F);
    log::trace!("  Quantizer scale: {}", decoder.quantizer_scale);
    log::trace!("  Field DCT: {}", command.bit(25));
    log::trace!("  Reset DC predictors: {}", decoder.dc_reset);
    log::trace!("  Intra: {intra}");
}
