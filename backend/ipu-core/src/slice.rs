//! Resumable macroblock decoders for IDEC and BDEC
//!
//! Each decoder is a state machine that advances as far as the available input and output space
//! allow. On a stall, the current state records exactly where to pick up again, down to the
//! coefficient within a block.

use crate::block::{self, BlockProgress};
use crate::color;
use crate::commands::{CommandContext, Stall};
use crate::fifo::{OutputCursor, OutputSource};
use crate::vlc::{self, AddressIncrement, MACROBLOCK_INTRA, MACROBLOCK_PATTERN, MACROBLOCK_QUANT};
use bincode::{Decode, Encode};
use ipu_config::{OutputFormat, QuantizerScaleType};

const BLOCKS_PER_MACROBLOCK: u8 = 6;
const ALL_BLOCKS_CODED: u8 = 0x3F;
const ADDRESS_ESCAPE_INCREMENT: u32 = 33;

// Blocks 1-6 in decode order; `resume` is the block that stalled last time, or 0 on a fresh
// macroblock
fn block_range(resume: u8) -> impl Iterator<Item = u8> {
    resume.max(1)..=BLOCKS_PER_MACROBLOCK
}

fn coded(coded_block_pattern: u8, block: u8) -> bool {
    coded_block_pattern & (1 << (BLOCKS_PER_MACROBLOCK - block)) != 0
}

/// Read the end-of-slice marker: a zero byte means a start code follows, so skip to the byte
/// boundary and flag it
fn check_start_code(ctx: &mut CommandContext<'_>) -> Result<(), Stall> {
    let [byte] = ctx.bitstream.read_bytes::<1>(false).ok_or(Stall::InputStarved)?;
    if byte == 0 {
        ctx.bitstream.align();
        ctx.registers.ctrl.start_code_detected = true;
    }

    Ok(())
}

fn read_top(ctx: &mut CommandContext<'_>) -> Result<(), Stall> {
    ctx.registers.top = ctx.bitstream.peek_word().ok_or(Stall::InputStarved)?;
    Ok(())
}

fn finish_macroblock(ctx: &mut CommandContext<'_>) {
    ctx.registers.ctrl.start_code_detected = false;
    ctx.registers.coded_block_pattern = ctx.decoder.coded_block_pattern;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
enum IdecState {
    Init,
    Prime,
    Header,
    Blocks { resume: u8 },
    Output(OutputCursor),
    Address { skipped: u32 },
    Refill,
    StartCode,
    Top,
}

/// Progress through an IDEC command, which decodes intra macroblocks until the slice ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct IdecProgress {
    state: IdecState,
    block: BlockProgress,
}

impl Default for IdecProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl IdecProgress {
    #[must_use]
    pub fn new() -> Self {
        Self { state: IdecState::Init, block: BlockProgress::default() }
    }

    /// Run until the slice is finished or decoding stalls
    pub fn step(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), Stall> {
        loop {
            match self.state {
                IdecState::Init => {
                    ctx.decoder.reset_dc_predictors();
                    ctx.registers.top = 0;
                    ctx.registers.ctrl.error_code_detected = false;
                    self.state = IdecState::Prime;
                }
                IdecState::Prime => {
                    ctx.bitstream.require(32)?;
                    self.state = IdecState::Header;
                }
                IdecState::Header => {
                    let decoder = &mut *ctx.decoder;
                    decoder.macroblock_modes =
                        vlc::macroblock_modes(ctx.bitstream, decoder.picture_coding());
                    if decoder.macroblock_modes & MACROBLOCK_QUANT != 0 {
                        let non_linear =
                            decoder.quantizer_scale_type == QuantizerScaleType::NonLinear;
                        decoder.quantizer_scale = vlc::quantizer_scale(ctx.bitstream, non_linear);
                    }

                    decoder.coded_block_pattern = ALL_BLOCKS_CODED;
                    decoder.mb8.fill(0);
                    decoder.rgb32.fill(color::Rgb32::default());

                    self.state = IdecState::Blocks { resume: 0 };
                }
                IdecState::Blocks { resume } => {
                    for block in block_range(resume) {
                        if let Err(starved) = block::decode_intra_block(
                            ctx.bitstream,
                            ctx.decoder,
                            &mut self.block,
                            block,
                            block == resume,
                        ) {
                            self.state = IdecState::Blocks { resume: block };
                            return Err(starved.into());
                        }
                    }

                    let decoder = &mut *ctx.decoder;
                    color::ycbcr_to_rgb32(
                        &decoder.mb8,
                        decoder.thresholds,
                        decoder.sign_bias,
                        &mut decoder.rgb32,
                    );

                    let source = match decoder.output_format {
                        OutputFormat::Rgb32 => OutputSource::Rgb32,
                        OutputFormat::Rgb16 => {
                            let dither = decoder.dither;
                            color::rgb32_to_rgb16(&decoder.rgb32, dither, &mut decoder.rgb16);
                            OutputSource::Rgb16
                        }
                    };

                    self.state = IdecState::Output(OutputCursor::new(source));
                }
                IdecState::Output(mut cursor) => {
                    let done = cursor.flush(ctx.output, ctx.decoder);
                    self.state = IdecState::Output(cursor);
                    if !done {
                        return Err(Stall::OutputFull);
                    }

                    self.state = IdecState::Address { skipped: 0 };
                }
                IdecState::Address { mut skipped } => loop {
                    if ctx.bitstream.require(16).is_err() {
                        self.state = IdecState::Address { skipped };
                        return Err(Stall::InputStarved);
                    }

                    match vlc::peek_address_increment(ctx.bitstream) {
                        AddressIncrement::Increment { value, len } => {
                            ctx.bitstream.advance(len.into());
                            skipped += u32::from(value) - 1;
                            if skipped != 0 {
                                log::debug!("IDEC skipped {skipped} macroblocks");
                                ctx.decoder.reset_dc_predictors();
                            }

                            self.state = IdecState::Refill;
                            break;
                        }
                        AddressIncrement::Escape => {
                            skipped += ADDRESS_ESCAPE_INCREMENT;
                            ctx.bitstream.advance(AddressIncrement::LONG_CODE_LEN);
                        }
                        AddressIncrement::Stuffing => {
                            ctx.bitstream.advance(AddressIncrement::LONG_CODE_LEN);
                        }
                        AddressIncrement::Invalid => {
                            // End of slice
                            finish_macroblock(ctx);
                            self.state = IdecState::StartCode;
                            break;
                        }
                    }
                },
                IdecState::Refill => {
                    ctx.bitstream.require(16)?;
                    self.state = IdecState::Header;
                }
                IdecState::StartCode => {
                    check_start_code(ctx)?;
                    self.state = IdecState::Top;
                }
                IdecState::Top => {
                    read_top(ctx)?;
                    return Ok(());
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
enum BdecState {
    Init,
    Prime,
    Blocks { resume: u8 },
    Output(OutputCursor),
    StartCode,
    Top,
}

/// Progress through a BDEC command, which decodes a single macroblock to 16-bit YCbCr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct BdecProgress {
    state: BdecState,
    block: BlockProgress,
}

impl Default for BdecProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BdecProgress {
    #[must_use]
    pub fn new() -> Self {
        Self { state: BdecState::Init, block: BlockProgress::default() }
    }

    /// Run until the macroblock has been output or decoding stalls
    pub fn step(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), Stall> {
        loop {
            match self.state {
                BdecState::Init => {
                    if ctx.decoder.dc_reset {
                        ctx.decoder.reset_dc_predictors();
                    }

                    ctx.registers.ctrl.error_code_detected = false;
                    ctx.registers.top = 0;
                    ctx.decoder.clear_macroblocks();
                    self.state = BdecState::Prime;
                }
                BdecState::Prime => {
                    ctx.bitstream.require(32)?;
                    self.state = BdecState::Blocks { resume: 0 };
                }
                BdecState::Blocks { resume } => {
                    self.decode_blocks(ctx, resume)?;

                    finish_macroblock(ctx);
                    self.state = BdecState::Output(OutputCursor::new(OutputSource::Macroblock16));
                }
                BdecState::Output(mut cursor) => {
                    let done = cursor.flush(ctx.output, ctx.decoder);
                    self.state = BdecState::Output(cursor);
                    if !done {
                        return Err(Stall::OutputFull);
                    }

                    self.state = BdecState::StartCode;
                }
                BdecState::StartCode => {
                    check_start_code(ctx)?;
                    self.state = BdecState::Top;
                }
                BdecState::Top => {
                    read_top(ctx)?;
                    return Ok(());
                }
            }
        }
    }

    fn decode_blocks(&mut self, ctx: &mut CommandContext<'_>, resume: u8) -> Result<(), Stall> {
        let modes = ctx.decoder.macroblock_modes;

        if modes & MACROBLOCK_INTRA != 0 {
            if resume == 0 {
                ctx.decoder.coded_block_pattern = ALL_BLOCKS_CODED;
            }

            for block in block_range(resume) {
                if let Err(starved) = block::decode_intra_block(
                    ctx.bitstream,
                    ctx.decoder,
                    &mut self.block,
                    block,
                    block == resume,
                ) {
                    self.state = BdecState::Blocks { resume: block };
                    return Err(starved.into());
                }
            }

            ctx.decoder.widen_macroblock();
        } else if modes & MACROBLOCK_PATTERN != 0 {
            if resume == 0 {
                ctx.decoder.coded_block_pattern = vlc::coded_block_pattern(ctx.bitstream);
            }

            let pattern = ctx.decoder.coded_block_pattern;
            for block in block_range(resume).filter(|&block| coded(pattern, block)) {
                if let Err(starved) = block::decode_non_intra_block(
                    ctx.bitstream,
                    ctx.decoder,
                    &mut self.block,
                    block,
                    block == resume,
                ) {
                    self.state = BdecState::Blocks { resume: block };
                    return Err(starved.into());
                }
            }
        }

        Ok(())
    }
}
