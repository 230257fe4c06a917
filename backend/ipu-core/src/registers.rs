//! IPU_CMD, IPU_CTRL, IPU_BP, and IPU_TOP

use bincode::{Decode, Encode};
use ipu_common::num::GetBit;
use ipu_config::{IntraDcPrecision, IntraVlcFormat, QuantizerScaleType, ScanOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpuRegister {
    Command,
    Control,
    BitPosition,
    Top,
}

impl IpuRegister {
    /// Map an address within the IPU register page. The page repeats every 0x100 bytes.
    #[must_use]
    pub fn from_address(address: u32) -> Option<Self> {
        match address & 0xFF {
            0x00 => Some(Self::Command),
            0x10 => Some(Self::Control),
            0x20 => Some(Self::BitPosition),
            0x30 => Some(Self::Top),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct ControlRegister {
    pub error_code_detected: bool,
    pub start_code_detected: bool,
    pub intra_dc_precision: IntraDcPrecision,
    pub scan_order: ScanOrder,
    pub intra_vlc_format: IntraVlcFormat,
    pub quantizer_scale_type: QuantizerScaleType,
    pub mpeg1: bool,
    pub picture_coding_type: u8,
    pub busy: bool,
}

impl ControlRegister {
    /// Assemble the register value. The FIFO counters and the coded block pattern live outside
    /// this struct.
    #[must_use]
    pub fn read(&self, input_qwords: u32, output_qwords: u32, coded_block_pattern: u8) -> u32 {
        (input_qwords & 0xF)
            | ((output_qwords & 0xF) << 4)
            | (u32::from(coded_block_pattern & 0x3F) << 8)
            | (u32::from(self.error_code_detected) << 14)
            | (u32::from(self.start_code_detected) << 15)
            | (self.intra_dc_precision.to_bits() << 16)
            | (u32::from(self.scan_order.to_bit()) << 20)
            | (u32::from(self.intra_vlc_format.to_bit()) << 21)
            | (u32::from(self.quantizer_scale_type.to_bit()) << 22)
            | (u32::from(self.mpeg1) << 23)
            | (u32::from(self.picture_coding_type & 7) << 24)
            | (u32::from(self.busy) << 31)
    }

    /// Write the decoding parameter fields. Returns whether the reset bit (30) was set.
    pub fn write(&mut self, value: u32) -> bool {
        self.intra_dc_precision =
            IntraDcPrecision::from_bits(value.bits(16..=17)).unwrap_or_else(|| {
                log::warn!("Invalid intra DC precision written to IPU_CTRL; using 9 bits");
                IntraDcPrecision::Nine
            });
        self.scan_order = ScanOrder::from_bit(value.bit(20));
        self.intra_vlc_format = IntraVlcFormat::from_bit(value.bit(21));
        self.quantizer_scale_type = QuantizerScaleType::from_bit(value.bit(22));
        self.mpeg1 = value.bit(23);
        self.picture_coding_type = value.bits(24..=26) as u8;

        log::trace!("IPU_CTRL write: {value:08X}");
        log::trace!("  Intra DC precision: {}", self.intra_dc_precision);
        log::trace!("  Scan order: {}", self.scan_order);
        log::trace!("  Intra VLC format: {}", self.intra_vlc_format);
        log::trace!("  Quantizer scale type: {}", self.quantizer_scale_type);
        log::trace!("  MPEG-1: {}", self.mpeg1);
        log::trace!("  Picture coding type: {}", self.picture_coding_type);

        value.bit(30)
    }

    /// A soft reset clears status flags but keeps the decoding parameters
    pub fn soft_reset(&mut self) {
        self.error_code_detected = false;
        self.start_code_detected = false;
        self.busy = false;
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Registers {
    pub ctrl: ControlRegister,
    /// IPU_CMD DATA: the most recent decode result, or the next 32 input bits
    pub command_data: u32,
    pub command_busy: bool,
    pub top: u32,
    pub top_busy: bool,
    /// Coded block pattern of the most recently decoded macroblock, as reported in IPU_CTRL
    pub coded_block_pattern: u8,
}

impl Registers {
    pub fn set_busy(&mut self) {
        self.command_busy = true;
        self.top_busy = true;
    }

    pub fn clear_busy(&mut self) {
        self.command_busy = false;
        self.top_busy = false;
    }

    #[must_use]
    pub fn read_command(&self) -> u64 {
        u64::from(self.command_data) | (u64::from(self.command_busy) << 63)
    }

    #[must_use]
    pub fn read_top(&self) -> u64 {
        u64::from(self.top) | (u64::from(self.top_busy) << 63)
    }
}
