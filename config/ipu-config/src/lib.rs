//! Settings that the IPU consumes but does not own: decoding parameters that the register layer
//! supplies through IPU_CTRL, and emulator-level behavior toggles

use bincode::{Decode, Encode};
use ipu_common::define_bit_enum;
use std::fmt::{self, Display};

define_bit_enum!(
    /// Coefficient scan order (IPU_CTRL.AS)
    ScanOrder,
    [Zigzag, Alternate]
);

define_bit_enum!(
    /// Mapping from `quantiser_scale_code` to quantizer scale (IPU_CTRL.QST)
    QuantizerScaleType,
    [Linear, NonLinear]
);

define_bit_enum!(
    /// Intra block coefficient table (IPU_CTRL.IVF): table B-14 or table B-15
    IntraVlcFormat,
    [Standard, Alternate]
);

define_bit_enum!(
    /// Pixel format for IDEC and CSC output (the OFM command bit)
    OutputFormat,
    [Rgb32, Rgb16]
);

/// Intra DC coefficient precision (IPU_CTRL.IDP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum IntraDcPrecision {
    #[default]
    Eight,
    Nine,
    Ten,
}

impl IntraDcPrecision {
    /// Decode the 2-bit register field. 3 is reserved and returns None.
    #[must_use]
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits & 3 {
            0 => Some(Self::Eight),
            1 => Some(Self::Nine),
            2 => Some(Self::Ten),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_bits(self) -> u32 {
        match self {
            Self::Eight => 0,
            Self::Nine => 1,
            Self::Ten => 2,
        }
    }

    /// Value that DC predictors reset to
    #[must_use]
    pub fn dc_reset_value(self) -> i32 {
        128 << self.to_bits()
    }

    /// Left shift applied to a DC predictor to produce the DC coefficient
    #[must_use]
    pub fn dc_shift(self) -> u32 {
        3 - self.to_bits()
    }
}

impl Display for IntraDcPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eight => write!(f, "8-bit"),
            Self::Nine => write!(f, "9-bit"),
            Self::Ten => write!(f, "10-bit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IpuConfig {
    /// Force IDEC/BDEC/VDEC out of the busy state when the command data register holds the MPEG
    /// sequence end code. Some software waits forever for a busy flag that real hardware clears
    /// at the end of a video.
    pub sequence_end_clears_busy: bool,
}

impl Default for IpuConfig {
    fn default() -> Self {
        Self { sequence_end_clears_busy: true }
    }
}
