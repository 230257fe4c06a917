//! PS2 Image Processing Unit: an MPEG-2 macroblock decoder with color conversion and
//! vector quantization, driven through four memory-mapped registers and two 128-bit FIFOs

mod api;
mod bitstream;
mod block;
mod color;
mod commands;
mod decoder;
mod fifo;
mod idct;
mod registers;
pub mod serialize;
mod slice;
#[cfg(test)]
mod testutil;
mod vlc;

pub use api::IpuCore;
pub use commands::Opcode;
pub use fifo::Qword;
pub use ipu_config::IpuConfig;
