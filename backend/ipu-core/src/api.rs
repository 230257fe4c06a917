//! IPU public interface: register access, FIFO access, and the worker that drives commands

use crate::bitstream::Bitstream;
use crate::commands::{CommandContext, CommandState, Opcode, Stall};
use crate::decoder::DecoderContext;
use crate::fifo::{OutputFifo, Qword};
use crate::registers::{IpuRegister, Registers};
use bincode::{Decode, Encode};
use ipu_config::IpuConfig;

// Seen in IPU_CMD.DATA at the end of a video
const SEQUENCE_END_CODE: u32 = 0x0000_01B7;

#[derive(Debug, Clone, Encode, Decode)]
pub struct IpuCore {
    config: IpuConfig,
    registers: Registers,
    bitstream: Bitstream,
    decoder: DecoderContext,
    output: OutputFifo,
    current_opcode: Option<Opcode>,
    state: CommandState,
    interrupt_pending: bool,
}

impl IpuCore {
    #[must_use]
    pub fn new(config: IpuConfig) -> Self {
        Self {
            config,
            registers: Registers::default(),
            bitstream: Bitstream::new(),
            decoder: DecoderContext::new(),
            output: OutputFifo::new(),
            current_opcode: None,
            state: CommandState::Idle,
            interrupt_pending: false,
        }
    }

    /// Power-on state. Configuration is kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// The IPU_CTRL reset bit: drop all buffered data and any in-progress command. Decoding
    /// parameters in IPU_CTRL, the quantizer matrices, and the VQ palette survive.
    pub fn soft_reset(&mut self) {
        self.bitstream.clear(0);
        self.output.clear();

        self.registers.coded_block_pattern = 0;
        self.registers.ctrl.soft_reset();
        self.registers.top = 0;
        self.registers.command_busy = false;
        self.registers.command_data = 0;

        self.current_opcode = None;
        self.state = CommandState::Idle;

        log::debug!("IPU soft reset");

        self.interrupt_pending = true;
    }

    pub fn reload_config(&mut self, config: IpuConfig) {
        self.config = config;
    }

    /// Push input bytes into the input FIFO. Only whole quadwords are accepted, and only as many
    /// as fit; returns the number of bytes consumed.
    pub fn push_input(&mut self, bytes: &[u8]) -> usize {
        let consumed = self.bitstream.push_input(bytes);
        if consumed != 0 {
            self.process();
        }
        consumed
    }

    /// Move whole quadwords from the output FIFO into `out`. Returns the number of words written.
    pub fn drain_output(&mut self, out: &mut [u32]) -> usize {
        let written = self.output.drain_into(out);
        if written != 0 {
            self.process();
        }
        written
    }

    pub fn pop_output_qword(&mut self) -> Option<Qword> {
        let qword = self.output.pop()?;
        self.process();
        Some(qword)
    }

    #[must_use]
    pub fn input_fifo_qwords(&self) -> u32 {
        self.bitstream.fifo_qwords()
    }

    #[must_use]
    pub fn output_fifo_qwords(&self) -> u32 {
        self.output.len()
    }

    /// Whether a command is still executing (IPU_CTRL.BUSY)
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.registers.ctrl.busy
    }

    /// Whether a command has completed (or a soft reset happened) since the last acknowledge
    #[must_use]
    pub fn interrupt_pending(&self) -> bool {
        self.interrupt_pending
    }

    pub fn acknowledge_interrupt(&mut self) {
        self.interrupt_pending = false;
    }

    fn context(&mut self) -> CommandContext<'_> {
        CommandContext {
            bitstream: &mut self.bitstream,
            decoder: &mut self.decoder,
            output: &mut self.output,
            registers: &mut self.registers,
        }
    }

    /// Run the current command until it completes or stalls
    pub fn process(&mut self) {
        if self.registers.ctrl.busy {
            self.run_worker();
        }

        if self.config.sequence_end_clears_busy
            && self.registers.ctrl.busy
            && self.registers.command_busy
            && self.registers.command_data == SEQUENCE_END_CODE
        {
            log::debug!("Sequence end code in IPU_CMD; clearing busy");
            self.registers.command_busy = false;
            self.registers.ctrl.busy = false;
        }
    }

    fn run_worker(&mut self) {
        let mut state = self.state;
        let result = state.step(&mut self.context());
        self.state = state;

        match result {
            Ok(()) => self.complete_command(),
            Err(Stall::InputStarved) => {
                log::trace!("{:?} waiting for input", self.current_opcode);
            }
            Err(Stall::OutputFull) => {
                log::trace!("{:?} waiting for output space", self.current_opcode);
            }
        }
    }

    fn complete_command(&mut self) {
        if self.current_opcode.is_some_and(Opcode::sets_busy) {
            self.registers.clear_busy();
        }

        self.registers.ctrl.busy = false;
        self.state = CommandState::Idle;
        self.interrupt_pending = true;

        log::trace!("{:?} complete", self.current_opcode);
    }

    fn write_command(&mut self, command: u32) {
        self.registers.ctrl.error_code_detected = false;
        self.registers.ctrl.start_code_detected = false;

        let Some(opcode) = Opcode::from_command(command) else {
            log::warn!("Invalid IPU command written: {command:08X}");
            self.current_opcode = None;
            self.state = CommandState::Idle;
            self.registers.ctrl.busy = false;
            self.interrupt_pending = true;
            return;
        };

        log::trace!("IPU command {opcode}: {command:08X}");
        self.current_opcode = Some(opcode);

        if opcode.skips_bits() {
            self.bitstream.advance(command & 0x3F);
        }

        self.state = CommandState::start(opcode, command, &mut self.context());

        match opcode {
            Opcode::Bclr => {
                self.registers.command_busy = false;
                self.registers.ctrl.busy = false;
                self.interrupt_pending = true;
            }
            Opcode::Setth => {
                self.registers.ctrl.busy = false;
                self.interrupt_pending = true;
            }
            _ => {
                if opcode.sets_busy() {
                    self.registers.set_busy();
                }
                self.registers.ctrl.busy = true;
            }
        }

        self.process();
    }

    /// 32-bit register read. `address` only matters modulo 0x100.
    pub fn read_register(&mut self, address: u32) -> u32 {
        self.process();

        match IpuRegister::from_address(address) {
            Some(IpuRegister::Command) => {
                self.refresh_command_data();
                self.registers.command_data
            }
            Some(IpuRegister::Control) => self.registers.ctrl.read(
                self.bitstream.fifo_qwords(),
                self.output.len(),
                self.registers.coded_block_pattern,
            ),
            Some(IpuRegister::BitPosition) => self.bitstream.bp_register(),
            Some(IpuRegister::Top) => self.registers.top,
            None => {
                log::warn!("Unmapped IPU register read: {address:08X}");
                0
            }
        }
    }

    /// 64-bit register read. IPU_CMD and IPU_TOP carry their busy bits in bit 63.
    pub fn read_register_64(&mut self, address: u32) -> u64 {
        match IpuRegister::from_address(address) {
            Some(IpuRegister::Command) => {
                self.process();
                self.refresh_command_data();
                self.registers.read_command()
            }
            Some(IpuRegister::Top) => {
                self.process();
                self.registers.read_top()
            }
            Some(register) => {
                log::warn!("64-bit read of IPU register {register:?}");
                self.read_register(address).into()
            }
            None => {
                log::warn!("Unmapped IPU register read: {address:08X}");
                0
            }
        }
    }

    // Outside of VDEC and FDEC, IPU_CMD.DATA shows the next 32 bits of input when available
    fn refresh_command_data(&mut self) {
        if matches!(self.current_opcode, Some(Opcode::Vdec | Opcode::Fdec)) {
            return;
        }

        if let Some(word) = self.bitstream.peek_word() {
            self.registers.command_data = word;
        }
    }

    pub fn write_register(&mut self, address: u32, value: u32) {
        match IpuRegister::from_address(address) {
            Some(IpuRegister::Command) => self.write_command(value),
            Some(IpuRegister::Control) => {
                if self.registers.ctrl.write(value) {
                    self.soft_reset();
                }
            }
            Some(register) => {
                log::warn!("Write to read-only IPU register {register:?}: {value:08X}");
            }
            None => {
                log::warn!("Unmapped IPU register write: {address:08X} {value:08X}");
            }
        }
    }

    /// 64-bit register write. Only IPU_CMD accepts 64-bit writes; the high word is ignored.
    pub fn write_register_64(&mut self, address: u32, value: u64) {
        match IpuRegister::from_address(address) {
            Some(IpuRegister::Command) => self.write_command(value as u32),
            _ => {
                log::warn!("Unsupported 64-bit IPU register write: {address:08X} {value:016X}");
            }
        }
    }
}
