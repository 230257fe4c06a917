mod job;

use crate::job::Job;
use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use ipu_core::serialize::{load_state, save_state};
use ipu_core::{IpuConfig, IpuCore, Opcode};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const IPU_CMD: u32 = 0x1000_2000;
const IPU_CTRL: u32 = 0x1000_2010;
const IPU_BP: u32 = 0x1000_2020;
const IPU_TOP: u32 = 0x1000_2030;

// Input FIFO capacity in bytes
const INPUT_CHUNK_LEN: usize = 128;

const QWORD_LEN: usize = 16;

#[derive(Parser)]
struct Args {
    /// TOML job file path
    #[arg(short = 'j', long)]
    job_path: PathBuf,

    /// Output file path for output FIFO contents as little-endian words; overrides the job file.
    /// Words are printed to stdout if neither is set
    #[arg(short = 'o', long)]
    output_path: Option<PathBuf>,

    /// Start from a save state instead of a freshly reset IPU
    #[arg(long)]
    load_state_path: Option<PathBuf>,

    /// Write a save state after the last command finishes or the input runs out
    #[arg(long)]
    save_state_path: Option<PathBuf>,

    /// Clear the busy flags when IPU_CMD holds the MPEG sequence end code
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    sequence_end_clears_busy: bool,
}

impl Args {
    fn ipu_config(&self) -> IpuConfig {
        IpuConfig { sequence_end_clears_busy: self.sequence_end_clears_busy }
    }
}

struct Session {
    core: IpuCore,
    input: Vec<u8>,
    position: usize,
    output: Vec<u32>,
}

impl Session {
    fn drain(&mut self) -> bool {
        let mut drained = false;
        while let Some(qword) = self.core.pop_output_qword() {
            self.output.extend_from_slice(&qword);
            drained = true;
        }
        drained
    }

    /// Feed input and drain output until the current command finishes. Returns false if the
    /// command stalled with no input left.
    fn run_command(&mut self) -> bool {
        loop {
            let drained = self.drain();
            if !self.core.is_busy() {
                return true;
            }

            let end = (self.position + INPUT_CHUNK_LEN).min(self.input.len());
            let consumed = self.core.push_input(&self.input[self.position..end]);
            self.position += consumed;

            if consumed == 0 && !drained {
                return false;
            }
        }
    }
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut input =
        fs::read(path).with_context(|| format!("Unable to read input from {}", path.display()))?;

    // The input FIFO only accepts whole quadwords
    let padded_len = input.len().next_multiple_of(QWORD_LEN);
    if padded_len != input.len() {
        log::debug!("Padding input from {} to {padded_len} bytes", input.len());
        input.resize(padded_len, 0);
    }

    Ok(input)
}

fn write_output(words: &[u32], path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Unable to create output file {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            for word in words {
                writer.write_all(&word.to_le_bytes())?;
            }
            writer.flush()?;

            log::info!("Wrote {} output words to {}", words.len(), path.display());
        }
        None => {
            for chunk in words.chunks(4) {
                let line: Vec<_> = chunk.iter().map(|word| format!("{word:08X}")).collect();
                println!("{}", line.join(" "));
            }
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let job_contents = fs::read_to_string(&args.job_path)
        .with_context(|| format!("Unable to read job file {}", args.job_path.display()))?;
    let base_dir = args.job_path.parent().unwrap_or(Path::new(""));
    let job = Job::parse(&job_contents, base_dir)
        .with_context(|| format!("Invalid job file {}", args.job_path.display()))?;

    let core = match &args.load_state_path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Unable to open save state {}", path.display()))?;
            let core = load_state(BufReader::new(file), args.ipu_config())?;
            log::info!("Loaded save state from {}", path.display());
            core
        }
        None => IpuCore::new(args.ipu_config()),
    };

    let mut session = Session { core, input: read_input(&job.input)?, position: 0, output: vec![] };

    log::info!("Running {} commands over {} input bytes", job.commands.len(), session.input.len());

    session.core.write_register(IPU_CTRL, job.ctrl);
    if !session.run_command() {
        log::warn!("Command from save state did not finish before the input ran out");
    }

    for &command in &job.commands {
        let opcode = Opcode::from_command(command)
            .map_or_else(|| "invalid".into(), |opcode| opcode.to_string());
        log::info!("{opcode} ({command:08X})");

        session.core.write_register(IPU_CMD, command);
        if !session.run_command() {
            log::warn!("{opcode} did not finish before the input ran out");
            break;
        }

        log::debug!(
            "  CMD={:08X} CTRL={:08X} BP={:08X} TOP={:08X}",
            session.core.read_register(IPU_CMD),
            session.core.read_register(IPU_CTRL),
            session.core.read_register(IPU_BP),
            session.core.read_register(IPU_TOP)
        );
    }

    log::info!(
        "Consumed {} of {} input bytes; {} output words",
        session.position,
        session.input.len(),
        session.output.len()
    );

    write_output(&session.output, args.output_path.as_deref().or(job.output.as_deref()))?;

    if let Some(path) = &args.save_state_path {
        let file = File::create(path)
            .with_context(|| format!("Unable to create save state {}", path.display()))?;
        save_state(&session.core, BufWriter::new(file))?;
        log::info!("Wrote save state to {}", path.display());
    }

    Ok(())
}
