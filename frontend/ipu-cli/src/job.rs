//! TOML job files: an IPU_CTRL value, a list of command words, and where the bitstream comes from

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Job {
    /// Input bitstream, relative to the job file's directory
    pub input: PathBuf,
    /// Written to IPU_CTRL before the first command
    #[serde(default)]
    pub ctrl: u32,
    /// Command words written to IPU_CMD in order, each waiting for the previous to finish
    pub commands: Vec<u32>,
    /// Where to write output FIFO contents; the command line overrides this
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Job {
    pub fn parse(contents: &str, base_dir: &Path) -> anyhow::Result<Self> {
        let mut job: Self = toml::from_str(contents)?;

        job.input = base_dir.join(&job.input);
        job.output = job.output.map(|output| base_dir.join(output));

        Ok(job)
    }
}
