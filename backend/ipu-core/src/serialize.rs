//! Save states: the entire core, including any half-finished command, as an opaque blob

use crate::api::IpuCore;
use bincode::config::{Configuration, Fixint, LittleEndian};
use bincode::error::{DecodeError, EncodeError};
use ipu_config::IpuConfig;
use std::io::{self, Read, Write};
use thiserror::Error;

const FILE_PREFIX: &[u8] = b"ipustate";

// Prefix + 2 bytes for version
const HEADER_LEN: usize = FILE_PREFIX.len() + 2;

pub const SAVE_STATE_VERSION: u16 = 1;

const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_little_endian().with_fixed_int_encoding();

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("error saving state: {source}")]
    Serialization {
        #[from]
        source: EncodeError,
    },
    #[error("error loading state: {source}")]
    Deserialization {
        #[from]
        source: DecodeError,
    },
    #[error("I/O error reading or writing state: {0}")]
    Io(#[from] io::Error),
    #[error("state does not start with the expected prefix")]
    PrefixMismatch,
    #[error("state version mismatch; expected {expected}, was {actual}")]
    VersionMismatch { expected: u16, actual: u16 },
}

/// Write a header followed by the zstd-compressed core state
///
/// # Errors
///
/// Propagates any encoding or I/O error.
pub fn save_state<W: Write>(core: &IpuCore, mut writer: W) -> Result<(), SaveStateError> {
    writer.write_all(FILE_PREFIX)?;
    writer.write_all(&SAVE_STATE_VERSION.to_le_bytes())?;

    let mut encoder = zstd::stream::Encoder::new(writer, 0)?;
    bincode::encode_into_std_write(core, &mut encoder, BINCODE_CONFIG)?;
    encoder.finish()?;

    Ok(())
}

/// Restore a core written by [`save_state`]. The given configuration replaces the saved one.
///
/// # Errors
///
/// Returns an error if the header does not match or the state cannot be decoded.
pub fn load_state<R: Read>(mut reader: R, config: IpuConfig) -> Result<IpuCore, SaveStateError> {
    let mut header = [0_u8; HEADER_LEN];
    reader.read_exact(&mut header)?;

    if &header[..FILE_PREFIX.len()] != FILE_PREFIX {
        return Err(SaveStateError::PrefixMismatch);
    }

    let version = u16::from_le_bytes([header[FILE_PREFIX.len()], header[FILE_PREFIX.len() + 1]]);
    if version != SAVE_STATE_VERSION {
        return Err(SaveStateError::VersionMismatch {
            expected: SAVE_STATE_VERSION,
            actual: version,
        });
    }

    let mut decoder = zstd::stream::Decoder::new(reader)?;
    let mut core: IpuCore = bincode::decode_from_std_read(&mut decoder, BINCODE_CONFIG)?;
    core.reload_config(config);

    Ok(core)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::BitWriter;
    use test_log::test;

    const CMD: u32 = 0x1000_2000;

    fn drain(core: &mut IpuCore) -> Vec<u32> {
        let mut words = Vec::new();
        while let Some(qword) = core.pop_output_qword() {
            words.extend_from_slice(&qword);
        }
        words
    }

    #[test]
    fn resume_mid_macroblock_after_load() {
        let input = BitWriter::new()
            .bits("100 0000 01")
            .value(2, 6)
            .value(40, 12)
            .bits("10 100 10 100 10 100 10 00 10 00 10")
            .align()
            .bytes(&[0x00; 24])
            .into_qwords();

        let mut running = IpuCore::new(IpuConfig::default());
        running.write_register(CMD, 0x2000_0000 | (1 << 27) | (1 << 26) | (2 << 16));
        assert_eq!(running.push_input(&input[..16]), 16);
        assert!(running.is_busy());

        let mut blob = Vec::new();
        save_state(&running, &mut blob).unwrap();
        let mut loaded = load_state(blob.as_slice(), IpuConfig::default()).unwrap();

        for core in [&mut running, &mut loaded] {
            assert_eq!(core.push_input(&input[16..]), input.len() - 16);
        }

        let expected = drain(&mut running);
        assert_eq!(expected.len(), 192);
        assert_eq!(drain(&mut loaded), expected);
        assert!(!loaded.is_busy());
    }

    #[test]
    fn rejects_bad_header() {
        let result = load_state(&b"notastate\x01\x00"[..], IpuConfig::default());
        assert!(matches!(result, Err(SaveStateError::PrefixMismatch)));

        let mut blob = Vec::new();
        save_state(&IpuCore::new(IpuConfig::default()), &mut blob).unwrap();
        blob[FILE_PREFIX.len()] = 0xFF;
        let result = load_state(blob.as_slice(), IpuConfig::default());
        assert!(matches!(
            result,
            Err(SaveStateError::VersionMismatch { expected: SAVE_STATE_VERSION, actual: 0x00FF })
        ));
    }
}
