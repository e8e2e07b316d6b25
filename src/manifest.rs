//! The interchange record bridging extraction and rebuild.
//!
//! The manifest is the sole input of the rebuild pass: it carries every field
//! needed to reconstruct a structurally faithful bank (version, codec, sample
//! rate, channels, block size) plus the relative path of each extracted WAV.
//! Stream offsets and lengths are deliberately absent; they are recomputed
//! from the re-read files and the deduplication map. Editing the WAV files
//! between the two passes, while keeping the declared parameters, is the
//! intended workflow.

use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::File,
    io::{BufReader, BufWriter, Error as IoError},
    path::Path,
};

/// Description of one extracted container: an ordered list of bank layouts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Name of the container file this manifest was extracted from.
    pub original_file: String,
    /// One entry per `KWB2` chunk pair, in slot-table order.
    pub banks: Vec<BankManifest>,
}

/// Layout of one sound bank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankManifest {
    /// 1-based ordinal among the recognized `KWB2` chunks; names the
    /// extraction folder (`kwb_<index>`).
    pub index: u32,
    /// Sound entries in offset-table order, placeholders included.
    pub sound_entries: Vec<SoundEntry>,
}

/// One logical sound.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundEntry {
    /// Record version as stored in the bank. `None` marks a zero-offset
    /// placeholder slot, which round-trips as a zero offset.
    pub version: Option<u16>,
    /// Subsound descriptors in record order.
    pub subsounds: Vec<Subsound>,
}

/// Descriptor for one compressed audio stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subsound {
    /// Path of the extracted WAV, relative to the extraction root. `None`
    /// for codec ids this tool does not extract; such descriptors are
    /// retained structurally and rebuilt with an empty stream.
    pub filename: Option<String>,
    /// Sample rate in Hz.
    pub sample_rate: u16,
    /// Channel count.
    pub channels: u8,
    /// ADPCM block size in bytes.
    pub block_size: u16,
    /// Codec id as stored in the subsound record (`0x10` = MS ADPCM).
    pub codec: u8,
}

impl SoundEntry {
    /// Whether this entry is a zero-offset placeholder.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.version.is_none()
    }
}

impl Manifest {
    /// Reads a manifest from pretty-printed JSON.
    ///
    /// # Errors
    /// Fails if the file cannot be opened or is not a valid manifest.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let file = File::open(path).map_err(ManifestError::from_io)?;
        serde_json::from_reader(BufReader::new(file)).map_err(ManifestError::from_json)
    }

    /// Writes the manifest as pretty-printed JSON, suitable for hand editing.
    ///
    /// # Errors
    /// Fails if the file cannot be created or written.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
        let file = File::create(path).map_err(ManifestError::from_io)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(ManifestError::from_json)
    }
}

/// An error from reading or writing a manifest file.
#[derive(Debug)]
pub struct ManifestError {
    source: ManifestErrorSource,
}

#[derive(Debug)]
enum ManifestErrorSource {
    Io(IoError),
    Json(serde_json::Error),
}

impl ManifestError {
    fn from_io(source: IoError) -> Self {
        Self {
            source: ManifestErrorSource::Io(source),
        }
    }

    fn from_json(source: serde_json::Error) -> Self {
        Self {
            source: ManifestErrorSource::Json(source),
        }
    }
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self.source {
            ManifestErrorSource::Io(_) => "failed to access manifest file",
            ManifestErrorSource::Json(_) => "manifest was not valid JSON",
        })
    }
}

impl Error for ManifestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            ManifestErrorSource::Io(e) => Some(e),
            ManifestErrorSource::Json(e) => Some(e),
        }
    }
}
