//! The rebuild pass: manifest plus WAV tree in, container out.

use crate::container::{self, ContainerError, DEFAULT_ALIGNMENT};
use crate::manifest::Manifest;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{self, File},
    io::{BufWriter, Error as IoError},
    path::Path,
};
use tracing::info;

/// Rebuilds a container at `out_path` from a manifest, resolving its
/// filenames against `root_dir` (the extraction root).
///
/// Rebuild honors the manifest over the files: sample rate, channels, block
/// size and codec come from the manifest, and the WAV files contribute only
/// their raw data section, so replacing a file's audio between extraction
/// and rebuild is the intended workflow. A missing or unreadable file is
/// replaced by an empty stream with a warning; only I/O on the output file
/// itself is fatal.
///
/// # Errors
/// Fails if the output file cannot be created or written.
pub fn rebuild_to_file(
    manifest: &Manifest,
    root_dir: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
) -> Result<(), RebuildError> {
    let root_dir = root_dir.as_ref();

    let file = File::create(out_path.as_ref())
        .map_err(RebuildError::io_factory(RebuildErrorKind::CreateOutput))?;

    container::build(
        manifest,
        |name| fs::read(root_dir.join(name)).ok(),
        BufWriter::new(file),
        DEFAULT_ALIGNMENT,
    )
    .map_err(RebuildError::from_container)?;

    info!(banks = manifest.banks.len(), "repacked container");
    Ok(())
}

/// An error from the rebuild pass.
#[derive(Debug)]
pub struct RebuildError {
    kind: RebuildErrorKind,
    source: RebuildErrorSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RebuildErrorKind {
    CreateOutput,
    Container,
}

#[derive(Debug)]
enum RebuildErrorSource {
    Io(IoError),
    Container(ContainerError),
}

impl RebuildError {
    fn io_factory(kind: RebuildErrorKind) -> impl Fn(IoError) -> Self {
        move |source| Self {
            kind,
            source: RebuildErrorSource::Io(source),
        }
    }

    fn from_container(source: ContainerError) -> Self {
        Self {
            kind: RebuildErrorKind::Container,
            source: RebuildErrorSource::Container(source),
        }
    }
}

impl Display for RebuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self.kind {
            RebuildErrorKind::CreateOutput => "failed to create output container file",
            RebuildErrorKind::Container => "failed to build container",
        })
    }
}

impl Error for RebuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            RebuildErrorSource::Io(e) => Some(e),
            RebuildErrorSource::Container(e) => Some(e),
        }
    }
}
