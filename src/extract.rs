//! The extraction pass: container in, WAV tree plus manifest out.

use crate::container::{self, ContainerError};
use crate::manifest::Manifest;
use crate::read::Reader;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{create_dir_all, File},
    io::{BufReader, Error as IoError, Write},
    path::Path,
};
use tracing::info;

/// Extracts every `KWB2` bank of the container at `path` into `out_dir`.
///
/// Each bank gets a `kwb_<n>` folder holding its numbered WAV files; the
/// returned [`Manifest`] records the layout and references those files by
/// path relative to `out_dir`. Nothing is written until the container header
/// has been validated.
///
/// # Errors
/// Fails if the container cannot be opened or parsed (an unrecognized
/// signature is fatal), or if an output file cannot be written.
pub fn extract_to_dir(
    path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> Result<Manifest, ExtractError> {
    let path = path.as_ref();
    let out_dir = out_dir.as_ref();

    let file = File::open(path).map_err(ExtractError::io_factory(ExtractErrorKind::OpenInput))?;
    let mut reader = Reader::new(BufReader::new(file));

    let banks = container::parse(&mut reader).map_err(ExtractError::from_container)?;
    info!(banks = banks.len(), "parsed container");

    let mut manifest = Manifest {
        original_file: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        banks: Vec::with_capacity(banks.len()),
    };

    for bank in banks {
        for (name, bytes) in &bank.files {
            let target = out_dir.join(name);
            if let Some(parent) = target.parent() {
                create_dir_all(parent)
                    .map_err(ExtractError::io_factory(ExtractErrorKind::CreateDir))?;
            }

            File::create(&target)
                .and_then(|mut file| file.write_all(bytes))
                .map_err(ExtractError::io_factory(ExtractErrorKind::WriteFile))?;
        }

        info!(index = bank.layout.index, files = bank.files.len(), "extracted bank");
        manifest.banks.push(bank.layout);
    }

    Ok(manifest)
}

/// An error from the extraction pass.
#[derive(Debug)]
pub struct ExtractError {
    kind: ExtractErrorKind,
    source: ExtractErrorSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExtractErrorKind {
    OpenInput,
    Container,
    CreateDir,
    WriteFile,
}

#[derive(Debug)]
enum ExtractErrorSource {
    Io(IoError),
    Container(ContainerError),
}

impl ExtractError {
    fn io_factory(kind: ExtractErrorKind) -> impl Fn(IoError) -> Self {
        move |source| Self {
            kind,
            source: ExtractErrorSource::Io(source),
        }
    }

    fn from_container(source: ContainerError) -> Self {
        Self {
            kind: ExtractErrorKind::Container,
            source: ExtractErrorSource::Container(source),
        }
    }
}

impl Display for ExtractError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self.kind {
            ExtractErrorKind::OpenInput => "failed to open container file",
            ExtractErrorKind::Container => "failed to parse container",
            ExtractErrorKind::CreateDir => "failed to create extraction folder",
            ExtractErrorKind::WriteFile => "failed to write extracted audio file",
        })
    }
}

impl Error for ExtractError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            ExtractErrorSource::Io(e) => Some(e),
            ExtractErrorSource::Container(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::extract_to_dir;
    use crate::container::{build, DEFAULT_ALIGNMENT};
    use crate::manifest::{BankManifest, Manifest, SoundEntry, Subsound};
    use crate::wav;
    use std::{fs, io::Cursor};

    #[test]
    fn extraction_writes_tree_and_manifest() {
        let wav_bytes = wav::synthesize(b"stream bytes", 2, 44100, 512).unwrap();
        let manifest = Manifest {
            original_file: "in.xws".into(),
            banks: vec![BankManifest {
                index: 1,
                sound_entries: vec![SoundEntry {
                    version: Some(0x8000),
                    subsounds: vec![Subsound {
                        filename: Some("kwb_1/1.wav".into()),
                        sample_rate: 44100,
                        channels: 2,
                        block_size: 512,
                        codec: 0x10,
                    }],
                }],
            }],
        };

        let mut sink = Cursor::new(Vec::new());
        build(&manifest, |_| Some(wav_bytes.clone()), &mut sink, DEFAULT_ALIGNMENT).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let container_path = dir.path().join("in.xws");
        fs::write(&container_path, sink.into_inner()).unwrap();

        let out_dir = dir.path().join("extracted");
        let extracted = extract_to_dir(&container_path, &out_dir).unwrap();

        assert_eq!(extracted, manifest);
        let written = fs::read(out_dir.join("kwb_1/1.wav")).unwrap();
        assert_eq!(wav::parse(&written).unwrap(), b"stream bytes");
    }

    #[test]
    fn bad_container_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let container_path = dir.path().join("bad.xws");
        fs::write(&container_path, b"not a container at all").unwrap();

        let out_dir = dir.path().join("extracted");
        assert!(extract_to_dir(&container_path, &out_dir).is_err());
        assert!(!out_dir.exists());
    }
}
