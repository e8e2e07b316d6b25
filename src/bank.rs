//! The KWB2 sound-bank model.
//!
//! A bank occupies two container chunks: a header chunk (sound-entry offset
//! table plus records) and a body chunk (the concatenated raw audio
//! streams). Parsing walks the table and slices streams out of the body;
//! building reassembles both blobs from a [`BankManifest`], deduplicating
//! identical streams through [`BlobBuilder`].

use crate::blob::BlobBuilder;
use crate::manifest::{BankManifest, SoundEntry, Subsound};
use crate::read::{ReadError, Reader};
use crate::wav::{self, WavError};
use crate::write::{WriteError, Writer};
use phf::phf_map;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{Cursor, Read, Seek},
};
use tap::Pipe;
use tracing::{debug, warn};

pub(crate) const KWB2_MAGIC: [u8; 4] = *b"KWB2";

/// The only codec id whose streams are extracted to standalone files.
pub(crate) const CODEC_MSADPCM: u8 = 0x10;

/// Sound count lives at `0x06` in the bank header.
const SOUND_COUNT_OFFSET: u64 = 0x06;

/// The sound-entry offset table starts at `0x18`, right after the header
/// prologue.
const ENTRY_TABLE_OFFSET: u64 = 0x18;

/// Versions below this store subsound records at a fixed offset and size;
/// newer versions carry both in the entry header.
const TABLE_DRIVEN_VERSION: u16 = 0xc000;

/// Version written for entries whose manifest does not carry one.
const DEFAULT_VERSION: u16 = 0x8000;

const FIXED_SUBSOUND_START: u16 = 0x2c;
const FIXED_SUBSOUND_SIZE: u16 = 0x48;

static CODEC_NAMES: phf::Map<u8, &'static str> = phf_map! {
    0x00u8 => "PCM (16-bit)",
    0x10u8 => "MS ADPCM",
    0x90u8 => "GC DSP ADPCM",
};

fn codec_name(codec: u8) -> &'static str {
    CODEC_NAMES.get(&codec).copied().unwrap_or("unknown")
}

/// Where a sound entry's subsound records live. Version-dependent: a tagged
/// variant resolved once per entry, not a type hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubsoundLayout {
    Fixed,
    TableDriven { start: u16, size: u16 },
}

impl SubsoundLayout {
    fn resolve<R: Read + Seek>(
        reader: &mut Reader<R>,
        entry_offset: u64,
        version: u16,
    ) -> Result<Self, ReadError> {
        if version < TABLE_DRIVEN_VERSION {
            Ok(Self::Fixed)
        } else {
            let start = reader.le_u16_at(entry_offset + 0x2c)?;
            let size = reader.le_u16()?;
            Ok(Self::TableDriven { start, size })
        }
    }

    fn start(self) -> u16 {
        match self {
            Self::Fixed => FIXED_SUBSOUND_START,
            Self::TableDriven { start, .. } => start,
        }
    }

    fn record_size(self) -> u16 {
        match self {
            Self::Fixed => FIXED_SUBSOUND_SIZE,
            Self::TableDriven { size, .. } => size,
        }
    }
}

/// One parsed bank: its manifest layout plus the WAV files extracted from
/// it, named relative to the extraction root (`kwb_<index>/<track>.wav`).
pub(crate) struct ExtractedBank {
    pub(crate) layout: BankManifest,
    pub(crate) files: Vec<(String, Vec<u8>)>,
}

/// Parses the bank whose header and body chunks start at the given absolute
/// offsets. `bank_index` is the bank's 1-based ordinal among recognized
/// `KWB2` chunks; it names the extraction folder.
pub(crate) fn parse<R: Read + Seek>(
    reader: &mut Reader<R>,
    bank_index: u32,
    head_offset: u64,
    body_offset: u64,
) -> Result<ExtractedBank, BankError> {
    let sounds = reader
        .le_u16_at(head_offset + SOUND_COUNT_OFFSET)
        .map_err(BankError::read_factory(BankErrorKind::SoundCount))?;

    let mut sound_entries = Vec::with_capacity(sounds as usize);
    let mut files = Vec::new();

    // Output names are a single counter across all entries of the bank,
    // starting at 1, so files never collide within a folder.
    let mut track = 1u32;

    for entry in 0..u32::from(sounds) {
        let rel_offset = reader
            .le_u32_at(head_offset + ENTRY_TABLE_OFFSET + u64::from(entry) * 4)
            .map_err(BankError::read_factory(BankErrorKind::EntryOffset { entry }))?;

        // a zero table slot is a legitimate empty placeholder
        if rel_offset == 0 {
            sound_entries.push(SoundEntry {
                version: None,
                subsounds: vec![],
            });
            continue;
        }

        let entry_offset = head_offset + u64::from(rel_offset);

        let version = reader
            .le_u16_at(entry_offset)
            .map_err(BankError::read_factory(BankErrorKind::EntryHeader { entry }))?;
        let subsounds_count = reader
            .u8_at(entry_offset + 0x03)
            .map_err(BankError::read_factory(BankErrorKind::EntryHeader { entry }))?;

        let layout = SubsoundLayout::resolve(reader, entry_offset, version)
            .map_err(BankError::read_factory(BankErrorKind::SubsoundLayout { entry }))?;

        let mut subsounds = Vec::with_capacity(subsounds_count as usize);
        let base = entry_offset + u64::from(layout.start());

        for sub in 0..u32::from(subsounds_count) {
            let record = base + u64::from(sub) * u64::from(layout.record_size());
            let factory = BankError::read_factory(BankErrorKind::Subsound { entry, subsound: sub });

            reader.seek_to(record).map_err(&factory)?;
            let sample_rate = reader.le_u16().map_err(&factory)?;
            let codec = reader.u8().map_err(&factory)?;
            let channels = reader.u8().map_err(&factory)?;
            let block_size = reader.le_u16().map_err(&factory)?;

            let filename = if codec == CODEC_MSADPCM {
                let stream_offset = reader.le_u32_at(record + 0x10).map_err(&factory)?;
                let stream_size = reader.le_u32().map_err(&factory)?;

                let data = reader
                    .take_at(body_offset + u64::from(stream_offset), stream_size as usize)
                    .map_err(BankError::read_factory(BankErrorKind::Stream {
                        entry,
                        subsound: sub,
                    }))?;

                let bytes = wav::synthesize(&data, channels, u32::from(sample_rate), block_size)
                    .map_err(BankError::wav_factory(BankErrorKind::Wav {
                        entry,
                        subsound: sub,
                    }))?;

                let name = format!("kwb_{bank_index}/{track}.wav");
                track += 1;
                files.push((name.clone(), bytes));

                Some(name)
            } else {
                debug!(codec, name = codec_name(codec), "leaving non-extractable codec in place");
                None
            };

            subsounds.push(Subsound {
                filename,
                sample_rate,
                channels,
                block_size,
                codec,
            });
        }

        sound_entries.push(SoundEntry {
            version: Some(version),
            subsounds,
        });
    }

    Ok(ExtractedBank {
        layout: BankManifest {
            index: bank_index,
            sound_entries,
        },
        files,
    })
}

/// Rebuilds one bank from its manifest layout, returning `(header blob,
/// body blob)`.
///
/// `resolve` maps a manifest filename to the bytes of the standalone WAV
/// file, or `None` if it cannot be read. Missing or malformed files are
/// non-fatal: the subsound is rebuilt with a zero-length stream and a
/// warning is logged.
///
/// Rebuild always targets the fixed record layout, whatever layout the
/// source bank used; identical streams are stored once in the body blob.
pub(crate) fn build<F>(bank: &BankManifest, mut resolve: F) -> Result<(Vec<u8>, Vec<u8>), BankError>
where
    F: FnMut(&str) -> Option<Vec<u8>>,
{
    let mut body = BlobBuilder::new();

    let mut entry_records: Vec<Vec<u8>> = Vec::with_capacity(bank.sound_entries.len());
    let mut entry_offsets: Vec<u32> = Vec::with_capacity(bank.sound_entries.len());

    // entry records start right after the prologue and the offset table
    let mut next_offset = ENTRY_TABLE_OFFSET as u32 + bank.sound_entries.len() as u32 * 4;

    for entry in &bank.sound_entries {
        if entry.is_placeholder() {
            // placeholders round-trip as a zero table slot with no record
            entry_offsets.push(0);
            entry_records.push(Vec::new());
            continue;
        }

        let record = build_sound_entry(entry, &mut body, &mut resolve)
            .map_err(BankError::write_factory(BankErrorKind::EntryRecord))?;

        entry_offsets.push(next_offset);
        next_offset += record.len() as u32;
        entry_records.push(record);
    }

    let mut header = Writer::new(Cursor::new(Vec::new()));
    let assemble = BankError::write_factory(BankErrorKind::Header);

    header.tag(KWB2_MAGIC).map_err(&assemble)?;
    header.le_u16(0).map_err(&assemble)?;
    header.le_u16(bank.sound_entries.len() as u16).map_err(&assemble)?;
    header.zeros(0x10).map_err(&assemble)?;
    for offset in entry_offsets {
        header.le_u32(offset).map_err(&assemble)?;
    }
    for record in entry_records {
        header.bytes(&record).map_err(&assemble)?;
    }

    Ok((header.into_inner().into_inner(), body.into_bytes()))
}

fn build_sound_entry<F>(
    entry: &SoundEntry,
    body: &mut BlobBuilder,
    resolve: &mut F,
) -> Result<Vec<u8>, WriteError>
where
    F: FnMut(&str) -> Option<Vec<u8>>,
{
    let mut record = Writer::new(Cursor::new(Vec::new()));

    // Rebuild always emits the fixed record layout. A version at or above
    // TABLE_DRIVEN_VERSION would promise start/size fields this record does
    // not carry, so such entries are written back with the default version.
    let version = match entry.version.unwrap_or(DEFAULT_VERSION) {
        v if v >= TABLE_DRIVEN_VERSION => DEFAULT_VERSION,
        v => v,
    };

    record.le_u16(version)?;
    record.u8(0)?;
    record.u8(entry.subsounds.len() as u8)?;
    record.zeros(usize::from(FIXED_SUBSOUND_START) - 0x04)?;

    for sub in &entry.subsounds {
        let stream = match &sub.filename {
            Some(name) => resolve_stream(name, resolve).pipe(|data| body.insert(&data)),
            // descriptors without a file keep their fields but carry no stream
            None => crate::blob::StreamRef { offset: 0, len: 0 },
        };

        record.le_u16(sub.sample_rate)?;
        record.u8(sub.codec)?;
        record.u8(sub.channels)?;
        record.le_u16(sub.block_size)?;
        record.zeros(0x10 - 0x06)?;
        record.le_u32(stream.offset)?;
        record.le_u32(stream.len)?;
        record.zeros(usize::from(FIXED_SUBSOUND_SIZE) - 0x18)?;
    }

    Ok(record.into_inner().into_inner())
}

/// Re-reads one extracted WAV and returns its raw stream, degrading to an
/// empty stream on any failure.
fn resolve_stream<F>(name: &str, resolve: &mut F) -> Vec<u8>
where
    F: FnMut(&str) -> Option<Vec<u8>>,
{
    let Some(bytes) = resolve(name) else {
        warn!(file = name, "referenced audio file not found; substituting an empty stream");
        return Vec::new();
    };

    match wav::parse(&bytes) {
        Ok(data) => data,
        Err(e) => {
            warn!(file = name, error = %e, "unreadable audio file; substituting an empty stream");
            Vec::new()
        }
    }
}

#[derive(Debug)]
pub(crate) struct BankError {
    kind: BankErrorKind,
    source: BankErrorSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BankErrorKind {
    SoundCount,
    EntryOffset { entry: u32 },
    EntryHeader { entry: u32 },
    SubsoundLayout { entry: u32 },
    Subsound { entry: u32, subsound: u32 },
    Stream { entry: u32, subsound: u32 },
    Wav { entry: u32, subsound: u32 },
    EntryRecord,
    Header,
}

#[derive(Debug)]
enum BankErrorSource {
    Read(ReadError),
    Write(WriteError),
    Wav(WavError),
}

impl BankError {
    pub(crate) fn read_factory(kind: BankErrorKind) -> impl Fn(ReadError) -> Self {
        move |source| Self {
            kind,
            source: BankErrorSource::Read(source),
        }
    }

    pub(crate) fn write_factory(kind: BankErrorKind) -> impl Fn(WriteError) -> Self {
        move |source| Self {
            kind,
            source: BankErrorSource::Write(source),
        }
    }

    fn wav_factory(kind: BankErrorKind) -> impl Fn(WavError) -> Self {
        move |source| Self {
            kind,
            source: BankErrorSource::Wav(source),
        }
    }

    #[cfg(test)]
    pub(crate) fn kind(&self) -> BankErrorKind {
        self.kind
    }
}

impl Display for BankError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        use BankErrorKind::*;

        match self.kind {
            SoundCount => f.write_str("failed to read sound count"),
            EntryOffset { entry } => {
                f.write_str(&format!("failed to read offset of sound entry {entry}"))
            }
            EntryHeader { entry } => {
                f.write_str(&format!("failed to read header of sound entry {entry}"))
            }
            SubsoundLayout { entry } => {
                f.write_str(&format!("failed to read subsound layout of sound entry {entry}"))
            }
            Subsound { entry, subsound } => f.write_str(&format!(
                "failed to read subsound record {subsound} of sound entry {entry}"
            )),
            Stream { entry, subsound } => f.write_str(&format!(
                "failed to read audio stream of subsound {subsound} in sound entry {entry}"
            )),
            Wav { entry, subsound } => f.write_str(&format!(
                "failed to wrap audio stream of subsound {subsound} in sound entry {entry}"
            )),
            EntryRecord => f.write_str("failed to assemble a sound entry record"),
            Header => f.write_str("failed to assemble the bank header blob"),
        }
    }
}

impl Error for BankError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            BankErrorSource::Read(e) => Some(e),
            BankErrorSource::Write(e) => Some(e),
            BankErrorSource::Wav(e) => Some(e),
        }
    }
}
