//! Minimal RIFF/WAVE wrapper for MS ADPCM streams.
//!
//! The compressed bitstream is never decoded; the WAV file is only an
//! interchange container so ordinary audio tools can see the stream. Every
//! field of the `fmt ` chunk is derived from the subsound descriptor, so
//! `parse(synthesize(x, ..)) == x` holds for any byte sequence `x`.

use crate::read::Reader;
use crate::write::{WriteError, WriteResult, Writer};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::Cursor,
};

const RIFF_MAGIC: [u8; 4] = *b"RIFF";
const WAVE_MAGIC: [u8; 4] = *b"WAVE";
const FMT_MAGIC: [u8; 4] = *b"fmt ";
const DATA_MAGIC: [u8; 4] = *b"data";

/// WAVE format tag registered for Microsoft ADPCM.
const WAVE_FORMAT_ADPCM: u16 = 2;

/// The standard MS ADPCM predictor coefficient pairs. These are fixed by the
/// format specification, not derived from the stream.
const ADPCM_COEFFS: [(i16, i16); 7] = [
    (256, 0),
    (512, -256),
    (0, 0),
    (192, 64),
    (240, 0),
    (460, -208),
    (392, -232),
];

/// `fmt ` chunk size: 18 base bytes plus 32 bytes of ADPCM extra data
/// (samples per block, coefficient count, 7 coefficient pairs).
const FMT_CHUNK_SIZE: u32 = 50;
const ADPCM_EXTRA_SIZE: u16 = 32;
const ADPCM_BITS_PER_SAMPLE: u16 = 4;

/// `None` when the descriptor cannot describe an ADPCM block: zero channels,
/// or a block too small to hold the 7-byte per-channel preamble.
pub(crate) fn samples_per_block(channels: u8, block_align: u16) -> Option<u32> {
    if channels == 0 {
        return None;
    }

    let channels = u32::from(channels);
    let data_bytes = u32::from(block_align).checked_sub(7 * channels)?;
    Some(data_bytes * 2 / channels + 2)
}

/// Wraps a raw MS ADPCM stream in a standalone WAV file.
///
/// The channel count and block size come straight out of a subsound record,
/// so an impossible pair is a data error, not a programming error.
pub(crate) fn synthesize(
    data: &[u8],
    channels: u8,
    sample_rate: u32,
    block_align: u16,
) -> Result<Vec<u8>, WavError> {
    let samples_per_block = samples_per_block(channels, block_align)
        .filter(|&samples| u16::try_from(samples).is_ok())
        .ok_or_else(|| WavError::new(WavErrorKind::BadBlockLayout))?;

    assemble(data, channels, sample_rate, block_align, samples_per_block)
        .map_err(WavError::from_write)
}

fn assemble(
    data: &[u8],
    channels: u8,
    sample_rate: u32,
    block_align: u16,
    samples_per_block: u32,
) -> WriteResult<Vec<u8>> {
    let byte_rate = sample_rate * u32::from(block_align) / samples_per_block;

    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.tag(RIFF_MAGIC)?;
    let riff_size = writer.reserve_u32()?;
    writer.tag(WAVE_MAGIC)?;

    writer.tag(FMT_MAGIC)?;
    writer.le_u32(FMT_CHUNK_SIZE)?;
    writer.le_u16(WAVE_FORMAT_ADPCM)?;
    writer.le_u16(u16::from(channels))?;
    writer.le_u32(sample_rate)?;
    writer.le_u32(byte_rate)?;
    writer.le_u16(block_align)?;
    writer.le_u16(ADPCM_BITS_PER_SAMPLE)?;
    writer.le_u16(ADPCM_EXTRA_SIZE)?;
    writer.le_u16(samples_per_block as u16)?;
    writer.le_u16(ADPCM_COEFFS.len() as u16)?;
    for (coeff1, coeff2) in ADPCM_COEFFS {
        writer.le_i16(coeff1)?;
        writer.le_i16(coeff2)?;
    }

    writer.tag(DATA_MAGIC)?;
    writer.le_u32(data.len() as u32)?;
    writer.bytes(data)?;

    let file_size = writer.position();
    writer.patch_u32(riff_size, (file_size - 8) as u32)?;

    Ok(writer.into_inner().into_inner())
}

/// Returns the raw payload of the `data` chunk.
///
/// Unknown chunks are skipped by their declared size; nothing inside the
/// stream itself is inspected.
pub(crate) fn parse(bytes: &[u8]) -> Result<Vec<u8>, WavError> {
    let mut reader = Reader::new(Cursor::new(bytes));

    match reader.tag() {
        Ok(tag) if tag == RIFF_MAGIC => {}
        _ => return Err(WavError::new(WavErrorKind::Riff)),
    }
    let _ = reader
        .le_u32()
        .map_err(|_| WavError::new(WavErrorKind::Truncated))?;
    match reader.tag() {
        Ok(tag) if tag == WAVE_MAGIC => {}
        _ => return Err(WavError::new(WavErrorKind::Wave)),
    }

    let mut position = 12u64;
    loop {
        let Ok(chunk_id) = reader.tag_at(position) else {
            // ran off the end without seeing a data chunk
            return Err(WavError::new(WavErrorKind::MissingData));
        };
        let chunk_size = reader
            .le_u32()
            .map_err(|_| WavError::new(WavErrorKind::Truncated))?;

        if chunk_id == DATA_MAGIC {
            return reader
                .take(chunk_size as usize)
                .map_err(|_| WavError::new(WavErrorKind::Truncated));
        }

        position += 8 + u64::from(chunk_size);
    }
}

#[derive(Debug)]
pub(crate) struct WavError {
    kind: WavErrorKind,
    source: Option<WriteError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WavErrorKind {
    Riff,
    Wave,
    MissingData,
    Truncated,
    BadBlockLayout,
    Write,
}

impl WavError {
    fn new(kind: WavErrorKind) -> Self {
        Self { kind, source: None }
    }

    fn from_write(source: WriteError) -> Self {
        Self {
            kind: WavErrorKind::Write,
            source: Some(source),
        }
    }

    #[cfg(test)]
    pub(crate) fn kind(&self) -> WavErrorKind {
        self.kind
    }
}

impl Display for WavError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self.kind {
            WavErrorKind::Riff => "no RIFF signature found",
            WavErrorKind::Wave => "no WAVE signature found",
            WavErrorKind::MissingData => "no data chunk found",
            WavErrorKind::Truncated => "file ended inside a chunk",
            WavErrorKind::BadBlockLayout => {
                "channel count and block size cannot form an ADPCM block"
            }
            WavErrorKind::Write => "failed to assemble WAV file",
        })
    }
}

impl Error for WavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e),
            None => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{parse, samples_per_block, synthesize, WavErrorKind};

    #[test]
    fn samples_per_block_formula() {
        // ((512 - 14) * 2) / 2 + 2
        assert_eq!(samples_per_block(2, 512), Some(500));
        // ((256 - 7) * 2) / 1 + 2
        assert_eq!(samples_per_block(1, 256), Some(500));
    }

    #[test]
    fn reject_impossible_block_layouts() {
        assert_eq!(samples_per_block(0, 512), None);
        assert_eq!(samples_per_block(2, 8), None);

        // descriptor fields come straight off disk; neither pair may panic
        assert!(synthesize(b"xx", 0, 44100, 512)
            .is_err_and(|e| e.kind() == WavErrorKind::BadBlockLayout));
        assert!(synthesize(b"xx", 2, 44100, 8)
            .is_err_and(|e| e.kind() == WavErrorKind::BadBlockLayout));
    }

    #[test]
    fn synthesized_header_fields() {
        let wav = synthesize(b"\x01\x02\x03\x04", 2, 44100, 512).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), wav.len() as u32 - 8);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(wav[16..20].try_into().unwrap()), 50);
        // format tag 2 = MS ADPCM
        assert_eq!(u16::from_le_bytes(wav[20..22].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(wav[22..24].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 44100);
        // byte rate = 44100 * 512 / 500
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 45158);
        assert_eq!(u16::from_le_bytes(wav[32..34].try_into().unwrap()), 512);
        assert_eq!(u16::from_le_bytes(wav[34..36].try_into().unwrap()), 4);
        assert_eq!(u16::from_le_bytes(wav[36..38].try_into().unwrap()), 32);
        assert_eq!(u16::from_le_bytes(wav[38..40].try_into().unwrap()), 500);
        assert_eq!(u16::from_le_bytes(wav[40..42].try_into().unwrap()), 7);
        // 7 coefficient pairs, then the data chunk
        assert_eq!(&wav[70..74], b"data");
        assert_eq!(u32::from_le_bytes(wav[74..78].try_into().unwrap()), 4);
        assert_eq!(&wav[78..], b"\x01\x02\x03\x04");
    }

    #[test]
    fn round_trip_is_lossless() {
        let payload: Vec<u8> = (0..=255).collect();

        let wav = synthesize(&payload, 2, 22050, 512).unwrap();
        assert_eq!(parse(&wav).unwrap(), payload);

        let empty = synthesize(b"", 1, 44100, 256).unwrap();
        assert_eq!(parse(&empty).unwrap(), b"");
    }

    #[test]
    fn parse_skips_unknown_chunks() {
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF\x00\x00\x00\x00WAVE");
        wav.extend_from_slice(b"junk\x03\x00\x00\x00abc");
        wav.extend_from_slice(b"data\x02\x00\x00\x00hi");

        assert_eq!(parse(&wav).unwrap(), b"hi");
    }

    #[test]
    fn reject_foreign_files() {
        assert!(parse(b"").is_err_and(|e| e.kind() == WavErrorKind::Riff));
        assert!(parse(b"OggS\x00\x00\x00\x00\x00\x00\x00\x00").is_err_and(|e| e.kind() == WavErrorKind::Riff));
        assert!(parse(b"RIFF\x04\x00\x00\x00AVI ").is_err_and(|e| e.kind() == WavErrorKind::Wave));
    }

    #[test]
    fn reject_truncated_files() {
        let wav = synthesize(b"abcdef", 1, 8000, 128).unwrap();

        assert!(parse(&wav[..wav.len() - 3]).is_err_and(|e| e.kind() == WavErrorKind::Truncated));
        assert!(parse(b"RIFF\x00\x00\x00\x00WAVE")
            .is_err_and(|e| e.kind() == WavErrorKind::MissingData));
        assert!(parse(b"RIFF\x00\x00\x00\x00WAVEdata")
            .is_err_and(|e| e.kind() == WavErrorKind::Truncated));
    }
}
