//! The XWS outer container model.
//!
//! An XWS file is a flat table of 4-byte absolute-offset slots. A `KWB2`
//! bank occupies two consecutive slots (header chunk, body chunk); every
//! other chunk type occupies a single slot and is skipped. Rebuilding lays
//! banks back out at sector-aligned positions and back-patches the file
//! size and slot table once all positions are known.

use crate::bank::{self, BankError, ExtractedBank, KWB2_MAGIC};
use crate::manifest::Manifest;
use crate::read::{ReadError, Reader};
use crate::write::{WriteError, Writer};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{Read, Seek, Write},
};
use tracing::{debug, info};

/// The two accepted container magics.
const XWS_MAGIC: [u8; 4] = *b"XWSF";
const XWS_MAGIC_ALT: [u8; 4] = *b"tdpa";

/// Slot count lives at `0x18`; the slot-table address at `0x20`; the total
/// file size, patched last, at `0x10`.
const SLOT_COUNT_OFFSET: u64 = 0x18;
const SLOT_TABLE_POINTER_OFFSET: u64 = 0x20;

/// Bytes `0x08`..`0x0c` of the header. Their exact semantics (endianness
/// and version markers) are unconfirmed; rebuilds write the constant
/// observed in PC containers and never read it back.
const OPAQUE_PLATFORM_BYTES: [u8; 4] = [0x00, 0x00, 0x01, 0x01];

/// Sector boundary used by retail containers.
pub(crate) const DEFAULT_ALIGNMENT: u64 = 0x800;

/// Parses a container and extracts every `KWB2` bank in slot-table order.
pub(crate) fn parse<R: Read + Seek>(
    reader: &mut Reader<R>,
) -> Result<Vec<ExtractedBank>, ContainerError> {
    match reader.tag_at(0) {
        Ok(tag) if tag == XWS_MAGIC || tag == XWS_MAGIC_ALT => {}
        Ok(tag) => return Err(ContainerError::new(ContainerErrorKind::UnknownMagic { tag })),
        Err(e) => {
            return Err(ContainerError::read_factory(ContainerErrorKind::Magic)(e));
        }
    }

    let slots = reader
        .le_u32_at(SLOT_COUNT_OFFSET)
        .map_err(ContainerError::read_factory(ContainerErrorKind::SlotCount))?;
    let table = reader
        .le_u32_at(SLOT_TABLE_POINTER_OFFSET)
        .map_err(ContainerError::read_factory(ContainerErrorKind::SlotTable))?
        .into();

    let mut banks = Vec::new();
    let mut slot = 0u32;

    while slot < slots {
        let head_offset = reader
            .le_u32_at(slot_position(table, slot))
            .map_err(ContainerError::read_factory(ContainerErrorKind::Slot { slot }))?;

        // a zero slot is an absent entry
        if head_offset == 0 {
            slot += 1;
            continue;
        }

        let tag = reader
            .tag_at(head_offset.into())
            .map_err(ContainerError::read_factory(ContainerErrorKind::ChunkTag { slot }))?;

        if tag == KWB2_MAGIC {
            // The chunk occupies this slot and the next; the second slot is
            // trusted to hold the matching body chunk's offset.
            let body_offset = reader
                .le_u32_at(slot_position(table, slot + 1))
                .map_err(ContainerError::read_factory(ContainerErrorKind::Slot {
                    slot: slot + 1,
                }))?;

            let index = banks.len() as u32 + 1;
            info!(index, offset = head_offset, "found KWB2 bank");

            let extracted = bank::parse(reader, index, head_offset.into(), body_offset.into())
                .map_err(ContainerError::bank_factory(index))?;
            banks.push(extracted);

            slot += 2;
        } else {
            // unrecognized chunk types occupy a single slot
            debug!(slot, ?tag, "skipping unrecognized chunk");
            slot += 1;
        }
    }

    Ok(banks)
}

fn slot_position(table: u64, slot: u32) -> u64 {
    table + u64::from(slot) * 4
}

/// Rebuilds a container from a manifest.
///
/// `resolve` maps a manifest filename to the bytes of the extracted WAV
/// file; see [`bank::build`] for its failure semantics. `alignment` is the
/// sector boundary for chunk placement (retail files use
/// [`DEFAULT_ALIGNMENT`]).
pub(crate) fn build<W, F>(
    manifest: &Manifest,
    mut resolve: F,
    sink: W,
    alignment: u64,
) -> Result<(), ContainerError>
where
    W: Write + Seek,
    F: FnMut(&str) -> Option<Vec<u8>>,
{
    let mut writer = Writer::new(sink);
    let header = ContainerError::write_factory(ContainerErrorKind::Header);

    let total_slots = manifest.banks.len() as u32 * 2;

    writer.tag(XWS_MAGIC).map_err(&header)?;
    writer.le_u32(0).map_err(&header)?;
    writer.bytes(&OPAQUE_PLATFORM_BYTES).map_err(&header)?;
    writer.le_u32(0x20).map_err(&header)?; // tables start
    let file_size = writer.reserve_u32().map_err(&header)?;
    writer.le_u32(total_slots).map_err(&header)?;
    writer.le_u32(total_slots).map_err(&header)?;
    writer.le_u32(0).map_err(&header)?;

    // slot-table pointer, then an unused second table pointer
    let table_start = writer.position() + 8;
    writer.le_u32(table_start as u32).map_err(&header)?;
    writer.le_u32(0).map_err(&header)?;

    let mut slot_table = Vec::with_capacity(total_slots as usize);
    for _ in 0..total_slots {
        slot_table.push(writer.reserve_u32().map_err(&header)?);
    }

    writer.align(alignment).map_err(&header)?;

    let mut slot_offsets = Vec::with_capacity(total_slots as usize);

    for bank_manifest in &manifest.banks {
        let (head_blob, body_blob) = bank::build(bank_manifest, &mut resolve)
            .map_err(ContainerError::bank_factory(bank_manifest.index))?;
        let chunks = ContainerError::write_factory(ContainerErrorKind::Chunk {
            index: bank_manifest.index,
        });

        slot_offsets.push(writer.position() as u32);
        writer.bytes(&head_blob).map_err(&chunks)?;
        writer.align(alignment).map_err(&chunks)?;

        slot_offsets.push(writer.position() as u32);
        writer.bytes(&body_blob).map_err(&chunks)?;
        writer.align(alignment).map_err(&chunks)?;

        info!(index = bank_manifest.index, "repacked bank");
    }

    let patch = ContainerError::write_factory(ContainerErrorKind::Patch);

    writer.patch_u32(file_size, writer.position() as u32).map_err(&patch)?;
    for (reservation, offset) in slot_table.into_iter().zip(slot_offsets) {
        writer.patch_u32(reservation, offset).map_err(&patch)?;
    }

    Ok(())
}

#[derive(Debug)]
pub(crate) struct ContainerError {
    kind: ContainerErrorKind,
    source: Option<ContainerErrorSource>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ContainerErrorKind {
    Magic,
    UnknownMagic { tag: [u8; 4] },
    SlotCount,
    SlotTable,
    Slot { slot: u32 },
    ChunkTag { slot: u32 },
    Bank { index: u32 },
    Header,
    Chunk { index: u32 },
    Patch,
}

#[derive(Debug)]
enum ContainerErrorSource {
    Read(ReadError),
    Write(WriteError),
    Bank(BankError),
}

impl ContainerError {
    fn new(kind: ContainerErrorKind) -> Self {
        Self { kind, source: None }
    }

    fn read_factory(kind: ContainerErrorKind) -> impl Fn(ReadError) -> Self {
        move |source| Self {
            kind,
            source: Some(ContainerErrorSource::Read(source)),
        }
    }

    fn write_factory(kind: ContainerErrorKind) -> impl Fn(WriteError) -> Self {
        move |source| Self {
            kind,
            source: Some(ContainerErrorSource::Write(source)),
        }
    }

    fn bank_factory(index: u32) -> impl Fn(BankError) -> Self {
        move |source| Self {
            kind: ContainerErrorKind::Bank { index },
            source: Some(ContainerErrorSource::Bank(source)),
        }
    }

    #[cfg(test)]
    pub(crate) fn kind(&self) -> ContainerErrorKind {
        self.kind
    }
}

impl Display for ContainerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        use ContainerErrorKind::*;

        match self.kind {
            Magic => f.write_str("failed to read container signature"),
            UnknownMagic { tag } => f.write_str(&format!(
                "container signature was not recognized ({:02x} {:02x} {:02x} {:02x})",
                tag[0], tag[1], tag[2], tag[3]
            )),
            SlotCount => f.write_str("failed to read slot count"),
            SlotTable => f.write_str("failed to read slot-table address"),
            Slot { slot } => f.write_str(&format!("failed to read slot {slot}")),
            ChunkTag { slot } => {
                f.write_str(&format!("failed to read chunk tag referenced by slot {slot}"))
            }
            Bank { index } => f.write_str(&format!("failed to process bank {index}")),
            Header => f.write_str("failed to write container header"),
            Chunk { index } => f.write_str(&format!("failed to write chunks of bank {index}")),
            Patch => f.write_str("failed to patch container offsets"),
        }
    }
}

impl Error for ContainerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(ContainerErrorSource::Read(e)) => Some(e),
            Some(ContainerErrorSource::Write(e)) => Some(e),
            Some(ContainerErrorSource::Bank(e)) => Some(e),
            None => None,
        }
    }
}
