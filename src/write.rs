use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{Error as IoError, Seek, SeekFrom, Write},
};

/// Position-tracking writer over a seekable sink.
///
/// Container rebuilds need sizes and table entries that are only known after
/// later data has been laid out. `reserve_u32` writes a zero placeholder and
/// remembers where it went; `patch_u32` seeks back, overwrites it, and
/// restores the cursor. `align` zero-pads to a power-of-two boundary.
pub(crate) struct Writer<W: Write + Seek> {
    inner: W,
    position: u64,
}

/// The absolute position of a placeholder written by [`Writer::reserve_u32`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct Reservation(u64);

impl<W: Write + Seek> Writer<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self {
            inner: writer,
            position: 0,
        }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn bytes(&mut self, buf: &[u8]) -> WriteResult<()> {
        match self.inner.write_all(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(())
            }
            Err(e) => Err(self.to_error(WriteErrorKind::Failure, e)),
        }
    }

    pub(crate) fn u8(&mut self, value: u8) -> WriteResult<()> {
        self.bytes(&[value])
    }

    pub(crate) fn le_u16(&mut self, value: u16) -> WriteResult<()> {
        self.bytes(&value.to_le_bytes())
    }

    pub(crate) fn le_u32(&mut self, value: u32) -> WriteResult<()> {
        self.bytes(&value.to_le_bytes())
    }

    pub(crate) fn le_i16(&mut self, value: i16) -> WriteResult<()> {
        self.bytes(&value.to_le_bytes())
    }

    /// Writes a 4-byte tag in file order (big-endian ASCII, e.g. `XWSF`).
    pub(crate) fn tag(&mut self, value: [u8; 4]) -> WriteResult<()> {
        self.bytes(&value)
    }

    pub(crate) fn zeros(&mut self, len: usize) -> WriteResult<()> {
        self.bytes(&vec![0; len])
    }

    /// Writes a placeholder zero and records its position for later patching.
    pub(crate) fn reserve_u32(&mut self) -> WriteResult<Reservation> {
        let reservation = Reservation(self.position);
        self.le_u32(0)?;
        Ok(reservation)
    }

    /// Overwrites a reserved slot and returns the cursor to where it was.
    pub(crate) fn patch_u32(&mut self, reservation: Reservation, value: u32) -> WriteResult<()> {
        let saved = self.position;

        self.seek_to(reservation.0)?;
        self.le_u32(value)?;
        self.seek_to(saved)
    }

    /// Zero-pads until the position is a multiple of `boundary`.
    pub(crate) fn align(&mut self, boundary: u64) -> WriteResult<()> {
        debug_assert!(boundary.is_power_of_two());

        let rem = self.position % boundary;
        if rem != 0 {
            self.zeros((boundary - rem) as usize)?;
        }
        Ok(())
    }

    fn seek_to(&mut self, position: u64) -> WriteResult<()> {
        match self.inner.seek(SeekFrom::Start(position)) {
            Ok(pos) => {
                self.position = pos;
                Ok(())
            }
            Err(e) => Err(self.to_error(WriteErrorKind::Seek, e)),
        }
    }

    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}

pub(crate) type WriteResult<T> = Result<T, WriteError>;

#[derive(Debug)]
pub(crate) struct WriteError {
    position: u64,
    kind: WriteErrorKind,
    source: IoError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WriteErrorKind {
    Failure,
    Seek,
}

impl<W: Write + Seek> Writer<W> {
    fn to_error(&self, kind: WriteErrorKind, source: IoError) -> WriteError {
        WriteError {
            position: self.position,
            kind,
            source,
        }
    }
}

impl Display for WriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            WriteErrorKind::Failure => f.write_str("failed to write data due to I/O error"),
            WriteErrorKind::Seek => f.write_str("failed to seek to patch position"),
        }?;

        f.write_str(&format!(" - byte position {}", self.position))
    }
}

impl Error for WriteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod test {
    use super::Writer;
    use std::io::Cursor;

    #[test]
    fn write_primitives() {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer.tag(*b"XWSF").unwrap();
        writer.u8(0xAB).unwrap();
        writer.le_u16(0x1234).unwrap();
        writer.le_u32(0x0567_89AB).unwrap();
        writer.le_i16(-2).unwrap();

        assert_eq!(writer.position(), 13);
        assert_eq!(
            writer.into_inner().into_inner(),
            b"XWSF\xAB\x34\x12\xAB\x89\x67\x05\xFE\xFF"
        );
    }

    #[test]
    fn reserve_then_patch() {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer.tag(*b"RIFF").unwrap();
        let size = writer.reserve_u32().unwrap();
        writer.bytes(b"WAVEdata").unwrap();

        let end = writer.position();
        writer.patch_u32(size, (end - 8) as u32).unwrap();

        // the cursor is restored after patching
        assert_eq!(writer.position(), end);
        assert_eq!(writer.into_inner().into_inner(), b"RIFF\x08\x00\x00\x00WAVEdata");
    }

    #[test]
    fn align_pads_with_zeros() {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer.bytes(b"abc").unwrap();
        writer.align(8).unwrap();
        assert_eq!(writer.position(), 8);

        // already aligned: no padding
        writer.align(8).unwrap();
        assert_eq!(writer.position(), 8);

        assert_eq!(writer.into_inner().into_inner(), b"abc\x00\x00\x00\x00\x00");
    }

    #[test]
    fn align_to_sector_boundary() {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer.bytes(&[1; 0x801]).unwrap();
        writer.align(0x800).unwrap();

        assert_eq!(writer.position(), 0x1000);
    }
}
