use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{Error as IoError, ErrorKind, Read, Seek, SeekFrom},
    num::NonZeroUsize,
};

/// Position-tracking reader over a seekable source.
///
/// The archive layouts handled by this crate are offset-table driven, so every
/// record parse starts from an absolute offset resolved out of some table. The
/// `*_at` methods implement that seek-then-read discipline; the cursor methods
/// exist for runs of consecutive fields within one record.
pub(crate) struct Reader<R: Read + Seek> {
    inner: R,
    position: u64,
}

impl<R: Read + Seek> Reader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            inner: reader,
            position: 0,
        }
    }

    fn read_to_array<const LEN: usize>(&mut self, buf: &mut [u8; LEN]) -> ReadResult<()> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.position += n as u64;

                if n == LEN {
                    Ok(())
                } else {
                    Err(self.to_error(ReadErrorKind::Incomplete(Needed::Size(
                        NonZeroUsize::new(LEN - n).expect("n is guaranteed to not equal LEN"),
                    ))))
                }
            }
            Err(e) => match e.kind() {
                // this I/O error is non-fatal, so reading is retried
                ErrorKind::Interrupted => self.read_to_array(buf),
                ErrorKind::UnexpectedEof => {
                    Err(self.to_error(ReadErrorKind::Incomplete(Needed::Unknown)))
                }
                _ => Err(self.to_error_with_source(ReadErrorKind::Failure, e)),
            },
        }
    }

    fn read_to_slice(&mut self, buf: &mut [u8]) -> ReadResult<()> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.position += n as u64;
                let buf_len = buf.len();

                if n == buf_len {
                    Ok(())
                } else {
                    Err(self.to_error(ReadErrorKind::Incomplete(Needed::Size(
                        NonZeroUsize::new(buf_len - n)
                            .expect("n is guaranteed to not equal buf_len"),
                    ))))
                }
            }
            Err(e) => match e.kind() {
                // this I/O error is non-fatal, so reading is retried
                ErrorKind::Interrupted => self.read_to_slice(buf),
                ErrorKind::UnexpectedEof => {
                    Err(self.to_error(ReadErrorKind::Incomplete(Needed::Unknown)))
                }
                _ => Err(self.to_error_with_source(ReadErrorKind::Failure, e)),
            },
        }
    }

    pub(crate) fn seek_to(&mut self, position: u64) -> ReadResult<()> {
        match self.inner.seek(SeekFrom::Start(position)) {
            Ok(pos) => {
                self.position = pos;
                Ok(())
            }
            Err(e) => Err(self.to_error_with_source(ReadErrorKind::Seek, e)),
        }
    }

    pub(crate) fn u8(&mut self) -> ReadResult<u8> {
        let mut buf = [0; 1];
        Self::read_to_array(self, &mut buf)?;
        Ok(buf[0])
    }

    pub(crate) fn le_u16(&mut self) -> ReadResult<u16> {
        let mut buf = [0; 2];
        Self::read_to_array(self, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub(crate) fn le_u32(&mut self) -> ReadResult<u32> {
        let mut buf = [0; 4];
        Self::read_to_array(self, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a 4-byte tag in file order, suitable for comparison against
    /// big-endian ASCII tag constants like `KWB2`.
    pub(crate) fn tag(&mut self) -> ReadResult<[u8; 4]> {
        let mut buf = [0; 4];
        Self::read_to_array(self, &mut buf)?;
        Ok(buf)
    }

    pub(crate) fn take(&mut self, len: usize) -> ReadResult<Vec<u8>> {
        let mut buf = vec![0; len];
        Self::read_to_slice(self, &mut buf)?;
        Ok(buf)
    }

    pub(crate) fn u8_at(&mut self, position: u64) -> ReadResult<u8> {
        self.seek_to(position)?;
        self.u8()
    }

    pub(crate) fn le_u16_at(&mut self, position: u64) -> ReadResult<u16> {
        self.seek_to(position)?;
        self.le_u16()
    }

    pub(crate) fn le_u32_at(&mut self, position: u64) -> ReadResult<u32> {
        self.seek_to(position)?;
        self.le_u32()
    }

    pub(crate) fn tag_at(&mut self, position: u64) -> ReadResult<[u8; 4]> {
        self.seek_to(position)?;
        self.tag()
    }

    pub(crate) fn take_at(&mut self, position: u64, len: usize) -> ReadResult<Vec<u8>> {
        self.seek_to(position)?;
        self.take(len)
    }
}

pub(crate) type ReadResult<T> = Result<T, ReadError>;

#[derive(Debug)]
pub(crate) struct ReadError {
    position: u64,
    kind: ReadErrorKind,
    source: Option<IoError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReadErrorKind {
    Failure,
    Seek,
    Incomplete(Needed),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Needed {
    Size(NonZeroUsize),
    Unknown,
}

impl<R: Read + Seek> Reader<R> {
    fn to_error(&self, kind: ReadErrorKind) -> ReadError {
        ReadError {
            position: self.position,
            kind,
            source: None,
        }
    }

    fn to_error_with_source(&self, kind: ReadErrorKind, source: IoError) -> ReadError {
        ReadError {
            position: self.position,
            kind,
            source: Some(source),
        }
    }
}

#[cfg(test)]
impl ReadError {
    pub(crate) fn is_kind(&self, kind: ReadErrorKind) -> bool {
        self.kind == kind
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ReadErrorKind::Failure => f.write_str("failed to read data due to I/O error"),
            ReadErrorKind::Seek => f.write_str("failed to seek to absolute offset"),
            ReadErrorKind::Incomplete(needed) => match needed {
                Needed::Size(size) => {
                    f.write_str(&format!("incomplete data: needed {size} more bytes to read"))
                }
                Needed::Unknown => f.write_str("incomplete data"),
            },
        }?;

        f.write_str(&format!(" - byte position {}", self.position))
    }
}

impl Error for ReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.source {
            Some(e) => Some(e),
            None => None,
        }
    }
}
