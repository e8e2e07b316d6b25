use std::collections::HashMap;

/// A region of a bank's body blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StreamRef {
    pub(crate) offset: u32,
    pub(crate) len: u32,
}

/// Content-addressed accumulator for a bank's audio data.
///
/// Streams are keyed by the MD5 digest of their raw bytes, so identical
/// streams across any number of subsounds occupy exactly one region of the
/// rebuilt body blob. One builder lives for exactly one bank's rebuild;
/// nothing is shared across banks.
pub(crate) struct BlobBuilder {
    data: Vec<u8>,
    regions: HashMap<[u8; 16], StreamRef>,
}

impl BlobBuilder {
    pub(crate) fn new() -> Self {
        Self {
            data: Vec::new(),
            regions: HashMap::new(),
        }
    }

    /// Returns the region holding `bytes`, appending them only if no
    /// identical stream has been inserted before.
    pub(crate) fn insert(&mut self, bytes: &[u8]) -> StreamRef {
        let digest = *md5::compute(bytes);

        if let Some(&existing) = self.regions.get(&digest) {
            return existing;
        }

        let region = StreamRef {
            offset: self.data.len() as u32,
            len: bytes.len() as u32,
        };
        self.data.extend_from_slice(bytes);
        let _ = self.regions.insert(digest, region);

        region
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod test {
    use super::{BlobBuilder, StreamRef};

    #[test]
    fn identical_streams_share_one_region() {
        let mut builder = BlobBuilder::new();

        let first = builder.insert(b"abcdef");
        let repeat = builder.insert(b"abcdef");

        assert_eq!(first, StreamRef { offset: 0, len: 6 });
        assert_eq!(repeat, first);
        assert_eq!(builder.into_bytes(), b"abcdef");
    }

    #[test]
    fn distinct_streams_never_alias() {
        let mut builder = BlobBuilder::new();

        let first = builder.insert(b"aaaa");
        let second = builder.insert(b"bbbb");
        let third = builder.insert(b"aaaa");

        assert_eq!(first, StreamRef { offset: 0, len: 4 });
        assert_eq!(second, StreamRef { offset: 4, len: 4 });
        assert_eq!(third, first);
        assert_eq!(builder.into_bytes(), b"aaaabbbb");
    }

    #[test]
    fn empty_streams_are_deduplicated_too() {
        let mut builder = BlobBuilder::new();

        let _ = builder.insert(b"xy");
        let empty = builder.insert(b"");

        assert_eq!(empty, StreamRef { offset: 2, len: 0 });
        assert_eq!(builder.insert(b""), empty);
        assert_eq!(builder.into_bytes(), b"xy");
    }
}
