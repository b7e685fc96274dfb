//! Where upload bytes come from, and how they are cut into parts.

use super::{MAX_MULTIPART_COUNT, MAX_OBJECT_SIZE, MAX_PART_SIZE, MIN_PART_SIZE};
use crate::error::{RequestError, S3Error, TransferError};
use bytes::Bytes;
use std::fmt;
use std::path::Path;
use tokio::io::AsyncRead;

/// Data to upload.
pub enum PartSource {
    /// In-memory bytes. Parts are zero-copy slices.
    Bytes(Bytes),
    /// A seekable file and the number of bytes to send from its current
    /// position.
    File {
        /// Open file.
        file: tokio::fs::File,
        /// Bytes to send.
        len: u64,
    },
    /// Any async reader, of known or unknown length.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl PartSource {
    /// Upload from memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        PartSource::Bytes(data.into())
    }

    /// Open a file and upload all of it.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, S3Error> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let len = file.metadata().await?.len();
        Ok(PartSource::File { file, len })
    }

    /// Upload from a reader.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        PartSource::Stream(Box::new(reader))
    }

    /// The size the source itself knows, if any.
    pub fn known_size(&self) -> Option<u64> {
        match self {
            PartSource::Bytes(bytes) => Some(bytes.len() as u64),
            PartSource::File { len, .. } => Some(*len),
            PartSource::Stream(_) => None,
        }
    }
}

impl fmt::Debug for PartSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartSource::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            PartSource::File { len, .. } => f.debug_struct("File").field("len", len).finish(),
            PartSource::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for PartSource {
    fn from(bytes: Bytes) -> Self {
        PartSource::Bytes(bytes)
    }
}

impl From<Vec<u8>> for PartSource {
    fn from(data: Vec<u8>) -> Self {
        PartSource::Bytes(Bytes::from(data))
    }
}

/// Part size and, for a known object size, part count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSizing {
    /// Bytes per part; the last part may be shorter.
    pub part_size: u64,
    /// Number of parts, when the object size is known.
    pub part_count: Option<u32>,
}

impl PartSizing {
    /// Work out part size and count.
    ///
    /// Without an explicit part size, the smallest multiple of
    /// `MIN_PART_SIZE` that keeps the object within `MAX_MULTIPART_COUNT`
    /// parts is used. An unknown size is treated as `MAX_OBJECT_SIZE`.
    pub fn compute(object_size: Option<u64>, part_size: Option<u64>) -> Result<Self, S3Error> {
        if let Some(size) = object_size {
            if size > MAX_OBJECT_SIZE {
                return Err(S3Error::Request(RequestError::EntityTooLarge {
                    size,
                    max_size: MAX_OBJECT_SIZE,
                }));
            }
        }

        let part_size = match part_size {
            Some(size) => {
                if !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&size) {
                    return Err(S3Error::Request(RequestError::InvalidPartSize {
                        size,
                        min_size: MIN_PART_SIZE,
                        max_size: MAX_PART_SIZE,
                    }));
                }
                size
            }
            None => {
                let size = object_size.unwrap_or(MAX_OBJECT_SIZE);
                let raw = size.div_ceil(MAX_MULTIPART_COUNT as u64);
                raw.div_ceil(MIN_PART_SIZE).max(1) * MIN_PART_SIZE
            }
        };

        let part_count = match object_size {
            Some(size) => {
                let count = size.div_ceil(part_size).max(1);
                if count > MAX_MULTIPART_COUNT as u64 {
                    return Err(S3Error::Transfer(TransferError::PartCountExceeded {
                        max: MAX_MULTIPART_COUNT,
                    }));
                }
                Some(count as u32)
            }
            None => None,
        };

        Ok(Self {
            part_size,
            part_count,
        })
    }

    /// Length of part `part_number` (1-based) for an object of `object_size`.
    pub fn part_len(&self, object_size: u64, part_number: u32) -> u64 {
        let start = (part_number as u64 - 1) * self.part_size;
        object_size.saturating_sub(start).min(self.part_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const MIB: u64 = 1024 * 1024;

    #[test_case(Some(12 * MIB), Some(5 * MIB), 5 * MIB, Some(3) ; "twelve mib in fives")]
    #[test_case(Some(0), Some(5 * MIB), 5 * MIB, Some(1) ; "empty object is one part")]
    #[test_case(Some(10 * MIB), Some(5 * MIB), 5 * MIB, Some(2) ; "exact multiple")]
    #[test_case(Some(100 * MIB), None, 5 * MIB, Some(20) ; "auto size for small object")]
    #[test_case(None, Some(5 * MIB), 5 * MIB, None ; "unknown size keeps explicit part size")]
    #[test_case(None, None, 550_502_400, None ; "unknown size spreads max object over max parts")]
    fn test_compute(
        size: Option<u64>,
        part_size: Option<u64>,
        expected_size: u64,
        expected_count: Option<u32>,
    ) {
        let sizing = PartSizing::compute(size, part_size).unwrap();
        assert_eq!(sizing.part_size, expected_size);
        assert_eq!(sizing.part_count, expected_count);
    }

    #[test]
    fn test_auto_size_for_max_object_fits_count() {
        let sizing = PartSizing::compute(Some(MAX_OBJECT_SIZE), None).unwrap();
        assert_eq!(sizing.part_size % MIN_PART_SIZE, 0);
        assert!(sizing.part_count.unwrap() <= MAX_MULTIPART_COUNT);
    }

    #[test]
    fn test_rejects_small_part_size() {
        let err = PartSizing::compute(Some(10 * MIB), Some(MIB)).unwrap_err();
        assert!(matches!(
            err,
            S3Error::Request(RequestError::InvalidPartSize { .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_object() {
        let err = PartSizing::compute(Some(MAX_OBJECT_SIZE + 1), None).unwrap_err();
        assert!(matches!(
            err,
            S3Error::Request(RequestError::EntityTooLarge { .. })
        ));
    }

    #[test]
    fn test_rejects_too_many_parts() {
        let err = PartSizing::compute(Some(MIN_PART_SIZE * 10_001), Some(MIN_PART_SIZE))
            .unwrap_err();
        assert!(matches!(
            err,
            S3Error::Transfer(TransferError::PartCountExceeded { max: 10_000 })
        ));
    }

    #[test]
    fn test_part_len() {
        let sizing = PartSizing::compute(Some(12 * MIB), Some(5 * MIB)).unwrap();
        let lens: Vec<u64> = (1..=3).map(|n| sizing.part_len(12 * MIB, n)).collect();
        assert_eq!(lens, vec![5 * MIB, 5 * MIB, 2 * MIB]);
    }

    #[test]
    fn test_known_size() {
        assert_eq!(PartSource::from_bytes(vec![0u8; 3]).known_size(), Some(3));
        assert_eq!(
            PartSource::from_reader(std::io::Cursor::new(vec![0u8; 3])).known_size(),
            None
        );
    }
}
