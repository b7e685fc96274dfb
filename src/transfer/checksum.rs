//! Running digests over part and object bytes.

use crate::error::{S3Error, TransferError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

const DIGEST_CHUNK: usize = 64 * 1024;

/// Digest algorithms that can be attached to uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    /// MD5, sent as `Content-MD5`.
    Md5,
    /// SHA-256.
    Sha256,
    /// CRC32C (Castagnoli).
    Crc32c,
}

impl ChecksumAlgorithm {
    /// Header carrying this digest.
    pub fn header_name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "content-md5",
            ChecksumAlgorithm::Sha256 => "x-amz-checksum-sha256",
            ChecksumAlgorithm::Crc32c => "x-amz-checksum-crc32c",
        }
    }

    /// Whether this is a CRC, the only kind a full-object checksum can use.
    pub fn is_crc(&self) -> bool {
        matches!(self, ChecksumAlgorithm::Crc32c)
    }

    /// Whether S3 stores this digest with the object, as opposed to only
    /// checking it on receipt.
    pub fn is_stored(&self) -> bool {
        self.as_s3_name().is_some()
    }

    /// Value of `x-amz-checksum-algorithm`, for algorithms S3 stores.
    pub fn as_s3_name(&self) -> Option<&'static str> {
        match self {
            ChecksumAlgorithm::Md5 => None,
            ChecksumAlgorithm::Sha256 => Some("SHA256"),
            ChecksumAlgorithm::Crc32c => Some("CRC32C"),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumAlgorithm::Md5 => f.write_str("MD5"),
            ChecksumAlgorithm::Sha256 => f.write_str("SHA256"),
            ChecksumAlgorithm::Crc32c => f.write_str("CRC32C"),
        }
    }
}

impl std::str::FromStr for ChecksumAlgorithm {
    type Err = S3Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(ChecksumAlgorithm::Md5),
            "SHA256" | "SHA-256" => Ok(ChecksumAlgorithm::Sha256),
            "CRC32C" => Ok(ChecksumAlgorithm::Crc32c),
            _ => Err(S3Error::Request(crate::error::RequestError::Validation {
                message: format!("Unsupported checksum algorithm: {}", s),
            })),
        }
    }
}

/// Scope of the computed digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumMode {
    /// One digest per part, sent with that part.
    #[default]
    PerPart,
    /// CRC digests also run over the whole object and are sent with the
    /// completion call. Parts still carry their own digests.
    FullObject,
}

/// Base64 digests of one part or object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartChecksums {
    /// MD5.
    pub md5: Option<String>,
    /// SHA-256.
    pub sha256: Option<String>,
    /// CRC32C, big-endian.
    pub crc32c: Option<String>,
}

impl PartChecksums {
    /// True when no digest was computed.
    pub fn is_empty(&self) -> bool {
        self.md5.is_none() && self.sha256.is_none() && self.crc32c.is_none()
    }

    /// Write the digests as request headers.
    pub fn apply_headers(&self, headers: &mut HashMap<String, String>) {
        let pairs = [
            (ChecksumAlgorithm::Md5, &self.md5),
            (ChecksumAlgorithm::Sha256, &self.sha256),
            (ChecksumAlgorithm::Crc32c, &self.crc32c),
        ];
        for (algorithm, value) in pairs {
            if let Some(value) = value {
                headers.insert(algorithm.header_name().to_string(), value.clone());
            }
        }
    }

    /// The digests as request headers.
    pub fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        self.apply_headers(&mut headers);
        headers
    }

    /// The digests as whole-object headers for a completion call.
    pub fn full_object_headers(&self) -> HashMap<String, String> {
        let mut headers = self.headers();
        headers.insert("x-amz-checksum-type".to_string(), "FULL_OBJECT".to_string());
        headers
    }
}

enum Hasher {
    Md5(Md5),
    Sha256(Sha256),
    Crc32c(u32),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            ChecksumAlgorithm::Crc32c => Hasher::Crc32c(0),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Crc32c(crc) => *crc = crc32c::crc32c_append(*crc, data),
        }
    }

    /// Write the digest into `out` and reset.
    fn finish_into(&mut self, out: &mut PartChecksums) {
        match self {
            Hasher::Md5(h) => out.md5 = Some(STANDARD.encode(h.finalize_reset())),
            Hasher::Sha256(h) => out.sha256 = Some(STANDARD.encode(h.finalize_reset())),
            Hasher::Crc32c(crc) => {
                out.crc32c = Some(STANDARD.encode(crc.to_be_bytes()));
                *crc = 0;
            }
        }
    }
}

/// Computes every configured digest in one pass over the bytes.
///
/// Part state resets at each `finish_part`. In full-object mode the CRC
/// algorithms also keep a second state that carries across parts, read
/// with `finish_object`.
pub struct ChecksumAccumulator {
    algorithms: Vec<ChecksumAlgorithm>,
    mode: ChecksumMode,
    part: Vec<Hasher>,
    object: Vec<Hasher>,
}

impl ChecksumAccumulator {
    /// Create an accumulator for `algorithms`.
    pub fn new(algorithms: &[ChecksumAlgorithm], mode: ChecksumMode) -> Self {
        let mut unique: Vec<ChecksumAlgorithm> = Vec::with_capacity(algorithms.len());
        for algorithm in algorithms {
            if !unique.contains(algorithm) {
                unique.push(*algorithm);
            }
        }

        let part = unique.iter().map(|a| Hasher::new(*a)).collect();
        let object = match mode {
            ChecksumMode::PerPart => Vec::new(),
            ChecksumMode::FullObject => unique
                .iter()
                .filter(|a| a.is_crc())
                .map(|a| Hasher::new(*a))
                .collect(),
        };

        Self {
            algorithms: unique,
            mode,
            part,
            object,
        }
    }

    /// An accumulator that computes nothing.
    pub fn disabled() -> Self {
        Self::new(&[], ChecksumMode::PerPart)
    }

    /// Configured algorithms, deduplicated.
    pub fn algorithms(&self) -> &[ChecksumAlgorithm] {
        &self.algorithms
    }

    /// Configured mode.
    pub fn mode(&self) -> ChecksumMode {
        self.mode
    }

    /// True when at least one digest is computed.
    pub fn is_enabled(&self) -> bool {
        !self.algorithms.is_empty()
    }

    /// Feed bytes to every running digest.
    pub fn update(&mut self, data: &[u8]) {
        for hasher in self.part.iter_mut().chain(self.object.iter_mut()) {
            hasher.update(data);
        }
    }

    /// Digests of the bytes since the last call, then reset the part state.
    pub fn finish_part(&mut self) -> PartChecksums {
        let mut out = PartChecksums::default();
        for hasher in &mut self.part {
            hasher.finish_into(&mut out);
        }
        out
    }

    /// The whole-object CRC digests, in full-object mode.
    pub fn finish_object(&mut self) -> Option<PartChecksums> {
        if self.mode != ChecksumMode::FullObject || self.object.is_empty() {
            return None;
        }
        let mut out = PartChecksums::default();
        for hasher in &mut self.object {
            hasher.finish_into(&mut out);
        }
        Some(out)
    }

    /// Headers for opening a multipart upload whose parts carry S3-stored
    /// checksums.
    pub fn create_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        let stored = self.algorithms.iter().filter(|a| match self.mode {
            ChecksumMode::PerPart => a.is_stored(),
            ChecksumMode::FullObject => a.is_crc(),
        });
        if let Some(name) = stored.filter_map(|a| a.as_s3_name()).next() {
            headers.insert("x-amz-checksum-algorithm".to_string(), name.to_string());
            if self.mode == ChecksumMode::FullObject {
                headers.insert("x-amz-checksum-type".to_string(), "FULL_OBJECT".to_string());
            }
        }
        headers
    }

    /// Headers for the completion call.
    pub fn complete_headers(&mut self) -> HashMap<String, String> {
        self.finish_object()
            .map(|digests| digests.full_object_headers())
            .unwrap_or_default()
    }
}

impl fmt::Debug for ChecksumAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumAccumulator")
            .field("algorithms", &self.algorithms)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Digest the next `len` bytes of `reader`, then seek back to where it was.
///
/// The bytes are fed to `accumulator` and the part digests returned, so the
/// same bytes can be read again for sending.
pub async fn digest_range<R>(
    reader: &mut R,
    len: u64,
    accumulator: &mut ChecksumAccumulator,
) -> Result<PartChecksums, S3Error>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let start = reader.stream_position().await?;
    let mut chunk = vec![0u8; DIGEST_CHUNK.min(len as usize).max(1)];
    let mut remaining = len;

    while remaining > 0 {
        let want = remaining.min(chunk.len() as u64) as usize;
        let n = reader.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(S3Error::Transfer(TransferError::InsufficientData {
                expected: len,
                received: len - remaining,
            }));
        }
        accumulator.update(&chunk[..n]);
        remaining -= n as u64;
    }

    reader.seek(SeekFrom::Start(start)).await?;
    Ok(accumulator.finish_part())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_known_digests() {
        let mut acc = ChecksumAccumulator::new(
            &[
                ChecksumAlgorithm::Md5,
                ChecksumAlgorithm::Sha256,
                ChecksumAlgorithm::Crc32c,
            ],
            ChecksumMode::PerPart,
        );
        acc.update(b"hello ");
        acc.update(b"world");
        let digests = acc.finish_part();

        assert_eq!(digests.md5.as_deref(), Some("XrY7u+Ae7tCTyyK7j1rNww=="));
        assert_eq!(
            digests.sha256.as_deref(),
            Some("uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=")
        );
        // CRC32C("hello world") = 0xc99465aa
        assert_eq!(
            digests.crc32c.as_deref(),
            Some(STANDARD.encode(0xc994_65aa_u32.to_be_bytes()).as_str())
        );
    }

    #[test]
    fn test_per_part_resets() {
        let mut acc = ChecksumAccumulator::new(&[ChecksumAlgorithm::Md5], ChecksumMode::PerPart);
        acc.update(b"first");
        let first = acc.finish_part();
        acc.update(b"first");
        let again = acc.finish_part();
        assert_eq!(first, again);
        assert!(acc.finish_object().is_none());
    }

    #[test]
    fn test_full_object_carries_across_parts() {
        let mut split = ChecksumAccumulator::new(
            &[ChecksumAlgorithm::Crc32c],
            ChecksumMode::FullObject,
        );
        split.update(b"hello ");
        let first = split.finish_part();
        split.update(b"world");
        let second = split.finish_part();

        let crc_of = |data: &[u8]| Some(STANDARD.encode(crc32c::crc32c(data).to_be_bytes()));
        assert_eq!(first.crc32c, crc_of("hello ".as_bytes()));
        assert_eq!(second.crc32c, crc_of("world".as_bytes()));
        assert_eq!(
            split.finish_object().unwrap().crc32c,
            crc_of("hello world".as_bytes())
        );
    }

    #[test]
    fn test_full_object_keeps_part_digests() {
        let mut acc = ChecksumAccumulator::new(
            &[ChecksumAlgorithm::Crc32c, ChecksumAlgorithm::Md5],
            ChecksumMode::FullObject,
        );
        acc.update(b"hello ");
        let first = acc.finish_part();
        acc.update(b"world");
        let second = acc.finish_part();

        let mut md5 = ChecksumAccumulator::new(&[ChecksumAlgorithm::Md5], ChecksumMode::PerPart);
        md5.update(b"world");
        assert!(first.md5.is_some() && first.crc32c.is_some());
        assert_eq!(second.md5, md5.finish_part().md5);

        let object = acc.finish_object().unwrap();
        assert!(object.md5.is_none());
        assert_eq!(
            object.crc32c,
            Some(STANDARD.encode(0xc994_65aa_u32.to_be_bytes()))
        );

        let create = acc.create_headers();
        assert_eq!(
            create.get("x-amz-checksum-algorithm").map(String::as_str),
            Some("CRC32C")
        );
    }

    #[test]
    fn test_headers() {
        let mut acc = ChecksumAccumulator::new(
            &[ChecksumAlgorithm::Crc32c, ChecksumAlgorithm::Crc32c],
            ChecksumMode::FullObject,
        );
        assert_eq!(acc.algorithms(), &[ChecksumAlgorithm::Crc32c]);

        let create = acc.create_headers();
        assert_eq!(
            create.get("x-amz-checksum-algorithm").map(String::as_str),
            Some("CRC32C")
        );
        assert_eq!(
            create.get("x-amz-checksum-type").map(String::as_str),
            Some("FULL_OBJECT")
        );

        acc.update(b"data");
        let complete = acc.complete_headers();
        assert!(complete.contains_key("x-amz-checksum-crc32c"));
        assert_eq!(
            complete.get("x-amz-checksum-type").map(String::as_str),
            Some("FULL_OBJECT")
        );
    }

    #[test]
    fn test_md5_only_needs_no_create_headers() {
        let acc = ChecksumAccumulator::new(&[ChecksumAlgorithm::Md5], ChecksumMode::PerPart);
        assert!(acc.create_headers().is_empty());
    }

    #[tokio::test]
    async fn test_digest_range_seeks_back() {
        let mut cursor = Cursor::new(b"0123456789".to_vec());
        cursor.set_position(2);
        let mut acc = ChecksumAccumulator::new(&[ChecksumAlgorithm::Md5], ChecksumMode::PerPart);

        let digests = digest_range(&mut cursor, 4, &mut acc).await.unwrap();

        let mut expected =
            ChecksumAccumulator::new(&[ChecksumAlgorithm::Md5], ChecksumMode::PerPart);
        expected.update(b"2345");
        assert_eq!(digests, expected.finish_part());
        assert_eq!(cursor.position(), 2);
    }

    #[tokio::test]
    async fn test_digest_range_short_source() {
        let mut cursor = Cursor::new(b"0123".to_vec());
        let mut acc = ChecksumAccumulator::new(&[ChecksumAlgorithm::Md5], ChecksumMode::PerPart);

        let err = digest_range(&mut cursor, 8, &mut acc).await.unwrap_err();
        assert!(matches!(
            err,
            S3Error::Transfer(TransferError::InsufficientData {
                expected: 8,
                received: 4
            })
        ));
    }
}
