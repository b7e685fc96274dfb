//! Cuts a `PartSource` into numbered parts.

use super::checksum::{digest_range, ChecksumAccumulator, PartChecksums};
use super::source::{PartSizing, PartSource};
use super::{PartChunk, MAX_MULTIPART_COUNT};
use crate::error::{S3Error, TransferError};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 256 * 1024;

enum Input {
    Bytes(Bytes),
    File(tokio::fs::File),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

/// Produces parts of `part_size` bytes (the last one shorter) and never
/// reads past a declared object size.
///
/// With an unknown size, one byte of look-ahead decides whether a full part
/// is also the last.
pub struct PartReader {
    input: Input,
    object_size: Option<u64>,
    sizing: PartSizing,
    accumulator: ChecksumAccumulator,
    next_part: u32,
    bytes_read: u64,
    lookahead: Option<u8>,
    finished: bool,
}

impl PartReader {
    /// Create a reader.
    ///
    /// `object_size` overrides the size the source knows; `part_size` of
    /// `None` picks one automatically.
    pub fn new(
        source: PartSource,
        object_size: Option<u64>,
        part_size: Option<u64>,
        accumulator: ChecksumAccumulator,
    ) -> Result<Self, S3Error> {
        let object_size = object_size.or_else(|| source.known_size());
        let sizing = PartSizing::compute(object_size, part_size)?;
        let input = match source {
            PartSource::Bytes(bytes) => Input::Bytes(bytes),
            PartSource::File { file, .. } => Input::File(file),
            PartSource::Stream(stream) => Input::Stream(stream),
        };

        Ok(Self {
            input,
            object_size,
            sizing,
            accumulator,
            next_part: 1,
            bytes_read: 0,
            lookahead: None,
            finished: false,
        })
    }

    /// Bytes per part.
    pub fn part_size(&self) -> u64 {
        self.sizing.part_size
    }

    /// Number of parts, when the object size is known.
    pub fn part_count(&self) -> Option<u32> {
        self.sizing.part_count
    }

    /// Declared object size.
    pub fn object_size(&self) -> Option<u64> {
        self.object_size
    }

    /// Bytes handed out so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// True once the last part was returned.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// False for in-memory sources, which never fill the caller's buffer.
    pub fn reads_into_buffer(&self) -> bool {
        !matches!(self.input, Input::Bytes(_))
    }

    /// The running digests.
    pub fn accumulator_mut(&mut self) -> &mut ChecksumAccumulator {
        &mut self.accumulator
    }

    /// Read the next part, or `None` after the last one.
    ///
    /// Stream and file bytes land in `buf`; in-memory sources are sliced
    /// without copying and leave `buf` untouched.
    pub async fn read(&mut self, buf: &mut BytesMut) -> Result<Option<PartChunk>, S3Error> {
        if self.finished {
            return Ok(None);
        }
        let part_number = self.next_part;

        let (data, checksums, is_last) = match self.object_size {
            Some(size) => {
                let want = self.sizing.part_len(size, part_number);
                let (data, checksums) = self.read_exact_part(want, buf).await?;
                if (data.len() as u64) < want {
                    return Err(S3Error::Transfer(TransferError::InsufficientData {
                        expected: size,
                        received: self.bytes_read + data.len() as u64,
                    }));
                }
                let is_last = Some(part_number) == self.sizing.part_count;
                (data, checksums, is_last)
            }
            None => {
                let (data, checksums) = self.read_exact_part(self.sizing.part_size, buf).await?;
                let is_last = (data.len() as u64) < self.sizing.part_size || !self.peek().await?;
                if !is_last && part_number >= MAX_MULTIPART_COUNT {
                    return Err(S3Error::Transfer(TransferError::PartCountExceeded {
                        max: MAX_MULTIPART_COUNT,
                    }));
                }
                (data, checksums, is_last)
            }
        };

        self.bytes_read += data.len() as u64;
        self.next_part += 1;
        self.finished = is_last;

        Ok(Some(PartChunk {
            part_number,
            data,
            checksums,
            is_last,
        }))
    }

    /// Read up to `want` bytes and digest them. Short only at end of input.
    async fn read_exact_part(
        &mut self,
        want: u64,
        buf: &mut BytesMut,
    ) -> Result<(Bytes, PartChecksums), S3Error> {
        match &mut self.input {
            Input::Bytes(bytes) => {
                let start = (self.bytes_read as usize).min(bytes.len());
                let end = (self.bytes_read.saturating_add(want) as usize).min(bytes.len());
                let data = bytes.slice(start..end);
                self.accumulator.update(&data);
                Ok((data, self.accumulator.finish_part()))
            }
            Input::File(file) => {
                let checksums = if self.accumulator.is_enabled() {
                    let bytes_read = self.bytes_read;
                    let expected = self.object_size.unwrap_or_default();
                    digest_range(file, want, &mut self.accumulator)
                        .await
                        .map_err(|e| match e {
                            S3Error::Transfer(TransferError::InsufficientData {
                                received, ..
                            }) => S3Error::Transfer(TransferError::InsufficientData {
                                expected,
                                received: bytes_read + received,
                            }),
                            other => other,
                        })?
                } else {
                    PartChecksums::default()
                };
                buf.clear();
                fill(file, buf, want as usize).await?;
                Ok((buf.split().freeze(), checksums))
            }
            Input::Stream(stream) => {
                buf.clear();
                if let Some(byte) = self.lookahead.take() {
                    buf.put_u8(byte);
                }
                fill(stream.as_mut(), buf, want as usize).await?;
                let data = buf.split().freeze();
                self.accumulator.update(&data);
                Ok((data, self.accumulator.finish_part()))
            }
        }
    }

    /// True if at least one more byte follows. The byte is kept for the next
    /// part.
    async fn peek(&mut self) -> Result<bool, S3Error> {
        let mut byte = [0u8; 1];
        let n = match &mut self.input {
            Input::Bytes(bytes) => return Ok((self.bytes_read as usize) < bytes.len()),
            Input::File(file) => file.read(&mut byte).await?,
            Input::Stream(stream) => stream.read(&mut byte).await?,
        };
        if n == 0 {
            return Ok(false);
        }
        self.lookahead = Some(byte[0]);
        Ok(true)
    }
}

/// Read into `buf` until it holds `want` bytes or the input ends.
async fn fill<R>(reader: &mut R, buf: &mut BytesMut, want: usize) -> Result<(), S3Error>
where
    R: AsyncRead + Unpin + ?Sized,
{
    while buf.len() < want {
        let step = (want - buf.len()).min(READ_CHUNK);
        buf.reserve(step);
        let n = (&mut *reader).take(step as u64).read_buf(buf).await?;
        if n == 0 {
            break;
        }
    }
    Ok(())
}

impl std::fmt::Debug for PartReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartReader")
            .field("object_size", &self.object_size)
            .field("sizing", &self.sizing)
            .field("next_part", &self.next_part)
            .field("bytes_read", &self.bytes_read)
            .field("finished", &self.finished)
            .finish()
    }
}
