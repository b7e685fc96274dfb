//! Multipart transfers: splitting a source into parts, uploading them
//! sequentially or through a worker pool, and composing objects by
//! server-side copy.

pub mod checksum;
pub mod compose;
pub mod coordinator;
pub mod pool;
pub mod reader;
pub mod session;
pub mod source;
pub mod workers;

pub use checksum::{ChecksumAccumulator, ChecksumAlgorithm, ChecksumMode, PartChecksums};
pub use compose::{
    plan_parts, ComposeRequest, ComposeSource, CopyRequest, PartPlan, PlannedPart, ResolvedSource,
};
pub use coordinator::{TransferManager, TransferSettings, UploadOutput, UploadRequest, UploadState};
pub use pool::{BufferPool, PooledBuffer};
pub use reader::PartReader;
pub use session::{SessionState, UploadSession};
pub use source::{PartSizing, PartSource};
pub use workers::{PartWorkers, WorkItem};

use bytes::Bytes;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Smallest part S3 accepts, except for the last part of an upload (5 MiB).
pub const MIN_PART_SIZE: u64 = 5_242_880;

/// Largest single part, and largest object a plain copy can handle (5 GiB).
pub const MAX_PART_SIZE: u64 = 5_368_709_120;

/// Largest object a multipart upload can produce (5 TiB).
pub const MAX_OBJECT_SIZE: u64 = 5_497_558_138_880;

/// Most parts one upload can hold.
pub const MAX_MULTIPART_COUNT: u32 = 10_000;

/// One part read from a source.
#[derive(Debug, Clone)]
pub struct PartChunk {
    /// 1-based part number, assigned in read order.
    pub part_number: u32,
    /// The part's bytes.
    pub data: Bytes,
    /// Per-part digests. Empty in full-object mode.
    pub checksums: PartChecksums,
    /// True for the final part.
    pub is_last: bool,
}

/// Progress callback for transfer operations.
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Transfer progress information.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// Total bytes to transfer, when known.
    pub total_bytes: Option<u64>,
    /// Bytes transferred so far.
    pub transferred_bytes: u64,
    /// Parts finished so far.
    pub completed_parts: u32,
    /// Total parts, when known.
    pub total_parts: Option<u32>,
}

impl TransferProgress {
    /// Calculate the progress percentage, if the total is known.
    pub fn percentage(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.transferred_bytes as f64 / total as f64) * 100.0
            }
        })
    }
}

/// Counts finished parts and reports them to an optional callback.
///
/// Shared by the workers of one transfer.
pub(crate) struct ProgressTracker {
    total_bytes: Option<u64>,
    total_parts: Option<u32>,
    transferred: AtomicU64,
    completed: AtomicU32,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub(crate) fn new(
        total_bytes: Option<u64>,
        total_parts: Option<u32>,
        callback: Option<ProgressCallback>,
    ) -> Arc<Self> {
        Arc::new(Self {
            total_bytes,
            total_parts,
            transferred: AtomicU64::new(0),
            completed: AtomicU32::new(0),
            callback,
        })
    }

    pub(crate) fn part_done(&self, size: u64) {
        let transferred = self.transferred.fetch_add(size, Ordering::SeqCst) + size;
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(callback) = &self.callback {
            callback(TransferProgress {
                total_bytes: self.total_bytes,
                transferred_bytes: transferred,
                completed_parts: completed,
                total_parts: self.total_parts,
            });
        }
    }
}
