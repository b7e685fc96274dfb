//! Upload orchestration: single PUT for small objects, otherwise a multipart
//! session fed sequentially or through a worker pool.

use super::checksum::{ChecksumAccumulator, ChecksumAlgorithm, ChecksumMode, PartChecksums};
use super::pool::{BufferPool, PooledBuffer};
use super::reader::PartReader;
use super::session::UploadSession;
use super::source::PartSource;
use super::workers::PartWorkers;
use super::{PartChunk, ProgressCallback, ProgressTracker, MAX_PART_SIZE, MIN_PART_SIZE};
use crate::config::S3Config;
use crate::error::{MultipartError, PartFailure, RequestError, S3Error, TransferError};
use crate::services::{MultipartService, ObjectsService, ServiceContext};
use crate::types::*;
use bytes::BytesMut;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Longest object key S3 accepts, in bytes.
const MAX_KEY_LENGTH: usize = 1024;

/// Phases of an upload, as reported in log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// Validating and sizing.
    Init,
    /// Sending the object in one PUT.
    SingleShot,
    /// A multipart session exists.
    MultipartOpen,
    /// Parts are being sent.
    PartUploading,
    /// The completion call is in flight.
    Completing,
    /// The object exists.
    Done,
    /// The abort call is in flight.
    Aborting,
    /// The session was torn down.
    Aborted,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadState::Init => "init",
            UploadState::SingleShot => "single_shot",
            UploadState::MultipartOpen => "multipart_open",
            UploadState::PartUploading => "part_uploading",
            UploadState::Completing => "completing",
            UploadState::Done => "done",
            UploadState::Aborting => "aborting",
            UploadState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Transfer tuning taken from the client configuration.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Known sizes up to this go out in a single PUT.
    pub multipart_threshold: u64,
    /// Part size; `None` sizes parts automatically.
    pub part_size: Option<u64>,
    /// Parts in flight at once.
    pub concurrency: usize,
    /// Checksums computed while reading.
    pub checksum_algorithms: Vec<ChecksumAlgorithm>,
    /// Per-part or whole-object checksums.
    pub checksum_mode: ChecksumMode,
}

impl TransferSettings {
    /// Copy the multipart settings out of a client configuration.
    pub fn from_config(config: &S3Config) -> Self {
        Self {
            multipart_threshold: config.multipart_threshold,
            part_size: config.multipart_part_size,
            concurrency: config.multipart_concurrency,
            checksum_algorithms: config.checksum_algorithms.clone(),
            checksum_mode: config.checksum_mode,
        }
    }

    fn accumulator(&self) -> ChecksumAccumulator {
        ChecksumAccumulator::new(&self.checksum_algorithms, self.checksum_mode)
    }
}

/// An object upload.
#[derive(Clone)]
pub struct UploadRequest {
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub key: String,
    /// Declared size; overrides what the source knows about itself.
    pub size: Option<u64>,
    /// Part size for this upload.
    pub part_size: Option<u64>,
    /// Concurrency for this upload.
    pub concurrency: Option<usize>,
    /// Open a multipart session even for small objects.
    pub force_multipart: bool,
    /// Object attributes sent when the object is created.
    pub attributes: ObjectAttributes,
    /// Called after every part.
    pub progress: Option<ProgressCallback>,
}

impl UploadRequest {
    /// Upload to `bucket/key` with the configured defaults.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size: None,
            part_size: None,
            concurrency: None,
            force_multipart: false,
            attributes: ObjectAttributes::default(),
            progress: None,
        }
    }

    /// Declare the object size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the part size.
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = Some(part_size);
        self
    }

    /// Set how many parts may be in flight.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Always use a multipart session.
    pub fn force_multipart(mut self) -> Self {
        self.force_multipart = true;
        self
    }

    /// Set object attributes.
    pub fn with_attributes(mut self, attributes: ObjectAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Report progress after each part.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("size", &self.size)
            .field("part_size", &self.part_size)
            .field("concurrency", &self.concurrency)
            .field("force_multipart", &self.force_multipart)
            .field("attributes", &self.attributes)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Result of an upload, copy or compose.
#[derive(Debug, Clone, Default)]
pub struct UploadOutput {
    /// Bucket written.
    pub bucket: String,
    /// Key written.
    pub key: String,
    /// ETag of the new object.
    pub e_tag: Option<String>,
    /// Version of the new object.
    pub version_id: Option<String>,
    /// Object location reported by completion.
    pub location: Option<String>,
    /// The multipart upload ID, if a session was used.
    pub upload_id: Option<String>,
    /// Number of parts the object was written in.
    pub part_count: u32,
    /// Object size in bytes.
    pub size: u64,
    /// Whole-object digests sent with the request, if any.
    pub checksums: Option<PartChecksums>,
}

/// High-level uploads, copies and composes on top of the object and
/// multipart services.
pub struct TransferManager {
    pub(super) objects: Arc<ObjectsService>,
    pub(super) multipart: Arc<MultipartService>,
    pub(super) settings: TransferSettings,
}

impl TransferManager {
    /// Create a manager over a shared service context.
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        let settings = TransferSettings::from_config(ctx.config());
        Self {
            objects: Arc::new(ObjectsService::new(Arc::clone(&ctx))),
            multipart: Arc::new(MultipartService::new(ctx)),
            settings,
        }
    }

    /// Replace the settings taken from the configuration.
    pub fn with_settings(mut self, settings: TransferSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Current settings.
    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Upload `source` to `request.bucket/request.key`.
    ///
    /// Once a multipart session is open, any failure aborts it exactly once
    /// and is returned as `MultipartError::Aborted`.
    #[instrument(skip(self, request, source), fields(bucket = %request.bucket, key = %request.key))]
    pub async fn upload(
        &self,
        request: UploadRequest,
        source: PartSource,
    ) -> Result<UploadOutput, S3Error> {
        let UploadRequest {
            bucket,
            key,
            size,
            part_size,
            concurrency,
            force_multipart,
            attributes,
            progress,
        } = request;

        validate_target(&bucket, &key)?;
        let concurrency = concurrency.unwrap_or(self.settings.concurrency);
        if concurrency == 0 {
            return Err(S3Error::Request(RequestError::Validation {
                message: "Concurrency must be at least 1".to_string(),
            }));
        }

        let declared = size.or_else(|| source.known_size());
        let single_shot = !force_multipart
            && declared.map_or(false, |s| {
                s <= self.settings.multipart_threshold.min(MAX_PART_SIZE)
            });
        let part_size = match declared {
            Some(s) if single_shot => Some(s.max(MIN_PART_SIZE)),
            _ => part_size.or(self.settings.part_size),
        };

        let mut reader = PartReader::new(source, size, part_size, self.settings.accumulator())?;
        debug!(
            state = %UploadState::Init,
            size = ?reader.object_size(),
            part_size = reader.part_size(),
            part_count = ?reader.part_count(),
            "Starting upload"
        );
        let progress = ProgressTracker::new(reader.object_size(), reader.part_count(), progress);

        let mut first_buf = BytesMut::new();
        let first = match reader.read(&mut first_buf).await? {
            Some(chunk) => chunk,
            None => {
                return Err(S3Error::Request(RequestError::Validation {
                    message: "Source produced no parts".to_string(),
                }))
            }
        };

        if first.is_last && !force_multipart {
            return self
                .put_single(bucket, key, attributes, first, &progress)
                .await;
        }

        let create = CreateMultipartUploadRequest::new(&bucket, &key)
            .with_attributes(attributes)
            .with_headers(reader.accumulator_mut().create_headers());
        let created = self.multipart.create(create).await?;
        let session = Arc::new(UploadSession::new(&bucket, &key, created.upload_id));
        let guard = SessionGuard::new(Arc::clone(&self.multipart), Arc::clone(&session));
        info!(
            upload_id = %session.upload_id(),
            state = %UploadState::MultipartOpen,
            part_size = reader.part_size(),
            concurrency,
            "Opened multipart upload"
        );

        let outcome = if concurrency == 1 {
            self.upload_sequential(&session, &mut reader, first, &progress)
                .await
        } else {
            self.upload_parallel(&session, &mut reader, first, concurrency, &progress)
                .await
        };

        let object_digests = match outcome {
            Ok(()) => reader.accumulator_mut().finish_object(),
            Err(_) => None,
        };
        let headers = object_digests
            .as_ref()
            .map(PartChecksums::full_object_headers)
            .unwrap_or_default();
        let settled = self.settle(&session, outcome, headers).await;
        guard.disarm();
        let completed = settled?;

        let output = UploadOutput {
            bucket,
            key,
            e_tag: completed.e_tag,
            version_id: completed.version_id,
            location: completed.location,
            upload_id: Some(session.upload_id().to_string()),
            part_count: session.part_count() as u32,
            size: session.total_size(),
            checksums: object_digests,
        };
        info!(
            upload_id = %session.upload_id(),
            state = %UploadState::Done,
            part_count = output.part_count,
            size = output.size,
            "Completed multipart upload"
        );
        Ok(output)
    }

    async fn put_single(
        &self,
        bucket: String,
        key: String,
        attributes: ObjectAttributes,
        chunk: PartChunk,
        progress: &ProgressTracker,
    ) -> Result<UploadOutput, S3Error> {
        // One part is the whole object, so its digests are the object's.
        let checksums = chunk.checksums;
        let size = chunk.data.len() as u64;
        debug!(state = %UploadState::SingleShot, size, "Uploading in a single request");

        let mut request =
            PutObjectRequest::new(&bucket, &key, chunk.data).with_attributes(attributes);
        checksums.apply_headers(&mut request.headers);
        let output = self.objects.put(request).await?;
        progress.part_done(size);

        info!(state = %UploadState::Done, size, "Uploaded object");
        Ok(UploadOutput {
            bucket,
            key,
            e_tag: output.e_tag,
            version_id: output.version_id,
            location: None,
            upload_id: None,
            part_count: 1,
            size,
            checksums: (!checksums.is_empty()).then_some(checksums),
        })
    }

    async fn upload_sequential(
        &self,
        session: &UploadSession,
        reader: &mut PartReader,
        first: PartChunk,
        progress: &ProgressTracker,
    ) -> Result<(), S3Error> {
        let mut buf = BytesMut::new();
        let mut next = Some(first);
        while let Some(chunk) = next {
            debug!(
                part_number = chunk.part_number,
                state = %UploadState::PartUploading,
                "Uploading part"
            );
            let part = upload_chunk(&self.multipart, session, chunk)
                .await
                .map_err(|failure| {
                    S3Error::Multipart(MultipartError::PartsFailed {
                        upload_id: session.upload_id().to_string(),
                        failures: vec![failure],
                    })
                })?;
            progress.part_done(part.size);
            session.add_part(part);
            next = reader.read(&mut buf).await?;
        }
        Ok(())
    }

    async fn upload_parallel(
        &self,
        session: &Arc<UploadSession>,
        reader: &mut PartReader,
        first: PartChunk,
        concurrency: usize,
        progress: &Arc<ProgressTracker>,
    ) -> Result<(), S3Error> {
        let buffer_capacity = if reader.reads_into_buffer() {
            reader.part_size() as usize
        } else {
            0
        };
        let pool = BufferPool::new(concurrency + 1, buffer_capacity);
        let workers = {
            let multipart = Arc::clone(&self.multipart);
            let session = Arc::clone(session);
            let progress = Arc::clone(progress);
            PartWorkers::spawn(concurrency, move |job: UploadJob| {
                let multipart = Arc::clone(&multipart);
                let session = Arc::clone(&session);
                let progress = Arc::clone(&progress);
                async move {
                    let UploadJob { chunk, buffer } = job;
                    let part = upload_chunk(&multipart, &session, chunk).await?;
                    drop(buffer);
                    progress.part_done(part.size);
                    session.add_part(part);
                    Ok(())
                }
            })
        };

        let fed = feed(&workers, &pool, reader, first).await;
        let drained = workers.finish(session.upload_id()).await;
        merge_outcomes(fed, drained)
    }

    /// Complete the session, or abort it if `outcome` or the completion
    /// failed.
    pub(super) async fn settle(
        &self,
        session: &UploadSession,
        outcome: Result<(), S3Error>,
        headers: HashMap<String, String>,
    ) -> Result<CompleteMultipartUploadOutput, S3Error> {
        if let Err(error) = outcome {
            return Err(self.abort(session, error).await);
        }
        if !session.begin_complete() {
            return Err(S3Error::Multipart(MultipartError::UploadNotFound {
                bucket: session.bucket().to_string(),
                key: session.key().to_string(),
                upload_id: session.upload_id().to_string(),
                request_id: None,
            }));
        }

        let parts = session.sorted_parts();
        debug!(
            upload_id = %session.upload_id(),
            state = %UploadState::Completing,
            parts = parts.len(),
            "Completing multipart upload"
        );
        let request = CompleteMultipartUploadRequest::new(
            session.bucket(),
            session.key(),
            session.upload_id(),
            parts,
        )
        .with_headers(headers);

        match self.multipart.complete(request).await {
            Ok(output) => Ok(output),
            Err(error) => {
                session.completion_failed();
                Err(self.abort(session, error).await)
            }
        }
    }

    /// Abort the session once and wrap `error` with the outcome.
    pub(super) async fn abort(&self, session: &UploadSession, error: S3Error) -> S3Error {
        if !session.begin_abort() {
            return error;
        }
        let upload_id = session.upload_id().to_string();
        warn!(
            upload_id = %upload_id,
            state = %UploadState::Aborting,
            error = %error,
            "Aborting multipart upload"
        );

        // Detached so that dropping this future cannot cancel the abort.
        let request =
            AbortMultipartUploadRequest::new(session.bucket(), session.key(), &upload_id);
        let multipart = Arc::clone(&self.multipart);
        let aborted = tokio::spawn(async move { multipart.abort(request).await })
            .await
            .unwrap_or_else(|e| {
                Err(S3Error::Transfer(TransferError::WorkerPanicked {
                    message: e.to_string(),
                    failures: Vec::new(),
                }))
            });
        let abort_error = match aborted {
            Ok(()) => {
                info!(upload_id = %upload_id, state = %UploadState::Aborted, "Aborted multipart upload");
                None
            }
            Err(abort_error) => {
                warn!(
                    upload_id = %upload_id,
                    error = %abort_error,
                    "Abort failed; uploaded parts remain until the upload is cleaned up"
                );
                Some(Box::new(abort_error))
            }
        };

        S3Error::Multipart(MultipartError::Aborted {
            upload_id,
            source: Box::new(error),
            abort_error,
        })
    }
}

impl fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Aborts an open session in the background when the upload future is
/// dropped before it settles.
///
/// A session whose completion call was already issued is left alone; the
/// store may have accepted it.
pub(super) struct SessionGuard {
    multipart: Arc<MultipartService>,
    session: Arc<UploadSession>,
    armed: bool,
}

impl SessionGuard {
    pub(super) fn new(multipart: Arc<MultipartService>, session: Arc<UploadSession>) -> Self {
        Self {
            multipart,
            session,
            armed: true,
        }
    }

    /// The session was settled; dropping the guard does nothing.
    pub(super) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.armed || !self.session.begin_abort() {
            return;
        }

        let upload_id = self.session.upload_id().to_string();
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(
                    upload_id = %upload_id,
                    "Upload dropped outside a runtime; the session stays open until it is cleaned up"
                );
                return;
            }
        };
        warn!(
            upload_id = %upload_id,
            state = %UploadState::Aborting,
            "Upload dropped before completion; aborting in the background"
        );

        let multipart = Arc::clone(&self.multipart);
        let request = AbortMultipartUploadRequest::new(
            self.session.bucket(),
            self.session.key(),
            &upload_id,
        );
        runtime.spawn(async move {
            match multipart.abort(request).await {
                Ok(()) => info!(
                    upload_id = %upload_id,
                    state = %UploadState::Aborted,
                    "Aborted multipart upload"
                ),
                Err(error) => warn!(
                    upload_id = %upload_id,
                    error = %error,
                    "Background abort failed"
                ),
            }
        });
    }
}

struct UploadJob {
    chunk: PartChunk,
    buffer: Option<PooledBuffer>,
}

/// Read parts and queue them until the source ends or a part fails.
async fn feed(
    workers: &PartWorkers<UploadJob>,
    pool: &Arc<BufferPool>,
    reader: &mut PartReader,
    first: PartChunk,
) -> Result<(), S3Error> {
    workers
        .submit(UploadJob {
            chunk: first,
            buffer: None,
        })
        .await?;

    while !reader.is_finished() {
        if workers.has_failed() {
            debug!("Stopped reading after a part failure");
            break;
        }
        let mut buffer = pool.acquire().await?;
        let chunk = match reader.read(&mut buffer).await? {
            Some(chunk) => chunk,
            None => break,
        };
        debug!(
            part_number = chunk.part_number,
            state = %UploadState::PartUploading,
            "Queued part"
        );
        workers
            .submit(UploadJob {
                chunk,
                buffer: Some(buffer),
            })
            .await?;
    }
    Ok(())
}

/// Worker failures win over the feeder's, which often just follows from
/// them.
pub(super) fn merge_outcomes(
    fed: Result<(), S3Error>,
    drained: Result<(), S3Error>,
) -> Result<(), S3Error> {
    match (fed, drained) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(error), Ok(())) => Err(error),
        (fed, Err(error)) => {
            if let Err(feed_error) = fed {
                warn!(error = %feed_error, "Feeding stopped with an error");
            }
            Err(error)
        }
    }
}

async fn upload_chunk(
    multipart: &MultipartService,
    session: &UploadSession,
    chunk: PartChunk,
) -> Result<CompletedPart, PartFailure> {
    let PartChunk {
        part_number,
        data,
        checksums,
        ..
    } = chunk;
    let size = data.len() as u64;
    let request = UploadPartRequest::new(
        session.bucket(),
        session.key(),
        session.upload_id(),
        part_number,
        data,
    )
    .with_headers(checksums.headers());

    let output = multipart
        .upload_part(request)
        .await
        .map_err(|error| PartFailure { part_number, error })?;

    Ok(CompletedPart {
        part_number,
        e_tag: output.e_tag,
        size,
        checksum_crc32c: checksums.crc32c,
        checksum_sha256: checksums.sha256,
    })
}

/// Reject an empty bucket, or a key that is empty or too long.
pub(super) fn validate_target(bucket: &str, key: &str) -> Result<(), S3Error> {
    if bucket.is_empty() {
        return Err(S3Error::Request(RequestError::InvalidBucketName {
            bucket: bucket.to_string(),
            reason: "Bucket name must not be empty".to_string(),
        }));
    }
    if key.is_empty() {
        return Err(S3Error::Request(RequestError::InvalidObjectKey {
            key: key.to_string(),
            reason: "Object key must not be empty".to_string(),
        }));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(S3Error::Request(RequestError::InvalidObjectKey {
            key: key.to_string(),
            reason: format!("Object key is longer than {} bytes", MAX_KEY_LENGTH),
        }));
    }
    Ok(())
}
