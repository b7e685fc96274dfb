//! Building one object out of ranges of existing objects with server-side
//! part copies.
//!
//! Sources are resolved with HEAD, planned into parts by [`plan_parts`], and
//! copied through the same session lifecycle as uploads. A single whole
//! source small enough for one request becomes a plain copy instead.

use super::coordinator::{
    merge_outcomes, validate_target, SessionGuard, TransferManager, UploadOutput, UploadState,
};
use super::session::UploadSession;
use super::workers::PartWorkers;
use super::{MAX_MULTIPART_COUNT, MAX_OBJECT_SIZE, MAX_PART_SIZE, MIN_PART_SIZE};
use crate::error::{MultipartError, PartFailure, RequestError, S3Error, TransferError};
use crate::services::MultipartService;
use crate::types::*;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A whole object, or a byte range of one, to copy from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeSource {
    /// Source bucket.
    pub bucket: String,
    /// Source key.
    pub key: String,
    /// Source version.
    pub version_id: Option<String>,
    /// First byte to copy.
    pub offset: Option<u64>,
    /// Bytes to copy; defaults to the rest of the object.
    pub length: Option<u64>,
    /// Only copy while the source has this ETag.
    pub match_etag: Option<String>,
}

impl ComposeSource {
    /// The whole of `bucket/key`.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
            offset: None,
            length: None,
            match_etag: None,
        }
    }

    /// Pin a version.
    pub fn with_version_id(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    /// Start at `offset`.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Copy `length` bytes.
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    /// Require the source to have `etag`.
    pub fn with_match_etag(mut self, etag: impl Into<String>) -> Self {
        self.match_etag = Some(etag.into());
        self
    }

    /// The `x-amz-copy-source` reference.
    pub fn copy_source(&self) -> CopySource {
        let source = CopySource::new(&self.bucket, &self.key);
        match &self.version_id {
            Some(version_id) => source.with_version_id(version_id),
            None => source,
        }
    }

    fn reject(&self, reason: impl Into<String>) -> S3Error {
        S3Error::Request(RequestError::InvalidComposeSource {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            reason: reason.into(),
        })
    }
}

/// A source with the size and ETag its HEAD returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// What to copy.
    pub source: ComposeSource,
    /// Size of the whole source object.
    pub object_size: u64,
    /// ETag the copy is pinned to.
    pub etag: Option<String>,
}

impl ResolvedSource {
    /// Pair a source with its object's size and ETag.
    pub fn new(source: ComposeSource, object_size: u64, etag: Option<String>) -> Self {
        Self {
            source,
            object_size,
            etag,
        }
    }

    /// Start and length of the bytes to copy.
    pub fn effective_range(&self) -> Result<(u64, u64), S3Error> {
        let offset = self.source.offset.unwrap_or(0);
        if offset > 0 && offset >= self.object_size {
            return Err(self.source.reject(format!(
                "offset {} is beyond the object size of {} bytes",
                offset, self.object_size
            )));
        }
        let available = self.object_size - offset;
        let length = self.source.length.unwrap_or(available);
        if length > available {
            return Err(self.source.reject(format!(
                "range of {} bytes at offset {} exceeds the object size of {} bytes",
                length, offset, self.object_size
            )));
        }
        Ok((offset, length))
    }

    /// True when the whole object is copied.
    pub fn is_whole(&self) -> bool {
        self.source.offset.unwrap_or(0) == 0
            && self.source.length.map_or(true, |l| l == self.object_size)
    }

    fn copy_source(&self) -> CopySource {
        self.source.copy_source()
    }
}

/// One part-copy of a compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedPart {
    /// Part number in the new object.
    pub part_number: u32,
    /// Index into the resolved sources.
    pub source_index: usize,
    /// Inclusive byte range, or `None` for the whole source object.
    pub range: Option<(u64, u64)>,
    /// Bytes copied.
    pub size: u64,
}

/// Every part of a compose, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPlan {
    /// Planned parts, numbered from 1.
    pub parts: Vec<PlannedPart>,
    /// Size of the composed object.
    pub total_size: u64,
}

impl PartPlan {
    /// True when the plan is a single whole-object copy that fits one
    /// request.
    pub fn is_plain_copy(&self) -> bool {
        matches!(self.parts.as_slice(), [part] if part.range.is_none())
    }
}

/// Split sources into part-copies.
///
/// A source larger than `MAX_PART_SIZE` becomes `MAX_PART_SIZE` pieces plus a
/// remainder. Every part except the last must be at least `MIN_PART_SIZE`,
/// unless there is only one source.
pub fn plan_parts(sources: &[ResolvedSource]) -> Result<PartPlan, S3Error> {
    if sources.is_empty() {
        return Err(S3Error::Request(RequestError::Validation {
            message: "Compose needs at least one source".to_string(),
        }));
    }

    let only = sources.len() == 1;
    let mut parts = Vec::new();
    let mut total_size: u64 = 0;

    for (index, resolved) in sources.iter().enumerate() {
        let source = &resolved.source;
        let last = index + 1 == sources.len();
        let (offset, size) = resolved.effective_range()?;

        if size == 0 && !(only && resolved.is_whole()) {
            return Err(source.reject("nothing to copy"));
        }
        if size < MIN_PART_SIZE && !only && !last {
            return Err(source.reject(format!(
                "size {} is below the minimum part size of {} bytes",
                size, MIN_PART_SIZE
            )));
        }

        total_size += size;
        if total_size > MAX_OBJECT_SIZE {
            return Err(S3Error::Request(RequestError::EntityTooLarge {
                size: total_size,
                max_size: MAX_OBJECT_SIZE,
            }));
        }

        let (count, last_len) = match (size / MAX_PART_SIZE, size % MAX_PART_SIZE) {
            (0, rem) => (1, rem),
            (full, 0) => (full, MAX_PART_SIZE),
            (full, rem) => (full + 1, rem),
        };
        if count > 1 && last_len < MIN_PART_SIZE && !only && !last {
            return Err(source.reject(format!(
                "last piece after splitting is {} bytes, below the minimum part size of {} bytes",
                last_len, MIN_PART_SIZE
            )));
        }
        if parts.len() as u64 + count > MAX_MULTIPART_COUNT as u64 {
            return Err(S3Error::Transfer(TransferError::PartCountExceeded {
                max: MAX_MULTIPART_COUNT,
            }));
        }

        let whole = count == 1 && resolved.is_whole();
        for piece in 0..count {
            let len = if piece + 1 == count {
                last_len
            } else {
                MAX_PART_SIZE
            };
            let start = offset + piece * MAX_PART_SIZE;
            parts.push(PlannedPart {
                part_number: parts.len() as u32 + 1,
                source_index: index,
                range: (!whole).then(|| (start, start + len - 1)),
                size: len,
            });
        }
    }

    Ok(PartPlan { parts, total_size })
}

/// A compose into `bucket/key`.
#[derive(Debug, Clone, Default)]
pub struct ComposeRequest {
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub key: String,
    /// Sources, in output order.
    pub sources: Vec<ComposeSource>,
    /// Attributes of the new object.
    pub attributes: ObjectAttributes,
}

impl ComposeRequest {
    /// Compose into `bucket/key`.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    /// Append a source.
    pub fn with_source(mut self, source: ComposeSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Set attributes of the new object.
    pub fn with_attributes(mut self, attributes: ObjectAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// A server-side copy of one object, or a range of one.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    /// What to copy.
    pub source: ComposeSource,
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub key: String,
    /// Metadata handling.
    pub metadata_directive: Option<MetadataDirective>,
    /// Tag handling.
    pub tagging_directive: Option<TaggingDirective>,
    /// Attributes of the new object.
    pub attributes: ObjectAttributes,
}

impl CopyRequest {
    /// Copy `source` to `bucket/key`.
    pub fn new(source: ComposeSource, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            source,
            bucket: bucket.into(),
            key: key.into(),
            metadata_directive: None,
            tagging_directive: None,
            attributes: ObjectAttributes::default(),
        }
    }

    /// Set the metadata directive.
    pub fn with_metadata_directive(mut self, directive: MetadataDirective) -> Self {
        self.metadata_directive = Some(directive);
        self
    }

    /// Set the tagging directive.
    pub fn with_tagging_directive(mut self, directive: TaggingDirective) -> Self {
        self.tagging_directive = Some(directive);
        self
    }

    /// Set attributes of the new object.
    pub fn with_attributes(mut self, attributes: ObjectAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

impl TransferManager {
    /// Concatenate `request.sources` into a new object.
    #[instrument(skip(self, request), fields(
        bucket = %request.bucket,
        key = %request.key,
        sources = request.sources.len()
    ))]
    pub async fn compose(&self, request: ComposeRequest) -> Result<UploadOutput, S3Error> {
        let ComposeRequest {
            bucket,
            key,
            sources,
            attributes,
        } = request;
        validate_target(&bucket, &key)?;
        if sources.is_empty() {
            return Err(S3Error::Request(RequestError::Validation {
                message: "Compose needs at least one source".to_string(),
            }));
        }

        let resolved = self.resolve_all(&sources).await?;
        let plan = plan_parts(&resolved)?;

        if plan.is_plain_copy() {
            let source = &resolved[0];
            let mut copy = CopyObjectRequest::new(source.copy_source(), &bucket, &key)
                .with_metadata_directive(MetadataDirective::Replace)
                .with_tagging_directive(TaggingDirective::Replace)
                .with_attributes(attributes);
            copy.copy_source_if_match = source.etag.clone();
            return self.plain_copy(copy, plan.total_size).await;
        }

        self.copy_parts(bucket, key, attributes, resolved, plan).await
    }

    /// Copy one object, or a range of one, server-side.
    ///
    /// Whole objects up to `MAX_PART_SIZE` are copied in one request.
    /// Anything else is composed from part-copies, for which a `COPY`
    /// directive cannot be honoured and is rejected.
    #[instrument(skip(self, request), fields(
        source = %request.source.copy_source().header_value(),
        bucket = %request.bucket,
        key = %request.key
    ))]
    pub async fn copy(&self, request: CopyRequest) -> Result<UploadOutput, S3Error> {
        let CopyRequest {
            source,
            bucket,
            key,
            metadata_directive,
            tagging_directive,
            attributes,
        } = request;
        validate_target(&bucket, &key)?;

        let resolved = self.resolve(&source).await?;
        let (_, length) = resolved.effective_range()?;

        if resolved.is_whole() && resolved.object_size <= MAX_PART_SIZE {
            let mut copy = CopyObjectRequest::new(resolved.copy_source(), &bucket, &key)
                .with_attributes(attributes);
            copy.metadata_directive = metadata_directive;
            copy.tagging_directive = tagging_directive;
            copy.copy_source_if_match = resolved.etag.clone();
            return self.plain_copy(copy, length).await;
        }

        let directives = [
            (
                "COPY metadata",
                metadata_directive == Some(MetadataDirective::Copy),
            ),
            (
                "COPY tagging",
                tagging_directive == Some(TaggingDirective::Copy),
            ),
        ];
        if let Some((directive, _)) = directives.iter().find(|(_, is_copy)| *is_copy) {
            return Err(S3Error::Request(RequestError::IncompatibleDirective {
                directive: directive.to_string(),
                size: length,
                max_size: MAX_PART_SIZE,
            }));
        }

        let plan = plan_parts(std::slice::from_ref(&resolved))?;
        self.copy_parts(bucket, key, attributes, vec![resolved], plan)
            .await
    }

    async fn resolve(&self, source: &ComposeSource) -> Result<ResolvedSource, S3Error> {
        let mut head = HeadObjectRequest::new(&source.bucket, &source.key)
            .with_version_id(source.version_id.clone());
        head.if_match = source.match_etag.clone();

        let output = self.objects.head(head).await?;
        let etag = source.match_etag.clone().or(output.e_tag);
        let resolved = ResolvedSource::new(source.clone(), output.content_length, etag);
        resolved.effective_range()?;
        debug!(
            source = %source.copy_source().header_value(),
            size = resolved.object_size,
            "Resolved compose source"
        );
        Ok(resolved)
    }

    async fn resolve_all(&self, sources: &[ComposeSource]) -> Result<Vec<ResolvedSource>, S3Error> {
        stream::iter(sources)
            .map(|source| self.resolve(source))
            .buffered(self.settings.concurrency.max(1))
            .try_collect()
            .await
    }

    async fn plain_copy(
        &self,
        request: CopyObjectRequest,
        size: u64,
    ) -> Result<UploadOutput, S3Error> {
        let bucket = request.dest_bucket.clone();
        let key = request.dest_key.clone();
        debug!(state = %UploadState::SingleShot, size, "Copying in a single request");

        let output = self.objects.copy(request).await?;
        info!(state = %UploadState::Done, size, "Copied object");
        Ok(UploadOutput {
            bucket,
            key,
            e_tag: output.e_tag,
            version_id: output.version_id,
            location: None,
            upload_id: None,
            part_count: 1,
            size,
            checksums: None,
        })
    }

    async fn copy_parts(
        &self,
        bucket: String,
        key: String,
        attributes: ObjectAttributes,
        sources: Vec<ResolvedSource>,
        plan: PartPlan,
    ) -> Result<UploadOutput, S3Error> {
        let create = CreateMultipartUploadRequest::new(&bucket, &key).with_attributes(attributes);
        let created = self.multipart.create(create).await?;
        let session = Arc::new(UploadSession::new(&bucket, &key, created.upload_id));
        let guard = SessionGuard::new(Arc::clone(&self.multipart), Arc::clone(&session));
        info!(
            upload_id = %session.upload_id(),
            state = %UploadState::MultipartOpen,
            parts = plan.parts.len(),
            size = plan.total_size,
            "Opened multipart upload for copy"
        );

        let sources = Arc::new(sources);
        let concurrency = self.settings.concurrency.max(1);
        let outcome = if concurrency == 1 {
            let mut outcome = Ok(());
            for part in plan.parts {
                if let Err(failure) = copy_part(&self.multipart, &session, &sources, part).await {
                    outcome = Err(S3Error::Multipart(MultipartError::PartsFailed {
                        upload_id: session.upload_id().to_string(),
                        failures: vec![failure],
                    }));
                    break;
                }
            }
            outcome
        } else {
            let workers = {
                let multipart = Arc::clone(&self.multipart);
                let session = Arc::clone(&session);
                let sources = Arc::clone(&sources);
                PartWorkers::spawn(concurrency, move |part: PlannedPart| {
                    let multipart = Arc::clone(&multipart);
                    let session = Arc::clone(&session);
                    let sources = Arc::clone(&sources);
                    async move { copy_part(&multipart, &session, &sources, part).await }
                })
            };

            let mut fed = Ok(());
            for part in plan.parts {
                if workers.has_failed() {
                    break;
                }
                if let Err(error) = workers.submit(part).await {
                    fed = Err(error);
                    break;
                }
            }
            let drained = workers.finish(session.upload_id()).await;
            merge_outcomes(fed, drained)
        };

        let settled = self.settle(&session, outcome, HashMap::new()).await;
        guard.disarm();
        let completed = settled?;
        info!(
            upload_id = %session.upload_id(),
            state = %UploadState::Done,
            parts = session.part_count(),
            "Completed copy"
        );
        Ok(UploadOutput {
            bucket,
            key,
            e_tag: completed.e_tag,
            version_id: completed.version_id,
            location: completed.location,
            upload_id: Some(session.upload_id().to_string()),
            part_count: session.part_count() as u32,
            size: session.total_size(),
            checksums: None,
        })
    }
}

async fn copy_part(
    multipart: &MultipartService,
    session: &UploadSession,
    sources: &[ResolvedSource],
    part: PlannedPart,
) -> Result<(), PartFailure> {
    let source = &sources[part.source_index];
    let mut request = UploadPartCopyRequest::new(
        session.bucket(),
        session.key(),
        session.upload_id(),
        part.part_number,
        source.copy_source(),
    )
    .with_source_if_match(source.etag.clone());
    if let Some((start, end)) = part.range {
        request = request.with_range(start, end);
    }

    let output = multipart
        .upload_part_copy(request)
        .await
        .map_err(|error| PartFailure {
            part_number: part.part_number,
            error,
        })?;
    session.add_part(CompletedPart::new(part.part_number, output.e_tag, part.size));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn resolved(size: u64) -> ResolvedSource {
        ResolvedSource::new(ComposeSource::new("src", "part"), size, Some("\"e\"".into()))
    }

    fn ranged(size: u64, offset: Option<u64>, length: Option<u64>) -> ResolvedSource {
        let mut source = ComposeSource::new("src", "part");
        source.offset = offset;
        source.length = length;
        ResolvedSource::new(source, size, None)
    }

    #[test]
    fn test_whole_sources_copy_without_ranges() {
        let plan = plan_parts(&[resolved(6 * MIB), resolved(3 * MIB)]).unwrap();
        assert_eq!(plan.total_size, 9 * MIB);
        assert_eq!(plan.parts.len(), 2);
        assert!(plan.parts.iter().all(|p| p.range.is_none()));
        assert_eq!(plan.parts[1].part_number, 2);
        assert_eq!(plan.parts[1].source_index, 1);
        assert!(!plan.is_plain_copy());
    }

    #[test]
    fn test_small_interior_source_rejected() {
        let err = plan_parts(&[resolved(3 * MIB), resolved(6 * MIB)]).unwrap_err();
        assert!(matches!(
            err,
            S3Error::Request(RequestError::InvalidComposeSource { .. })
        ));
    }

    #[test]
    fn test_small_only_source_is_plain_copy() {
        let plan = plan_parts(&[resolved(MIB)]).unwrap();
        assert!(plan.is_plain_copy());
        assert_eq!(plan.total_size, MIB);
    }

    #[test]
    fn test_ranged_source_uses_range() {
        let plan = plan_parts(&[ranged(10 * MIB, Some(MIB), Some(2 * MIB))]).unwrap();
        assert!(!plan.is_plain_copy());
        assert_eq!(plan.parts[0].range, Some((MIB, 3 * MIB - 1)));
        assert_eq!(plan.total_size, 2 * MIB);
    }

    #[test]
    fn test_large_source_is_split() {
        let size = 2 * MAX_PART_SIZE + 1024 * MIB;
        let plan = plan_parts(&[resolved(size)]).unwrap();
        let ranges: Vec<_> = plan.parts.iter().map(|p| p.range).collect();
        assert_eq!(
            ranges,
            vec![
                Some((0, MAX_PART_SIZE - 1)),
                Some((MAX_PART_SIZE, 2 * MAX_PART_SIZE - 1)),
                Some((2 * MAX_PART_SIZE, size - 1)),
            ]
        );
        assert_eq!(plan.parts.iter().map(|p| p.size).sum::<u64>(), size);
    }

    #[test]
    fn test_interior_split_remainder_must_reach_minimum() {
        let awkward = MAX_PART_SIZE + MIB;
        assert!(plan_parts(&[resolved(awkward), resolved(6 * MIB)]).is_err());
        assert!(plan_parts(&[resolved(6 * MIB), resolved(awkward)]).is_ok());
    }

    #[test]
    fn test_range_beyond_object_rejected() {
        assert!(plan_parts(&[ranged(10 * MIB, Some(10 * MIB), None)]).is_err());
        assert!(plan_parts(&[ranged(10 * MIB, Some(MIB), Some(10 * MIB))]).is_err());
    }

    #[test]
    fn test_empty_sources() {
        assert!(plan_parts(&[]).is_err());
        assert!(plan_parts(&[resolved(0)]).unwrap().is_plain_copy());
        assert!(plan_parts(&[resolved(6 * MIB), resolved(0)]).is_err());
    }

    #[test]
    fn test_total_size_ceiling() {
        let sources: Vec<_> = (0..1025).map(|_| resolved(MAX_PART_SIZE)).collect();
        assert!(matches!(
            plan_parts(&sources),
            Err(S3Error::Request(RequestError::EntityTooLarge { .. }))
        ));
    }

    #[test]
    fn test_part_count_ceiling() {
        let sources: Vec<_> = (0..10_001).map(|_| resolved(MIN_PART_SIZE)).collect();
        assert!(matches!(
            plan_parts(&sources),
            Err(S3Error::Transfer(TransferError::PartCountExceeded { .. }))
        ));
    }

    #[test]
    fn test_copy_source_carries_version() {
        let source = ComposeSource::new("b", "k").with_version_id("v1");
        assert_eq!(source.copy_source().header_value(), "/b/k?versionId=v1");
    }
}
