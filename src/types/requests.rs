//! Request types for the S3 operations used by the transfer layer.

use super::common::*;
use bytes::Bytes;
use std::collections::HashMap;

/// Request to store an object in one PUT.
#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    /// Target bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Object body.
    pub body: Bytes,
    /// Object attributes.
    pub attributes: ObjectAttributes,
    /// Additional headers, such as checksums.
    pub headers: HashMap<String, String>,
}

impl PutObjectRequest {
    /// Create a new put object request.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            body: body.into(),
            attributes: ObjectAttributes::default(),
            headers: HashMap::new(),
        }
    }

    /// Set the object attributes.
    pub fn with_attributes(mut self, attributes: ObjectAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Request for an object's size and ETag.
#[derive(Debug, Clone, Default)]
pub struct HeadObjectRequest {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Version ID.
    pub version_id: Option<String>,
    /// If-Match ETag.
    pub if_match: Option<String>,
}

impl HeadObjectRequest {
    /// Create a new head object request.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    /// Target a specific version.
    pub fn with_version_id(mut self, version_id: Option<String>) -> Self {
        self.version_id = version_id;
        self
    }
}

/// Request to copy an object server-side.
#[derive(Debug, Clone)]
pub struct CopyObjectRequest {
    /// Source object.
    pub source: CopySource,
    /// Destination bucket.
    pub dest_bucket: String,
    /// Destination key.
    pub dest_key: String,
    /// Metadata directive. `None` lets the store default to `COPY`.
    pub metadata_directive: Option<MetadataDirective>,
    /// Tagging directive. `None` lets the store default to `COPY`.
    pub tagging_directive: Option<TaggingDirective>,
    /// Attributes for the new object, applied when directives are `REPLACE`.
    pub attributes: ObjectAttributes,
    /// Copy only if the source ETag matches.
    pub copy_source_if_match: Option<String>,
}

impl CopyObjectRequest {
    /// Create a new copy object request.
    pub fn new(
        source: CopySource,
        dest_bucket: impl Into<String>,
        dest_key: impl Into<String>,
    ) -> Self {
        Self {
            source,
            dest_bucket: dest_bucket.into(),
            dest_key: dest_key.into(),
            metadata_directive: None,
            tagging_directive: None,
            attributes: ObjectAttributes::default(),
            copy_source_if_match: None,
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

    /// Set the destination attributes.
    pub fn with_attributes(mut self, attributes: ObjectAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Require the source ETag to match.
    pub fn with_source_if_match(mut self, etag: impl Into<String>) -> Self {
        self.copy_source_if_match = Some(etag.into());
        self
    }
}

/// Request to open a multipart upload.
#[derive(Debug, Clone)]
pub struct CreateMultipartUploadRequest {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Object attributes.
    pub attributes: ObjectAttributes,
    /// Additional headers, such as the checksum algorithm.
    pub headers: HashMap<String, String>,
}

impl CreateMultipartUploadRequest {
    /// Create a new multipart upload request.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            attributes: ObjectAttributes::default(),
            headers: HashMap::new(),
        }
    }

    /// Set the object attributes.
    pub fn with_attributes(mut self, attributes: ObjectAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Add headers.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Request to upload one part.
#[derive(Debug, Clone)]
pub struct UploadPartRequest {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Upload ID.
    pub upload_id: String,
    /// Part number (1-10000).
    pub part_number: u32,
    /// Part body.
    pub body: Bytes,
    /// Additional headers, such as checksums.
    pub headers: HashMap<String, String>,
}

impl UploadPartRequest {
    /// Create a new upload part request.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        part_number: u32,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            part_number,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Add headers.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Request to fill one part from an existing object.
#[derive(Debug, Clone)]
pub struct UploadPartCopyRequest {
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub key: String,
    /// Upload ID.
    pub upload_id: String,
    /// Part number (1-10000).
    pub part_number: u32,
    /// Source object.
    pub source: CopySource,
    /// Inclusive byte range of the source; the whole object when `None`.
    pub range: Option<(u64, u64)>,
    /// Copy only if the source ETag matches.
    pub copy_source_if_match: Option<String>,
}

impl UploadPartCopyRequest {
    /// Create a new upload part copy request.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        part_number: u32,
        source: CopySource,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            part_number,
            source,
            range: None,
            copy_source_if_match: None,
        }
    }

    /// Copy only the inclusive range `start..=end`.
    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.range = Some((start, end));
        self
    }

    /// Require the source ETag to match.
    pub fn with_source_if_match(mut self, etag: Option<String>) -> Self {
        self.copy_source_if_match = etag;
        self
    }
}

/// Request to complete a multipart upload.
#[derive(Debug, Clone)]
pub struct CompleteMultipartUploadRequest {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Upload ID.
    pub upload_id: String,
    /// Manifest, sorted by part number.
    pub parts: Vec<CompletedPart>,
    /// Additional headers, such as a full-object checksum.
    pub headers: HashMap<String, String>,
}

impl CompleteMultipartUploadRequest {
    /// Create a completion request.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        parts: Vec<CompletedPart>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            parts,
            headers: HashMap::new(),
        }
    }

    /// Add headers.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Request to abort a multipart upload.
#[derive(Debug, Clone)]
pub struct AbortMultipartUploadRequest {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Upload ID.
    pub upload_id: String,
}

impl AbortMultipartUploadRequest {
    /// Create an abort request.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
        }
    }
}

/// Request to list the parts of an upload.
#[derive(Debug, Clone)]
pub struct ListPartsRequest {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Upload ID.
    pub upload_id: String,
    /// Max parts per page.
    pub max_parts: Option<u32>,
    /// List parts after this part number.
    pub part_number_marker: Option<u32>,
}

impl ListPartsRequest {
    /// Create a new list parts request.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            max_parts: None,
            part_number_marker: None,
        }
    }

    /// Set the page size.
    pub fn with_max_parts(mut self, max_parts: u32) -> Self {
        self.max_parts = Some(max_parts);
        self
    }
}
