//! Response types for S3 operations.

use super::common::*;
use std::collections::HashMap;

/// Response from a single PUT.
#[derive(Debug, Clone, Default)]
pub struct PutObjectOutput {
    /// ETag of the stored object.
    pub e_tag: Option<String>,
    /// Version ID if versioning is enabled.
    pub version_id: Option<String>,
    /// AWS request ID.
    pub request_id: Option<String>,
}

/// Response from a HEAD request.
#[derive(Debug, Clone, Default)]
pub struct HeadObjectOutput {
    /// ETag.
    pub e_tag: Option<String>,
    /// Object size in bytes.
    pub content_length: u64,
    /// Content type.
    pub content_type: Option<String>,
    /// Last modified.
    pub last_modified: Option<String>,
    /// Version ID.
    pub version_id: Option<String>,
    /// Storage class.
    pub storage_class: Option<StorageClass>,
    /// User metadata, keyed without the `x-amz-meta-` prefix.
    pub metadata: HashMap<String, String>,
    /// Number of parts, for multipart objects.
    pub parts_count: Option<u32>,
    /// AWS request ID.
    pub request_id: Option<String>,
}

/// Response from a server-side copy.
#[derive(Debug, Clone, Default)]
pub struct CopyObjectOutput {
    /// ETag of the new object.
    pub e_tag: Option<String>,
    /// Last modified.
    pub last_modified: Option<String>,
    /// Version ID of the new object.
    pub version_id: Option<String>,
    /// AWS request ID.
    pub request_id: Option<String>,
}

/// Response from opening a multipart upload.
#[derive(Debug, Clone)]
pub struct CreateMultipartUploadOutput {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Upload ID.
    pub upload_id: String,
    /// AWS request ID.
    pub request_id: Option<String>,
}

/// Response from uploading a part.
#[derive(Debug, Clone)]
pub struct UploadPartOutput {
    /// ETag of the part.
    pub e_tag: String,
    /// CRC32C echoed by the store.
    pub checksum_crc32c: Option<String>,
    /// SHA-256 echoed by the store.
    pub checksum_sha256: Option<String>,
    /// AWS request ID.
    pub request_id: Option<String>,
}

/// Response from a part copy.
#[derive(Debug, Clone)]
pub struct UploadPartCopyOutput {
    /// ETag of the part.
    pub e_tag: String,
    /// Last modified.
    pub last_modified: Option<String>,
    /// AWS request ID.
    pub request_id: Option<String>,
}

/// Response from completing a multipart upload.
#[derive(Debug, Clone, Default)]
pub struct CompleteMultipartUploadOutput {
    /// Bucket name.
    pub bucket: Option<String>,
    /// Object key.
    pub key: Option<String>,
    /// ETag of the final object.
    pub e_tag: Option<String>,
    /// Object location.
    pub location: Option<String>,
    /// Version ID.
    pub version_id: Option<String>,
    /// Full-object CRC32C reported by the store.
    pub checksum_crc32c: Option<String>,
    /// AWS request ID.
    pub request_id: Option<String>,
}

/// One page of ListParts.
#[derive(Debug, Clone, Default)]
pub struct ListPartsOutput {
    /// Bucket name.
    pub bucket: Option<String>,
    /// Object key.
    pub key: Option<String>,
    /// Upload ID.
    pub upload_id: Option<String>,
    /// Marker this page started after.
    pub part_number_marker: Option<u32>,
    /// Marker for the next page.
    pub next_part_number_marker: Option<u32>,
    /// Page size.
    pub max_parts: Option<u32>,
    /// Whether more pages follow.
    pub is_truncated: bool,
    /// Parts on this page.
    pub parts: Vec<Part>,
    /// AWS request ID.
    pub request_id: Option<String>,
}
