//! Common enums and data types for S3.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// S3 storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    /// Standard storage for frequently accessed data.
    #[default]
    Standard,
    /// Standard-IA for infrequently accessed data.
    StandardIa,
    /// One Zone-IA for infrequently accessed, non-critical data.
    OnezoneIa,
    /// Intelligent-Tiering for unknown or changing access patterns.
    IntelligentTiering,
    /// Glacier Instant Retrieval.
    GlacierInstantRetrieval,
    /// Glacier Flexible Retrieval.
    Glacier,
    /// Glacier Deep Archive.
    DeepArchive,
}

impl StorageClass {
    /// Returns the S3 API string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::OnezoneIa => "ONEZONE_IA",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::GlacierInstantRetrieval => "GLACIER_IR",
            StorageClass::Glacier => "GLACIER",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
        }
    }
}

impl std::str::FromStr for StorageClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(StorageClass::Standard),
            "STANDARD_IA" => Ok(StorageClass::StandardIa),
            "ONEZONE_IA" => Ok(StorageClass::OnezoneIa),
            "INTELLIGENT_TIERING" => Ok(StorageClass::IntelligentTiering),
            "GLACIER_IR" => Ok(StorageClass::GlacierInstantRetrieval),
            "GLACIER" => Ok(StorageClass::Glacier),
            "DEEP_ARCHIVE" => Ok(StorageClass::DeepArchive),
            _ => Err(format!("Unknown storage class: {}", s)),
        }
    }
}

/// Server-side encryption applied to new objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerSideEncryption {
    /// S3-managed keys (SSE-S3).
    Aes256,
    /// AWS KMS-managed keys (SSE-KMS).
    AwsKms {
        /// KMS key ID; the bucket default is used when absent.
        key_id: Option<String>,
    },
}

impl ServerSideEncryption {
    /// Value of the `x-amz-server-side-encryption` header.
    pub fn as_header_value(&self) -> &'static str {
        match self {
            ServerSideEncryption::Aes256 => "AES256",
            ServerSideEncryption::AwsKms { .. } => "aws:kms",
        }
    }
}

/// Whether a copy keeps the source metadata or replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataDirective {
    /// Keep the source object's metadata.
    Copy,
    /// Use the metadata supplied with the request.
    Replace,
}

impl MetadataDirective {
    /// Returns the S3 API string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataDirective::Copy => "COPY",
            MetadataDirective::Replace => "REPLACE",
        }
    }
}

/// Whether a copy keeps the source tags or replaces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaggingDirective {
    /// Keep the source object's tags.
    Copy,
    /// Use the tags supplied with the request.
    Replace,
}

impl TaggingDirective {
    /// Returns the S3 API string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaggingDirective::Copy => "COPY",
            TaggingDirective::Replace => "REPLACE",
        }
    }
}

/// An object tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Create a new tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Attributes given to a newly written object.
///
/// Sent with a single PUT, with the request that opens a multipart upload, and
/// with a copy whose directives are `REPLACE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectAttributes {
    /// Content type.
    pub content_type: Option<String>,
    /// Content encoding.
    pub content_encoding: Option<String>,
    /// Content disposition.
    pub content_disposition: Option<String>,
    /// Cache control directive.
    pub cache_control: Option<String>,
    /// Storage class.
    pub storage_class: Option<StorageClass>,
    /// Server-side encryption.
    pub server_side_encryption: Option<ServerSideEncryption>,
    /// User-defined metadata (without the `x-amz-meta-` prefix).
    pub metadata: HashMap<String, String>,
    /// Tags.
    pub tags: Vec<Tag>,
}

impl ObjectAttributes {
    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the storage class.
    pub fn with_storage_class(mut self, storage_class: StorageClass) -> Self {
        self.storage_class = Some(storage_class);
        self
    }

    /// Set server-side encryption.
    pub fn with_encryption(mut self, encryption: ServerSideEncryption) -> Self {
        self.server_side_encryption = Some(encryption);
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(key, value));
        self
    }

    /// Write these attributes as request headers.
    pub fn apply_headers(&self, headers: &mut HashMap<String, String>) {
        if let Some(ref content_type) = self.content_type {
            headers.insert("content-type".to_string(), content_type.clone());
        }
        if let Some(ref encoding) = self.content_encoding {
            headers.insert("content-encoding".to_string(), encoding.clone());
        }
        if let Some(ref disposition) = self.content_disposition {
            headers.insert("content-disposition".to_string(), disposition.clone());
        }
        if let Some(ref cache_control) = self.cache_control {
            headers.insert("cache-control".to_string(), cache_control.clone());
        }
        if let Some(storage_class) = self.storage_class {
            headers.insert(
                "x-amz-storage-class".to_string(),
                storage_class.as_str().to_string(),
            );
        }
        if let Some(ref sse) = self.server_side_encryption {
            headers.insert(
                "x-amz-server-side-encryption".to_string(),
                sse.as_header_value().to_string(),
            );
            if let ServerSideEncryption::AwsKms {
                key_id: Some(ref key_id),
            } = sse
            {
                headers.insert(
                    "x-amz-server-side-encryption-aws-kms-key-id".to_string(),
                    key_id.clone(),
                );
            }
        }
        for (key, value) in &self.metadata {
            headers.insert(format!("x-amz-meta-{}", key), value.clone());
        }
        if !self.tags.is_empty() {
            headers.insert("x-amz-tagging".to_string(), encode_tags(&self.tags));
        }
    }
}

/// Encode tags as the query-string form used by `x-amz-tagging`.
pub fn encode_tags(tags: &[Tag]) -> String {
    tags.iter()
        .map(|tag| {
            format!(
                "{}={}",
                crate::signing::uri_encode_query(&tag.key),
                crate::signing::uri_encode_query(&tag.value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// A remote object used as a copy source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    /// Source bucket.
    pub bucket: String,
    /// Source key.
    pub key: String,
    /// Source version.
    pub version_id: Option<String>,
}

impl CopySource {
    /// Create a copy source.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            version_id: None,
        }
    }

    /// Pin a version.
    pub fn with_version_id(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    /// Value of the `x-amz-copy-source` header.
    pub fn header_value(&self) -> String {
        let path = format!(
            "/{}/{}",
            self.bucket,
            crate::signing::uri_encode_path(&self.key)
        );
        match self.version_id {
            Some(ref version_id) => format!(
                "{}?versionId={}",
                path,
                crate::signing::uri_encode_query(version_id)
            ),
            None => path,
        }
    }
}

/// A part as reported by ListParts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Part number (1-10000).
    pub part_number: u32,
    /// ETag of the uploaded part.
    pub e_tag: String,
    /// Size of the part in bytes.
    pub size: Option<u64>,
    /// Last modified date.
    pub last_modified: Option<String>,
}

/// One entry of the completion manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// Part number.
    pub part_number: u32,
    /// ETag returned by the store for this part.
    pub e_tag: String,
    /// Number of bytes in the part.
    pub size: u64,
    /// Base64 CRC32C sent with the part, if any.
    pub checksum_crc32c: Option<String>,
    /// Base64 SHA-256 sent with the part, if any.
    pub checksum_sha256: Option<String>,
}

impl CompletedPart {
    /// Create a manifest entry without checksums.
    pub fn new(part_number: u32, e_tag: impl Into<String>, size: u64) -> Self {
        Self {
            part_number,
            e_tag: e_tag.into(),
            size,
            checksum_crc32c: None,
            checksum_sha256: None,
        }
    }
}

impl From<Part> for CompletedPart {
    fn from(part: Part) -> Self {
        Self::new(part.part_number, part.e_tag, part.size.unwrap_or(0))
    }
}
