//! S3-compatible object storage client built around a multipart transfer
//! engine.
//!
//! # Features
//!
//! - **Multipart uploads**: automatic part sizing, sequential or parallel
//!   part uploads with bounded memory, and a single abort on failure
//! - **Compose and copy**: new objects assembled from ranges of existing
//!   objects with server-side part copies
//! - **Checksums**: MD5, SHA-256 and CRC32C per part or for the whole object
//! - **AWS Signature V4**: with per-bucket regions learned from redirects
//! - **S3-Compatible**: Works with MinIO, LocalStack, R2, etc.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use s3_transfer::{PartSource, S3Client, UploadRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), s3_transfer::S3Error> {
//!     // Create client from environment
//!     let client = s3_transfer::create_client_from_env()?;
//!
//!     // Upload a file, in parts if it is large
//!     let source = PartSource::from_path("backup.tar").await?;
//!     let output = client
//!         .transfer()
//!         .upload(UploadRequest::new("my-bucket", "backup.tar"), source)
//!         .await?;
//!
//!     println!("Uploaded {} bytes in {} parts", output.size, output.part_count);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod mocks;
pub mod services;
pub mod signing;
pub mod transfer;
pub mod transport;
pub mod types;
pub mod xml;

// Re-export main types at crate root
pub use client::{S3Client, S3ClientBuilder, S3ClientImpl};
pub use config::{RegionCache, S3Config};
pub use credentials::{
    AwsCredentials, CredentialsProvider, EnvCredentialsProvider, StaticCredentialsProvider,
};
pub use error::{
    AccessError, BucketError, ConfigurationError, CredentialsError, MultipartError, NetworkError,
    ObjectError, PartFailure, RequestError, ResponseError, S3Error, ServerError, SigningError,
    TransferError,
};
pub use services::{MultipartService, ObjectsService};
pub use signing::{AwsSigner, AwsSignerV4};
pub use transfer::{
    plan_parts, ChecksumAlgorithm, ChecksumMode, ComposeRequest, ComposeSource, CopyRequest,
    PartSource, ProgressCallback, TransferManager, TransferProgress, UploadOutput, UploadRequest,
    MAX_MULTIPART_COUNT, MAX_OBJECT_SIZE, MAX_PART_SIZE, MIN_PART_SIZE,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{
    // Request types
    AbortMultipartUploadRequest,
    CompleteMultipartUploadRequest,
    CopyObjectRequest,
    CreateMultipartUploadRequest,
    HeadObjectRequest,
    ListPartsRequest,
    PutObjectRequest,
    UploadPartCopyRequest,
    UploadPartRequest,
    // Response types
    CompleteMultipartUploadOutput,
    CopyObjectOutput,
    CreateMultipartUploadOutput,
    HeadObjectOutput,
    ListPartsOutput,
    PutObjectOutput,
    UploadPartCopyOutput,
    UploadPartOutput,
    // Common types
    CompletedPart,
    CopySource,
    MetadataDirective,
    ObjectAttributes,
    Part,
    ServerSideEncryption,
    StorageClass,
    Tag,
    TaggingDirective,
};

/// Create a new S3 client from environment variables.
///
/// This will attempt to read configuration from:
/// - `AWS_REGION` / `AWS_DEFAULT_REGION` for region
/// - `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` for credentials
/// - `AWS_SESSION_TOKEN` for temporary credentials
/// - `AWS_ENDPOINT_URL_S3` / `AWS_ENDPOINT_URL` for custom endpoints
/// - `S3_TRANSFER_*` for path style and multipart settings
///
/// # Example
///
/// ```rust,no_run
/// let client = s3_transfer::create_client_from_env()?;
/// # Ok::<(), s3_transfer::S3Error>(())
/// ```
pub fn create_client_from_env() -> Result<impl S3Client> {
    S3ClientBuilder::new().from_env().build()
}

/// Create a new S3 client with explicit configuration.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use s3_transfer::{AwsCredentials, S3Config, StaticCredentialsProvider};
///
/// let config = S3Config::builder()
///     .region("us-west-2")
///     .credentials_provider(Arc::new(StaticCredentialsProvider::new(
///         AwsCredentials::new("AKID", "SECRET"),
///     )))
///     .multipart_concurrency(8)
///     .build()?;
///
/// let client = s3_transfer::create_client(config)?;
/// # Ok::<(), s3_transfer::S3Error>(())
/// ```
pub fn create_client(config: S3Config) -> Result<impl S3Client> {
    S3ClientBuilder::new().config(config).build()
}

/// Result type alias for S3 operations.
pub type Result<T> = std::result::Result<T, S3Error>;
