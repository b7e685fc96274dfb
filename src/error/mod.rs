//! Error types for the S3 transfer client.
//!
//! Errors are categorized by their source so that callers can tell a request that
//! was invalid up front (never retried, nothing sent) from a transfer failure on
//! local data or a rejection by the remote store. Multipart failures carry the
//! upload id and keep every underlying cause, including a failed abort.

mod mapping;

pub use mapping::{map_http_status, map_s3_error_code, S3ErrorResponse};

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the S3 transfer client.
#[derive(Debug, Error)]
pub enum S3Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Credential-related errors.
    #[error("Credentials error: {0}")]
    Credentials(#[from] CredentialsError),

    /// AWS signing errors.
    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    /// Request validation errors.
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    /// Bucket operation errors.
    #[error("Bucket error: {0}")]
    Bucket(#[from] BucketError),

    /// Object operation errors.
    #[error("Object error: {0}")]
    Object(#[from] ObjectError),

    /// Multipart upload errors.
    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    /// Access and authorization errors.
    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    /// Network and transport errors.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Server-side errors.
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Response parsing errors.
    #[error("Response error: {0}")]
    Response(#[from] ResponseError),

    /// Local data transfer errors.
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),
}

impl S3Error {
    /// Returns true if the error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            S3Error::Network(e) => e.is_retryable(),
            S3Error::Server(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if the error was raised before any request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            S3Error::Request(_)
                | S3Error::Configuration(_)
                | S3Error::Transfer(TransferError::PartCountExceeded { .. })
        )
    }

    /// Returns the retry delay hint if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            S3Error::Server(ServerError::SlowDown { retry_after, .. }) => *retry_after,
            S3Error::Server(ServerError::ServiceUnavailable { retry_after, .. }) => *retry_after,
            _ => None,
        }
    }

    /// Returns the HTTP status code if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            S3Error::Access(_) => Some(403),
            S3Error::Bucket(BucketError::NotFound { .. }) => Some(404),
            S3Error::Object(ObjectError::NotFound { .. }) => Some(404),
            S3Error::Object(ObjectError::PreconditionFailed { .. }) => Some(412),
            S3Error::Multipart(MultipartError::UploadNotFound { .. }) => Some(404),
            S3Error::Request(_) => Some(400),
            S3Error::Server(ServerError::InternalError { .. }) => Some(500),
            S3Error::Server(ServerError::ServiceUnavailable { .. }) => Some(503),
            S3Error::Server(ServerError::SlowDown { .. }) => Some(503),
            S3Error::Server(ServerError::BadGateway { .. }) => Some(502),
            _ => None,
        }
    }

    /// Returns the S3 error code if available.
    pub fn s3_error_code(&self) -> Option<&str> {
        match self {
            S3Error::Bucket(e) => Some(e.code()),
            S3Error::Object(e) => Some(e.code()),
            S3Error::Multipart(e) => e.code(),
            S3Error::Access(e) => Some(e.code()),
            S3Error::Server(e) => Some(e.code()),
            _ => None,
        }
    }

    /// Returns the AWS request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            S3Error::Bucket(e) => e.request_id(),
            S3Error::Object(e) => e.request_id(),
            S3Error::Multipart(e) => e.request_id(),
            S3Error::Access(e) => e.request_id(),
            S3Error::Server(e) => e.request_id(),
            _ => None,
        }
    }

    /// Returns the failure raised by the abort call, if the upload was aborted and
    /// the abort itself failed.
    pub fn abort_error(&self) -> Option<&S3Error> {
        match self {
            S3Error::Multipart(MultipartError::Aborted { abort_error, .. }) => {
                abort_error.as_deref()
            }
            _ => None,
        }
    }

    /// Returns every per-part failure carried by this error.
    ///
    /// Looks through an `Aborted` wrapper so callers see the part failures of a
    /// parallel upload regardless of how the upload was torn down.
    pub fn part_failures(&self) -> &[PartFailure] {
        match self {
            S3Error::Multipart(MultipartError::PartsFailed { failures, .. }) => failures,
            S3Error::Multipart(MultipartError::Aborted { source, .. }) => source.part_failures(),
            S3Error::Transfer(TransferError::WorkerPanicked { failures, .. }) => failures,
            _ => &[],
        }
    }
}

impl From<std::io::Error> for S3Error {
    fn from(err: std::io::Error) -> Self {
        S3Error::Transfer(TransferError::Io {
            message: err.to_string(),
            source: err,
        })
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Invalid endpoint URL.
    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Details about the validation error.
        details: String,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfiguration {
        /// The configuration field name.
        field: String,
        /// Error message.
        message: String,
    },

    /// Wrong region detected (redirect response).
    #[error("Wrong region: bucket is in region '{correct_region}', not '{configured_region}'")]
    WrongRegion {
        /// The region where the bucket is located.
        correct_region: String,
        /// The region that was used for the request.
        configured_region: String,
    },
}

/// Credential-related errors.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// No credentials could be found.
    #[error("Credentials not found: no credentials could be loaded from any source")]
    NotFound,

    /// Credentials have expired.
    #[error("Credentials expired: session credentials expired at {expiration}")]
    Expired {
        /// When the credentials expired.
        expiration: String,
    },

    /// Credentials are invalid.
    #[error("Invalid credentials: {message}")]
    Invalid {
        /// Details about why credentials are invalid.
        message: String,
    },
}

/// AWS Signature V4 signing errors.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Signature calculation failed.
    #[error("Signature calculation failed: {message}")]
    CalculationFailed {
        /// Details about the calculation error.
        message: String,
    },
}

/// Request validation errors.
///
/// These are raised before any remote call is made.
#[derive(Debug, Error)]
pub enum RequestError {
    /// General validation error.
    #[error("Validation error: {message}")]
    Validation {
        /// Details about the validation error.
        message: String,
    },

    /// Invalid bucket name.
    #[error("Invalid bucket name '{bucket}': {reason}")]
    InvalidBucketName {
        /// The invalid bucket name.
        bucket: String,
        /// Reason why the name is invalid.
        reason: String,
    },

    /// Invalid object key.
    #[error("Invalid object key '{key}': {reason}")]
    InvalidObjectKey {
        /// The invalid object key.
        key: String,
        /// Reason why the key is invalid.
        reason: String,
    },

    /// Configured part size is outside the allowed range.
    #[error("Invalid part size {size}: must be between {min_size} and {max_size} bytes")]
    InvalidPartSize {
        /// The requested part size.
        size: u64,
        /// Minimum allowed part size.
        min_size: u64,
        /// Maximum allowed part size.
        max_size: u64,
    },

    /// Entity too large.
    #[error("Entity too large: {size} bytes exceeds maximum of {max_size} bytes")]
    EntityTooLarge {
        /// The size of the entity.
        size: u64,
        /// Maximum allowed size.
        max_size: u64,
    },

    /// Entity too small.
    #[error("Entity too small: {size} bytes is below minimum of {min_size} bytes")]
    EntityTooSmall {
        /// The size of the entity.
        size: u64,
        /// Minimum required size.
        min_size: u64,
    },

    /// A compose source cannot be used as planned.
    #[error("Invalid compose source '{bucket}/{key}': {reason}")]
    InvalidComposeSource {
        /// Source bucket.
        bucket: String,
        /// Source key.
        key: String,
        /// Reason the source was rejected.
        reason: String,
    },

    /// A copy directive that cannot be honoured by a multipart copy.
    #[error("{directive} directive is not applicable to source objects larger than {max_size} bytes (size {size})")]
    IncompatibleDirective {
        /// Directive name (e.g. "COPY metadata").
        directive: String,
        /// Source size.
        size: u64,
        /// Largest source a single copy supports.
        max_size: u64,
    },
}

/// Bucket operation errors.
#[derive(Debug, Error)]
pub enum BucketError {
    /// Bucket not found.
    #[error("Bucket not found: '{bucket}'")]
    NotFound {
        /// The bucket name.
        bucket: String,
        /// AWS request ID.
        request_id: Option<String>,
    },
}

impl BucketError {
    /// Returns the S3 error code.
    pub fn code(&self) -> &str {
        match self {
            BucketError::NotFound { .. } => "NoSuchBucket",
        }
    }

    /// Returns the AWS request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            BucketError::NotFound { request_id, .. } => request_id.as_deref(),
        }
    }
}

/// Object operation errors.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// Object not found.
    #[error("Object not found: '{bucket}/{key}'")]
    NotFound {
        /// The bucket name.
        bucket: String,
        /// The object key.
        key: String,
        /// AWS request ID.
        request_id: Option<String>,
    },

    /// Precondition failed (If-Match, copy-source-if-match, etc.).
    #[error("Precondition failed for '{bucket}/{key}': {condition}")]
    PreconditionFailed {
        /// The bucket name.
        bucket: String,
        /// The object key.
        key: String,
        /// The condition that failed.
        condition: String,
        /// AWS request ID.
        request_id: Option<String>,
    },
}

impl ObjectError {
    /// Returns the S3 error code.
    pub fn code(&self) -> &str {
        match self {
            ObjectError::NotFound { .. } => "NoSuchKey",
            ObjectError::PreconditionFailed { .. } => "PreconditionFailed",
        }
    }

    /// Returns the AWS request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ObjectError::NotFound { request_id, .. }
            | ObjectError::PreconditionFailed { request_id, .. } => request_id.as_deref(),
        }
    }
}

/// One failed part of a multipart upload.
#[derive(Debug)]
pub struct PartFailure {
    /// The part number that failed.
    pub part_number: u32,
    /// Why it failed.
    pub error: S3Error,
}

impl fmt::Display for PartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part {}: {}", self.part_number, self.error)
    }
}

fn describe_failures(failures: &[PartFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_other_failures(failures: &[PartFailure]) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!(" (also failed: {})", describe_failures(failures))
    }
}

/// Multipart upload errors.
#[derive(Debug, Error)]
pub enum MultipartError {
    /// Upload not found.
    #[error("Upload not found: upload_id '{upload_id}' for '{bucket}/{key}'")]
    UploadNotFound {
        /// The bucket name.
        bucket: String,
        /// The object key.
        key: String,
        /// The upload ID.
        upload_id: String,
        /// AWS request ID.
        request_id: Option<String>,
    },

    /// Invalid part.
    #[error("Invalid part {part_number}: {reason}")]
    InvalidPart {
        /// The part number.
        part_number: u32,
        /// Reason why the part is invalid.
        reason: String,
        /// AWS request ID.
        request_id: Option<String>,
    },

    /// Invalid part order.
    #[error("Invalid part order: parts must be in ascending order")]
    InvalidPartOrder {
        /// AWS request ID.
        request_id: Option<String>,
    },

    /// Too many parts.
    #[error("Too many parts: maximum is 10,000 parts")]
    TooManyParts {
        /// AWS request ID.
        request_id: Option<String>,
    },

    /// One or more part uploads failed.
    #[error("{} part(s) failed for upload '{upload_id}': {}", .failures.len(), describe_failures(.failures))]
    PartsFailed {
        /// The upload ID.
        upload_id: String,
        /// Every part failure, in the order they were observed.
        failures: Vec<PartFailure>,
    },

    /// The store answered the completion request with an error document.
    #[error("Completion of upload '{upload_id}' failed: {source}")]
    CompletionFailed {
        /// The upload ID.
        upload_id: String,
        /// The error embedded in the completion response.
        source: Box<S3Error>,
    },

    /// The upload failed and its session was aborted.
    #[error("Upload '{upload_id}' aborted: {source}")]
    Aborted {
        /// The upload ID.
        upload_id: String,
        /// The failure that caused the abort.
        source: Box<S3Error>,
        /// The abort call's own failure, if it failed.
        abort_error: Option<Box<S3Error>>,
    },
}

impl MultipartError {
    /// Returns the S3 error code, for errors that originate from the store.
    pub fn code(&self) -> Option<&str> {
        match self {
            MultipartError::UploadNotFound { .. } => Some("NoSuchUpload"),
            MultipartError::InvalidPart { .. } => Some("InvalidPart"),
            MultipartError::InvalidPartOrder { .. } => Some("InvalidPartOrder"),
            MultipartError::TooManyParts { .. } => Some("TooManyParts"),
            MultipartError::CompletionFailed { source, .. }
            | MultipartError::Aborted { source, .. } => source.s3_error_code(),
            MultipartError::PartsFailed { .. } => None,
        }
    }

    /// Returns the AWS request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            MultipartError::UploadNotFound { request_id, .. }
            | MultipartError::InvalidPart { request_id, .. }
            | MultipartError::InvalidPartOrder { request_id }
            | MultipartError::TooManyParts { request_id } => request_id.as_deref(),
            MultipartError::CompletionFailed { source, .. }
            | MultipartError::Aborted { source, .. } => source.request_id(),
            MultipartError::PartsFailed { .. } => None,
        }
    }

    /// Returns the upload ID this error refers to, if any.
    pub fn upload_id(&self) -> Option<&str> {
        match self {
            MultipartError::UploadNotFound { upload_id, .. }
            | MultipartError::PartsFailed { upload_id, .. }
            | MultipartError::CompletionFailed { upload_id, .. }
            | MultipartError::Aborted { upload_id, .. } => Some(upload_id),
            _ => None,
        }
    }
}

/// Access and authorization errors.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Access denied.
    #[error("Access denied")]
    AccessDenied {
        /// Additional message if available.
        message: Option<String>,
        /// AWS request ID.
        request_id: Option<String>,
    },

    /// Invalid access key ID.
    #[error("Invalid access key ID")]
    InvalidAccessKeyId {
        /// AWS request ID.
        request_id: Option<String>,
    },

    /// Signature does not match.
    #[error("Signature does not match")]
    SignatureDoesNotMatch {
        /// AWS request ID.
        request_id: Option<String>,
    },

    /// Expired token.
    #[error("Token has expired")]
    ExpiredToken {
        /// AWS request ID.
        request_id: Option<String>,
    },
}

impl AccessError {
    /// Returns the S3 error code.
    pub fn code(&self) -> &str {
        match self {
            AccessError::AccessDenied { .. } => "AccessDenied",
            AccessError::InvalidAccessKeyId { .. } => "InvalidAccessKeyId",
            AccessError::SignatureDoesNotMatch { .. } => "SignatureDoesNotMatch",
            AccessError::ExpiredToken { .. } => "ExpiredToken",
        }
    }

    /// Returns the AWS request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            AccessError::AccessDenied { request_id, .. }
            | AccessError::InvalidAccessKeyId { request_id }
            | AccessError::SignatureDoesNotMatch { request_id }
            | AccessError::ExpiredToken { request_id } => request_id.as_deref(),
        }
    }
}

/// Network and transport errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Connection failed.
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        /// Error message.
        message: String,
    },

    /// Request timed out.
    #[error("Request timed out after {duration:?}")]
    Timeout {
        /// The timeout duration.
        duration: Duration,
    },

    /// TLS/SSL error.
    #[error("TLS error: {message}")]
    TlsError {
        /// Error message.
        message: String,
    },
}

impl NetworkError {
    /// Returns true if the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NetworkError::ConnectionFailed { .. } | NetworkError::Timeout { .. }
        )
    }
}

/// Server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Internal server error (500).
    #[error("Internal server error")]
    InternalError {
        /// Error message.
        message: Option<String>,
        /// AWS request ID.
        request_id: Option<String>,
    },

    /// Service unavailable (503).
    #[error("Service unavailable")]
    ServiceUnavailable {
        /// Retry after duration hint.
        retry_after: Option<Duration>,
        /// AWS request ID.
        request_id: Option<String>,
    },

    /// Slow down (503) - rate limiting.
    #[error("Slow down - reduce request rate")]
    SlowDown {
        /// Retry after duration hint.
        retry_after: Option<Duration>,
        /// AWS request ID.
        request_id: Option<String>,
    },

    /// Bad gateway (502).
    #[error("Bad gateway")]
    BadGateway {
        /// AWS request ID.
        request_id: Option<String>,
    },
}

impl ServerError {
    /// Returns the S3 error code.
    pub fn code(&self) -> &str {
        match self {
            ServerError::InternalError { .. } => "InternalError",
            ServerError::ServiceUnavailable { .. } => "ServiceUnavailable",
            ServerError::SlowDown { .. } => "SlowDown",
            ServerError::BadGateway { .. } => "BadGateway",
        }
    }

    /// Returns the AWS request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ServerError::InternalError { request_id, .. }
            | ServerError::ServiceUnavailable { request_id, .. }
            | ServerError::SlowDown { request_id, .. }
            | ServerError::BadGateway { request_id } => request_id.as_deref(),
        }
    }

    /// Returns true if the error is retryable.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

/// Response parsing errors.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// XML parse error.
    #[error("XML parse error: {message}")]
    XmlParseError {
        /// Error message.
        message: String,
    },

    /// Invalid response format.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },

    /// Missing required field.
    #[error("Missing required field '{field}' in response")]
    MissingField {
        /// The missing field name.
        field: String,
    },
}

/// Errors reading or scheduling local data.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Reading the local data source failed.
    #[error("I/O error: {message}")]
    Io {
        /// Error message.
        message: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The source ended before the declared object size was read.
    #[error("Insufficient data: expected {expected} bytes, source ended after {received} bytes")]
    InsufficientData {
        /// Declared object size.
        expected: u64,
        /// Bytes actually available.
        received: u64,
    },

    /// More parts would be required than the store allows.
    #[error("Part count exceeded: object requires more than {max} parts")]
    PartCountExceeded {
        /// Maximum number of parts.
        max: u32,
    },

    /// A part worker task panicked or was cancelled.
    #[error("Part worker failed: {message}{}", describe_other_failures(.failures))]
    WorkerPanicked {
        /// Details from the join error.
        message: String,
        /// Part failures collected from the other workers.
        failures: Vec<PartFailure>,
    },

    /// The part queue was closed while parts were still being submitted.
    #[error("Part queue closed before all parts were submitted")]
    QueueClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_error_is_retryable() {
        let network_timeout = S3Error::Network(NetworkError::Timeout {
            duration: Duration::from_secs(30),
        });
        assert!(network_timeout.is_retryable());

        let server_error = S3Error::Server(ServerError::InternalError {
            message: None,
            request_id: None,
        });
        assert!(server_error.is_retryable());

        let access_denied = S3Error::Access(AccessError::AccessDenied {
            message: None,
            request_id: None,
        });
        assert!(!access_denied.is_retryable());

        let short = S3Error::Transfer(TransferError::InsufficientData {
            expected: 10,
            received: 8,
        });
        assert!(!short.is_retryable());
    }

    #[test]
    fn test_s3_error_status_code() {
        let access_denied = S3Error::Access(AccessError::AccessDenied {
            message: None,
            request_id: None,
        });
        assert_eq!(access_denied.status_code(), Some(403));

        let not_found = S3Error::Object(ObjectError::NotFound {
            bucket: "bucket".into(),
            key: "key".into(),
            request_id: None,
        });
        assert_eq!(not_found.status_code(), Some(404));
    }

    #[test]
    fn test_validation_errors() {
        let err = S3Error::Request(RequestError::InvalidPartSize {
            size: 1,
            min_size: 5,
            max_size: 10,
        });
        assert!(err.is_validation());

        let err = S3Error::Transfer(TransferError::PartCountExceeded { max: 10_000 });
        assert!(err.is_validation());

        let err = S3Error::Transfer(TransferError::QueueClosed);
        assert!(!err.is_validation());
    }

    #[test]
    fn test_parts_failed_display_lists_every_part() {
        let err = MultipartError::PartsFailed {
            upload_id: "u-1".into(),
            failures: vec![
                PartFailure {
                    part_number: 7,
                    error: S3Error::Server(ServerError::InternalError {
                        message: None,
                        request_id: None,
                    }),
                },
                PartFailure {
                    part_number: 9,
                    error: S3Error::Server(ServerError::BadGateway { request_id: None }),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("2 part(s) failed for upload 'u-1'"));
        assert!(text.contains("part 7: Server error: Internal server error"));
        assert!(text.contains("part 9: Server error: Bad gateway"));
    }

    #[test]
    fn test_aborted_keeps_primary_and_abort_error() {
        let primary = S3Error::Multipart(MultipartError::PartsFailed {
            upload_id: "u-1".into(),
            failures: vec![PartFailure {
                part_number: 3,
                error: S3Error::Server(ServerError::SlowDown {
                    retry_after: None,
                    request_id: None,
                }),
            }],
        });
        let abort = S3Error::Network(NetworkError::ConnectionFailed {
            message: "reset".into(),
        });
        let err = S3Error::Multipart(MultipartError::Aborted {
            upload_id: "u-1".into(),
            source: Box::new(primary),
            abort_error: Some(Box::new(abort)),
        });

        assert_eq!(err.part_failures().len(), 1);
        assert_eq!(err.part_failures()[0].part_number, 3);
        assert!(matches!(
            err.abort_error(),
            Some(S3Error::Network(NetworkError::ConnectionFailed { .. }))
        ));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: S3Error = io.into();
        assert!(matches!(err, S3Error::Transfer(TransferError::Io { .. })));
    }

    #[test]
    fn test_retry_after() {
        let slow_down = S3Error::Server(ServerError::SlowDown {
            retry_after: Some(Duration::from_secs(30)),
            request_id: None,
        });
        assert_eq!(slow_down.retry_after(), Some(Duration::from_secs(30)));
    }
}
