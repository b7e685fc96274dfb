//! Mapping from S3 error documents and HTTP statuses to typed errors.

use super::*;

/// Parsed S3 `<Error>` document.
#[derive(Debug, Clone, Default)]
pub struct S3ErrorResponse {
    /// S3 error code (e.g., "NoSuchKey").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Affected bucket, if any.
    pub bucket: Option<String>,
    /// Affected key, if any.
    pub key: Option<String>,
    /// Upload ID, for multipart errors.
    pub upload_id: Option<String>,
    /// Region reported by a redirect.
    pub region: Option<String>,
    /// AWS request ID.
    pub request_id: Option<String>,
    /// Extended request ID.
    pub host_id: Option<String>,
}

fn non_empty(message: String) -> Option<String> {
    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}

/// Map an S3 error code to a typed error.
///
/// Codes without a dedicated variant become `ServerError::InternalError`
/// carrying the code and message.
pub fn map_s3_error_code(code: &str, response: Option<S3ErrorResponse>) -> S3Error {
    let resp = response.unwrap_or_else(|| S3ErrorResponse {
        code: code.to_string(),
        ..Default::default()
    });

    match code {
        "NoSuchBucket" => S3Error::Bucket(BucketError::NotFound {
            bucket: resp.bucket.unwrap_or_default(),
            request_id: resp.request_id,
        }),

        "NoSuchKey" => S3Error::Object(ObjectError::NotFound {
            bucket: resp.bucket.unwrap_or_default(),
            key: resp.key.unwrap_or_default(),
            request_id: resp.request_id,
        }),
        "PreconditionFailed" => S3Error::Object(ObjectError::PreconditionFailed {
            bucket: resp.bucket.unwrap_or_default(),
            key: resp.key.unwrap_or_default(),
            condition: resp.message,
            request_id: resp.request_id,
        }),

        "NoSuchUpload" => S3Error::Multipart(MultipartError::UploadNotFound {
            bucket: resp.bucket.unwrap_or_default(),
            key: resp.key.unwrap_or_default(),
            upload_id: resp.upload_id.unwrap_or_default(),
            request_id: resp.request_id,
        }),
        "InvalidPart" => S3Error::Multipart(MultipartError::InvalidPart {
            part_number: 0,
            reason: resp.message,
            request_id: resp.request_id,
        }),
        "InvalidPartOrder" => S3Error::Multipart(MultipartError::InvalidPartOrder {
            request_id: resp.request_id,
        }),
        "TooManyParts" => S3Error::Multipart(MultipartError::TooManyParts {
            request_id: resp.request_id,
        }),

        "AccessDenied" => S3Error::Access(AccessError::AccessDenied {
            message: non_empty(resp.message),
            request_id: resp.request_id,
        }),
        "InvalidAccessKeyId" => S3Error::Access(AccessError::InvalidAccessKeyId {
            request_id: resp.request_id,
        }),
        "SignatureDoesNotMatch" => S3Error::Access(AccessError::SignatureDoesNotMatch {
            request_id: resp.request_id,
        }),
        "ExpiredToken" => S3Error::Access(AccessError::ExpiredToken {
            request_id: resp.request_id,
        }),

        "InternalError" => S3Error::Server(ServerError::InternalError {
            message: non_empty(resp.message),
            request_id: resp.request_id,
        }),
        "ServiceUnavailable" => S3Error::Server(ServerError::ServiceUnavailable {
            retry_after: None,
            request_id: resp.request_id,
        }),
        "SlowDown" => S3Error::Server(ServerError::SlowDown {
            retry_after: None,
            request_id: resp.request_id,
        }),

        "PermanentRedirect" | "TemporaryRedirect" | "AuthorizationHeaderMalformed" => {
            S3Error::Configuration(ConfigurationError::WrongRegion {
                correct_region: resp.region.unwrap_or_else(|| "unknown".to_string()),
                configured_region: "unknown".to_string(),
            })
        }

        "InvalidBucketName" => S3Error::Request(RequestError::InvalidBucketName {
            bucket: resp.bucket.unwrap_or_default(),
            reason: resp.message,
        }),
        // A part copy whose range falls outside the source, usually because
        // the source shrank after it was resolved.
        "InvalidRange" => S3Error::Request(RequestError::Validation {
            message: format!("Copy range not satisfiable: {}", resp.message),
        }),
        "InvalidRequest" | "MalformedXML" | "InvalidArgument" => {
            S3Error::Request(RequestError::Validation {
                message: resp.message,
            })
        }
        "EntityTooLarge" => S3Error::Request(RequestError::EntityTooLarge {
            size: 0,
            max_size: crate::transfer::MAX_PART_SIZE,
        }),
        "EntityTooSmall" => S3Error::Request(RequestError::EntityTooSmall {
            size: 0,
            min_size: crate::transfer::MIN_PART_SIZE,
        }),

        _ => S3Error::Server(ServerError::InternalError {
            message: Some(format!("Unknown S3 error code: {} - {}", code, resp.message)),
            request_id: resp.request_id,
        }),
    }
}

/// Map an HTTP status code to an error when no S3 error document is available.
pub fn map_http_status(status: u16, request_id: Option<String>) -> S3Error {
    match status {
        301 | 307 => S3Error::Configuration(ConfigurationError::WrongRegion {
            correct_region: "unknown".to_string(),
            configured_region: "unknown".to_string(),
        }),
        400 => S3Error::Request(RequestError::Validation {
            message: "Bad request".to_string(),
        }),
        403 => S3Error::Access(AccessError::AccessDenied {
            message: None,
            request_id,
        }),
        404 => S3Error::Object(ObjectError::NotFound {
            bucket: String::new(),
            key: String::new(),
            request_id,
        }),
        412 => S3Error::Object(ObjectError::PreconditionFailed {
            bucket: String::new(),
            key: String::new(),
            condition: "Precondition failed".to_string(),
            request_id,
        }),
        416 => S3Error::Request(RequestError::Validation {
            message: "Copy range not satisfiable".to_string(),
        }),
        500 => S3Error::Server(ServerError::InternalError {
            message: None,
            request_id,
        }),
        502 => S3Error::Server(ServerError::BadGateway { request_id }),
        503 => S3Error::Server(ServerError::ServiceUnavailable {
            retry_after: None,
            request_id,
        }),
        _ => S3Error::Server(ServerError::InternalError {
            message: Some(format!("HTTP status {}", status)),
            request_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_no_such_upload_keeps_upload_id() {
        let error = map_s3_error_code(
            "NoSuchUpload",
            Some(S3ErrorResponse {
                code: "NoSuchUpload".into(),
                message: "The specified upload does not exist".into(),
                bucket: Some("my-bucket".into()),
                key: Some("my-key".into()),
                upload_id: Some("upload-1".into()),
                request_id: Some("ABC123".into()),
                ..Default::default()
            }),
        );

        match error {
            S3Error::Multipart(MultipartError::UploadNotFound {
                bucket,
                key,
                upload_id,
                request_id,
            }) => {
                assert_eq!(bucket, "my-bucket");
                assert_eq!(key, "my-key");
                assert_eq!(upload_id, "upload-1");
                assert_eq!(request_id.as_deref(), Some("ABC123"));
            }
            other => panic!("Expected MultipartError::UploadNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_map_no_such_key() {
        let error = map_s3_error_code(
            "NoSuchKey",
            Some(S3ErrorResponse {
                code: "NoSuchKey".into(),
                bucket: Some("my-bucket".into()),
                key: Some("my-key".into()),
                request_id: Some("DEF456".into()),
                ..Default::default()
            }),
        );

        assert!(matches!(
            error,
            S3Error::Object(ObjectError::NotFound { ref key, .. }) if key == "my-key"
        ));
        assert_eq!(error.request_id(), Some("DEF456"));
    }

    #[test]
    fn test_map_redirect_carries_region() {
        let error = map_s3_error_code(
            "PermanentRedirect",
            Some(S3ErrorResponse {
                code: "PermanentRedirect".into(),
                region: Some("eu-west-1".into()),
                ..Default::default()
            }),
        );

        match error {
            S3Error::Configuration(ConfigurationError::WrongRegion { correct_region, .. }) => {
                assert_eq!(correct_region, "eu-west-1");
            }
            other => panic!("Expected WrongRegion, got {other:?}"),
        }
    }

    #[test]
    fn test_map_slow_down() {
        let error = map_s3_error_code("SlowDown", None);
        assert!(matches!(error, S3Error::Server(ServerError::SlowDown { .. })));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_map_unknown_code() {
        match map_s3_error_code("SomeUnknownError", None) {
            S3Error::Server(ServerError::InternalError {
                message: Some(message),
                ..
            }) => assert!(message.contains("SomeUnknownError")),
            other => panic!("Expected ServerError::InternalError, got {other:?}"),
        }
    }

    #[test]
    fn test_map_invalid_copy_range() {
        let error = map_s3_error_code(
            "InvalidRange",
            Some(S3ErrorResponse {
                code: "InvalidRange".into(),
                message: "The requested range is not satisfiable".into(),
                ..Default::default()
            }),
        );
        assert!(error.is_validation());
        assert!(error.to_string().contains("not satisfiable"));
        assert!(map_http_status(416, None).is_validation());
    }

    #[test]
    fn test_map_http_status() {
        assert!(matches!(
            map_http_status(403, None),
            S3Error::Access(AccessError::AccessDenied { .. })
        ));
        assert!(matches!(
            map_http_status(404, None),
            S3Error::Object(ObjectError::NotFound { .. })
        ));
        assert!(matches!(
            map_http_status(502, Some("r".into())),
            S3Error::Server(ServerError::BadGateway { .. })
        ));
        assert!(matches!(
            map_http_status(503, None),
            S3Error::Server(ServerError::ServiceUnavailable { .. })
        ));
    }
}
