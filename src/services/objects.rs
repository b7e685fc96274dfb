//! Single-request object operations: PUT, HEAD and server-side copy.

use super::context::{document_to_error, ServiceContext, Target};
use crate::error::{ResponseError, S3Error};
use crate::types::*;
use crate::xml::{self, ResultDocument};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Service for single-request object operations.
pub struct ObjectsService {
    ctx: Arc<ServiceContext>,
}

impl ObjectsService {
    /// Create a new objects service.
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Store an object in a single PUT.
    #[instrument(skip(self, request), fields(bucket = %request.bucket, key = %request.key, size = request.body.len()))]
    pub async fn put(&self, request: PutObjectRequest) -> Result<PutObjectOutput, S3Error> {
        let mut headers = request.headers;
        request.attributes.apply_headers(&mut headers);

        let response = self
            .ctx
            .send(
                Target::object("PUT", &request.bucket, &request.key),
                headers,
                Some(request.body),
            )
            .await?;

        Ok(PutObjectOutput {
            e_tag: response.etag().map(String::from),
            version_id: response.get_header("x-amz-version-id").map(String::from),
            request_id: response.request_id().map(String::from),
        })
    }

    /// Fetch an object's size, ETag and metadata.
    #[instrument(skip(self, request), fields(bucket = %request.bucket, key = %request.key))]
    pub async fn head(&self, request: HeadObjectRequest) -> Result<HeadObjectOutput, S3Error> {
        let mut headers = HashMap::new();
        if let Some(ref etag) = request.if_match {
            headers.insert("if-match".to_string(), etag.clone());
        }
        let query = request
            .version_id
            .as_ref()
            .map(|v| format!("versionId={}", crate::signing::uri_encode_query(v)));

        let mut target = Target::object("HEAD", &request.bucket, &request.key);
        if let Some(ref query) = query {
            target = target.with_query(query);
        }
        let response = self.ctx.send(target, headers, None).await?;

        let content_length =
            response
                .content_length()
                .ok_or(S3Error::Response(ResponseError::MissingField {
                    field: "Content-Length".to_string(),
                }))?;

        let metadata = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                let lower = name.to_ascii_lowercase();
                lower
                    .strip_prefix("x-amz-meta-")
                    .map(|key| (key.to_string(), value.clone()))
            })
            .collect();

        Ok(HeadObjectOutput {
            e_tag: response.etag().map(String::from),
            content_length,
            content_type: response.content_type().map(String::from),
            last_modified: response.get_header("last-modified").map(String::from),
            version_id: response.get_header("x-amz-version-id").map(String::from),
            storage_class: response
                .get_header("x-amz-storage-class")
                .and_then(|s| s.parse().ok()),
            metadata,
            parts_count: response
                .get_header("x-amz-mp-parts-count")
                .and_then(|s| s.parse().ok()),
            request_id: response.request_id().map(String::from),
        })
    }

    /// Copy an object server-side in one request.
    ///
    /// The store accepts this only for sources up to 5 GiB.
    #[instrument(skip(self, request), fields(
        source = %request.source.header_value(),
        bucket = %request.dest_bucket,
        key = %request.dest_key
    ))]
    pub async fn copy(&self, request: CopyObjectRequest) -> Result<CopyObjectOutput, S3Error> {
        let mut headers = HashMap::new();
        headers.insert(
            "x-amz-copy-source".to_string(),
            request.source.header_value(),
        );
        if let Some(ref etag) = request.copy_source_if_match {
            headers.insert("x-amz-copy-source-if-match".to_string(), etag.clone());
        }

        let mut attributes = request.attributes.clone();
        match request.metadata_directive {
            Some(directive) => {
                headers.insert(
                    "x-amz-metadata-directive".to_string(),
                    directive.as_str().to_string(),
                );
                if directive == MetadataDirective::Copy {
                    strip_replaced_metadata(&mut attributes);
                }
            }
            None => strip_replaced_metadata(&mut attributes),
        }
        match request.tagging_directive {
            Some(directive) => {
                headers.insert(
                    "x-amz-tagging-directive".to_string(),
                    directive.as_str().to_string(),
                );
                if directive == TaggingDirective::Copy {
                    attributes.tags.clear();
                }
            }
            None => attributes.tags.clear(),
        }
        attributes.apply_headers(&mut headers);

        let response = self
            .ctx
            .send(
                Target::object("PUT", &request.dest_bucket, &request.dest_key),
                headers,
                None,
            )
            .await?;
        let request_id = response.request_id().map(String::from);

        let body = String::from_utf8_lossy(&response.body);
        match xml::parse_copy_result(&body)? {
            ResultDocument::Ok(result) => Ok(CopyObjectOutput {
                e_tag: result.e_tag,
                last_modified: result.last_modified,
                version_id: response.get_header("x-amz-version-id").map(String::from),
                request_id,
            }),
            ResultDocument::Error(document) => Err(document_to_error(
                document,
                &request.dest_bucket,
                Some(&request.dest_key),
                request_id,
            )),
        }
    }
}

/// With a `COPY` directive the new object keeps the source's metadata, so
/// only storage and encryption settings are sent.
fn strip_replaced_metadata(attributes: &mut ObjectAttributes) {
    attributes.content_type = None;
    attributes.content_encoding = None;
    attributes.content_disposition = None;
    attributes.cache_control = None;
    attributes.metadata.clear();
}

impl std::fmt::Debug for ObjectsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectsService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigurationError, ObjectError};
    use crate::mocks::{MockResponse, MockSigner, MockTransport, TestFixtures};
    use bytes::Bytes;

    fn service(transport: Arc<MockTransport>) -> ObjectsService {
        ObjectsService::new(TestFixtures::context(transport))
    }

    #[tokio::test]
    async fn test_put_sends_body_and_attributes() {
        let transport = Arc::new(MockTransport::with_responses(vec![MockResponse::etag(
            "\"abc\"",
        )
        .with_header("x-amz-version-id", "v1")]));
        let objects = service(transport.clone());

        let request = PutObjectRequest::new("test-bucket", "dir/a b.txt", Bytes::from("hello"))
            .with_attributes(ObjectAttributes::default().with_content_type("text/plain"))
            .with_header("content-md5", "XUFAKrxLKna5cZ2REBfFkg==");
        let output = objects.put(request).await.unwrap();

        assert_eq!(output.e_tag.as_deref(), Some("\"abc\""));
        assert_eq!(output.version_id.as_deref(), Some("v1"));

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.method, "PUT");
        assert_eq!(
            sent.url,
            "https://test-bucket.s3.us-east-1.amazonaws.com/dir/a%20b.txt"
        );
        assert_eq!(sent.get_header("content-type"), Some("text/plain"));
        assert_eq!(sent.get_header("content-length"), Some("5"));
        assert_eq!(
            sent.get_header("content-md5"),
            Some("XUFAKrxLKna5cZ2REBfFkg==")
        );
        assert_eq!(sent.body, Some(Bytes::from("hello")));
    }

    #[tokio::test]
    async fn test_head_parses_size_and_metadata() {
        let transport = Arc::new(MockTransport::with_responses(vec![MockResponse::ok()
            .with_headers(TestFixtures::head_object_headers(
                12_582_912,
                "\"abc-3\"",
            ))
            .with_header("x-amz-meta-Owner", "ops")
            .with_header("x-amz-mp-parts-count", "3")]));
        let objects = service(transport);

        let head = objects
            .head(HeadObjectRequest::new("test-bucket", "big.bin"))
            .await
            .unwrap();

        assert_eq!(head.content_length, 12_582_912);
        assert_eq!(head.e_tag.as_deref(), Some("\"abc-3\""));
        assert_eq!(head.parts_count, Some(3));
        assert_eq!(head.metadata.get("owner").map(String::as_str), Some("ops"));
    }

    #[tokio::test]
    async fn test_head_not_found_without_body() {
        let transport = Arc::new(MockTransport::with_responses(vec![MockResponse::error(
            404,
            Bytes::new(),
        )]));
        let objects = service(transport);

        let err = objects
            .head(HeadObjectRequest::new("test-bucket", "missing"))
            .await
            .unwrap_err();

        match err {
            S3Error::Object(ObjectError::NotFound { bucket, key, .. }) => {
                assert_eq!(bucket, "test-bucket");
                assert_eq!(key, "missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_copy_with_directives() {
        let transport = Arc::new(MockTransport::with_responses(vec![
            MockResponse::ok_with_body(TestFixtures::copy_object_xml("\"copied\"")),
        ]));
        let objects = service(transport.clone());

        let request = CopyObjectRequest::new(
            CopySource::new("src-bucket", "src/key"),
            "test-bucket",
            "dst",
        )
        .with_metadata_directive(MetadataDirective::Replace)
        .with_attributes(
            ObjectAttributes::default()
                .with_content_type("application/json")
                .with_tag("team", "storage"),
        )
        .with_source_if_match("\"src-etag\"");

        let output = objects.copy(request).await.unwrap();
        assert_eq!(output.e_tag.as_deref(), Some("\"copied\""));

        let sent = transport.last_request().unwrap();
        assert_eq!(
            sent.get_header("x-amz-copy-source"),
            Some("/src-bucket/src/key")
        );
        assert_eq!(sent.get_header("x-amz-metadata-directive"), Some("REPLACE"));
        assert_eq!(sent.get_header("content-type"), Some("application/json"));
        // Tags are only sent with a REPLACE tagging directive.
        assert_eq!(sent.get_header("x-amz-tagging"), None);
        assert_eq!(
            sent.get_header("x-amz-copy-source-if-match"),
            Some("\"src-etag\"")
        );
    }

    #[tokio::test]
    async fn test_copy_error_in_ok_response() {
        let transport = Arc::new(MockTransport::with_responses(vec![
            MockResponse::ok_with_body(TestFixtures::error_xml(
                "InternalError",
                "We encountered an internal error.",
            )),
        ]));
        let objects = service(transport);

        let err = objects
            .copy(CopyObjectRequest::new(
                CopySource::new("src", "a"),
                "test-bucket",
                "b",
            ))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.s3_error_code(), Some("InternalError"));
    }

    #[tokio::test]
    async fn test_redirect_updates_region_and_retries() {
        let transport = Arc::new(MockTransport::with_responses(vec![
            MockResponse::error(301, Bytes::new()).with_header("x-amz-bucket-region", "eu-west-1"),
            MockResponse::etag("\"abc\""),
        ]));
        let signer = Arc::new(MockSigner::new());
        let ctx = TestFixtures::context_with(TestFixtures::config(), transport.clone(), signer.clone());
        let objects = ObjectsService::new(ctx.clone());

        objects
            .put(PutObjectRequest::new("test-bucket", "k", Bytes::from("x")))
            .await
            .unwrap();

        assert_eq!(ctx.regions().get("test-bucket").as_deref(), Some("eu-west-1"));
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].url.contains("s3.eu-west-1.amazonaws.com"));
        assert_eq!(signer.last_sign_request().unwrap().region, "eu-west-1");
    }

    #[tokio::test]
    async fn test_repeated_redirect_surfaces_wrong_region() {
        let transport = Arc::new(MockTransport::with_default(
            MockResponse::error(301, Bytes::new()).with_header("x-amz-bucket-region", "ap-south-1"),
        ));
        let signer = Arc::new(MockSigner::new());
        let ctx = TestFixtures::context_with(TestFixtures::config(), transport.clone(), signer);
        ctx.regions().insert("test-bucket", "eu-west-1");
        let objects = ObjectsService::new(ctx);

        let err = objects
            .put(PutObjectRequest::new("test-bucket", "k", Bytes::from("x")))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            S3Error::Configuration(ConfigurationError::WrongRegion { .. })
        ));
    }
}
