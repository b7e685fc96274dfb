//! Mock implementations for testing.
//!
//! `MockTransport` stands in for the network, `MockSigner` for SigV4, and
//! `TestFixtures` supplies canned S3 documents plus a router that answers the
//! multipart protocol well enough to drive a whole transfer.

mod credentials;
mod signer;
mod transport;

pub use credentials::MockCredentialsProvider;
pub use signer::{MockSigner, SignRequest};
pub use transport::{MockHandler, MockResponse, MockResponseBuilder, MockTransport};

use crate::config::{RegionCache, S3Config};
use crate::services::ServiceContext;
use crate::transport::HttpRequest;
use std::collections::HashMap;
use std::sync::Arc;

/// Test fixtures for S3 operations.
pub struct TestFixtures;

impl TestFixtures {
    /// Bucket used by the fixtures.
    pub const BUCKET: &'static str = "test-bucket";

    /// Key used by the fixtures.
    pub const KEY: &'static str = "test-key.bin";

    /// Configuration pointing at `us-east-1` with mock credentials.
    pub fn config() -> S3Config {
        S3Config {
            region: "us-east-1".to_string(),
            credentials_provider: Arc::new(MockCredentialsProvider::new()),
            ..Default::default()
        }
    }

    /// A service context over the given transport and a mock signer.
    pub fn context(transport: Arc<MockTransport>) -> Arc<ServiceContext> {
        Self::context_with(Self::config(), transport, Arc::new(MockSigner::new()))
    }

    /// A service context with explicit parts.
    pub fn context_with(
        config: S3Config,
        transport: Arc<MockTransport>,
        signer: Arc<MockSigner>,
    ) -> Arc<ServiceContext> {
        Arc::new(ServiceContext::new(
            Arc::new(config),
            transport,
            signer,
            Arc::new(RegionCache::new()),
        ))
    }

    /// The `partNumber` of a request, if it targets a part.
    pub fn part_number(request: &HttpRequest) -> Option<u32> {
        request
            .query_param("partNumber")
            .and_then(|value| value.parse().ok())
    }

    /// The ETag the router answers for a part.
    pub fn part_etag(part_number: u32) -> String {
        format!("\"etag-{}\"", part_number)
    }

    /// A handler that answers the multipart protocol for `upload_id`.
    ///
    /// Parts answer with `part_etag(n)`, single PUTs with `"single-etag"`,
    /// completions with `complete_multipart_xml()` and aborts with 204.
    pub fn multipart_router(
        upload_id: &str,
    ) -> impl Fn(&HttpRequest) -> Option<MockResponse> + Send + Sync + 'static {
        let upload_id = upload_id.to_string();
        move |request: &HttpRequest| {
            let has_upload_id = request.query_param("uploadId").is_some();
            let is_copy = request.get_header("x-amz-copy-source").is_some();
            match request.method.as_str() {
                "POST" if request.query_param("uploads").is_some() => Some(
                    MockResponse::ok_with_body(Self::create_multipart_xml(&upload_id)),
                ),
                "POST" if has_upload_id => {
                    Some(MockResponse::ok_with_body(Self::complete_multipart_xml()))
                }
                "PUT" => match Self::part_number(request) {
                    Some(n) if is_copy => Some(MockResponse::ok_with_body(Self::copy_part_xml(
                        &Self::part_etag(n),
                    ))),
                    Some(n) => Some(MockResponse::etag(Self::part_etag(n))),
                    None if is_copy => Some(MockResponse::ok_with_body(
                        Self::copy_object_xml("\"copied-etag\""),
                    )),
                    None => Some(MockResponse::etag("\"single-etag\"")),
                },
                "DELETE" if has_upload_id => Some(MockResponse::no_content()),
                "GET" if has_upload_id => Some(MockResponse::ok_with_body(Self::list_parts_xml(
                    &upload_id,
                    &[],
                    None,
                ))),
                _ => None,
            }
        }
    }

    /// Error document.
    pub fn error_xml(code: &str, message: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
    <Code>{}</Code>
    <Message>{}</Message>
    <RequestId>test-request-id</RequestId>
</Error>"#,
            code, message
        )
    }

    /// InitiateMultipartUpload result.
    pub fn create_multipart_xml(upload_id: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<InitiateMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
    <Bucket>test-bucket</Bucket>
    <Key>test-key.bin</Key>
    <UploadId>{}</UploadId>
</InitiateMultipartUploadResult>"#,
            upload_id
        )
    }

    /// CompleteMultipartUpload result.
    pub fn complete_multipart_xml() -> &'static str {
        r#"<?xml version="1.0" encoding="UTF-8"?>
<CompleteMultipartUploadResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
    <Location>https://test-bucket.s3.amazonaws.com/test-key.bin</Location>
    <Bucket>test-bucket</Bucket>
    <Key>test-key.bin</Key>
    <ETag>"combined-etag-3"</ETag>
</CompleteMultipartUploadResult>"#
    }

    /// CopyPartResult.
    pub fn copy_part_xml(etag: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<CopyPartResult>
    <LastModified>2024-01-15T10:30:00.000Z</LastModified>
    <ETag>{}</ETag>
</CopyPartResult>"#,
            crate::xml::escape_xml(etag)
        )
    }

    /// CopyObjectResult.
    pub fn copy_object_xml(etag: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<CopyObjectResult>
    <LastModified>2024-01-15T10:30:00.000Z</LastModified>
    <ETag>{}</ETag>
</CopyObjectResult>"#,
            crate::xml::escape_xml(etag)
        )
    }

    /// One ListParts page holding `parts` as `(number, size)`.
    pub fn list_parts_xml(upload_id: &str, parts: &[(u32, u64)], next: Option<u32>) -> String {
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListPartsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
    <Bucket>test-bucket</Bucket>
    <Key>test-key.bin</Key>
    <UploadId>{}</UploadId>
    <IsTruncated>{}</IsTruncated>
"#,
            upload_id,
            next.is_some()
        );
        if let Some(next) = next {
            xml.push_str(&format!(
                "    <NextPartNumberMarker>{}</NextPartNumberMarker>\n",
                next
            ));
        }
        for (number, size) in parts {
            xml.push_str(&format!(
                "    <Part><PartNumber>{}</PartNumber><ETag>{}</ETag><Size>{}</Size></Part>\n",
                number,
                crate::xml::escape_xml(&Self::part_etag(*number)),
                size
            ));
        }
        xml.push_str("</ListPartsResult>");
        xml
    }

    /// Headers of a HEAD response for an object of `size` bytes.
    pub fn head_object_headers(size: u64, etag: &str) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("content-length".to_string(), size.to_string());
        headers.insert("etag".to_string(), etag.to_string());
        headers.insert(
            "last-modified".to_string(),
            "Mon, 15 Jan 2024 10:30:00 GMT".to_string(),
        );
        headers.insert("x-amz-request-id".to_string(), "test-request-id".to_string());
        headers
    }

    /// Deterministic payload of `len` bytes.
    pub fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }
}
