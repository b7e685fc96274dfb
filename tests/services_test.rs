//! Integration tests for the request-level services, driven through the
//! client with a mock transport.

use futures::TryStreamExt;
use s3_transfer::mocks::{MockResponse, MockTransport, TestFixtures};
use s3_transfer::transfer::{PartSource, UploadRequest};
use s3_transfer::types::{
    CompleteMultipartUploadRequest, CompletedPart, CreateMultipartUploadRequest, ListPartsRequest,
    ObjectAttributes, StorageClass, Tag, UploadPartRequest,
};
use s3_transfer::{S3Client, S3ClientBuilder, S3ClientImpl};
use std::sync::Arc;

const MIB: u64 = 1024 * 1024;

fn client(transport: &Arc<MockTransport>) -> S3ClientImpl {
    S3ClientBuilder::new()
        .config(TestFixtures::config())
        .transport(transport.clone())
        .build()
        .unwrap()
}

fn attributes() -> ObjectAttributes {
    let mut attributes = ObjectAttributes::default()
        .with_content_type("video/mp4")
        .with_storage_class(StorageClass::StandardIa);
    attributes
        .metadata
        .insert("origin".to_string(), "camera-2".to_string());
    attributes.tags.push(Tag::new("project", "alpha beta"));
    attributes
}

#[tokio::test]
async fn test_manual_multipart_protocol() {
    let transport = Arc::new(MockTransport::with_handler(
        TestFixtures::multipart_router("manual-1"),
    ));
    let client = client(&transport);
    let multipart = client.multipart();

    let created = multipart
        .create(CreateMultipartUploadRequest::new(
            TestFixtures::BUCKET,
            TestFixtures::KEY,
        ))
        .await
        .unwrap();
    assert_eq!(created.upload_id, "manual-1");

    let mut parts = Vec::new();
    for part_number in [2u32, 1] {
        let body = TestFixtures::payload(1024);
        let output = multipart
            .upload_part(UploadPartRequest::new(
                TestFixtures::BUCKET,
                TestFixtures::KEY,
                &created.upload_id,
                part_number,
                body,
            ))
            .await
            .unwrap();
        assert_eq!(output.e_tag, TestFixtures::part_etag(part_number));
        parts.push(CompletedPart {
            part_number,
            e_tag: output.e_tag,
            size: 1024,
            checksum_crc32c: None,
            checksum_sha256: None,
        });
    }

    let completed = multipart
        .complete(CompleteMultipartUploadRequest::new(
            TestFixtures::BUCKET,
            TestFixtures::KEY,
            &created.upload_id,
            parts,
        ))
        .await
        .unwrap();
    assert_eq!(completed.e_tag.as_deref(), Some("\"combined-etag-3\""));

    let completion = transport.last_request().unwrap();
    let manifest = String::from_utf8_lossy(completion.body.as_deref().unwrap_or_default())
        .to_string();
    let first = manifest.find("<PartNumber>1</PartNumber>").unwrap();
    let second = manifest.find("<PartNumber>2</PartNumber>").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn test_list_parts_resumes_from_marker() {
    let transport = Arc::new(MockTransport::with_responses(vec![
        MockResponse::ok_with_body(TestFixtures::list_parts_xml(
            "resume-1",
            &[(3, 5 * MIB), (4, 5 * MIB)],
            Some(4),
        )),
        MockResponse::ok_with_body(TestFixtures::list_parts_xml(
            "resume-1",
            &[(5, MIB)],
            None,
        )),
    ]));
    let client = client(&transport);

    let mut request = ListPartsRequest::new(TestFixtures::BUCKET, TestFixtures::KEY, "resume-1")
        .with_max_parts(2);
    request.part_number_marker = Some(2);

    let parts: Vec<_> = client
        .multipart()
        .list_parts_stream(request)
        .try_collect()
        .await
        .unwrap();

    let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![3, 4, 5]);

    let requests = transport.requests();
    assert_eq!(requests[0].query_param("part-number-marker").as_deref(), Some("2"));
    assert_eq!(requests[1].query_param("part-number-marker").as_deref(), Some("4"));
    assert_eq!(requests[1].query_param("max-parts").as_deref(), Some("2"));
}

#[tokio::test]
async fn test_attributes_sent_when_opening_upload() {
    let transport = Arc::new(MockTransport::with_handler(
        TestFixtures::multipart_router("attrs-1"),
    ));
    let client = client(&transport);

    client
        .transfer()
        .upload(
            UploadRequest::new(TestFixtures::BUCKET, TestFixtures::KEY)
                .with_part_size(5 * MIB)
                .force_multipart()
                .with_attributes(attributes()),
            PartSource::from_bytes(TestFixtures::payload(6 * MIB as usize)),
        )
        .await
        .unwrap();

    let create = transport
        .requests_with_method("POST")
        .into_iter()
        .find(|r| r.query_param("uploads").is_some())
        .unwrap();
    assert_eq!(create.get_header("content-type"), Some("video/mp4"));
    assert_eq!(create.get_header("x-amz-storage-class"), Some("STANDARD_IA"));
    assert_eq!(create.get_header("x-amz-meta-origin"), Some("camera-2"));
    assert_eq!(create.get_header("x-amz-tagging"), Some("project=alpha%20beta"));

    for part in transport.requests_with_method("PUT") {
        assert!(part.get_header("x-amz-meta-origin").is_none());
        assert!(part.get_header("x-amz-tagging").is_none());
    }
}

#[tokio::test]
async fn test_attributes_sent_with_single_put() {
    let transport = Arc::new(MockTransport::with_handler(
        TestFixtures::multipart_router("unused"),
    ));
    let client = client(&transport);

    client
        .transfer()
        .upload(
            UploadRequest::new(TestFixtures::BUCKET, TestFixtures::KEY)
                .with_attributes(attributes()),
            PartSource::from_bytes(TestFixtures::payload(2048)),
        )
        .await
        .unwrap();

    assert_eq!(transport.request_count(), 1);
    let put = transport.last_request().unwrap();
    assert_eq!(put.get_header("content-type"), Some("video/mp4"));
    assert_eq!(put.get_header("x-amz-meta-origin"), Some("camera-2"));
    assert!(put.url.contains(TestFixtures::KEY));
}
