//! Integration tests for TransferManager uploads.

use base64::Engine;
use parking_lot::Mutex;
use s3_transfer::error::{MultipartError, S3Error, TransferError};
use s3_transfer::mocks::{MockResponse, MockTransport, TestFixtures};
use s3_transfer::transfer::{
    ChecksumAlgorithm, ChecksumMode, PartSource, ProgressCallback, TransferManager,
    TransferProgress, TransferSettings, UploadRequest,
};
use s3_transfer::HttpRequest;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;

const MIB: u64 = 1024 * 1024;
const UPLOAD_ID: &str = "upload-1";

fn router_transport() -> Arc<MockTransport> {
    Arc::new(MockTransport::with_handler(TestFixtures::multipart_router(
        UPLOAD_ID,
    )))
}

fn manager(transport: &Arc<MockTransport>) -> TransferManager {
    TransferManager::new(TestFixtures::context(transport.clone()))
}

fn request() -> UploadRequest {
    UploadRequest::new(TestFixtures::BUCKET, TestFixtures::KEY).with_part_size(5 * MIB)
}

fn bytes_source(len: u64) -> PartSource {
    PartSource::from_bytes(TestFixtures::payload(len as usize))
}

/// `(part number, body length)` of every part upload, by part number.
fn uploaded_parts(transport: &MockTransport) -> Vec<(u32, u64)> {
    let mut parts: Vec<(u32, u64)> = transport
        .requests_with_method("PUT")
        .iter()
        .filter_map(|r| {
            TestFixtures::part_number(r)
                .map(|n| (n, r.body.as_ref().map_or(0, |b| b.len() as u64)))
        })
        .collect();
    parts.sort();
    parts
}

fn completions(transport: &MockTransport) -> Vec<HttpRequest> {
    transport
        .requests_with_method("POST")
        .into_iter()
        .filter(|r| r.query_param("uploadId").is_some())
        .collect()
}

fn abort_count(transport: &MockTransport) -> usize {
    transport.requests_with_method("DELETE").len()
}

fn manifest_part_numbers(request: &HttpRequest) -> Vec<u32> {
    let body = String::from_utf8_lossy(request.body.as_deref().unwrap_or_default()).to_string();
    body.split("<PartNumber>")
        .skip(1)
        .filter_map(|rest| rest.split("</PartNumber>").next())
        .filter_map(|n| n.parse().ok())
        .collect()
}

#[tokio::test]
async fn test_sequential_upload_twelve_mib() {
    let transport = router_transport();
    let manager = manager(&transport);

    let output = manager
        .upload(
            request().with_concurrency(1).force_multipart(),
            bytes_source(12 * MIB),
        )
        .await
        .unwrap();

    assert_eq!(
        uploaded_parts(&transport),
        vec![(1, 5 * MIB), (2, 5 * MIB), (3, 2 * MIB)]
    );
    assert_eq!(output.part_count, 3);
    assert_eq!(output.size, 12 * MIB);
    assert_eq!(output.upload_id.as_deref(), Some(UPLOAD_ID));
    assert!(output.e_tag.unwrap().contains("combined-etag-3"));
    assert_eq!(completions(&transport).len(), 1);
    assert_eq!(abort_count(&transport), 0);
}

#[tokio::test]
async fn test_unknown_size_stream() {
    let transport = router_transport();
    let manager = manager(&transport);
    let data = TestFixtures::payload(7 * MIB as usize);

    let output = manager
        .upload(
            request().with_concurrency(2),
            PartSource::from_reader(std::io::Cursor::new(data)),
        )
        .await
        .unwrap();

    assert_eq!(uploaded_parts(&transport), vec![(1, 5 * MIB), (2, 2 * MIB)]);
    assert_eq!(output.size, 7 * MIB);
    assert_eq!(output.part_count, 2);
}

#[tokio::test]
async fn test_short_stream_after_open_aborts() {
    let transport = router_transport();
    let manager = manager(&transport);
    let data = TestFixtures::payload(8 * MIB as usize);

    let err = manager
        .upload(
            request()
                .with_size(10 * MIB)
                .with_concurrency(1)
                .force_multipart(),
            PartSource::from_reader(std::io::Cursor::new(data)),
        )
        .await
        .unwrap_err();

    match err {
        S3Error::Multipart(MultipartError::Aborted {
            upload_id,
            source,
            abort_error,
        }) => {
            assert_eq!(upload_id, UPLOAD_ID);
            assert!(abort_error.is_none());
            assert!(matches!(
                *source,
                S3Error::Transfer(TransferError::InsufficientData {
                    expected,
                    received,
                }) if expected == 10 * MIB && received == 8 * MIB
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(abort_count(&transport), 1);
    assert!(completions(&transport).is_empty());
}

#[tokio::test]
async fn test_short_stream_before_open_sends_nothing() {
    let transport = router_transport();
    let manager = manager(&transport);
    let data = TestFixtures::payload(8 * MIB as usize);

    let err = manager
        .upload(
            request().with_size(10 * MIB),
            PartSource::from_reader(std::io::Cursor::new(data)),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        S3Error::Transfer(TransferError::InsufficientData { .. })
    ));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_failed_part_aborts_once() {
    let router = TestFixtures::multipart_router(UPLOAD_ID);
    let transport = Arc::new(MockTransport::with_handler(move |request: &HttpRequest| {
        match TestFixtures::part_number(request) {
            Some(7) if request.method == "PUT" => Some(MockResponse::s3_error(
                500,
                "InternalError",
                "part store failed",
            )),
            Some(_) if request.method == "PUT" => {
                router(request).map(|r| r.with_delay(Duration::from_millis(30)))
            }
            _ => router(request),
        }
    }));
    let manager = manager(&transport);

    let err = manager
        .upload(
            request().with_concurrency(4).force_multipart(),
            bytes_source(50 * MIB),
        )
        .await
        .unwrap_err();

    assert_eq!(abort_count(&transport), 1);
    assert!(completions(&transport).is_empty());
    assert!(err.abort_error().is_none());

    let failed: Vec<u32> = err.part_failures().iter().map(|f| f.part_number).collect();
    assert_eq!(failed, vec![7]);
    assert!(err.to_string().contains("part 7"));

    // Parts queued behind the failure are dropped, not sent.
    let sent = uploaded_parts(&transport);
    assert!(sent.len() < 10, "sent parts: {:?}", sent);
    assert!(sent.iter().all(|(n, _)| *n < 10));
}

#[test_case(1 ; "sequential")]
#[test_case(4 ; "parallel")]
#[tokio::test]
async fn test_cancelled_upload_aborts_session(concurrency: usize) {
    let transport = Arc::new(
        MockTransport::with_handler(TestFixtures::multipart_router(UPLOAD_ID))
            .with_latency(Duration::from_millis(20)),
    );
    let manager = manager(&transport);

    let upload = manager.upload(
        request().with_concurrency(concurrency).force_multipart(),
        bytes_source(100 * MIB),
    );
    let timed_out = tokio::time::timeout(Duration::from_millis(70), upload).await;
    assert!(timed_out.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;

    let creates = transport
        .requests_with_method("POST")
        .into_iter()
        .filter(|r| r.query_param("uploads").is_some())
        .count();
    assert_eq!(creates, 1);
    assert!(completions(&transport).is_empty());
    assert_eq!(abort_count(&transport), 1);
    let abort = transport.requests_with_method("DELETE").pop().unwrap();
    assert_eq!(abort.query_param("uploadId").as_deref(), Some(UPLOAD_ID));
}

#[tokio::test]
async fn test_abort_failure_is_attached() {
    let router = TestFixtures::multipart_router(UPLOAD_ID);
    let transport = Arc::new(MockTransport::with_handler(move |request: &HttpRequest| {
        if request.method == "DELETE" {
            return Some(MockResponse::s3_error(503, "ServiceUnavailable", "busy"));
        }
        if TestFixtures::part_number(request) == Some(2) {
            return Some(MockResponse::s3_error(500, "InternalError", "boom"));
        }
        router(request)
    }));
    let manager = manager(&transport);

    let err = manager
        .upload(
            request().with_concurrency(2).force_multipart(),
            bytes_source(15 * MIB),
        )
        .await
        .unwrap_err();

    assert_eq!(abort_count(&transport), 1);
    assert!(err.abort_error().is_some());
    assert_eq!(err.part_failures()[0].part_number, 2);
}

#[tokio::test]
async fn test_completion_error_aborts() {
    let router = TestFixtures::multipart_router(UPLOAD_ID);
    let transport = Arc::new(MockTransport::with_handler(move |request: &HttpRequest| {
        if request.method == "POST" && request.query_param("uploadId").is_some() {
            return Some(MockResponse::ok_with_body(TestFixtures::error_xml(
                "InternalError",
                "We encountered an internal error",
            )));
        }
        router(request)
    }));
    let manager = manager(&transport);

    let err = manager
        .upload(
            request().with_concurrency(1).force_multipart(),
            bytes_source(6 * MIB),
        )
        .await
        .unwrap_err();

    match err {
        S3Error::Multipart(MultipartError::Aborted { source, .. }) => {
            assert!(matches!(
                *source,
                S3Error::Multipart(MultipartError::CompletionFailed { .. })
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(completions(&transport).len(), 1);
    assert_eq!(abort_count(&transport), 1);
}

#[tokio::test]
async fn test_create_failure_does_not_abort() {
    let router = TestFixtures::multipart_router(UPLOAD_ID);
    let transport = Arc::new(MockTransport::with_handler(move |request: &HttpRequest| {
        if request.query_param("uploads").is_some() {
            return Some(MockResponse::s3_error(403, "AccessDenied", "Access Denied"));
        }
        router(request)
    }));
    let manager = manager(&transport);

    let err = manager
        .upload(request().force_multipart(), bytes_source(6 * MIB))
        .await
        .unwrap_err();

    assert!(!matches!(
        err,
        S3Error::Multipart(MultipartError::Aborted { .. })
    ));
    assert_eq!(err.s3_error_code(), Some("AccessDenied"));
    assert_eq!(abort_count(&transport), 0);
}

#[tokio::test]
async fn test_manifest_sorted_under_parallel_completion() {
    // Lower part numbers answer last.
    let router = TestFixtures::multipart_router(UPLOAD_ID);
    let transport = Arc::new(MockTransport::with_handler(move |request: &HttpRequest| {
        let response = router(request)?;
        match TestFixtures::part_number(request) {
            Some(n) if request.method == "PUT" => {
                Some(response.with_delay(Duration::from_millis(u64::from(8 - n) * 15)))
            }
            _ => Some(response),
        }
    }));
    let manager = manager(&transport);

    manager
        .upload(
            request().with_concurrency(3).force_multipart(),
            bytes_source(32 * MIB),
        )
        .await
        .unwrap();

    let answered: Vec<u32> = transport
        .answered_requests()
        .iter()
        .filter(|r| r.method == "PUT")
        .filter_map(TestFixtures::part_number)
        .collect();
    assert_eq!(answered.len(), 7);
    assert_ne!(answered, (1..=7).collect::<Vec<_>>());
    assert_ne!(answered[0], 1);

    let completion = completions(&transport).pop().unwrap();
    assert_eq!(manifest_part_numbers(&completion), (1..=7).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_in_flight_parts_bounded_by_concurrency() {
    let transport = Arc::new(
        MockTransport::with_handler(TestFixtures::multipart_router(UPLOAD_ID))
            .with_latency(Duration::from_millis(20)),
    );
    let manager = manager(&transport);

    manager
        .upload(
            request().with_concurrency(3).force_multipart(),
            bytes_source(40 * MIB),
        )
        .await
        .unwrap();

    assert_eq!(uploaded_parts(&transport).len(), 8);
    assert!(transport.max_in_flight() <= 3);
}

#[tokio::test]
async fn test_small_object_single_put() {
    let transport = router_transport();
    let manager = manager(&transport);

    let output = manager
        .upload(request(), bytes_source(MIB))
        .await
        .unwrap();

    assert_eq!(transport.request_count(), 1);
    let put = transport.last_request().unwrap();
    assert_eq!(put.method, "PUT");
    assert!(TestFixtures::part_number(&put).is_none());
    assert_eq!(put.body.unwrap().len() as u64, MIB);
    assert_eq!(output.upload_id, None);
    assert_eq!(output.part_count, 1);
    assert_eq!(output.e_tag.as_deref(), Some("\"single-etag\""));
}

#[tokio::test]
async fn test_threshold_selects_multipart() {
    let transport = router_transport();
    let settings = TransferSettings {
        multipart_threshold: 8 * MIB,
        part_size: Some(5 * MIB),
        concurrency: 2,
        checksum_algorithms: Vec::new(),
        checksum_mode: ChecksumMode::PerPart,
    };
    let manager = manager(&transport).with_settings(settings);

    let small = manager
        .upload(
            UploadRequest::new(TestFixtures::BUCKET, "small"),
            bytes_source(6 * MIB),
        )
        .await
        .unwrap();
    assert!(small.upload_id.is_none());

    let large = manager
        .upload(
            UploadRequest::new(TestFixtures::BUCKET, "large"),
            bytes_source(12 * MIB),
        )
        .await
        .unwrap();
    assert_eq!(large.upload_id.as_deref(), Some(UPLOAD_ID));
    assert_eq!(large.part_count, 3);
}

#[tokio::test]
async fn test_empty_object() {
    let transport = router_transport();
    let manager = manager(&transport);

    let output = manager
        .upload(request(), PartSource::from_bytes(Vec::new()))
        .await
        .unwrap();

    assert_eq!(output.size, 0);
    assert_eq!(transport.request_count(), 1);
    assert!(transport.last_request().unwrap().body.map_or(true, |b| b.is_empty()));
}

#[tokio::test]
async fn test_file_source_with_part_checksums() {
    let data = TestFixtures::payload(11 * MIB as usize);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&data).unwrap();
    file.flush().unwrap();

    let transport = router_transport();
    let settings = TransferSettings {
        multipart_threshold: MIB,
        part_size: Some(5 * MIB),
        concurrency: 2,
        checksum_algorithms: vec![ChecksumAlgorithm::Crc32c],
        checksum_mode: ChecksumMode::PerPart,
    };
    let manager = manager(&transport).with_settings(settings);

    let source = PartSource::from_path(file.path()).await.unwrap();
    let output = manager
        .upload(
            UploadRequest::new(TestFixtures::BUCKET, TestFixtures::KEY),
            source,
        )
        .await
        .unwrap();
    assert_eq!(output.size, 11 * MIB);

    let create = transport
        .requests_with_method("POST")
        .into_iter()
        .find(|r| r.query_param("uploads").is_some())
        .unwrap();
    assert_eq!(create.get_header("x-amz-checksum-algorithm"), Some("CRC32C"));

    let mut puts = transport.requests_with_method("PUT");
    puts.sort_by_key(|r| TestFixtures::part_number(r));
    let first = &puts[0];
    let expected = base64::engine::general_purpose::STANDARD
        .encode(crc32c::crc32c(&data[..5 * MIB as usize]).to_be_bytes());
    assert_eq!(
        first.get_header("x-amz-checksum-crc32c"),
        Some(expected.as_str())
    );

    let completion = completions(&transport).pop().unwrap();
    let body = String::from_utf8_lossy(completion.body.as_deref().unwrap_or_default()).to_string();
    assert!(body.contains(&format!("<ChecksumCRC32C>{}</ChecksumCRC32C>", expected)));
}

#[tokio::test]
async fn test_full_object_checksum_sent_on_completion() {
    let data = TestFixtures::payload(12 * MIB as usize);
    let transport = router_transport();
    let settings = TransferSettings {
        multipart_threshold: MIB,
        part_size: Some(5 * MIB),
        concurrency: 2,
        checksum_algorithms: vec![ChecksumAlgorithm::Crc32c, ChecksumAlgorithm::Md5],
        checksum_mode: ChecksumMode::FullObject,
    };
    let manager = manager(&transport).with_settings(settings);

    let output = manager
        .upload(
            UploadRequest::new(TestFixtures::BUCKET, TestFixtures::KEY),
            PartSource::from_bytes(data.clone()),
        )
        .await
        .unwrap();

    let b64 = |bytes: &[u8]| base64::engine::general_purpose::STANDARD.encode(bytes);
    let expected = b64(crc32c::crc32c(&data).to_be_bytes().as_slice());
    let checksums = output.checksums.unwrap();
    assert_eq!(checksums.crc32c.as_deref(), Some(expected.as_str()));
    assert!(checksums.md5.is_none());

    let mut part_crcs = Vec::new();
    for put in transport.requests_with_method("PUT") {
        let body = put.body.clone().unwrap_or_default();
        let part_crc = b64(crc32c::crc32c(&body).to_be_bytes().as_slice());
        assert_eq!(put.get_header("x-amz-checksum-crc32c"), Some(part_crc.as_str()));
        assert!(put.get_header("content-md5").is_some());
        part_crcs.push((TestFixtures::part_number(&put), part_crc));
    }
    assert_eq!(part_crcs.len(), 3);

    let completion = completions(&transport).pop().unwrap();
    assert_eq!(completion.get_header("x-amz-checksum-type"), Some("FULL_OBJECT"));
    assert_eq!(
        completion.get_header("x-amz-checksum-crc32c"),
        Some(expected.as_str())
    );
    assert!(completion.get_header("content-md5").is_none());
    let manifest =
        String::from_utf8_lossy(completion.body.as_deref().unwrap_or_default()).to_string();
    for (_, part_crc) in &part_crcs {
        assert!(manifest.contains(&format!("<ChecksumCRC32C>{}</ChecksumCRC32C>", part_crc)));
    }
}

#[tokio::test]
async fn test_progress_reported_per_part() {
    let transport = router_transport();
    let manager = manager(&transport);
    let seen: Arc<Mutex<Vec<TransferProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ProgressCallback =
        Arc::new(move |progress: TransferProgress| sink.lock().push(progress));

    manager
        .upload(
            request()
                .with_concurrency(2)
                .force_multipart()
                .with_progress(callback),
            bytes_source(12 * MIB),
        )
        .await
        .unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    let last = seen.iter().max_by_key(|p| p.completed_parts).unwrap();
    assert_eq!(last.transferred_bytes, 12 * MIB);
    assert_eq!(last.total_parts, Some(3));
    assert_eq!(last.percentage(), Some(100.0));
}

#[tokio::test]
async fn test_invalid_part_size_rejected_before_any_request() {
    let transport = router_transport();
    let manager = manager(&transport);

    let err = manager
        .upload(
            UploadRequest::new(TestFixtures::BUCKET, TestFixtures::KEY)
                .with_part_size(MIB)
                .force_multipart(),
            bytes_source(12 * MIB),
        )
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(transport.request_count(), 0);
}
