//! XML parsing and building for S3 request and response bodies.
//!
//! S3 can answer a completion or copy request with `200 OK` and an `<Error>`
//! document in the body, so those parsers return a `ResultDocument` that the
//! caller must inspect.

use crate::error::{ResponseError, S3Error, S3ErrorResponse};
use crate::types::*;
use quick_xml::events::Event;
use quick_xml::Reader;

/// A response body that is either the expected result or an error document.
#[derive(Debug, Clone)]
pub enum ResultDocument<T> {
    /// The expected result element.
    Ok(T),
    /// An `<Error>` document.
    Error(S3ErrorResponse),
}

/// Result of a whole-object or part copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyResult {
    /// ETag of the new object or part.
    pub e_tag: Option<String>,
    /// Last modified.
    pub last_modified: Option<String>,
}

enum Node<'a> {
    Text { path: &'a [String], text: String },
    Close { path: &'a [String] },
}

fn xml_error(e: impl std::fmt::Display) -> S3Error {
    S3Error::Response(ResponseError::XmlParseError {
        message: e.to_string(),
    })
}

/// Walk a document, reporting each text node and element close with the
/// element path that leads to it.
fn walk<F>(xml: &str, mut visit: F) -> Result<(), S3Error>
where
    F: FnMut(Node<'_>),
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                visit(Node::Text { path: &path, text });
            }
            Event::End(_) => {
                visit(Node::Close { path: &path });
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(())
}

/// Name of the document's root element, or `None` for an empty body.
pub fn root_element(xml: &str) -> Result<Option<String>, S3Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(Some(
                    String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                ));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn leaf(path: &[String]) -> &str {
    path.last().map(String::as_str).unwrap_or_default()
}

/// Parse an S3 `<Error>` document.
pub fn parse_error_response(xml: &str) -> Result<S3ErrorResponse, S3Error> {
    let mut response = S3ErrorResponse::default();

    walk(xml, |node| {
        if let Node::Text { path, text } = node {
            match leaf(path) {
                "Code" => response.code = text,
                "Message" => response.message = text,
                "BucketName" | "Bucket" => response.bucket = Some(text),
                "Key" => response.key = Some(text),
                "UploadId" => response.upload_id = Some(text),
                "Region" => response.region = Some(text),
                "RequestId" => response.request_id = Some(text),
                "HostId" => response.host_id = Some(text),
                _ => {}
            }
        }
    })?;

    Ok(response)
}

/// Parse an `InitiateMultipartUploadResult`.
pub fn parse_create_multipart_upload(xml: &str) -> Result<CreateMultipartUploadOutput, S3Error> {
    let mut output = CreateMultipartUploadOutput {
        bucket: String::new(),
        key: String::new(),
        upload_id: String::new(),
        request_id: None,
    };

    walk(xml, |node| {
        if let Node::Text { path, text } = node {
            match leaf(path) {
                "Bucket" => output.bucket = text,
                "Key" => output.key = text,
                "UploadId" => output.upload_id = text,
                _ => {}
            }
        }
    })?;

    if output.upload_id.is_empty() {
        return Err(S3Error::Response(ResponseError::MissingField {
            field: "UploadId".to_string(),
        }));
    }

    Ok(output)
}

fn unexpected_root(expected: &str, found: Option<String>) -> S3Error {
    S3Error::Response(ResponseError::InvalidResponse {
        message: match found {
            Some(root) => format!("expected <{}> or <Error>, found <{}>", expected, root),
            None => format!("expected <{}> or <Error>, found an empty body", expected),
        },
    })
}

/// Parse the body of a successful CompleteMultipartUpload response.
///
/// Anything other than a completion result or an error document is rejected
/// as an invalid response.
pub fn parse_complete_multipart_upload(
    xml: &str,
) -> Result<ResultDocument<CompleteMultipartUploadOutput>, S3Error> {
    let root = root_element(xml)?;
    match root.as_deref() {
        Some("CompleteMultipartUploadResult") => {}
        Some("Error") => return parse_error_response(xml).map(ResultDocument::Error),
        _ => return Err(unexpected_root("CompleteMultipartUploadResult", root)),
    }

    let mut output = CompleteMultipartUploadOutput::default();
    walk(xml, |node| {
        if let Node::Text { path, text } = node {
            match leaf(path) {
                "Bucket" => output.bucket = Some(text),
                "Key" => output.key = Some(text),
                "ETag" => output.e_tag = Some(text),
                "Location" => output.location = Some(text),
                "ChecksumCRC32C" => output.checksum_crc32c = Some(text),
                _ => {}
            }
        }
    })?;

    Ok(ResultDocument::Ok(output))
}

/// Parse a `CopyObjectResult` or `CopyPartResult` body.
pub fn parse_copy_result(xml: &str) -> Result<ResultDocument<CopyResult>, S3Error> {
    let root = root_element(xml)?;
    match root.as_deref() {
        Some("CopyObjectResult") | Some("CopyPartResult") => {}
        Some("Error") => return parse_error_response(xml).map(ResultDocument::Error),
        _ => return Err(unexpected_root("CopyObjectResult", root)),
    }

    let mut result = CopyResult::default();
    walk(xml, |node| {
        if let Node::Text { path, text } = node {
            match leaf(path) {
                "ETag" => result.e_tag = Some(text),
                "LastModified" => result.last_modified = Some(text),
                _ => {}
            }
        }
    })?;

    Ok(ResultDocument::Ok(result))
}

/// Parse a `ListPartsResult` page.
pub fn parse_list_parts(xml: &str) -> Result<ListPartsOutput, S3Error> {
    let mut output = ListPartsOutput::default();
    let mut current: Option<Part> = None;

    walk(xml, |node| match node {
        Node::Text { path, text } => {
            let in_part = path.len() >= 2 && path[path.len() - 2] == "Part";
            if in_part {
                let part = current.get_or_insert_with(|| Part {
                    part_number: 0,
                    e_tag: String::new(),
                    size: None,
                    last_modified: None,
                });
                match leaf(path) {
                    "PartNumber" => part.part_number = text.parse().unwrap_or(0),
                    "ETag" => part.e_tag = text,
                    "Size" => part.size = text.parse().ok(),
                    "LastModified" => part.last_modified = Some(text),
                    _ => {}
                }
            } else if path.len() == 2 {
                match leaf(path) {
                    "Bucket" => output.bucket = Some(text),
                    "Key" => output.key = Some(text),
                    "UploadId" => output.upload_id = Some(text),
                    "PartNumberMarker" => output.part_number_marker = text.parse().ok(),
                    "NextPartNumberMarker" => output.next_part_number_marker = text.parse().ok(),
                    "MaxParts" => output.max_parts = text.parse().ok(),
                    "IsTruncated" => output.is_truncated = text == "true",
                    _ => {}
                }
            }
        }
        Node::Close { path } => {
            if leaf(path) == "Part" {
                if let Some(part) = current.take() {
                    output.parts.push(part);
                }
            }
        }
    })?;

    Ok(output)
}

/// Build the `CompleteMultipartUpload` manifest.
///
/// Parts are written in the order given; callers pass them sorted.
pub fn build_complete_multipart_xml(parts: &[CompletedPart]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<CompleteMultipartUpload xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">");

    for part in parts {
        xml.push_str("<Part>");
        xml.push_str(&format!("<PartNumber>{}</PartNumber>", part.part_number));
        xml.push_str(&format!("<ETag>{}</ETag>", escape_xml(&part.e_tag)));
        if let Some(ref crc) = part.checksum_crc32c {
            xml.push_str(&format!("<ChecksumCRC32C>{}</ChecksumCRC32C>", escape_xml(crc)));
        }
        if let Some(ref sha) = part.checksum_sha256 {
            xml.push_str(&format!("<ChecksumSHA256>{}</ChecksumSHA256>", escape_xml(sha)));
        }
        xml.push_str("</Part>");
    }

    xml.push_str("</CompleteMultipartUpload>");
    xml
}

/// Escape text for an XML element body.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
