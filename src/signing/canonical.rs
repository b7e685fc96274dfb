//! Canonical request building for AWS Signature V4.
//!
//! Paths and query strings taken from a `Url` are already percent-encoded, so
//! every component is decoded first and re-encoded with the SigV4 rules. This
//! keeps keys with spaces or `%` from being double-encoded.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::{BTreeMap, BTreeSet};

/// Characters left unencoded in URI paths.
const URI_PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Characters left unencoded in query strings and single path segments.
const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// URI-encode an object key for use in a request path.
pub fn uri_encode_path(path: &str) -> String {
    utf8_percent_encode(path, URI_PATH_SET).to_string()
}

/// URI-encode a query parameter name or value.
pub fn uri_encode_query(value: &str) -> String {
    utf8_percent_encode(value, QUERY_SET).to_string()
}

fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// Build the canonical URI from an (already encoded) path.
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    normalized
        .split('/')
        .map(|segment| uri_encode_query(&decode(segment)))
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical query string.
///
/// Parameters are sorted by name, then by value.
pub fn build_canonical_query_string(query_string: &str) -> String {
    if query_string.is_empty() {
        return String::new();
    }

    let mut params: Vec<(String, String)> = query_string
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (
                uri_encode_query(&decode(key)),
                uri_encode_query(&decode(value)),
            )
        })
        .collect();

    params.sort();

    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical headers block: lowercased names, collapsed whitespace,
/// one `name:value` line per signed header.
pub fn build_canonical_headers(headers: &[(String, String)]) -> String {
    let mut header_map: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (name, value) in headers {
        let name_lower = name.to_lowercase();
        if !super::should_sign_header(&name_lower) {
            continue;
        }

        let trimmed = value.split_whitespace().collect::<Vec<_>>().join(" ");
        header_map.entry(name_lower).or_default().push(trimmed);
    }

    header_map
        .iter()
        .map(|(name, values)| format!("{}:{}\n", name, values.join(",")))
        .collect()
}

/// Semicolon-separated list of signed header names.
pub fn build_signed_headers(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, _)| name.to_lowercase())
        .filter(|name| super::should_sign_header(name))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(";")
}

/// Build the canonical request string.
///
/// ```text
/// HTTPMethod\n
/// CanonicalURI\n
/// CanonicalQueryString\n
/// CanonicalHeaders\n
/// SignedHeaders\n
/// HashedPayload
/// ```
pub fn build_canonical_request(
    method: &str,
    uri: &str,
    query_string: &str,
    headers: &[(String, String)],
    payload_hash: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method.to_uppercase(),
        build_canonical_uri(uri),
        build_canonical_query_string(query_string),
        build_canonical_headers(headers),
        build_signed_headers(headers),
        payload_hash
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_encode_path_keeps_slashes() {
        assert_eq!(uri_encode_path("dir/file name.bin"), "dir/file%20name.bin");
        assert_eq!(uri_encode_path("a+b"), "a%2Bb");
    }

    #[test]
    fn test_uri_encode_query() {
        assert_eq!(uri_encode_query("foo bar"), "foo%20bar");
        assert_eq!(uri_encode_query("a/b=c"), "a%2Fb%3Dc");
    }

    #[test]
    fn test_canonical_uri_does_not_double_encode() {
        assert_eq!(build_canonical_uri(""), "/");
        assert_eq!(build_canonical_uri("/bucket/my%20key"), "/bucket/my%20key");
        assert_eq!(build_canonical_uri("bucket/a%2Bb"), "/bucket/a%2Bb");
    }

    #[test]
    fn test_canonical_query_sorted_and_reencoded() {
        assert_eq!(build_canonical_query_string(""), "");
        assert_eq!(
            build_canonical_query_string("uploadId=a%2Fb&partNumber=2"),
            "partNumber=2&uploadId=a%2Fb"
        );
        assert_eq!(build_canonical_query_string("uploads"), "uploads=");
        assert_eq!(build_canonical_query_string("a=2&a=1"), "a=1&a=2");
    }

    #[test]
    fn test_canonical_headers_and_signed_headers() {
        let headers = vec![
            ("Host".to_string(), "  example.com  ".to_string()),
            ("X-Amz-Copy-Source-Range".to_string(), "bytes=0-9".to_string()),
            ("Content-MD5".to_string(), "abc".to_string()),
            ("User-Agent".to_string(), "ignored".to_string()),
        ];

        let canonical = build_canonical_headers(&headers);
        assert!(canonical.contains("host:example.com\n"));
        assert!(canonical.contains("x-amz-copy-source-range:bytes=0-9\n"));
        assert!(!canonical.contains("user-agent"));

        assert_eq!(
            build_signed_headers(&headers),
            "content-md5;host;x-amz-copy-source-range"
        );
    }

    #[test]
    fn test_build_canonical_request() {
        let headers = vec![("Host".to_string(), "bucket.s3.amazonaws.com".to_string())];
        let request = build_canonical_request("put", "/key", "uploads", &headers, "UNSIGNED");
        assert_eq!(
            request,
            "PUT\n/key\nuploads=\nhost:bucket.s3.amazonaws.com\n\nhost\nUNSIGNED"
        );
    }
}
