//! Request plumbing shared by the services.

use crate::config::{RegionCache, S3Config};
use crate::error::{
    map_http_status, map_s3_error_code, ConfigurationError, ObjectError, RequestError, S3Error,
    S3ErrorResponse,
};
use crate::signing::{uri_encode_path, AwsSigner};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::xml;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Everything a service needs to issue a signed request.
///
/// One context is built per client; its region cache is never shared with
/// another client.
pub struct ServiceContext {
    config: Arc<S3Config>,
    transport: Arc<dyn HttpTransport>,
    signer: Arc<dyn AwsSigner>,
    regions: Arc<RegionCache>,
}

/// Where a request is going.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    /// HTTP method.
    pub method: &'a str,
    /// Bucket name.
    pub bucket: &'a str,
    /// Object key, unencoded.
    pub key: Option<&'a str>,
    /// Encoded query string, without `?`.
    pub query: Option<&'a str>,
}

impl<'a> Target<'a> {
    /// Target an object.
    pub fn object(method: &'a str, bucket: &'a str, key: &'a str) -> Self {
        Self {
            method,
            bucket,
            key: Some(key),
            query: None,
        }
    }

    /// Add a query string.
    pub fn with_query(mut self, query: &'a str) -> Self {
        self.query = Some(query);
        self
    }
}

impl ServiceContext {
    /// Create a context.
    pub fn new(
        config: Arc<S3Config>,
        transport: Arc<dyn HttpTransport>,
        signer: Arc<dyn AwsSigner>,
        regions: Arc<RegionCache>,
    ) -> Self {
        Self {
            config,
            transport,
            signer,
            regions,
        }
    }

    /// The client configuration.
    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// The client's bucket region cache.
    pub fn regions(&self) -> &Arc<RegionCache> {
        &self.regions
    }

    /// Region requests for `bucket` are signed for.
    pub fn region_for(&self, bucket: &str) -> String {
        self.regions.region_for(bucket, &self.config.region)
    }

    /// Build the request URL for a target.
    pub fn url_for(&self, target: &Target<'_>, region: &str) -> Result<Url, S3Error> {
        let endpoint = self.config.resolve_endpoint(Some(target.bucket), region)?;
        let encoded_key = target.key.map(uri_encode_path);
        let path = self.config.build_path(target.bucket, encoded_key.as_deref());

        let url_str = match target.query {
            Some(q) => format!("{}{}?{}", endpoint.as_str().trim_end_matches('/'), path, q),
            None => format!("{}{}", endpoint.as_str().trim_end_matches('/'), path),
        };

        Url::parse(&url_str).map_err(|e| {
            S3Error::Request(RequestError::Validation {
                message: format!("Invalid URL '{}': {}", url_str, e),
            })
        })
    }

    /// Sign and send a request, returning the response if it succeeded.
    ///
    /// A redirect that names the bucket's region updates the region cache and
    /// the request is sent once more to that region.
    pub async fn send(
        &self,
        target: Target<'_>,
        mut headers: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Result<HttpResponse, S3Error> {
        if let Some(ref body) = body {
            headers.insert("content-length".to_string(), body.len().to_string());
        }

        let mut redirected = false;
        loop {
            let region = self.region_for(target.bucket);
            let url = self.url_for(&target, &region)?;
            let signed = self
                .signer
                .sign(target.method, &url, &headers, body.as_deref(), &region)
                .await?;

            let mut request =
                HttpRequest::new(target.method, signed.url.as_str()).with_headers(signed.headers);
            if let Some(ref body) = body {
                request = request.with_body(body.clone());
            }

            let response = self.transport.send(request).await?;
            debug!(
                method = target.method,
                bucket = target.bucket,
                key = target.key.unwrap_or_default(),
                status = response.status,
                "S3 request completed"
            );

            if response.is_success() {
                return Ok(response);
            }

            let error = self.error_from_response(&target, &response, &region);
            match error {
                S3Error::Configuration(ConfigurationError::WrongRegion {
                    ref correct_region,
                    ..
                }) if !redirected && correct_region != &region && correct_region != "unknown" => {
                    redirected = true;
                    continue;
                }
                _ => return Err(error),
            }
        }
    }

    /// Turn a non-success response into a typed error.
    pub fn error_from_response(
        &self,
        target: &Target<'_>,
        response: &HttpResponse,
        region: &str,
    ) -> S3Error {
        if let Some(bucket_region) = response.bucket_region() {
            if bucket_region != region && (response.is_redirect() || response.status == 400) {
                warn!(
                    bucket = target.bucket,
                    configured_region = region,
                    bucket_region,
                    "Bucket is in a different region"
                );
                self.regions.insert(target.bucket, bucket_region);
                return S3Error::Configuration(ConfigurationError::WrongRegion {
                    correct_region: bucket_region.to_string(),
                    configured_region: region.to_string(),
                });
            }
        }

        let request_id = response.request_id().map(String::from);
        if response.body.is_empty() {
            return fill_location(map_http_status(response.status, request_id), target);
        }

        let body = String::from_utf8_lossy(&response.body);
        match xml::parse_error_response(&body) {
            Ok(parsed) if !parsed.code.is_empty() => {
                document_to_error(parsed, target.bucket, target.key, request_id)
            }
            _ => fill_location(map_http_status(response.status, request_id), target),
        }
    }
}

/// Convert an error document, filling in what the store left out.
pub fn document_to_error(
    mut document: S3ErrorResponse,
    bucket: &str,
    key: Option<&str>,
    request_id: Option<String>,
) -> S3Error {
    if document.bucket.is_none() {
        document.bucket = Some(bucket.to_string());
    }
    if document.key.is_none() {
        document.key = key.map(String::from);
    }
    if document.request_id.is_none() {
        document.request_id = request_id;
    }
    let code = document.code.clone();
    map_s3_error_code(&code, Some(document))
}

fn fill_location(error: S3Error, target: &Target<'_>) -> S3Error {
    match error {
        S3Error::Object(ObjectError::NotFound { request_id, .. }) => {
            S3Error::Object(ObjectError::NotFound {
                bucket: target.bucket.to_string(),
                key: target.key.unwrap_or_default().to_string(),
                request_id,
            })
        }
        S3Error::Object(ObjectError::PreconditionFailed {
            condition,
            request_id,
            ..
        }) => S3Error::Object(ObjectError::PreconditionFailed {
            bucket: target.bucket.to_string(),
            key: target.key.unwrap_or_default().to_string(),
            condition,
            request_id,
        }),
        other => other,
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("config", &self.config)
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}
