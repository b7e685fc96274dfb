//! AWS Signature V4 signer.

use super::*;
use crate::credentials::CredentialsProvider;
use crate::error::S3Error;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// A signed request ready to be sent.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// HTTP method.
    pub method: String,
    /// Full URL including query string.
    pub url: Url,
    /// Headers to send, including `authorization`.
    pub headers: HashMap<String, String>,
}

/// Signs requests for a given region.
#[async_trait]
pub trait AwsSigner: Send + Sync {
    /// Sign a request for `region`.
    async fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &HashMap<String, String>,
        body: Option<&[u8]>,
        region: &str,
    ) -> Result<SignedRequest, S3Error>;
}

/// AWS Signature V4 signer backed by a credentials provider.
pub struct AwsSignerV4 {
    credentials_provider: Arc<dyn CredentialsProvider>,
}

impl AwsSignerV4 {
    /// Create a new signer.
    pub fn new(credentials_provider: Arc<dyn CredentialsProvider>) -> Self {
        Self {
            credentials_provider,
        }
    }

    fn host_header(url: &Url) -> String {
        let host = url.host_str().unwrap_or_default();
        match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

const GENERATED_HEADERS: [&str; 3] = ["host", "x-amz-date", "x-amz-content-sha256"];

#[async_trait]
impl AwsSigner for AwsSignerV4 {
    async fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &HashMap<String, String>,
        body: Option<&[u8]>,
        region: &str,
    ) -> Result<SignedRequest, S3Error> {
        let credentials = self.credentials_provider.get_credentials().await?;
        let timestamp = Utc::now();
        let payload_hash = sha256_hex(body.unwrap_or_default());

        let mut signing_headers = vec![
            ("host".to_string(), Self::host_header(url)),
            ("x-amz-date".to_string(), format_datetime(&timestamp)),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ];
        if let Some(token) = credentials.session_token() {
            signing_headers.push(("x-amz-security-token".to_string(), token.to_string()));
        }
        signing_headers.extend(
            headers
                .iter()
                .filter(|(name, _)| {
                    !GENERATED_HEADERS
                        .iter()
                        .any(|generated| name.eq_ignore_ascii_case(generated))
                })
                .map(|(name, value)| (name.clone(), value.clone())),
        );

        let input = SigningInput {
            method,
            path: url.path(),
            query: url.query().unwrap_or(""),
            headers: &signing_headers,
            payload_hash: &payload_hash,
            region,
            timestamp: &timestamp,
        };
        let authorization = authorization_header(&input, &credentials)?;

        let mut final_headers: HashMap<String, String> = signing_headers.into_iter().collect();
        final_headers.remove("host");
        final_headers.insert("authorization".to_string(), authorization);

        Ok(SignedRequest {
            method: method.to_string(),
            url: url.clone(),
            headers: final_headers,
        })
    }
}

impl std::fmt::Debug for AwsSignerV4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSignerV4").finish_non_exhaustive()
    }
}
