//! Mock signer for testing.

use crate::error::S3Error;
use crate::signing::{AwsSigner, SignedRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

/// Mock signer that adds fixed headers and records what it signed.
pub struct MockSigner {
    headers: Mutex<HashMap<String, String>>,
    error: Mutex<Option<S3Error>>,
    sign_count: AtomicUsize,
    sign_requests: Mutex<Vec<SignRequest>>,
}

/// Recorded sign request.
#[derive(Debug, Clone)]
pub struct SignRequest {
    /// HTTP method.
    pub method: String,
    /// URL that was signed.
    pub url: Url,
    /// Headers passed in.
    pub headers: HashMap<String, String>,
    /// Whether a body was present.
    pub has_body: bool,
    /// Region the request was signed for.
    pub region: String,
}

impl MockSigner {
    /// Create a new mock signer.
    pub fn new() -> Self {
        let mut default_headers = HashMap::new();
        default_headers.insert(
            "authorization".to_string(),
            "AWS4-HMAC-SHA256 Credential=mock/signing".to_string(),
        );
        default_headers.insert("x-amz-date".to_string(), "20240115T100000Z".to_string());
        default_headers.insert(
            "x-amz-content-sha256".to_string(),
            "UNSIGNED-PAYLOAD".to_string(),
        );

        Self {
            headers: Mutex::new(default_headers),
            error: Mutex::new(None),
            sign_count: AtomicUsize::new(0),
            sign_requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock signer whose next call fails.
    pub fn with_error(error: S3Error) -> Self {
        let signer = Self::new();
        *signer.error.lock() = Some(error);
        signer
    }

    /// Set an error for the next call.
    pub fn set_error(&self, error: Option<S3Error>) {
        *self.error.lock() = error;
    }

    /// Get the number of sign calls.
    pub fn sign_count(&self) -> usize {
        self.sign_count.load(Ordering::Relaxed)
    }

    /// Get recorded sign requests.
    pub fn sign_requests(&self) -> Vec<SignRequest> {
        self.sign_requests.lock().clone()
    }

    /// Get the last sign request.
    pub fn last_sign_request(&self) -> Option<SignRequest> {
        self.sign_requests.lock().last().cloned()
    }
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AwsSigner for MockSigner {
    async fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &HashMap<String, String>,
        body: Option<&[u8]>,
        region: &str,
    ) -> Result<SignedRequest, S3Error> {
        self.sign_count.fetch_add(1, Ordering::Relaxed);
        self.sign_requests.lock().push(SignRequest {
            method: method.to_string(),
            url: url.clone(),
            headers: headers.clone(),
            has_body: body.is_some(),
            region: region.to_string(),
        });

        if let Some(error) = self.error.lock().take() {
            return Err(error);
        }

        let mut signed_headers = headers.clone();
        signed_headers.extend(self.headers.lock().clone());

        Ok(SignedRequest {
            method: method.to_string(),
            url: url.clone(),
            headers: signed_headers,
        })
    }
}

impl std::fmt::Debug for MockSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSigner")
            .field("sign_count", &self.sign_count())
            .finish()
    }
}
