//! S3 Client implementation.
//!
//! This module provides the main S3 client interface and builder.

use crate::config::{RegionCache, S3Config};
use crate::error::S3Error;
use crate::services::{MultipartService, ObjectsService, ServiceContext};
use crate::signing::{AwsSigner, AwsSignerV4};
use crate::transfer::TransferManager;
use crate::transport::{HttpTransport, ReqwestTransport};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// S3 client trait.
pub trait S3Client: Send + Sync {
    /// Get the objects service.
    fn objects(&self) -> &ObjectsService;

    /// Get the multipart service.
    fn multipart(&self) -> &MultipartService;

    /// Get the transfer manager for uploads, copies and composes.
    fn transfer(&self) -> &TransferManager;

    /// Get the client configuration.
    fn config(&self) -> &S3Config;
}

/// S3 client implementation.
///
/// All services share one transport, signer and bucket region cache.
pub struct S3ClientImpl {
    ctx: Arc<ServiceContext>,

    // Lazy-initialized services
    objects: OnceCell<ObjectsService>,
    multipart: OnceCell<MultipartService>,
    transfer: OnceCell<TransferManager>,
}

impl S3ClientImpl {
    /// Create a new S3 client with the given configuration.
    pub fn new(config: S3Config, transport: Arc<dyn HttpTransport>) -> Self {
        let signer = Arc::new(AwsSignerV4::new(config.credentials_provider.clone()));
        Self::with_signer(config, transport, signer)
    }

    /// Create a client with a custom signer.
    pub fn with_signer(
        config: S3Config,
        transport: Arc<dyn HttpTransport>,
        signer: Arc<dyn AwsSigner>,
    ) -> Self {
        let ctx = ServiceContext::new(
            Arc::new(config),
            transport,
            signer,
            Arc::new(RegionCache::new()),
        );
        Self {
            ctx: Arc::new(ctx),
            objects: OnceCell::new(),
            multipart: OnceCell::new(),
            transfer: OnceCell::new(),
        }
    }

    /// Bucket regions learned from redirects.
    pub fn regions(&self) -> &Arc<RegionCache> {
        self.ctx.regions()
    }
}

impl S3Client for S3ClientImpl {
    fn objects(&self) -> &ObjectsService {
        self.objects
            .get_or_init(|| ObjectsService::new(self.ctx.clone()))
    }

    fn multipart(&self) -> &MultipartService {
        self.multipart
            .get_or_init(|| MultipartService::new(self.ctx.clone()))
    }

    fn transfer(&self) -> &TransferManager {
        self.transfer
            .get_or_init(|| TransferManager::new(self.ctx.clone()))
    }

    fn config(&self) -> &S3Config {
        self.ctx.config()
    }
}

impl std::fmt::Debug for S3ClientImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ClientImpl")
            .field("config", self.ctx.config())
            .finish_non_exhaustive()
    }
}

/// Builder for S3 client.
pub struct S3ClientBuilder {
    config: Option<S3Config>,
    from_env: bool,
    transport: Option<Arc<dyn HttpTransport>>,
    signer: Option<Arc<dyn AwsSigner>>,
}

impl S3ClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            from_env: false,
            transport: None,
            signer: None,
        }
    }

    /// Use the provided configuration.
    pub fn config(mut self, config: S3Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env(mut self) -> Self {
        self.from_env = true;
        self
    }

    /// Use a custom HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom request signer.
    pub fn signer(mut self, signer: Arc<dyn AwsSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Build the S3 client.
    pub fn build(self) -> Result<S3ClientImpl, S3Error> {
        let config = if let Some(config) = self.config {
            config
        } else if self.from_env {
            S3Config::builder().from_env().build()?
        } else {
            S3Config::default()
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::from_config(&config)?),
        };

        let signer = match self.signer {
            Some(signer) => signer,
            None => Arc::new(AwsSignerV4::new(config.credentials_provider.clone())),
        };

        Ok(S3ClientImpl::with_signer(config, transport, signer))
    }
}

impl Default for S3ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockResponse, MockTransport, TestFixtures};
    use crate::types::HeadObjectRequest;

    #[test]
    fn test_builder_default() {
        let result = S3ClientBuilder::new().build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_builder_with_config() {
        let config = S3Config::builder()
            .region("eu-west-1")
            .build()
            .unwrap();

        let client = S3ClientBuilder::new().config(config).build().unwrap();
        assert_eq!(client.config().region, "eu-west-1");
    }

    #[test]
    fn test_transfer_uses_config_settings() {
        let config = S3Config::builder()
            .multipart_concurrency(2)
            .build()
            .unwrap();
        let client = S3ClientBuilder::new().config(config).build().unwrap();
        assert_eq!(client.transfer().settings().concurrency, 2);
    }

    #[tokio::test]
    async fn test_services_share_region_cache() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_response(
            MockResponse::error(301, "").with_header("x-amz-bucket-region", "eu-central-1"),
        );
        transport.queue_response(
            MockResponse::ok().with_headers(TestFixtures::head_object_headers(4, "\"e\"")),
        );

        let client = S3ClientBuilder::new()
            .config(TestFixtures::config())
            .transport(transport.clone())
            .build()
            .unwrap();

        client
            .objects()
            .head(HeadObjectRequest::new(TestFixtures::BUCKET, TestFixtures::KEY))
            .await
            .unwrap();

        assert_eq!(
            client.regions().get(TestFixtures::BUCKET).as_deref(),
            Some("eu-central-1")
        );
        assert_eq!(transport.request_count(), 2);
    }
}
