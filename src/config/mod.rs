//! Configuration types for the S3 transfer client.
//!
//! `S3Config` covers endpoint resolution, transport timeouts and the multipart
//! transfer settings consumed by the `TransferManager`.

mod region;

pub use region::RegionCache;

use crate::credentials::{CredentialsProvider, EnvCredentialsProvider};
use crate::error::{ConfigurationError, RequestError, S3Error};
use crate::transfer::checksum::{ChecksumAlgorithm, ChecksumMode};
use crate::transfer::{MAX_PART_SIZE, MIN_PART_SIZE};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Configuration for the S3 transfer client.
#[derive(Clone)]
pub struct S3Config {
    /// Default AWS region (e.g., "us-east-1").
    pub region: String,

    /// Credentials provider.
    pub credentials_provider: Arc<dyn CredentialsProvider>,

    /// Custom endpoint URL (for S3-compatible services).
    pub endpoint: Option<Url>,

    /// Use path-style addressing instead of virtual-hosted style.
    ///
    /// Path-style: `https://s3.region.amazonaws.com/bucket/key`
    /// Virtual-hosted: `https://bucket.s3.region.amazonaws.com/key`
    pub path_style: bool,

    /// Use dual-stack (IPv4/IPv6) endpoints.
    pub use_dual_stack: bool,

    /// Use FIPS endpoints.
    pub use_fips: bool,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Read timeout for individual requests.
    pub read_timeout: Duration,

    /// Maximum idle connections per host.
    pub max_connections: u32,

    /// Idle connection timeout.
    pub idle_timeout: Duration,

    /// Objects with a known size above this use multipart upload.
    pub multipart_threshold: u64,

    /// Part size for multipart uploads. Computed from the object size when `None`.
    pub multipart_part_size: Option<u64>,

    /// Number of parts uploaded concurrently. 1 uploads parts sequentially.
    pub multipart_concurrency: usize,

    /// Checksums computed locally and sent with each upload.
    pub checksum_algorithms: Vec<ChecksumAlgorithm>,

    /// Whether checksums are sent per part or once for the whole object.
    pub checksum_mode: ChecksumMode,

    /// Verify SSL certificates.
    pub verify_ssl: bool,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("path_style", &self.path_style)
            .field("use_dual_stack", &self.use_dual_stack)
            .field("use_fips", &self.use_fips)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("max_connections", &self.max_connections)
            .field("multipart_threshold", &self.multipart_threshold)
            .field("multipart_part_size", &self.multipart_part_size)
            .field("multipart_concurrency", &self.multipart_concurrency)
            .field("checksum_algorithms", &self.checksum_algorithms)
            .field("checksum_mode", &self.checksum_mode)
            .field("verify_ssl", &self.verify_ssl)
            // credentials_provider omitted
            .finish_non_exhaustive()
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            credentials_provider: Arc::new(EnvCredentialsProvider::new()),
            endpoint: None,
            path_style: false,
            use_dual_stack: false,
            use_fips: false,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            max_connections: 100,
            idle_timeout: Duration::from_secs(90),
            multipart_threshold: 64 * 1024 * 1024,
            multipart_part_size: None,
            multipart_concurrency: 4,
            checksum_algorithms: Vec::new(),
            checksum_mode: ChecksumMode::PerPart,
            verify_ssl: true,
        }
    }
}

impl S3Config {
    /// Create a new configuration builder.
    pub fn builder() -> S3ConfigBuilder {
        S3ConfigBuilder::default()
    }

    /// Resolve the endpoint URL for a bucket in the given region.
    pub fn resolve_endpoint(&self, bucket: Option<&str>, region: &str) -> Result<Url, S3Error> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }

        let host = if self.use_fips && self.use_dual_stack {
            format!("s3-fips.dualstack.{}.amazonaws.com", region)
        } else if self.use_fips {
            format!("s3-fips.{}.amazonaws.com", region)
        } else if self.use_dual_stack {
            format!("s3.dualstack.{}.amazonaws.com", region)
        } else {
            format!("s3.{}.amazonaws.com", region)
        };

        let url_str = match bucket {
            Some(bucket) if !self.path_style => format!("https://{}.{}", bucket, host),
            _ => format!("https://{}", host),
        };

        Url::parse(&url_str).map_err(|e| {
            S3Error::Configuration(ConfigurationError::InvalidEndpoint {
                url: url_str.clone(),
                details: e.to_string(),
            })
        })
    }

    /// Build the path for an S3 request.
    pub fn build_path(&self, bucket: &str, key: Option<&str>) -> String {
        if self.path_style || self.endpoint.is_some() {
            match key {
                Some(k) => format!("/{}/{}", bucket, k),
                None => format!("/{}", bucket),
            }
        } else {
            match key {
                Some(k) => format!("/{}", k),
                None => "/".to_string(),
            }
        }
    }
}

/// Builder for S3 configuration.
#[derive(Default)]
pub struct S3ConfigBuilder {
    region: Option<String>,
    credentials_provider: Option<Arc<dyn CredentialsProvider>>,
    endpoint: Option<Url>,
    path_style: Option<bool>,
    use_dual_stack: Option<bool>,
    use_fips: Option<bool>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    max_connections: Option<u32>,
    idle_timeout: Option<Duration>,
    multipart_threshold: Option<u64>,
    multipart_part_size: Option<u64>,
    multipart_concurrency: Option<usize>,
    checksum_algorithms: Option<Vec<ChecksumAlgorithm>>,
    checksum_mode: Option<ChecksumMode>,
    verify_ssl: Option<bool>,
}

impl S3ConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the AWS region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the credentials provider.
    pub fn credentials_provider(mut self, provider: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials_provider = Some(provider);
        self
    }

    /// Set a custom endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Result<Self, S3Error> {
        let url_str = endpoint.into();
        let url = Url::parse(&url_str).map_err(|e| {
            S3Error::Configuration(ConfigurationError::InvalidEndpoint {
                url: url_str,
                details: e.to_string(),
            })
        })?;
        self.endpoint = Some(url);
        Ok(self)
    }

    /// Set a custom endpoint URL (infallible version).
    pub fn endpoint_url(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Enable path-style addressing.
    pub fn path_style(mut self, enabled: bool) -> Self {
        self.path_style = Some(enabled);
        self
    }

    /// Enable dual-stack endpoints.
    pub fn dual_stack(mut self, enabled: bool) -> Self {
        self.use_dual_stack = Some(enabled);
        self
    }

    /// Enable FIPS endpoints.
    pub fn fips(mut self, enabled: bool) -> Self {
        self.use_fips = Some(enabled);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    pub fn max_connections(mut self, connections: u32) -> Self {
        self.max_connections = Some(connections);
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set the multipart upload threshold.
    pub fn multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = Some(threshold);
        self
    }

    /// Set a fixed multipart part size.
    pub fn multipart_part_size(mut self, size: u64) -> Self {
        self.multipart_part_size = Some(size);
        self
    }

    /// Set the number of concurrently uploaded parts.
    pub fn multipart_concurrency(mut self, concurrency: usize) -> Self {
        self.multipart_concurrency = Some(concurrency);
        self
    }

    /// Set the checksum algorithms computed for uploads.
    pub fn checksum_algorithms(mut self, algorithms: Vec<ChecksumAlgorithm>) -> Self {
        self.checksum_algorithms = Some(algorithms);
        self
    }

    /// Set the checksum mode.
    pub fn checksum_mode(mut self, mode: ChecksumMode) -> Self {
        self.checksum_mode = Some(mode);
        self
    }

    /// Enable or disable SSL verification.
    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = Some(verify);
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env(mut self) -> Self {
        if let Ok(region) = std::env::var("AWS_REGION") {
            self.region = Some(region);
        } else if let Ok(region) = std::env::var("AWS_DEFAULT_REGION") {
            self.region = Some(region);
        }

        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL_S3") {
            if let Ok(url) = Url::parse(&endpoint) {
                self.endpoint = Some(url);
            }
        } else if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            if let Ok(url) = Url::parse(&endpoint) {
                self.endpoint = Some(url);
            }
        }

        if let Ok(val) = std::env::var("AWS_USE_FIPS_ENDPOINT") {
            self.use_fips = Some(val.to_lowercase() == "true");
        }
        if let Ok(val) = std::env::var("AWS_USE_DUALSTACK_ENDPOINT") {
            self.use_dual_stack = Some(val.to_lowercase() == "true");
        }

        if let Ok(val) = std::env::var("S3_TRANSFER_PATH_STYLE") {
            self.path_style = Some(val.to_lowercase() == "true");
        }
        if let Ok(val) = std::env::var("S3_TRANSFER_MULTIPART_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                self.multipart_threshold = Some(threshold);
            }
        }
        if let Ok(val) = std::env::var("S3_TRANSFER_PART_SIZE") {
            if let Ok(size) = val.parse() {
                self.multipart_part_size = Some(size);
            }
        }
        if let Ok(val) = std::env::var("S3_TRANSFER_CONCURRENCY") {
            if let Ok(concurrency) = val.parse() {
                self.multipart_concurrency = Some(concurrency);
            }
        }

        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<S3Config, S3Error> {
        let defaults = S3Config::default();

        let multipart_part_size = self.multipart_part_size.or(defaults.multipart_part_size);
        if let Some(size) = multipart_part_size {
            if !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&size) {
                return Err(S3Error::Request(RequestError::InvalidPartSize {
                    size,
                    min_size: MIN_PART_SIZE,
                    max_size: MAX_PART_SIZE,
                }));
            }
        }

        let multipart_concurrency = self
            .multipart_concurrency
            .unwrap_or(defaults.multipart_concurrency);
        if multipart_concurrency == 0 {
            return Err(S3Error::Configuration(
                ConfigurationError::InvalidConfiguration {
                    field: "multipart_concurrency".to_string(),
                    message: "Concurrency must be at least 1".to_string(),
                },
            ));
        }

        let checksum_algorithms = self
            .checksum_algorithms
            .unwrap_or(defaults.checksum_algorithms);
        let checksum_mode = self.checksum_mode.unwrap_or(defaults.checksum_mode);
        if checksum_mode == ChecksumMode::FullObject {
            if !checksum_algorithms.iter().any(|a| a.is_crc()) {
                return Err(S3Error::Configuration(
                    ConfigurationError::InvalidConfiguration {
                        field: "checksum_algorithms".to_string(),
                        message: "Full-object checksums need a CRC algorithm".to_string(),
                    },
                ));
            }
            // A stored non-CRC digest would compete with the CRC as the
            // upload's checksum algorithm.
            if let Some(algorithm) = checksum_algorithms
                .iter()
                .find(|a| a.is_stored() && !a.is_crc())
            {
                return Err(S3Error::Configuration(
                    ConfigurationError::InvalidConfiguration {
                        field: "checksum_algorithms".to_string(),
                        message: format!(
                            "{} cannot be combined across parts; full-object checksums are CRC only",
                            algorithm
                        ),
                    },
                ));
            }
        }

        Ok(S3Config {
            region: self.region.unwrap_or(defaults.region),
            credentials_provider: self
                .credentials_provider
                .unwrap_or(defaults.credentials_provider),
            endpoint: self.endpoint,
            path_style: self.path_style.unwrap_or(defaults.path_style),
            use_dual_stack: self.use_dual_stack.unwrap_or(defaults.use_dual_stack),
            use_fips: self.use_fips.unwrap_or(defaults.use_fips),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            read_timeout: self.read_timeout.unwrap_or(defaults.read_timeout),
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            idle_timeout: self.idle_timeout.unwrap_or(defaults.idle_timeout),
            multipart_threshold: self.multipart_threshold.unwrap_or(defaults.multipart_threshold),
            multipart_part_size,
            multipart_concurrency,
            checksum_algorithms,
            checksum_mode,
            verify_ssl: self.verify_ssl.unwrap_or(defaults.verify_ssl),
        })
    }
}
