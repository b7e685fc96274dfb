//! Per-client bucket region cache.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Remembers the region each bucket was found in.
///
/// Owned by one client and shared with its services. Entries are learned from
/// the `x-amz-bucket-region` header of redirect responses.
#[derive(Debug, Default)]
pub struct RegionCache {
    regions: RwLock<HashMap<String, String>>,
}

impl RegionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Region recorded for a bucket.
    pub fn get(&self, bucket: &str) -> Option<String> {
        self.regions.read().get(bucket).cloned()
    }

    /// Region for a bucket, falling back to `default_region`.
    pub fn region_for(&self, bucket: &str, default_region: &str) -> String {
        self.get(bucket)
            .unwrap_or_else(|| default_region.to_string())
    }

    /// Record the region of a bucket.
    pub fn insert(&self, bucket: impl Into<String>, region: impl Into<String>) {
        let bucket = bucket.into();
        let region = region.into();
        debug!(bucket = %bucket, region = %region, "Caching bucket region");
        self.regions.write().insert(bucket, region);
    }

    /// Forget a bucket.
    pub fn remove(&self, bucket: &str) -> Option<String> {
        self.regions.write().remove(bucket)
    }

    /// Number of cached buckets.
    pub fn len(&self) -> usize {
        self.regions.read().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.regions.read().is_empty()
    }
}
