//! Bounded in-memory metadata cache with per-entry TTL

use crate::key::CacheKey;
use crate::types::{Metadata, MetadataCacheStats};
use moka::future::Cache;
use moka::Expiry;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// How long resolved metadata is trusted
pub const METADATA_TTL: Duration = Duration::from_secs(60 * 60);

/// Approximate footprint of one entry besides its content type
const ENTRY_OVERHEAD: u32 = 64;

#[derive(Debug)]
struct CachedMetadata {
    metadata: Metadata,
    ttl: Duration,
}

impl CachedMetadata {
    fn weight(&self) -> u32 {
        let content_type = self
            .metadata
            .content_type
            .as_ref()
            .map_or(0, |ct| ct.len() as u32);
        ENTRY_OVERHEAD.saturating_add(content_type)
    }
}

struct PerEntryTtl;

impl Expiry<CacheKey, Arc<CachedMetadata>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &Arc<CachedMetadata>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &Arc<CachedMetadata>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Metadata records keyed by canonical-key digest.
///
/// Capacity is a byte budget; entries are weighed by their approximate
/// footprint and the least valuable ones are evicted once it is exceeded.
/// A refresh replaces the previous record for the same key.
pub struct MetadataCache {
    inner: Cache<CacheKey, Arc<CachedMetadata>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetadataCache {
    pub fn new(max_bytes: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|_key: &CacheKey, value: &Arc<CachedMetadata>| value.weight())
            .expire_after(PerEntryTtl)
            .build();

        Self {
            inner,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a record; expired records are reported as misses
    pub async fn get(&self, key: &CacheKey) -> Option<Metadata> {
        match self.inner.get(key).await {
            Some(cached) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %hex::encode(key), "Metadata cache hit");
                Some(cached.metadata.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn put(&self, key: CacheKey, metadata: Metadata, ttl: Duration) {
        self.inner
            .insert(key, Arc::new(CachedMetadata { metadata, ttl }))
            .await;
    }

    /// Return the cached record for `key`, or run `resolve` and store its
    /// result. Concurrent misses for one key may each resolve; the last
    /// result stored wins. Failures are not cached.
    pub async fn get_or_resolve<E, F>(
        &self,
        key: CacheKey,
        ttl: Duration,
        resolve: F,
    ) -> Result<Metadata, E>
    where
        F: Future<Output = Result<Metadata, E>>,
    {
        if let Some(metadata) = self.get(&key).await {
            return Ok(metadata);
        }

        let metadata = resolve.await?;
        self.put(key, metadata.clone(), ttl).await;
        Ok(metadata)
    }

    pub async fn stats(&self) -> MetadataCacheStats {
        self.inner.run_pending_tasks().await;
        MetadataCacheStats {
            entries: self.inner.entry_count(),
            weighted_size: self.inner.weighted_size(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
