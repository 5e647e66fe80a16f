//! The link backend: turns registered identifiers into remote objects

use crate::cache::{MetadataCache, METADATA_TTL};
use crate::error::{LinkError, Result};
use crate::key::canonical_key;
use crate::object::LinkObject;
use crate::registry::IdentityTable;
use crate::resolver::{HttpResolver, MetadataSource};
use crate::types::{LinkOptions, MetadataCacheStats};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Read-only object provider over registered URLs
pub struct LinkBackend {
    identities: Arc<IdentityTable>,
    cache: MetadataCache,
    source: Arc<dyn MetadataSource>,
    client: Client,
    strip_query: bool,
    strip_domain: bool,
    metadata_ttl: Duration,
}

impl LinkBackend {
    /// Create a backend that probes upstreams over HTTP
    pub fn new(identities: Arc<IdentityTable>, options: LinkOptions) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(options.probe_timeout)
            .build()?;
        let source = Arc::new(HttpResolver::new(
            client.clone(),
            options.retry.clone(),
            options.probe_timeout,
        ));
        Ok(Self::with_source(identities, &options, source, client))
    }

    /// Create a backend with a custom metadata source
    pub fn with_source(
        identities: Arc<IdentityTable>,
        options: &LinkOptions,
        source: Arc<dyn MetadataSource>,
        client: Client,
    ) -> Self {
        Self {
            identities,
            cache: MetadataCache::new(options.metadata_cache_size),
            source,
            client,
            strip_query: options.strip_query,
            strip_domain: options.strip_domain,
            metadata_ttl: METADATA_TTL,
        }
    }

    pub fn identities(&self) -> &Arc<IdentityTable> {
        &self.identities
    }

    pub async fn cache_stats(&self) -> MetadataCacheStats {
        self.cache.stats().await
    }

    /// Resolve the object registered under `identifier`.
    ///
    /// Metadata comes from the cache when a fresh record exists for the
    /// URL's canonical key, otherwise from the metadata source.
    pub async fn new_object(&self, identifier: &str) -> Result<LinkObject> {
        let entry = self
            .identities
            .lookup(identifier)
            .ok_or_else(|| LinkError::NotFound(identifier.to_string()))?;

        let key = canonical_key(&entry.url, self.strip_query, self.strip_domain);
        let metadata = self
            .cache
            .get_or_resolve(
                key,
                self.metadata_ttl,
                self.source.resolve(&entry.url, &entry.headers),
            )
            .await
            .map_err(|e| {
                error!(identifier, url = %entry.url, error = %e, "Failed to resolve metadata");
                e
            })?;

        Ok(LinkObject::new(
            identifier,
            entry.url,
            entry.headers,
            metadata,
            self.client.clone(),
        ))
    }

    /// Every registered object that currently resolves
    pub async fn list(&self) -> Vec<LinkObject> {
        let mut objects = Vec::new();
        for identifier in self.identities.identifiers() {
            match self.new_object(&identifier).await {
                Ok(object) => objects.push(object),
                Err(e) => debug!(identifier = %identifier, error = %e, "Skipping unresolvable object"),
            }
        }
        objects
    }
}
