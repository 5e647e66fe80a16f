//! Backend types

use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What an identifier routes to: the original URL and the headers that are
/// forwarded upstream when probing or streaming it
#[derive(Debug, Clone)]
pub struct IdentityEntry {
    pub url: String,
    pub headers: HeaderMap,
}

/// Resolved metadata for a remote object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    /// Content-Type reported by the upstream, if any
    pub content_type: Option<String>,
}

/// Statistics about the metadata cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataCacheStats {
    pub entries: u64,
    pub weighted_size: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Configuration for a link backend
#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub strip_query: bool,
    pub strip_domain: bool,
    /// Metadata cache budget in bytes
    pub metadata_cache_size: u64,
    pub retry: RetryPolicy,
    /// Connect timeout for all upstream requests, and total timeout for probes
    pub probe_timeout: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            strip_query: false,
            strip_domain: false,
            metadata_cache_size: 5 * 1024 * 1024, // 5MB
            retry: RetryPolicy::default(),
            probe_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = LinkOptions::default();
        assert!(!options.strip_query);
        assert!(!options.strip_domain);
        assert_eq!(options.metadata_cache_size, 5 * 1024 * 1024);
        assert_eq!(options.probe_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_cache_stats_default() {
        let stats = MetadataCacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.weighted_size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_cache_stats_serialization() {
        let stats = MetadataCacheStats {
            entries: 12,
            weighted_size: 960,
            hits: 40,
            misses: 12,
        };

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"weighted_size\":960"));

        let deserialized: MetadataCacheStats = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.hits, 40);
    }
}
