//! Core types for the vfscache proxy

use link_backend::MetadataCacheStats;
use serde::{Deserialize, Serialize};

/// Query string of `/stream`
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub url: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub identities: usize,
    pub metadata_cache: MetadataCacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_query_deserialization() {
        let query: StreamQuery =
            serde_json::from_str(r#"{"url": "https://example.com/a.mp4"}"#).unwrap();
        assert_eq!(query.url.as_deref(), Some("https://example.com/a.mp4"));

        let empty: StreamQuery = serde_json::from_str("{}").unwrap();
        assert!(empty.url.is_none());
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            uptime_secs: 3600,
            identities: 12,
            metadata_cache: MetadataCacheStats {
                entries: 10,
                weighted_size: 640,
                hits: 500,
                misses: 50,
            },
        };

        let json: serde_json::Value = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["uptime_secs"], 3600);
        assert_eq!(json["identities"], 12);
        assert_eq!(json["metadata_cache"]["hits"], 500);
    }
}
