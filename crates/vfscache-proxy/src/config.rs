use crate::error::{ProxyError, Result};
use link_backend::key::MAX_SHARD_LEVEL;
use link_backend::{LinkOptions, RetryPolicy};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const CACHE_MODES: [&str; 4] = ["off", "minimal", "writes", "full"];

/// Proxy configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub strip_query: bool,
    pub strip_domain: bool,
    pub metadata_cache_size: u64,
    pub shard_level: usize,
    pub upstream_url: Option<String>,
    pub probe_max_retries: u32,
    pub probe_timeout: Duration,
    pub engine: EngineConfig,
}

/// Knobs for the streaming engine, validated and logged but passed through
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_dir: Option<PathBuf>,
    pub cache_mode: String,
    pub chunk_size: String,
    pub chunk_streams: i64,
    pub max_age: String,
    pub max_size: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ProxyConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from any key/value source; unparsable values
    /// fall back to their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let strip_query = lookup("STRIP_QUERY").is_some_and(|v| parse_bool(&v));
        let strip_domain = lookup("STRIP_DOMAIN").is_some_and(|v| parse_bool(&v));

        let metadata_cache_size = lookup("METADATA_CACHE_SIZE")
            .and_then(|s| parse_size(&s))
            .unwrap_or(5 * 1024 * 1024);

        let shard_level = lookup("SHARD_LEVEL")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        let upstream_url = lookup("UPSTREAM_URL").filter(|s| !s.trim().is_empty());

        let probe_max_retries = lookup("PROBE_MAX_RETRIES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(link_backend::retry::DEFAULT_MAX_RETRIES);

        let probe_timeout = lookup("PROBE_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let engine = EngineConfig {
            cache_dir: lookup("CACHE_DIR").map(PathBuf::from),
            cache_mode: lookup("CACHE_MODE").unwrap_or_else(|| "full".to_string()),
            chunk_size: lookup("CHUNK_SIZE").unwrap_or_else(|| "64M".to_string()),
            chunk_streams: lookup("CHUNK_STREAMS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            max_age: lookup("MAX_AGE").unwrap_or_else(|| "1h".to_string()),
            max_size: lookup("MAX_SIZE").unwrap_or_else(|| "off".to_string()),
        };

        Self {
            port,
            strip_query,
            strip_domain,
            metadata_cache_size,
            shard_level,
            upstream_url,
            probe_max_retries,
            probe_timeout,
            engine,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !CACHE_MODES.contains(&self.engine.cache_mode.as_str()) {
            return Err(ProxyError::Config(format!(
                "invalid CACHE_MODE {:?}: must be one of off, minimal, writes, full",
                self.engine.cache_mode
            )));
        }

        if self.engine.chunk_streams < 0 {
            return Err(ProxyError::Config(format!(
                "CHUNK_STREAMS must be non-negative, got {}",
                self.engine.chunk_streams
            )));
        }

        if self.shard_level > MAX_SHARD_LEVEL {
            return Err(ProxyError::Config(format!(
                "SHARD_LEVEL must be at most {}, got {}",
                MAX_SHARD_LEVEL, self.shard_level
            )));
        }

        if let Some(upstream) = &self.upstream_url {
            let parsed = Url::parse(upstream)
                .map_err(|e| ProxyError::Config(format!("invalid UPSTREAM_URL: {}", e)))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ProxyError::Config(format!(
                    "UPSTREAM_URL must be http or https, got {}",
                    parsed.scheme()
                )));
            }
        }

        Ok(())
    }

    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            strip_query: self.strip_query,
            strip_domain: self.strip_domain,
            metadata_cache_size: self.metadata_cache_size,
            retry: RetryPolicy {
                max_retries: self.probe_max_retries,
                ..RetryPolicy::default()
            },
            probe_timeout: self.probe_timeout,
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse a byte size such as `5242880`, `512K`, `5M` or `1G`
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let value = value
        .strip_suffix("iB")
        .or_else(|| value.strip_suffix('B'))
        .unwrap_or(value);

    let (digits, multiplier) = match value.chars().last()?.to_ascii_uppercase() {
        'K' => (&value[..value.len() - 1], 1024),
        'M' => (&value[..value.len() - 1], 1024 * 1024),
        'G' => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };

    digits.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}
