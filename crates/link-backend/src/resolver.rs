//! Metadata resolution: learn size and modification time of a remote object
//! without downloading it

use crate::error::{LinkError, Result};
use crate::http_date::parse_http_date;
use crate::registry::forward_headers;
use crate::retry::{call_with_retry, RetryPolicy};
use crate::types::Metadata;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LAST_MODIFIED, RANGE};
use reqwest::{Client, Method, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Something that can tell the size and modification time of a URL
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn resolve(&self, url: &str, headers: &HeaderMap) -> Result<Metadata>;
}

/// Probes upstreams over HTTP: HEAD first, then a single-byte range GET
pub struct HttpResolver {
    client: Client,
    retry: RetryPolicy,
    timeout: Duration,
}

impl HttpResolver {
    pub fn new(client: Client, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            client,
            retry,
            timeout,
        }
    }

    async fn probe(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
    ) -> std::result::Result<Response, reqwest::Error> {
        let forwarded = forward_headers(headers);
        call_with_retry(
            &self.retry,
            || {
                let mut request = self
                    .client
                    .request(method.clone(), url)
                    .headers(forwarded.clone())
                    .timeout(self.timeout);
                if method == Method::GET {
                    request = request.header(RANGE, "bytes=0-0");
                }
                request.send()
            },
            |outcome| self.retry.classify(outcome),
        )
        .await
    }
}

#[async_trait]
impl MetadataSource for HttpResolver {
    async fn resolve(&self, url: &str, headers: &HeaderMap) -> Result<Metadata> {
        let response = match self.probe(Method::HEAD, url, headers).await {
            Ok(response)
                if response.status() == StatusCode::OK
                    && content_length(response.headers()).is_some() =>
            {
                response
            }
            head => {
                match &head {
                    Ok(response) => {
                        debug!(url, status = %response.status(), "HEAD probe unusable, trying range GET")
                    }
                    Err(e) => debug!(url, error = %e, "HEAD probe failed, trying range GET"),
                }
                self.probe(Method::GET, url, headers).await.map_err(|e| {
                    warn!(url, error = %e, "Range GET probe failed");
                    LinkError::from(e)
                })?
            }
        };

        metadata_from_response(url, response.status(), response.headers())
    }
}

/// Build metadata from a probe response's status and headers
pub fn metadata_from_response(
    url: &str,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<Metadata> {
    if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
        warn!(url, status = %status, "Metadata fetch failed");
        return Err(LinkError::metadata(
            Some(status),
            format!("status {}", status.as_u16()),
        ));
    }

    let mut size = content_length(headers);
    if status == StatusCode::PARTIAL_CONTENT {
        if let Some(total) = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
        {
            size = Some(total);
        }
    }

    let size = size.ok_or_else(|| {
        warn!(url, "Metadata fetch failed: unknown file size");
        LinkError::metadata(None, format!("unknown file size for {}", url))
    })?;

    let mod_time = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
        .unwrap_or_else(Utc::now);

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    debug!(url, size, %mod_time, "Resolved metadata");

    Ok(Metadata {
        size,
        mod_time,
        content_type,
    })
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Total length from a `bytes start-end/total` Content-Range value
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let (range, total) = value.trim().strip_prefix("bytes ")?.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    start.trim().parse::<u64>().ok()?;
    end.trim().parse::<u64>().ok()?;
    total.trim().parse::<u64>().ok()
}
