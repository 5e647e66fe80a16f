//! Remote objects: the files a streaming engine reads from

use crate::error::{LinkError, Result};
use crate::registry::forward_headers;
use crate::types::Metadata;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use tracing::debug;

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Inclusive byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Value for a `Range` request header
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Value for a `Content-Range` response header
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// A read-only remote file: size, modification time and a byte stream
#[async_trait]
pub trait RemoteObject: Send + Sync {
    /// Name of the object inside its backend
    fn remote(&self) -> &str;

    /// Size in bytes, `None` when unknown
    fn size(&self) -> Option<u64>;

    fn mod_time(&self) -> DateTime<Utc>;

    fn mime_type(&self) -> Option<&str> {
        None
    }

    /// Stream the whole object, or only `range` of it
    async fn open(&self, range: Option<ByteRange>) -> Result<ByteStream>;
}

/// A remote object backed by an HTTP URL
#[derive(Debug, Clone)]
pub struct LinkObject {
    remote: String,
    url: String,
    headers: HeaderMap,
    metadata: Metadata,
    client: Client,
}

impl LinkObject {
    pub fn new(
        remote: impl Into<String>,
        url: impl Into<String>,
        headers: HeaderMap,
        metadata: Metadata,
        client: Client,
    ) -> Self {
        Self {
            remote: remote.into(),
            url: url.into(),
            headers,
            metadata,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

#[async_trait]
impl RemoteObject for LinkObject {
    fn remote(&self) -> &str {
        &self.remote
    }

    fn size(&self) -> Option<u64> {
        Some(self.metadata.size)
    }

    fn mod_time(&self) -> DateTime<Utc> {
        self.metadata.mod_time
    }

    fn mime_type(&self) -> Option<&str> {
        self.metadata.content_type.as_deref()
    }

    async fn open(&self, range: Option<ByteRange>) -> Result<ByteStream> {
        let mut request = self
            .client
            .get(&self.url)
            .headers(forward_headers(&self.headers));
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(LinkError::Open(status));
        }

        let body: ByteStream = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();

        match range {
            // Upstream ignored the Range header and sent everything
            Some(range) if status == StatusCode::OK => {
                debug!(remote = %self.remote, "Upstream ignored range request, slicing body");
                Ok(slice_stream(body, range.start, range.len()))
            }
            _ => Ok(body),
        }
    }
}

/// Skip `skip` bytes of `inner`, then yield at most `limit` bytes
fn slice_stream(inner: ByteStream, skip: u64, limit: u64) -> ByteStream {
    stream::unfold(
        (inner, skip, limit),
        |(mut inner, mut skip, mut remaining)| async move {
            if remaining == 0 {
                return None;
            }
            loop {
                match inner.next().await {
                    None => return None,
                    Some(Err(e)) => return Some((Err(e), (inner, skip, 0))),
                    Some(Ok(mut chunk)) => {
                        if skip > 0 {
                            let n = skip.min(chunk.len() as u64);
                            chunk = chunk.slice(n as usize..);
                            skip -= n;
                        }
                        if chunk.len() as u64 > remaining {
                            chunk.truncate(remaining as usize);
                        }
                        if chunk.is_empty() {
                            continue;
                        }
                        remaining -= chunk.len() as u64;
                        return Some((Ok(chunk), (inner, skip, remaining)));
                    }
                }
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn read_all(stream: ByteStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    fn object(url: String, size: u64) -> LinkObject {
        let metadata = Metadata {
            size,
            mod_time: Utc::now(),
            content_type: Some("text/plain".to_string()),
        };
        LinkObject::new("abc", url, HeaderMap::new(), metadata, Client::new())
    }

    #[test]
    fn test_byte_range_headers() {
        let range = ByteRange { start: 10, end: 19 };
        assert_eq!(range.len(), 10);
        assert_eq!(range.header_value(), "bytes=10-19");
        assert_eq!(range.content_range(100), "bytes 10-19/100");
    }

    #[tokio::test]
    async fn test_slice_stream_across_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"defg")),
            Ok(Bytes::from_static(b"hij")),
        ];
        let inner: ByteStream = stream::iter(chunks).boxed();

        assert_eq!(read_all(slice_stream(inner, 2, 6)).await, b"cdefgh");
    }

    #[tokio::test]
    async fn test_open_full() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abcdefgh".to_vec()))
            .mount(&server)
            .await;

        let obj = object(format!("{}/a.txt", server.uri()), 8);
        assert_eq!(obj.size(), Some(8));
        assert_eq!(obj.mime_type(), Some("text/plain"));
        assert_eq!(read_all(obj.open(None).await.unwrap()).await, b"abcdefgh");
    }

    #[tokio::test]
    async fn test_open_range_forwards_range_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.txt"))
            .and(header("range", "bytes=2-4"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("content-range", "bytes 2-4/8")
                    .set_body_bytes(b"cde".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let obj = object(format!("{}/a.txt", server.uri()), 8);
        let body = obj.open(Some(ByteRange { start: 2, end: 4 })).await.unwrap();
        assert_eq!(read_all(body).await, b"cde");
    }

    #[tokio::test]
    async fn test_open_range_when_upstream_ignores_it() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abcdefgh".to_vec()))
            .mount(&server)
            .await;

        let obj = object(format!("{}/a.txt", server.uri()), 8);
        let body = obj.open(Some(ByteRange { start: 2, end: 4 })).await.unwrap();
        assert_eq!(read_all(body).await, b"cde");
    }

    #[tokio::test]
    async fn test_open_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let obj = object(format!("{}/a.txt", server.uri()), 8);
        match obj.open(None).await {
            Err(LinkError::Open(status)) => assert_eq!(status, StatusCode::FORBIDDEN),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("expected an error"),
        }
    }
}
