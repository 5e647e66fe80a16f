//! Content server: answers one GET or HEAD for a target URL

use crate::error::{ProxyError, VfsError};
use crate::range::{self, Plan};
use crate::vfs::{Node, Vfs};
use axum::body::Body;
use axum::http::header::{
    ACCEPT_RANGES, ALLOW, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LAST_MODIFIED, RANGE,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{StreamExt, TryStreamExt};
use link_backend::http_date::format_http_date;
use link_backend::{file_hash, sharded_path, ByteRange, ByteStream, IdentityTable, RemoteObject};
use mime_guess::mime;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

pub struct ContentServer {
    identities: Arc<IdentityTable>,
    vfs: Arc<dyn Vfs>,
    strip_query: bool,
    strip_domain: bool,
    shard_level: usize,
}

impl ContentServer {
    pub fn new(
        identities: Arc<IdentityTable>,
        vfs: Arc<dyn Vfs>,
        strip_query: bool,
        strip_domain: bool,
        shard_level: usize,
    ) -> Self {
        Self {
            identities,
            vfs,
            strip_query,
            strip_domain,
            shard_level,
        }
    }

    pub fn identities(&self) -> &Arc<IdentityTable> {
        &self.identities
    }

    /// Serve `url` as a file.
    ///
    /// The URL is registered under its identifier, resolved through the
    /// virtual file system and answered with the usual HEAD, range and
    /// conditional request semantics. Nothing happens for an empty URL.
    pub async fn serve(&self, method: &Method, headers: &HeaderMap, url: &str) -> Response {
        if url.is_empty() {
            return ProxyError::BadRequest("missing url".to_string()).into_response();
        }
        if method != Method::GET && method != Method::HEAD {
            return (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, "GET, HEAD")]).into_response();
        }

        let identifier = file_hash(url, self.strip_query, self.strip_domain);
        self.identities.register(&identifier, url, headers);
        let name = sharded_path(&identifier, self.shard_level);

        let object = match self.vfs.stat(&name).await {
            Ok(Node::File(object)) => object,
            Ok(Node::Dir(_)) => {
                return ProxyError::NotFound(format!("{} is not a file", name)).into_response()
            }
            Err(e) => {
                if !matches!(e, VfsError::NotFound(_)) {
                    error!(identifier = %identifier, url, error = %e, "Failed to find file");
                }
                return ProxyError::from(e).into_response();
            }
        };

        let mut response_headers = HeaderMap::new();
        if let Some(size) = object.size() {
            response_headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
            response_headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        }
        if let Some(value) =
            content_type(object.as_ref(), url).and_then(|ct| HeaderValue::from_str(&ct).ok())
        {
            response_headers.insert(CONTENT_TYPE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&format_http_date(&object.mod_time())) {
            response_headers.insert(LAST_MODIFIED, value);
        }

        if method == Method::HEAD {
            return (StatusCode::OK, response_headers).into_response();
        }

        match object.size() {
            Some(size) => serve_known_size(object, headers, response_headers, size, identifier).await,
            None => serve_unknown_size(object, headers, response_headers, identifier).await,
        }
    }
}

async fn serve_known_size(
    object: Arc<dyn RemoteObject>,
    request_headers: &HeaderMap,
    mut headers: HeaderMap,
    size: u64,
    identifier: String,
) -> Response {
    let (status, range) = match range::plan(request_headers, size, object.mod_time()) {
        Plan::Full => (StatusCode::OK, None),
        Plan::Partial(range) => (StatusCode::PARTIAL_CONTENT, Some(range)),
        Plan::NotModified => {
            headers.remove(CONTENT_LENGTH);
            headers.remove(CONTENT_TYPE);
            return (StatusCode::NOT_MODIFIED, headers).into_response();
        }
        Plan::PreconditionFailed => return StatusCode::PRECONDITION_FAILED.into_response(),
        Plan::Unsatisfiable => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                headers.insert(CONTENT_RANGE, value);
            }
            return (StatusCode::RANGE_NOT_SATISFIABLE, headers).into_response();
        }
    };

    if let Some(range) = range {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(range.len()));
        if let Ok(value) = HeaderValue::from_str(&range.content_range(size)) {
            headers.insert(CONTENT_RANGE, value);
        }
    }

    stream_body(object, range, status, headers, identifier).await
}

async fn serve_unknown_size(
    object: Arc<dyn RemoteObject>,
    request_headers: &HeaderMap,
    headers: HeaderMap,
    identifier: String,
) -> Response {
    if request_headers.contains_key(RANGE) {
        debug!(identifier = %identifier, "Range requested for a file of unknown size");
        return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    }
    stream_body(object, None, StatusCode::OK, headers, identifier).await
}

async fn stream_body(
    object: Arc<dyn RemoteObject>,
    range: Option<ByteRange>,
    status: StatusCode,
    headers: HeaderMap,
    identifier: String,
) -> Response {
    let stream = match object.open(range).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(identifier = %identifier, error = %e, "Failed to open file");
            return ProxyError::from(e).into_response();
        }
    };

    (status, headers, Body::from_stream(log_truncation(stream, identifier))).into_response()
}

/// Headers are already sent when a copy fails, so the error is only logged
/// and the client sees a short body.
fn log_truncation(stream: ByteStream, identifier: String) -> ByteStream {
    stream
        .inspect_err(move |e| {
            error!(identifier = %identifier, error = %e, "Stream copy failed, response truncated")
        })
        .boxed()
}

/// Content type for the response, `None` to leave it to the client
fn content_type(object: &dyn RemoteObject, url: &str) -> Option<String> {
    let path = url_path(url);
    let value = match object.mime_type() {
        Some(declared) => declared.to_string(),
        None => mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string(),
    };

    let generic = value.starts_with(mime::APPLICATION_OCTET_STREAM.essence_str());
    if generic && Path::new(&path).extension().is_none() {
        None
    } else {
        Some(value)
    }
}

fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    }
}
