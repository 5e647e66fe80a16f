//! HTTP server for the proxy endpoints
//!
//! Provides /health, /stream?url=…, /stream/{base64 url} and, when an
//! upstream is configured, serves every other path from that upstream.

use crate::config::ProxyConfig;
use crate::content::ContentServer;
use crate::error::{ErrorResponse, ProxyError, Result};
use crate::types::{HealthResponse, StreamQuery};
use crate::vfs::LinkVfs;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use link_backend::{IdentityTable, LinkBackend};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use url::Url;

/// Shared state for the HTTP server
pub struct ServerState {
    pub content: ContentServer,
    pub backend: Arc<LinkBackend>,
    pub upstream: Option<Url>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let identities = Arc::new(IdentityTable::new());
        let backend = Arc::new(LinkBackend::new(identities.clone(), config.link_options())?);
        let vfs = Arc::new(LinkVfs::new(backend.clone(), config.shard_level));
        let content = ContentServer::new(
            identities,
            vfs,
            config.strip_query,
            config.strip_domain,
            config.shard_level,
        );

        let upstream = config
            .upstream_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| ProxyError::Config(format!("invalid UPSTREAM_URL: {}", e)))?;

        Ok(Self {
            content,
            backend,
            upstream,
            started_at: Utc::now(),
        })
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stream", get(stream_by_query).head(stream_by_query))
        .route(
            "/stream/{*encoded}",
            get(stream_by_path).head(stream_by_path),
        )
        .fallback(stream_from_upstream)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Log a panic raised while serving a request and answer 500
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic payload"
    };
    error!(panic = %message, "Panic while serving request");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
        }),
    )
        .into_response()
}

/// Start the HTTP server and run until Ctrl-C or SIGTERM
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down gracefully...");
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        identities: state.content.identities().len(),
        metadata_cache: state.backend.cache_stats().await,
    })
}

/// Serve the URL given as `?url=`
async fn stream_by_query(
    State(state): State<SharedState>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Response {
    let url = query.url.unwrap_or_default();
    state.content.serve(&method, &headers, &url).await
}

/// Serve the URL encoded in the path; a `?url=` parameter still wins
async fn stream_by_path(
    State(state): State<SharedState>,
    method: Method,
    headers: HeaderMap,
    Path(encoded): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let url = query
        .url
        .filter(|url| !url.is_empty())
        .or_else(|| decode_url(&encoded))
        .unwrap_or_default();
    state.content.serve(&method, &headers, &url).await
}

/// Serve any other path from the configured upstream
async fn stream_from_upstream(
    State(state): State<SharedState>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let Some(upstream) = &state.upstream else {
        return ProxyError::NotFound(format!("no route for {}", uri.path())).into_response();
    };
    let url = join_upstream(upstream, &uri);
    state.content.serve(&method, &headers, &url).await
}

/// Decode a base64 URL, accepting URL-safe and standard alphabets with or
/// without padding
pub fn decode_url(encoded: &str) -> Option<String> {
    [URL_SAFE_NO_PAD, URL_SAFE, STANDARD_NO_PAD, STANDARD]
        .iter()
        .find_map(|engine| engine.decode(encoded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|url| !url.is_empty())
}

/// Append the request path and query to the upstream base URL
pub fn join_upstream(upstream: &Url, uri: &Uri) -> String {
    let mut url = upstream.clone();
    let path = format!(
        "{}/{}",
        upstream.path().trim_end_matches('/'),
        uri.path().trim_start_matches('/')
    );
    url.set_path(&path);
    if let Some(query) = uri.query() {
        url.set_query(Some(query));
    }
    url.to_string()
}
