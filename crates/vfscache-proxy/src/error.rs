//! Error types for the vfscache proxy

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use link_backend::LinkError;
use serde::Serialize;
use std::fmt;

/// Failure to resolve a name in the virtual file system
#[derive(Debug)]
pub enum VfsError {
    NotFound(String),
    Backend(LinkError),
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::NotFound(name) => write!(f, "file does not exist: {}", name),
            VfsError::Backend(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::Backend(err) => Some(err),
            VfsError::NotFound(_) => None,
        }
    }
}

impl From<LinkError> for VfsError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::NotFound(identifier) => VfsError::NotFound(identifier),
            other => VfsError::Backend(other),
        }
    }
}

#[derive(Debug)]
pub enum ProxyError {
    BadRequest(String),
    NotFound(String),
    Vfs(VfsError),
    Link(LinkError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ProxyError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ProxyError::Vfs(err) => write!(f, "Failed to find file: {}", err),
            ProxyError::Link(err) => write!(f, "Link backend error: {}", err),
            ProxyError::Io(err) => write!(f, "IO error: {}", err),
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Vfs(err) => Some(err),
            ProxyError::Link(err) => Some(err),
            ProxyError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<VfsError> for ProxyError {
    fn from(err: VfsError) -> Self {
        ProxyError::Vfs(err)
    }
}

impl From<LinkError> for ProxyError {
    fn from(err: LinkError) -> Self {
        ProxyError::Link(err)
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ProxyError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ProxyError::Config(err.to_string())
    }
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotFound(_) | ProxyError::Vfs(VfsError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let error = match &self {
            ProxyError::Vfs(VfsError::NotFound(_)) => "File not found".to_string(),
            other => other.to_string(),
        };
        (self.status(), Json(ErrorResponse { error })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_not_found_becomes_vfs_not_found() {
        let err = VfsError::from(LinkError::NotFound("abc".to_string()));
        assert!(matches!(err, VfsError::NotFound(ref id) if id == "abc"));
    }

    #[test]
    fn test_vfs_error_display() {
        let err = ProxyError::from(VfsError::Backend(LinkError::Open(StatusCode::FORBIDDEN)));
        assert_eq!(
            err.to_string(),
            "Failed to find file: GET failed: status 403"
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ProxyError::BadRequest("missing url".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::Vfs(VfsError::NotFound("ab/abc".to_string())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProxyError::Config("bad".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_io_error_from_server() {
        let err = ProxyError::from(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "address already in use",
        ));
        assert!(matches!(err, ProxyError::Io(_)));
        assert_eq!(err.to_string(), "IO error: address already in use");
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_config_error_display() {
        let err = ProxyError::Config("invalid CACHE_MODE".to_string());
        assert_eq!(format!("{}", err), "Configuration error: invalid CACHE_MODE");
    }

    #[tokio::test]
    async fn test_into_response_has_json_body() {
        let response = ProxyError::BadRequest("missing url".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Bad request: missing url");
    }
}
