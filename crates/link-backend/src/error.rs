//! Error types for the link backend

use reqwest::StatusCode;
use std::fmt;

#[derive(Debug)]
pub enum LinkError {
    /// No identity is registered under this identifier
    NotFound(String),
    /// Size/modification time could not be learned from the upstream
    MetadataFetch {
        status: Option<StatusCode>,
        reason: String,
    },
    /// The upstream refused to stream the object body
    Open(StatusCode),
    Http(Box<reqwest::Error>),
}

impl LinkError {
    pub(crate) fn metadata(status: Option<StatusCode>, reason: impl Into<String>) -> Self {
        LinkError::MetadataFetch {
            status,
            reason: reason.into(),
        }
    }

    /// Upstream status attached to the failure, if one was received
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            LinkError::MetadataFetch { status, .. } => *status,
            LinkError::Open(status) => Some(*status),
            LinkError::Http(err) => err.status(),
            LinkError::NotFound(_) => None,
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::NotFound(id) => write!(f, "object not found: {}", id),
            LinkError::MetadataFetch {
                status: Some(status),
                ..
            } => write!(f, "metadata fetch failed: status {}", status.as_u16()),
            LinkError::MetadataFetch { reason, .. } => {
                write!(f, "metadata fetch failed: {}", reason)
            }
            LinkError::Open(status) => write!(f, "GET failed: status {}", status.as_u16()),
            LinkError::Http(err) => write!(f, "HTTP error: {}", err),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LinkError {
    fn from(err: reqwest::Error) -> Self {
        LinkError::Http(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_error_with_status_display() {
        let err = LinkError::metadata(Some(StatusCode::SERVICE_UNAVAILABLE), "ignored");
        assert_eq!(format!("{}", err), "metadata fetch failed: status 503");
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn test_metadata_error_with_reason_display() {
        let err = LinkError::metadata(None, "unknown file size for https://example.com/a");
        assert_eq!(
            format!("{}", err),
            "metadata fetch failed: unknown file size for https://example.com/a"
        );
        assert!(err.status().is_none());
    }

    #[test]
    fn test_not_found_display() {
        let err = LinkError::NotFound("abc".to_string());
        assert_eq!(format!("{}", err), "object not found: abc");
    }
}
