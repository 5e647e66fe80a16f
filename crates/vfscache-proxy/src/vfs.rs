//! Virtual file system boundary
//!
//! The content server only needs to look names up and open files; the
//! engine behind this trait decides how bytes are fetched and buffered.

use crate::error::VfsError;
use async_trait::async_trait;
use link_backend::{identifier_from_path, sharded_path, LinkBackend, RemoteObject};
use std::sync::Arc;
use tracing::debug;

/// A resolved name
pub enum Node {
    File(Arc<dyn RemoteObject>),
    Dir(String),
}

#[async_trait]
pub trait Vfs: Send + Sync {
    /// Resolve `name`, a `/`-separated path relative to the root
    async fn stat(&self, name: &str) -> Result<Node, VfsError>;
}

/// Pass-through engine over a link backend: every file is an upstream URL,
/// every directory is a shard prefix.
pub struct LinkVfs {
    backend: Arc<LinkBackend>,
    shard_level: usize,
}

impl LinkVfs {
    pub fn new(backend: Arc<LinkBackend>, shard_level: usize) -> Self {
        Self {
            backend,
            shard_level,
        }
    }
}

#[async_trait]
impl Vfs for LinkVfs {
    async fn stat(&self, name: &str) -> Result<Node, VfsError> {
        let trimmed = name.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Node::Dir(String::new()));
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        let depth = segments.len() - 1;

        if depth < self.shard_level {
            return if segments.iter().all(|s| is_shard_segment(s)) {
                Ok(Node::Dir(trimmed.to_string()))
            } else {
                Err(VfsError::NotFound(name.to_string()))
            };
        }

        let identifier = identifier_from_path(trimmed);
        if depth > self.shard_level || sharded_path(identifier, self.shard_level) != trimmed {
            debug!(name, "Name does not match its shard prefix");
            return Err(VfsError::NotFound(name.to_string()));
        }

        let object = self.backend.new_object(identifier).await?;
        Ok(Node::File(Arc::new(object)))
    }
}

fn is_shard_segment(segment: &str) -> bool {
    segment.len() == 2 && segment.bytes().all(|b| b.is_ascii_hexdigit())
}
