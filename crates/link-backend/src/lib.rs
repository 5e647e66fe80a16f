//! Read-only link backend
//!
//! Exposes arbitrary HTTP/HTTPS resources as remote objects addressed by an
//! opaque identifier derived from their URL. Size and modification time are
//! learned with cheap HEAD / single-byte range probes (with retry) and kept
//! in a bounded, TTL-limited metadata cache.

pub mod backend;
pub mod cache;
pub mod error;
pub mod http_date;
pub mod key;
pub mod object;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod types;

pub use backend::LinkBackend;
pub use cache::{MetadataCache, METADATA_TTL};
pub use error::{LinkError, Result};
pub use key::{
    canonical_key, file_hash, identifier_from_path, sharded_path, strip_url, CacheKey,
};
pub use object::{ByteRange, ByteStream, LinkObject, RemoteObject};
pub use registry::{forward_headers, IdentityTable, FORWARDED_HEADERS};
pub use resolver::{HttpResolver, MetadataSource};
pub use retry::{call_with_retry, RetryDecision, RetryPolicy};
pub use types::{IdentityEntry, LinkOptions, Metadata, MetadataCacheStats};
