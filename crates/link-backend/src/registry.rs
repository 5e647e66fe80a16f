//! Identity table: identifier → original URL and forwarded headers

use crate::types::IdentityEntry;
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderName, AUTHORIZATION, COOKIE};
use tracing::debug;

/// Inbound headers that are carried upstream. Everything else the client
/// sent stays on this side of the proxy.
pub static FORWARDED_HEADERS: [HeaderName; 2] = [AUTHORIZATION, COOKIE];

/// Copy only the forwarded headers out of an inbound header map
pub fn forward_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for name in FORWARDED_HEADERS.iter() {
        for value in headers.get_all(name) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

/// Process-lifetime mapping from identifier to [`IdentityEntry`].
///
/// Entries are never evicted. The first registration of an identifier wins;
/// later registrations of the same identifier are ignored.
#[derive(Debug, Default)]
pub struct IdentityTable {
    entries: DashMap<String, IdentityEntry>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `url` under `identifier`. Returns false if the identifier was
    /// already known, in which case the stored entry is left as is.
    pub fn register(&self, identifier: &str, url: &str, headers: &HeaderMap) -> bool {
        if self.entries.contains_key(identifier) {
            return false;
        }

        let mut inserted = false;
        self.entries
            .entry(identifier.to_string())
            .or_insert_with(|| {
                inserted = true;
                IdentityEntry {
                    url: url.to_string(),
                    headers: forward_headers(headers),
                }
            });

        if inserted {
            debug!(identifier, url, "Registered identity");
        }
        inserted
    }

    pub fn lookup(&self, identifier: &str) -> Option<IdentityEntry> {
        self.entries.get(identifier).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Snapshot of every registered identifier
    pub fn identifiers(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, ACCEPT, USER_AGENT};
    use std::sync::Arc;

    fn inbound_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer token"));
        headers.insert(COOKIE, HeaderValue::from_static("session=1"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8"));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers
    }

    #[test]
    fn test_forward_headers_allow_list() {
        let forwarded = forward_headers(&inbound_headers());
        assert_eq!(forwarded.len(), 2);
        assert_eq!(forwarded[AUTHORIZATION], "Bearer token");
        assert_eq!(forwarded[COOKIE], "session=1");
        assert!(forwarded.get(USER_AGENT).is_none());
    }

    #[test]
    fn test_register_and_lookup() {
        let table = IdentityTable::new();
        assert!(table.lookup("abc").is_none());

        assert!(table.register("abc", "https://example.com/a", &inbound_headers()));

        let entry = table.lookup("abc").unwrap();
        assert_eq!(entry.url, "https://example.com/a");
        assert_eq!(entry.headers.len(), 2);
        assert_eq!(table.len(), 1);
        assert!(table.contains("abc"));
    }

    #[test]
    fn test_first_writer_wins() {
        let table = IdentityTable::new();
        assert!(table.register("abc", "https://example.com/first", &HeaderMap::new()));
        assert!(!table.register("abc", "https://example.com/second", &inbound_headers()));

        let entry = table.lookup("abc").unwrap();
        assert_eq!(entry.url, "https://example.com/first");
        assert!(entry.headers.is_empty());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration() {
        let table = Arc::new(IdentityTable::new());

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let table = table.clone();
                tokio::spawn(async move {
                    let id = format!("id-{}", i % 4);
                    table.register(&id, &format!("https://example.com/{i}"), &HeaderMap::new())
                })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }

        assert_eq!(wins, 4);
        assert_eq!(table.len(), 4);
        let mut ids = table.identifiers();
        ids.sort();
        assert_eq!(ids, vec!["id-0", "id-1", "id-2", "id-3"]);
    }
}
