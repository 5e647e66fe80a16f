//! URL canonicalization and identifier derivation
//!
//! Identifiers are the hex MD5 of the canonical URL, so copies of one
//! resource that only differ in signature query strings or mirror host
//! collapse onto the same identifier when stripping is enabled.

use md5::{Digest, Md5};
use url::{ParseError, Url};

/// Raw 16-byte digest used to address the metadata cache
pub type CacheKey = [u8; 16];

/// Deepest sharding supported by a 32 character hex identifier
pub const MAX_SHARD_LEVEL: usize = 16;

/// Remove the parts of a URL that should not contribute to its cache key.
///
/// `strip_query` drops the query string. `strip_domain` drops the scheme,
/// host, credentials and fragment, keeping the path and any query left.
/// With both flags off the input is returned untouched. Inputs that cannot
/// be parsed are returned untouched as well.
pub fn strip_url(raw: &str, strip_query: bool, strip_domain: bool) -> String {
    if !strip_query && !strip_domain {
        return raw.to_string();
    }

    let mut url = match Url::parse(raw) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) => {
            return strip_relative(raw, strip_query, strip_domain)
        }
        Err(_) => return raw.to_string(),
    };

    if strip_query {
        url.set_query(None);
    }

    if strip_domain {
        let path = rooted_path(url.path());
        return match url.query() {
            Some(query) => format!("{}?{}", path, query),
            None => path,
        };
    }

    url.to_string()
}

// Same rules for references without a scheme, e.g. the output of a previous
// strip_domain pass.
fn strip_relative(raw: &str, strip_query: bool, strip_domain: bool) -> String {
    let (rest, fragment) = match raw.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (raw, None),
    };
    let (mut path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    if strip_domain {
        if let Some(authority_and_path) = path.strip_prefix("//") {
            path = authority_and_path
                .find('/')
                .map_or("", |i| &authority_and_path[i..]);
        }
    }

    let mut out = if strip_domain {
        rooted_path(path)
    } else {
        path.to_string()
    };
    if let Some(query) = query.filter(|_| !strip_query) {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = fragment.filter(|_| !strip_domain) {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

// A path starting with `//` would read back as an authority on the next pass.
fn rooted_path(path: &str) -> String {
    if path.starts_with("//") {
        format!("/.{}", path)
    } else {
        path.to_string()
    }
}

/// Digest of the canonical form of `raw`
pub fn canonical_key(raw: &str, strip_query: bool, strip_domain: bool) -> CacheKey {
    Md5::digest(strip_url(raw, strip_query, strip_domain).as_bytes()).into()
}

/// Hex identifier for `raw`, usable as a file name and map key
pub fn file_hash(raw: &str, strip_query: bool, strip_domain: bool) -> String {
    hex::encode(canonical_key(raw, strip_query, strip_domain))
}

/// Nest an identifier under `level` two-character directories taken from
/// its own prefix: `sharded_path("abcdef…", 2) == "ab/cd/abcdef…"`.
pub fn sharded_path(hash: &str, level: usize) -> String {
    let level = level.min(MAX_SHARD_LEVEL);
    let mut path = String::with_capacity(hash.len() + level * 3);
    for i in 0..level {
        match hash.get(i * 2..i * 2 + 2) {
            Some(segment) => {
                path.push_str(segment);
                path.push('/');
            }
            None => break,
        }
    }
    path.push_str(hash);
    path
}

/// Identifier at the end of a (possibly sharded) path
pub fn identifier_from_path(path: &str) -> &str {
    path.trim_matches('/').rsplit('/').next().unwrap_or_default()
}
