//! Range and conditional request evaluation for files of known size

use axum::http::header::{IF_MODIFIED_SINCE, IF_RANGE, IF_UNMODIFIED_SINCE, RANGE};
use axum::http::{HeaderMap, HeaderName};
use chrono::{DateTime, Utc};
use link_backend::http_date::parse_http_date;
use link_backend::ByteRange;

/// What to send back for a GET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Full,
    Partial(ByteRange),
    NotModified,
    PreconditionFailed,
    Unsatisfiable,
}

/// Decide how to answer a GET for a file of `size` bytes last modified at
/// `mod_time`. Dates are compared at one-second resolution.
pub fn plan(headers: &HeaderMap, size: u64, mod_time: DateTime<Utc>) -> Plan {
    let modified = mod_time.timestamp();

    if let Some(since) = header_date(headers, IF_UNMODIFIED_SINCE) {
        if modified > since.timestamp() {
            return Plan::PreconditionFailed;
        }
    }

    if let Some(since) = header_date(headers, IF_MODIFIED_SINCE) {
        if modified <= since.timestamp() {
            return Plan::NotModified;
        }
    }

    let Some(range) = headers.get(RANGE).and_then(|v| v.to_str().ok()) else {
        return Plan::Full;
    };

    if let Some(if_range) = headers.get(IF_RANGE) {
        // Entity tags are never issued, so only an exact date match keeps the range
        let fresh = if_range
            .to_str()
            .ok()
            .and_then(parse_http_date)
            .is_some_and(|date| date.timestamp() == modified);
        if !fresh {
            return Plan::Full;
        }
    }

    match parse_range(range, size) {
        RangeHeader::Single(range) => Plan::Partial(range),
        RangeHeader::Multiple => Plan::Full,
        RangeHeader::Invalid => Plan::Unsatisfiable,
    }
}

/// A parsed `Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeHeader {
    Single(ByteRange),
    /// Several ranges; answered with the whole file
    Multiple,
    /// Malformed, or nothing of the file is covered
    Invalid,
}

/// Parse a `Range` header against a file of `size` bytes
pub fn parse_range(value: &str, size: u64) -> RangeHeader {
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return RangeHeader::Invalid;
    };
    if spec.contains(',') {
        return RangeHeader::Multiple;
    }
    match single_range(spec.trim(), size) {
        Some(range) => RangeHeader::Single(range),
        None => RangeHeader::Invalid,
    }
}

fn single_range(spec: &str, size: u64) -> Option<ByteRange> {
    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // Suffix form: the last `end` bytes
        let suffix: u64 = end.parse().ok()?;
        if suffix == 0 || size == 0 {
            return None;
        }
        return Some(ByteRange {
            start: size - suffix.min(size),
            end: size - 1,
        });
    }

    let start: u64 = start.parse().ok()?;
    if start >= size {
        return None;
    }
    let end = if end.is_empty() {
        size - 1
    } else {
        let end: u64 = end.parse().ok()?;
        if end < start {
            return None;
        }
        end.min(size - 1)
    };

    Some(ByteRange { start, end })
}

fn header_date(headers: &HeaderMap, name: HeaderName) -> Option<DateTime<Utc>> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
}
