//! HTTP-date parsing and formatting (RFC 9110 §5.6.7)

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse any of the three date formats HTTP/1.1 recipients must accept.
///
/// A weekday that disagrees with the calendar date is ignored rather than
/// rejected.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    httpdate::parse_http_date(value)
        .ok()
        .map(DateTime::from)
        .or_else(|| parse_ignoring_weekday(value))
}

/// Format a timestamp as an IMF-fixdate, e.g. `Wed, 21 Oct 2020 07:28:00 GMT`.
/// Times before the Unix epoch are clamped to it.
pub fn format_http_date(time: &DateTime<Utc>) -> String {
    httpdate::fmt_http_date((*time).max(DateTime::UNIX_EPOCH).into())
}

fn parse_ignoring_weekday(value: &str) -> Option<DateTime<Utc>> {
    let parsed = if let Some((_, rest)) = value.split_once(", ") {
        // IMF-fixdate or RFC 850
        NaiveDateTime::parse_from_str(rest, "%d %b %Y %H:%M:%S GMT")
            .or_else(|_| NaiveDateTime::parse_from_str(rest, "%d-%b-%y %H:%M:%S GMT"))
            .ok()
    } else {
        // asctime
        let rest = value.split_once(' ')?.1;
        NaiveDateTime::parse_from_str(rest, "%b %e %H:%M:%S %Y").ok()
    };
    parsed.map(|naive| naive.and_utc())
}
