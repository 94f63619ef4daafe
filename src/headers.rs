//! Sender and list-header parsing.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{GmailError, Result};

static ANGLE_ADDR: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(.+?)>").unwrap());
static BARE_ADDR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\S+@\S+)").unwrap());
static LIST_HTTP: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(https?://[^>]+)>").unwrap());
static LIST_MAILTO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<mailto:([^>]+)>").unwrap());

/// Targets advertised by a `List-Unsubscribe` or `List-Subscribe` header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListHeaderTargets {
    pub http_urls: Vec<String>,
    pub mailto: Option<String>,
}

impl ListHeaderTargets {
    /// First HTTP(S) target; the one mail clients bind to their unsubscribe button.
    pub fn primary_url(&self) -> Option<&str> {
        self.http_urls.first().map(String::as_str)
    }
}

/// Split a `From` header into `(display name, email)`.
///
/// The email is lowercased. When no display name is present the email is
/// returned in its place.
pub fn parse_sender(from: &str) -> (String, String) {
    let email = ANGLE_ADDR
        .captures(from)
        .or_else(|| BARE_ADDR.captures(from))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(from)
        .trim()
        .to_lowercase();

    let name = from
        .split('<')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('"')
        .trim()
        .to_string();

    if name.is_empty() || (name.contains('@') && name.to_lowercase() == email) {
        (email.clone(), email)
    } else {
        (name, email)
    }
}

pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub fn parse_list_header(value: &str) -> ListHeaderTargets {
    let http_urls = LIST_HTTP
        .captures_iter(value)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect();

    let mailto = LIST_MAILTO
        .captures(value)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().split('?').next())
        .map(|addr| addr.trim().to_string())
        .filter(|addr| !addr.is_empty());

    ListHeaderTargets { http_urls, mailto }
}

/// Parse a `Date` header (RFC 2822 with RFC 3339 fallback).
pub fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    // Some senders append a zone comment such as "(UTC)"
    let cleaned = match date_str.find(" (") {
        Some(idx) => &date_str[..idx],
        None => date_str,
    }
    .trim();

    DateTime::parse_from_rfc2822(cleaned)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| DateTime::parse_from_rfc3339(cleaned).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| GmailError::InvalidMessageFormat(format!("Invalid date format: {}", e)))
}
