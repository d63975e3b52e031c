//! URL normalization and the page-location policy.
//!
//! The session manager never opens pages of its own; it has to find the one
//! the user is already looking at among every open browsing context. Loopback
//! host spellings are treated as equivalent so a dev server reached as
//! `127.0.0.1:3000` still matches a target of `localhost:3000`.

use log::warn;
use url::{Host, Url};

use crate::capability::PageDescriptor;
use crate::error::{AutomationError, Result};

/// Normalized comparison key: scheme, canonical host, effective port and
/// trailing-slash-insensitive path. Query and fragment are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MatchKey {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
}

fn match_key(raw: &str) -> Option<MatchKey> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = match url.host()? {
        Host::Domain(domain) if domain.eq_ignore_ascii_case("localhost") => "localhost".to_string(),
        Host::Domain(domain) => domain.to_ascii_lowercase(),
        Host::Ipv4(ip) if ip.is_loopback() => "localhost".to_string(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) if ip.is_loopback() => "localhost".to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    };
    Some(MatchKey {
        scheme: url.scheme().to_string(),
        host,
        port: url.port_or_known_default(),
        path: url.path().trim_end_matches('/').to_string(),
    })
}

/// Whether two URLs identify the same page under the matching policy.
pub fn urls_equivalent(a: &str, b: &str) -> bool {
    match (match_key(a), match_key(b)) {
        (Some(ka), Some(kb)) => ka == kb,
        // Hostless URLs (about:, data:) fall back to exact comparison.
        _ => a.trim() == b.trim(),
    }
}

const INTERNAL_SCHEMES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "devtools://",
    "edge://",
    "brave://",
    "vivaldi://",
    "opera://",
    "view-source:",
];

/// Browser-internal pages are never automation targets.
pub fn is_internal_page(url: &str) -> bool {
    let trimmed = url.trim();
    INTERNAL_SCHEMES.iter().any(|prefix| trimmed.starts_with(prefix))
}

pub fn is_blank_page(url: &str) -> bool {
    let trimmed = url.trim();
    trimmed.is_empty() || trimmed == "about:blank"
}

/// First candidate equivalent to `target`, if any.
pub fn locate_exact<'a>(target: &str, pages: &'a [PageDescriptor]) -> Option<&'a PageDescriptor> {
    pages.iter().find(|page| urls_equivalent(&page.url, target))
}

/// Page-location policy: exact match on the target URL first; otherwise the
/// first page that is neither blank nor browser-internal; otherwise fail.
/// Never opens a new page, so automation cannot silently diverge from what
/// the user sees.
pub fn locate_page<'a>(
    target: Option<&str>,
    pages: &'a [PageDescriptor],
) -> Result<&'a PageDescriptor> {
    if let Some(target) = target {
        if let Some(page) = locate_exact(target, pages) {
            return Ok(page);
        }
    }
    if let Some(page) = pages
        .iter()
        .find(|page| !is_blank_page(&page.url) && !is_internal_page(&page.url))
    {
        if let Some(target) = target {
            warn!("no page matches {}; falling back to {}", target, page.url);
        }
        return Ok(page);
    }
    Err(AutomationError::PageNotFound(match target {
        Some(target) => format!("no open page matches {} ({} candidates)", target, pages.len()),
        None => format!("no usable page among {} candidates", pages.len()),
    }))
}

/// Normalize an incomplete navigation URL by adding a missing protocol and
/// handling common shorthand patterns.
pub fn normalize_navigation_url(url: &str) -> String {
    let trimmed = url.trim();

    // If already has a protocol, return as-is
    if trimmed.starts_with("http://")
        || trimmed.starts_with("https://")
        || trimmed.starts_with("file://")
        || trimmed.starts_with("data:")
        || trimmed.starts_with("about:")
        || trimmed.starts_with("chrome://")
        || trimmed.starts_with("chrome-extension://")
    {
        return trimmed.to_string();
    }

    // Relative path - return as-is
    if trimmed.starts_with('/') || trimmed.starts_with("./") || trimmed.starts_with("../") {
        return trimmed.to_string();
    }

    // Loopback special case - use http by default
    if trimmed.starts_with("localhost")
        || trimmed.starts_with("127.0.0.1")
        || trimmed.starts_with("[::1]")
    {
        return format!("http://{}", trimmed);
    }

    // Check if it looks like a domain (contains dot or is a known TLD)
    if trimmed.contains('.') {
        // Looks like a domain - add https://
        return format!("https://{}", trimmed);
    }

    // Single word - assume it's a domain name, add www. prefix and https://
    // This handles cases like "google" -> "https://www.google.com"
    format!("https://www.{}.com", trimmed)
}
