//! URL utilities for matching and reporting
//!
//! Character classes used by the policy grammar live here too, so the
//! compiler and the matcher agree on them.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::origin::Origin;

// =============================================================================
// Character Classes
// =============================================================================

/// `directive-name = 1*( ALPHA / DIGIT / "-" )`
#[inline]
pub fn is_directive_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// Directive values are whitespace plus printable ASCII.
#[inline]
pub fn is_directive_value_char(c: char) -> bool {
    c.is_ascii_whitespace() || ('\u{21}'..='\u{7e}').contains(&c)
}

/// `scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`, after the first char.
#[inline]
pub fn is_scheme_continuation_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'
}

/// `host-char = ALPHA / DIGIT / "-"`
#[inline]
pub fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

// =============================================================================
// Ports
// =============================================================================

/// Well-known default port for a scheme.
#[inline]
pub fn default_port(scheme: &str) -> Option<u16> {
    let scheme = scheme.to_ascii_lowercase();
    match scheme.as_str() {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "ftp" => Some(21),
        "ftps" => Some(990),
        _ => None,
    }
}

#[inline]
pub fn is_default_port(port: u16, scheme: &str) -> bool {
    default_port(scheme) == Some(port)
}

// =============================================================================
// Paths
// =============================================================================

/// Percent-decode a path. Invalid UTF-8 is replaced rather than rejected.
pub fn decode_path(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

/// The URL's path with escape sequences decoded.
pub fn decoded_path(url: &Url) -> String {
    decode_path(url.path())
}

// =============================================================================
// Special URLs
// =============================================================================

/// `about:blank`, which never triggers a network fetch.
pub fn is_blank(url: &Url) -> bool {
    url.scheme() == "about" && url.path() == "blank"
}

/// Inner URL of a wrapping scheme (`blob:`, `filesystem:`).
pub fn inner_url(url: &Url) -> Option<Url> {
    match url.scheme() {
        "blob" | "filesystem" => Url::parse(&decode_path(url.path())).ok(),
        _ => None,
    }
}

// =============================================================================
// Stripping
// =============================================================================

/// Drop the fragment and credentials, as done before sending a referrer.
pub fn strip_for_referrer(url: &Url) -> String {
    let mut stripped = url.clone();
    stripped.set_fragment(None);
    if stripped.has_authority() {
        // Only fails for URLs that cannot carry credentials in the first place.
        let _ = stripped.set_username("");
        let _ = stripped.set_password(None);
    }
    stripped.into()
}

/// Reduce a URL to what a report endpoint may see.
///
/// Same-origin URLs are kept (minus fragment and credentials); cross-origin
/// URLs are reduced to their origin; opaque and `file:` URLs to their scheme.
pub fn strip_for_report(url: Option<&Url>, protected: &Origin) -> String {
    let Some(url) = url else {
        return String::new();
    };

    if url.cannot_be_a_base() || url.scheme() == "file" {
        return url.scheme().to_string();
    }

    if protected.same_origin(url) {
        return strip_for_referrer(url);
    }

    url.origin().ascii_serialization()
}

const ELIDE_THRESHOLD: usize = 1024;
const ELIDE_KEEP: usize = 511;

/// Shorten very long URLs for console output, keeping both ends.
pub fn elide(url: &str) -> String {
    let chars: Vec<char> = url.chars().collect();
    if chars.len() <= ELIDE_THRESHOLD {
        return url.to_string();
    }

    let head: String = chars[..ELIDE_KEEP].iter().collect();
    let tail: String = chars[chars.len() - ELIDE_KEEP..].iter().collect();
    format!("{head}...{tail}")
}
