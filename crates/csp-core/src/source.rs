//! Source lists and source matching
//!
//! A source list is the parsed value of a fetch directive such as
//! `script-src 'self' https://cdn.example.com`. Keyword sources are kept as
//! flags on the list; everything else becomes a [`SourceMatcher`].

use url::Url;

use crate::host::MatchContext;
use crate::types::SourceKeywords;
use crate::url::{decoded_path, is_default_port};

// =============================================================================
// Source Matcher
// =============================================================================

/// One host-source or scheme-source expression.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceMatcher {
    /// `None` inherits the protected origin's scheme.
    pub scheme: Option<String>,
    /// `None` (with a scheme) makes this a scheme-only source.
    pub host: Option<String>,
    /// Host was written as `*.host`.
    pub host_has_wildcard: bool,
    pub port: Option<u16>,
    /// Port was written as `:*`.
    pub port_is_wildcard: bool,
    /// Percent-decoded path.
    pub path: Option<String>,
}

impl SourceMatcher {
    /// Scheme-only sources (`https:`) skip host, port and path checks.
    pub fn is_scheme_only(&self) -> bool {
        self.host.is_none()
    }

    pub fn matches(&self, url: &Url, ctx: &MatchContext<'_>) -> bool {
        if !self.scheme_matches(url, ctx) {
            return false;
        }
        if self.is_scheme_only() {
            return true;
        }
        self.host_matches(url) && self.port_matches(url) && self.path_matches(url)
    }

    fn scheme_matches(&self, url: &Url, ctx: &MatchContext<'_>) -> bool {
        if let Some(scheme) = self.scheme.as_deref() {
            return url.scheme().eq_ignore_ascii_case(scheme);
        }

        let protected = ctx.origin.scheme();
        if ctx.experimental_features && protected.eq_ignore_ascii_case("http") {
            return matches!(url.scheme(), "http" | "https");
        }
        url.scheme().eq_ignore_ascii_case(protected)
    }

    fn host_matches(&self, url: &Url) -> bool {
        let Some(pattern) = self.host.as_deref() else {
            return true;
        };
        let Some(host) = url.host_str() else {
            return false;
        };

        if host.eq_ignore_ascii_case(pattern) {
            return true;
        }

        self.host_has_wildcard && ends_with_subdomain_of(host, pattern)
    }

    fn port_matches(&self, url: &Url) -> bool {
        if self.port_is_wildcard {
            return true;
        }

        // `Url::port` already omits the scheme's default port.
        let url_port = url.port();
        if url_port == self.port {
            return true;
        }

        match (url_port, self.port) {
            (None, Some(port)) | (Some(port), None) => is_default_port(port, url.scheme()),
            _ => false,
        }
    }

    fn path_matches(&self, url: &Url) -> bool {
        let Some(pattern) = self.path.as_deref() else {
            return true;
        };

        let path = decoded_path(url);
        if pattern.ends_with('/') {
            path.starts_with(pattern)
        } else {
            path == pattern
        }
    }
}

/// Canonical source-expression form, e.g. `https://*.example.com:*/path`.
impl std::fmt::Display for SourceMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let has_host = self.host.is_some() || self.host_has_wildcard;
        if let Some(scheme) = &self.scheme {
            write!(f, "{scheme}:")?;
            if has_host {
                f.write_str("//")?;
            }
        }
        match (&self.host, self.host_has_wildcard) {
            (Some(host), true) => write!(f, "*.{host}")?,
            (Some(host), false) => f.write_str(host)?,
            (None, true) => f.write_str("*")?,
            (None, false) => {}
        }
        if self.port_is_wildcard {
            f.write_str(":*")?;
        } else if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if let Some(path) = &self.path {
            f.write_str(path)?;
        }
        Ok(())
    }
}

/// `host` ends with `"." + suffix`, ASCII case-insensitively.
fn ends_with_subdomain_of(host: &str, suffix: &str) -> bool {
    let host = host.as_bytes();
    let suffix = suffix.as_bytes();
    if host.len() <= suffix.len() {
        return false;
    }

    let split = host.len() - suffix.len();
    host[split - 1] == b'.' && host[split..].eq_ignore_ascii_case(suffix)
}

// =============================================================================
// Source List
// =============================================================================

/// Parsed source-list directive value. An empty list without keywords is
/// `'none'`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceList {
    matchers: Vec<SourceMatcher>,
    keywords: SourceKeywords,
}

impl SourceList {
    pub fn new(matchers: Vec<SourceMatcher>, keywords: SourceKeywords) -> Self {
        Self { matchers, keywords }
    }

    /// `'none'`
    pub fn none() -> Self {
        Self::default()
    }

    pub fn matchers(&self) -> &[SourceMatcher] {
        &self.matchers
    }

    pub fn keywords(&self) -> SourceKeywords {
        self.keywords
    }

    pub fn is_none(&self) -> bool {
        self.matchers.is_empty() && self.keywords.is_empty()
    }

    pub fn allows_star(&self) -> bool {
        self.keywords.contains(SourceKeywords::STAR)
    }

    pub fn allows_inline(&self) -> bool {
        self.keywords.contains(SourceKeywords::UNSAFE_INLINE)
    }

    pub fn allows_eval(&self) -> bool {
        self.keywords.contains(SourceKeywords::UNSAFE_EVAL)
    }

    pub fn matches(&self, url: &Url, ctx: &MatchContext<'_>) -> bool {
        if self.allows_star() {
            return true;
        }

        let inner;
        let effective = if ctx.schemes.should_use_inner_url(url) {
            match ctx.schemes.extract_inner_url(url) {
                Some(extracted) => {
                    inner = extracted;
                    &inner
                }
                None => return false,
            }
        } else {
            url
        };

        let matched = self.matchers.iter().any(|m| m.matches(effective, ctx));
        log::trace!("source list match for {effective}: {matched}");
        matched
    }
}
