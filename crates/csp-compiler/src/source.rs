//! Source expression parser
//!
//! Grammar (one whitespace-free token):
//!
//! ```text
//! source     = "*" / "'self'" / "'unsafe-inline'" / "'unsafe-eval'"
//!            / scheme ":"
//!            / [ scheme "://" ] host [ ":" port ] [ path ]
//! host       = "*" / [ "*." ] 1*host-char *( "." 1*host-char )
//! port       = 1*DIGIT / "*"
//! ```

use csp_core::error::{IgnoredPathComponent, PolicyDiagnostic};
use csp_core::origin::Origin;
use csp_core::source::{SourceList, SourceMatcher};
use csp_core::types::{is_directive_name, SourceKeywords};
use csp_core::url::{decode_path, is_host_char, is_scheme_continuation_char};

/// Why a source expression was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("'none' is only valid as the sole source expression")]
    NoneKeyword,

    #[error("source expression is empty")]
    Empty,

    #[error("invalid scheme")]
    InvalidScheme,

    #[error("expected '//' after scheme")]
    MissingSlashes,

    #[error("missing host")]
    MissingHost,

    #[error("invalid host")]
    InvalidHost,

    #[error("invalid port")]
    InvalidPort,
}

/// A successfully parsed source expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceExpression {
    /// `*`
    Star,
    /// `'unsafe-inline'`
    UnsafeInline,
    /// `'unsafe-eval'`
    UnsafeEval,
    /// Host or scheme source, including `'self'`.
    Matcher(SourceMatcher),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSource {
    pub expression: SourceExpression,
    /// Path text and the component that was cut from it.
    pub ignored_path: Option<(String, IgnoredPathComponent)>,
}

impl From<SourceExpression> for ParsedSource {
    fn from(expression: SourceExpression) -> Self {
        Self {
            expression,
            ignored_path: None,
        }
    }
}

// =============================================================================
// Source Lists
// =============================================================================

/// Parse a source-list directive value.
///
/// Invalid expressions are dropped individually; the diagnostics explaining
/// why are appended to `diagnostics`.
pub fn parse_source_list(
    directive: &str,
    value: &str,
    origin: &Origin,
    diagnostics: &mut Vec<PolicyDiagnostic>,
) -> SourceList {
    if value.trim_matches(is_space).eq_ignore_ascii_case("'none'") {
        return SourceList::none();
    }

    let mut matchers = Vec::new();
    let mut keywords = SourceKeywords::empty();

    for token in value.split(is_space).filter(|t| !t.is_empty()) {
        let parsed = match parse_source_expression(token, origin) {
            Ok(parsed) => parsed,
            Err(SourceError::NoneKeyword) => {
                diagnostics.push(PolicyDiagnostic::NoneMixedWithSources {
                    directive: directive.to_string(),
                });
                continue;
            }
            Err(e) => {
                log::debug!("rejected source '{token}' in {directive}: {e}");
                diagnostics.push(PolicyDiagnostic::InvalidSourceExpression {
                    directive: directive.to_string(),
                    expression: token.to_string(),
                });
                continue;
            }
        };

        if let Some((path, ignored)) = parsed.ignored_path {
            diagnostics.push(PolicyDiagnostic::InvalidPathCharacter {
                directive: directive.to_string(),
                path,
                ignored,
            });
        }

        match parsed.expression {
            SourceExpression::Star => keywords |= SourceKeywords::STAR,
            SourceExpression::UnsafeInline => keywords |= SourceKeywords::UNSAFE_INLINE,
            SourceExpression::UnsafeEval => keywords |= SourceKeywords::UNSAFE_EVAL,
            SourceExpression::Matcher(matcher) => {
                if matcher.scheme.is_none() && matcher.host.is_none() {
                    continue;
                }
                if let Some(host) = matcher.host.as_deref().filter(|h| is_directive_name(h)) {
                    diagnostics.push(PolicyDiagnostic::DirectiveAsSourceExpression {
                        directive: directive.to_string(),
                        expression: host.to_string(),
                    });
                }
                matchers.push(matcher);
            }
        }
    }

    SourceList::new(matchers, keywords)
}

// =============================================================================
// Source Expressions
// =============================================================================

/// Parse one source expression. `'self'` resolves against `origin`.
pub fn parse_source_expression(expression: &str, origin: &Origin) -> Result<ParsedSource, SourceError> {
    if expression.is_empty() {
        return Err(SourceError::Empty);
    }
    if expression.eq_ignore_ascii_case("'none'") {
        return Err(SourceError::NoneKeyword);
    }
    if expression == "*" {
        return Ok(SourceExpression::Star.into());
    }
    if expression.eq_ignore_ascii_case("'self'") {
        return Ok(SourceExpression::Matcher(SourceMatcher {
            scheme: Some(origin.scheme().to_string()),
            host: Some(origin.host().to_string()),
            port: origin.port(),
            ..SourceMatcher::default()
        })
        .into());
    }
    if expression.eq_ignore_ascii_case("'unsafe-inline'") {
        return Ok(SourceExpression::UnsafeInline.into());
    }
    if expression.eq_ignore_ascii_case("'unsafe-eval'") {
        return Ok(SourceExpression::UnsafeEval.into());
    }

    parse_host_source(expression)
}

fn parse_host_source(expression: &str) -> Result<ParsedSource, SourceError> {
    let bytes = expression.as_bytes();
    let end = expression.len();

    // host
    let Some(separator) = expression.find([':', '/']) else {
        let (host, wildcard) = parse_host(expression)?;
        return Ok(matcher(None, host, wildcard, (None, false), None));
    };

    // host/path, host/ or /
    if bytes[separator] == b'/' {
        let (host, wildcard) = parse_host(&expression[..separator])?;
        let (path, ignored) = parse_path(&expression[separator..]);
        return Ok(ParsedSource {
            ignored_path: ignored,
            ..matcher(None, host, wildcard, (None, false), Some(path))
        });
    }

    // scheme:
    if separator + 1 == end {
        let scheme = parse_scheme(&expression[..separator])?;
        return Ok(matcher(Some(scheme), None, false, (None, false), None));
    }

    let mut scheme = None;
    let mut host_start = 0;
    let mut position = separator;

    // scheme://host...
    if bytes[separator + 1] == b'/' {
        scheme = Some(parse_scheme(&expression[..separator])?);
        if !expression[separator..].starts_with("://") {
            return Err(SourceError::MissingSlashes);
        }
        host_start = separator + 3;
        if host_start == end {
            return Err(SourceError::MissingHost);
        }
        position = find_from(expression, host_start, |c| c == ':' || c == '/');
    }

    // ...:port
    let mut port_start = None;
    if position < end && bytes[position] == b':' {
        port_start = Some(position);
        position = find_from(expression, position, |c| c == '/');
    }

    // .../path
    let mut path_start = end;
    if position < end && bytes[position] == b'/' {
        if position == host_start {
            return Err(SourceError::MissingHost);
        }
        path_start = position;
    }

    let (host, wildcard) = parse_host(&expression[host_start..port_start.unwrap_or(path_start)])?;
    let port = match port_start {
        Some(start) => parse_port(&expression[start + 1..path_start])?,
        None => (None, false),
    };
    let (path, ignored) = if path_start < end {
        let (path, ignored) = parse_path(&expression[path_start..]);
        (Some(path), ignored)
    } else {
        (None, None)
    };

    Ok(ParsedSource {
        ignored_path: ignored,
        ..matcher(scheme, host, wildcard, port, path)
    })
}

fn matcher(
    scheme: Option<String>,
    host: Option<String>,
    host_has_wildcard: bool,
    (port, port_is_wildcard): (Option<u16>, bool),
    path: Option<String>,
) -> ParsedSource {
    SourceExpression::Matcher(SourceMatcher {
        scheme,
        host,
        host_has_wildcard,
        port,
        port_is_wildcard,
        path,
    })
    .into()
}

/// Byte index of the first char at or after `from` matching `pred`, or the end.
fn find_from(s: &str, from: usize, pred: impl Fn(char) -> bool) -> usize {
    s[from..].find(pred).map_or(s.len(), |i| from + i)
}

fn is_space(c: char) -> bool {
    c.is_ascii_whitespace()
}

fn parse_scheme(text: &str) -> Result<String, SourceError> {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return Err(SourceError::InvalidScheme),
    }
    if !chars.all(is_scheme_continuation_char) {
        return Err(SourceError::InvalidScheme);
    }
    Ok(text.to_ascii_lowercase())
}

/// Returns the host (`None` for a bare `*`) and whether it had a `*` prefix.
fn parse_host(text: &str) -> Result<(Option<String>, bool), SourceError> {
    if text.is_empty() {
        return Err(SourceError::MissingHost);
    }

    let (labels, wildcard) = match text.strip_prefix('*') {
        Some("") => return Ok((None, true)),
        Some(rest) => (rest.strip_prefix('.').ok_or(SourceError::InvalidHost)?, true),
        None => (text, false),
    };

    if labels.is_empty() {
        return Ok((None, wildcard));
    }

    // A single trailing dot is tolerated.
    let trimmed = labels.strip_suffix('.').unwrap_or(labels);
    let valid = !trimmed.is_empty()
        && trimmed
            .split('.')
            .all(|label| !label.is_empty() && label.chars().all(is_host_char));
    if !valid {
        return Err(SourceError::InvalidHost);
    }

    Ok((Some(labels.to_ascii_lowercase()), wildcard))
}

/// Returns the port and whether it was `*`.
fn parse_port(text: &str) -> Result<(Option<u16>, bool), SourceError> {
    if text == "*" {
        return Ok((None, true));
    }
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SourceError::InvalidPort);
    }
    text.parse::<u16>()
        .map(|port| (Some(port), false))
        .map_err(|_| SourceError::InvalidPort)
}

/// Cut the path at the first `?` or `#` and percent-decode what remains.
fn parse_path(text: &str) -> (String, Option<(String, IgnoredPathComponent)>) {
    match text.find(['?', '#']) {
        Some(cut) => {
            let ignored = if text.as_bytes()[cut] == b'?' {
                IgnoredPathComponent::Query
            } else {
                IgnoredPathComponent::Fragment
            };
            (decode_path(&text[..cut]), Some((text.to_string(), ignored)))
        }
        None => (decode_path(text), None),
    }
}
