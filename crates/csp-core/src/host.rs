//! Capabilities supplied by the embedding document.
//!
//! The engine has no compile-time coupling to the DOM, the network layer or
//! the script engine. Each collaborator is a trait object handed in by the
//! owner of the policy.

use url::Url;

use crate::origin::Origin;
use crate::types::{EngineConfig, SandboxFlags};

/// Document-side services.
pub trait PolicyHost {
    /// Origin of the protected document.
    fn protected_origin(&self) -> &Origin;

    /// URL of the protected document.
    fn document_url(&self) -> &Url;

    /// Referrer of the protected document.
    fn referrer(&self) -> &str {
        ""
    }

    /// Complete a possibly-relative URL against the document base URL.
    fn complete_url(&self, url: &str) -> Option<Url> {
        self.document_url().join(url).ok()
    }

    /// Console sink for diagnostics and violations.
    fn add_console_message(&self, message: &str);

    /// Parse the token list of a `sandbox` directive.
    fn parse_sandbox_policy(&self, policy: &str) -> (SandboxFlags, Option<String>) {
        SandboxFlags::parse_policy(policy)
    }

    /// Apply sandbox restrictions to the browsing context.
    fn enforce_sandbox_flags(&self, flags: SandboxFlags);

    /// Turn off string evaluation in the script engine.
    fn disable_eval(&self, message: &str);

    /// Script execution was refused by `directive_text`.
    fn report_blocked_script_execution(&self, _directive_text: &str) {}
}

/// URL-scheme registry.
pub trait SchemeRegistry {
    /// Schemes whose loads are never subject to CSP.
    fn should_bypass_csp(&self, _scheme: &str) -> bool {
        false
    }

    /// Whether `url` wraps another URL that should be matched instead.
    fn should_use_inner_url(&self, url: &Url) -> bool {
        matches!(url.scheme(), "blob" | "filesystem")
    }

    fn extract_inner_url(&self, url: &Url) -> Option<Url> {
        crate::url::inner_url(url)
    }
}

/// Registry with no bypassing schemes and the standard wrapping schemes.
#[derive(Debug, Clone, Default)]
pub struct DefaultSchemeRegistry;

impl SchemeRegistry for DefaultSchemeRegistry {}

/// Outbound delivery of violation reports.
///
/// Implementations must not block the caller; delivery failures are dropped.
pub trait ReportTransport {
    fn send_violation_report(&self, endpoint: &Url, body: Vec<u8>);
}

/// Transport that discards every report.
#[derive(Debug, Clone, Default)]
pub struct NullTransport;

impl ReportTransport for NullTransport {
    fn send_violation_report(&self, endpoint: &Url, _body: Vec<u8>) {
        log::debug!("dropping violation report for {endpoint}");
    }
}

/// Location of the script that triggered a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub url: Url,
    pub line: u32,
}

/// Script engine state at an `eval` or plugin call site.
pub trait ScriptExecutionContext {
    fn current_source_location(&self) -> Option<SourceLocation>;
}

/// Everything a registry needs to answer and report on a query.
#[derive(Clone, Copy)]
pub struct PolicyContext<'a> {
    pub host: &'a dyn PolicyHost,
    pub schemes: &'a dyn SchemeRegistry,
    pub transport: &'a dyn ReportTransport,
    pub config: &'a EngineConfig,
}

impl<'a> PolicyContext<'a> {
    pub fn match_context(&self) -> MatchContext<'a> {
        MatchContext {
            origin: self.host.protected_origin(),
            experimental_features: self.config.experimental_features,
            schemes: self.schemes,
        }
    }
}

/// Inputs to source matching.
#[derive(Clone, Copy)]
pub struct MatchContext<'a> {
    pub origin: &'a Origin,
    pub experimental_features: bool,
    pub schemes: &'a dyn SchemeRegistry,
}
