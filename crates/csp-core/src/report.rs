//! Violation reporting
//!
//! Every denied check ends up here. The console message is always logged;
//! when the violating policy has `report-uri` endpoints, a JSON report is
//! built and handed to the transport once per endpoint.

use serde::Serialize;
use url::Url;

use crate::error::ReportError;
use crate::host::{PolicyContext, SourceLocation};
use crate::registry::DirectiveRegistry;
use crate::types::DirectiveName;
use crate::url::{strip_for_referrer, strip_for_report};

/// MIME type of report bodies.
pub const REPORT_CONTENT_TYPE: &str = "application/csp-report";

const REPORT_ONLY_PREFIX: &str = "[Report Only] ";

// =============================================================================
// Violation Record
// =============================================================================

/// What was refused, and by which directive.
#[derive(Debug, Clone)]
pub struct Violation<'a> {
    /// Text of the directive that refused the action.
    pub directive_text: &'a str,
    /// Directive the check was performed for (before `default-src` fallback).
    pub effective_directive: DirectiveName,
    pub console_message: String,
    pub blocked_url: Option<&'a Url>,
    pub source: Option<SourceLocation>,
}

// =============================================================================
// Wire Format
// =============================================================================

/// Body of a `report-uri` report. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ViolationReportBody {
    pub document_uri: String,
    pub referrer: String,
    pub violated_directive: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_directive: Option<String>,
    pub original_policy: String,
    pub blocked_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

/// `{"csp-report": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationReport {
    #[serde(rename = "csp-report")]
    pub csp_report: ViolationReportBody,
}

impl ViolationReport {
    pub fn to_json(&self) -> Result<Vec<u8>, ReportError> {
        Ok(serde_json::to_vec(self)?)
    }
}

// =============================================================================
// Reporter
// =============================================================================

/// Logs violations and dispatches reports for one document.
pub struct ViolationReporter<'a> {
    ctx: PolicyContext<'a>,
}

impl<'a> ViolationReporter<'a> {
    pub fn new(ctx: PolicyContext<'a>) -> Self {
        Self { ctx }
    }

    /// Log the violation and send it to every endpoint of `registry`.
    /// Never blocks and never fails the caller.
    pub fn report(&self, registry: &DirectiveRegistry, violation: &Violation<'_>) {
        let message = if registry.is_report_only() {
            format!("{REPORT_ONLY_PREFIX}{}", violation.console_message)
        } else {
            violation.console_message.clone()
        };
        log::debug!("csp violation of {}: {}", violation.effective_directive, message);
        self.ctx.host.add_console_message(&message);

        if registry.report_uris().is_empty() {
            return;
        }

        let report = self.build_report(registry, violation);
        let body = match report.to_json() {
            Ok(body) => body,
            Err(e) => {
                log::warn!("{e}");
                return;
            }
        };

        for endpoint in registry.report_uris() {
            self.ctx.transport.send_violation_report(endpoint, body.clone());
        }
    }

    pub fn build_report(&self, registry: &DirectiveRegistry, violation: &Violation<'_>) -> ViolationReport {
        let host = self.ctx.host;
        let origin = host.protected_origin();

        let (source_file, line_number) = match &violation.source {
            Some(location) => (Some(strip_for_report(Some(&location.url), origin)), Some(location.line)),
            None => (None, None),
        };

        let effective_directive = self
            .ctx
            .config
            .experimental_features
            .then(|| violation.effective_directive.as_str().to_string());

        ViolationReport {
            csp_report: ViolationReportBody {
                document_uri: strip_for_referrer(host.document_url()),
                referrer: host.referrer().to_string(),
                violated_directive: violation.directive_text.to_string(),
                effective_directive,
                original_policy: registry.header().to_string(),
                blocked_uri: strip_for_report(violation.blocked_url, origin),
                source_file,
                line_number,
            },
        }
    }
}
