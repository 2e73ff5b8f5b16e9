use csp_core::directive::{Directive, DirectivePayload};
use csp_core::error::PolicyDiagnostic;
use csp_core::host::PolicyHost;
use csp_core::registry::{DirectiveRegistry, RegistryBuilder};
use csp_core::types::{DirectiveName, ReflectedXssDisposition};
use csp_core::url::{is_directive_name_char, is_directive_value_char};

use crate::media::parse_media_type_list;
use crate::source::parse_source_list;

/// Compile one policy (a single comma-free header value).
///
/// Every problem is reported to `host` and skipped; the result always
/// reflects whatever part of the header was well formed.
pub fn parse_policy(header: &str, report_only: bool, host: &dyn PolicyHost) -> DirectiveRegistry {
    let mut parser = PolicyParser {
        host,
        builder: RegistryBuilder::new(header, report_only),
        have_sandbox: false,
        have_report_uri: false,
    };

    for segment in header.split(';') {
        if let Some((name, value)) = parser.split_directive(segment) {
            parser.add_directive(name, value);
        }
    }

    let registry = parser.builder.build();
    if registry.is_report_only() && registry.report_uris().is_empty() {
        PolicyDiagnostic::MissingReportUri(header.to_string()).emit(host);
    }

    log::debug!(
        "compiled policy: {} directives, report_only={}, {} report endpoints",
        registry.directives().count(),
        registry.is_report_only(),
        registry.report_uris().len()
    );

    registry
}

struct PolicyParser<'a> {
    host: &'a dyn PolicyHost,
    builder: RegistryBuilder,
    have_sandbox: bool,
    have_report_uri: bool,
}

fn is_space(c: char) -> bool {
    c.is_ascii_whitespace()
}

impl<'a> PolicyParser<'a> {
    fn report(&self, diagnostic: PolicyDiagnostic) {
        diagnostic.emit(self.host);
    }

    fn report_all(&self, diagnostics: Vec<PolicyDiagnostic>) {
        for diagnostic in diagnostics {
            self.report(diagnostic);
        }
    }

    fn report_unsupported(&self, name: &str) {
        let diagnostic = if name.eq_ignore_ascii_case("allow") {
            PolicyDiagnostic::LegacyAllowDirective
        } else if name.eq_ignore_ascii_case("options") {
            PolicyDiagnostic::LegacyOptionsDirective
        } else if name.eq_ignore_ascii_case("policy-uri") {
            PolicyDiagnostic::LegacyPolicyUriDirective
        } else {
            PolicyDiagnostic::UnsupportedDirective(name.to_string())
        };
        self.report(diagnostic);
    }

    /// `directive = *WSP [ directive-name [ WSP directive-value ] ]`
    fn split_directive<'h>(&self, segment: &'h str) -> Option<(&'h str, &'h str)> {
        let segment = segment.trim_start_matches(is_space);
        if segment.is_empty() {
            return None;
        }

        let token_end = segment.find(is_space).unwrap_or(segment.len());
        let name_end = segment
            .find(|c: char| !is_directive_name_char(c))
            .unwrap_or(segment.len());

        if name_end == 0 {
            self.report_unsupported(&segment[..token_end]);
            return None;
        }

        let (name, rest) = segment.split_at(name_end);
        if rest.is_empty() {
            return Some((name, ""));
        }
        if !rest.starts_with(is_space) {
            self.report_unsupported(&segment[..token_end]);
            return None;
        }

        if DirectiveName::from_name(name).is_none() {
            self.report_unsupported(name);
            return None;
        }

        let value = rest.trim_start_matches(is_space);
        if !value.chars().all(is_directive_value_char) {
            self.report(PolicyDiagnostic::InvalidDirectiveValueCharacter {
                name: name.to_string(),
                value: value.to_string(),
            });
            return None;
        }

        Some((name, value))
    }

    fn add_directive(&mut self, name: &str, value: &str) {
        let Some(kind) = DirectiveName::from_name(name) else {
            self.report_unsupported(name);
            return;
        };

        match kind {
            DirectiveName::Sandbox => self.apply_sandbox_policy(name, value),
            DirectiveName::ReportUri => self.parse_report_uri(name, value),
            DirectiveName::ReflectedXss => self.parse_reflected_xss(name, value),
            DirectiveName::PluginTypes => {
                if self.reject_duplicate(kind, name) {
                    return;
                }
                let mut diagnostics = Vec::new();
                let list = parse_media_type_list(value, &mut diagnostics);
                self.report_all(diagnostics);
                self.builder
                    .add_directive(Directive::new(kind, name, value, DirectivePayload::MediaTypes(list)));
            }
            _ => {
                if self.reject_duplicate(kind, name) {
                    return;
                }
                let mut diagnostics = Vec::new();
                let list = parse_source_list(name, value, self.host.protected_origin(), &mut diagnostics);
                self.report_all(diagnostics);
                self.builder
                    .add_directive(Directive::new(kind, name, value, DirectivePayload::Sources(list)));
            }
        }
    }

    fn reject_duplicate(&self, kind: DirectiveName, name: &str) -> bool {
        if self.builder.has_directive(kind) {
            self.report(PolicyDiagnostic::DuplicateDirective(name.to_string()));
            return true;
        }
        false
    }

    fn apply_sandbox_policy(&mut self, name: &str, value: &str) {
        if self.builder.is_report_only() {
            self.report(PolicyDiagnostic::IgnoredInReportOnly(name.to_string()));
            return;
        }
        if self.have_sandbox {
            self.report(PolicyDiagnostic::DuplicateDirective(name.to_string()));
            return;
        }
        self.have_sandbox = true;

        let (flags, invalid_tokens) = self.host.parse_sandbox_policy(value);
        self.builder.set_sandbox_flags(flags);
        self.host.enforce_sandbox_flags(flags);
        if let Some(invalid_tokens) = invalid_tokens {
            self.report(PolicyDiagnostic::InvalidSandboxFlags(invalid_tokens));
        }
    }

    fn parse_report_uri(&mut self, name: &str, value: &str) {
        if self.have_report_uri {
            self.report(PolicyDiagnostic::DuplicateDirective(name.to_string()));
            return;
        }
        self.have_report_uri = true;

        let mut uris = Vec::new();
        for token in value.split(is_space).filter(|t| !t.is_empty()) {
            match self.host.complete_url(token) {
                Some(url) => uris.push(url),
                None => self.report(PolicyDiagnostic::InvalidReportUri {
                    directive: name.to_string(),
                    uri: token.to_string(),
                }),
            }
        }
        self.builder.set_report_uris(uris);
    }

    fn parse_reflected_xss(&mut self, name: &str, value: &str) {
        if self.builder.reflected_xss() != ReflectedXssDisposition::Unset {
            self.report(PolicyDiagnostic::DuplicateDirective(name.to_string()));
            self.builder.set_reflected_xss(ReflectedXssDisposition::Invalid);
            return;
        }

        let mut tokens = value.split(is_space).filter(|t| !t.is_empty());
        let disposition = match (tokens.next(), tokens.next()) {
            (Some(token), None) if token.eq_ignore_ascii_case("allow") => ReflectedXssDisposition::Allow,
            (Some(token), None) if token.eq_ignore_ascii_case("filter") => ReflectedXssDisposition::Filter,
            (Some(token), None) if token.eq_ignore_ascii_case("block") => ReflectedXssDisposition::Block,
            _ => {
                self.report(PolicyDiagnostic::InvalidReflectedXss(value.to_string()));
                ReflectedXssDisposition::Invalid
            }
        };
        self.builder.set_reflected_xss(disposition);
    }
}
