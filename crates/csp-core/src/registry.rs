//! Directive Registry
//!
//! One delivered policy: at most one directive per name, plus the
//! report-only flag, sandbox flags, reflected-XSS disposition and report
//! endpoints. Every query resolves `default-src` fallback, matches, and on
//! denial hands a violation to the [`ViolationReporter`].

use std::collections::BTreeMap;

use url::Url;

use crate::directive::Directive;
use crate::host::{PolicyContext, ScriptExecutionContext, SourceLocation};
use crate::report::{Violation, ViolationReporter};
use crate::source::SourceList;
use crate::types::{DirectiveName, ReflectedXssDisposition, ReportingStatus, SandboxFlags};
use crate::url::{elide, is_blank};

const EVAL_REFUSAL: &str = "Refused to evaluate a string as JavaScript because 'unsafe-eval' is not an allowed source of script in the following Content Security Policy directive: ";
const INLINE_SCRIPT_REFUSAL: &str = "Refused to execute inline script because it violates the following Content Security Policy directive: ";
const INLINE_EVENT_HANDLER_REFUSAL: &str = "Refused to execute inline event handler because it violates the following Content Security Policy directive: ";
const JAVASCRIPT_URL_REFUSAL: &str = "Refused to execute JavaScript URL because it violates the following Content Security Policy directive: ";
const INLINE_STYLE_REFUSAL: &str = "Refused to apply inline style because it violates the following Content Security Policy directive: ";
const PLUGIN_TYPE_HINT: &str = " When enforcing the 'plugin-types' directive, the plugin's media type must be explicitly declared with a 'type' attribute on the containing element (e.g. '<object type=\"[TYPE GOES HERE]\" ...>').";

// =============================================================================
// Registry
// =============================================================================

/// A compiled policy. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveRegistry {
    header: String,
    report_only: bool,
    directives: BTreeMap<DirectiveName, Directive>,
    sandbox_flags: Option<SandboxFlags>,
    reflected_xss: ReflectedXssDisposition,
    report_uris: Vec<Url>,
    eval_disabled_message: Option<String>,
}

impl DirectiveRegistry {
    /// Verbatim header text this policy was parsed from.
    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn is_report_only(&self) -> bool {
        self.report_only
    }

    pub fn directive(&self, name: DirectiveName) -> Option<&Directive> {
        self.directives.get(&name)
    }

    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.directives.values()
    }

    pub fn sandbox_flags(&self) -> Option<SandboxFlags> {
        self.sandbox_flags
    }

    pub fn reflected_xss(&self) -> ReflectedXssDisposition {
        self.reflected_xss
    }

    pub fn report_uris(&self) -> &[Url] {
        &self.report_uris
    }

    /// Console text explaining why `eval` is disabled, if it is.
    pub fn eval_disabled_message(&self) -> Option<&str> {
        self.eval_disabled_message.as_deref()
    }

    /// The directive that answers queries for `name`, after fallback.
    pub fn operative_directive(&self, name: DirectiveName) -> Option<&Directive> {
        self.directives.get(&name).or_else(|| {
            if name.falls_back_to_default() {
                self.directives.get(&DirectiveName::DefaultSrc)
            } else {
                None
            }
        })
    }

    /// Whether the operative `script-src` lacks `'unsafe-eval'`, regardless of
    /// report-only mode.
    pub fn forbids_eval(&self) -> bool {
        self.operative_directive(DirectiveName::ScriptSrc)
            .and_then(Directive::source_list)
            .is_some_and(|list| !list.allows_eval())
    }

    // -------------------------------------------------------------------------
    // Fetch queries
    // -------------------------------------------------------------------------

    pub fn allow_script_from_source(&self, url: &Url, status: ReportingStatus, ctx: &PolicyContext<'_>) -> bool {
        self.check_source(DirectiveName::ScriptSrc, url, status, ctx)
    }

    pub fn allow_style_from_source(&self, url: &Url, status: ReportingStatus, ctx: &PolicyContext<'_>) -> bool {
        self.check_source(DirectiveName::StyleSrc, url, status, ctx)
    }

    pub fn allow_image_from_source(&self, url: &Url, status: ReportingStatus, ctx: &PolicyContext<'_>) -> bool {
        self.check_source(DirectiveName::ImgSrc, url, status, ctx)
    }

    pub fn allow_font_from_source(&self, url: &Url, status: ReportingStatus, ctx: &PolicyContext<'_>) -> bool {
        self.check_source(DirectiveName::FontSrc, url, status, ctx)
    }

    pub fn allow_media_from_source(&self, url: &Url, status: ReportingStatus, ctx: &PolicyContext<'_>) -> bool {
        self.check_source(DirectiveName::MediaSrc, url, status, ctx)
    }

    pub fn allow_connect_to_source(&self, url: &Url, status: ReportingStatus, ctx: &PolicyContext<'_>) -> bool {
        self.check_source(DirectiveName::ConnectSrc, url, status, ctx)
    }

    pub fn allow_object_from_source(&self, url: &Url, status: ReportingStatus, ctx: &PolicyContext<'_>) -> bool {
        if is_blank(url) {
            return true;
        }
        self.check_source(DirectiveName::ObjectSrc, url, status, ctx)
    }

    pub fn allow_child_frame_from_source(&self, url: &Url, status: ReportingStatus, ctx: &PolicyContext<'_>) -> bool {
        if is_blank(url) {
            return true;
        }
        self.check_source(DirectiveName::FrameSrc, url, status, ctx)
    }

    pub fn allow_form_action(&self, url: &Url, status: ReportingStatus, ctx: &PolicyContext<'_>) -> bool {
        self.check_source(DirectiveName::FormAction, url, status, ctx)
    }

    pub fn allow_base_uri(&self, url: &Url, status: ReportingStatus, ctx: &PolicyContext<'_>) -> bool {
        self.check_source(DirectiveName::BaseUri, url, status, ctx)
    }

    // -------------------------------------------------------------------------
    // Inline and eval queries
    // -------------------------------------------------------------------------

    pub fn allow_inline_script(
        &self,
        source: Option<&SourceLocation>,
        status: ReportingStatus,
        ctx: &PolicyContext<'_>,
    ) -> bool {
        self.check_inline(DirectiveName::ScriptSrc, INLINE_SCRIPT_REFUSAL, source, status, ctx)
    }

    pub fn allow_inline_event_handlers(
        &self,
        source: Option<&SourceLocation>,
        status: ReportingStatus,
        ctx: &PolicyContext<'_>,
    ) -> bool {
        self.check_inline(DirectiveName::ScriptSrc, INLINE_EVENT_HANDLER_REFUSAL, source, status, ctx)
    }

    pub fn allow_javascript_urls(
        &self,
        source: Option<&SourceLocation>,
        status: ReportingStatus,
        ctx: &PolicyContext<'_>,
    ) -> bool {
        self.check_inline(DirectiveName::ScriptSrc, JAVASCRIPT_URL_REFUSAL, source, status, ctx)
    }

    pub fn allow_inline_style(
        &self,
        source: Option<&SourceLocation>,
        status: ReportingStatus,
        ctx: &PolicyContext<'_>,
    ) -> bool {
        self.check_inline(DirectiveName::StyleSrc, INLINE_STYLE_REFUSAL, source, status, ctx)
    }

    pub fn allow_eval(
        &self,
        script: Option<&dyn ScriptExecutionContext>,
        status: ReportingStatus,
        ctx: &PolicyContext<'_>,
    ) -> bool {
        let Some(directive) = self.operative_directive(DirectiveName::ScriptSrc) else {
            return true;
        };
        if directive.source_list().map_or(true, SourceList::allows_eval) {
            return true;
        }

        if status == ReportingStatus::SendReport {
            let message = format!(
                "{EVAL_REFUSAL}\"{}\".{}",
                directive.text(),
                fallback_note(directive, DirectiveName::ScriptSrc)
            );
            self.report(
                ctx,
                Violation {
                    directive_text: directive.text(),
                    effective_directive: DirectiveName::ScriptSrc,
                    console_message: message,
                    blocked_url: None,
                    source: script.and_then(|s| s.current_source_location()),
                },
            );
            if !self.report_only {
                ctx.host.report_blocked_script_execution(directive.text());
            }
        }

        self.deny_if_enforcing()
    }

    /// `media_type` is the plugin's actual type; `declared` is the `type`
    /// attribute of the embedding element.
    pub fn allow_plugin_type(
        &self,
        media_type: &str,
        declared: &str,
        url: &Url,
        script: Option<&dyn ScriptExecutionContext>,
        status: ReportingStatus,
        ctx: &PolicyContext<'_>,
    ) -> bool {
        let Some(directive) = self.directive(DirectiveName::PluginTypes) else {
            return true;
        };
        if directive
            .media_types()
            .map_or(true, |list| list.allows(media_type, declared))
        {
            return true;
        }

        if status == ReportingStatus::SendReport {
            let mut message = format!(
                "Refused to load '{}' (MIME type '{}') because it violates the following Content Security Policy Directive: '{}'.",
                elide(url.as_str()),
                declared,
                directive.text()
            );
            if declared.is_empty() {
                message.push_str(PLUGIN_TYPE_HINT);
            }
            self.report(
                ctx,
                Violation {
                    directive_text: directive.text(),
                    effective_directive: DirectiveName::PluginTypes,
                    console_message: message,
                    blocked_url: None,
                    source: script.and_then(|s| s.current_source_location()),
                },
            );
        }

        self.deny_if_enforcing()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn check_source(&self, effective: DirectiveName, url: &Url, status: ReportingStatus, ctx: &PolicyContext<'_>) -> bool {
        let Some(directive) = self.operative_directive(effective) else {
            return true;
        };
        if directive
            .source_list()
            .map_or(true, |list| list.matches(url, &ctx.match_context()))
        {
            return true;
        }

        if status == ReportingStatus::SendReport {
            let message = format!(
                "{}{}' because it violates the following Content Security Policy directive: \"{}\".{}",
                effective.refusal_prefix(),
                elide(url.as_str()),
                directive.text(),
                fallback_note(directive, effective)
            );
            self.report(
                ctx,
                Violation {
                    directive_text: directive.text(),
                    effective_directive: effective,
                    console_message: message,
                    blocked_url: Some(url),
                    source: None,
                },
            );
        }

        self.deny_if_enforcing()
    }

    fn check_inline(
        &self,
        effective: DirectiveName,
        refusal: &str,
        source: Option<&SourceLocation>,
        status: ReportingStatus,
        ctx: &PolicyContext<'_>,
    ) -> bool {
        let Some(directive) = self.operative_directive(effective) else {
            return true;
        };
        if directive.source_list().map_or(true, SourceList::allows_inline) {
            return true;
        }

        if status == ReportingStatus::SendReport {
            let message = format!("{refusal}\"{}\".{}", directive.text(), fallback_note(directive, effective));
            self.report(
                ctx,
                Violation {
                    directive_text: directive.text(),
                    effective_directive: effective,
                    console_message: message,
                    blocked_url: None,
                    source: source.cloned(),
                },
            );
            if !self.report_only && effective == DirectiveName::ScriptSrc {
                ctx.host.report_blocked_script_execution(directive.text());
            }
        }

        self.deny_if_enforcing()
    }

    fn report(&self, ctx: &PolicyContext<'_>, violation: Violation<'_>) {
        ViolationReporter::new(*ctx).report(self, &violation);
    }

    /// Report-only policies never block.
    fn deny_if_enforcing(&self) -> bool {
        self.report_only
    }
}

fn fallback_note(directive: &Directive, effective: DirectiveName) -> String {
    if directive.kind() == DirectiveName::DefaultSrc && effective != DirectiveName::DefaultSrc {
        format!(" Note that '{effective}' was not explicitly set, so 'default-src' is used as a fallback.")
    } else {
        String::new()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`DirectiveRegistry`] while a header is being parsed.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registry: DirectiveRegistry,
}

impl RegistryBuilder {
    pub fn new(header: &str, report_only: bool) -> Self {
        Self {
            registry: DirectiveRegistry {
                header: header.to_string(),
                report_only,
                ..DirectiveRegistry::default()
            },
        }
    }

    pub fn is_report_only(&self) -> bool {
        self.registry.report_only
    }

    pub fn has_directive(&self, name: DirectiveName) -> bool {
        self.registry.directives.contains_key(&name)
    }

    /// Add a directive. Returns `false`, leaving the first one in place, if
    /// a directive of the same kind is already set.
    pub fn add_directive(&mut self, directive: Directive) -> bool {
        if self.has_directive(directive.kind()) {
            return false;
        }
        self.registry.directives.insert(directive.kind(), directive);
        true
    }

    pub fn set_sandbox_flags(&mut self, flags: SandboxFlags) {
        self.registry.sandbox_flags = Some(flags);
    }

    pub fn reflected_xss(&self) -> ReflectedXssDisposition {
        self.registry.reflected_xss
    }

    pub fn set_reflected_xss(&mut self, disposition: ReflectedXssDisposition) {
        self.registry.reflected_xss = disposition;
    }

    pub fn set_report_uris(&mut self, uris: Vec<Url>) {
        self.registry.report_uris = uris;
    }

    /// Finish the registry and precompute the eval-disabled message.
    pub fn build(self) -> DirectiveRegistry {
        let mut registry = self.registry;

        if registry.forbids_eval() {
            if let Some(directive) = registry.operative_directive(DirectiveName::ScriptSrc) {
                registry.eval_disabled_message = Some(format!("{EVAL_REFUSAL}\"{}\".", directive.text()));
            }
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::DirectivePayload;
    use crate::host::PolicyHost;
    use crate::source::SourceMatcher;
    use crate::testing::{RecordingHost, RecordingTransport, TestEnv};
    use crate::types::SourceKeywords;

    fn sources(name: DirectiveName, value: &str, list: SourceList) -> Directive {
        Directive::new(name, name.as_str(), value, DirectivePayload::Sources(list))
    }

    fn self_list(host: &RecordingHost) -> SourceList {
        let origin = host.protected_origin();
        SourceList::new(
            vec![SourceMatcher {
                scheme: Some(origin.scheme().to_string()),
                host: Some(origin.host().to_string()),
                port: origin.port(),
                ..SourceMatcher::default()
            }],
            SourceKeywords::empty(),
        )
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_fetch_falls_back_to_default_src() {
        let env = TestEnv::new("https://example.com/");
        let mut builder = RegistryBuilder::new("default-src 'self'", false);
        builder.add_directive(sources(DirectiveName::DefaultSrc, "'self'", self_list(&env.host)));
        let registry = builder.build();

        let ctx = env.context();
        assert!(registry.allow_script_from_source(&url("https://example.com/a.js"), ReportingStatus::SendReport, &ctx));
        assert!(!registry.allow_script_from_source(&url("https://evil.example/a.js"), ReportingStatus::SendReport, &ctx));

        let console = env.host.console_messages();
        assert_eq!(console.len(), 1);
        assert_eq!(
            console[0],
            "Refused to load the script 'https://evil.example/a.js' because it violates the following Content Security Policy directive: \"default-src 'self'\". Note that 'script-src' was not explicitly set, so 'default-src' is used as a fallback."
        );
    }

    #[test]
    fn test_base_uri_does_not_fall_back() {
        let env = TestEnv::new("https://example.com/");
        let mut builder = RegistryBuilder::new("default-src 'self'", false);
        builder.add_directive(sources(DirectiveName::DefaultSrc, "'self'", self_list(&env.host)));
        let registry = builder.build();

        let ctx = env.context();
        assert!(registry.allow_base_uri(&url("https://evil.example/"), ReportingStatus::SendReport, &ctx));
        assert!(registry.allow_form_action(&url("https://evil.example/"), ReportingStatus::SendReport, &ctx));
        assert!(env.host.console_messages().is_empty());
    }

    #[test]
    fn test_duplicate_directive_keeps_first() {
        let mut builder = RegistryBuilder::new("", false);
        assert!(builder.add_directive(sources(DirectiveName::ImgSrc, "*", SourceList::new(Vec::new(), SourceKeywords::STAR))));
        assert!(!builder.add_directive(sources(DirectiveName::ImgSrc, "'none'", SourceList::none())));
        let registry = builder.build();
        assert_eq!(registry.directive(DirectiveName::ImgSrc).map(Directive::text), Some("img-src *"));
    }

    #[test]
    fn test_eval_disabled_message_is_precomputed() {
        let mut builder = RegistryBuilder::new("script-src 'self'", false);
        builder.add_directive(sources(DirectiveName::ScriptSrc, "'self'", SourceList::none()));
        let registry = builder.build();
        assert!(registry.forbids_eval());
        assert_eq!(
            registry.eval_disabled_message(),
            Some("Refused to evaluate a string as JavaScript because 'unsafe-eval' is not an allowed source of script in the following Content Security Policy directive: \"script-src 'self'\".")
        );

        let mut builder = RegistryBuilder::new("script-src 'unsafe-eval'", false);
        builder.add_directive(sources(
            DirectiveName::ScriptSrc,
            "'unsafe-eval'",
            SourceList::new(Vec::new(), SourceKeywords::UNSAFE_EVAL),
        ));
        assert!(builder.build().eval_disabled_message().is_none());
    }

    #[test]
    fn test_report_only_never_blocks() {
        let env = TestEnv::new("https://example.com/");
        let mut builder = RegistryBuilder::new("img-src 'none'; report-uri /r", true);
        builder.add_directive(sources(DirectiveName::ImgSrc, "'none'", SourceList::none()));
        builder.set_report_uris(vec![url("https://example.com/r")]);
        let registry = builder.build();

        let ctx = env.context();
        assert!(registry.allow_image_from_source(&url("https://example.com/a.png"), ReportingStatus::SendReport, &ctx));
        let console = env.host.console_messages();
        assert_eq!(console.len(), 1);
        assert!(console[0].starts_with("[Report Only] Refused to load the image"));
        assert_eq!(env.transport.reports().len(), 1);
    }

    #[test]
    fn test_suppressed_checks_are_silent() {
        let env = TestEnv::new("https://example.com/");
        let mut builder = RegistryBuilder::new("script-src 'none'", false);
        builder.add_directive(sources(DirectiveName::ScriptSrc, "'none'", SourceList::none()));
        let registry = builder.build();

        let ctx = env.context();
        assert!(!registry.allow_inline_script(None, ReportingStatus::SuppressReport, &ctx));
        assert!(!registry.allow_eval(None, ReportingStatus::SuppressReport, &ctx));
        assert!(env.host.console_messages().is_empty());
        assert!(env.host.blocked_scripts().is_empty());
    }

    #[test]
    fn test_blank_frames_and_objects_are_allowed() {
        let env = TestEnv::new("https://example.com/");
        let mut builder = RegistryBuilder::new("default-src 'none'", false);
        builder.add_directive(sources(DirectiveName::DefaultSrc, "'none'", SourceList::none()));
        let registry = builder.build();

        let ctx = env.context();
        let blank = url("about:blank");
        assert!(registry.allow_child_frame_from_source(&blank, ReportingStatus::SendReport, &ctx));
        assert!(registry.allow_object_from_source(&blank, ReportingStatus::SendReport, &ctx));
        assert!(!registry.allow_child_frame_from_source(&url("https://example.com/"), ReportingStatus::SendReport, &ctx));
    }

    #[test]
    fn test_transport_unused_without_endpoints() {
        let host = RecordingHost::new("https://example.com/");
        let transport = RecordingTransport::default();
        let env = TestEnv::with_parts(host, transport);
        let mut builder = RegistryBuilder::new("style-src 'none'", false);
        builder.add_directive(sources(DirectiveName::StyleSrc, "'none'", SourceList::none()));
        let registry = builder.build();

        assert!(!registry.allow_inline_style(None, ReportingStatus::SendReport, &env.context()));
        assert_eq!(env.host.console_messages().len(), 1);
        assert!(env.transport.reports().is_empty());
    }
}
