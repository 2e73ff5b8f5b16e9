//! Policy aggregation
//!
//! Headers arrive one at a time; each comma-separated value becomes its own
//! [`DirectiveRegistry`]. Queries run against every registry in delivery
//! order without short-circuiting, so each denying policy gets to report.

use std::rc::Rc;

use csp_compiler::parse_policy;
use csp_core::host::{
    DefaultSchemeRegistry, NullTransport, PolicyContext, PolicyHost, ReportTransport, SchemeRegistry,
    ScriptExecutionContext, SourceLocation,
};
use csp_core::registry::DirectiveRegistry;
use csp_core::types::{EngineConfig, HeaderType, ReflectedXssDisposition, ReportingStatus};
use url::Url;

/// All policies governing one document.
pub struct ContentSecurityPolicy {
    host: Rc<dyn PolicyHost>,
    schemes: Rc<dyn SchemeRegistry>,
    transport: Rc<dyn ReportTransport>,
    config: EngineConfig,
    policies: Vec<DirectiveRegistry>,
}

impl ContentSecurityPolicy {
    /// Empty policy set: reports are dropped, no scheme bypasses CSP.
    pub fn new(host: Rc<dyn PolicyHost>) -> Self {
        Self {
            host,
            schemes: Rc::new(DefaultSchemeRegistry),
            transport: Rc::new(NullTransport),
            config: EngineConfig::default(),
            policies: Vec::new(),
        }
    }

    pub fn with_transport(mut self, transport: Rc<dyn ReportTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_scheme_registry(mut self, schemes: Rc<dyn SchemeRegistry>) -> Self {
        self.schemes = schemes;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_experimental_features(&mut self, enabled: bool) {
        self.config.experimental_features = enabled;
    }

    /// Force `allow_inline_style` to succeed (inspector-injected styles).
    pub fn set_override_inline_style(&mut self, value: bool) {
        self.config.override_inline_style = value;
    }

    /// Policies in delivery order.
    pub fn policies(&self) -> &[DirectiveRegistry] {
        &self.policies
    }

    /// Whether any policy has been delivered.
    pub fn is_active(&self) -> bool {
        !self.policies.is_empty()
    }

    /// Adopt the policies of another document (e.g. an inheriting child).
    pub fn copy_state_from(&mut self, other: &ContentSecurityPolicy) {
        self.policies.extend(other.policies.iter().cloned());
    }

    // -------------------------------------------------------------------------
    // Delivery
    // -------------------------------------------------------------------------

    /// Ingest one `Content-Security-Policy` (or `-Report-Only`) header value.
    pub fn did_receive_header(&mut self, header: &str, header_type: HeaderType) {
        for value in header.split(',') {
            let registry = parse_policy(value, header_type.is_report_only(), self.host.as_ref());

            if !registry.is_report_only() {
                if let Some(message) = registry.eval_disabled_message() {
                    self.host.disable_eval(message);
                }
            }

            log::debug!("csp policy #{} delivered as {:?}", self.policies.len(), header_type);
            self.policies.push(registry);
        }
    }

    /// Console message for the first enforced policy that forbids `eval`.
    pub fn eval_disabled_error_message(&self) -> Option<&str> {
        self.policies
            .iter()
            .filter(|p| !p.is_report_only())
            .find_map(DirectiveRegistry::eval_disabled_message)
    }

    /// Report endpoints of every policy, in delivery order.
    pub fn gather_report_uris(&self) -> Vec<Url> {
        self.policies
            .iter()
            .flat_map(|p| p.report_uris().iter().cloned())
            .collect()
    }

    /// Strongest `reflected-xss` disposition across policies.
    pub fn reflected_xss_disposition(&self) -> ReflectedXssDisposition {
        self.policies
            .iter()
            .map(DirectiveRegistry::reflected_xss)
            .max()
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn allow_script_from_source(&self, url: &Url, status: ReportingStatus) -> bool {
        self.all_allow_url(url, |p, ctx| p.allow_script_from_source(url, status, ctx))
    }

    pub fn allow_style_from_source(&self, url: &Url, status: ReportingStatus) -> bool {
        self.all_allow_url(url, |p, ctx| p.allow_style_from_source(url, status, ctx))
    }

    pub fn allow_image_from_source(&self, url: &Url, status: ReportingStatus) -> bool {
        self.all_allow_url(url, |p, ctx| p.allow_image_from_source(url, status, ctx))
    }

    pub fn allow_font_from_source(&self, url: &Url, status: ReportingStatus) -> bool {
        self.all_allow_url(url, |p, ctx| p.allow_font_from_source(url, status, ctx))
    }

    pub fn allow_media_from_source(&self, url: &Url, status: ReportingStatus) -> bool {
        self.all_allow_url(url, |p, ctx| p.allow_media_from_source(url, status, ctx))
    }

    pub fn allow_object_from_source(&self, url: &Url, status: ReportingStatus) -> bool {
        self.all_allow_url(url, |p, ctx| p.allow_object_from_source(url, status, ctx))
    }

    pub fn allow_child_frame_from_source(&self, url: &Url, status: ReportingStatus) -> bool {
        self.all_allow_url(url, |p, ctx| p.allow_child_frame_from_source(url, status, ctx))
    }

    pub fn allow_connect_to_source(&self, url: &Url, status: ReportingStatus) -> bool {
        self.all_allow_url(url, |p, ctx| p.allow_connect_to_source(url, status, ctx))
    }

    pub fn allow_form_action(&self, url: &Url, status: ReportingStatus) -> bool {
        self.all_allow_url(url, |p, ctx| p.allow_form_action(url, status, ctx))
    }

    pub fn allow_base_uri(&self, url: &Url, status: ReportingStatus) -> bool {
        self.all_allow_url(url, |p, ctx| p.allow_base_uri(url, status, ctx))
    }

    pub fn allow_inline_script(&self, context: Option<&SourceLocation>, status: ReportingStatus) -> bool {
        self.all_allow(|p, ctx| p.allow_inline_script(context, status, ctx))
    }

    pub fn allow_inline_event_handlers(&self, context: Option<&SourceLocation>, status: ReportingStatus) -> bool {
        self.all_allow(|p, ctx| p.allow_inline_event_handlers(context, status, ctx))
    }

    pub fn allow_javascript_urls(&self, context: Option<&SourceLocation>, status: ReportingStatus) -> bool {
        self.all_allow(|p, ctx| p.allow_javascript_urls(context, status, ctx))
    }

    pub fn allow_inline_style(&self, context: Option<&SourceLocation>, status: ReportingStatus) -> bool {
        if self.config.override_inline_style {
            return true;
        }
        self.all_allow(|p, ctx| p.allow_inline_style(context, status, ctx))
    }

    pub fn allow_eval(&self, script: Option<&dyn ScriptExecutionContext>, status: ReportingStatus) -> bool {
        self.all_allow(|p, ctx| p.allow_eval(script, status, ctx))
    }

    pub fn allow_plugin_type(
        &self,
        media_type: &str,
        declared: &str,
        url: &Url,
        script: Option<&dyn ScriptExecutionContext>,
        status: ReportingStatus,
    ) -> bool {
        self.all_allow(|p, ctx| p.allow_plugin_type(media_type, declared, url, script, status, ctx))
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn context(&self) -> PolicyContext<'_> {
        PolicyContext {
            host: self.host.as_ref(),
            schemes: self.schemes.as_ref(),
            transport: self.transport.as_ref(),
            config: &self.config,
        }
    }

    /// AND over every policy; each one is consulted even after a denial.
    fn all_allow(&self, check: impl Fn(&DirectiveRegistry, &PolicyContext<'_>) -> bool) -> bool {
        let ctx = self.context();
        self.policies
            .iter()
            .fold(true, |allowed, policy| check(policy, &ctx) && allowed)
    }

    fn all_allow_url(&self, url: &Url, check: impl Fn(&DirectiveRegistry, &PolicyContext<'_>) -> bool) -> bool {
        if self.schemes.should_bypass_csp(url.scheme()) {
            return true;
        }
        self.all_allow(check)
    }
}
