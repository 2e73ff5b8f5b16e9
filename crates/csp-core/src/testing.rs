//! Recording doubles for the host traits.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for downstream crates.

use std::cell::RefCell;

use url::Url;

use crate::host::{DefaultSchemeRegistry, PolicyContext, PolicyHost, ReportTransport, ScriptExecutionContext, SourceLocation};
use crate::origin::Origin;
use crate::types::{EngineConfig, SandboxFlags};

/// Host that records every callback it receives.
#[derive(Debug)]
pub struct RecordingHost {
    document_url: Url,
    origin: Origin,
    referrer: String,
    console: RefCell<Vec<String>>,
    sandbox: RefCell<Vec<SandboxFlags>>,
    eval_disabled: RefCell<Vec<String>>,
    blocked_scripts: RefCell<Vec<String>>,
}

impl RecordingHost {
    /// Panics if `document_url` does not parse.
    pub fn new(document_url: &str) -> Self {
        let document_url = Url::parse(document_url).expect("valid document url");
        Self {
            origin: Origin::from_url(&document_url),
            document_url,
            referrer: String::new(),
            console: RefCell::default(),
            sandbox: RefCell::default(),
            eval_disabled: RefCell::default(),
            blocked_scripts: RefCell::default(),
        }
    }

    pub fn with_referrer(mut self, referrer: &str) -> Self {
        self.referrer = referrer.to_string();
        self
    }

    pub fn console_messages(&self) -> Vec<String> {
        self.console.borrow().clone()
    }

    pub fn sandbox_flags(&self) -> Vec<SandboxFlags> {
        self.sandbox.borrow().clone()
    }

    pub fn eval_disabled(&self) -> Vec<String> {
        self.eval_disabled.borrow().clone()
    }

    pub fn blocked_scripts(&self) -> Vec<String> {
        self.blocked_scripts.borrow().clone()
    }

    pub fn clear(&self) {
        self.console.borrow_mut().clear();
        self.sandbox.borrow_mut().clear();
        self.eval_disabled.borrow_mut().clear();
        self.blocked_scripts.borrow_mut().clear();
    }
}

impl PolicyHost for RecordingHost {
    fn protected_origin(&self) -> &Origin {
        &self.origin
    }

    fn document_url(&self) -> &Url {
        &self.document_url
    }

    fn referrer(&self) -> &str {
        &self.referrer
    }

    fn add_console_message(&self, message: &str) {
        self.console.borrow_mut().push(message.to_string());
    }

    fn enforce_sandbox_flags(&self, flags: SandboxFlags) {
        self.sandbox.borrow_mut().push(flags);
    }

    fn disable_eval(&self, message: &str) {
        self.eval_disabled.borrow_mut().push(message.to_string());
    }

    fn report_blocked_script_execution(&self, directive_text: &str) {
        self.blocked_scripts.borrow_mut().push(directive_text.to_string());
    }
}

/// Transport that keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: RefCell<Vec<(Url, Vec<u8>)>>,
}

impl RecordingTransport {
    /// `(endpoint, body)` pairs in send order, bodies decoded as UTF-8.
    pub fn reports(&self) -> Vec<(Url, String)> {
        self.sent
            .borrow()
            .iter()
            .map(|(endpoint, body)| (endpoint.clone(), String::from_utf8_lossy(body).into_owned()))
            .collect()
    }

    /// Report bodies parsed as JSON.
    pub fn json_reports(&self) -> Vec<serde_json::Value> {
        self.sent
            .borrow()
            .iter()
            .map(|(_, body)| serde_json::from_slice(body).expect("report body is json"))
            .collect()
    }
}

impl ReportTransport for RecordingTransport {
    fn send_violation_report(&self, endpoint: &Url, body: Vec<u8>) {
        self.sent.borrow_mut().push((endpoint.clone(), body));
    }
}

/// Script context pinned to one location.
#[derive(Debug, Clone)]
pub struct FixedScript(pub Option<SourceLocation>);

impl ScriptExecutionContext for FixedScript {
    fn current_source_location(&self) -> Option<SourceLocation> {
        self.0.clone()
    }
}

/// Owns one of each collaborator so tests can borrow a [`PolicyContext`].
#[derive(Debug)]
pub struct TestEnv {
    pub host: RecordingHost,
    pub schemes: DefaultSchemeRegistry,
    pub transport: RecordingTransport,
    pub config: EngineConfig,
}

impl TestEnv {
    pub fn new(document_url: &str) -> Self {
        Self::with_parts(RecordingHost::new(document_url), RecordingTransport::default())
    }

    pub fn with_parts(host: RecordingHost, transport: RecordingTransport) -> Self {
        Self {
            host,
            schemes: DefaultSchemeRegistry,
            transport,
            config: EngineConfig::default(),
        }
    }

    pub fn context(&self) -> PolicyContext<'_> {
        PolicyContext {
            host: &self.host,
            schemes: &self.schemes,
            transport: &self.transport,
            config: &self.config,
        }
    }
}
