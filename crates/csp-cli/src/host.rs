use std::cell::RefCell;

use csp_core::origin::Origin;
use csp_core::types::SandboxFlags;
use csp_core::PolicyHost;
use url::Url;

/// Document stand-in for command-line checks. Console output is buffered so
/// it can be emitted as part of the command's JSON result.
pub struct CliHost {
    document_url: Url,
    origin: Origin,
    referrer: String,
    console: RefCell<Vec<String>>,
    sandbox: RefCell<Option<SandboxFlags>>,
    eval_disabled: RefCell<Option<String>>,
}

impl CliHost {
    pub fn new(document_url: &str, referrer: Option<&str>) -> Result<Self, String> {
        let document_url = Url::parse(document_url)
            .map_err(|e| format!("Invalid document URL '{}': {}", document_url, e))?;
        Ok(Self {
            origin: Origin::from_url(&document_url),
            document_url,
            referrer: referrer.unwrap_or_default().to_string(),
            console: RefCell::default(),
            sandbox: RefCell::default(),
            eval_disabled: RefCell::default(),
        })
    }

    pub fn take_console(&self) -> Vec<String> {
        self.console.take()
    }

    pub fn sandbox_flags(&self) -> Option<SandboxFlags> {
        *self.sandbox.borrow()
    }

    pub fn eval_disabled(&self) -> Option<String> {
        self.eval_disabled.borrow().clone()
    }
}

impl PolicyHost for CliHost {
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
        log::info!("{message}");
        self.console.borrow_mut().push(message.to_string());
    }

    fn enforce_sandbox_flags(&self, flags: SandboxFlags) {
        *self.sandbox.borrow_mut() = Some(flags);
    }

    fn disable_eval(&self, message: &str) {
        *self.eval_disabled.borrow_mut() = Some(message.to_string());
    }
}

/// Names of the restrictions set in `flags`.
pub fn sandbox_flag_names(flags: SandboxFlags) -> Vec<String> {
    flags
        .iter_names()
        .map(|(name, _)| name.to_ascii_lowercase().replace('_', "-"))
        .collect()
}
