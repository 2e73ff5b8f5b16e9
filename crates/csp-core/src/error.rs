//! Policy diagnostics
//!
//! Nothing in policy parsing is fatal. Every recoverable problem becomes a
//! `PolicyDiagnostic`, whose `Display` text is exactly what the document's
//! console shows.

use crate::host::PolicyHost;

/// Component of a source path that is dropped during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredPathComponent {
    Query,
    Fragment,
}

impl std::fmt::Display for IgnoredPathComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => f.write_str("The query component, including the '?', will be ignored."),
            Self::Fragment => {
                f.write_str("The fragment identifier, including the '#', will be ignored.")
            }
        }
    }
}

/// Recoverable problems found while compiling a policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyDiagnostic {
    #[error("Unrecognized Content-Security-Policy directive '{0}'.")]
    UnsupportedDirective(String),

    #[error("The 'allow' directive has been replaced with 'default-src'. Please use that directive instead, as 'allow' has no effect.")]
    LegacyAllowDirective,

    #[error("The 'options' directive has been replaced with 'unsafe-inline' and 'unsafe-eval' source expressions for the 'script-src' and 'style-src' directives. Please use those directives instead, as 'options' has no effect.")]
    LegacyOptionsDirective,

    #[error("The 'policy-uri' directive has been removed from the specification. Please specify a complete policy via the Content-Security-Policy header.")]
    LegacyPolicyUriDirective,

    #[error("Ignoring duplicate Content-Security-Policy directive '{0}'.")]
    DuplicateDirective(String),

    #[error("The value for Content Security Policy directive '{name}' contains an invalid character: '{value}'. Non-whitespace characters outside ASCII 0x21-0x7E must be percent-encoded, as described in RFC 3986, section 2.1: http://tools.ietf.org/html/rfc3986#section-2.1.")]
    InvalidDirectiveValueCharacter { name: String, value: String },

    #[error("The source list for Content Security Policy directive '{directive}' contains an invalid source: '{expression}'. It will be ignored.")]
    InvalidSourceExpression { directive: String, expression: String },

    #[error("The source list for Content Security Policy directive '{directive}' contains the keyword 'none' alongside other source expressions. The keyword 'none' must be the only source expression in the directive value, otherwise it is ignored.")]
    NoneMixedWithSources { directive: String },

    #[error("The source list for Content Security Policy directive '{directive}' contains a source with an invalid path: '{path}'. {ignored}")]
    InvalidPathCharacter {
        directive: String,
        path: String,
        ignored: IgnoredPathComponent,
    },

    #[error("The Content-Security-Policy directive '{directive}' contains '{expression}' as a source expression. Did you mean '{directive} ...; {expression}...' (note the semicolon)?")]
    DirectiveAsSourceExpression { directive: String, expression: String },

    #[error("'plugin-types' Content Security Policy directive is empty; all plugins will be blocked.")]
    EmptyPluginTypes,

    #[error("Invalid plugin type in 'plugin-types' Content Security Policy directive: '{0}'.")]
    InvalidPluginType(String),

    #[error("Error while parsing the 'sandbox' Content Security Policy directive: {0}")]
    InvalidSandboxFlags(String),

    #[error("The Content Security Policy directive '{0}' is ignored when delivered in a report-only policy.")]
    IgnoredInReportOnly(String),

    #[error("The 'reflected-xss' Content Security Policy directive has the invalid value \"{0}\". Valid values are \"allow\", \"filter\", and \"block\".")]
    InvalidReflectedXss(String),

    #[error("The report URI '{uri}' in Content Security Policy directive '{directive}' could not be resolved. It will be ignored.")]
    InvalidReportUri { directive: String, uri: String },

    #[error("The Content Security Policy '{0}' was delivered in report-only mode, but does not specify a 'report-uri'; the policy will have no effect. Please either add a 'report-uri' directive, or deliver the policy via the 'Content-Security-Policy' header.")]
    MissingReportUri(String),
}

impl PolicyDiagnostic {
    /// Send the diagnostic to the document console.
    pub fn emit(&self, host: &dyn PolicyHost) {
        let message = self.to_string();
        log::warn!("{message}");
        host.add_console_message(&message);
    }
}

/// Error type for violation report serialization.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to serialize violation report: {0}")]
    Serialize(#[from] serde_json::Error),
}
