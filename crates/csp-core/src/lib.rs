//! CSP Core Library
//!
//! This crate holds the Content-Security-Policy model and its enforcement
//! rules. Headers are compiled into a [`DirectiveRegistry`] by `csp-compiler`;
//! the registry then answers "may this load / execute?" queries and reports
//! violations through the host-supplied traits in [`host`].
//!
//! # Modules
//!
//! - `types`: Directive names, keyword and sandbox flags, query modifiers
//! - `url`: Character classes and URL helpers used by parsing and reporting
//! - `origin`: Scheme/host/port triple of the protected document
//! - `source`: Source lists and source matching
//! - `media`: `plugin-types` media type lists
//! - `directive`: A parsed directive and its verbatim text
//! - `registry`: One delivered policy and its enforcement queries
//! - `report`: Violation records and the JSON wire format
//! - `host`: Traits implemented by the embedding document
//! - `error`: Console diagnostics and report errors

pub mod directive;
pub mod error;
pub mod host;
pub mod media;
pub mod origin;
pub mod registry;
pub mod report;
pub mod source;
pub mod types;
pub mod url;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use directive::{Directive, DirectivePayload};
pub use error::{IgnoredPathComponent, PolicyDiagnostic, ReportError};
pub use host::{
    DefaultSchemeRegistry, MatchContext, NullTransport, PolicyContext, PolicyHost, ReportTransport,
    SchemeRegistry, ScriptExecutionContext, SourceLocation,
};
pub use media::MediaTypeList;
pub use origin::Origin;
pub use registry::{DirectiveRegistry, RegistryBuilder};
pub use report::{ViolationReport, ViolationReportBody, ViolationReporter, REPORT_CONTENT_TYPE};
pub use source::{SourceList, SourceMatcher};
pub use types::{
    DirectiveName, EngineConfig, HeaderType, ReflectedXssDisposition, ReportingStatus, SandboxFlags,
    SourceKeywords,
};
