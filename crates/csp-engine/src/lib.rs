//! CSP Engine
//!
//! A document owns one [`ContentSecurityPolicy`]. Every delivered header adds
//! one or more policies; every query must be allowed by all of them.

pub mod policy;

pub use policy::ContentSecurityPolicy;

pub use csp_core::{
    DefaultSchemeRegistry, DirectiveRegistry, EngineConfig, HeaderType, NullTransport, Origin,
    PolicyHost, ReflectedXssDisposition, ReportTransport, ReportingStatus, SandboxFlags,
    SchemeRegistry, ScriptExecutionContext, SourceLocation, REPORT_CONTENT_TYPE,
};
