//! CSP Policy Compiler
//!
//! This crate compiles `Content-Security-Policy` header text into a
//! [`DirectiveRegistry`](csp_core::DirectiveRegistry). Parsing never fails:
//! malformed input is reported to the host console and skipped.

pub mod media;
pub mod parser;
pub mod source;

pub use media::{parse_media_type, parse_media_type_list, MediaTypeError};
pub use parser::parse_policy;
pub use source::{parse_source_expression, parse_source_list, ParsedSource, SourceError, SourceExpression};
