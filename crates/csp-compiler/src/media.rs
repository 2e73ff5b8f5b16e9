//! `plugin-types` value parser.

use csp_core::error::PolicyDiagnostic;
use csp_core::media::MediaTypeList;

/// Why a media type token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MediaTypeError {
    #[error("missing type before '/'")]
    MissingType,

    #[error("missing '/' separator")]
    MissingSeparator,

    #[error("missing subtype after '/'")]
    MissingSubtype,

    #[error("unexpected '/' in subtype")]
    ExtraSeparator,
}

/// Validate one `type/subtype` token.
pub fn parse_media_type(token: &str) -> Result<&str, MediaTypeError> {
    let (kind, subtype) = token.split_once('/').ok_or(MediaTypeError::MissingSeparator)?;
    if kind.is_empty() {
        return Err(MediaTypeError::MissingType);
    }
    if subtype.is_empty() {
        return Err(MediaTypeError::MissingSubtype);
    }
    if subtype.contains('/') {
        return Err(MediaTypeError::ExtraSeparator);
    }
    Ok(token)
}

/// Parse a whitespace-separated media type list. Malformed tokens are skipped
/// with a diagnostic.
pub fn parse_media_type_list(value: &str, diagnostics: &mut Vec<PolicyDiagnostic>) -> MediaTypeList {
    if value.trim_matches(|c: char| c.is_ascii_whitespace()).is_empty() {
        diagnostics.push(PolicyDiagnostic::EmptyPluginTypes);
        return MediaTypeList::default();
    }

    let mut accepted = Vec::new();
    for token in value.split_ascii_whitespace() {
        match parse_media_type(token) {
            Ok(media_type) => accepted.push(media_type.to_string()),
            Err(e) => {
                log::debug!("rejected plugin type '{token}': {e}");
                diagnostics.push(PolicyDiagnostic::InvalidPluginType(token.to_string()));
            }
        }
    }

    MediaTypeList::new(accepted)
}
