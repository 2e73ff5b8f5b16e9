//! A single parsed directive.

use crate::media::MediaTypeList;
use crate::source::SourceList;
use crate::types::DirectiveName;

/// Parsed directive value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectivePayload {
    Sources(SourceList),
    MediaTypes(MediaTypeList),
}

/// A directive together with the text it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    kind: DirectiveName,
    /// Name as delivered, case preserved.
    name: String,
    /// `name + ' ' + value`, verbatim.
    text: String,
    payload: DirectivePayload,
}

impl Directive {
    pub fn new(kind: DirectiveName, name: &str, value: &str, payload: DirectivePayload) -> Self {
        Self {
            kind,
            name: name.to_string(),
            text: format!("{name} {value}"),
            payload,
        }
    }

    pub fn kind(&self) -> DirectiveName {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn payload(&self) -> &DirectivePayload {
        &self.payload
    }

    pub fn source_list(&self) -> Option<&SourceList> {
        match &self.payload {
            DirectivePayload::Sources(list) => Some(list),
            DirectivePayload::MediaTypes(_) => None,
        }
    }

    pub fn media_types(&self) -> Option<&MediaTypeList> {
        match &self.payload {
            DirectivePayload::MediaTypes(list) => Some(list),
            DirectivePayload::Sources(_) => None,
        }
    }
}
