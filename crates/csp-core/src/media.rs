//! `plugin-types` media type lists.

use std::collections::BTreeSet;

/// Set of plugin MIME types a policy accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaTypeList {
    accepted: BTreeSet<String>,
}

impl MediaTypeList {
    pub fn new(accepted: impl IntoIterator<Item = String>) -> Self {
        Self {
            accepted: accepted.into_iter().collect(),
        }
    }

    pub fn accepted_types(&self) -> impl Iterator<Item = &str> {
        self.accepted.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    /// `declared` is the element's `type` attribute. It must be present and
    /// name exactly the type of the loaded plugin.
    pub fn allows(&self, media_type: &str, declared: &str) -> bool {
        let declared = declared.trim_matches(|c: char| c.is_ascii_whitespace());
        if declared.is_empty() || declared != media_type {
            return false;
        }
        self.accepted.contains(media_type)
    }
}
