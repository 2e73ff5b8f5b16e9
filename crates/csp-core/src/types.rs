//! Core type definitions shared by the policy compiler and the enforcement
//! engine.

use serde::Serialize;

// =============================================================================
// Directive Names
// =============================================================================

/// Directives recognised by the policy compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum DirectiveName {
    DefaultSrc,
    ScriptSrc,
    StyleSrc,
    ImgSrc,
    FontSrc,
    MediaSrc,
    ObjectSrc,
    FrameSrc,
    ConnectSrc,
    BaseUri,
    FormAction,
    PluginTypes,
    Sandbox,
    ReportUri,
    ReflectedXss,
}

const DIRECTIVE_NAMES: &[(&str, DirectiveName)] = &[
    ("default-src", DirectiveName::DefaultSrc),
    ("script-src", DirectiveName::ScriptSrc),
    ("style-src", DirectiveName::StyleSrc),
    ("img-src", DirectiveName::ImgSrc),
    ("font-src", DirectiveName::FontSrc),
    ("media-src", DirectiveName::MediaSrc),
    ("object-src", DirectiveName::ObjectSrc),
    ("frame-src", DirectiveName::FrameSrc),
    ("connect-src", DirectiveName::ConnectSrc),
    ("base-uri", DirectiveName::BaseUri),
    ("form-action", DirectiveName::FormAction),
    ("plugin-types", DirectiveName::PluginTypes),
    ("sandbox", DirectiveName::Sandbox),
    ("report-uri", DirectiveName::ReportUri),
    ("reflected-xss", DirectiveName::ReflectedXss),
];

impl DirectiveName {
    /// Look up a directive by name. Directive names are ASCII case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        DIRECTIVE_NAMES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|&(_, directive)| directive)
    }

    /// Canonical lowercase spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DefaultSrc => "default-src",
            Self::ScriptSrc => "script-src",
            Self::StyleSrc => "style-src",
            Self::ImgSrc => "img-src",
            Self::FontSrc => "font-src",
            Self::MediaSrc => "media-src",
            Self::ObjectSrc => "object-src",
            Self::FrameSrc => "frame-src",
            Self::ConnectSrc => "connect-src",
            Self::BaseUri => "base-uri",
            Self::FormAction => "form-action",
            Self::PluginTypes => "plugin-types",
            Self::Sandbox => "sandbox",
            Self::ReportUri => "report-uri",
            Self::ReflectedXss => "reflected-xss",
        }
    }

    /// Fetch directives consult `default-src` when they are not set.
    /// `base-uri` and `form-action` never do.
    pub fn falls_back_to_default(self) -> bool {
        matches!(
            self,
            Self::ScriptSrc
                | Self::StyleSrc
                | Self::ImgSrc
                | Self::FontSrc
                | Self::MediaSrc
                | Self::ObjectSrc
                | Self::FrameSrc
                | Self::ConnectSrc
        )
    }

    /// Whether the directive value is a source list.
    pub fn is_source_list(self) -> bool {
        self.falls_back_to_default()
            || matches!(self, Self::DefaultSrc | Self::BaseUri | Self::FormAction)
    }

    /// Console message prefix used when a URL is refused by this directive.
    pub(crate) fn refusal_prefix(self) -> &'static str {
        match self {
            Self::BaseUri => "Refused to set the document's base URI to '",
            Self::ConnectSrc => "Refused to connect to '",
            Self::FontSrc => "Refused to load the font '",
            Self::FormAction => "Refused to send form data to '",
            Self::FrameSrc => "Refused to frame '",
            Self::ImgSrc => "Refused to load the image '",
            Self::MediaSrc => "Refused to load media from '",
            Self::ObjectSrc => "Refused to load plugin data from '",
            Self::ScriptSrc => "Refused to load the script '",
            Self::StyleSrc => "Refused to load the stylesheet '",
            _ => "Refused to load '",
        }
    }
}

impl From<DirectiveName> for &'static str {
    fn from(name: DirectiveName) -> Self {
        name.as_str()
    }
}

impl std::fmt::Display for DirectiveName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `value` spells any recognised directive name.
pub fn is_directive_name(value: &str) -> bool {
    DirectiveName::from_name(value).is_some()
}

// =============================================================================
// Source List Keywords (bit flags on a parsed source list)
// =============================================================================

bitflags::bitflags! {
    /// Keyword sources that are stored on the list rather than as matchers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SourceKeywords: u8 {
        /// `*`
        const STAR = 1 << 0;
        /// `'unsafe-inline'`
        const UNSAFE_INLINE = 1 << 1;
        /// `'unsafe-eval'`
        const UNSAFE_EVAL = 1 << 2;
    }
}

// =============================================================================
// Sandbox Flags
// =============================================================================

bitflags::bitflags! {
    /// Browsing-context restrictions requested by the `sandbox` directive.
    /// A set bit means the capability is *removed*.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SandboxFlags: u16 {
        const NAVIGATION = 1 << 0;
        const PLUGINS = 1 << 1;
        const ORIGIN = 1 << 2;
        const FORMS = 1 << 3;
        const SCRIPTS = 1 << 4;
        const TOP_NAVIGATION = 1 << 5;
        const POPUPS = 1 << 6;
        const AUTOMATIC_FEATURES = 1 << 7;
        const POINTER_LOCK = 1 << 8;
    }
}

impl SandboxFlags {
    /// Parse a space-separated sandbox token list.
    ///
    /// Starts from every restriction and lifts one per recognised `allow-*`
    /// token. Unknown tokens are collected into the returned error message.
    pub fn parse_policy(policy: &str) -> (Self, Option<String>) {
        let mut flags = Self::all();
        let mut invalid = Vec::new();

        for token in policy.split(|c: char| c.is_ascii_whitespace()) {
            if token.is_empty() {
                continue;
            }

            let lowered = token.to_ascii_lowercase();
            match lowered.as_str() {
                "allow-same-origin" => flags.remove(Self::ORIGIN),
                "allow-forms" => flags.remove(Self::FORMS),
                "allow-scripts" => flags.remove(Self::SCRIPTS | Self::AUTOMATIC_FEATURES),
                "allow-top-navigation" => flags.remove(Self::TOP_NAVIGATION),
                "allow-popups" => flags.remove(Self::POPUPS),
                "allow-pointer-lock" => flags.remove(Self::POINTER_LOCK),
                _ => invalid.push(format!("'{token}'")),
            }
        }

        let message = match invalid.len() {
            0 => None,
            1 => Some(format!("{} is an invalid sandbox flag.", invalid[0])),
            _ => Some(format!("{} are invalid sandbox flags.", invalid.join(", "))),
        };

        (flags, message)
    }
}

// =============================================================================
// Reflected XSS Disposition
// =============================================================================

/// Value of the `reflected-xss` directive.
///
/// Variants are ordered so that the aggregate disposition of several
/// policies is simply the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflectedXssDisposition {
    #[default]
    Unset,
    Allow,
    Invalid,
    Filter,
    Block,
}

// =============================================================================
// Query Modifiers
// =============================================================================

/// Whether a denied check should produce a violation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportingStatus {
    #[default]
    SendReport,
    SuppressReport,
}

/// How a delivered header is to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderType {
    /// `Content-Security-Policy`
    #[default]
    Enforce,
    /// `Content-Security-Policy-Report-Only`
    Report,
}

impl HeaderType {
    pub fn is_report_only(self) -> bool {
        self == Self::Report
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Switches owned by the embedding document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    /// Enables `effective-directive` in reports and the `http` → `https`
    /// allowance for scheme-less sources.
    pub experimental_features: bool,
    /// Forces `allow_inline_style` to succeed (used by inspector tooling).
    pub override_inline_style: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_lookup_is_case_insensitive() {
        assert_eq!(DirectiveName::from_name("Script-SRC"), Some(DirectiveName::ScriptSrc));
        assert_eq!(DirectiveName::from_name("report-uri"), Some(DirectiveName::ReportUri));
        assert_eq!(DirectiveName::from_name("script"), None);
        assert!(is_directive_name("IMG-SRC"));
    }

    #[test]
    fn test_fallback_set() {
        assert!(DirectiveName::ScriptSrc.falls_back_to_default());
        assert!(DirectiveName::ConnectSrc.falls_back_to_default());
        assert!(!DirectiveName::BaseUri.falls_back_to_default());
        assert!(!DirectiveName::FormAction.falls_back_to_default());
        assert!(!DirectiveName::DefaultSrc.falls_back_to_default());
    }

    #[test]
    fn test_sandbox_policy_lifts_restrictions() {
        let (flags, errors) = SandboxFlags::parse_policy("allow-scripts  allow-forms");
        assert!(errors.is_none());
        assert!(!flags.contains(SandboxFlags::SCRIPTS));
        assert!(!flags.contains(SandboxFlags::AUTOMATIC_FEATURES));
        assert!(!flags.contains(SandboxFlags::FORMS));
        assert!(flags.contains(SandboxFlags::ORIGIN));
        assert!(flags.contains(SandboxFlags::PLUGINS));
    }

    #[test]
    fn test_sandbox_policy_reports_invalid_tokens() {
        let (flags, errors) = SandboxFlags::parse_policy("allow-bogus");
        assert_eq!(flags, SandboxFlags::all());
        assert_eq!(errors.as_deref(), Some("'allow-bogus' is an invalid sandbox flag."));

        let (_, errors) = SandboxFlags::parse_policy("one allow-popups two");
        assert_eq!(errors.as_deref(), Some("'one', 'two' are invalid sandbox flags."));
    }

    #[test]
    fn test_empty_sandbox_is_fully_restrictive() {
        let (flags, errors) = SandboxFlags::parse_policy("");
        assert_eq!(flags, SandboxFlags::all());
        assert!(errors.is_none());
    }

    #[test]
    fn test_reflected_xss_ordering() {
        assert!(ReflectedXssDisposition::Block > ReflectedXssDisposition::Filter);
        assert!(ReflectedXssDisposition::Filter > ReflectedXssDisposition::Invalid);
        assert!(ReflectedXssDisposition::Invalid > ReflectedXssDisposition::Allow);
        assert!(ReflectedXssDisposition::Allow > ReflectedXssDisposition::Unset);
    }
}
