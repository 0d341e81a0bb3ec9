use serde::{Deserialize, Serialize};

use crate::template::{substitute, TemplateParams};

/// Strategy used to resolve a selector against the live document.
///
/// `Auto` tries CSS first and falls back to XPath when the CSS lookup
/// misses or rejects the selector syntax. The fallback chain is the
/// pluggable normalization point for driver quirks: pick an explicit kind
/// to pin one strategy, or `Auto` to tolerate mixed selector styles in
/// reusable component definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Css,
    XPath,
    Auto,
}

impl SelectorKind {
    /// Concrete strategies to try, in order.
    pub fn resolution_order(self) -> &'static [SelectorKind] {
        match self {
            SelectorKind::Css => &[SelectorKind::Css],
            SelectorKind::XPath => &[SelectorKind::XPath],
            SelectorKind::Auto => &[SelectorKind::Css, SelectorKind::XPath],
        }
    }
}

impl Default for SelectorKind {
    fn default() -> Self {
        SelectorKind::Auto
    }
}

/// What a timed-out wait should do.
///
/// `Silent` resolves to "absent" (`Ok(None)` / `Ok(false)`), `Raise` throws
/// the default message for the failed wait, and `RaiseWith` throws a custom
/// message template supporting `${expected}` and `${found}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorPolicy {
    Silent,
    Raise,
    RaiseWith(String),
}

impl ErrorPolicy {
    /// Message to raise for a failed wait, or `None` for the silent path.
    pub fn resolve(&self, default_message: impl Into<String>, expected: &str, found: &str) -> Option<String> {
        match self {
            ErrorPolicy::Silent => None,
            ErrorPolicy::Raise => Some(default_message.into()),
            ErrorPolicy::RaiseWith(template) => {
                let params = TemplateParams::new()
                    .with("expected", expected)
                    .with("found", found);
                Some(substitute(template, &params))
            }
        }
    }
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy::Silent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport {
                width: 1280,
                height: 720,
            },
            user_agent: None,
            args: vec![],
        }
    }
}
