//! ExtensionKind value object
//! Display category of an extension server. Carries no lifecycle behavior.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExtensionKind {
    Email,
    Calendar,
    Filesystem,
    #[serde(alias = "web_scraper")]
    WebScraper,
    Database,
    #[default]
    Custom,
}

impl ExtensionKind {
    pub const ALL: [ExtensionKind; 6] = [
        ExtensionKind::Email,
        ExtensionKind::Calendar,
        ExtensionKind::Filesystem,
        ExtensionKind::WebScraper,
        ExtensionKind::Database,
        ExtensionKind::Custom,
    ];

    /// Parse from string representation (case-insensitive, `_` or `-` separated)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "email" => Some(ExtensionKind::Email),
            "calendar" => Some(ExtensionKind::Calendar),
            "filesystem" => Some(ExtensionKind::Filesystem),
            "web-scraper" => Some(ExtensionKind::WebScraper),
            "database" => Some(ExtensionKind::Database),
            "custom" => Some(ExtensionKind::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionKind::Email => write!(f, "email"),
            ExtensionKind::Calendar => write!(f, "calendar"),
            ExtensionKind::Filesystem => write!(f, "filesystem"),
            ExtensionKind::WebScraper => write!(f, "web-scraper"),
            ExtensionKind::Database => write!(f, "database"),
            ExtensionKind::Custom => write!(f, "custom"),
        }
    }
}
