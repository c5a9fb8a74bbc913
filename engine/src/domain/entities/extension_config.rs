//! ExtensionConfig entity
//! Durable description of how to launch one extension server

use crate::domain::{DomainError, ExtensionKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ExtensionKind,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// The complete environment of the spawned process; nothing is inherited.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Informational only, never opened or probed.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl ExtensionConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ExtensionKind::default(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            port: None,
            auto_start: false,
            enabled: true,
            description: None,
            config: serde_json::Map::new(),
        }
    }

    pub fn kind(mut self, kind: ExtensionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Eligible for bulk auto-start.
    pub fn wants_auto_start(&self) -> bool {
        self.enabled && self.auto_start
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::InvalidConfig("id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidConfig(format!(
                "'{}': name must not be empty",
                self.id
            )));
        }
        if self.command.trim().is_empty() {
            return Err(DomainError::InvalidConfig(format!(
                "'{}': command must not be empty",
                self.id
            )));
        }
        if let Some(key) = self
            .env
            .keys()
            .find(|k| k.is_empty() || k.contains('=') || k.contains('\0'))
        {
            return Err(DomainError::InvalidConfig(format!(
                "'{}': invalid environment variable name {key:?}",
                self.id
            )));
        }
        Ok(())
    }
}
