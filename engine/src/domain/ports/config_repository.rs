//! Repository port for extension server configurations
//! Implementations are in the infrastructure layer

use crate::domain::{DomainError, ExtensionConfig, Result};
use async_trait::async_trait;

/// Durable, ordered collection of extension server configurations.
///
/// Implementations serialize their own load-mutate-save sequences so that
/// concurrent `add_or_replace`/`remove` calls never lose an update.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Read every configuration. Never fails: a missing or unreadable backing
    /// store yields an empty list and the problem is logged.
    async fn load(&self) -> Vec<ExtensionConfig>;

    /// Replace the whole collection.
    async fn save(&self, configs: &[ExtensionConfig]) -> Result<()>;

    /// Upsert by id: an existing entry is dropped and the new one appended.
    async fn add_or_replace(&self, config: ExtensionConfig) -> Result<()>;

    /// Remove by id. Removing an unknown id is a no-op.
    async fn remove(&self, id: &str) -> Result<()>;

    async fn find(&self, id: &str) -> Option<ExtensionConfig> {
        self.load().await.into_iter().find(|c| c.id == id)
    }

    async fn get(&self, id: &str) -> Result<ExtensionConfig> {
        self.find(id)
            .await
            .ok_or_else(|| DomainError::ConfigNotFound(id.to_string()))
    }
}

/// Reject a collection that names the same id twice.
pub(crate) fn ensure_unique_ids(configs: &[ExtensionConfig]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    match configs.iter().find(|c| !seen.insert(c.id.as_str())) {
        Some(dup) => Err(DomainError::DuplicateId(dup.id.clone())),
        None => Ok(()),
    }
}

/// Upsert semantics shared by the adapters.
pub(crate) fn upsert(configs: &mut Vec<ExtensionConfig>, config: ExtensionConfig) {
    configs.retain(|c| c.id != config.id);
    configs.push(config);
}
