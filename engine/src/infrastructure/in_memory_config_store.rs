//! In-Memory Configuration Store
//! Volatile implementation of the ConfigRepository port

use crate::domain::ports::config_repository::{ensure_unique_ids, upsert};
use crate::domain::{ConfigRepository, ExtensionConfig, Result};
use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Configuration store for embedders that manage persistence themselves
#[derive(Default)]
pub struct InMemoryConfigStore {
    configs: RwLock<Vec<ExtensionConfig>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configs(configs: Vec<ExtensionConfig>) -> Result<Self> {
        ensure_unique_ids(&configs)?;
        Ok(Self {
            configs: RwLock::new(configs),
        })
    }
}

#[async_trait]
impl ConfigRepository for InMemoryConfigStore {
    async fn load(&self) -> Vec<ExtensionConfig> {
        self.configs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn save(&self, configs: &[ExtensionConfig]) -> Result<()> {
        ensure_unique_ids(configs)?;
        *self.configs.write().unwrap_or_else(PoisonError::into_inner) = configs.to_vec();
        Ok(())
    }

    async fn add_or_replace(&self, config: ExtensionConfig) -> Result<()> {
        debug!(extension_id = %config.id, "Saving extension config");
        let mut configs = self.configs.write().unwrap_or_else(PoisonError::into_inner);
        upsert(&mut configs, config);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        debug!(extension_id = %id, "Removing extension config");
        self.configs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|c| c.id != id);
        Ok(())
    }
}
