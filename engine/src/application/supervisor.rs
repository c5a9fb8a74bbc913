//! Supervisor
//!
//! Mediates between the durable configuration store and the live extension
//! instances. Instances are created lazily on first start and live until their
//! configuration is removed or the supervisor is dropped; only configurations
//! survive a supervisor restart.
//!
//! Configuration-layer failures (`ConfigNotFound`, persistence) are returned as
//! errors. Process-lifecycle failures are absorbed into instance state and the
//! boolean results, so bulk operations always complete a full pass.

use crate::domain::{ConfigRepository, DomainError, ExtensionConfig, InstanceStatus, Result};
use crate::infrastructure::ExtensionInstance;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub struct Supervisor {
    store: Arc<dyn ConfigRepository>,
    instances: RwLock<HashMap<String, Arc<ExtensionInstance>>>,
}

impl Supervisor {
    pub fn new(store: Arc<dyn ConfigRepository>) -> Self {
        Self {
            store,
            instances: RwLock::new(HashMap::new()),
        }
    }

    async fn instance(&self, id: &str) -> Option<Arc<ExtensionInstance>> {
        self.instances.read().await.get(id).cloned()
    }

    /// The store is consulted under the registry write lock, which
    /// `remove_config` also holds while it deletes the record, so an instance
    /// is never registered for a configuration that is being removed.
    async fn instance_or_register(&self, id: &str) -> Result<Arc<ExtensionInstance>> {
        if let Some(instance) = self.instance(id).await {
            return Ok(instance);
        }

        let mut instances = self.instances.write().await;
        if let Some(instance) = instances.get(id) {
            return Ok(instance.clone());
        }
        let config = self.store.get(id).await?;
        debug!(extension_id = %id, "Registering extension instance");
        let instance = Arc::new(ExtensionInstance::new(config));
        instances.insert(id.to_string(), instance.clone());
        Ok(instance)
    }

    // ===== Lifecycle =====

    /// Start the extension server `id`. Fails only when `id` is not configured
    /// (or is removed while the start waits); spawn and probation failures
    /// yield `Ok(false)` and show up in `status`.
    pub async fn start(&self, id: &str) -> Result<bool> {
        let instance = self.instance_or_register(id).await?;
        let started = instance.start().await;
        if !started && instance.is_retired() {
            return Err(DomainError::ConfigNotFound(id.to_string()));
        }
        Ok(started)
    }

    /// Stop the extension server `id`. Never-started servers are already stopped.
    pub async fn stop(&self, id: &str) -> bool {
        match self.instance(id).await {
            Some(instance) => instance.stop().await,
            None => {
                debug!(extension_id = %id, "Stop requested for unregistered instance");
                true
            }
        }
    }

    /// Best-effort stop followed by start. A failed stop does not prevent the
    /// start attempt, so callers should re-check `status` afterwards.
    pub async fn restart(&self, id: &str) -> Result<bool> {
        if !self.stop(id).await {
            warn!(extension_id = %id, "Stop failed during restart, attempting start anyway");
        }
        self.start(id).await
    }

    /// Start every enabled auto-start configuration. Each is attempted
    /// independently; results come back in configuration order.
    pub async fn start_all_auto(&self) -> Vec<(String, bool)> {
        let configs = self.store.load().await;
        let order: Vec<String> = configs
            .iter()
            .filter(|c| c.wants_auto_start())
            .map(|c| c.id.clone())
            .collect();
        info!(
            configured = configs.len(),
            auto_start = order.len(),
            "Starting auto-start extension servers"
        );

        let mut tasks = JoinSet::new();
        for id in &order {
            let instance = match self.instance_or_register(id).await {
                Ok(instance) => instance,
                Err(e) => {
                    warn!(extension_id = %id, error = %e, "Auto-start skipped");
                    continue;
                }
            };
            tasks.spawn(async move {
                let started = instance.start().await;
                (instance.id().to_string(), started)
            });
        }

        let mut outcomes = collect(tasks).await;
        for (id, started) in &outcomes {
            if !*started {
                warn!(extension_id = %id, "Auto-start failed");
            }
        }
        outcomes.sort_by_key(|(id, _)| order.iter().position(|o| o == id));
        outcomes
    }

    /// Stop every registered instance, whatever its configuration flags say.
    pub async fn stop_all(&self) -> Vec<(String, bool)> {
        let instances: Vec<Arc<ExtensionInstance>> =
            self.instances.read().await.values().cloned().collect();
        info!(count = instances.len(), "Stopping all extension servers");

        let mut tasks = JoinSet::new();
        for instance in instances {
            tasks.spawn(async move {
                let stopped = instance.stop().await;
                (instance.id().to_string(), stopped)
            });
        }

        let mut outcomes = collect(tasks).await;
        outcomes.sort();
        outcomes
    }

    // ===== Status =====

    /// Live status if registered, otherwise an `Inactive` snapshot of the
    /// stored configuration.
    pub async fn status(&self, id: &str) -> Result<InstanceStatus> {
        if let Some(instance) = self.instance(id).await {
            return Ok(instance.get_status());
        }
        let config = self.store.get(id).await?;
        Ok(InstanceStatus::inactive(&config))
    }

    /// One status per stored configuration, in configuration order.
    pub async fn all_statuses(&self) -> Vec<InstanceStatus> {
        let configs = self.store.load().await;
        let instances = self.instances.read().await;
        configs
            .iter()
            .map(|config| match instances.get(&config.id) {
                Some(instance) => instance.get_status(),
                None => InstanceStatus::inactive(config),
            })
            .collect()
    }

    /// Ids with a registered instance, sorted.
    pub async fn managed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ===== Configuration =====

    pub async fn configs(&self) -> Vec<ExtensionConfig> {
        self.store.load().await
    }

    pub async fn config(&self, id: &str) -> Result<ExtensionConfig> {
        self.store.get(id).await
    }

    /// Validate and upsert `config`. A registered instance picks up the new
    /// configuration on its next start.
    pub async fn add_config(&self, config: ExtensionConfig) -> Result<()> {
        config.validate()?;
        self.store.add_or_replace(config.clone()).await?;
        if let Some(instance) = self.instance(&config.id).await {
            instance.rebind(config);
        }
        Ok(())
    }

    /// Stop any live process for `id`, then forget its configuration and
    /// instance. If the process cannot be stopped nothing is removed.
    ///
    /// The instance stays registered while it is retired, so concurrent
    /// `status` calls see the real process and concurrent `start` calls queue
    /// behind the retirement instead of spawning a replacement.
    pub async fn remove_config(&self, id: &str) -> Result<()> {
        let instance = self.instance_or_register(id).await?;

        if !instance.retire().await {
            error!(extension_id = %id, "Keeping config: extension server did not stop");
            return Err(DomainError::StopFailed(id.to_string()));
        }

        let mut instances = self.instances.write().await;
        let removed = self.store.remove(id).await;
        // The retired instance goes either way; if the record survived, the
        // next start registers a fresh one.
        if instances
            .get(id)
            .is_some_and(|registered| Arc::ptr_eq(registered, &instance))
        {
            instances.remove(id);
        }
        removed?;
        info!(extension_id = %id, "Extension server removed");
        Ok(())
    }
}

async fn collect(mut tasks: JoinSet<(String, bool)>) -> Vec<(String, bool)> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!(error = %e, "Extension lifecycle task failed"),
        }
    }
    outcomes
}
