//! JSON file configuration store
//!
//! The whole collection lives in one file under a top-level `servers` key.
//! Writes go to a uniquely named sibling temp file which is fsynced and
//! renamed over the target, so readers only ever observe a complete document,
//! even when several processes write the same file.

use crate::domain::ports::config_repository::{ensure_unique_ids, upsert};
use crate::domain::{ConfigRepository, DomainError, ExtensionConfig, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

static TEMP_FILE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    servers: Vec<ExtensionConfig>,
}

#[derive(Serialize)]
struct ConfigFileRef<'a> {
    servers: &'a [ExtensionConfig],
}

pub struct JsonConfigStore {
    path: PathBuf,
    // Serializes every load-mutate-save sequence against this file.
    write_lock: Mutex<()>,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // `<path>.<pid>.<seq>.tmp`: unique per process and per write.
    fn temp_path(&self) -> PathBuf {
        let seq = TEMP_FILE_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".{}.{seq}.tmp", std::process::id()));
        PathBuf::from(tmp)
    }

    async fn read(&self) -> Vec<ExtensionConfig> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Config file does not exist yet");
                return Vec::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read config file");
                return Vec::new();
            }
        };

        match serde_json::from_str::<ConfigFile>(&contents) {
            Ok(file) => dedupe_keep_last(file.servers),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed config file");
                Vec::new()
            }
        }
    }

    async fn write(&self, configs: &[ExtensionConfig]) -> Result<()> {
        let mut json = serde_json::to_string_pretty(&ConfigFileRef { servers: configs })?;
        json.push('\n');

        let tmp = self.temp_path();
        let result: io::Result<()> = async {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(source) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(DomainError::Persistence {
                path: self.path.clone(),
                source,
            });
        }

        debug!(
            path = %self.path.display(),
            count = configs.len(),
            "Config file written"
        );
        Ok(())
    }
}

/// Collapse repeated ids, keeping the last occurrence in its position.
fn dedupe_keep_last(configs: Vec<ExtensionConfig>) -> Vec<ExtensionConfig> {
    let last: HashMap<&str, usize> = configs
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();
    if last.len() == configs.len() {
        return configs;
    }

    let keep: Vec<bool> = configs
        .iter()
        .enumerate()
        .map(|(i, c)| last[c.id.as_str()] == i)
        .collect();
    configs
        .into_iter()
        .zip(keep)
        .filter_map(|(c, keep)| {
            if !keep {
                warn!(extension_id = %c.id, "Dropping shadowed duplicate config entry");
            }
            keep.then_some(c)
        })
        .collect()
}

#[async_trait]
impl ConfigRepository for JsonConfigStore {
    async fn load(&self) -> Vec<ExtensionConfig> {
        self.read().await
    }

    async fn save(&self, configs: &[ExtensionConfig]) -> Result<()> {
        ensure_unique_ids(configs)?;
        let _guard = self.write_lock.lock().await;
        self.write(configs).await
    }

    async fn add_or_replace(&self, config: ExtensionConfig) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let id = config.id.clone();
        let mut configs = self.read().await;
        upsert(&mut configs, config);
        self.write(&configs).await?;
        info!(extension_id = %id, total = configs.len(), "Extension config saved");
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut configs = self.read().await;
        let before = configs.len();
        configs.retain(|c| c.id != id);
        if configs.len() == before {
            debug!(extension_id = %id, "Remove of unknown config ignored");
            return Ok(());
        }
        self.write(&configs).await?;
        info!(extension_id = %id, remaining = configs.len(), "Extension config removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExtensionKind;
    use std::fs;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> JsonConfigStore {
        JsonConfigStore::new(dir.path().join("extension_servers.json"))
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{\"servers\": [ {\"id\": ").unwrap();
        assert!(store.load().await.is_empty());

        fs::write(store.path(), "").unwrap();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_reads_servers_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"{"servers": [
                {"id": "b", "name": "B", "command": "/bin/b", "type": "database"},
                {"id": "a", "name": "A", "command": "/bin/a", "autoStart": true}
            ]}"#,
        )
        .unwrap();

        let configs = store.load().await;
        let ids: Vec<&str> = configs.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"], "file order must be preserved");
        assert_eq!(configs[0].kind, ExtensionKind::Database);
        assert!(configs[1].auto_start);
    }

    #[tokio::test]
    async fn test_load_collapses_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"{"servers": [
                {"id": "a", "name": "old", "command": "/bin/a"},
                {"id": "b", "name": "B", "command": "/bin/b"},
                {"id": "a", "name": "new", "command": "/bin/a"}
            ]}"#,
        )
        .unwrap();

        let configs = store.load().await;
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].id, "b");
        assert_eq!(configs[1].name, "new");
    }

    #[tokio::test]
    async fn test_save_load_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let configs = vec![
            ExtensionConfig::new("gmail", "Gmail", "npx")
                .kind(ExtensionKind::Email)
                .args(["-y", "gmail-mcp"])
                .env("Z_LAST", "1")
                .env("A_FIRST", "2")
                .auto_start(true),
            ExtensionConfig::new("fs", "Files", "/usr/local/bin/fs-mcp").enabled(false),
        ];

        store.save(&configs).await.unwrap();
        let first = fs::read_to_string(store.path()).unwrap();
        let loaded = store.load().await;
        assert_eq!(loaded, configs);

        store.save(&loaded).await.unwrap();
        let second = fs::read_to_string(store.path()).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_save_creates_parent_directory_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("servers.json");
        let store = JsonConfigStore::new(&path);

        store
            .save(&[ExtensionConfig::new("a", "A", "/bin/a")])
            .await
            .unwrap();

        assert!(path.exists());
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "unexpected files: {leftovers:?}");
    }

    #[test]
    fn test_temp_paths_are_unique_per_write() {
        let store = JsonConfigStore::new("/var/lib/extsup/servers.json");
        let first = store.temp_path();
        let second = store.temp_path();

        assert_ne!(first, second);
        assert_eq!(first.parent(), store.path().parent());
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("servers.json."), "{name}");
        assert!(name.contains(&std::process::id().to_string()), "{name}");
    }

    #[tokio::test]
    async fn test_independent_writers_never_corrupt_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");

        // Separate stores do not share a write lock, like two daemons on one file.
        let mut writers = tokio::task::JoinSet::new();
        for i in 0..8 {
            let store = JsonConfigStore::new(&path);
            writers.spawn(async move {
                let configs: Vec<ExtensionConfig> = (0..=i)
                    .map(|j| ExtensionConfig::new(format!("s{j}"), "S", "/bin/s"))
                    .collect();
                store.save(&configs).await
            });
        }
        while let Some(result) = writers.join_next().await {
            result.unwrap().unwrap();
        }

        let contents = fs::read_to_string(&path).unwrap();
        let file: serde_json::Value = serde_json::from_str(&contents).unwrap();
        let servers = file["servers"].as_array().unwrap();
        assert!((1..=8).contains(&servers.len()));

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1, "unexpected files: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_save_failure_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "plain file").unwrap();
        let store = JsonConfigStore::new(blocker.join("servers.json"));

        let err = store
            .save(&[ExtensionConfig::new("a", "A", "/bin/a")])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Persistence { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_save_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let a = ExtensionConfig::new("a", "A", "/bin/a");

        let err = store.save(&[a.clone(), a]).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateId(_)));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_add_or_replace_never_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store
            .add_or_replace(ExtensionConfig::new("a", "A", "/bin/a"))
            .await
            .unwrap();
        store
            .add_or_replace(ExtensionConfig::new("b", "B", "/bin/b"))
            .await
            .unwrap();
        store
            .add_or_replace(ExtensionConfig::new("a", "A v2", "/bin/a2").auto_start(true))
            .await
            .unwrap();

        let configs = store.load().await;
        let matching: Vec<_> = configs.iter().filter(|c| c.id == "a").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].name, "A v2");
        assert_eq!(matching[0].command, "/bin/a2");
        assert!(matching[0].auto_start);
        assert_eq!(configs.len(), 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .save(&[
                ExtensionConfig::new("a", "A", "/bin/a"),
                ExtensionConfig::new("b", "B", "/bin/b"),
            ])
            .await
            .unwrap();

        store.remove("a").await.unwrap();
        let ids: Vec<String> = store.load().await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["b"]);

        store.remove("does-not-exist").await.unwrap();
        assert_eq!(store.load().await.len(), 1);
    }

    #[tokio::test]
    async fn test_find_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .add_or_replace(ExtensionConfig::new("a", "A", "/bin/a"))
            .await
            .unwrap();

        assert!(store.find("a").await.is_some());
        assert!(store.find("z").await.is_none());
        assert!(matches!(
            store.get("z").await,
            Err(DomainError::ConfigNotFound(id)) if id == "z"
        ));
    }

    #[tokio::test]
    async fn test_concurrent_upserts_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .add_or_replace(ExtensionConfig::new(
                            format!("ext-{i}"),
                            format!("Extension {i}"),
                            "/bin/true",
                        ))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.load().await.len(), 16);
    }
}
