// src/store.rs
//! Key-value persistence for scan state. One key per scan task.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>>;
    async fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// `<dir>/<key>.json`, written via temp file + rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating state dir {}", self.dir.display()))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

/// In-process store; handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Read and decode a state value. Missing, unreadable or corrupt state falls
/// back to `T::default()` so the tick can still make progress.
pub async fn load_or_default<T>(store: &dyn StateStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match store.read(key).await {
        Ok(Some(s)) => serde_json::from_str(&s).unwrap_or_else(|e| {
            tracing::warn!(target: "scan", %key, error = %e, "corrupt state, starting fresh");
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(target: "scan", %key, error = %format!("{e:#}"), "state unreadable, starting fresh");
            T::default()
        }
    }
}

pub async fn save<T: Serialize>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value).context("encoding state")?;
    store
        .write(key, &body)
        .await
        .with_context(|| format!("persisting state `{key}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::ScanState;

    #[tokio::test]
    async fn corrupt_state_falls_back_to_default() {
        let store = MemoryStore::new();
        store.write("news-a", "{ not json").await.unwrap();
        let st: ScanState = load_or_default(&store, "news-a").await;
        assert_eq!(st, ScanState::default());
    }

    #[tokio::test]
    async fn file_store_round_trips_and_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert_eq!(store.read("news:main").await.unwrap(), None);

        let mut st = ScanState::default();
        st.seen_keys.insert("url:https://e.example/a");
        save(&store, "news:main", &st).await.unwrap();

        assert!(dir.path().join("news_main.json").exists());
        let back: ScanState = load_or_default(&store, "news:main").await;
        assert_eq!(back, st);
    }

    #[tokio::test]
    async fn persisted_shape_uses_camel_case() {
        let store = MemoryStore::new();
        save(&store, "k", &ScanState::default()).await.unwrap();
        let raw = store.get("k").unwrap();
        assert!(raw.contains("\"watermarkTimestamp\""));
        assert!(raw.contains("\"seenKeys\""));
    }
}
