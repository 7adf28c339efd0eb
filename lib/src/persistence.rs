use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

/// Errors from loading/saving a [`ConfigStore`] file. Kept separate from
/// [`crate::error::ThingError`] since persistence failures are an
/// infrastructure concern, not a thing-lifecycle outcome.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A keyed JSON-file-backed store, one file per logical collection (Things,
/// plugin configurations, IO connections).
///
/// Grounded on the teacher's `Plugin::reload_settings`/`save_settings`
/// file-per-entity pattern (`datastore.rs`), generalized to any
/// serde-serializable, string-keyed value.
pub struct ConfigStore<V> {
    path: PathBuf,
    entries: HashMap<String, V>,
}

impl<V> ConfigStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Loads `path` if it exists; an absent file is treated as an empty
    /// store rather than an error, mirroring the teacher's `NotFound` branch.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    pub async fn save(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        let mut writer = tokio::fs::File::options()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .await?;
        writer.write_all(&bytes).await?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        value: i32,
    }

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let dir = std::env::temp_dir().join(format!("hearth-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("things.json");
        let store: ConfigStore<Sample> = ConfigStore::load(&path).await.unwrap();
        assert!(store.values().next().is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = std::env::temp_dir().join(format!("hearth-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("things.json");
        let mut store: ConfigStore<Sample> = ConfigStore::load(&path).await.unwrap();
        store.set("a", Sample { name: "lamp".into(), value: 1 });
        store.save().await.unwrap();

        let reloaded: ConfigStore<Sample> = ConfigStore::load(&path).await.unwrap();
        assert_eq!(reloaded.get("a"), Some(&Sample { name: "lamp".into(), value: 1 }));

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
