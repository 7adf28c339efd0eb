use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Runtime configuration for a [`crate::hub::Hub`] instance.
///
/// Grounded on the teacher's `datastore::Config` (plugin/dashboard storage
/// locations, `dirs`-relative defaults) with the web-server fields dropped
/// since transport servers are out of scope here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub plugin_locations: Vec<PathBuf>,
    pub thing_store_path: PathBuf,
    pub plugin_config_path: PathBuf,
    pub io_connection_store_path: PathBuf,
    pub pairing_ttl_secs: u64,
    pub action_timeout_secs: u64,
    pub discovery_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("hearth");
        Self {
            plugin_locations: vec![base.join("plugins")],
            thing_store_path: base.join("things.json"),
            plugin_config_path: base.join("plugin-config.json"),
            io_connection_store_path: base.join("io-connections.json"),
            pairing_ttl_secs: 300,
            action_timeout_secs: 30,
            discovery_timeout_secs: 15,
        }
    }
}

impl Config {
    pub async fn load(path: &std::path::Path) -> Result<Self, crate::persistence::PersistenceError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(toml::from_str(&contents).map_err(|e| {
                crate::persistence::PersistenceError::Json(serde_json::Error::io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e,
                )))
            })?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn pairing_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pairing_ttl_secs)
    }

    pub fn action_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.action_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.discovery_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_timeouts() {
        let config = Config::default();
        assert!(config.pairing_ttl().as_secs() >= 300);
        assert!(config.action_timeout().as_secs() > 0);
    }

    #[tokio::test]
    async fn load_missing_file_falls_back_to_default() {
        let path = std::env::temp_dir().join(format!("hearth-config-missing-{}.toml", uuid::Uuid::new_v4()));
        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.pairing_ttl_secs, 300);
    }
}
