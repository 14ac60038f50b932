//! Runtime configuration.
//!
//! Loaded from an optional TOML file, then overridden from the environment:
//!
//! ```toml
//! skip_loading_screen = false
//!
//! [api]
//! root = "https://ancient-plains-38653.herokuapp.com"
//! timeout_secs = 30
//!
//! [storage]
//! backend = "sqlite"   # or "memory"
//! path = "/data/session.db"
//!
//! [logging]
//! filter = "moa_session=debug"
//! ```
//!
//! | Variable | Effect |
//! |---|---|
//! | `MOA_SESSION_ENV=development` | default root becomes the development server |
//! | `MOA_SESSION_API_ROOT` | replaces `api.root` |
//! | `MOA_SESSION_DATA_DIR` | replaces the data directory |

use crate::store::{KeyValueStore, MemoryStore, SqliteStore};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PRODUCTION_API_ROOT: &str = "https://ancient-plains-38653.herokuapp.com";
pub const DEVELOPMENT_API_ROOT: &str = "http://192.168.1.99:3001";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DATA_DIR_NAME: &str = ".moa-session";
const SESSION_DB_FILE: &str = "session.db";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub root: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            root: PRODUCTION_API_ROOT.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite file; `<data dir>/session.db` when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    /// Render immediately instead of waiting for startup to finish.
    pub skip_loading_screen: bool,
    /// Where device data lives. Not read from the file.
    #[serde(skip)]
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration.
    ///
    /// With no explicit path, `<data dir>/config.toml` is read if present;
    /// a missing file yields defaults. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    fn load_with_env(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let data_dir = match env("MOA_SESSION_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&contents)?
            }
            None => {
                let default_path = data_dir.join(CONFIG_FILE);
                match std::fs::read_to_string(&default_path) {
                    Ok(contents) => Self::from_toml(&contents)?,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
                    Err(e) => {
                        return Err(e).with_context(|| {
                            format!("Failed to read config {}", default_path.display())
                        })
                    }
                }
            }
        };

        config.data_dir = data_dir;
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).map_err(|e| anyhow::anyhow!("Failed to parse config: {e}"))
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let development = env("MOA_SESSION_ENV")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("development"));
        if development && self.api.root == PRODUCTION_API_ROOT {
            self.api.root = DEVELOPMENT_API_ROOT.into();
        }

        if let Some(root) = env("MOA_SESSION_API_ROOT").filter(|v| !v.trim().is_empty()) {
            self.api.root = root;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api.root.trim().is_empty() {
            anyhow::bail!("api.root cannot be empty");
        }
        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn session_db_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(SESSION_DB_FILE))
    }

    /// Open the configured storage backend.
    pub fn open_store(&self) -> anyhow::Result<Arc<dyn KeyValueStore>> {
        match self.storage.backend {
            StorageBackend::Sqlite => {
                let path = self.session_db_path();
                let store = SqliteStore::open(&path)
                    .with_context(|| format!("Failed to open session store {}", path.display()))?;
                Ok(Arc::new(store))
            }
            StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        }
    }
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    use directories::UserDirs;

    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    Ok(home.join(DATA_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_string_lossy().to_string();
        let config =
            Config::load_with_env(None, env_from(&[("MOA_SESSION_DATA_DIR", dir.as_str())])).unwrap();

        assert_eq!(config.api, ApiConfig::default());
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(!config.skip_loading_screen);
        assert_eq!(config.session_db_path(), tmp.path().join("session.db"));
    }

    #[test]
    fn file_in_data_dir_is_picked_up() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "skip_loading_screen = true\n[api]\ntimeout_secs = 5\n",
        )
        .unwrap();
        let dir = tmp.path().to_string_lossy().to_string();

        let config =
            Config::load_with_env(None, env_from(&[("MOA_SESSION_DATA_DIR", dir.as_str())])).unwrap();
        assert!(config.skip_loading_screen);
        assert_eq!(config.api.timeout_secs, 5);
        assert_eq!(config.api.root, PRODUCTION_API_ROOT);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_string_lossy().to_string();
        let missing = tmp.path().join("nope.toml");
        let result =
            Config::load_with_env(Some(&missing), env_from(&[("MOA_SESSION_DATA_DIR", dir.as_str())]));
        assert!(result.is_err());
    }

    #[test]
    fn development_env_switches_default_root_only() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_string_lossy().to_string();

        let config = Config::load_with_env(
            None,
            env_from(&[("MOA_SESSION_DATA_DIR", dir.as_str()), ("MOA_SESSION_ENV", "development")]),
        )
        .unwrap();
        assert_eq!(config.api.root, DEVELOPMENT_API_ROOT);

        let file = tmp.path().join("custom.toml");
        std::fs::write(&file, "[api]\nroot = \"https://staging.example\"\n").unwrap();
        let config = Config::load_with_env(
            Some(&file),
            env_from(&[("MOA_SESSION_DATA_DIR", dir.as_str()), ("MOA_SESSION_ENV", "development")]),
        )
        .unwrap();
        assert_eq!(config.api.root, "https://staging.example");
    }

    #[test]
    fn api_root_env_wins() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_string_lossy().to_string();
        let config = Config::load_with_env(
            None,
            env_from(&[
                ("MOA_SESSION_DATA_DIR", dir.as_str()),
                ("MOA_SESSION_ENV", "development"),
                ("MOA_SESSION_API_ROOT", "http://localhost:3001"),
            ]),
        )
        .unwrap();
        assert_eq!(config.api.root, "http://localhost:3001");
    }

    #[test]
    fn empty_root_is_rejected() {
        let config = Config::from_toml("[api]\nroot = \"\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn storage_section_parses() {
        let config =
            Config::from_toml("[storage]\nbackend = \"memory\"\npath = \"/tmp/s.db\"\n").unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.session_db_path(), PathBuf::from("/tmp/s.db"));
    }

    #[test]
    fn unknown_backend_fails_to_parse() {
        assert!(Config::from_toml("[storage]\nbackend = \"redis\"\n").is_err());
    }

    #[test]
    fn open_store_creates_sqlite_file() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = tmp.path().join("nested");

        let store = config.open_store().unwrap();
        assert_eq!(store.name(), "sqlite");
        assert!(tmp.path().join("nested").join("session.db").exists());

        config.storage.backend = StorageBackend::Memory;
        assert_eq!(config.open_store().unwrap().name(), "memory");
    }
}
