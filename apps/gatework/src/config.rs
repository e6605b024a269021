//! # Configuration
//!
//! Optional `gatework.toml` settings. Lookup order for the file:
//!
//! 1. the `--config` flag (must exist)
//! 2. the `GATEWORK_CONFIG` environment variable (must exist)
//! 3. `gatework.toml` in the working directory (skipped if absent)
//!
//! Command-line flags override whatever the file sets.
//!
//! ```toml
//! library_dir = "components"
//! store = "redb"
//! default_format = "json"
//! ```

use clap::ValueEnum;
use gatework_core::storage::{ComponentStore, DirectoryStore, RedbStore};
use gatework_core::GateworkError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV: &str = "GATEWORK_CONFIG";

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "gatework.toml";

/// File name of the redb library inside the library directory.
pub const REDB_FILE: &str = "library.redb";

/// Component library backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// One file per component under the library directory.
    #[default]
    Dir,
    /// A single redb database inside the library directory.
    Redb,
}

/// Scene file encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Binary,
    Json,
}

impl FileFormat {
    /// Format implied by a path's extension, if it names one.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else {
            Some(Self::Binary)
        }
    }
}

/// Resolved settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub library_dir: PathBuf,
    pub store: StoreKind,
    pub default_format: FileFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library_dir: PathBuf::from("gatework-library"),
            store: StoreKind::Dir,
            default_format: FileFormat::Binary,
        }
    }
}

impl Config {
    /// Parse a config file's contents.
    pub fn from_toml(text: &str) -> Result<Self, GateworkError> {
        toml::from_str(text).map_err(|e| GateworkError::DeserializationError(e.to_string()))
    }

    /// Read a config file. The file must exist.
    pub fn from_file(path: &Path) -> Result<Self, GateworkError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GateworkError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text).map_err(|e| match e {
            GateworkError::DeserializationError(msg) => {
                GateworkError::DeserializationError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Load settings following the lookup order in the module docs.
    pub fn load(explicit: Option<&Path>) -> Result<Self, GateworkError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            tracing::debug!("using {}", local.display());
            return Self::from_file(local);
        }
        Ok(Self::default())
    }

    /// Open the configured component store.
    pub fn open_store(&self) -> Result<Box<dyn ComponentStore>, GateworkError> {
        match self.store {
            StoreKind::Dir => Ok(Box::new(DirectoryStore::new(&self.library_dir))),
            StoreKind::Redb => {
                std::fs::create_dir_all(&self.library_dir).map_err(|e| {
                    GateworkError::IoError(format!("{}: {}", self.library_dir.display(), e))
                })?;
                Ok(Box::new(RedbStore::open(self.library_dir.join(REDB_FILE))?))
            }
        }
    }
}
