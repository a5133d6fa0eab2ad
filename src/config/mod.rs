//! Configuration management
//!
//! Settings come from four layers, highest priority first: command-line
//! flags, `RECALL_*` environment variables, `~/.recall/config.yaml`, and
//! built-in defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the database path.
pub const ENV_DB: &str = "RECALL_DB";

/// Environment variable overriding the session id.
pub const ENV_SESSION_ID: &str = "RECALL_SESSION_ID";

/// Environment variable overriding the project path.
pub const ENV_PROJECT_PATH: &str = "RECALL_PROJECT_PATH";

/// Contents of the YAML config file. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite knowledge store
    pub db_path: Option<PathBuf>,

    /// Fixed session id for feedback and flight recorder entries
    pub session_id: Option<String>,

    /// Project path stamped on project-scoped items
    pub project_path: Option<String>,

    /// Write logs here instead of stderr
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Loads the config file.
    ///
    /// An explicitly given path must exist. The default path is optional and
    /// yields an empty config when absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path()?, false),
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parses config from YAML text. Blank text is an empty config.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_saphyr::from_str(content).map_err(|e| anyhow::anyhow!("Invalid YAML: {e}"))
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
            .join(".recall");

        Ok(config_dir.join("config.yaml"))
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub db_path: Option<PathBuf>,
    pub session_id: Option<String>,
    pub project_path: Option<String>,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub session_id: String,
    pub project_path: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    /// Resolves settings against the process environment.
    pub fn resolve(overrides: Overrides, config: Config) -> Result<Self> {
        Self::resolve_with(overrides, config, |key| std::env::var(key).ok())
    }

    /// Resolves settings with a caller-supplied environment lookup.
    ///
    /// Empty environment values count as unset.
    pub fn resolve_with<F>(overrides: Overrides, config: Config, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let db_path = match overrides
            .db_path
            .or_else(|| env(ENV_DB).map(PathBuf::from))
            .or(config.db_path)
        {
            Some(path) => path,
            None => crate::storage::db::default_db_path()?,
        };

        let session_id = overrides
            .session_id
            .or_else(|| env(ENV_SESSION_ID))
            .or(config.session_id)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let project_path = overrides
            .project_path
            .or_else(|| env(ENV_PROJECT_PATH))
            .or(config.project_path);

        Ok(Self {
            db_path,
            session_id,
            project_path,
            log_file: config.log_file,
        })
    }
}
