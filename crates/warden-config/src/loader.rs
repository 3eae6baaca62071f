use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::WardenConfig;
use warden_core::WardenError;

/// Loads the Warden configuration and remembers where it came from.
pub struct ConfigLoader {
    config: WardenConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env > ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        Self::home_dir().join("warden.toml")
    }

    /// `~/.warden`, or the current directory when no home is known.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> warden_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw).map_err(|e| {
                WardenError::Config(format!("failed to parse {}: {}", config_path.display(), e))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Validate config: log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(WardenError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Parse a TOML document into a config without touching the environment.
    pub fn parse(raw: &str) -> Result<WardenConfig, toml::de::Error> {
        toml::from_str::<WardenConfig>(raw)
    }

    /// Get a copy of the loaded config.
    pub fn get(&self) -> WardenConfig {
        self.config.clone()
    }

    /// Path the config was (or would have been) loaded from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (WARDEN_DB_PATH, WARDEN_LOG_LEVEL, etc.)
    pub fn apply_env_overrides(mut config: WardenConfig) -> WardenConfig {
        if let Ok(v) = std::env::var("WARDEN_DB_PATH") {
            config.store.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("WARDEN_EXEC_TIMEOUT") {
            if let Ok(secs) = v.parse::<u64>() {
                config.execution.timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("WARDEN_AUTO_APPROVE_GRACE") {
            if let Ok(minutes) = v.parse::<u64>() {
                config.ledger.auto_approve_grace_minutes = minutes;
            }
        }
        config
    }
}
