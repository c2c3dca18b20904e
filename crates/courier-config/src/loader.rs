use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::{CourierConfig, OracleProvider};

/// Loads the Courier configuration once at startup.
pub struct ConfigLoader {
    config: CourierConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > COURIER_CONFIG env > ~/.courier/courier.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("COURIER_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".courier")
            .join("courier.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> courier_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            CourierConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(courier_core::CourierError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    fn parse(raw: &str, path: &Path) -> courier_core::Result<CourierConfig> {
        toml::from_str::<CourierConfig>(raw).map_err(|e| {
            courier_core::CourierError::Config(format!(
                "failed to parse {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Get a copy of the loaded config.
    pub fn get(&self) -> CourierConfig {
        self.config.clone()
    }

    /// Path the config was read from (or would have been).
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (COURIER_RPC_URL, COURIER_LOG_LEVEL, etc.)
    pub(crate) fn apply_env_overrides(mut config: CourierConfig) -> CourierConfig {
        if let Ok(v) = std::env::var("COURIER_RPC_URL") {
            config.network.rpc_url = v;
        }
        if let Ok(v) = std::env::var("COURIER_MESSAGING_URL") {
            config.network.messaging_url = v;
        }
        if let Ok(v) = std::env::var("COURIER_PACKAGE_ID") {
            config.network.package_id = v;
        }
        if let Ok(v) = std::env::var("COURIER_POLL_INTERVAL_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.polling.interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("COURIER_LOG_LEVEL") {
            config.logging.level = v;
        }
        // Secrets: the config file takes priority, env is the fallback.
        if config.agent.private_key.is_none() {
            if let Ok(v) = std::env::var("COURIER_PRIVATE_KEY") {
                config.agent.private_key = Some(v);
            }
        }
        if config.oracle.api_key.is_none() {
            let var = match config.oracle.provider {
                OracleProvider::OpenAi => "OPENAI_API_KEY",
                OracleProvider::Anthropic => "ANTHROPIC_API_KEY",
            };
            if let Ok(v) = std::env::var(var) {
                config.oracle.api_key = Some(v);
            }
        }
        config
    }
}
