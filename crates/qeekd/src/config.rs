//! Configuration management for qeekd.
//!
//! Loads settings from /etc/qeek/config.toml or uses defaults, then lets
//! the environment override the service credentials. A missing completion
//! credential is a supported degraded mode, not a startup failure.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/qeek/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/qeek/config.toml";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the HTTP surface
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Deployment environment name; "production" gates seeding
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_bind_addr() -> String {
    // Loopback only; the UI runs in the same process space
    "127.0.0.1:8787".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            environment: default_environment(),
        }
    }
}

/// Completion-service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Completion model
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-call reply timeout in seconds, applied on every gateway
    /// invocation (first turn and follow-ups alike)
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_secs: u64,

    /// Credential; normally supplied via OPENAI_API_KEY
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_reply_timeout() -> u64 {
    15
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            reply_timeout_secs: default_reply_timeout(),
            api_key: None,
        }
    }
}

/// Persistence/auth backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the table-CRUD + auth service
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Service credential; normally supplied via QEEK_BACKEND_KEY
    #[serde(default)]
    pub service_key: String,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:54321".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            service_key: String::new(),
        }
    }
}

/// Diagnosis trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisConfig {
    /// Message count at which diagnosis fires
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: usize,

    /// Guard against re-diagnosing a question that already has a
    /// diagnosis. Off by default: the literal behavior accumulates one
    /// row per trigger.
    #[serde(default)]
    pub diagnose_once: bool,
}

fn default_trigger_threshold() -> usize {
    3
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: default_trigger_threshold(),
            diagnose_once: false,
        }
    }
}

/// Seeding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Path of the SQL file the seed endpoint executes
    #[serde(default = "default_seed_path")]
    pub data_path: String,

    /// Allow seeding even when environment is "production";
    /// normally supplied via QEEK_ALLOW_SEEDING
    #[serde(default)]
    pub allow_in_production: bool,
}

fn default_seed_path() -> String {
    "data/test-data.sql".to_string()
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            data_path: default_seed_path(),
            allow_in_production: false,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Resource catalog memoization window in seconds
    #[serde(default = "default_resources_ttl")]
    pub resources_ttl_secs: u64,
}

fn default_resources_ttl() -> u64 {
    600 // 10 minutes; the catalog is near-static
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            resources_ttl_secs: default_resources_ttl(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub diagnosis: DiagnosisConfig,

    #[serde(default)]
    pub seed: SeedConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load config from file (or defaults), then apply env overrides.
    pub fn load() -> Self {
        let mut config = Self::load_from_path(CONFIG_PATH)
            .or_else(|_| Self::load_from_path(DEFAULT_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            });
        config.apply_env();
        config
    }

    /// Load config from specific path
    fn load_from_path(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path);
        Ok(config)
    }

    /// Environment overrides for credentials and deployment flags.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("QEEK_BACKEND_URL") {
            if !url.is_empty() {
                self.backend.url = url;
            }
        }
        if let Ok(key) = std::env::var("QEEK_BACKEND_KEY") {
            if !key.is_empty() {
                self.backend.service_key = key;
            }
        }
        if let Ok(env) = std::env::var("QEEK_ENV") {
            if !env.is_empty() {
                self.daemon.environment = env;
            }
        }
        if let Ok(flag) = std::env::var("QEEK_ALLOW_SEEDING") {
            self.seed.allow_in_production = flag == "true";
        }
    }

    /// Whether the seed endpoint may run right now.
    pub fn seeding_allowed(&self) -> bool {
        crate::seed::seeding_allowed(&self.daemon.environment, self.seed.allow_in_production)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.reply_timeout_secs, 15);
        assert_eq!(config.diagnosis.trigger_threshold, 3);
        assert!(!config.diagnosis.diagnose_once);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[llm]
model = "gpt-4o-mini"
reply_timeout_secs = 20

[diagnosis]
diagnose_once = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.reply_timeout_secs, 20);
        assert!(config.diagnosis.diagnose_once);
        // Defaults for missing fields
        assert_eq!(config.diagnosis.trigger_threshold, 3);
        assert_eq!(config.cache.resources_ttl_secs, 600);
    }

    #[test]
    fn test_seeding_gate_follows_environment() {
        let mut config = Config::default();
        assert!(config.seeding_allowed());

        config.daemon.environment = "production".to_string();
        assert!(!config.seeding_allowed());

        config.seed.allow_in_production = true;
        assert!(config.seeding_allowed());
    }
}
