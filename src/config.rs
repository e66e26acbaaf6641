use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub openai: OpenAiConfig,

    pub search: SearchConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/sourcerr.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 7878,
            cors_allowed_origins: vec![
                "http://localhost:7878".to_string(),
                "http://127.0.0.1:7878".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Overridden by OPENAI_API_KEY when set in the environment.
    pub api_key: String,

    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Which provider executes queries: "google" or "serper".
    pub backend: String,

    /// Overridden by GOOGLE_API_KEY when set in the environment.
    pub google_api_key: String,

    pub google_cse_id: String,

    /// Overridden by SERPER_API_KEY when set in the environment.
    pub serper_api_key: String,

    /// Cap on results stored per run (the provider may cap lower).
    pub max_results: u32,

    /// Attempts per provider page before the run truncates.
    pub retry_attempts: u32,

    /// Base backoff between page retries; doubles per attempt.
    pub retry_backoff_ms: u64,

    /// Timeout applied to every collaborator HTTP call.
    pub request_timeout_seconds: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: "google".to_string(),
            google_api_key: String::new(),
            google_cse_id: String::new(),
            serper_api_key: String::new(),
            max_results: 100,
            retry_attempts: 3,
            retry_backoff_ms: 500,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            openai: OpenAiConfig::default(),
            search: SearchConfig::default(),
            observability: ObservabilityConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default().with_env_overrides())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config.with_env_overrides())
    }

    /// Secrets may come from the environment (or a .env file) instead of
    /// living in config.toml.
    #[must_use]
    fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.openai.api_key = key;
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            self.search.google_api_key = key;
        }
        if let Ok(id) = std::env::var("GOOGLE_CSE_ID") {
            self.search.google_cse_id = id;
        }
        if let Ok(key) = std::env::var("SERPER_API_KEY") {
            self.search.serper_api_key = key;
        }

        self
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("sourcerr").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".sourcerr").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<()> {
        let path = Self::default_config_path();
        if path.exists() {
            info!("Config file already exists: {}", path.display());
            return Ok(());
        }

        Self::default().save_to_path(&path)
    }

    /// Startup checks for anything that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        match self.search.backend.as_str() {
            "google" => {
                if self.search.google_api_key.is_empty() || self.search.google_cse_id.is_empty() {
                    anyhow::bail!(
                        "Google backend selected but google_api_key/google_cse_id are not set \
                         (config [search] or GOOGLE_API_KEY/GOOGLE_CSE_ID)"
                    );
                }
            }
            "serper" => {
                if self.search.serper_api_key.is_empty() {
                    anyhow::bail!(
                        "Serper backend selected but serper_api_key is not set \
                         (config [search] or SERPER_API_KEY)"
                    );
                }
            }
            other => anyhow::bail!("Unknown search backend '{other}' (expected google or serper)"),
        }

        if self.openai.api_key.is_empty() {
            anyhow::bail!(
                "OpenAI API key is not set (config [openai] or OPENAI_API_KEY)"
            );
        }

        if self.search.max_results == 0 {
            anyhow::bail!("[search].max_results must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pick_google_backend() {
        let config = Config::default();
        assert_eq!(config.search.backend, "google");
        assert_eq!(config.search.max_results, 100);
        assert_eq!(config.general.database_path, "sqlite:data/sourcerr.db");
    }

    #[test]
    fn validate_rejects_missing_keys() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.backend = "bing".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_complete_serper_setup() {
        let mut config = Config::default();
        config.search.backend = "serper".to_string();
        config.search.serper_api_key = "key".to_string();
        config.openai.api_key = "key".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.search.backend, config.search.backend);
    }
}
