use crate::constants::{
    DEFAULT_DATABASE_PATH, DEFAULT_LOG_DIR, DEFAULT_PORT, DEFAULT_USER_AGENT, SHOWSTART_BASE_URL,
    SHOWSTART_CITY_CODE,
};
use crate::error::{CrawlerError, Result};
use crate::provenance::{SourcePolicy, SourceRule};
use serde::Deserialize;
use std::{env, fs, path::Path};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub crawler: CrawlerConfig,
    pub logging: LoggingConfig,
    /// Ordered source priority rules; lower rank wins conflicts
    pub sources: Vec<SourceRule>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub base_url: String,
    pub city_code: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// When set, every fetched search page is written here as `debug_{artist}.html`
    pub debug_dump_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            crawler: CrawlerConfig::default(),
            logging: LoggingConfig::default(),
            sources: SourcePolicy::default().rules().to_vec(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: SHOWSTART_BASE_URL.to_string(),
            city_code: SHOWSTART_CITY_CODE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_seconds: 30,
            debug_dump_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: DEFAULT_LOG_DIR.to_string(),
        }
    }
}

impl Config {
    /// Read `config.toml` (or `$CONFIG_PATH`) if present, then apply environment overrides.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        let mut config = if Path::new(&config_path).exists() {
            let content = fs::read_to_string(&config_path).map_err(|e| {
                CrawlerError::Config(format!("Failed to read config file '{}': {}", config_path, e))
            })?;
            info!("Loaded configuration from {}", config_path);
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| CrawlerError::Config(format!("PORT is not a valid port: {port}")))?;
        }
        if let Ok(path) = env::var("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Ok(dir) = env::var("LOG_DIR") {
            self.logging.dir = dir;
        }
        if let Ok(url) = env::var("SHOWSTART_BASE_URL") {
            self.crawler.base_url = url;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if let Some(rule) = self.sources.iter().find(|r| r.domain.trim().is_empty()) {
            return Err(CrawlerError::Config(format!(
                "source '{}' has an empty domain",
                rule.name
            )));
        }
        Ok(())
    }

    pub fn source_policy(&self) -> SourcePolicy {
        SourcePolicy::new(self.sources.clone())
    }
}
