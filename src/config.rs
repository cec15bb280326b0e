use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::constants::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, METRICS_PORT_ENV};
use crate::error::{Result, ScraperError};
use crate::infra::http_client::DEFAULT_USER_AGENT;
use crate::pipeline::dates::MonthFallback;
use crate::pipeline::similarity::{SimilarityPolicy, DEFAULT_THRESHOLD};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scraper: ScraperSettings,
    #[serde(default)]
    pub dedup: DedupSettings,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
}

#[derive(Debug, Deserialize)]
pub struct ScraperSettings {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Sources scraped at the same time. 1 keeps runs sequential.
    #[serde(default = "default_parallel_sources")]
    pub max_parallel_sources: usize,
    #[serde(default = "default_true")]
    pub download_images: bool,
    /// Directory of source JSON files replacing the built-in definitions.
    #[serde(default)]
    pub registry_dir: Option<PathBuf>,
    /// JSON snapshot the in-memory store is loaded from and saved to.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct DedupSettings {
    #[serde(default)]
    pub similarity: SimilarityPolicy,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default)]
    pub unknown_month: MonthFallback,
    #[serde(default)]
    pub dedup_exhibitions: bool,
}

#[derive(Debug, Deserialize)]
pub struct BrowserSettings {
    #[serde(default)]
    pub binary_path: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct MetricsSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_parallel_sources() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_metrics_port() -> u16 {
    9898
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_parallel_sources: default_parallel_sources(),
            download_images: true,
            registry_dir: None,
            store_path: None,
        }
    }
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            similarity: SimilarityPolicy::default(),
            similarity_threshold: DEFAULT_THRESHOLD,
            unknown_month: MonthFallback::default(),
            dedup_exhibitions: false,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            binary_path: None,
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: false, port: default_metrics_port() }
    }
}

impl BrowserSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Loads from `$WHATNEXT_CONFIG`, falling back to `config.toml`.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                ScraperError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
            })?;
            let config: Config = toml::from_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            config
        } else {
            info!("No config file at {}, using defaults", path.display());
            Config::default()
        };

        if let Some(port) = std::env::var(METRICS_PORT_ENV).ok().and_then(|s| s.parse().ok()) {
            config.metrics.port = port;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scraper.max_parallel_sources == 0 {
            return Err(ScraperError::Config("max_parallel_sources must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            return Err(ScraperError::Config(format!(
                "similarity_threshold must be within 0..=1, got {}",
                self.dedup.similarity_threshold
            )));
        }
        Ok(())
    }
}
