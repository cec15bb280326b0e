use std::time::Duration;
use thiserror::Error;

use crate::pipeline::dates::DateParseError;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Date parse failed: {0}")]
    Parse(#[from] DateParseError),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Source unavailable: {0}")]
    UnavailableSource(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Unknown event type for source {source_id}: {event_type}")]
    UnknownEventType { source_id: String, event_type: String },

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, ScraperError>;
