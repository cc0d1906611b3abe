//! focusmine: focus-driven web content mining
//!
//! This crate turns crawled pages into structured information for a set of
//! user-defined focus points. Pages are converted into citation-tagged
//! markdown, chunked, deduplicated per focus through a TTL cache, sent to an
//! LLM and the validated results are persisted.

pub mod article;
pub mod cache;
pub mod config;
pub mod extract;
pub mod llm;
pub mod markdown;
pub mod store;
pub mod url;

use thiserror::Error;

/// Main error type for focusmine operations
#[derive(Debug, Error)]
pub enum MineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] llm::LlmError),

    #[error("Extraction error: {0}")]
    Extract(#[from] extract::ExtractError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for focusmine operations
pub type Result<T> = std::result::Result<T, MineError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use article::Article;
pub use cache::CacheEngine;
pub use config::Config;
pub use extract::{ExtractMode, FocusPoint, Orchestrator};
pub use markdown::{LinkTable, Transformer};
