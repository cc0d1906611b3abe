//! Configuration module for focusmine
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every heuristic constant of the pipeline (density threshold, failure threshold,
//! cache lifetimes, settled-page cutoff) lives here so it can be overridden.
//!
//! # Example
//!
//! ```no_run
//! use focusmine::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("focusmine.toml")).unwrap();
//! println!("Failure threshold: {}", config.extraction.apply_failed_threshold);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    CacheConfig, Config, ExtractionConfig, LlmConfig, StoreConfig, TransformConfig,
    DEFAULT_SOCIAL_MEDIA_DOMAINS,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
