use crate::config::types::{
    CacheConfig, Config, ExtractionConfig, LlmConfig, StoreConfig, TransformConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_cache_config(&config.cache)?;
    validate_extraction_config(&config.extraction)?;
    validate_transform_config(&config.transform)?;
    validate_llm_config(&config.llm)?;
    validate_store_config(&config.store)?;
    Ok(())
}

/// Validates cache engine configuration
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "cache database_path cannot be empty".to_string(),
        ));
    }

    if config.max_item_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_item_bytes must be > 0".to_string(),
        ));
    }

    if config.gzip_threshold_bytes > config.max_item_bytes {
        return Err(ConfigError::Validation(format!(
            "gzip_threshold_bytes ({}) cannot exceed max_item_bytes ({})",
            config.gzip_threshold_bytes, config.max_item_bytes
        )));
    }

    if config.cleanup_interval_seconds == 0 {
        return Err(ConfigError::Validation(
            "cleanup_interval_seconds must be >= 1".to_string(),
        ));
    }

    if config.cleanup_batch_size == 0 {
        return Err(ConfigError::Validation(
            "cleanup_batch_size must be >= 1".to_string(),
        ));
    }

    validate_namespace(&config.page_namespace)?;

    Ok(())
}

/// Validates orchestrator thresholds
fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    if config.max_chunk_size == 0 {
        return Err(ConfigError::Validation(
            "max_chunk_size must be >= 1".to_string(),
        ));
    }

    if config.apply_failed_threshold == 0 {
        return Err(ConfigError::Validation(
            "apply_failed_threshold must be >= 1".to_string(),
        ));
    }

    if config.worker_threads < 1 || config.worker_threads > 64 {
        return Err(ConfigError::Validation(format!(
            "worker_threads must be between 1 and 64, got {}",
            config.worker_threads
        )));
    }

    for host in &config.exclude_external_hosts {
        validate_domain_pattern(host)?;
    }

    Ok(())
}

/// Validates transformer configuration
fn validate_transform_config(config: &TransformConfig) -> Result<(), ConfigError> {
    if !(config.density_threshold > 0.0 && config.density_threshold.is_finite()) {
        return Err(ConfigError::Validation(format!(
            "density_threshold must be a positive number, got {}",
            config.density_threshold
        )));
    }

    for domain in &config.social_media_domains {
        validate_domain_pattern(domain)?;
    }

    Ok(())
}

/// Validates LLM endpoint configuration
fn validate_llm_config(config: &LlmConfig) -> Result<(), ConfigError> {
    Url::parse(&config.api_base)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api_base: {}", e)))?;

    if config.concurrency < 1 || config.concurrency > 256 {
        return Err(ConfigError::Validation(format!(
            "llm concurrency must be between 1 and 256, got {}",
            config.concurrency
        )));
    }

    if config.max_retries == 0 {
        return Err(ConfigError::Validation(
            "max_retries must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_seconds == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_seconds must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates info store configuration
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "store database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Namespaces are free-form but must be non-empty and whitespace-free
fn validate_namespace(namespace: &str) -> Result<(), ConfigError> {
    if namespace.is_empty() || namespace.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "Invalid cache namespace: '{}'",
            namespace
        )));
    }
    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}
