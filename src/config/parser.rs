use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// Every section is optional; missing keys fall back to their defaults.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use focusmine::config::load_config;
///
/// let config = load_config(Path::new("focusmine.toml")).unwrap();
/// println!("Chunk size: {}", config.extraction.max_chunk_size);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs can be correlated with the settings they used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[cache]
database-path = "./cache.sqlite"
gzip-threshold-bytes = 1024
page-namespace = "articles"

[extraction]
max-chunk-size = 4000
apply-failed-threshold = 6
exclude-external-hosts = ["mp.weixin.qq.com", "*.example.org"]

[transform]
density-threshold = 0.02

[llm]
api-base = "http://localhost:8000/v1"
performance-model = "big-model"
selected-model = "small-model"
concurrency = 4
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.cache.gzip_threshold_bytes, 1024);
        assert_eq!(config.cache.page_namespace, "articles");
        assert_eq!(config.cache.max_item_bytes, 10 * 1024 * 1024);
        assert_eq!(config.extraction.max_chunk_size, 4000);
        assert_eq!(config.extraction.apply_failed_threshold, 6);
        assert_eq!(config.extraction.exclude_external_hosts.len(), 2);
        assert_eq!(config.transform.density_threshold, 0.02);
        assert_eq!(config.llm.concurrency, 4);
        assert_eq!(config.llm.selected_model, "small-model");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.extraction.apply_failed_threshold, 12);
        assert_eq!(config.extraction.settled_link_cutoff, 5);
        assert_eq!(config.extraction.article_cache_minutes, 5);
        assert_eq!(config.transform.density_threshold, 0.016);
        assert!(config
            .transform
            .social_media_domains
            .contains(&"weibo.com".to_string()));
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/focusmine.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[extraction]
max-chunk-size = 0
"#;
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
