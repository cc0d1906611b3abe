use serde::Deserialize;

/// Social media hosts whose links are inlined as raw text instead of cited
pub const DEFAULT_SOCIAL_MEDIA_DOMAINS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "instagram.com",
    "pinterest.com",
    "tiktok.com",
    "snapchat.com",
    "reddit.com",
    "weibo.com",
    "m.weibo.cn",
    "m.weibo.com",
    "service.weibo.com",
    "zhihu.com",
    "zhuanlan.zhihu.com",
    "douyin.com",
    "bilibili.com",
    "xiaohongshu.com",
    "kuaishou.com",
];

/// Main configuration structure for focusmine
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// TTL cache engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path to the SQLite cache file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Serialized payloads at or above this size are gzip-compressed
    #[serde(rename = "gzip-threshold-bytes")]
    pub gzip_threshold_bytes: usize,

    /// Payloads still above this size after compression are rejected
    #[serde(rename = "max-item-bytes")]
    pub max_item_bytes: usize,

    /// SQLite busy timeout (milliseconds)
    #[serde(rename = "busy-timeout-ms")]
    pub busy_timeout_ms: u64,

    /// Interval between background sweeps (seconds)
    #[serde(rename = "cleanup-interval-seconds")]
    pub cleanup_interval_seconds: u64,

    /// Maximum rows deleted per sweep batch
    #[serde(rename = "cleanup-batch-size")]
    pub cleanup_batch_size: u32,

    /// Namespace used for page-level (article) caching
    #[serde(rename = "page-namespace")]
    pub page_namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_path: "./focusmine_cache.sqlite".to_string(),
            gzip_threshold_bytes: 32 * 1024,
            max_item_bytes: 10 * 1024 * 1024,
            busy_timeout_ms: 3000,
            cleanup_interval_seconds: 60,
            cleanup_batch_size: 1000,
            page_namespace: "pages".to_string(),
        }
    }
}

/// Extraction orchestrator tuning knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Maximum characters per chunk handed to the model
    #[serde(rename = "max-chunk-size")]
    pub max_chunk_size: usize,

    /// Chunks whose whitespace-free text is at most this long are skipped
    #[serde(rename = "min-chunk-chars")]
    pub min_chunk_chars: usize,

    /// Failed chunks tolerated per focus before the focus is exhausted
    #[serde(rename = "apply-failed-threshold")]
    pub apply_failed_threshold: usize,

    /// Short TTL for freshly transformed articles (minutes)
    #[serde(rename = "article-cache-minutes")]
    pub article_cache_minutes: u64,

    /// A page with fewer discovered links than this (and some info) is "settled"
    #[serde(rename = "settled-link-cutoff")]
    pub settled_link_cutoff: usize,

    /// Page cache retention for settled article pages (days)
    #[serde(rename = "web-article-ttl-days")]
    pub web_article_ttl_days: u64,

    /// Whether the exclude-external-links host policy applies
    #[serde(rename = "exclude-external-links")]
    pub exclude_external_links: bool,

    /// Hosts (wildcards allowed) whose pages never yield link discovery
    #[serde(rename = "exclude-external-hosts")]
    pub exclude_external_hosts: Vec<String>,

    /// Size of the blocking worker pool (hashing, schema parsing)
    #[serde(rename = "worker-threads")]
    pub worker_threads: usize,

    /// Log full prompts and responses at debug level
    pub verbose: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 6000,
            min_chunk_chars: 16,
            apply_failed_threshold: 12,
            article_cache_minutes: 5,
            settled_link_cutoff: 5,
            web_article_ttl_days: 15,
            exclude_external_links: true,
            exclude_external_hosts: vec!["mp.weixin.qq.com".to_string()],
            worker_threads: 4,
            verbose: false,
        }
    }
}

/// Markdown citation transformer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Link density below which a section counts as prose.
    ///
    /// Tuned on a handful of news and blog layouts; treat as unproven for
    /// other markup styles.
    #[serde(rename = "density-threshold")]
    pub density_threshold: f64,

    /// Hosts whose links are inlined as raw URLs rather than cited
    #[serde(rename = "social-media-domains")]
    pub social_media_domains: Vec<String>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            density_threshold: 0.016,
            social_media_domains: DEFAULT_SOCIAL_MEDIA_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

/// LLM endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL
    #[serde(rename = "api-base")]
    pub api_base: String,

    /// Name of the environment variable holding the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Model for link discovery and schema extraction
    #[serde(rename = "performance-model")]
    pub performance_model: String,

    /// Model for free-text info extraction
    #[serde(rename = "selected-model")]
    pub selected_model: String,

    /// Vision model for image description; empty disables it
    #[serde(rename = "vision-model")]
    pub vision_model: String,

    /// Process-wide cap on concurrent LLM requests
    pub concurrency: usize,

    /// Attempts per request before giving up
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First backoff delay, doubled after every failed attempt (seconds)
    #[serde(rename = "initial-backoff-seconds")]
    pub initial_backoff_seconds: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
            performance_model: String::new(),
            selected_model: String::new(),
            vision_model: String::new(),
            concurrency: 1,
            max_retries: 3,
            initial_backoff_seconds: 20,
            request_timeout_seconds: 120,
        }
    }
}

/// Info/focus-point database configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database holding focus points and infos
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "./focusmine.sqlite".to_string(),
        }
    }
}
