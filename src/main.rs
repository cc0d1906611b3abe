//! focusmine main entry point
//!
//! Command-line interface for transforming pages, running focus extraction
//! and inspecting the cache and info store.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use focusmine::cache::CacheEngine;
use focusmine::config::{load_config_with_hash, Config};
use focusmine::extract::{ExtractMode, FocusPoint, Orchestrator, Services};
use focusmine::llm::{LlmClient, OpenAiClient, VisionDescriber};
use focusmine::markdown::{ImageDescriber, NoDescriber, Transformer};
use focusmine::store::{FocusSource, SqliteStore};
use focusmine::Article;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

/// focusmine: focus-driven web content mining
///
/// Converts crawled pages into citation-tagged markdown and asks an LLM to
/// extract information matching each configured focus point.
#[derive(Parser, Debug)]
#[command(name = "focusmine")]
#[command(version = "1.0.0")]
#[command(about = "Focus-driven web content mining", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an HTML file into citation markdown and print the article as JSON
    Transform {
        /// Raw page HTML
        html: PathBuf,

        /// URL the page was fetched from
        #[arg(long = "base-url")]
        url: String,

        /// Boilerplate-reduced HTML, preferred when given
        #[arg(long)]
        cleaned: Option<PathBuf>,
    },

    /// Run extraction for one page against activated focus points
    Extract {
        /// Raw page HTML
        html: PathBuf,

        /// URL the page was fetched from
        #[arg(long = "base-url")]
        url: String,

        /// Only run this focus point
        #[arg(long)]
        focus: Option<String>,

        /// only_link, only_info or both
        #[arg(long, default_value = "both")]
        mode: ExtractMode,
    },

    /// Manage focus points
    Focus {
        #[command(subcommand)]
        action: FocusAction,
    },

    /// Print the infos stored for a focus point as JSON
    Infos {
        focus_id: String,
    },

    /// Inspect the TTL cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum FocusAction {
    /// List every focus point
    List,
    /// Insert or replace focus points from a JSON array file
    Import { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Entry counts and stored bytes
    Stats,
    /// Live keys of a namespace matching a glob pattern
    Keys {
        namespace: String,
        #[arg(default_value = "*")]
        pattern: String,
    },
    /// Remaining lifetime of an entry in minutes
    Ttl { namespace: String, key: String },
    /// Print an entry
    Get { namespace: String, key: String },
    /// Delete an entry
    Delete { namespace: String, key: String },
    /// Remove expired entries now
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    match cli.command {
        Command::Transform { html, url, cleaned } => {
            handle_transform(&config, &html, &url, cleaned.as_deref()).await
        }
        Command::Extract {
            html,
            url,
            focus,
            mode,
        } => handle_extract(config, &html, url, focus, mode).await,
        Command::Focus { action } => handle_focus(&config, action).await,
        Command::Infos { focus_id } => handle_infos(&config, &focus_id).await,
        Command::Cache { action } => handle_cache(&config, action).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("focusmine=info,warn"),
            1 => EnvFilter::new("focusmine=debug,info"),
            2 => EnvFilter::new("focusmine=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_transformer(config: &Config, llm: Option<Arc<dyn LlmClient>>) -> Transformer {
    let describer: Arc<dyn ImageDescriber> = match llm {
        Some(llm) if !config.llm.vision_model.is_empty() => {
            Arc::new(VisionDescriber::new(llm, config.llm.vision_model.clone()))
        }
        _ => Arc::new(NoDescriber),
    };
    Transformer::new(&config.transform, describer)
}

fn build_llm(config: &Config) -> anyhow::Result<Arc<dyn LlmClient>> {
    let client = OpenAiClient::from_config(&config.llm)?;
    Ok(Arc::new(client))
}

async fn read_article(html: &Path, url: String) -> anyhow::Result<Article> {
    let content = tokio::fs::read_to_string(html)
        .await
        .with_context(|| format!("cannot read {}", html.display()))?;
    Ok(Article::new(url, content))
}

/// Handles `transform`: prints the transformed article
async fn handle_transform(
    config: &Config,
    html: &Path,
    url: &str,
    cleaned: Option<&Path>,
) -> anyhow::Result<()> {
    let mut article = read_article(html, url.to_string()).await?;
    if let Some(cleaned) = cleaned {
        article.cleaned_html = tokio::fs::read_to_string(cleaned)
            .await
            .with_context(|| format!("cannot read {}", cleaned.display()))?;
    }

    let llm = if config.llm.vision_model.is_empty() {
        None
    } else {
        Some(build_llm(config)?)
    };
    let transformer = build_transformer(config, llm);
    let output = transformer
        .transform(&article.html, &article.cleaned_html, &article.url, &article.metadata)
        .await;

    if let Some(err) = &output.error {
        bail!("transform failed: {}", err);
    }

    let article = article.with_transform(output);
    println!("{}", serde_json::to_string_pretty(&article)?);
    Ok(())
}

/// Handles `extract`: runs every selected focus point on one page
async fn handle_extract(
    config: Config,
    html: &Path,
    url: String,
    focus: Option<String>,
    mode: ExtractMode,
) -> anyhow::Result<()> {
    let article = read_article(html, url).await?;

    let store = Arc::new(SqliteStore::open(Path::new(&config.store.database_path))?);
    let focuses: Vec<FocusPoint> = match focus {
        Some(id) => vec![store.get_focus_point(&id).await?],
        None => store.load_activated_focus_points().await?,
    };
    if focuses.is_empty() {
        bail!("no activated focus points in {}", config.store.database_path);
    }

    let cache = Arc::new(CacheEngine::new(&config.cache));
    cache.open().await?;
    let llm = build_llm(&config)?;
    let transformer = Arc::new(build_transformer(&config, Some(llm.clone())));
    let services = Services::new(
        cache.clone(),
        llm,
        store,
        transformer,
        &config.extraction,
    );

    tracing::info!(
        "Extracting {} for {} focus point(s) ({:?})",
        article.url,
        focuses.len(),
        mode
    );

    let mut tasks = JoinSet::new();
    for focus in focuses {
        let orchestrator = match Orchestrator::new(focus, services.clone(), &config) {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                tracing::error!("Skipping focus: {}", e);
                continue;
            }
        };
        let article = article.clone();
        tasks.spawn(async move {
            let id = orchestrator.focus().id.clone();
            (id, orchestrator.run(&article, mode).await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (focus_id, result) = joined?;
        match result {
            Ok((count, links)) => {
                println!("focus {}: {} info(s), {} link(s)", focus_id, count, links.len());
                for link in links {
                    println!("  {}", link);
                }
            }
            Err(e) => tracing::error!("Focus {} failed: {}", focus_id, e),
        }
    }

    cache.close().await?;
    Ok(())
}

async fn handle_focus(config: &Config, action: FocusAction) -> anyhow::Result<()> {
    let store = SqliteStore::open(Path::new(&config.store.database_path))?;

    match action {
        FocusAction::List => {
            let focuses = store.list_focus_points().await?;
            println!("Focus points ({}):", focuses.len());
            for focus in &focuses {
                let state = if focus.activated { "active" } else { "inactive" };
                println!("  - {} [{}] {}", focus.id, state, focus.statement());
                if !focus.custom_schema.is_empty() {
                    println!("    schema: {}", focus.custom_schema);
                }
            }
        }
        FocusAction::Import { file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("cannot read {}", file.display()))?;
            let focuses: Vec<FocusPoint> = serde_json::from_str(&content)?;
            for focus in &focuses {
                store.upsert_focus_point(focus).await?;
            }
            println!("✓ Imported {} focus point(s)", focuses.len());
        }
    }
    Ok(())
}

async fn handle_infos(config: &Config, focus_id: &str) -> anyhow::Result<()> {
    let store = SqliteStore::open(Path::new(&config.store.database_path))?;
    let infos = store.infos_for_focus(focus_id).await?;
    println!("{}", serde_json::to_string_pretty(&infos)?);
    Ok(())
}

async fn handle_cache(config: &Config, action: CacheAction) -> anyhow::Result<()> {
    let cache = CacheEngine::new(&config.cache);
    cache.open().await?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats().await?;
            println!("Cache: {}\n", config.cache.database_path);
            println!("  Entries: {}", stats.entries);
            println!("  Expired: {}", stats.expired_entries);
            println!("  Compressed: {}", stats.compressed_entries);
            println!("  Stored bytes: {}", stats.total_bytes);
        }
        CacheAction::Keys { namespace, pattern } => {
            for key in cache.keys(&pattern, &namespace).await? {
                println!("{}", key);
            }
        }
        CacheAction::Ttl { namespace, key } => match cache.ttl(&key, &namespace).await? {
            -1 => println!("absent"),
            0 => println!("never expires"),
            minutes => println!("{} minute(s)", minutes),
        },
        CacheAction::Get { namespace, key } => match cache.get(&key, &namespace).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("absent"),
        },
        CacheAction::Delete { namespace, key } => {
            let removed = cache.delete(&key, &namespace).await?;
            println!("{}", if removed { "deleted" } else { "absent" });
        }
        CacheAction::Sweep => {
            let removed = cache.sweep().await?;
            println!("✓ Removed {} expired entries", removed);
        }
    }

    cache.close().await?;
    Ok(())
}
