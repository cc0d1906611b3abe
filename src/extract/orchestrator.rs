//! Per-focus extraction runs

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Local;
use indexmap::IndexSet;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::chunk::{Chunker, MaxLengthChunker};
use super::coerce::{coerce_record, FieldType};
use super::focus::{parse_custom_schema, FieldSchema, FocusPoint};
use super::parse::{
    content_hash, extract_tag, parse_schema_block, process_info_blocks, resolve_links,
    InfoSource, ResponseTag,
};
use super::pool::WorkerPool;
use super::prompts::PromptSet;
use super::{ExtractError, ExtractMode};
use crate::article::Article;
use crate::cache::{CacheEngine, EMPTY_SENTINEL};
use crate::config::{Config, ExtractionConfig};
use crate::llm::{ChatMessage, LlmClient};
use crate::markdown::Transformer;
use crate::store::{ExtractedInfo, InfoKind, InfoStore};
use crate::url::url_host_matches;

const TEMPERATURE: f32 = 0.1;

/// Shared collaborators, built once per process and handed to every orchestrator
#[derive(Clone)]
pub struct Services {
    pub cache: Arc<CacheEngine>,
    pub llm: Arc<dyn LlmClient>,
    pub store: Arc<dyn InfoStore>,
    pub transformer: Arc<Transformer>,
    pub chunker: Arc<dyn Chunker>,
    pub pool: WorkerPool,
}

impl Services {
    /// Bundles the collaborators with a chunker and worker pool sized from `config`
    pub fn new(
        cache: Arc<CacheEngine>,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn InfoStore>,
        transformer: Arc<Transformer>,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            cache,
            llm,
            store,
            transformer,
            chunker: Arc::new(MaxLengthChunker::new(config.max_chunk_size)),
            pool: WorkerPool::new(config.worker_threads),
        }
    }
}

/// What one chunk contributed
#[derive(Debug, Default)]
struct ChunkYield {
    infos: Vec<ExtractedInfo>,
    link_blocks: Vec<String>,
}

/// Which sections a prompt asks the model for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Links,
    Info,
    InfoAndLinks,
    Json,
}

/// Runs extraction for one focus point
///
/// Failure counters are cumulative over the orchestrator's lifetime, so one
/// instance should be used per focus per crawl cycle.
pub struct Orchestrator {
    focus: FocusPoint,
    schema: FieldSchema,
    prompts: PromptSet,
    statement: String,
    services: Services,
    extraction: ExtractionConfig,
    page_namespace: String,
    performance_model: String,
    selected_model: String,
    apply_count: AtomicUsize,
    apply_failed: AtomicUsize,
}

impl Orchestrator {
    /// Prepares a focus point for extraction
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to run
    /// * `Err(ExtractError::SchemaConfig)` - The focus declares a custom schema with no usable field
    pub fn new(focus: FocusPoint, services: Services, config: &Config) -> Result<Self, ExtractError> {
        let schema = parse_custom_schema(&focus.custom_schema).map_err(|e| {
            error!("Focus {} cannot run: {}", focus.id, e);
            e
        })?;
        let prompts = PromptSet::for_focus(&focus, &schema);

        Ok(Self {
            statement: focus.statement(),
            focus,
            schema,
            prompts,
            services,
            extraction: config.extraction.clone(),
            page_namespace: config.cache.page_namespace.clone(),
            performance_model: config.llm.performance_model.clone(),
            selected_model: config.llm.selected_model.clone(),
            apply_count: AtomicUsize::new(0),
            apply_failed: AtomicUsize::new(0),
        })
    }

    pub fn focus(&self) -> &FocusPoint {
        &self.focus
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Chunks sent to the model so far
    pub fn apply_count(&self) -> usize {
        self.apply_count.load(Ordering::SeqCst)
    }

    /// Chunks that yielded nothing so far
    pub fn apply_failed(&self) -> usize {
        self.apply_failed.load(Ordering::SeqCst)
    }

    /// Cache namespace holding this focus's dedup markers
    pub fn dedup_namespace(&self) -> String {
        format!("focus_{}", self.focus.id)
    }

    /// Extracts infos and links from one article
    ///
    /// Chunks are processed one after another in document order. Chunks that
    /// fail are counted; once `apply-failed-threshold` failures accumulate
    /// the run stops with [`ExtractError::FocusExhausted`]. Infos from chunks
    /// finished before that point are already persisted.
    ///
    /// # Arguments
    ///
    /// * `article` - Crawl result; transformed first if it carries no markdown yet
    /// * `mode` - Requested output; may be downgraded to [`ExtractMode::OnlyInfo`]
    ///
    /// # Returns
    ///
    /// The number of persisted infos and the discovered links in first-mention order
    pub async fn run(
        &self,
        article: &Article,
        mode: ExtractMode,
    ) -> Result<(usize, IndexSet<String>), ExtractError> {
        let Some(article) = self.prepare_article(article).await else {
            return Ok((0, IndexSet::new()));
        };
        let markdown = article.markdown.as_deref().unwrap_or_default();
        let mode = self.effective_mode(&article, mode);

        let chunks = self.services.chunker.chunk(markdown);
        let prefix = section_prefix(&article);
        let today = Local::now().format("%Y-%m-%d").to_string();
        let created = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let source = InfoSource {
            url: &article.url,
            title: &article.title,
            author: &article.author,
            publish_date: &article.publish_date,
            link_table: &article.link_table,
            markdown,
        };

        debug!(
            "Focus {}: {} in {} chunks ({:?})",
            self.focus.id,
            article.url,
            chunks.len(),
            mode
        );

        let mut link_blocks = Vec::new();
        let mut info_count = 0;

        for chunk in chunks {
            let Some(hash) = self.chunk_hash(chunk.clone()).await else {
                continue;
            };
            if !self.claim(&hash).await {
                continue;
            }

            let outcome = self
                .process_chunk(&chunk, &prefix, mode, &today, &created, &source)
                .await;
            self.apply_count.fetch_add(1, Ordering::SeqCst);

            match outcome {
                Ok(found) => {
                    link_blocks.extend(found.link_blocks);
                    if mode != ExtractMode::OnlyLink {
                        info_count += self.persist(found.infos).await;
                    }
                }
                Err(e) if e.is_recoverable() => {
                    debug!("Focus {}: chunk {} failed: {}", self.focus.id, &hash[..8], e);
                    self.release(&hash).await;

                    let failed = self.apply_failed.fetch_add(1, Ordering::SeqCst) + 1;
                    if failed >= self.extraction.apply_failed_threshold {
                        warn!(
                            "Focus {} reached {} failed chunks, giving up",
                            self.focus.id, failed
                        );
                        return Err(ExtractError::FocusExhausted {
                            focus_id: self.focus.id.clone(),
                            failures: failed,
                        });
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let resolution = resolve_links(&link_blocks, &article.link_table);
        debug!("Focus {}: {} links discovered", self.focus.id, resolution.links.len());
        if resolution.hallucinated > 0 {
            info!(
                "[QualityAssessment] Focus {} - link extraction, hallucination times: {}, hallucination rate: {:.2} %",
                self.focus.id,
                resolution.hallucinated,
                resolution.rate().unwrap_or_default()
            );
        }

        if mode == ExtractMode::OnlyLink {
            return Ok((0, resolution.links));
        }

        let settled = mode == ExtractMode::OnlyInfo
            || (info_count > 0 && resolution.links.len() < self.extraction.settled_link_cutoff);
        if settled && !article.url.is_empty() {
            self.settle_page(&article.url).await;
        }

        Ok((info_count, resolution.links))
    }

    /// Returns the article with citation markdown, transforming it if needed
    ///
    /// A freshly transformed article is cached under its URL for
    /// `article-cache-minutes` so concurrent runs for the same page reuse it.
    /// Returns `None` (and evicts the page entry) when there is no usable content.
    pub async fn prepare_article(&self, article: &Article) -> Option<Article> {
        if article.has_markdown() {
            return Some(article.clone());
        }

        let cache = &self.services.cache;
        if !article.url.is_empty() {
            match cache.get_json::<Article>(&article.url, &self.page_namespace).await {
                Ok(Some(cached)) if cached.has_markdown() => {
                    debug!("Reusing transformed article for {}", article.url);
                    return Some(cached);
                }
                Ok(_) => {}
                Err(e) => warn!("Article cache lookup failed for {}: {}", article.url, e),
            }
        }

        if !article.has_html() {
            info!("{} has no markdown, cleaned html or html, skipping", article.url);
            self.evict_page(&article.url).await;
            return None;
        }

        let output = self
            .services
            .transformer
            .transform(&article.html, &article.cleaned_html, &article.url, &article.metadata)
            .await;

        if let Some(err) = &output.error {
            warn!("Cannot transform {}: {}", article.url, err);
            return None;
        }
        if output.markdown.trim().is_empty() {
            warn!("{} produced no content, the crawl probably failed", article.url);
            self.evict_page(&article.url).await;
            return None;
        }

        let updated = article.with_transform(output);
        if !updated.url.is_empty() {
            if let Err(e) = cache
                .set(
                    &updated.url,
                    &updated,
                    self.extraction.article_cache_minutes,
                    &self.page_namespace,
                )
                .await
            {
                warn!("Failed to cache article {}: {}", updated.url, e);
            }
        }
        Some(updated)
    }

    fn effective_mode(&self, article: &Article, requested: ExtractMode) -> ExtractMode {
        if requested == ExtractMode::OnlyInfo {
            return requested;
        }
        if article.link_table.is_empty() {
            debug!("{} has no links, switching to info only", article.url);
            return ExtractMode::OnlyInfo;
        }
        if self.extraction.exclude_external_links
            && url_host_matches(&article.url, &self.extraction.exclude_external_hosts)
        {
            debug!("{} is excluded from link discovery", article.url);
            return ExtractMode::OnlyInfo;
        }
        requested
    }

    async fn chunk_hash(&self, chunk: String) -> Option<String> {
        let min_chars = self.extraction.min_chunk_chars;
        match self
            .services
            .pool
            .run(move || content_hash(&chunk, min_chars))
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                warn!("Hashing chunk failed: {}", e);
                None
            }
        }
    }

    /// Writes the dedup marker; false when this content was already processed
    async fn claim(&self, hash: &str) -> bool {
        let namespace = self.dedup_namespace();
        match self.services.cache.set_if_absent(hash, &true, 0, &namespace).await {
            Ok(true) => true,
            Ok(false) => {
                info!(
                    "Content already processed: hash={}..., focus_id={}",
                    &hash[..8],
                    self.focus.id
                );
                false
            }
            Err(e) => {
                warn!("Dedup marker write failed, processing anyway: {}", e);
                true
            }
        }
    }

    async fn release(&self, hash: &str) {
        if let Err(e) = self.services.cache.delete(hash, &self.dedup_namespace()).await {
            warn!("Failed to remove dedup marker {}: {}", hash, e);
        }
    }

    async fn evict_page(&self, url: &str) {
        if url.is_empty() {
            return;
        }
        if let Err(e) = self.services.cache.delete(url, &self.page_namespace).await {
            warn!("Failed to evict {} from the page cache: {}", url, e);
        }
    }

    async fn settle_page(&self, url: &str) {
        let minutes = self.extraction.web_article_ttl_days * 24 * 60;
        match self
            .services
            .cache
            .update_ttl(url, minutes, &self.page_namespace)
            .await
        {
            Ok(true) => debug!("{} settled, cached for {} days", url, self.extraction.web_article_ttl_days),
            Ok(false) => {}
            Err(e) => warn!("Failed to extend page cache for {}: {}", url, e),
        }
    }

    async fn process_chunk(
        &self,
        chunk: &str,
        prefix: &str,
        mode: ExtractMode,
        today: &str,
        created: &str,
        source: &InfoSource<'_>,
    ) -> Result<ChunkYield, ExtractError> {
        let (template, model, expect) = match (mode, self.prompts.schema.as_deref()) {
            (ExtractMode::OnlyLink, _) | (ExtractMode::Both, Some(_)) => {
                (self.prompts.only_links.as_str(), &self.performance_model, Expect::Links)
            }
            (ExtractMode::OnlyInfo, Some(schema)) => (schema, &self.performance_model, Expect::Json),
            (ExtractMode::OnlyInfo, None) => {
                (self.prompts.only_info.as_str(), &self.selected_model, Expect::Info)
            }
            (ExtractMode::Both, None) => {
                (self.prompts.both.as_str(), &self.selected_model, Expect::InfoAndLinks)
            }
        };

        let content = format!("{}{}", prefix, chunk);
        let prompt = PromptSet::render(template, &content, source.url, today);
        if self.extraction.verbose {
            debug!("prompt ({}):\n{}", model, prompt);
        }

        let response = self
            .services
            .llm
            .complete(&[ChatMessage::user(prompt)], model, TEMPERATURE, None)
            .await
            .map_err(|e| {
                error!("LLM service temporarily unavailable: {}", e);
                ExtractError::from(e)
            })?;

        if self.extraction.verbose {
            debug!("response ({}):\n{}", model, response);
        }
        if response.trim().is_empty() {
            info!("Focus {}: empty model response", self.focus.id);
            return Err(ExtractError::EmptyResult);
        }

        let mut found = ChunkYield::default();
        let mut tagged = false;

        if matches!(expect, Expect::Links | Expect::InfoAndLinks) {
            let blocks = extract_tag(ResponseTag::Links, &response);
            tagged |= !blocks.is_empty();
            found.link_blocks = blocks.into_iter().filter(|b| !b.trim().is_empty()).collect();
        }
        if matches!(expect, Expect::Info | Expect::InfoAndLinks) {
            let blocks = extract_tag(ResponseTag::Info, &response);
            tagged |= !blocks.is_empty();
            found.infos = process_info_blocks(&blocks, InfoKind::Journal, source, created);
        }
        if expect == Expect::Json {
            let blocks = extract_tag(ResponseTag::Json, &response);
            tagged |= !blocks.is_empty();
            found.infos = process_info_blocks(&blocks, InfoKind::Schema, source, created);
        }

        if !tagged {
            return Err(ExtractError::Parse(format!(
                "no {:?} section in model reply",
                expect
            )));
        }
        if found.infos.is_empty() && found.link_blocks.is_empty() {
            return Err(ExtractError::EmptyResult);
        }
        Ok(found)
    }

    /// Validates and stores infos, returning how many were persisted
    async fn persist(&self, infos: Vec<ExtractedInfo>) -> usize {
        let mut stored = 0;
        for mut info in infos {
            let content = info.content.trim();
            if content.is_empty() || content == EMPTY_SENTINEL {
                continue;
            }

            if info.kind == InfoKind::Schema {
                match self.validate_schema_block(info.content.clone()).await {
                    Some(content) => info.content = content,
                    None => continue,
                }
            }

            match self
                .services
                .store
                .add_info(&self.statement, &self.focus.id, &info)
                .await
            {
                Ok(_) => stored += 1,
                Err(e) => warn!("Failed to store info for focus {}: {}", self.focus.id, e),
            }
        }
        stored
    }

    /// Shapes a `<json>` block to the schema and coerces field types
    ///
    /// Returns the records as pretty JSON, or `None` when nothing survives.
    async fn validate_schema_block(&self, block: String) -> Option<String> {
        let schema = self.schema.clone();
        let types: BTreeMap<String, FieldType> = self.focus.field_types.clone();
        let focus_id = self.focus.id.clone();

        let result = self
            .services
            .pool
            .run(move || {
                let parsed = parse_schema_block(&block, &schema);
                if parsed.hallucinated > 0 {
                    info!(
                        "[QualityAssessment] Focus {} - custom schema extraction, hallucination times: {}, hallucination rate: {} %",
                        focus_id,
                        parsed.hallucinated,
                        parsed
                            .rate()
                            .map_or_else(|| "NA".to_string(), |r| format!("{:.2}", r))
                    );
                }

                let records: Vec<Value> = parsed
                    .records
                    .into_iter()
                    .filter_map(|record| {
                        coerce_record(record, |key| types.get(key).copied().unwrap_or_default())
                    })
                    .map(Value::Object)
                    .collect();

                if records.is_empty() {
                    None
                } else {
                    serde_json::to_string_pretty(&records).ok()
                }
            })
            .await;

        match result {
            Ok(content) => content,
            Err(e) => {
                warn!("Schema validation failed: {}", e);
                None
            }
        }
    }
}

/// Title, author and date lines put in front of every chunk
fn section_prefix(article: &Article) -> String {
    let mut prefix = String::new();
    if !article.title.is_empty() {
        prefix.push_str(&format!("{}\n", article.title));
    }
    if !article.author.is_empty() {
        prefix.push_str(&format!("Author: {}\n", article.author));
    }
    if !article.publish_date.is_empty() {
        prefix.push_str(&format!("Publish date: {}\n", article.publish_date));
    }
    if !prefix.is_empty() {
        prefix.push('\n');
    }
    prefix
}
