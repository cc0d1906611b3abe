//! Integration tests for the extraction pipeline
//!
//! These tests wire the real cache engine, transformer and SQLite store
//! together and replace the LLM with a scripted mock.

use async_trait::async_trait;
use focusmine::cache::{CacheEngine, ManualClock};
use focusmine::config::Config;
use focusmine::extract::{ExtractError, ExtractMode, FieldType, FocusPoint, Orchestrator, Services};
use focusmine::llm::{ChatMessage, LlmClient, LlmError};
use focusmine::markdown::{LinkTable, NoDescriber, Transformer};
use focusmine::store::{InfoKind, SqliteStore};
use focusmine::Article;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// An LLM that answers from a queue and records what it was asked
#[derive(Default)]
struct MockLlm {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockLlm {
    fn new(replies: &[&str]) -> Arc<Self> {
        let mock = Self::default();
        mock.replies
            .lock()
            .unwrap()
            .extend(replies.iter().map(|r| r.to_string()));
        Arc::new(mock)
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn models(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        _temperature: f32,
        _max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), messages[0].text()));
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
    }
}

struct Harness {
    config: Config,
    clock: Arc<ManualClock>,
    cache: Arc<CacheEngine>,
    store: Arc<SqliteStore>,
    llm: Arc<MockLlm>,
}

impl Harness {
    fn new(replies: &[&str]) -> Self {
        Self::with_config(Config::default(), replies)
    }

    fn with_config(mut config: Config, replies: &[&str]) -> Self {
        config.llm.performance_model = "fast".to_string();
        config.llm.selected_model = "smart".to_string();

        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let cache = Arc::new(CacheEngine::in_memory(&config.cache).with_clock(clock.clone()));
        let store = Arc::new(SqliteStore::in_memory().expect("Failed to create store"));

        Self {
            config,
            clock,
            cache,
            store,
            llm: MockLlm::new(replies),
        }
    }

    fn services(&self) -> Services {
        Services::new(
            self.cache.clone(),
            self.llm.clone(),
            self.store.clone(),
            Arc::new(Transformer::new(&self.config.transform, Arc::new(NoDescriber))),
            &self.config.extraction,
        )
    }

    fn orchestrator(&self, focus: FocusPoint) -> Orchestrator {
        Orchestrator::new(focus, self.services(), &self.config).expect("Failed to build orchestrator")
    }
}

fn focus(id: &str) -> FocusPoint {
    FocusPoint {
        id: id.to_string(),
        keywords: "product launches".to_string(),
        ..FocusPoint::default()
    }
}

const LAUNCH_PAGE: &str = r#"<html><head><title>Launch day</title><meta name="author" content="Ann"></head>
<body>
<p>The company confirmed that the launch of its new phone has moved to May. Read <a href="/notes">the notes</a> before launch.</p>
</body></html>"#;

/// An article with ready-made markdown and a two-entry link table
fn prepared_article(url: &str, markdown: &str) -> Article {
    let mut table = LinkTable::new();
    table.push_link("https://news.com/one");
    table.push_link("https://news.com/two");

    let mut article = Article::new(url, "");
    article.markdown = Some(markdown.to_string());
    article.link_table = table;
    article
}

#[tokio::test]
async fn test_html_page_end_to_end() {
    let harness = Harness::new(&["<info>Launch moved to May[1]</info>\n<links>see the notes[1]</links>"]);
    let orchestrator = harness.orchestrator(focus("f1"));

    let (count, links) = orchestrator
        .run(&Article::new("https://site.com/post", LAUNCH_PAGE), ExtractMode::Both)
        .await
        .expect("Run failed");

    assert_eq!(count, 1);
    assert_eq!(links.into_iter().collect::<Vec<_>>(), vec!["https://site.com/notes"]);
    assert_eq!(harness.llm.models(), vec!["smart"]);
    assert!(harness.llm.prompts()[0].contains("Launch day\nAuthor: Ann\n\n"));

    let infos = harness.store.infos_for_focus("f1").await.expect("Query failed");
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].focus_statement, "(product launches)");
    assert_eq!(infos[0].info.kind, InfoKind::Journal);
    assert!(infos[0].info.content.starts_with("//Ann"));
    assert!(infos[0].info.content.ends_with("Launch moved to May[1]"));
    assert_eq!(infos[0].info.references, "[1]: https://site.com/notes\n");
    assert_eq!(infos[0].info.source_title, "Launch day");

    // Settled: one info and fewer than five links keeps the page for 15 days
    let ttl = harness.cache.ttl("https://site.com/post", "pages").await.unwrap();
    assert_eq!(ttl, 15 * 24 * 60);
}

#[tokio::test]
async fn test_transformed_article_is_reused_from_cache() {
    let harness = Harness::new(&[
        "<info>Launch moved to May</info>",
        "<info>The phone launches in May</info>",
    ]);

    harness
        .orchestrator(focus("f1"))
        .run(&Article::new("https://site.com/post", LAUNCH_PAGE), ExtractMode::OnlyInfo)
        .await
        .unwrap();

    // Same page for another focus, this time without any html
    let (count, _) = harness
        .orchestrator(focus("f2"))
        .run(&Article::new("https://site.com/post", ""), ExtractMode::OnlyInfo)
        .await
        .unwrap();

    assert_eq!(count, 1);
    assert_eq!(harness.llm.call_count(), 2);
    assert!(harness.llm.prompts()[1].contains("the notes[1]"));
}

#[tokio::test]
async fn test_concurrent_runs_call_llm_once_per_content() {
    let harness = Harness::new(&["<info>Launch moved to May</info>", "<info>duplicate</info>"]);
    let first = harness.orchestrator(focus("f1"));
    let second = harness.orchestrator(focus("f1"));
    let article = prepared_article(
        "https://news.com/a",
        "The company confirmed that the launch of its new phone has moved to May.",
    );

    let (a, b) = tokio::join!(
        first.run(&article, ExtractMode::OnlyInfo),
        second.run(&article, ExtractMode::OnlyInfo)
    );

    assert_eq!(a.unwrap().0 + b.unwrap().0, 1);
    assert_eq!(harness.llm.call_count(), 1);
    assert_eq!(harness.store.count_infos().await.unwrap(), 1);

    // Another focus may still process the same content
    let (count, _) = harness
        .orchestrator(focus("f2"))
        .run(&article, ExtractMode::OnlyInfo)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(harness.llm.call_count(), 2);
}

#[tokio::test]
async fn test_focus_exhausted_after_repeated_failures() {
    let mut config = Config::default();
    config.extraction.max_chunk_size = 60;
    let harness = Harness::with_config(config, &[]);
    let orchestrator = harness.orchestrator(focus("f1"));

    let markdown = (0..15)
        .map(|i| format!("Paragraph number {} talks about something else.", i))
        .collect::<Vec<_>>()
        .join("\n\n");
    let article = prepared_article("https://news.com/long", &markdown);

    let result = orchestrator.run(&article, ExtractMode::Both).await;

    match result {
        Err(ExtractError::FocusExhausted { focus_id, failures }) => {
            assert_eq!(focus_id, "f1");
            assert_eq!(failures, 12);
        }
        other => panic!("expected FocusExhausted, got {:?}", other),
    }
    assert_eq!(harness.llm.call_count(), 12);
    assert_eq!(orchestrator.apply_count(), 12);
    assert_eq!(orchestrator.apply_failed(), 12);

    // Failed chunks leave no dedup marker behind
    let markers = harness.cache.keys("*", "focus_f1").await.unwrap();
    assert!(markers.is_empty());
}

#[tokio::test]
async fn test_hallucinated_link_tags_are_dropped() {
    let harness = Harness::new(&["<links>first[1]\ninvented[7]\nsecond[2]\nfirst again[1]</links>"]);
    let orchestrator = harness.orchestrator(focus("f1"));
    let article = prepared_article(
        "https://news.com/list",
        "Latest stories: phone launch[1] and tablet preview[2]",
    );

    let (count, links) = orchestrator.run(&article, ExtractMode::OnlyLink).await.unwrap();

    assert_eq!(count, 0);
    assert_eq!(
        links.into_iter().collect::<Vec<_>>(),
        vec!["https://news.com/one", "https://news.com/two"]
    );
    assert_eq!(harness.llm.models(), vec!["fast"]);
    assert_eq!(harness.store.count_infos().await.unwrap(), 0);
}

#[tokio::test]
async fn test_excluded_host_is_downgraded_to_info_only() {
    let harness = Harness::new(&["<info>Launch moved to May</info>"]);
    let orchestrator = harness.orchestrator(focus("f1"));
    let article = prepared_article(
        "https://mp.weixin.qq.com/s/abc",
        "The company confirmed the launch moved to May. More[1]",
    );

    let (count, links) = orchestrator.run(&article, ExtractMode::OnlyLink).await.unwrap();

    assert_eq!(count, 1);
    assert!(links.is_empty());
    assert_eq!(harness.llm.models(), vec!["smart"]);
    assert!(!harness.llm.prompts()[0].contains("<links>"));
}

#[tokio::test]
async fn test_schema_focus_stores_typed_records() {
    let harness = Harness::new(&[r#"Here you go:
<json>
[
  {"model": "X1[1]", "price": "799.0", "in_stock": "yes", "color": "red"},
  {"model": "", "price": "", "in_stock": ""},
  {"model": "X2", "price": "unknown", "in_stock": "no"}
]
</json>"#]);

    let mut f = focus("phones");
    f.custom_schema = "model | price（USD） | in_stock".to_string();
    f.field_types.insert("price".to_string(), FieldType::Integer);
    f.field_types.insert("in_stock".to_string(), FieldType::Boolean);
    let orchestrator = harness.orchestrator(f);

    let article = prepared_article(
        "https://shop.com/phones",
        "<main-content>\nX1 costs $799 and ships today[1]. X2 price not announced.\n</main-content>",
    );
    let (count, _) = orchestrator.run(&article, ExtractMode::OnlyInfo).await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(harness.llm.models(), vec!["fast"]);
    assert!(harness.llm.prompts()[0].contains("<url>https://shop.com/phones</url>"));

    let infos = harness.store.infos_for_focus("phones").await.unwrap();
    assert_eq!(infos[0].info.kind, InfoKind::Schema);

    let records: Value = serde_json::from_str(&infos[0].info.content).unwrap();
    assert_eq!(
        records,
        json!([
            {"model": "X1", "price": 799, "in_stock": true},
            {"model": "X2", "in_stock": false}
        ])
    );
}

#[tokio::test]
async fn test_page_without_content_is_evicted() {
    let harness = Harness::new(&[]);
    harness
        .cache
        .set("https://site.com/gone", &json!({"url": "https://site.com/gone"}), 5, "pages")
        .await
        .unwrap();

    let (count, links) = harness
        .orchestrator(focus("f1"))
        .run(&Article::new("https://site.com/gone", "   "), ExtractMode::Both)
        .await
        .unwrap();

    assert_eq!((count, links.len()), (0, 0));
    assert_eq!(harness.llm.call_count(), 0);
    assert_eq!(harness.cache.ttl("https://site.com/gone", "pages").await.unwrap(), -1);
}

#[tokio::test]
async fn test_transformed_article_cache_expires() {
    let harness = Harness::new(&["<links>notes[1]</links>", "<links>notes[1]</links>"]);

    harness
        .orchestrator(focus("f1"))
        .run(&Article::new("https://site.com/post", LAUNCH_PAGE), ExtractMode::OnlyLink)
        .await
        .unwrap();

    // Only-link runs never settle the page, so the short lifetime applies
    assert_eq!(harness.cache.ttl("https://site.com/post", "pages").await.unwrap(), 5);
    harness.clock.advance(6 * 60);
    assert_eq!(harness.cache.ttl("https://site.com/post", "pages").await.unwrap(), -1);
}
