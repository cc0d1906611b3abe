//! Markdown citation transformer
//!
//! Turns a crawled page into citation-tagged markdown:
//! - HTML is converted to markdown with `htmd` (scripts and styles skipped)
//! - links, images and bare URLs become `[n]` / `[imgN]` tags
//! - a [`LinkTable`] maps every emitted tag back to its absolute URL
//! - prose sections are wrapped in `<main-content>` markers
//!
//! Title, author and publish date come from a [`SourceProfile`] chosen by
//! the page's host.

mod citations;
mod images;
mod links;
mod profile;

pub use images::{ImageDescriber, MemoizedDescriber, NoDescriber, DEFAULT_MEMO_CAPACITY};
pub use links::{citation_tag_regex, LinkTable};
pub use profile::SourceProfile;

use std::collections::BTreeMap;
use std::sync::Arc;

use htmd::HtmlToMarkdown;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::TransformConfig;
use citations::CitationWriter;
use profile::Body;

/// Result of transforming one page
///
/// On failure `error` is set and `markdown`/`link_table` are empty; whatever
/// metadata was found before the failure is still returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransformOutput {
    pub error: Option<String>,
    pub title: String,
    pub author: String,
    pub publish_date: String,
    pub markdown: String,
    pub link_table: LinkTable,
}

/// Converts pages into citation-tagged markdown
pub struct Transformer {
    density_threshold: f64,
    social_media_domains: Vec<String>,
    describer: MemoizedDescriber,
}

impl Transformer {
    /// Creates a transformer; image descriptions are memoized per URL
    pub fn new(config: &TransformConfig, describer: Arc<dyn ImageDescriber>) -> Self {
        Self {
            density_threshold: config.density_threshold,
            social_media_domains: config.social_media_domains.clone(),
            describer: MemoizedDescriber::new(describer, DEFAULT_MEMO_CAPACITY),
        }
    }

    /// Transforms a crawled page
    ///
    /// Never fails: problems are reported through [`TransformOutput::error`].
    ///
    /// # Arguments
    ///
    /// * `html` - Raw page HTML
    /// * `cleaned_html` - Boilerplate-reduced HTML, preferred by the generic profile when non-empty
    /// * `base_url` - Page URL; relative links resolve against it and it selects the profile
    /// * `metadata` - Metadata already known from the crawler (`title`, `author`, `publish_date`, `description`)
    pub async fn transform(
        &self,
        html: &str,
        cleaned_html: &str,
        base_url: &str,
        metadata: &BTreeMap<String, String>,
    ) -> TransformOutput {
        let profile = SourceProfile::for_url(base_url);
        let prepared = profile.prepare(html, cleaned_html, base_url, metadata);

        let mut output = TransformOutput {
            error: None,
            title: prepared.title,
            author: prepared.author,
            publish_date: prepared.publish_date,
            ..TransformOutput::default()
        };

        if let Some(error) = prepared.error {
            warn!("Cannot transform {}: {}", base_url, error);
            output.error = Some(error);
            return output;
        }

        let raw = match prepared.body {
            Body::Markdown(markdown) => markdown,
            Body::Html(html) => match html_to_markdown(&html) {
                Ok(markdown) => markdown,
                Err(e) => {
                    output.error = Some(format!("Error in markdown generation: {}", e));
                    return output;
                }
            },
        };

        let (markdown, link_table) = self.convert_links_to_citations(&raw, base_url).await;
        debug!(
            "Transformed {} ({:?}): {} chars, {} citations",
            base_url,
            profile,
            markdown.len(),
            link_table.len()
        );

        output.markdown = markdown;
        output.link_table = link_table;
        output
    }

    /// Rewrites links, images and bare URLs in markdown as citation tags
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use focusmine::config::TransformConfig;
    /// use focusmine::markdown::{NoDescriber, Transformer};
    ///
    /// # async fn demo() {
    /// let transformer = Transformer::new(&TransformConfig::default(), Arc::new(NoDescriber));
    /// let (markdown, table) = transformer
    ///     .convert_links_to_citations("See [x](http://a.com/p?utm_source=z) here", "http://a.com")
    ///     .await;
    /// assert_eq!(markdown, "See x[1] here");
    /// assert_eq!(table.get("[1]"), Some("http://a.com/p"));
    /// # }
    /// ```
    pub async fn convert_links_to_citations(
        &self,
        markdown: &str,
        base_url: &str,
    ) -> (String, LinkTable) {
        CitationWriter::new(
            base_url,
            &self.social_media_domains,
            self.density_threshold,
            &self.describer,
        )
        .convert(markdown)
        .await
    }
}

fn html_to_markdown(html: &str) -> Result<String, std::io::Error> {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript", "head"])
        .build();

    Ok(converter.convert(html)?.replace("    ```", "```"))
}
