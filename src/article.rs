//! Crawl result consumed by the extraction pipeline

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::markdown::{LinkTable, SourceProfile, TransformOutput};

/// One crawled page or post
///
/// The crawler fills `url`, `html`, `cleaned_html` and `metadata`. The
/// remaining fields are derived by the transformer; [`Article::with_transform`]
/// produces the updated value instead of mutating a shared record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub cleaned_html: String,
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    pub link_table: LinkTable,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub publish_date: String,
}

impl Article {
    /// Creates an article from raw crawl output
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            ..Self::default()
        }
    }

    /// Whether citation markdown has already been produced
    pub fn has_markdown(&self) -> bool {
        self.markdown.as_deref().map_or(false, |m| !m.trim().is_empty())
    }

    /// Whether there is any HTML to transform
    pub fn has_html(&self) -> bool {
        !self.html.trim().is_empty() || !self.cleaned_html.trim().is_empty()
    }

    /// Returns a copy carrying a transform result
    ///
    /// Crawler-supplied title, author and date win over the transformer's
    /// unless the page belongs to a platform-specific profile, whose
    /// structural extraction is more reliable.
    pub fn with_transform(&self, output: TransformOutput) -> Article {
        let profile_wins = SourceProfile::for_url(&self.url) != SourceProfile::Generic;
        let pick = |crawled: &str, derived: String| {
            if crawled.is_empty() || profile_wins {
                derived
            } else {
                crawled.to_string()
            }
        };

        Article {
            url: self.url.clone(),
            html: self.html.clone(),
            cleaned_html: self.cleaned_html.clone(),
            markdown: Some(output.markdown),
            link_table: output.link_table,
            metadata: self.metadata.clone(),
            title: pick(&self.title, output.title),
            author: pick(&self.author, output.author),
            publish_date: pick(&self.publish_date, output.publish_date),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> TransformOutput {
        let mut link_table = LinkTable::new();
        link_table.push_link("https://a.com/x");
        TransformOutput {
            error: None,
            title: "Derived".to_string(),
            author: "Bot".to_string(),
            publish_date: "2024-01-01".to_string(),
            markdown: "text x[1]".to_string(),
            link_table,
        }
    }

    #[test]
    fn test_crawled_metadata_wins_on_generic_pages() {
        let mut article = Article::new("https://a.com/post", "<p>x</p>");
        article.title = "Crawled".to_string();

        let updated = article.with_transform(output());
        assert_eq!(updated.title, "Crawled");
        assert_eq!(updated.author, "Bot");
        assert_eq!(updated.markdown.as_deref(), Some("text x[1]"));
        assert_eq!(updated.link_table.len(), 1);
        assert!(article.markdown.is_none());
    }

    #[test]
    fn test_profile_metadata_wins_on_weixin() {
        let mut article = Article::new("https://mp.weixin.qq.com/s/abc", "<p>x</p>");
        article.title = "Crawled".to_string();

        let updated = article.with_transform(output());
        assert_eq!(updated.title, "Derived");
    }

    #[test]
    fn test_has_markdown_ignores_whitespace() {
        let mut article = Article::new("https://a.com", "");
        assert!(!article.has_markdown());
        assert!(!article.has_html());

        article.markdown = Some("  \n".to_string());
        assert!(!article.has_markdown());
        article.markdown = Some("body".to_string());
        assert!(article.has_markdown());
    }
}
