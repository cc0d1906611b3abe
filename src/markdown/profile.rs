//! Source profiles: where title, author and date live for a type of page
//!
//! Every profile turns a crawled page into metadata plus a body (HTML to be
//! converted, or markdown built directly from the page structure). The
//! generic profile reads standard `<meta>` tags; the WeChat profile knows
//! the layouts of `mp.weixin.qq.com` articles, albums and share pages.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use scraper::{ElementRef, Html, Selector};
use url::Url;

const WEIXIN_HOST: &str = "mp.weixin.qq.com";
const WEIXIN_ALBUM_PREFIX: &str = "https://mp.weixin.qq.com/mp/appmsgalbum";

lazy_static! {
    static ref WEIXIN_DATE: Regex = Regex::new(r"\d{4}年\d{2}月\d{2}日\s+\d{2}:\d{2}").unwrap();
    static ref ESCAPED_ANCHOR: Regex =
        Regex::new(r"href=\\x26quot;(.*?)\\x26quot;.*?\\x26gt;(.*?)\\x26lt;/a").unwrap();
    static ref IMG_TAG: Regex = Regex::new(r"(?is)<img\b[^>]*>").unwrap();
    static ref SRC_ATTR: Regex =
        Regex::new(r#"(?i)\ssrc\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).unwrap();
    static ref DATA_SRC_ATTR: Regex = Regex::new(r"(?i)\sdata-src\s*=").unwrap();
}

/// Page layouts with dedicated metadata extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceProfile {
    /// Any page; metadata from the crawler or standard `<meta>` tags
    Generic,
    /// WeChat official-account pages on mp.weixin.qq.com
    WeixinArticle,
}

/// What a profile extracted before markdown conversion
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Prepared {
    pub title: String,
    pub author: String,
    pub publish_date: String,
    pub body: Body,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Body {
    Html(String),
    Markdown(String),
}

impl Default for Body {
    fn default() -> Self {
        Body::Markdown(String::new())
    }
}

impl SourceProfile {
    /// Picks the profile for a page by its host
    pub fn for_url(url: &str) -> Self {
        let is_weixin = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(WEIXIN_HOST)))
            .unwrap_or(false);

        if is_weixin {
            SourceProfile::WeixinArticle
        } else {
            SourceProfile::Generic
        }
    }

    pub(crate) fn prepare(
        &self,
        html: &str,
        cleaned_html: &str,
        base_url: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Prepared {
        match self {
            SourceProfile::Generic => prepare_generic(html, cleaned_html, metadata),
            SourceProfile::WeixinArticle => prepare_weixin(html, cleaned_html, base_url, metadata),
        }
    }
}

fn first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    scope.select(&selector).next()
}

fn all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Text of an element with every text node trimmed and joined without separators
fn compact_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("")
}

fn attr(element: ElementRef<'_>, name: &str) -> String {
    element.value().attr(name).unwrap_or("").trim().to_string()
}

fn known(metadata: &BTreeMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| metadata.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn prepare_generic(
    html: &str,
    cleaned_html: &str,
    metadata: &BTreeMap<String, String>,
) -> Prepared {
    let mut title = known(metadata, &["title"]);
    let mut author = known(metadata, &["author"]);
    let mut publish_date = known(metadata, &["publish_date", "published_time"]);

    if title.is_none() || author.is_none() || publish_date.is_none() {
        let document = Html::parse_document(html);
        let root = document.root_element();

        if title.is_none() {
            title = first(root, "title")
                .map(compact_text)
                .filter(|t| !t.is_empty())
                .or_else(|| first(root, r#"meta[property="og:title"]"#).map(|m| attr(m, "content")));
        }
        if author.is_none() {
            author = first(root, r#"meta[name="author"]"#).map(|m| attr(m, "content"));
        }
        if publish_date.is_none() {
            publish_date = first(root, r#"meta[property="article:published_time"]"#)
                .map(|m| attr(m, "content"));
        }
    }

    let source = if cleaned_html.trim().is_empty() {
        html
    } else {
        cleaned_html
    };

    Prepared {
        title: title.unwrap_or_default(),
        author: author.unwrap_or_default(),
        publish_date: publish_date.unwrap_or_default(),
        body: Body::Html(source.to_string()),
        error: None,
    }
}

fn prepare_weixin(
    html: &str,
    cleaned_html: &str,
    base_url: &str,
    metadata: &BTreeMap<String, String>,
) -> Prepared {
    let source = if html.trim().is_empty() {
        cleaned_html
    } else {
        html
    };
    let document = Html::parse_document(source);
    let root = document.root_element();

    let mut prepared = if base_url.starts_with(WEIXIN_ALBUM_PREFIX) {
        Prepared {
            body: Body::Markdown(album_listing(root)),
            ..Prepared::default()
        }
    } else if let Some(h1) = first(root, "h1") {
        weixin_article(h1, metadata)
    } else {
        share_or_deleted(root)
    };

    if matches!(&prepared.body, Body::Markdown(md) if md.is_empty()) && prepared.error.is_none() {
        prepared.body = Body::Html(rewrite_lazy_images(source));
    }
    prepared
}

/// Album pages list their articles as `li` items carrying title and link
fn album_listing(root: ElementRef<'_>) -> String {
    let mut content = String::new();

    for item in all(root, "li.album__list-item") {
        let text = compact_text(item);
        let title = attr(item, "data-title");
        let link = attr(item, "data-link").replacen("http://", "https://", 1);
        if link.is_empty() || link.starts_with("javascript") || link.starts_with("about:blank") {
            continue;
        }

        let description = if text.contains(&title) {
            text
        } else {
            format!("{}-{}", title, text)
        };
        content.push_str(&format!("[{}]({})\n", description, trim_checksum(&link)));
    }

    content
}

/// Drops the `chksm=` parameter and everything after it, separator included
fn trim_checksum(link: &str) -> &str {
    match link.find("chksm=") {
        Some(pos) => &link[..pos.saturating_sub(1)],
        None => link,
    }
}

fn dated_text(scope: ElementRef<'_>, tag: &str) -> Option<String> {
    all(scope, tag)
        .into_iter()
        .map(full_text)
        .find(|text| WEIXIN_DATE.is_match(text))
        .and_then(|text| text.split_whitespace().next().map(str::to_string))
}

fn full_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn weixin_article(h1: ElementRef<'_>, metadata: &BTreeMap<String, String>) -> Prepared {
    let mut prepared = Prepared {
        title: compact_text(h1),
        ..Prepared::default()
    };

    let blocks: Vec<ElementRef<'_>> = h1
        .parent()
        .and_then(ElementRef::wrap)
        .map(|parent| {
            parent
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|e| e.value().name() == "div" && e.children().next().is_some())
                .collect()
        })
        .unwrap_or_default();

    match blocks.as_slice() {
        [] => {
            prepared.error = Some("unrecognized article layout: no byline block".to_string());
        }
        [byline] => {
            if let Some(strong) = first(*byline, "strong") {
                prepared.author = compact_text(strong);
                match dated_text(*byline, "span") {
                    Some(date) => prepared.publish_date = date,
                    None => {
                        prepared.error =
                            Some("unrecognized article layout: byline without date".to_string());
                    }
                }
            }
        }
        [byline, ..] => {
            if let Some(anchor) = first(*byline, r#"a[href="javascript:void(0);"]"#) {
                prepared.author = compact_text(anchor);
                match dated_text(*byline, "em") {
                    Some(date) => prepared.publish_date = date,
                    None => {
                        prepared.error =
                            Some("unrecognized article layout: account without date".to_string());
                    }
                }
            } else {
                // Photo albums carry their links only in the escaped description
                let description = metadata.get("description").map(String::as_str).unwrap_or("");
                prepared.body = Body::Markdown(photo_album_links(description));
            }
        }
    }

    prepared
}

fn photo_album_links(description: &str) -> String {
    ESCAPED_ANCHOR
        .captures_iter(description)
        .map(|caps: Captures<'_>| {
            let url = caps.get(1).map_or("", |m| m.as_str());
            let text = caps.get(2).map_or("", |m| m.as_str());
            format!("[{}]({})\n", text.trim(), unescape_weixin_url(url))
        })
        .collect()
}

fn unescape_weixin_url(url: &str) -> String {
    url.replace(r"\x26amp;amp;", "&")
        .replace(r"\x26amp;", "&")
        .replace(r"\x26quot", "")
        .replace(r"\x26", "&")
}

/// Pages without `h1` are share stubs pointing at another article, or deleted
fn share_or_deleted(root: ElementRef<'_>) -> Prepared {
    let mut prepared = Prepared::default();

    let share_url = first(root, "span#js_share_source")
        .map(|span| attr(span, "data-url"))
        .filter(|url| !url.is_empty());

    let Some(share_url) = share_url else {
        prepared.error = Some("deleted page".to_string());
        return prepared;
    };

    let share_url = share_url.replacen("http://", "https://", 1);
    if !share_url.starts_with("https://mp.weixin.qq.com") {
        prepared.error = Some(format!("share page points off-platform: {}", share_url));
        return prepared;
    }

    match first(root, "div#js_content") {
        Some(content) => {
            prepared.body = Body::Markdown(format!("[{}]({})", compact_text(content), share_url));
        }
        None => prepared.error = Some("share page without content block".to_string()),
    }
    prepared
}

/// Promotes lazy-loading `data-src` attributes to `src` on every `<img>`
fn rewrite_lazy_images(html: &str) -> String {
    IMG_TAG
        .replace_all(html, |caps: &Captures<'_>| {
            let tag = caps.get(0).map_or("", |m| m.as_str());
            if DATA_SRC_ATTR.is_match(tag) {
                let without_src = SRC_ATTR.replace_all(tag, "");
                DATA_SRC_ATTR.replace(&without_src, " src=").into_owned()
            } else {
                tag.to_string()
            }
        })
        .into_owned()
}
