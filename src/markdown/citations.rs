//! Link and image to citation-tag conversion
//!
//! Raw markdown is split into sections on blank lines. In every section,
//! `[text](url)` links, `![alt](src)` images and bare URLs are replaced by
//! numbered tags recorded in a [`LinkTable`]. Each section then gets a link
//! density score; runs of low-density sections are wrapped in
//! `<main-content>` markers so prose can be told apart from navigation.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;
use url::Url;

use super::images::MemoizedDescriber;
use super::links::{citation_tag_regex, LinkTable};
use crate::url::{is_describable_image_url, is_social_media_url, resolve_url};

/// Score given to sections with no text left once tags are removed
const EMPTY_SECTION_SCORE: f64 = 999.0;

/// Bare images in sections with more surrounding text than this are not described
const DESCRIBE_MAX_CONTEXT_CHARS: usize = 150;

/// Bare images whose alt text is longer than this are considered self-explanatory
const DESCRIBE_MAX_ALT_CHARS: usize = 5;

/// Images nested in a link with alt text longer than this are inlined as text
const NESTED_IMAGE_MAX_ALT_CHARS: usize = 2;

lazy_static! {
    static ref JS_TARGET: Regex = Regex::new(r"<javascript:.*?>").unwrap();
    static ref IMAGE: Regex = Regex::new(r"(?s)!\[(.*?)\]\(((?:[^()]*|\([^()]*\))*)\)").unwrap();
    static ref LINK: Regex = Regex::new(r"(?s)\[(.*?)\]\(((?:[^()]*|\([^()]*\))*)\)").unwrap();
    static ref PLACEHOLDER: Regex = Regex::new(r"(?s)§(.*?)\|\|(.*?)§").unwrap();
    static ref WILD_URL: Regex = Regex::new(
        r"(?:https?://|www\.)[-A-Za-z0-9+&@#/%?=~_|!:,.;]*[-A-Za-z0-9+&@#/%=~_|]"
    ).unwrap();
    static ref SECTION_BREAK: Regex = Regex::new(r"\n{2,}").unwrap();
    static ref HAS_WORD: Regex = Regex::new(r"[a-zA-Z0-9\x{4e00}-\x{9fff}]").unwrap();
}

/// A regex match copied out of the haystack so it can outlive an `.await`
struct Found {
    start: usize,
    end: usize,
    first: String,
    second: String,
}

fn collect_pairs(re: &Regex, haystack: &str) -> Vec<Found> {
    re.captures_iter(haystack)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Found {
                start: whole.start(),
                end: whole.end(),
                first: caps.get(1).map_or("", |m| m.as_str()).to_string(),
                second: caps.get(2).map_or("", |m| m.as_str()).to_string(),
            })
        })
        .collect()
}

/// Splits a markdown link target into its URL and optional quoted title
///
/// Handles `url`, `url "title"` and `<url> "title"`.
fn split_target(target: &str) -> (String, String) {
    let target = target.trim();

    let (url, rest) = match target.strip_prefix('<') {
        Some(inner) => match inner.find('>') {
            Some(end) => (&inner[..end], &inner[end + 1..]),
            None => (inner, ""),
        },
        None => match target.find(char::is_whitespace) {
            Some(pos) => (&target[..pos], &target[pos..]),
            None => (target, ""),
        },
    };

    let title = rest
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string();

    (url.trim().to_string(), title)
}

/// Strips a URL scheme prefix, ignoring ASCII case
fn strip_scheme<'u>(url: &'u str, scheme: &str) -> Option<&'u str> {
    let head = url.get(..scheme.len())?;
    head.eq_ignore_ascii_case(scheme)
        .then(|| &url[scheme.len()..])
}

fn is_dead_target(url: &str) -> bool {
    url.is_empty() || url.starts_with('#') || url.to_ascii_lowercase().starts_with("javascript:")
}

/// Per-document conversion settings
pub(crate) struct CitationWriter<'a> {
    base: Option<Url>,
    social_media_domains: &'a [String],
    density_threshold: f64,
    describer: &'a MemoizedDescriber,
}

impl<'a> CitationWriter<'a> {
    pub(crate) fn new(
        base_url: &str,
        social_media_domains: &'a [String],
        density_threshold: f64,
        describer: &'a MemoizedDescriber,
    ) -> Self {
        Self {
            base: Url::parse(base_url).ok(),
            social_media_domains,
            density_threshold,
            describer,
        }
    }

    /// Converts raw markdown into citation-tagged markdown plus its link table
    pub(crate) async fn convert(&self, markdown: &str) -> (String, LinkTable) {
        let mut table = LinkTable::new();

        let markdown = JS_TARGET.replace_all(markdown, "<javascript:>");
        let markdown = IMAGE.replace_all(markdown.trim(), "§${1}||${2}§").into_owned();

        let raw_sections: Vec<String> = SECTION_BREAK
            .split(&markdown)
            .filter(|section| !section.trim().is_empty())
            .map(str::to_string)
            .collect();

        let mut sections = Vec::with_capacity(raw_sections.len());
        for section in &raw_sections {
            sections.push(self.cite_section(section, &mut table).await);
        }

        (self.partition(sections), table)
    }

    /// Wraps runs of low-density sections in `<main-content>` markers
    fn partition(&self, sections: Vec<(f64, String)>) -> String {
        let mut out = String::new();
        let mut in_main = false;

        for (score, text) in sections {
            // Nothing but punctuation and symbols
            if !HAS_WORD.is_match(&text) {
                continue;
            }
            let text = text.trim();

            match (in_main, score < self.density_threshold) {
                (true, true) | (false, false) => {
                    out.push_str("\n\n");
                }
                (true, false) => {
                    out.push_str("\n</main-content>\n\n");
                    in_main = false;
                }
                (false, true) => {
                    out.push_str("\n\n<main-content>\n");
                    in_main = true;
                }
            }
            out.push_str(text);
        }

        if in_main {
            out.push_str("\n</main-content>");
        }
        out.trim().to_string()
    }

    /// Tags one section and returns its link density score with the new text
    async fn cite_section(&self, section: &str, table: &mut LinkTable) -> (f64, String) {
        let mut citations = 0usize;

        // Links, resolving nested images first
        let mut text = String::with_capacity(section.len());
        let mut last = 0;
        for found in collect_pairs(&LINK, section) {
            text.push_str(&section[last..found.start]);
            last = found.end;

            let (replacement, cited) = self.cite_link(&found.first, &found.second, table).await;
            if cited {
                citations += 1;
            }
            text.push_str(&replacement);
        }
        text.push_str(&section[last..]);

        // Images outside links
        let context_chars = PLACEHOLDER.replace_all(&text, "").trim().chars().count();
        let mut imaged = String::with_capacity(text.len());
        let mut last = 0;
        for found in collect_pairs(&PLACEHOLDER, &text) {
            imaged.push_str(&text[last..found.start]);
            last = found.end;

            let replacement = self
                .cite_image(found.first.trim(), &found.second, context_chars, table)
                .await;
            imaged.push_str(&replacement);
        }
        imaged.push_str(&text[last..]);

        // Bare URLs in running text
        let mut out = String::with_capacity(imaged.len());
        let mut last = 0;
        for m in WILD_URL.find_iter(&imaged) {
            let Ok(url) = resolve_url(m.as_str(), self.base.as_ref()) else {
                continue;
            };
            if is_social_media_url(&url, self.social_media_domains) {
                continue;
            }

            out.push_str(&imaged[last..m.start()]);
            out.push_str(&table.push_link(url));
            citations += 1;
            last = m.end();
        }
        out.push_str(&imaged[last..]);

        let plain_chars = citation_tag_regex()
            .replace_all(&out, "")
            .trim()
            .chars()
            .count();
        let score = if plain_chars > 0 {
            citations as f64 / plain_chars as f64
        } else {
            EMPTY_SECTION_SCORE
        };

        (score, out)
    }

    /// Replaces one `[label](target)` link; the flag reports whether a `[n]` tag was allocated
    async fn cite_link(&self, label: &str, target: &str, table: &mut LinkTable) -> (String, bool) {
        let (raw_url, title) = split_target(target);

        let nested: Vec<(String, String)> = PLACEHOLDER
            .captures_iter(label)
            .map(|caps| {
                (
                    caps.get(1).map_or("", |m| m.as_str()).trim().to_string(),
                    caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
                )
            })
            .collect();

        let mut label = PLACEHOLDER.replace_all(label, "").trim().to_string();
        if label.is_empty() {
            if let Some((alt, src)) = nested.first() {
                label = self.nested_image_text(alt, src, table).await;
            }
        }
        if !title.is_empty() && !label.contains(&title) {
            label = if label.is_empty() {
                title
            } else {
                format!("{} - {}", title, label)
            };
        }

        if is_dead_target(&raw_url) {
            return (label, false);
        }

        let url = match resolve_url(&raw_url, self.base.as_ref()) {
            Ok(url) => url,
            Err(e) => {
                trace!("Dropping unresolvable link target {}: {}", raw_url, e);
                return (label, false);
            }
        };

        if let Some(address) =
            strip_scheme(&url, "mailto:").or_else(|| strip_scheme(&url, "tel:"))
        {
            let inlined = if label.contains(address) {
                label
            } else {
                format!("{} {}", label, address).trim().to_string()
            };
            return (inlined, false);
        }

        if is_social_media_url(&url, self.social_media_domains) {
            return (format!("{} {}", label, url).trim().to_string(), false);
        }

        let tag = table.push_link(url);
        (format!("{}{}", label, tag), true)
    }

    /// Text for an image that is the whole label of a link
    async fn nested_image_text(&self, alt: &str, src: &str, table: &mut LinkTable) -> String {
        let (src, _) = split_target(src);
        if is_dead_target(&src) {
            return alt.to_string();
        }
        let Ok(src) = resolve_url(&src, self.base.as_ref()) else {
            return alt.to_string();
        };

        let text = if alt.chars().count() > NESTED_IMAGE_MAX_ALT_CHARS
            || !is_describable_image_url(&src)
        {
            alt.to_string()
        } else {
            let description = self.describer.describe(&src).await;
            if description.is_empty() {
                alt.to_string()
            } else {
                description
            }
        };
        format!("{}{}", text, table.push_image(src))
    }

    /// Replaces one image placeholder that is not inside a link
    async fn cite_image(
        &self,
        alt: &str,
        src: &str,
        context_chars: usize,
        table: &mut LinkTable,
    ) -> String {
        let (src, _) = split_target(src);
        if src.is_empty() || src.starts_with('#') {
            return alt.to_string();
        }
        let Ok(src) = resolve_url(&src, self.base.as_ref()) else {
            return alt.to_string();
        };

        let self_explanatory = context_chars > DESCRIBE_MAX_CONTEXT_CHARS
            || alt.chars().count() > DESCRIBE_MAX_ALT_CHARS
            || !is_describable_image_url(&src);
        if self_explanatory {
            return format!("{}{}", alt, table.push_image(src));
        }

        let description = self.describer.describe(&src).await;
        let text = if description.is_empty() {
            alt.to_string()
        } else {
            description
        };
        format!("{}{}", text, table.push_image(src))
    }
}
