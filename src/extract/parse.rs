//! Post-processing of model responses
//!
//! - tagged sections (`<info>`, `<links>`, `<json>`) are pulled out of the reply
//! - citation tags in extracted text are resolved against the link table
//! - link tags are turned into URLs with hallucinations counted
//! - custom-schema JSON is parsed, falling back to a brace scanner

use indexmap::IndexSet;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::coerce::is_blank;
use super::focus::FieldSchema;
use crate::markdown::{citation_tag_regex, LinkTable};
use crate::store::{ExtractedInfo, InfoKind};

lazy_static! {
    static ref INFO_TAG: Regex = Regex::new(r"(?s)<info>(.*?)</info>").unwrap();
    static ref LINKS_TAG: Regex = Regex::new(r"(?s)<links>(.*?)</links>").unwrap();
    static ref JSON_TAG: Regex = Regex::new(r"(?s)<json>(.*?)</json>").unwrap();
    static ref LINK_TAG: Regex = Regex::new(r"\[\d+\]").unwrap();
}

/// Reasoning models wrap their scratchpad in `<think>`; only the text after it counts
const THINK_END: &str = "</think>";

/// Leading phrases models add before the actual content
const BOILERPLATE_PREFIXES: &[&str] = &[
    "根据提供的信息，",
    "根据提供的内容，",
    "Based on the provided information,",
    "Based on the provided content,",
    "According to the provided information,",
    "According to the markdown,",
];

/// Replies that mean "nothing found"
const NO_INFO_PHRASES: &[&str] = &[
    "无相关信息",
    "没有找到",
    "未找到",
    "无法提取",
    "没有发现",
    "No relevant information",
    "No information",
    "No matching information",
    "Not found",
    "Unable to extract",
    "Nothing relevant",
];

/// Sections a reply can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseTag {
    Info,
    Links,
    Json,
}

impl ResponseTag {
    fn regex(&self) -> &'static Regex {
        match self {
            ResponseTag::Info => &INFO_TAG,
            ResponseTag::Links => &LINKS_TAG,
            ResponseTag::Json => &JSON_TAG,
        }
    }
}

/// Returns every non-overlapping `<tag>...</tag>` body, in order
///
/// Anything up to the last `</think>` is ignored.
pub fn extract_tag(tag: ResponseTag, response: &str) -> Vec<String> {
    let body = match response.rfind(THINK_END) {
        Some(pos) => &response[pos + THINK_END.len()..],
        None => response,
    };

    tag.regex()
        .captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Dedup key for a chunk: md5 of its lower-cased, whitespace-free text
///
/// Returns `None` when the normalized text is `min_chars` long or shorter,
/// which is typically page furniture with nothing to extract.
pub fn content_hash(text: &str, min_chars: usize) -> Option<String> {
    let normalized: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    if normalized.chars().count() <= min_chars {
        debug!("Chunk too short to hash: {:?}", normalized);
        return None;
    }
    Some(format!("{:x}", md5::compute(normalized.as_bytes())))
}

/// `round(hallucinated / total * 100, 2)`, or `None` when nothing was produced
pub fn hallucination_rate(hallucinated: usize, total: usize) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let rate = hallucinated as f64 / total as f64 * 100.0;
    Some((rate * 100.0).round() / 100.0)
}

/// Page-level context shared by every info extracted from one article
#[derive(Debug, Clone, Copy)]
pub struct InfoSource<'a> {
    pub url: &'a str,
    pub title: &'a str,
    pub author: &'a str,
    pub publish_date: &'a str,
    pub link_table: &'a LinkTable,
    /// The full citation markdown, used to tell invented tags from literal text
    pub markdown: &'a str,
}

/// Turns raw `<info>`/`<json>` bodies into infos
///
/// Journal infos are prefixed with `//author date//`. Tags found in the link
/// table become reference lines; tags that are neither in the table nor
/// anywhere in the markdown are invented and removed. Schema blocks lose all
/// tags since they must stay parseable JSON.
pub fn process_info_blocks(
    blocks: &[String],
    kind: InfoKind,
    source: &InfoSource<'_>,
    created: &str,
) -> Vec<ExtractedInfo> {
    let prefix = match kind {
        InfoKind::Schema => String::new(),
        InfoKind::Journal => journal_prefix(source.author, source.publish_date),
    };

    let mut infos = Vec::new();
    for block in blocks {
        let mut block = block.trim();
        if block.chars().count() < 3 {
            continue;
        }
        for p in BOILERPLATE_PREFIXES {
            if let Some(rest) = block.strip_prefix(p) {
                block = rest.trim_start();
            }
        }
        if NO_INFO_PHRASES.iter().any(|p| starts_with_ignore_case(block, p)) {
            continue;
        }

        let tags: IndexSet<String> = citation_tag_regex()
            .find_iter(block)
            .map(|m| m.as_str().to_string())
            .collect();

        let mut content = block.to_string();
        let mut references = String::new();
        for tag in &tags {
            if let Some(url) = source.link_table.get(tag) {
                references.push_str(&format!("{}: {}\n", tag, url));
            } else if !source.markdown.contains(tag.as_str()) {
                info!(
                    "[QualityAssessment] info extraction produced tag {} absent from the source markdown",
                    tag
                );
                content = content.replace(tag.as_str(), "");
            }
            if kind == InfoKind::Schema {
                content = content.replace(tag.as_str(), "");
            }
        }

        infos.push(ExtractedInfo {
            kind,
            content: format!("{}{}", prefix, content),
            references,
            source_url: source.url.to_string(),
            source_title: source.title.to_string(),
            created: created.to_string(),
        });
    }
    infos
}

fn journal_prefix(author: &str, publish_date: &str) -> String {
    let date = publish_date.split('T').next().unwrap_or_default();
    if author.is_empty() && date.is_empty() {
        String::new()
    } else {
        format!("//{} {}//", author, date)
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
}

/// Links discovered in `<links>` output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkResolution {
    /// Resolved URLs in first-mention order
    pub links: IndexSet<String>,
    /// Link tags seen, including repeats
    pub total: usize,
    /// Tags with no link table entry
    pub hallucinated: usize,
}

impl LinkResolution {
    pub fn rate(&self) -> Option<f64> {
        hallucination_rate(self.hallucinated, self.total)
    }
}

/// Resolves every `[n]` tag of the link blocks against the link table
pub fn resolve_links(blocks: &[String], table: &LinkTable) -> LinkResolution {
    let joined = blocks.join("\n");
    let mut resolution = LinkResolution::default();

    for tag in LINK_TAG.find_iter(&joined) {
        resolution.total += 1;
        match table.get(tag.as_str()) {
            Some(url) => {
                resolution.links.insert(url.to_string());
            }
            None => resolution.hallucinated += 1,
        }
    }
    resolution
}

/// Splits text into balanced top-level `{...}` segments and parses each
///
/// Braces inside JSON string literals are not recognised, so an object with
/// a literal `{` or `}` in a value may be mis-split and end up unparsed.
pub fn split_json_objects(text: &str) -> (Vec<Value>, Vec<String>) {
    let text = text.trim();
    let text = match text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        Some(inner) => inner.trim(),
        None => text,
    };

    let mut segments = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    segments.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    let mut parsed = Vec::new();
    let mut unparsed = Vec::new();
    for segment in segments {
        match serde_json::from_str::<Value>(segment) {
            Ok(value) => parsed.push(value),
            Err(_) => unparsed.push(segment.to_string()),
        }
    }
    (parsed, unparsed)
}

/// Outcome of checking one `<json>` block against a schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaParse {
    /// Records with exactly the schema's keys, none entirely blank
    pub records: Vec<Map<String, Value>>,
    /// Objects found in the block before filtering
    pub total: usize,
    /// Invented keys, missing keys and fallback parses
    pub hallucinated: usize,
    /// Segments the brace scanner could not parse
    pub unparsed: Vec<String>,
}

impl SchemaParse {
    pub fn rate(&self) -> Option<f64> {
        hallucination_rate(self.hallucinated, self.total)
    }
}

/// Parses a schema-mode block into records shaped like `schema`
pub fn parse_schema_block(block: &str, schema: &FieldSchema) -> SchemaParse {
    let mut result = SchemaParse::default();

    let objects = match serde_json::from_str::<Value>(block.trim()) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Object(obj)) => vec![Value::Object(obj)],
        _ => {
            debug!("Schema block is not a JSON list, falling back to the brace scanner");
            result.hallucinated += 1;
            let (parsed, unparsed) = split_json_objects(block);
            if !unparsed.is_empty() {
                info!("Some generated parts could not be parsed: {:?}", unparsed);
            }
            result.unparsed = unparsed;
            parsed
        }
    };

    result.total = objects.len();
    for object in objects {
        let Value::Object(mut record) = object else {
            result.hallucinated += 1;
            continue;
        };

        let before = record.len();
        record.retain(|key, _| schema.contains_key(key));
        result.hallucinated += before - record.len();

        for key in schema.keys() {
            if !record.contains_key(key) {
                result.hallucinated += 1;
                record.insert(key.clone(), Value::String(String::new()));
            }
        }

        // Schema order
        let ordered: Map<String, Value> = schema
            .keys()
            .filter_map(|key| record.remove(key).map(|v| (key.clone(), v)))
            .collect();

        if ordered.values().all(is_blank) {
            continue;
        }
        result.records.push(ordered);
    }
    result
}
