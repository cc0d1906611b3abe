//! Citation tags and the per-document link table

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

lazy_static! {
    static ref CITATION_TAG: Regex = Regex::new(r"\[(?:img)?\d+\]").unwrap();
}

/// Matches `[n]` and `[imgN]` citation tags
pub fn citation_tag_regex() -> &'static Regex {
    &CITATION_TAG
}

/// Mapping from citation tag to absolute URL for one document
///
/// Link tags (`[1]`, `[2]`, ...) and image tags (`[img1]`, `[img2]`, ...)
/// are numbered by independent counters. Entries keep insertion order so the
/// table reads in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTable {
    entries: IndexMap<String, String>,
    links: usize,
    images: usize,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a link target and returns its freshly allocated `[n]` tag
    pub fn push_link(&mut self, url: impl Into<String>) -> String {
        self.links += 1;
        let tag = format!("[{}]", self.links);
        self.entries.insert(tag.clone(), url.into());
        tag
    }

    /// Records an image source and returns its freshly allocated `[imgN]` tag
    pub fn push_image(&mut self, url: impl Into<String>) -> String {
        self.images += 1;
        let tag = format!("[img{}]", self.images);
        self.entries.insert(tag.clone(), url.into());
        tag
    }

    /// Looks up the URL behind a tag such as `[3]` or `[img1]`
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.entries.get(tag).map(String::as_str)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(tag, url)` pairs in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for LinkTable {
    /// Rebuilds a table, restoring both counters from the highest tag seen
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut table = LinkTable::default();
        for (tag, url) in iter {
            let inner = tag.trim_start_matches('[').trim_end_matches(']');
            if let Some(n) = inner.strip_prefix("img").and_then(|n| n.parse::<usize>().ok()) {
                table.images = table.images.max(n);
            } else if let Ok(n) = inner.parse::<usize>() {
                table.links = table.links.max(n);
            }
            table.entries.insert(tag, url);
        }
        table
    }
}

impl Serialize for LinkTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LinkTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = IndexMap::<String, String>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
