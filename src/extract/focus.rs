//! Focus points and custom field schemas

use std::collections::BTreeMap;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::coerce::FieldType;
use super::ExtractError;

lazy_static! {
    static ref FIELD_SEPARATOR: Regex = Regex::new(r"[|｜]").unwrap();
    static ref FIELD: Regex = Regex::new(r"^(.*?)\s*(?:（(.*?)）|\((.*?)\))?$").unwrap();
    static ref STRAY_BRACKETS: Regex = Regex::new(r"^[（()]*(.*?)[）)]*$").unwrap();
    static ref HAS_LETTER: Regex = Regex::new(r"[a-zA-Z\x{4e00}-\x{9fff}]").unwrap();
    static ref SINGLE_ALNUM: Regex = Regex::new(r"^[A-Za-z0-9]$").unwrap();
}

/// A topic the user wants mined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusPoint {
    pub id: String,
    /// What to look for
    pub keywords: String,
    #[serde(default)]
    pub explanation: String,
    /// Selection conditions (time limits, regions, ...)
    #[serde(default)]
    pub restrictions: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub purpose: String,
    /// `field | field（hint） | ...`; empty for free-text extraction
    #[serde(default)]
    pub custom_schema: String,
    /// Declared field types; undeclared fields are TEXT
    #[serde(default)]
    pub field_types: BTreeMap<String, FieldType>,
    #[serde(default = "default_activated")]
    pub activated: bool,
}

fn default_activated() -> bool {
    true
}

impl Default for FocusPoint {
    fn default() -> Self {
        Self {
            id: String::new(),
            keywords: String::new(),
            explanation: String::new(),
            restrictions: String::new(),
            role: String::new(),
            purpose: String::new(),
            custom_schema: String::new(),
            field_types: BTreeMap::new(),
            activated: default_activated(),
        }
    }
}

impl FocusPoint {
    /// One-line summary stored with every info: `restrictions(keywords) - role/purpose`
    pub fn statement(&self) -> String {
        let mut statement = format!("{}({})", self.restrictions, self.keywords);
        let role_purpose = [self.role.as_str(), self.purpose.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        if !role_purpose.is_empty() {
            statement.push_str(" - ");
            statement.push_str(&role_purpose);
        }
        statement
    }

    /// Declared type of a schema field
    pub fn field_type(&self, field: &str) -> FieldType {
        self.field_types.get(field).copied().unwrap_or_default()
    }
}

/// Field name to hint, in declaration order; the hint is `(text)` or empty
pub type FieldSchema = IndexMap<String, String>;

/// Parses a custom schema such as `姓名 | 联系方式（仅限手机号）`
///
/// Fields are separated by `|` or `｜` and may carry a hint in ASCII or
/// full-width parentheses. Field names that are a single ASCII letter or
/// digit, or contain no letters at all, are dropped.
///
/// # Returns
///
/// * `Ok(schema)` - Empty when the input is blank
/// * `Err(ExtractError::SchemaConfig)` - Input was given but no field survived
///
/// # Examples
///
/// ```
/// use focusmine::extract::parse_custom_schema;
///
/// let schema = parse_custom_schema("姓名 | 联系方式（仅限手机号）").unwrap();
/// assert_eq!(schema["姓名"], "");
/// assert_eq!(schema["联系方式"], "(仅限手机号)");
/// ```
pub fn parse_custom_schema(raw: &str) -> Result<FieldSchema, ExtractError> {
    let raw = raw.trim();
    let mut schema = FieldSchema::new();
    if raw.is_empty() {
        return Ok(schema);
    }

    for field in FIELD_SEPARATOR.split(raw).map(str::trim).filter(|f| !f.is_empty()) {
        let Some(caps) = FIELD.captures(field) else {
            continue;
        };

        let name = strip_brackets(caps.get(1).map_or("", |m| m.as_str()));
        if name.is_empty() || SINGLE_ALNUM.is_match(&name) || !HAS_LETTER.is_match(&name) {
            continue;
        }

        let hint = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| strip_brackets(m.as_str()))
            .unwrap_or_default();

        let hint = if hint.is_empty() {
            String::new()
        } else {
            format!("({})", hint)
        };
        schema.insert(name, hint);
    }

    if schema.is_empty() {
        return Err(ExtractError::SchemaConfig(format!(
            "no usable field in custom schema {:?}",
            raw
        )));
    }
    Ok(schema)
}

fn strip_brackets(s: &str) -> String {
    let s = s.trim();
    STRAY_BRACKETS
        .captures(s)
        .and_then(|c| c.get(1))
        .map_or(s, |m| m.as_str())
        .trim()
        .to_string()
}
