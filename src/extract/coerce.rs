//! Type coercion for custom-schema field values

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Declared type of a custom-schema field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    #[default]
    Text,
    Integer,
    Real,
    Boolean,
    Json,
}

impl FieldType {
    /// Coerces a model-produced value to this type
    ///
    /// Returns `None` when the value cannot be represented; the caller drops
    /// the field rather than inventing a value.
    ///
    /// # Examples
    ///
    /// ```
    /// use focusmine::extract::FieldType;
    /// use serde_json::json;
    ///
    /// assert_eq!(FieldType::Integer.coerce(&json!("3.0")), Some(json!(3)));
    /// assert_eq!(FieldType::Boolean.coerce(&json!("")), Some(json!(false)));
    /// assert_eq!(FieldType::Json.coerce(&json!("{not json")), None);
    /// ```
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match self {
            FieldType::Text => Some(Value::String(as_text(value))),
            FieldType::Integer => as_float(value).map(|f| Value::from(f.trunc() as i64)),
            FieldType::Real => as_float(value).and_then(Number::from_f64).map(Value::Number),
            FieldType::Boolean => as_bool(value).map(Value::Bool),
            FieldType::Json => match value {
                Value::Object(_) | Value::Array(_) => Some(value.clone()),
                Value::String(s) => serde_json::from_str::<Value>(s).ok(),
                _ => None,
            },
        }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

fn as_bool(value: &Value) -> Option<bool> {
    let text = match value {
        Value::Bool(b) => return Some(*b),
        Value::String(s) => s.trim().to_lowercase(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    match text.as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Whether a field value carries nothing
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Coerces every field of a record by its declared type (TEXT when undeclared)
///
/// Rejected fields are removed. Returns `None` when nothing non-blank is left.
pub(crate) fn coerce_record(
    record: Map<String, Value>,
    declared: impl Fn(&str) -> FieldType,
) -> Option<Map<String, Value>> {
    let mut out = Map::new();
    for (key, value) in record {
        match declared(&key).coerce(&value) {
            Some(coerced) => {
                out.insert(key, coerced);
            }
            None => tracing::debug!("Dropping field {}: {} is not a valid {:?}", key, value, declared(&key)),
        }
    }

    if out.values().all(is_blank) {
        None
    } else {
        Some(out)
    }
}
