//! Database collaborator for focus points and extracted infos
//!
//! The orchestrator talks to the database only through two traits:
//! - [`FocusSource`] supplies the activated focus points for a cycle
//! - [`InfoStore`] persists extracted infos
//!
//! [`SqliteStore`] implements both on a single SQLite file. Writes are
//! retried with bounded exponential backoff by [`with_retry`].

mod retry;
mod schema;
mod sqlite;

pub use retry::{with_retry, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::FocusPoint;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Focus point not found: {0}")]
    FocusNotFound(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// How an info was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoKind {
    /// JSON records following a focus point's custom schema
    Schema,
    /// Free-text summary
    Journal,
}

impl InfoKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Journal => "journal",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "schema" => Some(Self::Schema),
            "journal" => Some(Self::Journal),
            _ => None,
        }
    }
}

/// One piece of mined information, ready to persist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedInfo {
    pub kind: InfoKind,
    pub content: String,
    /// `tag: url` lines for every citation the content referred to
    pub references: String,
    pub source_url: String,
    pub source_title: String,
    /// Local time, `%Y-%m-%d %H:%M:%S`
    pub created: String,
}

/// A persisted info row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoRecord {
    pub id: i64,
    pub focus_id: String,
    pub focus_statement: String,
    #[serde(flatten)]
    pub info: ExtractedInfo,
}

/// Sink for extracted infos
#[async_trait]
pub trait InfoStore: Send + Sync {
    /// Persists one info for a focus point and returns its row id
    ///
    /// # Arguments
    ///
    /// * `focus_statement` - Human-readable summary of the focus (`restrictions(keywords) - role/purpose`)
    /// * `focus_id` - Focus point the info belongs to
    /// * `info` - The info itself
    async fn add_info(
        &self,
        focus_statement: &str,
        focus_id: &str,
        info: &ExtractedInfo,
    ) -> StoreResult<i64>;
}

/// Source of focus point definitions
#[async_trait]
pub trait FocusSource: Send + Sync {
    /// Loads every focus point whose `activated` flag is set
    async fn load_activated_focus_points(&self) -> StoreResult<Vec<FocusPoint>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_kind_db_strings() {
        for kind in &[InfoKind::Schema, InfoKind::Journal] {
            assert_eq!(InfoKind::from_db_string(kind.to_db_string()), Some(*kind));
        }
        assert_eq!(InfoKind::from_db_string("other"), None);
    }
}
