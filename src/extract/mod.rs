//! Extraction orchestrator
//!
//! For one focus point, turns articles into persisted infos and discovered
//! links:
//! - documents are split into chunks and each chunk is hashed
//! - a per-focus dedup marker in the cache guarantees at most one LLM call
//!   per (focus, content) pair within the process
//! - model output is parsed, citation tags are resolved and hallucinations
//!   are counted
//! - infos are persisted through the [`InfoStore`](crate::store::InfoStore)
//! - settled article pages get a long page-cache lifetime

mod chunk;
mod coerce;
mod focus;
mod orchestrator;
mod parse;
mod pool;
mod prompts;

pub use chunk::{Chunker, MaxLengthChunker};
pub use coerce::FieldType;
pub use focus::{parse_custom_schema, FieldSchema, FocusPoint};
pub use orchestrator::{Orchestrator, Services};
pub use parse::{
    content_hash, extract_tag, hallucination_rate, parse_schema_block, process_info_blocks,
    resolve_links, split_json_objects, InfoSource, LinkResolution, ResponseTag, SchemaParse,
};
pub use pool::WorkerPool;
pub use prompts::{date_notice, PromptSet};

use thiserror::Error;

use crate::cache::CacheError;
use crate::llm::LlmError;
use crate::store::StoreError;

/// Errors raised while extracting
///
/// `Parse`, `EmptyResult`, `Llm` and `Worker` only fail the current chunk;
/// the others end the run for this focus.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Malformed model output: {0}")]
    Parse(String),

    #[error("Chunk produced no info and no links")]
    EmptyResult,

    #[error("LLM unavailable: {0}")]
    Llm(#[from] LlmError),

    #[error("Worker pool failure: {0}")]
    Worker(String),

    #[error("Invalid custom schema: {0}")]
    SchemaConfig(String),

    #[error("Focus {focus_id} exhausted after {failures} failed chunks")]
    FocusExhausted { focus_id: String, failures: usize },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ExtractError {
    /// Whether the orchestrator may carry on with the next chunk
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExtractError::Parse(_)
                | ExtractError::EmptyResult
                | ExtractError::Llm(_)
                | ExtractError::Worker(_)
        )
    }
}

/// What a run should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// Discover links only; nothing is persisted
    OnlyLink,
    /// Extract information only
    OnlyInfo,
    /// Extract information and discover links
    #[default]
    Both,
}

impl std::str::FromStr for ExtractMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "only_link" | "only-link" => Ok(ExtractMode::OnlyLink),
            "only_info" | "only-info" => Ok(ExtractMode::OnlyInfo),
            "both" => Ok(ExtractMode::Both),
            other => Err(format!("unknown extract mode: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(ExtractError::Parse("x".to_string()).is_recoverable());
        assert!(ExtractError::EmptyResult.is_recoverable());
        assert!(!ExtractError::SchemaConfig("x".to_string()).is_recoverable());
        assert!(!ExtractError::FocusExhausted {
            focus_id: "f".to_string(),
            failures: 12
        }
        .is_recoverable());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("only_link".parse::<ExtractMode>(), Ok(ExtractMode::OnlyLink));
        assert_eq!("only-info".parse::<ExtractMode>(), Ok(ExtractMode::OnlyInfo));
        assert_eq!("both".parse::<ExtractMode>(), Ok(ExtractMode::Both));
        assert!("all".parse::<ExtractMode>().is_err());
    }
}
