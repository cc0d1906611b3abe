//! Image-to-text collaborator used when an image carries the content

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::llm::LlmError;

/// Default number of descriptions remembered per transformer
pub const DEFAULT_MEMO_CAPACITY: usize = 1000;

/// Turns an image URL into a short textual description
///
/// An empty description means "nothing worth keeping"; callers fall back to
/// the image's alt text.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, image_url: &str) -> Result<String, LlmError>;
}

/// Describer used when no vision model is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDescriber;

#[async_trait]
impl ImageDescriber for NoDescriber {
    async fn describe(&self, _image_url: &str) -> Result<String, LlmError> {
        Ok(String::new())
    }
}

/// Remembers successful descriptions per URL
///
/// Failures are logged, reported as an empty description and not
/// remembered, so a later document may try the same image again. The
/// oldest entry is evicted once `capacity` is reached.
pub struct MemoizedDescriber {
    inner: Arc<dyn ImageDescriber>,
    memo: Mutex<IndexMap<String, String>>,
    capacity: usize,
}

impl MemoizedDescriber {
    pub fn new(inner: Arc<dyn ImageDescriber>, capacity: usize) -> Self {
        Self {
            inner,
            memo: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Describes an image, never failing
    pub async fn describe(&self, image_url: &str) -> String {
        if let Some(hit) = self.memo.lock().await.get(image_url) {
            return hit.clone();
        }

        let description = match self.inner.describe(image_url).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("Image description failed for {}: {}", image_url, e);
                return String::new();
            }
        };

        debug!("Described image {} ({} chars)", image_url, description.len());

        let mut memo = self.memo.lock().await;
        if memo.len() >= self.capacity && !memo.contains_key(image_url) {
            memo.shift_remove_index(0);
        }
        memo.insert(image_url.to_string(), description.clone());
        description
    }

    /// Number of remembered descriptions
    pub async fn len(&self) -> usize {
        self.memo.lock().await.len()
    }
}
