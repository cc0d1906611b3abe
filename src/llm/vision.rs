//! Image description through a vision-capable chat model

use std::sync::Arc;

use async_trait::async_trait;

use super::{ChatMessage, LlmClient, LlmError};
use crate::markdown::ImageDescriber;

/// Instruction sent alongside every image
pub const VISION_PROMPT: &str = "Extract all text from the image. If the image contains no text, very little text, \
or is judged to be just a website logo, trademark, icon, etc., output NA. \
Do not provide any explanations, reasons, or descriptions; output only the extracted text or NA.";

/// [`ImageDescriber`] backed by a vision model
///
/// With an empty model name every image gets an empty description, which
/// makes the transformer fall back to alt text.
pub struct VisionDescriber {
    client: Arc<dyn LlmClient>,
    model: String,
}

impl VisionDescriber {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ImageDescriber for VisionDescriber {
    async fn describe(&self, image_url: &str) -> Result<String, LlmError> {
        if self.model.is_empty() {
            return Ok(String::new());
        }

        let messages = [ChatMessage::user_with_image(image_url, VISION_PROMPT)];
        let text = self.client.complete(&messages, &self.model, 0.1, None).await?;
        let text = text.trim();

        if text.eq_ignore_ascii_case("na") {
            Ok(String::new())
        } else {
            Ok(text.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted {
        reply: String,
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl LlmClient for Scripted {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            model: &str,
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<String, LlmError> {
            let body = serde_json::to_string(&messages[0]).unwrap();
            self.seen.lock().unwrap().push((model.to_string(), body));
            Ok(self.reply.clone())
        }
    }

    fn scripted(reply: &str) -> Arc<Scripted> {
        Arc::new(Scripted {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_describe_sends_image_to_vision_model() {
        let llm = scripted(" Sale ends Friday \n");
        let describer = VisionDescriber::new(llm.clone(), "vl-1");

        let text = describer.describe("https://a.com/banner.png").await.unwrap();
        assert_eq!(text, "Sale ends Friday");

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "vl-1");
        assert!(seen[0].1.contains("https://a.com/banner.png"));
    }

    #[tokio::test]
    async fn test_na_means_nothing() {
        let describer = VisionDescriber::new(scripted("NA"), "vl-1");
        assert_eq!(describer.describe("https://a.com/logo.png").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_no_model_skips_call() {
        let llm = scripted("text");
        let describer = VisionDescriber::new(llm.clone(), "");

        assert_eq!(describer.describe("https://a.com/x.png").await.unwrap(), "");
        assert!(llm.seen.lock().unwrap().is_empty());
    }
}
