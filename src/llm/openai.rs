//! OpenAI-compatible chat completion client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{ChatMessage, LlmClient, LlmError};
use crate::config::LlmConfig;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat client for any endpoint speaking the OpenAI `/chat/completions` API
///
/// All requests from one client (and its clones) share a semaphore, so
/// `concurrency` caps in-flight requests process-wide. Each request is tried
/// up to `max_retries` times; the wait between attempts starts at
/// `initial_backoff` and doubles after every failure.
///
/// | Failure                  | Classified as | Retried |
/// |--------------------------|---------------|---------|
/// | 429                      | RateLimited   | yes     |
/// | 400, 401, 403, 404, 413  | Client        | no      |
/// | 5xx                      | Server        | yes     |
/// | transport / other status | Unknown       | yes     |
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    semaphore: Arc<Semaphore>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl OpenAiClient {
    /// Builds a client from the `[llm]` config section
    ///
    /// The API key is read from the environment variable named by
    /// `api-key-env`; endpoints that need no key work without it.
    ///
    /// # Arguments
    ///
    /// * `config` - LLM configuration
    ///
    /// # Returns
    ///
    /// * `Ok(OpenAiClient)` - Ready client
    /// * `Err(LlmError)` - The HTTP client could not be built
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| LlmError::NotConfigured(format!("HTTP client: {}", e)))?;

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());

        if api_key.is_none() {
            debug!("No API key in ${}, sending unauthenticated requests", config.api_key_env);
        }

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
            max_retries: config.max_retries.max(1),
            initial_backoff: Duration::from_secs(config.initial_backoff_seconds),
        })
    }

    /// Overrides the first backoff delay
    pub fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Overrides the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    async fn attempt(&self, request: &ChatRequest<'_>) -> Result<String, LlmError> {
        let model = request.model;
        let mut builder = self.http.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Unknown(format!("{} request timeout", model))
            } else {
                LlmError::Unknown(format!("{} transport error: {}", model, e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            let body: ChatResponse = response
                .json()
                .await
                .map_err(|e| LlmError::Unknown(format!("{} malformed response: {}", model, e)))?;

            return Ok(body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default());
        }

        let message = response.text().await.unwrap_or_default();
        Err(classify(model, status, message))
    }
}

fn classify(model: &str, status: StatusCode, message: String) -> LlmError {
    let model = model.to_string();
    match status.as_u16() {
        429 => LlmError::RateLimited { model, message },
        code @ (400 | 401 | 403 | 404 | 413) => LlmError::Client {
            model,
            status: code,
            message,
        },
        code if status.is_server_error() => LlmError::Server {
            model,
            status: code,
            message,
        },
        code => LlmError::Unknown(format!("{} unexpected status {}: {}", model, code, message)),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        if model.is_empty() {
            return Err(LlmError::NotConfigured("no model name given".to_string()));
        }

        let request = ChatRequest {
            model,
            messages,
            temperature,
            max_tokens,
        };

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| LlmError::Unknown(format!("concurrency limiter closed: {}", e)))?;

        let mut wait = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match self.attempt(&request).await {
                Ok(text) => {
                    debug!(model = model, response_length = text.len(), "LLM response received");
                    return Ok(text);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(model = model, error = %e, "LLM request rejected");
                    return Err(e);
                }
                Err(e) if attempt >= self.max_retries => {
                    warn!(
                        model = model,
                        error = %e,
                        "LLM request failed, already retried {} times",
                        self.max_retries
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        model = model,
                        error = %e,
                        "LLM request failed, retry {}/{}",
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(wait).await;
                    wait *= 2;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAiClient {
        let config = LlmConfig {
            api_base: format!("{}/v1", server.uri()),
            api_key_env: "FOCUSMINE_TEST_UNSET_KEY".to_string(),
            max_retries: 3,
            ..LlmConfig::default()
        };
        OpenAiClient::from_config(&config)
            .unwrap()
            .with_api_key("secret")
            .with_backoff(Duration::from_millis(5))
    }

    fn reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(reply("<info>found</info>"))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server)
            .complete(&[ChatMessage::user("hi")], "m1", 0.1, None)
            .await
            .unwrap();
        assert_eq!(text, "<info>found</info>");
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(reply("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server)
            .complete(&[ChatMessage::user("hi")], "m1", 0.1, Some(64))
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&[ChatMessage::user("hi")], "m1", 0.1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Client { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&[ChatMessage::user("hi")], "m1", 0.1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_missing_content_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&server)
            .await;

        let text = client_for(&server)
            .complete(&[ChatMessage::user("hi")], "m1", 0.1, None)
            .await
            .unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_empty_model_is_not_configured() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .complete(&[ChatMessage::user("hi")], "", 0.1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured(_)));
    }
}
