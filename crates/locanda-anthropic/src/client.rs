// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use locanda_core::{ChatProvider, ChatRequest, ChatResponse, LocandaError};

use crate::retry::{
    parse_retry_after, retry_delay, should_retry_error, should_retry_status, RetryConfig,
};
use crate::types::{from_wire_response, to_wire_request, ApiErrorResponse, WireResponse};

/// Base URL for the Anthropic Messages API.
const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Prefix marking an Anthropic OAuth access token, which needs Bearer auth
/// and the oauth beta header instead of `x-api-key`.
const OAUTH_TOKEN_PREFIX: &str = "sk-ant-oat";

const OAUTH_BETA_HEADER: &str = "claude-code-20250219,oauth-2025-04-20";

/// [`ChatProvider`] backed by the Anthropic Messages API.
///
/// Transient failures (429, 5xx, transport timeouts) are retried with
/// exponential backoff and jitter; a `Retry-After` hint from the server
/// takes precedence over the computed delay.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    retry: RetryConfig,
    base_url: String,
}

impl AnthropicClient {
    /// Creates a client for the given key and model.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Result<Self, LocandaError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LocandaError::Config("model API key is empty".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LocandaError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            api_key,
            model: model.into(),
            max_tokens,
            retry: RetryConfig::default(),
            base_url: API_BASE_URL.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Overrides the retry policy.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn is_oauth_token(&self) -> bool {
        self.api_key.starts_with(OAUTH_TOKEN_PREFIX)
    }

    fn build_request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let req = self.http.post(&self.base_url).json(body);
        if self.is_oauth_token() {
            req.header("Authorization", format!("Bearer {}", self.api_key))
                .header("anthropic-beta", OAUTH_BETA_HEADER)
        } else {
            req.header("x-api-key", &self.api_key)
        }
    }
}

#[async_trait]
impl ChatProvider for AnthropicClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LocandaError> {
        let wire = to_wire_request(&request, &self.model, self.max_tokens);
        let body = serde_json::to_value(&wire).map_err(|e| LocandaError::Provider {
            message: format!("failed to encode request: {e}"),
            source: Some(Box::new(e)),
        })?;

        let mut last_error: Option<LocandaError> = None;

        for attempt in 0..=self.retry.max_retries {
            let response = match self.build_request(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    if !should_retry_error(&e) || attempt == self.retry.max_retries {
                        return Err(LocandaError::Provider {
                            message: format!("HTTP request failed: {e}"),
                            source: Some(Box::new(e)),
                        });
                    }
                    let delay = retry_delay(&self.retry, attempt, None);
                    warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64,
                        "transport error, retrying");
                    last_error = Some(LocandaError::Provider {
                        message: format!("HTTP request failed: {e}"),
                        source: Some(Box::new(e)),
                    });
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            debug!(status = %status, attempt, "messages response received");

            if status.is_success() {
                let wire: WireResponse =
                    response.json().await.map_err(|e| LocandaError::Provider {
                        message: format!("failed to decode response: {e}"),
                        source: Some(Box::new(e)),
                    })?;
                return from_wire_response(wire);
            }

            if should_retry_status(status) && attempt < self.retry.max_retries {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let body_text = response.text().await.unwrap_or_default();
                let delay = retry_delay(&self.retry, attempt, retry_after);
                warn!(status = %status, body = body_text.as_str(),
                    delay_ms = delay.as_millis() as u64, "transient API error, retrying");
                last_error = Some(LocandaError::provider(format!(
                    "API returned {status}: {body_text}"
                )));
                tokio::time::sleep(delay).await;
                continue;
            }

            // Non-retryable status, or retries exhausted.
            let body_text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&body_text) {
                Ok(api_err) => format!(
                    "Anthropic API error ({}): {}",
                    api_err.error.error_type, api_err.error.message
                ),
                Err(_) => format!("API returned {status}: {body_text}"),
            };
            return Err(LocandaError::provider(message));
        }

        Err(last_error
            .unwrap_or_else(|| LocandaError::provider("request failed after retries")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locanda_core::{Message, ResponseKind};
    use std::time::Duration;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            jitter: 0.0,
        }
    }

    fn test_client(base_url: &str, api_key: &str) -> AnthropicClient {
        AnthropicClient::new(api_key, "claude-sonnet-4-20250514", 1024)
            .unwrap()
            .with_retry_config(fast_retry())
            .with_base_url(base_url.to_string())
    }

    fn test_request() -> ChatRequest {
        ChatRequest {
            system: "You are helpful.".into(),
            messages: vec![Message::user_text("Hello")],
            tools: vec![],
        }
    }

    fn text_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "msg_test",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })
    }

    #[tokio::test]
    async fn chat_success_returns_text_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("Hi there!")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), "test-key");
        let resp = client.chat(test_request()).await.unwrap();
        assert_eq!(resp.kind, ResponseKind::Text);
        assert_eq!(resp.text, "Hi there!");
        assert_eq!(resp.usage.input_tokens, 10);
    }

    #[tokio::test]
    async fn chat_decodes_tool_use() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "id": "msg_tool",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "execute_sql",
                 "input": {"query": "SELECT 1"}}
            ],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 15}
        });
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), "test-key");
        let resp = client.chat(test_request()).await.unwrap();
        assert_eq!(resp.kind, ResponseKind::ToolUse);
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "execute_sql");
        assert_eq!(resp.tool_calls[0].arguments["query"], "SELECT 1");
    }

    #[tokio::test]
    async fn chat_retries_rate_limit_then_succeeds() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"type": "rate_limit_error", "message": "Rate limited"}
        });

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(&error_body)
                    .insert_header("retry-after", "0"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("After retry")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), "test-key");
        let resp = client.chat(test_request()).await.unwrap();
        assert_eq!(resp.text, "After retry");
    }

    #[tokio::test]
    async fn chat_fails_fast_on_bad_request() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"type": "invalid_request_error", "message": "Bad model"}
        });
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(&error_body))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), "test-key");
        let err = client.chat(test_request()).await.unwrap_err().to_string();
        assert!(err.contains("invalid_request_error"), "got: {err}");
    }

    #[tokio::test]
    async fn chat_exhausts_retries_on_persistent_503() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "error": {"type": "overloaded_error", "message": "Service overloaded"}
        });
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503).set_body_json(&error_body))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), "test-key");
        let err = client.chat(test_request()).await.unwrap_err().to_string();
        assert!(err.contains("overloaded_error"), "got: {err}");
    }

    #[tokio::test]
    async fn oauth_tokens_use_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header(
                "Authorization",
                "Bearer sk-ant-oat01-test-token",
            ))
            .and(header_exists("anthropic-beta"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("ok")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri(), "sk-ant-oat01-test-token");
        let resp = client.chat(test_request()).await;
        assert!(resp.is_ok(), "oauth headers should match: {resp:?}");
    }

    #[test]
    fn empty_key_is_a_config_error() {
        let err = AnthropicClient::new("  ", "model", 1024).unwrap_err();
        assert!(matches!(err, LocandaError::Config(_)));
    }
}
