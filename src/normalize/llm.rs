//! OpenAI-compatible chat client for heading-level correction.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::LlmConfig;
use crate::types::RagError;

use super::Heading;

const SYSTEM_PROMPT: &str = "Given the following headers with incorrect levels, adjust them to \
the correct hierarchical structure. Do not rearrange the headers. Respond exclusively with a \
JSON object of the form {\"headers\": [{\"text\": string, \"level\": integer}, ...]} containing \
exactly one entry per input header, in the same order.";

#[derive(Serialize, Deserialize)]
struct HeadingPayload {
    headers: Vec<Heading>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// Calls an OpenAI-compatible `/chat/completions` endpoint to reassign
/// heading levels, retrying up to the configured attempt budget.
pub struct HeadingCorrectionClient {
    http: Option<reqwest::Client>,
    config: LlmConfig,
}

impl HeadingCorrectionClient {
    /// Builds a client for the given endpoint settings.
    ///
    /// If the HTTP client cannot be constructed every correction attempt
    /// fails, which the normalizer treats as its clamping fallback.
    pub fn new(config: LlmConfig) -> Self {
        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
        {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(error = %err, "HTTP client construction failed, heading correction unavailable");
                None
            }
        };
        Self { http, config }
    }

    /// Returns corrected headings, in input order.
    pub async fn correct(&self, headings: &[Heading]) -> Result<Vec<Heading>, RagError> {
        let payload = HeadingPayload {
            headers: headings.to_vec(),
        };
        let query =
            serde_json::to_string(&payload).map_err(|err| RagError::Llm(err.to_string()))?;

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            match self.request(&query).await {
                Ok(corrected) => return Ok(corrected),
                Err(err) => {
                    tracing::debug!(attempt, error = %err, "heading correction attempt failed");
                    last_error = err.to_string();
                }
            }
        }
        Err(RagError::Llm(format!(
            "all {} attempts failed: {last_error}",
            self.config.max_attempts
        )))
    }

    async fn request(&self, query: &str) -> Result<Vec<Heading>, RagError> {
        let http = self
            .http
            .as_ref()
            .ok_or_else(|| RagError::Llm("HTTP client unavailable".to_string()))?;
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": query},
            ],
            "temperature": 0,
        });

        let mut request = http.post(&url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| RagError::Llm(err.to_string()))?
            .error_for_status()
            .map_err(|err| RagError::Llm(err.to_string()))?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| RagError::Llm(err.to_string()))?;
        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| RagError::Llm("response contained no choices".to_string()))?;

        let payload: HeadingPayload = serde_json::from_str(strip_code_fence(content))
            .map_err(|err| RagError::Llm(format!("unparseable heading payload: {err}")))?;
        Ok(payload.headers)
    }
}

/// Models often wrap JSON answers in a Markdown fence; strip it.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn heading(text: &str, level: usize) -> Heading {
        Heading {
            text: text.to_string(),
            level,
        }
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn correct_parses_chat_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": "{\"headers\": [{\"text\": \"Intro\", \"level\": 1}, {\"text\": \"Detail\", \"level\": 2}]}"
                        }
                    }]
                }));
            })
            .await;

        let client = HeadingCorrectionClient::new(
            LlmConfig::new(server.base_url()).with_api_key("test-key"),
        );
        let corrected = client
            .correct(&[heading("Intro", 3), heading("Detail", 5)])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(corrected, vec![heading("Intro", 1), heading("Detail", 2)]);
    }

    #[tokio::test]
    async fn failures_are_retried_then_surfaced() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500);
            })
            .await;

        let client = HeadingCorrectionClient::new(
            LlmConfig::new(server.base_url()).with_max_attempts(2),
        );
        let err = client.correct(&[heading("Intro", 1)]).await.unwrap_err();

        assert_eq!(mock.hits_async().await, 2);
        assert!(matches!(err, RagError::Llm(_)));
    }

    #[tokio::test]
    async fn unavailable_http_client_is_an_llm_error() {
        let client = HeadingCorrectionClient {
            http: None,
            config: LlmConfig::new("http://localhost:1").with_max_attempts(1),
        };
        let err = client.correct(&[heading("Intro", 1)]).await.unwrap_err();
        assert!(matches!(err, RagError::Llm(_)));
    }

    #[tokio::test]
    async fn unparseable_content_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": "not json"}}]
                }));
            })
            .await;

        let client = HeadingCorrectionClient::new(
            LlmConfig::new(server.base_url()).with_max_attempts(1),
        );
        assert!(client.correct(&[heading("Intro", 1)]).await.is_err());
    }
}
