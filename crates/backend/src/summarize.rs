//! Short actionable summaries of professor emails via the OpenAI chat API.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_SENTENCES: u8 = 3;
const MAX_TOKENS: u32 = 200;
const TEMPERATURE: f32 = 0.2;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

pub struct Summarizer {
    http: reqwest::Client,
    config: OpenAiConfig,
    base_url: String,
}

impl Summarizer {
    pub fn new(http: reqwest::Client, config: OpenAiConfig) -> Self {
        Self::with_base_url(http, config, OPENAI_API_BASE)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        config: OpenAiConfig,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            config,
            base_url: base_url.into(),
        }
    }

    /// Summarize `text` in at most `max_sentences` sentences.
    pub async fn summarize(&self, text: &str, max_sentences: u8) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(build_prompt(text, max_sentences)),
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("OpenAI request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI returned {}: {}", status, body);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Invalid OpenAI response")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .context("OpenAI returned an empty summary")
    }
}

pub fn build_prompt(text: &str, max_sentences: u8) -> String {
    format!(
        "Produce a concise {}-sentence summary of the following professor email, \
         listing main points and action items. Keep it short and actionable.\n\n{}",
        max_sentences.max(1),
        text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::post, Json, Router};

    fn config() -> OpenAiConfig {
        OpenAiConfig {
            api_key: "sk-test".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    #[test]
    fn test_prompt_includes_sentence_count_and_text() {
        let prompt = build_prompt("Midterm moved to Thursday.", 2);
        assert!(prompt.starts_with("Produce a concise 2-sentence summary"));
        assert!(prompt.ends_with("\n\nMidterm moved to Thursday."));
        assert!(build_prompt("x", 0).contains("1-sentence"));
    }

    #[tokio::test]
    async fn test_summarize_sends_chat_request() {
        async fn completions(
            headers: HeaderMap,
            Json(body): Json<serde_json::Value>,
        ) -> Json<serde_json::Value> {
            assert_eq!(headers["authorization"], "Bearer sk-test");
            assert_eq!(body["model"], "gpt-4o-mini");
            assert_eq!(body["max_tokens"], 200);
            assert_eq!(body["messages"][0]["role"], "user");
            Json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "  Midterm is Thursday. Bring a calculator.\n"}}]
            }))
        }

        let base = serve(Router::new().route("/chat/completions", post(completions))).await;
        let summarizer = Summarizer::with_base_url(reqwest::Client::new(), config(), base);

        let summary = summarizer
            .summarize("Midterm moved to Thursday, bring a calculator.", 3)
            .await
            .unwrap();
        assert_eq!(summary, "Midterm is Thursday. Bring a calculator.");
    }

    #[tokio::test]
    async fn test_empty_completion_is_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { Json(serde_json::json!({"choices": []})) }),
        );
        let base = serve(app).await;
        let summarizer = Summarizer::with_base_url(reqwest::Client::new(), config(), base);

        let err = summarizer.summarize("hello", 3).await.unwrap_err();
        assert!(err.to_string().contains("empty summary"));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base = serve(app).await;
        let summarizer = Summarizer::with_base_url(reqwest::Client::new(), config(), base);

        let err = summarizer.summarize("hello", 3).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
