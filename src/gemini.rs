use log::{error, warn};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Used when the model answers without any text.
pub const EMPTY_REPLY: &str = "I'm here to chat about your sleep! How are you feeling today? 😊";
/// Used when the model could not be reached or refused the request.
pub const FALLBACK_REPLY: &str = "Sorry, I'm having trouble right now.";

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(
        http: Client,
        endpoint: &str,
        api_key: Option<String>,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            api_key,
            temperature,
            max_output_tokens,
        }
    }

    /// Sends `prompt` as a single generation request and returns the first
    /// candidate's text, or [`EMPTY_REPLY`] when the answer carries none.
    pub async fn generate(&self, prompt: &str) -> AppResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("GEMINI_API_KEY not configured".into()))?;

        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Gemini API error: {} - {}", status, body);
            return Err(AppError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = resp.json().await?;
        Ok(extract_text(&data).unwrap_or(EMPTY_REPLY).to_string())
    }

    /// Like [`generate`](Self::generate) but never fails: any error turns
    /// into [`FALLBACK_REPLY`].
    pub async fn reply_or_fallback(&self, prompt: &str) -> String {
        match self.generate(prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("falling back to canned reply: {}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

fn extract_text(data: &Value) -> Option<&str> {
    data.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const PATH: &str = "/v1beta/models/gemini-1.5-flash-latest:generateContent";

    fn client(server: &mockito::Server, key: Option<&str>) -> GeminiClient {
        GeminiClient::new(
            Client::new(),
            &format!("{}{}", server.url(), PATH),
            key.map(str::to_string),
            0.8,
            200,
        )
    }

    #[tokio::test]
    async fn returns_the_first_candidate_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_query(Matcher::UrlEncoded("key".into(), "test-key".into()))
            .match_body(Matcher::Json(json!({
                "contents": [{ "parts": [{ "text": "hello" }] }],
                "generationConfig": { "temperature": 0.8, "maxOutputTokens": 200 }
            })))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"Get some rest!"}]}}]}"#)
            .create_async()
            .await;

        let reply = client(&server, Some("test-key")).generate("hello").await.unwrap();
        mock.assert_async().await;
        assert_eq!(reply, "Get some rest!");
    }

    #[tokio::test]
    async fn missing_text_uses_the_friendly_default() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let reply = client(&server, Some("k")).generate("hi").await.unwrap();
        assert_eq!(reply, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn errors_fall_back_to_the_apology() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body(r#"{"error":{"message":"quota"}}"#)
            .create_async()
            .await;

        let gemini = client(&server, Some("k"));
        assert!(matches!(
            gemini.generate("hi").await,
            Err(AppError::Upstream { status: 429, .. })
        ));
        assert_eq!(gemini.reply_or_fallback("hi").await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn missing_key_never_calls_out() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let gemini = client(&server, None);
        assert_eq!(gemini.reply_or_fallback("hi").await, FALLBACK_REPLY);
        mock.assert_async().await;
    }
}
