use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::InsightGenerator;
use crate::error::UpstreamError;
use crate::http::{RetryPolicy, check_status, decode, transport};

const SERVICE: &str = "Gemini";
const BASE_URL: &str = "https://generativelanguage.googleapis.com";
const KEY_HEADER: &str = "x-goog-api-key";

/// Google Gemini `generateContent`, asking for a JSON response body.
pub struct GeminiClient {
    client: Client,
    policy: RetryPolicy,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, policy: RetryPolicy) -> Self {
        Self::with_base_url(api_key, model, policy, BASE_URL)
    }

    pub fn with_base_url(api_key: String, model: String, policy: RetryPolicy, base_url: &str) -> Self {
        Self {
            client: policy.client(),
            policy,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[async_trait]
impl InsightGenerator for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };
        let (url, client, key, body) = (url.as_str(), &self.client, self.api_key.as_str(), &body);

        let data: GenerateContentResponse = self
            .policy
            .run(move || async move {
                let response = client
                    .post(url)
                    .header(KEY_HEADER, key)
                    .json(body)
                    .send()
                    .await
                    .map_err(transport(SERVICE))?;
                check_status(SERVICE, response)
                    .await?
                    .json()
                    .await
                    .map_err(decode(SERVICE))
            })
            .await?;

        data.candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .map(|parts| parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| UpstreamError::Payload {
                service: SERVICE,
                message: "response contained no text".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    fn client_for(server: &mockito::Server, max_retries: u32) -> GeminiClient {
        GeminiClient::with_base_url(
            "secret".into(),
            "gemini-1.5-flash".into(),
            RetryPolicy {
                timeout: Duration::from_secs(5),
                max_retries,
            },
            &server.url(),
        )
    }

    #[tokio::test]
    async fn test_returns_candidate_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
            .match_header("x-goog-api-key", "secret")
            .match_query(Matcher::Missing)
            .match_body(Matcher::PartialJson(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .with_body(r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"ok\":true}"}]}}]}"#)
            .create_async()
            .await;

        let text = client_for(&server, 0).complete("hello").await.unwrap();
        assert_eq!(text, r#"{"ok":true}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_candidates_is_payload_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", Matcher::Any)
            .match_query(Matcher::Any)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let err = client_for(&server, 0).complete("hello").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Payload { .. }));
    }

    #[tokio::test]
    async fn test_error_text_omits_api_key() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", Matcher::Any)
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let err = client_for(&server, 0).complete("hello").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Payload { .. }));
        assert!(!err.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn test_server_error_retried_then_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", Matcher::Any)
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", Matcher::Any)
            .match_query(Matcher::Any)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"done"}]}}]}"#)
            .create_async()
            .await;

        let text = client_for(&server, 1).complete("hello").await.unwrap();
        assert_eq!(text, "done");
        failing.assert_async().await;
        ok.assert_async().await;
    }
}
