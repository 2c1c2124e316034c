use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::settings::GeminiSettings;
use shared::{ApiKey, HistoryEntry, ProviderError, Role};
use std::time::Duration;

use crate::backend::RemoteChat;

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

pub struct GeminiClient {
    http: Client,
    base: String,
    model: String,
    system_prompt: String,
}

impl GeminiClient {
    pub fn new(settings: &GeminiSettings) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            system_prompt: settings.system_prompt.clone(),
        })
    }

    fn build_request(&self, history: &[HistoryEntry]) -> GeminiRequest {
        // Gemini expects roles: "user" | "model".
        let contents = history
            .iter()
            .map(|entry| GeminiContent {
                role: Some(
                    match entry.role {
                        Role::User => "user",
                        Role::Bot => "model",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: entry.content.clone(),
                }],
            })
            .collect();
        let system_instruction = if self.system_prompt.trim().is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: self.system_prompt.clone(),
                }],
            })
        };
        GeminiRequest {
            contents,
            system_instruction,
        }
    }
}

#[async_trait]
impl RemoteChat for GeminiClient {
    async fn verify_key(&self, key: &ApiKey) -> Result<(), ProviderError> {
        let url = format!("{}/v1beta/models/{}", self.base, self.model);
        let resp = self
            .http
            .get(url)
            .query(&[("key", key.expose())])
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        Ok(())
    }

    async fn generate(&self, key: &ApiKey, history: &[HistoryEntry]) -> Result<String, ProviderError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base, self.model);
        let req = self.build_request(history);
        tracing::debug!(model = %self.model, turns = history.len(), "gemini generateContent");

        let resp = self
            .http
            .post(url)
            .query(&[("key", key.expose())])
            .json(&req)
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        let body: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Backend(format!("unreadable response: {}", e)))?;
        extract_text(body)
    }
}

fn extract_text(body: GeminiResponse) -> Result<String, ProviderError> {
    body.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| ProviderError::Backend("no text in response".into()))
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    // Strip the URL: it carries the key as a query parameter.
    ProviderError::Network(e.without_url().to_string())
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let body = body.trim();
    let detail = if body.is_empty() {
        status.to_string()
    } else if body.len() > 800 {
        let mut cut = 800;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\n{}...", status, &body[..cut])
    } else {
        format!("{}\n{}", status, body)
    };
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::InvalidKey(detail)
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::Quota(detail),
        _ => ProviderError::Backend(detail),
    }
}
