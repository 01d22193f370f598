use crate::{LlmProvider, ProviderError};
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    cfg: Arc<GeminiConfig>,
}

impl GeminiProvider {
    pub fn new(cfg: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text parts of the first candidate that has any, joined by newlines.
    fn text(&self) -> String {
        for cand in &self.candidates {
            let Some(content) = &cand.content else {
                continue;
            };
            let texts: Vec<&str> = content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .filter(|t| !t.is_empty())
                .collect();
            if !texts.is_empty() {
                return texts.join("\n");
            }
        }
        String::new()
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(&self, prompt: &str, model: Option<&str>) -> Result<String, ProviderError> {
        #[derive(Serialize)]
        struct ReqPart<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct ReqContent<'a> {
            parts: Vec<ReqPart<'a>>,
        }
        #[derive(Serialize)]
        struct GenerateRequest<'a> {
            contents: Vec<ReqContent<'a>>,
        }

        let body = GenerateRequest {
            contents: vec![ReqContent {
                parts: vec![ReqPart { text: prompt }],
            }],
        };
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.cfg.base_url.trim_end_matches('/'),
            model.unwrap_or(&self.cfg.model)
        );
        let resp = self
            .client
            .post(url)
            .query(&[("key", self.cfg.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
            return Err(ProviderError::RequestFailed(format!(
                "status {} body {:?}",
                status, body
            )));
        }
        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;
        Ok(parsed.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_candidates_without_text() {
        let raw = r#"{"candidates":[{"content":{"parts":[]}},
            {"content":{"parts":[{"text":"- Pay within 30 days"},{"text":"- Uncapped liability"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.text(), "- Pay within 30 days\n- Uncapped liability");
    }

    #[test]
    fn empty_response_yields_empty_text() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.text(), "");
    }
}
