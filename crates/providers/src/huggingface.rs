use crate::{
    ClassifierFactory, ClauseClassifier, ModelSpec, Prediction, ProviderError, DEFAULT_LABELS,
};
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

#[derive(Clone)]
pub struct HuggingFaceConfig {
    pub base_url: String,
    pub api_token: Option<String>,
}

/// Text-classification model served behind a Hugging Face style inference endpoint.
#[derive(Clone)]
pub struct HuggingFaceClassifier {
    client: Client,
    cfg: Arc<HuggingFaceConfig>,
    spec: String,
    model: ModelSpec,
}

impl HuggingFaceClassifier {
    pub fn new(cfg: HuggingFaceConfig, model_spec: &str) -> Result<Self, ProviderError> {
        let model = ModelSpec::parse(model_spec)?;
        let ignored = ignored_parts(&model);
        if !ignored.is_empty() {
            warn!(
                model = model_spec,
                ignored = ?ignored,
                "inference endpoint serves the default revision at the repository root; ignoring"
            );
        }
        Ok(Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
            spec: model_spec.to_string(),
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}",
            self.cfg.base_url.trim_end_matches('/'),
            self.model.base
        )
    }
}

/// Parts of a model spec the `/models/{base}` route cannot address.
fn ignored_parts(model: &ModelSpec) -> Vec<&'static str> {
    let mut parts = Vec::new();
    if model.revision.is_some() {
        parts.push("revision");
    }
    if model.subfolder.is_some() {
        parts.push("subfolder");
    }
    parts
}

#[derive(Debug, Clone, Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

/// Endpoints answer either one ranked list per input or one top entry per input.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassificationResponse {
    Ranked(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl ClassificationResponse {
    fn into_predictions(self) -> Vec<Prediction> {
        let tops: Vec<Option<LabelScore>> = match self {
            ClassificationResponse::Ranked(rows) => rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .max_by(|a, b| a.score.total_cmp(&b.score))
                })
                .collect(),
            ClassificationResponse::Flat(rows) => rows.into_iter().map(Some).collect(),
        };
        tops.into_iter()
            .map(|top| match top {
                Some(ls) => Prediction {
                    label: normalize_label(&ls.label),
                    score: ls.score,
                },
                None => Prediction {
                    label: "Other".to_string(),
                    score: 0.0,
                },
            })
            .collect()
    }
}

/// Maps generic `LABEL_<n>` ids onto the default label list.
pub fn normalize_label(label: &str) -> String {
    label
        .strip_prefix("LABEL_")
        .and_then(|n| n.parse::<usize>().ok())
        .and_then(|idx| DEFAULT_LABELS.get(idx))
        .map(|l| l.to_string())
        .unwrap_or_else(|| label.to_string())
}

#[async_trait::async_trait]
impl ClauseClassifier for HuggingFaceClassifier {
    async fn classify(&self, texts: &[String]) -> Result<Vec<Prediction>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        #[derive(Serialize)]
        struct Options {
            wait_for_model: bool,
        }
        #[derive(Serialize)]
        struct Parameters {
            truncation: bool,
        }
        #[derive(Serialize)]
        struct ClassifyRequest<'a> {
            inputs: &'a [String],
            parameters: Parameters,
            options: Options,
        }

        let body = ClassifyRequest {
            inputs: texts,
            parameters: Parameters { truncation: true },
            options: Options {
                wait_for_model: true,
            },
        };
        debug!(model = %self.spec, inputs = texts.len(), "classifying segments");

        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(token) = &self.cfg.api_token {
            builder = builder.bearer_auth(token);
        }
        let resp = builder
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
        let parsed: ClassificationResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;
        let predictions = parsed.into_predictions();
        if predictions.len() != texts.len() {
            return Err(ProviderError::UnexpectedResponse(format!(
                "expected {} predictions, got {}",
                texts.len(),
                predictions.len()
            )));
        }
        Ok(predictions)
    }

    fn model_spec(&self) -> &str {
        &self.spec
    }
}

/// Creates [`HuggingFaceClassifier`]s sharing one endpoint configuration.
pub struct HuggingFaceFactory {
    cfg: HuggingFaceConfig,
}

impl HuggingFaceFactory {
    pub fn new(cfg: HuggingFaceConfig) -> Self {
        Self { cfg }
    }
}

impl ClassifierFactory for HuggingFaceFactory {
    fn create(&self, model_spec: &str) -> Result<Arc<dyn ClauseClassifier>, ProviderError> {
        Ok(Arc::new(HuggingFaceClassifier::new(
            self.cfg.clone(),
            model_spec,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranked_response_takes_highest_score() {
        let raw = r#"[[{"label":"Termination","score":0.2},{"label":"LABEL_1","score":0.7}],
                      [{"label":"Other","score":0.9}]]"#;
        let parsed: ClassificationResponse = serde_json::from_str(raw).unwrap();
        let preds = parsed.into_predictions();
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].label, "Liability & Exclusions");
        assert!((preds[0].score - 0.7).abs() < 1e-6);
        assert_eq!(preds[1].label, "Other");
    }

    #[test]
    fn flat_response_is_one_per_input() {
        let raw = r#"[{"label":"Confidentiality","score":0.81}]"#;
        let parsed: ClassificationResponse = serde_json::from_str(raw).unwrap();
        let preds = parsed.into_predictions();
        assert_eq!(preds[0].label, "Confidentiality");
    }

    #[test]
    fn endpoint_uses_base_without_revision() {
        let clf = HuggingFaceClassifier::new(
            HuggingFaceConfig {
                base_url: "http://localhost:8080/".into(),
                api_token: None,
            },
            "acme/clauses@v3",
        )
        .unwrap();
        assert_eq!(clf.endpoint(), "http://localhost:8080/models/acme/clauses");
        assert_eq!(normalize_label("LABEL_99"), "LABEL_99");
    }

    #[test]
    fn revision_and_subfolder_are_reported_as_ignored() {
        let pinned = ModelSpec::parse("acme/clauses@v3::head").unwrap();
        assert_eq!(ignored_parts(&pinned), vec!["revision", "subfolder"]);
        let plain = ModelSpec::parse("acme/clauses").unwrap();
        assert!(ignored_parts(&plain).is_empty());
    }
}
