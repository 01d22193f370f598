//! Provider abstractions for the clause classifier and LLMs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub mod gemini;
pub mod huggingface;
pub mod noop;
pub mod openai;

/// Labels assumed when a model only reports `LABEL_<n>` identifiers.
pub const DEFAULT_LABELS: [&str; 6] = [
    "Payment Terms",
    "Liability & Exclusions",
    "Termination",
    "Intellectual Property",
    "Confidentiality",
    "Other",
];

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("invalid model specification: {0:?}")]
    InvalidModelSpec(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Top label for a single input text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

#[async_trait::async_trait]
pub trait ClauseClassifier: Send + Sync {
    /// Returns one prediction per input text, in input order.
    async fn classify(&self, texts: &[String]) -> Result<Vec<Prediction>, ProviderError>;

    fn model_spec(&self) -> &str;
}

#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// `model` overrides the provider's configured default.
    async fn generate(&self, prompt: &str, model: Option<&str>) -> Result<String, ProviderError>;
}

/// Builds a classifier for a model specification.
pub trait ClassifierFactory: Send + Sync {
    fn create(&self, model_spec: &str) -> Result<Arc<dyn ClauseClassifier>, ProviderError>;
}

/// Parsed form of `base[@revision][::subfolder]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub base: String,
    pub revision: Option<String>,
    pub subfolder: Option<String>,
}

impl ModelSpec {
    pub fn parse(spec: &str) -> Result<Self, ProviderError> {
        let mut base = spec.trim();
        let mut subfolder = None;
        if let Some((head, sub)) = base.split_once("::") {
            base = head;
            subfolder = Some(sub.trim()).filter(|s| !s.is_empty());
        }
        let mut revision = None;
        if let Some((head, rev)) = base.split_once('@') {
            base = head;
            revision = Some(rev.trim()).filter(|s| !s.is_empty());
        }
        let base = base.trim();
        if base.is_empty() {
            return Err(ProviderError::InvalidModelSpec(spec.to_string()));
        }
        Ok(Self {
            base: base.to_string(),
            revision: revision.map(str::to_string),
            subfolder: subfolder.map(str::to_string),
        })
    }

    /// Last path component of the base, plus the subfolder if any.
    pub fn display_name(&self) -> String {
        let norm = self.base.replace('\\', "/");
        let norm = norm.trim_end_matches('/');
        let name = norm.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(&self.base);
        match &self.subfolder {
            Some(sub) => format!("{name}/{sub}"),
            None => name.to_string(),
        }
    }
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    llms: HashMap<String, Arc<dyn LlmProvider>>,
    classifiers: Arc<Mutex<HashMap<String, Arc<dyn ClauseClassifier>>>>,
    classifier_factory: Option<Arc<dyn ClassifierFactory>>,
    pub preferred_llm: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm(mut self, name: &str, provider: Arc<dyn LlmProvider>) -> Self {
        self.llms.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred_llm(mut self, name: &str) -> Self {
        self.preferred_llm = Some(name.to_string());
        self
    }

    pub fn with_classifier_factory(mut self, factory: Arc<dyn ClassifierFactory>) -> Self {
        self.classifier_factory = Some(factory);
        self
    }

    /// Registers a ready classifier under the model spec it reports.
    pub fn with_classifier(self, classifier: Arc<dyn ClauseClassifier>) -> Self {
        if let Ok(mut cache) = self.classifiers.lock() {
            cache.insert(classifier.model_spec().to_string(), classifier);
        }
        self
    }

    pub fn llm(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred_llm.clone())
            .ok_or_else(|| ProviderError::UnknownProvider("no llm provider configured".into()))?;
        self.llms
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }

    /// Returns the cached classifier for `model_spec`, creating it on first use.
    pub fn classifier(&self, model_spec: &str) -> Result<Arc<dyn ClauseClassifier>, ProviderError> {
        let mut cache = self
            .classifiers
            .lock()
            .map_err(|_| ProviderError::RequestFailed("classifier cache poisoned".into()))?;
        if let Some(found) = cache.get(model_spec) {
            return Ok(found.clone());
        }
        let factory = self.classifier_factory.as_ref().ok_or_else(|| {
            ProviderError::UnknownProvider(format!("no classifier for {model_spec}"))
        })?;
        let created = factory.create(model_spec)?;
        cache.insert(model_spec.to_string(), created.clone());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_revision_and_subfolder() {
        let spec = ModelSpec::parse("org/legal-bert@v2::risk-head").unwrap();
        assert_eq!(spec.base, "org/legal-bert");
        assert_eq!(spec.revision.as_deref(), Some("v2"));
        assert_eq!(spec.subfolder.as_deref(), Some("risk-head"));
        assert_eq!(spec.display_name(), "legal-bert/risk-head");
    }

    #[test]
    fn display_name_handles_local_paths() {
        let spec = ModelSpec::parse(r"C:\models\clause-clf\").unwrap();
        assert_eq!(spec.display_name(), "clause-clf");
        assert!(ModelSpec::parse("  @main").is_err());
    }

    #[test]
    fn registry_caches_classifiers_per_spec() {
        struct Counting(std::sync::atomic::AtomicUsize);
        impl ClassifierFactory for Counting {
            fn create(&self, spec: &str) -> Result<Arc<dyn ClauseClassifier>, ProviderError> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Arc::new(noop::NoopProvider::for_spec(spec)))
            }
        }
        let factory = Arc::new(Counting(Default::default()));
        let reg = ProviderRegistry::new().with_classifier_factory(factory.clone());
        reg.classifier("a").unwrap();
        reg.classifier("a").unwrap();
        reg.classifier("b").unwrap();
        assert_eq!(factory.0.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
