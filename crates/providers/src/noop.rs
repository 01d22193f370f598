use crate::{ClassifierFactory, ClauseClassifier, Prediction, ProviderError};
use std::sync::Arc;

/// Labels every text as `Other`, so no hits are ever produced.
#[derive(Debug, Default)]
pub struct NoopProvider {
    spec: String,
}

impl NoopProvider {
    pub fn for_spec(spec: &str) -> Self {
        Self {
            spec: spec.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ClauseClassifier for NoopProvider {
    async fn classify(&self, texts: &[String]) -> Result<Vec<Prediction>, ProviderError> {
        Ok(texts
            .iter()
            .map(|_| Prediction {
                label: "Other".to_string(),
                score: 1.0,
            })
            .collect())
    }

    fn model_spec(&self) -> &str {
        &self.spec
    }
}

/// Stands in for the classifier endpoint when none is reachable.
#[derive(Debug, Default)]
pub struct NoopFactory;

impl ClassifierFactory for NoopFactory {
    fn create(&self, model_spec: &str) -> Result<Arc<dyn ClauseClassifier>, ProviderError> {
        Ok(Arc::new(NoopProvider::for_spec(model_spec)))
    }
}
