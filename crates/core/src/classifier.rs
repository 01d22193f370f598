use crate::merge::{self, MergeOptions, RawPrediction};
use crate::models::ClassifiedSpan;
use crate::parser::page_for_offset;
use crate::segment::{expand_segments, split_into_paragraphs};
use crate::settings::Settings;
use anyhow::Context;
use providers::{ClauseClassifier, ModelSpec};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions<'a> {
    pub settings: &'a Settings,
    pub batch_size: usize,
}

/// Segments `full_text`, classifies every segment and merges the results into hits.
pub async fn classify_text(
    full_text: &str,
    page_offsets: &[usize],
    classifier: &dyn ClauseClassifier,
    opts: ClassifyOptions<'_>,
) -> anyhow::Result<Vec<ClassifiedSpan>> {
    let segments = expand_segments(split_into_paragraphs(full_text));
    if segments.is_empty() {
        return Ok(Vec::new());
    }
    let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
    let mut predictions = Vec::with_capacity(texts.len());
    for batch in texts.chunks(opts.batch_size.max(1)) {
        let out = classifier
            .classify(batch)
            .await
            .with_context(|| format!("classifier {}", classifier.model_spec()))?;
        anyhow::ensure!(
            out.len() == batch.len(),
            "classifier returned {} predictions for {} inputs",
            out.len(),
            batch.len()
        );
        predictions.extend(out);
    }
    debug!(segments = segments.len(), "classified segments");

    let raw = segments
        .into_iter()
        .zip(predictions)
        .map(|(seg, pred)| RawPrediction {
            start: seg.start,
            end: seg.end,
            label: pred.label,
            prob: pred.score,
            text: seg.text,
        })
        .collect();
    let mut spans = merge::merge_predictions(
        full_text,
        raw,
        MergeOptions {
            settings: opts.settings,
        },
    );
    for span in &mut spans {
        span.page_no = page_for_offset(page_offsets, span.start);
    }
    Ok(spans)
}

/// Short model name shown in history; empty for an unusable spec.
pub fn model_display_name(spec: &str) -> String {
    ModelSpec::parse(spec)
        .map(|s| s.display_name())
        .unwrap_or_default()
}
