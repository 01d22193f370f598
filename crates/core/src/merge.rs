//! Turns per-segment predictions into merged, deduplicated, scored spans.

use crate::models::ClassifiedSpan;
use crate::scoring;
use crate::segment::CharIndex;
use crate::settings::{Settings, AMBIGUITY_MARGIN};

/// One classifier verdict for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub prob: f32,
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
pub struct MergeOptions<'a> {
    pub settings: &'a Settings,
}

pub fn is_other(label: &str) -> bool {
    label.trim().eq_ignore_ascii_case("other")
}

/// Runs gate, merge, dedupe and scoring. `page_no` is left at 0 for the caller.
pub fn merge_predictions(
    full_text: &str,
    predictions: Vec<RawPrediction>,
    opts: MergeOptions<'_>,
) -> Vec<ClassifiedSpan> {
    let settings = opts.settings;
    let mut kept: Vec<RawPrediction> = predictions
        .into_iter()
        .filter(|p| !is_other(&p.label) && p.prob >= settings.threshold_for(&p.label))
        .map(|mut p| {
            p.text = p.text.trim().to_string();
            p
        })
        .collect();
    kept.sort_by(|a, b| (a.start, a.end).cmp(&(b.start, b.end)));

    let index = CharIndex::new(full_text);
    let window = settings.merge_window_chars;
    let mut merged: Vec<RawPrediction> = Vec::with_capacity(kept.len());
    for span in kept {
        match merged.last_mut() {
            Some(last) if last.label == span.label && span.start <= last.end + window => {
                last.end = last.end.max(span.end);
                last.prob = last.prob.max(span.prob);
                last.text = index.slice(full_text, last.start, last.end).trim().to_string();
            }
            _ => merged.push(span),
        }
    }

    dedupe(merged)
        .into_iter()
        .map(|p| {
            let threshold = settings.threshold_for(&p.label);
            ClassifiedSpan {
                severity: scoring::severity(&p.label, p.prob),
                ambiguous: p.prob < threshold + AMBIGUITY_MARGIN,
                start: p.start,
                end: p.end,
                page_no: 0,
                category: p.label,
                prob: p.prob,
                text: p.text,
            }
        })
        .collect()
}

/// Drops exact repeats and spans wholly inside an earlier span of the same category.
fn dedupe(spans: Vec<RawPrediction>) -> Vec<RawPrediction> {
    let mut out: Vec<RawPrediction> = Vec::with_capacity(spans.len());
    for span in spans {
        let covered = out
            .iter()
            .any(|o| o.label == span.label && o.start <= span.start && span.end <= o.end);
        if !covered {
            out.push(span);
        }
    }
    out
}
