use serde::{Deserialize, Serialize};

/// Text of an uploaded document with page boundaries.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub text: String,
    pub num_pages: u32,
    /// Character offset at which each page starts; empty when pages are unknown.
    pub page_offsets: Vec<usize>,
}

/// A slice of the source text sent to the classifier. Offsets are in characters.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// A merged, scored classifier span: what becomes a Hit row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedSpan {
    pub start: usize,
    pub end: usize,
    pub page_no: u32,
    pub category: String,
    pub prob: f32,
    pub text: String,
    pub severity: Severity,
    pub ambiguous: bool,
}
