//! Category colours and the annotated HTML preview of a contract.

use crate::segment::CharIndex;
use html_escape::encode_text;
use std::fmt::Write;

pub const DEFAULT_FILL: &str = "#FFF9C4";
pub const DEFAULT_STROKE: &str = "#F9A825";

const STYLES: [(&str, &str, &str); 5] = [
    ("payment terms", "#E3F2FD", "#1565C0"),
    ("liability & exclusions", "#FCE4EC", "#AD1457"),
    ("termination", "#E8F5E9", "#2E7D32"),
    ("intellectual property", "#FFF3E0", "#EF6C00"),
    ("confidentiality", "#EDE7F6", "#5E35B1"),
];

fn style(category: &str) -> Option<&'static (&'static str, &'static str, &'static str)> {
    let key = category.trim().to_lowercase();
    STYLES.iter().find(|(name, _, _)| *name == key)
}

/// Background colour used for a category in HTML and PDF output.
pub fn category_color(category: &str) -> &'static str {
    style(category).map(|s| s.1).unwrap_or(DEFAULT_FILL)
}

/// Annotation stroke colour for PDF highlights.
pub fn category_stroke(category: &str) -> &'static str {
    style(category).map(|s| s.2).unwrap_or(DEFAULT_STROKE)
}

pub fn css_class(category: &str) -> String {
    let lower = category.to_lowercase();
    let slug = lower
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "other".to_string()
    } else {
        slug
    }
}

/// `#RRGGBB` (or `#RGB`) to components in 0..=1.
pub fn hex_to_rgb01(color: &str) -> [f32; 3] {
    let hex = color.trim().trim_start_matches('#');
    let expanded: String = if hex.len() == 3 {
        hex.chars().flat_map(|c| [c, c]).collect()
    } else {
        hex.to_string()
    };
    let channel = |i: usize| {
        expanded
            .get(i..i + 2)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .map(|v| v as f32 / 255.0)
            .unwrap_or(0.0)
    };
    [channel(0), channel(2), channel(4)]
}

/// A span to render; offsets are characters into the full text.
#[derive(Debug, Clone)]
pub struct HighlightSpan<'a> {
    pub start: usize,
    pub end: usize,
    pub category: &'a str,
    pub prob: f32,
}

/// Escaped `<pre>` preview with one anchor per span, numbered in start order.
pub fn inject_highlights(full_text: &str, spans: &[HighlightSpan<'_>]) -> String {
    let index = CharIndex::new(full_text);
    let mut sorted: Vec<&HighlightSpan<'_>> = spans.iter().collect();
    sorted.sort_by_key(|s| s.start);

    let mut html = String::from("<pre class=\"preview-text\">");
    let mut cursor = 0;
    for (idx, span) in sorted.iter().enumerate() {
        let start = span.start.max(cursor).min(index.char_len());
        let end = span.end.max(start).min(index.char_len());
        if start > cursor {
            html.push_str(&encode_text(index.slice(full_text, cursor, start)));
        }
        let color = category_color(span.category);
        let _ = write!(
            html,
            "<span id=\"hit-{n}\" class=\"highlight category-{class}\" data-color=\"{color}\" \
             title=\"{title} - Confidence {prob:.2}\" style=\"background-color:{color};\">{frag}</span>",
            n = idx + 1,
            class = css_class(span.category),
            title = html_escape::encode_double_quoted_attribute(span.category),
            prob = span.prob,
            frag = encode_text(index.slice(full_text, start, end)),
        );
        cursor = end;
    }
    if cursor < index.char_len() {
        html.push_str(&encode_text(index.slice(full_text, cursor, index.char_len())));
    }
    html.push_str("</pre>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colours_fall_back_to_default() {
        assert_eq!(category_color(" Termination "), "#E8F5E9");
        assert_eq!(category_stroke("Payment Terms"), "#1565C0");
        assert_eq!(category_color("Force Majeure"), DEFAULT_FILL);
        assert_eq!(category_stroke("Other"), DEFAULT_STROKE);
    }

    #[test]
    fn css_slugs() {
        assert_eq!(css_class("Liability & Exclusions"), "liability-exclusions");
        assert_eq!(css_class("  "), "other");
    }

    #[test]
    fn rgb_conversion() {
        assert_eq!(hex_to_rgb01("#FF0000"), [1.0, 0.0, 0.0]);
        assert_eq!(hex_to_rgb01("0f0"), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn escapes_and_clips_overlaps() {
        let text = "a <b> & c d e";
        let spans = [
            HighlightSpan {
                start: 2,
                end: 5,
                category: "Termination",
                prob: 0.9,
            },
            HighlightSpan {
                start: 4,
                end: 7,
                category: "Other",
                prob: 0.7,
            },
        ];
        let html = inject_highlights(text, &spans);
        assert!(html.starts_with("<pre class=\"preview-text\">a <span id=\"hit-1\""));
        assert!(html.contains(">&lt;b&gt;</span>"));
        assert!(html.contains("id=\"hit-2\" class=\"highlight category-other\""));
        assert!(html.contains("> &amp;</span>"));
        assert!(html.ends_with(" c d e</pre>"));
        assert!(!html.contains("<b>"));
    }
}
