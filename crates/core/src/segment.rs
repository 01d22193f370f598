//! Splits extracted text into classifier-sized segments.

use crate::models::Segment;
use regex::Regex;
use std::sync::OnceLock;

/// Paragraphs shorter than this (after whitespace collapsing) are headings or noise.
pub const MIN_SEGMENT_CHARS: usize = 80;
/// Segments with more words than this are split into sliding windows.
pub const LONG_SEGMENT_WORDS: usize = 180;
pub const WINDOW_WORDS: usize = 400;
pub const WINDOW_STRIDE_WORDS: usize = 120;

fn paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n+").expect("valid paragraph regex"))
}

fn page_footer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^page\s*\d+(\s*of\s*\d+)?$").expect("valid footer regex"))
}

/// Maps between character and byte offsets of one string.
#[derive(Debug, Clone)]
pub struct CharIndex {
    bytes: Vec<usize>,
}

impl CharIndex {
    pub fn new(text: &str) -> Self {
        let mut bytes: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        bytes.push(text.len());
        Self { bytes }
    }

    pub fn char_len(&self) -> usize {
        self.bytes.len() - 1
    }

    pub fn byte_of(&self, ch: usize) -> usize {
        self.bytes[ch.min(self.char_len())]
    }

    /// Character containing `byte` (or the one starting there).
    pub fn char_of(&self, byte: usize) -> usize {
        match self.bytes.binary_search(&byte) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        }
    }

    /// Slice by character offsets, clamped to the string.
    pub fn slice<'a>(&self, text: &'a str, start: usize, end: usize) -> &'a str {
        let start = self.byte_of(start);
        let end = self.byte_of(end).max(start);
        &text[start..end]
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Paragraph segments with character offsets into `text`.
pub fn split_into_paragraphs(text: &str) -> Vec<Segment> {
    let index = CharIndex::new(text);
    let mut ranges = Vec::new();
    let mut last = 0;
    for m in paragraph_break().find_iter(text) {
        ranges.push(last..m.start());
        last = m.end();
    }
    ranges.push(last..text.len());

    let mut segments = Vec::new();
    for range in ranges {
        let part = &text[range.clone()];
        let lead = part.len() - part.trim_start().len();
        let raw = part.trim();
        if raw.is_empty() {
            continue;
        }
        let normalized = collapse_whitespace(raw);
        if normalized.chars().count() < MIN_SEGMENT_CHARS || page_footer().is_match(&normalized) {
            continue;
        }
        let byte_start = range.start + lead;
        let byte_end = byte_start + raw.len();
        segments.push(Segment {
            text: raw.to_string(),
            start: index.char_of(byte_start),
            end: index.char_of(byte_end),
        });
    }
    segments
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Sliding word windows over a long segment; short segments come back unchanged.
pub fn chunk_long_segment(seg: &Segment, max_words: usize, stride_words: usize) -> Vec<Segment> {
    let words = word_spans(&seg.text);
    if words.len() <= max_words {
        return vec![seg.clone()];
    }
    let index = CharIndex::new(&seg.text);
    let step_back = stride_words.min(max_words.saturating_sub(1));
    let mut chunks = Vec::new();
    let mut i = 0;
    let n = words.len();
    while i < n {
        let j = (i + max_words).min(n);
        let (a, b) = (words[i].0, words[j - 1].1);
        chunks.push(Segment {
            text: seg.text[a..b].to_string(),
            start: seg.start + index.char_of(a),
            end: seg.start + index.char_of(b),
        });
        if j == n {
            break;
        }
        i = j - step_back;
    }
    chunks
}

/// Expands every long segment into windows.
pub fn expand_segments(segments: Vec<Segment>) -> Vec<Segment> {
    let mut expanded = Vec::with_capacity(segments.len());
    for seg in segments {
        if word_count(&seg.text) > LONG_SEGMENT_WORDS {
            expanded.extend(chunk_long_segment(&seg, WINDOW_WORDS, WINDOW_STRIDE_WORDS));
        } else {
            expanded.push(seg);
        }
    }
    expanded
}

/// Byte ranges of whitespace-separated words.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_para(word: &str, n: usize) -> String {
        vec![word; n].join(" ")
    }

    #[test]
    fn drops_short_paragraphs_and_footers() {
        let clause = "The Supplier shall indemnify the Customer against all losses arising from breach.";
        let footer_padding = "Page 3 of 12";
        let text = format!("TITLE\n\n{clause}\n\n{footer_padding}\n\n   \n\n{clause}");
        let segs = split_into_paragraphs(&text);
        assert_eq!(segs.len(), 2);
        let index = CharIndex::new(&text);
        for seg in &segs {
            assert_eq!(index.slice(&text, seg.start, seg.end), clause);
        }
        assert!(segs[1].start > segs[0].end);
    }

    #[test]
    fn offsets_are_in_characters() {
        let clause = "Les paiements sont dus à trente jours fin de mois, pénalités de retard comprises à 3%.";
        let text = format!("Été\n\n{clause}");
        let segs = split_into_paragraphs(&text);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].start, 5);
        assert_eq!(segs[0].end, 5 + clause.chars().count());
    }

    #[test]
    fn long_segments_become_overlapping_windows() {
        let text = long_para("word", 500);
        let seg = Segment {
            text: text.clone(),
            start: 10,
            end: 10 + text.len(),
        };
        let chunks = chunk_long_segment(&seg, 400, 120);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].start, 10);
        assert_eq!(word_count(&chunks[0].text), 400);
        // second window starts 120 words before the end of the first
        assert_eq!(chunks[1].start, 10 + 280 * 5);
        assert_eq!(chunks[1].end, seg.end);
    }

    #[test]
    fn medium_segments_stay_whole() {
        let text = long_para("term", 200);
        let seg = Segment {
            text: text.clone(),
            start: 0,
            end: text.len(),
        };
        let expanded = expand_segments(vec![seg.clone()]);
        assert_eq!(expanded, vec![seg]);
    }
}
