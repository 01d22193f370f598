//! Locates hit excerpts on PDF pages and writes highlight annotations.
//!
//! Word boxes come from walking each page's content stream and tracking the
//! text matrix. Glyph widths are not read from font programs; every glyph is
//! taken as half an em wide.

use crate::highlight::{category_color, category_stroke, css_class, hex_to_rgb01};
use crate::pdf_fonts::{self, decode_pdf_string, FontDecoder};
use anyhow::Context;
use lopdf::content::Content;
use lopdf::{dictionary, Document, Object, ObjectId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

pub const PHRASE_MAX_CHARS: usize = 90;
const GLYPH_EM: f32 = 0.5;
/// TJ adjustments larger than this (thousandths of an em, leftwards) split words.
const KERN_WORD_BREAK: f32 = 200.0;
const LINE_EPS: f32 = 3.0;
const HIGHLIGHT_OPACITY: f32 = 0.75;
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Axis-aligned box in PDF user space (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    fn union(self, other: Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }
}

#[derive(Debug, Clone)]
pub struct PdfWord {
    pub text: String,
    pub rect: Rect,
}

#[derive(Debug, Clone)]
pub struct PageLayout {
    pub page_no: u32,
    pub page_id: ObjectId,
    pub width: f32,
    pub height: f32,
    pub words: Vec<PdfWord>,
}

/// What the mapper needs to know about a stored hit.
#[derive(Debug, Clone, Serialize)]
pub struct HitInput {
    pub id: i64,
    pub category: String,
    pub prob: f32,
    pub text_excerpt: String,
}

/// A highlight box for the browser overlay; y grows downwards from the page top.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HitRect {
    pub hit_id: i64,
    pub page: u32,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub category: String,
    pub css_class: String,
    pub fill_color: String,
    pub stroke_color: String,
    pub prob: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PdfHitMap {
    pub rects: Vec<HitRect>,
    /// Page heights in points, keyed by 1-based page number.
    pub page_heights: BTreeMap<u32, f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn mul(&self, n: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [na, nb, nc, nd, ne, nf] = n.0;
        Matrix([
            a * na + b * nc,
            a * nb + b * nd,
            c * na + d * nc,
            c * nb + d * nd,
            e * na + f * nc + ne,
            e * nb + f * nd + nf,
        ])
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (x * a + y * c + e, x * b + y * d + f)
    }
}

enum Piece {
    Text(String),
    Kern(f32),
}

struct TextState {
    ctm: Matrix,
    saved: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            saved: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: 12.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).mul(&self.tlm);
        self.tm = self.tlm;
    }

    fn show(&mut self, pieces: &[Piece], words: &mut Vec<PdfWord>) {
        let fs = self.font_size;
        let m = self.tm.mul(&self.ctm);
        let glyph = GLYPH_EM * fs;
        let mut x = 0.0f32;
        let mut current: Option<(String, f32)> = None;
        for piece in pieces {
            match piece {
                Piece::Kern(k) => {
                    if -*k > KERN_WORD_BREAK {
                        flush_word(&mut current, x, &m, fs, words);
                    }
                    x -= k / 1000.0 * fs;
                }
                Piece::Text(s) => {
                    for c in s.chars() {
                        if c.is_whitespace() {
                            flush_word(&mut current, x, &m, fs, words);
                            x += glyph + self.char_spacing + self.word_spacing;
                        } else {
                            current.get_or_insert_with(|| (String::new(), x)).0.push(c);
                            x += glyph + self.char_spacing;
                        }
                    }
                }
            }
        }
        flush_word(&mut current, x, &m, fs, words);
        self.tm = Matrix::translate(x, 0.0).mul(&self.tm);
    }
}

fn flush_word(
    current: &mut Option<(String, f32)>,
    end_x: f32,
    m: &Matrix,
    fs: f32,
    words: &mut Vec<PdfWord>,
) {
    let Some((text, start_x)) = current.take() else {
        return;
    };
    let (ax, ay) = m.apply(start_x, -0.2 * fs);
    let (bx, by) = m.apply(end_x, 0.8 * fs);
    words.push(PdfWord {
        text,
        rect: Rect {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        },
    });
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn numbers(operands: &[Object]) -> Option<Vec<f32>> {
    operands.iter().map(number).collect()
}

fn decode_string(obj: &Object, decoder: Option<&FontDecoder>) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(match decoder {
            Some(d) => d.decode(bytes),
            None => decode_pdf_string(bytes),
        }),
        _ => None,
    }
}

/// Words with positions, read from a decoded content stream. Strings are
/// decoded through the font selected by the last `Tf`.
fn words_from_content(content: &Content, fonts: &BTreeMap<Vec<u8>, FontDecoder>) -> Vec<PdfWord> {
    let mut st = TextState::new();
    let mut words = Vec::new();
    let mut font: Option<&FontDecoder> = None;
    for op in &content.operations {
        let ops = &op.operands;
        let string_operand = move |obj: &Object| decode_string(obj, font);
        match op.operator.as_str() {
            "q" => st.saved.push(st.ctm),
            "Q" => {
                if let Some(m) = st.saved.pop() {
                    st.ctm = m;
                }
            }
            "cm" => {
                if let Some(v) = numbers(ops).filter(|v| v.len() == 6) {
                    st.ctm = Matrix([v[0], v[1], v[2], v[3], v[4], v[5]]).mul(&st.ctm);
                }
            }
            "BT" => {
                st.tm = Matrix::IDENTITY;
                st.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                font = ops
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .and_then(|name| fonts.get(name));
                if let Some(size) = ops.get(1).and_then(number) {
                    st.font_size = size;
                }
            }
            "TL" => {
                if let Some(l) = ops.first().and_then(number) {
                    st.leading = l;
                }
            }
            "Tc" => {
                if let Some(v) = ops.first().and_then(number) {
                    st.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = ops.first().and_then(number) {
                    st.word_spacing = v;
                }
            }
            "Td" | "TD" => {
                if let Some(v) = numbers(ops).filter(|v| v.len() == 2) {
                    if op.operator == "TD" {
                        st.leading = -v[1];
                    }
                    st.next_line(v[0], v[1]);
                }
            }
            "Tm" => {
                if let Some(v) = numbers(ops).filter(|v| v.len() == 6) {
                    st.tlm = Matrix([v[0], v[1], v[2], v[3], v[4], v[5]]);
                    st.tm = st.tlm;
                }
            }
            "T*" => {
                let l = st.leading;
                st.next_line(0.0, -l);
            }
            "Tj" => {
                if let Some(s) = ops.first().and_then(string_operand) {
                    st.show(&[Piece::Text(s)], &mut words);
                }
            }
            "'" => {
                let l = st.leading;
                st.next_line(0.0, -l);
                if let Some(s) = ops.first().and_then(string_operand) {
                    st.show(&[Piece::Text(s)], &mut words);
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac)) = (
                    ops.first().and_then(number),
                    ops.get(1).and_then(number),
                ) {
                    st.word_spacing = aw;
                    st.char_spacing = ac;
                }
                let l = st.leading;
                st.next_line(0.0, -l);
                if let Some(s) = ops.get(2).and_then(string_operand) {
                    st.show(&[Piece::Text(s)], &mut words);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = ops.first() {
                    let pieces: Vec<Piece> = items
                        .iter()
                        .filter_map(|item| {
                            string_operand(item)
                                .map(Piece::Text)
                                .or_else(|| number(item).map(Piece::Kern))
                        })
                        .collect();
                    st.show(&pieces, &mut words);
                }
            }
            _ => {}
        }
    }
    words
}

fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let mut id = page_id;
    for _ in 0..32 {
        let Ok(dict) = doc.get_dictionary(id) else {
            break;
        };
        if let Ok(obj) = dict.get(b"MediaBox") {
            let resolved = match obj {
                Object::Reference(r) => doc.get_object(*r).ok(),
                other => Some(other),
            };
            if let Some(v) = resolved
                .and_then(|o| o.as_array().ok())
                .and_then(|arr| numbers(arr))
                .filter(|v| v.len() == 4)
            {
                return [v[0], v[1], v[2], v[3]];
            }
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => id = parent,
            Err(_) => break,
        }
    }
    DEFAULT_MEDIA_BOX
}

/// Word layout of every page, in page order.
pub fn page_layouts(doc: &Document) -> Vec<PageLayout> {
    let mut layouts = Vec::new();
    for (page_no, page_id) in doc.get_pages() {
        let [llx, lly, urx, ury] = media_box(doc, page_id);
        let words = match doc
            .get_page_content(page_id)
            .and_then(|raw| Content::decode(&raw))
        {
            Ok(content) => words_from_content(&content, &pdf_fonts::page_fonts(doc, page_id)),
            Err(err) => {
                debug!(page = page_no, error = %err, "unreadable page content");
                Vec::new()
            }
        };
        layouts.push(PageLayout {
            page_no,
            page_id,
            width: (urx - llx).abs(),
            height: (ury - lly).abs(),
            words,
        });
    }
    layouts
}

/// Whitespace-normalized head snippet, plus a middle snippet for long excerpts.
pub fn build_search_phrases(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.split_whitespace().collect::<Vec<_>>().join(" ").chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() <= max_len {
        return vec![chars.into_iter().collect()];
    }
    let head: String = chars[..max_len].iter().collect();
    let mid_start = (chars.len() / 2).saturating_sub(max_len / 2);
    let mid_end = (mid_start + max_len).min(chars.len());
    let mid: String = chars[mid_start..mid_end].iter().collect();
    vec![head, mid]
}

/// Lowercase ASCII alphanumerics only; hyphens (soft or hard) join their halves.
pub fn normalize_token(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

fn tokenize_phrase(phrase: &str) -> Vec<String> {
    phrase
        .split_whitespace()
        .map(normalize_token)
        .filter(|t| !t.is_empty())
        .collect()
}

/// One rectangle per text line covered by `rects`.
fn group_by_line(rects: impl IntoIterator<Item = Rect>) -> Vec<Rect> {
    let mut lines: Vec<(f32, Rect)> = Vec::new();
    for r in rects {
        let y = r.center_y();
        match lines.iter_mut().find(|(ly, _)| (y - *ly).abs() <= LINE_EPS) {
            Some((_, acc)) => *acc = acc.union(r),
            None => lines.push((y, r)),
        }
    }
    lines.into_iter().map(|(_, r)| r).collect()
}

fn rects_by_words(page: &PageLayout, phrase: &str) -> Vec<Rect> {
    let toks = tokenize_phrase(phrase);
    let seq: Vec<(String, Rect)> = page
        .words
        .iter()
        .map(|w| (normalize_token(&w.text), w.rect))
        .filter(|(t, _)| !t.is_empty())
        .collect();
    let n = toks.len();
    if n == 0 || seq.len() < n {
        return Vec::new();
    }
    let mut out = Vec::new();
    for window in seq.windows(n) {
        let matched = window.iter().zip(&toks).enumerate().all(|(j, ((word, _), tok))| {
            if j == 0 || j == n - 1 {
                word.starts_with(tok.as_str())
            } else {
                word == tok
            }
        });
        if matched {
            out.extend(group_by_line(window.iter().map(|(_, r)| *r)));
        }
    }
    out
}

/// Case-insensitive substring search over the page's words joined by spaces.
fn rects_by_substring(page: &PageLayout, phrase: &str) -> Vec<Rect> {
    let needle: Vec<char> = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .map(lower_char)
        .collect();
    if needle.is_empty() {
        return Vec::new();
    }
    let mut hay: Vec<char> = Vec::new();
    let mut ranges = Vec::with_capacity(page.words.len());
    for (i, w) in page.words.iter().enumerate() {
        if i > 0 {
            hay.push(' ');
        }
        let start = hay.len();
        hay.extend(w.text.chars().map(lower_char));
        ranges.push((start, hay.len()));
    }
    let mut out = Vec::new();
    let mut i = 0;
    while i + needle.len() <= hay.len() {
        if hay[i..i + needle.len()] == needle[..] {
            let end = i + needle.len();
            let covered = page
                .words
                .iter()
                .zip(&ranges)
                .filter(|(_, (s, e))| *s < end && i < *e)
                .map(|(w, _)| w.rect);
            out.extend(group_by_line(covered));
            i = end;
        } else {
            i += 1;
        }
    }
    out
}

fn lower_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Rectangles for one excerpt on one page.
pub fn find_excerpt(page: &PageLayout, excerpt: &str) -> Vec<Rect> {
    let mut out = Vec::new();
    for phrase in build_search_phrases(excerpt, PHRASE_MAX_CHARS) {
        let mut rects = rects_by_words(page, &phrase);
        if rects.is_empty() {
            rects = rects_by_substring(page, &phrase);
        }
        out.extend(rects);
    }
    out
}

fn load(path: &Path) -> anyhow::Result<Document> {
    anyhow::ensure!(path.exists(), "pdf not found: {}", path.display());
    Document::load(path).with_context(|| format!("loading pdf {}", path.display()))
}

pub fn compute_hit_rects(path: &Path, hits: &[HitInput]) -> anyhow::Result<PdfHitMap> {
    let doc = load(path)?;
    let mut map = PdfHitMap::default();
    for page in page_layouts(&doc) {
        map.page_heights.insert(page.page_no, page.height);
        for hit in hits {
            for r in find_excerpt(&page, &hit.text_excerpt) {
                map.rects.push(HitRect {
                    hit_id: hit.id,
                    page: page.page_no,
                    x0: r.x0,
                    y0: page.height - r.y1,
                    x1: r.x1,
                    y1: page.height - r.y0,
                    category: hit.category.clone(),
                    css_class: css_class(&hit.category),
                    fill_color: category_color(&hit.category).to_string(),
                    stroke_color: category_stroke(&hit.category).to_string(),
                    prob: hit.prob,
                });
            }
        }
    }
    Ok(map)
}

fn highlight_annotation(r: Rect, hit: &HitInput) -> lopdf::Dictionary {
    let real = |v: f32| Object::Real(v.into());
    let [cr, cg, cb] = hex_to_rgb01(category_stroke(&hit.category));
    dictionary! {
        "Type" => "Annot",
        "Subtype" => "Highlight",
        "F" => 4,
        "Rect" => vec![real(r.x0), real(r.y0), real(r.x1), real(r.y1)],
        "QuadPoints" => vec![
            real(r.x0), real(r.y1), real(r.x1), real(r.y1),
            real(r.x0), real(r.y0), real(r.x1), real(r.y0),
        ],
        "C" => vec![real(cr), real(cg), real(cb)],
        "CA" => real(HIGHLIGHT_OPACITY),
        "T" => Object::string_literal(hit.category.as_str()),
        "Contents" => Object::string_literal(format!("Confidence {:.2}", hit.prob)),
    }
}

fn push_annotation(doc: &mut Document, page_id: ObjectId, annot_id: ObjectId) -> anyhow::Result<()> {
    let existing = doc.get_dictionary(page_id)?.get(b"Annots").ok().cloned();
    let annots = match existing {
        Some(Object::Reference(array_id)) => {
            if let Ok(Object::Array(items)) = doc.get_object_mut(array_id) {
                items.push(Object::Reference(annot_id));
                return Ok(());
            }
            vec![Object::Reference(annot_id)]
        }
        Some(Object::Array(mut items)) => {
            items.push(Object::Reference(annot_id));
            items
        }
        _ => vec![Object::Reference(annot_id)],
    };
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Annots", annots);
    Ok(())
}

/// Writes a copy of `src` with a highlight annotation per matched line.
/// Returns how many annotations were added.
pub fn generate_highlighted_pdf(src: &Path, hits: &[HitInput], out: &Path) -> anyhow::Result<usize> {
    let mut doc = load(src)?;
    let mut pending = Vec::new();
    for page in page_layouts(&doc) {
        for hit in hits {
            for r in find_excerpt(&page, &hit.text_excerpt) {
                pending.push((page.page_id, highlight_annotation(r, hit)));
            }
        }
    }
    let total = pending.len();
    for (page_id, annot) in pending {
        let annot_id = doc.add_object(annot);
        push_annotation(&mut doc, page_id, annot_id)?;
    }
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    doc.save(out)
        .with_context(|| format!("writing {}", out.display()))?;
    info!(annotations = total, path = %out.display(), "highlighted pdf written");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Operation;

    fn page(words: &[(&str, f32, f32)]) -> PageLayout {
        PageLayout {
            page_no: 1,
            page_id: (1, 0),
            width: 612.0,
            height: 792.0,
            words: words
                .iter()
                .map(|(t, x, y)| PdfWord {
                    text: t.to_string(),
                    rect: Rect {
                        x0: *x,
                        y0: *y,
                        x1: *x + 30.0,
                        y1: *y + 10.0,
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn phrases_use_head_and_middle() {
        assert!(build_search_phrases("   ", 90).is_empty());
        assert_eq!(build_search_phrases("a  b\nc", 90), vec!["a b c"]);
        let long = "x".repeat(50) + &"y".repeat(50) + &"z".repeat(50);
        let phrases = build_search_phrases(&long, 90);
        assert_eq!(phrases.len(), 2);
        assert_eq!(phrases[0].chars().count(), 90);
        assert!(phrases[1].starts_with("xxxxx"));
        assert!(phrases[1].contains("yyyyy"));
    }

    #[test]
    fn tokens_drop_hyphens_and_punctuation() {
        assert_eq!(normalize_token("Non-Compete,"), "noncompete");
        assert_eq!(normalize_token("re\u{AD}newal"), "renewal");
        assert_eq!(normalize_token("§"), "");
    }

    #[test]
    fn word_match_groups_lines() {
        let layout = page(&[
            ("The", 10.0, 700.0),
            ("Supplier", 50.0, 700.0),
            ("shall", 90.0, 701.0),
            ("indemnify", 10.0, 680.0),
            ("customers.", 50.0, 680.0),
        ]);
        // prefix match on the last token, exact in the middle
        let rects = rects_by_words(&layout, "supplier shall indemnify cust");
        assert_eq!(rects.len(), 2);
        assert_eq!(rects[0].x0, 50.0);
        assert_eq!(rects[0].x1, 120.0);
        assert!(rects_by_words(&layout, "supplier will indemnify").is_empty());
    }

    #[test]
    fn substring_fallback_maps_to_covering_words() {
        let layout = page(&[("agreement", 10.0, 700.0), ("TERMINATES", 50.0, 700.0), ("now", 90.0, 700.0)]);
        let rects = find_excerpt(&layout, "ment terminat");
        assert_eq!(rects.len(), 1);
        assert_eq!((rects[0].x0, rects[0].x1), (10.0, 80.0));
    }

    #[test]
    fn content_stream_positions_follow_text_matrix() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal("Hello world")]),
                Operation::new("TL", vec![14.into()]),
                Operation::new("T*", vec![]),
                Operation::new(
                    "TJ",
                    vec![Object::Array(vec![
                        Object::string_literal("Sec"),
                        Object::Integer(-20),
                        Object::string_literal("ond"),
                        Object::Integer(-600),
                        Object::string_literal("line"),
                    ])],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let words = words_from_content(&content, &BTreeMap::new());
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", "world", "Second", "line"]);
        assert_eq!(words[0].rect.x0, 100.0);
        assert_eq!(words[0].rect.x1, 125.0);
        assert_eq!(words[1].rect.x0, 130.0);
        assert_eq!(words[2].rect.y0, 684.0);
        assert_eq!(words[2].rect.x0, 100.0);
    }

    #[test]
    fn glyph_id_fonts_decode_through_to_unicode() {
        let doc = crate::pdf_fonts::tests::glyph_id_pdf("Either party may terminate");
        let layouts = page_layouts(&doc);
        assert_eq!(layouts.len(), 1);
        let texts: Vec<&str> = layouts[0].words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["Either", "party", "may", "terminate"]);
        assert_eq!(find_excerpt(&layouts[0], "party may terminate").len(), 1);
    }
}
