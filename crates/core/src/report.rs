//! Exported analysis reports (HTML and a plain PDF).

use crate::highlight::category_color;
use anyhow::Context;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use std::fmt::Write;
use std::fs;
use std::path::Path;
use storage::models::Hit;

const STYLE: &str = r#"<style>
  body { font-family: Arial, sans-serif; margin: 24px; }
  .header { display: flex; align-items: center; gap: 16px; }
  .logo { height: 48px; }
  .hit { border: 1px solid #ddd; padding: 8px 12px; margin: 8px 0; border-radius: 6px; }
  .cat { font-weight: bold; }
  .meta { color: #666; font-size: 12px; }
  .summary { background: #f9fafb; padding: 12px; border-radius: 6px; }
  .footer { margin-top: 24px; color: #777; font-size: 12px; }
  .pill { display:inline-block; padding:2px 8px; border-radius:999px; font-size:12px; color:#1f2933; }
</style>"#;

pub fn render_report_html(
    title: &str,
    hits: &[Hit],
    summary: &str,
    disclaimer: &str,
    logo: Option<&str>,
) -> String {
    let mut html = String::from("<html><head><meta charset='utf-8'>");
    html.push_str(STYLE);
    html.push_str("</head><body><div class='header'>");
    if let Some(logo) = logo.filter(|l| !l.trim().is_empty()) {
        let _ = write!(html, "<img class=\"logo\" src=\"{}\" />", attr(logo));
    }
    let _ = write!(html, "<h2>{}</h2></div>", text(title));
    if !summary.trim().is_empty() {
        let _ = write!(
            html,
            "<h3>Summary</h3><div class='summary'><pre style='white-space:pre-wrap'>{}</pre></div>",
            text(summary)
        );
    }
    html.push_str("<h3>Detected Clauses</h3>");
    for hit in hits {
        let _ = write!(
            html,
            "<div class='hit'><div class='cat'><span class='pill' style=\"background:{color}\">{cat}</span> \
             &nbsp; <span class='meta'>Confidence {prob:.2} &middot; {severity}</span></div>\
             <div><pre style='white-space:pre-wrap'>{excerpt}</pre></div></div>",
            color = category_color(&hit.category),
            cat = text(&hit.category),
            prob = hit.prob,
            severity = text(&hit.severity),
            excerpt = text(&hit.text_excerpt),
        );
    }
    if !disclaimer.trim().is_empty() {
        let _ = write!(html, "<div class='footer'>{}</div>", text(disclaimer));
    }
    html.push_str("</body></html>");
    html
}

pub fn save_html_report(path: &Path, html: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, html).with_context(|| format!("writing {}", path.display()))
}

const PAGE_W: f32 = 595.0;
const PAGE_H: f32 = 842.0;
const MARGIN: f32 = 56.7;
/// Average Helvetica advance as a fraction of the font size, used for wrapping.
const AVG_GLYPH: f32 = 0.55;

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

/// Lays out text lines top to bottom over as many A4 pages as needed.
struct PageWriter {
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
    y: f32,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            ops: Vec::new(),
            y: PAGE_H - MARGIN,
        }
    }

    fn break_if_needed(&mut self) {
        if self.y < MARGIN {
            self.pages.push(std::mem::take(&mut self.ops));
            self.y = PAGE_H - MARGIN;
        }
    }

    fn line(&mut self, font: &str, size: f32, line: &str, advance: f32) {
        self.break_if_needed();
        if !line.is_empty() {
            self.ops.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![font.into(), Object::Real(size.into())]),
                Operation::new(
                    "Td",
                    vec![Object::Real(MARGIN.into()), Object::Real(self.y.into())],
                ),
                Operation::new(
                    "Tj",
                    vec![Object::String(win_ansi(line), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ]);
        }
        self.y -= advance;
    }

    fn wrapped(&mut self, font: &str, size: f32, body: &str, leading: f32) {
        let max_chars = (((PAGE_W - 2.0 * MARGIN) / (AVG_GLYPH * size)) as usize).max(10);
        for paragraph in body.lines() {
            for line in wrap(paragraph, max_chars) {
                self.line(font, size, &line, leading);
            }
        }
    }

    fn gap(&mut self, dy: f32) {
        self.y -= dy;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.pages.push(self.ops);
        }
        self.pages
    }
}

/// Greedy word wrap; words longer than a line are hard-split.
pub fn wrap(paragraph: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Encodes for the standard fonts' WinAnsiEncoding; unmappable characters become `?`.
fn win_ansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c {
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{20AC}' => 0x80,
            c if (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)) => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

pub fn save_pdf_report(
    path: &Path,
    title: &str,
    hits: &[Hit],
    summary: &str,
    disclaimer: &str,
) -> anyhow::Result<()> {
    let mut w = PageWriter::new();
    w.line(BOLD, 14.0, title, 20.0);
    if !summary.trim().is_empty() {
        w.line(BOLD, 12.0, "Summary", 16.0);
        w.wrapped(REGULAR, 10.0, summary, 14.0);
        w.gap(6.0);
    }
    w.line(BOLD, 12.0, "Detected Clauses", 16.0);
    for hit in hits {
        let head = format!("[{}] Confidence {:.2} ({})", hit.category, hit.prob, hit.severity);
        w.line(BOLD, 10.0, &head, 14.0);
        w.wrapped(REGULAR, 9.0, &hit.text_excerpt, 12.0);
        w.gap(8.0);
    }
    if !disclaimer.trim().is_empty() {
        w.gap(10.0);
        w.wrapped(REGULAR, 8.0, &format!("Disclaimer: {disclaimer}"), 10.0);
    }
    let doc = build_document(w.finish())?;
    write_document(doc, path)
}

fn build_document(pages: Vec<Vec<Operation>>) -> anyhow::Result<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font = |base: &str| {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => Object::Name(base.as_bytes().to_vec()),
            "Encoding" => "WinAnsiEncoding",
        }
    };
    let regular_id = doc.add_object(font("Helvetica"));
    let bold_id = doc.add_object(font("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR => regular_id,
            BOLD => bold_id,
        },
    });
    let mut kids = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(PAGE_W.into()), Object::Real(PAGE_H.into())],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    Ok(doc)
}

fn write_document(mut doc: Document, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    doc.save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
