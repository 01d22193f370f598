//! Text extraction from uploaded contracts.

use crate::models::ParsedDocument;
use crate::pdf_fonts;
use anyhow::Context;
use std::fs;
use std::io::Read;
use std::path::Path;

pub const ALLOWED_EXTENSIONS: [&str; 2] = ["pdf", "docx"];

/// Separator placed between pages and between DOCX paragraphs.
pub const PAGE_JOIN: &str = "\n\n";

pub fn parse_document(path: &Path) -> anyhow::Result<ParsedDocument> {
    match extension(path).as_deref() {
        Some("pdf") => parse_pdf(path),
        Some("docx") => parse_docx(path),
        _ => {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            Ok(ParsedDocument {
                text: String::from_utf8_lossy(&bytes).into_owned(),
                num_pages: 0,
                page_offsets: Vec::new(),
            })
        }
    }
}

pub fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

pub fn is_pdf(path: &Path) -> bool {
    extension(path).as_deref() == Some("pdf")
}

pub fn is_allowed_upload(name: &str) -> bool {
    extension(Path::new(name))
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Reduces an uploaded name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn file_checksum(path: &Path) -> anyhow::Result<String> {
    let mut file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// 1-based page containing `offset`; 0 when the document has no page map.
pub fn page_for_offset(page_offsets: &[usize], offset: usize) -> u32 {
    if page_offsets.is_empty() {
        return 0;
    }
    let idx = page_offsets.partition_point(|&start| start <= offset);
    idx.max(1) as u32
}

/// Joins page texts and records where each page starts (in characters).
pub fn join_pages(pages: &[String]) -> (String, Vec<usize>) {
    let mut text = String::new();
    let mut offsets = Vec::with_capacity(pages.len());
    let mut cursor = 0;
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            text.push_str(PAGE_JOIN);
            cursor += PAGE_JOIN.len();
        }
        offsets.push(cursor);
        text.push_str(page);
        cursor += page.chars().count();
    }
    (text, offsets)
}

fn parse_pdf(path: &Path) -> anyhow::Result<ParsedDocument> {
    let doc = lopdf::Document::load(path).with_context(|| format!("loading pdf {}", path.display()))?;
    let pages = doc.get_pages();
    let mut texts = Vec::with_capacity(pages.len());
    for (page_no, page_id) in &pages {
        match pdf_fonts::page_text(&doc, *page_id) {
            Ok(text) => texts.push(text),
            Err(err) => {
                tracing::debug!(page = page_no, error = %err, "page text extraction failed");
                texts.push(String::new());
            }
        }
    }
    let num_pages = pages.len() as u32;
    if texts.iter().all(|t| t.trim().is_empty()) {
        let text = pdf_fallback_text(path)?;
        return Ok(ParsedDocument {
            text,
            num_pages,
            page_offsets: vec![0],
        });
    }
    let (text, page_offsets) = join_pages(&texts);
    Ok(ParsedDocument {
        text,
        num_pages,
        page_offsets,
    })
}

#[cfg(feature = "pdf")]
fn pdf_fallback_text(path: &Path) -> anyhow::Result<String> {
    pdf_extract::extract_text(path).with_context(|| format!("extracting text from {}", path.display()))
}

#[cfg(not(feature = "pdf"))]
fn pdf_fallback_text(_path: &Path) -> anyhow::Result<String> {
    Ok(String::new())
}

#[cfg(feature = "office")]
fn parse_docx(path: &Path) -> anyhow::Result<ParsedDocument> {
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("docx is not a zip container")?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("docx has no word/document.xml")?
        .read_to_string(&mut xml)?;
    let paragraphs = docx_paragraphs(&xml)?;
    Ok(ParsedDocument {
        text: paragraphs.join(PAGE_JOIN),
        num_pages: 0,
        page_offsets: Vec::new(),
    })
}

#[cfg(not(feature = "office"))]
fn parse_docx(path: &Path) -> anyhow::Result<ParsedDocument> {
    anyhow::bail!("docx support not compiled in: {}", path.display())
}

/// Paragraph texts of a WordprocessingML body.
pub fn docx_paragraphs(xml: &str) -> anyhow::Result<Vec<String>> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    loop {
        match reader.read_event().context("malformed document.xml")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"p" => paragraphs.extend(current.take()),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" => current.iter_mut().for_each(|p| p.push('\t')),
                b"br" | b"cr" => current.iter_mut().for_each(|p| p.push('\n')),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().context("bad text run")?;
                if let Some(p) = current.as_mut() {
                    p.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_upload_names() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("My Contract (final).PDF"), "My_Contract_final.PDF");
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename("résumé.docx"), "rsum.docx");
    }

    #[test]
    fn allowed_uploads_are_pdf_and_docx() {
        assert!(is_allowed_upload("a.PDF"));
        assert!(is_allowed_upload("b.docx"));
        assert!(!is_allowed_upload("c.doc"));
        assert!(!is_allowed_upload("noext"));
    }

    #[test]
    fn page_offsets_follow_join() {
        let pages = vec!["first page".to_string(), "zweite Seite ü".to_string(), String::new()];
        let (text, offsets) = join_pages(&pages);
        assert_eq!(offsets, vec![0, 12, 28]);
        assert_eq!(text.chars().count(), 28);
        assert_eq!(page_for_offset(&offsets, 0), 1);
        assert_eq!(page_for_offset(&offsets, 11), 1);
        assert_eq!(page_for_offset(&offsets, 12), 2);
        assert_eq!(page_for_offset(&offsets, 500), 3);
        assert_eq!(page_for_offset(&[], 5), 0);
    }

    #[test]
    fn reads_docx_paragraphs() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:r><w:t>Fees &amp; charges</w:t></w:r><w:r><w:tab/><w:t xml:space="preserve"> apply.</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t>Second</w:t></w:r></w:p>
</w:body>
</w:document>"#;
        let paragraphs = docx_paragraphs(xml).unwrap();
        assert_eq!(paragraphs, vec!["Fees & charges\t apply.", "", "Second"]);
    }

    #[test]
    fn checksum_is_stable() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();
        let parsed = parse_document(&path).unwrap();
        assert_eq!(parsed.text, "hello");
        assert_eq!(
            file_checksum(&path).unwrap(),
            blake3::hash(b"hello").to_hex().to_string()
        );
    }

    #[cfg(feature = "office")]
    #[test]
    fn parses_docx_container() {
        use std::io::Write;
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("c.docx");
        let file = fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("word/document.xml", zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(
            br#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>One</w:t></w:r></w:p><w:p><w:r><w:t>Two</w:t></w:r></w:p></w:body></w:document>"#,
        )
        .unwrap();
        zip.finish().unwrap();

        let parsed = parse_document(&path).unwrap();
        assert_eq!(parsed.text, "One\n\nTwo");
        assert_eq!(parsed.num_pages, 0);
    }

    #[test]
    fn parses_pdf_set_in_glyph_id_fonts() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("c.pdf");
        let mut doc = crate::pdf_fonts::tests::glyph_id_pdf("Either party may terminate");
        doc.save(&path).unwrap();

        let parsed = parse_document(&path).unwrap();
        assert_eq!(parsed.text.trim(), "Either party may terminate");
        assert_eq!(parsed.num_pages, 1);
    }
}
