//! Decoding of content-stream strings through each page font.
//!
//! Fonts with a `/ToUnicode` CMap (Type0/Identity-H exports from Word and
//! browsers) map multi-byte codes to text through it. Simple fonts with a
//! named encoding go through lopdf's tables; anything else is read as
//! UTF-16BE-with-BOM or Latin-1.

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// PDF text string bytes: UTF-16BE with BOM, else Latin-1.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
            .collect();
        return char::decode_utf16(units)
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Parsed `/ToUnicode` CMap.
#[derive(Debug, Clone, PartialEq)]
pub struct ToUnicode {
    code_len: usize,
    map: HashMap<u32, String>,
}

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Open,
    Close,
    Word(String),
}

fn tokenize(src: &[u8]) -> Vec<Token> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'<' => {
                let end = src[i + 1..]
                    .iter()
                    .position(|&b| b == b'>')
                    .map_or(src.len(), |p| i + 1 + p);
                let digits: Vec<u8> = src[i + 1..end]
                    .iter()
                    .copied()
                    .filter(u8::is_ascii_hexdigit)
                    .collect();
                out.push(Token::Hex(hex_bytes(&digits)));
                i = end + 1;
            }
            b'[' => {
                out.push(Token::Open);
                i += 1;
            }
            b']' => {
                out.push(Token::Close);
                i += 1;
            }
            b'%' => {
                while i < src.len() && src[i] != b'\n' && src[i] != b'\r' {
                    i += 1;
                }
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                while i < src.len()
                    && !src[i].is_ascii_whitespace()
                    && !matches!(src[i], b'<' | b'[' | b']' | b'%')
                {
                    i += 1;
                }
                out.push(Token::Word(String::from_utf8_lossy(&src[start..i]).into_owned()));
            }
        }
    }
    out
}

fn hex_bytes(digits: &[u8]) -> Vec<u8> {
    digits
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16).unwrap_or(0);
            let lo = pair
                .get(1)
                .and_then(|&d| (d as char).to_digit(16))
                .unwrap_or(0);
            (hi * 16 + lo) as u8
        })
        .collect()
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn utf16be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Destination string shifted by `offset` in its last UTF-16 unit.
fn offset_dest(dest: &[u8], offset: u32) -> String {
    let mut units: Vec<u16> = dest
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
        .collect();
    if let Some(last) = units.last_mut() {
        *last = last.wrapping_add(offset as u16);
    }
    String::from_utf16_lossy(&units)
}

impl ToUnicode {
    pub fn parse(src: &[u8]) -> Option<Self> {
        let tokens = tokenize(src);
        let mut code_len = 0;
        let mut map = HashMap::new();
        let mut i = 0;
        while i < tokens.len() {
            let Token::Word(word) = &tokens[i] else {
                i += 1;
                continue;
            };
            i += 1;
            match word.as_str() {
                "begincodespacerange" => {
                    if let Some(Token::Hex(lo)) = tokens.get(i) {
                        code_len = code_len.max(lo.len());
                    }
                }
                "beginbfchar" => {
                    while let (Some(Token::Hex(src)), Some(Token::Hex(dst))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        code_len = code_len.max(src.len());
                        map.insert(code_value(src), utf16be(dst));
                        i += 2;
                    }
                }
                "beginbfrange" => {
                    while let (Some(Token::Hex(lo)), Some(Token::Hex(hi))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        code_len = code_len.max(lo.len());
                        let (lo, hi) = (code_value(lo), code_value(hi));
                        i += 2;
                        match tokens.get(i) {
                            Some(Token::Hex(dst)) => {
                                for code in lo..=hi.min(lo.saturating_add(0xFFFF)) {
                                    map.insert(code, offset_dest(dst, code - lo));
                                }
                                i += 1;
                            }
                            Some(Token::Open) => {
                                i += 1;
                                let mut code = lo;
                                while let Some(Token::Hex(dst)) = tokens.get(i) {
                                    if code <= hi {
                                        map.insert(code, utf16be(dst));
                                    }
                                    code += 1;
                                    i += 1;
                                }
                                if matches!(tokens.get(i), Some(Token::Close)) {
                                    i += 1;
                                }
                            }
                            _ => break,
                        }
                    }
                }
                _ => {}
            }
        }
        if map.is_empty() {
            return None;
        }
        Some(Self {
            code_len: code_len.max(1),
            map,
        })
    }

    /// Unmapped codes are dropped.
    pub fn decode(&self, bytes: &[u8]) -> String {
        bytes
            .chunks(self.code_len)
            .filter_map(|code| self.map.get(&code_value(code)))
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FontDecoder {
    CMap(ToUnicode),
    Named(String),
    Raw,
}

const NAMED_ENCODINGS: [&str; 4] = [
    "StandardEncoding",
    "WinAnsiEncoding",
    "MacRomanEncoding",
    "MacExpertEncoding",
];

impl FontDecoder {
    pub fn for_font(doc: &Document, font: &Dictionary) -> Self {
        let cmap = font
            .get_deref(b"ToUnicode", doc)
            .and_then(Object::as_stream)
            .ok()
            .map(|s| s.decompressed_content().unwrap_or_else(|_| s.content.clone()))
            .and_then(|raw| ToUnicode::parse(&raw));
        if let Some(cmap) = cmap {
            return FontDecoder::CMap(cmap);
        }
        match font.get(b"Encoding").and_then(Object::as_name_str) {
            Ok(name) if NAMED_ENCODINGS.contains(&name) => FontDecoder::Named(name.to_string()),
            _ => FontDecoder::Raw,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            FontDecoder::CMap(cmap) => cmap.decode(bytes),
            FontDecoder::Named(enc) => Document::decode_text(Some(enc), bytes),
            FontDecoder::Raw => decode_pdf_string(bytes),
        }
    }
}

/// Decoders for the fonts a page's resources name, keyed by resource name.
pub fn page_fonts(doc: &Document, page_id: ObjectId) -> BTreeMap<Vec<u8>, FontDecoder> {
    let fonts: BTreeMap<Vec<u8>, FontDecoder> = doc
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| {
            let decoder = FontDecoder::for_font(doc, font);
            (name, decoder)
        })
        .collect();
    debug!(?page_id, fonts = fonts.len(), "page fonts resolved");
    fonts
}

fn push_strings(out: &mut String, operands: &[Object], decoder: Option<&FontDecoder>) {
    for operand in operands {
        match operand {
            Object::String(bytes, _) => match decoder {
                Some(d) => out.push_str(&d.decode(bytes)),
                None => out.push_str(&decode_pdf_string(bytes)),
            },
            Object::Array(items) => {
                push_strings(out, items, decoder);
                out.push(' ');
            }
            Object::Integer(i) if *i < -100 => out.push(' '),
            Object::Real(r) if *r < -100.0 => out.push(' '),
            _ => {}
        }
    }
}

/// Text of one page in content-stream order, one line per text object.
pub fn page_text(doc: &Document, page_id: ObjectId) -> anyhow::Result<String> {
    let fonts = page_fonts(doc, page_id);
    let content = Content::decode(&doc.get_page_content(page_id)?)?;
    let mut text = String::new();
    let mut font = None;
    for op in &content.operations {
        match op.operator.as_str() {
            "Tf" => {
                font = op
                    .operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .and_then(|name| fonts.get(name));
            }
            "Tj" | "TJ" => push_strings(&mut text, &op.operands, font),
            "'" | "\"" => {
                text.push('\n');
                push_strings(&mut text, &op.operands, font);
            }
            "ET" => {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            _ => {}
        }
    }
    Ok(text)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream, StringFormat};

    /// One page set in a Type0 font whose codes are glyph ids (char - 0x1D),
    /// readable only through its ToUnicode CMap.
    pub(crate) fn glyph_id_pdf(text: &str) -> Document {
        let cmap = b"begincmap\n1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n\
            1 beginbfrange\n<0003> <0061> <0020>\nendbfrange\nendcmap";
        let codes: Vec<u8> = text
            .bytes()
            .flat_map(|b| (b as u16 - 0x1D).to_be_bytes())
            .collect();

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let cmap_id = doc.add_object(Stream::new(dictionary! {}, cmap.to_vec()));
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "Calibri",
            "Encoding" => "Identity-H",
            "ToUnicode" => cmap_id,
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(codes, StringFormat::Hexadecimal)],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    const CMAP: &[u8] = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0003> <0020>
<0026> <0043>
endbfchar
2 beginbfrange
<0044> <0046> <0061>
<004F> <0050> [<006C> <006D>]
endbfrange
endcmap";

    #[test]
    fn cmap_maps_chars_and_ranges() {
        let cmap = ToUnicode::parse(CMAP).unwrap();
        assert_eq!(cmap.code_len, 2);
        assert_eq!(
            cmap.decode(&[0x00, 0x26, 0x00, 0x4F, 0x00, 0x44, 0x00, 0x03, 0x00, 0x46]),
            "Cla c"
        );
        assert_eq!(cmap.decode(&[0x00, 0x50, 0x01, 0x00]), "m");
    }

    #[test]
    fn empty_cmap_is_none() {
        assert!(ToUnicode::parse(b"begincmap endcmap").is_none());
    }

    #[test]
    fn named_encodings_use_lopdf_tables() {
        let dec = FontDecoder::Named("WinAnsiEncoding".into());
        assert_eq!(dec.decode(b"Net 30 days"), "Net 30 days");
        assert_eq!(FontDecoder::Raw.decode(b"caf\xe9"), "café");
    }

    #[test]
    fn decodes_utf16_strings() {
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9]), "Aé");
        assert_eq!(decode_pdf_string(b"caf\xe9"), "café");
    }

    #[test]
    fn page_text_reads_glyph_id_fonts() {
        let doc = glyph_id_pdf("Either party may terminate");
        let page_id = doc.page_iter().next().unwrap();
        let text = page_text(&doc, page_id).unwrap();
        assert_eq!(text, "Either party may terminate\n");
    }
}
