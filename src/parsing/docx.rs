//! DOCX parser adapter.
//!
//! A DOCX file is a zip archive; the body lives in
//! `word/document.xml`. The adapter scans paragraph blocks for text
//! runs and Heading styles instead of pulling in a full XML tree — the
//! subset of WordprocessingML needed here is small and stable.

use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::adapter::{ParseError, ParserAdapter, ParserOutput};
use crate::models::{Heading, StructuralHints};

fn style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<w:pStyle[^>]*w:val="[Hh]eading(\d)""#).unwrap())
}

fn run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap())
}

pub struct DocxAdapter;

impl DocxAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserAdapter for DocxAdapter {
    fn id(&self) -> &'static str {
        "docx"
    }

    fn priority(&self) -> u8 {
        0
    }

    fn supports(&self, mime: &str) -> bool {
        mime == "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    }

    fn parse(&self, path: &Path) -> Result<ParserOutput, ParseError> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ParseError::Malformed(format!("not a zip archive: {}", e)))?;

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| ParseError::Malformed(format!("missing word/document.xml: {}", e)))?
            .read_to_string(&mut xml)
            .map_err(|e| ParseError::Malformed(format!("unreadable document.xml: {}", e)))?;

        Ok(extract(&xml))
    }
}

fn extract(xml: &str) -> ParserOutput {
    let mut text = String::new();
    let mut headings = Vec::new();

    // Paragraph blocks end with </w:p>; the trailing remainder holds
    // no paragraph content.
    for block in xml.split("</w:p>") {
        let para = paragraph_text(block);
        if para.is_empty() {
            continue;
        }

        if let Some(caps) = style_re().captures(block) {
            let level: u8 = caps[1].parse().unwrap_or(1);
            headings.push(Heading {
                level: level.min(6),
                text: para.clone(),
                offset: text.len(),
            });
        }

        text.push_str(&para);
        text.push('\n');
    }

    let hints = StructuralHints {
        headings,
        table_count: xml.matches("<w:tbl>").count(),
        image_count: xml.matches("<w:drawing").count() + xml.matches("<w:pict").count(),
        page_count: None,
    };

    ParserOutput { text, hints }
}

/// Concatenate the `<w:t>` runs of one paragraph block.
fn paragraph_text(block: &str) -> String {
    let mut out = String::new();
    for caps in run_re().captures_iter(block) {
        out.push_str(&unescape_xml(&caps[1]));
    }
    out.trim().to_string()
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        r#"<w:document><w:body>"#,
        r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Overview</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>First paragraph </w:t></w:r><w:r><w:t>split into runs.</w:t></w:r></w:p>"#,
        r#"<w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Scope &amp; Goals</w:t></w:r></w:p>"#,
        r#"<w:tbl><w:tr/></w:tbl>"#,
        r#"<w:p><w:r><w:drawing/><w:t>Figure caption</w:t></w:r></w:p>"#,
        r#"</w:body></w:document>"#,
    );

    #[test]
    fn test_headings_and_levels() {
        let out = extract(SAMPLE);
        assert_eq!(out.hints.headings.len(), 2);
        assert_eq!(out.hints.headings[0].text, "Overview");
        assert_eq!(out.hints.headings[0].level, 1);
        assert_eq!(out.hints.headings[1].text, "Scope & Goals");
        assert_eq!(out.hints.headings[1].level, 2);
    }

    #[test]
    fn test_runs_concatenated() {
        let out = extract(SAMPLE);
        assert!(out.text.contains("First paragraph split into runs."));
    }

    #[test]
    fn test_heading_offsets_valid() {
        let out = extract(SAMPLE);
        for h in &out.hints.headings {
            assert_eq!(&out.text[h.offset..h.offset + h.text.len()], h.text);
        }
    }

    #[test]
    fn test_counts() {
        let out = extract(SAMPLE);
        assert_eq!(out.hints.table_count, 1);
        assert_eq!(out.hints.image_count, 1);
    }
}
