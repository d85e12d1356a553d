//! MIME type detection for input files.
//!
//! Magic-byte sniffing via `infer` decides for binary container
//! formats; text formats fall back to the file extension, since
//! Markdown, HTML, and plain text share no reliable magic bytes.

use std::path::Path;

/// MIME for DOCX containers.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Detect the MIME type of a file from its leading bytes and
/// extension.
pub fn detect_mime(path: &Path, head: &[u8]) -> String {
    // Binary formats are identified reliably by magic bytes.
    if let Some(kind) = infer::get(head) {
        let mime = kind.mime_type();
        if mime == "application/pdf" || mime == DOCX_MIME {
            return mime.to_string();
        }
        // infer reports plain .docx as zip sometimes; trust the
        // extension in that case.
        if mime == "application/zip" && has_extension(path, &["docx"]) {
            return DOCX_MIME.to_string();
        }
    }

    if has_extension(path, &["html", "htm", "xhtml"]) {
        return "text/html".to_string();
    }
    if has_extension(path, &["md", "markdown", "mdown"]) {
        return "text/markdown".to_string();
    }
    if has_extension(path, &["pdf"]) {
        return "application/pdf".to_string();
    }
    if has_extension(path, &["docx"]) {
        return DOCX_MIME.to_string();
    }

    // HTML without an extension is still recognizable by its prologue.
    let head_str = String::from_utf8_lossy(&head[..head.len().min(512)]);
    let lowered = head_str.trim_start().to_lowercase();
    if lowered.starts_with("<!doctype html") || lowered.starts_with("<html") {
        return "text/html".to_string();
    }

    "text/plain".to_string()
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_lowercase();
            extensions.iter().any(|x| *x == e)
        })
        .unwrap_or(false)
}

/// Map MIME type to file extension for stored artifacts.
pub fn mime_to_extension(mime: &str) -> &'static str {
    match mime {
        "application/pdf" => "pdf",
        "text/html" => "html",
        "text/markdown" => "md",
        "text/plain" => "txt",
        "application/json" => "json",
        DOCX_MIME => "docx",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_magic_bytes() {
        let mime = detect_mime(Path::new("unknown"), b"%PDF-1.7 rest of file");
        assert_eq!(mime, "application/pdf");
    }

    #[test]
    fn test_markdown_extension() {
        let mime = detect_mime(Path::new("notes.md"), b"# Title\n\nBody");
        assert_eq!(mime, "text/markdown");
    }

    #[test]
    fn test_html_prologue_without_extension() {
        let mime = detect_mime(Path::new("page"), b"<!DOCTYPE html><html><body>");
        assert_eq!(mime, "text/html");
    }

    #[test]
    fn test_plain_text_fallback() {
        let mime = detect_mime(Path::new("readme"), b"just words here");
        assert_eq!(mime, "text/plain");
    }
}
