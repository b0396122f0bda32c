// Parser module
// Converts files on disk into plain-text documents


use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use scraper::{ElementRef, Html, Node, Selector};
use std::fs;
use std::panic;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{KbError, Result};

/// Plain text extracted from a single source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path of the originating file, as enumerated by the indexer
    pub source: String,
    pub text: String,
}

/// A file that could not be parsed
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: KbError,
}

/// Result of parsing a batch of files with per-file isolation
#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// Parsed documents paired with the path they came from
    pub documents: Vec<(PathBuf, Document)>,
    pub failures: Vec<FileFailure>,
}

pub trait DocumentParser {
    fn parse(&self, path: &Path) -> Result<Document>;

    /// Parse every path; a failing file is recorded and skipped
    fn parse_all(&self, paths: &[PathBuf]) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        for path in paths {
            match self.parse(path) {
                Ok(document) => outcome.documents.push((path.clone(), document)),
                Err(error) => {
                    warn!("Skipping {}: {}", path.display(), error);
                    outcome.failures.push(FileFailure {
                        path: path.clone(),
                        error,
                    });
                }
            }
        }

        outcome
    }
}

/// Extensions of binary formats that carry no extractable text
const SKIPPED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "ico", "tiff", "svgz", "mp3", "mp4", "wav",
    "flac", "ogg", "mov", "avi", "mkv", "zip", "gz", "tgz", "bz2", "xz", "7z", "rar", "tar",
    "exe", "dll", "so", "dylib", "o", "a", "class", "jar", "pyc", "woff", "woff2", "ttf", "otf",
    "sqlite", "db", "ds_store",
];

/// Format of a file, decided by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Markdown,
    Html,
    Pdf,
    PlainText,
    /// Known binary format, recorded as ingested without producing text
    Skipped,
}

impl FileFormat {
    #[inline]
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("md" | "markdown") => Self::Markdown,
            Some("html" | "htm") => Self::Html,
            Some("pdf") => Self::Pdf,
            Some(ext) if SKIPPED_EXTENSIONS.contains(&ext) => Self::Skipped,
            _ => Self::PlainText,
        }
    }
}

/// Default parser for UTF-8 text, Markdown, HTML and PDF files
#[derive(Debug, Clone, Copy, Default)]
pub struct FileParser;

impl DocumentParser for FileParser {
    fn parse(&self, path: &Path) -> Result<Document> {
        let format = FileFormat::from_path(path);
        if format == FileFormat::Skipped {
            warn!("Skipping {}: binary format with no text", path.display());
            return Ok(Document {
                source: path.to_string_lossy().into_owned(),
                text: String::new(),
            });
        }

        let bytes = fs::read(path).map_err(|e| KbError::PartialIngestion {
            path: path.to_path_buf(),
            reason: format!("could not read file: {}", e),
        })?;

        let text = if format == FileFormat::Pdf {
            pdf_to_text(&bytes).map_err(|reason| KbError::PartialIngestion {
                path: path.to_path_buf(),
                reason,
            })?
        } else {
            let raw = String::from_utf8(bytes).map_err(|_| KbError::PartialIngestion {
                path: path.to_path_buf(),
                reason: "file is not valid UTF-8 text".to_string(),
            })?;

            match format {
                FileFormat::Markdown => markdown_to_text(&raw),
                FileFormat::Html => html_to_text(&raw),
                _ => raw,
            }
        };

        debug!(
            "Parsed {} as {:?} ({} bytes of text)",
            path.display(),
            format,
            text.len()
        );

        Ok(Document {
            source: path.to_string_lossy().into_owned(),
            text,
        })
    }
}

/// Extract the text layer of a PDF.
///
/// Malformed files can make the extractor panic, which is reported as an
/// ordinary failure for that file.
#[inline]
pub fn pdf_to_text(bytes: &[u8]) -> std::result::Result<String, String> {
    let extracted = panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| "PDF extractor panicked on malformed input".to_string())?;

    let text = extracted.map_err(|e| format!("could not extract PDF text: {}", e))?;
    Ok(text.trim().to_string())
}

/// Render Markdown to plain text, keeping block structure as blank lines
#[inline]
pub fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::new();

    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak => text.push(' '),
            Event::HardBreak => text.push('\n'),
            Event::Start(Tag::Item) => text.push_str("- "),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock | TagEnd::BlockQuote(_),
            ) => text.push_str("\n\n"),
            Event::End(TagEnd::Item) => text.push('\n'),
            _ => {}
        }
    }

    text.trim().to_string()
}

/// Extract the visible text of an HTML document
#[inline]
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").expect("valid selector");

    let root = document
        .select(&body_selector)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut text = String::new();
    collect_text(root, &mut text);

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    if matches!(
        element.value().name(),
        "script" | "style" | "noscript" | "template"
    ) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
            }
            _ => {}
        }
    }
}
