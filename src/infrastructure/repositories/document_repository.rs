use crate::domain::assembly::{BookMetadata, ExtractedChapter, ExtractedDocument};
use crate::domain::job::SourceKind;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("unreadable document: {0}")]
    Corrupt(String),
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

/// Extraction collaborator: turns an uploaded file into ordered chapters,
/// an optional cover and descriptive metadata.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(
        &self,
        path: &Path,
        kind: SourceKind,
    ) -> Result<ExtractedDocument, DocumentError>;
}

/// Built-in extractor for plain text and HTML.
///
/// Chapters start at heading lines (`Chapter 3`, `PART ONE`, `# Title`,
/// `Prologue`) or at form feeds; a document without headings is one chapter.
/// ePub, PDF and DOCX need an external extractor.
#[derive(Debug, Default, Clone)]
pub struct PlainTextExtractor;

const HTML_WIDTH: usize = 10_000;

fn heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:#{1,3}\s+\S.*|(?:chapter|part|book)\s+(?:[0-9]+|[ivxlcdm]+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)\b(?:\s*[:.\-\x{2013}\x{2014}]\s*.{0,80})?|prologue|epilogue|introduction|preface)\s*$",
        )
        .expect("valid heading pattern")
    })
}

fn html_title_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title pattern")
    })
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://[^\s]+").expect("valid url pattern"))
}

fn excess_blank_lines() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n{3,}").expect("valid blank line pattern"))
}

impl PlainTextExtractor {
    /// Normalize line endings, drop URLs, strip trailing spaces and collapse
    /// runs of blank lines
    fn clean(text: &str) -> String {
        let unified = text.replace("\r\n", "\n").replace('\r', "\n");
        let unified = url_pattern().replace_all(&unified, "");
        let trimmed: Vec<&str> = unified.lines().map(str::trim_end).collect();
        excess_blank_lines()
            .replace_all(&trimmed.join("\n"), "\n\n")
            .trim()
            .to_string()
    }

    fn heading_title(line: &str) -> String {
        line.trim().trim_start_matches('#').trim().to_string()
    }

    /// Split cleaned text into chapters at headings and form feeds
    pub fn split_chapters(text: &str) -> Vec<ExtractedChapter> {
        let mut chapters = Vec::new();
        let mut title: Option<String> = None;
        let mut body: Vec<&str> = Vec::new();

        let mut flush = |title: Option<String>, body: &mut Vec<&str>| {
            let text = Self::clean(&body.join("\n"));
            if !text.is_empty() {
                let title = title.unwrap_or_else(|| format!("Chapter {}", chapters.len() + 1));
                chapters.push(ExtractedChapter { title, text });
            }
            body.clear();
        };

        for section in text.split('\u{c}') {
            for line in section.lines() {
                if heading_pattern().is_match(line) {
                    flush(title.take(), &mut body);
                    title = Some(Self::heading_title(line));
                } else {
                    body.push(line);
                }
            }
            flush(title.take(), &mut body);
        }

        chapters
    }

    fn html_to_text(html: &str) -> (String, Option<String>) {
        let title = html_title_pattern()
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty());
        let text = html2text::from_read(html.as_bytes(), HTML_WIDTH);
        (text, title)
    }
}

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    async fn extract(
        &self,
        path: &Path,
        kind: SourceKind,
    ) -> Result<ExtractedDocument, DocumentError> {
        if !matches!(kind, SourceKind::Txt | SourceKind::Html) {
            return Err(DocumentError::Unsupported(format!(
                "{} documents need an external extractor",
                kind.extension()
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        let raw = String::from_utf8(bytes)
            .map_err(|e| DocumentError::Corrupt(format!("not valid UTF-8: {}", e)))?;

        let (text, title) = match kind {
            SourceKind::Html => Self::html_to_text(&raw),
            _ => (raw, None),
        };

        let chapters = Self::split_chapters(&text.replace("\r\n", "\n"));
        if chapters.is_empty() {
            return Err(DocumentError::Corrupt("document contains no readable text".to_string()));
        }

        tracing::info!(
            path = %path.display(),
            chapters = chapters.len(),
            "Document extracted"
        );

        Ok(ExtractedDocument {
            chapters,
            cover: None,
            metadata: BookMetadata {
                title: title.unwrap_or_else(|| BookMetadata::default().title),
                ..BookMetadata::default()
            },
        })
    }
}
