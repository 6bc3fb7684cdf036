use super::segmenter::SentenceSegmenter;
use regex::Regex;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

/// ~300 words ≈ 2 min of audio per synthesis request.
/// Budgets are in the segmenter's measure (words, or CJK character pairs).
pub const DEFAULT_TARGET_WORDS: usize = 300;
/// Hard ceiling before unsegmentable text is forced apart
pub const DEFAULT_MAX_WORDS: usize = 400;

/// Bounded span of chapter text sent to synthesis as one request
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub index: usize,
    /// Exact slice of the chapter text, trailing whitespace included
    pub text: String,
    /// Size in the segmenter's measure
    pub word_count: usize,
    /// The unit ends at a blank line; assembly inserts a longer pause
    pub ends_paragraph: bool,
    /// Trimmed sentences (or clauses) in reading order, for lyric timing
    pub sentences: Vec<String>,
}

impl Unit {
    /// Text as it is sent to the speech service
    pub fn speech_text(&self) -> String {
        normalize_text(&self.text)
    }
}

/// Collapse whitespace runs to one space and trim.
/// Shared by synthesis requests and cache keys, so both see identical text.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone)]
struct Piece {
    span: Range<usize>,
    words: usize,
    ends_paragraph: bool,
}

/// Greedy sentence packer.
///
/// Sentences accumulate into the current unit until the next one would push
/// it past `target_words`. A sentence larger than the target gets a unit of
/// its own; only a "sentence" larger than `max_words` (text with no usable
/// punctuation) is broken up, first at clause punctuation, then at the
/// segmenter's unit boundaries.
#[derive(Clone)]
pub struct UnitSplitter {
    target_words: usize,
    max_words: usize,
    segmenter: Arc<dyn SentenceSegmenter>,
}

fn clause_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[,;:\x{2014}]\s+|[、，；：]\s*").expect("valid clause pattern")
    })
}

fn ends_paragraph(text: &str) -> bool {
    let trailing = &text[text.trim_end().len()..];
    trailing.matches('\n').count() >= 2
}

impl UnitSplitter {
    pub fn new(
        target_words: usize,
        max_words: usize,
        segmenter: Arc<dyn SentenceSegmenter>,
    ) -> Self {
        let target_words = target_words.max(1);
        Self {
            target_words,
            max_words: max_words.max(target_words),
            segmenter,
        }
    }

    pub fn target_words(&self) -> usize {
        self.target_words
    }

    /// Split one chapter's text into ordered units.
    ///
    /// Deterministic for identical text and settings; concatenating the
    /// returned unit texts reproduces `text` unless it is blank.
    pub fn split(&self, text: &str) -> Vec<Unit> {
        let pieces: Vec<Piece> = self
            .segmenter
            .sentence_spans(text)
            .into_iter()
            .flat_map(|span| self.pieces_for_sentence(text, span))
            .collect();

        let mut groups: Vec<Vec<Piece>> = Vec::new();
        let mut current: Vec<Piece> = Vec::new();
        let mut current_words = 0;

        for piece in pieces {
            let overflows = current_words + piece.words > self.target_words;
            if current_words > 0 && piece.words > 0 && overflows {
                groups.push(std::mem::take(&mut current));
                current_words = 0;
            }
            current_words += piece.words;
            current.push(piece);
        }

        if !current.is_empty() {
            // Trailing whitespace-only text joins the previous unit
            match groups.last_mut() {
                Some(last) if current_words == 0 => last.extend(current),
                _ => groups.push(current),
            }
        }

        groups
            .into_iter()
            .filter(|group| group.iter().any(|piece| piece.words > 0))
            .enumerate()
            .map(|(index, group)| Self::build_unit(text, index, &group))
            .collect()
    }

    fn build_unit(text: &str, index: usize, group: &[Piece]) -> Unit {
        let start = group.first().map(|p| p.span.start).unwrap_or(0);
        let end = group.last().map(|p| p.span.end).unwrap_or(start);

        Unit {
            index,
            text: text[start..end].to_string(),
            word_count: group.iter().map(|p| p.words).sum(),
            ends_paragraph: group.last().is_some_and(|p| p.ends_paragraph),
            sentences: group
                .iter()
                .map(|p| text[p.span.clone()].trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    fn pieces_for_sentence(&self, text: &str, span: Range<usize>) -> Vec<Piece> {
        let sentence = &text[span.clone()];
        let words = self.segmenter.measure(sentence);
        let paragraph = ends_paragraph(sentence);

        if words <= self.max_words {
            return vec![Piece {
                span,
                words,
                ends_paragraph: paragraph,
            }];
        }

        tracing::debug!(
            words,
            max_words = self.max_words,
            "Sentence exceeds ceiling, falling back to clause boundaries"
        );

        let mut pieces = Vec::new();
        let mut start = span.start;
        let mut cuts: Vec<usize> = clause_pattern()
            .find_iter(sentence)
            .map(|m| span.start + m.end())
            .filter(|&cut| cut < span.end)
            .collect();
        cuts.push(span.end);

        for cut in cuts {
            pieces.extend(self.hard_split(text, start..cut));
            start = cut;
        }

        if let Some(last) = pieces.last_mut() {
            last.ends_paragraph = paragraph;
        }
        pieces
    }

    /// Break a span into runs of at most `max_words` units, cutting only at
    /// unit starts so whitespace stays with the preceding run
    fn hard_split(&self, text: &str, span: Range<usize>) -> Vec<Piece> {
        let starts = self.segmenter.unit_starts(&text[span.clone()]);
        if starts.len() <= self.max_words {
            return vec![Piece {
                words: starts.len(),
                span,
                ends_paragraph: false,
            }];
        }

        let mut pieces = Vec::new();
        let mut run_start = span.start;
        for &cut in starts.iter().step_by(self.max_words).skip(1) {
            pieces.push(Piece {
                span: run_start..span.start + cut,
                words: self.max_words,
                ends_paragraph: false,
            });
            run_start = span.start + cut;
        }

        pieces.push(Piece {
            span: run_start..span.end,
            words: starts.len() - self.max_words * pieces.len(),
            ends_paragraph: false,
        });
        pieces
    }
}

impl std::fmt::Debug for UnitSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitSplitter")
            .field("target_words", &self.target_words)
            .field("max_words", &self.max_words)
            .finish_non_exhaustive()
    }
}
