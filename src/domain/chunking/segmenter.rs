use crate::domain::tts::LanguageCode;
use regex::Regex;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

/// Locale-specific sentence segmentation.
///
/// Implementations return contiguous byte spans that together cover the
/// whole input: trailing whitespace belongs to the sentence it follows, so
/// concatenating the spans reproduces the text exactly.
///
/// The segmenter also owns the size measure unit budgets are counted in:
/// `unit_starts` lists the byte offsets where each counted unit begins, and
/// forced cuts inside an unsegmentable run only ever land on those offsets.
pub trait SentenceSegmenter: Send + Sync {
    fn sentence_spans(&self, text: &str) -> Vec<Range<usize>>;

    fn unit_starts(&self, text: &str) -> Vec<usize>;

    fn measure(&self, text: &str) -> usize {
        self.unit_starts(text).len()
    }
}

/// Ideographs, kana and hangul counted per word-equivalent
pub const CJK_CHARS_PER_WORD: usize = 2;

/// Pick the segmentation strategy for a language
pub fn segmenter_for(language: LanguageCode) -> Arc<dyn SentenceSegmenter> {
    if language.is_cjk() {
        Arc::new(CjkSegmenter)
    } else {
        Arc::new(PunctuationSegmenter)
    }
}

/// Terminal punctuation (optionally closed by quotes or brackets) followed by
/// whitespace, or a blank line. A boundary is rejected when the next word
/// starts lowercase, which keeps "e.g. this" and "approx. five" together.
pub struct PunctuationSegmenter;

/// Full-width terminal punctuation needs no trailing space; ASCII terminators
/// still do. Blank lines always end a sentence.
pub struct CjkSegmenter;

fn punctuation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"[.!?…]+["'”’)\]]*\s+|\n[ \t]*\n\s*"#).expect("valid sentence pattern")
    })
}

fn cjk_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"[。！？]+[」』”’）)]*\s*|[.!?]+["'”’)\]]*\s+|\n[ \t]*\n\s*"#)
            .expect("valid CJK sentence pattern")
    })
}

impl SentenceSegmenter for PunctuationSegmenter {
    fn sentence_spans(&self, text: &str) -> Vec<Range<usize>> {
        spans_from_boundaries(text, punctuation_pattern(), |rest, matched| {
            // Paragraph breaks always end a sentence
            matched.matches('\n').count() >= 2
                || !rest.chars().next().is_some_and(char::is_lowercase)
        })
    }

    /// One unit per whitespace-separated word
    fn unit_starts(&self, text: &str) -> Vec<usize> {
        let mut starts = Vec::new();
        let mut in_word = false;
        for (offset, ch) in text.char_indices() {
            if ch.is_whitespace() {
                in_word = false;
            } else if !in_word {
                starts.push(offset);
                in_word = true;
            }
        }
        starts
    }
}

impl SentenceSegmenter for CjkSegmenter {
    fn sentence_spans(&self, text: &str) -> Vec<Range<usize>> {
        spans_from_boundaries(text, cjk_pattern(), |_, _| true)
    }

    /// Every `CJK_CHARS_PER_WORD` script characters make one unit; embedded
    /// Latin words count one each. Full-width punctuation closes the current
    /// group without counting.
    fn unit_starts(&self, text: &str) -> Vec<usize> {
        let mut starts = Vec::new();
        let mut in_word = false;
        let mut chars_in_group = 0;
        for (offset, ch) in text.char_indices() {
            if is_cjk_script(ch) {
                in_word = false;
                if chars_in_group % CJK_CHARS_PER_WORD == 0 {
                    starts.push(offset);
                }
                chars_in_group += 1;
            } else if is_cjk_punctuation(ch) || ch.is_whitespace() {
                in_word = false;
                chars_in_group = 0;
            } else {
                chars_in_group = 0;
                if !in_word {
                    starts.push(offset);
                    in_word = true;
                }
            }
        }
        starts
    }
}

fn is_cjk_script(ch: char) -> bool {
    matches!(
        ch,
        '\u{3040}'..='\u{30FF}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{4E00}'..='\u{9FFF}'
            | '\u{AC00}'..='\u{D7AF}'
            | '\u{F900}'..='\u{FAFF}'
    )
}

fn is_cjk_punctuation(ch: char) -> bool {
    matches!(ch, '\u{3000}'..='\u{303F}' | '\u{FF00}'..='\u{FFEF}')
}

/// Cut `text` after every accepted match of `pattern`
fn spans_from_boundaries<F>(text: &str, pattern: &Regex, accept: F) -> Vec<Range<usize>>
where
    F: Fn(&str, &str) -> bool,
{
    let mut spans = Vec::new();
    let mut start = 0;

    for mat in pattern.find_iter(text) {
        if mat.end() <= start || mat.end() == text.len() {
            continue;
        }
        if accept(&text[mat.end()..], mat.as_str()) {
            spans.push(start..mat.end());
            start = mat.end();
        }
    }

    if start < text.len() {
        spans.push(start..text.len());
    }

    spans
}
