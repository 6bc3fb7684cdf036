use super::model::{ChapterAudio, LyricLine, UnitAudio};

/// Pause between units inside a paragraph
pub const UNIT_GAP_SECS: f64 = 0.5;
/// Pause after a unit that closes a paragraph
pub const PARAGRAPH_GAP_SECS: f64 = 1.5;
/// Pause between chapters when they play back to back
pub const CHAPTER_GAP_SECS: f64 = 3.0;

const MAX_LINE_CHARS: usize = 200;

/// Silence inserted after a unit; the last unit of a chapter gets none
pub fn gap_after(unit: &UnitAudio, is_last: bool) -> f64 {
    if is_last {
        0.0
    } else if unit.ends_paragraph {
        PARAGRAPH_GAP_SECS
    } else {
        UNIT_GAP_SECS
    }
}

/// Lines longer than 200 characters are cut for display
pub fn display_line(text: &str) -> String {
    if text.chars().count() <= MAX_LINE_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_LINE_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}

/// Sentence-level timing of a chapter and its total duration.
///
/// Each unit's measured duration is spread over its sentences in proportion
/// to their character counts; gaps follow `gap_after`.
pub fn chapter_timing(units: &[UnitAudio]) -> (Vec<LyricLine>, f64) {
    let mut lines = Vec::new();
    let mut offset = 0.0;

    for (i, unit) in units.iter().enumerate() {
        let weights: Vec<usize> = unit
            .sentences
            .iter()
            .map(|s| s.chars().filter(|c| !c.is_whitespace()).count().max(1))
            .collect();
        let total_weight: usize = weights.iter().sum();

        let mut cursor = 0.0;
        for (sentence, weight) in unit.sentences.iter().zip(&weights) {
            lines.push(LyricLine {
                start_secs: round_millis(offset + cursor),
                text: display_line(sentence),
            });
            cursor += unit.segment.duration_secs * (*weight as f64) / (total_weight as f64);
        }

        offset += unit.segment.duration_secs + gap_after(unit, i + 1 == units.len());
    }

    (lines, offset)
}

/// Start time of each chapter when all chapters play as one book
pub fn chapter_offsets(chapters: &[ChapterAudio]) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(chapters.len());
    let mut offset = 0.0;
    for chapter in chapters {
        offsets.push(round_millis(offset));
        offset += chapter.duration_secs + CHAPTER_GAP_SECS;
    }
    offsets
}

fn round_millis(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}
