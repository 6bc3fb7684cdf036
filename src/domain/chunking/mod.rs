pub mod segmenter;
pub mod splitter;

pub use segmenter::{
    segmenter_for, CjkSegmenter, PunctuationSegmenter, SentenceSegmenter, CJK_CHARS_PER_WORD,
};
pub use splitter::{normalize_text, Unit, UnitSplitter, DEFAULT_MAX_WORDS, DEFAULT_TARGET_WORDS};
