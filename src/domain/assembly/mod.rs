pub mod model;
pub mod timing;

pub use model::{
    AssemblyRequest, BookMetadata, ChapterAudio, CoverImage, ExtractedChapter, ExtractedDocument,
    LyricLine, UnitAudio, UNKNOWN_TITLE,
};
pub use timing::{
    chapter_offsets, chapter_timing, CHAPTER_GAP_SECS, PARAGRAPH_GAP_SECS, UNIT_GAP_SECS,
};
