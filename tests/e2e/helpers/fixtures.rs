use audiobook_pipeline::domain::job::SubmitJobRequest;
use std::io::Cursor;

const SAMPLE_RATE: u32 = 8000;

/// Two chapters; with five-word units chapter 1 has three units and
/// chapter 2 has two
pub const TWO_CHAPTER_BOOK: &str = "Chapter 1\n\
One two three four five. Six seven eight nine ten. Eleven twelve thirteen fourteen fifteen.\n\
\n\
Chapter 2\n\
Alpha beta gamma delta epsilon. Zeta eta theta iota kappa.\n";

pub const SHORT_NOTE: &str = "Hello from a very short note.\n";

/// Silent mono 16-bit WAV of the given length
pub fn wav_bytes(secs: f64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("Failed to create WAV");
        for _ in 0..(secs * SAMPLE_RATE as f64).round() as usize {
            writer.write_sample(0i16).expect("Failed to write sample");
        }
        writer.finalize().expect("Failed to finalize WAV");
    }
    cursor.into_inner()
}

/// English WAV-bundle job for a text document
pub fn text_request(filename: &str, text: &str) -> SubmitJobRequest {
    SubmitJobRequest {
        filename: filename.to_string(),
        source: text.as_bytes().to_vec(),
        voice: Some("Aiden".to_string()),
        language: Some("en".to_string()),
        output_format: Some("wav".to_string()),
        ..SubmitJobRequest::default()
    }
}

pub fn book_request() -> SubmitJobRequest {
    text_request("two_chapters.txt", TWO_CHAPTER_BOOK)
}

/// Segment files under the chunk cache root (one shard level deep)
pub fn segment_files(cache_dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let Ok(shards) = std::fs::read_dir(cache_dir) else {
        return files;
    };
    for shard in shards.flatten().filter(|entry| entry.path().is_dir()) {
        for entry in std::fs::read_dir(shard.path()).into_iter().flatten().flatten() {
            if entry.path().extension().is_some_and(|ext| ext == "wav") {
                files.push(entry.path());
            }
        }
    }
    files
}
