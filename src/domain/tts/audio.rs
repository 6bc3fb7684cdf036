use std::io::Cursor;

/// Duration in seconds of an in-memory WAV file.
///
/// Every declared sample is decoded, so a stream whose data chunk is shorter
/// than its header claims (a truncated cache file, a cut-off response) fails
/// here instead of later during assembly.
pub fn wav_duration_secs(bytes: &[u8]) -> Result<f64, hound::Error> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(hound::Error::FormatError("zero sample rate"));
    }
    // hound reports duration in frames (samples per channel)
    let duration_secs = reader.duration() as f64 / spec.sample_rate as f64;

    let declared = reader.len();
    let decoded = match spec.sample_format {
        hound::SampleFormat::Int => count_samples(reader.samples::<i32>())?,
        hound::SampleFormat::Float => count_samples(reader.samples::<f32>())?,
    };
    if decoded != declared {
        return Err(hound::Error::FormatError("sample data shorter than declared"));
    }

    Ok(duration_secs)
}

fn count_samples<S>(samples: impl Iterator<Item = hound::Result<S>>) -> hound::Result<u32> {
    let mut count = 0u32;
    for sample in samples {
        sample?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
pub(crate) fn silent_wav(duration_secs: f64, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let frames = (duration_secs * sample_rate as f64).round() as u32;
        for _ in 0..frames {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
