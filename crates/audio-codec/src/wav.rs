//! WAV file I/O utilities.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::debug;

use fftnet_core::{AudioChunk, FftNetError, FftNetResult};

/// Write an audio chunk to a 16-bit mono WAV file.
pub fn write_wav(path: impl AsRef<Path>, chunk: &AudioChunk) -> FftNetResult<()> {
    write_wav_samples(path, &chunk.pcm, chunk.sample_rate)
}

/// Write float samples to a 16-bit mono WAV file, clamping to `[-1, 1]`.
pub fn write_wav_samples(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate: u32,
) -> FftNetResult<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer =
        WavWriter::create(path.as_ref(), spec).map_err(|e| FftNetError::audio(e.to_string()))?;

    for &sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(sample_i16)
            .map_err(|e| FftNetError::audio(e.to_string()))?;
    }

    writer
        .finalize()
        .map_err(|e| FftNetError::audio(e.to_string()))?;

    debug!(
        "Wrote {} samples at {} Hz to {}",
        samples.len(),
        sample_rate,
        path.as_ref().display()
    );
    Ok(())
}

/// Read a WAV file as mono float samples; multi-channel input is averaged.
pub fn read_wav(path: impl AsRef<Path>) -> FftNetResult<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(path.as_ref()).map_err(|e| FftNetError::audio(e.to_string()))?;

    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| FftNetError::audio(e.to_string()))?
        }
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FftNetError::audio(e.to_string()))?,
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((samples, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..160).map(|i| (i as f32 / 10.0).sin() * 0.5).collect();

        write_wav_samples(&path, &samples, 16000).unwrap();
        let (read, rate) = read_wav(&path).unwrap();

        assert_eq!(rate, 16000);
        assert_eq!(read.len(), samples.len());
        for (a, b) in samples.iter().zip(&read) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_clamping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loud.wav");
        write_wav(&path, &AudioChunk::new(vec![2.0, -2.0], 8000)).unwrap();
        let (read, _) = read_wav(&path).unwrap();
        assert!(read[0] > 0.99);
        assert!(read[1] < -0.99);
    }

    #[test]
    fn test_stereo_is_mixed_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..4 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let (read, rate) = read_wav(&path).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(read.len(), 4);
        assert!(read.iter().all(|s| (s - 0.25).abs() < 1e-3));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_wav("/no/such/file.wav"),
            Err(FftNetError::Audio(_))
        ));
    }
}
