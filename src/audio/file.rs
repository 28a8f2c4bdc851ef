//! Recorded speech from WAV files, conditioned the same way as live capture:
//! downmix with [`stereo_to_mono`], then convert with [`StreamResampler`].

use std::path::Path;

use hound::{SampleFormat, WavReader};
use thiserror::Error;

use crate::audio::{stereo_to_mono, ResamplerInitError, StreamResampler};

#[derive(Debug, Error)]
pub enum AudioFileError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: hound::Error,
    },

    #[error("{0} holds no audio")]
    Empty(String),

    #[error(transparent)]
    Resample(#[from] ResamplerInitError),
}

/// Decode `path` into mono samples at `target_rate`.
///
/// Integer PCM of any bit depth is scaled into `[-1.0, 1.0)`.
pub fn load_wav(path: &Path, target_rate: u32) -> Result<Vec<f32>, AudioFileError> {
    let read_err = |source| AudioFileError::Read {
        path: path.display().to_string(),
        source,
    };

    let mut reader = WavReader::open(path).map_err(read_err)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(read_err)?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(read_err)?
        }
    };

    let mono = stereo_to_mono(&interleaved, spec.channels);
    if mono.is_empty() {
        return Err(AudioFileError::Empty(path.display().to_string()));
    }

    let mut resampler = StreamResampler::new(spec.sample_rate, target_rate)?;
    let mut samples = resampler.process(&mono);
    samples.extend(resampler.flush());
    log::debug!(
        "{}: {} Hz x{} -> {} samples at {target_rate} Hz",
        path.display(),
        spec.sample_rate,
        spec.channels,
        samples.len()
    );
    Ok(samples)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    /// Write interleaved `samples` as 16-bit PCM.
    pub(crate) fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[f32]) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn mono_at_target_rate_is_scaled_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 16_000, 1, &[0.5; 1_600]);

        let samples = load_wav(&path, 16_000).unwrap();
        assert_eq!(samples.len(), 1_600);
        assert!(samples.iter().all(|s| (s - 0.5).abs() < 1e-3));
    }

    #[test]
    fn stereo_48k_becomes_mono_16k() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // One second; left and right average to 0.25.
        let interleaved: Vec<f32> = (0..48_000).flat_map(|_| [0.5, 0.0]).collect();
        write_wav(&path, 48_000, 2, &interleaved);

        let samples = load_wav(&path, 16_000).unwrap();
        let expected = 16_000_i64;
        assert!(
            (samples.len() as i64 - expected).abs() <= 64,
            "expected ~{expected}, got {}",
            samples.len()
        );
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_wav(Path::new("/nonexistent/clip.wav"), 16_000).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/clip.wav"));
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 16_000, 1, &[]);
        assert!(matches!(load_wav(&path, 16_000), Err(AudioFileError::Empty(_))));
    }
}
