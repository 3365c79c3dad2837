//! Audio clips and WAV encoding

use crate::error::MediaError;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A piece of audio held in memory
#[derive(Debug, Clone, PartialEq)]
pub enum AudioClip {
    /// Mono f32 samples in [-1.0, 1.0]
    Pcm { samples: Vec<f32>, sample_rate: u32 },
    /// Encoded container bytes (WAV or MP3) decoded at playback time
    Encoded(Vec<u8>),
}

impl AudioClip {
    /// A clip with no samples
    pub fn empty(sample_rate: u32) -> Self {
        AudioClip::Pcm {
            samples: Vec::new(),
            sample_rate,
        }
    }

    /// Whether the clip carries no audio (the "no speech" case)
    pub fn is_empty(&self) -> bool {
        match self {
            AudioClip::Pcm { samples, .. } => samples.is_empty(),
            AudioClip::Encoded(bytes) => bytes.is_empty(),
        }
    }

    /// Length of PCM audio; unknown for encoded clips
    pub fn duration(&self) -> Option<Duration> {
        match self {
            AudioClip::Pcm {
                samples,
                sample_rate,
            } if *sample_rate > 0 => Some(Duration::from_secs_f64(
                samples.len() as f64 / *sample_rate as f64,
            )),
            _ => None,
        }
    }

    /// Encode as 16-bit mono WAV (encoded clips are passed through)
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, MediaError> {
        match self {
            AudioClip::Pcm {
                samples,
                sample_rate,
            } => encode_wav(samples, *sample_rate),
            AudioClip::Encoded(bytes) => Ok(bytes.clone()),
        }
    }

    /// Write the clip to `path`, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<(), MediaError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MediaError::Encode(format!("{}: {}", parent.display(), e)))?;
        }
        let bytes = self.to_wav_bytes()?;
        std::fs::write(path, bytes)
            .map_err(|e| MediaError::Encode(format!("{}: {}", path.display(), e)))
    }
}

/// What to play
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackSource {
    Clip(AudioClip),
    File(PathBuf),
}

impl From<AudioClip> for PlaybackSource {
    fn from(clip: AudioClip) -> Self {
        PlaybackSource::Clip(clip)
    }
}

impl From<PathBuf> for PlaybackSource {
    fn from(path: PathBuf) -> Self {
        PlaybackSource::File(path)
    }
}

/// Encode f32 samples to WAV format
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, MediaError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut buffer, spec)
        .map_err(|e| MediaError::Encode(format!("Failed to create WAV writer: {}", e)))?;

    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = (clamped * i16::MAX as f32) as i16;
        writer
            .write_sample(scaled)
            .map_err(|e| MediaError::Encode(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| MediaError::Encode(format!("Failed to finalize WAV: {}", e)))?;

    Ok(buffer.into_inner())
}

/// Read a 16-bit or float WAV file into a mono PCM clip
pub fn read_wav(path: &Path) -> Result<AudioClip, MediaError> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| MediaError::Encode(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<Vec<f32>, hound::Error>>()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<f32>, hound::Error>>(),
    }
    .map_err(|e| MediaError::Encode(format!("{}: {}", path.display(), e)))?;

    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok(AudioClip::Pcm {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 16000.0).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_encode_wav_basic() {
        let wav = encode_wav(&sine(16000), 16000).unwrap();
        // 44 byte header + 16000 samples * 2 bytes
        assert_eq!(wav.len(), 44 + 32000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[test]
    fn test_empty_clip() {
        let clip = AudioClip::empty(16000);
        assert!(clip.is_empty());
        assert_eq!(clip.duration(), Some(Duration::ZERO));
        // Still a valid (header-only) WAV
        assert_eq!(clip.to_wav_bytes().unwrap().len(), 44);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2026-01-02").join("clip.wav");
        let clip = AudioClip::Pcm {
            samples: sine(8000),
            sample_rate: 16000,
        };
        clip.write_to(&path).unwrap();

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.duration(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_encoded_clip_passthrough() {
        let clip = AudioClip::Encoded(vec![1, 2, 3]);
        assert!(!clip.is_empty());
        assert!(clip.duration().is_none());
        assert_eq!(clip.to_wav_bytes().unwrap(), vec![1, 2, 3]);
    }
}
