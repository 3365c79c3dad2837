//! Named audio assets
//!
//! The coordinator refers to clips by logical name only. Each name resolves
//! to a file in the assets directory when present, otherwise to a tone
//! generated at startup so the device works without shipping binary files.

use crate::media::{AudioClip, PlaybackSource};
use std::collections::HashMap;
use std::path::Path;

const TONE_RATE: u32 = 22050;

/// Logical clip names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    /// Ambient sound while a question or reply is being generated
    ThinkingFiller,
    /// Played when a reminder fires
    ReminderAlert,
    /// Played after an interview answer has been saved
    ConfirmationChime,
    /// Pre-recorded answer used when synthesis fails
    GenericReply,
}

impl Asset {
    pub const ALL: [Asset; 4] = [
        Asset::ThinkingFiller,
        Asset::ReminderAlert,
        Asset::ConfirmationChime,
        Asset::GenericReply,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Asset::ThinkingFiller => "thinking_filler",
            Asset::ReminderAlert => "reminder_alert",
            Asset::ConfirmationChime => "confirmation_chime",
            Asset::GenericReply => "generic_reply",
        }
    }

    pub fn from_name(name: &str) -> Option<Asset> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Generated fallback, if this asset has one
    fn builtin(self) -> Option<AudioClip> {
        match self {
            // Soft pulsing hum
            Asset::ThinkingFiller => Some(pulse_clip(330.0, 1800, 3)),
            // Three rising beeps
            Asset::ReminderAlert => Some(concat(&[
                tone(660.0, 180, 15),
                silence(90),
                tone(880.0, 180, 15),
                silence(90),
                tone(1100.0, 260, 20),
            ])),
            // Rising two-tone
            Asset::ConfirmationChime => Some(two_tone(523.0, 784.0, 220, 20)),
            Asset::GenericReply => None,
        }
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved clips, read-only after construction
#[derive(Debug, Clone, Default)]
pub struct AssetLibrary {
    clips: HashMap<Asset, PlaybackSource>,
}

impl AssetLibrary {
    /// Resolve every asset against `dir` (`<name>.wav` or `<name>.mp3`)
    pub fn load(dir: &Path) -> Self {
        let mut clips = HashMap::new();
        for asset in Asset::ALL {
            let file = ["wav", "mp3"]
                .iter()
                .map(|ext| dir.join(format!("{}.{}", asset.name(), ext)))
                .find(|p| p.is_file());

            match file {
                Some(path) => {
                    tracing::debug!("Asset {} -> {:?}", asset, path);
                    clips.insert(asset, PlaybackSource::File(path));
                }
                None => match asset.builtin() {
                    Some(clip) => {
                        tracing::debug!("Asset {} -> built-in tone", asset);
                        clips.insert(asset, PlaybackSource::Clip(clip));
                    }
                    None => tracing::info!("Asset {} not found in {:?}", asset, dir),
                },
            }
        }
        Self { clips }
    }

    /// Built-in tones only
    pub fn builtin() -> Self {
        let clips = Asset::ALL
            .into_iter()
            .filter_map(|a| a.builtin().map(|clip| (a, PlaybackSource::Clip(clip))))
            .collect();
        Self { clips }
    }

    pub fn get(&self, asset: Asset) -> Option<PlaybackSource> {
        self.clips.get(&asset).cloned()
    }

    pub fn with(mut self, asset: Asset, source: PlaybackSource) -> Self {
        self.clips.insert(asset, source);
        self
    }

    pub fn without(mut self, asset: Asset) -> Self {
        self.clips.remove(&asset);
        self
    }
}

// === Tone generation ===

fn envelope(i: usize, len: usize, fade: usize) -> f32 {
    if fade == 0 {
        1.0
    } else if i < fade {
        i as f32 / fade as f32
    } else if i + fade >= len {
        (len - i) as f32 / fade as f32
    } else {
        1.0
    }
}

/// Sine tone with fade in/out
fn tone(frequency: f32, duration_ms: u32, fade_ms: u32) -> Vec<f32> {
    let len = (TONE_RATE * duration_ms / 1000) as usize;
    let fade = (TONE_RATE * fade_ms / 1000) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / TONE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * envelope(i, len, fade) * 0.5
        })
        .collect()
}

fn two_tone(freq1: f32, freq2: f32, duration_ms: u32, fade_ms: u32) -> AudioClip {
    let half = duration_ms / 2;
    concat(&[tone(freq1, half, fade_ms), tone(freq2, half, fade_ms)])
}

/// Tone whose amplitude swells `pulses` times over its length
fn pulse_clip(frequency: f32, duration_ms: u32, pulses: u32) -> AudioClip {
    let base = tone(frequency, duration_ms, 0);
    let len = base.len().max(1);
    let samples = base
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            let phase = i as f32 / len as f32 * pulses as f32 * std::f32::consts::PI;
            s * phase.sin().abs() * 0.4
        })
        .collect();
    AudioClip::Pcm {
        samples,
        sample_rate: TONE_RATE,
    }
}

fn silence(duration_ms: u32) -> Vec<f32> {
    vec![0.0; (TONE_RATE * duration_ms / 1000) as usize]
}

fn concat(parts: &[Vec<f32>]) -> AudioClip {
    AudioClip::Pcm {
        samples: parts.concat(),
        sample_rate: TONE_RATE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_names_round_trip() {
        for asset in Asset::ALL {
            assert_eq!(Asset::from_name(asset.name()), Some(asset));
        }
        assert_eq!(Asset::from_name("nope"), None);
    }

    #[test]
    fn test_builtin_tones() {
        let lib = AssetLibrary::builtin();
        for asset in [
            Asset::ThinkingFiller,
            Asset::ReminderAlert,
            Asset::ConfirmationChime,
        ] {
            match lib.get(asset) {
                Some(PlaybackSource::Clip(clip)) => {
                    assert!(!clip.is_empty());
                    assert!(clip.to_wav_bytes().unwrap().starts_with(b"RIFF"));
                }
                other => panic!("{} resolved to {:?}", asset, other),
            }
        }
        assert!(lib.get(Asset::GenericReply).is_none());
    }

    #[test]
    fn test_files_override_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let chime = dir.path().join("confirmation_chime.wav");
        AudioClip::Pcm {
            samples: vec![0.0; 100],
            sample_rate: 16000,
        }
        .write_to(&chime)
        .unwrap();
        std::fs::write(dir.path().join("generic_reply.mp3"), b"ID3").unwrap();

        let lib = AssetLibrary::load(dir.path());
        assert_eq!(
            lib.get(Asset::ConfirmationChime),
            Some(PlaybackSource::File(chime))
        );
        assert!(matches!(
            lib.get(Asset::GenericReply),
            Some(PlaybackSource::File(_))
        ));
        assert!(matches!(
            lib.get(Asset::ReminderAlert),
            Some(PlaybackSource::Clip(_))
        ));
    }

    #[test]
    fn test_tone_envelope_starts_and_ends_quiet() {
        let samples = tone(440.0, 100, 10);
        assert_eq!(samples.len(), 2205);
        assert_eq!(samples[0], 0.0);
        assert!(samples.last().unwrap().abs() < 0.01);
    }
}
