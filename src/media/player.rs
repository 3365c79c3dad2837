//! Audio playback
//!
//! rodio's OutputStream is not Send, so each playback opens the output on
//! the blocking thread that runs it and polls a cancel flag until the sink
//! drains.

use super::clip::{AudioClip, PlaybackSource};
use crate::error::MediaError;
use rodio::{Decoder, OutputStream, Sink, Source};
use std::io::{BufReader, Cursor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Blocking audio output
pub trait Player: Send + Sync {
    /// Play `source` to completion, returning early once `cancel` is set
    fn play(&self, source: &PlaybackSource, cancel: &AtomicBool) -> Result<(), MediaError>;
}

/// rodio-based player on the default output device
pub struct RodioPlayer {
    volume: f32,
}

impl RodioPlayer {
    pub fn new(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
        }
    }

    fn append(&self, sink: &Sink, source: &PlaybackSource) -> Result<(), MediaError> {
        match source {
            PlaybackSource::Clip(AudioClip::Pcm {
                samples,
                sample_rate,
            }) => {
                let buffer = rodio::buffer::SamplesBuffer::new(1, *sample_rate, samples.clone());
                sink.append(buffer.amplify(self.volume));
            }
            PlaybackSource::Clip(AudioClip::Encoded(bytes)) => {
                let decoder = Decoder::new(Cursor::new(bytes.clone()))
                    .map_err(|e| MediaError::Playback(format!("Failed to decode audio: {}", e)))?;
                sink.append(decoder.amplify(self.volume));
            }
            PlaybackSource::File(path) => {
                let file = std::fs::File::open(path)
                    .map_err(|e| MediaError::Playback(format!("{}: {}", path.display(), e)))?;
                let decoder = Decoder::new(BufReader::new(file)).map_err(|e| {
                    MediaError::Playback(format!("Failed to decode {}: {}", path.display(), e))
                })?;
                sink.append(decoder.amplify(self.volume));
            }
        }
        Ok(())
    }
}

impl Player for RodioPlayer {
    fn play(&self, source: &PlaybackSource, cancel: &AtomicBool) -> Result<(), MediaError> {
        let (_stream, handle) = OutputStream::try_default()
            .map_err(|e| MediaError::DeviceNotFound(format!("audio output: {}", e)))?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| MediaError::Playback(format!("Failed to create audio sink: {}", e)))?;

        self.append(&sink, source)?;

        while !sink.empty() {
            if cancel.load(Ordering::Relaxed) {
                sink.stop();
                tracing::debug!("Playback cancelled");
                return Ok(());
            }
            std::thread::sleep(CANCEL_POLL);
        }
        Ok(())
    }
}
