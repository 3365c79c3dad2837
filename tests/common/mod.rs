//! Fakes and a harness for driving the coordinator without hardware

#![allow(dead_code)]

use async_trait::async_trait;
use echomemo::ai::{AiBackend, AiService};
use echomemo::assets::AssetLibrary;
use echomemo::config::AiConfig;
use echomemo::coordinator::{Coordinator, Services, Settings, Timings};
use echomemo::display::SharedDisplay;
use echomemo::error::{AiError, MediaError};
use echomemo::event::{self, Event, EventKind, EventReceiver, EventSender};
use echomemo::media::{AudioCapture, AudioClip, MediaService, PlaybackSource, Player};
use echomemo::store::{MemoryRecord, MemoryStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const QUESTION: &str = "How was your day?";

/// Returns a fixed number of samples on every stop
pub struct FakeCapture {
    pub samples: usize,
    pub fail: bool,
}

#[async_trait]
impl AudioCapture for FakeCapture {
    async fn start(&mut self) -> Result<(), MediaError> {
        if self.fail {
            return Err(MediaError::DeviceNotFound("hw:1,0".into()));
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<Vec<f32>, MediaError> {
        Ok(vec![0.05; self.samples])
    }
}

/// "Plays" for a fixed time, honouring cancellation
pub struct FakePlayer {
    pub length: Duration,
    pub plays: AtomicUsize,
}

impl Player for FakePlayer {
    fn play(&self, _source: &PlaybackSource, cancel: &AtomicBool) -> Result<(), MediaError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        let step = Duration::from_millis(2);
        let mut elapsed = Duration::ZERO;
        while elapsed < self.length && !cancel.load(Ordering::Relaxed) {
            std::thread::sleep(step);
            elapsed += step;
        }
        Ok(())
    }
}

/// Scriptable remote AI
#[derive(Default)]
pub struct FakeBackend {
    pub transcript: Mutex<String>,
    pub fail_transcribe: AtomicBool,
    pub fail_questions: AtomicBool,
    pub fail_synthesis: AtomicBool,
    /// Block transcription for this many milliseconds
    pub transcribe_delay_ms: AtomicUsize,
    pub question_calls: AtomicUsize,
    pub reply_calls: AtomicUsize,
    /// Transcripts of the context handed to each reply
    pub reply_contexts: Mutex<Vec<Vec<String>>>,
    /// (text, voice) of every successful synthesis
    pub synthesized: Mutex<Vec<(String, String)>>,
}

impl FakeBackend {
    pub fn set_transcript(&self, text: &str) {
        *self.transcript.lock().unwrap() = text.to_string();
    }

    pub fn synthesized(&self) -> Vec<(String, String)> {
        self.synthesized.lock().unwrap().clone()
    }
}

impl AiBackend for FakeBackend {
    fn transcribe(&self, _clip: &AudioClip) -> Result<String, AiError> {
        let delay = self.transcribe_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }
        if self.fail_transcribe.load(Ordering::SeqCst) {
            return Err(AiError::Network("connection reset".into()));
        }
        Ok(self.transcript.lock().unwrap().clone())
    }

    fn generate_question(&self, _history: &[MemoryRecord]) -> Result<String, AiError> {
        self.question_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_questions.load(Ordering::SeqCst) {
            return Err(AiError::Network("connection refused".into()));
        }
        Ok(QUESTION.to_string())
    }

    fn generate_reply(&self, transcript: &str, memories: &[MemoryRecord]) -> Result<String, AiError> {
        self.reply_calls.fetch_add(1, Ordering::SeqCst);
        self.reply_contexts
            .lock()
            .unwrap()
            .push(memories.iter().map(|m| m.transcript.clone()).collect());
        Ok(format!("Reply to {}", transcript))
    }

    fn synthesize(&self, text: &str, voice: &str) -> Result<AudioClip, AiError> {
        if self.fail_synthesis.load(Ordering::SeqCst) {
            return Err(AiError::SynthesisFailed("voice service down".into()));
        }
        self.synthesized
            .lock()
            .unwrap()
            .push((text.to_string(), voice.to_string()));
        Ok(AudioClip::Pcm {
            samples: vec![0.0; 160],
            sample_rate: 16000,
        })
    }
}

pub struct Options {
    pub samples: usize,
    /// Opening the microphone fails
    pub capture_fails: bool,
    pub playback: Duration,
    pub timings: Timings,
    pub assets: AssetLibrary,
    /// Where finished recordings are kept
    pub recordings_dir: Option<PathBuf>,
    /// SQLite file instead of an in-memory store
    pub database: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            samples: 1600,
            capture_fails: false,
            playback: Duration::from_millis(20),
            timings: Timings {
                reminder_delay: Duration::from_millis(150),
                reminder_retry: Duration::from_millis(30),
                countdown_tick: Duration::from_millis(50),
                recording_deadline: Duration::from_secs(2),
                remote_deadline: Duration::from_secs(1),
                playback_deadline: Duration::from_secs(1),
            },
            assets: AssetLibrary::builtin(),
            recordings_dir: None,
            database: None,
        }
    }
}

pub struct Harness {
    pub coordinator: Coordinator,
    pub queue: EventReceiver,
    pub events: EventSender,
    pub media: MediaService,
    pub backend: Arc<FakeBackend>,
    pub player: Arc<FakePlayer>,
    pub display: SharedDisplay,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Options::default())
    }

    pub fn with(options: Options) -> Self {
        let (events, queue) = event::channel();
        let backend = Arc::new(FakeBackend::default());
        let player = Arc::new(FakePlayer {
            length: options.playback,
            plays: AtomicUsize::new(0),
        });
        let media = MediaService::new(
            Box::new(FakeCapture {
                samples: options.samples,
                fail: options.capture_fails,
            }),
            player.clone(),
            events.clone(),
            16000,
        );
        let ai_config = AiConfig {
            system_voice: "sys".into(),
            persona_voice: "me".into(),
            ..AiConfig::default()
        };
        let ai = AiService::new(backend.clone(), &ai_config).with_backoff(Duration::from_millis(5));
        let display = SharedDisplay::new();

        let coordinator = Coordinator::new(
            Services {
                media: media.clone(),
                ai,
                store: match &options.database {
                    Some(path) => MemoryStore::open(path).unwrap(),
                    None => MemoryStore::open_in_memory().unwrap(),
                },
                assets: options.assets,
                display: Box::new(display.clone()),
            },
            Settings {
                timings: options.timings,
                rag_context: 5,
                recordings_dir: options.recordings_dir,
            },
            events.clone(),
        );

        Self {
            coordinator,
            queue,
            events,
            media,
            backend,
            player,
            display,
        }
    }

    /// Deliver an input event directly
    pub async fn send(&mut self, kind: EventKind) {
        self.coordinator.handle(Event::new(kind));
    }

    pub async fn rotate(&mut self, delta: i32) {
        self.send(EventKind::EncoderRotate { delta }).await;
    }

    /// Process queued events until `done` holds; false on timeout
    pub async fn run_until(&mut self, done: impl Fn(&Coordinator) -> bool, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while !done(&self.coordinator) {
            match tokio::time::timeout_at(deadline, self.queue.recv()).await {
                Ok(Some(event)) => self.coordinator.handle(event),
                _ => return false,
            }
        }
        true
    }

    /// Process queued events until the coordinator is idle
    pub async fn settle(&mut self) {
        let idle = self
            .run_until(|c| c.state().activity.is_idle(), Duration::from_secs(3))
            .await;
        assert!(idle, "coordinator stuck in {}", self.coordinator.state());
    }

    /// Process whatever arrives during `period`
    pub async fn pump(&mut self, period: Duration) {
        self.run_until(|_| false, period).await;
    }

    /// Start the coordinator and wait for the first question to finish
    pub async fn started(options: Options) -> Self {
        let mut h = Self::with(options);
        h.coordinator.start();
        h.settle().await;
        h
    }

    pub fn today_records(&self) -> Vec<MemoryRecord> {
        let today = chrono::Local::now().date_naive();
        self.coordinator.store().query(today).unwrap()
    }
}
