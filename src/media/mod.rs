//! Recording and playback behind a single exclusivity lock
//!
//! `MediaService` owns the microphone and the speaker. At most one of
//! {recording, playback} is active at any instant; the service enforces
//! this itself with an internal slot rather than trusting callers.
//! Playback completion is reported as `TASK_DONE` on the event queue.

pub mod capture;
pub mod clip;
pub mod player;

pub use capture::{create_capture, AudioCapture, CpalCapture};
pub use clip::{encode_wav, read_wav, AudioClip, PlaybackSource};
pub use player::{Player, RodioPlayer};

use crate::error::MediaError;
use crate::event::{EventKind, EventSender, TaskOutput, TaskTag};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// How long a new recording waits for a stopping playback to let go of the speaker
const PLAYBACK_EXIT_TIMEOUT: Duration = Duration::from_millis(500);

/// The one active recording. Only `MediaService` can create one.
#[derive(Debug)]
pub struct RecordingSession {
    id: u64,
    started_at: Instant,
}

impl RecordingSession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Identifies a started playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackHandle {
    id: u64,
}

#[derive(Debug)]
enum Slot {
    Idle,
    Recording {
        id: u64,
    },
    /// Stays taken after a stop request until the player thread has exited
    Playing {
        id: u64,
        cancel: Arc<AtomicBool>,
        stopping: bool,
    },
}

struct Inner {
    slot: Mutex<Slot>,
    capture: tokio::sync::Mutex<Box<dyn AudioCapture>>,
    player: Arc<dyn Player>,
    /// Held by a player thread for as long as it drives the output
    output: Mutex<()>,
    /// Player threads spawned and not yet exited
    players: AtomicUsize,
    player_exited: Notify,
    events: EventSender,
    sample_rate: u32,
    next_id: AtomicU64,
}

/// Shared handle to the audio hardware; cheap to clone
#[derive(Clone)]
pub struct MediaService {
    inner: Arc<Inner>,
}

impl MediaService {
    pub fn new(
        capture: Box<dyn AudioCapture>,
        player: Arc<dyn Player>,
        events: EventSender,
        sample_rate: u32,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::Idle),
                capture: tokio::sync::Mutex::new(capture),
                player,
                output: Mutex::new(()),
                players: AtomicUsize::new(0),
                player_exited: Notify::new(),
                events,
                sample_rate,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        lock(&self.inner.slot)
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn is_session(&self, id: u64) -> bool {
        matches!(&*self.slot(), Slot::Recording { id: active } if *active == id)
    }

    /// Claim the microphone and return at once.
    ///
    /// The device is opened in the background, after any playback that is
    /// still stopping has released the speaker. If opening fails the slot is
    /// freed and the error is posted as `TaskDone { tag }`.
    pub fn start_recording(&self, tag: TaskTag) -> Result<RecordingSession, MediaError> {
        let id = {
            let mut slot = self.slot();
            match &*slot {
                Slot::Idle => {}
                Slot::Recording { .. } => {
                    return Err(MediaError::ResourceBusy("recording in progress".into()))
                }
                Slot::Playing {
                    stopping: false, ..
                } => return Err(MediaError::ResourceBusy("playback in progress".into())),
                Slot::Playing { id, .. } => {
                    tracing::debug!("Recording waits for playback {} to stop", id);
                }
            }
            let id = self.next_id();
            *slot = Slot::Recording { id };
            id
        };

        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.open_capture(id).await {
                tracing::warn!("Failed to open microphone for session {}: {}", id, e);
                service.release_recording(id);
                service
                    .inner
                    .events
                    .post(EventKind::TaskDone {
                        tag,
                        result: Err(e.into()),
                    })
                    .await;
            }
        });

        tracing::debug!("Recording session {} started", id);
        Ok(RecordingSession {
            id,
            started_at: Instant::now(),
        })
    }

    async fn open_capture(&self, id: u64) -> Result<(), MediaError> {
        self.wait_for_players().await?;
        let mut capture = self.inner.capture.lock().await;
        // Released before the device was opened
        if !self.is_session(id) {
            return Ok(());
        }
        capture.start().await
    }

    /// Wait until no player thread is left, bounded by `PLAYBACK_EXIT_TIMEOUT`
    async fn wait_for_players(&self) -> Result<(), MediaError> {
        let deadline = tokio::time::Instant::now() + PLAYBACK_EXIT_TIMEOUT;
        loop {
            let exited = self.inner.player_exited.notified();
            tokio::pin!(exited);
            exited.as_mut().enable();
            if self.inner.players.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, exited).await.is_err() {
                return Err(MediaError::ResourceBusy("playback did not stop".into()));
            }
        }
    }

    /// Finish `session` and return what was captured (possibly empty)
    pub async fn stop_recording(&self, session: &RecordingSession) -> Result<AudioClip, MediaError> {
        let not_active = || {
            MediaError::InvalidState(format!("session {} is not active", session.id))
        };
        if !self.is_session(session.id) {
            return Err(not_active());
        }

        let result = {
            let mut capture = self.inner.capture.lock().await;
            // The background open may have failed meanwhile
            if !self.is_session(session.id) {
                return Err(not_active());
            }
            capture.stop().await
        };
        self.release_recording(session.id);

        let samples = result?;
        tracing::debug!(
            "Recording session {} stopped after {:.1}s ({} samples)",
            session.id,
            session.started_at.elapsed().as_secs_f32(),
            samples.len()
        );
        Ok(AudioClip::Pcm {
            samples,
            sample_rate: self.inner.sample_rate,
        })
    }

    fn release_recording(&self, id: u64) {
        let mut slot = self.slot();
        if matches!(&*slot, Slot::Recording { id: active } if *active == id) {
            *slot = Slot::Idle;
        }
    }

    /// Start playing `source`; completion is posted as `TaskDone { tag }`.
    ///
    /// Fails with `ResourceBusy` while recording. A playback already running
    /// is preempted; its own completion is still posted under its own tag,
    /// and the new one starts only after it has exited.
    pub fn play(
        &self,
        source: impl Into<PlaybackSource>,
        tag: TaskTag,
    ) -> Result<PlaybackHandle, MediaError> {
        let source = source.into();
        let cancel = Arc::new(AtomicBool::new(false));
        let id = {
            let mut slot = self.slot();
            match &*slot {
                Slot::Recording { .. } => {
                    return Err(MediaError::ResourceBusy("recording in progress".into()))
                }
                Slot::Playing { id, cancel, .. } => {
                    tracing::debug!("Preempting playback {}", id);
                    cancel.store(true, Ordering::Relaxed);
                }
                Slot::Idle => {}
            }
            let id = self.next_id();
            *slot = Slot::Playing {
                id,
                cancel: cancel.clone(),
                stopping: false,
            };
            id
        };

        self.inner.players.fetch_add(1, Ordering::SeqCst);
        let service = self.clone();
        tokio::task::spawn_blocking(move || {
            // A preempted playback exits at its next cancel poll
            let result = if cancel.load(Ordering::Relaxed) {
                Ok(())
            } else {
                let _output = lock(&service.inner.output);
                if cancel.load(Ordering::Relaxed) {
                    Ok(())
                } else {
                    service.inner.player.play(&source, &cancel)
                }
            };
            service.release_playback(id);
            if let Err(ref e) = result {
                tracing::warn!("Playback {} failed: {}", id, e);
            }
            service.inner.events.blocking_post(EventKind::TaskDone {
                tag,
                result: result.map(|_| TaskOutput::Played).map_err(Into::into),
            });
        });

        Ok(PlaybackHandle { id })
    }

    fn release_playback(&self, id: u64) {
        {
            let mut slot = self.slot();
            if matches!(&*slot, Slot::Playing { id: active, .. } if *active == id) {
                *slot = Slot::Idle;
            }
        }
        self.inner.players.fetch_sub(1, Ordering::SeqCst);
        self.inner.player_exited.notify_waiters();
    }

    /// Ask whatever is playing to stop. No-op if nothing is.
    ///
    /// The slot stays taken until the player thread exits; a recording
    /// started meanwhile waits for it.
    pub fn stop_playback(&self) {
        let mut slot = self.slot();
        if let Slot::Playing {
            id,
            cancel,
            stopping,
        } = &mut *slot
        {
            tracing::debug!("Stopping playback {}", id);
            cancel.store(true, Ordering::Relaxed);
            *stopping = true;
        }
    }

    /// Stop `handle`'s playback if it is still the active one
    pub fn cancel(&self, handle: &PlaybackHandle) {
        let mut slot = self.slot();
        if let Slot::Playing {
            id,
            cancel,
            stopping,
        } = &mut *slot
        {
            if *id == handle.id {
                cancel.store(true, Ordering::Relaxed);
                *stopping = true;
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(&*self.slot(), Slot::Recording { .. })
    }

    /// Whether a playback holds the slot, including one that is stopping
    pub fn is_playing(&self) -> bool {
        matches!(&*self.slot(), Slot::Playing { .. })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
