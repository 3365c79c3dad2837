//! The mode/event coordinator
//!
//! `Coordinator` is the only owner of the device state. It consumes the
//! shared event queue in arrival order and never waits on anything slow:
//! recording, remote calls and playback run as spawned tasks whose sole way
//! back is a `TaskDone` event carrying the tag they were started with.
//!
//! Every busy stage gets a fresh tag and its own watchdog. When a watchdog
//! fires first the coordinator reports a timeout and returns to idle; the
//! task's late completion no longer matches the current tag and is dropped.

pub mod rag;
pub mod timers;

pub use timers::Timings;

use crate::ai::{AiService, VoiceId};
use crate::assets::{Asset, AssetLibrary};
use crate::config::Config;
use crate::display::Display;
use crate::error::{MediaError, TaskError};
use crate::event::{Event, EventKind, EventReceiver, EventSender, TaskOutput, TaskTag, TimerTag};
use crate::media::{AudioClip, MediaService, PlaybackHandle, PlaybackSource, RecordingSession};
use crate::state::{Activity, BusyStage, DeviceState, Mode};
use crate::store::{MemoryKind, MemoryRecord, MemoryStore, NewMemory};
use chrono::{Local, NaiveDate};
use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use timers::Reminder;
use tokio::task::AbortHandle;

/// Records handed to question generation
const QUESTION_HISTORY: usize = 5;

/// Collaborators the coordinator drives
pub struct Services {
    pub media: MediaService,
    pub ai: AiService,
    pub store: MemoryStore,
    pub assets: AssetLibrary,
    pub display: Box<dyn Display>,
}

/// Coordinator tunables
#[derive(Debug, Clone)]
pub struct Settings {
    pub timings: Timings,
    /// Upper bound on records retrieved for a chat reply
    pub rag_context: usize,
    /// Where finished recordings are kept; `None` discards them
    pub recordings_dir: Option<PathBuf>,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timings: Timings::from_config(config),
            rag_context: config.coordinator.rag_context,
            recordings_dir: config
                .storage
                .keep_recordings
                .then(|| config.storage.recordings_dir()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What a recording is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    Interview,
    Chat,
}

impl Purpose {
    fn kind(self) -> MemoryKind {
        match self {
            Purpose::Interview => MemoryKind::Interview,
            Purpose::Chat => MemoryKind::Chat,
        }
    }
}

/// What the current busy stage is waiting for, and where its result goes
#[derive(Debug)]
enum Step {
    /// Generating the DAILY question
    Question,
    /// Microphone open, waiting for the release
    Record(Purpose),
    /// Closing the capture device
    Capture(Purpose),
    Transcribe {
        purpose: Purpose,
        audio_ref: Option<PathBuf>,
    },
    /// Generating a CHAT reply
    Reply,
    /// Speech synthesis; on failure play `fallback` if there is one
    Synthesize { fallback: Option<Asset> },
    /// Playback that ends the flow
    Play { notice: Option<String> },
    /// Speaking a diary transcript
    DiarySynthesize,
    /// One diary record playing; more may be queued
    DiaryPlay,
}

impl Step {
    fn stage(&self) -> BusyStage {
        match self {
            Step::Record(_) => BusyStage::Recording,
            Step::Capture(_) | Step::Transcribe { .. } => BusyStage::Transcribing,
            Step::Question | Step::Reply => BusyStage::Generating,
            Step::Synthesize { .. } | Step::DiarySynthesize => BusyStage::Synthesizing,
            Step::Play { .. } | Step::DiaryPlay => BusyStage::Playing,
        }
    }

    fn deadline(&self, timings: &Timings) -> Duration {
        match self.stage() {
            BusyStage::Recording => timings.recording_deadline,
            BusyStage::Playing => timings.playback_deadline,
            _ => timings.remote_deadline,
        }
    }
}

struct Busy {
    step: Step,
    deadline: Duration,
    watchdog: AbortHandle,
}

pub struct Coordinator {
    mode: Mode,
    activity: Activity,
    busy: Option<Busy>,

    media: MediaService,
    ai: AiService,
    store: MemoryStore,
    assets: AssetLibrary,
    display: Box<dyn Display>,
    events: EventSender,

    timings: Timings,
    rag_context: usize,
    recordings_dir: Option<PathBuf>,

    next_tag: u64,
    session: Option<RecordingSession>,
    ambient: Option<PlaybackHandle>,
    question: Option<String>,
    reminder: Option<Reminder>,
    reminder_generation: u64,
    diary_date: NaiveDate,
    diary_queue: VecDeque<MemoryRecord>,
    diary_total: usize,
}

impl Coordinator {
    /// `events` must feed the receiver later passed to [`Coordinator::run`]
    pub fn new(services: Services, settings: Settings, events: EventSender) -> Self {
        Self {
            mode: Mode::default(),
            activity: Activity::Idle,
            busy: None,
            media: services.media,
            ai: services.ai,
            store: services.store,
            assets: services.assets,
            display: services.display,
            events,
            timings: settings.timings,
            rag_context: settings.rag_context,
            recordings_dir: settings.recordings_dir,
            next_tag: 0,
            session: None,
            ambient: None,
            question: None,
            reminder: None,
            reminder_generation: 0,
            diary_date: Local::now().date_naive(),
            diary_queue: VecDeque::new(),
            diary_total: 0,
        }
    }

    pub fn state(&self) -> DeviceState {
        DeviceState {
            mode: self.mode,
            activity: self.activity,
        }
    }

    /// Whether a reminder countdown is pending
    pub fn reminder_pending(&self) -> bool {
        self.reminder.is_some()
    }

    /// Date DIARY mode is showing
    pub fn diary_date(&self) -> NaiveDate {
        self.diary_date
    }

    /// Question the next DAILY answer is filed under
    pub fn question(&self) -> Option<&str> {
        self.question.as_deref()
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Enter the initial mode
    pub fn start(&mut self) {
        tracing::info!("Starting in {} mode", self.mode);
        self.enter_mode(self.mode);
    }

    /// Consume events until every sender is gone
    pub async fn run(&mut self, events: &mut EventReceiver) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
    }

    /// Process one event. Never waits on devices or the network.
    pub fn handle(&mut self, event: Event) {
        tracing::debug!("{} in {}", event.kind, self.state());
        match event.kind {
            EventKind::EncoderRotate { delta } => self.on_rotate(delta),
            EventKind::EncoderPress => self.on_press(),
            EventKind::RecordHold => self.on_hold(),
            EventKind::RecordRelease => self.on_release(),
            EventKind::TimerFired(tag) => self.on_timer(tag),
            EventKind::TaskDone { tag, result } => self.on_task_done(tag, result),
        }
    }

    /// Release the devices and blank the display
    pub async fn shutdown(&mut self) {
        self.reminder = None;
        if let Some(busy) = self.busy.take() {
            busy.watchdog.abort();
        }
        if let Some(session) = self.session.take() {
            if let Err(e) = self.media.stop_recording(&session).await {
                tracing::warn!("Failed to stop recording: {}", e);
            }
        }
        self.media.stop_playback();
        self.set_activity(Activity::Idle);
        self.display.clear();
    }

    // --- input ---

    fn on_rotate(&mut self, delta: i32) {
        if delta == 0 {
            return;
        }
        if self.activity.is_busy() {
            tracing::debug!("Ignoring rotation while {}", self.activity);
            return;
        }

        if self.mode == Mode::Diary {
            let date = self.diary_date + chrono::Duration::days(delta as i64);
            if date <= today() {
                self.diary_date = date;
                self.render_idle(None);
                return;
            }
            // Past today the dial moves on to the next mode
        }
        self.enter_mode(self.mode.advance(delta));
    }

    fn on_press(&mut self) {
        if self.activity.is_busy() {
            tracing::debug!("Ignoring press while {}", self.activity);
            return;
        }
        match self.mode {
            Mode::Daily => self.ask_question(),
            Mode::Chat => self.render_idle(None),
            Mode::Diary => self.play_diary(),
            Mode::Reminder => {
                if self.reminder.take().is_some() {
                    tracing::info!("Reminder cancelled");
                    self.render_idle(Some("Cancelled".into()));
                }
            }
        }
    }

    fn on_hold(&mut self) {
        if self.activity.is_busy() {
            tracing::debug!("Ignoring hold while {}", self.activity);
            return;
        }
        let purpose = match self.mode {
            Mode::Daily => Purpose::Interview,
            Mode::Chat => Purpose::Chat,
            Mode::Reminder => {
                self.start_reminder();
                return;
            }
            Mode::Diary => return,
        };

        // Idle playback is ambient only
        self.stop_ambient();
        self.media.stop_playback();

        // An open failure comes back under the recording's own tag
        let tag = self.next_tag();
        match self.media.start_recording(tag) {
            Ok(session) => {
                tracing::info!("Recording {} (session {})", purpose.kind(), session.id());
                self.session = Some(session);
                self.enter_busy(tag, Step::Record(purpose));
                self.show_status("Recording...");
            }
            Err(e) => {
                tracing::warn!("Failed to start recording: {}", e);
                self.render_idle(Some(TaskError::from(e).status_line()));
            }
        }
    }

    fn on_release(&mut self) {
        let purpose = match self.busy.as_ref().map(|b| &b.step) {
            Some(Step::Record(purpose)) => *purpose,
            _ => {
                tracing::debug!("Ignoring release while {}", self.activity);
                return;
            }
        };
        let Some(session) = self.session.take() else {
            self.fail(MediaError::InvalidState("no active session".into()).into());
            return;
        };

        let media = self.media.clone();
        let tag = self.spawn(async move {
            media
                .stop_recording(&session)
                .await
                .map(TaskOutput::Audio)
                .map_err(TaskError::from)
        });
        self.enter_busy(tag, Step::Capture(purpose));
        self.show_status("Processing...");
    }

    // --- timers ---

    fn on_timer(&mut self, tag: TimerTag) {
        match tag {
            TimerTag::Watchdog(task) => self.on_watchdog(task),
            TimerTag::Reminder { generation } => self.on_reminder_due(generation),
            TimerTag::CountdownTick { generation } => self.on_countdown_tick(generation),
        }
    }

    fn on_watchdog(&mut self, tag: TaskTag) {
        if self.activity.tag() != Some(tag) {
            tracing::debug!("Ignoring stale watchdog {}", tag);
            return;
        }
        let deadline = self.busy.as_ref().map(|b| b.deadline).unwrap_or_default();
        tracing::warn!("{} exceeded {:?}", self.activity, deadline);

        if let Some(session) = self.session.take() {
            let media = self.media.clone();
            tokio::spawn(async move {
                if let Err(e) = media.stop_recording(&session).await {
                    tracing::warn!("Failed to stop timed out recording: {}", e);
                }
            });
        }
        if self.activity.stage() == Some(BusyStage::Playing) {
            self.media.stop_playback();
        }
        self.fail(TaskError::Timeout(deadline.as_secs()));
    }

    fn start_reminder(&mut self) {
        self.reminder_generation += 1;
        if self.reminder.is_some() {
            tracing::info!("Restarting reminder");
        }
        // Replacing the old reminder cancels its timers
        self.reminder = Some(Reminder::start(
            &self.events,
            self.reminder_generation,
            &self.timings,
        ));
        tracing::info!("Reminder set for {:?}", self.timings.reminder_delay);
        self.render_idle(None);
    }

    fn on_reminder_due(&mut self, generation: u64) {
        let Some(reminder) = self.reminder.as_mut().filter(|r| r.generation == generation) else {
            tracing::debug!("Ignoring stale reminder {}", generation);
            return;
        };

        // Never interrupt a recording, in any mode
        if self.media.is_recording() || self.activity.is_busy() {
            reminder.defer(&self.events, self.timings.reminder_retry);
            tracing::info!(
                "Reminder deferred ({} times) while {}",
                reminder.deferrals,
                self.activity
            );
            return;
        }

        self.reminder = None;
        tracing::info!("Reminder due");
        let Some(alert) = self.assets.get(Asset::ReminderAlert) else {
            self.render_idle(Some("Time's up!".into()));
            return;
        };
        self.play(
            alert,
            Step::Play {
                notice: Some("Time's up!".into()),
            },
        );
        if self.activity.is_busy() {
            self.display
                .show(&[Mode::Reminder.title().to_string(), "Time's up!".to_string()]);
        }
    }

    fn on_countdown_tick(&mut self, generation: u64) {
        let Some(reminder) = self.reminder.as_mut().filter(|r| r.generation == generation) else {
            return;
        };
        reminder.tick(&self.events, self.timings.countdown_tick);
        if self.mode == Mode::Reminder && self.activity.is_idle() {
            self.render_idle(None);
        }
    }

    // --- task completions ---

    fn on_task_done(&mut self, tag: TaskTag, result: Result<TaskOutput, TaskError>) {
        let Some(step) = self.complete(tag) else {
            tracing::debug!("Ignoring stale completion {}", tag);
            return;
        };

        match (step, result) {
            (Step::Question, Ok(TaskOutput::Text(question))) => self.speak_question(question),
            (Step::Capture(purpose), Ok(TaskOutput::Audio(clip))) => self.captured(purpose, clip),
            (Step::Transcribe { purpose, audio_ref }, result) => {
                self.transcribed(purpose, audio_ref, result)
            }
            (Step::Reply, Ok(TaskOutput::Text(reply))) => self.speak_reply(reply),
            (Step::Synthesize { .. }, Ok(TaskOutput::Audio(clip))) => {
                self.play(clip, Step::Play { notice: None })
            }
            (Step::Synthesize { fallback }, Err(e)) => {
                tracing::warn!("Synthesis failed: {}", e);
                self.stop_ambient();
                match fallback.and_then(|asset| self.assets.get(asset)) {
                    Some(clip) => self.play(clip, Step::Play { notice: None }),
                    None => self.go_idle(None),
                }
            }
            (Step::Play { notice }, Ok(_)) => self.go_idle(notice),
            (Step::DiarySynthesize, Ok(TaskOutput::Audio(clip))) => {
                self.play(clip, Step::DiaryPlay)
            }
            (Step::DiarySynthesize, Err(e)) => {
                tracing::warn!("Skipping diary record: {}", e);
                self.play_next_diary();
            }
            (Step::DiaryPlay, Ok(_)) => self.play_next_diary(),
            (Step::Record(_), Err(e)) => {
                tracing::warn!("Microphone failed: {}", e);
                self.session = None;
                self.fail(e);
            }
            (step, Err(e)) => {
                tracing::warn!("{:?} failed: {}", step, e);
                self.fail(e);
            }
            (step, Ok(_)) => {
                self.fail(MediaError::InvalidState(format!("unexpected result for {:?}", step)).into())
            }
        }
    }

    /// Take the current step if `tag` is the in-flight task
    fn complete(&mut self, tag: TaskTag) -> Option<Step> {
        if self.activity.tag() != Some(tag) {
            return None;
        }
        let busy = self.busy.take()?;
        busy.watchdog.abort();
        Some(busy.step)
    }

    // --- DAILY / CHAT ---

    fn ask_question(&mut self) {
        self.question = None;
        let history = self.store.latest_n(QUESTION_HISTORY).unwrap_or_else(|e| {
            tracing::warn!("Failed to load history: {}", e);
            Vec::new()
        });

        self.start_ambient();
        let ai = self.ai.clone();
        let tag = self.spawn(async move { Ok(TaskOutput::Text(ai.generate_question(history).await)) });
        self.enter_busy(tag, Step::Question);
        self.show_status("Thinking...");
    }

    fn speak_question(&mut self, question: String) {
        tracing::info!("Question: {}", question);
        self.question = Some(question.clone());
        self.display
            .show(&[self.mode.title().to_string(), question.clone()]);
        self.synthesize(question, VoiceId::System, None);
    }

    fn captured(&mut self, purpose: Purpose, clip: AudioClip) {
        if clip.is_empty() {
            tracing::info!("Recording was empty");
            self.transcribed(purpose, None, Ok(TaskOutput::Text(String::new())));
            return;
        }

        let audio_ref = self.keep_recording(purpose, &clip);
        let ai = self.ai.clone();
        let tag = self.spawn(async move {
            ai.transcribe(clip)
                .await
                .map(TaskOutput::Text)
                .map_err(TaskError::from)
        });
        self.enter_busy(tag, Step::Transcribe { purpose, audio_ref });
        self.show_status("Transcribing...");
    }

    /// File the utterance, then continue the mode's flow
    fn transcribed(
        &mut self,
        purpose: Purpose,
        audio_ref: Option<PathBuf>,
        result: Result<TaskOutput, TaskError>,
    ) {
        let (transcript, failure) = match result {
            Ok(TaskOutput::Text(text)) => (text, None),
            Ok(_) => (
                String::new(),
                Some(MediaError::InvalidState("unexpected transcription result".into()).into()),
            ),
            Err(e) => {
                tracing::warn!("Transcription failed: {}", e);
                (String::new(), Some(e))
            }
        };
        tracing::info!("Transcript: {:?}", transcript);

        match purpose {
            Purpose::Interview => {
                let record =
                    NewMemory::interview(self.question.clone(), transcript).with_audio(audio_ref);
                if let Err(e) = self.store.append(&record) {
                    self.fail(e.into());
                    return;
                }
                if let Some(e) = failure {
                    self.fail(e);
                    return;
                }
                match self.assets.get(Asset::ConfirmationChime) {
                    Some(chime) => self.play(
                        chime,
                        Step::Play {
                            notice: Some("Saved".into()),
                        },
                    ),
                    None => self.go_idle(Some("Saved".into())),
                }
            }
            Purpose::Chat => {
                // Retrieve before saving so the utterance does not match itself
                let context = if failure.is_none() && !transcript.is_empty() {
                    rag::retrieve(&self.store, &transcript, self.rag_context).unwrap_or_else(|e| {
                        tracing::warn!("Failed to retrieve context: {}", e);
                        Vec::new()
                    })
                } else {
                    Vec::new()
                };
                let record = NewMemory::chat(transcript.clone()).with_audio(audio_ref);
                if let Err(e) = self.store.append(&record) {
                    self.fail(e.into());
                    return;
                }
                if let Some(e) = failure {
                    self.fail(e);
                    return;
                }
                if transcript.is_empty() {
                    self.go_idle(Some("No speech".into()));
                    return;
                }
                self.generate_reply(transcript, context);
            }
        }
    }

    fn generate_reply(&mut self, transcript: String, context: Vec<MemoryRecord>) {
        tracing::debug!("Replying with {} records of context", context.len());
        self.start_ambient();
        let ai = self.ai.clone();
        let tag = self.spawn(async move {
            Ok(TaskOutput::Text(ai.generate_reply(transcript, context).await))
        });
        self.enter_busy(tag, Step::Reply);
        self.show_status("Thinking...");
    }

    fn speak_reply(&mut self, reply: String) {
        tracing::info!("Reply: {}", reply);
        self.display.show(&[self.mode.title().to_string(), reply.clone()]);
        self.synthesize(reply, VoiceId::Persona, Some(Asset::GenericReply));
    }

    fn synthesize(&mut self, text: String, voice: VoiceId, fallback: Option<Asset>) {
        let ai = self.ai.clone();
        let tag = self.spawn(async move {
            ai.synthesize(text, voice)
                .await
                .map(TaskOutput::Audio)
                .map_err(TaskError::from)
        });
        self.enter_busy(tag, Step::Synthesize { fallback });
    }

    /// Save a finished recording under the recordings directory, if enabled
    fn keep_recording(&self, purpose: Purpose, clip: &AudioClip) -> Option<PathBuf> {
        let dir = self.recordings_dir.as_ref()?;
        let now = Local::now();
        let path = dir
            .join(now.format("%Y-%m-%d").to_string())
            .join(format!("{}-{}.wav", now.format("%H%M%S%3f"), purpose.kind()));
        match clip.write_to(&path) {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!("Failed to keep recording: {}", e);
                None
            }
        }
    }

    // --- DIARY ---

    fn play_diary(&mut self) {
        match self.store.query(self.diary_date) {
            Ok(records) if records.is_empty() => self.render_idle(None),
            Ok(records) => {
                tracing::info!("Playing {} records from {}", records.len(), self.diary_date);
                self.diary_total = records.len();
                self.diary_queue = records.into();
                self.play_next_diary();
            }
            Err(e) => self.render_idle(Some(TaskError::from(e).status_line())),
        }
    }

    /// Start the next playable record, or go idle when none is left
    fn play_next_diary(&mut self) {
        while let Some(record) = self.diary_queue.pop_front() {
            let position = self.diary_total - self.diary_queue.len();
            let lines = [
                self.mode.title().to_string(),
                self.diary_date.to_string(),
                format!("Playing {}/{}", position, self.diary_total),
            ];

            if let Some(path) = record.audio_ref.filter(|p| p.exists()) {
                self.play(path, Step::DiaryPlay);
                if self.activity.is_busy() {
                    self.display.show(&lines);
                }
                return;
            }
            if !record.transcript.is_empty() {
                let ai = self.ai.clone();
                let transcript = record.transcript;
                let tag = self.spawn(async move {
                    ai.synthesize(transcript, VoiceId::Persona)
                        .await
                        .map(TaskOutput::Audio)
                        .map_err(TaskError::from)
                });
                self.enter_busy(tag, Step::DiarySynthesize);
                self.display.show(&lines);
                return;
            }
            tracing::debug!("Skipping empty record {}", record.id);
        }
        self.go_idle(None);
    }

    // --- plumbing ---

    fn enter_mode(&mut self, mode: Mode) {
        if mode != self.mode {
            tracing::info!("Mode {} -> {}", self.mode, mode);
        }
        self.mode = mode;
        match mode {
            Mode::Daily => self.ask_question(),
            Mode::Diary => {
                self.diary_date = today();
                self.render_idle(None);
            }
            Mode::Chat | Mode::Reminder => self.render_idle(None),
        }
    }

    fn next_tag(&mut self) -> TaskTag {
        self.next_tag += 1;
        TaskTag(self.next_tag)
    }

    /// Run `work` in the background; its result comes back as `TaskDone`
    fn spawn<F>(&mut self, work: F) -> TaskTag
    where
        F: Future<Output = Result<TaskOutput, TaskError>> + Send + 'static,
    {
        let tag = self.next_tag();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = work.await;
            if !events.post(EventKind::TaskDone { tag, result }).await {
                tracing::debug!("Queue closed, dropping result of {}", tag);
            }
        });
        tag
    }

    /// Start playback as the busy stage `step`; fails the flow if refused
    fn play(&mut self, source: impl Into<PlaybackSource>, step: Step) {
        self.stop_ambient();
        let tag = self.next_tag();
        match self.media.play(source, tag) {
            Ok(_) => self.enter_busy(tag, step),
            Err(e) => self.fail(e.into()),
        }
    }

    fn start_ambient(&mut self) {
        self.stop_ambient();
        let Some(filler) = self.assets.get(Asset::ThinkingFiller) else {
            return;
        };
        // Own tag, never the busy one, so its completion is always stale
        let tag = self.next_tag();
        match self.media.play(filler, tag) {
            Ok(handle) => self.ambient = Some(handle),
            Err(e) => tracing::debug!("No thinking filler: {}", e),
        }
    }

    fn stop_ambient(&mut self) {
        if let Some(handle) = self.ambient.take() {
            self.media.cancel(&handle);
        }
    }

    fn enter_busy(&mut self, tag: TaskTag, step: Step) {
        if let Some(previous) = self.busy.take() {
            previous.watchdog.abort();
        }
        let stage = step.stage();
        let deadline = step.deadline(&self.timings);
        let watchdog = timers::schedule(&self.events, TimerTag::Watchdog(tag), deadline);
        self.busy = Some(Busy {
            step,
            deadline,
            watchdog,
        });
        self.set_activity(Activity::Busy {
            stage,
            tag,
            since: Instant::now(),
        });
    }

    fn go_idle(&mut self, notice: Option<String>) {
        if let Some(busy) = self.busy.take() {
            busy.watchdog.abort();
        }
        self.stop_ambient();
        self.set_activity(Activity::Idle);
        self.render_idle(notice);
    }

    /// Report `error` on the display and return to idle
    fn fail(&mut self, error: TaskError) {
        tracing::warn!("{} flow failed: {}", self.mode, error);
        self.diary_queue.clear();
        self.go_idle(Some(error.status_line()));
    }

    fn set_activity(&mut self, activity: Activity) {
        if self.activity != activity {
            tracing::debug!("{} -> {} / {}", self.state(), self.mode, activity);
        }
        self.activity = activity;
    }

    fn show_status(&mut self, status: &str) {
        self.display
            .show(&[self.mode.title().to_string(), status.to_string()]);
    }

    fn render_idle(&mut self, notice: Option<String>) {
        let mut lines = self.idle_lines();
        lines.extend(notice);
        self.display.show(&lines);
    }

    fn idle_lines(&self) -> Vec<String> {
        let title = self.mode.title().to_string();
        match self.mode {
            Mode::Daily => vec![
                title,
                self.question
                    .clone()
                    .unwrap_or_else(|| "Press for a question".into()),
                "Hold to answer".into(),
            ],
            Mode::Chat => vec![title, "Hold to talk".into()],
            Mode::Diary => {
                let count = match self.store.count_on(self.diary_date) {
                    Ok(0) => "No record".to_string(),
                    Ok(1) => "1 record".to_string(),
                    Ok(n) => format!("{} records", n),
                    Err(e) => {
                        tracing::warn!("Failed to count records: {}", e);
                        "Unavailable".to_string()
                    }
                };
                vec![title, self.diary_date.to_string(), count]
            }
            Mode::Reminder => match &self.reminder {
                Some(reminder) => vec![
                    title,
                    format!("Remaining {}", timers::format_countdown(reminder.remaining())),
                    "Press to cancel".into(),
                ],
                None => vec![
                    title,
                    format!(
                        "Hold to start {}",
                        timers::format_countdown(self.timings.reminder_delay)
                    ),
                ],
            },
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_stages_and_deadlines() {
        let timings = Timings {
            recording_deadline: Duration::from_secs(60),
            remote_deadline: Duration::from_secs(20),
            playback_deadline: Duration::from_secs(120),
            ..Timings::default()
        };
        let cases = [
            (Step::Record(Purpose::Chat), BusyStage::Recording, 60),
            (Step::Capture(Purpose::Chat), BusyStage::Transcribing, 20),
            (Step::Question, BusyStage::Generating, 20),
            (Step::Synthesize { fallback: None }, BusyStage::Synthesizing, 20),
            (Step::DiaryPlay, BusyStage::Playing, 120),
        ];
        for (step, stage, secs) in cases {
            assert_eq!(step.stage(), stage);
            assert_eq!(step.deadline(&timings), Duration::from_secs(secs));
        }
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.storage.keep_recordings = false;
        config.coordinator.rag_context = 7;
        let settings = Settings::from_config(&config);
        assert!(settings.recordings_dir.is_none());
        assert_eq!(settings.rag_context, 7);

        config.storage.keep_recordings = true;
        assert_eq!(
            Settings::from_config(&config).recordings_dir,
            Some(config.storage.recordings_dir())
        );
    }
}
