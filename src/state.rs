//! State types for the mode coordinator
//!
//! The device is always in exactly one `(Mode, Activity)` pair:
//! Mode cycles DAILY → CHAT → DIARY → REMINDER → DAILY, and Activity is
//! either Idle or Busy with a single in-flight stage.

use crate::event::TaskTag;
use std::time::Instant;

/// Top-level operating behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Daily interview: the device asks, the user answers
    #[default]
    Daily,
    /// Free conversation answered in the persona voice
    Chat,
    /// Playback of stored records by date
    Diary,
    /// Countdown reminder
    Reminder,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Daily, Mode::Chat, Mode::Diary, Mode::Reminder];

    fn index(self) -> i32 {
        match self {
            Mode::Daily => 0,
            Mode::Chat => 1,
            Mode::Diary => 2,
            Mode::Reminder => 3,
        }
    }

    /// Advance cyclically by `delta` steps (negative steps go backwards)
    pub fn advance(self, delta: i32) -> Mode {
        let idx = (self.index() + delta).rem_euclid(Self::ALL.len() as i32);
        Self::ALL[idx as usize]
    }

    /// Title shown on the first display line
    pub fn title(self) -> &'static str {
        match self {
            Mode::Daily => "Daily Interview",
            Mode::Chat => "Chat",
            Mode::Diary => "Diary",
            Mode::Reminder => "Reminder",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Daily => write!(f, "DAILY"),
            Mode::Chat => write!(f, "CHAT"),
            Mode::Diary => write!(f, "DIARY"),
            Mode::Reminder => write!(f, "REMINDER"),
        }
    }
}

/// What the single busy task is currently waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyStage {
    Recording,
    Transcribing,
    Generating,
    Synthesizing,
    Playing,
}

impl std::fmt::Display for BusyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BusyStage::Recording => "recording",
            BusyStage::Transcribing => "transcribing",
            BusyStage::Generating => "generating",
            BusyStage::Synthesizing => "synthesizing",
            BusyStage::Playing => "playing",
        };
        write!(f, "{}", name)
    }
}

/// Idle, or busy with exactly one tagged stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    #[default]
    Idle,
    Busy {
        stage: BusyStage,
        tag: TaskTag,
        since: Instant,
    },
}

impl Activity {
    pub fn is_idle(&self) -> bool {
        matches!(self, Activity::Idle)
    }

    pub fn is_busy(&self) -> bool {
        !self.is_idle()
    }

    pub fn stage(&self) -> Option<BusyStage> {
        match self {
            Activity::Busy { stage, .. } => Some(*stage),
            Activity::Idle => None,
        }
    }

    /// Tag of the in-flight task, if any
    pub fn tag(&self) -> Option<TaskTag> {
        match self {
            Activity::Busy { tag, .. } => Some(*tag),
            Activity::Idle => None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.stage() == Some(BusyStage::Recording)
    }

    /// Time spent in the current stage
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        match self {
            Activity::Busy { since, .. } => Some(since.elapsed()),
            Activity::Idle => None,
        }
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activity::Idle => write!(f, "Idle"),
            Activity::Busy { stage, since, .. } => {
                write!(f, "Busy({}, {:.1}s)", stage, since.elapsed().as_secs_f32())
            }
        }
    }
}

/// Snapshot of the coordinator state, used by status output and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    pub mode: Mode,
    pub activity: Activity,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.mode, self.activity)
    }
}
