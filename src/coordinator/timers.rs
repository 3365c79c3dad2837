//! Timers feeding the coordinator queue
//!
//! Every timer is a spawned sleep that posts `TimerFired` when it expires.
//! Cancelling aborts the task; an expiry that was already queued is
//! recognised as stale by its tag.

use crate::config::Config;
use crate::event::{EventKind, EventSender, TimerTag};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Durations the coordinator schedules against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Countdown started by a reminder trigger
    pub reminder_delay: Duration,
    /// Retry interval while the alert has to wait
    pub reminder_retry: Duration,
    /// Refresh interval of the countdown display
    pub countdown_tick: Duration,
    /// Longest allowed recording
    pub recording_deadline: Duration,
    /// Watchdog for transcription, generation and synthesis
    pub remote_deadline: Duration,
    /// Watchdog for playback
    pub playback_deadline: Duration,
}

impl Timings {
    pub fn from_config(config: &Config) -> Self {
        let c = &config.coordinator;
        Self {
            reminder_delay: Duration::from_secs(c.reminder_delay_secs),
            reminder_retry: Duration::from_secs(c.reminder_retry_secs),
            countdown_tick: Duration::from_secs(1),
            recording_deadline: Duration::from_secs(config.audio.max_duration_secs as u64),
            remote_deadline: Duration::from_secs(c.remote_deadline_secs),
            playback_deadline: Duration::from_secs(c.playback_deadline_secs),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Post `TimerFired(tag)` after `after`
pub fn schedule(events: &EventSender, tag: TimerTag, after: Duration) -> AbortHandle {
    let events = events.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        events.post(EventKind::TimerFired(tag)).await;
    })
    .abort_handle()
}

/// The single pending reminder
#[derive(Debug)]
pub struct Reminder {
    pub generation: u64,
    pub deadline: Instant,
    pub deferrals: u32,
    timer: AbortHandle,
    tick: Option<AbortHandle>,
}

impl Reminder {
    pub fn start(events: &EventSender, generation: u64, timings: &Timings) -> Self {
        Self {
            generation,
            deadline: Instant::now() + timings.reminder_delay,
            deferrals: 0,
            timer: schedule(
                events,
                TimerTag::Reminder { generation },
                timings.reminder_delay,
            ),
            tick: Some(schedule(
                events,
                TimerTag::CountdownTick { generation },
                timings.countdown_tick,
            )),
        }
    }

    /// Push the alert back by `retry`
    pub fn defer(&mut self, events: &EventSender, retry: Duration) {
        self.deferrals += 1;
        self.timer = schedule(
            events,
            TimerTag::Reminder {
                generation: self.generation,
            },
            retry,
        );
    }

    /// Schedule the next countdown refresh, unless the deadline has passed
    pub fn tick(&mut self, events: &EventSender, every: Duration) {
        self.tick = if self.remaining() > Duration::ZERO {
            Some(schedule(
                events,
                TimerTag::CountdownTick {
                    generation: self.generation,
                },
                every,
            ))
        } else {
            None
        };
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn cancel(&self) {
        self.timer.abort();
        if let Some(tick) = &self.tick {
            tick.abort();
        }
    }
}

impl Drop for Reminder {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// `M:SS`, rounding partial seconds up
pub fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.as_millis().div_ceil(1000) as u64;
    format!("{}:{:02}", secs / 60, secs % 60)
}
