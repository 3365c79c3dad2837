//! Events flowing through the single coordinator queue
//!
//! Input edges, timer expiries and background task completions all arrive
//! on one mpsc channel and are consumed strictly in arrival order.

use crate::error::TaskError;
use crate::media::AudioClip;
use std::fmt;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Queue depth between producers and the coordinator
pub const EVENT_QUEUE_SIZE: usize = 64;

/// Identifies one in-flight background operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskTag(pub u64);

impl fmt::Display for TaskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies which scheduled timer expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTag {
    /// Reminder deadline (or its deferred retry)
    Reminder { generation: u64 },
    /// One-second countdown refresh while a reminder is pending
    CountdownTick { generation: u64 },
    /// Deadline paired with a busy stage
    Watchdog(TaskTag),
}

/// Successful result of a background operation
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// Transcript, question or reply text
    Text(String),
    /// Synthesized speech
    Audio(AudioClip),
    /// Playback ran to completion (or was stopped)
    Played,
}

/// What happened
#[derive(Debug)]
pub enum EventKind {
    EncoderRotate { delta: i32 },
    EncoderPress,
    RecordHold,
    RecordRelease,
    TimerFired(TimerTag),
    TaskDone {
        tag: TaskTag,
        result: Result<TaskOutput, TaskError>,
    },
}

/// An immutable event, timestamped when it was created
#[derive(Debug)]
pub struct Event {
    pub kind: EventKind,
    pub at: Instant,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            at: Instant::now(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::EncoderRotate { delta } => write!(f, "EncoderRotate({:+})", delta),
            EventKind::EncoderPress => write!(f, "EncoderPress"),
            EventKind::RecordHold => write!(f, "RecordHold"),
            EventKind::RecordRelease => write!(f, "RecordRelease"),
            EventKind::TimerFired(tag) => write!(f, "TimerFired({:?})", tag),
            EventKind::TaskDone { tag, result } => match result {
                Ok(_) => write!(f, "TaskDone({}, ok)", tag),
                Err(e) => write!(f, "TaskDone({}, err: {})", tag, e),
            },
        }
    }
}

/// Producer side of the event queue, cloned into every event source
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Post an event from async context. Returns false once the coordinator is gone.
    pub async fn post(&self, kind: EventKind) -> bool {
        self.tx.send(Event::new(kind)).await.is_ok()
    }

    /// Post an event from a blocking thread (capture, playback, input polling)
    pub fn blocking_post(&self, kind: EventKind) -> bool {
        self.tx.blocking_send(Event::new(kind)).is_ok()
    }

    /// Whether the consumer has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the coordinator loop
pub type EventReceiver = mpsc::Receiver<Event>;

/// Create the shared event queue
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    (EventSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (tx, mut rx) = channel();
        assert!(tx.post(EventKind::RecordHold).await);
        assert!(tx.post(EventKind::RecordRelease).await);
        assert!(tx.post(EventKind::EncoderRotate { delta: -1 }).await);

        assert!(matches!(rx.recv().await.unwrap().kind, EventKind::RecordHold));
        assert!(matches!(rx.recv().await.unwrap().kind, EventKind::RecordRelease));
        assert!(matches!(
            rx.recv().await.unwrap().kind,
            EventKind::EncoderRotate { delta: -1 }
        ));
    }

    #[tokio::test]
    async fn test_post_after_consumer_dropped() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.post(EventKind::EncoderPress).await);
    }

    #[test]
    fn test_event_display() {
        let kind = EventKind::TaskDone {
            tag: TaskTag(7),
            result: Err(TaskError::Timeout(60)),
        };
        assert_eq!(kind.to_string(), "TaskDone(#7, err: Timed out after 60 seconds)");
        assert_eq!(
            EventKind::EncoderRotate { delta: 1 }.to_string(),
            "EncoderRotate(+1)"
        );
    }
}
