//! Debouncing and press/hold decoding for raw input edges
//!
//! The decoder is a pure value: it is fed raw edges with their timestamps
//! and polled periodically, and returns the events to emit. Keeping time
//! explicit lets it be tested without hardware or sleeps.

use crate::config::InputConfig;
use crate::event::EventKind;
use std::time::{Duration, Instant};

/// A raw edge read from the input devices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInput {
    /// Encoder detent; the sign gives the direction
    Rotate(i32),
    /// Encoder push switch went down (true) or up (false)
    EncoderButton(bool),
    /// Record button went down (true) or up (false)
    RecordButton(bool),
}

/// Record button tracking between press and release
#[derive(Debug, Clone, Copy)]
struct RecordPress {
    since: Instant,
    hold_emitted: bool,
    /// Release seen too soon after the press to tell from bounce
    released_at: Option<Instant>,
}

/// Turns noisy edges into stable input events
#[derive(Debug)]
pub struct InputDecoder {
    encoder_debounce: Duration,
    button_debounce: Duration,
    hold_threshold: Duration,
    last_step: Option<Instant>,
    encoder_down: bool,
    last_encoder_edge: Option<Instant>,
    record: Option<RecordPress>,
    last_record_edge: Option<Instant>,
}

impl InputDecoder {
    pub fn new(encoder_debounce: Duration, button_debounce: Duration, hold_threshold: Duration) -> Self {
        Self {
            encoder_debounce,
            button_debounce,
            hold_threshold,
            last_step: None,
            encoder_down: false,
            last_encoder_edge: None,
            record: None,
            last_record_edge: None,
        }
    }

    pub fn from_config(config: &InputConfig) -> Self {
        Self::new(
            config.encoder_debounce(),
            config.button_debounce(),
            config.hold_threshold(),
        )
    }

    /// Feed one raw edge observed at `now`
    pub fn feed(&mut self, raw: RawInput, now: Instant) -> Vec<EventKind> {
        let mut out = Vec::new();
        match raw {
            RawInput::Rotate(0) => {}
            RawInput::Rotate(delta) => {
                if within(self.last_step, now, self.encoder_debounce) {
                    tracing::trace!("Encoder step dropped (bounce)");
                } else {
                    self.last_step = Some(now);
                    out.push(EventKind::EncoderRotate {
                        delta: delta.signum(),
                    });
                }
            }
            RawInput::EncoderButton(down) => {
                if down == self.encoder_down
                    || within(self.last_encoder_edge, now, self.button_debounce)
                {
                    return out;
                }
                self.encoder_down = down;
                self.last_encoder_edge = Some(now);
                if down {
                    out.push(EventKind::EncoderPress);
                }
            }
            RawInput::RecordButton(true) => {
                if let Some(press) = self.record.as_mut() {
                    if press.released_at.take().is_some() {
                        tracing::trace!("Record release dropped (bounce)");
                    }
                    return out;
                }
                if within(self.last_record_edge, now, self.button_debounce) {
                    return out;
                }
                self.last_record_edge = Some(now);
                self.record = Some(RecordPress {
                    since: now,
                    hold_emitted: false,
                    released_at: None,
                });
            }
            RawInput::RecordButton(false) => {
                let Some(press) = self.record.as_mut() else {
                    return out;
                };
                if press.released_at.is_some() {
                    return out;
                }
                // Could still be bounce; `poll` confirms it if no press follows
                if now.saturating_duration_since(press.since) < self.button_debounce {
                    press.released_at = Some(now);
                    return out;
                }
                out.extend(self.release(now));
            }
        }
        out
    }

    /// Emit time-driven events: the hold threshold crossing, or a pending
    /// release that stayed up for the debounce window
    pub fn poll(&mut self, now: Instant) -> Vec<EventKind> {
        let pending = self.record.and_then(|p| p.released_at);
        if let Some(at) = pending {
            if now.saturating_duration_since(at) >= self.button_debounce {
                return self.release(at);
            }
            return Vec::new();
        }

        match self.record.as_mut() {
            Some(press)
                if !press.hold_emitted
                    && now.saturating_duration_since(press.since) >= self.hold_threshold =>
            {
                press.hold_emitted = true;
                vec![EventKind::RecordHold]
            }
            _ => Vec::new(),
        }
    }

    /// End the current press as released at `at`
    fn release(&mut self, at: Instant) -> Vec<EventKind> {
        let mut out = Vec::new();
        let Some(press) = self.record.take() else {
            return out;
        };
        self.last_record_edge = Some(at);

        let held = press.hold_emitted
            || at.saturating_duration_since(press.since) >= self.hold_threshold;
        if held {
            if !press.hold_emitted {
                out.push(EventKind::RecordHold);
            }
            out.push(EventKind::RecordRelease);
        } else {
            tracing::debug!("Record button tapped, shorter than hold threshold");
        }
        out
    }

    /// Whether the record button is currently considered held down
    pub fn record_pressed(&self) -> bool {
        self.record.map_or(false, |p| p.released_at.is_none())
    }
}

fn within(last: Option<Instant>, now: Instant, window: Duration) -> bool {
    last.map(|t| now.saturating_duration_since(t) < window)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> InputDecoder {
        InputDecoder::new(
            Duration::from_millis(4),
            Duration::from_millis(30),
            Duration::from_millis(150),
        )
    }

    fn ms(base: Instant, n: u64) -> Instant {
        base + Duration::from_millis(n)
    }

    fn names(events: &[EventKind]) -> Vec<String> {
        events.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_encoder_steps_are_normalised() {
        let mut d = decoder();
        let t = Instant::now();
        assert_eq!(names(&d.feed(RawInput::Rotate(3), t)), ["EncoderRotate(+1)"]);
        assert_eq!(
            names(&d.feed(RawInput::Rotate(-2), ms(t, 10))),
            ["EncoderRotate(-1)"]
        );
        assert!(d.feed(RawInput::Rotate(0), ms(t, 20)).is_empty());
    }

    #[test]
    fn test_encoder_bounce_is_dropped() {
        let mut d = decoder();
        let t = Instant::now();
        assert_eq!(d.feed(RawInput::Rotate(1), t).len(), 1);
        assert!(d.feed(RawInput::Rotate(1), ms(t, 2)).is_empty());
        assert_eq!(d.feed(RawInput::Rotate(1), ms(t, 6)).len(), 1);
    }

    #[test]
    fn test_encoder_press_once_per_physical_press() {
        let mut d = decoder();
        let t = Instant::now();
        assert_eq!(names(&d.feed(RawInput::EncoderButton(true), t)), ["EncoderPress"]);
        // Chatter on the contact
        assert!(d.feed(RawInput::EncoderButton(false), ms(t, 5)).is_empty());
        assert!(d.feed(RawInput::EncoderButton(true), ms(t, 8)).is_empty());
        // Repeat reports of the same level
        assert!(d.feed(RawInput::EncoderButton(true), ms(t, 50)).is_empty());
        assert!(d.feed(RawInput::EncoderButton(false), ms(t, 100)).is_empty());
        assert_eq!(d.feed(RawInput::EncoderButton(true), ms(t, 200)).len(), 1);
    }

    #[test]
    fn test_hold_emitted_once_then_release() {
        let mut d = decoder();
        let t = Instant::now();
        assert!(d.feed(RawInput::RecordButton(true), t).is_empty());
        assert!(d.poll(ms(t, 100)).is_empty());
        assert_eq!(names(&d.poll(ms(t, 150))), ["RecordHold"]);
        // Polling ticks do not repeat the hold
        assert!(d.poll(ms(t, 160)).is_empty());
        assert!(d.poll(ms(t, 900)).is_empty());
        assert!(d.record_pressed());
        assert_eq!(
            names(&d.feed(RawInput::RecordButton(false), ms(t, 1000))),
            ["RecordRelease"]
        );
        assert!(!d.record_pressed());
    }

    #[test]
    fn test_short_tap_emits_nothing() {
        let mut d = decoder();
        let t = Instant::now();
        d.feed(RawInput::RecordButton(true), t);
        assert!(d.feed(RawInput::RecordButton(false), ms(t, 80)).is_empty());
        assert!(d.poll(ms(t, 500)).is_empty());
    }

    #[test]
    fn test_release_without_poll_still_emits_hold_first() {
        let mut d = decoder();
        let t = Instant::now();
        d.feed(RawInput::RecordButton(true), t);
        assert_eq!(
            names(&d.feed(RawInput::RecordButton(false), ms(t, 400))),
            ["RecordHold", "RecordRelease"]
        );
    }

    #[test]
    fn test_bounce_while_holding_is_ignored() {
        let mut d = decoder();
        let t = Instant::now();
        d.feed(RawInput::RecordButton(true), t);
        assert!(d.feed(RawInput::RecordButton(false), ms(t, 3)).is_empty());
        assert!(d.feed(RawInput::RecordButton(true), ms(t, 5)).is_empty());
        assert!(d.record_pressed());
        assert_eq!(d.poll(ms(t, 150)).len(), 1);
    }

    #[test]
    fn test_quick_tap_inside_debounce_is_released() {
        let mut d = decoder();
        let t = Instant::now();
        d.feed(RawInput::RecordButton(true), t);
        assert!(d.feed(RawInput::RecordButton(false), ms(t, 20)).is_empty());
        assert!(!d.record_pressed());

        // Not confirmed yet, and no hold for a button that is up
        assert!(d.poll(ms(t, 40)).is_empty());
        assert!(d.poll(ms(t, 200)).is_empty());
        assert!(d.poll(ms(t, 30_000)).is_empty());
        assert!(!d.record_pressed());

        // The next real press starts over
        d.feed(RawInput::RecordButton(true), ms(t, 31_000));
        assert_eq!(names(&d.poll(ms(t, 31_150))), ["RecordHold"]);
        assert_eq!(
            names(&d.feed(RawInput::RecordButton(false), ms(t, 31_400))),
            ["RecordRelease"]
        );
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut d = decoder();
        assert!(d.feed(RawInput::RecordButton(false), Instant::now()).is_empty());
    }
}
