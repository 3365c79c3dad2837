//! Coordinator behaviour against fake media and AI services

mod common;

use common::{Harness, Options, QUESTION};
use echomemo::ai::FALLBACK_QUESTION;
use echomemo::assets::Asset;
use echomemo::error::MediaError;
use echomemo::event::{EventKind, TaskOutput, TaskTag};
use echomemo::media::AudioClip;
use echomemo::state::{BusyStage, Mode};
use echomemo::store::{MemoryKind, NewMemory};
use std::sync::atomic::Ordering;
use std::time::Duration;

const LIMIT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn daily_entry_asks_and_speaks_a_question() {
    let mut h = Harness::new();
    h.coordinator.start();

    let state = h.coordinator.state();
    assert_eq!(state.mode, Mode::Daily);
    assert_eq!(state.activity.stage(), Some(BusyStage::Generating));

    h.settle().await;
    assert_eq!(h.coordinator.question(), Some(QUESTION));
    assert_eq!(
        h.backend.synthesized(),
        vec![(QUESTION.to_string(), "sys".to_string())]
    );
    assert!(h.display.current().iter().any(|l| l == "Hold to answer"));
}

#[tokio::test]
async fn question_failures_fall_back_and_reach_idle() {
    let mut h = Harness::with(Options::default());
    h.backend.fail_questions.store(true, Ordering::SeqCst);
    h.coordinator.start();
    h.settle().await;

    assert_eq!(h.coordinator.question(), Some(FALLBACK_QUESTION));
    assert_eq!(h.backend.question_calls.load(Ordering::SeqCst), 2);
    assert!(h.display.ever_showed(FALLBACK_QUESTION));
}

#[tokio::test]
async fn zero_length_recording_stores_empty_interview() {
    let mut h = Harness::started(Options {
        samples: 0,
        ..Options::default()
    })
    .await;

    h.send(EventKind::RecordHold).await;
    assert!(h.coordinator.state().activity.is_recording());
    h.send(EventKind::RecordRelease).await;
    h.settle().await;

    let records = h.today_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, MemoryKind::Interview);
    assert_eq!(records[0].transcript, "");
    assert_eq!(records[0].question.as_deref(), Some(QUESTION));
    assert_eq!(records[0].audio_ref, None);
    assert!(h.display.ever_showed("Saved"));
}

#[tokio::test]
async fn daily_answer_is_transcribed_and_saved() {
    let mut h = Harness::started(Options::default()).await;
    h.backend.set_transcript("I went hiking");

    h.send(EventKind::RecordHold).await;
    h.send(EventKind::RecordRelease).await;
    h.settle().await;

    let records = h.today_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].transcript, "I went hiking");
    assert_eq!(records[0].question.as_deref(), Some(QUESTION));
}

#[tokio::test]
async fn rotation_while_busy_is_ignored() {
    let mut h = Harness::new();
    h.coordinator.start();
    assert!(h.coordinator.state().activity.is_busy());

    h.rotate(1).await;
    h.rotate(-1).await;
    assert_eq!(h.coordinator.state().mode, Mode::Daily);

    // Nothing was queued up by the ignored rotations
    h.settle().await;
    assert_eq!(h.coordinator.state().mode, Mode::Daily);

    h.rotate(1).await;
    assert_eq!(h.coordinator.state().mode, Mode::Chat);
    assert!(h.coordinator.state().activity.is_idle());
}

#[tokio::test]
async fn diary_without_records_shows_no_record() {
    let mut h = Harness::started(Options::default()).await;
    h.rotate(1).await;
    h.rotate(1).await;
    assert_eq!(h.coordinator.state().mode, Mode::Diary);

    h.send(EventKind::EncoderPress).await;
    assert!(h.coordinator.state().activity.is_idle());
    assert!(h.display.current().iter().any(|l| l == "No record"));
}

#[tokio::test]
async fn diary_rotation_moves_the_date_up_to_today() {
    let mut h = Harness::started(Options::default()).await;
    let today = chrono::Local::now().date_naive();
    h.rotate(1).await;
    h.rotate(1).await;

    h.rotate(-1).await;
    assert_eq!(h.coordinator.state().mode, Mode::Diary);
    assert_eq!(h.coordinator.diary_date(), today - chrono::Duration::days(1));

    h.rotate(1).await;
    assert_eq!(h.coordinator.diary_date(), today);

    h.rotate(1).await;
    assert_eq!(h.coordinator.state().mode, Mode::Reminder);
}

#[tokio::test]
async fn diary_plays_records_in_order() {
    let mut h = Harness::started(Options::default()).await;
    let store = h.coordinator.store();
    store.append(&NewMemory::chat("first thing")).unwrap();
    store.append(&NewMemory::chat("")).unwrap();
    store
        .append(&NewMemory::interview(Some("Q".into()), "second thing"))
        .unwrap();

    h.rotate(1).await;
    h.rotate(1).await;
    h.send(EventKind::EncoderPress).await;
    assert_eq!(
        h.coordinator.state().activity.stage(),
        Some(BusyStage::Synthesizing)
    );
    h.settle().await;

    let spoken: Vec<_> = h.backend.synthesized().into_iter().skip(1).collect();
    assert_eq!(
        spoken,
        vec![
            ("first thing".to_string(), "me".to_string()),
            ("second thing".to_string(), "me".to_string()),
        ]
    );
}

#[tokio::test]
async fn chat_reply_uses_context_retrieved_before_saving() {
    let mut h = Harness::started(Options::default()).await;
    h.coordinator
        .store()
        .append(&NewMemory::chat("walked the dog in the park"))
        .unwrap();
    h.rotate(1).await;
    h.backend.set_transcript("tell me about the park");

    h.send(EventKind::RecordHold).await;
    h.send(EventKind::RecordRelease).await;
    h.settle().await;

    let contexts = h.backend.reply_contexts.lock().unwrap().clone();
    assert_eq!(contexts.len(), 1);
    assert!(contexts[0].contains(&"walked the dog in the park".to_string()));
    assert!(!contexts[0].contains(&"tell me about the park".to_string()));

    let latest = h.coordinator.store().latest_n(1).unwrap();
    assert_eq!(latest[0].kind, MemoryKind::Chat);
    assert_eq!(latest[0].transcript, "tell me about the park");

    assert_eq!(
        h.backend.synthesized().last().cloned(),
        Some(("Reply to tell me about the park".to_string(), "me".to_string()))
    );
}

#[tokio::test]
async fn chat_silence_shows_no_speech() {
    let mut h = Harness::started(Options::default()).await;
    h.rotate(1).await;
    h.backend.set_transcript("");

    h.send(EventKind::RecordHold).await;
    h.send(EventKind::RecordRelease).await;
    h.settle().await;

    assert!(h.display.ever_showed("No speech"));
    assert_eq!(h.backend.reply_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.today_records().len(), 1);
}

#[tokio::test]
async fn chat_synthesis_failure_plays_generic_reply() {
    let clip = AudioClip::Pcm {
        samples: vec![0.0; 160],
        sample_rate: 16000,
    };
    let mut h = Harness::started(Options {
        assets: echomemo::assets::AssetLibrary::builtin()
            .without(Asset::ThinkingFiller)
            .with(Asset::GenericReply, clip.into()),
        ..Options::default()
    })
    .await;
    h.rotate(1).await;
    h.backend.set_transcript("hello");
    h.backend.fail_synthesis.store(true, Ordering::SeqCst);
    let plays_before = h.player.plays.load(Ordering::SeqCst);

    h.send(EventKind::RecordHold).await;
    h.send(EventKind::RecordRelease).await;
    h.settle().await;

    assert_eq!(h.player.plays.load(Ordering::SeqCst), plays_before + 1);
    assert!(h.display.ever_showed("Reply to hello"));
}

#[tokio::test]
async fn reminder_is_deferred_during_recording_and_fires_after() {
    let mut h = Harness::started(Options::default()).await;

    h.rotate(-1).await;
    assert_eq!(h.coordinator.state().mode, Mode::Reminder);
    h.send(EventKind::RecordHold).await;
    assert!(h.coordinator.reminder_pending());
    assert!(h.coordinator.state().activity.is_idle());

    h.rotate(1).await;
    h.settle().await;
    h.send(EventKind::RecordHold).await;
    assert!(h.media.is_recording());

    // Past the deadline while the microphone is open
    h.pump(Duration::from_millis(250)).await;
    assert!(h.coordinator.state().activity.is_recording());
    assert!(h.coordinator.reminder_pending());
    assert!(!h.display.ever_showed("Time's up!"));

    h.send(EventKind::RecordRelease).await;
    let fired = h
        .run_until(
            |c| !c.reminder_pending() && c.state().activity.is_idle(),
            LIMIT,
        )
        .await;
    assert!(fired);
    assert!(h.display.ever_showed("Time's up!"));
}

#[tokio::test]
async fn reminder_press_cancels_countdown() {
    let mut h = Harness::started(Options::default()).await;
    h.rotate(-1).await;
    h.send(EventKind::RecordHold).await;
    assert!(h.display.ever_showed("Remaining"));

    h.send(EventKind::EncoderPress).await;
    assert!(!h.coordinator.reminder_pending());
    assert!(h.display.ever_showed("Cancelled"));

    h.pump(Duration::from_millis(300)).await;
    assert!(!h.display.ever_showed("Time's up!"));
}

#[tokio::test]
async fn watchdog_times_out_and_drops_late_result() {
    let mut options = Options::default();
    options.timings.remote_deadline = Duration::from_millis(100);
    let mut h = Harness::started(options).await;
    h.backend.set_transcript("too late");
    h.backend.transcribe_delay_ms.store(400, Ordering::SeqCst);

    h.send(EventKind::RecordHold).await;
    h.send(EventKind::RecordRelease).await;
    h.settle().await;
    assert!(h.display.ever_showed("Timeout"));

    // The transcription finishes later and must change nothing
    h.pump(Duration::from_millis(500)).await;
    assert!(h.coordinator.state().activity.is_idle());
    assert!(h.today_records().is_empty());
}

#[tokio::test]
async fn transcription_failure_still_files_the_recording() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = Harness::started(Options {
        recordings_dir: Some(dir.path().to_path_buf()),
        ..Options::default()
    })
    .await;
    h.backend.fail_transcribe.store(true, Ordering::SeqCst);

    h.send(EventKind::RecordHold).await;
    h.send(EventKind::RecordRelease).await;
    h.settle().await;

    let records = h.today_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, MemoryKind::Interview);
    assert_eq!(records[0].transcript, "");
    let audio = records[0].audio_ref.clone().expect("recording kept");
    assert!(audio.starts_with(dir.path()));
    assert!(audio.exists());

    assert!(h.display.ever_showed("Could not transcribe"));
    assert!(!h.display.ever_showed("Saved"));
    assert!(h.coordinator.state().activity.is_idle());
}

#[tokio::test]
async fn recording_past_its_deadline_times_out() {
    let mut options = Options::default();
    options.timings.recording_deadline = Duration::from_millis(100);
    let mut h = Harness::started(options).await;

    h.send(EventKind::RecordHold).await;
    assert!(h.coordinator.state().activity.is_recording());
    h.settle().await;
    assert!(h.display.ever_showed("Timeout"));

    // The microphone is closed in the background
    h.pump(Duration::from_millis(50)).await;
    assert!(!h.media.is_recording());

    // The late release belongs to nothing
    h.send(EventKind::RecordRelease).await;
    assert!(h.coordinator.state().activity.is_idle());
    h.pump(Duration::from_millis(50)).await;
    assert!(h.today_records().is_empty());

    // And the device records again
    h.backend.set_transcript("second try");
    h.send(EventKind::RecordHold).await;
    assert!(h.coordinator.state().activity.is_recording());
    h.send(EventKind::RecordRelease).await;
    h.settle().await;
    let records = h.today_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].transcript, "second try");
}

#[tokio::test]
async fn microphone_failure_returns_to_idle() {
    let mut h = Harness::started(Options {
        capture_fails: true,
        ..Options::default()
    })
    .await;

    // The hold is accepted at once; the open fails in the background
    h.send(EventKind::RecordHold).await;
    assert!(h.coordinator.state().activity.is_recording());
    h.settle().await;

    assert!(h.display.ever_showed("Audio error"));
    assert!(!h.media.is_recording());
    h.send(EventKind::RecordRelease).await;
    assert!(h.coordinator.state().activity.is_idle());
    assert!(h.today_records().is_empty());
}

#[tokio::test]
async fn chat_save_failure_stops_before_replying() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("memories.db");
    let mut h = Harness::started(Options {
        database: Some(db.clone()),
        ..Options::default()
    })
    .await;
    rusqlite::Connection::open(&db)
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER reject_inserts BEFORE INSERT ON memories
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();
    h.rotate(1).await;
    h.backend.set_transcript("hello there");

    h.send(EventKind::RecordHold).await;
    h.send(EventKind::RecordRelease).await;
    h.settle().await;

    assert!(h.display.ever_showed("Save failed"));
    assert_eq!(h.backend.reply_calls.load(Ordering::SeqCst), 0);
    assert!(h.coordinator.state().activity.is_idle());
}

#[tokio::test]
async fn stale_completion_is_ignored() {
    let mut h = Harness::started(Options::default()).await;
    let before = h.coordinator.state();

    h.send(EventKind::TaskDone {
        tag: TaskTag(9999),
        result: Ok(TaskOutput::Played),
    })
    .await;
    assert_eq!(h.coordinator.state(), before);
}

#[tokio::test]
async fn recording_is_refused_while_playing() {
    let h = Harness::with(Options {
        playback: Duration::from_millis(100),
        ..Options::default()
    });
    let mut queue = h.queue;

    let clip = AudioClip::Pcm {
        samples: vec![0.0; 160],
        sample_rate: 16000,
    };
    h.media.play(clip, TaskTag(1)).unwrap();

    assert!(matches!(
        h.media.start_recording(TaskTag(2)),
        Err(MediaError::ResourceBusy(_))
    ));
    assert!(h.media.is_playing());

    let event = queue.recv().await.unwrap();
    assert!(matches!(
        event.kind,
        EventKind::TaskDone {
            tag: TaskTag(1),
            result: Ok(TaskOutput::Played)
        }
    ));
}

#[tokio::test]
async fn every_event_leaves_exactly_one_state() {
    let mut h = Harness::started(Options::default()).await;
    h.backend.set_transcript("some words");

    // Fixed pseudo-random input sequence
    let mut seed: u32 = 0x2545_f491;
    for _ in 0..60 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let kind = match seed % 5 {
            0 => EventKind::EncoderRotate { delta: 1 },
            1 => EventKind::EncoderRotate { delta: -1 },
            2 => EventKind::EncoderPress,
            3 => EventKind::RecordHold,
            _ => EventKind::RecordRelease,
        };
        let rotate = matches!(kind, EventKind::EncoderRotate { .. });
        let before = h.coordinator.state();

        h.send(kind).await;
        let after = h.coordinator.state();

        if rotate && before.activity.is_busy() {
            assert_eq!(after.mode, before.mode);
        }
        if h.media.is_recording() {
            assert!(after.activity.is_busy());
        }
        h.pump(Duration::from_millis(5)).await;
    }

    h.send(EventKind::RecordRelease).await;
    h.settle().await;
}
