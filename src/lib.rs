//! Echomemo: voice diary and companion for a single-board device
//!
//! The device cycles through four modes with a rotary encoder and talks
//! through a microphone and a speaker:
//! - Daily Interview asks a generated question and files the spoken answer
//! - Chat answers in the user's own synthesized voice, grounded in past records
//! - Diary plays back what was said on a chosen day
//! - Reminder counts down and sounds an alert, never over a recording
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────┐   rotate/press/hold/release
//!   │ InputSource  │──────────────┐
//!   │   (evdev)    │              │
//!   └──────────────┘              ▼
//!                         ┌──────────────┐        ┌──────────────┐
//!   timers ──TimerFired──▶│ event queue  │───────▶│ Coordinator  │──▶ Display
//!                         │   (mpsc)     │        │ (mode × busy)│
//!                         └──────────────┘        └──────────────┘
//!                                 ▲                   │ spawn
//!                                 │ TaskDone(tag)     ▼
//!                         ┌───────┴──────────────────────────────┐
//!                         │ MediaService   AiService   MemoryStore│
//!                         │ (cpal/rodio)   (ureq)      (sqlite)   │
//!                         └──────────────────────────────────────┘
//! ```

pub mod ai;
pub mod assets;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod display;
pub mod error;
pub mod event;
pub mod input;
pub mod media;
pub mod state;
pub mod store;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use coordinator::Coordinator;
pub use daemon::Daemon;
pub use error::{EchoError, Result};
