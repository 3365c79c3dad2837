// Command-line interface definitions for echomemo
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "echomemo")]
#[command(author, version, about = "Voice diary and companion for a single-board device")]
#[command(long_about = "
Echomemo turns a small board with a microphone, speaker, rotary encoder and
two buttons into a voice diary.

MODES (turn the encoder to switch):
  Daily Interview  Asks a question each time you enter; hold to answer
  Chat             Hold to talk; replies in your own synthesized voice
  Diary            Turn to pick a day, press to hear what you said
  Reminder         Hold to start a countdown, press to cancel it

SETUP:
  1. Add yourself to the input group: sudo usermod -aG input $USER
  2. Enable the rotary-encoder and gpio-keys overlays for your board
  3. Put your API keys and voice identifiers in the config file
  4. Run: echomemo (to start the daemon)
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the input device (path under /dev/input, or "auto")
    #[arg(long, value_name = "DEVICE")]
    pub input_device: Option<String>,

    /// Override the reminder countdown in seconds
    #[arg(long, value_name = "SECS")]
    pub reminder_delay: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Show current configuration
    Config {
        /// Print the annotated default configuration instead
        #[arg(long)]
        default: bool,
    },

    /// List stored memories
    Memories {
        /// Only records from this day (YYYY-MM-DD)
        #[arg(long, value_name = "DATE", conflicts_with = "latest")]
        date: Option<String>,

        /// The newest N records
        #[arg(long, value_name = "N")]
        latest: Option<usize>,
    },

    /// Show what the device display currently shows
    Status,

    /// Play a named asset through the speaker (thinking_filler, reminder_alert,
    /// confirmation_chime, generic_reply)
    Play {
        /// Asset name
        asset: String,
    },
}
