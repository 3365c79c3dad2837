//! Echomemo - voice diary and companion device
//!
//! Run with `echomemo` or `echomemo daemon` to start the daemon.
//! Use `echomemo memories` to list what has been recorded.
//! Use `echomemo play <asset>` to check the speaker.

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use echomemo::assets::{Asset, AssetLibrary};
use echomemo::cli::{Cli, Commands};
use echomemo::config::{self, Config};
use echomemo::daemon::Daemon;
use echomemo::media::{Player, RodioPlayer};
use echomemo::store::{MemoryRecord, MemoryStore};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("echomemo={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(device) = cli.input_device {
        config.input.device = device;
    }
    if let Some(secs) = cli.reminder_delay {
        config.coordinator.reminder_delay_secs = secs;
    }

    // Run the appropriate command
    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = Daemon::new(config);
            daemon.run().await?;
        }

        Commands::Config { default } => {
            if default {
                print!("{}", config::DEFAULT_CONFIG);
            } else {
                show_config(&config);
            }
        }

        Commands::Memories { date, latest } => {
            list_memories(&config, date.as_deref(), latest)?;
        }

        Commands::Status => {
            show_status(&config);
        }

        Commands::Play { asset } => {
            play_asset(&config, &asset).await?;
        }
    }

    Ok(())
}

/// Print stored records, oldest first within a day
fn list_memories(config: &Config, date: Option<&str>, latest: Option<usize>) -> anyhow::Result<()> {
    let db_path = config.storage.db_path();
    if !db_path.exists() {
        println!("No memories yet ({:?} does not exist)", db_path);
        return Ok(());
    }
    let store = MemoryStore::open(&db_path)?;

    let records = match (date, latest) {
        (Some(date), _) => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date))?;
            store.query(date)?
        }
        (None, Some(n)) => store.latest_n(n)?,
        (None, None) => {
            let dates = store.dates()?;
            if dates.is_empty() {
                println!("No memories yet");
            }
            for date in dates {
                println!("{}  {} records", date, store.count_on(date)?);
            }
            return Ok(());
        }
    };

    if records.is_empty() {
        println!("No record");
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &MemoryRecord) {
    println!(
        "#{} {} {} [{}]",
        record.id,
        record.date,
        record.created_at.format("%H:%M"),
        record.kind
    );
    if let Some(ref q) = record.question {
        println!("  Q: {}", q);
    }
    if record.transcript.is_empty() {
        println!("  (no speech)");
    } else {
        println!("  {}", record.transcript);
    }
    if let Some(ref audio) = record.audio_ref {
        println!("  audio: {}", audio.display());
    }
}

/// Print the lines the daemon last sent to the display
fn show_status(config: &Config) {
    let Some(path) = config.display.resolve_status_file() else {
        eprintln!("Error: status_file is disabled.");
        eprintln!();
        eprintln!("To enable it, add to your config.toml:");
        eprintln!();
        eprintln!("  [display]");
        eprintln!("  status_file = \"auto\"");
        std::process::exit(1);
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => print!("{}", contents),
        Err(_) => println!("stopped"),
    }
}

/// Play one named asset and wait for it to finish
async fn play_asset(config: &Config, name: &str) -> anyhow::Result<()> {
    let asset = Asset::from_name(name).with_context(|| {
        let known: Vec<_> = Asset::ALL.iter().map(|a| a.name()).collect();
        format!("Unknown asset '{}' (known: {})", name, known.join(", "))
    })?;

    let library = AssetLibrary::load(&config.assets.resolve_dir());
    let Some(source) = library.get(asset) else {
        println!("{} has no file and no built-in sound", asset);
        return Ok(());
    };

    let player = RodioPlayer::new(config.audio.volume);
    tokio::task::spawn_blocking(move || player.play(&source, &AtomicBool::new(false))).await??;
    Ok(())
}

/// Show current configuration
fn show_config(config: &Config) {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("[input]");
    println!("  device = {:?}", config.input.device);
    println!("  encoder_axis = {:?}", config.input.encoder_axis);
    println!("  encoder_button_key = {:?}", config.input.encoder_button_key);
    println!("  record_button_key = {:?}", config.input.record_button_key);
    println!("  hold_threshold_ms = {}", config.input.hold_threshold_ms);

    println!("\n[audio]");
    println!("  device = {:?}", config.audio.device);
    println!("  sample_rate = {}", config.audio.sample_rate);
    println!("  max_duration_secs = {}", config.audio.max_duration_secs);
    println!("  volume = {}", config.audio.volume);

    println!("\n[ai]");
    println!("  endpoint = {:?}", config.ai.endpoint);
    println!("  api_key = {}", mask(config.ai.api_key.as_deref()));
    println!("  chat_model = {:?}", config.ai.chat_model);
    println!("  transcription_model = {:?}", config.ai.transcription_model);
    println!("  language = {:?}", config.ai.language);
    println!("  synthesis_endpoint = {:?}", config.ai.synthesis_endpoint);
    println!(
        "  synthesis_api_key = {}",
        mask(config.ai.synthesis_api_key.as_deref())
    );
    println!("  system_voice = {:?}", config.ai.system_voice);
    println!("  persona_voice = {:?}", config.ai.persona_voice);

    println!("\n[coordinator]");
    println!(
        "  reminder_delay_secs = {}",
        config.coordinator.reminder_delay_secs
    );
    println!(
        "  reminder_retry_secs = {}",
        config.coordinator.reminder_retry_secs
    );
    println!(
        "  remote_deadline_secs = {}",
        config.coordinator.remote_deadline_secs
    );
    println!("  rag_context = {}", config.coordinator.rag_context);

    println!("\n[storage]");
    println!("  database = {:?}", config.storage.db_path());
    println!("  keep_recordings = {}", config.storage.keep_recordings);

    println!("\n[assets]");
    println!("  dir = {:?}", config.assets.resolve_dir());

    if let Some(status_file) = config.display.resolve_status_file() {
        println!("\n[display]");
        println!("  status_file = {:?}", status_file);
    }

    println!("\n---");
    println!(
        "Config file: {:?}",
        Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );
}

fn mask(secret: Option<&str>) -> &'static str {
    match secret {
        Some(s) if !s.is_empty() => "(set)",
        _ => "(not set)",
    }
}
