//! Daemon module - wiring and the main event loop
//!
//! Builds every service from configuration, starts the input source and
//! feeds the shared event queue into the coordinator until SIGINT or
//! SIGTERM arrives.

use crate::ai::{self, AiService};
use crate::assets::AssetLibrary;
use crate::config::Config;
use crate::coordinator::{Coordinator, Services, Settings};
use crate::display::{LogDisplay, StatusFileDisplay, TeeDisplay};
use crate::error::{EchoError, Result};
use crate::event;
use crate::input;
use crate::media::{self, MediaService, RodioPlayer};
use crate::store::MemoryStore;
use pidlock::Pidlock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

/// Lock file guarding against a second daemon on the same device
fn lock_path() -> PathBuf {
    Config::runtime_dir().join("daemon.lock")
}

/// Main daemon that owns the devices for its lifetime
pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting echomemo daemon");

        self.config.ensure_directories().map_err(|e| {
            EchoError::Config(format!("Failed to create directories: {}", e))
        })?;

        // Single instance check
        let lock_path = lock_path().to_string_lossy().to_string();
        let mut lock = Pidlock::new(&lock_path);
        if lock.acquire().is_err() {
            return Err(EchoError::Config(
                "Another echomemo daemon is already running".to_string(),
            ));
        }

        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            EchoError::Config(format!("Failed to set up SIGTERM handler: {}", e))
        })?;

        let (events, mut queue) = event::channel();

        let db_path = self.config.storage.db_path();
        tracing::info!("Memory store: {:?}", db_path);
        let store = MemoryStore::open(&db_path)?;

        let ai = AiService::new(ai::create_backend(&self.config.ai)?, &self.config.ai);
        if self.config.ai.persona_voice.is_empty() {
            tracing::warn!("No persona voice configured, replies will not be spoken");
        }

        let media = MediaService::new(
            media::create_capture(&self.config.audio),
            Arc::new(RodioPlayer::new(self.config.audio.volume)),
            events.clone(),
            self.config.audio.sample_rate,
        );

        let assets_dir = self.config.assets.resolve_dir();
        tracing::debug!("Assets directory: {:?}", assets_dir);
        let assets = AssetLibrary::load(&assets_dir);

        let status_file = self.config.display.resolve_status_file();
        let mut display = TeeDisplay::new().with(LogDisplay);
        if let Some(ref path) = status_file {
            tracing::info!("Status file: {:?}", path);
            display = display.with(StatusFileDisplay::new(path.clone()));
        }

        let mut input = input::create_source(&self.config.input)?;
        input.start(events.clone()).await?;

        let mut coordinator = Coordinator::new(
            Services {
                media,
                ai,
                store,
                assets,
                display: Box::new(display),
            },
            Settings::from_config(&self.config),
            events,
        );
        coordinator.start();

        // Main event loop
        loop {
            tokio::select! {
                Some(event) = queue.recv() => {
                    coordinator.handle(event);
                }

                // Handle graceful shutdown (SIGINT from Ctrl+C)
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                // Handle graceful shutdown (SIGTERM from systemctl stop)
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        // Cleanup
        input.stop().await;
        coordinator.shutdown().await;

        if let Some(path) = status_file {
            StatusFileDisplay::new(path).cleanup();
        }

        if let Err(e) = lock.release() {
            tracing::warn!("Failed to release daemon lock: {:?}", e);
        }

        tracing::info!("Daemon stopped");

        Ok(())
    }
}
