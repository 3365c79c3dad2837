//! Configuration loading and types for echomemo
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/echomemo/config.toml)
//! 3. Environment variables (ECHOMEMO_*)
//! 4. CLI arguments (highest priority)
//!
//! GPIO pin numbers are not configured here. The encoder and buttons are
//! exposed as evdev devices by the board's device-tree overlays
//! (`rotary-encoder`, `gpio-keys`), so only key and axis names appear below.

use crate::error::EchoError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# EchoMemo Configuration
#
# Location: ~/.config/echomemo/config.toml
# All settings can be overridden via CLI flags or ECHOMEMO_* variables

[input]
# evdev device path, or "auto" to scan /dev/input for a device that
# exposes the codes below
device = "auto"

# Relative axis emitted by the rotary-encoder overlay
encoder_axis = "REL_X"

# Optional keys that also rotate (handy on a development keyboard)
encoder_left_key = "LEFT"
encoder_right_key = "RIGHT"

# Encoder push switch and the record button (gpio-keys codes)
encoder_button_key = "ENTER"
record_button_key = "SPACE"

# Minimum interval between two accepted encoder steps
encoder_debounce_ms = 4

# Minimum interval between two accepted encoder button edges
button_debounce_ms = 30

# The record button must be held this long before recording starts
hold_threshold_ms = 150

[audio]
# Audio input device ("default" uses system default)
device = "default"

# Sample rate in Hz
sample_rate = 16000

# Maximum recording duration in seconds (safety limit)
max_duration_secs = 60

# Playback volume (0.0 to 1.0)
volume = 0.8

[assets]
# Directory holding thinking_filler.wav, reminder_alert.wav,
# confirmation_chime.wav and generic_reply.wav. Missing clips fall back to
# built-in tones (generic_reply has no built-in and is skipped).
dir = "auto"

[ai]
# OpenAI-compatible endpoint used for transcription and text generation
endpoint = "https://api.openai.com"
# api_key = "sk-..."   (or ECHOMEMO_AI_API_KEY)
chat_model = "gpt-4o-mini"
transcription_model = "whisper-1"
language = "zh"

# Voice-clone synthesis endpoint (returns an audio URL)
synthesis_endpoint = "https://aivoiceclonefree.com/api/instant/clone-sync"
# synthesis_api_key = "..."   (or ECHOMEMO_SYNTHESIS_API_KEY)
system_voice = ""
persona_voice = ""

# Per-request timeout and fixed backoff before the single retry
timeout_secs = 20
retry_backoff_ms = 1000

[storage]
# Data directory for memories.db and recordings ("auto" = XDG data dir)
path = "auto"

# Keep WAV files of interview/chat recordings for diary playback
keep_recordings = true

[coordinator]
# Countdown started by the record button in reminder mode
reminder_delay_secs = 300

# Retry interval when the alert is due during a recording
reminder_retry_secs = 5

# Watchdog deadlines for busy stages
remote_deadline_secs = 60
playback_deadline_secs = 120

# Prior memories sent along with a chat reply request
rag_context = 5

[display]
# Status file read by the OLED renderer. "auto" uses
# $XDG_RUNTIME_DIR/echomemo/display, "disabled" turns it off.
status_file = "auto"
"#;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub assets: AssetsConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub display: DisplayConfig,
}

/// Encoder and button input configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    /// evdev device path or "auto"
    #[serde(default = "default_auto")]
    pub device: String,

    /// Relative axis name for encoder steps (REL_X, REL_DIAL, ...)
    #[serde(default = "default_encoder_axis")]
    pub encoder_axis: String,

    /// Key that rotates one step counter-clockwise
    #[serde(default)]
    pub encoder_left_key: Option<String>,

    /// Key that rotates one step clockwise
    #[serde(default)]
    pub encoder_right_key: Option<String>,

    /// Encoder push switch key name
    #[serde(default = "default_encoder_button")]
    pub encoder_button_key: String,

    /// Record button key name
    #[serde(default = "default_record_button")]
    pub record_button_key: String,

    #[serde(default = "default_encoder_debounce_ms")]
    pub encoder_debounce_ms: u64,

    #[serde(default = "default_button_debounce_ms")]
    pub button_debounce_ms: u64,

    #[serde(default = "default_hold_threshold_ms")]
    pub hold_threshold_ms: u64,
}

/// Audio capture and playback configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// ALSA/PipeWire device name, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Maximum recording duration in seconds (safety limit)
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u32,

    /// Playback volume (0.0 to 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
}

/// Named audio asset location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetsConfig {
    #[serde(default = "default_auto")]
    pub dir: String,
}

/// Remote AI and voice service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    /// Transcription language hint ("auto" to let the server detect)
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_synthesis_endpoint")]
    pub synthesis_endpoint: String,

    #[serde(default)]
    pub synthesis_api_key: Option<String>,

    /// Opaque identifier of the guidance voice
    #[serde(default)]
    pub system_voice: String,

    /// Opaque identifier of the user's cloned voice
    #[serde(default)]
    pub persona_voice: String,

    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Memory store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Data directory, or "auto" for the XDG data dir
    #[serde(default = "default_auto")]
    pub path: String,

    /// Keep recordings on disk so diary mode can replay them
    #[serde(default = "default_true")]
    pub keep_recordings: bool,
}

/// Timing and context settings for the mode coordinator
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_reminder_delay_secs")]
    pub reminder_delay_secs: u64,

    #[serde(default = "default_reminder_retry_secs")]
    pub reminder_retry_secs: u64,

    #[serde(default = "default_remote_deadline_secs")]
    pub remote_deadline_secs: u64,

    #[serde(default = "default_playback_deadline_secs")]
    pub playback_deadline_secs: u64,

    #[serde(default = "default_rag_context")]
    pub rag_context: usize,
}

/// Display status surface configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplayConfig {
    /// "auto", "disabled", or an explicit path
    #[serde(default)]
    pub status_file: Option<String>,
}

fn default_auto() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

fn default_encoder_axis() -> String {
    "REL_X".to_string()
}

fn default_encoder_button() -> String {
    "ENTER".to_string()
}

fn default_record_button() -> String {
    "SPACE".to_string()
}

fn default_encoder_debounce_ms() -> u64 {
    4
}

fn default_button_debounce_ms() -> u64 {
    30
}

fn default_hold_threshold_ms() -> u64 {
    150
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_max_duration_secs() -> u32 {
    60
}

fn default_volume() -> f32 {
    0.8
}

fn default_ai_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_language() -> String {
    "zh".to_string()
}

fn default_synthesis_endpoint() -> String {
    "https://aivoiceclonefree.com/api/instant/clone-sync".to_string()
}

fn default_ai_timeout_secs() -> u64 {
    20
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_reminder_delay_secs() -> u64 {
    300
}

fn default_reminder_retry_secs() -> u64 {
    5
}

fn default_remote_deadline_secs() -> u64 {
    60
}

fn default_playback_deadline_secs() -> u64 {
    120
}

fn default_rag_context() -> usize {
    5
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device: default_auto(),
            encoder_axis: default_encoder_axis(),
            encoder_left_key: Some("LEFT".to_string()),
            encoder_right_key: Some("RIGHT".to_string()),
            encoder_button_key: default_encoder_button(),
            record_button_key: default_record_button(),
            encoder_debounce_ms: default_encoder_debounce_ms(),
            button_debounce_ms: default_button_debounce_ms(),
            hold_threshold_ms: default_hold_threshold_ms(),
        }
    }
}

impl InputConfig {
    pub fn encoder_debounce(&self) -> Duration {
        Duration::from_millis(self.encoder_debounce_ms)
    }

    pub fn button_debounce(&self) -> Duration {
        Duration::from_millis(self.button_debounce_ms)
    }

    pub fn hold_threshold(&self) -> Duration {
        Duration::from_millis(self.hold_threshold_ms)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            max_duration_secs: default_max_duration_secs(),
            volume: default_volume(),
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self { dir: default_auto() }
    }
}

impl AssetsConfig {
    /// Resolve the asset directory ("auto" → <data dir>/assets)
    pub fn resolve_dir(&self) -> PathBuf {
        match self.dir.as_str() {
            "auto" => Config::data_dir().join("assets"),
            path => PathBuf::from(path),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ai_endpoint(),
            api_key: None,
            chat_model: default_chat_model(),
            transcription_model: default_transcription_model(),
            language: default_language(),
            synthesis_endpoint: default_synthesis_endpoint(),
            synthesis_api_key: None,
            system_voice: String::new(),
            persona_voice: String::new(),
            timeout_secs: default_ai_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_auto(),
            keep_recordings: true,
        }
    }
}

impl StorageConfig {
    /// Resolve the data directory ("auto" → XDG data dir)
    pub fn resolve_path(&self) -> PathBuf {
        match self.path.as_str() {
            "auto" => Config::data_dir(),
            path => PathBuf::from(path),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolve_path().join("memories.db")
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.resolve_path().join("recordings")
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reminder_delay_secs: default_reminder_delay_secs(),
            reminder_retry_secs: default_reminder_retry_secs(),
            remote_deadline_secs: default_remote_deadline_secs(),
            playback_deadline_secs: default_playback_deadline_secs(),
            rag_context: default_rag_context(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            status_file: Some("auto".to_string()),
        }
    }
}

impl DisplayConfig {
    /// Resolve the status file path from config
    /// Returns None if not configured or explicitly disabled
    pub fn resolve_status_file(&self) -> Option<PathBuf> {
        self.status_file
            .as_ref()
            .and_then(|path| match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Config::runtime_dir().join("display")),
                _ => Some(PathBuf::from(path)),
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            audio: AudioConfig::default(),
            assets: AssetsConfig::default(),
            ai: AiConfig::default(),
            storage: StorageConfig::default(),
            coordinator: CoordinatorConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "echomemo")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the runtime directory for ephemeral files (status, lock)
    pub fn runtime_dir() -> PathBuf {
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("echomemo")
    }

    /// Get the data directory path (database, recordings, assets)
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "echomemo")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Settings that load fine but cannot work together
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        // Two attempts and the backoff between them
        let worst_call_ms = 2 * self.ai.timeout_secs * 1000 + self.ai.retry_backoff_ms;
        if self.coordinator.remote_deadline_secs * 1000 <= worst_call_ms {
            warnings.push(format!(
                "coordinator.remote_deadline_secs ({}) must exceed two ai.timeout_secs plus \
                 ai.retry_backoff_ms ({} ms), or fallbacks never arrive in time",
                self.coordinator.remote_deadline_secs, worst_call_ms
            ));
        }
        warnings
    }

    /// Ensure the runtime and storage directories exist
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(Self::runtime_dir())?;

        let data = self.storage.resolve_path();
        std::fs::create_dir_all(&data)?;
        tracing::debug!("Ensured data directory exists: {:?}", data);

        if self.storage.keep_recordings {
            std::fs::create_dir_all(self.storage.recordings_dir())?;
        }

        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, EchoError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| EchoError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| EchoError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    Ok(config)
}

/// Override config values from ECHOMEMO_* environment variables
fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(key) = var("ECHOMEMO_AI_API_KEY") {
        config.ai.api_key = Some(key);
    }
    if let Some(endpoint) = var("ECHOMEMO_AI_ENDPOINT") {
        config.ai.endpoint = endpoint;
    }
    if let Some(key) = var("ECHOMEMO_SYNTHESIS_API_KEY") {
        config.ai.synthesis_api_key = Some(key);
    }
    if let Some(voice) = var("ECHOMEMO_SYSTEM_VOICE") {
        config.ai.system_voice = voice;
    }
    if let Some(voice) = var("ECHOMEMO_PERSONA_VOICE") {
        config.ai.persona_voice = voice;
    }
    if let Some(device) = var("ECHOMEMO_INPUT_DEVICE") {
        config.input.device = device;
    }
    if let Some(path) = var("ECHOMEMO_DATA_DIR") {
        config.storage.path = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.input.record_button_key, "SPACE");
        assert_eq!(config.input.hold_threshold(), Duration::from_millis(150));
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.coordinator.rag_context, 5);
        assert!(config.storage.keep_recordings);
    }

    #[test]
    fn test_default_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.input.encoder_axis, "REL_X");
        assert_eq!(config.input.encoder_left_key.as_deref(), Some("LEFT"));
        assert_eq!(config.ai.timeout_secs, 20);
        assert_eq!(config.coordinator.reminder_delay_secs, 300);
        assert_eq!(config.display.status_file.as_deref(), Some("auto"));
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
            [input]
            device = "/dev/input/event3"
            record_button_key = "BTN_0"

            [coordinator]
            reminder_delay_secs = 30
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.input.device, "/dev/input/event3");
        assert_eq!(config.input.record_button_key, "BTN_0");
        assert_eq!(config.input.encoder_button_key, "ENTER");
        assert_eq!(config.coordinator.reminder_delay_secs, 30);
        assert_eq!(config.coordinator.reminder_retry_secs, 5);
        assert_eq!(config.audio.max_duration_secs, 60);
    }

    #[test]
    fn test_status_file_resolution() {
        let mut display = DisplayConfig::default();
        assert!(display.resolve_status_file().unwrap().ends_with("echomemo/display"));

        display.status_file = Some("disabled".to_string());
        assert!(display.resolve_status_file().is_none());

        display.status_file = Some("/tmp/oled".to_string());
        assert_eq!(display.resolve_status_file(), Some(PathBuf::from("/tmp/oled")));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| match key {
            "ECHOMEMO_AI_API_KEY" => Some("sk-test".to_string()),
            "ECHOMEMO_PERSONA_VOICE" => Some("voice-123".to_string()),
            _ => None,
        });
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.ai.persona_voice, "voice-123");
        assert_eq!(config.ai.system_voice, "");
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\npath = \"/srv/echomemo\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.storage.db_path(), PathBuf::from("/srv/echomemo/memories.db"));
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[audio]\nsample_rate = \"fast\"\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }

    #[test]
    fn test_deadline_shorter_than_remote_retries_warns() {
        let mut config = Config::default();
        assert!(config.warnings().is_empty());

        config.ai.timeout_secs = 20;
        config.ai.retry_backoff_ms = 1000;
        config.coordinator.remote_deadline_secs = 30;
        let warnings = config.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("remote_deadline_secs"));

        config.coordinator.remote_deadline_secs = 42;
        assert!(config.warnings().is_empty());
    }
}
