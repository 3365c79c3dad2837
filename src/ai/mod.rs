//! Transcription, generation and speech synthesis
//!
//! Backends are plain blocking clients (`AiBackend`). `AiService` runs each
//! call on the blocking pool, applies the retry policy (one attempt, one
//! retry after a fixed backoff) and substitutes fallback text for the two
//! generation calls so a mode never stalls on a dead network.

pub mod remote;

pub use remote::RemoteBackend;

use crate::config::AiConfig;
use crate::error::AiError;
use crate::media::AudioClip;
use crate::store::MemoryRecord;
use std::sync::Arc;
use std::time::Duration;

/// Question used when generation fails twice
pub const FALLBACK_QUESTION: &str = "What is one thing from today you would like to remember?";

/// Reply used when generation fails twice
pub const FALLBACK_REPLY: &str = "I'm having trouble thinking right now. Tell me more?";

/// Which of the two configured voices to speak with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceId {
    /// Guidance voice for questions and prompts
    System,
    /// Voice modelled on the user, used for chat replies and diary playback
    Persona,
}

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceId::System => write!(f, "system"),
            VoiceId::Persona => write!(f, "persona"),
        }
    }
}

/// Blocking remote AI client
pub trait AiBackend: Send + Sync {
    /// Speech to text. An empty string means silence.
    fn transcribe(&self, clip: &AudioClip) -> Result<String, AiError>;

    /// A new interview question, informed by recent records
    fn generate_question(&self, history: &[MemoryRecord]) -> Result<String, AiError>;

    /// An answer to `transcript`, grounded in `memories`
    fn generate_reply(&self, transcript: &str, memories: &[MemoryRecord]) -> Result<String, AiError>;

    /// Speak `text` with the opaque voice identifier `voice`
    fn synthesize(&self, text: &str, voice: &str) -> Result<AudioClip, AiError>;
}

/// Factory function to create the configured backend
pub fn create_backend(config: &AiConfig) -> Result<Arc<dyn AiBackend>, AiError> {
    Ok(Arc::new(RemoteBackend::new(config)?))
}

/// Retrying wrapper around a backend; cheap to clone into tasks
#[derive(Clone)]
pub struct AiService {
    backend: Arc<dyn AiBackend>,
    system_voice: String,
    persona_voice: String,
    backoff: Duration,
}

impl AiService {
    pub fn new(backend: Arc<dyn AiBackend>, config: &AiConfig) -> Self {
        Self {
            backend,
            system_voice: config.system_voice.clone(),
            persona_voice: config.persona_voice.clone(),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Override the retry backoff
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run `op` on the blocking pool, retrying once after the backoff
    async fn call<T, F>(&self, name: &'static str, op: F) -> Result<T, AiError>
    where
        T: Send + 'static,
        F: Fn(&dyn AiBackend) -> Result<T, AiError> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let mut last_error = AiError::RemoteUnavailable(name.to_string());

        for attempt in 1..=2 {
            if attempt > 1 {
                tokio::time::sleep(self.backoff).await;
            }

            let backend = self.backend.clone();
            let op = op.clone();
            let result = tokio::task::spawn_blocking(move || op(backend.as_ref()))
                .await
                .unwrap_or_else(|e| Err(AiError::Remote(format!("task failed: {}", e))));

            match result {
                Ok(value) => return Ok(value),
                // Retrying will not fix configuration
                Err(e @ AiError::Config(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!("{} attempt {} failed: {}", name, attempt, e);
                    last_error = e;
                }
            }
        }

        Err(AiError::RemoteUnavailable(format!(
            "{}: {}",
            name, last_error
        )))
    }

    /// Speech to text. Fails with `TranscriptionFailed` on empty audio or
    /// when the remote call fails twice; an empty string is silence.
    pub async fn transcribe(&self, clip: AudioClip) -> Result<String, AiError> {
        if clip.is_empty() {
            return Err(AiError::TranscriptionFailed("empty audio".into()));
        }
        let clip = Arc::new(clip);
        self.call("transcribe", move |b| b.transcribe(&clip))
            .await
            .map(|text| text.trim().to_string())
            .map_err(|e| match e {
                AiError::TranscriptionFailed(_) => e,
                other => AiError::TranscriptionFailed(other.to_string()),
            })
    }

    /// A new interview question; falls back to [`FALLBACK_QUESTION`]
    pub async fn generate_question(&self, history: Vec<MemoryRecord>) -> String {
        match self
            .call("generate_question", move |b| b.generate_question(&history))
            .await
        {
            Ok(q) if !q.trim().is_empty() => clean_generated(&q),
            Ok(_) => FALLBACK_QUESTION.to_string(),
            Err(e) => {
                tracing::warn!("Using fallback question: {}", e);
                FALLBACK_QUESTION.to_string()
            }
        }
    }

    /// A reply to `transcript`; falls back to [`FALLBACK_REPLY`]
    pub async fn generate_reply(&self, transcript: String, memories: Vec<MemoryRecord>) -> String {
        match self
            .call("generate_reply", move |b| b.generate_reply(&transcript, &memories))
            .await
        {
            Ok(r) if !r.trim().is_empty() => clean_generated(&r),
            Ok(_) => FALLBACK_REPLY.to_string(),
            Err(e) => {
                tracing::warn!("Using fallback reply: {}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// Speak `text`. Fails with `SynthesisFailed`; callers fall back to a
    /// pre-recorded clip or skip playback.
    pub async fn synthesize(&self, text: String, voice: VoiceId) -> Result<AudioClip, AiError> {
        let voice_ref = match voice {
            VoiceId::System => self.system_voice.clone(),
            VoiceId::Persona => self.persona_voice.clone(),
        };
        if voice_ref.is_empty() {
            return Err(AiError::SynthesisFailed(format!("no {} voice configured", voice)));
        }
        self.call("synthesize", move |b| b.synthesize(&text, &voice_ref))
            .await
            .map_err(|e| match e {
                AiError::SynthesisFailed(_) => e,
                other => AiError::SynthesisFailed(other.to_string()),
            })
    }
}

/// Strip wrapping quotes and whitespace models like to add
fn clean_generated(text: &str) -> String {
    text.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '「' | '」'))
        .trim()
        .to_string()
}
