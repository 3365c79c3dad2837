//! Remote AI backend
//!
//! Transcription and text generation go to an OpenAI-compatible server
//! (`/v1/audio/transcriptions`, `/v1/chat/completions`). Speech comes from
//! a voice-clone service that takes a reference voice and text and answers
//! with the URL of the generated audio, which is then downloaded.

use super::AiBackend;
use crate::config::AiConfig;
use crate::error::AiError;
use crate::media::AudioClip;
use crate::store::MemoryRecord;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::Duration;

/// Downloaded speech larger than this is rejected
const MAX_AUDIO_BYTES: u64 = 20 * 1024 * 1024;

/// Prior records included in a question prompt
const QUESTION_HISTORY: usize = 5;

const QUESTION_PROMPT: &str = "You are a friendly daily-interview companion on a small voice \
diary device. Ask ONE short, open, warm question (under 50 characters) that helps the user \
reflect on their day. Output only the question.";

const PERSONA_PROMPT: &str = "You are the user's digital twin. Answer as the user would, in \
their tone and style, drawing on their memories when relevant. Keep it to two or three \
spoken sentences.";

/// Remote backend over ureq
#[derive(Debug)]
pub struct RemoteBackend {
    endpoint: String,
    api_key: Option<String>,
    chat_model: String,
    transcription_model: String,
    language: String,
    synthesis_endpoint: String,
    synthesis_api_key: Option<String>,
    timeout: Duration,
}

impl RemoteBackend {
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        for (name, url) in [
            ("endpoint", &config.endpoint),
            ("synthesis_endpoint", &config.synthesis_endpoint),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AiError::Config(format!(
                    "{} must start with http:// or https://, got: {}",
                    name, url
                )));
            }
        }

        if config.endpoint.starts_with("http://")
            && !config.endpoint.contains("localhost")
            && !config.endpoint.contains("127.0.0.1")
        {
            tracing::warn!("AI endpoint uses HTTP without TLS. Audio will be sent unencrypted!");
        }

        if config.api_key.is_none() {
            tracing::warn!("No AI api_key configured; remote calls will likely be rejected");
        }

        tracing::info!(
            "Configured remote AI: endpoint={}, chat_model={}, timeout={}s",
            config.endpoint,
            config.chat_model,
            config.timeout_secs
        );

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            transcription_model: config.transcription_model.clone(),
            language: config.language.clone(),
            synthesis_endpoint: config.synthesis_endpoint.clone(),
            synthesis_api_key: config.synthesis_api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new().timeout(self.timeout).build()
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match self.api_key {
            Some(ref key) => request.set("Authorization", &format!("Bearer {}", key)),
            None => request,
        }
    }

    /// Build the multipart form body for a transcription request
    fn build_multipart_body(&self, wav_data: &[u8]) -> (String, Vec<u8>) {
        let boundary = format!(
            "----EchoMemoBoundary{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );

        let mut body = Vec::new();
        let mut field = |name: &str, value: &[u8]| {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            );
            body.extend_from_slice(value);
            body.extend_from_slice(b"\r\n");
        };

        field("model", self.transcription_model.as_bytes());
        if !self.language.is_empty() && self.language != "auto" {
            field("language", self.language.as_bytes());
        }
        field("response_format", b"json");

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"audio.wav\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
        body.extend_from_slice(wav_data);
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        (boundary, body)
    }

    /// One chat completion with a system and a user message
    fn chat(&self, system: &str, user: &str) -> Result<String, AiError> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: Option<String>,
        }

        let url = format!("{}/v1/chat/completions", self.endpoint);
        let body = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.8,
        };

        tracing::debug!("Calling chat completion: {} chars of prompt", user.len());

        let response = self
            .authorize(self.agent().post(&url))
            .send_json(&body)
            .map_err(map_ureq_error)?;

        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| AiError::Remote(format!("Failed to parse response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| AiError::Remote("Response has no choices".into()))
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, AiError> {
        let response = self.agent().get(url).call().map_err(map_ureq_error)?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_AUDIO_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| AiError::Network(format!("Download failed: {}", e)))?;
        Ok(bytes)
    }
}

/// Render records as a bullet list for prompts
fn memory_lines(memories: &[MemoryRecord]) -> String {
    memories
        .iter()
        .filter(|m| !m.transcript.trim().is_empty())
        .map(|m| format!("- [{}] {}", m.date, m.summary()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn question_prompt(history: &[MemoryRecord], language: &str) -> String {
    let lines = memory_lines(&history[..history.len().min(QUESTION_HISTORY)]);
    let mut prompt = if lines.is_empty() {
        "Ask a friendly, open question to help me start today's entry.".to_string()
    } else {
        format!(
            "My recent memories:\n{}\n\nAsk a new question that helps me reflect further or share more.",
            lines
        )
    };
    if !language.is_empty() && language != "auto" {
        prompt.push_str(&format!("\nAnswer in language '{}'.", language));
    }
    prompt
}

fn reply_prompt(transcript: &str, memories: &[MemoryRecord], language: &str) -> String {
    let lines = memory_lines(memories);
    let mut prompt = if lines.is_empty() {
        format!("I said: {}", transcript)
    } else {
        format!(
            "Some of my past memories:\n{}\n\nI said: {}",
            lines, transcript
        )
    };
    if !language.is_empty() && language != "auto" {
        prompt.push_str(&format!("\nAnswer in language '{}'.", language));
    }
    prompt
}

fn map_ureq_error(e: ureq::Error) -> AiError {
    match e {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            AiError::Remote(format!("Server returned {}: {}", code, body))
        }
        ureq::Error::Transport(t) => AiError::Network(format!("Request failed: {}", t)),
    }
}

impl AiBackend for RemoteBackend {
    fn transcribe(&self, clip: &AudioClip) -> Result<String, AiError> {
        let start = std::time::Instant::now();
        let wav_data = clip
            .to_wav_bytes()
            .map_err(|e| AiError::TranscriptionFailed(e.to_string()))?;
        let (boundary, body) = self.build_multipart_body(&wav_data);

        let url = format!("{}/v1/audio/transcriptions", self.endpoint);
        let request = self.authorize(self.agent().post(&url)).set(
            "Content-Type",
            &format!("multipart/form-data; boundary={}", boundary),
        );

        let response = request.send_bytes(&body).map_err(map_ureq_error)?;
        let json: serde_json::Value = response
            .into_json()
            .map_err(|e| AiError::Remote(format!("Failed to parse response: {}", e)))?;

        let text = json
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AiError::TranscriptionFailed(format!("Response missing 'text' field: {}", json))
            })?
            .trim()
            .to_string();

        tracing::info!(
            "Transcription completed in {:.2}s: {:?}",
            start.elapsed().as_secs_f32(),
            if text.chars().count() > 50 {
                format!("{}...", text.chars().take(50).collect::<String>())
            } else {
                text.clone()
            }
        );

        Ok(text)
    }

    fn generate_question(&self, history: &[MemoryRecord]) -> Result<String, AiError> {
        self.chat(QUESTION_PROMPT, &question_prompt(history, &self.language))
    }

    fn generate_reply(&self, transcript: &str, memories: &[MemoryRecord]) -> Result<String, AiError> {
        self.chat(
            PERSONA_PROMPT,
            &reply_prompt(transcript, memories, &self.language),
        )
    }

    fn synthesize(&self, text: &str, voice: &str) -> Result<AudioClip, AiError> {
        #[derive(Deserialize)]
        struct CloneResponse {
            success: Option<bool>,
            audio_url: Option<String>,
            url: Option<String>,
            message: Option<String>,
        }

        let api_key = self.synthesis_api_key.as_deref().unwrap_or_default();
        let response = self
            .agent()
            .post(&self.synthesis_endpoint)
            .send_form(&[
                ("audio_url", voice),
                ("text", text),
                ("api_key", api_key),
                // 2 = answer with a URL rather than inline audio
                ("type", "2"),
                ("speed_ratio", "1.0"),
                ("pitch_ratio", "1.0"),
                ("volume_ratio", "1.0"),
            ])
            .map_err(map_ureq_error)?;

        let parsed: CloneResponse = response
            .into_json()
            .map_err(|e| AiError::SynthesisFailed(format!("Failed to parse response: {}", e)))?;

        let url = match (parsed.audio_url.or(parsed.url), parsed.success) {
            (Some(url), Some(true) | None) => url,
            (_, _) => {
                return Err(AiError::SynthesisFailed(
                    parsed
                        .message
                        .unwrap_or_else(|| "voice clone service returned no audio".into()),
                ))
            }
        };

        tracing::debug!("Downloading synthesized speech from {}", url);
        let bytes = self.download(&url)?;
        if bytes.is_empty() {
            return Err(AiError::SynthesisFailed("downloaded audio is empty".into()));
        }
        Ok(AudioClip::Encoded(bytes))
    }
}
