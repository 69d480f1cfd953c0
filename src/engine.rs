//! Synthesis engine client
//!
//! The engine is an external AivisSpeech (VOICEVOX-compatible) HTTP service.
//! One sentence is synthesized per call: the engine first builds an audio
//! query for the text, the query's scale fields are overwritten with the
//! resolved parameters, and the query is sent back for synthesis, which
//! returns a WAV file.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::encoder::decode_wav;
use crate::error::TtsError;
use crate::params::ResolvedParameters;

// =============================================================================
// Audio Types
// =============================================================================

/// Shape of the PCM frames shared by every segment of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bytes per sample
    pub sample_width: u16,
}

impl SampleFormat {
    pub fn new(sample_rate: u32, channels: u16, sample_width: u16) -> Self {
        Self {
            sample_rate,
            channels,
            sample_width,
        }
    }

    /// Bytes per frame (one sample for every channel)
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.sample_width as usize
    }

    /// Duration in seconds of `frames` frames
    pub fn frames_to_secs(&self, frames: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}bit",
            self.sample_rate,
            self.channels,
            self.sample_width * 8
        )
    }
}

/// PCM audio for one sentence.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioSegment {
    /// Raw little-endian PCM frames
    pub pcm: Vec<u8>,
    pub format: SampleFormat,
    /// Duration of `pcm` in seconds
    pub duration_secs: f64,
}

impl AudioSegment {
    pub fn new(pcm: Vec<u8>, format: SampleFormat) -> Self {
        let frames = if format.frame_size() == 0 {
            0
        } else {
            pcm.len() / format.frame_size()
        };
        let duration_secs = format.frames_to_secs(frames);
        Self {
            pcm,
            format,
            duration_secs,
        }
    }

    /// Parse a WAV file returned by the engine.
    pub fn from_wav(bytes: &[u8]) -> Result<Self, TtsError> {
        let (format, pcm) = decode_wav(bytes)?;
        Ok(Self::new(pcm, format))
    }

    pub fn num_frames(&self) -> usize {
        match self.format.frame_size() {
            0 => 0,
            size => self.pcm.len() / size,
        }
    }
}

// =============================================================================
// Engine Trait
// =============================================================================

/// A service that turns one sentence into PCM audio.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Synthesize `text` with the given parameters.
    ///
    /// Implementations must not pad the audio with leading or trailing
    /// silence; gaps between sentences are inserted by the assembler.
    async fn synthesize(
        &self,
        text: &str,
        params: &ResolvedParameters,
    ) -> Result<AudioSegment, TtsError>;

    /// Get engine information
    fn info(&self) -> EngineInfo;

    /// Check if the engine is reachable
    async fn health_check(&self) -> Result<(), TtsError>;
}

/// Engine information
#[derive(Clone, Debug)]
pub struct EngineInfo {
    pub name: String,
    pub endpoint: String,
}

// =============================================================================
// AivisSpeech Engine
// =============================================================================

/// Configuration for the AivisSpeech engine client
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Base URL of the engine, without a trailing slash
    pub base_url: String,
    /// Upper bound for a single engine request
    pub timeout: Duration,
}

impl EngineConfig {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:10101".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// HTTP client for an AivisSpeech engine.
pub struct AivisSpeechEngine {
    client: reqwest::Client,
    config: EngineConfig,
}

impl AivisSpeechEngine {
    pub fn new(config: EngineConfig) -> Result<Self, TtsError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TtsError::Io(format!("failed to build HTTP client: {e}")))?;

        info!(endpoint = %config.base_url, timeout = ?config.timeout, "engine client ready");
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn audio_query(&self, text: &str, speaker: &str) -> Result<Value, TtsError> {
        let url = format!("{}/audio_query", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("text", text), ("speaker", speaker)])
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response, "audio_query").await?;

        response.json::<Value>().await.map_err(|e| TtsError::EngineError {
            index: 0,
            message: format!("invalid audio_query response: {e}"),
        })
    }

    async fn synthesis(&self, query: &Value, speaker: &str) -> Result<Vec<u8>, TtsError> {
        let url = format!("{}/synthesis", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("speaker", speaker)])
            .json(query)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response, "synthesis").await?;

        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }
}

/// Overwrite the tunable fields of an engine audio query.
///
/// Pre/post phoneme lengths are zeroed so the engine adds no silence of its
/// own. Every other field is passed back untouched.
pub fn apply_parameters(query: &mut Value, params: &ResolvedParameters) -> Result<(), TtsError> {
    let fields = query.as_object_mut().ok_or_else(|| TtsError::EngineError {
        index: 0,
        message: "audio_query response is not a JSON object".to_string(),
    })?;

    fields.insert("volumeScale".to_string(), Value::from(params.volume));
    fields.insert("pitchScale".to_string(), Value::from(params.pitch));
    fields.insert("speedScale".to_string(), Value::from(params.speed));
    fields.insert("prePhonemeLength".to_string(), Value::from(0.0));
    fields.insert("postPhonemeLength".to_string(), Value::from(0.0));
    Ok(())
}

fn request_error(err: reqwest::Error) -> TtsError {
    if err.is_connect() || err.is_timeout() {
        TtsError::EngineUnavailable {
            index: 0,
            message: err.to_string(),
        }
    } else {
        TtsError::EngineError {
            index: 0,
            message: err.to_string(),
        }
    }
}

async fn check_status(
    response: reqwest::Response,
    endpoint: &str,
) -> Result<reqwest::Response, TtsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TtsError::EngineError {
        index: 0,
        message: format!("{endpoint} returned {status}: {body}"),
    })
}

#[async_trait]
impl SynthesisEngine for AivisSpeechEngine {
    #[instrument(skip(self, params), fields(text_len = text.len(), speaker = %params.speaker))]
    async fn synthesize(
        &self,
        text: &str,
        params: &ResolvedParameters,
    ) -> Result<AudioSegment, TtsError> {
        let start_time = Instant::now();

        let mut query = self.audio_query(text, &params.speaker).await?;
        apply_parameters(&mut query, params)?;

        let wav = self.synthesis(&query, &params.speaker).await?;
        info!("TTS complete. wav size: {:.1}KB", wav.len() as f64 / 1024.0);

        let segment = AudioSegment::from_wav(&wav).map_err(|e| TtsError::EngineError {
            index: 0,
            message: format!("invalid synthesis response: {e}"),
        })?;

        debug!(
            format = %segment.format,
            duration = segment.duration_secs,
            elapsed = ?start_time.elapsed(),
            "segment decoded"
        );
        Ok(segment)
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: "AivisSpeech".to_string(),
            endpoint: self.config.base_url.clone(),
        }
    }

    async fn health_check(&self) -> Result<(), TtsError> {
        let url = format!("{}/version", self.config.base_url);
        let response = self.client.get(&url).send().await.map_err(request_error)?;
        check_status(response, "version").await?;
        Ok(())
    }
}
