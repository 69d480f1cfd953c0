//! Shared helpers for integration/e2e tests.
//!
//! Provides WAV fixtures, a scripted in-process engine and a fake AivisSpeech
//! HTTP server, so no real engine is needed.

#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;

use tts_relay::{
    AudioEncoder, AudioSegment, EngineInfo, MetaRecorder, ResolvedParameters, SampleFormat,
    SynthesisEngine, SynthesisPipeline, TtsError,
};

pub const DEFAULT_SPEAKER: &str = "888753760";

pub fn mono16(sample_rate: u32) -> SampleFormat {
    SampleFormat::new(sample_rate, 1, 2)
}

/// 16-bit WAV of `frames` frames holding a ramp, so the PCM is not silent.
pub fn wav_fixture(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for i in 0..frames * channels as usize {
            writer.write_sample(((i % 200) as i16 - 100) * 50).unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes
}

// =============================================================================
// Scripted engine
// =============================================================================

/// One call received by [`ScriptedEngine`].
#[derive(Clone, Debug)]
pub struct EngineCall {
    pub text: String,
    pub params: ResolvedParameters,
}

/// In-process engine returning `frames_per_call` frames per sentence.
///
/// Can be told to fail at a given call or to answer a given call in another
/// sample format.
pub struct ScriptedEngine {
    pub format: SampleFormat,
    pub frames_per_call: usize,
    pub fail_at: Option<usize>,
    pub odd_format_at: Option<(usize, SampleFormat)>,
    calls: Mutex<Vec<EngineCall>>,
}

impl ScriptedEngine {
    pub fn new(format: SampleFormat, frames_per_call: usize) -> Self {
        Self {
            format,
            frames_per_call,
            fail_at: None,
            odd_format_at: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn with_format_at(mut self, index: usize, format: SampleFormat) -> Self {
        self.odd_format_at = Some((index, format));
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Duration of one returned segment in seconds
    pub fn segment_secs(&self) -> f64 {
        self.frames_per_call as f64 / self.format.sample_rate as f64
    }
}

#[async_trait]
impl SynthesisEngine for ScriptedEngine {
    async fn synthesize(
        &self,
        text: &str,
        params: &ResolvedParameters,
    ) -> Result<AudioSegment, TtsError> {
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push(EngineCall {
            text: text.to_string(),
            params: params.clone(),
        });

        if self.fail_at == Some(index) {
            return Err(TtsError::EngineUnavailable {
                index: 0,
                message: "connection refused".to_string(),
            });
        }
        let format = match self.odd_format_at {
            Some((i, format)) if i == index => format,
            _ => self.format,
        };
        Ok(AudioSegment::new(
            vec![7u8; self.frames_per_call * format.frame_size()],
            format,
        ))
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: "scripted".to_string(),
            endpoint: "memory".to_string(),
        }
    }

    async fn health_check(&self) -> Result<(), TtsError> {
        Ok(())
    }
}

pub fn pipeline_with(engine: Arc<ScriptedEngine>) -> SynthesisPipeline {
    SynthesisPipeline::new(
        engine,
        MetaRecorder::in_memory(),
        AudioEncoder::default(),
        ResolvedParameters::with_speaker(DEFAULT_SPEAKER),
    )
}

// =============================================================================
// Fake AivisSpeech server
// =============================================================================

#[derive(Deserialize)]
struct AudioQueryParams {
    text: String,
    speaker: String,
}

#[derive(Deserialize)]
struct SynthesisParams {
    speaker: String,
}

/// Requests received by [`FakeAivisSpeech`].
#[derive(Default)]
pub struct FakeLog {
    pub audio_queries: Vec<(String, String)>,
    pub synthesis_bodies: Vec<(String, Value)>,
}

#[derive(Clone)]
struct FakeState {
    log: Arc<Mutex<FakeLog>>,
    sample_rate: u32,
    frames: usize,
}

/// Minimal AivisSpeech lookalike on an ephemeral local port.
pub struct FakeAivisSpeech {
    pub addr: SocketAddr,
    pub log: Arc<Mutex<FakeLog>>,
}

impl FakeAivisSpeech {
    /// Start a fake engine answering every synthesis with `frames` frames
    /// of 16-bit mono audio at `sample_rate`.
    pub async fn start(sample_rate: u32, frames: usize) -> Self {
        let log = Arc::new(Mutex::new(FakeLog::default()));
        let state = FakeState {
            log: log.clone(),
            sample_rate,
            frames,
        };
        let app = Router::new()
            .route("/version", get(|| async { Json("1.0.0") }))
            .route("/audio_query", post(fake_audio_query))
            .route("/synthesis", post(fake_synthesis))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, log }
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

async fn fake_audio_query(
    State(state): State<FakeState>,
    Query(params): Query<AudioQueryParams>,
) -> Result<Json<Value>, StatusCode> {
    if params.text.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    state
        .log
        .lock()
        .unwrap()
        .audio_queries
        .push((params.text.clone(), params.speaker));

    Ok(Json(serde_json::json!({
        "accent_phrases": [],
        "speedScale": 1.0,
        "intonationScale": 1.0,
        "tempoDynamicsScale": 1.0,
        "pitchScale": 0.0,
        "volumeScale": 1.0,
        "prePhonemeLength": 0.1,
        "postPhonemeLength": 0.1,
        "pauseLength": null,
        "pauseLengthScale": 1.0,
        "outputSamplingRate": state.sample_rate,
        "outputStereo": false,
        "kana": params.text,
    })))
}

async fn fake_synthesis(
    State(state): State<FakeState>,
    Query(params): Query<SynthesisParams>,
    Json(body): Json<Value>,
) -> Vec<u8> {
    state
        .log
        .lock()
        .unwrap()
        .synthesis_bodies
        .push((params.speaker, body));
    wav_fixture(state.sample_rate, 1, state.frames)
}
