//! Multi-sentence synthesis pipeline
//!
//! Resolves every sentence's parameters, synthesizes the sentences one after
//! another, joins the audio with silence gaps, encodes the result and
//! records the timing meta info. Sentences are never synthesized concurrently: the
//! parameters of each one depend on the ones before it.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::assembler::{assemble, validate_silence_duration, AssembledAudio};
use crate::encoder::{AudioEncoder, AudioFormat, EncodedAudio};
use crate::engine::{AudioSegment, SynthesisEngine};
use crate::error::TtsError;
use crate::meta::MetaRecorder;
use crate::params::{resolve_units, ParameterOverrides, ResolvedParameters, SentenceUnit};
use crate::splitter::split_sentences;

/// Default gap between sentences, in seconds
pub const DEFAULT_SILENCE_DURATION: f64 = 0.2;

/// One synthesis request
#[derive(Clone, Debug)]
pub struct SynthesisRequest {
    pub sentences: Vec<SentenceUnit>,
    pub format: AudioFormat,
    pub silence_duration: f64,
}

impl SynthesisRequest {
    pub fn new(sentences: Vec<SentenceUnit>) -> Self {
        Self {
            sentences,
            format: AudioFormat::default(),
            silence_duration: DEFAULT_SILENCE_DURATION,
        }
    }

    /// Build a request from raw text: the text is split into sentences and
    /// `overrides` apply to the first one, the rest inherit.
    pub fn from_text(text: &str, overrides: ParameterOverrides) -> Self {
        Self::from_sentences(split_sentences(text), overrides)
    }

    /// Same as [`SynthesisRequest::from_text`] for text that is already split.
    pub fn from_sentences(sentences: Vec<String>, overrides: ParameterOverrides) -> Self {
        let mut units: Vec<SentenceUnit> = sentences.into_iter().map(SentenceUnit::new).collect();
        if let Some(first) = units.first_mut() {
            first.overrides = overrides;
        }
        Self::new(units)
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_silence_duration(mut self, silence_duration: f64) -> Self {
        self.silence_duration = silence_duration;
        self
    }
}

/// Result of a pipeline run
#[derive(Clone, Debug)]
pub struct SynthesisOutput {
    pub audio: EncodedAudio,
    /// Key of the recorded meta info; `None` if recording failed
    pub meta_key: Option<String>,
    pub assembled: AssembledAudio,
    pub resolved: Vec<ResolvedParameters>,
}

/// The synthesis pipeline, shared by every request.
#[derive(Clone)]
pub struct SynthesisPipeline {
    engine: Arc<dyn SynthesisEngine>,
    recorder: MetaRecorder,
    encoder: AudioEncoder,
    defaults: ResolvedParameters,
}

impl SynthesisPipeline {
    pub fn new(
        engine: Arc<dyn SynthesisEngine>,
        recorder: MetaRecorder,
        encoder: AudioEncoder,
        defaults: ResolvedParameters,
    ) -> Self {
        Self {
            engine,
            recorder,
            encoder,
            defaults,
        }
    }

    pub fn defaults(&self) -> &ResolvedParameters {
        &self.defaults
    }

    pub fn recorder(&self) -> &MetaRecorder {
        &self.recorder
    }

    pub fn engine(&self) -> &Arc<dyn SynthesisEngine> {
        &self.engine
    }

    /// Run the whole pipeline for one request.
    #[instrument(skip(self, request), fields(sentences = request.sentences.len(), format = %request.format))]
    pub async fn run(&self, request: SynthesisRequest) -> Result<SynthesisOutput, TtsError> {
        let start_time = Instant::now();
        info!("- Request sentences={} format={}", request.sentences.len(), request.format);

        let (assembled, resolved) = self
            .synthesize_units(&request.sentences, request.silence_duration)
            .await?;

        let audio = self
            .encoder
            .encode(&assembled.pcm, &assembled.format, request.format)?;
        info!(
            "- {} encoded. size: {:.1}KB in {:?}",
            request.format,
            audio.bytes.len() as f64 / 1024.0,
            start_time.elapsed()
        );

        // Only audio the caller receives gets a meta record
        let meta_key = match self
            .recorder
            .record(
                assembled.silence_duration,
                resolved.iter().cloned().zip(assembled.timings.iter().copied()).collect(),
            )
            .await
        {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "failed to record meta info");
                None
            }
        };

        Ok(SynthesisOutput {
            audio,
            meta_key,
            assembled,
            resolved,
        })
    }

    /// Synthesize and assemble `units` without recording or encoding.
    pub async fn synthesize_units(
        &self,
        units: &[SentenceUnit],
        silence_duration: f64,
    ) -> Result<(AssembledAudio, Vec<ResolvedParameters>), TtsError> {
        if units.is_empty() {
            return Err(TtsError::EmptyInput);
        }
        if let Some(index) = units.iter().position(|u| u.text.trim().is_empty()) {
            return Err(TtsError::InvalidInput(format!("sentence {index} has no text")));
        }
        validate_silence_duration(silence_duration)?;

        let resolved = resolve_units(units, &self.defaults);
        let total = units.len();
        let mut segments: Vec<AudioSegment> = Vec::with_capacity(total);

        for (idx, (unit, params)) in units.iter().zip(&resolved).enumerate() {
            info!(
                "- [{} / {}] TTS text={:?} volume={} pitch={} speed={} speaker={}",
                idx + 1,
                total,
                unit.text,
                params.volume,
                params.pitch,
                params.speed,
                params.speaker
            );
            let segment = self
                .engine
                .synthesize(&unit.text, params)
                .await
                .map_err(|e| e.at_sentence(idx))?;
            segments.push(segment);
        }

        let assembled = assemble(&segments, silence_duration)?;
        Ok((assembled, resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineInfo, SampleFormat};
    use crate::meta::MemoryMetaStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Engine that returns 100 frames of audio per character and remembers
    /// what it was asked for.
    struct CountingEngine {
        calls: Mutex<Vec<(String, ResolvedParameters)>>,
        fail_at: Option<usize>,
        format: SampleFormat,
    }

    impl CountingEngine {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_at: None,
                format: SampleFormat::new(24000, 1, 2),
            }
        }
    }

    #[async_trait]
    impl SynthesisEngine for CountingEngine {
        async fn synthesize(
            &self,
            text: &str,
            params: &ResolvedParameters,
        ) -> Result<AudioSegment, TtsError> {
            let mut calls = self.calls.lock().unwrap();
            if self.fail_at == Some(calls.len()) {
                return Err(TtsError::EngineUnavailable {
                    index: 0,
                    message: "connection refused".to_string(),
                });
            }
            calls.push((text.to_string(), params.clone()));
            let frames = text.chars().count() * 100;
            Ok(AudioSegment::new(vec![1u8; frames * self.format.frame_size()], self.format))
        }

        fn info(&self) -> EngineInfo {
            EngineInfo {
                name: "counting".to_string(),
                endpoint: "memory".to_string(),
            }
        }

        async fn health_check(&self) -> Result<(), TtsError> {
            Ok(())
        }
    }

    fn pipeline(engine: Arc<CountingEngine>) -> SynthesisPipeline {
        SynthesisPipeline::new(
            engine,
            MetaRecorder::in_memory(),
            AudioEncoder::default(),
            ResolvedParameters::with_speaker("888753760"),
        )
    }

    #[test]
    fn test_request_from_text() {
        let req = SynthesisRequest::from_text(
            "一文目。二文目。",
            ParameterOverrides::default().with_volume(0.8),
        );
        assert_eq!(req.sentences.len(), 2);
        assert_eq!(req.sentences[0].overrides.volume, Some(0.8));
        assert_eq!(req.sentences[1].overrides, ParameterOverrides::default());
        assert_eq!(req.format, AudioFormat::Mp3);
        assert_eq!(req.silence_duration, DEFAULT_SILENCE_DURATION);
    }

    #[tokio::test]
    async fn test_sentences_are_synthesized_in_order() {
        let engine = Arc::new(CountingEngine::new());
        let pipeline = pipeline(engine.clone());
        let units = vec![
            SentenceUnit::new("あ。").with_overrides(ParameterOverrides::default().with_speed(1.5)),
            SentenceUnit::new("いい。"),
            SentenceUnit::new("ううう。").with_overrides(ParameterOverrides::default().with_pitch(0.0)),
        ];

        let (assembled, resolved) = pipeline.synthesize_units(&units, 0.2).await.unwrap();

        let calls = engine.calls.lock().unwrap();
        let texts: Vec<&str> = calls.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, vec!["あ。", "いい。", "ううう。"]);
        assert_eq!(calls[1].1.speed, 1.5);
        assert_eq!(resolved.len(), 3);
        assert_eq!(assembled.timings.len(), 3);
    }

    #[tokio::test]
    async fn test_engine_failure_reports_sentence_index() {
        let engine = Arc::new(CountingEngine {
            fail_at: Some(1),
            ..CountingEngine::new()
        });
        let pipeline = pipeline(engine);
        let units = vec![SentenceUnit::new("一。"), SentenceUnit::new("二。")];

        let err = pipeline.synthesize_units(&units, 0.2).await.unwrap_err();
        assert!(matches!(err, TtsError::EngineUnavailable { index: 1, .. }));
    }

    #[tokio::test]
    async fn test_rejects_empty_and_blank_input() {
        let pipeline = pipeline(Arc::new(CountingEngine::new()));
        assert_eq!(
            pipeline.synthesize_units(&[], 0.2).await.unwrap_err(),
            TtsError::EmptyInput
        );
        assert!(matches!(
            pipeline.synthesize_units(&[SentenceUnit::new("  ")], 0.2).await,
            Err(TtsError::InvalidInput(_))
        ));
        assert!(matches!(
            pipeline.synthesize_units(&[SentenceUnit::new("あ。")], -1.0).await,
            Err(TtsError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_silence_rejected_before_engine() {
        let engine = Arc::new(CountingEngine::new());
        let pipeline = pipeline(engine.clone());
        let units = vec![SentenceUnit::new("一。"), SentenceUnit::new("二。")];

        let err = pipeline.synthesize_units(&units, 1.0e7).await.unwrap_err();
        assert!(matches!(err, TtsError::InvalidInput(_)));
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_encode_failure_leaves_no_meta_record() {
        let engine = Arc::new(CountingEngine {
            format: SampleFormat::new(24000, 1, 1),
            ..CountingEngine::new()
        });
        let store = Arc::new(MemoryMetaStore::new());
        let pipeline = SynthesisPipeline::new(
            engine,
            MetaRecorder::new(store.clone()),
            AudioEncoder::default(),
            ResolvedParameters::with_speaker("888753760"),
        );
        // 8-bit PCM cannot be encoded as mp3
        let request = SynthesisRequest::new(vec![SentenceUnit::new("あ。")]).with_format(AudioFormat::Mp3);

        let err = pipeline.run(request).await.unwrap_err();
        assert!(matches!(err, TtsError::Encode(_)));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_run_records_meta_info() {
        let pipeline = pipeline(Arc::new(CountingEngine::new()));
        let request = SynthesisRequest::new(vec![SentenceUnit::new("あ。"), SentenceUnit::new("い。")])
            .with_format(AudioFormat::Wav)
            .with_silence_duration(0.5);

        let output = pipeline.run(request).await.unwrap();
        assert_eq!(output.audio.format, AudioFormat::Wav);

        let key = output.meta_key.expect("meta key");
        let info = pipeline.recorder().retrieve(&key).await.unwrap();
        assert_eq!(info.silence_duration, 0.5);
        assert_eq!(info.segments.len(), 2);
        assert_eq!(info.segments[1].start_second, output.assembled.timings[1].start_second);
    }
}
