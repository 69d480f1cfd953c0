//! Tests for the AivisSpeech HTTP client against a local fake engine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeAivisSpeech, DEFAULT_SPEAKER};

use tts_relay::{
    AivisSpeechEngine, AudioEncoder, AudioFormat, EngineConfig, MetaRecorder, ParameterOverrides,
    ResolvedParameters, SentenceUnit, SynthesisEngine, SynthesisPipeline, SynthesisRequest,
    TtsError,
};

#[tokio::test]
async fn test_synthesize_sends_parameters() {
    let fake = FakeAivisSpeech::start(44100, 4410).await;
    let engine = AivisSpeechEngine::new(EngineConfig::new(fake.url())).unwrap();
    let params = ResolvedParameters {
        volume: 0.8,
        pitch: 0.05,
        speed: 1.2,
        speaker: "1234".to_string(),
    };

    let segment = engine.synthesize("こんにちは。", &params).await.unwrap();
    assert_eq!(segment.format.sample_rate, 44100);
    assert_eq!(segment.format.channels, 1);
    assert_eq!(segment.format.sample_width, 2);
    assert_eq!(segment.num_frames(), 4410);
    assert!((segment.duration_secs - 0.1).abs() < 1e-9);

    let log = fake.log.lock().unwrap();
    assert_eq!(
        log.audio_queries,
        vec![("こんにちは。".to_string(), "1234".to_string())]
    );
    let (speaker, body) = &log.synthesis_bodies[0];
    assert_eq!(speaker, "1234");
    assert_eq!(body["volumeScale"], 0.8);
    assert_eq!(body["pitchScale"], 0.05);
    assert_eq!(body["speedScale"], 1.2);
    assert_eq!(body["prePhonemeLength"], 0.0);
    assert_eq!(body["postPhonemeLength"], 0.0);
    // Untouched fields are passed back as received
    assert_eq!(body["intonationScale"], 1.0);
    assert_eq!(body["kana"], "こんにちは。");
}

#[tokio::test]
async fn test_health_check() {
    let fake = FakeAivisSpeech::start(24000, 100).await;
    let engine = AivisSpeechEngine::new(EngineConfig::new(fake.url())).unwrap();
    assert!(engine.health_check().await.is_ok());
    assert!(engine.info().endpoint.contains(&fake.addr.to_string()));
}

#[tokio::test]
async fn test_engine_error_status() {
    let fake = FakeAivisSpeech::start(24000, 100).await;
    let engine = AivisSpeechEngine::new(EngineConfig::new(fake.url())).unwrap();

    // The fake rejects empty text with 422
    let err = engine
        .synthesize("", &ResolvedParameters::with_speaker(DEFAULT_SPEAKER))
        .await
        .unwrap_err();
    assert!(matches!(err, TtsError::EngineError { .. }), "{err}");
}

#[tokio::test]
async fn test_unreachable_engine() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let engine = AivisSpeechEngine::new(
        EngineConfig::new(format!("http://{addr}")).with_timeout(Duration::from_secs(2)),
    )
    .unwrap();
    let err = engine
        .synthesize("あ。", &ResolvedParameters::with_speaker(DEFAULT_SPEAKER))
        .await
        .unwrap_err();
    assert!(matches!(err, TtsError::EngineUnavailable { .. }), "{err}");
}

#[tokio::test]
async fn test_pipeline_against_fake_engine() {
    let fake = FakeAivisSpeech::start(24000, 2400).await;
    let engine = Arc::new(AivisSpeechEngine::new(EngineConfig::new(fake.url())).unwrap());
    let pipeline = SynthesisPipeline::new(
        engine,
        MetaRecorder::in_memory(),
        AudioEncoder::default(),
        ResolvedParameters::with_speaker(DEFAULT_SPEAKER),
    );

    let request = SynthesisRequest::new(vec![
        SentenceUnit::new("一。").with_overrides(ParameterOverrides::default().with_speaker("7")),
        SentenceUnit::new("二。").with_overrides(ParameterOverrides::default().with_volume(0.0)),
    ])
    .with_format(AudioFormat::Wav)
    .with_silence_duration(0.2);
    let output = pipeline.run(request).await.unwrap();

    assert_eq!(output.assembled.num_frames(), 2 * 2400 + 4800);
    assert!((output.assembled.timings[1].start_second - 0.3).abs() < 1e-9);

    let log = fake.log.lock().unwrap();
    assert_eq!(log.synthesis_bodies.len(), 2);
    assert_eq!(log.synthesis_bodies[1].0, "7");
    assert_eq!(log.synthesis_bodies[1].1["volumeScale"], 0.0);
}
