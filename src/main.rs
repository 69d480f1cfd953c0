//! TTS relay - unified CLI tool
//!
//! A single binary providing:
//! - `serve` - Run the HTTP server (default)
//! - `split` - Show how text is split into sentences
//! - `synthesize` - Synthesize text through the engine into a file
//!
//! Usage:
//!   tts-relay serve --port 8000
//!   tts-relay split --text "こんにちは。いい天気ですね！"
//!   tts-relay synthesize --text "こんにちは。" --output hello.mp3

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use tts_relay::{
    cli_style::{print_banner, print_box_kv, print_error, print_info, print_section, print_success},
    config::{init_tracing, load_dotenv, Cli, Commands, ServeArgs, SplitArgs, SynthesizeArgs},
    encoder::AudioEncoder,
    engine::{AivisSpeechEngine, SynthesisEngine},
    meta::{FileMetaStore, MemoryMetaStore, MetaRecorder, MetaStore},
    params::ParameterOverrides,
    pipeline::{SynthesisPipeline, SynthesisRequest},
    server::{self, AppState},
    splitter::split_sentences,
};

/// Main entry point with subcommand dispatch
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    load_dotenv();

    match Cli::parse().into_command() {
        Commands::Serve(args) => run_server(args).await,
        Commands::Split(args) => run_split(args).await,
        Commands::Synthesize(args) => run_synthesize(args).await,
    }
}

/// Run the HTTP server
async fn run_server(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(&args.log);
    args.validate()?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting tts relay");

    let engine = Arc::new(AivisSpeechEngine::new(args.engine.engine_config())?);
    if let Err(e) = engine.health_check().await {
        // Not fatal: the engine may come up after the relay
        warn!(error = %e, "engine not reachable yet");
    }
    let engine_info = engine.info();

    let store: Arc<dyn MetaStore> = match &args.meta_dir {
        Some(dir) => Arc::new(FileMetaStore::open(dir).await?),
        None => Arc::new(MemoryMetaStore::new()),
    };

    let pipeline = SynthesisPipeline::new(
        engine,
        MetaRecorder::new(store),
        AudioEncoder::new(args.mp3.settings()),
        args.engine.defaults(),
    );
    let state = AppState::new(pipeline, args.tts_inflight)
        .with_silence_duration(args.silence_duration)
        .with_context_path(&args.context_path);

    // Bind TCP listener
    let addr = format!("{}:{}", args.host, args.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => {
            info!(address = %addr, "server bound to address");
            l
        }
        Err(e) => {
            error!(address = %addr, error = %e, "failed to bind to address");
            return Err(e.into());
        }
    };

    info!(
        engine = %engine_info.name,
        endpoint = %engine_info.endpoint,
        speaker = %args.engine.speaker,
        context_path = %state.context_path,
        tts_inflight = state.tts_inflight_limit,
        "server ready - accepting connections"
    );
    if let Err(e) = server::serve_with_shutdown(listener, state, shutdown_signal()).await {
        error!(error = %e, "server error");
        return Err(e);
    }

    info!("server exited cleanly");
    Ok(())
}

/// Print the sentence split of a text
async fn run_split(args: SplitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let text = read_input(args.text, args.file).await?;
    let sentences = split_sentences(&text);

    if args.json {
        let response = tts_relay::protocol::SplitResponse { sentences };
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    print_section(&format!("{} sentence(s)", sentences.len()));
    for (i, sentence) in sentences.iter().enumerate() {
        println!("  {:>3}  {}", i + 1, sentence);
    }
    Ok(())
}

/// Synthesize text through the engine and write the result to a file
async fn run_synthesize(args: SynthesizeArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(if args.verbose { "info" } else { "warn" });
    print_banner();

    let text = read_input(args.text.clone(), args.file.clone()).await?;
    let format = args.output_format();

    let mut config_items = vec![
        ("Engine", args.engine.engine_url.clone()),
        ("Speaker", args.engine.speaker.clone()),
        ("Format", format.to_string()),
        ("Silence", format!("{}s", args.silence_duration)),
        ("Output", args.output.display().to_string()),
    ];
    if let Some(speed) = args.speed {
        config_items.push(("Speed", speed.to_string()));
    }
    print_box_kv("Configuration", &config_items);

    let engine = Arc::new(AivisSpeechEngine::new(args.engine.engine_config())?);
    let pipeline = SynthesisPipeline::new(
        engine,
        MetaRecorder::in_memory(),
        AudioEncoder::new(args.mp3.settings()),
        args.engine.defaults(),
    );

    let overrides = ParameterOverrides {
        volume: args.volume,
        pitch: args.pitch,
        speed: args.speed,
        speaker: None,
    };
    let request = SynthesisRequest::from_text(&text, overrides)
        .with_format(format)
        .with_silence_duration(args.silence_duration);
    print_info(&format!("Synthesizing {} sentence(s)...", request.sentences.len()));

    let start = Instant::now();
    let output = match pipeline.run(request).await {
        Ok(output) => output,
        Err(e) => {
            print_error(&format!("Synthesis failed: {}", e));
            return Err(e.into());
        }
    };

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(&args.output, &output.audio.bytes).await?;

    for (timing, params) in output.assembled.timings.iter().zip(&output.resolved) {
        println!(
            "  {:>7.3}s - {:>7.3}s  speaker={} speed={}",
            timing.start_second, timing.end_second, params.speaker, params.speed
        );
    }
    print_success(&format!(
        "Wrote {:.2}s of audio ({:.1}KB) to {} in {:.2?}",
        output.assembled.duration_secs(),
        output.audio.bytes.len() as f64 / 1024.0,
        args.output.display(),
        start.elapsed()
    ));
    Ok(())
}

/// Text from `--text` or `--file`
async fn read_input(
    text: Option<String>,
    file: Option<PathBuf>,
) -> Result<String, Box<dyn std::error::Error>> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => Ok(tokio::fs::read_to_string(&path).await?),
        (None, None) => Err("either --text or --file is required".into()),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }
}
