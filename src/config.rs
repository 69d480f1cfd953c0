//! Configuration and CLI for the TTS relay

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::assembler::MAX_SILENCE_DURATION;
use crate::encoder::{AudioFormat, Mp3Settings};
use crate::engine::EngineConfig;
use crate::params::ResolvedParameters;
use crate::pipeline::DEFAULT_SILENCE_DURATION;

/// Command line arguments with subcommands
#[derive(Parser, Debug, Clone)]
#[command(name = "tts-relay")]
#[command(about = "Multi-sentence speech synthesis relay for AivisSpeech")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Used for serve when no subcommand is given
    #[command(flatten)]
    pub serve: ServeArgs,
}

impl Cli {
    /// The command to run; `serve` when none was given.
    pub fn into_command(self) -> Commands {
        self.command.unwrap_or(Commands::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Print how text would be split into sentences
    Split(SplitArgs),
    /// Synthesize text through the engine and write the audio to a file
    Synthesize(SynthesizeArgs),
}

/// Where to reach the engine and which voice to use by default
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Base URL of the AivisSpeech engine
    #[arg(long, env = "AIVIS_SPEECH_ENGINE_URL", default_value = "http://localhost:10101")]
    pub engine_url: String,

    /// Default speaker (style) id
    #[arg(long, env = "AIVIS_SPEECH_ENGINE_SPEAKER_ID", default_value = "888753760")]
    pub speaker: String,

    /// Timeout for a single engine request, in seconds
    #[arg(long, default_value_t = 60)]
    pub engine_timeout_secs: u64,
}

impl EngineArgs {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.engine_url)
            .with_timeout(Duration::from_secs(self.engine_timeout_secs.max(1)))
    }

    /// Parameters used where a request leaves them out
    pub fn defaults(&self) -> ResolvedParameters {
        ResolvedParameters::with_speaker(self.speaker.clone())
    }
}

#[derive(Args, Debug, Clone)]
pub struct Mp3Args {
    /// MP3 bitrate in kbps
    #[arg(long, default_value_t = 64)]
    pub mp3_bitrate: u32,

    /// LAME quality, 0 (best) to 9 (fastest)
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u8).range(0..=9))]
    pub mp3_quality: u8,
}

impl Mp3Args {
    pub fn settings(&self) -> Mp3Settings {
        Mp3Settings {
            bitrate_kbps: self.mp3_bitrate,
            quality: self.mp3_quality,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "APP_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Path prefix for every route
    #[arg(long, env = "CONTEXT_PATH", default_value = "/")]
    pub context_path: String,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Default gap between sentences, in seconds
    #[arg(long, default_value_t = DEFAULT_SILENCE_DURATION)]
    pub silence_duration: f64,

    /// Directory for meta info records; kept in memory when unset
    #[arg(long)]
    pub meta_dir: Option<PathBuf>,

    /// Maximum synthesis runs in flight
    #[arg(long, default_value_t = 4)]
    pub tts_inflight: usize,

    #[command(flatten)]
    pub mp3: Mp3Args,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log: String,
}

impl ServeArgs {
    /// Reject settings that would make every request fail.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=MAX_SILENCE_DURATION).contains(&self.silence_duration) {
            return Err(format!(
                "--silence-duration must be between 0 and {MAX_SILENCE_DURATION} seconds, got {}",
                self.silence_duration
            ));
        }
        if self.mp3.mp3_bitrate == 0 {
            return Err("--mp3-bitrate must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct SplitArgs {
    /// Text to split
    #[arg(short, long, group = "input")]
    pub text: Option<String>,

    /// File containing the text to split
    #[arg(short, long, group = "input")]
    pub file: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SynthesizeArgs {
    /// Text to synthesize
    #[arg(short, long, group = "input")]
    pub text: Option<String>,

    /// File containing the text to synthesize
    #[arg(short, long, group = "input")]
    pub file: Option<PathBuf>,

    /// Output file
    #[arg(short, long, default_value = "output.mp3")]
    pub output: PathBuf,

    /// Output format (wav, mp3); taken from the output extension when unset
    #[arg(long)]
    pub format: Option<AudioFormat>,

    /// Volume of the first sentence
    #[arg(long)]
    pub volume: Option<f64>,

    /// Pitch of the first sentence
    #[arg(long)]
    pub pitch: Option<f64>,

    /// Speed of the first sentence
    #[arg(long)]
    pub speed: Option<f64>,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Gap between sentences, in seconds
    #[arg(long, default_value_t = DEFAULT_SILENCE_DURATION)]
    pub silence_duration: f64,

    #[command(flatten)]
    pub mp3: Mp3Args,

    /// Print verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl SynthesizeArgs {
    /// Requested format, falling back to the output file extension.
    pub fn output_format(&self) -> AudioFormat {
        self.format.unwrap_or_else(|| {
            self.output
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(|ext| ext.parse().ok())
                .unwrap_or_default()
        })
    }
}

/// Initialize tracing with given log level
pub fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Load environment variables from .env file
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
