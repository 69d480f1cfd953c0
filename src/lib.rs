pub mod assembler;
pub mod cli_style;
pub mod config;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod meta;
pub mod params;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod splitter;

pub use assembler::{assemble, AssembledAudio, SegmentTiming, MAX_SILENCE_DURATION};
pub use config::{Cli, Commands, ServeArgs, SplitArgs, SynthesizeArgs};
pub use encoder::{AudioEncoder, AudioFormat, EncodedAudio, Mp3Settings};
pub use engine::{AivisSpeechEngine, AudioSegment, EngineConfig, EngineInfo, SampleFormat, SynthesisEngine};
pub use error::TtsError;
pub use meta::{FileMetaStore, MemoryMetaStore, MetaRecorder, MetaStore, SynthesisMetaInfo, TimingRecord};
pub use params::{resolve, ParameterOverrides, ResolvedParameters, SentenceUnit};
pub use pipeline::{SynthesisOutput, SynthesisPipeline, SynthesisRequest};
pub use server::AppState;
pub use splitter::{split_sentences, SentenceSplitter, SplitterConfig};
