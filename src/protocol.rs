//! HTTP wire types for the relay service
//!
//! Request bodies, query strings and JSON responses exchanged with clients.

use serde::{Deserialize, Serialize};

use crate::encoder::AudioFormat;
use crate::params::{ParameterOverrides, SentenceUnit};

/// Response header carrying the meta info key of a synthesis
pub const META_KEY_HEADER: &str = "x-meta-key";

/// Body of `POST /v1/synthesis`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisRequestBody {
    /// Output container, mp3 when omitted
    #[serde(default)]
    pub format: AudioFormat,
    /// Gap between sentences in seconds; the server default when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silence_duration: Option<f64>,
    /// Sentences to synthesize, in order
    pub sentences: Vec<SentenceUnit>,
}

/// Text spoken by `GET /synthesis` when the query has none
pub const DEFAULT_SPEECH_TEXT: &str = "吾輩は猫である。名前はまだ無い";

fn default_speech_text() -> String {
    DEFAULT_SPEECH_TEXT.to_string()
}

/// Query string of `GET /synthesis`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeechQuery {
    #[serde(default = "default_speech_text")]
    pub text: String,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub pitch: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub format: AudioFormat,
}

impl Default for SpeechQuery {
    fn default() -> Self {
        Self {
            text: default_speech_text(),
            volume: None,
            pitch: None,
            speed: None,
            speaker: None,
            format: AudioFormat::default(),
        }
    }
}

impl SpeechQuery {
    /// Parameters of the first sentence; later sentences inherit them.
    pub fn overrides(&self) -> ParameterOverrides {
        ParameterOverrides {
            volume: self.volume,
            pitch: self.pitch,
            speed: self.speed,
            speaker: self.speaker.clone(),
        }
    }
}

/// Query string of the sentence split endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitQuery {
    pub text: String,
}

/// Response of the sentence split endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitResponse {
    pub sentences: Vec<String>,
}

/// JSON body of every error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
