//! Per-sentence synthesis parameters and the inheritance rule between them.
//!
//! Every sentence may override any of `volume`, `pitch`, `speed` and
//! `speaker`. A field left out inherits the value the previous sentence was
//! synthesized with; the first sentence inherits from the service defaults.
//! Fields resolve independently, and an explicit `0.0` is an override like
//! any other value.

use serde::{Deserialize, Serialize};

/// Fully specified parameters for one engine call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParameters {
    /// Volume scale (engine `volumeScale`)
    pub volume: f64,
    /// Pitch offset (engine `pitchScale`)
    pub pitch: f64,
    /// Speaking speed multiplier (engine `speedScale`)
    pub speed: f64,
    /// Engine speaker/style identifier
    pub speaker: String,
}

impl ResolvedParameters {
    pub const DEFAULT_VOLUME: f64 = 0.5;
    pub const DEFAULT_PITCH: f64 = 0.0;
    pub const DEFAULT_SPEED: f64 = 1.0;

    /// Service defaults for the given speaker.
    pub fn with_speaker(speaker: impl Into<String>) -> Self {
        Self {
            volume: Self::DEFAULT_VOLUME,
            pitch: Self::DEFAULT_PITCH,
            speed: Self::DEFAULT_SPEED,
            speaker: speaker.into(),
        }
    }

    /// Apply one sentence's overrides on top of these values.
    pub fn apply(&self, overrides: &ParameterOverrides) -> Self {
        Self {
            volume: overrides.volume.unwrap_or(self.volume),
            pitch: overrides.pitch.unwrap_or(self.pitch),
            speed: overrides.speed.unwrap_or(self.speed),
            speaker: overrides
                .speaker
                .clone()
                .unwrap_or_else(|| self.speaker.clone()),
        }
    }
}

/// Optional per-sentence overrides; `None` means "inherit".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl ParameterOverrides {
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }
}

/// One unit of text submitted to the engine as a single call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SentenceUnit {
    pub text: String,
    #[serde(flatten)]
    pub overrides: ParameterOverrides,
}

impl SentenceUnit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            overrides: ParameterOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: ParameterOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Resolve the parameters of every sentence, in order.
///
/// This is a left fold carrying the previous sentence's resolved values; the
/// output has one entry per input.
pub fn resolve<'a, I>(overrides: I, defaults: &ResolvedParameters) -> Vec<ResolvedParameters>
where
    I: IntoIterator<Item = &'a ParameterOverrides>,
{
    overrides
        .into_iter()
        .scan(defaults.clone(), |current, next| {
            *current = current.apply(next);
            Some(current.clone())
        })
        .collect()
}

/// Resolve the parameters of a list of sentence units.
pub fn resolve_units(units: &[SentenceUnit], defaults: &ResolvedParameters) -> Vec<ResolvedParameters> {
    resolve(units.iter().map(|u| &u.overrides), defaults)
}
