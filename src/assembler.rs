//! Waveform assembly
//!
//! Concatenates per-sentence PCM into one stream with a fixed silence gap
//! between consecutive sentences, and records where every sentence starts
//! and ends in the result.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{AudioSegment, SampleFormat};
use crate::error::TtsError;

/// Position of one segment inside the assembled stream, in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentTiming {
    pub start_second: f64,
    pub end_second: f64,
    pub length_second: f64,
}

/// Result of [`assemble`].
#[derive(Clone, Debug)]
pub struct AssembledAudio {
    pub pcm: Vec<u8>,
    pub format: SampleFormat,
    pub timings: Vec<SegmentTiming>,
    pub silence_duration: f64,
}

impl AssembledAudio {
    /// Total duration of the stream in seconds
    pub fn duration_secs(&self) -> f64 {
        self.timings.last().map(|t| t.end_second).unwrap_or(0.0)
    }

    pub fn num_frames(&self) -> usize {
        match self.format.frame_size() {
            0 => 0,
            size => self.pcm.len() / size,
        }
    }
}

/// Longest gap allowed between two sentences, in seconds
pub const MAX_SILENCE_DURATION: f64 = 10.0;

/// Check that `silence_duration` is a usable gap length.
pub fn validate_silence_duration(silence_duration: f64) -> Result<(), TtsError> {
    if !silence_duration.is_finite() || silence_duration < 0.0 {
        return Err(TtsError::InvalidInput(format!(
            "silence_duration must be a non-negative number, got {silence_duration}"
        )));
    }
    if silence_duration > MAX_SILENCE_DURATION {
        return Err(TtsError::InvalidInput(format!(
            "silence_duration must be at most {MAX_SILENCE_DURATION} seconds, got {silence_duration}"
        )));
    }
    Ok(())
}

/// All-zero PCM of `duration` seconds in `format`.
///
/// The frame count is `round(sample_rate * duration)`.
pub fn build_silence(duration: f64, format: &SampleFormat) -> Result<Vec<u8>, TtsError> {
    validate_silence_duration(duration)?;
    Ok(vec![0u8; silence_bytes(duration, format)?])
}

fn silence_frames(duration: f64, format: &SampleFormat) -> usize {
    (format.sample_rate as f64 * duration).round() as usize
}

fn silence_bytes(duration: f64, format: &SampleFormat) -> Result<usize, TtsError> {
    silence_frames(duration, format)
        .checked_mul(format.frame_size())
        .ok_or_else(|| too_long(duration))
}

fn too_long(silence_duration: f64) -> TtsError {
    TtsError::InvalidInput(format!(
        "assembled audio would be too long with silence_duration {silence_duration}"
    ))
}

/// Join `segments` into one PCM stream with `silence_duration` seconds of
/// silence between consecutive segments.
///
/// Every segment must share the first segment's [`SampleFormat`]; this is
/// checked before anything is written, so a mismatch never yields partial
/// output.
pub fn assemble(segments: &[AudioSegment], silence_duration: f64) -> Result<AssembledAudio, TtsError> {
    validate_silence_duration(silence_duration)?;

    let first = segments.first().ok_or(TtsError::EmptyInput)?;
    let format = first.format;

    if let Some((index, segment)) = segments
        .iter()
        .enumerate()
        .find(|(_, s)| s.format != format)
    {
        return Err(TtsError::FormatMismatch {
            index,
            expected: format,
            found: segment.format,
        });
    }

    let gaps = segments.len() - 1;
    let gap_bytes = silence_bytes(silence_duration, &format)?;
    let total_bytes = gap_bytes
        .checked_mul(gaps)
        .and_then(|silence| {
            segments
                .iter()
                .try_fold(silence, |total, s| total.checked_add(s.pcm.len()))
        })
        .ok_or_else(|| too_long(silence_duration))?;
    let mut pcm = Vec::with_capacity(total_bytes);
    let mut timings = Vec::with_capacity(segments.len());
    let silence = if gaps > 0 {
        build_silence(silence_duration, &format)?
    } else {
        Vec::new()
    };
    let mut position = 0.0f64;

    for (idx, segment) in segments.iter().enumerate() {
        if idx > 0 {
            pcm.extend_from_slice(&silence);
            position += silence_duration;
        }

        let start_second = position;
        pcm.extend_from_slice(&segment.pcm);
        position += segment.duration_secs;

        let timing = SegmentTiming {
            start_second,
            end_second: position,
            length_second: segment.duration_secs,
        };
        info!(
            "  Timing start={:.3}, end={:.3}, length={:.3}sec",
            timing.start_second, timing.end_second, timing.length_second
        );
        timings.push(timing);
    }

    debug!(
        segments = segments.len(),
        bytes = pcm.len(),
        duration = position,
        "waveform assembled"
    );

    Ok(AssembledAudio {
        pcm,
        format,
        timings,
        silence_duration,
    })
}
