//! Audio container and codec helpers
//!
//! WAV is read from and written to raw little-endian PCM frames with `hound`.
//! MP3 goes through LAME when the `mp3` feature is enabled.

use std::io::Cursor;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::SampleFormat;
use crate::error::TtsError;

/// Output audio format requested by the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    #[default]
    Mp3,
}

impl AudioFormat {
    /// Media type for the HTTP `Content-Type` header
    pub fn media_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(format!("unsupported audio format '{other}' (expected wav or mp3)")),
        }
    }
}

/// Encoded audio ready to hand back to the caller
#[derive(Clone, Debug)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

// =============================================================================
// WAV
// =============================================================================

/// Parse a WAV container into its sample format and raw PCM frames.
///
/// Only integer PCM is accepted. 8-bit data is kept unsigned as stored in
/// the file; wider samples are little-endian signed.
pub fn decode_wav(bytes: &[u8]) -> Result<(SampleFormat, Vec<u8>), TtsError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int {
        return Err(TtsError::Encode("float WAV data is not supported".to_string()));
    }

    let width = spec.bits_per_sample.div_ceil(8);
    let format = SampleFormat::new(spec.sample_rate, spec.channels, width);
    let mut pcm = Vec::with_capacity(reader.len() as usize * width as usize);

    for sample in reader.samples::<i32>() {
        let sample = sample?;
        match width {
            1 => pcm.push((sample + 128) as u8),
            2 => pcm.extend_from_slice(&(sample as i16).to_le_bytes()),
            3 => pcm.extend_from_slice(&sample.to_le_bytes()[..3]),
            4 => pcm.extend_from_slice(&sample.to_le_bytes()),
            _ => {
                return Err(TtsError::Encode(format!(
                    "unsupported sample width: {} bits",
                    spec.bits_per_sample
                )))
            }
        }
    }

    Ok((format, pcm))
}

/// Wrap raw PCM frames in a WAV container.
pub fn encode_wav(pcm: &[u8], format: &SampleFormat) -> Result<Vec<u8>, TtsError> {
    let width = format.sample_width as usize;
    if width == 0 || width > 4 {
        return Err(TtsError::Encode(format!(
            "unsupported sample width: {} bytes",
            format.sample_width
        )));
    }

    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.sample_width * 8,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Vec::with_capacity(44 + pcm.len());
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), spec)?;
        for chunk in pcm.chunks_exact(width) {
            match width {
                1 => writer.write_sample(chunk[0] as i32 - 128)?,
                2 => writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?,
                3 => {
                    let sign = if chunk[2] & 0x80 != 0 { 0xff } else { 0x00 };
                    writer.write_sample(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], sign]))?
                }
                _ => writer.write_sample(i32::from_le_bytes([
                    chunk[0], chunk[1], chunk[2], chunk[3],
                ]))?,
            }
        }
        writer.finalize()?;
    }

    Ok(buffer)
}

// =============================================================================
// Encoder
// =============================================================================

/// LAME settings for MP3 output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mp3Settings {
    /// Constant bitrate in kbps
    pub bitrate_kbps: u32,
    /// LAME quality, 0 (best) to 9 (fastest)
    pub quality: u8,
}

impl Default for Mp3Settings {
    fn default() -> Self {
        Self {
            bitrate_kbps: 64,
            quality: 7,
        }
    }
}

/// Turns assembled PCM into the caller's requested container.
#[derive(Clone, Debug, Default)]
pub struct AudioEncoder {
    mp3: Mp3Settings,
}

impl AudioEncoder {
    pub fn new(mp3: Mp3Settings) -> Self {
        Self { mp3 }
    }

    pub fn mp3_settings(&self) -> &Mp3Settings {
        &self.mp3
    }

    pub fn encode(
        &self,
        pcm: &[u8],
        format: &SampleFormat,
        target: AudioFormat,
    ) -> Result<EncodedAudio, TtsError> {
        let bytes = match target {
            AudioFormat::Wav => encode_wav(pcm, format)?,
            AudioFormat::Mp3 => encode_mp3(pcm, format, &self.mp3)?,
        };
        debug!(format = %target, bytes = bytes.len(), "audio encoded");
        Ok(EncodedAudio {
            bytes,
            format: target,
        })
    }
}

#[cfg(feature = "mp3")]
fn encode_mp3(pcm: &[u8], format: &SampleFormat, settings: &Mp3Settings) -> Result<Vec<u8>, TtsError> {
    use mp3lame_encoder::{Bitrate, Builder, FlushNoGap, InterleavedPcm, MonoPcm, Quality};

    if format.sample_width != 2 {
        return Err(TtsError::Encode(format!(
            "mp3 encoding needs 16-bit PCM, got {}-bit",
            format.sample_width * 8
        )));
    }

    let bitrate = match settings.bitrate_kbps {
        8 => Bitrate::Kbps8,
        16 => Bitrate::Kbps16,
        24 => Bitrate::Kbps24,
        32 => Bitrate::Kbps32,
        40 => Bitrate::Kbps40,
        48 => Bitrate::Kbps48,
        64 => Bitrate::Kbps64,
        80 => Bitrate::Kbps80,
        96 => Bitrate::Kbps96,
        112 => Bitrate::Kbps112,
        128 => Bitrate::Kbps128,
        160 => Bitrate::Kbps160,
        192 => Bitrate::Kbps192,
        224 => Bitrate::Kbps224,
        256 => Bitrate::Kbps256,
        320 => Bitrate::Kbps320,
        other => return Err(TtsError::Encode(format!("unsupported mp3 bitrate: {other}kbps"))),
    };
    let quality = match settings.quality {
        0 => Quality::Best,
        1 => Quality::SecondBest,
        2 => Quality::NearBest,
        3 => Quality::VeryNice,
        4 => Quality::Nice,
        5 => Quality::Good,
        6 => Quality::Decent,
        7 => Quality::Ok,
        8 => Quality::SecondWorst,
        _ => Quality::Worst,
    };

    let mut builder =
        Builder::new().ok_or_else(|| TtsError::Encode("failed to create LAME encoder".to_string()))?;
    let channels = u8::try_from(format.channels)
        .map_err(|_| TtsError::Encode(format!("unsupported channel count: {}", format.channels)))?;
    builder
        .set_num_channels(channels)
        .map_err(|e| TtsError::Encode(format!("set channels: {e:?}")))?;
    builder
        .set_sample_rate(format.sample_rate)
        .map_err(|e| TtsError::Encode(format!("set sample rate: {e:?}")))?;
    builder
        .set_brate(bitrate)
        .map_err(|e| TtsError::Encode(format!("set bitrate: {e:?}")))?;
    builder
        .set_quality(quality)
        .map_err(|e| TtsError::Encode(format!("set quality: {e:?}")))?;
    let mut encoder = builder
        .build()
        .map_err(|e| TtsError::Encode(format!("init LAME: {e:?}")))?;

    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    let mut out = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(samples.len()));
    let encoded = match format.channels {
        1 => encoder.encode_to_vec(MonoPcm(samples.as_slice()), &mut out),
        2 => encoder.encode_to_vec(InterleavedPcm(samples.as_slice()), &mut out),
        n => return Err(TtsError::Encode(format!("unsupported channel count: {n}"))),
    };
    encoded.map_err(|e| TtsError::Encode(format!("encode: {e:?}")))?;
    encoder
        .flush_to_vec::<FlushNoGap>(&mut out)
        .map_err(|e| TtsError::Encode(format!("flush: {e:?}")))?;

    Ok(out)
}

#[cfg(not(feature = "mp3"))]
fn encode_mp3(_pcm: &[u8], _format: &SampleFormat, _settings: &Mp3Settings) -> Result<Vec<u8>, TtsError> {
    Err(TtsError::Encode("mp3 support not compiled in".to_string()))
}
