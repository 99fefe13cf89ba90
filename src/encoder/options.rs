use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// x264 speed presets, fastest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl Preset {
    pub const ALL: [Preset; 9] = [
        Preset::Ultrafast,
        Preset::Superfast,
        Preset::Veryfast,
        Preset::Faster,
        Preset::Fast,
        Preset::Medium,
        Preset::Slow,
        Preset::Slower,
        Preset::Veryslow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Ultrafast => "ultrafast",
            Preset::Superfast => "superfast",
            Preset::Veryfast => "veryfast",
            Preset::Faster => "faster",
            Preset::Fast => "fast",
            Preset::Medium => "medium",
            Preset::Slow => "slow",
            Preset::Slower => "slower",
            Preset::Veryslow => "veryslow",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| AppError::invalid_options(format!("unknown preset `{value}`")))
    }
}

/// External tool driving a relay job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Ffmpeg,
    Gstreamer,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Ffmpeg => "ffmpeg",
            Backend::Gstreamer => "gstreamer",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(Backend::Ffmpeg),
            "gst" | "gstreamer" => Ok(Backend::Gstreamer),
            _ => Err(AppError::not_found(format!("backend `{value}`"))),
        }
    }
}

/// Tuning for one relay job. Fixed for the lifetime of the job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderOptions {
    pub audio_sampling_rate: u32,
    /// Kilobits per second.
    pub video_bitrate: u32,
    pub reconnect_delay_in_seconds: u32,
    #[serde(rename = "inputBufferSizeInKB")]
    pub input_buffer_size_in_kb: u32,
    /// Kilobits; `2 * video_bitrate` when unset.
    pub buffer_size: Option<u32>,
    pub frame_rate: u32,
    pub preset: Preset,
    pub bframes: u32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            audio_sampling_rate: 44_100,
            video_bitrate: 8_000,
            reconnect_delay_in_seconds: 2,
            input_buffer_size_in_kb: 1_024,
            buffer_size: None,
            frame_rate: 48,
            preset: Preset::Superfast,
            bframes: 2,
        }
    }
}

impl EncoderOptions {
    pub fn validate(&self) -> Result<(), AppError> {
        let fields = [
            ("audioSamplingRate", Some(self.audio_sampling_rate)),
            ("videoBitrate", Some(self.video_bitrate)),
            ("reconnectDelayInSeconds", Some(self.reconnect_delay_in_seconds)),
            ("inputBufferSizeInKB", Some(self.input_buffer_size_in_kb)),
            ("bufferSize", self.buffer_size),
            ("frameRate", Some(self.frame_rate)),
            ("bframes", Some(self.bframes)),
        ];

        for (name, value) in fields {
            if value == Some(0) {
                return Err(AppError::invalid_options(format!("{name} must be positive")));
            }
        }

        Ok(())
    }

    pub fn effective_buffer_size(&self) -> u64 {
        self.buffer_size
            .map(u64::from)
            .unwrap_or(u64::from(self.video_bitrate) * 2)
    }

    pub fn keyframe_interval(&self) -> u64 {
        u64::from(self.frame_rate) * 2
    }

    pub fn receive_buffer_bytes(&self) -> u64 {
        u64::from(self.input_buffer_size_in_kb) * 1024
    }

    pub fn drop_delay_micros(&self) -> u64 {
        u64::from(self.reconnect_delay_in_seconds) * 1_000_000
    }
}

/// Partial options as accepted over HTTP; unset fields keep their defaults.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderOverrides {
    pub audio_sampling_rate: Option<u32>,
    pub video_bitrate: Option<u32>,
    pub reconnect_delay_in_seconds: Option<u32>,
    #[serde(rename = "inputBufferSizeInKB")]
    pub input_buffer_size_in_kb: Option<u32>,
    pub buffer_size: Option<u32>,
    pub frame_rate: Option<u32>,
    pub preset: Option<Preset>,
    pub bframes: Option<u32>,
}

impl From<EncoderOverrides> for EncoderOptions {
    fn from(overrides: EncoderOverrides) -> Self {
        let defaults = EncoderOptions::default();
        Self {
            audio_sampling_rate: overrides
                .audio_sampling_rate
                .unwrap_or(defaults.audio_sampling_rate),
            video_bitrate: overrides.video_bitrate.unwrap_or(defaults.video_bitrate),
            reconnect_delay_in_seconds: overrides
                .reconnect_delay_in_seconds
                .unwrap_or(defaults.reconnect_delay_in_seconds),
            input_buffer_size_in_kb: overrides
                .input_buffer_size_in_kb
                .unwrap_or(defaults.input_buffer_size_in_kb),
            buffer_size: overrides.buffer_size.or(defaults.buffer_size),
            frame_rate: overrides.frame_rate.unwrap_or(defaults.frame_rate),
            preset: overrides.preset.unwrap_or(defaults.preset),
            bframes: overrides.bframes.unwrap_or(defaults.bframes),
        }
    }
}
