//! Assembly policies for the filter graph builder.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::ConfigError;

/// Target frame width (portrait 9:16).
pub const TARGET_WIDTH: u32 = 1080;
/// Target frame height (portrait 9:16).
pub const TARGET_HEIGHT: u32 = 1920;
/// Output frame rate every segment is normalized to before concatenation.
pub const TARGET_FPS: u32 = 30;
/// Output audio sample rate every segment is normalized to before concatenation.
pub const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Main clips shorter than this get slowed down before assembly.
pub const DEFAULT_DURATION_THRESHOLD_S: f64 = 15.0;
/// Time-stretch factor applied to short main clips.
pub const DEFAULT_SLOWMO_FACTOR: f64 = 2.0;
pub const DEFAULT_DENOISE_STRENGTH: f32 = 12.0;
pub const DEFAULT_MUSIC_GAIN: f32 = 0.15;
pub const MIN_MUSIC_GAIN: f32 = 0.12;
pub const MAX_MUSIC_GAIN: f32 = 0.15;

/// How a segment is reconciled with the target frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectPolicy {
    /// Scale down keeping aspect ratio, then pad with centered black bars.
    #[default]
    Letterbox,
    /// Scale up keeping aspect ratio, then center-crop the overflow.
    FillCrop,
}

impl AspectPolicy {
    pub const ALL: &'static [AspectPolicy] = &[AspectPolicy::Letterbox, AspectPolicy::FillCrop];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectPolicy::Letterbox => "letterbox",
            AspectPolicy::FillCrop => "fill_crop",
        }
    }
}

impl fmt::Display for AspectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AspectPolicy {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "letterbox" => Ok(AspectPolicy::Letterbox),
            "fill_crop" | "fillcrop" => Ok(AspectPolicy::FillCrop),
            _ => Err(PolicyParseError::AspectPolicy(s.to_string())),
        }
    }
}

/// Loudness normalization target for the voice track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoudnessProfile {
    /// Single-pass `loudnorm` with its built-in defaults.
    #[default]
    Simple,
    /// EBU R128 style target.
    Broadcast {
        /// Integrated loudness (LUFS)
        integrated: f32,
        /// True-peak ceiling (dBTP)
        true_peak: f32,
        /// Loudness range (LU)
        lra: f32,
    },
}

impl LoudnessProfile {
    /// Streaming-platform broadcast target: -16 LUFS, -1.5 dBTP, 11 LU.
    pub const BROADCAST: LoudnessProfile = LoudnessProfile::Broadcast {
        integrated: -16.0,
        true_peak: -1.5,
        lra: 11.0,
    };

    pub fn as_str(&self) -> &'static str {
        match self {
            LoudnessProfile::Simple => "simple",
            LoudnessProfile::Broadcast { .. } => "broadcast",
        }
    }
}

impl FromStr for LoudnessProfile {
    type Err = PolicyParseError;

    /// Accepts `simple`, `broadcast`, or `broadcast:I:TP:LRA`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let mut parts = lower.split(':');
        match parts.next() {
            Some("simple") if parts.next().is_none() => Ok(LoudnessProfile::Simple),
            Some("broadcast") => {
                let values: Vec<&str> = parts.collect();
                if values.is_empty() {
                    return Ok(LoudnessProfile::BROADCAST);
                }
                if values.len() != 3 {
                    return Err(PolicyParseError::LoudnessProfile(s.to_string()));
                }
                let parse = |v: &str| {
                    v.parse::<f32>()
                        .map_err(|_| PolicyParseError::LoudnessProfile(s.to_string()))
                };
                Ok(LoudnessProfile::Broadcast {
                    integrated: parse(values[0])?,
                    true_peak: parse(values[1])?,
                    lra: parse(values[2])?,
                })
            }
            _ => Err(PolicyParseError::LoudnessProfile(s.to_string())),
        }
    }
}

/// How long the voice/music mix runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MixDurationPolicy {
    /// Stop when the voice track (first input) ends.
    #[default]
    First,
    /// Run until the longer stream ends, fading out the finished input.
    Longest {
        /// Dropout transition in seconds
        dropout_transition_s: f32,
    },
}

impl MixDurationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MixDurationPolicy::First => "first",
            MixDurationPolicy::Longest { .. } => "longest",
        }
    }
}

impl FromStr for MixDurationPolicy {
    type Err = PolicyParseError;

    /// Accepts `first`, `longest` or `longest:<dropout seconds>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        match lower.split_once(':') {
            None if lower == "first" => Ok(MixDurationPolicy::First),
            None if lower == "longest" => Ok(MixDurationPolicy::Longest {
                dropout_transition_s: 2.0,
            }),
            Some(("longest", secs)) => secs
                .parse::<f32>()
                .ok()
                .filter(|v| *v >= 0.0)
                .map(|dropout_transition_s| MixDurationPolicy::Longest {
                    dropout_transition_s,
                })
                .ok_or_else(|| PolicyParseError::MixDuration(s.to_string())),
            _ => Err(PolicyParseError::MixDuration(s.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PolicyParseError {
    #[error("Unknown aspect policy: {0}")]
    AspectPolicy(String),
    #[error("Invalid loudness profile: {0}, expected 'simple' or 'broadcast[:I:TP:LRA]'")]
    LoudnessProfile(String),
    #[error("Invalid mix duration policy: {0}, expected 'first' or 'longest[:seconds]'")]
    MixDuration(String),
}

/// Immutable per-run assembly configuration handed to the graph builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssemblyConfig {
    /// Main clips shorter than this (seconds) are time-stretched first
    #[serde(default = "default_duration_threshold")]
    pub duration_threshold_s: f64,

    /// Stretch factor for short main clips
    #[serde(default = "default_slowmo_factor")]
    pub slowmo_factor: f64,

    /// Aspect policy shared by hook and main
    #[serde(default)]
    pub aspect_policy: AspectPolicy,

    /// Apply unsharp + eq enhancement to the main segment
    #[serde(default)]
    pub enhance_main: bool,

    /// `afftdn` noise reduction in dB
    #[serde(default = "default_denoise_strength")]
    pub denoise_strength: f32,

    #[serde(default)]
    pub loudness_profile: LoudnessProfile,

    /// Linear gain applied to the music bed
    #[serde(default = "default_music_gain")]
    pub music_gain: f32,

    #[serde(default)]
    pub mix_duration_policy: MixDurationPolicy,
}

fn default_duration_threshold() -> f64 {
    DEFAULT_DURATION_THRESHOLD_S
}
fn default_slowmo_factor() -> f64 {
    DEFAULT_SLOWMO_FACTOR
}
fn default_denoise_strength() -> f32 {
    DEFAULT_DENOISE_STRENGTH
}
fn default_music_gain() -> f32 {
    DEFAULT_MUSIC_GAIN
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            duration_threshold_s: DEFAULT_DURATION_THRESHOLD_S,
            slowmo_factor: DEFAULT_SLOWMO_FACTOR,
            aspect_policy: AspectPolicy::default(),
            enhance_main: false,
            denoise_strength: DEFAULT_DENOISE_STRENGTH,
            loudness_profile: LoudnessProfile::default(),
            music_gain: DEFAULT_MUSIC_GAIN,
            mix_duration_policy: MixDurationPolicy::default(),
        }
    }
}

impl AssemblyConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.duration_threshold_s.is_finite() || self.duration_threshold_s < 0.0 {
            return Err(ConfigError::out_of_range(
                "duration_threshold_s",
                "non-negative",
                self.duration_threshold_s,
            ));
        }
        if !self.slowmo_factor.is_finite() || self.slowmo_factor < 1.0 {
            return Err(ConfigError::out_of_range(
                "slowmo_factor",
                ">= 1.0",
                self.slowmo_factor,
            ));
        }
        // afftdn accepts 0.01..97 dB
        if !(0.01..=97.0).contains(&self.denoise_strength) {
            return Err(ConfigError::out_of_range(
                "denoise_strength",
                "within 0.01..=97",
                self.denoise_strength,
            ));
        }
        if !(MIN_MUSIC_GAIN..=MAX_MUSIC_GAIN).contains(&self.music_gain) {
            return Err(ConfigError::out_of_range(
                "music_gain",
                format!("within {}..={}", MIN_MUSIC_GAIN, MAX_MUSIC_GAIN),
                self.music_gain,
            ));
        }
        if let LoudnessProfile::Broadcast {
            integrated,
            true_peak,
            lra,
        } = self.loudness_profile
        {
            if !(-70.0..=-5.0).contains(&integrated)
                || !(-9.0..=0.0).contains(&true_peak)
                || !(1.0..=50.0).contains(&lra)
            {
                return Err(ConfigError::out_of_range(
                    "loudness_profile",
                    "I in -70..=-5, TP in -9..=0, LRA in 1..=50",
                    format!("I={} TP={} LRA={}", integrated, true_peak, lra),
                ));
            }
        }
        Ok(())
    }
}
