//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as string (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given expected output duration in seconds.
    pub fn percentage(&self, expected_duration_s: f64) -> f64 {
        if expected_duration_s <= 0.0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / 1000.0 / expected_duration_s) * 100.0).clamp(0.0, 100.0)
    }
}
