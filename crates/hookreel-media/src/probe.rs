//! FFprobe media information.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult, StreamKind};

/// Video stream properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub codec: String,
}

/// A probed source file. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    path: PathBuf,
    duration: f64,
    video: Option<VideoStreamInfo>,
    has_audio: bool,
}

impl MediaAsset {
    pub fn new(
        path: impl Into<PathBuf>,
        duration: f64,
        video: Option<VideoStreamInfo>,
        has_audio: bool,
    ) -> Self {
        Self {
            path: path.into(),
            duration: duration.max(0.0),
            video,
            has_audio,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn video(&self) -> Option<&VideoStreamInfo> {
        self.video.as_ref()
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.has_audio
    }

    pub fn has_stream(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::Video => self.has_video(),
            StreamKind::Audio => self.has_audio(),
        }
    }

    /// Fail with a diagnostic naming `role` unless every stream in `required` is present.
    pub fn require_streams(&self, role: &str, required: &[StreamKind]) -> MediaResult<()> {
        for kind in required {
            if !self.has_stream(*kind) {
                return Err(MediaError::missing_stream(role, &self.path, *kind));
            }
        }
        Ok(())
    }
}

/// Source of stream metadata for a path.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> MediaResult<MediaAsset>;
}

/// `ffprobe`-backed prober.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeProber;

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> MediaResult<MediaAsset> {
        probe_media(path).await
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    disposition: Option<FfprobeDisposition>,
}

#[derive(Debug, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

/// Probe a media file for duration and stream layout.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaAsset> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("FFprobe failed for {}", path.display()),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    let asset = parse_probe_output(path, &output.stdout)?;
    debug!(
        path = %path.display(),
        duration = asset.duration(),
        has_video = asset.has_video(),
        has_audio = asset.has_audio(),
        "Probed media"
    );
    Ok(asset)
}

/// Parse ffprobe JSON into a [`MediaAsset`].
///
/// A missing or unparseable duration is an error: nothing downstream can be
/// planned without it.
pub fn parse_probe_output(path: &Path, json: &[u8]) -> MediaResult<MediaAsset> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    // Cover art shows up as a video stream in mp3/m4a files
    let video_stream = probe.streams.iter().find(|s| {
        s.codec_type == "video"
            && !s
                .disposition
                .as_ref()
                .map(|d| d.attached_pic == 1)
                .unwrap_or(false)
    });
    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let format_duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok());
    let stream_duration = probe
        .streams
        .iter()
        .filter_map(|s| s.duration.as_ref().and_then(|d| d.parse::<f64>().ok()))
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));

    let duration = format_duration
        .or(stream_duration)
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| {
            MediaError::ffprobe_failed(format!("no duration reported for {}", path.display()), None)
        })?;

    let video = video_stream.map(|s| VideoStreamInfo {
        width: s.width.unwrap_or(0),
        height: s.height.unwrap_or(0),
        fps: s
            .avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate))
            .unwrap_or(30.0),
        codec: s.codec_name.clone().unwrap_or_default(),
    });

    Ok(MediaAsset::new(path, duration, video, has_audio))
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse::<f64>().ok().filter(|v| *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIP_JSON: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "r_frame_rate": "30/1", "avg_frame_rate": "30000/1001"},
            {"codec_type": "audio", "codec_name": "aac"}
        ],
        "format": {"duration": "20.020000"}
    }"#;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_clip() {
        let asset = parse_probe_output(Path::new("raw_input.mp4"), CLIP_JSON.as_bytes()).unwrap();
        assert!((asset.duration() - 20.02).abs() < 1e-6);
        assert!(asset.has_video());
        assert!(asset.has_audio());
        let video = asset.video().unwrap();
        assert_eq!((video.width, video.height), (1920, 1080));
        assert!((video.fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_music_with_cover_art() {
        let json = r#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "mp3", "duration": "180.5"},
                {"codec_type": "video", "codec_name": "mjpeg", "width": 500, "height": 500,
                 "disposition": {"attached_pic": 1}}
            ],
            "format": {}
        }"#;
        let asset = parse_probe_output(Path::new("bg_music.mp3"), json.as_bytes()).unwrap();
        assert!(!asset.has_video());
        assert!(asset.has_audio());
        assert!((asset.duration() - 180.5).abs() < 1e-6);
    }

    #[test]
    fn test_missing_duration_is_error() {
        let json = r#"{"streams": [{"codec_type": "video"}], "format": {}}"#;
        let err = parse_probe_output(Path::new("broken.mp4"), json.as_bytes()).unwrap_err();
        assert!(matches!(err, MediaError::FfprobeFailed { .. }));
    }

    #[test]
    fn test_require_streams() {
        let silent = MediaAsset::new(
            "raw_input.mp4",
            20.0,
            Some(VideoStreamInfo {
                width: 1920,
                height: 1080,
                fps: 30.0,
                codec: "h264".to_string(),
            }),
            false,
        );
        assert!(silent.require_streams("main", &[StreamKind::Video]).is_ok());
        let err = silent
            .require_streams("main", &[StreamKind::Video, StreamKind::Audio])
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::MissingStream {
                stream: StreamKind::Audio,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let err = probe_media("/definitely/not/here.mp4").await.unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
