//! Thumbnail synthesis: a mid-video frame with promotional text on top.
//!
//! Nothing in here is allowed to fail the run. Extraction or compositing
//! problems degrade to a solid placeholder carrying the same text.

use image::{ImageFormat, Rgb, RgbImage};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

use crate::command::{FfmpegCommand, RenderEngine};
use crate::error::{MediaError, MediaResult};
use crate::font::{FontSource, LoadedFont};
use crate::probe::MediaAsset;

/// Phrases used when the caller supplies no overlay text.
pub const PHRASES: &[&str] = &[
    "READY!",
    "WAIT FOR IT...",
    "WATCH TILL THE END",
    "YOU WON'T BELIEVE THIS",
    "DON'T BLINK!",
    "THIS CHANGES EVERYTHING",
];

pub const DEFAULT_FONT_PATH: &str = "bold_font.ttf";
pub const DEFAULT_FONT_SIZE: f32 = 150.0;
pub const DEFAULT_FRACTION: f64 = 0.5;
pub const PLACEHOLDER_WIDTH: u32 = 1080;
pub const PLACEHOLDER_HEIGHT: u32 = 1920;

const YELLOW: [u8; 3] = [255, 255, 0];
const OUTLINE: [u8; 3] = [0, 0, 0];
const PLACEHOLDER_BACKGROUND: [u8; 3] = [24, 24, 32];

/// Readability treatment behind the fill color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextTreatment {
    /// Four offset black copies under the fill.
    #[default]
    Outline,
    /// Semi-transparent dark gradient behind the text.
    Panel,
}

impl TextTreatment {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextTreatment::Outline => "outline",
            TextTreatment::Panel => "panel",
        }
    }
}

impl fmt::Display for TextTreatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("Invalid text treatment: {0}, expected 'outline' or 'panel'")]
pub struct TreatmentParseError(String);

impl FromStr for TextTreatment {
    type Err = TreatmentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outline" => Ok(TextTreatment::Outline),
            "panel" => Ok(TextTreatment::Panel),
            _ => Err(TreatmentParseError(s.to_string())),
        }
    }
}

/// Thumbnail settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Extraction point as a fraction of the video duration
    pub fraction: f64,
    pub font_path: PathBuf,
    /// Requested font size in pixels; shrunk if the text would not fit
    pub font_size: f32,
    pub treatment: TextTreatment,
    /// Left edge of the text on extracted frames
    pub text_x: u32,
    /// Top edge of the text on extracted frames
    pub text_y: u32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            fraction: DEFAULT_FRACTION,
            font_path: PathBuf::from(DEFAULT_FONT_PATH),
            font_size: DEFAULT_FONT_SIZE,
            treatment: TextTreatment::default(),
            text_x: 100,
            text_y: 400,
        }
    }
}

/// What was drawn, where it came from, and when in the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailSpec {
    pub text: String,
    /// Extraction timestamp in seconds
    pub timestamp_s: f64,
    pub font: FontSource,
}

/// A written thumbnail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub path: PathBuf,
    pub spec: ThumbnailSpec,
    /// True when the placeholder was written instead of a composited frame
    pub fallback: bool,
}

/// Pixel placement of a line of text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextLayout {
    pub x: i32,
    pub y: i32,
    pub size: f32,
    pub width: u32,
    pub height: u32,
}

/// Caller text if given and non-blank, else a random phrase.
pub fn choose_text(requested: Option<&str>) -> String {
    if let Some(text) = requested.map(str::trim).filter(|t| !t.is_empty()) {
        info!(text, "Using supplied thumbnail text");
        return text.to_string();
    }

    let text = PHRASES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("READY!")
        .to_string();
    info!(text = %text, "Selected thumbnail text");
    text
}

#[derive(Debug, Clone, Default)]
pub struct ThumbnailSynthesizer {
    config: ThumbnailConfig,
}

impl ThumbnailSynthesizer {
    pub fn new(config: ThumbnailConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    /// Seconds into `duration` at which the frame is taken.
    pub fn extraction_timestamp(&self, duration: f64) -> f64 {
        (duration * self.config.fraction.clamp(0.0, 1.0)).max(0.0)
    }

    /// `ffmpeg -ss <t> -i <video> -frames:v 1 -update 1 <frame>`
    pub fn extract_command(&self, video: &Path, timestamp_s: f64, frame: &Path) -> FfmpegCommand {
        FfmpegCommand::with_output(frame)
            .input(video)
            .seek(timestamp_s)
            .single_frame()
            .output_args(["-q:v", "2"])
    }

    /// Produce a thumbnail at `output`, falling back to the placeholder on any
    /// extraction or compositing failure.
    ///
    /// Only a failure to write the placeholder itself is returned as an error.
    pub async fn synthesize<R>(
        &self,
        engine: &R,
        video: &MediaAsset,
        text: &str,
        frame_path: &Path,
        output: &Path,
    ) -> MediaResult<Thumbnail>
    where
        R: RenderEngine + ?Sized,
    {
        let timestamp_s = self.extraction_timestamp(video.duration());

        match self.try_composite(engine, video, text, timestamp_s, frame_path, output).await {
            Ok(font) => {
                info!(
                    path = %output.display(),
                    timestamp_s,
                    font = ?font,
                    "Thumbnail composited"
                );
                Ok(Thumbnail {
                    path: output.to_path_buf(),
                    spec: ThumbnailSpec {
                        text: text.to_string(),
                        timestamp_s,
                        font,
                    },
                    fallback: false,
                })
            }
            Err(e) => {
                warn!(error = %e, path = %output.display(), "Thumbnail compositing failed, writing placeholder");
                self.write_placeholder(text, output)?;
                Ok(Thumbnail {
                    path: output.to_path_buf(),
                    spec: ThumbnailSpec {
                        text: text.to_string(),
                        timestamp_s,
                        font: FontSource::BuiltIn,
                    },
                    fallback: true,
                })
            }
        }
    }

    async fn try_composite<R>(
        &self,
        engine: &R,
        video: &MediaAsset,
        text: &str,
        timestamp_s: f64,
        frame_path: &Path,
        output: &Path,
    ) -> MediaResult<FontSource>
    where
        R: RenderEngine + ?Sized,
    {
        if !video.has_video() {
            return Err(MediaError::InvalidVideo(format!(
                "{} has no video stream",
                video.path().display()
            )));
        }

        engine
            .render(&self.extract_command(video.path(), timestamp_s, frame_path))
            .await?;

        let mut frame = image::open(frame_path)?.to_rgb8();
        let font = LoadedFont::load(&self.config.font_path)?;
        self.composite(&mut frame, text, &font);
        frame.save_with_format(output, ImageFormat::Jpeg)?;

        Ok(font.source())
    }

    /// Layout on an extracted frame: configured anchor, shrunk to fit, kept on-canvas.
    pub fn frame_layout(&self, font: &LoadedFont, text: &str, width: u32, height: u32) -> TextLayout {
        let margin = self.config.text_x.min(width / 10);
        let max_width = width.saturating_sub(margin * 2).max(1);
        let size = font.fit_size(text, self.config.font_size, max_width);
        let (text_w, text_h) = font.measure(text, size);
        let y = self.config.text_y.min(height.saturating_sub(text_h));

        TextLayout {
            x: margin as i32,
            y: y as i32,
            size,
            width: text_w,
            height: text_h,
        }
    }

    /// Draw `text` onto `frame` with the configured treatment.
    pub fn composite(&self, frame: &mut RgbImage, text: &str, font: &LoadedFont) {
        let layout = self.frame_layout(font, text, frame.width(), frame.height());

        match self.config.treatment {
            TextTreatment::Outline => {
                let offset = ((layout.size / 25.0).round() as i32).max(2);
                for (dx, dy) in [(-offset, 0), (offset, 0), (0, -offset), (0, offset)] {
                    font.draw(frame, text, layout.x + dx, layout.y + dy, layout.size, Rgb(OUTLINE));
                }
            }
            TextTreatment::Panel => {
                let pad = ((layout.size / 5.0).round() as i32).max(4);
                draw_gradient_panel(
                    frame,
                    layout.x - pad,
                    layout.y - pad,
                    layout.width + pad as u32 * 2,
                    layout.height + pad as u32 * 2,
                );
            }
        }

        font.draw(frame, text, layout.x, layout.y, layout.size, Rgb(YELLOW));
    }

    /// Centered layout on the placeholder.
    pub fn placeholder_layout(&self, font: &LoadedFont, text: &str) -> TextLayout {
        let max_width = PLACEHOLDER_WIDTH * 4 / 5;
        let size = font.fit_size(text, self.config.font_size, max_width);
        let (text_w, text_h) = font.measure(text, size);

        TextLayout {
            x: (PLACEHOLDER_WIDTH.saturating_sub(text_w) / 2) as i32,
            y: (PLACEHOLDER_HEIGHT.saturating_sub(text_h) / 2) as i32,
            size,
            width: text_w,
            height: text_h,
        }
    }

    /// Deterministic solid-color image carrying `text` in the built-in font.
    pub fn render_placeholder(&self, text: &str) -> MediaResult<RgbImage> {
        let font = LoadedFont::builtin()?;
        let mut image =
            RgbImage::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, Rgb(PLACEHOLDER_BACKGROUND));
        let layout = self.placeholder_layout(&font, text);
        font.draw(&mut image, text, layout.x, layout.y, layout.size, Rgb(YELLOW));
        Ok(image)
    }

    pub fn write_placeholder(&self, text: &str, output: &Path) -> MediaResult<()> {
        self.render_placeholder(text)?
            .save_with_format(output, ImageFormat::Jpeg)?;
        Ok(())
    }
}

/// Darken a rectangle, from 35% at the top to 75% at the bottom.
fn draw_gradient_panel(image: &mut RgbImage, x: i32, y: i32, width: u32, height: u32) {
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = ((x + width as i32).max(0) as u32).min(image.width());
    let y1 = ((y + height as i32).max(0) as u32).min(image.height());
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let span = (y1 - y0).max(1) as f32;
    for py in y0..y1 {
        let alpha = 0.35 + 0.40 * (py - y0) as f32 / span;
        for px in x0..x1 {
            let pixel = image.get_pixel_mut(px, py);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f32 * (1.0 - alpha)).round() as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FfmpegCommand;
    use crate::probe::VideoStreamInfo;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Writes a small gray JPEG to the command's output, or fails.
    struct FrameEngine {
        fail: bool,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FrameEngine {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RenderEngine for FrameEngine {
        async fn render(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
            self.calls.lock().unwrap().push(cmd.build_args());
            if self.fail {
                return Err(MediaError::ffmpeg_failed("forced failure", None, Some(1)));
            }
            RgbImage::from_pixel(540, 960, Rgb([128, 128, 128]))
                .save_with_format(cmd.output(), ImageFormat::Jpeg)?;
            Ok(())
        }
    }

    fn rendered(duration: f64) -> MediaAsset {
        MediaAsset::new(
            "final_short.mp4",
            duration,
            Some(VideoStreamInfo {
                width: 1080,
                height: 1920,
                fps: 30.0,
                codec: "h264".to_string(),
            }),
            true,
        )
    }

    fn is_yellow(p: &Rgb<u8>) -> bool {
        p.0[0] > 180 && p.0[1] > 180 && p.0[2] < 110
    }

    /// Yellow fill covers a fair share of the text box and appears nowhere else.
    fn assert_text_present(image: &RgbImage, layout: TextLayout) {
        let margin = (layout.size / 8.0) as i64;
        let (x0, y0) = (layout.x as i64 - margin, layout.y as i64 - margin);
        let x1 = layout.x as i64 + layout.width as i64 + margin;
        let y1 = layout.y as i64 + layout.size as i64 + margin;

        let mut inside = 0u64;
        for (x, y, p) in image.enumerate_pixels() {
            if !is_yellow(p) {
                continue;
            }
            let (x, y) = (x as i64, y as i64);
            assert!(
                x >= x0 && x < x1 && y >= y0 && y < y1,
                "yellow pixel at ({x}, {y}) outside {layout:?}"
            );
            inside += 1;
        }

        let area = layout.width as u64 * layout.height as u64;
        assert!(area > 0);
        assert!(inside * 10 >= area, "{inside} yellow pixels in a {area} px box");
    }

    #[test]
    fn test_choose_text() {
        assert_eq!(choose_text(Some("READY!")), "READY!");
        for _ in 0..20 {
            let text = choose_text(None);
            assert!(PHRASES.contains(&text.as_str()));
        }
        assert!(PHRASES.contains(&choose_text(Some("   ")).as_str()));
    }

    #[test]
    fn test_treatment_parse() {
        assert_eq!("panel".parse::<TextTreatment>(), Ok(TextTreatment::Panel));
        assert_eq!("Outline".parse::<TextTreatment>(), Ok(TextTreatment::Outline));
        assert!("shadow".parse::<TextTreatment>().is_err());
    }

    #[test]
    fn test_extraction_timestamp_and_command() {
        let synth = ThumbnailSynthesizer::default();
        assert!((synth.extraction_timestamp(23.0) - 11.5).abs() < 1e-9);

        let args = synth
            .extract_command(Path::new("final_short.mp4"), 11.5, Path::new("frame.jpg"))
            .build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-ss 11.500 -i final_short.mp4"));
        assert!(joined.contains("-frames:v 1 -update 1"));
        assert_eq!(args.last().map(String::as_str), Some("frame.jpg"));
    }

    #[test]
    fn test_placeholder_is_deterministic_and_contains_text() {
        let synth = ThumbnailSynthesizer::default();
        let font = LoadedFont::builtin().unwrap();
        let a = synth.render_placeholder("READY!").unwrap();
        let b = synth.render_placeholder("READY!").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimensions(), (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT));
        assert_text_present(&a, synth.placeholder_layout(&font, "READY!"));

        let other = synth.render_placeholder("DON'T BLINK!").unwrap();
        assert_ne!(a, other);
    }

    #[tokio::test]
    async fn test_extraction_failure_writes_placeholder_with_text() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("frame.jpg");
        let output = dir.path().join("thumbnail.jpg");
        let synth = ThumbnailSynthesizer::default();
        let engine = FrameEngine::new(true);

        let thumb = synth
            .synthesize(&engine, &rendered(23.0), "WAIT FOR IT", &frame, &output)
            .await
            .unwrap();

        assert!(thumb.fallback);
        assert_eq!(thumb.spec.text, "WAIT FOR IT");
        assert_eq!(thumb.spec.font, FontSource::BuiltIn);
        assert_eq!(engine.calls.lock().unwrap().len(), 1);

        let written = image::open(&output).unwrap().to_rgb8();
        let layout = synth.placeholder_layout(&LoadedFont::builtin().unwrap(), "WAIT FOR IT");
        assert_text_present(&written, layout);
    }

    #[tokio::test]
    async fn test_composite_with_missing_font_uses_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("frame.jpg");
        let output = dir.path().join("thumbnail.jpg");
        let synth = ThumbnailSynthesizer::new(ThumbnailConfig {
            font_path: dir.path().join("missing.ttf"),
            ..ThumbnailConfig::default()
        });

        let thumb = synth
            .synthesize(&FrameEngine::new(false), &rendered(23.0), "READY!", &frame, &output)
            .await
            .unwrap();

        assert!(!thumb.fallback);
        assert_eq!(thumb.spec.font, FontSource::BuiltIn);
        assert!((thumb.spec.timestamp_s - 11.5).abs() < 1e-9);

        let written = image::open(&output).unwrap().to_rgb8();
        assert_eq!(written.dimensions(), (540, 960));
        let layout = synth.frame_layout(&LoadedFont::builtin().unwrap(), "READY!", 540, 960);
        assert_text_present(&written, layout);
    }

    #[tokio::test]
    async fn test_video_without_frames_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let audio_only = MediaAsset::new("final_short.mp4", 23.0, None, true);
        let engine = FrameEngine::new(false);

        let thumb = ThumbnailSynthesizer::default()
            .synthesize(
                &engine,
                &audio_only,
                "READY!",
                &dir.path().join("frame.jpg"),
                &dir.path().join("thumbnail.jpg"),
            )
            .await
            .unwrap();

        assert!(thumb.fallback);
        assert!(engine.calls.lock().unwrap().is_empty());
        assert!(thumb.path.exists());
    }

    #[test]
    fn test_panel_darkens_behind_text() {
        let synth = ThumbnailSynthesizer::new(ThumbnailConfig {
            treatment: TextTreatment::Panel,
            ..ThumbnailConfig::default()
        });
        let mut frame = RgbImage::from_pixel(1080, 1920, Rgb([200, 200, 200]));
        let font = LoadedFont::builtin().unwrap();
        synth.composite(&mut frame, "READY!", &font);

        let layout = synth.frame_layout(&font, "READY!", 1080, 1920);
        // just above the text, inside the panel padding
        let above = frame.get_pixel(layout.x as u32 + 2, layout.y as u32 - 2);
        assert!(above.0[0] < 200);
        // well outside the panel
        assert_eq!(frame.get_pixel(5, 5), &Rgb([200, 200, 200]));
    }
}
