//! Overlay font with a guaranteed fallback.
//!
//! [`LoadedFont::load`] prefers the configured display font. If that file is
//! missing or unparsable, text is drawn with DejaVu Sans Bold, which is
//! compiled into the binary.

use ab_glyph::{FontRef, FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

static EMBEDDED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans-Bold.ttf");

/// Where glyphs come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FontSource {
    Primary { path: PathBuf },
    BuiltIn,
}

impl FontSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, FontSource::BuiltIn)
    }
}

pub enum LoadedFont {
    Primary { font: FontVec, path: PathBuf },
    BuiltIn(FontRef<'static>),
}

impl std::fmt::Debug for LoadedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LoadedFont").field(&self.source()).finish()
    }
}

impl LoadedFont {
    /// The font compiled into the binary.
    pub fn builtin() -> MediaResult<Self> {
        FontRef::try_from_slice(EMBEDDED_FONT)
            .map(LoadedFont::BuiltIn)
            .map_err(|e| MediaError::Font(format!("embedded font: {}", e)))
    }

    /// Load the display font at `path`, or fall back to the built-in font.
    pub fn load(path: &Path) -> MediaResult<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Display font unavailable, using built-in font");
                return Self::builtin();
            }
        };

        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                debug!(path = %path.display(), "Loaded display font");
                Ok(LoadedFont::Primary {
                    font,
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Display font invalid, using built-in font");
                Self::builtin()
            }
        }
    }

    pub fn source(&self) -> FontSource {
        match self {
            LoadedFont::Primary { path, .. } => FontSource::Primary { path: path.clone() },
            LoadedFont::BuiltIn(_) => FontSource::BuiltIn,
        }
    }

    /// Rendered (width, height) of `text` at pixel size `size`.
    pub fn measure(&self, text: &str, size: f32) -> (u32, u32) {
        let scale = PxScale::from(size);
        match self {
            LoadedFont::Primary { font, .. } => text_size(scale, font, text),
            LoadedFont::BuiltIn(font) => text_size(scale, font, text),
        }
    }

    /// Largest size <= `size` at which `text` fits in `max_width`.
    pub fn fit_size(&self, text: &str, size: f32, max_width: u32) -> f32 {
        let (width, _) = self.measure(text, size);
        if width <= max_width || width == 0 {
            return size;
        }
        (size * max_width as f32 / width as f32).floor().max(1.0)
    }

    /// Draw `text` with its top-left corner at (x, y).
    pub fn draw(&self, image: &mut RgbImage, text: &str, x: i32, y: i32, size: f32, color: Rgb<u8>) {
        let scale = PxScale::from(size);
        match self {
            LoadedFont::Primary { font, .. } => draw_text_mut(image, color, x, y, scale, font, text),
            LoadedFont::BuiltIn(font) => draw_text_mut(image, color, x, y, scale, font, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_font_falls_back() {
        let font = LoadedFont::load(Path::new("/no/such/bold_font.ttf")).unwrap();
        assert_eq!(font.source(), FontSource::BuiltIn);
        assert!(font.source().is_fallback());
    }

    #[test]
    fn test_garbage_font_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bold_font.ttf");
        std::fs::write(&path, b"definitely not a font").unwrap();
        let font = LoadedFont::load(&path).unwrap();
        assert_eq!(font.source(), FontSource::BuiltIn);
    }

    #[test]
    fn test_real_font_file_is_primary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bold_font.ttf");
        std::fs::write(&path, EMBEDDED_FONT).unwrap();
        let font = LoadedFont::load(&path).unwrap();
        assert_eq!(font.source(), FontSource::Primary { path });
    }

    #[test]
    fn test_builtin_measure() {
        let font = LoadedFont::builtin().unwrap();
        let (one_w, one_h) = font.measure("A", 70.0);
        let (three_w, three_h) = font.measure("ABC", 70.0);
        assert!(one_w > 0 && one_h > 0);
        assert!(three_w > one_w * 2);
        assert!(three_h <= 70);
        assert_eq!(font.measure("", 70.0).0, 0);
    }

    #[test]
    fn test_fit_size_shrinks() {
        let font = LoadedFont::builtin().unwrap();
        let text = "THIS IS A VERY LONG PROMOTIONAL LINE";
        let size = font.fit_size(text, 150.0, 1000);
        assert!(size < 150.0);
        assert!(font.measure(text, size).0 <= 1000);
        assert_eq!(font.fit_size("OK", 150.0, 1000), 150.0);
    }

    #[test]
    fn test_builtin_draw_stays_inside_measured_box() {
        let mut image = RgbImage::new(200, 120);
        let yellow = Rgb([255, 255, 0]);
        let font = LoadedFont::builtin().unwrap();
        font.draw(&mut image, "T", 10, 10, 70.0, yellow);

        let (w, _) = font.measure("T", 70.0);
        let mut lit = 0;
        for (x, y, p) in image.enumerate_pixels() {
            if p.0[0] > 0 {
                lit += 1;
                assert!(x >= 10 && x <= 10 + w + 2, "pixel at x={x}");
                assert!(y >= 10 && y <= 10 + 70, "pixel at y={y}");
            }
        }
        assert!(lit > 100, "only {lit} pixels drawn");
    }
}
