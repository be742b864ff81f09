use std::path::{Path, PathBuf};

use anyhow::Context as _;
use image::{Rgba, RgbaImage};
use rusttype::{Font, Scale, point};

use crate::layout::TextMeasure;

static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

pub struct Typeface {
    font: Font<'static>,
    bundled: bool,
}

impl std::fmt::Debug for Typeface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Typeface")
            .field("bundled", &self.bundled)
            .finish_non_exhaustive()
    }
}

impl Typeface {
    /// First candidate that parses wins; none ⇒ the bundled face, with a warning.
    pub fn load(candidates: &[PathBuf]) -> anyhow::Result<Self> {
        for path in candidates {
            match Self::from_file(path) {
                Ok(face) => {
                    tracing::debug!(path = %path.display(), "loaded font");
                    return Ok(face);
                }
                Err(err) => tracing::debug!(path = %path.display(), err = %format!("{err:#}"), "font candidate rejected"),
            }
        }
        tracing::warn!(
            candidates = ?candidates,
            "no usable font file; using the bundled DejaVu Sans"
        );
        Self::bundled()
    }

    pub fn bundled() -> anyhow::Result<Self> {
        let font = Font::try_from_bytes(BUNDLED_FONT)
            .ok_or_else(|| anyhow::anyhow!("bundled font is not a TrueType font"))?;
        Ok(Self {
            font,
            bundled: true,
        })
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read font: {}", path.display()))?;
        Self::from_bytes(bytes).with_context(|| format!("parse font: {}", path.display()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> anyhow::Result<Self> {
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| anyhow::anyhow!("not a TrueType/OpenType font"))?;
        Ok(Self {
            font,
            bundled: false,
        })
    }

    pub fn is_bundled(&self) -> bool {
        self.bundled
    }

    /// Paints `text` with its ink box's top-left corner at `(x, y)`.
    pub fn draw(&self, img: &mut RgbaImage, text: &str, px: f32, x: i32, y: i32, color: Rgba<u8>) {
        let scale = Scale::uniform(px);
        let ascent = self.font.v_metrics(scale).ascent;
        let origin_x = x as f32 - self.ink_left(text, scale) as f32;

        for glyph in self.font.layout(text, scale, point(origin_x, y as f32 + ascent)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 || px >= img.width() as i32 || py >= img.height() as i32 {
                    return;
                }
                let alpha = coverage.clamp(0.0, 1.0);
                if alpha <= 0.0 {
                    return;
                }
                blend(img.get_pixel_mut(px as u32, py as u32), color, alpha);
            });
        }
    }

    fn ink_left(&self, text: &str, scale: Scale) -> i32 {
        self.font
            .layout(text, scale, point(0.0, 0.0))
            .filter_map(|g| g.pixel_bounding_box())
            .map(|bb| bb.min.x)
            .min()
            .unwrap_or(0)
    }
}

impl TextMeasure for Typeface {
    fn width(&self, text: &str, px: f32) -> f32 {
        let mut min_x = i32::MAX;
        let mut max_x = i32::MIN;
        for glyph in self.font.layout(text, Scale::uniform(px), point(0.0, 0.0)) {
            if let Some(bb) = glyph.pixel_bounding_box() {
                min_x = min_x.min(bb.min.x);
                max_x = max_x.max(bb.max.x);
            }
        }
        if max_x < min_x {
            0.0
        } else {
            (max_x - min_x) as f32
        }
    }

    fn line_height(&self, px: f32) -> f32 {
        let v = self.font.v_metrics(Scale::uniform(px));
        (v.ascent - v.descent).ceil()
    }
}

fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>, coverage: f32) {
    let a = coverage * f32::from(src.0[3]) / 255.0;
    let inv = 1.0 - a;
    for c in 0..3 {
        dst.0[c] = (f32::from(src.0[c]) * a + f32::from(dst.0[c]) * inv).round() as u8;
    }
    let out_alpha = a * 255.0 + f32::from(dst.0[3]) * inv;
    dst.0[3] = out_alpha.round().clamp(0.0, 255.0) as u8;
}
