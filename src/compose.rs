use std::io::Cursor;
use std::path::Path;

use anyhow::Context as _;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

use crate::cover_cache::write_atomic;
use crate::layout::{LabelArea, LabelLayout, PlacedLine, ink_for, layout_labels};
use crate::typography::Typeface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

pub const MAX_OVERLAY_SCALE: f64 = 4.0;
pub const MAX_CANVAS_SIDE: u32 = 8192;

#[derive(Debug, Clone, Copy)]
pub struct RecordOverlay {
    pub scale: f64,
    pub offset_y: i64,
    pub background: Option<Rgb<u8>>,
}

impl RecordOverlay {
    pub fn new(scale: f64, offset_y: i64, background: Option<Rgb<u8>>) -> anyhow::Result<Self> {
        if !scale.is_finite() || scale <= 0.0 || scale > MAX_OVERLAY_SCALE {
            anyhow::bail!("overlay scale {scale} is out of range (0, {MAX_OVERLAY_SCALE}]");
        }
        Ok(Self {
            scale,
            offset_y,
            background,
        })
    }

    pub fn placement(&self, base_width: u32, base_height: u32) -> Rect {
        let width = scaled(base_width, self.scale);
        let height = scaled(base_height, self.scale);
        Rect {
            x: (i64::from(base_width) - i64::from(width)) / 2,
            y: (i64::from(base_height) - i64::from(height)) / 2 + self.offset_y,
            width,
            height,
        }
    }

    pub fn compose(&self, base: &DynamicImage, foreground: &DynamicImage) -> DynamicImage {
        let mut canvas = base.to_rgba8();
        let rect = self.placement(canvas.width(), canvas.height());
        let fg = foreground
            .resize_exact(rect.width, rect.height, FilterType::Lanczos3)
            .to_rgba8();
        imageops::overlay(&mut canvas, &fg, rect.x, rect.y);

        match self.background {
            Some(color) => DynamicImage::ImageRgb8(flatten(&canvas, color)),
            None => DynamicImage::ImageRgba8(canvas),
        }
    }
}

fn scaled(length: u32, scale: f64) -> u32 {
    ((f64::from(length) * scale).round() as u32).max(1)
}

#[derive(Debug, Clone)]
pub struct BadgeSpec {
    /// Largest first; the last circle hosts the labels.
    pub radii: Vec<u32>,
    pub colors: Vec<Rgb<u8>>,
    pub cover_size: u32,
    pub margin: u32,
    pub text_strip: u32,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub font_sizes: Vec<f32>,
}

pub fn badge_canvas_size(radii: &[u32], margin: u32, text_strip: u32) -> anyhow::Result<(u32, u32)> {
    let largest = radii.iter().copied().max().unwrap_or(0);
    let side = largest
        .checked_add(margin)
        .and_then(|half| half.checked_mul(2))
        .filter(|side| *side <= MAX_CANVAS_SIDE);
    let height = side
        .and_then(|side| side.checked_add(text_strip))
        .filter(|height| *height <= MAX_CANVAS_SIDE);
    match (side, height) {
        (Some(side), Some(height)) => Ok((side, height)),
        _ => anyhow::bail!(
            "badge canvas for radius {largest}, margin {margin} and text strip {text_strip} \
             exceeds {MAX_CANVAS_SIDE} px"
        ),
    }
}

impl BadgeSpec {
    pub fn canvas_size(&self) -> anyhow::Result<(u32, u32)> {
        badge_canvas_size(&self.radii, self.margin, self.text_strip)
    }

    fn label_layout(
        &self,
        (cx, cy): (u32, u32),
        title_face: &Typeface,
        subtitle_face: &Typeface,
    ) -> LabelLayout {
        let area = LabelArea {
            center: (cx as f32, cy as f32),
            radius: self.inner_radius() as f32,
            cover_size: self.cover_size as f32,
        };
        layout_labels(
            &area,
            self.title.as_deref(),
            self.subtitle.as_deref(),
            title_face,
            subtitle_face,
            &self.font_sizes,
        )
    }

    fn inner_radius(&self) -> u32 {
        self.radii.last().copied().unwrap_or(0)
    }

    fn inner_color(&self) -> Rgb<u8> {
        self.colors
            .last()
            .copied()
            .unwrap_or(crate::palette::FALLBACK_COLOR)
    }

    pub fn render(
        &self,
        cover: &DynamicImage,
        title_face: &Typeface,
        subtitle_face: &Typeface,
    ) -> anyhow::Result<RgbaImage> {
        if self.radii.is_empty() {
            anyhow::bail!("badge needs at least one radius");
        }
        if self.radii.len() != self.colors.len() {
            anyhow::bail!(
                "badge has {} radii but {} colours",
                self.radii.len(),
                self.colors.len()
            );
        }

        if self.cover_size > MAX_CANVAS_SIDE {
            anyhow::bail!("badge cover size {} exceeds {MAX_CANVAS_SIDE} px", self.cover_size);
        }
        let (width, height) = self.canvas_size()?;
        let (cx, cy) = (width / 2, width / 2);
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));

        for (&radius, &color) in self.radii.iter().zip(&self.colors) {
            fill_circle(&mut canvas, (cx as f32, cy as f32), radius as f32, color);
        }

        let cover = cover
            .resize_exact(self.cover_size, self.cover_size, FilterType::Lanczos3)
            .to_rgba8();
        let half = i64::from(self.cover_size / 2);
        imageops::overlay(&mut canvas, &cover, i64::from(cx) - half, i64::from(cy) - half);

        let labels = self.label_layout((cx, cy), title_face, subtitle_face);
        let ink = ink_for(self.inner_color());
        let ink = Rgba([ink.0[0], ink.0[1], ink.0[2], 255]);
        for line in &labels.title {
            draw_line(&mut canvas, title_face, line, ink);
        }
        if let Some(line) = &labels.subtitle {
            draw_line(&mut canvas, subtitle_face, line, ink);
        }

        Ok(canvas)
    }
}

fn draw_line(canvas: &mut RgbaImage, face: &Typeface, line: &PlacedLine, ink: Rgba<u8>) {
    face.draw(
        canvas,
        &line.text,
        line.px,
        line.x.round() as i32,
        line.y.round() as i32,
        ink,
    );
}

pub fn fill_circle(img: &mut RgbaImage, center: (f32, f32), radius: f32, color: Rgb<u8>) {
    if radius <= 0.0 {
        return;
    }
    let (cx, cy) = center;
    let r2 = radius * radius;
    let x0 = (cx - radius).floor().max(0.0) as u32;
    let y0 = (cy - radius).floor().max(0.0) as u32;
    let x1 = ((cx + radius).ceil() as u32).min(img.width());
    let y1 = ((cy + radius).ceil() as u32).min(img.height());
    let pixel = Rgba([color.0[0], color.0[1], color.0[2], 255]);

    for y in y0..y1 {
        let dy = y as f32 + 0.5 - cy;
        for x in x0..x1 {
            let dx = x as f32 + 0.5 - cx;
            if dx * dx + dy * dy <= r2 {
                img.put_pixel(x, y, pixel);
            }
        }
    }
}

pub fn apply_overlay(canvas: &mut RgbaImage, overlay: &DynamicImage) {
    let overlay = overlay
        .resize_exact(canvas.width(), canvas.height(), FilterType::Lanczos3)
        .to_rgba8();
    imageops::overlay(canvas, &overlay, 0, 0);
}

pub fn place_on_record(
    record: &DynamicImage,
    canvas: &RgbaImage,
    size: u32,
    offset_y: i64,
) -> RgbaImage {
    let mut out = record
        .resize_exact(size, size, FilterType::Lanczos3)
        .to_rgba8();
    let x = (i64::from(size) - i64::from(canvas.width())) / 2;
    let y = (i64::from(size) - i64::from(canvas.height())) / 2 + offset_y;
    imageops::overlay(&mut out, canvas, x, y);
    out
}

#[derive(Debug, Clone, Copy)]
pub struct BackgroundSpec {
    pub width: u32,
    pub height: u32,
    pub cover_fraction: f64,
    pub color: Rgb<u8>,
    pub angle_deg: f32,
}

impl BackgroundSpec {
    pub fn render(&self, cover: &DynamicImage) -> RgbImage {
        let mut canvas = RgbaImage::from_pixel(
            self.width,
            self.height,
            Rgba([self.color.0[0], self.color.0[1], self.color.0[2], 255]),
        );
        let cover = cover
            .resize_exact(
                scaled(self.width, self.cover_fraction),
                scaled(self.height, self.cover_fraction),
                FilterType::Lanczos3,
            )
            .to_rgba8();
        let rotated = rotate_expand(&cover, self.angle_deg);
        let x = (i64::from(self.width) - i64::from(rotated.width())) / 2;
        let y = (i64::from(self.height) - i64::from(rotated.height())) / 2;
        imageops::overlay(&mut canvas, &rotated, x, y);
        flatten(&canvas, self.color)
    }
}

/// Counter-clockwise rotation by `angle_deg`, growing the canvas to hold the
/// rotated corners. Uncovered pixels are transparent.
pub fn rotate_expand(img: &RgbaImage, angle_deg: f32) -> RgbaImage {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let out_w = (w * cos.abs() + h * sin.abs() - 1e-3).ceil().max(1.0) as u32;
    let out_h = (w * sin.abs() + h * cos.abs() - 1e-3).ceil().max(1.0) as u32;

    let (icx, icy) = (w / 2.0, h / 2.0);
    let (ocx, ocy) = (out_w as f32 / 2.0, out_h as f32 / 2.0);

    RgbaImage::from_fn(out_w, out_h, |x, y| {
        let dx = x as f32 + 0.5 - ocx;
        let dy = y as f32 + 0.5 - ocy;
        let sx = dx * cos - dy * sin + icx - 0.5;
        let sy = dx * sin + dy * cos + icy - 0.5;
        sample_bilinear(img, sx, sy)
    })
}

fn sample_bilinear(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];

    // Premultiplied accumulation keeps transparent neighbours from darkening edges.
    let mut acc = [0f32; 4];
    for (tx, ty, weight) in taps {
        if weight <= 0.0 || tx < 0 || ty < 0 || tx >= i64::from(img.width()) || ty >= i64::from(img.height()) {
            continue;
        }
        let p = img.get_pixel(tx as u32, ty as u32).0;
        let a = f32::from(p[3]) / 255.0 * weight;
        for c in 0..3 {
            acc[c] += f32::from(p[c]) * a;
        }
        acc[3] += a;
    }

    if acc[3] <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |v: f32| (v / acc[3]).round().clamp(0.0, 255.0) as u8;
    Rgba([
        channel(acc[0]),
        channel(acc[1]),
        channel(acc[2]),
        (acc[3] * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

pub fn flatten(img: &RgbaImage, background: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y).0;
        let a = f32::from(p[3]) / 255.0;
        let mix = |c: usize| {
            (f32::from(p[c]) * a + f32::from(background.0[c]) * (1.0 - a)).round() as u8
        };
        Rgb([mix(0), mix(1), mix(2)])
    })
}

pub fn save_webp(img: &DynamicImage, path: &Path) -> anyhow::Result<()> {
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img.clone(),
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::WebP)
        .with_context(|| format!("encode webp: {}", path.display()))?;
    write_atomic(path, bytes.get_ref())
}

pub fn open_image(path: &Path) -> anyhow::Result<DynamicImage> {
    image::open(path).with_context(|| format!("open image: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
    }

    #[test]
    fn overlay_box_is_centred_with_scaled_size() {
        let overlay = RecordOverlay {
            scale: 0.5,
            offset_y: 6,
            background: None,
        };
        assert_eq!(
            overlay.placement(200, 100),
            Rect {
                x: 50,
                y: 31,
                width: 100,
                height: 50
            }
        );

        let base = solid(200, 100, [0, 0, 255, 255]);
        let fg = solid(7, 3, [255, 0, 0, 255]);
        let out = overlay.compose(&base, &fg).to_rgba8();

        let red = |x: u32, y: u32| out.get_pixel(x, y).0 == [255, 0, 0, 255];
        assert!(red(50, 31));
        assert!(red(149, 80));
        assert!(!red(49, 31));
        assert!(!red(50, 30));
        assert!(!red(150, 80));
        assert!(!red(149, 81));
    }

    #[test]
    fn opaque_overlay_flattens_transparency() {
        let overlay = RecordOverlay {
            scale: 0.5,
            offset_y: 0,
            background: Some(Rgb([255, 255, 255])),
        };
        let base = solid(10, 10, [0, 0, 0, 0]);
        let fg = solid(5, 5, [0, 0, 0, 255]);
        let out = overlay.compose(&base, &fg);
        let DynamicImage::ImageRgb8(out) = out else {
            panic!("expected rgb output");
        };
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(5, 5).0, [0, 0, 0]);
    }

    #[test]
    fn badge_canvas_tracks_largest_radius() -> anyhow::Result<()> {
        let spec = BadgeSpec {
            radii: vec![60, 40],
            colors: vec![Rgb([200, 0, 0]), Rgb([0, 0, 200])],
            cover_size: 20,
            margin: 10,
            text_strip: 30,
            title: None,
            subtitle: None,
            font_sizes: vec![12.0, 10.0],
        };
        assert_eq!(spec.canvas_size()?, (140, 170));

        let face = Typeface::bundled()?;
        let cover = solid(8, 8, [0, 255, 0, 255]);
        let out = spec.render(&cover, &face, &face)?;
        assert_eq!(out.dimensions(), (140, 170));
        assert_eq!(out.get_pixel(70, 70).0, [0, 255, 0, 255]);
        // Inside the inner circle but outside the cover.
        assert_eq!(out.get_pixel(70, 70 + 30).0, [0, 0, 200, 255]);
        // Between the circles.
        assert_eq!(out.get_pixel(70, 70 + 50).0, [200, 0, 0, 255]);
        // Outside everything.
        assert_eq!(out.get_pixel(2, 2).0, [0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn badge_labels_are_drawn_inside_the_inner_circle() -> anyhow::Result<()> {
        let red = Rgb([255, 0, 0]);
        let inner = Rgb([0, 0, 80]);
        let spec = BadgeSpec {
            radii: vec![200, 180],
            colors: vec![red, inner],
            cover_size: 250,
            margin: 40,
            text_strip: 60,
            title: Some("Kind of Blue".to_owned()),
            subtitle: Some("Miles Davis".to_owned()),
            font_sizes: crate::layout::font_sizes(40, 10, 2),
        };
        let face = Typeface::bundled()?;
        let out = spec.render(&solid(10, 10, [0, 255, 0, 255]), &face, &face)?;
        assert_eq!(out.dimensions(), (480, 540));

        let (cx, cy) = (240.0f32, 240.0f32);
        let (cover_top, cover_bottom) = (115, 365);
        let plain = [
            [red.0[0], red.0[1], red.0[2], 255],
            [inner.0[0], inner.0[1], inner.0[2], 255],
            [0, 0, 0, 0],
        ];
        let label_pixels = out
            .enumerate_pixels()
            .filter(|(_, y, _)| *y < cover_top || *y >= cover_bottom)
            .filter(|(_, _, p)| !plain.contains(&p.0))
            .map(|(x, y, p)| (x, y, *p))
            .collect::<Vec<_>>();
        assert!(!label_pixels.is_empty(), "no label ink was drawn");

        for &(x, y, _) in &label_pixels {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            assert!(
                (dx * dx + dy * dy).sqrt() <= 180.0,
                "ink at ({x}, {y}) lies outside the inner circle"
            );
        }

        let ink = ink_for(inner);
        let ink = Rgba([ink.0[0], ink.0[1], ink.0[2], 255]);
        let full_ink = label_pixels.iter().filter(|(_, _, p)| *p == ink).collect::<Vec<_>>();
        assert!(full_ink.iter().any(|(_, y, _)| *y < cover_top), "title ink missing");
        assert!(full_ink.iter().any(|(_, y, _)| *y >= cover_bottom), "subtitle ink missing");

        for rows in [0..cover_top, cover_bottom..out.height()] {
            let xs = label_pixels
                .iter()
                .filter(|(_, y, _)| rows.contains(y))
                .map(|(x, _, _)| *x);
            let (min_x, max_x) = xs.fold((u32::MAX, 0), |(lo, hi), x| (lo.min(x), hi.max(x)));
            let mid = (min_x + max_x + 1) as f32 / 2.0;
            assert!((mid - cx).abs() <= 3.0, "label block centred at {mid}");
        }
        Ok(())
    }

    #[test]
    fn badge_rejects_mismatched_colours() -> anyhow::Result<()> {
        let spec = BadgeSpec {
            radii: vec![60, 40],
            colors: vec![Rgb([200, 0, 0])],
            cover_size: 20,
            margin: 10,
            text_strip: 0,
            title: None,
            subtitle: None,
            font_sizes: vec![10.0],
        };
        let face = Typeface::bundled()?;
        let cover = solid(8, 8, [0, 255, 0, 255]);
        assert!(spec.render(&cover, &face, &face).is_err());
        Ok(())
    }

    #[test]
    fn oversized_badge_canvas_is_rejected() {
        assert!(badge_canvas_size(&[u32::MAX], 40, 60).is_err());
        assert!(badge_canvas_size(&[u32::MAX / 2], 40, 60).is_err());
        assert!(badge_canvas_size(&[4000], 96, 0).is_ok());
        assert!(badge_canvas_size(&[4000], 96, 1).is_err());
        assert_eq!(badge_canvas_size(&[], 10, 5).ok(), Some((20, 25)));
    }

    #[test]
    fn overlay_scale_must_be_positive_and_bounded() {
        let white = Some(Rgb([255, 255, 255]));
        assert!(RecordOverlay::new(0.7, 0, None).is_ok());
        assert!(RecordOverlay::new(MAX_OVERLAY_SCALE, -12, white).is_ok());
        for scale in [0.0, -1.0, 1e5, f64::NAN, f64::INFINITY] {
            assert!(RecordOverlay::new(scale, 0, None).is_err(), "scale {scale}");
        }
    }

    #[test]
    fn zero_rotation_keeps_dimensions_and_pixels() {
        let img = RgbaImage::from_fn(4, 3, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 0, 255]));
        let out = rotate_expand(&img, 0.0);
        assert_eq!(out, img);
    }

    #[test]
    fn quarter_rotation_swaps_dimensions() {
        let img = RgbaImage::from_pixel(40, 20, Rgba([9, 9, 9, 255]));
        let out = rotate_expand(&img, 90.0);
        assert_eq!(out.dimensions(), (20, 40));
        assert_eq!(out.get_pixel(10, 20).0, [9, 9, 9, 255]);
    }

    #[test]
    fn background_keeps_canvas_colour_at_corners() {
        let spec = BackgroundSpec {
            width: 50,
            height: 80,
            cover_fraction: 0.8,
            color: Rgb([10, 120, 30]),
            angle_deg: 5.0,
        };
        let out = spec.render(&solid(30, 30, [250, 250, 250, 255]));
        assert_eq!(out.dimensions(), (50, 80));
        assert_eq!(out.get_pixel(0, 0).0, [10, 120, 30]);
        assert_eq!(out.get_pixel(25, 40).0, [250, 250, 250]);
    }

    #[test]
    fn save_webp_roundtrips_dimensions() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("out").join("badge.webp");
        save_webp(&solid(12, 9, [1, 2, 3, 128]), &path)?;
        let decoded = image::open(&path)?;
        assert_eq!((decoded.width(), decoded.height()), (12, 9));
        Ok(())
    }
}
