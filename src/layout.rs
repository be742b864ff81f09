use image::Rgb;

use crate::palette::luma_milli;

pub const DARK_INK: Rgb<u8> = Rgb([0x00, 0x00, 0x00]);
pub const LIGHT_INK: Rgb<u8> = Rgb([0xff, 0xff, 0xff]);

pub const INK_LUMA_THRESHOLD: u32 = 100;

const LABEL_GAP: f32 = 10.0;
const LINE_SPACING: f32 = 2.0;
const CHORD_INSET: f32 = 20.0;

pub trait TextMeasure {
    fn width(&self, text: &str, px: f32) -> f32;
    fn line_height(&self, px: f32) -> f32;
}

pub fn ink_for(background: Rgb<u8>) -> Rgb<u8> {
    if luma_milli(background) > INK_LUMA_THRESHOLD * 1000 {
        DARK_INK
    } else {
        LIGHT_INK
    }
}

pub fn chord_width(radius: f32, dy: f32) -> f32 {
    let dy = dy.abs();
    if dy >= radius {
        return 0.0;
    }
    2.0 * (radius * radius - dy * dy).sqrt()
}

/// Most balanced 2-way word split with both lines within `max_width`.
pub fn best_split(
    title: &str,
    measure: &dyn TextMeasure,
    px: f32,
    max_width: f32,
) -> Option<Vec<String>> {
    let words = title.split_whitespace().collect::<Vec<_>>();
    if words.len() < 2 {
        let line = words.join(" ");
        return (measure.width(&line, px) <= max_width).then(|| vec![line]);
    }

    let mut best: Option<(f32, Vec<String>)> = None;
    for i in 1..words.len() {
        let first = words[..i].join(" ");
        let second = words[i..].join(" ");
        let w1 = measure.width(&first, px);
        let w2 = measure.width(&second, px);
        if w1 > max_width || w2 > max_width {
            continue;
        }
        let diff = (w1 - w2).abs();
        if best.as_ref().is_none_or(|(best_diff, _)| diff < *best_diff) {
            best = Some((diff, vec![first, second]));
        }
    }
    best.map(|(_, lines)| lines)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub px: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelLayout {
    pub title: Vec<PlacedLine>,
    pub subtitle: Option<PlacedLine>,
}

#[derive(Debug, Clone, Copy)]
pub struct LabelArea {
    pub center: (f32, f32),
    pub radius: f32,
    pub cover_size: f32,
}

impl LabelArea {
    fn available_width(&self, top: f32, height: f32) -> f32 {
        let cy = self.center.1;
        let dy = (top - cy).abs().max((top + height - cy).abs());
        (chord_width(self.radius, dy) - CHORD_INSET).max(0.0)
    }

    fn cover_top(&self) -> f32 {
        self.center.1 - self.cover_size / 2.0
    }

    fn cover_bottom(&self) -> f32 {
        self.center.1 + self.cover_size / 2.0
    }
}

pub fn font_sizes(max_px: u32, min_px: u32, step_px: u32) -> Vec<f32> {
    let step = step_px.max(1) as usize;
    let min_px = min_px.max(1).min(max_px);
    (min_px..=max_px)
        .rev()
        .step_by(step)
        .map(|px| px as f32)
        .collect()
}

pub fn layout_labels(
    area: &LabelArea,
    title: Option<&str>,
    subtitle: Option<&str>,
    title_face: &dyn TextMeasure,
    subtitle_face: &dyn TextMeasure,
    sizes: &[f32],
) -> LabelLayout {
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| fit_title(area, t, title_face, sizes))
        .unwrap_or_default();
    let subtitle = subtitle
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .and_then(|t| fit_subtitle(area, t, subtitle_face, sizes));
    LabelLayout { title, subtitle }
}

fn fit_title(
    area: &LabelArea,
    title: &str,
    measure: &dyn TextMeasure,
    sizes: &[f32],
) -> Vec<PlacedLine> {
    let line_count = if title.split_whitespace().count() >= 2 { 2 } else { 1 };

    for &px in sizes {
        let line_height = measure.line_height(px);
        let top = title_top(area, line_count, line_height);
        let max_width = area.available_width(top, line_height);
        if max_width <= 0.0 {
            continue;
        }
        if let Some(lines) = best_split(title, measure, px, max_width) {
            return place_lines(area, &lines, measure, px, top, line_height);
        }
    }

    let Some(&px) = sizes.last() else {
        return Vec::new();
    };
    tracing::debug!(title, px, "title does not fit the badge; placing at smallest size");
    let line_height = measure.line_height(px);
    let lines = best_split(title, measure, px, f32::INFINITY).unwrap_or_default();
    let top = title_top(area, lines.len(), line_height);
    place_lines(area, &lines, measure, px, top, line_height)
}

fn title_top(area: &LabelArea, line_count: usize, line_height: f32) -> f32 {
    let n = line_count.max(1) as f32;
    let block = n * line_height + (n - 1.0) * LINE_SPACING;
    area.cover_top() - LABEL_GAP - block
}

fn place_lines(
    area: &LabelArea,
    lines: &[String],
    measure: &dyn TextMeasure,
    px: f32,
    top: f32,
    line_height: f32,
) -> Vec<PlacedLine> {
    lines
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let width = measure.width(text, px);
            PlacedLine {
                text: text.clone(),
                px,
                x: area.center.0 - width / 2.0,
                y: top + i as f32 * (line_height + LINE_SPACING),
                width,
            }
        })
        .collect()
}

fn fit_subtitle(
    area: &LabelArea,
    subtitle: &str,
    measure: &dyn TextMeasure,
    sizes: &[f32],
) -> Option<PlacedLine> {
    let top = area.cover_bottom() + LABEL_GAP;
    let chosen = sizes
        .iter()
        .copied()
        .find(|&px| {
            let max_width = area.available_width(top, measure.line_height(px));
            max_width > 0.0 && measure.width(subtitle, px) <= max_width
        })
        .or_else(|| sizes.last().copied())?;

    let width = measure.width(subtitle, chosen);
    Some(PlacedLine {
        text: subtitle.to_owned(),
        px: chosen,
        x: area.center.0 - width / 2.0,
        y: top,
        width,
    })
}
