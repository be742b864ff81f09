use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb};

pub const SLOT_COUNT: usize = 8;
pub const FALLBACK_COLOR: Rgb<u8> = Rgb([0xff, 0xff, 0xff]);

const SAMPLE_EDGE: u32 = 128;
const ALPHA_CUTOFF: u8 = 128;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Palette {
    slots: BTreeMap<String, Rgb<u8>>,
}

impl Palette {
    pub fn get(&self, slot: &str) -> Option<Rgb<u8>> {
        self.slots.get(canonical_slot(slot)).copied()
    }

    pub fn color(&self, slot: &str) -> Rgb<u8> {
        self.get(slot).unwrap_or(FALLBACK_COLOR)
    }

    pub fn resolve(&self, slot_or_hex: &str) -> anyhow::Result<Rgb<u8>> {
        if slot_or_hex.starts_with('#') {
            return parse_hex_color(slot_or_hex);
        }
        let color = self.get(slot_or_hex);
        if color.is_none() {
            tracing::debug!(slot = slot_or_hex, "palette slot missing; using fallback");
        }
        Ok(color.unwrap_or(FALLBACK_COLOR))
    }

    pub fn slots(&self) -> impl Iterator<Item = (&str, Rgb<u8>)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn canonical_slot(slot: &str) -> &str {
    match slot {
        "background" => "color0",
        "primary" => "color1",
        "secondary" => "color2",
        "foreground" => "color7",
        other => other,
    }
}

pub fn extract_palette(image_path: &Path) -> anyhow::Result<Palette> {
    let img = image::open(image_path)
        .with_context(|| format!("open image: {}", image_path.display()))?;
    Ok(palette_from_image(&img))
}

pub fn palette_from_image(img: &DynamicImage) -> Palette {
    let sample = if img.width() > SAMPLE_EDGE || img.height() > SAMPLE_EDGE {
        img.resize(SAMPLE_EDGE, SAMPLE_EDGE, FilterType::Triangle)
    } else {
        img.clone()
    };
    let mut histogram: BTreeMap<[u8; 3], usize> = BTreeMap::new();
    for p in sample.to_rgba8().pixels() {
        if p.0[3] >= ALPHA_CUTOFF {
            *histogram.entry([p.0[0], p.0[1], p.0[2]]).or_default() += 1;
        }
    }

    let buckets = median_cut(histogram.into_iter().collect(), SLOT_COUNT);
    assign_slots(&buckets)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bucket {
    color: Rgb<u8>,
    population: usize,
}

type Entry = ([u8; 3], usize);

/// Splits the colour histogram at the population median of its widest
/// channel until `max_buckets` boxes exist or no box can be split. A single
/// colour is never split across boxes.
fn median_cut(entries: Vec<Entry>, max_buckets: usize) -> Vec<Bucket> {
    if entries.is_empty() {
        return Vec::new();
    }

    let mut boxes = vec![entries];
    while boxes.len() < max_buckets {
        let widest = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.len() >= 2)
            .map(|(idx, b)| {
                let (channel, range) = widest_channel(b);
                (idx, channel, range, population(b))
            })
            .filter(|(_, _, range, _)| *range > 0)
            .max_by(|a, b| a.2.cmp(&b.2).then(a.3.cmp(&b.3)).then(b.0.cmp(&a.0)));
        let Some((idx, channel, _, total)) = widest else {
            break;
        };

        let mut entries = boxes.remove(idx);
        entries.sort_unstable_by_key(|(color, _)| (color[channel], *color));

        let mut cumulative = 0usize;
        let mut split = entries.len() - 1;
        for (i, (_, count)) in entries.iter().enumerate() {
            cumulative += count;
            if cumulative * 2 >= total {
                split = i + 1;
                break;
            }
        }
        let split = split.clamp(1, entries.len() - 1);
        let upper = entries.split_off(split);
        boxes.push(entries);
        boxes.push(upper);
    }

    boxes
        .iter()
        .map(|b| Bucket {
            color: mean_color(b),
            population: population(b),
        })
        .collect()
}

fn population(entries: &[Entry]) -> usize {
    entries.iter().map(|(_, count)| count).sum()
}

fn widest_channel(entries: &[Entry]) -> (usize, u8) {
    let mut min = [u8::MAX; 3];
    let mut max = [u8::MIN; 3];
    for (color, _) in entries {
        for c in 0..3 {
            min[c] = min[c].min(color[c]);
            max[c] = max[c].max(color[c]);
        }
    }
    (0..3)
        .map(|c| (c, max[c].saturating_sub(min[c])))
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .unwrap_or((0, 0))
}

fn mean_color(entries: &[Entry]) -> Rgb<u8> {
    let mut sum = [0u64; 3];
    for (color, count) in entries {
        for c in 0..3 {
            sum[c] += u64::from(color[c]) * *count as u64;
        }
    }
    let n = (population(entries) as u64).max(1);
    Rgb(sum.map(|s| ((s + n / 2) / n) as u8))
}

/// `color0` darkest, `color7` lightest, `color1`.. by population.
fn assign_slots(buckets: &[Bucket]) -> Palette {
    let mut slots = BTreeMap::new();
    if buckets.is_empty() {
        return Palette { slots };
    }

    let by_luma = |a: &Bucket, b: &Bucket| {
        luma(a.color)
            .total_cmp(&luma(b.color))
            .then(a.color.0.cmp(&b.color.0))
    };
    let darkest = buckets.iter().copied().min_by(by_luma).unwrap_or(buckets[0]);
    let lightest = buckets.iter().copied().max_by(by_luma).unwrap_or(buckets[0]);

    let mut ranked = buckets.to_vec();
    ranked.sort_by(|a, b| b.population.cmp(&a.population).then(by_luma(a, b)));

    slots.insert("color0".to_owned(), darkest.color);
    for (i, bucket) in ranked.iter().take(SLOT_COUNT - 2).enumerate() {
        slots.insert(format!("color{}", i + 1), bucket.color);
    }
    slots.insert(format!("color{}", SLOT_COUNT - 1), lightest.color);

    Palette { slots }
}

pub fn luma(color: Rgb<u8>) -> f32 {
    luma_milli(color) as f32 / 1000.0
}

pub fn luma_milli(color: Rgb<u8>) -> u32 {
    let [r, g, b] = color.0.map(u32::from);
    299 * r + 587 * g + 114 * b
}

pub fn parse_hex_color(raw: &str) -> anyhow::Result<Rgb<u8>> {
    let digits = raw.trim().trim_start_matches('#');
    if digits.len() != 6 {
        anyhow::bail!("invalid colour (expected #rrggbb): {raw}");
    }
    let bytes = hex::decode(digits).with_context(|| format!("invalid colour: {raw}"))?;
    Ok(Rgb([bytes[0], bytes[1], bytes[2]]))
}

pub fn to_hex(color: Rgb<u8>) -> String {
    format!("#{}", hex::encode(color.0))
}
