use std::path::{Path, PathBuf};

use anyhow::Context as _;
use image::DynamicImage;

use crate::albums::read_albums;
use crate::cli::ThemesArgs;
use crate::compose::{
    BadgeSpec, apply_overlay, badge_canvas_size, open_image, place_on_record, save_webp,
};
use crate::config::{BadgeConfig, Config};
use crate::formats::AlbumRecord;
use crate::layout::font_sizes;
use crate::palette::extract_palette;
use crate::typography::Typeface;

const OUTPUT_SUFFIX: &str = "_theme.webp";

pub struct ThemeJob {
    pub badge: BadgeConfig,
    pub title_face: Typeface,
    pub subtitle_face: Typeface,
    pub overlay: Option<DynamicImage>,
    pub record: Option<DynamicImage>,
    pub labels: bool,
}

pub fn run(args: ThemesArgs, config: &Config) -> anyhow::Result<()> {
    let layout = &config.layout;
    let public_dir = PathBuf::from(&args.public_dir);
    let albums_path = args
        .albums
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| layout.resolve(&public_dir, &layout.albums_json));

    let mut badge = config.badge.clone();
    if !args.radii.is_empty() {
        badge.radii = args.radii.clone();
    }
    if !args.colors.is_empty() {
        badge.color_slots = args.colors.clone();
    }
    if badge.radii.len() != badge.color_slots.len() {
        anyhow::bail!(
            "{} radii but {} colours; give one colour per radius",
            badge.radii.len(),
            badge.color_slots.len()
        );
    }
    badge_canvas_size(&badge.radii, badge.margin, badge.text_strip)?;

    let albums = read_albums(&albums_path)?;
    let overlay = args
        .overlay
        .as_ref()
        .map(|path| open_image(Path::new(path)))
        .transpose()?;
    let record = if args.on_record {
        Some(open_image(&layout.resolve(&public_dir, &layout.record_image))?)
    } else {
        None
    };

    let job = ThemeJob {
        title_face: Typeface::load(&badge.title_font)?,
        subtitle_face: Typeface::load(&badge.subtitle_font)?,
        badge,
        overlay,
        record,
        labels: !args.no_labels,
    };
    let written = job.render_all(
        &albums,
        &layout.resolve(&public_dir, &layout.album_covers),
        &layout.resolve(&public_dir, &layout.album_themes),
    );
    tracing::info!(albums = albums.len(), written, "album themes done");
    Ok(())
}

impl ThemeJob {
    pub fn render_all(&self, albums: &[AlbumRecord], covers_dir: &Path, out_dir: &Path) -> usize {
        let mut written = 0;
        for album in albums {
            let cover_path = covers_dir.join(album.cover_file_name());
            if !cover_path.is_file() {
                tracing::warn!(id = %album.album_id, path = %cover_path.display(), "cover missing; skipped");
                continue;
            }
            let out_path = out_dir.join(format!("{}{OUTPUT_SUFFIX}", album.album_id));
            match self.render_one(album, &cover_path, &out_path) {
                Ok(()) => {
                    tracing::info!(id = %album.album_id, out = %out_path.display(), "wrote album theme");
                    written += 1;
                }
                Err(err) => {
                    tracing::warn!(id = %album.album_id, err = %format!("{err:#}"), "album theme failed")
                }
            }
        }
        written
    }

    fn render_one(&self, album: &AlbumRecord, cover_path: &Path, out_path: &Path) -> anyhow::Result<()> {
        let palette = extract_palette(cover_path)?;
        let colors = self
            .badge
            .color_slots
            .iter()
            .map(|slot| palette.resolve(slot))
            .collect::<anyhow::Result<Vec<_>>>()
            .context("resolve badge colours")?;

        let label = |text: &str| (self.labels && !text.trim().is_empty()).then(|| text.to_owned());
        let spec = BadgeSpec {
            radii: self.badge.radii.clone(),
            colors,
            cover_size: self.badge.cover_size,
            margin: self.badge.margin,
            text_strip: self.badge.text_strip,
            title: label(&album.album),
            subtitle: label(&album.artist),
            font_sizes: font_sizes(
                self.badge.max_font_px,
                self.badge.min_font_px,
                self.badge.font_step_px,
            ),
        };

        let cover = open_image(cover_path)?;
        let mut canvas = spec.render(&cover, &self.title_face, &self.subtitle_face)?;
        if let Some(overlay) = &self.overlay {
            apply_overlay(&mut canvas, overlay);
        }
        let out = match &self.record {
            Some(record) => place_on_record(
                record,
                &canvas,
                self.badge.record_size,
                self.badge.record_offset_y,
            ),
            None => canvas,
        };
        save_webp(&DynamicImage::ImageRgba8(out), out_path)
    }
}
