use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgb};

use crate::albums::read_albums;
use crate::cli::OverlaysArgs;
use crate::compose::{RecordOverlay, open_image, save_webp};
use crate::config::{BadgeConfig, Config};
use crate::formats::AlbumRecord;

const OUTPUT_SUFFIX: &str = "_on_record.webp";

pub fn run(args: OverlaysArgs, config: &Config) -> anyhow::Result<()> {
    let layout = &config.layout;
    let public_dir = PathBuf::from(&args.public_dir);
    let albums_path = args
        .albums
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| layout.resolve(&public_dir, &layout.albums_json));
    let record_path = args
        .record
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| layout.resolve(&public_dir, &layout.record_image));

    let overlay = record_overlay(&args, &config.badge)?;
    let albums = read_albums(&albums_path)?;
    let record = open_image(&record_path)?;

    let written = compose_all(
        &albums,
        &record,
        &overlay,
        &layout.resolve(&public_dir, &layout.album_covers),
        &layout.resolve(&public_dir, &layout.album_composites),
    );
    tracing::info!(albums = albums.len(), written, "record overlays done");
    Ok(())
}

fn record_overlay(args: &OverlaysArgs, badge: &BadgeConfig) -> anyhow::Result<RecordOverlay> {
    RecordOverlay::new(
        args.scale.unwrap_or(badge.overlay_scale),
        args.offset_y.unwrap_or(badge.overlay_offset_y),
        args.opaque.then_some(Rgb([0xff, 0xff, 0xff])),
    )
}

pub fn compose_all(
    albums: &[AlbumRecord],
    record: &DynamicImage,
    overlay: &RecordOverlay,
    covers_dir: &Path,
    out_dir: &Path,
) -> usize {
    let mut written = 0;
    for album in albums {
        let cover_path = covers_dir.join(album.cover_file_name());
        if !cover_path.is_file() {
            tracing::warn!(id = %album.album_id, path = %cover_path.display(), "cover missing; skipped");
            continue;
        }
        let out_path = out_dir.join(format!("{}{OUTPUT_SUFFIX}", album.album_id));
        let result = open_image(&cover_path)
            .and_then(|cover| save_webp(&overlay.compose(record, &cover), &out_path));
        match result {
            Ok(()) => {
                tracing::info!(id = %album.album_id, out = %out_path.display(), "wrote record overlay");
                written += 1;
            }
            Err(err) => {
                tracing::warn!(id = %album.album_id, err = %format!("{err:#}"), "record overlay failed")
            }
        }
    }
    written
}
