use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng as _};

use crate::cli::BackgroundsArgs;
use crate::compose::{BackgroundSpec, open_image, save_webp};
use crate::config::{BackgroundConfig, Config};
use crate::cover_cache::write_atomic;
use crate::formats::{BackgroundManifest, BackgroundRecord};
use crate::palette::palette_from_image;

const OUTPUT_SUFFIX: &str = "_bg.webp";
const COVER_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

pub fn run(args: BackgroundsArgs, config: &Config) -> anyhow::Result<()> {
    let layout = &config.layout;
    let public_dir = PathBuf::from(&args.public_dir);
    let covers_dir = layout.resolve(&public_dir, &layout.book_covers);
    let out_dir = layout.resolve(&public_dir, &layout.book_backgrounds);
    let manifest_path = layout.resolve(&public_dir, &layout.backgrounds_json);

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let backgrounds = generate(&covers_dir, &out_dir, &config.background, &mut rng)?;

    let manifest = BackgroundManifest {
        generated_at: chrono::Utc::now(),
        backgrounds,
    };
    let mut json = serde_json::to_vec_pretty(&manifest).context("serialize background manifest")?;
    json.push(b'\n');
    write_atomic(&manifest_path, &json)
        .with_context(|| format!("write background manifest: {}", manifest_path.display()))?;

    tracing::info!(
        out = %manifest_path.display(),
        backgrounds = manifest.backgrounds.len(),
        "wrote background manifest"
    );
    Ok(())
}

pub fn generate<R: Rng>(
    covers_dir: &Path,
    out_dir: &Path,
    config: &BackgroundConfig,
    rng: &mut R,
) -> anyhow::Result<Vec<BackgroundRecord>> {
    let covers = list_covers(covers_dir)?;
    let max_angle = config.max_angle_deg.abs();
    let mut records = Vec::with_capacity(covers.len());

    for cover_path in covers {
        let Some(id) = cover_path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        // Drawn before decoding so a bad file does not shift later angles.
        let angle_deg = rng.gen_range(-max_angle..=max_angle);
        let out_name = format!("{id}{OUTPUT_SUFFIX}");
        let out_path = out_dir.join(&out_name);

        let result = open_image(&cover_path).and_then(|cover| {
            let spec = BackgroundSpec {
                width: config.width,
                height: config.height,
                cover_fraction: config.cover_fraction,
                color: palette_from_image(&cover).color("primary"),
                angle_deg,
            };
            save_webp(&image::DynamicImage::ImageRgb8(spec.render(&cover)), &out_path)
        });
        match result {
            Ok(()) => {
                tracing::info!(id, angle_deg, out = %out_path.display(), "wrote book background");
                records.push(BackgroundRecord {
                    id: id.to_owned(),
                    source: file_name(&cover_path),
                    output: out_name,
                    angle_deg,
                });
            }
            Err(err) => tracing::warn!(id, err = %format!("{err:#}"), "book background failed"),
        }
    }
    Ok(records)
}

fn list_covers(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut covers = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("read covers dir: {}", dir.display()))?
    {
        let path = entry?.path();
        let is_cover = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| COVER_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_cover && path.is_file() {
            covers.push(path);
        }
    }
    covers.sort();
    Ok(covers)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, Rgba, RgbaImage};

    use super::*;

    fn write_cover(dir: &Path, name: &str, color: [u8; 4]) -> anyhow::Result<()> {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 30, Rgba(color))).save(dir.join(name))?;
        Ok(())
    }

    #[test]
    fn angles_stay_in_range_and_are_recorded() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let covers = temp.path().join("covers");
        let out = temp.path().join("bgs");
        std::fs::create_dir_all(&covers)?;
        for i in 0..6 {
            write_cover(&covers, &format!("b{i}.png"), [40 * i as u8, 90, 160, 255])?;
        }
        std::fs::write(covers.join("notes.txt"), "ignored")?;
        std::fs::write(covers.join("broken.png"), "not an image")?;

        let config = BackgroundConfig {
            width: 44,
            height: 64,
            ..BackgroundConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let records = generate(&covers, &out, &config, &mut rng)?;

        let ids = records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["b0", "b1", "b2", "b3", "b4", "b5"]);
        for record in &records {
            assert!((-7.0..=7.0).contains(&record.angle_deg), "{record:?}");
            let img = image::open(out.join(&record.output))?;
            assert_eq!((img.width(), img.height()), (44, 64));
        }
        assert_eq!(records[0].source, "b0.png");
        assert_eq!(records[0].output, "b0_bg.webp");
        Ok(())
    }

    #[test]
    fn same_seed_gives_same_angles() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let covers = temp.path().join("covers");
        std::fs::create_dir_all(&covers)?;
        write_cover(&covers, "a.png", [200, 10, 10, 255])?;
        write_cover(&covers, "b.png", [10, 200, 10, 255])?;
        let config = BackgroundConfig::default();

        let first = generate(&covers, &temp.path().join("one"), &config, &mut StdRng::seed_from_u64(1))?;
        let second = generate(&covers, &temp.path().join("two"), &config, &mut StdRng::seed_from_u64(1))?;
        let angles = |records: &[BackgroundRecord]| records.iter().map(|r| r.angle_deg).collect::<Vec<_>>();
        assert_eq!(angles(&first), angles(&second));
        Ok(())
    }

    #[test]
    fn background_fills_with_primary_colour() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let covers = temp.path().join("covers");
        let out = temp.path().join("bgs");
        std::fs::create_dir_all(&covers)?;
        write_cover(&covers, "x.png", [10, 120, 30, 255])?;

        let records = generate(&covers, &out, &BackgroundConfig::default(), &mut StdRng::seed_from_u64(3))?;
        assert_eq!(records.len(), 1);
        let img = image::open(out.join("x_bg.webp"))?.to_rgb8();
        assert_eq!(img.dimensions(), (220, 320));
        assert_eq!(img.get_pixel(0, 0).0, [10, 120, 30]);
        Ok(())
    }

    #[test]
    fn missing_covers_dir_is_an_error() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(generate(Path::new("/nonexistent"), Path::new("/tmp"), &BackgroundConfig::default(), &mut rng).is_err());
    }
}
