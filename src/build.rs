use std::path::Path;

use anyhow::Context as _;

use crate::cli::{AlbumsArgs, BackgroundsArgs, BooksArgs, BuildArgs, ThemesArgs};
use crate::config::{Config, SpotifyCredentials};

pub fn run(args: BuildArgs, config: &Config) -> anyhow::Result<()> {
    tracing::info!(input = %args.input, public_dir = %args.public_dir, "build: books");
    crate::books::run(
        BooksArgs {
            input: args.input.clone(),
            public_dir: args.public_dir.clone(),
            out: None,
            delay_ms: None,
            verify_cover: args.verify_cover,
        },
        config,
    )
    .context("books")?;

    if SpotifyCredentials::from_env().is_some() {
        tracing::info!("build: albums");
        crate::albums::run(
            AlbumsArgs {
                public_dir: args.public_dir.clone(),
                max_albums: None,
            },
            config,
        )
        .context("albums")?;
    } else {
        tracing::warn!("build: Spotify credentials not set; skipping albums");
    }

    let albums_json = config
        .layout
        .resolve(Path::new(&args.public_dir), &config.layout.albums_json);
    if albums_json.is_file() {
        tracing::info!("build: themes");
        crate::themes::run(
            ThemesArgs {
                public_dir: args.public_dir.clone(),
                albums: None,
                overlay: None,
                on_record: false,
                radii: Vec::new(),
                colors: Vec::new(),
                no_labels: false,
            },
            config,
        )
        .context("themes")?;
    } else {
        tracing::warn!(path = %albums_json.display(), "build: no album list; skipping themes");
    }

    let book_covers = config
        .layout
        .resolve(Path::new(&args.public_dir), &config.layout.book_covers);
    if book_covers.is_dir() {
        tracing::info!("build: backgrounds");
        crate::backgrounds::run(
            BackgroundsArgs {
                public_dir: args.public_dir.clone(),
                seed: args.seed,
            },
            config,
        )
        .context("backgrounds")?;
    } else {
        tracing::warn!(path = %book_covers.display(), "build: no book covers; skipping backgrounds");
    }

    Ok(())
}
