use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::AlbumsArgs;
use crate::config::{Config, Layout, SpotifyCredentials};
use crate::cover_cache::{Cache, CoverCache, DiskCache, write_atomic};
use crate::formats::AlbumRecord;
use crate::http::HttpClient;
use crate::spotify::SpotifyClient;

pub fn run(args: AlbumsArgs, config: &Config) -> anyhow::Result<()> {
    let credentials = SpotifyCredentials::from_env().ok_or_else(|| {
        anyhow::anyhow!(
            "SPOTIFY_CLIENT_ID, SPOTIFY_CLIENT_SECRET and SPOTIFY_REFRESH_TOKEN must be set"
        )
    })?;
    let public_dir = PathBuf::from(&args.public_dir);
    let mut spotify_config = config.spotify.clone();
    if let Some(max_albums) = args.max_albums {
        spotify_config.max_albums = max_albums;
    }

    let http = HttpClient::new(&config.http)?;
    let spotify = SpotifyClient::new(http.clone(), spotify_config, credentials);
    let albums = spotify.top_albums().context("fetch top albums")?;

    let covers = CoverCache::new(
        DiskCache::new(config.layout.resolve(&public_dir, &config.layout.album_covers)),
        http,
    );
    let albums = cache_covers(albums, &covers);

    let json_path = config.layout.resolve(&public_dir, &config.layout.albums_json);
    let txt_path = config.layout.resolve(&public_dir, &config.layout.albums_txt);
    write_albums_json(&json_path, &albums)?;
    write_albums_txt(&txt_path, &albums, &config.layout)?;

    tracing::info!(
        json = %json_path.display(),
        txt = %txt_path.display(),
        albums = albums.len(),
        "wrote album manifests"
    );
    Ok(())
}

pub fn cache_covers<C: Cache>(albums: Vec<AlbumRecord>, covers: &CoverCache<C>) -> Vec<AlbumRecord> {
    albums
        .into_iter()
        .map(|mut album| {
            let asset = album
                .cover
                .as_deref()
                .and_then(|url| covers.ensure_local(&album.album_id, url));
            album.cover_path = asset.map(|asset| asset.file_name);
            if album.cover_path.is_none() {
                tracing::warn!(album = %album.album, id = %album.album_id, "album has no local cover");
            }
            album
        })
        .collect()
}

pub fn read_albums(path: &Path) -> anyhow::Result<Vec<AlbumRecord>> {
    let raw = std::fs::read(path)
        .with_context(|| format!("read album list: {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parse album list: {}", path.display()))
}

pub fn write_albums_json(path: &Path, albums: &[AlbumRecord]) -> anyhow::Result<()> {
    let mut json = serde_json::to_vec_pretty(albums).context("serialize albums")?;
    json.push(b'\n');
    write_atomic(path, &json).with_context(|| format!("write album list: {}", path.display()))
}

pub fn write_albums_txt(path: &Path, albums: &[AlbumRecord], layout: &Layout) -> anyhow::Result<()> {
    let mut contents = String::new();
    for album in albums {
        let cover = album
            .cover_path
            .as_deref()
            .map(|file| Layout::public_path(&layout.album_covers, file))
            .unwrap_or_default();
        let fields = [album.album.as_str(), album.artist.as_str(), &cover, &album.url]
            .map(|field| field.replace(['\t', '\n', '\r'], " "));
        contents.push_str(&fields.join("\t"));
        contents.push('\n');
    }
    write_atomic(path, contents.as_bytes())
        .with_context(|| format!("write album text: {}", path.display()))
}
