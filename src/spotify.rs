use std::collections::HashSet;

use anyhow::Context as _;
use base64::Engine as _;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use url::Url;

use crate::config::{SpotifyConfig, SpotifyCredentials};
use crate::formats::AlbumRecord;
use crate::http::{HttpClient, decode_json, fetched_from};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopTracks {
    #[serde(default)]
    pub items: Vec<Track>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Track {
    pub album: Option<Album>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Default, Deserialize)]
pub struct Artist {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

pub struct SpotifyClient {
    http: HttpClient,
    config: SpotifyConfig,
    credentials: SpotifyCredentials,
}

impl SpotifyClient {
    pub fn new(http: HttpClient, config: SpotifyConfig, credentials: SpotifyCredentials) -> Self {
        Self {
            http,
            config,
            credentials,
        }
    }

    pub fn access_token(&self) -> anyhow::Result<String> {
        let url = Url::parse(&format!(
            "{}/api/token",
            self.config.accounts_base.trim_end_matches('/')
        ))
        .context("build token url")?;
        let basic = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        ));

        let response = self
            .http
            .client()
            .post(url.clone())
            .header(AUTHORIZATION, format!("Basic {basic}"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ])
            .send()
            .with_context(|| format!("POST {url}"))?;
        let token: TokenResponse = decode_json(&url, fetched_from(&url, response)?)
            .context("refresh access token")?;
        Ok(token.access_token)
    }

    pub fn top_tracks(&self, access_token: &str) -> anyhow::Result<TopTracks> {
        let url = Url::parse_with_params(
            &format!(
                "{}/v1/me/top/tracks",
                self.config.api_base.trim_end_matches('/')
            ),
            &[
                ("limit", self.config.track_limit.to_string().as_str()),
                ("time_range", self.config.time_range.as_str()),
            ],
        )
        .context("build top tracks url")?;
        self.http
            .get_json_bearer(&url, access_token)
            .context("fetch top tracks")
    }

    pub fn top_albums(&self) -> anyhow::Result<Vec<AlbumRecord>> {
        let token = self.access_token()?;
        let tracks = self.top_tracks(&token)?;
        let albums = albums_by_distinct_artist(&tracks, self.config.max_albums);
        tracing::info!(
            tracks = tracks.items.len(),
            albums = albums.len(),
            "fetched top albums"
        );
        Ok(albums)
    }
}

/// Walks tracks in rank order and keeps the first album of each artist.
pub fn albums_by_distinct_artist(tracks: &TopTracks, max_albums: usize) -> Vec<AlbumRecord> {
    let mut seen = HashSet::new();
    let mut albums = Vec::new();

    for album in tracks.items.iter().filter_map(|t| t.album.as_ref()) {
        if albums.len() >= max_albums {
            break;
        }
        if album.id.trim().is_empty() {
            tracing::debug!(album = %album.name, "track album has no id; skipped");
            continue;
        }
        let Some(artist) = album.artists.first() else {
            continue;
        };
        let artist_key = if artist.id.is_empty() {
            artist.name.to_lowercase()
        } else {
            artist.id.clone()
        };
        if !seen.insert(artist_key) {
            continue;
        }

        albums.push(AlbumRecord {
            album: album.name.clone(),
            album_id: album.id.clone(),
            artist: artist.name.clone(),
            artist_id: artist.id.clone(),
            cover: album.images.first().map(|img| img.url.clone()),
            url: album.external_urls.spotify.clone().unwrap_or_default(),
            cover_path: None,
        });
    }
    albums
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(album_id: &str, artist_id: &str, artist: &str) -> serde_json::Value {
        serde_json::json!({
            "name": "some track",
            "album": {
                "id": album_id,
                "name": format!("Album {album_id}"),
                "artists": [{"id": artist_id, "name": artist}],
                "images": [{"url": format!("https://i.example/{album_id}.jpg"), "width": 640, "height": 640}],
                "external_urls": {"spotify": format!("https://open.example/album/{album_id}")}
            }
        })
    }

    #[test]
    fn keeps_first_album_per_artist() -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "items": [
                track("a1", "x", "X"),
                track("a2", "x", "X"),
                track("b1", "y", "Y"),
                track("c1", "z", "Z"),
            ]
        });
        let tracks: TopTracks = serde_json::from_value(payload)?;
        let albums = albums_by_distinct_artist(&tracks, 5);

        let ids = albums.iter().map(|a| a.album_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a1", "b1", "c1"]);
        assert_eq!(albums[0].artist, "X");
        assert_eq!(albums[0].cover.as_deref(), Some("https://i.example/a1.jpg"));
        assert_eq!(albums[0].url, "https://open.example/album/a1");
        Ok(())
    }

    #[test]
    fn stops_at_max_albums() -> anyhow::Result<()> {
        let items = (0..8)
            .map(|i| track(&format!("al{i}"), &format!("ar{i}"), &format!("Artist {i}")))
            .collect::<Vec<_>>();
        let tracks: TopTracks = serde_json::from_value(serde_json::json!({ "items": items }))?;
        let albums = albums_by_distinct_artist(&tracks, 5);
        assert_eq!(albums.len(), 5);
        assert_eq!(albums[4].album_id, "al4");
        Ok(())
    }

    #[test]
    fn tolerates_missing_images_and_artists() -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "items": [
                {"album": {"id": "n1", "name": "No Artist", "artists": []}},
                {"album": {"id": "n2", "name": "No Image", "artists": [{"id": "q", "name": "Q"}]}},
                {"name": "local file"}
            ]
        });
        let tracks: TopTracks = serde_json::from_value(payload)?;
        let albums = albums_by_distinct_artist(&tracks, 5);
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].album_id, "n2");
        assert_eq!(albums[0].cover, None);
        assert_eq!(albums[0].url, "");
        Ok(())
    }
}
