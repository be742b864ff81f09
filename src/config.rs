use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub catalog: CatalogConfig,
    pub spotify: SpotifyConfig,
    pub layout: Layout,
    pub badge: BadgeConfig,
    pub background: BackgroundConfig,
}

impl Config {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse config: {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Extra attempts after a transport error or 5xx response.
    pub retries: usize,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "coverkit/0.1".to_owned(),
            timeout_secs: 10,
            retries: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub api_base: String,
    pub covers_base: String,
    pub request_delay_ms: u64,
    pub verify_cover: bool,
    pub search_with_author: bool,
}

impl CatalogConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_base: "https://openlibrary.org".to_owned(),
            covers_base: "https://covers.openlibrary.org".to_owned(),
            request_delay_ms: 1000,
            verify_cover: false,
            search_with_author: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub accounts_base: String,
    pub api_base: String,
    pub track_limit: u32,
    pub time_range: String,
    pub max_albums: usize,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            accounts_base: "https://accounts.spotify.com".to_owned(),
            api_base: "https://api.spotify.com".to_owned(),
            track_limit: 50,
            time_range: "long_term".to_owned(),
            max_albums: 5,
        }
    }
}

/// Credentials are never read from the config file.
#[derive(Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl SpotifyCredentials {
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Some(Self {
            client_id: var("SPOTIFY_CLIENT_ID")?,
            client_secret: var("SPOTIFY_CLIENT_SECRET")?,
            refresh_token: var("SPOTIFY_REFRESH_TOKEN")?,
        })
    }
}

impl std::fmt::Debug for SpotifyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub book_covers: String,
    pub book_backgrounds: String,
    pub album_covers: String,
    pub album_themes: String,
    pub album_composites: String,
    pub books_manifest: String,
    pub albums_json: String,
    pub albums_txt: String,
    pub backgrounds_json: String,
    pub record_image: String,
}

impl Layout {
    pub fn resolve(&self, public_dir: &Path, relative: &str) -> PathBuf {
        public_dir.join(relative)
    }

    pub fn public_path(dir: &str, file_name: &str) -> String {
        format!("/{}/{file_name}", dir.trim_matches('/'))
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            book_covers: "book_covers".to_owned(),
            book_backgrounds: "book_bgs".to_owned(),
            album_covers: "album_covers".to_owned(),
            album_themes: "album_themes".to_owned(),
            album_composites: "album_composites".to_owned(),
            books_manifest: "books_openlibrary.txt".to_owned(),
            albums_json: "top_albums.json".to_owned(),
            albums_txt: "top_albums.txt".to_owned(),
            backgrounds_json: "book_bgs.json".to_owned(),
            record_image: "record.webp".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BadgeConfig {
    pub radii: Vec<u32>,
    pub color_slots: Vec<String>,
    pub cover_size: u32,
    pub margin: u32,
    pub text_strip: u32,
    pub max_font_px: u32,
    pub min_font_px: u32,
    pub font_step_px: u32,
    pub title_font: Vec<PathBuf>,
    pub subtitle_font: Vec<PathBuf>,
    pub record_size: u32,
    pub record_offset_y: i64,
    pub overlay_scale: f64,
    pub overlay_offset_y: i64,
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            radii: vec![200, 180],
            color_slots: vec!["color1".to_owned(), "color2".to_owned()],
            cover_size: 250,
            margin: 40,
            text_strip: 60,
            max_font_px: 40,
            min_font_px: 10,
            font_step_px: 2,
            title_font: vec![
                PathBuf::from("DejaVuSans-Bold.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
                PathBuf::from("/usr/share/fonts/TTF/DejaVuSans-Bold.ttf"),
            ],
            subtitle_font: vec![
                PathBuf::from("DejaVuSans-Oblique.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Oblique.ttf"),
                PathBuf::from("/usr/share/fonts/TTF/DejaVuSans-Oblique.ttf"),
            ],
            record_size: 800,
            record_offset_y: 30,
            overlay_scale: 0.7,
            overlay_offset_y: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub width: u32,
    pub height: u32,
    pub cover_fraction: f64,
    pub max_angle_deg: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            width: 220,
            height: 320,
            cover_fraction: 0.8,
            max_angle_deg: 7.0,
        }
    }
}
