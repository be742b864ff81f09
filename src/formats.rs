use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub cover_url: Option<String>,
    pub source_url: Option<String>,
}

impl CatalogRecord {
    pub fn new(title: &str, author: &str, isbn: &str) -> Self {
        let isbn = clean_isbn(isbn);
        Self {
            title: title.trim().to_owned(),
            author: author.trim().to_owned(),
            isbn: (!isbn.is_empty()).then_some(isbn),
            cover_url: None,
            source_url: None,
        }
    }

    pub fn identity(&self) -> String {
        match self.isbn.as_deref() {
            Some(isbn) => isbn.to_owned(),
            None => normalize_title(&self.title),
        }
    }
}

/// Spreadsheet exports wrap ISBNs as `="9780…"`.
pub fn clean_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '=' | '"' | '\''))
        .collect::<String>()
        .trim()
        .to_owned()
}

pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect::<String>()
        .trim_end()
        .replace(' ', "_")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRow {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub cover_path: String,
    pub source_url: String,
}

impl BookRow {
    pub fn to_tsv_line(&self) -> String {
        [
            self.title.as_str(),
            self.author.as_str(),
            self.isbn.as_str(),
            self.cover_path.as_str(),
            self.source_url.as_str(),
        ]
        .map(tsv_field)
        .join("\t")
    }
}

fn tsv_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRecord {
    pub album: String,
    pub album_id: String,
    pub artist: String,
    #[serde(default)]
    pub artist_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_path: Option<String>,
}

impl AlbumRecord {
    pub fn cover_file_name(&self) -> String {
        self.cover_path
            .clone()
            .unwrap_or_else(|| format!("{}.jpg", self.album_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundRecord {
    pub id: String,
    pub source: String,
    pub output: String,
    pub angle_deg: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundManifest {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub backgrounds: Vec<BackgroundRecord>,
}
