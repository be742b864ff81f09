use std::collections::HashMap;

use anyhow::Context as _;
use serde::Deserialize;
use url::Url;

use crate::config::CatalogConfig;
use crate::http::HttpClient;

/// Placeholder covers served for unknown ids are tiny GIFs.
const MIN_VERIFIED_COVER_BYTES: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub canonical_title: String,
    pub cover_url: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BookData {
    title: Option<String>,
    url: Option<String>,
    key: Option<String>,
    cover: Option<CoverLinks>,
}

#[derive(Debug, Default, Deserialize)]
struct CoverLinks {
    large: Option<String>,
    medium: Option<String>,
    small: Option<String>,
}

impl CoverLinks {
    fn best(&self) -> Option<&str> {
        [&self.large, &self.medium, &self.small]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|link| !link.trim().is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchDoc {
    title: Option<String>,
    key: Option<String>,
    cover_i: Option<i64>,
    #[serde(default)]
    edition_key: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CoverRef {
    Direct(String),
    CoverId(i64),
    EditionId(String),
    Isbn(String),
}

pub struct Catalog {
    http: HttpClient,
    config: CatalogConfig,
}

impl Catalog {
    pub fn new(http: HttpClient, config: CatalogConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Never fails: lookup errors are logged and treated as "not found".
    pub fn resolve(&self, title: &str, author: &str, isbn: Option<&str>) -> Resolution {
        let mut resolution = Resolution {
            canonical_title: title.to_owned(),
            cover_url: None,
            source_url: None,
        };
        let isbn = isbn.map(str::trim).filter(|isbn| !isbn.is_empty());

        if let Some(isbn) = isbn {
            match self.lookup_isbn(isbn) {
                Ok(Some(book)) => {
                    if let Some(book_title) = book.title.as_deref().filter(|t| !t.trim().is_empty()) {
                        resolution.canonical_title = book_title.to_owned();
                    }
                    resolution.source_url = book
                        .url
                        .clone()
                        .filter(|u| !u.trim().is_empty())
                        .or_else(|| book.key.as_deref().map(|key| self.source_link(key)));
                    if let Some(link) = book.cover.as_ref().and_then(CoverLinks::best) {
                        resolution.cover_url = self.accept(CoverRef::Direct(link.to_owned()));
                        return resolution;
                    }
                    tracing::debug!(isbn, "isbn record has no cover; searching");
                }
                Ok(None) => tracing::debug!(isbn, "isbn not in catalog; searching"),
                Err(err) => {
                    tracing::warn!(isbn, err = %format!("{err:#}"), "isbn lookup failed; searching")
                }
            }
        }

        match self.search(title, author) {
            Ok(Some(doc)) => {
                if resolution.source_url.is_none() {
                    resolution.source_url = doc.key.as_deref().map(|key| self.source_link(key));
                }
                if isbn.is_none()
                    && let Some(doc_title) = doc.title.as_deref().filter(|t| !t.trim().is_empty())
                {
                    resolution.canonical_title = doc_title.to_owned();
                }
                for candidate in search_candidates(&doc) {
                    if let Some(url) = self.accept(candidate) {
                        resolution.cover_url = Some(url);
                        return resolution;
                    }
                }
            }
            Ok(None) => tracing::debug!(title, "search returned no documents"),
            Err(err) => tracing::warn!(title, err = %format!("{err:#}"), "title search failed"),
        }

        if let Some(isbn) = isbn {
            resolution.cover_url = self.accept(CoverRef::Isbn(isbn.to_owned()));
        }
        if resolution.cover_url.is_none() {
            tracing::info!(title, "no cover found");
        }
        resolution
    }

    fn lookup_isbn(&self, isbn: &str) -> anyhow::Result<Option<BookData>> {
        let bibkey = format!("ISBN:{isbn}");
        let url = Url::parse_with_params(
            &format!("{}/api/books", self.api_base()),
            &[("bibkeys", bibkey.as_str()), ("format", "json"), ("jscmd", "data")],
        )
        .context("build isbn lookup url")?;

        let mut data: HashMap<String, BookData> = self.http.get_json(&url)?;
        Ok(data.remove(&bibkey))
    }

    fn search(&self, title: &str, author: &str) -> anyhow::Result<Option<SearchDoc>> {
        if title.trim().is_empty() {
            return Ok(None);
        }
        let mut params = vec![("title", title.trim())];
        if self.config.search_with_author && !author.trim().is_empty() {
            params.push(("author", author.trim()));
        }
        let url = Url::parse_with_params(&format!("{}/search.json", self.api_base()), &params)
            .context("build search url")?;

        let response: SearchResponse = self.http.get_json(&url)?;
        Ok(response.docs.into_iter().next())
    }

    fn accept(&self, candidate: CoverRef) -> Option<String> {
        let url = self.cover_url(&candidate);
        if matches!(candidate, CoverRef::Direct(_)) || !self.config.verify_cover {
            return Some(url);
        }
        if self.verify(&url) {
            Some(url)
        } else {
            tracing::debug!(url, "constructed cover rejected");
            None
        }
    }

    fn verify(&self, raw_url: &str) -> bool {
        let Ok(url) = Url::parse(raw_url) else {
            return false;
        };
        match self.http.get(&url) {
            Ok(fetched) => {
                fetched.is_success()
                    && fetched.is_image()
                    && fetched.body.len() > MIN_VERIFIED_COVER_BYTES
            }
            Err(err) => {
                tracing::warn!(url = %url, err = %format!("{err:#}"), "cover verification failed");
                false
            }
        }
    }

    fn cover_url(&self, candidate: &CoverRef) -> String {
        let base = self.config.covers_base.trim_end_matches('/');
        match candidate {
            CoverRef::Direct(url) => url.clone(),
            CoverRef::CoverId(id) => format!("{base}/b/id/{id}-L.jpg"),
            CoverRef::EditionId(olid) => format!("{base}/b/olid/{olid}-L.jpg"),
            CoverRef::Isbn(isbn) => format!("{base}/b/isbn/{isbn}-L.jpg"),
        }
    }

    fn source_link(&self, key: &str) -> String {
        format!("{}{key}", self.api_base())
    }

    fn api_base(&self) -> &str {
        self.config.api_base.trim_end_matches('/')
    }
}

fn search_candidates(doc: &SearchDoc) -> Vec<CoverRef> {
    let mut candidates = Vec::new();
    if let Some(id) = doc.cover_i.filter(|id| *id > 0) {
        candidates.push(CoverRef::CoverId(id));
    }
    if let Some(olid) = doc.edition_key.iter().find(|k| !k.trim().is_empty()) {
        candidates.push(CoverRef::EditionId(olid.clone()));
    }
    candidates
}
