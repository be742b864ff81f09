use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context as _;
use url::Url;

use crate::http::{HttpClient, parse_remote_url};

pub trait Cache {
    fn has(&self, key: &str) -> bool;
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()>;
    fn path_for(&self, key: &str) -> PathBuf;
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Cache for DiskCache {
    fn has(&self, key: &str) -> bool {
        validate_key(key).is_ok() && self.path_for(key).is_file()
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read cached file: {}", path.display())),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        validate_key(key)?;
        let path = self.path_for(key);
        write_atomic(&path, bytes)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Cache for MemoryCache {
    fn has(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|e| e.contains_key(key))
            .unwrap_or(false)
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        validate_key(key)?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))?;
        entries.insert(key.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        PathBuf::from(key)
    }
}

fn validate_key(key: &str) -> anyhow::Result<()> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
        anyhow::bail!("invalid cache key: {key:?}");
    }
    Ok(())
}

/// Writes to a temp file beside `path` and renames it into place, so readers
/// never observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in: {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp file for: {}", path.display()))?;
    tmp.flush().context("flush temp file")?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("rename temp file to: {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    Jpeg,
    Webp,
}

impl AssetFormat {
    pub fn from_url(url: &Url) -> Self {
        let ext = url
            .path()
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("webp") => Self::Webp,
            _ => Self::Jpeg,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub id: String,
    pub file_name: String,
    pub file_path: PathBuf,
    pub format: AssetFormat,
}

pub struct CoverCache<C> {
    cache: C,
    http: HttpClient,
}

impl<C: Cache> CoverCache<C> {
    pub fn new(cache: C, http: HttpClient) -> Self {
        Self { cache, http }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn ensure_local(&self, identifier: &str, remote_url: &str) -> Option<LocalAsset> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            tracing::warn!(remote_url, "cover skipped: empty identifier");
            return None;
        }
        let Some(url) = parse_remote_url(remote_url) else {
            tracing::debug!(id = identifier, remote_url, "cover skipped: no usable url");
            return None;
        };

        let format = AssetFormat::from_url(&url);
        let file_name = format!("{identifier}.{}", format.extension());
        let asset = LocalAsset {
            id: identifier.to_owned(),
            file_path: self.cache.path_for(&file_name),
            file_name: file_name.clone(),
            format,
        };

        if self.cache.has(&file_name) {
            tracing::debug!(id = identifier, path = %asset.file_path.display(), "cover cached");
            return Some(asset);
        }

        let fetched = match self.http.get(&url) {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::warn!(id = identifier, url = %url, err = %format!("{err:#}"), "cover download failed");
                return None;
            }
        };
        if !fetched.is_success() || fetched.body.is_empty() {
            tracing::warn!(
                id = identifier,
                url = %url,
                status = fetched.status,
                bytes = fetched.body.len(),
                "cover download returned no image"
            );
            return None;
        }

        if let Err(err) = self.cache.put(&file_name, &fetched.body) {
            tracing::warn!(id = identifier, err = %format!("{err:#}"), "cover write failed");
            return None;
        }

        tracing::info!(id = identifier, path = %asset.file_path.display(), bytes = fetched.body.len(), "cover downloaded");
        Some(asset)
    }
}
