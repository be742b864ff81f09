mod http_stub;

use coverkit::config::HttpConfig;
use coverkit::cover_cache::{AssetFormat, Cache as _, CoverCache, DiskCache};
use coverkit::http::HttpClient;
use http_stub::{Reply, StubServer};

fn covers(dir: &std::path::Path) -> anyhow::Result<CoverCache<DiskCache>> {
    let http = HttpClient::new(&HttpConfig {
        timeout_secs: 5,
        retries: 0,
        ..HttpConfig::default()
    })?;
    Ok(CoverCache::new(DiskCache::new(dir), http))
}

#[test]
fn cached_cover_is_not_downloaded_again() -> anyhow::Result<()> {
    let stub = StubServer::spawn(|url| match url.path() {
        "/covers/abc.webp" => Reply::image(b"webp bytes".to_vec()),
        _ => Reply::status(404),
    });
    let temp = tempfile::TempDir::new()?;
    let covers = covers(temp.path())?;
    let url = format!("{}/covers/abc.webp", stub.base_url);

    let first = covers
        .ensure_local("album1", &url)
        .ok_or_else(|| anyhow::anyhow!("first download"))?;
    assert_eq!(first.format, AssetFormat::Webp);
    assert_eq!(first.file_path, temp.path().join("album1.webp"));
    assert_eq!(stub.hits(), 1);

    let second = covers
        .ensure_local("album1", &url)
        .ok_or_else(|| anyhow::anyhow!("cached copy"))?;
    assert_eq!(second, first);
    assert_eq!(stub.hits(), 1);
    assert_eq!(std::fs::read(&second.file_path)?, b"webp bytes");
    Ok(())
}

#[test]
fn failed_download_writes_no_file() -> anyhow::Result<()> {
    let stub = StubServer::spawn(|_| Reply::status(404));
    let temp = tempfile::TempDir::new()?;
    let covers = covers(temp.path())?;

    assert_eq!(
        covers.ensure_local("gone", &format!("{}/covers/gone.jpg", stub.base_url)),
        None
    );
    assert_eq!(covers.ensure_local("bad", "not a url"), None);
    assert!(!covers.cache().has("gone.jpg"));
    assert_eq!(std::fs::read_dir(temp.path())?.count(), 0);
    Ok(())
}

#[test]
fn server_errors_are_retried_once() -> anyhow::Result<()> {
    let stub = StubServer::spawn(|_| Reply::status(503));
    let temp = tempfile::TempDir::new()?;
    let http = HttpClient::new(&HttpConfig {
        timeout_secs: 5,
        retries: 1,
        ..HttpConfig::default()
    })?;
    let covers = CoverCache::new(DiskCache::new(temp.path()), http);

    assert_eq!(
        covers.ensure_local("x", &format!("{}/x.jpg", stub.base_url)),
        None
    );
    assert_eq!(stub.hits(), 2);
    Ok(())
}
