use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::catalog::Catalog;
use crate::cli::BooksArgs;
use crate::config::{Config, Layout};
use crate::cover_cache::{Cache, CoverCache, DiskCache, write_atomic};
use crate::formats::{BookRow, CatalogRecord};
use crate::http::HttpClient;

pub fn run(args: BooksArgs, config: &Config) -> anyhow::Result<()> {
    let public_dir = PathBuf::from(&args.public_dir);
    let input_path = PathBuf::from(&args.input);
    let out_path = args
        .out
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.layout.resolve(&public_dir, &config.layout.books_manifest));

    let mut catalog_config = config.catalog.clone();
    if let Some(delay_ms) = args.delay_ms {
        catalog_config.request_delay_ms = delay_ms;
    }
    if args.verify_cover {
        catalog_config.verify_cover = true;
    }

    let records = read_records(&input_path)?;
    let http = HttpClient::new(&config.http)?;
    let catalog = Catalog::new(http.clone(), catalog_config);
    let covers = CoverCache::new(
        DiskCache::new(config.layout.resolve(&public_dir, &config.layout.book_covers)),
        http,
    );

    tracing::info!(
        input = %input_path.display(),
        records = records.len(),
        "resolving books"
    );
    let rows = resolve_books(&records, &catalog, &covers, &config.layout);
    write_manifest(&out_path, &rows)?;

    let with_cover = rows.iter().filter(|r| !r.cover_path.is_empty()).count();
    tracing::info!(
        out = %out_path.display(),
        rows = rows.len(),
        with_cover,
        "wrote books manifest"
    );
    Ok(())
}

pub fn read_records(path: &Path) -> anyhow::Result<Vec<CatalogRecord>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read books input: {}", path.display()))?;

    let mut records = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = line.split('\t').collect::<Vec<_>>();
        if fields.len() < 3 {
            tracing::warn!(
                line = idx + 1,
                fields = fields.len(),
                "skipping malformed input line"
            );
            continue;
        }
        records.push(CatalogRecord::new(fields[0], fields[1], fields[2]));
    }
    Ok(records)
}

pub fn resolve_books<C: Cache>(
    records: &[CatalogRecord],
    catalog: &Catalog,
    covers: &CoverCache<C>,
    layout: &Layout,
) -> Vec<BookRow> {
    let delay = catalog.config().request_delay();
    let mut rows = Vec::with_capacity(records.len());

    for (idx, record) in records.iter().enumerate() {
        if idx > 0 && !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let resolution = catalog.resolve(&record.title, &record.author, record.isbn.as_deref());
        let cover_path = resolution
            .cover_url
            .as_deref()
            .and_then(|url| covers.ensure_local(&record.identity(), url))
            .map(|asset| Layout::public_path(&layout.book_covers, &asset.file_name))
            .unwrap_or_default();

        tracing::debug!(
            title = %record.title,
            canonical = %resolution.canonical_title,
            cover = %cover_path,
            "book resolved"
        );
        rows.push(BookRow {
            title: record.title.clone(),
            author: record.author.clone(),
            isbn: record.isbn.clone().unwrap_or_default(),
            cover_path,
            source_url: resolution.source_url.unwrap_or_default(),
        });
    }
    rows
}

pub fn write_manifest(path: &Path, rows: &[BookRow]) -> anyhow::Result<()> {
    let mut contents = String::new();
    for row in rows {
        contents.push_str(&row.to_tsv_line());
        contents.push('\n');
    }
    write_atomic(path, contents.as_bytes())
        .with_context(|| format!("write books manifest: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_records_skips_short_lines_and_cleans_isbns() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("books.txt");
        std::fs::write(
            &path,
            "Dune\tFrank Herbert\t=\"9780441013593\"\nbroken line\n\nEmma\tJane Austen\t\n",
        )?;

        let records = read_records(&path)?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].isbn.as_deref(), Some("9780441013593"));
        assert_eq!(records[1].title, "Emma");
        assert_eq!(records[1].isbn, None);
        assert_eq!(records[1].identity(), "Emma");
        Ok(())
    }

    #[test]
    fn missing_input_is_an_error() {
        let err = read_records(Path::new("/nonexistent/books.txt")).unwrap_err();
        assert!(format!("{err:#}").contains("read books input"));
    }

    #[test]
    fn manifest_has_one_line_per_row_and_trailing_newline() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("out.txt");
        let rows = vec![
            BookRow {
                title: "Dune".to_owned(),
                author: "Frank Herbert".to_owned(),
                isbn: "1".to_owned(),
                cover_path: "/book_covers/1.jpg".to_owned(),
                source_url: "https://openlibrary.org/books/OL1M".to_owned(),
            },
            BookRow {
                title: "Emma".to_owned(),
                author: "Jane Austen".to_owned(),
                isbn: String::new(),
                cover_path: String::new(),
                source_url: String::new(),
            },
        ];
        write_manifest(&path, &rows)?;

        let written = std::fs::read_to_string(&path)?;
        assert_eq!(
            written,
            "Dune\tFrank Herbert\t1\t/book_covers/1.jpg\thttps://openlibrary.org/books/OL1M\nEmma\tJane Austen\t\t\t\n"
        );
        Ok(())
    }
}
