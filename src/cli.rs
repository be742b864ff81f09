use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML configuration file (defaults apply to anything it omits).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve book covers from the catalog and write the books manifest.
    Books(BooksArgs),
    /// Fetch top albums from Spotify and cache their covers.
    Albums(AlbumsArgs),
    /// Place album covers on the record image.
    Overlays(OverlaysArgs),
    /// Render themed badges for album covers.
    Themes(ThemesArgs),
    /// Render rotated backgrounds for cached book covers.
    Backgrounds(BackgroundsArgs),
    /// Run books, albums, themes and backgrounds in order.
    Build(BuildArgs),
}

#[derive(Debug, Args)]
pub struct BooksArgs {
    /// Tab-delimited `title \t author \t isbn` input.
    #[arg(long)]
    pub input: String,

    /// Site public directory (covers and manifest are written below it).
    #[arg(long, default_value = "public")]
    pub public_dir: String,

    /// Manifest output path (default: `<public-dir>/books_openlibrary.txt`).
    #[arg(long)]
    pub out: Option<String>,

    /// Delay between catalog records, overriding the config value.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Download constructed cover URLs and reject placeholder images.
    #[arg(long, default_value_t = false)]
    pub verify_cover: bool,
}

#[derive(Debug, Args)]
pub struct AlbumsArgs {
    /// Site public directory.
    #[arg(long, default_value = "public")]
    pub public_dir: String,

    /// Maximum albums to keep, overriding the config value.
    #[arg(long)]
    pub max_albums: Option<usize>,
}

#[derive(Debug, Args)]
pub struct OverlaysArgs {
    /// Site public directory.
    #[arg(long, default_value = "public")]
    pub public_dir: String,

    /// Album JSON (default: `<public-dir>/top_albums.json`).
    #[arg(long)]
    pub albums: Option<String>,

    /// Record image (default: `<public-dir>/record.webp`).
    #[arg(long)]
    pub record: Option<String>,

    /// Cover size relative to the record.
    #[arg(long)]
    pub scale: Option<f64>,

    /// Vertical shift of the cover in pixels, positive moves it down.
    #[arg(long, allow_hyphen_values = true)]
    pub offset_y: Option<i64>,

    /// Flatten onto white instead of keeping transparency.
    #[arg(long, default_value_t = false)]
    pub opaque: bool,
}

#[derive(Debug, Args)]
pub struct ThemesArgs {
    /// Site public directory.
    #[arg(long, default_value = "public")]
    pub public_dir: String,

    /// Album JSON (default: `<public-dir>/top_albums.json`).
    #[arg(long)]
    pub albums: Option<String>,

    /// Image stretched over each badge after drawing.
    #[arg(long)]
    pub overlay: Option<String>,

    /// Place each badge on the record image.
    #[arg(long, default_value_t = false)]
    pub on_record: bool,

    /// Circle radii, largest first (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub radii: Vec<u32>,

    /// Palette slots or `#rrggbb` colours, one per radius (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub colors: Vec<String>,

    /// Skip album and artist labels.
    #[arg(long, default_value_t = false)]
    pub no_labels: bool,
}

#[derive(Debug, Args)]
pub struct BackgroundsArgs {
    /// Site public directory.
    #[arg(long, default_value = "public")]
    pub public_dir: String,

    /// Seed for the rotation angles (random when omitted).
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Tab-delimited `title \t author \t isbn` input.
    #[arg(long)]
    pub input: String,

    /// Site public directory.
    #[arg(long, default_value = "public")]
    pub public_dir: String,

    /// Seed for the background rotation angles.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Download constructed cover URLs and reject placeholder images.
    #[arg(long, default_value_t = false)]
    pub verify_cover: bool,
}
