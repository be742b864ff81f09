use std::path::Path;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    coverkit::logging::init().context("init logging")?;

    let cli = coverkit::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let config = coverkit::config::Config::load(cli.config.as_deref().map(Path::new))
        .context("load config")?;

    match cli.command {
        coverkit::cli::Command::Books(args) => {
            coverkit::books::run(args, &config).context("books")?;
        }
        coverkit::cli::Command::Albums(args) => {
            coverkit::albums::run(args, &config).context("albums")?;
        }
        coverkit::cli::Command::Overlays(args) => {
            coverkit::overlays::run(args, &config).context("overlays")?;
        }
        coverkit::cli::Command::Themes(args) => {
            coverkit::themes::run(args, &config).context("themes")?;
        }
        coverkit::cli::Command::Backgrounds(args) => {
            coverkit::backgrounds::run(args, &config).context("backgrounds")?;
        }
        coverkit::cli::Command::Build(args) => {
            coverkit::build::run(args, &config).context("build")?;
        }
    }

    Ok(())
}
