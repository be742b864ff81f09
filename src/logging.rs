use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

pub fn init() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(DEFAULT_FILTER)?)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn env_filter(default: &str) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .with_context(|| format!("build log filter (default {default:?})"))
}
