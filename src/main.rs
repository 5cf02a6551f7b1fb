use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cfg = fragment_sync::config::Config::parse();
    let default_level = if cfg.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    fragment_sync::app::run(cfg)
}
