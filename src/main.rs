use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;

use lantern::config::{Args, Config, LoggingConfig};
use lantern::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = Config::load(&args)?;
    init_tracing(&cfg.logging)?;

    match args.worker {
        Some(index) => server::listener::run(&cfg, Some(index)).await,
        None if cfg.server.workers > 1 => server::worker::supervise(&cfg).await,
        None => server::listener::run(&cfg, None).await,
    }
}

fn init_tracing(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let level: tracing::Level = cfg.level.parse()?;

    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(level);

    match &cfg.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            subscriber
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => subscriber.init(),
    }

    Ok(())
}
