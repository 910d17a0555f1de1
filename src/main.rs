//! docd service daemon entry point.

use anyhow::{Context, Result};
use clap::Parser;

use docd::config::Settings;
use docd::logging;
use docd::server::{self, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load().context("error loading configuration")?;
    cli.apply(&mut settings).map_err(anyhow::Error::msg)?;

    let _guard = logging::init(&settings.log_level, &settings.log_dir, "docd")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.worker_threads())
        .enable_all()
        .build()
        .context("error building runtime")?;
    runtime.block_on(server::run(settings))
}
