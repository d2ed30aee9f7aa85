//! Atrium - host binary.

use anyhow::Result;
use atrium::config::{Args, WindowGeometry};
use atrium::platform::HeadlessPlatform;
use atrium::{Host, HostConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Atrium");

    let config = HostConfig::from_args(args)?;
    std::fs::create_dir_all(&config.data_dir)?;
    let geometry = WindowGeometry::load(&config.window_file());
    let platform = HeadlessPlatform::new(geometry.width, geometry.height);

    let mut host = Host::new(config, platform)?;
    host.run()
}
