use anyhow::{anyhow, Result};
use clap::Parser;
use log::info;

use sam_seg_viewer::{gui, Config};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    config.validate()?;
    info!(
        "Using encoder {} and decoder {}",
        config.encoder_path().display(),
        config.decoder_path().display()
    );

    gui::run(config).map_err(|e| anyhow!("GUI terminated with an error: {e}"))
}
