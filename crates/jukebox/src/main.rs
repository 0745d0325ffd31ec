use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use jukebox::cli::{Args, Command};
use jukebox::config::{FileConfig, JukeboxConfig};
use jukebox::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,jukebox=info")),
        )
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let file = match args.config.as_deref() {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = JukeboxConfig::resolve(file, args.overrides())?;

    match args.cmd.unwrap_or(Command::Run) {
        Command::Run => runtime::run(config, true),
        Command::Play { path } => runtime::run_play(
            &path,
            config.playback_config(),
            config.playback.initial_volume,
            config.playback.max_volume,
        ),
    }
}
