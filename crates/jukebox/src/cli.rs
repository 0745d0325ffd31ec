use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Overrides;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "jukebox", version = VERSION, about = "NFC tag jukebox")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// TOML config file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// HTTP API bind address, e.g. 0.0.0.0:8080
    #[arg(long)]
    pub http_bind: Option<SocketAddr>,

    /// Music folder
    #[arg(long)]
    pub music_dir: Option<PathBuf>,

    /// Tag mapping file
    #[arg(long)]
    pub mappings: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the jukebox (default)
    Run,

    /// Play one file through the output and exit (hardware check)
    Play {
        /// Path to an audio file
        path: PathBuf,
    },
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            http_bind: self.http_bind,
            device: self.device.clone(),
            music_dir: self.music_dir.clone(),
            mappings_file: self.mappings.clone(),
        }
    }
}
