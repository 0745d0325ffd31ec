//! NFC jukebox: plays the track mapped to whichever tag is on the reader.
//!
//! Three flows run concurrently:
//! - the NFC poll thread ([`nfc`]) resolves tags through the shared [`store`] and sends play
//!   commands;
//! - the main control loop ([`runtime::MainLoop`]) owns the playback controller, samples the
//!   buttons and the volume knob, and runs the inactivity watchdog;
//! - the HTTP thread serves the configuration web UI through the [`gateway`].

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod hardware;
pub mod input;
pub mod library;
pub mod nfc;
pub mod persist;
pub mod player;
pub mod power;
pub mod runtime;
pub mod status;
pub mod store;
pub mod watchdog;

mod http_api;
mod mdns;
