//! Audio engine for the jukebox: Symphonia decode thread feeding a CPAL output stream.
//!
//! The controller in the `jukebox` crate only talks to [`engine::AudioEngine`]; everything
//! else here is plumbing behind [`engine::CpalEngine`].

pub mod config;
pub mod decode;
pub mod device;
pub mod engine;
pub mod playback;
pub mod queue;

pub use engine::{AudioEngine, CpalEngine, OpenError, SeekOutcome, TrackInfo};
