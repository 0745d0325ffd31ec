/// Playback tuning shared by the decode and output stages.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Target decode-ahead buffer in seconds; bounds seek latency and memory.
    pub buffer_seconds: f32,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Output device substring; `None` selects the host default.
    pub device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 1.0,
            refill_max_frames: 4096,
            device: None,
        }
    }
}
