//! Streaming decode stage.
//!
//! Probes a file with Symphonia, then decodes packets on a background thread into a
//! [`SharedAudio`] queue. The thread also services seek and stop requests between packets.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::engine::OpenError;
use crate::queue::SharedAudio;

/// Requests serviced by the decode thread between packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeControl {
    Seek(Duration),
    Stop,
}

/// A probed file, ready to decode.
pub struct DecodeSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    pub sample_rate: u32,
    pub channels: usize,
    pub duration: Option<Duration>,
    pub codec: Option<String>,
}

/// Open and probe `path`, failing early if it cannot be decoded.
pub fn open_file(path: &Path) -> Result<DecodeSource, OpenError> {
    let file = File::open(path).map_err(|source| OpenError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let format = probed.format;

    let track = format.default_track().ok_or(OpenError::NoAudioTrack)?;
    let track_id = track.id;
    let params: CodecParameters = track.codec_params.clone();
    let sample_rate = params.sample_rate.ok_or(OpenError::UnknownSpec)?;
    let channels = params.channels.ok_or(OpenError::UnknownSpec)?.count();
    let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

    Ok(DecodeSource {
        format,
        decoder,
        track_id,
        sample_rate,
        channels,
        duration: duration_from_codec_params(&params),
        codec: codec_name_from_params(&params),
    })
}

/// Spawn the decode thread. The queue is closed on EOF, stop, or error.
pub fn spawn_decoder(
    source: DecodeSource,
    queue: Arc<SharedAudio>,
    control: Receiver<DecodeControl>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        decode_loop(source, &queue, &control);
        queue.close();
    })
}

fn decode_loop(mut source: DecodeSource, queue: &SharedAudio, control: &Receiver<DecodeControl>) {
    loop {
        match control.try_recv() {
            Ok(DecodeControl::Seek(to)) => {
                queue.clear();
                if let Err(e) = source.seek(to) {
                    // Usually a target past the end of a track whose length was unknown.
                    tracing::info!(
                        error = %e,
                        target_ms = to.as_millis() as u64,
                        "seek failed; ending track"
                    );
                    break;
                }
            }
            Ok(DecodeControl::Stop) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        let packet = match source.format.next_packet() {
            Ok(p) => p,
            Err(_) => break, // EOF
        };
        if packet.track_id() != source.track_id {
            continue;
        }

        let decoded = match source.decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, "skipping undecodable packet");
                continue;
            }
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);

        if !queue.push_interleaved_blocking(sample_buf.samples()) {
            break;
        }
    }
}

impl DecodeSource {
    fn seek(&mut self, to: Duration) -> Result<(), SymphoniaError> {
        let time = Time::new(to.as_secs(), f64::from(to.subsec_millis()) / 1000.0);
        self.format.seek(
            SeekMode::Coarse,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        )?;
        self.decoder.reset();
        Ok(())
    }
}

/// Duration from container metadata, when it reports total frames.
fn duration_from_codec_params(params: &CodecParameters) -> Option<Duration> {
    let frames = params.n_frames?;
    let rate = u64::from(params.sample_rate?);
    if rate == 0 {
        return None;
    }
    Some(Duration::from_millis(frames.saturating_mul(1000) / rate))
}

fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        _ => return None,
    };
    Some(name.to_string())
}
