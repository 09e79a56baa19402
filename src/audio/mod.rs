//! Voice attachments: duration probing and Data URI encoding.

use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::{MessageId, MessageStore, MessageUpdate};

/// Duration recorded when probing fails
pub const FALLBACK_DURATION_SECS: u32 = 0;

pub type AudioResult<T> = Result<T, AudioError>;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no message with id {0}")]
    UnknownMessage(MessageId),
    #[error("message {0} is not a voice message")]
    NotVoice(MessageId),
    #[error("unsupported audio file type: {0}")]
    UnsupportedType(String),
    #[error("audio stream has no track")]
    NoTrack,
    #[error("could not determine audio duration")]
    UnknownDuration,
    #[error(transparent)]
    Decode(#[from] symphonia::core::errors::Error),
}

/// File extensions accepted as voice recordings, with their MIME type
const AUDIO_TYPES: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("m4a", "audio/mp4"),
    ("mp4", "audio/mp4"),
    ("aac", "audio/aac"),
    ("webm", "audio/webm"),
];

/// MIME type for an audio file name, by extension
pub fn mime_for(file_name: &str) -> AudioResult<&'static str> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    AUDIO_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .ok_or(AudioError::UnsupportedType(ext))
}

/// Format whole seconds as `m:ss`
pub fn format_duration(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Probe the playback length of an encoded audio clip, in seconds
pub fn probe_duration(data: &[u8], extension: Option<&str>) -> AudioResult<f64> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let (track_id, n_frames, sample_rate, time_base) = {
        let track = format.default_track().ok_or(AudioError::NoTrack)?;
        let params = &track.codec_params;
        (track.id, params.n_frames, params.sample_rate, params.time_base)
    };

    if let (Some(frames), Some(rate)) = (n_frames, sample_rate) {
        if rate > 0 {
            return Ok(frames as f64 / rate as f64);
        }
    }

    // No frame count in the header: walk the packets
    let mut end_ts = 0u64;
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() == track_id {
            end_ts = end_ts.max(packet.ts() + packet.dur());
        }
    }

    match (time_base, sample_rate) {
        (Some(tb), _) => {
            let time = tb.calc_time(end_ts);
            Ok(time.seconds as f64 + time.frac)
        }
        (None, Some(rate)) if rate > 0 => Ok(end_ts as f64 / rate as f64),
        _ => Err(AudioError::UnknownDuration),
    }
}

/// Attach an audio clip to voice message `id`.
///
/// Returns the recorded duration in whole seconds. A clip whose length
/// can't be determined is still attached, with the fallback duration.
pub fn attach_audio(
    store: &mut MessageStore,
    id: MessageId,
    bytes: &[u8],
    file_name: &str,
) -> AudioResult<u32> {
    let message = store.get(id).ok_or(AudioError::UnknownMessage(id))?;
    if !message.is_voice() {
        return Err(AudioError::NotVoice(id));
    }

    let mime = mime_for(file_name)?;
    let extension = Path::new(file_name).extension().and_then(|e| e.to_str());

    let duration = match probe_duration(bytes, extension) {
        Ok(secs) => secs.round().max(0.0) as u32,
        Err(e) => {
            warn!("Could not probe duration of {}: {}", file_name, e);
            FALLBACK_DURATION_SECS
        }
    };
    debug!("Attaching {} ({} bytes, {}s) to message {}", file_name, bytes.len(), duration, id);

    store.update(
        id,
        MessageUpdate::Audio {
            data: Some(to_data_uri(mime, bytes)),
            file_name: Some(file_name.to_string()),
        },
    );
    store.update(id, MessageUpdate::Duration(duration));
    Ok(duration)
}

/// Drop the audio of message `id`; returns false for unknown ids
pub fn remove_audio(store: &mut MessageStore, id: MessageId) -> bool {
    let found = store.update(
        id,
        MessageUpdate::Audio {
            data: None,
            file_name: None,
        },
    );
    if found {
        store.update(id, MessageUpdate::Duration(0));
    }
    found
}
