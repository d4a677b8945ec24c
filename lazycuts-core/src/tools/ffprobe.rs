use serde::Deserialize;

use crate::media::{AudioDescriptor, ClipMetadata, FrameRate, VideoDescriptor};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    pix_fmt: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

/// Decodes `ffprobe -print_format json -show_format -show_streams` output.
/// Only the first video and first audio stream are considered.
pub(crate) fn parse_metadata(payload: &[u8]) -> Result<ClipMetadata, serde_json::Error> {
    let output: FfprobeOutput = serde_json::from_slice(payload)?;

    let duration = output
        .format
        .and_then(|format| format.duration)
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0);

    let mut video = None;
    let mut audio = None;
    for stream in output.streams {
        match stream.codec_type.as_deref() {
            Some("video") if video.is_none() => {
                let (Some(width), Some(height)) = (stream.width, stream.height) else {
                    continue;
                };
                video = Some(VideoDescriptor {
                    codec: stream.codec_name.unwrap_or_default(),
                    width,
                    height,
                    frame_rate: stream.r_frame_rate.as_deref().and_then(FrameRate::parse),
                    pixel_format: stream.pix_fmt,
                });
            }
            Some("audio") if audio.is_none() => {
                audio = Some(AudioDescriptor {
                    codec: stream.codec_name.unwrap_or_default(),
                    sample_rate: stream
                        .sample_rate
                        .as_deref()
                        .and_then(|value| value.parse().ok()),
                    channels: stream.channels,
                });
            }
            _ => {}
        }
    }

    Ok(ClipMetadata {
        duration,
        video,
        audio,
    })
}
