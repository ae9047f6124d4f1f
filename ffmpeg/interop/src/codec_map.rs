/*!
    Codec → host subtype tables.
*/

use ffmpeg_types::CodecId;

use crate::descriptor::{AudioSubtype, SubtitleSubtype};

/**
    Subtype for audio exposed from stream parameters alone (no decoder).

    Only codecs the host can consume compressed are listed; anything else
    yields `None` and the audio stream is not exposed.
*/
pub fn audio_passthrough_subtype(codec: CodecId) -> Option<AudioSubtype> {
    match codec {
        CodecId::Opus => Some(AudioSubtype::Other("OPUS")),
        _ => None,
    }
}

/**
    Timed-text subtype for a subtitle codec, or `None` if unrecognized.
*/
pub fn subtitle_subtype(codec: CodecId) -> Option<SubtitleSubtype> {
    match codec {
        CodecId::Ass | CodecId::Ssa => Some(SubtitleSubtype::Ssa),
        CodecId::DvdSubtitle => Some(SubtitleSubtype::VobSub),
        CodecId::HdmvPgsSubtitle => Some(SubtitleSubtype::Pgs),
        CodecId::Subrip | CodecId::Text => Some(SubtitleSubtype::Srt),
        _ => None,
    }
}

/**
    File extension for an attached-picture codec.
*/
pub fn thumbnail_extension(codec: CodecId) -> &'static str {
    match codec {
        CodecId::Mjpeg | CodecId::Mjpegb | CodecId::Jpeg2000 | CodecId::JpegLs => ".jpeg",
        CodecId::Png => ".png",
        CodecId::Bmp => ".bmp",
        _ => ".jpeg",
    }
}
