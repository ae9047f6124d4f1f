/*!
    Stream descriptors published to the host.
*/

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use ffmpeg_types::{MediaType, Rational};

/**
    Process-unique identity of a published stream.

    The host names streams by this id in sample and switch requests.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioSubtype {
    Aac,
    /// AAC with ADTS framing (no out-of-band configuration).
    AacAdts,
    Mp3,
    /// Decoded interleaved PCM.
    Pcm,
    /// A compressed subtype the host knows by name.
    Other(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioEncoding {
    pub subtype: AudioSubtype,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bitrate: u32,
    /// Only set for PCM.
    pub bits_per_sample: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoSubtype {
    H264,
    Nv12,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoEncoding {
    pub subtype: VideoSubtype,
    pub width: u32,
    pub height: u32,
    pub profile: Option<i32>,
    /// `None` when neither the decoder nor the stream report one.
    pub frame_rate: Option<Rational>,
    pub pixel_aspect_ratio: Option<Rational>,
    pub bitrate: u32,
    /// Clockwise rotation in degrees from the stream's `rotate` tag.
    pub rotation: Option<i32>,
    /// Frames may be interlaced or progressive.
    pub mixed_interlace: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubtitleSubtype {
    Ssa,
    Srt,
    VobSub,
    Pgs,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimedTextEncoding {
    pub subtype: SubtitleSubtype,
    /// Codec private data (e.g. the SSA header), empty if none.
    pub format_user_data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodingProperties {
    Audio(AudioEncoding),
    Video(VideoEncoding),
    TimedText(TimedTextEncoding),
}

impl EncodingProperties {
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Audio(_) => MediaType::Audio,
            Self::Video(_) => MediaType::Video,
            Self::TimedText(_) => MediaType::Subtitle,
        }
    }
}

/**
    Host-visible description of one selected stream.

    Immutable once published; shared with the host as `Arc<StreamDescriptor>`.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamDescriptor {
    id: StreamId,
    pub encoding: EncodingProperties,
    pub name: Option<String>,
    pub language: Option<String>,
}

impl StreamDescriptor {
    pub fn new(encoding: EncodingProperties) -> Self {
        Self {
            id: StreamId::next(),
            encoding,
            name: None,
            language: None,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn media_type(&self) -> MediaType {
        self.encoding.media_type()
    }

    pub fn audio(&self) -> Option<&AudioEncoding> {
        match &self.encoding {
            EncodingProperties::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&VideoEncoding> {
        match &self.encoding {
            EncodingProperties::Video(video) => Some(video),
            _ => None,
        }
    }

    pub fn timed_text(&self) -> Option<&TimedTextEncoding> {
        match &self.encoding {
            EncodingProperties::TimedText(text) => Some(text),
            _ => None,
        }
    }
}
