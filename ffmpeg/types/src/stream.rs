/*!
    Stream information types.
*/

use std::collections::BTreeMap;
use std::fmt;

use crate::{CodecId, Rational};

/**
    Kind of elementary stream.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaType {
    Audio,
    Video,
    Subtitle,
}

impl MediaType {
    pub const ALL: [MediaType; 3] = [MediaType::Audio, MediaType::Video, MediaType::Subtitle];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Subtitle => "subtitle",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/**
    Stream disposition flags reported by the container.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Disposition {
    /// The stream is a single still image embedded as cover art.
    pub attached_pic: bool,
    /// The container marks this stream as the default for its type.
    pub default: bool,
}

impl Disposition {
    pub const fn attached_picture() -> Self {
        Self {
            attached_pic: true,
            default: false,
        }
    }
}

/**
    Codec parameters, as reported either by the container or by an opened
    decode context.

    Fields the engine cannot determine stay at their zero value; consumers
    treat zero as "unknown".
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecParameters {
    pub codec_id: CodecId,
    /// Codec configuration record (avcC, AudioSpecificConfig, subtitle header...).
    pub extradata: Vec<u8>,
    /// Bitrate in bits per second.
    pub bit_rate: i64,
    pub profile: Option<i32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub width: u32,
    pub height: u32,
    /// Frame rate as known by the decoder; `0/1` when unknown.
    pub frame_rate: Rational,
    pub sample_aspect_ratio: Rational,
}

impl CodecParameters {
    pub fn new(codec_id: CodecId) -> Self {
        Self {
            codec_id,
            extradata: Vec::new(),
            bit_rate: 0,
            profile: None,
            sample_rate: 0,
            channels: 0,
            width: 0,
            height: 0,
            frame_rate: Rational::new(0, 1),
            sample_aspect_ratio: Rational::new(0, 1),
        }
    }

    pub fn audio(codec_id: CodecId, sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            ..Self::new(codec_id)
        }
    }

    pub fn video(codec_id: CodecId, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::new(codec_id)
        }
    }

    pub fn with_extradata(mut self, extradata: impl Into<Vec<u8>>) -> Self {
        self.extradata = extradata.into();
        self
    }

    pub fn with_bit_rate(mut self, bit_rate: i64) -> Self {
        self.bit_rate = bit_rate;
        self
    }
}

/**
    A probed elementary stream inside an opened container.
*/
#[derive(Clone, Debug)]
pub struct StreamInfo {
    /// Index of the stream in container order.
    pub index: usize,
    pub media_type: MediaType,
    pub parameters: CodecParameters,
    pub time_base: Rational,
    /// Container-level average frame rate; `0/0` when unknown.
    pub avg_frame_rate: Rational,
    pub disposition: Disposition,
    /// Container metadata tags (`title`, `language`, `rotate`, ...).
    pub metadata: BTreeMap<String, String>,
    /// Encoded image bytes for attached-picture streams.
    pub attached_picture: Option<Vec<u8>>,
}

impl StreamInfo {
    pub fn new(index: usize, media_type: MediaType, parameters: CodecParameters) -> Self {
        Self {
            index,
            media_type,
            parameters,
            time_base: Rational::new(1, 90_000),
            avg_frame_rate: Rational::new(0, 0),
            disposition: Disposition::default(),
            metadata: BTreeMap::new(),
            attached_picture: None,
        }
    }

    pub fn codec_id(&self) -> CodecId {
        self.parameters.codec_id
    }

    /**
        Returns a metadata tag value, if present.
    */
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn is_attached_picture(&self) -> bool {
        self.disposition.attached_pic
    }

    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
