/*!
    Sample providers.

    A provider turns packets of one stream into host samples. The variant is
    picked once by the factory and never changes afterwards:

    - [`PassthroughProvider`]: compressed audio and subtitles, packets as-is.
    - [`AvcProvider`]: length-prefixed H.264 rewritten to start codes.
    - [`AnnexBProvider`]: start-code H.264 with its configuration prepended.
    - [`DecodingProvider`]: decoded PCM or NV12 frames.
*/

use std::fmt;

use ffmpeg_types::{Pts, Rational, Ticks};

use crate::engine::DecodeContext;
use crate::error::Result;
use crate::reader::PacketReader;

mod decoding;
mod h264;
mod passthrough;

pub use decoding::DecodingProvider;
pub use h264::{AnnexBProvider, AvcProvider};
pub use passthrough::PassthroughProvider;

/**
    One unit of media handed to the host.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSample {
    pub data: Vec<u8>,
    /// Presentation time relative to the container start.
    pub timestamp: Ticks,
    pub duration: Ticks,
    pub keyframe: bool,
    /// First sample after the provider was flushed.
    pub discontinuity: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderVariant {
    AudioPassthrough,
    AudioDecode,
    VideoPassthroughAvc,
    VideoPassthroughAnnexB,
    VideoDecode,
    Subtitle,
}

impl fmt::Display for ProviderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AudioPassthrough => "audio passthrough",
            Self::AudioDecode => "audio decode",
            Self::VideoPassthroughAvc => "video passthrough (avc)",
            Self::VideoPassthroughAnnexB => "video passthrough (annex b)",
            Self::VideoDecode => "video decode",
            Self::Subtitle => "subtitle",
        };
        f.write_str(name)
    }
}

/**
    Where a stream sits in the container and how its timestamps map to host
    time.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamTiming {
    pub stream_index: usize,
    pub time_base: Rational,
    /// Container start time, subtracted from every timestamp.
    pub start_offset: Ticks,
}

impl StreamTiming {
    pub fn timestamp(&self, pts: Pts) -> Ticks {
        Ticks::from_pts(pts.0, self.time_base) - self.start_offset
    }

    pub fn duration(&self, duration: i64) -> Ticks {
        Ticks::from_pts(duration, self.time_base)
    }
}

/**
    What a provider may touch while producing a sample.
*/
pub struct ProduceContext<'a> {
    pub reader: &'a mut PacketReader,
    pub decoder: Option<&'a mut dyn DecodeContext>,
}

/**
    The closed provider interface.
*/
pub trait SampleProvider: Send {
    fn variant(&self) -> ProviderVariant;

    fn stream_index(&self) -> usize;

    /**
        Prepare for production. Called once by the factory, with the stream's
        decode context if one was opened.
    */
    fn allocate_resources(&mut self, decoder: Option<&mut dyn DecodeContext>) -> Result<()>;

    fn enable(&mut self);

    fn disable(&mut self);

    fn is_enabled(&self) -> bool;

    /**
        Discard internal buffered state. The next sample is flagged as a
        discontinuity.
    */
    fn flush(&mut self);

    /**
        Produce the next sample. `Ok(None)` at end of stream or while disabled.
    */
    fn produce_next(&mut self, cx: ProduceContext<'_>) -> Result<Option<MediaSample>>;
}

/**
    State shared by every provider variant.
*/
#[derive(Debug)]
pub(crate) struct ProviderCore {
    pub(crate) timing: StreamTiming,
    enabled: bool,
    discontinuity: bool,
    next_timestamp: Ticks,
}

impl ProviderCore {
    pub(crate) fn new(timing: StreamTiming) -> Self {
        Self {
            timing,
            enabled: false,
            discontinuity: false,
            next_timestamp: Ticks::ZERO,
        }
    }

    pub(crate) fn enable(&mut self) {
        self.enabled = true;
    }

    pub(crate) fn disable(&mut self) {
        self.enabled = false;
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn flush(&mut self) {
        self.discontinuity = true;
    }

    /**
        Stamp a payload. Without a timestamp the sample continues right after
        the previous one.
    */
    pub(crate) fn sample(
        &mut self,
        data: Vec<u8>,
        pts: Option<Pts>,
        duration: i64,
        keyframe: bool,
    ) -> MediaSample {
        let timestamp = pts.map_or(self.next_timestamp, |pts| self.timing.timestamp(pts));
        let duration = self.timing.duration(duration);
        self.next_timestamp = timestamp + duration;

        MediaSample {
            data,
            timestamp,
            duration,
            keyframe,
            discontinuity: std::mem::take(&mut self.discontinuity),
        }
    }
}
