/*!
    Codec identifiers.
*/

use crate::MediaType;

/**
    Codec identifiers the session layer cares about.

    This is a subset of the engine's codec list. Anything the selection
    policy has no table entry for is carried as [`CodecId::Other`] with the
    engine's raw identifier.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    // Video
    H264,
    Hevc,
    Vp8,
    Vp9,
    Av1,
    Mpeg4,
    Mpeg2Video,
    // Still images (attached pictures)
    Mjpeg,
    Mjpegb,
    Jpeg2000,
    JpegLs,
    Png,
    Bmp,
    // Audio
    Aac,
    Mp3,
    Opus,
    Vorbis,
    Flac,
    Ac3,
    PcmS16Le,
    // Subtitles
    Ass,
    Ssa,
    DvdSubtitle,
    DvbSubtitle,
    HdmvPgsSubtitle,
    Subrip,
    Text,
    WebVtt,
    MovText,
    /// A codec without a dedicated variant, carrying the engine's raw id.
    Other(u32),
}

impl CodecId {
    /**
        Returns the media type this codec normally carries, if known.
    */
    pub const fn media_type(self) -> Option<MediaType> {
        match self {
            Self::H264
            | Self::Hevc
            | Self::Vp8
            | Self::Vp9
            | Self::Av1
            | Self::Mpeg4
            | Self::Mpeg2Video
            | Self::Mjpeg
            | Self::Mjpegb
            | Self::Jpeg2000
            | Self::JpegLs
            | Self::Png
            | Self::Bmp => Some(MediaType::Video),
            Self::Aac
            | Self::Mp3
            | Self::Opus
            | Self::Vorbis
            | Self::Flac
            | Self::Ac3
            | Self::PcmS16Le => Some(MediaType::Audio),
            Self::Ass
            | Self::Ssa
            | Self::DvdSubtitle
            | Self::DvbSubtitle
            | Self::HdmvPgsSubtitle
            | Self::Subrip
            | Self::Text
            | Self::WebVtt
            | Self::MovText => Some(MediaType::Subtitle),
            Self::Other(_) => None,
        }
    }
}
