/*!
    Canonical raw output formats.
*/

use crate::MediaType;

/**
    The raw representation decoded streams are normalized to.

    Decoded audio is always interleaved signed 16-bit PCM and decoded video is
    always semi-planar NV12, whatever the source format was. The engine's
    resampler/scaler does the conversion; the session only requests it.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RawFormat {
    /// Interleaved signed 16-bit PCM.
    Pcm16,
    /// Semi-planar YUV 4:2:0, 12bpp.
    Nv12,
}

impl RawFormat {
    /**
        Returns the canonical format for a decodable media type.
    */
    pub const fn for_media(media: MediaType) -> Option<Self> {
        match media {
            MediaType::Audio => Some(Self::Pcm16),
            MediaType::Video => Some(Self::Nv12),
            MediaType::Subtitle => None,
        }
    }

    pub const fn media_type(self) -> MediaType {
        match self {
            Self::Pcm16 => MediaType::Audio,
            Self::Nv12 => MediaType::Video,
        }
    }

    /**
        Bits per audio sample or average bits per pixel.
    */
    pub const fn bits(self) -> u32 {
        match self {
            Self::Pcm16 => 16,
            Self::Nv12 => 12,
        }
    }

    /**
        Size in bytes of one NV12 picture. Returns `None` for audio.
    */
    pub const fn picture_size(self, width: u32, height: u32) -> Option<usize> {
        match self {
            Self::Nv12 => {
                let luma = width as usize * height as usize;
                Some(luma + luma / 2)
            }
            Self::Pcm16 => None,
        }
    }
}
