/*!
    Conversion between ffmpeg-next / FFmpeg C types and `ffmpeg-types`.
*/

use std::ffi::CStr;

use ffmpeg_next::codec::Id;
use ffmpeg_next::ffi;

use ffmpeg_types::{CodecId, CodecParameters, MediaType, Rational};

const PROFILE_UNKNOWN: i32 = -99;

pub fn rational_from_ffmpeg(r: ffi::AVRational) -> Rational {
    Rational::new(r.num, r.den)
}

pub fn codec_id_from_ffmpeg(id: Id) -> CodecId {
    match id {
        Id::H264 => CodecId::H264,
        Id::HEVC => CodecId::Hevc,
        Id::VP8 => CodecId::Vp8,
        Id::VP9 => CodecId::Vp9,
        Id::AV1 => CodecId::Av1,
        Id::MPEG4 => CodecId::Mpeg4,
        Id::MPEG2VIDEO => CodecId::Mpeg2Video,
        Id::MJPEG => CodecId::Mjpeg,
        Id::MJPEGB => CodecId::Mjpegb,
        Id::JPEG2000 => CodecId::Jpeg2000,
        Id::JPEGLS => CodecId::JpegLs,
        Id::PNG => CodecId::Png,
        Id::BMP => CodecId::Bmp,
        Id::AAC => CodecId::Aac,
        Id::MP3 => CodecId::Mp3,
        Id::OPUS => CodecId::Opus,
        Id::VORBIS => CodecId::Vorbis,
        Id::FLAC => CodecId::Flac,
        Id::AC3 => CodecId::Ac3,
        Id::PCM_S16LE => CodecId::PcmS16Le,
        Id::ASS => CodecId::Ass,
        Id::SSA => CodecId::Ssa,
        Id::DVD_SUBTITLE => CodecId::DvdSubtitle,
        Id::DVB_SUBTITLE => CodecId::DvbSubtitle,
        Id::HDMV_PGS_SUBTITLE => CodecId::HdmvPgsSubtitle,
        Id::SUBRIP => CodecId::Subrip,
        Id::TEXT => CodecId::Text,
        Id::WEBVTT => CodecId::WebVtt,
        Id::MOV_TEXT => CodecId::MovText,
        other => CodecId::Other(ffi::AVCodecID::from(other) as u32),
    }
}

pub fn media_type_from_ffmpeg(media: ffi::AVMediaType) -> Option<MediaType> {
    match media {
        ffi::AVMediaType::AVMEDIA_TYPE_AUDIO => Some(MediaType::Audio),
        ffi::AVMediaType::AVMEDIA_TYPE_VIDEO => Some(MediaType::Video),
        ffi::AVMediaType::AVMEDIA_TYPE_SUBTITLE => Some(MediaType::Subtitle),
        _ => None,
    }
}

pub fn media_type_to_ffmpeg(media: MediaType) -> ffi::AVMediaType {
    match media {
        MediaType::Audio => ffi::AVMediaType::AVMEDIA_TYPE_AUDIO,
        MediaType::Video => ffi::AVMediaType::AVMEDIA_TYPE_VIDEO,
        MediaType::Subtitle => ffi::AVMediaType::AVMEDIA_TYPE_SUBTITLE,
    }
}

/**
    Copy an FFmpeg-owned buffer, treating null or non-positive sizes as empty.

    # Safety

    When non-null, `data` must point to at least `size` readable bytes.
*/
pub unsafe fn copy_buffer(data: *const u8, size: i32) -> Vec<u8> {
    match usize::try_from(size) {
        Ok(len) if len > 0 && !data.is_null() => {
            // SAFETY: guaranteed by the caller.
            unsafe { std::slice::from_raw_parts(data, len) }.to_vec()
        }
        _ => Vec::new(),
    }
}

fn profile(profile: i32) -> Option<i32> {
    (profile != PROFILE_UNKNOWN).then_some(profile)
}

/**
    Codec parameters of a demuxed stream.

    # Safety

    `par` must point to valid `AVCodecParameters`.
*/
pub unsafe fn parameters_from_codecpar(par: *const ffi::AVCodecParameters) -> CodecParameters {
    // SAFETY: guaranteed by the caller.
    let par = unsafe { &*par };
    CodecParameters {
        codec_id: codec_id_from_ffmpeg(Id::from(par.codec_id)),
        // SAFETY: FFmpeg keeps extradata_size bytes behind extradata.
        extradata: unsafe { copy_buffer(par.extradata, par.extradata_size) },
        bit_rate: par.bit_rate,
        profile: profile(par.profile),
        sample_rate: u32::try_from(par.sample_rate).unwrap_or(0),
        channels: u16::try_from(par.ch_layout.nb_channels).unwrap_or(0),
        width: u32::try_from(par.width).unwrap_or(0),
        height: u32::try_from(par.height).unwrap_or(0),
        frame_rate: rational_from_ffmpeg(par.framerate),
        sample_aspect_ratio: rational_from_ffmpeg(par.sample_aspect_ratio),
    }
}

/**
    Codec parameters as seen by an opened decode context.

    # Safety

    `ctx` must point to a valid, opened `AVCodecContext`.
*/
pub unsafe fn parameters_from_context(ctx: *const ffi::AVCodecContext) -> CodecParameters {
    // SAFETY: guaranteed by the caller.
    let ctx = unsafe { &*ctx };
    CodecParameters {
        codec_id: codec_id_from_ffmpeg(Id::from(ctx.codec_id)),
        // SAFETY: FFmpeg keeps extradata_size bytes behind extradata.
        extradata: unsafe { copy_buffer(ctx.extradata, ctx.extradata_size) },
        bit_rate: ctx.bit_rate,
        profile: profile(ctx.profile),
        sample_rate: u32::try_from(ctx.sample_rate).unwrap_or(0),
        channels: u16::try_from(ctx.ch_layout.nb_channels).unwrap_or(0),
        width: u32::try_from(ctx.width).unwrap_or(0),
        height: u32::try_from(ctx.height).unwrap_or(0),
        frame_rate: rational_from_ffmpeg(ctx.framerate),
        sample_aspect_ratio: rational_from_ffmpeg(ctx.sample_aspect_ratio),
    }
}

/**
    FFmpeg's name for a codec id, as `avcodec_get_name` reports it.
*/
pub fn codec_name(id: ffi::AVCodecID) -> &'static CStr {
    // SAFETY: avcodec_get_name never returns null and points to static storage.
    unsafe { CStr::from_ptr(ffi::avcodec_get_name(id)) }
}
