/*!
    Descriptor and provider construction.

    For every selected stream the factory decides the host-facing
    representation (compressed passthrough or decoded raw), builds the
    matching [`StreamDescriptor`] and [`SampleProvider`], and lets the
    provider allocate what it needs from the decode context.
*/

use std::ffi::CStr;

use ffmpeg_types::{CodecId, CodecParameters, RawFormat, Rational, StreamInfo};

use crate::codec_map;
use crate::descriptor::{
    AudioEncoding, AudioSubtype, EncodingProperties, StreamDescriptor, TimedTextEncoding,
    VideoEncoding, VideoSubtype,
};
use crate::engine::DecodeContext;
use crate::error::{InteropError, Result};
use crate::provider::{
    AnnexBProvider, AvcProvider, DecodingProvider, PassthroughProvider, SampleProvider,
    StreamTiming,
};

/**
    A fully built stream, ready to be registered with the host.
*/
pub struct BuiltStream {
    pub descriptor: StreamDescriptor,
    pub provider: Box<dyn SampleProvider>,
    pub decoder: Option<Box<dyn DecodeContext>>,
    pub codec_name: Option<String>,
}

impl std::fmt::Debug for BuiltStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltStream")
            .field("descriptor", &self.descriptor)
            .field("provider", &self.provider.variant())
            .field("decoder", &self.decoder.is_some())
            .field("codec_name", &self.codec_name)
            .finish()
    }
}

pub(crate) fn codec_name(name: &CStr) -> String {
    name.to_string_lossy().into_owned()
}

fn bitrate(decoder: &CodecParameters, stream: &CodecParameters) -> u32 {
    let bit_rate = if decoder.bit_rate > 0 {
        decoder.bit_rate
    } else {
        stream.bit_rate
    };
    u32::try_from(bit_rate.max(0)).unwrap_or(u32::MAX)
}

/**
    The decoder's frame rate when it reports one, otherwise the stream's
    average frame rate.
*/
fn frame_rate(decoder: Rational, average: Rational) -> Option<Rational> {
    if decoder.num != 0 || decoder.den != 1 {
        Some(decoder)
    } else if average.num != 0 || average.den != 0 {
        Some(average)
    } else {
        None
    }
}

fn pixel_aspect_ratio(decoder: Rational, stream: Rational) -> Option<Rational> {
    let usable = |sar: Rational| sar.num > 0 && sar.den != 0;
    if usable(decoder) {
        Some(decoder)
    } else if usable(stream) {
        Some(stream)
    } else {
        None
    }
}

/**
    Audio with an opened decoder.

    AAC and MP3 pass through unless decoding is forced; everything else is
    decoded to 16-bit PCM.
*/
pub fn build_audio(
    stream: &StreamInfo,
    timing: StreamTiming,
    mut decoder: Box<dyn DecodeContext>,
    force_decode: bool,
) -> Result<BuiltStream> {
    let params = decoder.parameters().clone();

    let (subtype, mut provider): (AudioSubtype, Box<dyn SampleProvider>) = match params.codec_id {
        CodecId::Aac if !force_decode => {
            // no out-of-band configuration means the frames carry ADTS headers
            let subtype = if params.extradata.is_empty() {
                AudioSubtype::AacAdts
            } else {
                AudioSubtype::Aac
            };
            (subtype, Box::new(PassthroughProvider::audio(timing)))
        }
        CodecId::Mp3 if !force_decode => {
            (AudioSubtype::Mp3, Box::new(PassthroughProvider::audio(timing)))
        }
        _ => (
            AudioSubtype::Pcm,
            Box::new(DecodingProvider::new(RawFormat::Pcm16, timing)),
        ),
    };

    let bits_per_sample = (subtype == AudioSubtype::Pcm).then(|| RawFormat::Pcm16.bits());
    let encoding = AudioEncoding {
        subtype,
        sample_rate: params.sample_rate,
        channel_count: params.channels,
        bitrate: bitrate(&params, &stream.parameters),
        bits_per_sample,
    };

    provider.allocate_resources(Some(&mut *decoder))?;

    tracing::debug!(
        stream = stream.index,
        codec = ?params.codec_id,
        provider = %provider.variant(),
        "audio stream built"
    );

    Ok(BuiltStream {
        descriptor: StreamDescriptor::new(EncodingProperties::Audio(encoding)),
        provider,
        codec_name: Some(codec_name(decoder.name())),
        decoder: Some(decoder),
    })
}

/**
    Audio the engine cannot decode, exposed compressed from the stream
    parameters alone. Fails with [`InteropError::UnsupportedFormat`] when the
    host has no subtype for the codec.
*/
pub fn build_audio_from_parameters(
    stream: &StreamInfo,
    timing: StreamTiming,
) -> Result<BuiltStream> {
    let params = &stream.parameters;
    let subtype = codec_map::audio_passthrough_subtype(params.codec_id)
        .ok_or_else(|| InteropError::UnsupportedFormat(format!("{:?} audio", params.codec_id)))?;

    let encoding = AudioEncoding {
        subtype,
        sample_rate: params.sample_rate,
        channel_count: params.channels,
        bitrate: bitrate(params, params),
        bits_per_sample: None,
    };

    let mut provider: Box<dyn SampleProvider> = Box::new(PassthroughProvider::audio(timing));
    provider.allocate_resources(None)?;

    Ok(BuiltStream {
        descriptor: StreamDescriptor::new(EncodingProperties::Audio(encoding)),
        provider,
        decoder: None,
        codec_name: None,
    })
}

/**
    Video with an opened decoder.

    H.264 passes through unless decoding is forced; the `avcC` flavor
    (extradata starting with `1`) and the start-code flavor get different
    providers. Everything else is decoded to NV12.
*/
pub fn build_video(
    stream: &StreamInfo,
    timing: StreamTiming,
    mut decoder: Box<dyn DecodeContext>,
    force_decode: bool,
    rotation: Option<i32>,
) -> Result<BuiltStream> {
    let params = decoder.parameters().clone();
    let frame_rate = frame_rate(params.frame_rate, stream.avg_frame_rate);
    let bitrate = bitrate(&params, &stream.parameters);

    let (encoding, mut provider): (VideoEncoding, Box<dyn SampleProvider>) =
        if params.codec_id == CodecId::H264 && !force_decode {
            let provider: Box<dyn SampleProvider> = if params.extradata.first() == Some(&1) {
                Box::new(AvcProvider::new(timing))
            } else {
                Box::new(AnnexBProvider::new(timing))
            };
            let encoding = VideoEncoding {
                subtype: VideoSubtype::H264,
                width: params.width,
                height: params.height,
                profile: params.profile,
                frame_rate,
                pixel_aspect_ratio: None,
                bitrate,
                rotation,
                mixed_interlace: false,
            };
            (encoding, provider)
        } else {
            let encoding = VideoEncoding {
                subtype: VideoSubtype::Nv12,
                width: params.width,
                height: params.height,
                profile: None,
                frame_rate,
                pixel_aspect_ratio: pixel_aspect_ratio(
                    params.sample_aspect_ratio,
                    stream.parameters.sample_aspect_ratio,
                ),
                bitrate,
                rotation,
                mixed_interlace: true,
            };
            (
                encoding,
                Box::new(DecodingProvider::new(RawFormat::Nv12, timing)),
            )
        };

    provider.allocate_resources(Some(&mut *decoder))?;

    tracing::debug!(
        stream = stream.index,
        codec = ?params.codec_id,
        width = params.width,
        height = params.height,
        provider = %provider.variant(),
        "video stream built"
    );

    Ok(BuiltStream {
        descriptor: StreamDescriptor::new(EncodingProperties::Video(encoding)),
        provider,
        codec_name: Some(codec_name(decoder.name())),
        decoder: Some(decoder),
    })
}

/**
    A subtitle stream, passed through as timed text. Fails with
    [`InteropError::UnsupportedFormat`] for codecs the host cannot render.
*/
pub fn build_subtitle(stream: &StreamInfo, timing: StreamTiming) -> Result<BuiltStream> {
    let params = &stream.parameters;
    let subtype = codec_map::subtitle_subtype(params.codec_id).ok_or_else(|| {
        InteropError::UnsupportedFormat(format!("{:?} subtitles", params.codec_id))
    })?;

    let mut descriptor = StreamDescriptor::new(EncodingProperties::TimedText(TimedTextEncoding {
        subtype,
        format_user_data: params.extradata.clone(),
    }));
    descriptor.name = stream.tag("title").map(str::to_owned);
    descriptor.language = stream.tag("language").map(str::to_owned);

    let mut provider: Box<dyn SampleProvider> = Box::new(PassthroughProvider::subtitle(timing));
    provider.allocate_resources(None)?;

    Ok(BuiltStream {
        descriptor,
        provider,
        decoder: None,
        codec_name: None,
    })
}

#[cfg(test)]
mod tests {
    use ffmpeg_types::{MediaType, Ticks};

    use super::*;
    use crate::descriptor::SubtitleSubtype;
    use crate::provider::ProviderVariant;
    use crate::test_support::MockDecoder;

    fn timing(index: usize) -> StreamTiming {
        StreamTiming {
            stream_index: index,
            time_base: Rational::new(1, 90_000),
            start_offset: Ticks::ZERO,
        }
    }

    fn audio_stream(params: CodecParameters) -> StreamInfo {
        StreamInfo::new(1, MediaType::Audio, params)
    }

    #[test]
    fn aac_without_extradata_is_adts() {
        let params = CodecParameters::audio(CodecId::Aac, 44_100, 2).with_bit_rate(128_000);
        let built = build_audio(
            &audio_stream(params.clone()),
            timing(1),
            Box::new(MockDecoder::new(params)),
            false,
        )
        .unwrap();

        let audio = built.descriptor.audio().unwrap();
        assert_eq!(audio.subtype, AudioSubtype::AacAdts);
        assert_eq!(audio.bitrate, 128_000);
        assert_eq!(built.provider.variant(), ProviderVariant::AudioPassthrough);
        assert_eq!(built.codec_name.as_deref(), Some("aac"));
    }

    #[test]
    fn aac_with_extradata_passes_through_as_aac() {
        let params = CodecParameters::audio(CodecId::Aac, 48_000, 2).with_extradata([0x11, 0x90]);
        let built = build_audio(
            &audio_stream(params.clone()),
            timing(1),
            Box::new(MockDecoder::new(params)),
            false,
        )
        .unwrap();
        assert_eq!(built.descriptor.audio().unwrap().subtype, AudioSubtype::Aac);
    }

    #[test]
    fn forced_audio_decodes_to_pcm16() {
        let params = CodecParameters::audio(CodecId::Mp3, 44_100, 2);
        let built = build_audio(
            &audio_stream(params.clone()),
            timing(1),
            Box::new(MockDecoder::new(params)),
            true,
        )
        .unwrap();

        let audio = built.descriptor.audio().unwrap();
        assert_eq!(audio.subtype, AudioSubtype::Pcm);
        assert_eq!(audio.bits_per_sample, Some(16));
        assert_eq!(built.provider.variant(), ProviderVariant::AudioDecode);
    }

    #[test]
    fn opus_without_decoder_passes_through() {
        let stream = audio_stream(CodecParameters::audio(CodecId::Opus, 48_000, 2));
        let built = build_audio_from_parameters(&stream, timing(1)).unwrap();
        assert_eq!(
            built.descriptor.audio().unwrap().subtype,
            AudioSubtype::Other("OPUS")
        );
        assert!(built.decoder.is_none());
    }

    #[test]
    fn unknown_codec_without_decoder_is_unsupported() {
        let stream = audio_stream(CodecParameters::audio(CodecId::Other(0x15_0ff), 48_000, 2));
        assert!(matches!(
            build_audio_from_parameters(&stream, timing(1)),
            Err(InteropError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn h264_flavor_follows_extradata() {
        let avcc = [0x01, 0x64, 0x00, 0x1f, 0xff, 0xe0, 0x00];
        let params = CodecParameters::video(CodecId::H264, 1920, 1080).with_extradata(avcc);
        let stream = StreamInfo::new(0, MediaType::Video, params.clone());
        let built = build_video(
            &stream,
            timing(0),
            Box::new(MockDecoder::new(params)),
            false,
            Some(90),
        )
        .unwrap();
        assert_eq!(built.provider.variant(), ProviderVariant::VideoPassthroughAvc);
        let video = built.descriptor.video().unwrap();
        assert_eq!(video.subtype, VideoSubtype::H264);
        assert_eq!(video.rotation, Some(90));

        let params = CodecParameters::video(CodecId::H264, 1920, 1080).with_extradata([0, 0, 1]);
        let stream = StreamInfo::new(0, MediaType::Video, params.clone());
        let built =
            build_video(&stream, timing(0), Box::new(MockDecoder::new(params)), false, None)
                .unwrap();
        assert_eq!(built.provider.variant(), ProviderVariant::VideoPassthroughAnnexB);
    }

    #[test]
    fn decoded_video_carries_aspect_ratio_and_interlace_hint() {
        let mut params = CodecParameters::video(CodecId::Vp9, 720, 576);
        params.sample_aspect_ratio = Rational::new(16, 15);
        let stream = StreamInfo::new(0, MediaType::Video, params.clone());
        let built =
            build_video(&stream, timing(0), Box::new(MockDecoder::new(params)), false, None)
                .unwrap();

        let video = built.descriptor.video().unwrap();
        assert_eq!(video.subtype, VideoSubtype::Nv12);
        assert_eq!(video.pixel_aspect_ratio, Some(Rational::new(16, 15)));
        assert!(video.mixed_interlace);
        assert_eq!(built.provider.variant(), ProviderVariant::VideoDecode);
    }

    #[test]
    fn frame_rate_prefers_decoder_then_stream_average() {
        assert_eq!(
            frame_rate(Rational::new(30, 1), Rational::new(25, 1)),
            Some(Rational::new(30, 1))
        );
        assert_eq!(
            frame_rate(Rational::new(0, 1), Rational::new(25, 1)),
            Some(Rational::new(25, 1))
        );
        assert_eq!(frame_rate(Rational::new(0, 1), Rational::new(0, 0)), None);
    }

    #[test]
    fn subtitle_descriptor_carries_tags_and_header() {
        let stream = StreamInfo::new(
            3,
            MediaType::Subtitle,
            CodecParameters::new(CodecId::Ass).with_extradata(*b"[Script Info]"),
        )
        .with_tag("title", "Signs")
        .with_tag("language", "eng");

        let built = build_subtitle(&stream, timing(3)).unwrap();
        let text = built.descriptor.timed_text().unwrap();
        assert_eq!(text.subtype, SubtitleSubtype::Ssa);
        assert_eq!(text.format_user_data, b"[Script Info]");
        assert_eq!(built.descriptor.name.as_deref(), Some("Signs"));
        assert_eq!(built.descriptor.language.as_deref(), Some("eng"));
        assert_eq!(built.provider.variant(), ProviderVariant::Subtitle);
    }
}
