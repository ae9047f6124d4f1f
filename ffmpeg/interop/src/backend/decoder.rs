/*!
    FFmpeg decode context with conversion to the requested raw format.

    Audio comes out as interleaved S16 at the source rate and channel layout,
    video as NV12 at the source size.
*/

use std::ffi::{CStr, CString, c_int};

use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::{Pixel, Sample};
use ffmpeg_next::software::resampling::context::Context as Resampler;
use ffmpeg_next::software::scaling::{context::Context as Scaler, flag::Flags as ScalerFlags};
use ffmpeg_next::util::frame::{audio::Audio as AudioFrame, video::Video as VideoFrame};
use ffmpeg_next::{ChannelLayout, codec, decoder, ffi, media};

use ffmpeg_types::{CodecParameters, Pts, RawFormat};

use crate::engine::{DecodeContext, DecodedFrame, DecoderOptions, Packet};
use crate::error::EngineError;

use super::convert::parameters_from_context;

fn decode_error(e: ffmpeg_next::Error) -> EngineError {
    EngineError::Decode(e.to_string())
}

fn is_again(e: &ffmpeg_next::Error) -> bool {
    matches!(e, ffmpeg_next::Error::Other { errno } if *errno == ffi::EAGAIN)
}

struct ResamplerState {
    context: Resampler,
    format: Sample,
    rate: u32,
    layout: ChannelLayout,
}

struct ScalerState {
    context: Scaler,
    format: Pixel,
    width: u32,
    height: u32,
}

enum Conversion {
    None,
    Pcm16(Option<ResamplerState>),
    Nv12(Option<ScalerState>),
}

/**
    An opened FFmpeg decoder for one stream.
*/
pub struct FfmpegDecoder {
    stream_index: usize,
    decoder: decoder::Opened,
    medium: media::Type,
    name: CString,
    parameters: CodecParameters,
    conversion: Conversion,
}

// SAFETY: the codec, resampler and scaler contexts are only used through
// `&mut self` by the thread that owns the decoder.
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    pub fn open(
        stream_index: usize,
        parameters: codec::Parameters,
        options: &DecoderOptions,
    ) -> Result<Self, EngineError> {
        let codec = decoder::find(parameters.id())
            .ok_or(EngineError::DecoderNotFound(stream_index))?;
        let medium = parameters.medium();

        let mut context = codec::context::Context::from_parameters(parameters)
            .map_err(|_| EngineError::Alloc("codec context"))?;

        if let Some(threads) = options.thread_count {
            let mut thread_type = 0;
            if options.frame_threads {
                thread_type |= ffi::FF_THREAD_FRAME as c_int;
            }
            if options.slice_threads {
                thread_type |= ffi::FF_THREAD_SLICE as c_int;
            }
            // SAFETY: the context is not opened yet.
            unsafe {
                let ptr = context.as_mut_ptr();
                (*ptr).thread_count = c_int::try_from(threads).unwrap_or(0);
                (*ptr).thread_type = thread_type;
            }
        }

        let decoder = context
            .decoder()
            .open_as(codec)
            .map_err(decode_error)?;

        // SAFETY: the context was opened just above.
        let parameters = unsafe { parameters_from_context(decoder.as_ptr()) };
        let name = CString::new(codec.name()).unwrap_or_default();
        tracing::debug!(stream = stream_index, decoder = codec.name(), "opened decoder");

        Ok(Self {
            stream_index,
            decoder,
            medium,
            name,
            parameters,
            conversion: Conversion::None,
        })
    }

    fn to_ffmpeg_packet(packet: &Packet) -> ffmpeg_next::Packet {
        let mut ffmpeg_packet = if packet.data.is_empty() {
            ffmpeg_next::Packet::empty()
        } else {
            ffmpeg_next::Packet::copy(&packet.data)
        };
        ffmpeg_packet.set_pts(packet.pts.map(|pts| pts.0));
        ffmpeg_packet.set_dts(packet.dts.map(|dts| dts.0));
        ffmpeg_packet.set_duration(packet.duration);
        if packet.keyframe {
            ffmpeg_packet.set_flags(ffmpeg_next::packet::Flags::KEY);
        }
        ffmpeg_packet
    }

    /**
        Receive every frame the decoder has ready.
    */
    fn receive_frames(&mut self) -> Result<Vec<DecodedFrame>, EngineError> {
        let mut frames = Vec::new();
        loop {
            let received = match self.medium {
                media::Type::Audio => {
                    let mut frame = AudioFrame::empty();
                    self.decoder
                        .receive_frame(&mut frame)
                        .and_then(|()| self.convert_audio(&frame))
                }
                media::Type::Video => {
                    let mut frame = VideoFrame::empty();
                    self.decoder
                        .receive_frame(&mut frame)
                        .and_then(|()| self.convert_video(&frame))
                }
                _ => return Err(EngineError::Decode("unsupported media type".into())),
            };

            match received {
                Ok(frame) => frames.push(frame),
                Err(ref e) if is_again(e) => break,
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) if frames.is_empty() => return Err(decode_error(e)),
                Err(e) => {
                    tracing::debug!(stream = self.stream_index, error = %e, "dropping undecodable frame");
                    break;
                }
            }
        }
        Ok(frames)
    }

    fn convert_audio(&mut self, frame: &AudioFrame) -> Result<DecodedFrame, ffmpeg_next::Error> {
        let Conversion::Pcm16(state) = &mut self.conversion else {
            return Err(ffmpeg_next::Error::InvalidData);
        };

        Ok(DecodedFrame {
            data: resample_pcm16(state, frame)?,
            pts: frame.pts().or(frame.timestamp()).map(Pts),
            duration: frame_duration(frame),
            keyframe: true,
        })
    }

    fn convert_video(&mut self, frame: &VideoFrame) -> Result<DecodedFrame, ffmpeg_next::Error> {
        let Conversion::Nv12(state) = &mut self.conversion else {
            return Err(ffmpeg_next::Error::InvalidData);
        };

        let (format, width, height) = (frame.format(), frame.width(), frame.height());
        let data = if format == Pixel::NV12 {
            copy_nv12(frame)
        } else {
            let stale = state
                .as_ref()
                .is_none_or(|s| s.format != format || s.width != width || s.height != height);
            if stale {
                let context = Scaler::get(
                    format,
                    width,
                    height,
                    Pixel::NV12,
                    width,
                    height,
                    ScalerFlags::BILINEAR,
                )?;
                *state = Some(ScalerState {
                    context,
                    format,
                    width,
                    height,
                });
            }
            let Some(state) = state.as_mut() else {
                return Err(ffmpeg_next::Error::InvalidData);
            };

            let mut output = VideoFrame::new(Pixel::NV12, width, height);
            state.context.run(frame, &mut output)?;
            copy_nv12(&output)
        };

        Ok(DecodedFrame {
            data,
            pts: frame.pts().or(frame.timestamp()).map(Pts),
            duration: frame_duration(frame),
            keyframe: frame.is_key(),
        })
    }
}

/**
    Interleaved S16 in the frame's own rate and channel layout. The resampler
    is rebuilt whenever the input format, rate or layout changes.
*/
fn resample_pcm16(
    state: &mut Option<ResamplerState>,
    frame: &AudioFrame,
) -> Result<Vec<u8>, ffmpeg_next::Error> {
    let (format, rate) = (frame.format(), frame.rate());
    let layout = frame.channel_layout();
    let stale = state
        .as_ref()
        .is_none_or(|s| s.format != format || s.rate != rate || s.layout != layout);
    if stale {
        let context = Resampler::get(
            format,
            frame.channel_layout(),
            rate,
            Sample::I16(SampleType::Packed),
            frame.channel_layout(),
            rate,
        )?;
        *state = Some(ResamplerState {
            context,
            format,
            rate,
            layout,
        });
    }
    let Some(state) = state.as_mut() else {
        return Err(ffmpeg_next::Error::InvalidData);
    };

    let mut output = AudioFrame::new(
        Sample::I16(SampleType::Packed),
        frame.samples(),
        frame.channel_layout(),
    );
    output.set_rate(rate);
    state.context.run(frame, &mut output)?;

    let len = output.samples() * usize::from(output.channels()) * 2;
    let data = output.data(0);
    Ok(data[..len.min(data.len())].to_vec())
}

fn frame_duration(frame: &ffmpeg_next::Frame) -> i64 {
    // SAFETY: the frame holds a valid AVFrame.
    unsafe { (*frame.as_ptr()).duration }
}

/**
    Tightly packed NV12: the luma plane, then the interleaved chroma plane.
*/
fn copy_nv12(frame: &VideoFrame) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let chroma_rows = height.div_ceil(2);
    let row_bytes = width + width % 2;

    let mut data = Vec::with_capacity(width * height + row_bytes * chroma_rows);
    for (plane, rows, bytes) in [(0, height, width), (1, chroma_rows, row_bytes)] {
        let stride = frame.stride(plane);
        let source = frame.data(plane);
        for row in 0..rows {
            let start = row * stride;
            data.extend_from_slice(&source[start..start + bytes]);
        }
    }
    data
}

impl DecodeContext for FfmpegDecoder {
    fn name(&self) -> &CStr {
        &self.name
    }

    fn parameters(&self) -> &CodecParameters {
        &self.parameters
    }

    fn set_output(&mut self, format: RawFormat) -> Result<(), EngineError> {
        self.conversion = match (format, self.medium) {
            (RawFormat::Pcm16, media::Type::Audio) => Conversion::Pcm16(None),
            (RawFormat::Nv12, media::Type::Video) => Conversion::Nv12(None),
            (format, medium) => {
                return Err(EngineError::Decode(format!(
                    "cannot convert {medium:?} to {format:?}"
                )));
            }
        };
        Ok(())
    }

    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>, EngineError> {
        let ffmpeg_packet = Self::to_ffmpeg_packet(packet);

        match self.decoder.send_packet(&ffmpeg_packet) {
            Ok(()) => self.receive_frames(),
            Err(ref e) if is_again(e) => {
                // decoder is full: drain, then retry once
                let mut frames = self.receive_frames()?;
                match self.decoder.send_packet(&ffmpeg_packet) {
                    Ok(()) => frames.extend(self.receive_frames()?),
                    Err(ref e) if is_again(e) => {}
                    Err(e) => return Err(decode_error(e)),
                }
                Ok(frames)
            }
            Err(e) => Err(decode_error(e)),
        }
    }

    fn drain(&mut self) -> Result<Vec<DecodedFrame>, EngineError> {
        let mut frames = self.receive_frames()?;
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
            Err(ref e) if is_again(e) => frames.extend(self.receive_frames()?),
            Err(e) => return Err(decode_error(e)),
        }
        frames.extend(self.receive_frames()?);
        Ok(frames)
    }

    fn reset(&mut self) {
        self.decoder.flush();
        match &mut self.conversion {
            Conversion::Pcm16(state) => *state = None,
            Conversion::Nv12(_) | Conversion::None => {}
        }
    }
}

impl std::fmt::Debug for FfmpegDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegDecoder")
            .field("stream_index", &self.stream_index)
            .field("name", &self.name)
            .field("medium", &self.medium)
            .finish_non_exhaustive()
    }
}
