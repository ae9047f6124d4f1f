/*!
    Demuxing through an FFmpeg format context.
*/

use std::ffi::{CStr, CString, c_int};
use std::ptr;

use ffmpeg_next::ffi;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::format::stream::Disposition as FfmpegDisposition;
use ffmpeg_next::{Dictionary, Packet as FfmpegPacket};

use ffmpeg_types::{Disposition, MediaType, Pts, StreamInfo};

use crate::config::EngineOptions;
use crate::engine::{Container, DecodeContext, DecoderOptions, InputSource, Packet};
use crate::error::EngineError;

use super::avio::CustomIo;
use super::convert::{
    codec_name, copy_buffer, media_type_from_ffmpeg, media_type_to_ffmpeg,
    parameters_from_codecpar, rational_from_ffmpeg,
};
use super::decoder::FfmpegDecoder;

fn ffmpeg_error(code: c_int) -> String {
    ffmpeg_next::Error::from(code).to_string()
}

fn known_timestamp(value: i64) -> Option<i64> {
    (value != ffi::AV_NOPTS_VALUE).then_some(value)
}

/**
    An opened FFmpeg input.
*/
pub struct FfmpegContainer {
    // Declared before `io` so the format context closes first.
    input: Input,
    io: Option<CustomIo>,
    streams: Vec<StreamInfo>,
    names: Vec<(usize, &'static CStr)>,
}

// SAFETY: the format context and I/O context are only touched through
// `&mut self`, from whichever thread owns the container.
unsafe impl Send for FfmpegContainer {}

impl FfmpegContainer {
    pub fn open(source: InputSource<'_>, options: &EngineOptions) -> Result<Self, EngineError> {
        let mut dictionary = Dictionary::new();
        for (key, value) in options.iter() {
            dictionary.set(key, value);
        }

        let (url, mut io) = match source {
            InputSource::Locator(locator) => {
                let url = CString::new(locator)
                    .map_err(|_| EngineError::Open("locator contains a NUL byte".into()))?;
                (Some(url), None)
            }
            InputSource::Stream(adapter) => (None, Some(CustomIo::new(adapter)?)),
        };

        // SAFETY: plain allocation; checked for null below.
        let mut context = unsafe { ffi::avformat_alloc_context() };
        if context.is_null() {
            return Err(EngineError::Alloc("format context"));
        }
        if let Some(io) = io.as_mut() {
            // SAFETY: context was just allocated; io outlives it (see field order).
            unsafe {
                (*context).pb = io.as_mut_ptr();
                (*context).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as c_int;
            }
        }

        // SAFETY: the dictionary is handed to FFmpeg and taken back right after.
        let mut raw_options = unsafe { dictionary.disown() };
        let code = unsafe {
            ffi::avformat_open_input(
                &mut context,
                url.as_ref().map_or(ptr::null(), |url| url.as_ptr()),
                ptr::null(),
                &mut raw_options,
            )
        };
        // SAFETY: whatever FFmpeg left in the dictionary is ours again.
        let leftover = unsafe { Dictionary::own(raw_options) };

        if code < 0 {
            // avformat_open_input frees the context on failure
            return Err(EngineError::Open(ffmpeg_error(code)));
        }

        let container = Self {
            // SAFETY: context is a successfully opened input.
            input: unsafe { Input::wrap(context) },
            io,
            streams: Vec::new(),
            names: Vec::new(),
        };

        let rejected: Vec<String> = leftover.iter().map(|(key, _)| key.to_owned()).collect();
        if !rejected.is_empty() {
            return Err(EngineError::RejectedOptions(rejected));
        }
        Ok(container)
    }

    fn stream_infos(&self) -> Vec<StreamInfo> {
        self.input
            .streams()
            .filter_map(|stream| {
                let parameters = stream.parameters();
                let media = media_type_from_ffmpeg(parameters.medium().into())?;

                // SAFETY: codecpar is valid while the input is open.
                let codec_parameters = unsafe { parameters_from_codecpar(parameters.as_ptr()) };
                let mut info = StreamInfo::new(stream.index(), media, codec_parameters)
                    .with_time_base(rational_from_ffmpeg(stream.time_base().into()));
                info.avg_frame_rate = rational_from_ffmpeg(stream.avg_frame_rate().into());

                let disposition = stream.disposition();
                info.disposition = Disposition {
                    attached_pic: disposition.contains(FfmpegDisposition::ATTACHED_PIC),
                    default: disposition.contains(FfmpegDisposition::DEFAULT),
                };
                info.metadata = stream
                    .metadata()
                    .iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();

                if info.disposition.attached_pic {
                    // SAFETY: attached_pic is a packet owned by the stream.
                    info.attached_picture = Some(unsafe {
                        let packet = &(*stream.as_ptr()).attached_pic;
                        copy_buffer(packet.data, packet.size)
                    });
                }
                Some(info)
            })
            .collect()
    }
}

impl Container for FfmpegContainer {
    fn find_stream_info(&mut self) -> Result<(), EngineError> {
        // SAFETY: the input is open.
        let code = unsafe { ffi::avformat_find_stream_info(self.input.as_mut_ptr(), ptr::null_mut()) };
        if code < 0 {
            return Err(EngineError::Probe(ffmpeg_error(code)));
        }

        self.streams = self.stream_infos();
        self.names = self
            .input
            .streams()
            .map(|stream| {
                let id = stream.parameters().id().into();
                (stream.index(), codec_name(id))
            })
            .collect();
        tracing::debug!(streams = self.streams.len(), "probed input");
        Ok(())
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn best_stream(&self, media: MediaType, require_decoder: bool) -> Option<usize> {
        let mut decoder: *const ffi::AVCodec = ptr::null();
        let decoder_ret = if require_decoder {
            &mut decoder as *mut *const ffi::AVCodec
        } else {
            ptr::null_mut()
        };
        // SAFETY: the input is open; decoder_ret is null or a valid out pointer.
        let index = unsafe {
            ffi::av_find_best_stream(
                self.input.as_ptr().cast_mut(),
                media_type_to_ffmpeg(media),
                -1,
                -1,
                decoder_ret,
                0,
            )
        };
        usize::try_from(index).ok()
    }

    fn open_decoder(
        &mut self,
        stream_index: usize,
        options: &DecoderOptions,
    ) -> Result<Box<dyn DecodeContext>, EngineError> {
        let stream = self
            .input
            .stream(stream_index)
            .ok_or(EngineError::DecoderNotFound(stream_index))?;
        let decoder = FfmpegDecoder::open(stream_index, stream.parameters(), options)?;
        Ok(Box::new(decoder))
    }

    fn codec_name(&self, stream_index: usize) -> Option<&CStr> {
        self.names
            .iter()
            .find(|(index, _)| *index == stream_index)
            .map(|(_, name)| *name)
    }

    fn duration(&self) -> Option<i64> {
        known_timestamp(self.input.duration())
    }

    fn start_time(&self) -> Option<i64> {
        // SAFETY: the input is open.
        known_timestamp(unsafe { (*self.input.as_ptr()).start_time })
    }

    fn seek(&mut self, stream_index: usize, timestamp: i64) -> Result<(), EngineError> {
        let index = c_int::try_from(stream_index)
            .map_err(|_| EngineError::Seek(format!("stream {stream_index} out of range")))?;
        // SAFETY: the input is open.
        let code = unsafe {
            ffi::av_seek_frame(
                self.input.as_mut_ptr(),
                index,
                timestamp,
                ffi::AVSEEK_FLAG_BACKWARD as c_int,
            )
        };
        if code < 0 {
            return Err(EngineError::Seek(ffmpeg_error(code)));
        }
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, EngineError> {
        let mut packet = FfmpegPacket::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(Some(Packet {
                stream_index: packet.stream(),
                data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
                pts: packet.pts().map(Pts),
                dts: packet.dts().map(Pts),
                duration: packet.duration(),
                keyframe: packet.is_key(),
            })),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(e) => Err(EngineError::Read(e.to_string())),
        }
    }
}

impl std::fmt::Debug for FfmpegContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegContainer")
            .field("streams", &self.streams.len())
            .field("custom_io", &self.io.is_some())
            .finish_non_exhaustive()
    }
}
