/*!
    Stream selection.

    Picks at most one audio, one video and one subtitle stream out of a
    probed container and builds each through the factory. Cover art is
    diverted to a thumbnail slot instead of becoming video.
*/

use std::sync::Arc;

use ffmpeg_types::{AV_TIME_BASE, MediaType, StreamInfo, Ticks};

use crate::descriptor::{StreamDescriptor, StreamId};
use crate::engine::{Container, DecodeContext, DecoderOptions};
use crate::error::{InteropError, Result};
use crate::factory::{self, BuiltStream};
use crate::provider::{MediaSample, ProduceContext, SampleProvider, StreamTiming};
use crate::reader::PacketReader;

/**
    One exposed stream: its descriptor, provider and (optional) decode
    context. Descriptor and provider always exist together.
*/
pub struct StreamSlot {
    pub(crate) media_type: MediaType,
    pub(crate) timing: StreamTiming,
    pub(crate) selected: bool,
    pub(crate) descriptor: Arc<StreamDescriptor>,
    pub(crate) provider: Box<dyn SampleProvider>,
    pub(crate) decoder: Option<Box<dyn DecodeContext>>,
    pub(crate) codec_name: Option<String>,
}

impl StreamSlot {
    fn new(media_type: MediaType, timing: StreamTiming, built: BuiltStream) -> Self {
        Self {
            media_type,
            timing,
            selected: false,
            descriptor: Arc::new(built.descriptor),
            provider: built.provider,
            decoder: built.decoder,
            codec_name: built.codec_name,
        }
    }

    pub fn id(&self) -> StreamId {
        self.descriptor.id()
    }

    pub fn stream_index(&self) -> usize {
        self.timing.stream_index
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /**
        Select and enable, resuming production where it stopped.
    */
    pub(crate) fn select(&mut self, reader: &mut PacketReader) {
        self.selected = true;
        self.provider.enable();
        reader.set_active(self.stream_index(), true);
    }

    /**
        Deselect and disable. Queued packets, decoded frames and decoder
        state are all discarded.
    */
    pub(crate) fn deselect(&mut self, reader: &mut PacketReader) {
        self.selected = false;
        self.provider.disable();
        self.provider.flush();
        reader.set_active(self.stream_index(), false);
        self.reset_decoder();
    }

    pub(crate) fn reset_decoder(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
    }

    pub(crate) fn produce(&mut self, reader: &mut PacketReader) -> Result<Option<MediaSample>> {
        let decoder = match self.decoder.as_mut() {
            Some(decoder) => Some(&mut **decoder as &mut dyn DecodeContext),
            None => None,
        };
        self.provider.produce_next(ProduceContext { reader, decoder })
    }

    /**
        Split into provider and decoder so they can be released in order.
    */
    pub(crate) fn into_parts(self) -> (Box<dyn SampleProvider>, Option<Box<dyn DecodeContext>>) {
        (self.provider, self.decoder)
    }
}

impl std::fmt::Debug for StreamSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSlot")
            .field("media_type", &self.media_type)
            .field("stream_index", &self.timing.stream_index)
            .field("selected", &self.selected)
            .field("id", &self.descriptor.id())
            .field("provider", &self.provider.variant())
            .field("decoder", &self.decoder.is_some())
            .finish()
    }
}

/**
    Outcome of stream selection. `None` means no such stream.
*/
#[derive(Debug, Default)]
pub struct Selection {
    pub audio: Option<StreamSlot>,
    pub video: Option<StreamSlot>,
    pub subtitle: Option<StreamSlot>,
    pub thumbnail: Option<usize>,
}

/**
    Leading integer of a tag value, like C's `atoi`: optional whitespace,
    optional sign, digits. Anything unparsable is `0`.
*/
pub(crate) fn parse_leading_int(value: &str) -> i32 {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            (acc * 10 + i64::from(d - b'0')).min(i64::from(i32::MAX) + 1)
        });
    let value = if negative { -magnitude } else { magnitude };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn stream_info(container: &dyn Container, index: usize) -> Result<StreamInfo> {
    container
        .streams()
        .iter()
        .find(|stream| stream.index == index)
        .cloned()
        .ok_or_else(|| InteropError::OpenFailed(format!("stream {index} out of range")))
}

fn timing(stream: &StreamInfo, start_offset: Ticks) -> StreamTiming {
    StreamTiming {
        stream_index: stream.index,
        time_base: stream.time_base,
        start_offset,
    }
}

/**
    Container start time in ticks, zero when unknown.
*/
pub(crate) fn start_offset(container: &dyn Container) -> Ticks {
    container
        .start_time()
        .map_or(Ticks::ZERO, |start| Ticks::from_units(start, AV_TIME_BASE))
}

/**
    Select and build the exposed streams.

    Audio and video failures are fatal and drop whatever was built so far.
    Subtitle failures only skip the offending stream. Audio and video come
    back selected and enabled; the subtitle waits for the host to switch it
    on.
*/
pub fn select_streams(
    reader: &mut PacketReader,
    force_audio_decode: bool,
    force_video_decode: bool,
) -> Result<Selection> {
    let start_offset = start_offset(reader.container());

    let audio = select_audio(reader, force_audio_decode, start_offset)?;
    let (video, thumbnail) = select_video(reader, force_video_decode, start_offset)?;
    let subtitle = select_subtitle(reader, start_offset);

    Ok(Selection {
        audio,
        video,
        subtitle,
        thumbnail,
    })
}

fn select_audio(
    reader: &mut PacketReader,
    force_decode: bool,
    start_offset: Ticks,
) -> Result<Option<StreamSlot>> {
    let container = reader.container_mut();

    let mut slot = if let Some(index) = container.best_stream(MediaType::Audio, true) {
        let stream = stream_info(container, index)?;
        let decoder = container.open_decoder(index, &DecoderOptions::default())?;
        let timing = timing(&stream, start_offset);
        let built = factory::build_audio(&stream, timing, decoder, force_decode)?;
        StreamSlot::new(MediaType::Audio, timing, built)
    } else if force_decode {
        tracing::debug!("no decodable audio stream and decoding is forced");
        return Ok(None);
    } else {
        let Some(index) = container.best_stream(MediaType::Audio, false) else {
            return Ok(None);
        };
        let stream = stream_info(container, index)?;
        let timing = timing(&stream, start_offset);
        match factory::build_audio_from_parameters(&stream, timing) {
            Ok(mut built) => {
                built.codec_name = container.codec_name(index).map(factory::codec_name);
                StreamSlot::new(MediaType::Audio, timing, built)
            }
            Err(InteropError::UnsupportedFormat(format)) => {
                tracing::warn!(stream = index, %format, "audio stream not exposed");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
    };

    reader.bind(slot.stream_index(), false);
    slot.select(reader);
    Ok(Some(slot))
}

fn select_video(
    reader: &mut PacketReader,
    force_decode: bool,
    start_offset: Ticks,
) -> Result<(Option<StreamSlot>, Option<usize>)> {
    let container = reader.container_mut();

    let Some(index) = container.best_stream(MediaType::Video, true) else {
        return Ok((None, None));
    };
    let stream = stream_info(container, index)?;

    if stream.is_attached_picture() {
        tracing::debug!(stream = index, "video stream is cover art");
        return Ok((None, Some(index)));
    }

    let rotation = stream.tag("rotate").map(parse_leading_int);
    let decoder = container.open_decoder(index, &DecoderOptions::multithreaded())?;
    let timing = timing(&stream, start_offset);
    let built = factory::build_video(&stream, timing, decoder, force_decode, rotation)?;

    let mut slot = StreamSlot::new(MediaType::Video, timing, built);
    reader.bind(index, false);
    slot.select(reader);
    Ok((Some(slot), None))
}

fn select_subtitle(reader: &mut PacketReader, start_offset: Ticks) -> Option<StreamSlot> {
    let container = reader.container();

    let slot = container
        .streams()
        .iter()
        .filter(|stream| stream.media_type == MediaType::Subtitle)
        .find_map(|stream| {
            let timing = timing(stream, start_offset);
            match factory::build_subtitle(stream, timing) {
                Ok(mut built) => {
                    built.codec_name = container.codec_name(stream.index).map(factory::codec_name);
                    Some(StreamSlot::new(MediaType::Subtitle, timing, built))
                }
                Err(e) => {
                    tracing::debug!(stream = stream.index, error = %e, "skipping subtitle stream");
                    None
                }
            }
        })?;

    reader.bind(slot.stream_index(), false);
    Some(slot)
}
