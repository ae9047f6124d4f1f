use std::collections::VecDeque;

use ffmpeg_types::RawFormat;

use super::{MediaSample, ProduceContext, ProviderCore, ProviderVariant, SampleProvider, StreamTiming};
use crate::engine::{DecodeContext, DecodedFrame};
use crate::error::{InteropError, Result};

/**
    Decodes packets and hands out raw frames: interleaved 16-bit PCM for
    audio, NV12 for video.

    A packet may decode into zero or several frames; extra frames wait in a
    queue until the host asks again. At end of stream the decoder is drained
    once.
*/
#[derive(Debug)]
pub struct DecodingProvider {
    core: ProviderCore,
    format: RawFormat,
    pending: VecDeque<DecodedFrame>,
    drained: bool,
}

impl DecodingProvider {
    pub fn new(format: RawFormat, timing: StreamTiming) -> Self {
        Self {
            core: ProviderCore::new(timing),
            format,
            pending: VecDeque::new(),
            drained: false,
        }
    }

    pub fn format(&self) -> RawFormat {
        self.format
    }
}

impl SampleProvider for DecodingProvider {
    fn variant(&self) -> ProviderVariant {
        match self.format {
            RawFormat::Pcm16 => ProviderVariant::AudioDecode,
            RawFormat::Nv12 => ProviderVariant::VideoDecode,
        }
    }

    fn stream_index(&self) -> usize {
        self.core.timing.stream_index
    }

    fn allocate_resources(&mut self, decoder: Option<&mut dyn DecodeContext>) -> Result<()> {
        let decoder = decoder.ok_or(InteropError::InvalidArgument("decode context"))?;
        decoder.set_output(self.format)?;
        Ok(())
    }

    fn enable(&mut self) {
        self.core.enable();
    }

    fn disable(&mut self) {
        self.core.disable();
        self.pending.clear();
        self.drained = false;
    }

    fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    fn flush(&mut self) {
        self.core.flush();
        self.pending.clear();
        self.drained = false;
    }

    fn produce_next(&mut self, cx: ProduceContext<'_>) -> Result<Option<MediaSample>> {
        if !self.core.is_enabled() {
            return Ok(None);
        }
        let decoder = cx
            .decoder
            .ok_or(InteropError::InvalidArgument("decode context"))?;

        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(self.core.sample(
                    frame.data,
                    frame.pts,
                    frame.duration,
                    frame.keyframe,
                )));
            }
            if self.drained {
                return Ok(None);
            }

            match cx.reader.next_packet(self.core.timing.stream_index)? {
                Some(packet) => self.pending.extend(decoder.decode(&packet)?),
                None => {
                    tracing::trace!(stream = self.core.timing.stream_index, "draining decoder");
                    self.pending.extend(decoder.drain()?);
                    self.drained = true;
                }
            }
        }
    }
}
