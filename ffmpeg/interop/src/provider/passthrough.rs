use super::{MediaSample, ProduceContext, ProviderCore, ProviderVariant, SampleProvider, StreamTiming};
use crate::engine::DecodeContext;
use crate::error::Result;

/**
    Hands packets to the host unchanged.

    Used for compressed audio the host decodes itself and for subtitles.
*/
#[derive(Debug)]
pub struct PassthroughProvider {
    variant: ProviderVariant,
    core: ProviderCore,
}

impl PassthroughProvider {
    pub fn audio(timing: StreamTiming) -> Self {
        Self {
            variant: ProviderVariant::AudioPassthrough,
            core: ProviderCore::new(timing),
        }
    }

    pub fn subtitle(timing: StreamTiming) -> Self {
        Self {
            variant: ProviderVariant::Subtitle,
            core: ProviderCore::new(timing),
        }
    }
}

impl SampleProvider for PassthroughProvider {
    fn variant(&self) -> ProviderVariant {
        self.variant
    }

    fn stream_index(&self) -> usize {
        self.core.timing.stream_index
    }

    fn allocate_resources(&mut self, _: Option<&mut dyn DecodeContext>) -> Result<()> {
        Ok(())
    }

    fn enable(&mut self) {
        self.core.enable();
    }

    fn disable(&mut self) {
        self.core.disable();
    }

    fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }

    fn flush(&mut self) {
        self.core.flush();
    }

    fn produce_next(&mut self, cx: ProduceContext<'_>) -> Result<Option<MediaSample>> {
        if !self.core.is_enabled() {
            return Ok(None);
        }

        let Some(packet) = cx.reader.next_packet(self.stream_index())? else {
            return Ok(None);
        };

        let pts = packet.pts.or(packet.dts);
        Ok(Some(self.core.sample(
            packet.data,
            pts,
            packet.duration,
            packet.keyframe,
        )))
    }
}
