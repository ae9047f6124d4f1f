/*!
    H.264 passthrough framing.

    The host wants start-code (Annex B) framing with the parameter sets
    in-band. MP4/MKV carry length-prefixed NAL units with the parameter sets
    in an out-of-band `avcC` record instead; raw streams (TS, .h264) are
    already framed with start codes.
*/

use super::{MediaSample, ProduceContext, ProviderCore, ProviderVariant, SampleProvider, StreamTiming};
use crate::engine::DecodeContext;
use crate::error::{InteropError, Result};

const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/**
    Parameter sets of an `avcC` record, converted to start-code framing,
    plus the NAL length prefix size used by the samples.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvcConfig {
    pub parameter_sets: Vec<u8>,
    pub nal_length_size: usize,
}

/**
    Parse an `avcC` record (version byte `1`).

    ```text
    [0] version  [1] profile  [2] compat  [3] level
    [4] 0xFC | (nal_length_size - 1)
    [5] 0xE0 | sps count, then (u16 len, sps)*
    pps count, then (u16 len, pps)*
    ```
*/
pub fn parse_avc_config(extradata: &[u8]) -> Option<AvcConfig> {
    if extradata.len() < 7 || extradata[0] != 1 {
        return None;
    }

    let nal_length_size = usize::from(extradata[4] & 0x03) + 1;
    let mut parameter_sets = Vec::with_capacity(extradata.len() + 16);
    let mut offset = 5;

    // SPS count shares its byte with reserved bits, PPS count does not
    for mask in [0x1f, 0xff] {
        let count = usize::from(*extradata.get(offset)? & mask);
        offset += 1;
        for _ in 0..count {
            let len = usize::from(u16::from_be_bytes([
                *extradata.get(offset)?,
                *extradata.get(offset + 1)?,
            ]));
            offset += 2;
            let nal = extradata.get(offset..offset + len)?;
            parameter_sets.extend_from_slice(&START_CODE);
            parameter_sets.extend_from_slice(nal);
            offset += len;
        }
    }

    Some(AvcConfig {
        parameter_sets,
        nal_length_size,
    })
}

/**
    Rewrite length-prefixed NAL units as start-code framed ones.

    A truncated trailing unit is dropped.
*/
pub fn length_prefixed_to_annex_b(data: &[u8], nal_length_size: usize, out: &mut Vec<u8>) {
    let mut offset = 0;
    while offset + nal_length_size <= data.len() {
        let len = data[offset..offset + nal_length_size]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
        offset += nal_length_size;

        let Some(nal) = data.get(offset..offset + len) else {
            tracing::debug!(len, remaining = data.len() - offset, "truncated NAL unit");
            break;
        };
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(nal);
        offset += len;
    }
}

/**
    Length-prefixed H.264 (`avcC` extradata).

    Parameter sets are injected in front of every key frame so the host can
    start decoding at any seek point.
*/
#[derive(Debug)]
pub struct AvcProvider {
    core: ProviderCore,
    config: Option<AvcConfig>,
}

impl AvcProvider {
    pub fn new(timing: StreamTiming) -> Self {
        Self {
            core: ProviderCore::new(timing),
            config: None,
        }
    }
}

impl SampleProvider for AvcProvider {
    fn variant(&self) -> ProviderVariant {
        ProviderVariant::VideoPassthroughAvc
    }

    fn stream_index(&self) -> usize {
        self.core.timing.stream_index
    }

    fn allocate_resources(&mut self, decoder: Option<&mut dyn DecodeContext>) -> Result<()> {
        let decoder = decoder.ok_or(InteropError::InvalidArgument("decode context"))?;
        let config = parse_avc_config(&decoder.parameters().extradata).ok_or_else(|| {
            InteropError::UnsupportedFormat("malformed AVC configuration record".into())
        })?;
        tracing::debug!(
            nal_length_size = config.nal_length_size,
            parameter_sets = config.parameter_sets.len(),
            "avc configuration"
        );
        self.config = Some(config);
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
        let config = self
            .config
            .as_ref()
            .ok_or(InteropError::InvalidArgument("provider resources not allocated"))?;

        let Some(packet) = cx.reader.next_packet(self.core.timing.stream_index)? else {
            return Ok(None);
        };

        let mut data = Vec::with_capacity(packet.data.len() + config.parameter_sets.len() + 16);
        if packet.keyframe {
            data.extend_from_slice(&config.parameter_sets);
        }
        length_prefixed_to_annex_b(&packet.data, config.nal_length_size, &mut data);

        Ok(Some(self.core.sample(
            data,
            packet.pts.or(packet.dts),
            packet.duration,
            packet.keyframe,
        )))
    }
}

/**
    Start-code H.264.

    The codec extradata (start-code framed parameter sets, if any) goes in
    front of the first sample after start and after every flush.
*/
#[derive(Debug)]
pub struct AnnexBProvider {
    core: ProviderCore,
    extradata: Vec<u8>,
    send_extradata: bool,
}

impl AnnexBProvider {
    pub fn new(timing: StreamTiming) -> Self {
        Self {
            core: ProviderCore::new(timing),
            extradata: Vec::new(),
            send_extradata: true,
        }
    }
}

impl SampleProvider for AnnexBProvider {
    fn variant(&self) -> ProviderVariant {
        ProviderVariant::VideoPassthroughAnnexB
    }

    fn stream_index(&self) -> usize {
        self.core.timing.stream_index
    }

    fn allocate_resources(&mut self, decoder: Option<&mut dyn DecodeContext>) -> Result<()> {
        if let Some(decoder) = decoder {
            self.extradata = decoder.parameters().extradata.clone();
        }
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
        self.send_extradata = true;
    }

    fn produce_next(&mut self, cx: ProduceContext<'_>) -> Result<Option<MediaSample>> {
        if !self.core.is_enabled() {
            return Ok(None);
        }

        let Some(packet) = cx.reader.next_packet(self.core.timing.stream_index)? else {
            return Ok(None);
        };

        let data = if std::mem::take(&mut self.send_extradata) && !self.extradata.is_empty() {
            let mut data = Vec::with_capacity(self.extradata.len() + packet.data.len());
            data.extend_from_slice(&self.extradata);
            data.extend_from_slice(&packet.data);
            data
        } else {
            packet.data
        };

        Ok(Some(self.core.sample(
            data,
            packet.pts.or(packet.dts),
            packet.duration,
            packet.keyframe,
        )))
    }
}
