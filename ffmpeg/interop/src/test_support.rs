/*!
    In-memory engine for tests.

    [`MockEngine`] hands out one scripted [`MockContainer`]; containers and
    decoders report what happened to them (seeks, resets, drops) through a
    shared [`MockLog`].
*/

use std::collections::{BTreeSet, VecDeque};
use std::ffi::{CStr, CString};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ffmpeg_types::{CodecId, CodecParameters, MediaType, RawFormat, StreamInfo};
use parking_lot::Mutex;

use crate::config::EngineOptions;
use crate::engine::{
    Container, DecodeContext, DecodedFrame, DecoderOptions, Engine, InputSource, Packet,
};
use crate::error::EngineError;
use crate::io::IoAdapter;
use crate::locks::LockManager;

#[derive(Debug, Default)]
pub struct MockLog {
    pub events: Mutex<Vec<&'static str>>,
    pub seeks: Mutex<Vec<(usize, i64)>>,
    pub decoder_options: Mutex<Vec<(usize, DecoderOptions)>>,
    pub decoder_resets: AtomicUsize,
    pub locator: Mutex<Option<String>>,
    pub streamed: Mutex<Option<Vec<u8>>>,
}

impl MockLog {
    pub fn push(&self, event: &'static str) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().clone()
    }

    pub fn resets(&self) -> usize {
        self.decoder_resets.load(Ordering::SeqCst)
    }
}

fn name_of(codec: CodecId) -> CString {
    let name = match codec {
        CodecId::Other(id) => format!("codec{id}"),
        other => format!("{other:?}").to_lowercase(),
    };
    CString::new(name).unwrap_or_default()
}

pub struct MockDecoder {
    parameters: CodecParameters,
    name: CString,
    pub output: Option<RawFormat>,
    /// Packets held back before the first frame comes out.
    pub delay: usize,
    pub frames_per_packet: usize,
    pub fail_decode: bool,
    held: VecDeque<Packet>,
    log: Option<Arc<MockLog>>,
}

impl MockDecoder {
    pub fn new(parameters: CodecParameters) -> Self {
        Self {
            name: name_of(parameters.codec_id),
            parameters,
            output: None,
            delay: 0,
            frames_per_packet: 1,
            fail_decode: false,
            held: VecDeque::new(),
            log: None,
        }
    }

    fn frames(&self, packet: &Packet) -> std::iter::RepeatN<DecodedFrame> {
        let frame = DecodedFrame {
            data: packet.data.clone(),
            pts: packet.pts,
            duration: packet.duration,
            keyframe: packet.keyframe,
        };
        std::iter::repeat_n(frame, self.frames_per_packet)
    }
}

impl DecodeContext for MockDecoder {
    fn name(&self) -> &CStr {
        &self.name
    }

    fn parameters(&self) -> &CodecParameters {
        &self.parameters
    }

    fn set_output(&mut self, format: RawFormat) -> Result<(), EngineError> {
        self.output = Some(format);
        Ok(())
    }

    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>, EngineError> {
        if self.fail_decode {
            return Err(EngineError::Decode("corrupt packet".into()));
        }
        self.held.push_back(packet.clone());
        let mut frames = Vec::new();
        while self.held.len() > self.delay {
            if let Some(packet) = self.held.pop_front() {
                frames.extend(self.frames(&packet));
            }
        }
        Ok(frames)
    }

    fn drain(&mut self) -> Result<Vec<DecodedFrame>, EngineError> {
        let held = std::mem::take(&mut self.held);
        Ok(held.iter().flat_map(|packet| self.frames(packet)).collect())
    }

    fn reset(&mut self) {
        self.held.clear();
        if let Some(log) = &self.log {
            log.decoder_resets.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        if let Some(log) = &self.log {
            log.push("decoder dropped");
        }
    }
}

/**
    A scripted container: fixed streams and a fixed packet list.
*/
pub struct MockContainer {
    pub streams: Vec<StreamInfo>,
    pub packets: Vec<Packet>,
    pub position: usize,
    /// AV_TIME_BASE units.
    pub duration: Option<i64>,
    pub start_time: Option<i64>,
    /// Streams the engine has no decoder for.
    pub undecodable: BTreeSet<usize>,
    /// Streams whose decoder fails to open.
    pub broken_decoders: BTreeSet<usize>,
    /// Decoders of these streams fail every decode call.
    pub failing_decoders: BTreeSet<usize>,
    /// Frames every opened decoder emits per packet.
    pub frames_per_packet: usize,
    pub fail_seeks: bool,
    pub fail_probe: bool,
    /// Fail the read at this packet position once.
    pub read_error_at: Option<usize>,
    names: Vec<CString>,
    io: Option<IoAdapter>,
    pub log: Arc<MockLog>,
}

impl MockContainer {
    pub fn new(streams: Vec<StreamInfo>) -> Self {
        Self {
            names: streams.iter().map(|s| name_of(s.codec_id())).collect(),
            streams,
            packets: Vec::new(),
            position: 0,
            duration: None,
            start_time: None,
            undecodable: BTreeSet::new(),
            broken_decoders: BTreeSet::new(),
            failing_decoders: BTreeSet::new(),
            frames_per_packet: 1,
            fail_seeks: false,
            fail_probe: false,
            read_error_at: None,
            io: None,
            log: Arc::new(MockLog::default()),
        }
    }

    pub fn with_packets(packets: Vec<Packet>) -> Self {
        let mut container = Self::new(Vec::new());
        container.packets = packets;
        container
    }
}

impl Container for MockContainer {
    fn find_stream_info(&mut self) -> Result<(), EngineError> {
        if self.fail_probe {
            return Err(EngineError::Probe("no streams recognized".into()));
        }
        Ok(())
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn best_stream(&self, media: MediaType, require_decoder: bool) -> Option<usize> {
        self.streams
            .iter()
            .filter(|s| s.media_type == media)
            .filter(|s| !require_decoder || !self.undecodable.contains(&s.index))
            .max_by_key(|s| {
                (
                    !s.is_attached_picture(),
                    s.disposition.default,
                    std::cmp::Reverse(s.index),
                )
            })
            .map(|s| s.index)
    }

    fn open_decoder(
        &mut self,
        stream_index: usize,
        options: &DecoderOptions,
    ) -> Result<Box<dyn DecodeContext>, EngineError> {
        let stream = self
            .streams
            .get(stream_index)
            .filter(|_| !self.undecodable.contains(&stream_index))
            .ok_or(EngineError::DecoderNotFound(stream_index))?;
        if self.broken_decoders.contains(&stream_index) {
            return Err(EngineError::Alloc("codec context"));
        }

        self.log.decoder_options.lock().push((stream_index, *options));
        let mut decoder = MockDecoder::new(stream.parameters.clone());
        decoder.fail_decode = self.failing_decoders.contains(&stream_index);
        decoder.frames_per_packet = self.frames_per_packet;
        decoder.log = Some(Arc::clone(&self.log));
        Ok(Box::new(decoder))
    }

    fn codec_name(&self, stream_index: usize) -> Option<&CStr> {
        self.names.get(stream_index).map(CString::as_c_str)
    }

    fn duration(&self) -> Option<i64> {
        self.duration
    }

    fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    /// Lands on the last key frame of the stream at or before `timestamp`.
    fn seek(&mut self, stream_index: usize, timestamp: i64) -> Result<(), EngineError> {
        self.log.seeks.lock().push((stream_index, timestamp));
        if self.fail_seeks {
            return Err(EngineError::Seek("not seekable".into()));
        }

        self.position = self
            .packets
            .iter()
            .enumerate()
            .filter(|(_, p)| p.stream_index == stream_index && p.keyframe)
            .filter(|(_, p)| p.pts.is_some_and(|pts| pts.0 <= timestamp))
            .map(|(position, _)| position)
            .last()
            .unwrap_or(0);
        Ok(())
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, EngineError> {
        if self.read_error_at == Some(self.position) {
            self.read_error_at = None;
            return Err(EngineError::Read("truncated packet".into()));
        }
        let packet = self.packets.get(self.position).cloned();
        if packet.is_some() {
            self.position += 1;
        }
        Ok(packet)
    }
}

impl Drop for MockContainer {
    fn drop(&mut self) {
        self.log.push("container dropped");
        if self.io.take().is_some() {
            self.log.push("io adapter dropped");
        }
    }
}

/**
    Engine handing out a single scripted container.
*/
pub struct MockEngine {
    container: Mutex<Option<MockContainer>>,
    pub log: Arc<MockLog>,
    /// Option keys the engine consumes; anything else is rejected.
    pub known_options: Vec<&'static str>,
    pub initializations: AtomicUsize,
}

impl MockEngine {
    pub fn new(container: MockContainer) -> Self {
        Self {
            log: Arc::clone(&container.log),
            container: Mutex::new(Some(container)),
            known_options: vec!["rtsp_transport", "probesize", "analyzeduration"],
            initializations: AtomicUsize::new(0),
        }
    }

    /// An engine that cannot open anything.
    pub fn empty() -> Self {
        Self {
            container: Mutex::new(None),
            log: Arc::new(MockLog::default()),
            known_options: Vec::new(),
            initializations: AtomicUsize::new(0),
        }
    }
}

impl Engine for MockEngine {
    fn initialize(&self, _: Arc<dyn LockManager>) -> Result<(), EngineError> {
        self.initializations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn open_input(
        &self,
        source: InputSource<'_>,
        options: &EngineOptions,
    ) -> Result<Box<dyn Container>, EngineError> {
        let mut container = self
            .container
            .lock()
            .take()
            .ok_or_else(|| EngineError::Open("no such media".into()))?;

        let rejected: Vec<String> = options
            .iter()
            .map(|(key, _)| key)
            .filter(|key| !self.known_options.iter().any(|known| known == key))
            .map(str::to_owned)
            .collect();
        if !rejected.is_empty() {
            return Err(EngineError::RejectedOptions(rejected));
        }

        match source {
            InputSource::Locator(locator) => {
                *self.log.locator.lock() = Some(locator.to_owned());
            }
            InputSource::Stream(mut io) => {
                // sniff the header the way a demuxer would
                let mut header = [0u8; 16];
                let read = io
                    .read_into(&mut header)
                    .map_err(|e| EngineError::Read(e.to_string()))?;
                *self.log.streamed.lock() = (read > 0).then(|| header[..read].to_vec());
                container.io = Some(io);
            }
        }
        Ok(Box::new(container))
    }
}

pub mod fixtures {
    use ffmpeg_types::{Disposition, Rational};

    use super::*;

    pub const AVCC: [u8; 15] = [
        0x01, 0x42, 0x00, 0x1e, 0xff, 0xe1, 0x00, 0x02, 0x67, 0x42, 0x01, 0x00, 0x02, 0x68, 0xce,
    ];

    /// H.264 (`avcC`) video on stream 0, 90 kHz.
    pub fn avc_video(index: usize) -> StreamInfo {
        StreamInfo::new(
            index,
            MediaType::Video,
            CodecParameters::video(CodecId::H264, 1280, 720).with_extradata(AVCC),
        )
        .with_time_base(Rational::new(1, 90_000))
    }

    /// ADTS AAC audio, 48 kHz time base.
    pub fn adts_audio(index: usize) -> StreamInfo {
        StreamInfo::new(index, MediaType::Audio, CodecParameters::audio(CodecId::Aac, 48_000, 2))
            .with_time_base(Rational::new(1, 48_000))
    }

    pub fn subtitle(index: usize, codec: CodecId) -> StreamInfo {
        StreamInfo::new(index, MediaType::Subtitle, CodecParameters::new(codec))
            .with_time_base(Rational::new(1, 1000))
    }

    pub fn cover_art(index: usize, data: &[u8]) -> StreamInfo {
        let mut stream =
            StreamInfo::new(index, MediaType::Video, CodecParameters::video(CodecId::Png, 600, 600));
        stream.disposition = Disposition::attached_picture();
        stream.attached_picture = Some(data.to_vec());
        stream
    }

    /**
        Ten seconds of H.264 + AAC: a video key frame every second, 25 fps
        video and 1024-sample audio frames, interleaved by time.
    */
    pub fn h264_aac() -> MockContainer {
        let mut container = MockContainer::new(vec![avc_video(0), adts_audio(1)]);
        container.duration = Some(10_000_000);

        let mut packets = Vec::new();
        let mut audio_pts = 0i64;
        for frame in 0..250i64 {
            let pts = frame * 3600;
            let packet = if frame % 25 == 0 {
                Packet::new(0, [0, 0, 0, 1, 0x65], pts).keyframe()
            } else {
                Packet::new(0, [0, 0, 0, 1, 0x41], pts)
            };
            packets.push(packet.with_duration(3600));

            // audio frames starting within this video frame
            let audio_until = (frame + 1) * 48_000 / 25;
            while audio_pts < audio_until {
                packets.push(
                    Packet::new(1, [0xff, 0xf1], audio_pts)
                        .with_duration(1024)
                        .keyframe(),
                );
                audio_pts += 1024;
            }
        }
        container.packets = packets;
        container
    }
}
