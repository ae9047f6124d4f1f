/*!
    The decoding engine seam.

    Container parsing and payload decoding are delegated to an engine behind
    these traits. The session layer only ever talks to [`Engine`],
    [`Container`] and [`DecodeContext`]; the `ffmpeg` feature provides an
    implementation on top of `ffmpeg-next`.
*/

use std::ffi::CStr;
use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock};

use ffmpeg_types::{CodecParameters, MediaType, Pts, RawFormat, StreamInfo};

use crate::config::EngineOptions;
use crate::error::EngineError;
use crate::io::IoAdapter;
use crate::locks::{LockManager, lock_manager};

/**
    An encoded packet read from the container.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub stream_index: usize,
    pub data: Vec<u8>,
    pub pts: Option<Pts>,
    pub dts: Option<Pts>,
    /// Duration in stream time base units (0 if unknown).
    pub duration: i64,
    pub keyframe: bool,
}

impl Packet {
    pub fn new(stream_index: usize, data: impl Into<Vec<u8>>, pts: i64) -> Self {
        Self {
            stream_index,
            data: data.into(),
            pts: Some(Pts(pts)),
            dts: Some(Pts(pts)),
            duration: 0,
            keyframe: false,
        }
    }

    pub fn keyframe(mut self) -> Self {
        self.keyframe = true;
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }
}

/**
    A decoded frame, already converted to the format requested with
    [`DecodeContext::set_output`].
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    pub data: Vec<u8>,
    pub pts: Option<Pts>,
    /// Duration in stream time base units (0 if unknown).
    pub duration: i64,
    pub keyframe: bool,
}

/**
    Decoder threading hints. Purely a performance hint to the engine.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    pub thread_count: Option<usize>,
    pub frame_threads: bool,
    pub slice_threads: bool,
}

impl DecoderOptions {
    /**
        One thread per hardware thread, with frame and slice parallelism.
    */
    pub fn multithreaded() -> Self {
        match std::thread::available_parallelism().map(NonZeroUsize::get) {
            Ok(threads) => Self {
                thread_count: Some(threads),
                frame_threads: true,
                slice_threads: true,
            },
            Err(_) => Self::default(),
        }
    }
}

/**
    Where the engine should read the container from.
*/
pub enum InputSource<'a> {
    /// A path or URL the engine opens itself.
    Locator(&'a str),
    /// A byte stream read through the custom I/O adapter.
    Stream(IoAdapter),
}

impl std::fmt::Debug for InputSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locator(locator) => f.debug_tuple("Locator").field(locator).finish(),
            Self::Stream(io) => f.debug_tuple("Stream").field(io).finish(),
        }
    }
}

/**
    A demuxing/decoding engine.
*/
pub trait Engine: Send + Sync {
    /**
        One-time process setup. Called at most once per process, through
        [`ensure_initialized`].
    */
    fn initialize(&self, locks: Arc<dyn LockManager>) -> Result<(), EngineError>;

    /**
        Open a container. Every option must be consumed by the engine;
        leftovers are reported as [`EngineError::RejectedOptions`].
    */
    fn open_input(
        &self,
        source: InputSource<'_>,
        options: &EngineOptions,
    ) -> Result<Box<dyn Container>, EngineError>;
}

/**
    An opened container.

    Dropping it releases the container handle and, for stream inputs, the
    I/O adapter and its buffer.
*/
pub trait Container: Send {
    /// Probe stream structure. Must be called before [`Container::streams`].
    fn find_stream_info(&mut self) -> Result<(), EngineError>;

    /// Audio, video and subtitle streams. Look streams up by
    /// [`StreamInfo::index`], not by position.
    fn streams(&self) -> &[StreamInfo];

    /**
        The engine's best-stream heuristic for `media`. With
        `require_decoder`, only streams the engine can decode qualify.
    */
    fn best_stream(&self, media: MediaType, require_decoder: bool) -> Option<usize>;

    fn open_decoder(
        &mut self,
        stream_index: usize,
        options: &DecoderOptions,
    ) -> Result<Box<dyn DecodeContext>, EngineError>;

    /// Engine name of the stream's codec, in the engine's narrow encoding.
    fn codec_name(&self, stream_index: usize) -> Option<&CStr>;

    /// Container duration in [`ffmpeg_types::AV_TIME_BASE`] units.
    fn duration(&self) -> Option<i64>;

    /// Container start time in [`ffmpeg_types::AV_TIME_BASE`] units.
    fn start_time(&self) -> Option<i64>;

    /**
        Seek `stream_index` to the nearest key frame at or before `timestamp`
        (in that stream's time base).
    */
    fn seek(&mut self, stream_index: usize, timestamp: i64) -> Result<(), EngineError>;

    /// Next packet in file order, `None` at end of stream.
    fn read_packet(&mut self) -> Result<Option<Packet>, EngineError>;
}

/**
    An opened decoder for one stream.
*/
pub trait DecodeContext: Send {
    /// Decoder name, in the engine's narrow encoding.
    fn name(&self) -> &CStr;

    /// Parameters as seen by the opened decoder.
    fn parameters(&self) -> &CodecParameters;

    /// Request conversion of every decoded frame into `format`.
    fn set_output(&mut self, format: RawFormat) -> Result<(), EngineError>;

    /// Decode a packet. May return zero, one or several frames.
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedFrame>, EngineError>;

    /// Signal end of stream and return the frames still buffered.
    fn drain(&mut self) -> Result<Vec<DecodedFrame>, EngineError>;

    /// Discard all buffered state (after a seek or a stream switch).
    fn reset(&mut self);
}

static ENGINE_INIT: OnceLock<Result<(), EngineError>> = OnceLock::new();

/**
    Run the engine's one-time initialization, once per process.

    The first caller's engine is initialized with the process-wide lock
    manager; later callers get the recorded outcome.
*/
pub fn ensure_initialized(engine: &dyn Engine) -> Result<(), EngineError> {
    ENGINE_INIT
        .get_or_init(|| {
            tracing::debug!("initializing decoding engine");
            engine.initialize(lock_manager())
        })
        .clone()
}
