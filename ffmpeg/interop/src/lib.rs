/*!
    Media session layer between a demuxing/decoding engine and a pull-based
    media host.

    A [`MediaSession`] opens a source (by locator or through a seekable byte
    stream), picks the audio, video and subtitle streams to expose, decides
    per stream whether to pass the bitstream through or decode it, and then
    serves the host's start, sample and stream-switch requests through its
    [`MediaStreamSource`].

    The engine itself sits behind the [`Engine`] trait. Enable the `ffmpeg`
    feature for an implementation on top of FFmpeg.

    ```ignore
    let engine = ffmpeg_interop::backend::FfmpegEngine::new();
    let session = MediaSession::open_by_locator(&engine, "movie.mkv", false, false, Default::default())?;
    let source = session.media_stream_source().unwrap();

    source.start(Some(Ticks::ZERO));
    for descriptor in source.stream_descriptors() {
        let sample = source.request_sample(descriptor.id());
    }
    ```
*/

mod codec_map;
mod config;
mod descriptor;
mod engine;
mod error;
mod factory;
mod host;
mod io;
mod locks;
mod playback;
mod provider;
mod reader;
mod selector;
mod session;

#[cfg(feature = "ffmpeg")]
pub mod backend;

#[cfg(test)]
mod test_support;

pub use codec_map::{audio_passthrough_subtype, subtitle_subtype, thumbnail_extension};
pub use config::{EngineOptions, SessionConfig};
pub use descriptor::{
    AudioEncoding, AudioSubtype, EncodingProperties, StreamDescriptor, StreamId, SubtitleSubtype,
    TimedTextEncoding, VideoEncoding, VideoSubtype,
};
pub use engine::{
    Container, DecodeContext, DecodedFrame, DecoderOptions, Engine, InputSource, Packet,
    ensure_initialized,
};
pub use error::{EngineError, InteropError, Result};
pub use factory::{
    BuiltStream, build_audio, build_audio_from_parameters, build_subtitle, build_video,
};
pub use host::{MediaStreamSource, StreamSourceEvents, SubscriptionId};
pub use io::{
    ByteStream, IO_BUFFER_SIZE, IoAdapter, SEEK_FORCE, SEEK_SIZE, SharedByteStream, Whence,
    share_stream,
};
pub use locks::{LockHandle, LockManager, MutexLockManager, lock_manager};
pub use provider::{
    AnnexBProvider, AvcProvider, DecodingProvider, MediaSample, PassthroughProvider,
    ProduceContext, ProviderVariant, SampleProvider, StreamTiming,
};
pub use reader::PacketReader;
pub use selector::{Selection, StreamSlot, select_streams};
pub use session::{MediaSession, SeekPhase, SessionState, Thumbnail};

pub use ffmpeg_types::{
    CodecId, CodecParameters, Disposition, MediaType, Pts, RawFormat, Rational, StreamInfo, Ticks,
};
