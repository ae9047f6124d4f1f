/*!
    Shared types for the ffmpeg interop crates.

    This crate defines the vocabulary that crosses the boundary between the
    session layer and whatever decoding engine sits behind it. It has no
    dependency on FFmpeg, so hosts and tests can use it without pulling in
    FFmpeg bindings.
*/

mod codec;
mod format;
mod stream;
mod time;

pub use codec::CodecId;
pub use format::RawFormat;
pub use stream::{CodecParameters, Disposition, MediaType, StreamInfo};
pub use time::{AV_TIME_BASE, Pts, Rational, TICKS_PER_SECOND, Ticks};
