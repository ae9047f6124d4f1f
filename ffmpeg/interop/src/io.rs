/*!
    Custom I/O adapter.

    Lets the engine pull bytes from any seekable byte source instead of only
    opening paths itself. Needed whenever the source is a sandboxed handle,
    an in-memory buffer or anything else the engine cannot open by name.
*/

use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Size of the adapter's read buffer.
pub const IO_BUFFER_SIZE: usize = 16 * 1024;

/// Engine whence flag asking for the total stream size.
pub const SEEK_SIZE: i32 = 0x10000;

/// Engine whence flag allowing expensive seeks; it does not change semantics here.
pub const SEEK_FORCE: i32 = 0x20000;

/**
    A seekable byte source.
*/
pub trait ByteStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> ByteStream for T {}

/**
    Byte stream handle shared by the session and its I/O adapter.

    The session keeps one reference and releases it at teardown, after the
    adapter (and the container using it) are gone.
*/
pub type SharedByteStream = Arc<Mutex<Box<dyn ByteStream>>>;

pub fn share_stream(stream: impl ByteStream + 'static) -> SharedByteStream {
    Arc::new(Mutex::new(Box::new(stream)))
}

/**
    Seek origin, as requested by the engine.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    /// Absolute position.
    Set,
    /// Relative to the current position.
    Current,
    /// Relative to the end of the stream.
    End,
    /// Report the total size without moving.
    Size,
}

impl Whence {
    /**
        Decode the engine's numeric whence (`0`/`1`/`2` or the size flag).
    */
    pub fn from_raw(whence: i32) -> Option<Self> {
        let whence = whence & !SEEK_FORCE;
        if whence & SEEK_SIZE != 0 {
            return Some(Self::Size);
        }
        match whence {
            0 => Some(Self::Set),
            1 => Some(Self::Current),
            2 => Some(Self::End),
            _ => None,
        }
    }
}

/**
    Bridges a [`ByteStream`] to the engine's pull-based read/seek callbacks.

    Reads land directly in the engine's I/O buffer, allocated once per
    session with [`IoAdapter::buffer_size`] bytes.
*/
pub struct IoAdapter {
    stream: SharedByteStream,
    buffer_size: usize,
}

impl IoAdapter {
    pub fn new(stream: SharedByteStream) -> Self {
        Self {
            stream,
            buffer_size: IO_BUFFER_SIZE,
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /**
        Fill `buf` from the stream (at most [`IoAdapter::buffer_size`] bytes).

        Returns the number of bytes read. Zero means end of stream: a
        successful read of zero bytes is always treated as EOF.
    */
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len().min(self.buffer_size);
        if len == 0 {
            return Ok(0);
        }

        let mut stream = self.stream.lock();
        loop {
            match stream.read(&mut buf[..len]) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "byte stream read failed");
                    return Err(e.into());
                }
            }
        }
    }

    /**
        Seek the underlying stream, returning the new position (or the total
        size for [`Whence::Size`]).
    */
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let mut stream = self.stream.lock();
        let position = match whence {
            Whence::Set => {
                let start = u64::try_from(offset).map_err(|_| {
                    io::Error::new(ErrorKind::InvalidInput, "negative absolute seek")
                })?;
                stream.seek(SeekFrom::Start(start))?
            }
            Whence::Current => stream.seek(SeekFrom::Current(offset))?,
            Whence::End => stream.seek(SeekFrom::End(offset))?,
            Whence::Size => {
                let current = stream.stream_position()?;
                let size = stream.seek(SeekFrom::End(0))?;
                stream.seek(SeekFrom::Start(current))?;
                size
            }
        };
        Ok(position)
    }
}

impl std::fmt::Debug for IoAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoAdapter")
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}
