/*!
    `AVIOContext` over an [`IoAdapter`].
*/

use std::ffi::{c_int, c_void};
use std::{ptr, slice};

use ffmpeg_next::ffi;

use crate::error::EngineError;
use crate::io::{IoAdapter, Whence};

/**
    An FFmpeg I/O context reading through an [`IoAdapter`].

    The context's buffer is the only read buffer of the session; the
    adapter fills it in place. Must outlive the format context it is
    attached to.
*/
pub struct CustomIo {
    context: *mut ffi::AVIOContext,
    adapter: *mut IoAdapter,
}

impl CustomIo {
    pub fn new(adapter: IoAdapter) -> Result<Self, EngineError> {
        let size = adapter.buffer_size();
        let size_c = c_int::try_from(size).map_err(|_| EngineError::Alloc("io buffer"))?;

        // SAFETY: plain allocation; checked for null below.
        let buffer = unsafe { ffi::av_malloc(size) }.cast::<u8>();
        if buffer.is_null() {
            return Err(EngineError::Alloc("io buffer"));
        }

        let adapter = Box::into_raw(Box::new(adapter));
        // SAFETY: buffer was allocated with av_malloc; the adapter pointer stays
        // valid until Drop, after the context is freed.
        let context = unsafe {
            ffi::avio_alloc_context(
                buffer,
                size_c,
                0,
                adapter.cast(),
                Some(read_packet),
                None,
                Some(seek),
            )
        };
        if context.is_null() {
            // SAFETY: neither pointer was handed to FFmpeg.
            unsafe {
                ffi::av_free(buffer.cast());
                drop(Box::from_raw(adapter));
            }
            return Err(EngineError::Alloc("io context"));
        }

        Ok(Self { context, adapter })
    }

    pub fn as_mut_ptr(&mut self) -> *mut ffi::AVIOContext {
        self.context
    }
}

impl Drop for CustomIo {
    fn drop(&mut self) {
        // SAFETY: the format context using this I/O context is already closed.
        // FFmpeg may have replaced the buffer, so free whatever it holds now.
        unsafe {
            ffi::av_freep(ptr::addr_of_mut!((*self.context).buffer).cast());
            ffi::avio_context_free(&mut self.context);
            drop(Box::from_raw(self.adapter));
        }
    }
}

unsafe extern "C" fn read_packet(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    // SAFETY: opaque is the adapter registered in CustomIo::new.
    let adapter = unsafe { &mut *opaque.cast::<IoAdapter>() };
    let Ok(size) = usize::try_from(buf_size) else {
        return ffi::AVERROR(ffi::EINVAL);
    };
    if buf.is_null() {
        return ffi::AVERROR(ffi::EINVAL);
    }

    // SAFETY: FFmpeg provides buf_size writable bytes at buf.
    let buf = unsafe { slice::from_raw_parts_mut(buf, size) };
    match adapter.read_into(buf) {
        Ok(0) => ffi::AVERROR_EOF,
        // never more than buf_size, so this fits
        Ok(read) => read as c_int,
        Err(e) => {
            tracing::debug!(error = %e, "custom io read failed");
            ffi::AVERROR(ffi::EIO)
        }
    }
}

unsafe extern "C" fn seek(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    // SAFETY: opaque is the adapter registered in CustomIo::new.
    let adapter = unsafe { &mut *opaque.cast::<IoAdapter>() };
    let Some(whence) = Whence::from_raw(whence) else {
        return i64::from(ffi::AVERROR(ffi::EINVAL));
    };

    match adapter.seek(offset, whence) {
        Ok(position) => i64::try_from(position).unwrap_or(i64::MAX),
        Err(e) => {
            tracing::debug!(error = %e, ?whence, offset, "custom io seek failed");
            -1
        }
    }
}
