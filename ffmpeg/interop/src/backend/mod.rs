/*!
    [`Engine`] implementation on top of FFmpeg (`ffmpeg-next`).

    Custom I/O for byte streams goes through an `AVIOContext` whose callbacks
    forward to the session's [`crate::IoAdapter`].
*/

mod avio;
mod convert;
mod decoder;
mod input;

use std::sync::{Arc, OnceLock};

use crate::config::EngineOptions;
use crate::engine::{Container, Engine, InputSource};
use crate::error::EngineError;
use crate::locks::LockManager;

pub use decoder::FfmpegDecoder;
pub use input::FfmpegContainer;

/**
    FFmpeg-backed engine.

    FFmpeg serializes its own non-reentrant internals, so the lock manager
    handed over at initialization is only kept for the lifetime of the
    engine.
*/
#[derive(Default)]
pub struct FfmpegEngine {
    /// Set by the first [`Engine::initialize`]; later calls keep it.
    locks: OnceLock<Arc<dyn LockManager>>,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock manager handed over at initialization.
    pub fn lock_manager(&self) -> Option<&Arc<dyn LockManager>> {
        self.locks.get()
    }
}

impl Engine for FfmpegEngine {
    fn initialize(&self, locks: Arc<dyn LockManager>) -> Result<(), EngineError> {
        ffmpeg_next::init().map_err(|e| EngineError::Init(e.to_string()))?;
        ffmpeg_next::format::network::init();
        if self.locks.set(locks).is_err() {
            tracing::debug!("ffmpeg engine already initialized, keeping its lock manager");
            return Ok(());
        }
        tracing::debug!("ffmpeg engine initialized");
        Ok(())
    }

    fn open_input(
        &self,
        source: InputSource<'_>,
        options: &EngineOptions,
    ) -> Result<Box<dyn Container>, EngineError> {
        let container = FfmpegContainer::open(source, options)?;
        Ok(Box::new(container))
    }
}

impl std::fmt::Debug for FfmpegEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegEngine")
            .field("initialized", &self.locks.get().is_some())
            .finish()
    }
}
