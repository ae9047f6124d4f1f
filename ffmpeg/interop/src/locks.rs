/*!
    Lock capability handed to the engine.

    Engines that run their own worker threads may need process-wide locks
    around non-reentrant internals. Instead of raw function pointers and an
    opaque mutex pointer, the engine receives a [`LockManager`] once at
    initialization and asks it for locks.
*/

use std::ffi::c_void;
use std::sync::{Arc, OnceLock};

use parking_lot::RawMutex;
use parking_lot::lock_api::RawMutex as _;

/**
    An engine-owned lock created by a [`LockManager`].
*/
pub struct LockHandle(Box<RawMutex>);

impl LockHandle {
    /**
        Turn the handle into an opaque pointer for engines with C callbacks.
    */
    pub fn into_raw(self) -> *mut c_void {
        Box::into_raw(self.0).cast()
    }

    /**
        Rebuild a handle from [`LockHandle::into_raw`].

        # Safety

        `ptr` must come from `into_raw` and must not be used again afterwards.
    */
    pub unsafe fn from_raw(ptr: *mut c_void) -> Self {
        // SAFETY: guaranteed by the caller.
        Self(unsafe { Box::from_raw(ptr.cast::<RawMutex>()) })
    }

    pub fn is_locked(&self) -> bool {
        self.0.is_locked()
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("locked", &self.0.is_locked())
            .finish()
    }
}

/**
    Create/acquire/release/destroy capability for engine locks.
*/
pub trait LockManager: Send + Sync {
    fn create(&self) -> LockHandle;
    fn acquire(&self, lock: &LockHandle);
    /// Must only be called by the thread that acquired `lock`.
    fn release(&self, lock: &LockHandle);
    fn destroy(&self, lock: LockHandle);
}

/**
    [`LockManager`] backed by `parking_lot`'s raw mutex.
*/
#[derive(Debug, Default)]
pub struct MutexLockManager;

impl LockManager for MutexLockManager {
    fn create(&self) -> LockHandle {
        LockHandle(Box::new(RawMutex::INIT))
    }

    fn acquire(&self, lock: &LockHandle) {
        lock.0.lock();
    }

    fn release(&self, lock: &LockHandle) {
        if lock.0.is_locked() {
            // SAFETY: the release contract requires the caller to hold the lock.
            unsafe { lock.0.unlock() };
        }
    }

    fn destroy(&self, lock: LockHandle) {
        drop(lock);
    }
}

static LOCK_MANAGER: OnceLock<Arc<dyn LockManager>> = OnceLock::new();

/**
    The process-wide lock manager, created on first use.
*/
pub fn lock_manager() -> Arc<dyn LockManager> {
    LOCK_MANAGER
        .get_or_init(|| Arc::new(MutexLockManager))
        .clone()
}
