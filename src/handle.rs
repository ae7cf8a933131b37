use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::{debug, trace, warn};

use crate::error::{MecabError, Result};
use crate::native::{read_mecab_error, LoadedLibrary, MecabApi, MecabHandle};

/// One native analyzer instance (`mecab_t*`).
///
/// Calls into the context go through [`ContextBorrow`]s. Releasing the
/// context refuses new borrows, waits until every outstanding one has been
/// dropped and only then destroys the native instance, so a release never
/// pulls memory out from under an in-flight parse.
pub(crate) struct NativeContext {
    library: Arc<LoadedLibrary>,
    raw: AtomicPtr<std::os::raw::c_void>,
    borrows: AtomicUsize,
    released: AtomicBool,
    idle: Mutex<()>,
    idle_signal: Condvar,
    calls: Mutex<()>,
}

impl NativeContext {
    pub(crate) fn create(library: Arc<LoadedLibrary>, args: &[CString]) -> Result<Self> {
        let argc = c_int::try_from(args.len()).map_err(|_| {
            MecabError::InvalidArgument(format!("too many engine arguments: {}", args.len()))
        })?;
        let mut argv: Vec<*mut c_char> = args
            .iter()
            .map(|arg| arg.as_ptr() as *mut c_char)
            .collect();
        let argv_ptr = if argv.is_empty() {
            ptr::null_mut()
        } else {
            argv.as_mut_ptr()
        };

        let raw = unsafe { (library.api.mecab_new)(argc, argv_ptr) };
        if raw.is_null() {
            let message = read_mecab_error(&library.api, ptr::null_mut())
                .unwrap_or_else(|| "mecab_new returned a null handle".to_string());
            warn!(%message, "mecab context creation failed");
            return Err(MecabError::Creation(message));
        }
        debug!(argc, "created mecab context");

        Ok(Self {
            library,
            raw: AtomicPtr::new(raw),
            borrows: AtomicUsize::new(0),
            released: AtomicBool::new(false),
            idle: Mutex::new(()),
            idle_signal: Condvar::new(),
            calls: Mutex::new(()),
        })
    }

    /// Pins the context for the lifetime of the returned guard.
    pub(crate) fn begin_use(&self) -> Result<ContextBorrow<'_>> {
        self.borrows.fetch_add(1, Ordering::SeqCst);
        if self.released.load(Ordering::SeqCst) {
            self.end_use();
            return Err(MecabError::UseAfterRelease);
        }
        Ok(ContextBorrow { context: self })
    }

    fn end_use(&self) {
        let previous = self.borrows.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.released.load(Ordering::SeqCst) {
            let _idle = self.lock_idle();
            self.idle_signal.notify_all();
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn active_borrows(&self) -> usize {
        self.borrows.load(Ordering::SeqCst)
    }

    /// Marks the context released, waits for outstanding borrows and destroys
    /// the native instance. Safe to call any number of times.
    pub(crate) fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            trace!("mecab context release requested");
        }

        let mut idle = self.lock_idle();
        while self.borrows.load(Ordering::SeqCst) != 0 {
            trace!("waiting for in-flight mecab calls before release");
            idle = self
                .idle_signal
                .wait(idle)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        drop(idle);

        self.destroy();
    }

    /// Destroys the native instance once.
    fn destroy(&self) -> bool {
        let raw = self.raw.swap(ptr::null_mut(), Ordering::SeqCst);
        if raw.is_null() {
            return false;
        }
        // `library` is an `Arc` owned by this context, so the module cannot
        // be unloaded before the instance is destroyed.
        unsafe {
            (self.library.api.mecab_destroy)(raw);
        }
        debug!("destroyed mecab context");
        true
    }

    fn lock_idle(&self) -> MutexGuard<'_, ()> {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for NativeContext {
    fn drop(&mut self) {
        self.release();
    }
}

/// A counted borrow of a live [`NativeContext`]; dropping it ends the use.
pub(crate) struct ContextBorrow<'a> {
    context: &'a NativeContext,
}

impl<'a> ContextBorrow<'a> {
    pub(crate) fn raw(&self) -> MecabHandle {
        self.context.raw.load(Ordering::SeqCst)
    }

    pub(crate) fn api(&self) -> &'a MecabApi {
        &self.context.library.api
    }

    /// The engine is not re-entrant per instance and node pointers die on the
    /// next analyze call, so native calls on one context are serialized.
    pub(crate) fn lock_calls(&self) -> MutexGuard<'a, ()> {
        self.context
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ContextBorrow<'_> {
    fn drop(&mut self) {
        self.context.end_use();
    }
}
