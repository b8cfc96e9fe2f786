//! Process-wide interpreter lifecycle and lock
//!
//! Design: one reference-counted runtime per process.
//! - [`Interpreter::open`] initializes on 0 -> 1, [`Interpreter::close`]
//!   finalizes on 1 -> 0; closing at 0 is a no-op
//! - [`InterpreterHandle`] is the scoped form of one open/close pair
//! - [`Interpreter::lock`] serializes all access and owns the GIL for the
//!   holding thread; it is re-entrant
//!
//! Count, instance and GIL bookkeeping all live behind the same re-entrant
//! mutex the lock hands out, so open/close are safe from any thread and may
//! run while the calling thread holds the lock. A close that reaches zero
//! under a held lock defers finalization until the outermost lock drops.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ffi;
use crate::sys;
use once_cell::sync::Lazy;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::os::raw::c_int;
use std::ptr;
use tracing::{debug, error, info, warn};

static STATE: Lazy<ReentrantMutex<RefCell<State>>> =
    Lazy::new(|| ReentrantMutex::new(RefCell::new(State::default())));

#[derive(Default)]
struct State {
    ref_count: usize,
    instance: Option<Instance>,
    /// Nesting depth of `InterpreterLock`s held by the mutex owner
    lock_depth: usize,
    /// GIL taken by the outermost lock, released when it drops
    gil: Option<ffi::PyGILState_STATE>,
    config: Config,
}

/// The live runtime
struct Instance {
    /// Thread state parked by `PyEval_SaveThread` after initialization
    tstate: *mut ffi::PyThreadState,
    /// False when the host process initialized the runtime itself
    owned: bool,
}

// The parked thread state is only touched under STATE's mutex
unsafe impl Send for Instance {}

impl Instance {
    fn start(config: &Config) -> Result<Self> {
        if ffi::runtime_initialized() {
            info!(event = "interpreter_attach", "runtime already initialized by host");
            unsafe {
                let gil = ffi::PyGILState_Ensure();
                let extended = extend_path(config);
                ffi::PyGILState_Release(gil);
                extended?;
            }
            return Ok(Self {
                tstate: ptr::null_mut(),
                owned: false,
            });
        }

        let _perf = crate::logging::perf::track("interpreter_start");
        let signals = c_int::from(config.interpreter.install_signal_handlers);
        unsafe { ffi::Py_InitializeEx(signals) };
        if !ffi::runtime_initialized() {
            error!(event = "interpreter_init_failed");
            return Err(Error::new("interpreter failed to initialize"));
        }

        if let Err(err) = extend_path(config) {
            unsafe { ffi::Py_FinalizeEx() };
            return Err(err);
        }

        let tstate = unsafe { ffi::PyEval_SaveThread() };
        info!(event = "interpreter_start", "runtime initialized");
        Ok(Self {
            tstate,
            owned: true,
        })
    }

    fn stop(self) {
        if !self.owned {
            info!(event = "interpreter_detach", "runtime left to host");
            return;
        }

        let _perf = crate::logging::perf::track("interpreter_stop");
        unsafe {
            ffi::PyEval_RestoreThread(self.tstate);
            if ffi::Py_FinalizeEx() < 0 {
                warn!(event = "interpreter_finalize_error", "errors while finalizing");
            }
        }
        info!(event = "interpreter_stop", "runtime finalized");
    }
}

fn extend_path(config: &Config) -> Result<()> {
    for entry in &config.paths.python_path {
        sys::add_to_path(entry)?;
    }
    Ok(())
}

/// Entry points of the process-wide runtime
pub struct Interpreter;

impl Interpreter {
    /// Count one more user; initializes the runtime when it was closed
    pub fn open() -> Result<()> {
        let guard = STATE.lock();
        let mut state = guard.borrow_mut();

        if state.instance.is_none() {
            let instance = Instance::start(&state.config)?;
            state.instance = Some(instance);
            // Opened under a held lock: that lock now owns the GIL too
            if state.lock_depth > 0 {
                state.gil = Some(unsafe { ffi::PyGILState_Ensure() });
            }
        }

        state.ref_count += 1;
        debug!(event = "interpreter_open", ref_count = state.ref_count);
        Ok(())
    }

    /// Drop one user; finalizes the runtime when the last one leaves
    pub fn close() {
        let guard = STATE.lock();
        let mut state = guard.borrow_mut();

        if state.ref_count == 0 {
            debug!(event = "interpreter_close_ignored", "no open users");
            return;
        }

        state.ref_count -= 1;
        debug!(event = "interpreter_close", ref_count = state.ref_count);
        if state.ref_count > 0 {
            return;
        }

        if state.lock_depth > 0 {
            debug!(event = "interpreter_stop_deferred", "lock still held");
            return;
        }

        if let Some(instance) = state.instance.take() {
            instance.stop();
        }
    }

    /// Open and return the token that closes again on drop
    pub fn handle() -> Result<InterpreterHandle> {
        Self::open()?;
        Ok(InterpreterHandle { owns: true })
    }

    /// Exclusive access to the runtime for the calling thread
    ///
    /// Blocks while another thread holds it. Re-entrant on the same thread.
    pub fn lock() -> InterpreterLock {
        let guard = STATE.lock();
        {
            let mut state = guard.borrow_mut();
            if state.lock_depth == 0 && state.instance.is_some() {
                state.gil = Some(unsafe { ffi::PyGILState_Ensure() });
            }
            state.lock_depth += 1;
        }
        InterpreterLock { guard }
    }

    /// Whether at least one user holds the runtime open
    pub fn is_open() -> bool {
        Self::ref_count() > 0
    }

    /// Whether the runtime is initialized, by this crate or by the host
    pub fn is_initialized() -> bool {
        ffi::runtime_initialized()
    }

    pub fn ref_count() -> usize {
        STATE.lock().borrow().ref_count
    }

    /// Settings used by the next initialization
    pub fn configure(config: Config) {
        let guard = STATE.lock();
        guard.borrow_mut().config = config;
    }
}

/// Scoped obligation to keep the runtime open
///
/// Cloning an owning handle opens again; `std::mem::take` moves the
/// obligation out and leaves a non-owning handle behind.
#[derive(Debug, Default)]
pub struct InterpreterHandle {
    owns: bool,
}

impl InterpreterHandle {
    /// Give up the obligation without dropping the token
    pub fn release(&mut self) {
        if self.owns {
            self.owns = false;
            Interpreter::close();
        }
    }

    /// Take the obligation (again); no-op when already held
    pub fn acquire(&mut self) -> Result<()> {
        if !self.owns {
            Interpreter::open()?;
            self.owns = true;
        }
        Ok(())
    }

    pub fn is_acquired(&self) -> bool {
        self.owns
    }
}

impl Clone for InterpreterHandle {
    fn clone(&self) -> Self {
        if !self.owns {
            return Self::default();
        }

        match Interpreter::open() {
            Ok(()) => Self { owns: true },
            Err(err) => {
                error!(event = "interpreter_handle_clone_failed", error = %err);
                Self::default()
            }
        }
    }
}

impl Drop for InterpreterHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Guard returned by [`Interpreter::lock`]
///
/// Holding it means holding the GIL whenever the runtime is open.
/// Not `Send`: it must be dropped on the thread that took it.
pub struct InterpreterLock {
    guard: ReentrantMutexGuard<'static, RefCell<State>>,
}

impl Drop for InterpreterLock {
    fn drop(&mut self) {
        let mut state = self.guard.borrow_mut();
        state.lock_depth -= 1;
        if state.lock_depth > 0 {
            return;
        }

        if let Some(gil) = state.gil.take() {
            unsafe { ffi::PyGILState_Release(gil) };
        }

        if state.ref_count == 0 {
            if let Some(instance) = state.instance.take() {
                debug!(event = "interpreter_stop_resumed", "last lock released");
                instance.stop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::python;

    #[test]
    fn test_handle_counting() {
        let _py = python();
        let base = Interpreter::ref_count();

        let mut handle = Interpreter::handle().unwrap();
        assert_eq!(Interpreter::ref_count(), base + 1);

        let copy = handle.clone();
        assert!(copy.is_acquired());
        assert_eq!(Interpreter::ref_count(), base + 2);

        let moved = std::mem::take(&mut handle);
        assert!(!handle.is_acquired());
        assert!(moved.is_acquired());
        assert_eq!(Interpreter::ref_count(), base + 2);

        drop(handle);
        drop(copy);
        assert_eq!(Interpreter::ref_count(), base + 1);
        drop(moved);
        assert_eq!(Interpreter::ref_count(), base);
        assert!(Interpreter::is_initialized());
    }

    #[test]
    fn test_release_and_acquire() {
        let _py = python();
        let base = Interpreter::ref_count();

        let mut handle = Interpreter::handle().unwrap();
        handle.release();
        handle.release();
        assert_eq!(Interpreter::ref_count(), base);

        handle.acquire().unwrap();
        handle.acquire().unwrap();
        assert_eq!(Interpreter::ref_count(), base + 1);

        let idle = InterpreterHandle::default().clone();
        assert!(!idle.is_acquired());
    }

    #[test]
    fn test_open_close_from_many_threads() {
        let base = {
            let _py = python();
            Interpreter::ref_count()
        };

        let workers: Vec<_> = (0..8i64)
            .map(|n| {
                std::thread::spawn(move || {
                    for i in 0..50i64 {
                        Interpreter::open().unwrap();
                        let handle = Interpreter::handle().unwrap();
                        let copy = handle.clone();
                        {
                            let _lock = Interpreter::lock();
                            let value = crate::to_python(&(n * i)).unwrap();
                            assert_eq!(crate::from_python::<i64>(&value).unwrap(), n * i);
                        }
                        Interpreter::close();
                        drop(copy);
                        drop(handle);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let _py = python();
        assert_eq!(Interpreter::ref_count(), base);
        assert!(Interpreter::is_initialized());
    }

    #[test]
    fn test_lock_is_reentrant() {
        let _py = python();
        let inner = Interpreter::lock();
        let again = Interpreter::lock();
        let value = crate::to_python(&5i64).unwrap();
        drop(again);
        assert_eq!(crate::from_python::<i64>(&value).unwrap(), 5);
        drop(value);
        drop(inner);
    }
}
