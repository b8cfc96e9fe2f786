//! C FFI - raw CPython bindings and boundary helpers
//!
//! Design: the C API is consumed through `pyo3::ffi`. This module adds:
//! 1. Reference counting primitives (incref, decref, refcount)
//! 2. Pending-error probing for calls whose failure sentinel is ambiguous
//! 3. Index and string conversions at the C boundary

mod refcount;

pub use pyo3::ffi::*;
pub use refcount::{decref, incref, incref_ret, refcount};

use crate::error::{Error, Result};
use std::ffi::CString;

/// Check whether the interpreter has an exception set for this thread
///
/// # Safety
/// The GIL must be held.
#[inline]
pub(crate) unsafe fn error_pending() -> bool {
    !PyErr_Occurred().is_null()
}

/// Check whether the runtime is currently initialized (safe without the GIL)
#[inline]
pub(crate) fn runtime_initialized() -> bool {
    unsafe { Py_IsInitialized() != 0 }
}

/// Refuse to reach the C API while no runtime is up
#[inline]
pub(crate) fn ensure_open() -> Result<()> {
    if runtime_initialized() {
        Ok(())
    } else {
        Err(Error::new("interpreter is not open"))
    }
}

/// Convert a native index into `Py_ssize_t`
#[inline]
pub(crate) fn to_ssize(index: usize) -> Result<Py_ssize_t> {
    Py_ssize_t::try_from(index)
        .map_err(|_| Error::new(format!("index {} does not fit in Py_ssize_t", index)))
}

/// Convert a Rust string into a NUL-terminated C string
pub(crate) fn to_cstring(text: &str) -> Result<CString> {
    CString::new(text)
        .map_err(|_| Error::new(format!("string contains an interior NUL byte: {:?}", text)))
}
