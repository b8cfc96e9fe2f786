//! Reference counting - the only place the crate touches an object's count
//!
//! Null-safe wrappers over `Py_IncRef`/`Py_DecRef`, traced at TRACE level.

use super::{PyObject, Py_DecRef, Py_IncRef, Py_REFCNT, Py_ssize_t};
use tracing::trace;

/// Increment reference count
///
/// # Safety
/// - Null-safe (no-op for null pointers)
/// - Object must be a live interpreter object
/// - The GIL must be held
#[inline]
pub unsafe fn incref(obj: *mut PyObject) {
    if obj.is_null() {
        return;
    }

    trace!(event = "incref", address = ?obj);
    Py_IncRef(obj);
}

/// Decrement reference count
///
/// # Safety
/// - Null-safe (no-op for null pointers)
/// - Leaks instead of touching freed memory once the runtime is finalized
/// - The GIL must be held while the runtime is alive
#[inline]
pub unsafe fn decref(obj: *mut PyObject) {
    if obj.is_null() {
        return;
    }

    if !super::runtime_initialized() {
        trace!(event = "decref_skipped", address = ?obj, "runtime not initialized");
        return;
    }

    trace!(event = "decref", address = ?obj);
    Py_DecRef(obj);
}

/// Get current reference count (for debugging/testing)
///
/// # Safety
/// - Returns 0 for null pointers
/// - Object must be a live interpreter object
#[inline]
pub unsafe fn refcount(obj: *mut PyObject) -> Py_ssize_t {
    if obj.is_null() {
        return 0;
    }

    Py_REFCNT(obj)
}

/// Increment refcount and return same pointer (for chaining)
///
/// # Safety
/// Same as [`incref`].
#[inline]
pub unsafe fn incref_ret(obj: *mut PyObject) -> *mut PyObject {
    incref(obj);
    obj
}
