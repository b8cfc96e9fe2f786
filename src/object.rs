//! Owning handle over an interpreter object
//!
//! Design: one handle = one share of the object's reference count.
//! - Clone increments, Drop decrements, moves transfer the share untouched
//! - Null is a valid, cheap default state
//! - Borrowed references are retained through [`Object::from_borrowed_ptr`]
//! - Stolen-reference calls receive the share through [`Object::into_ptr`]
//!
//! Handles are `!Send` and `!Sync` (raw pointer inside): they stay on the
//! thread that created them, which holds [`crate::Interpreter::lock`].

use crate::error::{check_new, Error, Result};
use crate::ffi::{self, PyObject, Py_ssize_t};
use std::ffi::CStr;
use std::fmt;
use std::mem;
use std::ptr;

pub struct Object {
    ptr: *mut PyObject,
}

impl Object {
    /// Empty handle; no interpreter call is made
    #[inline]
    pub const fn null() -> Self {
        Self {
            ptr: ptr::null_mut(),
        }
    }

    /// Take ownership of a reference the caller already owns (no count change)
    ///
    /// # Safety
    /// `ptr` must be null or a new reference the caller owns.
    #[inline]
    pub unsafe fn from_owned_ptr(ptr: *mut PyObject) -> Self {
        Self { ptr }
    }

    /// Retain a borrowed reference by acquiring a share first
    ///
    /// # Safety
    /// `ptr` must be null or point to a live object; the GIL must be held.
    #[inline]
    pub unsafe fn from_borrowed_ptr(ptr: *mut PyObject) -> Self {
        Self {
            ptr: ffi::incref_ret(ptr),
        }
    }

    /// New handle on `None`
    pub fn none() -> Result<Self> {
        ffi::ensure_open()?;
        Ok(unsafe { Self::from_borrowed_ptr(ffi::Py_None()) })
    }

    /// Raw pointer without transferring ownership
    ///
    /// The caller must not decrement the count through this pointer.
    #[inline]
    pub fn as_ptr(&self) -> *mut PyObject {
        self.ptr
    }

    /// Give up this handle's share, e.g. to a call that steals a reference
    #[inline]
    pub fn into_ptr(self) -> *mut PyObject {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Boolean conversion: true iff the handle points at an object
    #[inline]
    pub fn is_some(&self) -> bool {
        !self.ptr.is_null()
    }

    pub fn is_none(&self) -> bool {
        self.is_some() && self.ptr == unsafe { ffi::Py_None() }
    }

    /// Identity comparison (`a is b`)
    #[inline]
    pub fn is(&self, other: &Object) -> bool {
        self.ptr == other.ptr
    }

    /// Drop this handle's share and become null
    pub fn release(&mut self) {
        let ptr = mem::replace(&mut self.ptr, ptr::null_mut());
        unsafe { ffi::decref(ptr) };
    }

    /// Release the current share, then take ownership of `ptr`
    ///
    /// # Safety
    /// Same contract as [`Object::from_owned_ptr`].
    pub unsafe fn reset(&mut self, ptr: *mut PyObject) {
        self.release();
        self.ptr = ptr;
    }

    /// Current reference count of the object (0 for null)
    pub fn ref_count(&self) -> Py_ssize_t {
        unsafe { ffi::refcount(self.ptr) }
    }

    // This will on success yield the same text as repr() in Python. It is
    // used while building error messages, so every failure yields "".
    pub fn repr(&self) -> String {
        if self.ptr.is_null() {
            return String::new();
        }

        unsafe {
            let text = ffi::PyObject_Repr(self.ptr);
            if text.is_null() {
                ffi::PyErr_Clear();
                return String::new();
            }
            utf8_or_empty(&Object::from_owned_ptr(text))
        }
    }

    /// Best-effort `str()` text; failures yield an empty string
    pub fn str_value(&self) -> String {
        if self.ptr.is_null() {
            return String::new();
        }

        unsafe {
            let text = ffi::PyObject_Str(self.ptr);
            if text.is_null() {
                ffi::PyErr_Clear();
                return String::new();
            }
            utf8_or_empty(&Object::from_owned_ptr(text))
        }
    }

    /// Name of the object's type, `"NULL"` for an empty handle
    pub fn type_name(&self) -> String {
        if self.ptr.is_null() {
            return "NULL".to_string();
        }

        unsafe {
            let tp = ffi::Py_TYPE(self.ptr);
            CStr::from_ptr((*tp).tp_name).to_string_lossy().into_owned()
        }
    }

    /// Never fails: lookup errors and absent attributes both yield false
    pub fn has_attr(&self, name: &str) -> bool {
        if self.ptr.is_null() {
            return false;
        }
        let Ok(name) = ffi::to_cstring(name) else {
            return false;
        };

        unsafe { ffi::PyObject_HasAttrString(self.ptr, name.as_ptr()) == 1 }
    }

    pub fn getattr(&self, name: &str) -> Result<Object> {
        ffi::ensure_open()?;
        unsafe { getattr_ptr(self.ptr, name) }
    }

    /// Borrow the UTF-8 contents of a `str` object
    ///
    /// The buffer is cached inside the object, so it lives as long as this
    /// handle does.
    pub fn as_str(&self) -> Result<&str> {
        if self.ptr.is_null() {
            return Err(Error::new("cannot read text from a null object"));
        }

        unsafe {
            let mut size: Py_ssize_t = 0;
            let data = ffi::PyUnicode_AsUTF8AndSize(self.ptr, &mut size);
            if data.is_null() {
                return Err(Error::fetch());
            }

            let bytes = std::slice::from_raw_parts(data as *const u8, size as usize);
            std::str::from_utf8(bytes).map_err(|e| Error::new(e.to_string()))
        }
    }
}

/// Attribute lookup on a raw pointer
///
/// # Safety
/// `obj` must be null or a live object; the GIL must be held.
pub(crate) unsafe fn getattr_ptr(obj: *mut PyObject, name: &str) -> Result<Object> {
    if obj.is_null() {
        return Err(Error::new(format!(
            "attribute lookup of '{}' on a null object",
            name
        )));
    }

    let cname = ffi::to_cstring(name)?;
    check_new(ffi::PyObject_GetAttrString(obj, cname.as_ptr()))
}

unsafe fn utf8_or_empty(text: &Object) -> String {
    let mut size: Py_ssize_t = 0;
    let data = ffi::PyUnicode_AsUTF8AndSize(text.as_ptr(), &mut size);
    if data.is_null() {
        ffi::PyErr_Clear();
        return String::new();
    }

    let bytes = std::slice::from_raw_parts(data as *const u8, size as usize);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Default for Object {
    fn default() -> Self {
        Self::null()
    }
}

impl Clone for Object {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            ptr: unsafe { ffi::incref_ret(self.ptr) },
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.ptr == source.ptr {
            return;
        }

        self.release();
        self.ptr = unsafe { ffi::incref_ret(source.ptr) };
    }
}

impl Drop for Object {
    #[inline]
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ptr.is_null() {
            return f.write_str("Object(NULL)");
        }
        write!(f, "Object({})", self.repr())
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}
