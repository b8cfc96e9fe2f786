//! Module import and attribute lookup by name

use crate::error::{check_new, Result};
use crate::ffi::{self, PyObject};
use crate::object::{getattr_ptr, Object};
use tracing::debug;

/// Import a module by its dotted name
pub fn import_module(name: &str) -> Result<Object> {
    ffi::ensure_open()?;
    let cname = ffi::to_cstring(name)?;
    let module = unsafe { check_new(ffi::PyImport_ImportModule(cname.as_ptr())) };
    if let Err(err) = &module {
        debug!(event = "import_failed", module = name, error = %err);
    }
    module
}

/// Fetch attribute `name` of `obj`
pub fn get_attribute(obj: &Object, name: &str) -> Result<Object> {
    obj.getattr(name)
}

/// Fetch attribute `name` of a borrowed raw pointer
///
/// # Safety
/// `obj` must be null or a live object; the GIL must be held.
pub unsafe fn get_attribute_ptr(obj: *mut PyObject, name: &str) -> Result<Object> {
    getattr_ptr(obj, name)
}
