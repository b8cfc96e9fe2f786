//! Conversion registry - native values <-> interpreter objects
//!
//! Design: a closed set of native types, one explicit impl per type.
//! - [`Convertible`] is the "may cross the boundary" predicate; anything
//!   outside the set fails to compile instead of being coerced at runtime
//! - [`ToPython`] builds a new object from a native value
//! - [`FromPython`] extracts a native value, deciding failure from both the
//!   sentinel return and the interpreter's pending-error flag
//!
//! No widening or narrowing between native types happens here: every type
//! has its own C API call.

use crate::error::{check_new, Error, Result};
use crate::ffi::{self, PyObject};
use crate::object::Object;
use std::marker::PhantomData;
use std::os::raw::{c_long, c_longlong, c_ulonglong};
use tracing::trace;

/// Build a new interpreter object from a native value
pub trait ToPython {
    fn to_object(&self) -> Result<Object>;
}

/// Extract a native value from an interpreter object
pub trait FromPython: Sized {
    /// Extract from a borrowed raw pointer without touching its count
    ///
    /// # Safety
    /// `ptr` must be non-null and point to a live object; the GIL must be held.
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self>;

    fn from_object(obj: &Object) -> Result<Self> {
        if obj.is_null() {
            return Err(Error::new("cannot convert a null object"));
        }
        ffi::ensure_open()?;
        unsafe { Self::extract(obj.as_ptr()) }
    }
}

/// Native types that may cross the interpreter boundary
///
/// Closed set: `bool`, `i32`, `i64`, `u64`, `isize`, `usize`, `f64`,
/// [`Complex`], `&str`, `String`, [`Object`], [`crate::List`] of a member
/// and [`crate::Tuple`] whose elements are all members.
pub trait Convertible: ToPython {}

/// Complex number of two doubles, the only width the C API offers
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

/// Convert a native value into a new object
pub fn to_python<T: ToPython + ?Sized>(value: &T) -> Result<Object> {
    value.to_object()
}

/// Convert an object into a native value
pub fn from_python<T: FromPython>(obj: &Object) -> Result<T> {
    T::from_object(obj)
}

/// Convert a borrowed raw pointer into a native value
///
/// # Safety
/// `ptr` must be null or point to a live object; the GIL must be held.
pub unsafe fn from_python_ptr<T: FromPython>(ptr: *mut PyObject) -> Result<T> {
    if ptr.is_null() {
        return Err(Error::new("cannot convert a null object"));
    }
    T::extract(ptr)
}

/// Failure is only real when the sentinel comes with a pending exception
#[inline]
unsafe fn checked<T: PartialEq>(value: T, sentinel: T) -> Result<T> {
    if value == sentinel && ffi::error_pending() {
        Err(Error::fetch())
    } else {
        Ok(value)
    }
}

impl ToPython for bool {
    fn to_object(&self) -> Result<Object> {
        ffi::ensure_open()?;
        unsafe { check_new(ffi::PyBool_FromLong(c_long::from(*self))) }
    }
}

impl FromPython for bool {
    // Truthiness protocol, like `bool(obj)`
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        match ffi::PyObject_IsTrue(ptr) {
            -1 => Err(Error::fetch()),
            0 => Ok(false),
            _ => Ok(true),
        }
    }
}

impl ToPython for i32 {
    fn to_object(&self) -> Result<Object> {
        ffi::ensure_open()?;
        unsafe { check_new(ffi::PyLong_FromLong(c_long::from(*self))) }
    }
}

impl FromPython for i32 {
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        let wide = checked(ffi::PyLong_AsLongLong(ptr), -1)?;
        i32::try_from(wide).map_err(|_| {
            trace!(event = "conversion_overflow", value = wide, target = "i32");
            Error::overflow("i32")
        })
    }
}

impl ToPython for i64 {
    fn to_object(&self) -> Result<Object> {
        ffi::ensure_open()?;
        unsafe { check_new(ffi::PyLong_FromLongLong(*self as c_longlong)) }
    }
}

impl FromPython for i64 {
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        checked(ffi::PyLong_AsLongLong(ptr), -1).map(|v| v as i64)
    }
}

impl ToPython for u64 {
    fn to_object(&self) -> Result<Object> {
        ffi::ensure_open()?;
        unsafe { check_new(ffi::PyLong_FromUnsignedLongLong(*self as c_ulonglong)) }
    }
}

impl FromPython for u64 {
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        checked(ffi::PyLong_AsUnsignedLongLong(ptr), c_ulonglong::MAX).map(|v| v as u64)
    }
}

impl ToPython for isize {
    fn to_object(&self) -> Result<Object> {
        ffi::ensure_open()?;
        unsafe { check_new(ffi::PyLong_FromSsize_t(*self)) }
    }
}

impl FromPython for isize {
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        checked(ffi::PyLong_AsSsize_t(ptr), -1)
    }
}

impl ToPython for usize {
    fn to_object(&self) -> Result<Object> {
        ffi::ensure_open()?;
        unsafe { check_new(ffi::PyLong_FromSize_t(*self)) }
    }
}

impl FromPython for usize {
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        checked(ffi::PyLong_AsSize_t(ptr), usize::MAX)
    }
}

impl ToPython for f64 {
    fn to_object(&self) -> Result<Object> {
        ffi::ensure_open()?;
        unsafe { check_new(ffi::PyFloat_FromDouble(*self)) }
    }
}

impl FromPython for f64 {
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        checked(ffi::PyFloat_AsDouble(ptr), -1.0)
    }
}

impl ToPython for Complex {
    fn to_object(&self) -> Result<Object> {
        ffi::ensure_open()?;
        unsafe { check_new(ffi::PyComplex_FromDoubles(self.re, self.im)) }
    }
}

impl FromPython for Complex {
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        let re = checked(ffi::PyComplex_RealAsDouble(ptr), -1.0)?;
        let im = checked(ffi::PyComplex_ImagAsDouble(ptr), -1.0)?;
        Ok(Complex { re, im })
    }
}

impl ToPython for str {
    fn to_object(&self) -> Result<Object> {
        ffi::ensure_open()?;
        let len = ffi::to_ssize(self.len())?;
        unsafe {
            check_new(ffi::PyUnicode_FromStringAndSize(
                self.as_ptr() as *const std::os::raw::c_char,
                len,
            ))
        }
    }
}

impl ToPython for String {
    fn to_object(&self) -> Result<Object> {
        self.as_str().to_object()
    }
}

impl FromPython for String {
    // Byte-exact UTF-8 copy of the str object
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        let mut size: ffi::Py_ssize_t = 0;
        let data = ffi::PyUnicode_AsUTF8AndSize(ptr, &mut size);
        if data.is_null() {
            return Err(Error::fetch());
        }

        let bytes = std::slice::from_raw_parts(data as *const u8, size as usize);
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::new(e.to_string()))
    }
}

impl ToPython for Object {
    fn to_object(&self) -> Result<Object> {
        if self.is_null() {
            return Err(Error::new("cannot convert a null object"));
        }
        Ok(self.clone())
    }
}

impl FromPython for Object {
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        Ok(Object::from_borrowed_ptr(ptr))
    }
}

impl<T: ToPython + ?Sized> ToPython for &T {
    fn to_object(&self) -> Result<Object> {
        (**self).to_object()
    }
}

impl Convertible for bool {}
impl Convertible for i32 {}
impl Convertible for i64 {}
impl Convertible for u64 {}
impl Convertible for isize {}
impl Convertible for usize {}
impl Convertible for f64 {}
impl Convertible for Complex {}
impl Convertible for &str {}
impl Convertible for String {}
impl Convertible for Object {}

/// Probe used by [`is_convertible!`](crate::is_convertible)
#[doc(hidden)]
pub struct Probe<T: ?Sized>(PhantomData<T>);

impl<T: ?Sized> Probe<T> {
    #[doc(hidden)]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

#[doc(hidden)]
pub trait ConvertibleProbe {
    fn is_convertible(&self) -> bool {
        true
    }
}

impl<T: Convertible> ConvertibleProbe for Probe<T> {}

#[doc(hidden)]
pub trait FallbackProbe {
    fn is_convertible(&self) -> bool {
        false
    }
}

impl<T: ?Sized> FallbackProbe for &Probe<T> {}

/// Whether a concrete type belongs to the conversion registry
///
/// ```ignore
/// assert!(is_convertible!(i64));
/// assert!(!is_convertible!(i16));
/// ```
#[macro_export]
macro_rules! is_convertible {
    ($ty:ty) => {{
        #[allow(unused_imports)]
        use $crate::convert::{ConvertibleProbe as _, FallbackProbe as _};
        (&$crate::convert::Probe::<$ty>::new()).is_convertible()
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{eval, python};
    use crate::{List, Tuple};
    use proptest::prelude::*;

    fn round_trip<T: ToPython + FromPython>(value: T) -> T {
        let obj = value.to_object().unwrap();
        T::from_object(&obj).unwrap()
    }

    #[test]
    fn test_registry_members() {
        assert!(is_convertible!(bool));
        assert!(is_convertible!(i32));
        assert!(is_convertible!(i64));
        assert!(is_convertible!(u64));
        assert!(is_convertible!(isize));
        assert!(is_convertible!(usize));
        assert!(is_convertible!(f64));
        assert!(is_convertible!(Complex));
        assert!(is_convertible!(&'static str));
        assert!(is_convertible!(String));
        assert!(is_convertible!(Object));
        assert!(is_convertible!(List<i64>));
        assert!(is_convertible!(List<List<String>>));
        assert!(is_convertible!(Tuple<(i64, f64, String)>));
        assert!(is_convertible!(Tuple<()>));
    }

    #[test]
    fn test_registry_non_members() {
        assert!(!is_convertible!(i16));
        assert!(!is_convertible!(u16));
        assert!(!is_convertible!(i8));
        assert!(!is_convertible!(u8));
        assert!(!is_convertible!(u32));
        assert!(!is_convertible!(f32));
        assert!(!is_convertible!(char));
        assert!(!is_convertible!(Vec<i64>));
        assert!(!is_convertible!((i64, f64)));
    }

    #[test]
    fn test_scalar_round_trips() {
        let _py = python();
        for v in [0i64, -1, 42, i64::MIN, i64::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0i32, -7, i32::MIN, i32::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0u64, 1, u64::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0isize, -3, isize::MIN, isize::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0usize, 9, usize::MAX] {
            assert_eq!(round_trip(v), v);
        }
        for v in [0.0f64, -1.0, 2.5, f64::MAX, f64::MIN_POSITIVE] {
            assert_eq!(round_trip(v), v);
        }
        assert!(round_trip(true));
        assert!(!round_trip(false));
        assert_eq!(round_trip(Complex::new(1.5, -2.0)), Complex::new(1.5, -2.0));
        assert_eq!(round_trip(String::from("naïve ✓")), "naïve ✓");
        assert_eq!(round_trip(String::new()), "");
    }

    #[test]
    fn test_legitimate_sentinel_values() {
        let _py = python();
        // -1 is both a valid value and the failure sentinel
        assert_eq!(round_trip(-1i64), -1);
        assert_eq!(round_trip(-1.0f64), -1.0);
        assert_eq!(round_trip(Complex::new(-1.0, -1.0)), Complex::new(-1.0, -1.0));
    }

    #[test]
    fn test_overflow_is_reported() {
        let _py = python();
        let big = u64::MAX.to_object().unwrap();
        assert!(i64::from_object(&big).unwrap_err().is_python());

        let wide = (i64::from(i32::MAX) + 1).to_object().unwrap();
        assert_eq!(
            i32::from_object(&wide).unwrap_err().kind(),
            &crate::ErrorKind::Overflow { target: "i32" }
        );

        let negative = (-5i64).to_object().unwrap();
        assert!(u64::from_object(&negative).is_err());
        assert!(usize::from_object(&negative).is_err());
        assert!(!unsafe { ffi::error_pending() });
    }

    #[test]
    fn test_type_errors_are_reported() {
        let _py = python();
        let text = "abc".to_object().unwrap();
        assert!(i64::from_object(&text).is_err());
        assert!(f64::from_object(&text).is_err());
        assert!(Complex::from_object(&text).is_err());

        let number = 3i64.to_object().unwrap();
        assert!(String::from_object(&number).is_err());
        assert!(from_python::<i64>(&Object::null()).is_err());
    }

    #[test]
    fn test_bool_uses_truthiness() {
        let _py = python();
        let empty = List::<i64>::new().unwrap();
        let full = List::from_slice(&[1i64]).unwrap();
        assert!(!bool::from_object(&empty).unwrap());
        assert!(bool::from_object(&full).unwrap());
        assert!(!bool::from_object(&0i64.to_object().unwrap()).unwrap());
        assert!(bool::from_object(&"x".to_object().unwrap()).unwrap());
    }

    #[test]
    fn test_bool_truth_test_failure_raises() {
        let _py = python();
        let broken = eval("type('Broken', (), {'__bool__': lambda self: 1 / 0})()");
        let err = bool::from_object(&broken).unwrap_err();
        assert!(err.to_string().contains("ZeroDivisionError"));
    }

    #[test]
    fn test_raw_pointer_extraction() {
        let _py = python();
        let obj = 99i64.to_object().unwrap();
        let before = obj.ref_count();
        let value: i64 = unsafe { from_python_ptr(obj.as_ptr()) }.unwrap();
        assert_eq!(value, 99);
        assert_eq!(obj.ref_count(), before);
        assert!(unsafe { from_python_ptr::<i64>(std::ptr::null_mut()) }.is_err());
    }

    #[test]
    fn test_str_with_interior_nul() {
        let _py = python();
        let obj = "a\0b".to_object().unwrap();
        assert_eq!(String::from_object(&obj).unwrap(), "a\0b");
    }

    proptest! {
        #[test]
        fn prop_i64_round_trip(v in any::<i64>()) {
            let _py = python();
            prop_assert_eq!(round_trip(v), v);
        }

        #[test]
        fn prop_string_round_trip(s in ".*") {
            let _py = python();
            prop_assert_eq!(round_trip(s.clone()), s);
        }

        #[test]
        fn prop_f64_round_trip(
            v in any::<f64>().prop_filter("NaN never equals itself", |v| !v.is_nan())
        ) {
            let _py = python();
            prop_assert_eq!(round_trip(v), v);
        }
    }
}
