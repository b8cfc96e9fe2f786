//! Callable invocation
//!
//! Design: every argument type names one `Py_BuildValue` format unit through
//! [`CallArg`]; a tuple of arguments concatenates them into the parenthesised
//! call format (e.g. `(Lds)`) through [`CallArgs`]. Each argument is built by
//! its own unit, then packed into the argument tuple positionally; the result
//! equals what one `Py_BuildValue` over the whole format returns, without a
//! variadic call whose arity depends on the caller. The derived format is
//! reported on every invocation's trace event.

use crate::convert::Complex;
use crate::error::{check_new, check_status, Error, Result};
use crate::ffi::{self, PyObject, Py_ssize_t};
use crate::list::List;
use crate::object::Object;
use crate::tuple::Tuple;
use std::fmt;
use std::ops::Deref;
use std::os::raw::{c_char, c_double, c_int, c_longlong, c_uint, c_ulonglong};
use tracing::trace;

/// Native type that may be passed as a call argument
pub trait CallArg {
    /// `Py_BuildValue` format unit for this type
    const FORMAT: &'static str;

    /// Build the argument object (a new reference)
    fn to_arg(&self) -> Result<Object>;
}

/// Positional argument list: a native tuple of [`CallArg`]s
pub trait CallArgs {
    const COUNT: usize;

    /// Parenthesised format string, one unit per argument
    fn format() -> String;

    /// Build the argument tuple
    fn to_arglist(&self) -> Result<Object>;
}

// Variadic promotion: small integers travel as int, float as double
macro_rules! build_value_args {
    ($($ty:ty => $unit:literal as $c:ty),* $(,)?) => {
        $(
            impl CallArg for $ty {
                const FORMAT: &'static str = $unit;

                fn to_arg(&self) -> Result<Object> {
                    ffi::ensure_open()?;
                    let format = concat!($unit, "\0").as_ptr() as *const c_char;
                    unsafe { check_new(ffi::Py_BuildValue(format, *self as $c)) }
                }
            }
        )*
    };
}

build_value_args! {
    i8 => "b" as c_int,
    u8 => "B" as c_int,
    i16 => "h" as c_int,
    u16 => "H" as c_int,
    i32 => "i" as c_int,
    u32 => "I" as c_uint,
    i64 => "L" as c_longlong,
    u64 => "K" as c_ulonglong,
    isize => "n" as Py_ssize_t,
    f32 => "f" as c_double,
    f64 => "d" as c_double,
}

impl CallArg for usize {
    const FORMAT: &'static str = "n";

    fn to_arg(&self) -> Result<Object> {
        let value = isize::try_from(*self).map_err(|_| Error::overflow("Py_ssize_t"))?;
        value.to_arg()
    }
}

impl CallArg for str {
    const FORMAT: &'static str = "s";

    fn to_arg(&self) -> Result<Object> {
        ffi::ensure_open()?;
        let text = ffi::to_cstring(self)?;
        unsafe { check_new(ffi::Py_BuildValue(b"s\0".as_ptr() as *const c_char, text.as_ptr())) }
    }
}

impl CallArg for String {
    const FORMAT: &'static str = "s";

    fn to_arg(&self) -> Result<Object> {
        self.as_str().to_arg()
    }
}

impl CallArg for Complex {
    const FORMAT: &'static str = "D";

    fn to_arg(&self) -> Result<Object> {
        ffi::ensure_open()?;
        let value = ffi::Py_complex {
            real: self.re,
            imag: self.im,
        };
        unsafe {
            check_new(ffi::Py_BuildValue(
                b"D\0".as_ptr() as *const c_char,
                &value as *const ffi::Py_complex,
            ))
        }
    }
}

impl CallArg for bool {
    const FORMAT: &'static str = "O";

    fn to_arg(&self) -> Result<Object> {
        crate::convert::to_python(self)
    }
}

impl CallArg for Object {
    const FORMAT: &'static str = "O";

    fn to_arg(&self) -> Result<Object> {
        if self.is_null() {
            return Err(Error::new("cannot pass a null object as an argument"));
        }
        Ok(self.clone())
    }
}

/// Borrowed raw pointer; the argument list takes its own share
impl CallArg for *mut PyObject {
    const FORMAT: &'static str = "O";

    fn to_arg(&self) -> Result<Object> {
        if self.is_null() {
            return Err(Error::new("cannot pass a null object as an argument"));
        }
        Ok(unsafe { Object::from_borrowed_ptr(*self) })
    }
}

impl<T> CallArg for List<T> {
    const FORMAT: &'static str = "O";

    fn to_arg(&self) -> Result<Object> {
        self.as_object().to_arg()
    }
}

impl<T> CallArg for Tuple<T> {
    const FORMAT: &'static str = "O";

    fn to_arg(&self) -> Result<Object> {
        (**self).to_arg()
    }
}

impl CallArg for Callable {
    const FORMAT: &'static str = "O";

    fn to_arg(&self) -> Result<Object> {
        self.obj.to_arg()
    }
}

impl<T: CallArg + ?Sized> CallArg for &T {
    const FORMAT: &'static str = T::FORMAT;

    fn to_arg(&self) -> Result<Object> {
        (**self).to_arg()
    }
}

macro_rules! call_args_impls {
    ($count:tt; $($idx:tt $name:ident),*) => {
        impl<$($name: CallArg),*> CallArgs for ($($name,)*) {
            const COUNT: usize = $count;

            fn format() -> String {
                let mut format = String::from("(");
                $(format.push_str($name::FORMAT);)*
                format.push(')');
                format
            }

            fn to_arglist(&self) -> Result<Object> {
                ffi::ensure_open()?;
                let arglist = unsafe { check_new(ffi::PyTuple_New($count))? };
                $(
                    let arg = self.$idx.to_arg()?;
                    // SetItem steals the share held by `arg`
                    unsafe {
                        check_status(ffi::PyTuple_SetItem(arglist.as_ptr(), $idx, arg.into_ptr()))?;
                    }
                )*
                Ok(arglist)
            }
        }
    };
}

call_args_impls!(0;);
call_args_impls!(1; 0 A);
call_args_impls!(2; 0 A, 1 B);
call_args_impls!(3; 0 A, 1 B, 2 C);
call_args_impls!(4; 0 A, 1 B, 2 C, 3 D);
call_args_impls!(5; 0 A, 1 B, 2 C, 3 D, 4 E);
call_args_impls!(6; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
call_args_impls!(7; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
call_args_impls!(8; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);
call_args_impls!(9; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I);
call_args_impls!(10; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J);
call_args_impls!(11; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J, 10 K);
call_args_impls!(12; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J, 10 K, 11 L);

/// Handle on an object that passed the callable check
#[derive(Clone)]
pub struct Callable {
    obj: Object,
}

impl Callable {
    /// # Safety
    /// `ptr` must be null or a new reference the caller owns; the GIL must
    /// be held.
    pub unsafe fn from_owned_ptr(ptr: *mut PyObject) -> Result<Self> {
        Self::try_from(Object::from_owned_ptr(ptr))
    }

    pub fn from_object(obj: &Object) -> Result<Self> {
        Self::try_from(obj.clone())
    }

    /// Call with positional arguments
    pub fn invoke<A: CallArgs>(&self, args: A) -> Result<Object> {
        trace!(event = "invoke", format = %A::format(), args = A::COUNT);
        let arglist = args.to_arglist()?;
        call_object(&self.obj, &arglist)
    }

    /// Alias for [`Callable::invoke`]
    #[inline]
    pub fn call<A: CallArgs>(&self, args: A) -> Result<Object> {
        self.invoke(args)
    }

    pub fn as_object(&self) -> &Object {
        &self.obj
    }

    pub fn into_object(self) -> Object {
        self.obj
    }
}

impl TryFrom<Object> for Callable {
    type Error = Error;

    fn try_from(obj: Object) -> Result<Self> {
        if obj.is_null() || unsafe { ffi::PyCallable_Check(obj.as_ptr()) } == 0 {
            return Err(Error::type_mismatch("callable", &obj));
        }
        Ok(Self { obj })
    }
}

impl Deref for Callable {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.obj
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.obj.repr())
    }
}

/// Call `callable` with a ready-made argument tuple (null for no arguments)
pub fn call_object(callable: &Object, arglist: &Object) -> Result<Object> {
    if callable.is_null() {
        return Err(Error::new("cannot call a null object"));
    }
    ffi::ensure_open()?;
    unsafe { check_new(ffi::PyObject_CallObject(callable.as_ptr(), arglist.as_ptr())) }
}

/// Look up `name` on `owner` and call it with `args`
pub fn call_function<A: CallArgs>(owner: &Object, name: &str, args: A) -> Result<Object> {
    let function = Callable::try_from(owner.getattr(name)?)?;
    function.invoke(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{eval, python};
    use crate::{from_python, import_module, ToPython};

    #[test]
    fn test_format_strings() {
        assert_eq!(<()>::format(), "()");
        assert_eq!(<(i64, f64, &str)>::format(), "(Lds)");
        assert_eq!(<(i8, u8, i16, u16, i32, u32)>::format(), "(bBhHiI)");
        assert_eq!(<(u64, isize, usize, f32, String)>::format(), "(Knnfs)");
        assert_eq!(<(bool, Object, List<i64>, Tuple<(i64,)>, Callable)>::format(), "(OOOOO)");
        assert_eq!(<(*mut PyObject, Complex)>::format(), "(OD)");
        assert_eq!(<(&Object,)>::format(), "(O)");
    }

    #[test]
    fn test_arglist_matches_single_build_value() {
        let _py = python();
        let format = ffi::to_cstring(&<(i64, f64, &str, bool)>::format()).unwrap();
        let label = ffi::to_cstring("label").unwrap();
        let flag = true.to_object().unwrap();
        let whole = unsafe {
            check_new(ffi::Py_BuildValue(
                format.as_ptr(),
                7 as c_longlong,
                0.5 as c_double,
                label.as_ptr(),
                flag.as_ptr(),
            ))
        }
        .unwrap();

        let built = (7i64, 0.5f64, "label", true).to_arglist().unwrap();
        let equal =
            unsafe { ffi::PyObject_RichCompareBool(built.as_ptr(), whole.as_ptr(), ffi::Py_EQ) };
        assert_eq!(equal, 1);
        assert_eq!(built.repr(), "(7, 0.5, 'label', True)");
    }

    #[test]
    fn test_non_callable_is_rejected() {
        let _py = python();
        let number = 5i64.to_object().unwrap();
        let err = Callable::from_object(&number).unwrap_err();
        assert_eq!(err.to_string(), "PyObject not of callable type (found int)");
        assert!(Callable::try_from(Object::null()).is_err());
    }

    #[test]
    fn test_invoke_matches_direct_evaluation() {
        let _py = python();
        let add = Callable::try_from(eval("lambda a, b, c: a + b * c")).unwrap();
        let result = add.invoke((1i64, 2.0f64, 3i32)).unwrap();
        assert_eq!(from_python::<f64>(&result).unwrap(), 7.0);
        assert_eq!(result.repr(), eval("1 + 2.0 * 3").repr());
    }

    #[test]
    fn test_argument_kinds() {
        let _py = python();
        let echo = Callable::try_from(eval("lambda *args: args")).unwrap();
        let list = List::from_slice(&[1i64]).unwrap();
        let result = echo
            .call((
                -3i8,
                200u8,
                true,
                "text",
                String::from("owned"),
                Complex::new(1.0, 2.0),
                &list,
                1.5f32,
                usize::MAX / 2,
            ))
            .unwrap();
        assert_eq!(
            result.repr(),
            format!(
                "(-3, 200, True, 'text', 'owned', (1+2j), [1], 1.5, {})",
                usize::MAX / 2
            )
        );
    }

    #[test]
    fn test_raw_pointer_argument_keeps_caller_share() {
        let _py = python();
        let identity = Callable::try_from(eval("lambda x: x")).unwrap();
        let target = List::from_slice(&[1i64]).unwrap().into_object();
        let before = target.ref_count();

        let result = identity.call((target.as_ptr(),)).unwrap();
        assert!(result.is(&target));
        drop(result);
        assert_eq!(target.ref_count(), before);
    }

    #[test]
    fn test_argument_build_failures() {
        let _py = python();
        let identity = Callable::try_from(eval("lambda x: x")).unwrap();
        assert!(identity.call(("nul\0byte",)).is_err());
        assert!(identity.call((Object::null(),)).is_err());
        assert!(identity.call((usize::MAX,)).is_err());
    }

    #[test]
    fn test_call_failure_carries_exception() {
        let _py = python();
        let fail = Callable::try_from(eval("lambda: 1 / 0")).unwrap();
        let err = fail.call(()).unwrap_err();
        assert!(err.is_python());
        assert!(err.to_string().contains("division by zero"));

        // Wrong argument count is a call failure too
        assert!(fail.call((1i64,)).unwrap_err().to_string().contains("TypeError"));
    }

    #[test]
    fn test_call_function() {
        let _py = python();
        let math = import_module("math").unwrap();
        let root = call_function(&math, "sqrt", (16.0f64,)).unwrap();
        assert_eq!(from_python::<f64>(&root).unwrap(), 4.0);

        assert!(call_function(&math, "no_such_function", ()).is_err());
        let err = call_function(&math, "pi", ()).unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn test_call_object_without_arguments() {
        let _py = python();
        let make = Callable::try_from(eval("lambda: 'made'")).unwrap();
        let result = call_object(&make, &Object::null()).unwrap();
        assert_eq!(result.str_value(), "made");
    }
}
