//! Error type for every failure that crosses the interpreter boundary
//!
//! A failed C API call leaves an exception pending in the interpreter;
//! [`Error::fetch`] takes it out and renders it through the silent-degrade
//! `repr` path so building the message can never fail recursively.

use crate::ffi;
use crate::object::Object;
use std::fmt;
use std::ptr;
use tracing::debug;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Exception fetched from the interpreter's error indicator
    Python {
        type_repr: String,
        value_repr: String,
        traceback_repr: String,
    },
    /// Object does not satisfy the protocol a typed wrapper requires
    TypeMismatch { expected: &'static str, found: String },
    /// Tuple arity differs from the declared element list
    SizeMismatch { expected: usize, found: usize },
    /// Narrowing performed on the native side lost range
    Overflow { target: &'static str },
    Message(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python {
                value_repr,
                traceback_repr,
                ..
            } => {
                write!(f, "{}{}", value_repr, traceback_repr)
            }
            Self::TypeMismatch { expected, found } => {
                write!(f, "PyObject not of {} type (found {})", expected, found)
            }
            Self::SizeMismatch { expected, found } => {
                write!(
                    f,
                    "Size mismatch in Tuple: expected {} elements, found {}",
                    expected, found
                )
            }
            Self::Overflow { target } => {
                write!(f, "Python int too large to convert to {}", target)
            }
            Self::Message(message) => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Capture the exception currently pending in the interpreter
    ///
    /// Safe to call with nothing pending: every part degrades to an empty
    /// string. Callers only use it right after a C API call reported
    /// failure. The GIL must be held.
    pub fn fetch() -> Self {
        let mut ptype = ptr::null_mut();
        let mut pvalue = ptr::null_mut();
        let mut ptraceback = ptr::null_mut();

        let (exc_type, exc_value, exc_traceback) = unsafe {
            ffi::PyErr_Fetch(&mut ptype, &mut pvalue, &mut ptraceback);
            ffi::PyErr_NormalizeException(&mut ptype, &mut pvalue, &mut ptraceback);
            (
                Object::from_owned_ptr(ptype),
                Object::from_owned_ptr(pvalue),
                Object::from_owned_ptr(ptraceback),
            )
        };

        let kind = ErrorKind::Python {
            type_repr: exc_type.repr(),
            value_repr: exc_value.repr(),
            traceback_repr: exc_traceback.repr(),
        };

        debug!(event = "python_error", error = %kind, "fetched pending exception");
        Self { kind }
    }

    /// Error with an explicit message; the interpreter state is not consulted
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Message(message.into()),
        }
    }

    pub fn type_mismatch(expected: &'static str, found: &Object) -> Self {
        Self {
            kind: ErrorKind::TypeMismatch {
                expected,
                found: found.type_name(),
            },
        }
    }

    pub fn size_mismatch(expected: usize, found: usize) -> Self {
        Self {
            kind: ErrorKind::SizeMismatch { expected, found },
        }
    }

    pub fn overflow(target: &'static str) -> Self {
        Self {
            kind: ErrorKind::Overflow { target },
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Whether this error carries an exception raised by the interpreter
    pub fn is_python(&self) -> bool {
        matches!(self.kind, ErrorKind::Python { .. })
    }

    /// Representation of the exception type, if this came from the interpreter
    pub fn python_type(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::Python { type_repr, .. } => Some(type_repr),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

/// Turn a null "new reference" return into the pending exception
///
/// # Safety
/// `ptr` must be a new reference (or null) returned by the C API with the
/// GIL held.
#[inline]
pub(crate) unsafe fn check_new(ptr: *mut ffi::PyObject) -> Result<Object> {
    if ptr.is_null() {
        Err(Error::fetch())
    } else {
        Ok(Object::from_owned_ptr(ptr))
    }
}

/// Turn a `-1` status return into the pending exception
#[inline]
pub(crate) fn check_status(status: std::os::raw::c_int) -> Result<()> {
    if status == -1 {
        Err(Error::fetch())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::python;

    #[test]
    fn test_explicit_message_bypasses_interpreter() {
        let err = Error::new("custom failure");
        assert_eq!(err.to_string(), "custom failure");
        assert!(!err.is_python());
        assert_eq!(err.python_type(), None);
    }

    #[test]
    fn test_size_mismatch_message() {
        let err = Error::size_mismatch(2, 3);
        assert_eq!(err.kind(), &ErrorKind::SizeMismatch { expected: 2, found: 3 });
        assert!(err.message().contains("expected 2"));
    }

    #[test]
    fn test_fetch_without_pending_error_degrades() {
        let _py = python();
        let err = Error::fetch();
        assert!(err.is_python());
        assert_eq!(err.to_string(), "");
    }

    #[test]
    fn test_fetch_captures_pending_exception() {
        let _py = python();
        let builtins = crate::import_module("builtins").unwrap();
        let err = builtins.getattr("definitely_not_a_builtin").unwrap_err();

        assert!(err.is_python());
        assert!(err.to_string().contains("AttributeError"));
        assert!(err.python_type().unwrap().contains("AttributeError"));
        // The indicator was consumed by the fetch
        assert!(!unsafe { ffi::error_pending() });
    }
}
