//! Typed, reference-counted embedding of the CPython runtime
//!
//! ```no_run
//! use typthon_embed::{call_function, from_python, import_module, Interpreter, List};
//!
//! # fn main() -> typthon_embed::Result<()> {
//! let _handle = Interpreter::handle()?;
//! let _lock = Interpreter::lock();
//!
//! let values = List::from_slice(&[3i64, 1, 2])?;
//! let builtins = import_module("builtins")?;
//! let total = call_function(&builtins, "sum", (&values,))?;
//! assert_eq!(from_python::<i64>(&total)?, 6);
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod error;
pub mod ffi;
pub mod object;

// Conversion and typed wrappers
pub mod callable;
pub mod convert;
pub mod list;
pub mod tuple;

// Runtime lifecycle and helpers
pub mod config;
pub mod interpreter;
pub mod logging;
pub mod sys;
pub mod utilities;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use callable::{call_function, call_object, CallArg, CallArgs, Callable};
pub use config::{Config, ConfigError};
pub use convert::{
    from_python, from_python_ptr, to_python, Complex, Convertible, FromPython, ToPython,
};
pub use error::{Error, ErrorKind, Result};
pub use interpreter::{Interpreter, InterpreterHandle, InterpreterLock};
pub use list::{List, ListItem};
pub use object::Object;
pub use tuple::{FromTuple, Tuple, TupleElement, TupleSlice, TupleTypes};
pub use utilities::{get_attribute, get_attribute_ptr, import_module};
