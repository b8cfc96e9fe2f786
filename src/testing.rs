//! Shared fixtures for unit tests
//!
//! The unit-test binary keeps one handle open for its whole run, so tests
//! running on parallel threads never race a finalization. Every test that
//! touches the runtime binds `let _py = python();` first so its objects drop
//! while the lock is still held.

use crate::callable::call_function;
use crate::error::check_new;
use crate::ffi;
use crate::interpreter::{Interpreter, InterpreterHandle, InterpreterLock};
use crate::object::Object;
use crate::utilities::import_module;
use once_cell::sync::Lazy;

static KEEP_OPEN: Lazy<InterpreterHandle> =
    Lazy::new(|| Interpreter::handle().expect("interpreter failed to open for tests"));

pub(crate) fn python() -> InterpreterLock {
    Lazy::force(&KEEP_OPEN);
    Interpreter::lock()
}

/// Evaluate an expression in a fresh global namespace
pub(crate) fn eval(expression: &str) -> Object {
    let builtins = import_module("builtins").unwrap();
    let globals = unsafe { check_new(ffi::PyDict_New()) }.unwrap();
    call_function(&builtins, "eval", (expression, &globals)).unwrap()
}
