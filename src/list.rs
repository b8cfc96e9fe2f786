//! Typed proxy over a `list` object
//!
//! `T` is only the declared element type used at the boundary; elements
//! live inside the interpreter and are converted on every access.

use crate::convert::{Convertible, FromPython, ToPython};
use crate::error::{check_new, check_status, Error, Result};
use crate::ffi::{self, PyObject};
use crate::object::Object;
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use tracing::trace;

pub struct List<T> {
    obj: Object,
    _marker: PhantomData<T>,
}

impl<T> List<T> {
    /// New empty list
    pub fn new() -> Result<Self> {
        ffi::ensure_open()?;
        let obj = unsafe { check_new(ffi::PyList_New(0))? };
        Ok(Self::wrap(obj))
    }

    // Caller has already checked the list protocol
    fn wrap(obj: Object) -> Self {
        Self {
            obj,
            _marker: PhantomData,
        }
    }

    /// Wrap an owned reference, checking that it is a list
    ///
    /// # Safety
    /// `ptr` must be null or a new reference the caller owns; the GIL must
    /// be held.
    pub unsafe fn from_owned_ptr(ptr: *mut PyObject) -> Result<Self> {
        Self::try_from(Object::from_owned_ptr(ptr))
    }

    /// New proxy sharing the list behind `obj`
    pub fn from_object(obj: &Object) -> Result<Self> {
        Self::try_from(obj.clone())
    }

    pub fn len(&self) -> usize {
        let size = unsafe { ffi::PyList_Size(self.obj.as_ptr()) };
        usize::try_from(size).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// New list over the items in `low..high`
    ///
    /// Bounds are clamped the way slicing clamps them in the language.
    pub fn slice(&self, low: usize, high: usize) -> Result<List<T>> {
        let (low, high) = (ffi::to_ssize(low)?, ffi::to_ssize(high)?);
        let obj = unsafe { check_new(ffi::PyList_GetSlice(self.obj.as_ptr(), low, high))? };
        Ok(List::wrap(obj))
    }

    /// Sort in place using the elements' natural ordering
    pub fn sort(&mut self) -> Result<()> {
        check_status(unsafe { ffi::PyList_Sort(self.obj.as_ptr()) })
    }

    pub fn reverse(&mut self) -> Result<()> {
        check_status(unsafe { ffi::PyList_Reverse(self.obj.as_ptr()) })
    }

    pub fn append_object(&mut self, item: &Object) -> Result<()> {
        unsafe { self.append_ptr(item.as_ptr()) }
    }

    /// Append a borrowed reference; the list takes its own share
    ///
    /// # Safety
    /// `item` must be null or a live object; the GIL must be held.
    pub unsafe fn append_ptr(&mut self, item: *mut PyObject) -> Result<()> {
        if item.is_null() {
            return Err(Error::new("cannot append a null object"));
        }
        check_status(ffi::PyList_Append(self.obj.as_ptr(), item))
    }

    pub fn insert_object(&mut self, index: usize, item: &Object) -> Result<()> {
        unsafe { self.insert_ptr(index, item.as_ptr()) }
    }

    /// Insert a borrowed reference before `index`; the list takes its own share
    ///
    /// # Safety
    /// `item` must be null or a live object; the GIL must be held.
    pub unsafe fn insert_ptr(&mut self, index: usize, item: *mut PyObject) -> Result<()> {
        if item.is_null() {
            return Err(Error::new("cannot insert a null object"));
        }
        let index = ffi::to_ssize(index)?;
        check_status(ffi::PyList_Insert(self.obj.as_ptr(), index, item))
    }

    pub fn as_object(&self) -> &Object {
        &self.obj
    }

    pub fn into_object(self) -> Object {
        self.obj
    }
}

impl<T: ToPython> List<T> {
    pub fn from_slice(values: &[T]) -> Result<Self> {
        Self::from_iter_exact(values)
    }

    /// Build a list from any iterator that knows its length up front
    ///
    /// Atomic: if one element fails to convert, the partially filled list is
    /// released and no object escapes.
    pub fn from_iter_exact<I>(values: I) -> Result<Self>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        I::Item: Borrow<T>,
    {
        let values = values.into_iter();
        let expected = values.len();
        ffi::ensure_open()?;
        let obj = unsafe { check_new(ffi::PyList_New(ffi::to_ssize(expected)?))? };

        let mut filled = 0;
        for value in values {
            if filled == expected {
                return Err(Error::new(format!(
                    "iterator yielded more than the {} items it reported",
                    expected
                )));
            }
            let value: &T = value.borrow();
            let item = value.to_object()?;
            // SetItem steals the share held by `item`
            unsafe {
                check_status(ffi::PyList_SetItem(
                    obj.as_ptr(),
                    ffi::to_ssize(filled)?,
                    item.into_ptr(),
                ))?;
            }
            filled += 1;
        }

        if filled != expected {
            return Err(Error::new(format!(
                "iterator yielded {} of the {} items it reported",
                filled, expected
            )));
        }

        trace!(event = "list_built", len = expected);
        Ok(Self::wrap(obj))
    }

    /// Replace the item at `index`
    pub fn set(&mut self, index: usize, value: &T) -> Result<()> {
        let item = value.to_object()?;
        let index = ffi::to_ssize(index)?;
        // Stolen even on failure, so the share always leaves `item`
        check_status(unsafe { ffi::PyList_SetItem(self.obj.as_ptr(), index, item.into_ptr()) })
    }

    pub fn append(&mut self, value: &T) -> Result<()> {
        let item = value.to_object()?;
        self.append_object(&item)
    }

    pub fn insert(&mut self, index: usize, value: &T) -> Result<()> {
        let item = value.to_object()?;
        self.insert_object(index, &item)
    }
}

impl<T: FromPython> List<T> {
    /// Convert the item at `index`; out of range is an `IndexError`
    pub fn get(&self, index: usize) -> Result<T> {
        let index = ffi::to_ssize(index)?;
        unsafe {
            let item = ffi::PyList_GetItem(self.obj.as_ptr(), index);
            if item.is_null() {
                return Err(Error::fetch());
            }
            T::extract(item)
        }
    }

    /// Export every element; the first failure discards the partial result
    pub fn to_vec(&self) -> Result<Vec<T>> {
        self.iter().collect()
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            index: 0,
        }
    }
}

impl<T> List<T> {
    /// Index-addressable accessor that reads and writes through the list
    pub fn item(&mut self, index: usize) -> ListItem<'_, T> {
        ListItem { list: self, index }
    }
}

/// Reference-like accessor returned by [`List::item`]
pub struct ListItem<'a, T> {
    list: &'a mut List<T>,
    index: usize,
}

impl<T: FromPython> ListItem<'_, T> {
    pub fn get(&self) -> Result<T> {
        self.list.get(self.index)
    }
}

impl<T: ToPython> ListItem<'_, T> {
    pub fn set(&mut self, value: &T) -> Result<()> {
        self.list.set(self.index, value)
    }
}

/// Fallible element iterator returned by [`List::iter`]
pub struct Iter<'a, T> {
    list: &'a List<T>,
    index: usize,
}

impl<T: FromPython> Iterator for Iter<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.list.len() {
            return None;
        }
        let item = self.list.get(self.index);
        self.index += 1;
        Some(item)
    }
}

impl<T> TryFrom<Object> for List<T> {
    type Error = Error;

    fn try_from(obj: Object) -> Result<Self> {
        if obj.is_null() || unsafe { ffi::PyList_Check(obj.as_ptr()) } == 0 {
            return Err(Error::type_mismatch("list", &obj));
        }
        Ok(Self::wrap(obj))
    }
}

impl<T> Deref for List<T> {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.obj
    }
}

impl<T> Clone for List<T> {
    fn clone(&self) -> Self {
        Self::wrap(self.obj.clone())
    }
}

impl<T> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "List({})", self.obj.repr())
    }
}

impl<T: Convertible> ToPython for List<T> {
    fn to_object(&self) -> Result<Object> {
        Ok(self.obj.clone())
    }
}

impl<T: Convertible> FromPython for List<T> {
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        Self::try_from(Object::from_borrowed_ptr(ptr))
    }
}

impl<T: Convertible> Convertible for List<T> {}
