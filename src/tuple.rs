//! Fixed-arity proxy over a `tuple` object
//!
//! `Tuple<(A, B, ..)>` declares the element types as a native tuple. Element
//! access and sub-ranges are resolved at compile time:
//! - [`TupleElement<I>`] names the type at position `I`
//! - [`TupleSlice<LOW, HIGH>`] names the native tuple of positions `LOW..HIGH`
//!
//! Both are generated for every arity up to 8.

use crate::convert::{Convertible, FromPython, ToPython};
use crate::error::{check_new, check_status, Error, Result};
use crate::ffi::{self, PyObject, Py_ssize_t};
use crate::object::Object;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

/// Native tuple whose elements all belong to the conversion registry
pub trait TupleTypes {
    const ARITY: usize;

    /// Pack every element into a new `tuple` object
    fn pack(&self) -> Result<Object>;
}

/// Native tuple that can be rebuilt from a `tuple` object
pub trait FromTuple: TupleTypes + Sized {
    /// # Safety
    /// `ptr` must be a live tuple of exactly `ARITY` items; the GIL must be held.
    unsafe fn unpack(ptr: *mut PyObject) -> Result<Self>;
}

/// Declared type of the element at position `I`
pub trait TupleElement<const I: usize>: TupleTypes {
    type Output;
}

/// Declared types of the elements in `LOW..HIGH`
pub trait TupleSlice<const LOW: usize, const HIGH: usize>: TupleTypes {
    type Output: TupleTypes;
}

pub struct Tuple<T> {
    obj: Object,
    _marker: PhantomData<T>,
}

impl<T: TupleTypes> Tuple<T> {
    /// Pack `values` positionally in a single new tuple
    pub fn new(values: T) -> Result<Self> {
        Ok(Self::wrap(values.pack()?))
    }

    // Caller has already checked type and arity
    fn wrap(obj: Object) -> Self {
        Self {
            obj,
            _marker: PhantomData,
        }
    }

    /// Wrap an owned reference, checking type and arity
    ///
    /// # Safety
    /// `ptr` must be null or a new reference the caller owns; the GIL must
    /// be held.
    pub unsafe fn from_owned_ptr(ptr: *mut PyObject) -> Result<Self> {
        Self::try_from(Object::from_owned_ptr(ptr))
    }

    pub fn from_object(obj: &Object) -> Result<Self> {
        Self::try_from(obj.clone())
    }

    pub const fn len(&self) -> usize {
        T::ARITY
    }

    pub const fn is_empty(&self) -> bool {
        T::ARITY == 0
    }

    /// Convert the element at compile-time position `I`
    pub fn at<const I: usize>(&self) -> Result<<T as TupleElement<I>>::Output>
    where
        T: TupleElement<I>,
        <T as TupleElement<I>>::Output: FromPython,
    {
        unsafe {
            let item = item_ptr(self.obj.as_ptr(), ffi::to_ssize(I)?)?;
            <<T as TupleElement<I>>::Output as FromPython>::extract(item)
        }
    }

    /// New tuple over positions `LOW..HIGH`, typed by the declared sub-range
    pub fn slice<const LOW: usize, const HIGH: usize>(
        &self,
    ) -> Result<Tuple<<T as TupleSlice<LOW, HIGH>>::Output>>
    where
        T: TupleSlice<LOW, HIGH>,
    {
        let (low, high) = (ffi::to_ssize(LOW)?, ffi::to_ssize(HIGH)?);
        let obj = unsafe { check_new(ffi::PyTuple_GetSlice(self.obj.as_ptr(), low, high))? };
        Ok(Tuple::wrap(obj))
    }

    /// Export to the native tuple; the first failing element is returned
    pub fn to_native(&self) -> Result<T>
    where
        T: FromTuple,
    {
        unsafe { T::unpack(self.obj.as_ptr()) }
    }

    pub fn as_object(&self) -> &Object {
        &self.obj
    }

    pub fn into_object(self) -> Object {
        self.obj
    }
}

/// Borrowed item of a tuple, or the pending `IndexError`
unsafe fn item_ptr(tuple: *mut PyObject, index: Py_ssize_t) -> Result<*mut PyObject> {
    let item = ffi::PyTuple_GetItem(tuple, index);
    if item.is_null() {
        Err(Error::fetch())
    } else {
        Ok(item)
    }
}

impl<T: TupleTypes> TryFrom<Object> for Tuple<T> {
    type Error = Error;

    fn try_from(obj: Object) -> Result<Self> {
        if obj.is_null() || unsafe { ffi::PyTuple_Check(obj.as_ptr()) } == 0 {
            return Err(Error::type_mismatch("tuple", &obj));
        }

        let found = usize::try_from(unsafe { ffi::PyTuple_Size(obj.as_ptr()) }).unwrap_or(0);
        if found != T::ARITY {
            return Err(Error::size_mismatch(T::ARITY, found));
        }

        Ok(Self::wrap(obj))
    }
}

impl<T> Deref for Tuple<T> {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.obj
    }
}

impl<T> Clone for Tuple<T> {
    fn clone(&self) -> Self {
        Self {
            obj: self.obj.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Tuple<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tuple({})", self.obj.repr())
    }
}

impl<T: TupleTypes> ToPython for Tuple<T> {
    fn to_object(&self) -> Result<Object> {
        Ok(self.obj.clone())
    }
}

impl<T: TupleTypes> FromPython for Tuple<T> {
    unsafe fn extract(ptr: *mut PyObject) -> Result<Self> {
        Self::try_from(Object::from_borrowed_ptr(ptr))
    }
}

impl<T: TupleTypes> Convertible for Tuple<T> {}

macro_rules! tuple_impls {
    (@element [$($all:ident),*] []) => {};
    (@element [$($all:ident),*] [$idx:tt $name:ident $($rest:tt)*]) => {
        impl<$($all: Convertible),*> TupleElement<$idx> for ($($all,)*) {
            type Output = $name;
        }
        tuple_impls!(@element [$($all),*] [$($rest)*]);
    };

    (@slice_from $arity:tt [$($all:ident),*] []) => {
        tuple_impls!(@slice_to $arity [$($all),*] $arity [] []);
    };
    (@slice_from $arity:tt [$($all:ident),*] [$lo:tt $name:ident $($rest:tt)*]) => {
        tuple_impls!(@slice_to $arity [$($all),*] $lo [] [$lo $name $($rest)*]);
        tuple_impls!(@slice_from $arity [$($all),*] [$($rest)*]);
    };

    (@slice_to $arity:tt [$($all:ident),*] $lo:tt [$($taken:ident)*] []) => {
        impl<$($all: Convertible),*> TupleSlice<$lo, $arity> for ($($all,)*) {
            type Output = ($($taken,)*);
        }
    };
    (@slice_to $arity:tt [$($all:ident),*] $lo:tt [$($taken:ident)*] [$hi:tt $name:ident $($rest:tt)*]) => {
        impl<$($all: Convertible),*> TupleSlice<$lo, $hi> for ($($all,)*) {
            type Output = ($($taken,)*);
        }
        tuple_impls!(@slice_to $arity [$($all),*] $lo [$($taken)* $name] [$($rest)*]);
    };

    ($arity:tt; $($idx:tt $name:ident),*) => {
        impl<$($name: Convertible),*> TupleTypes for ($($name,)*) {
            const ARITY: usize = $arity;

            fn pack(&self) -> Result<Object> {
                ffi::ensure_open()?;
                let tuple = unsafe { check_new(ffi::PyTuple_New($arity))? };
                $(
                    let item = self.$idx.to_object()?;
                    // SetItem steals the share held by `item`
                    unsafe {
                        check_status(ffi::PyTuple_SetItem(tuple.as_ptr(), $idx, item.into_ptr()))?;
                    }
                )*
                Ok(tuple)
            }
        }

        impl<$($name: Convertible + FromPython),*> FromTuple for ($($name,)*) {
            #[allow(unused_variables)]
            unsafe fn unpack(ptr: *mut PyObject) -> Result<Self> {
                Ok(($($name::extract(item_ptr(ptr, $idx)?)?,)*))
            }
        }

        tuple_impls!(@element [$($name),*] [$($idx $name)*]);
        tuple_impls!(@slice_from $arity [$($name),*] [$($idx $name)*]);
    };
}

tuple_impls!(0;);
tuple_impls!(1; 0 A);
tuple_impls!(2; 0 A, 1 B);
tuple_impls!(3; 0 A, 1 B, 2 C);
tuple_impls!(4; 0 A, 1 B, 2 C, 3 D);
tuple_impls!(5; 0 A, 1 B, 2 C, 3 D, 4 E);
tuple_impls!(6; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
tuple_impls!(7; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
tuple_impls!(8; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);
