#![forbid(unsafe_code)]

//! Type-erased unary callbacks.
//!
//! A [`PolyFun`] wraps an `Fn(&T)` behind a uniform interface so callbacks
//! for fields of different types can share one registry. The concrete type
//! is kept as a [`TypeId`] and checked on every invocation: invoking a
//! callback against a value of any other type is a programming error and
//! never coerces.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};

trait ErasedCallback {
    fn value_type_id(&self) -> TypeId;
    fn type_name(&self) -> &'static str;
    /// Returns `false` without calling the body if `value` is not a `T`.
    fn call(&self, value: &dyn Any) -> bool;
    fn clone_box(&self) -> Box<dyn ErasedCallback>;
}

struct TypedCallback<T> {
    body: Rc<dyn Fn(&T)>,
}

impl<T: 'static> ErasedCallback for TypedCallback<T> {
    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn call(&self, value: &dyn Any) -> bool {
        match value.downcast_ref::<T>() {
            Some(value) => {
                (self.body)(value);
                true
            }
            None => false,
        }
    }

    fn clone_box(&self) -> Box<dyn ErasedCallback> {
        Box::new(Self {
            body: Rc::clone(&self.body),
        })
    }
}

/// An owned, type-erased callback over values of exactly one type.
///
/// Cloning produces an independent wrapper; the closure body itself is
/// shared and immutable.
pub struct PolyFun {
    inner: Box<dyn ErasedCallback>,
}

impl PolyFun {
    pub fn new<T: 'static>(body: impl Fn(&T) + 'static) -> Self {
        Self {
            inner: Box::new(TypedCallback::<T> {
                body: Rc::new(body),
            }),
        }
    }

    /// Runtime type the callback was built for.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.inner.value_type_id()
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    #[must_use]
    pub fn accepts<T: 'static>(&self) -> bool {
        self.type_id() == TypeId::of::<T>()
    }

    /// Invokes the callback.
    ///
    /// # Panics
    ///
    /// Panics if the callback was built for a type other than `T`.
    pub fn call<T: 'static>(&self, value: &T) {
        if let Err(err) = self.try_call(value) {
            panic!("{err}");
        }
    }

    /// Invokes the callback, reporting a type mismatch instead of panicking.
    pub fn try_call<T: 'static>(&self, value: &T) -> Result<()> {
        self.call_erased(value, std::any::type_name::<T>())
    }

    pub(crate) fn call_erased(&self, value: &dyn Any, found: &'static str) -> Result<()> {
        if self.inner.call(value) {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected: self.type_name(),
                found,
            })
        }
    }
}

impl Clone for PolyFun {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl fmt::Debug for PolyFun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolyFun")
            .field("type", &self.type_name())
            .finish()
    }
}
