#![forbid(unsafe_code)]

//! Type-erased identity of one field instance.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use super::field::{ErasedPlace, Field};
use super::poly_fun::PolyFun;
use crate::error::{Error, Result};

/// Address plus runtime type of one place inside a [`Tracked`](crate::Tracked)
/// root.
///
/// Signatures are back-references only: they never own or extend the life of
/// the referent. Cloning copies the erasure wrapper and keeps pointing at the
/// same place.
pub struct Signature {
    place: Box<dyn ErasedPlace>,
}

impl Signature {
    pub(crate) fn from_place(place: Box<dyn ErasedPlace>) -> Self {
        Self { place }
    }

    #[must_use]
    pub fn of<T: 'static>(field: &Field<T>) -> Self {
        field.signature()
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.place.value_type_id()
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.place.type_name()
    }

    #[must_use]
    pub fn address(&self) -> usize {
        self.place.address()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.place.is_alive()
    }

    /// Whether this signature names `field`.
    #[must_use]
    pub fn is<T: 'static>(&self, field: &Field<T>) -> bool {
        self.type_id() == TypeId::of::<T>() && self.address() == field.address()
    }

    /// Typed field for this signature, if it was built over a `T`.
    #[must_use]
    pub fn field<T: 'static>(&self) -> Option<Field<T>> {
        Field::from_place(self.place.clone_box())
    }

    /// Invokes `callback` against the referent.
    ///
    /// Returns `false` if the referent's root has been dropped.
    ///
    /// # Panics
    ///
    /// Panics if `callback` was built for a different type.
    pub fn invoke(&self, callback: &PolyFun) -> bool {
        match self.try_invoke(callback) {
            Ok(alive) => alive,
            Err(err) => panic!("{err}"),
        }
    }

    /// Invokes `callback`, reporting a type mismatch instead of panicking.
    ///
    /// The type check happens before liveness is consulted, so a mismatched
    /// callback is rejected even when the referent is gone.
    pub fn try_invoke(&self, callback: &PolyFun) -> Result<bool> {
        if callback.type_id() != self.type_id() {
            return Err(Error::TypeMismatch {
                expected: callback.type_name(),
                found: self.type_name(),
            });
        }
        let found = self.type_name();
        let mut outcome = Ok(());
        let alive = self
            .place
            .read(&mut |value: &dyn Any| outcome = callback.call_erased(value, found));
        outcome.map(|()| alive)
    }
}

impl Clone for Signature {
    fn clone(&self) -> Self {
        Self {
            place: self.place.clone_box(),
        }
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id() && self.address() == other.address()
    }
}

impl Eq for Signature {}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
        self.type_id().hash(state);
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} @ {:#x})", self.type_name(), self.address())
    }
}

impl<T: 'static> From<&Field<T>> for Signature {
    fn from(field: &Field<T>) -> Self {
        field.signature()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Tracked, field};
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Default)]
    struct Mixed {
        count: i32,
        ratio: f32,
    }

    #[test]
    fn equality_requires_address_and_type() {
        let m = Tracked::new(Mixed::default());
        let count = field!(m, count);
        let ratio = field!(m, ratio);

        assert_eq!(count.signature(), Signature::of(&count));
        assert_ne!(count.signature(), ratio.signature());
        assert!(count.signature().is(&count));
        assert!(!count.signature().is(&ratio));
    }

    #[test]
    fn invoke_dispatches_against_the_live_value() {
        let m = Tracked::new(Mixed::default());
        let count = field!(m, count);
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        let callback = PolyFun::new(move |v: &i32| sink.set(*v));

        m.borrow_mut().count = 12;
        assert!(count.signature().invoke(&callback));
        assert_eq!(seen.get(), 12);
    }

    #[test]
    #[should_panic(expected = "callback expects i32 but was invoked with f32")]
    fn invoking_an_int_callback_on_a_float_field_fails_fast() {
        let m = Tracked::new(Mixed::default());
        let ratio = field!(m, ratio);
        let callback = PolyFun::new(|_: &i32| {});
        ratio.signature().invoke(&callback);
    }

    #[test]
    fn try_invoke_rejects_mismatch_even_when_dropped() {
        let m = Tracked::new(Mixed::default());
        let sig = field!(m, ratio).signature();
        drop(m);

        let callback = PolyFun::new(|_: &i32| {});
        assert!(matches!(
            sig.try_invoke(&callback),
            Err(Error::TypeMismatch { .. })
        ));

        let float_callback = PolyFun::new(|_: &f32| {});
        assert_eq!(sig.try_invoke(&float_callback), Ok(false));
    }

    #[test]
    fn clone_points_at_the_same_referent() {
        let m = Tracked::new(Mixed::default());
        let sig = field!(m, count).signature();
        let copy = sig.clone();
        assert_eq!(sig, copy);
        assert_eq!(sig.address(), copy.address());

        let typed = copy.field::<i32>().expect("same type");
        m.borrow_mut().count = 3;
        assert_eq!(typed.get(), Some(3));
        assert!(copy.field::<f32>().is_none());
    }

    #[test]
    fn usable_as_hash_key() {
        let m = Tracked::new(Mixed::default());
        let mut set = ahash::AHashSet::new();
        set.insert(field!(m, count).signature());
        set.insert(field!(m, count).signature());
        set.insert(field!(m, ratio).signature());
        assert_eq!(set.len(), 2);
    }
}
