#![forbid(unsafe_code)]

//! Caller-owned roots and typed handles onto the places inside them.
//!
//! # Design
//!
//! [`Tracked<T>`] is a shared `Rc<RefCell<T>>` owned by the application. A
//! [`Field<U>`] names one place inside a root: the root itself
//! ([`Tracked::root`]) or a projection such as `s.a`
//! ([`Tracked::field`], [`field!`](crate::field)). A field stores a `Weak` to
//! the root together with a pair of accessor functions, and records the
//! address of the projected place once, at construction.
//!
//! # Failure Modes
//!
//! - **Root dropped**: the field stays valid as a value but every read or
//!   write reports failure (`None` / `false`). Nothing panics.
//! - **Root already borrowed**: reads and writes go through the `RefCell`, so
//!   holding a `borrow_mut()` guard across a managed operation panics, exactly
//!   like any other `RefCell` double borrow.
//! - **Unstable places**: the address is not recomputed. Projections must
//!   point at places that do not move while the root is alive (struct fields,
//!   the root itself); projecting into a growable collection is unsupported.

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use super::signature::Signature;

/// Type-erased access to one place inside a root.
pub(crate) trait ErasedPlace {
    fn value_type_id(&self) -> TypeId;
    fn type_name(&self) -> &'static str;
    fn address(&self) -> usize;
    fn is_alive(&self) -> bool;
    /// Runs `f` on the current value. Returns `false` if the root is gone.
    fn read(&self, f: &mut dyn FnMut(&dyn Any)) -> bool;
    /// Runs `f` on the current value, mutably. Returns `false` if the root is gone.
    fn write(&self, f: &mut dyn FnMut(&mut dyn Any)) -> bool;
    fn clone_box(&self) -> Box<dyn ErasedPlace>;
}

struct Lens<R, T> {
    root: Weak<RefCell<R>>,
    get: fn(&R) -> &T,
    get_mut: fn(&mut R) -> &mut T,
    address: usize,
}

impl<R: 'static, T: 'static> ErasedPlace for Lens<R, T> {
    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn address(&self) -> usize {
        self.address
    }

    fn is_alive(&self) -> bool {
        self.root.strong_count() > 0
    }

    fn read(&self, f: &mut dyn FnMut(&dyn Any)) -> bool {
        let Some(cell) = self.root.upgrade() else {
            return false;
        };
        let guard = cell.borrow();
        f((self.get)(&*guard));
        true
    }

    fn write(&self, f: &mut dyn FnMut(&mut dyn Any)) -> bool {
        let Some(cell) = self.root.upgrade() else {
            return false;
        };
        let mut guard = cell.borrow_mut();
        f((self.get_mut)(&mut *guard));
        true
    }

    fn clone_box(&self) -> Box<dyn ErasedPlace> {
        Box::new(Self {
            root: Weak::clone(&self.root),
            get: self.get,
            get_mut: self.get_mut,
            address: self.address,
        })
    }
}

fn identity<T>(value: &T) -> &T {
    value
}

fn identity_mut<T>(value: &mut T) -> &mut T {
    value
}

// ---------------------------------------------------------------------------
// Tracked
// ---------------------------------------------------------------------------

/// Shared, caller-owned root of data managed by a
/// [`DataManager`](crate::DataManager).
///
/// Cloning a `Tracked` creates a new handle to the **same** value. The value
/// is freed when the last `Tracked` handle is dropped; fields, signatures,
/// registries and history entries never keep it alive.
pub struct Tracked<T> {
    cell: Rc<RefCell<T>>,
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.try_borrow() {
            Ok(value) => f.debug_tuple("Tracked").field(&*value).finish(),
            Err(_) => f.write_str("Tracked(<borrowed>)"),
        }
    }
}

impl<T: 'static> Tracked<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            cell: Rc::new(RefCell::new(value)),
        }
    }

    /// Immutable access to the whole value.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.cell.borrow()
    }

    /// Mutable access to the whole value.
    ///
    /// Writes made through this guard are **not** recorded in any history and
    /// fire no callbacks. Use [`DataManager::notify`](crate::DataManager::notify)
    /// afterwards if observers must see them.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.cell.borrow_mut()
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.cell.borrow().clone()
    }

    /// Field naming the whole value.
    #[must_use]
    pub fn root(&self) -> Field<T> {
        self.field(identity::<T>, identity_mut::<T>)
    }

    /// Field naming the place reached by `get` / `get_mut`.
    ///
    /// Both accessors must reach the same place. The [`field!`](crate::field)
    /// macro writes the pair from a single path.
    ///
    /// # Panics
    ///
    /// Panics if the root is mutably borrowed.
    #[must_use]
    pub fn field<U: 'static>(&self, get: fn(&T) -> &U, get_mut: fn(&mut T) -> &mut U) -> Field<U> {
        let address = {
            let guard = self.cell.borrow();
            get(&*guard) as *const U as usize
        };
        Field {
            place: Box::new(Lens {
                root: Rc::downgrade(&self.cell),
                get,
                get_mut,
                address,
            }),
            _marker: PhantomData,
        }
    }

    /// Number of live `Tracked` handles to this root.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.cell)
    }
}

/// Builds a [`Field`] from a `Tracked` root and a field path.
///
/// ```
/// use ripple_core::{Tracked, field};
///
/// #[derive(Clone)]
/// struct Point { x: i32, y: i32 }
///
/// let p = Tracked::new(Point { x: 1, y: 2 });
/// let x = field!(p, x);
/// assert_eq!(x.get(), Some(1));
/// ```
#[macro_export]
macro_rules! field {
    ($tracked:expr, $($path:tt)+) => {
        $tracked.field(|root| &root.$($path)+, |root| &mut root.$($path)+)
    };
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// Typed weak handle onto one place inside a [`Tracked`] root.
///
/// A field never owns the data it names. Reads return `None` once the root
/// has been dropped.
pub struct Field<T> {
    place: Box<dyn ErasedPlace>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            place: self.place.clone_box(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("type", &self.place.type_name())
            .field("address", &format_args!("{:#x}", self.place.address()))
            .field("alive", &self.place.is_alive())
            .finish()
    }
}

impl<T> PartialEq for Field<T> {
    fn eq(&self, other: &Self) -> bool {
        self.place.address() == other.place.address()
    }
}

impl<T> Eq for Field<T> {}

impl<T: 'static> Field<T> {
    /// Rebuilds a typed field from an erased place of the same type.
    pub(crate) fn from_place(place: Box<dyn ErasedPlace>) -> Option<Self> {
        (place.value_type_id() == TypeId::of::<T>()).then(|| Self {
            place,
            _marker: PhantomData,
        })
    }

    #[must_use]
    pub fn signature(&self) -> Signature {
        Signature::from_place(self.place.clone_box())
    }

    #[must_use]
    pub fn address(&self) -> usize {
        self.place.address()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.place.is_alive()
    }

    /// Runs `f` against the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let mut f = Some(f);
        let mut out = None;
        self.place.read(&mut |value: &dyn Any| {
            if let (Some(f), Some(value)) = (f.take(), value.downcast_ref::<T>()) {
                out = Some(f(value));
            }
        });
        out
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Mutates the value in place. Untracked; only the manager calls this.
    pub(crate) fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut f = Some(f);
        let mut out = None;
        self.place.write(&mut |value: &mut dyn Any| {
            if let (Some(f), Some(value)) = (f.take(), value.downcast_mut::<T>()) {
                out = Some(f(value));
            }
        });
        out
    }

    pub(crate) fn place(&self) -> &dyn ErasedPlace {
        &*self.place
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Pair {
        a: i32,
        b: f32,
    }

    #[test]
    fn projection_reads_the_live_value() {
        let pair = Tracked::new(Pair { a: 3, b: 1.5 });
        let a = field!(pair, a);
        let b = pair.field(|p| &p.b, |p| &mut p.b);

        assert_eq!(a.get(), Some(3));
        assert_eq!(b.get(), Some(1.5));

        pair.borrow_mut().a = 7;
        assert_eq!(a.get(), Some(7));
    }

    #[test]
    fn root_and_first_member_differ_only_by_type() {
        let pair = Tracked::new(Pair::default());
        let root = pair.root();
        let a = field!(pair, a);

        // `a` is the first member, so it may share the root's address.
        assert_ne!(root.signature(), a.signature());
    }

    #[test]
    fn fields_of_the_same_place_are_equal() {
        let pair = Tracked::new(Pair::default());
        assert_eq!(field!(pair, a), field!(pair, a));
        assert_eq!(pair.root(), pair.clone().root());
    }

    #[test]
    fn dropped_root_yields_none() {
        let pair = Tracked::new(Pair::default());
        let a = field!(pair, a);
        assert!(a.is_alive());

        drop(pair);
        assert!(!a.is_alive());
        assert_eq!(a.get(), None);
        assert_eq!(a.modify(|v| *v = 1), None);
    }

    #[test]
    fn fields_do_not_keep_the_root_alive() {
        let value = Tracked::new(5_u8);
        let root = value.root();
        assert_eq!(value.handle_count(), 1);
        let _sig = root.signature();
        assert_eq!(value.handle_count(), 1);
    }

    #[test]
    fn modify_passes_the_return_value_through() {
        let value = Tracked::new(vec![1, 2, 3]);
        let root = value.root();
        let popped = root.modify(Vec::pop);
        assert_eq!(popped, Some(Some(3)));
        assert_eq!(value.get(), vec![1, 2]);
    }

    #[test]
    fn debug_format() {
        let value = Tracked::new(42_i64);
        assert_eq!(format!("{value:?}"), "Tracked(42)");
        let dbg = format!("{:?}", value.root());
        assert!(dbg.contains("i64"));
        assert!(dbg.contains("alive: true"));
    }
}
