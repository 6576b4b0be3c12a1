#![forbid(unsafe_code)]

//! Captured field values and the groups that form one undo step.
//!
//! # Design
//!
//! A [`Snapshot`] pairs the erased place of a field with an owned, erased
//! copy of its value. It can write that copy back ([`Snapshot::rollback`])
//! and report the field's [`Signature`] to a callback afterwards, which is how
//! history replay re-triggers propagation.
//!
//! Equality is opt-in: [`Snapshot::capture_comparable`] records the type's
//! `PartialEq`, [`Snapshot::capture`] does not. Comparisons involving a
//! snapshot without equality are always `false`.
//!
//! A [`SnapshotGroup`] is an ordered list of snapshots. Rolling a group back
//! walks it last-to-first so the earliest captured value of a place wins;
//! restoring walks it first-to-last.

use std::any::{Any, TypeId};
use std::fmt;

use tracing::warn;

use crate::error::{Error, Result};
use crate::reactive::field::{ErasedPlace, Field};
use crate::reactive::signature::Signature;

trait CapturedValue {
    fn write_into(&self, slot: &mut dyn Any) -> bool;
    /// `false` when no equality was captured or the types differ.
    fn equals(&self, other: &dyn Any) -> bool;
    fn as_any(&self) -> &dyn Any;
    /// Copy of `live`, keeping this capture's equality.
    fn recapture(&self, live: &dyn Any) -> Option<Box<dyn CapturedValue>>;
    fn clone_box(&self) -> Box<dyn CapturedValue>;
}

struct Captured<T> {
    value: T,
    eq: Option<fn(&T, &T) -> bool>,
}

impl<T: Clone + 'static> CapturedValue for Captured<T> {
    fn write_into(&self, slot: &mut dyn Any) -> bool {
        match slot.downcast_mut::<T>() {
            Some(slot) => {
                slot.clone_from(&self.value);
                true
            }
            None => false,
        }
    }

    fn equals(&self, other: &dyn Any) -> bool {
        match (self.eq, other.downcast_ref::<T>()) {
            (Some(eq), Some(other)) => eq(&self.value, other),
            _ => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        &self.value
    }

    fn recapture(&self, live: &dyn Any) -> Option<Box<dyn CapturedValue>> {
        let value = live.downcast_ref::<T>()?.clone();
        Some(Box::new(Captured { value, eq: self.eq }))
    }

    fn clone_box(&self) -> Box<dyn CapturedValue> {
        Box::new(Captured {
            value: self.value.clone(),
            eq: self.eq,
        })
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The value of one field at one point in time.
pub struct Snapshot {
    place: Box<dyn ErasedPlace>,
    value: Box<dyn CapturedValue>,
}

impl Snapshot {
    /// Captures the current value of `field` without equality.
    ///
    /// # Errors
    ///
    /// [`Error::TargetDropped`] if the field's root no longer exists.
    pub fn capture<T: Clone + 'static>(field: &Field<T>) -> Result<Self> {
        Self::capture_with(field, None)
    }

    /// Captures the current value of `field` together with its equality.
    ///
    /// # Errors
    ///
    /// [`Error::TargetDropped`] if the field's root no longer exists.
    pub fn capture_comparable<T: Clone + PartialEq + 'static>(field: &Field<T>) -> Result<Self> {
        Self::capture_with(field, Some(<T as PartialEq>::eq))
    }

    fn capture_with<T: Clone + 'static>(
        field: &Field<T>,
        eq: Option<fn(&T, &T) -> bool>,
    ) -> Result<Self> {
        let value = field.get().ok_or_else(Error::target_dropped::<T>)?;
        Ok(Self {
            place: field.place().clone_box(),
            value: Box::new(Captured { value, eq }),
        })
    }

    #[must_use]
    pub fn signature(&self) -> Signature {
        Signature::from_place(self.place.clone_box())
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.place.type_name()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.place.is_alive()
    }

    /// Whether this snapshot was taken of `field` (identity only).
    #[must_use]
    pub fn holds<T: 'static>(&self, field: &Field<T>) -> bool {
        self.place.value_type_id() == TypeId::of::<T>() && self.place.address() == field.address()
    }

    /// Whether both snapshots were taken of the same place.
    #[must_use]
    pub fn same_place(&self, other: &Snapshot) -> bool {
        self.place.value_type_id() == other.place.value_type_id()
            && self.place.address() == other.place.address()
    }

    /// Whether this snapshot was taken of `field` and still equals its live
    /// value.
    #[must_use]
    pub fn matches<T: 'static>(&self, field: &Field<T>) -> bool {
        self.holds(field)
            && field
                .with(|live| self.value.equals(live))
                .unwrap_or(false)
    }

    /// Snapshot of the same place holding its current live value.
    ///
    /// Returns `None` if the root has been dropped.
    #[must_use]
    pub fn recapture(&self) -> Option<Self> {
        let mut value = None;
        self.place
            .read(&mut |live: &dyn Any| value = self.value.recapture(live));
        value.map(|value| Self {
            place: self.place.clone_box(),
            value,
        })
    }

    /// Writes the captured value back into the live field.
    ///
    /// Returns `false`, and writes nothing, if the root has been dropped.
    pub fn rollback(&self) -> bool {
        self.rollback_with(&mut |_: &Signature| {})
    }

    /// Like [`rollback`](Self::rollback), then reports the restored field's
    /// signature to `on_restored`.
    pub fn rollback_with(&self, on_restored: &mut dyn FnMut(&Signature)) -> bool {
        let written = self.place.write(&mut |slot: &mut dyn Any| {
            self.value.write_into(slot);
        });
        if !written {
            warn!(
                type_name = self.type_name(),
                address = self.place.address(),
                "snapshot target dropped, rollback skipped"
            );
            return false;
        }
        on_restored(&self.signature());
        true
    }
}

impl Clone for Snapshot {
    fn clone(&self) -> Self {
        Self {
            place: self.place.clone_box(),
            value: self.value.clone_box(),
        }
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.same_place(other) && self.value.equals(other.value.as_any())
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("type", &self.type_name())
            .field("address", &format_args!("{:#x}", self.place.address()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SnapshotGroup
// ---------------------------------------------------------------------------

/// Ordered snapshots forming one logical undo step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotGroup {
    snapshots: Vec<Snapshot>,
}

impl SnapshotGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
    }

    /// Captures `field` and appends it.
    ///
    /// # Errors
    ///
    /// [`Error::TargetDropped`] if the field's root no longer exists.
    pub fn capture<T: Clone + 'static>(&mut self, field: &Field<T>) -> Result<()> {
        self.add(Snapshot::capture(field)?);
        Ok(())
    }

    /// Number of snapshots in the group.
    #[must_use]
    pub fn size(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Most recently added snapshot: the group's identity.
    #[must_use]
    pub fn last(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// Whether any snapshot in the group was taken of the same place.
    #[must_use]
    pub fn contains_place(&self, snapshot: &Snapshot) -> bool {
        self.snapshots.iter().any(|s| s.same_place(snapshot))
    }

    /// Whether the last snapshot was taken of `field`.
    #[must_use]
    pub fn holds<T: 'static>(&self, field: &Field<T>) -> bool {
        self.last().is_some_and(|s| s.holds(field))
    }

    /// Whether the last snapshot matches `field` by identity and value.
    #[must_use]
    pub fn matches<T: 'static>(&self, field: &Field<T>) -> bool {
        self.last().is_some_and(|s| s.matches(field))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    /// Rolls every snapshot back, last to first. Returns how many were written.
    pub fn rollback(&self) -> usize {
        self.rollback_with(&mut |_: &Signature| {})
    }

    pub fn rollback_with(&self, on_restored: &mut dyn FnMut(&Signature)) -> usize {
        self.snapshots
            .iter()
            .rev()
            .filter(|s| s.rollback_with(on_restored))
            .count()
    }

    /// Writes every snapshot, first to last. Returns how many were written.
    pub fn restore(&self) -> usize {
        self.restore_with(&mut |_: &Signature| {})
    }

    pub fn restore_with(&self, on_restored: &mut dyn FnMut(&Signature)) -> usize {
        self.snapshots
            .iter()
            .filter(|s| s.rollback_with(on_restored))
            .count()
    }

    /// Group of the current live values of the same places, same order.
    /// Places whose root was dropped are left out.
    #[must_use]
    pub fn recapture(&self) -> Self {
        self.snapshots.iter().filter_map(Snapshot::recapture).collect()
    }

    /// Drops snapshots whose root no longer exists. Returns how many.
    pub fn retain_alive(&mut self) -> usize {
        let before = self.snapshots.len();
        self.snapshots.retain(Snapshot::is_alive);
        before - self.snapshots.len()
    }
}

impl From<Snapshot> for SnapshotGroup {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            snapshots: vec![snapshot],
        }
    }
}

impl FromIterator<Snapshot> for SnapshotGroup {
    fn from_iter<I: IntoIterator<Item = Snapshot>>(iter: I) -> Self {
        Self {
            snapshots: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SnapshotGroup {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}
