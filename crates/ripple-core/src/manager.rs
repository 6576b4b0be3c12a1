#![forbid(unsafe_code)]

//! The propagation manager: registries, history and propagation behind one
//! facade.
//!
//! # Lifecycle of a managed write
//!
//! 1. Capture the field's pre-mutation value.
//! 2. Apply the write.
//! 3. File the capture in the history (new entry, grouped, or coalesced),
//!    clearing the redo stack.
//! 4. Propagate from the field: its own callbacks, then its parents level by
//!    level.
//!
//! Undo and redo replay a history entry through the same propagation path,
//! one snapshot at a time.
//!
//! # Reentrancy
//!
//! Every mutating operation takes `&mut self`. A callback cannot reach the
//! manager that is invoking it, so nested propagation is impossible by
//! construction.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::reactive::{
    CallbackId, CallbackRegistry, DependencyId, DependencyRegistry, Field, PolyFun,
    PropagationReport, Propagator, Signature,
};
use crate::undo::{Direction, Grouping, History, HistoryConfig, Snapshot, SnapshotGroup};

/// Owns callbacks, dependencies and undo history for caller-owned data.
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::{DataManager, Tracked, field};
///
/// #[derive(Clone, Default)]
/// struct Counter { hits: u32 }
///
/// let counter = Tracked::new(Counter::default());
/// let hits = field!(counter, hits);
/// let seen = Rc::new(Cell::new(0));
///
/// let mut manager = DataManager::new();
/// let sink = Rc::clone(&seen);
/// manager.register_callback(&hits, move |v: &u32| sink.set(*v));
///
/// manager.set(&hits, 3).unwrap();
/// assert_eq!(seen.get(), 3);
///
/// assert!(manager.undo());
/// assert_eq!(counter.borrow().hits, 0);
/// assert_eq!(seen.get(), 0);
/// ```
#[derive(Debug, Default)]
pub struct DataManager {
    callbacks: CallbackRegistry,
    dependencies: DependencyRegistry,
    propagator: Propagator,
    history: History,
}

impl DataManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: HistoryConfig) -> Self {
        Self {
            history: History::with_config(config),
            ..Self::default()
        }
    }

    // -- callbacks ----------------------------------------------------------

    /// Registers `callback` to run whenever `field` changes or is reached by
    /// propagation.
    pub fn register_callback<T: 'static>(
        &mut self,
        field: &Field<T>,
        callback: impl Fn(&T) + 'static,
    ) -> CallbackId {
        self.callbacks.insert(field.signature(), PolyFun::new(callback))
    }

    /// Registers an already erased callback.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] if `callback` was not built for `T`.
    pub fn register_poly_fun<T: 'static>(
        &mut self,
        field: &Field<T>,
        callback: PolyFun,
    ) -> Result<CallbackId> {
        if !callback.accepts::<T>() {
            return Err(Error::TypeMismatch {
                expected: callback.type_name(),
                found: std::any::type_name::<T>(),
            });
        }
        Ok(self.callbacks.insert(field.signature(), callback))
    }

    /// Removes every callback registered for `field`. Returns how many.
    pub fn remove_callbacks<T: 'static>(&mut self, field: &Field<T>) -> usize {
        self.callbacks.remove_key(&field.signature())
    }

    pub fn remove_callback(&mut self, id: CallbackId) -> bool {
        self.callbacks.remove(id)
    }

    // -- dependencies -------------------------------------------------------

    /// Declares that `parent` must be notified after `child` changes.
    ///
    /// Registering the same pair twice returns the first handle.
    ///
    /// # Errors
    ///
    /// [`Error::SelfDependency`] if `child` and `parent` are the same field.
    pub fn register_dependency<C: 'static, P: 'static>(
        &mut self,
        child: &Field<C>,
        parent: &Field<P>,
    ) -> Result<DependencyId> {
        self.dependencies.insert(child.signature(), parent.signature())
    }

    /// Removes every dependency whose child is `child`. Returns how many.
    pub fn remove_dependencies<T: 'static>(&mut self, child: &Field<T>) -> usize {
        self.dependencies.remove_key(&child.signature())
    }

    pub fn remove_dependency(&mut self, id: DependencyId) -> bool {
        self.dependencies.remove(id)
    }

    // -- managed writes -----------------------------------------------------

    /// Assigns `value` to `field` as a new undo step, then propagates.
    ///
    /// # Errors
    ///
    /// [`Error::TargetDropped`] if the field's root no longer exists.
    pub fn set<T: Clone + 'static>(
        &mut self,
        field: &Field<T>,
        value: T,
    ) -> Result<PropagationReport> {
        self.mutate(field, Grouping::Separate, move |slot| *slot = value)
            .map(|((), report)| report)
    }

    /// Like [`set`](Self::set), but joins the most recent undo step so one
    /// [`undo`](Self::undo) reverts both.
    ///
    /// # Errors
    ///
    /// [`Error::TargetDropped`] if the field's root no longer exists.
    pub fn set_grouped<T: Clone + 'static>(
        &mut self,
        field: &Field<T>,
        value: T,
    ) -> Result<PropagationReport> {
        self.mutate(field, Grouping::WithLast, move |slot| *slot = value)
            .map(|((), report)| report)
    }

    /// Runs `method` against the field's value as a new undo step, then
    /// propagates. Returns what `method` returned.
    ///
    /// # Errors
    ///
    /// [`Error::TargetDropped`] if the field's root no longer exists.
    pub fn call<T: Clone + 'static, R>(
        &mut self,
        field: &Field<T>,
        method: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        self.mutate(field, Grouping::Separate, method).map(|(out, _)| out)
    }

    /// Like [`call`](Self::call), grouped with the most recent undo step.
    ///
    /// # Errors
    ///
    /// [`Error::TargetDropped`] if the field's root no longer exists.
    pub fn call_grouped<T: Clone + 'static, R>(
        &mut self,
        field: &Field<T>,
        method: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        self.mutate(field, Grouping::WithLast, method).map(|(out, _)| out)
    }

    fn mutate<T: Clone + 'static, R>(
        &mut self,
        field: &Field<T>,
        grouping: Grouping,
        method: impl FnOnce(&mut T) -> R,
    ) -> Result<(R, PropagationReport)> {
        let snapshot = Snapshot::capture(field)?;
        let out = field
            .modify(method)
            .ok_or_else(Error::target_dropped::<T>)?;
        self.history.record(snapshot, grouping);
        let report = self.propagate(&field.signature());
        Ok((out, report))
    }

    /// Propagates from `field` without touching the history, for writes made
    /// directly through [`Tracked::borrow_mut`](crate::Tracked::borrow_mut).
    pub fn notify<T: 'static>(&mut self, field: &Field<T>) -> PropagationReport {
        self.propagate(&field.signature())
    }

    fn propagate(&mut self, root: &Signature) -> PropagationReport {
        self.propagator.run(root, &self.callbacks, &self.dependencies)
    }

    // -- history ------------------------------------------------------------

    /// Reverts the most recent undo step. Returns `false` if there is none.
    ///
    /// Steps whose roots have all been dropped are discarded and the next one
    /// is tried.
    pub fn undo(&mut self) -> bool {
        while let Some(entry) = self.history.pop_undo() {
            let Some(entry) = Self::live_entry(entry) else {
                continue;
            };
            let image = entry.recapture();
            let report = self.replay(&entry, Direction::Backwards);
            self.history.push_redo(image);
            debug!(fired = report.fired, skipped = report.skipped, "undo replayed");
            return true;
        }
        false
    }

    /// Re-applies the most recently undone step. Returns `false` if there is
    /// none.
    pub fn redo(&mut self) -> bool {
        while let Some(entry) = self.history.pop_redo() {
            let Some(entry) = Self::live_entry(entry) else {
                continue;
            };
            let image = entry.recapture();
            let report = self.replay(&entry, Direction::Forward);
            self.history.push_undo(image);
            debug!(fired = report.fired, skipped = report.skipped, "redo replayed");
            return true;
        }
        false
    }

    fn live_entry(mut entry: SnapshotGroup) -> Option<SnapshotGroup> {
        let dropped = entry.retain_alive();
        if entry.is_empty() {
            warn!(dropped, "history entry refers only to dropped roots, discarded");
            return None;
        }
        Some(entry)
    }

    fn replay(&mut self, entry: &SnapshotGroup, direction: Direction) -> PropagationReport {
        let mut total = PropagationReport::default();
        let mut propagate = |signature: &Signature| {
            total += self
                .propagator
                .run(signature, &self.callbacks, &self.dependencies);
        };
        match direction {
            Direction::Backwards => entry.rollback_with(&mut propagate),
            Direction::Forward => entry.restore_with(&mut propagate),
        };
        total
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Direction of the last history operation.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.history.direction()
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    // -- housekeeping -------------------------------------------------------

    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Drops callbacks, dependencies and history snapshots that refer to
    /// dropped roots. Returns the total number of entries removed.
    pub fn purge_dead(&mut self) -> usize {
        let callbacks = self.callbacks.retain_alive();
        let dependencies = self.dependencies.retain_alive();
        let snapshots = self.history.retain_alive();
        debug!(callbacks, dependencies, snapshots, "purged dead entries");
        callbacks + dependencies + snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Tracked, field};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct S {
        a: i32,
        b: f32,
    }

    type Log = Rc<RefCell<Vec<String>>>;

    fn log_i32(manager: &mut DataManager, field: &Field<i32>, log: &Log, tag: &'static str) {
        let sink = Rc::clone(log);
        manager.register_callback(field, move |v: &i32| {
            sink.borrow_mut().push(format!("{tag}={v}"));
        });
    }

    #[test]
    fn set_assigns_and_fires_callbacks() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let log: Log = Rc::default();
        let mut manager = DataManager::new();
        log_i32(&mut manager, &a, &log, "a");

        let report = manager.set(&a, 10).unwrap();
        assert_eq!(s.borrow().a, 10);
        assert_eq!(*log.borrow(), vec!["a=10"]);
        assert_eq!(report.fired, 1);
    }

    #[test]
    fn undo_then_redo_restores_each_side() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let log: Log = Rc::default();
        let mut manager = DataManager::new();
        log_i32(&mut manager, &a, &log, "a");

        manager.set(&a, 10).unwrap();
        assert!(manager.undo());
        assert_eq!(s.borrow().a, 0);
        assert_eq!(manager.direction(), Direction::Backwards);

        assert!(manager.redo());
        assert_eq!(s.borrow().a, 10);
        assert_eq!(manager.direction(), Direction::Forward);
        assert_eq!(*log.borrow(), vec!["a=10", "a=0", "a=10"]);
    }

    #[test]
    fn grouped_set_is_undone_in_one_step() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let b = field!(s, b);
        let mut manager = DataManager::new();

        manager.set(&a, 1).unwrap();
        manager.set_grouped(&b, 2.0).unwrap();
        assert!(manager.undo());
        assert_eq!(*s.borrow(), S::default());
        assert!(!manager.can_undo());

        assert!(manager.redo());
        assert_eq!(*s.borrow(), S { a: 1, b: 2.0 });
    }

    #[test]
    fn new_change_invalidates_redo() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let mut manager = DataManager::new();

        manager.set(&a, 10).unwrap();
        manager.undo();
        manager.set(&a, 20).unwrap();
        assert!(!manager.redo());
        assert_eq!(s.borrow().a, 20);
    }

    #[test]
    fn fresh_manager_has_nothing_to_replay() {
        let mut manager = DataManager::new();
        assert!(!manager.undo());
        assert!(!manager.redo());
        assert_eq!(manager.direction(), Direction::Forward);
    }

    #[test]
    fn multiple_undos_step_back_one_change_at_a_time() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let mut manager = DataManager::new();
        for v in [1, 2, 3] {
            manager.set(&a, v).unwrap();
        }

        assert!(manager.undo());
        assert_eq!(s.borrow().a, 2);
        assert!(manager.undo());
        assert_eq!(s.borrow().a, 1);
        assert!(manager.redo());
        assert_eq!(s.borrow().a, 2);
        assert!(manager.redo());
        assert_eq!(s.borrow().a, 3);
        assert!(!manager.redo());
    }

    #[test]
    fn propagation_reaches_parents_on_set_and_undo() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let whole = s.root();
        let log: Log = Rc::default();
        let mut manager = DataManager::new();

        let sink = Rc::clone(&log);
        manager.register_callback(&whole, move |s: &S| {
            sink.borrow_mut().push(format!("s.a={}", s.a));
        });
        manager.register_dependency(&a, &whole).unwrap();

        manager.set(&a, 4).unwrap();
        manager.undo();
        assert_eq!(*log.borrow(), vec!["s.a=4", "s.a=0"]);
    }

    #[test]
    fn call_passes_the_return_value_through() {
        let list = Tracked::new(vec![1, 2, 3]);
        let root = list.root();
        let mut manager = DataManager::new();

        let popped = manager.call(&root, Vec::pop).unwrap();
        assert_eq!(popped, Some(3));
        let len = manager.call_grouped(&root, |v| {
            v.push(9);
            v.len()
        });
        assert_eq!(len, Ok(3));

        assert!(manager.undo());
        assert_eq!(list.get(), vec![1, 2, 3]);
    }

    #[test]
    fn writes_to_dropped_roots_fail() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let mut manager = DataManager::new();
        drop(s);

        assert!(matches!(manager.set(&a, 1), Err(Error::TargetDropped { .. })));
        assert!(manager.call(&a, |v| *v += 1).is_err());
        assert!(!manager.can_undo());
    }

    #[test]
    fn undo_skips_entries_of_dropped_roots() {
        let kept = Tracked::new(S::default());
        let gone = Tracked::new(S::default());
        let mut manager = DataManager::new();

        manager.set(&field!(kept, a), 1).unwrap();
        manager.set(&field!(gone, a), 1).unwrap();
        drop(gone);

        assert!(manager.undo());
        assert_eq!(kept.borrow().a, 0);
        assert!(!manager.undo());
    }

    #[test]
    fn remove_callbacks_and_dependencies() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let log: Log = Rc::default();
        let mut manager = DataManager::new();

        log_i32(&mut manager, &a, &log, "first");
        let second = manager.register_callback(&a, |_: &i32| {});
        let dep = manager.register_dependency(&a, &s.root()).unwrap();
        assert_eq!(manager.register_dependency(&a, &s.root()), Ok(dep));

        assert!(manager.remove_callback(second));
        assert!(!manager.remove_callback(second));
        assert_eq!(manager.remove_callbacks(&a), 1);
        assert_eq!(manager.callback_count(), 0);

        assert!(manager.remove_dependency(dep));
        assert_eq!(manager.remove_dependencies(&a), 0);

        manager.set(&a, 5).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn self_dependency_is_rejected() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let mut manager = DataManager::new();
        assert!(matches!(
            manager.register_dependency(&a, &a),
            Err(Error::SelfDependency { .. })
        ));
        assert_eq!(manager.dependency_count(), 0);
    }

    #[test]
    fn register_poly_fun_checks_the_type() {
        let s = Tracked::new(S::default());
        let mut manager = DataManager::new();
        let float_cb = PolyFun::new(|_: &f32| {});

        assert!(manager.register_poly_fun(&field!(s, b), float_cb.clone()).is_ok());
        assert_eq!(
            manager.register_poly_fun(&field!(s, a), float_cb),
            Err(Error::TypeMismatch {
                expected: "f32",
                found: "i32",
            })
        );
    }

    #[test]
    fn notify_fires_without_recording() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let log: Log = Rc::default();
        let mut manager = DataManager::new();
        log_i32(&mut manager, &a, &log, "a");

        s.borrow_mut().a = 7;
        let report = manager.notify(&a);
        assert_eq!(report.fired, 1);
        assert_eq!(*log.borrow(), vec!["a=7"]);
        assert!(!manager.can_undo());
    }

    #[test]
    fn bounded_and_coalescing_history() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let t = Tracked::new(S::default());
        let ta = field!(t, a);

        let mut bounded = DataManager::with_config(HistoryConfig::default().with_max_depth(2));
        for v in 1..=5 {
            bounded.set(&a, v).unwrap();
        }
        assert_eq!(bounded.history().undo_len(), 2);

        let mut coalescing = DataManager::with_config(HistoryConfig::default().with_coalesce(true));
        for v in 1..=5 {
            coalescing.set(&ta, v).unwrap();
        }
        assert_eq!(coalescing.history().undo_len(), 1);
        assert!(coalescing.undo());
        assert_eq!(t.borrow().a, 0);
    }

    #[test]
    fn purge_dead_clears_everything_of_dropped_roots() {
        let kept = Tracked::new(S::default());
        let gone = Tracked::new(S::default());
        let mut manager = DataManager::new();

        manager.register_callback(&field!(gone, a), |_: &i32| {});
        manager.register_callback(&field!(kept, a), |_: &i32| {});
        manager
            .register_dependency(&field!(gone, a), &kept.root())
            .unwrap();
        manager.set(&field!(gone, b), 1.0).unwrap();

        drop(gone);
        assert_eq!(manager.purge_dead(), 3);
        assert_eq!(manager.callback_count(), 1);
        assert_eq!(manager.dependency_count(), 0);
        assert!(!manager.can_undo());
    }

    #[test]
    fn clear_history_forgets_all_steps() {
        let s = Tracked::new(S::default());
        let a = field!(s, a);
        let mut manager = DataManager::new();
        manager.set(&a, 1).unwrap();
        manager.set(&a, 2).unwrap();
        manager.undo();

        manager.clear_history();
        assert!(!manager.can_undo());
        assert!(!manager.can_redo());
        assert_eq!(s.borrow().a, 1);
    }
}
