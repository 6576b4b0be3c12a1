#![forbid(unsafe_code)]

//! Snapshot-based undo/redo.
//!
//! # Architecture
//!
//! - [`Snapshot`]: owned copy of one field's value plus its erased place.
//! - [`SnapshotGroup`]: ordered snapshots reverted as one step.
//! - [`History`]: undo and redo stacks of groups, bounded and optionally
//!   coalescing per [`HistoryConfig`].
//!
//! Restoring a snapshot reports the restored field's signature so the
//! manager can propagate from it, exactly as after a forward mutation.

pub mod history;
pub mod snapshot;

pub use history::{Direction, Grouping, History, HistoryConfig};
pub use snapshot::{Snapshot, SnapshotGroup};
