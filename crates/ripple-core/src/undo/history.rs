#![forbid(unsafe_code)]

//! Undo/redo stacks of snapshot groups.
//!
//! # Design
//!
//! Every undo entry is a [`SnapshotGroup`] of *pre-mutation* values. The
//! stacks themselves never roll anything back; the
//! [`DataManager`](crate::DataManager) pops an entry, recaptures the live
//! values of the same places as the opposite image, writes the entry and
//! pushes the image onto the other stack. One entry is therefore always one
//! logical step in either direction.
//!
//! # Invariants
//!
//! 1. A new recording clears the redo stack.
//! 2. With [`Grouping::WithLast`], a place already present in the newest
//!    entry is not captured again: the earliest capture is the one restored.
//! 3. `undo_len() <= max_depth` whenever a depth is configured. The oldest
//!    entries are evicted first.

use std::collections::VecDeque;

use tracing::debug;

use super::snapshot::{Snapshot, SnapshotGroup};

/// Whether the last history operation moved forward or backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// A mutation or a redo.
    #[default]
    Forward,
    /// An undo.
    Backwards,
}

/// How a recorded snapshot is filed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Grouping {
    /// Start a new undo entry.
    #[default]
    Separate,
    /// Join the newest undo entry, so one undo reverts both changes.
    WithLast,
}

/// History limits and merging behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HistoryConfig {
    /// Maximum number of undo entries kept; `None` is unbounded.
    pub max_depth: Option<usize>,
    /// Merge consecutive separate writes to the same place into one entry.
    pub coalesce: bool,
}

impl HistoryConfig {
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    #[must_use]
    pub fn with_coalesce(mut self, enabled: bool) -> Self {
        self.coalesce = enabled;
        self
    }
}

/// Undo and redo stacks.
#[derive(Debug, Default)]
pub struct History {
    undo: VecDeque<SnapshotGroup>,
    redo: Vec<SnapshotGroup>,
    direction: Direction,
    config: HistoryConfig,
    /// Whether the newest undo entry came from a mutation (not a redo), so
    /// coalescing may extend it.
    coalescable: bool,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: HistoryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Files the pre-mutation `snapshot` of a forward change.
    pub fn record(&mut self, snapshot: Snapshot, grouping: Grouping) {
        self.direction = Direction::Forward;
        if !self.redo.is_empty() {
            debug!(discarded = self.redo.len(), "redo stack cleared by new change");
            self.redo.clear();
        }

        match (grouping, self.undo.back_mut()) {
            (Grouping::WithLast, Some(last)) => {
                if !last.contains_place(&snapshot) {
                    last.add(snapshot);
                }
            }
            (Grouping::Separate, Some(last))
                if self.config.coalesce
                    && self.coalescable
                    && last.last().is_some_and(|s| s.same_place(&snapshot)) =>
            {
                debug!(type_name = snapshot.type_name(), "coalesced into last entry");
            }
            _ => {
                self.undo.push_back(SnapshotGroup::from(snapshot));
                self.enforce_depth();
            }
        }
        self.coalescable = true;
        debug!(undo = self.undo.len(), "change recorded");
    }

    /// Removes the newest undo entry.
    pub fn pop_undo(&mut self) -> Option<SnapshotGroup> {
        self.coalescable = false;
        self.undo.pop_back()
    }

    /// Pushes the image that redoes an undone entry.
    pub fn push_redo(&mut self, group: SnapshotGroup) {
        self.redo.push(group);
        self.direction = Direction::Backwards;
        debug!(undo = self.undo.len(), redo = self.redo.len(), "undo applied");
    }

    /// Removes the newest redo entry.
    pub fn pop_redo(&mut self) -> Option<SnapshotGroup> {
        self.coalescable = false;
        self.redo.pop()
    }

    /// Pushes the image that undoes a redone entry. Keeps the redo stack.
    pub fn push_undo(&mut self, group: SnapshotGroup) {
        self.undo.push_back(group);
        self.enforce_depth();
        self.direction = Direction::Forward;
        debug!(undo = self.undo.len(), redo = self.redo.len(), "redo applied");
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.direction = Direction::Forward;
        self.coalescable = false;
    }

    /// Drops snapshots of dropped roots, then any entries left empty.
    /// Returns how many snapshots were removed.
    pub fn retain_alive(&mut self) -> usize {
        let mut removed = 0;
        for group in self.undo.iter_mut().chain(self.redo.iter_mut()) {
            removed += group.retain_alive();
        }
        self.undo.retain(|group| !group.is_empty());
        self.redo.retain(|group| !group.is_empty());
        removed
    }

    fn enforce_depth(&mut self) {
        let Some(max) = self.config.max_depth else {
            return;
        };
        let mut evicted = 0;
        while self.undo.len() > max {
            self.undo.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, max_depth = max, "oldest undo entries evicted");
        }
    }
}
