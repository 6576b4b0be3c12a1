#![forbid(unsafe_code)]

//! Level-order propagation over the dependency graph.
//!
//! # Algorithm
//!
//! Starting from the mutated field:
//!
//! 1. `level = {root}`, `visited = {root}`.
//! 2. While `level` is non-empty:
//!    a. fire every callback of every node in `level`;
//!    b. collect the parents of every node in `level` that are not yet
//!       visited into the next level, marking them visited;
//!    c. advance to the next level.
//! 3. Clear the run-scoped state.
//!
//! # Invariants
//!
//! 1. Each reachable node fires its callbacks exactly once per run, so cycles
//!    terminate.
//! 2. A whole level fires before any node of the next level.
//! 3. Within a level, nodes fire in discovery order and each node's
//!    callbacks fire in registration order.
//!
//! # Failure Modes
//!
//! - **Dropped referent**: its callbacks are skipped and counted in
//!   [`PropagationReport::skipped`]; its parents are still walked.
//! - **Callback panics**: the panic unwinds out of the run. Scratch state is
//!   reset at the start of the next run.

use std::ops::AddAssign;

use ahash::AHashSet;
use tracing::{debug, trace};

use super::registry::{CallbackRegistry, DependencyRegistry};
use super::signature::Signature;

/// Counters describing one or more propagation runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Number of graph levels walked.
    pub levels: usize,
    /// Number of distinct nodes reached.
    pub visited: usize,
    /// Callbacks that ran.
    pub fired: usize,
    /// Callbacks skipped because their referent was dropped.
    pub skipped: usize,
}

impl AddAssign for PropagationReport {
    fn add_assign(&mut self, other: Self) {
        self.levels += other.levels;
        self.visited += other.visited;
        self.fired += other.fired;
        self.skipped += other.skipped;
    }
}

/// Reusable scratch space for propagation runs.
#[derive(Debug, Default)]
pub struct Propagator {
    visited: AHashSet<Signature>,
    level: Vec<Signature>,
    next: Vec<Signature>,
}

impl Propagator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires every callback reachable from `root`.
    pub fn run(
        &mut self,
        root: &Signature,
        callbacks: &CallbackRegistry,
        dependencies: &DependencyRegistry,
    ) -> PropagationReport {
        self.reset();
        let mut report = PropagationReport::default();

        self.visited.insert(root.clone());
        self.level.push(root.clone());

        while !self.level.is_empty() {
            report.levels += 1;
            trace!(depth = report.levels, width = self.level.len(), "propagation level");

            for node in &self.level {
                for callback in callbacks.callbacks(node) {
                    if node.invoke(callback) {
                        report.fired += 1;
                    } else {
                        report.skipped += 1;
                    }
                }
            }

            for node in &self.level {
                for parent in dependencies.parents(node) {
                    if self.visited.insert(parent.clone()) {
                        self.next.push(parent.clone());
                    }
                }
            }

            report.visited += self.level.len();
            std::mem::swap(&mut self.level, &mut self.next);
            self.next.clear();
        }

        self.reset();
        debug!(
            root = ?root,
            levels = report.levels,
            visited = report.visited,
            fired = report.fired,
            skipped = report.skipped,
            "propagation finished"
        );
        report
    }

    fn reset(&mut self) {
        self.visited.clear();
        self.level.clear();
        self.next.clear();
    }
}
