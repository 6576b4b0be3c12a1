#![forbid(unsafe_code)]

//! Change propagation and snapshot undo/redo for caller-owned data.
//!
//! Data lives in [`Tracked`] roots owned by the application. A [`Field`]
//! names one place inside a root. The [`DataManager`] performs writes
//! through fields, records the previous value for undo, and notifies the
//! callbacks registered on the field and, level by level, on every field that
//! declared a dependency on it.
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use ripple_core::{DataManager, Tracked, field};
//!
//! #[derive(Clone, Default)]
//! struct Shape { width: i32, height: f32 }
//!
//! let shape = Tracked::new(Shape::default());
//! let width = field!(shape, width);
//! let height = field!(shape, height);
//! let whole = shape.root();
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let mut manager = DataManager::new();
//! let sink = Rc::clone(&log);
//! manager.register_callback(&whole, move |s: &Shape| sink.borrow_mut().push(s.width));
//! manager.register_dependency(&width, &whole).unwrap();
//!
//! manager.set(&width, 4).unwrap();
//! manager.set_grouped(&height, 2.5).unwrap();
//! assert_eq!(*log.borrow(), vec![4]);
//!
//! // One undo reverts both grouped writes.
//! assert!(manager.undo());
//! assert_eq!(shape.borrow().width, 0);
//! assert_eq!(shape.borrow().height, 0.0);
//! ```

pub mod error;
pub mod manager;
pub mod reactive;
pub mod undo;

pub use error::{Error, Result};
pub use manager::DataManager;
pub use reactive::{
    CallbackId, CallbackRegistry, DependencyId, DependencyRegistry, Field, PolyFun,
    PropagationReport, Propagator, Signature, Tracked,
};
pub use undo::{Direction, Grouping, History, HistoryConfig, Snapshot, SnapshotGroup};
