#![forbid(unsafe_code)]

//! Ripple public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.
//!
//! ```
//! use ripple::prelude::*;
//!
//! #[derive(Clone, Default)]
//! struct Settings { volume: u8, muted: bool }
//!
//! let settings = Tracked::new(Settings::default());
//! let volume = field!(settings, volume);
//! let muted = field!(settings, muted);
//!
//! let mut manager = DataManager::with_config(HistoryConfig::default().with_max_depth(100));
//! manager.set(&volume, 7).unwrap();
//! manager.set_grouped(&muted, true).unwrap();
//!
//! assert!(manager.undo());
//! assert_eq!(settings.borrow().volume, 0);
//! assert!(!settings.borrow().muted);
//! ```

pub use ripple_core::{
    CallbackId, DataManager, DependencyId, Direction, Error, Field, HistoryConfig, PolyFun,
    PropagationReport, Result, Signature, Tracked, field,
};

pub mod prelude {
    pub use ripple_core as core;
    pub use ripple_core::{
        DataManager, Direction, Error, Field, HistoryConfig, PolyFun, Result, Signature, Tracked,
        field,
    };
}
