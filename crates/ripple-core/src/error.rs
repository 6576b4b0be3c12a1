#![forbid(unsafe_code)]

//! Error type shared by the registries, snapshots and the manager.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The [`Tracked`](crate::Tracked) root behind a field no longer exists.
    #[error("field of type {type_name} refers to a dropped root")]
    TargetDropped { type_name: &'static str },

    /// An erased callback was invoked against a value of another type.
    #[error("callback expects {expected} but was invoked with {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("a field of type {type_name} cannot depend on itself")]
    SelfDependency { type_name: &'static str },
}

impl Error {
    #[must_use]
    pub fn target_dropped<T>() -> Self {
        Self::TargetDropped {
            type_name: std::any::type_name::<T>(),
        }
    }
}
