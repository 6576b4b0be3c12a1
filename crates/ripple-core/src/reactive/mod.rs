#![forbid(unsafe_code)]

//! Field identity, type-erased callbacks and the propagation graph.
//!
//! - [`Tracked`]: caller-owned shared root of managed data.
//! - [`Field`]: typed weak handle onto one place inside a `Tracked` root.
//! - [`Signature`]: the same handle with its type erased, usable as a map key.
//! - [`PolyFun`]: a type-erased unary callback, checked against the
//!   signature's runtime type on every invocation.
//! - [`CallbackRegistry`] / [`DependencyRegistry`]: multimaps keyed by
//!   signature.
//! - [`Propagator`]: level-order walk of the dependency graph.
//!
//! # Architecture
//!
//! Data lives in `Rc<RefCell<..>>` roots owned by the caller. Fields and
//! signatures only hold `Weak` references, so the engine never extends the
//! lifetime of caller data. Because a `Weak` keeps the allocation (not the
//! value) alive, the address recorded in a signature cannot be handed out to
//! another root while the signature exists.
//!
//! # Invariants
//!
//! 1. Two signatures are equal iff they share address and runtime type.
//! 2. A callback fires at most once per propagation run.
//! 3. Callbacks registered for the same field fire in registration order.

pub mod field;
pub mod poly_fun;
pub mod propagation;
pub mod registry;
pub mod signature;

pub use field::{Field, Tracked};
pub use poly_fun::PolyFun;
pub use propagation::{PropagationReport, Propagator};
pub use registry::{CallbackId, CallbackRegistry, DependencyId, DependencyRegistry};
pub use signature::Signature;
