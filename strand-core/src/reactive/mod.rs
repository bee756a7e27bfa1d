//! Reactive Primitives
//!
//! This module implements the handles users hold: signals, memos, effects
//! and scopes, plus the runtime that connects them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Reading it while a memo or
//! effect is pulling records a dependency; writing a different value
//! invalidates everything downstream.
//!
//! ## Memos
//!
//! A Memo is a lazily computed, cached derived value. It recomputes on read,
//! and only when one of its inputs actually changed.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs once on creation and
//! again whenever its inputs change, at a time chosen by its scheduler.
//! [`watch`] builds on effects to report old and new values.
//!
//! ## Scopes
//!
//! Every cell belongs to the scope that was current when it was created.
//! Releasing a scope disposes its cells in one go.
//!
//! # Implementation Notes
//!
//! Handles are thin: a `NodeId`, an `Rc` to the typed value, and a `Weak`
//! to the runtime. The graph stores the same value behind a type-erased
//! `Rc<dyn Compute>` so it can recompute without knowing `T`.

mod context;
mod effect;
mod memo;
mod runtime;
mod scope;
mod signal;

pub use effect::{watch, watch_with, Effect, EffectOptions, ValueDiff, WatchOptions};
pub use memo::Memo;
pub use runtime::Runtime;
pub use scope::Scope;
pub use signal::Signal;

pub(crate) use runtime::RuntimeInner;
