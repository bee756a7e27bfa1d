//! Strand Core
//!
//! A fine-grained reactive dependency engine. It implements:
//!
//! - Reactive primitives (signals, memos, effects, watchers)
//! - Precise invalidation over a dynamic dependency graph
//! - Pluggable flush scheduling (synchronous, microtask, macrotask, frame)
//! - Ownership scopes for bulk disposal
//! - Deep reactive collections
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: arena-backed nodes and edges, dirty marking and upstream walks
//! - `reactive`: the runtime and the handles users hold
//! - `schedule`: scheduler keys, batches and the task queues behind them
//! - `collections`: vectors and maps with per-entry reactivity
//! - `config` / `error`: runtime configuration and error types
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use strand_core::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a signal
//! let count = rt.signal(1);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     rt.memo(move || count.get() * 2)
//! };
//!
//! // Create an effect; it runs once right away
//! let seen = Rc::new(Cell::new(0));
//! let _effect = {
//!     let (doubled, seen) = (doubled.clone(), seen.clone());
//!     rt.effect(move || seen.set(doubled.get()))
//! };
//! assert_eq!(seen.get(), 2);
//!
//! // Update the signal; the synchronous effect re-runs before `set` returns
//! count.set(5);
//! assert_eq!(seen.get(), 10);
//! ```

pub mod collections;
pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod schedule;

pub use collections::{ReactiveMap, ReactiveVec};
pub use config::{DriverKind, PullErrorPolicy, RuntimeConfig};
pub use error::{PullError, ReactiveError, Result};
pub use graph::{GraphSnapshot, NodeId, NodeKind, NodeSnapshot, ScopeId};
pub use reactive::{
    watch, watch_with, Effect, EffectOptions, Memo, Runtime, Scope, Signal, ValueDiff,
    WatchOptions,
};
pub use schedule::{Batch, DeferredScheduler, EventLoop, Scheduler, SchedulerKey, SyncScheduler};
