//! Error types for the reactive engine.

use thiserror::Error;

use crate::graph::NodeId;
use crate::schedule::SchedulerKey;

/// The failure a fallible pull closure reports.
///
/// Any `std::error::Error` converts into this, as do `&str` and `String`.
pub type PullError = Box<dyn std::error::Error + 'static>;

/// Errors surfaced to callers of the engine.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// Every `Runtime` handle was dropped while a cell handle was still in use.
    #[error("the reactive runtime has been dropped")]
    RuntimeDropped,

    /// A memo was read before it ever produced a value.
    #[error("memo {0} has not produced a value yet")]
    Uninitialized(NodeId),

    /// The latest recomputation of a cell failed.
    #[error("recomputation of node {node} failed: {message}")]
    PullFailed { node: NodeId, message: String },

    /// A batch was routed to a scheduler key nobody registered.
    #[error("no scheduler registered under `{0}`")]
    UnknownScheduler(SchedulerKey),

    /// A collection index was outside the valid range.
    #[error("index {index} out of range for length {len}")]
    OutOfRange { index: usize, len: usize },

    /// Runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
