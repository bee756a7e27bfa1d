//! Flush Scheduling
//!
//! A write marks the graph and collects the eager terminal nodes it reached,
//! grouped by each node's [`SchedulerKey`]. Each group becomes a [`Batch`]
//! and is handed to the scheduler registered under that key.
//!
//! # Built-in schedulers
//!
//! | key      | policy                                               |
//! |----------|------------------------------------------------------|
//! | `sync`   | flush inline, before the write returns               |
//! | `micro`  | one microtask drains every pending batch             |
//! | `macro`  | one macrotask per batch                              |
//! | `layout` | one frame callback per batch                         |
//!
//! Deferred schedulers coalesce: a node already waiting in a batch is not
//! collected again by later writes, so N writes in one turn cost one run.
//!
//! Custom policies implement [`Scheduler`] and are registered with
//! [`Runtime::register_scheduler`](crate::Runtime::register_scheduler).

mod driver;
mod priority_queue;
mod task;

use std::borrow::Cow;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;

pub use driver::{Callback, Driver, EventLoop, TimeDomain, TokioDriver};
pub use priority_queue::PriorityQueue;
pub use task::{created_first, Task, TaskControl, TaskQueue};

use crate::graph::NodeId;
use crate::reactive::RuntimeInner;

/// Name of a flush policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SchedulerKey(Cow<'static, str>);

impl SchedulerKey {
    pub const SYNC: Self = Self(Cow::Borrowed("sync"));
    pub const MICRO: Self = Self(Cow::Borrowed("micro"));
    pub const MACRO: Self = Self(Cow::Borrowed("macro"));
    pub const LAYOUT: Self = Self(Cow::Borrowed("layout"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SchedulerKey {
    fn default() -> Self {
        Self::SYNC
    }
}

impl fmt::Display for SchedulerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for SchedulerKey {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

/// Terminal nodes reached by one write (or one outermost batch), in the
/// order they were reached.
#[derive(Clone)]
pub struct Batch {
    runtime: Weak<RuntimeInner>,
    members: Rc<[NodeId]>,
}

impl Batch {
    pub(crate) fn new(runtime: Weak<RuntimeInner>, members: Vec<NodeId>) -> Self {
        Self {
            runtime,
            members: members.into(),
        }
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Re-run every member that is still stale, in order. Members resolved
    /// clean earlier in the flush, or disposed since, are skipped.
    pub fn run(&self) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        for &id in self.members.iter() {
            runtime.run_if_dirty(id);
        }
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.members.iter()).finish()
    }
}

/// A flush policy.
pub trait Scheduler {
    /// Take ownership of a batch and run it, now or later.
    fn schedule(&self, batch: Batch);
}

/// Flushes inline.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncScheduler;

impl Scheduler for SyncScheduler {
    fn schedule(&self, batch: Batch) {
        batch.run();
    }
}

/// Defers batches through a [`TaskQueue`].
#[derive(Debug, Clone)]
pub struct DeferredScheduler {
    queue: TaskQueue,
    start_new_callback: bool,
}

impl DeferredScheduler {
    pub fn new(queue: TaskQueue, start_new_callback: bool) -> Self {
        Self {
            queue,
            start_new_callback,
        }
    }

    /// Every pending batch runs inside a single microtask.
    pub fn micro(driver: Rc<dyn Driver>) -> Self {
        Self::new(TaskQueue::new(driver, TimeDomain::Micro), false)
    }

    /// One macrotask per batch.
    pub fn macro_task(driver: Rc<dyn Driver>) -> Self {
        Self::new(TaskQueue::new(driver, TimeDomain::Macro), true)
    }

    /// One frame callback per batch.
    pub fn layout(driver: Rc<dyn Driver>) -> Self {
        Self::new(TaskQueue::new(driver, TimeDomain::Frame), true)
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }
}

impl Scheduler for DeferredScheduler {
    fn schedule(&self, batch: Batch) {
        let control = TaskControl {
            finished: true,
            start_new_callback: self.start_new_callback,
        };
        self.queue.push(move || {
            batch.run();
            control
        });
    }
}

/// The four built-in schedulers, in registration order.
pub(crate) fn builtin(driver: Rc<dyn Driver>) -> Vec<(SchedulerKey, Rc<dyn Scheduler>)> {
    vec![
        (SchedulerKey::SYNC, Rc::new(SyncScheduler)),
        (SchedulerKey::MICRO, Rc::new(DeferredScheduler::micro(driver.clone()))),
        (SchedulerKey::MACRO, Rc::new(DeferredScheduler::macro_task(driver.clone()))),
        (SchedulerKey::LAYOUT, Rc::new(DeferredScheduler::layout(driver))),
    ]
}
