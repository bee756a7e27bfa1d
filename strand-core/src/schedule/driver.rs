//! Flush Drivers
//!
//! A driver is the host's side of deferred scheduling: it takes a callback
//! and runs it later, when the requested time domain comes around.
//!
//! # Time domains
//!
//! - `Micro`: as soon as the current synchronous turn ends.
//! - `Macro`: on a later turn of the event loop.
//! - `Frame`: on the next frame tick.
//!
//! Two drivers ship with the crate. [`EventLoop`] keeps one FIFO per
//! domain and is pumped explicitly by the host; it is the default and what
//! the tests use. [`TokioDriver`] hands callbacks to `spawn_local`, so the
//! runtime can live inside a tokio `LocalSet`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// When a deferred callback should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeDomain {
    Micro,
    Macro,
    Frame,
}

/// A deferred callback.
pub type Callback = Box<dyn FnOnce()>;

/// Arms callbacks in a time domain.
pub trait Driver {
    fn arm(&self, domain: TimeDomain, callback: Callback);
}

/// Host-pumped event loop.
///
/// Nothing runs until the host calls one of the `run_*` methods. Like a
/// browser loop, microtasks are drained after every macrotask and frame.
#[derive(Default)]
pub struct EventLoop {
    micro: RefCell<VecDeque<Callback>>,
    macro_tasks: RefCell<VecDeque<Callback>>,
    frame: RefCell<VecDeque<Callback>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of armed callbacks across all domains.
    pub fn pending(&self) -> usize {
        self.micro.borrow().len() + self.macro_tasks.borrow().len() + self.frame.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Drain the microtask queue, including microtasks armed while draining.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let Some(callback) = self.micro.borrow_mut().pop_front() else {
                return ran;
            };
            callback();
            ran += 1;
        }
    }

    /// Run one macrotask, then drain microtasks. Returns `false` when no
    /// macrotask was pending.
    pub fn run_macrotask(&self) -> bool {
        let Some(callback) = self.macro_tasks.borrow_mut().pop_front() else {
            return false;
        };
        callback();
        self.run_microtasks();
        true
    }

    /// Run every callback armed for this frame, then drain microtasks.
    /// Callbacks armed during the frame wait for the next one.
    pub fn run_frame(&self) -> usize {
        let callbacks = std::mem::take(&mut *self.frame.borrow_mut());
        let ran = callbacks.len();
        for callback in callbacks {
            callback();
            self.run_microtasks();
        }
        ran
    }

    /// Pump every domain until nothing is pending. Returns the number of
    /// callbacks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            ran += self.run_microtasks();
            let next = self.macro_tasks.borrow_mut().pop_front();
            if let Some(callback) = next {
                callback();
                ran += 1;
                continue;
            }
            let frame = std::mem::take(&mut *self.frame.borrow_mut());
            if frame.is_empty() {
                return ran;
            }
            for callback in frame {
                callback();
                ran += 1 + self.run_microtasks();
            }
        }
    }
}

impl Driver for EventLoop {
    fn arm(&self, domain: TimeDomain, callback: Callback) {
        let queue = match domain {
            TimeDomain::Micro => &self.micro,
            TimeDomain::Macro => &self.macro_tasks,
            TimeDomain::Frame => &self.frame,
        };
        queue.borrow_mut().push_back(callback);
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("micro", &self.micro.borrow().len())
            .field("macro", &self.macro_tasks.borrow().len())
            .field("frame", &self.frame.borrow().len())
            .finish()
    }
}

/// Arms callbacks on the current tokio `LocalSet`.
///
/// Arming outside a `LocalSet` panics, as `spawn_local` does.
#[derive(Debug, Clone)]
pub struct TokioDriver {
    frame_interval: Duration,
}

impl TokioDriver {
    pub fn new(frame_interval: Duration) -> Self {
        Self { frame_interval }
    }
}

impl Driver for TokioDriver {
    fn arm(&self, domain: TimeDomain, callback: Callback) {
        let frame_interval = self.frame_interval;
        tokio::task::spawn_local(async move {
            match domain {
                TimeDomain::Micro => {}
                TimeDomain::Macro => tokio::task::yield_now().await,
                TimeDomain::Frame => tokio::time::sleep(frame_interval).await,
            }
            callback();
        });
    }
}
