//! Task Queue
//!
//! Deferred schedulers wrap each batch in a [`Task`] and push it here. The
//! queue keeps at most one driver callback armed at a time: the first push
//! arms it, and each callback serves the most urgent task before deciding
//! whether to continue in the same callback, arm a fresh one, or go idle.
//!
//! A task returns a [`TaskControl`]. An unfinished task stays queued and is
//! offered again; `start_new_callback = false` lets the next task run in the
//! same callback instead of waiting for the time domain to come around.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::driver::{Driver, TimeDomain};
use super::priority_queue::PriorityQueue;

/// What a task asks of the queue after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskControl {
    /// Remove the task from the queue.
    pub finished: bool,
    /// Wait for a fresh driver callback before serving the next task.
    pub start_new_callback: bool,
}

impl Default for TaskControl {
    fn default() -> Self {
        Self {
            finished: true,
            start_new_callback: true,
        }
    }
}

/// A unit of deferred work.
pub struct Task {
    seq: u64,
    priority: i32,
    run: Box<dyn FnMut() -> TaskControl>,
}

impl Task {
    /// Creation order within its queue. Lower was pushed earlier.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("seq", &self.seq)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Earliest-created first.
pub fn created_first(a: &Task, b: &Task) -> bool {
    a.seq < b.seq
}

struct QueueState {
    tasks: RefCell<PriorityQueue<Task>>,
    scheduling: Cell<bool>,
    next_seq: Cell<u64>,
    driver: Rc<dyn Driver>,
    domain: TimeDomain,
}

/// Priority queue of tasks plus the single armed driver callback.
#[derive(Clone)]
pub struct TaskQueue {
    state: Rc<QueueState>,
}

impl TaskQueue {
    /// A queue serving tasks in creation order.
    pub fn new(driver: Rc<dyn Driver>, domain: TimeDomain) -> Self {
        Self::with_urgency(driver, domain, created_first)
    }

    /// A queue ordered by `is_urgent(a, b)`: `true` when `a` goes first.
    pub fn with_urgency(
        driver: Rc<dyn Driver>,
        domain: TimeDomain,
        is_urgent: impl Fn(&Task, &Task) -> bool + 'static,
    ) -> Self {
        Self {
            state: Rc::new(QueueState {
                tasks: RefCell::new(PriorityQueue::new(is_urgent)),
                scheduling: Cell::new(false),
                next_seq: Cell::new(0),
                driver,
                domain,
            }),
        }
    }

    pub fn push(&self, run: impl FnMut() -> TaskControl + 'static) {
        self.push_with_priority(0, run);
    }

    /// Queue a task and arm the driver if nothing is armed yet.
    pub fn push_with_priority(&self, priority: i32, run: impl FnMut() -> TaskControl + 'static) {
        let state = &self.state;
        let seq = state.next_seq.get();
        state.next_seq.set(seq + 1);
        state.tasks.borrow_mut().push(Task {
            seq,
            priority,
            run: Box::new(run),
        });

        if !state.scheduling.replace(true) {
            arm(state);
        }
    }

    pub fn len(&self) -> usize {
        self.state.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.tasks.borrow().is_empty()
    }

    /// Whether a driver callback is armed or running.
    pub fn is_scheduling(&self) -> bool {
        self.state.scheduling.get()
    }

    pub fn domain(&self) -> TimeDomain {
        self.state.domain
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("domain", &self.state.domain)
            .field("len", &self.len())
            .field("scheduling", &self.is_scheduling())
            .finish()
    }
}

fn arm(state: &Rc<QueueState>) {
    let weak = Rc::downgrade(state);
    state.driver.arm(state.domain, Box::new(move || serve(weak)));
}

/// Keeps the queue serviceable when a task unwinds out of [`serve`]: the
/// remaining tasks get a fresh callback, or the queue goes idle.
struct Unwinding<'a>(&'a Rc<QueueState>);

impl Drop for Unwinding<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let state = self.0;
        let has_more = state.tasks.try_borrow().is_ok_and(|tasks| !tasks.is_empty());
        if has_more {
            arm(state);
        } else {
            state.scheduling.set(false);
        }
    }
}

/// One driver callback: serve tasks until one asks for a fresh callback or
/// the queue drains.
fn serve(state: Weak<QueueState>) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let _unwinding = Unwinding(&state);
    loop {
        // The task runs with the queue unborrowed so it may push more work.
        let Some(mut task) = state.tasks.borrow_mut().pop() else {
            state.scheduling.set(false);
            return;
        };
        let control = (task.run)();
        if !control.finished {
            state.tasks.borrow_mut().push(task);
        }

        if state.tasks.borrow().is_empty() {
            state.scheduling.set(false);
            return;
        }
        if control.start_new_callback {
            arm(&state);
            return;
        }
    }
}
