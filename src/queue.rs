// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-thread task queue
//!
//! Promises never run their waiters while settling. Every waiter becomes a
//! task in the queue of the thread that settled the promise (or that
//! registered the waiter on an already settled promise), and `run()` drains
//! them one after another. A chain of N promises settling synchronously thus
//! costs N queue turns instead of N nested stack frames.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::error::Error;
use crate::options::Options;

type Task = Box<dyn FnOnce() + 'static>;

thread_local!(static QUEUE: TaskQueue = TaskQueue::new(Options::new()));

// Points at the queue's task list while its destructor drains it at thread
// exit. `QUEUE` is unreachable then, so `add` pushes through this instead.
thread_local!(static DRAINING: Cell<*const RefCell<VecDeque<Task>>> = Cell::new(ptr::null()));

struct TaskQueue {
    tasks: RefCell<VecDeque<Task>>,
    opts: RefCell<Options>,
}

impl TaskQueue {
    fn new(opts: Options) -> TaskQueue {
        TaskQueue {
            tasks: RefCell::new(VecDeque::with_capacity(opts.capacity)),
            opts: RefCell::new(opts),
        }
    }

    fn label(&self) -> String {
        match self.opts.borrow().name {
            Some(ref name) => name.clone(),
            None => "<unnamed>".to_owned(),
        }
    }

    fn run(&self) -> usize {
        let limit = self.opts.borrow().run_limit;
        self.run_bounded(limit)
    }

    fn run_bounded(&self, limit: Option<usize>) -> usize {
        let mut count = 0;

        while limit.map_or(true, |limit| count < limit) {
            // The borrow must end before the task runs, tasks enqueue more tasks.
            let next = self.tasks.borrow_mut().pop_front();
            let task = match next {
                Some(task) => task,
                None => break,
            };

            count += 1;

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                error!("Task queue {}: task panicked: {}",
                       self.label(),
                       Error::from_panic(payload));
            }
        }

        if count > 0 {
            trace!("Task queue {}: ran {} tasks", self.label(), count);
        }

        count
    }
}

// Tasks left at thread exit still carry settlements; run them instead of
// leaving their downstream promises pending forever.
impl Drop for TaskQueue {
    fn drop(&mut self) {
        let left = self.tasks.get_mut().len();
        if left == 0 {
            return;
        }

        debug!("Task queue {}: running {} tasks left at thread exit", self.label(), left);

        let tasks: *const RefCell<VecDeque<Task>> = &self.tasks;
        let _ = DRAINING.try_with(|d| d.set(tasks));
        let count = self.run_bounded(None);
        let _ = DRAINING.try_with(|d| d.set(ptr::null()));

        trace!("Task queue {}: drained {} tasks at thread exit", self.label(), count);
    }
}

/// Push a task to the back of the current thread's queue
pub fn add<F>(task: F)
    where F: FnOnce() + 'static
{
    let mut task = Some(Box::new(task) as Task);

    if QUEUE.try_with(|q| q.tasks.borrow_mut().extend(task.take())).is_ok() {
        return;
    }

    let draining = DRAINING.try_with(|d| d.get()).unwrap_or(ptr::null());
    if !draining.is_null() {
        // Only set by the queue destructor of this thread while it is running.
        unsafe { (*draining).borrow_mut().extend(task.take()) };
        return;
    }

    error!("Task queue is gone, discarding a task enqueued after thread teardown");
}

/// Run queued tasks in FIFO order until the queue is empty or the run limit
/// is reached. Tasks enqueued while running are run in the same turn.
///
/// Returns the number of tasks that ran.
pub fn run() -> usize {
    QUEUE.try_with(|q| q.run()).unwrap_or(0)
}

/// Number of tasks waiting in the current thread's queue
pub fn len() -> usize {
    QUEUE.try_with(|q| q.tasks.borrow().len()).unwrap_or(0)
}

pub fn is_empty() -> bool {
    len() == 0
}

/// The options of the current thread's queue
pub fn options() -> Options {
    QUEUE.with(|q| q.opts.borrow().clone())
}

/// Replace the options of the current thread's queue
pub fn configure(opts: Options) {
    QUEUE.with(|q| {
        {
            let mut tasks = q.tasks.borrow_mut();
            let len = tasks.len();
            tasks.reserve(opts.capacity.saturating_sub(len));
        }

        debug!("Task queue {:?}: configured with {:?}", opts.name, opts);
        *q.opts.borrow_mut() = opts;
    })
}
