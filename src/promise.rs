// The MIT License (MIT)

// Copyright (c) 2015 Y. T. Chung <zonyitoo@gmail.com>

// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:

// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE

//! Promise style asynchronous APIs

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::error::Error;
use crate::queue;
use crate::step::{PromiseLike, ResolutionStep};
use crate::sync::spinlock::Spinlock;

/// What a promise is resolved with: a plain value, or another promise whose
/// eventual outcome is adopted.
pub enum Resolution<T: 'static, E: 'static> {
    Value(T),
    Pending(Promise<T, E>),
}

impl<T: 'static, E: 'static> From<T> for Resolution<T, E> {
    fn from(value: T) -> Resolution<T, E> {
        Resolution::Value(value)
    }
}

impl<T: 'static, E: 'static> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Resolution<T, E> {
        Resolution::Pending(promise)
    }
}

/// Observable state of a promise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

type Waiter<T, E> = Box<dyn FnOnce(Result<T, E>) + Send + 'static>;

enum Slot<T: 'static, E: 'static> {
    Pending(Vec<Waiter<T, E>>),
    // Locked onto another promise, waiting for it to settle.
    Adopting(Vec<Waiter<T, E>>),
    Fulfilled(T),
    Rejected(E),
}

// Waiters own the downstream promises of their chain. Dropping them in place
// would recurse once per link, so they are handed to `reclaim` instead.
impl<T: 'static, E: 'static> Drop for Slot<T, E> {
    fn drop(&mut self) {
        let waiters = match *self {
            Slot::Pending(ref mut waiters) | Slot::Adopting(ref mut waiters) => {
                mem::replace(waiters, Vec::new())
            }
            _ => return,
        };

        if !waiters.is_empty() {
            reclaim(Box::new(waiters));
        }
    }
}

thread_local!(static RECLAIM: RefCell<Option<Vec<Box<dyn Any>>>> = RefCell::new(None));

/// Drop detached waiter lists one after another.
///
/// The outermost call on a thread owns the work list and loops over it;
/// nested calls, made while dropping an earlier list, only push onto it.
fn reclaim(garbage: Box<dyn Any>) {
    let mut garbage = Some(garbage);

    let owner = RECLAIM.try_with(|pending| {
                           let mut pending = pending.borrow_mut();
                           match *pending {
                               Some(ref mut list) => {
                                   list.extend(garbage.take());
                                   false
                               }
                               None => {
                                   *pending = Some(Vec::new());
                                   true
                               }
                           }
                       })
                       .unwrap_or(false);

    // Not the owner: already pushed, or the thread is tearing down and the
    // list is gone, in which case it is dropped right here.
    if !owner {
        return;
    }

    drop(garbage);

    loop {
        let next = RECLAIM.with(|pending| pending.borrow_mut().as_mut().and_then(|list| list.pop()));
        match next {
            Some(garbage) => drop(garbage),
            None => break,
        }
    }

    RECLAIM.with(|pending| *pending.borrow_mut() = None);
}

/// A shared handle to a value that settles exactly once.
///
/// Clones refer to the same promise. Continuations registered with `then`,
/// `success` and `fail` never run inside `resolve` or `reject`; they are queued
/// on the task queue of the settling thread and run by `thenable::run()` or
/// `wait()`.
pub struct Promise<T: 'static, E: 'static = Error> {
    inner: Arc<Spinlock<Slot<T, E>>>,
}

impl<T: 'static, E: 'static> Clone for Promise<T, E> {
    fn clone(&self) -> Promise<T, E> {
        Promise { inner: self.inner.clone() }
    }
}

impl<T, E> Promise<T, E>
    where T: Clone + Send + 'static,
          E: Clone + Send + 'static + From<Error>
{
    /// Create a pending promise
    pub fn new() -> Promise<T, E> {
        Promise::with_slot(Slot::Pending(Vec::new()))
    }

    pub fn fulfilled(value: T) -> Promise<T, E> {
        Promise::with_slot(Slot::Fulfilled(value))
    }

    pub fn rejected(reason: E) -> Promise<T, E> {
        Promise::with_slot(Slot::Rejected(reason))
    }

    fn with_slot(slot: Slot<T, E>) -> Promise<T, E> {
        Promise { inner: Arc::new(Spinlock::new(slot)) }
    }

    pub fn state(&self) -> State {
        match *self.inner.lock() {
            Slot::Pending(..) | Slot::Adopting(..) => State::Pending,
            Slot::Fulfilled(..) => State::Fulfilled,
            Slot::Rejected(..) => State::Rejected,
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    #[inline]
    pub fn is_fulfilled(&self) -> bool {
        self.state() == State::Fulfilled
    }

    #[inline]
    pub fn is_rejected(&self) -> bool {
        self.state() == State::Rejected
    }

    /// The outcome, if the promise is fulfilled or rejected
    pub fn peek(&self) -> Option<Result<T, E>> {
        match *self.inner.lock() {
            Slot::Fulfilled(ref value) => Some(Ok(value.clone())),
            Slot::Rejected(ref reason) => Some(Err(reason.clone())),
            _ => None,
        }
    }

    /// Reject a pending promise with `Error::Cancelled`.
    ///
    /// Settled promises, and promises already adopting another one, are left
    /// alone.
    pub fn cancel(&self) {
        if self.settle(Err(E::from(Error::Cancelled)), false) {
            debug!("Cancelled a pending promise");
        }
    }

    /// Execute one of the functions depending on how this promise settles
    pub fn then<FT, FE, RT, RE>(&self, ft: FT, fe: FE) -> Promise<T, E>
        where FT: FnOnce(T) -> Result<RT, E> + Send + 'static,
              FE: FnOnce(E) -> Result<RE, E> + Send + 'static,
              RT: Into<Resolution<T, E>>,
              RE: Into<Resolution<T, E>>
    {
        self.link(ResolutionStep::new(Promise::<T, E>::new()).on_fulfilled(ft).on_rejected(fe))
    }

    /// Execute the function if this promise is fulfilled, otherwise pass the
    /// rejection on
    pub fn success<F, R>(&self, f: F) -> Promise<T, E>
        where F: FnOnce(T) -> Result<R, E> + Send + 'static,
              R: Into<Resolution<T, E>>
    {
        self.link(ResolutionStep::new(Promise::<T, E>::new()).on_fulfilled(f))
    }

    /// Execute the function if this promise is rejected, otherwise pass the
    /// value on
    pub fn fail<F, R>(&self, f: F) -> Promise<T, E>
        where F: FnOnce(E) -> Result<R, E> + Send + 'static,
              R: Into<Resolution<T, E>>
    {
        self.link(ResolutionStep::new(Promise::<T, E>::new()).on_rejected(f))
    }

    /// Execute the function with the outcome once this promise settles
    pub fn finally<F>(&self, f: F)
        where F: FnOnce(Result<T, E>) + Send + 'static
    {
        self.subscribe(Box::new(f))
    }

    /// Run the current thread's task queue until this promise settles.
    ///
    /// Returns `Error::Unresolved` (converted into `E`) if the queue runs dry
    /// first, e.g. when the promise is settled by another thread that has not
    /// run yet, or never settled at all.
    pub fn wait(&self) -> Result<T, E> {
        loop {
            if let Some(settled) = self.peek() {
                return settled;
            }

            if queue::run() == 0 {
                break;
            }
        }

        match self.peek() {
            Some(settled) => settled,
            None => {
                debug!("Task queue ran dry while waiting on a pending promise");
                Err(E::from(Error::Unresolved))
            }
        }
    }

    fn link(&self, mut step: ResolutionStep<Promise<T, E>>) -> Promise<T, E> {
        let next = step.downstream().clone();
        self.subscribe(Box::new(move |settled| step.invoke(settled)));
        next
    }

    fn subscribe(&self, waiter: Waiter<T, E>) {
        let settled = {
            let mut slot = self.inner.lock();
            match *slot {
                Slot::Pending(ref mut waiters) | Slot::Adopting(ref mut waiters) => {
                    waiters.push(waiter);
                    return;
                }
                Slot::Fulfilled(ref value) => Ok(value.clone()),
                Slot::Rejected(ref reason) => Err(reason.clone()),
            }
        };

        queue::add(move || waiter(settled));
    }

    /// Move to a final state and queue every waiter. `adopted` is set when
    /// the outcome comes from the promise being adopted.
    fn settle(&self, settled: Result<T, E>, adopted: bool) -> bool {
        let waiters = {
            let mut slot = self.inner.lock();
            let waiters = match *slot {
                Slot::Pending(ref mut waiters) => mem::replace(waiters, Vec::new()),
                Slot::Adopting(ref mut waiters) if adopted => mem::replace(waiters, Vec::new()),
                _ => return false,
            };

            *slot = match settled {
                Ok(ref value) => Slot::Fulfilled(value.clone()),
                Err(ref reason) => Slot::Rejected(reason.clone()),
            };

            waiters
        };

        for waiter in waiters {
            let settled = settled.clone();
            queue::add(move || waiter(settled));
        }

        true
    }

    fn adopt(&self, other: Promise<T, E>) {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return self.reject(E::from(Error::SelfResolution));
        }

        if let Some(settled) = other.peek() {
            if !self.settle(settled, false) {
                trace!("Ignoring resolve of a settled promise");
            }
            return;
        }

        {
            let mut slot = self.inner.lock();
            let waiters = match *slot {
                Slot::Pending(ref mut waiters) => mem::replace(waiters, Vec::new()),
                _ => {
                    trace!("Ignoring resolve of a settled promise");
                    return;
                }
            };
            *slot = Slot::Adopting(waiters);
        }

        let target = self.clone();
        other.subscribe(Box::new(move |settled| {
            target.settle(settled, true);
        }));
    }
}

impl<T, E> PromiseLike for Promise<T, E>
    where T: Clone + Send + 'static,
          E: Clone + Send + 'static + From<Error>
{
    type Value = T;
    type Reason = E;

    fn resolve<R>(&self, value: R)
        where R: Into<Resolution<T, E>>
    {
        match value.into() {
            Resolution::Value(value) => {
                if !self.settle(Ok(value), false) {
                    trace!("Ignoring resolve of a settled promise");
                }
            }
            Resolution::Pending(other) => self.adopt(other),
        }
    }

    fn reject(&self, reason: E) {
        if !self.settle(Err(reason), false) {
            trace!("Ignoring reject of a settled promise");
        }
    }

    fn is_settled(&self) -> bool {
        match *self.inner.lock() {
            Slot::Pending(..) => false,
            _ => true,
        }
    }
}

impl<T, E> Default for Promise<T, E>
    where T: Clone + Send + 'static,
          E: Clone + Send + 'static + From<Error>
{
    fn default() -> Promise<T, E> {
        Promise::new()
    }
}

impl<T: 'static, E: 'static> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = match self.inner.try_lock() {
            Some(slot) => {
                match *slot {
                    Slot::Pending(..) => "Pending",
                    Slot::Adopting(..) => "Adopting",
                    Slot::Fulfilled(..) => "Fulfilled",
                    Slot::Rejected(..) => "Rejected",
                }
            }
            None => "<locked>",
        };

        write!(f, "Promise {{ state: {} }}", state)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum AppError {
        Lib(Error),
        NotFound(u32),
    }

    impl From<Error> for AppError {
        fn from(err: Error) -> AppError {
            AppError::Lib(err)
        }
    }

    #[test]
    fn test_promise_resolve() {
        let p = Promise::<i32>::new();
        assert_eq!(p.state(), State::Pending);
        assert!(!p.is_settled());

        p.resolve(3);
        assert!(p.is_fulfilled());
        assert!(p.is_settled());
        assert_eq!(p.wait(), Ok(3));
    }

    #[test]
    fn test_promise_first_settlement_wins() {
        let p = Promise::<i32>::new();
        p.reject(Error::custom("first"));
        p.resolve(1);
        p.reject(Error::custom("second"));

        assert_eq!(p.peek(), Some(Err(Error::custom("first"))));
    }

    #[test]
    fn test_promise_then_is_deferred() {
        let p = Promise::<i32>::fulfilled(1);
        let seen = Arc::new(Mutex::new(None));

        let next = {
            let seen = seen.clone();
            p.success(move |v| {
                *seen.lock().unwrap() = Some(v);
                Ok(v + 1)
            })
        };

        assert_eq!(*seen.lock().unwrap(), None);
        assert!(next.is_pending());

        queue::run();
        assert_eq!(*seen.lock().unwrap(), Some(1));
        assert_eq!(next.peek(), Some(Ok(2)));
    }

    #[test]
    fn test_promise_continuation_may_inspect_upstream() {
        let p = Promise::<i32>::fulfilled(1);

        let next = {
            let upstream = p.clone();
            p.success(move |v| {
                assert!(upstream.is_fulfilled());
                Ok(v + upstream.peek().and_then(|r| r.ok()).unwrap_or(0))
            })
        };

        assert_eq!(next.wait(), Ok(2));
    }

    #[test]
    fn test_promise_drop_releases_waiters() {
        struct DropCount(Arc<Mutex<usize>>);

        impl Drop for DropCount {
            fn drop(&mut self) {
                *self.0.lock().unwrap() += 1;
            }
        }

        let drops = Arc::new(Mutex::new(0));
        let root = Promise::<i32>::new();

        let mut tail = root.clone();
        for _ in 0..3 {
            let counted = DropCount(drops.clone());
            tail = tail.success(move |v| {
                let _counted = &counted;
                Ok(v)
            });
        }

        drop(tail);
        assert_eq!(*drops.lock().unwrap(), 0);

        drop(root);
        assert_eq!(*drops.lock().unwrap(), 3);
    }

    #[test]
    fn test_promise_waiters_in_registration_order() {
        let p = Promise::<i32>::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..4 {
            let order = order.clone();
            p.finally(move |_| order.lock().unwrap().push(i));
        }

        p.resolve(0);
        assert_eq!(queue::run(), 4);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_promise_adopts_pending() {
        let outer = Promise::<i32>::new();
        let inner = Promise::<i32>::new();

        outer.resolve(inner.clone());
        assert!(outer.is_settled());
        assert!(outer.is_pending());

        // Locked onto `inner`, later settlements are ignored.
        outer.resolve(10);
        outer.cancel();

        inner.resolve(5);
        assert_eq!(outer.wait(), Ok(5));
    }

    #[test]
    fn test_promise_adopts_rejection() {
        let outer = Promise::<i32>::new();
        let inner = Promise::<i32>::new();

        outer.resolve(inner.clone());
        inner.reject(Error::custom("inner"));
        assert_eq!(outer.wait(), Err(Error::custom("inner")));
    }

    #[test]
    fn test_promise_adopts_settled_immediately() {
        let outer = Promise::<i32>::new();
        outer.resolve(Promise::<i32>::fulfilled(8));

        assert_eq!(outer.peek(), Some(Ok(8)));
    }

    #[test]
    fn test_promise_continuation_returns_promise() {
        let root = Promise::<i32>::new();
        let later = Promise::<i32>::new();

        let next = {
            let later = later.clone();
            root.success(move |_| Ok(later))
        };

        root.resolve(1);
        queue::run();
        assert!(next.is_pending());

        later.resolve(42);
        assert_eq!(next.wait(), Ok(42));
    }

    #[test]
    fn test_promise_self_resolution() {
        let p = Promise::<i32>::new();
        p.resolve(p.clone());

        assert_eq!(p.peek(), Some(Err(Error::SelfResolution)));
    }

    #[test]
    fn test_promise_cancel() {
        let p = Promise::<i32>::new();
        let next = p.success(|v| Ok(v * 2));

        p.cancel();
        assert_eq!(p.peek(), Some(Err(Error::Cancelled)));
        assert_eq!(next.wait(), Err(Error::Cancelled));

        let done = Promise::<i32>::fulfilled(1);
        done.cancel();
        assert_eq!(done.peek(), Some(Ok(1)));
    }

    #[test]
    fn test_promise_cancelled_downstream_skips_continuation() {
        let root = Promise::<i32>::new();
        let called = Arc::new(Mutex::new(false));

        let next = {
            let called = called.clone();
            root.success(move |v| {
                *called.lock().unwrap() = true;
                Ok(v)
            })
        };

        next.cancel();
        root.resolve(1);
        queue::run();

        assert!(!*called.lock().unwrap());
        assert_eq!(next.peek(), Some(Err(Error::Cancelled)));
    }

    #[test]
    fn test_promise_wait_unresolved() {
        let p = Promise::<i32>::new();
        assert_eq!(p.wait(), Err(Error::Unresolved));
    }

    #[test]
    fn test_promise_then_both_branches() {
        let ok = Promise::<i32>::fulfilled(2).then(|v| Ok(v + 1), |_| Ok(-1));
        let err = Promise::<i32>::rejected(Error::custom("x")).then(|v| Ok(v + 1), |_| Ok(-1));

        assert_eq!(ok.wait(), Ok(3));
        assert_eq!(err.wait(), Ok(-1));
    }

    #[test]
    fn test_promise_custom_reason() {
        let p = Promise::<u32, AppError>::new();
        let next = p.success(|id| -> Result<u32, AppError> { Err(AppError::NotFound(id)) })
                    .fail(|err| match err {
                        AppError::NotFound(id) => Ok(id + 100),
                        other => Err(other),
                    });

        p.resolve(7);
        assert_eq!(next.wait(), Ok(107));

        let boom = Promise::<u32, AppError>::fulfilled(1)
            .success(|_| -> Result<u32, AppError> { panic!("bad state") });
        assert_eq!(boom.wait(),
                   Err(AppError::Lib(Error::Panicked("bad state".to_owned()))));
    }

    #[test]
    fn test_promise_finally() {
        let seen = Arc::new(Mutex::new(None));

        {
            let seen = seen.clone();
            Promise::<i32>::rejected(Error::Cancelled)
                .finally(move |res| *seen.lock().unwrap() = Some(res));
        }

        queue::run();
        assert_eq!(*seen.lock().unwrap(), Some(Err(Error::Cancelled)));
    }

    #[test]
    fn test_promise_debug() {
        let p = Promise::<i32>::new();
        assert_eq!(format!("{:?}", p), "Promise { state: Pending }");
        p.resolve(Promise::<i32>::new());
        assert_eq!(format!("{:?}", p), "Promise { state: Adopting }");
    }
}
