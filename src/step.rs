// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Forwarding one settlement into a dependent promise

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::error::Error;
use crate::promise::Resolution;

/// The settlement side of a promise, as seen by a `ResolutionStep`
pub trait PromiseLike {
    type Value: 'static;
    type Reason: 'static;

    /// Settle with a value, or adopt the outcome of a pending promise.
    /// Does nothing once settled.
    fn resolve<R>(&self, value: R)
        where R: Into<Resolution<Self::Value, Self::Reason>>;

    /// Settle with a failure reason. Does nothing once settled.
    fn reject(&self, reason: Self::Reason);

    /// Whether `resolve` or `reject` already took effect, including adoption
    /// of another promise and cancellation.
    fn is_settled(&self) -> bool;
}

/// Which way the upstream promise settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Fulfilled,
    Rejected,
}

impl Branch {
    pub fn of<T, E>(settled: &Result<T, E>) -> Branch {
        match *settled {
            Ok(..) => Branch::Fulfilled,
            Err(..) => Branch::Rejected,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Branch::Fulfilled => write!(f, "fulfilled"),
            Branch::Rejected => write!(f, "rejected"),
        }
    }
}

/// A single-use continuation taking `A` and producing the next settlement
pub type Continuation<A, T, E> = Box<dyn FnOnce(A) -> Result<Resolution<T, E>, E> + Send + 'static>;

/// Binds a downstream promise to the continuations registered by one
/// `.then()`-style call.
///
/// The step is consumed by its first `invoke`. Its outcome always ends up in
/// the downstream promise: a returned value resolves it, a returned error or
/// a panic rejects it, and a missing continuation passes the upstream value
/// or reason through unchanged.
pub struct ResolutionStep<P: PromiseLike> {
    downstream: P,
    on_fulfilled: Option<Continuation<P::Value, P::Value, P::Reason>>,
    on_rejected: Option<Continuation<P::Reason, P::Value, P::Reason>>,
}

impl<P: PromiseLike> ResolutionStep<P> {
    /// A step without continuations, forwarding both branches as they are
    pub fn new(downstream: P) -> ResolutionStep<P> {
        ResolutionStep {
            downstream: downstream,
            on_fulfilled: None,
            on_rejected: None,
        }
    }

    pub fn on_fulfilled<F, R>(mut self, f: F) -> ResolutionStep<P>
        where F: FnOnce(P::Value) -> Result<R, P::Reason> + Send + 'static,
              R: Into<Resolution<P::Value, P::Reason>>
    {
        self.on_fulfilled = Some(Box::new(move |value| f(value).map(Into::into)));
        self
    }

    pub fn on_rejected<F, R>(mut self, f: F) -> ResolutionStep<P>
        where F: FnOnce(P::Reason) -> Result<R, P::Reason> + Send + 'static,
              R: Into<Resolution<P::Value, P::Reason>>
    {
        self.on_rejected = Some(Box::new(move |reason| f(reason).map(Into::into)));
        self
    }

    pub fn downstream(&self) -> &P {
        &self.downstream
    }

    /// Whether `invoke` already ran a continuation out of this step
    pub fn is_consumed(&self) -> bool {
        self.on_fulfilled.is_none() && self.on_rejected.is_none()
    }
}

impl<P> ResolutionStep<P>
    where P: PromiseLike,
          P::Reason: From<Error>
{
    /// Forward the upstream settlement into the downstream promise.
    ///
    /// Called by the task queue once per upstream settlement. Never panics on
    /// behalf of a continuation.
    pub fn invoke(&mut self, settled: Result<P::Value, P::Reason>) {
        let branch = Branch::of(&settled);

        // Settled or cancelled through another path before this task ran.
        if self.downstream.is_settled() {
            trace!("Skipping {} continuation, downstream already settled", branch);
            return;
        }

        // Release both slots before running user code. A continuation that
        // captures its own chain must not find itself still stored here.
        let on_fulfilled = self.on_fulfilled.take();
        let on_rejected = self.on_rejected.take();

        let outcome = match settled {
            Ok(value) => {
                drop(on_rejected);
                match on_fulfilled {
                    Some(f) => guarded(f, value),
                    None => return self.downstream.resolve(Resolution::Value(value)),
                }
            }
            Err(reason) => {
                drop(on_fulfilled);
                match on_rejected {
                    Some(f) => guarded(f, reason),
                    None => return self.downstream.reject(reason),
                }
            }
        };

        match outcome {
            Ok(resolution) => self.downstream.resolve(resolution),
            Err(reason) => self.downstream.reject(reason),
        }
    }
}

impl<P: PromiseLike + fmt::Debug> fmt::Debug for ResolutionStep<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResolutionStep")
         .field("downstream", &self.downstream)
         .field("on_fulfilled", &self.on_fulfilled.is_some())
         .field("on_rejected", &self.on_rejected.is_some())
         .finish()
    }
}

fn guarded<A, T, E>(f: Continuation<A, T, E>, arg: A) -> Result<Resolution<T, E>, E>
    where T: 'static,
          E: From<Error> + 'static
{
    match panic::catch_unwind(AssertUnwindSafe(move || f(arg))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let err = Error::from_panic(payload);
            debug!("Continuation panicked, rejecting downstream: {}", err);
            Err(E::from(err))
        }
    }
}
