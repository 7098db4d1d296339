// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Rejection reasons produced by the library itself

use std::any::Any;

use thiserror::Error;

/// Reasons a promise is rejected without a user supplied value.
///
/// This is also the default reason type of `Promise`. Custom reason types take
/// part in chaining by implementing `From<Error>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A continuation panicked; carries the panic message.
    #[error("continuation panicked: {0}")]
    Panicked(String),

    #[error("promise was cancelled")]
    Cancelled,

    #[error("a promise cannot be resolved with itself")]
    SelfResolution,

    /// `wait()` drained the task queue and the promise was still unsettled.
    #[error("promise is still unsettled after the task queue ran dry")]
    Unresolved,

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom<S: Into<String>>(msg: S) -> Error {
        Error::Custom(msg.into())
    }

    /// Convert the payload returned by `std::panic::catch_unwind`
    pub fn from_panic(payload: Box<dyn Any + Send + 'static>) -> Error {
        let msg = match payload.downcast::<&'static str>() {
            Ok(s) => (*s).to_owned(),
            Err(payload) => match payload.downcast::<String>() {
                Ok(s) => *s,
                Err(_) => "Box<Any>".to_owned(),
            },
        };

        Error::Panicked(msg)
    }
}
