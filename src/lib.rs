// The MIT License (MIT)

// Copyright (c) 2015 Y. T. Chung <zonyitoo@gmail.com>

//  Permission is hereby granted, free of charge, to any person obtaining a
//  copy of this software and associated documentation files (the "Software"),
//  to deal in the Software without restriction, including without limitation
//  the rights to use, copy, modify, merge, publish, distribute, sublicense,
//  and/or sell copies of the Software, and to permit persons to whom the
//  Software is furnished to do so, subject to the following conditions:
//
//  The above copyright notice and this permission notice shall be included in
//  all copies or substantial portions of the Software.
//
//  THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
//  OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//  FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//  AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//  LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
//  FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
//  DEALINGS IN THE SOFTWARE.

//! Promise chaining with exactly-once continuations
//!
//! ```
//! use thenable::{Promise, PromiseLike};
//!
//! let p = Promise::<i32>::new();
//! let doubled = p.success(|v| Ok(v * 2));
//!
//! p.resolve(21);
//! assert_eq!(doubled.wait(), Ok(42));
//! ```

#[macro_use]
extern crate log;

pub use crate::error::Error;
pub use crate::options::Options;
pub use crate::promise::{Promise, Resolution, State};
pub use crate::step::{Branch, PromiseLike, ResolutionStep};

pub mod error;
pub mod options;
pub mod promise;
pub mod queue;
pub mod step;
pub mod sync;

/// Run the current thread's queued continuations
///
/// Returns the number of tasks that ran.
#[inline(always)]
pub fn run() -> usize {
    queue::run()
}

/// Configure the current thread's task queue
#[inline]
pub fn configure(opts: Options) {
    queue::configure(opts)
}
