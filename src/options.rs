// Copyright 2015 The coio Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Task queue options

use std::default::Default;

/// Task queue options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub name: Option<String>,
    pub capacity: usize,
    /// Maximum number of tasks a single `run()` executes, `None` drains the queue
    pub run_limit: Option<usize>,
}

/// Default initial queue capacity
pub const DEFAULT_CAPACITY: usize = 64;

impl Options {
    pub fn new() -> Options {
        Options {
            name: None,
            capacity: DEFAULT_CAPACITY,
            run_limit: None,
        }
    }

    pub fn name(&mut self, name: String) -> &mut Options {
        self.name = Some(name);
        self
    }

    pub fn capacity(&mut self, capacity: usize) -> &mut Options {
        self.capacity = capacity;
        self
    }

    /// Bound the tasks executed per `run()`; 0 removes the bound
    pub fn run_limit(&mut self, limit: usize) -> &mut Options {
        self.run_limit = match limit {
            0 => None,
            limit => Some(limit),
        };
        self
    }
}

impl Default for Options {
    fn default() -> Options {
        Options::new()
    }
}
