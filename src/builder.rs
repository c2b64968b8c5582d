// The MIT License (MIT)

// Copyright (c) 2015 Rustcc Developers

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
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Configuration for a coroutine-to-be: name and stack size, chained the
//! same way `std::thread::Builder` works.

use crate::config;
use crate::coroutine::{self, Coroutine};

/// Builds a coroutine with a non-default stack size and/or a debug name.
///
/// ```ignore
/// let handle = Builder::new()
///     .name("worker-0".to_string())
///     .stack_size(16 * 1024)
///     .spawn(|| println!("hello from a coroutine"));
/// ```
pub struct Builder {
    stack_size: usize,
    name: Option<String>,
}

impl Builder {
    /// Generate the base configuration for spawning a coroutine, from which
    /// configuration methods can be chained.
    pub fn new() -> Builder {
        Builder {
            stack_size: config::DEFAULT_STACK_SIZE,
            name: None,
        }
    }

    /// Name the coroutine-to-be. Currently used for identification only in
    /// panic and log messages.
    pub fn name(mut self, name: String) -> Builder {
        self.name = Some(name);
        self
    }

    /// Set the size of the stack for the new coroutine.
    pub fn stack_size(mut self, size: usize) -> Builder {
        self.stack_size = size;
        self
    }

    /// Spawn a new coroutine, and return a handle for it.
    pub fn spawn<F>(self, f: F) -> Coroutine
    where
        F: FnOnce() + 'static,
    {
        coroutine::create_with(f, self.stack_size, self.name)
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_builder_spawns_with_requested_stack() {
        let handle = Builder::new()
            .name("test-coroutine".to_string())
            .stack_size(32 * 1024)
            .spawn(|| {});
        assert_eq!(handle.name(), Some("test-coroutine"));
        coroutine::wait(handle);
        coroutine::free(handle);
    }
}
