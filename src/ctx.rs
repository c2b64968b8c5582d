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

//! The seam between this crate and the host machine-context facility.
//!
//! Everything that knows about registers, stack pointers, or per-architecture
//! calling conventions lives behind the `context` crate; this module is the
//! only place that touches it, so swapping the backend later is a one-file
//! change. This replaces the hand-written `.S` assembly and `build.rs`
//! compile step the original carried per architecture.

use context::stack::{ProtectedFixedSizeStack, Stack as _, StackError};
use context::{Context, Transfer};

/// A coroutine's guarded stack.
pub type CoroutineStack = ProtectedFixedSizeStack;

/// Allocate a guarded stack of the given size.
///
/// A failure here (the platform refused the mmap/mprotect calls) is a
/// stack-primitive failure, and per this crate's error taxonomy that's
/// programmer-fatal rather than a recoverable condition -- `coroutine::create`
/// calls `crate::fatal` on it instead of returning a `CrtError`.
pub fn allocate_stack(size: usize) -> Result<CoroutineStack, StackError> {
    ProtectedFixedSizeStack::new(size)
}

/// Build a context that begins executing `entry` the first time it is resumed.
pub fn new_context(stack: &CoroutineStack, entry: extern "C" fn(Transfer) -> !) -> Context {
    unsafe { Context::new(stack, entry) }
}

/// Atomically save the current machine context and resume `target`, carrying
/// `data` across the switch. Returns once some later swap resumes us again.
pub fn swap(target: Context, data: usize) -> Transfer {
    unsafe { target.resume(data) }
}
