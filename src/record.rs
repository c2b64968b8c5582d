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

//! The coroutine record: stack, machine context, entry closure, and the
//! single linkage field that threads it through whichever list currently
//! owns it (run queue, mutex wait list, or condvar wait list -- never more
//! than one at a time).

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use context::Context;

use crate::ctx::CoroutineStack;

/// A coroutine's position in its lifecycle. See the module-level
/// documentation of `lib.rs` for the full state diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Freshly created, enqueued, never yet scheduled.
    Stopped,
    /// In the run queue, eligible to be picked by any scheduler.
    Ready,
    /// Has nothing to do right now; only the main coroutine may resume it.
    Yield,
    /// Currently executing.
    Running,
    /// Blocked in a mutex or condition-variable wait list.
    Locked,
    /// Entry closure has returned (or panicked); eligible to be freed.
    Exited,
}

/// Who is presently executing: the distinguished main coroutine, or one of
/// the spawned coroutines. Chosen over a nullable "current" pointer (see
/// DESIGN.md) so the scheduler has no null-pointer-shaped state at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    Main,
    Coroutine(Coroutine),
}

pub(crate) struct CoroutineInner {
    pub(crate) context: Cell<Option<Context>>,
    pub(crate) stack: RefCell<Option<CoroutineStack>>,
    pub(crate) entry: Cell<Option<Box<dyn FnOnce()>>>,
    pub(crate) state: Cell<State>,
    pub(crate) next: Cell<Option<Coroutine>>,
    pub(crate) linked: Cell<bool>,
    /// Whoever most recently swapped into this record. Read when the entry
    /// closure returns, so the trampoline knows who to swap back to without
    /// threading that information through every intermediate yield.
    pub(crate) resumed_by: Cell<Option<Coroutine>>,
    pub(crate) name: Option<String>,
    pub(crate) panic: Cell<Option<Box<dyn Any + Send + 'static>>>,
}

impl CoroutineInner {
    pub(crate) fn main() -> CoroutineInner {
        CoroutineInner {
            context: Cell::new(None),
            stack: RefCell::new(None),
            entry: Cell::new(None),
            state: Cell::new(State::Running),
            next: Cell::new(None),
            linked: Cell::new(false),
            resumed_by: Cell::new(None),
            name: Some("<main>".to_string()),
            panic: Cell::new(None),
        }
    }
}

/// A handle to a coroutine record.
///
/// This is a thin, `Copy` pointer-like value -- creating one does not take
/// ownership of the record the way a `Box` would. The creator of a
/// coroutine is responsible for calling [`crate::coroutine::free`] once the
/// coroutine has exited; there is no `Drop` impl here that would do it
/// implicitly.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coroutine(pub(crate) NonNull<CoroutineInner>);

impl Coroutine {
    pub(crate) fn inner(&self) -> &CoroutineInner {
        unsafe { self.0.as_ref() }
    }

    /// The debug name given to this coroutine at creation time, if any.
    pub fn name(&self) -> Option<&str> {
        self.inner().name.as_deref()
    }

    /// The coroutine's current scheduling state.
    pub fn state(&self) -> State {
        self.inner().state.get()
    }
}

impl std::fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Coroutine")
            .field("ptr", &self.0.as_ptr())
            .field("state", &self.state())
            .field("name", &self.name())
            .finish()
    }
}
