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

//! The public coroutine API: create, free, and the handful of ways a
//! coroutine or main can yield control to one another. See `crate::sync`
//! for mutexes and condition variables built on top of these, and
//! `crate::pthread` for the POSIX-threads-shaped facade over all of it.

pub use crate::record::{Coroutine, Executor, State};

use crate::config;
use crate::ctx;
use crate::fatal;
use crate::record::CoroutineInner;
use crate::scheduler;
use std::cell::{Cell, RefCell};

/// Create a coroutine with the default stack size. It is enqueued `Stopped`
/// and runs for the first time whenever the scheduler next reaches it --
/// this call never swaps.
pub fn create<F>(f: F) -> Coroutine
where
    F: FnOnce() + 'static,
{
    create_with(f, config::DEFAULT_STACK_SIZE, None)
}

pub(crate) fn create_with<F>(f: F, stack_size: usize, name: Option<String>) -> Coroutine
where
    F: FnOnce() + 'static,
{
    let stack = ctx::allocate_stack(stack_size)
        .unwrap_or_else(|e| fatal(&format!("failed to allocate coroutine stack: {:?}", e)));
    let context = ctx::new_context(&stack, scheduler::trampoline);
    let inner = CoroutineInner {
        context: Cell::new(Some(context)),
        stack: RefCell::new(Some(stack)),
        entry: Cell::new(Some(Box::new(f))),
        state: Cell::new(State::Stopped),
        next: Cell::new(None),
        linked: Cell::new(false),
        resumed_by: Cell::new(None),
        name,
        panic: Cell::new(None),
    };
    let handle = Coroutine::from_inner(inner);
    log::trace!("create: {:?}", handle.name().unwrap_or("<unnamed>"));
    scheduler::spawn(handle);
    handle
}

/// Release a coroutine's stack and record.
///
/// Fatal if `handle` is not `Exited` or `Stopped` -- freeing a coroutine
/// that might still be scheduled would leave a dangling entry in whichever
/// list it belongs to. If the coroutine's entry closure panicked, the
/// panic is logged here rather than re-raised in the caller.
pub fn free(handle: Coroutine) {
    match handle.state() {
        State::Exited | State::Stopped => {}
        other => fatal(&format!(
            "free() called on a coroutine in state {:?}; expected Exited or Stopped",
            other
        )),
    }
    log::trace!("free: {:?}", handle.name().unwrap_or("<unnamed>"));
    let inner = unsafe { Box::from_raw(handle.0.as_ptr()) };
    if let Some(payload) = inner.panic.into_inner() {
        let message = panic_message(&payload);
        log::error!(
            "dropping coroutine {:?} that panicked: {}",
            inner.name.as_deref().unwrap_or("<unnamed>"),
            message
        );
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Who is presently executing.
pub fn current() -> Executor {
    scheduler::current()
}

/// Give up the CPU. A non-main caller becomes eligible to be resumed again
/// by main (in its `Yield` state) or, once main has looked away at least
/// once, by the next coroutine that runs a normal scheduling pass; main
/// itself simply hands control to the run queue's head, same as any other
/// main-originated dispatch. Returns whether a swap actually happened --
/// `false` means there was nothing else runnable, and the caller kept
/// running.
pub fn yield_now() -> bool {
    scheduler::yield_now()
}

/// Non-main only: swap directly to main, bypassing the run queue. Returns
/// `false` without swapping if main is currently inside [`wait`], since it
/// will reach the run queue on its own soon enough.
pub fn yield_to_main() -> bool {
    scheduler::yield_to_main()
}

/// Main only: block until `target` exits, repeatedly giving the rest of
/// the run queue a turn via ordinary dispatch. Fatal if called from a
/// non-main coroutine; non-main code that wants to wait for a peer should
/// use [`yield_now`] in a loop, or synchronize through `crate::sync`.
pub fn wait(target: Coroutine) {
    scheduler::wait(target)
}

/// Mark the caller `Ready`, enqueue it, and swap directly to `target`,
/// skipping the ordinary dispatch rules. Used to resume a specific
/// coroutine known to be waiting on something external to the scheduler.
pub fn wakeup(target: Coroutine) {
    scheduler::wakeup(target)
}
