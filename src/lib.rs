// Copyright 2013 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A single-threaded, cooperative coroutine scheduler, plus a `pthread_*`
//! façade built on top of it.
//!
//! # The model
//!
//! Every OS thread that touches this crate gets its own scheduler, reached
//! through thread-local storage; nothing here is `Send` or `Sync`, and a
//! [`Coroutine`] handle created on one thread must never be touched from
//! another. Exactly one coroutine is ever `Running` at a time. One of them
//! is distinguished as "main" -- it runs on the host thread's own stack,
//! rather than one this crate allocates -- and is scheduled by a different
//! rule than everyone else: see [`coroutine::yield_now`] and
//! [`coroutine::wait`] for the asymmetry this produces.
//!
//! A coroutine record moves through a small state machine as it is
//! scheduled, parked, and resumed:
//!
//! ```text
//! Stopped --(first schedule)--> Running --(returns)--> Exited
//!              ^                  |  ^
//!              |                  |  |
//!      (enqueued on create)   yield  wakeup
//!              |                  |  |
//!              +-------------- Ready <---- Yield
//!                                 ^
//!                                 |
//!                        (mutex/condvar hand-off)
//!                                 |
//!                              Locked (in a wait list, never the run queue)
//! ```
//!
//! [`sync::Mutex`] and [`sync::Condvar`] are layered directly on the
//! scheduler's primitives rather than on any OS-level synchronization --
//! there is nothing to synchronize against when only one coroutine ever
//! runs at a time on a given thread. [`pthread`] maps a `pthread_*`-shaped
//! surface onto all of the above, for porting code written against a
//! POSIX-threads subset.
//!
//! # Suspension points
//!
//! Control only ever passes between coroutines at [`coroutine::yield_now`],
//! [`coroutine::yield_to_main`], [`coroutine::wait`], [`coroutine::wakeup`],
//! a contended blocking [`sync::Mutex::lock`], and [`sync::Condvar::wait`].
//! Every other operation in this crate -- creating or freeing a coroutine,
//! unlocking an uncontended mutex, signalling or broadcasting a condition
//! variable, a trylock on a free mutex -- runs to completion without ever
//! handing control to another coroutine.

mod config;
mod ctx;
mod error;
mod record;
mod runqueue;
mod scheduler;

pub mod builder;
pub mod coroutine;
pub mod pthread;
pub mod sync;

pub use builder::Builder;
pub use config::{DEFAULT_STACK_SIZE, MAX_COND_SLOTS, MAX_MUTEX_SLOTS};
pub use coroutine::{create, current, free, wait, wakeup, yield_now, yield_to_main, Coroutine, Executor, State};
pub use error::{CrtError, Result};

/// Spawn a coroutine with the default stack size.
///
/// Equivalent to `Builder::new().spawn(f)`.
pub fn spawn<F>(f: F) -> Coroutine
where
    F: FnOnce() + 'static,
{
    Builder::new().spawn(f)
}

/// Log a diagnostic and terminate the process.
///
/// Reserved for violations of the main/non-main scheduling discipline and
/// for failures of the underlying context/stack primitive -- conditions
/// this crate treats as programmer bugs, never as recoverable
/// [`CrtError`]s. Mirrors the host library's own `fault()`/`fatal()`
/// convention: callers write `fatal(...)` in tail position and rely on it
/// never returning.
pub(crate) fn fatal(msg: &str) -> ! {
    log::error!("fatal: {}", msg);
    std::process::abort()
}

#[cfg(test)]
mod tests;
