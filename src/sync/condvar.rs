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

//! A condition variable coupled to a [`Mutex`] at each `wait` call, not
//! permanently -- the same condvar can be used with different mutexes
//! across calls, just like `std::sync::Condvar`.
//!
//! `wait` releases the mutex before parking and reacquires it with a
//! blocking `lock()` after being woken, rather than assuming `signal`/
//! `broadcast` already handed the mutex off. See DESIGN.md for why: the
//! alternative (signal performs the hand-off itself) needs every wait-list
//! entry to remember which mutex it was parked against, since `signal`
//! takes no mutex argument; re-acquiring with a blocking lock sidesteps
//! that bookkeeping at the cost of one extra contended-lock pass when the
//! mutex is still held by someone else at wakeup time.

use std::cell::RefCell;

use crate::error::Result;
use crate::record::{Coroutine, State};
use crate::runqueue::RunQueue;
use crate::scheduler;
use crate::sync::mutex::{Mutex, MutexGuard, RawMutex};

pub struct Condvar {
    wait_list: RefCell<RunQueue>,
}

impl Condvar {
    pub fn new() -> Condvar {
        Condvar {
            wait_list: RefCell::new(RunQueue::new()),
        }
    }

    /// Release `mutex`, park until woken by [`signal`](Condvar::signal) or
    /// [`broadcast`](Condvar::broadcast), then reacquire it. Returns the
    /// same guard back, rebound to this call's borrow.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = guard.mutex();
        self.wait_raw(mutex.raw())
            .expect("condvar wait: caller did not hold the mutex");
        std::mem::forget(guard);
        mutex.lock()
    }

    pub(crate) fn wait_raw(&self, mutex: &RawMutex) -> Result<()> {
        let me = scheduler::current_handle();
        if mutex.owner() != Some(me) {
            return Err(crate::error::CrtError::InvalidArgument);
        }
        log::debug!("condvar: {:?} waiting", me.name().unwrap_or("<unnamed>"));
        me.inner().state.set(State::Locked);
        self.wait_list.borrow_mut().push_back(me);
        mutex.unlock().expect("checked ownership above");
        // Main can reach a condvar wait just like any other coroutine (e.g.
        // through the pthread facade's `cond_wait`), but it can't be parked
        // on the run queue the way a non-main waiter is: there is nowhere
        // else for main to be switched *from* into. It parks itself instead
        // and is released directly, out of band from the run queue.
        if scheduler::is_main(me) {
            scheduler::park_self_until_ready();
        } else {
            scheduler::park_on_main();
        }
        log::debug!("condvar: {:?} woke", me.name().unwrap_or("<unnamed>"));
        Ok(())
    }

    /// Wake the oldest waiter, if any. A no-op on an empty wait list.
    pub fn signal(&self) {
        if let Some(w) = self.wait_list.borrow_mut().pop_front() {
            log::trace!("condvar: signaling {:?}", w.name().unwrap_or("<unnamed>"));
            wake(w);
        }
    }

    /// Wake every waiter. Captures the full wait list up front so that,
    /// unlike the original's shrinking-counter loop, every waiter present
    /// at the moment of the call is actually woken.
    pub fn broadcast(&self) {
        for w in self.wait_list.borrow_mut().drain() {
            log::trace!("condvar: broadcasting to {:?}", w.name().unwrap_or("<unnamed>"));
            wake(w);
        }
    }
}

/// Hand a waiter back its turn. Main is parked outside the run queue (see
/// `wait_raw`), so waking it means releasing that park directly rather than
/// enqueuing it like an ordinary coroutine.
fn wake(w: Coroutine) {
    if scheduler::is_main(w) {
        scheduler::release_parked_main();
    } else {
        w.inner().state.set(State::Ready);
        scheduler::push_ready(w);
    }
}

impl Default for Condvar {
    fn default() -> Condvar {
        Condvar::new()
    }
}
