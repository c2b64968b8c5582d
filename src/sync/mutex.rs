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

//! A mutex whose contended path parks the caller in an intrusive wait list
//! instead of spinning -- there is nothing else to spin against on a single
//! OS thread. `unlock` hands ownership directly to the oldest waiter, so a
//! coroutine resumed off this wait list never finds the lock already taken
//! by someone else.

use std::cell::{Cell, RefCell, UnsafeCell};
use std::ops::{Deref, DerefMut};

use crate::error::{CrtError, Result};
use crate::record::{Coroutine, State};
use crate::runqueue::RunQueue;
use crate::scheduler;

/// The bare lock: a holder slot and a wait list. No payload -- this is what
/// the pthread facade's mutex slot table stores one of per `pthread_mutex_t`.
/// [`Mutex<T>`] wraps one of these together with the data it protects.
pub struct RawMutex {
    owner: Cell<Option<Coroutine>>,
    wait_list: RefCell<RunQueue>,
}

impl RawMutex {
    pub fn new() -> RawMutex {
        RawMutex {
            owner: Cell::new(None),
            wait_list: RefCell::new(RunQueue::new()),
        }
    }

    /// Whether the lock is currently held, and by whom.
    pub(crate) fn owner(&self) -> Option<Coroutine> {
        self.owner.get()
    }

    /// Block until the lock is acquired.
    ///
    /// From main: if held, wake the holder and retry -- main never parks,
    /// since nothing else would ever resume it. From a non-main coroutine:
    /// join the wait list (state `Locked`) and swap straight to main;
    /// `unlock`'s hand-off guarantees ownership by the time control returns.
    pub fn lock(&self) {
        loop {
            if self.owner.get().is_none() {
                let me = scheduler::current_handle();
                self.owner.set(Some(me));
                log::trace!("mutex: {:?} acquired uncontended", me.name().unwrap_or("<unnamed>"));
                return;
            }
            let me = scheduler::current_handle();
            if scheduler::is_main(me) {
                let holder = self.owner.get().expect("checked Some above");
                log::trace!("mutex: main waking holder {:?} to retry", holder.name().unwrap_or("<unnamed>"));
                scheduler::wakeup(holder);
                continue;
            }
            log::debug!("mutex: {:?} parking, contended", me.name().unwrap_or("<unnamed>"));
            me.inner().state.set(State::Locked);
            self.wait_list.borrow_mut().push_back(me);
            scheduler::park_on_main();
            debug_assert_eq!(
                self.owner.get(),
                Some(me),
                "mutex lock: woke up without being handed ownership"
            );
            log::debug!("mutex: {:?} acquired after parking", me.name().unwrap_or("<unnamed>"));
            return;
        }
    }

    /// Acquire the lock only if it is currently free.
    pub fn try_lock(&self) -> bool {
        if self.owner.get().is_none() {
            self.owner.set(Some(scheduler::current_handle()));
            true
        } else {
            false
        }
    }

    /// Release the lock. Fails with [`CrtError::InvalidArgument`] if the
    /// lock is not currently held. If a coroutine is waiting, ownership
    /// passes directly to the oldest one: it becomes the new owner before
    /// it is marked `Ready` and enqueued, so it can never observe the lock
    /// as both unheld and unavailable to it.
    pub fn unlock(&self) -> Result<()> {
        if self.owner.get().is_none() {
            return Err(CrtError::InvalidArgument);
        }
        self.owner.set(None);
        if let Some(next) = self.wait_list.borrow_mut().pop_front() {
            log::trace!("mutex: handing off to {:?}", next.name().unwrap_or("<unnamed>"));
            self.owner.set(Some(next));
            next.inner().state.set(State::Ready);
            scheduler::push_ready(next);
        }
        Ok(())
    }
}

impl Default for RawMutex {
    fn default() -> RawMutex {
        RawMutex::new()
    }
}

/// A mutex guarding a `T`, in the style of `std::sync::Mutex` but scoped to
/// a single OS thread's coroutines.
pub struct Mutex<T> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

impl<T> Mutex<T> {
    pub fn new(data: T) -> Mutex<T> {
        Mutex {
            raw: RawMutex::new(),
            data: UnsafeCell::new(data),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    pub(crate) fn raw(&self) -> &RawMutex {
        &self.raw
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw.lock();
        MutexGuard { mutex: self }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.raw.try_lock() {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }
}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> MutexGuard<'a, T> {
    pub(crate) fn mutex(&self) -> &'a Mutex<T> {
        self.mutex
    }
}

impl<'a, T> Deref for MutexGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T> DerefMut for MutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<'a, T> Drop for MutexGuard<'a, T> {
    fn drop(&mut self) {
        self.mutex
            .raw
            .unlock()
            .expect("MutexGuard dropped without holding the lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncontended_lock_unlock_round_trips() {
        let m = Mutex::new(0);
        {
            let mut g = m.lock();
            *g += 1;
        }
        assert_eq!(*m.lock(), 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let m = Mutex::new(());
        let g = m.lock();
        assert!(m.try_lock().is_none());
        drop(g);
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn unlock_without_holding_is_an_error() {
        let raw = RawMutex::new();
        assert_eq!(raw.unlock(), Err(CrtError::InvalidArgument));
    }
}
