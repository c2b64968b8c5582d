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

//! A `pthread_*`-shaped compatibility façade over the coroutine scheduler.
//!
//! Every "thread" this module creates is a coroutine cooperating inside the
//! single real OS thread that calls into this module; unmodified code
//! written against a `pthread_create`/`pthread_mutex_*`/`pthread_cond_*`
//! subset runs unchanged as long as it never blocks in a way that only a
//! preemptible OS thread could recover from (see `crate` docs for the
//! suspension points this implies).
//!
//! `pthread_mutex_t`/`pthread_cond_t` are modeled here as a `usize` word:
//! zero means "uninitialized, matches the all-zero `PTHREAD_*_INITIALIZER`
//! static pattern", and the first lock/wait/signal/broadcast call lazily
//! allocates a slot in a fixed-capacity table and stores `index + 1` back
//! into the handle. This is a deliberate simplification over binary
//! compatibility with libc's opaque (and platform-dependent) struct layout
//! -- see DESIGN.md -- the names and call semantics are what's preserved.

use std::cell::RefCell;
use std::rc::Rc;

use libc::{c_int, c_void};

use crate::builder::Builder;
use crate::config::{MAX_COND_SLOTS, MAX_MUTEX_SLOTS};
use crate::coroutine::{self, Coroutine};
use crate::error::{to_errno, CrtError};
use crate::record::State;
use crate::scheduler;
use crate::sync::{Condvar, RawMutex};

/// Opaque thread handle, analogous to `pthread_t`. Assigned monotonically;
/// never reused, so a stale handle reliably misses the table instead of
/// aliasing a later thread.
pub type PthreadT = u64;

/// Opaque mutex handle, analogous to `pthread_mutex_t`. Zero is
/// "uninitialized"; see the module documentation.
pub type PthreadMutexT = usize;

/// Opaque condition-variable handle, analogous to `pthread_cond_t`.
pub type PthreadCondT = usize;

/// The all-zero static-initializer value for a lazily-allocated mutex,
/// mirroring `PTHREAD_MUTEX_INITIALIZER`.
pub const PTHREAD_MUTEX_INITIALIZER: PthreadMutexT = 0;

/// The all-zero static-initializer value for a lazily-allocated condition
/// variable, mirroring `PTHREAD_COND_INITIALIZER`.
pub const PTHREAD_COND_INITIALIZER: PthreadCondT = 0;

/// Signature of a `pthread_create` entry point.
pub type StartRoutine = extern "C" fn(*mut c_void) -> *mut c_void;

struct ThreadEntry {
    id: PthreadT,
    handle: Coroutine,
    retval: Rc<RefCell<*mut c_void>>,
}

#[derive(Default)]
struct Facade {
    next_id: std::cell::Cell<PthreadT>,
    threads: RefCell<Vec<ThreadEntry>>,
    mutexes: RefCell<Vec<Option<Box<RawMutex>>>>,
    conds: RefCell<Vec<Option<Box<Condvar>>>>,
}

thread_local! {
    static FACADE: Facade = Facade::default();
}

fn next_thread_id() -> PthreadT {
    FACADE.with(|f| {
        let id = f.next_id.get() + 1;
        f.next_id.set(id);
        id
    })
}

/// Allocate (or reuse) the mutex slot named by `*handle`, returning a
/// pointer stable for the lifetime of the slot. The table borrow is
/// released before the caller dereferences the pointer, since the
/// subsequent lock attempt may suspend the calling coroutine and hand this
/// OS thread to another one that touches the very same table.
unsafe fn mutex_slot(handle: *mut PthreadMutexT) -> Result<*const RawMutex, c_int> {
    let word = *handle;
    if word != 0 {
        return FACADE.with(|f| {
            let slots = f.mutexes.borrow();
            match slots.get(word - 1).and_then(|s| s.as_deref()) {
                Some(m) => Ok(m as *const RawMutex),
                None => Err(to_errno(CrtError::NoSuchEntity)),
            }
        });
    }
    FACADE.with(|f| {
        let mut slots = f.mutexes.borrow_mut();
        let idx = match slots.iter().position(|s| s.is_none()) {
            Some(idx) => idx,
            None if slots.len() < MAX_MUTEX_SLOTS => {
                slots.push(None);
                slots.len() - 1
            }
            None => return Err(to_errno(CrtError::ResourceExhausted)),
        };
        slots[idx] = Some(Box::new(RawMutex::new()));
        *handle = idx + 1;
        Ok(slots[idx].as_deref().unwrap() as *const RawMutex)
    })
}

unsafe fn cond_slot(handle: *mut PthreadCondT) -> Result<*const Condvar, c_int> {
    let word = *handle;
    if word != 0 {
        return FACADE.with(|f| {
            let slots = f.conds.borrow();
            match slots.get(word - 1).and_then(|s| s.as_deref()) {
                Some(c) => Ok(c as *const Condvar),
                None => Err(to_errno(CrtError::NoSuchEntity)),
            }
        });
    }
    FACADE.with(|f| {
        let mut slots = f.conds.borrow_mut();
        let idx = match slots.iter().position(|s| s.is_none()) {
            Some(idx) => idx,
            None if slots.len() < MAX_COND_SLOTS => {
                slots.push(None);
                slots.len() - 1
            }
            None => return Err(to_errno(CrtError::ResourceExhausted)),
        };
        slots[idx] = Some(Box::new(Condvar::new()));
        *handle = idx + 1;
        Ok(slots[idx].as_deref().unwrap() as *const Condvar)
    })
}

/// Spawn `start_routine(arg)` as a new coroutine and yield once so it gets a
/// prompt first turn, matching the original library's "create then yield"
/// behavior. Works whether the caller is the main coroutine or not.
///
/// # Safety
/// `thread`, `start_routine`, and `arg` must be valid for the duration of
/// this call, per the `pthread_create` contract this mirrors.
pub unsafe extern "C" fn pthread_create(
    thread: *mut PthreadT,
    _attr: *const c_void,
    start_routine: StartRoutine,
    arg: *mut c_void,
) -> c_int {
    let id = next_thread_id();
    let arg_addr = arg as usize;
    let retval = Rc::new(RefCell::new(std::ptr::null_mut::<c_void>()));
    let retval_for_entry = Rc::clone(&retval);

    let handle = Builder::new()
        .name(format!("pthread-{}", id))
        .spawn(move || {
            let ret = start_routine(arg_addr as *mut c_void);
            *retval_for_entry.borrow_mut() = ret;
        });

    log::debug!("pthread_create: spawned {} as {:?}", id, handle.name().unwrap_or("<unnamed>"));
    FACADE.with(|f| {
        f.threads.borrow_mut().push(ThreadEntry { id, handle, retval });
    });
    if !thread.is_null() {
        *thread = id;
    }

    scheduler::dispatch(Some(State::Yield));
    0
}

/// Block until `thread` exits, then release its coroutine record. Only
/// callable from the main coroutine, matching [`crate::coroutine::wait`].
pub unsafe extern "C" fn pthread_join(thread: PthreadT, retval: *mut *mut c_void) -> c_int {
    let entry = FACADE.with(|f| {
        let mut threads = f.threads.borrow_mut();
        let pos = threads.iter().position(|t| t.id == thread)?;
        Some(threads.swap_remove(pos))
    });
    let entry = match entry {
        Some(e) => e,
        None => return to_errno(CrtError::NoSuchEntity),
    };

    log::debug!("pthread_join: waiting on {}", thread);
    coroutine::wait(entry.handle);
    if !retval.is_null() {
        *retval = *entry.retval.borrow();
    }
    coroutine::free(entry.handle);
    0
}

/// Acquire `mutex`, blocking until it becomes available.
pub unsafe extern "C" fn pthread_mutex_lock(mutex: *mut PthreadMutexT) -> c_int {
    match mutex_slot(mutex) {
        Ok(raw) => {
            log::trace!("pthread_mutex_lock: {:?}", mutex);
            (*raw).lock();
            0
        }
        Err(errno) => errno,
    }
}

/// Acquire `mutex` without blocking; returns `EBUSY` if already held.
pub unsafe extern "C" fn pthread_mutex_trylock(mutex: *mut PthreadMutexT) -> c_int {
    match mutex_slot(mutex) {
        Ok(raw) => {
            if (*raw).try_lock() {
                0
            } else {
                log::trace!("pthread_mutex_trylock: {:?} would block", mutex);
                to_errno(CrtError::WouldBlock)
            }
        }
        Err(errno) => errno,
    }
}

/// Release `mutex`. Returns `EINVAL` if the caller does not hold it.
pub unsafe extern "C" fn pthread_mutex_unlock(mutex: *mut PthreadMutexT) -> c_int {
    match mutex_slot(mutex) {
        Ok(raw) => match (*raw).unlock() {
            Ok(()) => {
                log::trace!("pthread_mutex_unlock: {:?}", mutex);
                0
            }
            Err(e) => to_errno(e),
        },
        Err(errno) => errno,
    }
}

/// Free `mutex`'s slot, if it was ever initialized. A no-op on a handle
/// that was never locked. Destroying a mutex with waiters parked on it, or
/// while held, is undefined behavior -- exactly as in real pthreads.
pub unsafe extern "C" fn pthread_mutex_destroy(mutex: *mut PthreadMutexT) -> c_int {
    let word = *mutex;
    if word == 0 {
        return 0;
    }
    log::trace!("pthread_mutex_destroy: slot {}", word);
    FACADE.with(|f| f.mutexes.borrow_mut()[word - 1] = None);
    *mutex = 0;
    0
}

/// Release `mutex`, block until signalled, then reacquire `mutex` before
/// returning. Returns `EINVAL` if the caller does not hold `mutex`.
pub unsafe extern "C" fn pthread_cond_wait(cond: *mut PthreadCondT, mutex: *mut PthreadMutexT) -> c_int {
    let cond_raw = match cond_slot(cond) {
        Ok(raw) => raw,
        Err(errno) => return errno,
    };
    let mutex_raw = match mutex_slot(mutex) {
        Ok(raw) => raw,
        Err(errno) => return errno,
    };
    log::debug!("pthread_cond_wait: {:?} waiting on {:?}", cond, mutex);
    match (*cond_raw).wait_raw(&*mutex_raw) {
        Ok(()) => {
            (*mutex_raw).lock();
            0
        }
        Err(e) => to_errno(e),
    }
}

/// Wake the oldest waiter on `cond`, if any.
pub unsafe extern "C" fn pthread_cond_signal(cond: *mut PthreadCondT) -> c_int {
    match cond_slot(cond) {
        Ok(raw) => {
            log::trace!("pthread_cond_signal: {:?}", cond);
            (*raw).signal();
            0
        }
        Err(errno) => errno,
    }
}

/// Wake every waiter currently parked on `cond`.
pub unsafe extern "C" fn pthread_cond_broadcast(cond: *mut PthreadCondT) -> c_int {
    match cond_slot(cond) {
        Ok(raw) => {
            log::trace!("pthread_cond_broadcast: {:?}", cond);
            (*raw).broadcast();
            0
        }
        Err(errno) => errno,
    }
}

/// Free `cond`'s slot, if it was ever initialized.
pub unsafe extern "C" fn pthread_cond_destroy(cond: *mut PthreadCondT) -> c_int {
    let word = *cond;
    if word == 0 {
        return 0;
    }
    log::trace!("pthread_cond_destroy: slot {}", word);
    FACADE.with(|f| f.conds.borrow_mut()[word - 1] = None);
    *cond = 0;
    0
}

/// Forwarded directly to the process signal mask -- there is only one real
/// OS thread underneath every coroutine, so this is the same signal mask
/// for all of them.
pub unsafe extern "C" fn pthread_sigmask(
    how: c_int,
    set: *const libc::sigset_t,
    oldset: *mut libc::sigset_t,
) -> c_int {
    libc::pthread_sigmask(how, set, oldset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn bump(_: *mut c_void) -> *mut c_void {
        COUNTER.fetch_add(1, Ordering::SeqCst);
        std::ptr::null_mut()
    }

    #[test]
    fn create_and_join_round_trip() {
        COUNTER.store(0, Ordering::SeqCst);
        unsafe {
            let mut t: PthreadT = 0;
            assert_eq!(pthread_create(&mut t, std::ptr::null(), bump, std::ptr::null_mut()), 0);
            assert_eq!(pthread_join(t, std::ptr::null_mut()), 0);
        }
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn join_unknown_thread_is_no_such_entity() {
        unsafe {
            assert_eq!(pthread_join(999_999, std::ptr::null_mut()), to_errno(CrtError::NoSuchEntity));
        }
    }

    #[test]
    fn lazily_initialized_mutex_round_trips_and_reuses_slots() {
        let mut m: PthreadMutexT = PTHREAD_MUTEX_INITIALIZER;
        unsafe {
            assert_eq!(pthread_mutex_lock(&mut m), 0);
            assert_ne!(m, 0);
            assert_eq!(pthread_mutex_trylock(&mut m), to_errno(CrtError::WouldBlock));
            assert_eq!(pthread_mutex_unlock(&mut m), 0);
            assert_eq!(pthread_mutex_trylock(&mut m), 0);
            assert_eq!(pthread_mutex_unlock(&mut m), 0);
            assert_eq!(pthread_mutex_destroy(&mut m), 0);
            assert_eq!(m, 0);
        }
    }

    #[test]
    fn cond_signal_wakes_exactly_one_waiter() {
        static mut M: PthreadMutexT = PTHREAD_MUTEX_INITIALIZER;
        static mut C: PthreadCondT = PTHREAD_COND_INITIALIZER;
        static WOKEN: AtomicUsize = AtomicUsize::new(0);

        extern "C" fn waiter(_: *mut c_void) -> *mut c_void {
            unsafe {
                pthread_mutex_lock(std::ptr::addr_of_mut!(M));
                pthread_cond_wait(std::ptr::addr_of_mut!(C), std::ptr::addr_of_mut!(M));
                WOKEN.fetch_add(1, Ordering::SeqCst);
                pthread_mutex_unlock(std::ptr::addr_of_mut!(M));
            }
            std::ptr::null_mut()
        }

        WOKEN.store(0, Ordering::SeqCst);
        unsafe {
            let mut t1: PthreadT = 0;
            let mut t2: PthreadT = 0;
            pthread_create(&mut t1, std::ptr::null(), waiter, std::ptr::null_mut());
            pthread_create(&mut t2, std::ptr::null(), waiter, std::ptr::null_mut());

            // Both waiters are now parked on the condvar. A single signal
            // wakes only the oldest one (t1); t2 stays parked.
            pthread_mutex_lock(std::ptr::addr_of_mut!(M));
            pthread_cond_signal(std::ptr::addr_of_mut!(C));
            pthread_mutex_unlock(std::ptr::addr_of_mut!(M));

            pthread_join(t1, std::ptr::null_mut());
            assert_eq!(WOKEN.load(Ordering::SeqCst), 1);

            // Wake the remaining waiter so the test doesn't hang joining it.
            pthread_mutex_lock(std::ptr::addr_of_mut!(M));
            pthread_cond_broadcast(std::ptr::addr_of_mut!(C));
            pthread_mutex_unlock(std::ptr::addr_of_mut!(M));
            pthread_join(t2, std::ptr::null_mut());
        }
        assert_eq!(WOKEN.load(Ordering::SeqCst), 2);
    }
}
