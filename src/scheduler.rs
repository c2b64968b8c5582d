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

//! The per-thread scheduler: the run queue, the notion of "who is currently
//! executing", and the low-level context swap that everything else in this
//! crate (yielding, waking, locking) is built from.
//!
//! There is one scheduler per OS thread, reached only through thread-local
//! storage -- none of this is `Send` or `Sync`, and it is a programmer error
//! to try to move a [`crate::Coroutine`] across threads.

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use context::Transfer;

use crate::ctx;
use crate::fatal;
use crate::record::{Coroutine, CoroutineInner, Executor, State};
use crate::runqueue::RunQueue;

thread_local! {
    static SCHEDULER: Scheduler = Scheduler::new();
    /// Set by `switch` just before resuming a coroutine for the very first
    /// time, since the trampoline has no other way to learn its own
    /// identity -- its only parameter is the `Transfer` describing who
    /// resumed it.
    static STARTING: Cell<Option<Coroutine>> = Cell::new(None);
}

struct Scheduler {
    run_queue: RefCell<RunQueue>,
    current: Cell<Coroutine>,
    main: Coroutine,
    main_waiting: Cell<bool>,
    /// Set by whoever releases a main coroutine parked via
    /// [`park_self_until_ready`]. Main is never a member of the run queue
    /// while parked that way (see that function's docs), so this is the
    /// only signal it has that it has been released -- `switch` stomps a
    /// target's `state` field to `Running` on every resume, main included,
    /// so `state` alone can't carry this across an intervening resume.
    main_ready: Cell<bool>,
}

impl Scheduler {
    fn new() -> Scheduler {
        let main = Coroutine::from_inner(CoroutineInner::main());
        Scheduler {
            run_queue: RefCell::new(RunQueue::new()),
            current: Cell::new(main),
            main,
            main_waiting: Cell::new(false),
            main_ready: Cell::new(false),
        }
    }
}

fn with<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
    SCHEDULER.with(f)
}

/// The coroutine (or main) presently executing on this thread.
pub(crate) fn current_handle() -> Coroutine {
    with(|s| s.current.get())
}

/// Whether `c` is this thread's distinguished main coroutine.
pub(crate) fn is_main(c: Coroutine) -> bool {
    with(|s| s.main == c)
}

/// Who is presently executing, as the public-facing tagged enum.
pub fn current() -> Executor {
    let me = current_handle();
    if is_main(me) {
        Executor::Main
    } else {
        Executor::Coroutine(me)
    }
}

pub(crate) fn push_ready(c: Coroutine) {
    with(|s| s.run_queue.borrow_mut().push_back(c));
}

/// Record `handle`'s entry closure and enqueue it in state `Stopped`. Does
/// not swap to it; it runs for the first time whenever the scheduler gets
/// around to it.
pub(crate) fn spawn(handle: Coroutine) {
    push_ready(handle);
}

/// The context-swap contract shared by every yield, wake, and lock path in
/// this crate: suspend the caller, resume `target`, and return once someone
/// swaps back into the caller. `target`'s state becomes `Running` as part
/// of the swap; the caller's own state is left untouched (callers set it to
/// whatever they need *before* calling this).
pub(crate) fn switch(target: Coroutine) {
    let me = current_handle();
    log::trace!("switch: {:?} -> {:?}", me.name().unwrap_or("<unnamed>"), target.name().unwrap_or("<unnamed>"));
    if target.state() == State::Stopped {
        STARTING.with(|c| c.set(Some(target)));
    }
    with(|s| s.current.set(target));
    target.inner().state.set(State::Running);
    let ctx = target
        .inner()
        .context
        .take()
        .unwrap_or_else(|| fatal("attempted to resume a coroutine with no context"));
    let transfer = ctx::swap(ctx, me.0.as_ptr() as usize);
    on_resumed(transfer, me);
    with(|s| s.current.set(me));
    me.inner().state.set(State::Running);
    log::trace!("switch: resumed {:?}", me.name().unwrap_or("<unnamed>"));
}

/// Shared tail of every resume point: a fresh resume, whoever it was from,
/// hands the resumer's own continuation back to us in `transfer`. Stash it
/// in the resumer's record (so a later `switch` can find it again) and note
/// that it was the one that most recently resumed `me`.
fn on_resumed(transfer: Transfer, me: Coroutine) {
    let resumer = Coroutine::from_raw(transfer.data);
    resumer.inner().context.set(Some(transfer.context));
    me.inner().resumed_by.set(Some(resumer));
}

/// The trampoline every freshly created coroutine's context begins
/// executing at. Runs exactly once per coroutine, for as long as it takes
/// the entry closure to return (which may span many suspend/resume cycles
/// through ordinary `switch` calls made deeper in the call stack).
pub(crate) extern "C" fn trampoline(transfer: Transfer) -> ! {
    let me = STARTING
        .with(|c| c.take())
        .unwrap_or_else(|| fatal("coroutine trampoline entered with no pending start"));
    on_resumed(transfer, me);
    me.inner().state.set(State::Running);
    with(|s| s.current.set(me));

    let entry = me
        .inner()
        .entry
        .take()
        .unwrap_or_else(|| fatal("coroutine trampoline entered with no entry closure"));
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(entry));
    if let Err(payload) = result {
        log::error!("coroutine {:?} panicked", me.name().unwrap_or("<unnamed>"));
        me.inner().panic.set(Some(payload));
    }
    me.inner().state.set(State::Exited);

    let to = me
        .inner()
        .resumed_by
        .get()
        .unwrap_or_else(|| fatal("exited coroutine was never resumed"));
    switch(to);
    unreachable!("an exited coroutine was resumed a second time")
}

/// Hand control to whichever scheduler dispatch rule applies to the caller.
/// When the caller is non-main and a target is found, it is first
/// re-enqueued with state `requeue_self_as` (Case B). Returns whether a
/// swap actually happened.
pub(crate) fn dispatch(requeue_self_as: Option<State>) -> bool {
    let me = current_handle();
    if is_main(me) {
        // Case A: main unconditionally takes the run queue's head.
        match with(|s| s.run_queue.borrow_mut().pop_front()) {
            Some(target) => {
                log::trace!("dispatch: main taking queue head {:?}", target.name().unwrap_or("<unnamed>"));
                switch(target);
                true
            }
            None => {
                log::trace!("dispatch: main found nothing runnable");
                false
            }
        }
    } else {
        // Case B: the first non-Yield member, wherever it sits.
        let target = with(|s| s.run_queue.borrow_mut().pop_first_runnable());
        match target {
            Some(target) => {
                log::trace!(
                    "dispatch: {:?} yielding to {:?}",
                    me.name().unwrap_or("<unnamed>"),
                    target.name().unwrap_or("<unnamed>")
                );
                if let Some(state) = requeue_self_as {
                    me.inner().state.set(state);
                    push_ready(me);
                }
                switch(target);
                true
            }
            None => {
                log::trace!("dispatch: {:?} found nothing runnable", me.name().unwrap_or("<unnamed>"));
                false
            }
        }
    }
}

/// Swap directly to main, bypassing the run queue entirely. Used by
/// operations (contended mutex lock, condvar wait) whose caller already has
/// a home in some other wait list and must not also appear in the run
/// queue -- a coroutine is never a member of two lists at once.
pub(crate) fn park_on_main() {
    let main = with(|s| s.main);
    switch(main);
}

/// `main` blocks here until `target` exits, repeatedly giving the rest of
/// the run queue a turn. Main-only; see `crate::wait`.
pub(crate) fn wait(target: Coroutine) {
    let me = current_handle();
    if !is_main(me) {
        fatal("wait() called from a non-main coroutine");
    }
    log::debug!("wait: main blocking on {:?}", target.name().unwrap_or("<unnamed>"));
    with(|s| s.main_waiting.set(true));
    while target.state() != State::Exited {
        dispatch(Some(State::Yield));
    }
    with(|s| s.main_waiting.set(false));
    log::debug!("wait: {:?} exited, main resuming", target.name().unwrap_or("<unnamed>"));
}

/// Give up the CPU, remaining eligible to be resumed by main specifically
/// (state `Yield`) or, once main looks away, the next runnable peer.
/// Callable from main too (see spec scenario S6): main simply takes the
/// ordinary Case A path through `dispatch` and never touches
/// `requeue_self_as`, since main is never itself a member of the run
/// queue while it runs. See `crate::yield_now`.
pub(crate) fn yield_now() -> bool {
    let me = current_handle();
    log::trace!("yield_now: {:?}", me.name().unwrap_or("<unnamed>"));
    let swapped = dispatch(Some(State::Yield));
    if !swapped {
        me.inner().state.set(State::Running);
    }
    swapped
}

/// Non-main only: swap straight to main, skipping whatever the rest of the
/// run queue is doing. Fails (returns `false`, no swap) if main is already
/// inside `wait()`, since it will get back around to the run queue on its
/// own. See `crate::yield_to_main`.
pub(crate) fn yield_to_main() -> bool {
    let me = current_handle();
    if is_main(me) {
        fatal("yield_to_main() called from the main coroutine");
    }
    if with(|s| s.main_waiting.get()) {
        log::trace!("yield_to_main: {:?} refused, main is already waiting", me.name().unwrap_or("<unnamed>"));
        return false;
    }
    log::trace!("yield_to_main: {:?}", me.name().unwrap_or("<unnamed>"));
    me.inner().state.set(State::Yield);
    push_ready(me);
    park_on_main();
    true
}

/// Main-only: give every other runnable coroutine a turn until released by
/// [`release_parked_main`]. Used when main itself parks in some private
/// wait list (currently: `sync::Condvar::wait`) instead of the run queue.
///
/// Unlike [`wait`], there is no single target coroutine to poll the state
/// of -- the caller has already spliced itself into that private list
/// before calling this, and is released from the outside. Main is
/// deliberately never re-added to the run queue for this (unlike an
/// ordinary coroutine's mutex/condvar wakeup): `switch` unconditionally
/// sets whoever it resumes to `Running`, which would stomp a `Ready` we'd
/// otherwise be polling for on `me`'s own `state` the instant anything else
/// resumes main for an unrelated reason (a peer finishing its turn and
/// handing control back, say), well before the release we're actually
/// waiting for. `main_ready` is a flag exactly so it can't be stomped that
/// way.
pub(crate) fn park_self_until_ready() {
    let me = current_handle();
    debug_assert!(is_main(me), "park_self_until_ready is main-only");
    log::debug!("park_self_until_ready: main parking");
    with(|s| {
        s.main_waiting.set(true);
        s.main_ready.set(false);
    });
    while !with(|s| s.main_ready.get()) {
        dispatch(None);
    }
    with(|s| s.main_waiting.set(false));
    me.inner().state.set(State::Running);
    log::debug!("park_self_until_ready: main released");
}

/// Release a main coroutine parked via [`park_self_until_ready`].
pub(crate) fn release_parked_main() {
    log::trace!("release_parked_main");
    with(|s| s.main_ready.set(true));
}

/// Mark the caller `Ready`, enqueue it, and swap directly to `target`. Used
/// by main (and, through the mutex/condvar layer, by coroutines) to resume
/// a specific coroutine out of band from the ordinary dispatch rules. See
/// `crate::wakeup`.
pub(crate) fn wakeup(target: Coroutine) {
    let me = current_handle();
    log::trace!(
        "wakeup: {:?} waking {:?}",
        me.name().unwrap_or("<unnamed>"),
        target.name().unwrap_or("<unnamed>")
    );
    me.inner().state.set(State::Ready);
    push_ready(me);
    switch(target);
}

impl Coroutine {
    pub(crate) fn from_inner(inner: CoroutineInner) -> Coroutine {
        let leaked = Box::leak(Box::new(inner));
        Coroutine(NonNull::from(leaked))
    }

    pub(crate) fn from_raw(data: usize) -> Coroutine {
        Coroutine(
            NonNull::new(data as *mut CoroutineInner)
                .unwrap_or_else(|| fatal("context switch carried a null coroutine pointer")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S6: main is the only context that ever exists on this thread. An
    /// empty run queue means `yield_now`, called from main itself, has
    /// nothing to switch to, so it reports no-op and leaves main `Running`
    /// rather than aborting or parking it.
    #[test]
    fn main_yield_now_is_noop_on_empty_queue() {
        assert!(is_main(current_handle()));
        assert!(!crate::coroutine::yield_now());
        assert!(is_main(current_handle()));
        assert_eq!(current_handle().state(), State::Running);
    }
}
