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

//! An intrusive, singly linked FIFO list of coroutines, threaded through
//! each record's own `next` field. Used both for the scheduler's run queue
//! and for mutex/condvar wait lists -- a coroutine is never a member of more
//! than one of these at a time, which `push_back` checks in debug builds.

use crate::record::{Coroutine, State};

#[derive(Default)]
pub(crate) struct RunQueue {
    head: Option<Coroutine>,
    tail: Option<Coroutine>,
    len: usize,
}

impl RunQueue {
    pub(crate) fn new() -> RunQueue {
        RunQueue { head: None, tail: None, len: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn push_back(&mut self, c: Coroutine) {
        debug_assert!(
            !c.inner().linked.get(),
            "coroutine record is already linked into a list"
        );
        c.inner().linked.set(true);
        c.inner().next.set(None);
        match self.tail {
            Some(t) => t.inner().next.set(Some(c)),
            None => self.head = Some(c),
        }
        self.tail = Some(c);
        self.len += 1;
    }

    pub(crate) fn pop_front(&mut self) -> Option<Coroutine> {
        let head = self.head.take()?;
        self.head = head.inner().next.get();
        if self.head.is_none() {
            self.tail = None;
        }
        head.inner().next.set(None);
        head.inner().linked.set(false);
        self.len -= 1;
        Some(head)
    }

    /// Pop the first member whose state is not `Yield`, preserving the
    /// relative order of everything left behind. Returns `None` if every
    /// member is currently `Yield` (or the list is empty) -- this is the
    /// "nothing runnable" case a non-main scheduling pass must handle.
    pub(crate) fn pop_first_runnable(&mut self) -> Option<Coroutine> {
        if let Some(head) = self.head {
            if head.inner().state.get() != State::Yield {
                return self.pop_front();
            }
        } else {
            return None;
        }

        let mut prev = self.head.unwrap();
        let mut cur = prev.inner().next.get();
        while let Some(c) = cur {
            if c.inner().state.get() != State::Yield {
                let next = c.inner().next.get();
                prev.inner().next.set(next);
                if self.tail == Some(c) {
                    self.tail = Some(prev);
                }
                c.inner().next.set(None);
                c.inner().linked.set(false);
                self.len -= 1;
                return Some(c);
            }
            prev = c;
            cur = c.inner().next.get();
        }
        None
    }

    /// Remove and return every member currently in the list, in FIFO order,
    /// as of this call. Used by condvar broadcast, where the original C
    /// implementation re-read a shrinking counter mid-loop and silently
    /// dropped roughly half the waiters; capturing the whole list up front
    /// avoids that class of bug entirely.
    pub(crate) fn drain(&mut self) -> Vec<Coroutine> {
        let mut out = Vec::with_capacity(self.len);
        while let Some(c) = self.pop_front() {
            out.push(c);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CoroutineInner;
    use std::ptr::NonNull;

    fn leaked(state: State) -> Coroutine {
        let inner = Box::new(CoroutineInner {
            context: std::cell::Cell::new(None),
            stack: std::cell::RefCell::new(None),
            entry: std::cell::Cell::new(None),
            state: std::cell::Cell::new(state),
            next: std::cell::Cell::new(None),
            linked: std::cell::Cell::new(false),
            resumed_by: std::cell::Cell::new(None),
            name: None,
            panic: std::cell::Cell::new(None),
        });
        Coroutine(NonNull::new(Box::into_raw(inner)).unwrap())
    }

    #[test]
    fn fifo_order() {
        let mut q = RunQueue::new();
        let a = leaked(State::Ready);
        let b = leaked(State::Ready);
        q.push_back(a);
        q.push_back(b);
        assert_eq!(q.pop_front(), Some(a));
        assert_eq!(q.pop_front(), Some(b));
        assert_eq!(q.pop_front(), None);
    }

    #[test]
    fn pop_first_runnable_skips_yield() {
        let mut q = RunQueue::new();
        let a = leaked(State::Yield);
        let b = leaked(State::Ready);
        q.push_back(a);
        q.push_back(b);
        assert_eq!(q.pop_first_runnable(), Some(b));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_front(), Some(a));
    }

    #[test]
    fn pop_first_runnable_none_when_all_yield() {
        let mut q = RunQueue::new();
        q.push_back(leaked(State::Yield));
        q.push_back(leaked(State::Yield));
        assert_eq!(q.pop_first_runnable(), None);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn drain_captures_full_snapshot() {
        let mut q = RunQueue::new();
        q.push_back(leaked(State::Locked));
        q.push_back(leaked(State::Locked));
        q.push_back(leaked(State::Locked));
        assert_eq!(q.drain().len(), 3);
        assert!(q.is_empty());
    }
}
