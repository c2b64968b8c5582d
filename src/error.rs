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

//! Error values returned by the recoverable (non-fatal) operations in this crate.
//!
//! Misuse that violates the main/non-main scheduling discipline, or a failed
//! stack allocation, is not represented here -- those are programmer bugs and
//! are handled by [`crate::fatal`], which logs and aborts the process.

use std::error;
use std::fmt;

/// Recoverable error conditions reported by the coroutine, sync, and pthread
/// compatibility layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrtError {
    /// An argument did not satisfy a precondition of the call: unlocking a
    /// mutex the caller does not hold, waiting on a condition variable with a
    /// mutex the caller does not hold, and similar.
    InvalidArgument,
    /// A non-blocking operation could not be completed immediately.
    WouldBlock,
    /// A handle did not name a known thread, mutex, or condition variable.
    NoSuchEntity,
    /// A fixed-capacity table (the pthread mutex or condition variable slot
    /// tables) has no free slots left.
    ResourceExhausted,
}

impl fmt::Display for CrtError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match *self {
            CrtError::InvalidArgument => "invalid argument",
            CrtError::WouldBlock => "operation would block",
            CrtError::NoSuchEntity => "no such thread, mutex, or condition variable",
            CrtError::ResourceExhausted => "no free slots remain in the table",
        };
        f.write_str(msg)
    }
}

impl error::Error for CrtError {}

/// Result alias used throughout the crate's recoverable-error surface.
pub type Result<T> = ::std::result::Result<T, CrtError>;

/// Map a [`CrtError`] onto the closest `errno`-shaped constant for the
/// pthread compatibility facade.
pub fn to_errno(err: CrtError) -> libc::c_int {
    match err {
        CrtError::InvalidArgument => libc::EINVAL,
        CrtError::WouldBlock => libc::EBUSY,
        CrtError::NoSuchEntity => libc::ESRCH,
        CrtError::ResourceExhausted => libc::EAGAIN,
    }
}
