//! Last native error - the platform error state after a native call
//!
//! The engine reports no structured errors, so every invocation copies
//! `errno` (and on Windows `GetLastError`) into these cells right after the
//! native call returns. The cells are process-wide and shared by all
//! threads: a write from one call is ordered before any read that observes
//! it, but concurrent invocations overwrite each other. Read from the same
//! logical call that wrote, or serialize invocations externally.

use std::sync::atomic::{AtomicI32, Ordering};

static LAST_ERROR: AtomicI32 = AtomicI32::new(0);

#[cfg(windows)]
static WIN32_LAST_ERROR: AtomicI32 = AtomicI32::new(0);

/// `errno` captured after the most recent native call
#[inline]
pub fn get() -> i32 {
    LAST_ERROR.load(Ordering::Acquire)
}

/// Overwrite the recorded error (host-side reset)
#[inline]
pub fn set(code: i32) {
    LAST_ERROR.store(code, Ordering::Release);
}

/// `GetLastError` captured after the most recent native call
#[cfg(windows)]
#[inline]
pub fn win32() -> i32 {
    WIN32_LAST_ERROR.load(Ordering::Acquire)
}

#[cfg(windows)]
#[inline]
pub fn set_win32(code: i32) {
    WIN32_LAST_ERROR.store(code, Ordering::Release);
}

/// Record the calling thread's current platform error state
///
/// Must run immediately after the native call, before anything else can
/// touch `errno`.
pub(crate) fn capture() -> i32 {
    let code = errno();
    set(code);

    #[cfg(windows)]
    set_win32(errno::errno().0);

    code
}

#[cfg(not(windows))]
#[inline]
fn errno() -> i32 {
    errno::errno().0
}

// The errno crate reports `GetLastError` on Windows; the CRT keeps errno
// separately
#[cfg(windows)]
#[inline]
fn errno() -> i32 {
    extern "C" {
        fn _errno() -> *mut i32;
    }
    // SAFETY: the CRT returns a valid thread-local errno location
    unsafe { *_errno() }
}
