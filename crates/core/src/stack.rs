//! # Trace Context Stack
//!
//! Process-wide (thread-local) stack discipline for trace levels.
//! Entering a trace yields the next-higher unused level; exiting
//! releases it. At most one level is "current" at any instant, but
//! values wrapped at outer levels stay live on the call stack — that
//! is what higher-order differentiation requires.
//!
//! Release is an RAII guarantee: [`new_trace`] hands back a
//! [`TraceGuard`] whose `Drop` restores the previous level on every
//! exit path — normal return, `?`, or panic. An error deep inside
//! traced user code therefore unwinds through all open levels without
//! desynchronizing the stack.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

/// One nesting depth of tracing. Totally ordered: a numerically higher
/// level was entered more recently (is more deeply nested).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceLevel(usize);

impl TraceLevel {
    /// Zero-based nesting depth of this level.
    pub fn depth(self) -> usize {
        self.0
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace level {}", self.0)
    }
}

thread_local! {
    /// Number of currently open trace levels on this thread.
    static OPEN_LEVELS: Cell<usize> = const { Cell::new(0) };
}

/// Number of trace levels currently open on this thread.
///
/// Zero outside any trace. Useful for asserting that a failed traced
/// function released its level.
pub fn open_levels() -> usize {
    OPEN_LEVELS.with(Cell::get)
}

/// Scoped ownership of one trace level.
///
/// Created by [`new_trace`]; dropping it releases the level. Guards
/// must be dropped innermost-first, which the borrow of ordinary
/// nested scopes gives for free.
#[must_use = "dropping the guard exits the trace level"]
pub struct TraceGuard {
    level: TraceLevel,
    // The stack is thread-local; the guard must not migrate.
    _not_send: PhantomData<*const ()>,
}

impl TraceGuard {
    /// The level this guard holds open.
    pub fn level(&self) -> TraceLevel {
        self.level
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        OPEN_LEVELS.with(|open| {
            debug_assert_eq!(
                open.get(),
                self.level.0 + 1,
                "trace levels must be released innermost-first"
            );
            open.set(self.level.0);
        });
    }
}

/// Enter a fresh trace level, strictly greater than all open levels.
pub fn new_trace() -> TraceGuard {
    let level = OPEN_LEVELS.with(|open| {
        let depth = open.get();
        open.set(depth + 1);
        TraceLevel(depth)
    });
    TraceGuard {
        level,
        _not_send: PhantomData,
    }
}
