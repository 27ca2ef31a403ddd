//! Tree lock
//!
//! Every injector tree (a root injector and every injector it spawns) owns one
//! [`TreeLock`]. A build sequence holds the lock for its whole duration:
//! another thread starting a sequence on the same tree waits, while the same
//! call stack starting a second sequence fails fast with
//! `InjectionError::SequenceActive`. Nested construction inside a sequence goes
//! through the scoped `Callback` instead.

use crate::error::InjectionError;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::Cell;
use std::fmt::{self, Debug, Display, Formatter};
use uuid::Uuid;

/// Opaque identity of an injector tree
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeToken(Uuid);

impl TreeToken {
    /// Fresh token
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TreeToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TreeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl Debug for TreeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TreeToken({})", self.0.simple())
    }
}

/// Per-tree sequence lock
pub(crate) struct TreeLock {
    token: TreeToken,
    /// `true` while a sequence holds the lock
    active: ReentrantMutex<Cell<bool>>,
}

impl TreeLock {
    pub(crate) fn new() -> Self {
        Self {
            token: TreeToken::new(),
            active: ReentrantMutex::new(Cell::new(false)),
        }
    }

    pub(crate) fn token(&self) -> TreeToken {
        self.token
    }

    /// Enter a sequence
    ///
    /// Blocks while another thread runs a sequence on this tree.
    pub(crate) fn acquire(&self) -> Result<SequenceGuard<'_>, InjectionError> {
        let guard = self.active.lock();
        if guard.get() {
            return Err(InjectionError::SequenceActive(self.token));
        }
        guard.set(true);
        Ok(SequenceGuard { guard })
    }

    /// Whether the current thread is inside a sequence on this tree
    pub(crate) fn is_held_here(&self) -> bool {
        self.active
            .try_lock()
            .is_some_and(|guard| guard.get())
    }
}

impl Debug for TreeLock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeLock")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Held for the duration of one sequence
pub(crate) struct SequenceGuard<'a> {
    guard: ReentrantMutexGuard<'a, Cell<bool>>,
}

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        self.guard.set(false);
    }
}
