//! Activity signal around transport writes.
//!
//! A single "currently transmitting" bit, raised right before the session
//! writes to the transport and lowered right after, whatever the outcome.
//! Other tasks (a status display, typically) may read it at any time.
//!
//! The signal is fire-and-forget: updating it never blocks and never fails,
//! and the engine behaves the same whether or not anyone observes it.
//!
//! # Usage
//!
//! The [`ActivityGuard`] returned by [`ActivitySignal::guard`] raises the
//! signal on creation and lowers it on drop, so an early return from a
//! failed write still lowers it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback notified on every signal change.
pub type ActivityObserver = Arc<dyn Fn(bool) + Send + Sync>;

/// Shared "currently transmitting" flag.
///
/// Cloning is cheap; clones share the same flag and observer.
#[derive(Clone, Default)]
pub struct ActivitySignal {
    active: Arc<AtomicBool>,
    observer: Option<ActivityObserver>,
}

impl ActivitySignal {
    /// Create a signal nobody is told about.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signal that also calls `observer` on each change.
    ///
    /// The observer runs on the session task in the middle of a send; it
    /// must return quickly.
    pub fn with_observer<F>(observer: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            observer: Some(Arc::new(observer)),
        }
    }

    /// Check whether a transport write is in progress.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Mark a write as started.
    #[inline]
    pub fn raise(&self) {
        self.set(true);
    }

    /// Mark a write as finished.
    #[inline]
    pub fn lower(&self) {
        self.set(false);
    }

    /// Raise the signal until the returned guard is dropped.
    pub fn guard(&self) -> ActivityGuard {
        self.raise();
        ActivityGuard {
            signal: self.clone(),
            lowered: false,
        }
    }

    fn set(&self, on: bool) {
        self.active.store(on, Ordering::Release);
        if let Some(observer) = &self.observer {
            observer(on);
        }
    }
}

impl std::fmt::Debug for ActivitySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivitySignal")
            .field("active", &self.is_active())
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

/// Guard that lowers the activity signal on drop.
pub struct ActivityGuard {
    signal: ActivitySignal,
    lowered: bool,
}

impl ActivityGuard {
    /// Lower the signal now instead of at drop.
    pub fn lower(mut self) {
        self.signal.lower();
        self.lowered = true;
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if !self.lowered {
            self.signal.lower();
        }
    }
}
