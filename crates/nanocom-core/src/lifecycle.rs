//! Lifecycle reference counter.
//!
//! The counter is bumped by an on-load hook and dropped by an on-unload hook;
//! a module is ready to unload when it reads zero. Updates are single atomic
//! operations and nothing else is locked, so [`LifecycleCounter::can_unload_now`]
//! is a snapshot: another thread may load the module again right after it
//! returns `true`. Hosts that need a hard guarantee must serialise load and
//! unload for a module themselves (the [`crate::loader::Loader`] does this for
//! the mappings it owns).

use std::sync::atomic::{AtomicUsize, Ordering};

/// An on-unload hook fired with the counter already at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("lifecycle counter decremented below zero")]
pub struct CounterUnderflow;

/// Atomic, never-negative count of live loads.
#[derive(Debug, Default)]
pub struct LifecycleCounter {
    count: AtomicUsize,
}

impl LifecycleCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }

    /// On-load hook. Returns the count after the increment.
    pub fn on_load(&self) -> usize {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// On-unload hook. Returns the count after the decrement.
    ///
    /// A decrement at zero is rejected and leaves the counter at zero.
    pub fn on_unload(&self) -> Result<usize, CounterUnderflow> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .map(|previous| previous - 1)
            .map_err(|_| {
                tracing::error!("on-unload hook fired without a matching on-load");
                CounterUnderflow
            })
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Unload-readiness: true iff the counter reads zero.
    pub fn can_unload_now(&self) -> bool {
        self.count() == 0
    }

    /// Fire on-load now and on-unload when the returned guard drops.
    pub fn hold(&self) -> LifecycleHold<'_> {
        self.on_load();
        LifecycleHold { counter: self }
    }
}

/// Keeps a [`LifecycleCounter`] above zero while alive.
#[must_use = "the counter is released as soon as the hold is dropped"]
#[derive(Debug)]
pub struct LifecycleHold<'a> {
    counter: &'a LifecycleCounter,
}

impl Drop for LifecycleHold<'_> {
    fn drop(&mut self) {
        // Cannot underflow: this hold's own increment is still counted.
        let _ = self.counter.on_unload();
    }
}
