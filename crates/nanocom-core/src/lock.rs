//! Mutual-exclusion primitives for module internals.
//!
//! Two independent scopes are offered:
//!
//! - [`CallSiteLock`] via [`call_site_lock!`](crate::call_site_lock): one lock
//!   object per call site, created lazily. First-time initialisation runs
//!   exactly once even when several threads race on it; every `enter` then
//!   opens a new acquire/release cycle that ends when the guard drops.
//! - [`ModuleScopeLock`] via [`declare_module_lock!`](crate::declare_module_lock):
//!   one lock object for the whole declaring scope, shared by every call site
//!   that enters it, so all of that scope's critical sections are serialised.
//!
//! Acquisition only hands out scope guards; there is no raw unlock. Guards
//! are `!Send` and release on drop, on every exit path.
//!
//! Neither lock is reentrant. Entering a lock the current thread already
//! holds would deadlock, so it panics instead.
//!
//! ```
//! use nanocom_core::{call_site_lock, declare_module_lock};
//!
//! declare_module_lock!(COUNTER: u64 = 0);
//!
//! fn bump() -> u64 {
//!     let mut count = COUNTER.enter();
//!     *count += 1;
//!     *count
//! }
//!
//! fn critical() {
//!     let _guard = call_site_lock!();
//!     // ...
//! }
//!
//! assert_eq!(bump(), 1);
//! critical();
//! ```

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};

thread_local! {
    /// Addresses of the lock objects held by the current thread.
    static HELD: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

fn ensure_not_held(key: usize, name: &str) {
    let reentrant = HELD
        .try_with(|held| held.borrow().contains(&key))
        .unwrap_or(false);
    if reentrant {
        panic!("lock misuse: re-entrant acquisition of `{name}` would deadlock");
    }
}

/// Marks a lock as held by this thread until dropped.
struct Held {
    key: usize,
}

impl Held {
    fn mark(key: usize) -> Self {
        let _ = HELD.try_with(|held| held.borrow_mut().push(key));
        Self { key }
    }
}

impl Drop for Held {
    fn drop(&mut self) {
        let key = self.key;
        let _ = HELD.try_with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&k| k == key) {
                held.remove(pos);
            }
        });
    }
}

// ============================================================================
// Call-site lock
// ============================================================================

/// Lock object scoped to a single call site.
///
/// Usually declared through [`call_site_lock!`](crate::call_site_lock), which
/// places one in a block-local static.
pub struct CallSiteLock {
    site: &'static str,
    lock: OnceCell<Mutex<()>>,
    cycles: AtomicU64,
}

impl CallSiteLock {
    pub const fn new(site: &'static str) -> Self {
        Self {
            site,
            lock: OnceCell::new(),
            cycles: AtomicU64::new(0),
        }
    }

    /// Initialise the lock object if needed, then acquire it.
    ///
    /// Blocks until the lock is free. Panics if the current thread already
    /// holds it.
    pub fn enter(&self) -> CallSiteGuard<'_> {
        let key = self.key();
        ensure_not_held(key, self.site);
        let guard = self.lock_object().lock();
        self.open_cycle(guard, key)
    }

    /// Acquire without blocking; `None` if another thread holds the lock.
    pub fn try_enter(&self) -> Option<CallSiteGuard<'_>> {
        let key = self.key();
        ensure_not_held(key, self.site);
        let guard = self.lock_object().try_lock()?;
        Some(self.open_cycle(guard, key))
    }

    pub fn site(&self) -> &'static str {
        self.site
    }

    /// Number of acquire/release cycles opened so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn is_initialized(&self) -> bool {
        self.lock.get().is_some()
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    fn lock_object(&self) -> &Mutex<()> {
        self.lock.get_or_init(|| {
            tracing::trace!(site = self.site, "call-site lock initialised");
            Mutex::new(())
        })
    }

    fn open_cycle<'a>(&'a self, guard: MutexGuard<'a, ()>, key: usize) -> CallSiteGuard<'a> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        CallSiteGuard {
            _guard: guard,
            _held: Held::mark(key),
            cycle,
        }
    }
}

/// One acquire/release cycle of a [`CallSiteLock`]; released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct CallSiteGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    _held: Held,
    cycle: u64,
}

impl CallSiteGuard<'_> {
    /// Sequence number of this cycle, starting at 1.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

/// Enter the lock belonging to this call site.
///
/// Each invocation site owns a distinct lock object. Bind the result to a
/// named variable; `let _ = call_site_lock!();` releases immediately.
#[macro_export]
macro_rules! call_site_lock {
    () => {{
        static LOCK: $crate::lock::CallSiteLock = $crate::lock::CallSiteLock::new(concat!(
            module_path!(),
            " @ ",
            file!(),
            ":",
            line!()
        ));
        LOCK.enter()
    }};
}

// ============================================================================
// Module-scope lock
// ============================================================================

/// Lock object shared by every call site in its declaring scope.
///
/// May own the state it protects; `ModuleScopeLock<()>` is a plain lock.
pub struct ModuleScopeLock<T = ()> {
    scope: &'static str,
    mutex: Mutex<T>,
    acquisitions: AtomicU64,
}

impl<T> ModuleScopeLock<T> {
    pub const fn new(scope: &'static str, value: T) -> Self {
        Self {
            scope,
            mutex: parking_lot::const_mutex(value),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Acquire the lock, blocking until it is free.
    ///
    /// Panics if the current thread already holds it.
    pub fn enter(&self) -> ModuleScopeGuard<'_, T> {
        let key = self.key();
        ensure_not_held(key, self.scope);
        let guard = self.mutex.lock();
        self.acquired(guard, key)
    }

    /// Acquire without blocking; `None` if another thread holds the lock.
    pub fn try_enter(&self) -> Option<ModuleScopeGuard<'_, T>> {
        let key = self.key();
        ensure_not_held(key, self.scope);
        let guard = self.mutex.try_lock()?;
        Some(self.acquired(guard, key))
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    fn acquired<'a>(&'a self, guard: MutexGuard<'a, T>, key: usize) -> ModuleScopeGuard<'a, T> {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        ModuleScopeGuard {
            guard,
            _held: Held::mark(key),
        }
    }
}

/// Held [`ModuleScopeLock`]; gives access to the guarded state.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ModuleScopeGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    _held: Held,
}

impl<T> Deref for ModuleScopeGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for ModuleScopeGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// Declare a static [`ModuleScopeLock`] for the current scope.
///
/// `declare_module_lock!(pub STATE: Vec<u8> = Vec::new());` guards a value,
/// `declare_module_lock!(LOCK);` declares a plain lock.
#[macro_export]
macro_rules! declare_module_lock {
    ($vis:vis $name:ident: $ty:ty = $init:expr) => {
        $vis static $name: $crate::lock::ModuleScopeLock<$ty> = $crate::lock::ModuleScopeLock::new(
            concat!(module_path!(), "::", stringify!($name)),
            $init,
        );
    };
    ($vis:vis $name:ident) => {
        $vis static $name: $crate::lock::ModuleScopeLock = $crate::lock::ModuleScopeLock::new(
            concat!(module_path!(), "::", stringify!($name)),
            (),
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;

    crate::declare_module_lock!(SCOPE_LOCK);
    crate::declare_module_lock!(SHARED_STATE: Vec<u32> = Vec::new());

    #[test]
    fn test_call_site_lock_reacquire() {
        let lock = CallSiteLock::new("test");
        assert!(!lock.is_initialized());
        {
            let guard = lock.enter();
            assert_eq!(guard.cycle(), 1);
        }
        let guard = lock.enter();
        assert_eq!(guard.cycle(), 2);
        drop(guard);
        assert!(lock.is_initialized());
        assert_eq!(lock.cycles(), 2);
    }

    #[test]
    fn test_call_site_macro_sites_are_distinct() {
        let first = crate::call_site_lock!();
        // A different call site has its own lock object, so this does not block.
        let second = crate::call_site_lock!();
        assert_eq!(first.cycle(), 1);
        assert_eq!(second.cycle(), 1);
    }

    #[test]
    fn test_try_enter_reports_contention() {
        let lock = Arc::new(CallSiteLock::new("contended"));
        let guard = lock.enter();
        let other = Arc::clone(&lock);
        let acquired = thread::spawn(move || other.try_enter().is_some())
            .join()
            .unwrap();
        assert!(!acquired);
        drop(guard);
        assert!(lock.try_enter().is_some());
    }

    #[test]
    fn test_racing_first_use_is_serialised() {
        static LOCK: CallSiteLock = CallSiteLock::new("race");
        static TOTAL: AtomicUsize = AtomicUsize::new(0);
        const THREADS: usize = 16;
        const ROUNDS: usize = 200;

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..ROUNDS {
                        let _guard = LOCK.enter();
                        // Non-atomic read-modify-write; only correct under exclusion.
                        let value = TOTAL.load(Ordering::Relaxed);
                        thread::yield_now();
                        TOTAL.store(value + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(TOTAL.load(Ordering::Relaxed), THREADS * ROUNDS);
        assert_eq!(LOCK.cycles(), (THREADS * ROUNDS) as u64);
        assert!(LOCK.try_enter().is_some());
    }

    #[test]
    #[should_panic(expected = "re-entrant acquisition")]
    fn test_reentrant_call_site_panics() {
        let lock = CallSiteLock::new("reentrant");
        let _outer = lock.enter();
        let _inner = lock.enter();
    }

    #[test]
    #[should_panic(expected = "re-entrant acquisition")]
    fn test_reentrant_module_scope_panics() {
        let _outer = SCOPE_LOCK.enter();
        let _inner = SCOPE_LOCK.enter();
    }

    #[test]
    fn test_module_scope_lock_guards_state() {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                thread::spawn(move || {
                    for j in 0..100 {
                        SHARED_STATE.enter().push(i * 100 + j);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let state = SHARED_STATE.enter();
        assert_eq!(state.len(), 800);
        assert!(SHARED_STATE.acquisitions() >= 801);
        assert!(SHARED_STATE.scope().ends_with("SHARED_STATE"));
    }

    #[test]
    fn test_lock_released_after_panic() {
        let lock = Arc::new(ModuleScopeLock::new("panicky", 0u32));
        let inner = Arc::clone(&lock);
        let result = thread::spawn(move || {
            let mut value = inner.enter();
            *value += 1;
            panic!("failure inside critical section");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(*lock.enter(), 1);
    }
}
