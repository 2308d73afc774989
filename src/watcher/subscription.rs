//! Revocable subscriptions for channel and tracker callbacks.
//!
//! Each registration returns a [`SubscriptionToken`] that removes exactly
//! that callback. Tokens hold only a weak reference to the list, so
//! revoking after the owner is gone (or disposed) is a silent no-op.
//!
//! Callbacks run through a [`FiringGate`]. Closing the gate stops every
//! later invocation and waits for those already running on other threads,
//! so once `close` returns nothing registered on the list runs again.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

thread_local! {
    /// Gates whose callbacks are executing on this thread, innermost last.
    static FIRING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Admission control for callback invocations.
pub(crate) struct FiringGate {
    open: AtomicBool,
    in_flight: RwLock<()>,
}

impl FiringGate {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            in_flight: RwLock::new(()),
        }
    }

    fn id(&self) -> usize {
        self as *const Self as usize
    }

    /// Run `callback` unless the gate is closed. Returns false when closed.
    fn run(&self, channel: &str, callback: impl FnOnce()) -> bool {
        // Recursive so a callback re-entering its own list cannot deadlock
        // behind a closer waiting for the write side.
        let _in_flight = self.in_flight.read_recursive();
        if !self.open.load(Ordering::Acquire) {
            return false;
        }

        let id = self.id();
        FIRING.with(|firing| firing.borrow_mut().push(id));
        invoke_guarded(channel, callback);
        FIRING.with(|firing| {
            firing.borrow_mut().pop();
        });
        true
    }

    /// Refuse further invocations and wait for running ones to finish.
    ///
    /// Called from inside one of this gate's callbacks, it cannot wait for
    /// itself and returns as soon as the gate is shut.
    fn close(&self) {
        self.open.store(false, Ordering::Release);
        let reentrant = FIRING.with(|firing| firing.borrow().contains(&self.id()));
        if !reentrant {
            drop(self.in_flight.write());
        }
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

trait Revoke: Send + Sync {
    fn revoke(&self, id: u64) -> bool;
}

struct SubscriberList<F: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Arc<F>)>,
}

impl<F: ?Sized + Send + Sync> Revoke for Mutex<SubscriberList<F>> {
    fn revoke(&self, id: u64) -> bool {
        let mut list = self.lock();
        let before = list.entries.len();
        list.entries.retain(|(entry_id, _)| *entry_id != id);
        list.entries.len() != before
    }
}

/// Set of callbacks registered on a channel.
pub(crate) struct Subscribers<F: ?Sized> {
    list: Arc<Mutex<SubscriberList<F>>>,
    gate: Arc<FiringGate>,
}

impl<F: ?Sized> Clone for Subscribers<F> {
    fn clone(&self) -> Self {
        Self {
            list: Arc::clone(&self.list),
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<F: ?Sized + Send + Sync + 'static> Subscribers<F> {
    pub(crate) fn new() -> Self {
        Self {
            list: Arc::new(Mutex::new(SubscriberList {
                next_id: 0,
                entries: Vec::new(),
            })),
            gate: Arc::new(FiringGate::new()),
        }
    }

    /// Add a callback alongside any existing ones.
    pub(crate) fn add(&self, callback: Arc<F>) -> SubscriptionToken {
        let mut list = self.list.lock();
        list.next_id += 1;
        let id = list.next_id;
        list.entries.push((id, callback));
        self.token(id)
    }

    /// Install a callback as the only subscriber, dropping the previous one.
    pub(crate) fn replace(&self, callback: Arc<F>) -> SubscriptionToken {
        let mut list = self.list.lock();
        list.next_id += 1;
        let id = list.next_id;
        list.entries.clear();
        list.entries.push((id, callback));
        self.token(id)
    }

    /// Current callbacks, cloned so they can run without holding the lock.
    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        self.list
            .lock()
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect()
    }

    /// Call `f` with each current callback, stopping if the list is closed
    /// part-way through.
    pub(crate) fn each(&self, channel: &str, mut f: impl FnMut(&F)) {
        for callback in self.snapshot() {
            if !self.gate.run(channel, || f(&callback)) {
                return;
            }
        }
    }

    /// Run `f` under the list's gate, unless the list is closed.
    pub(crate) fn run(&self, channel: &str, f: impl FnOnce()) -> bool {
        self.gate.run(channel, f)
    }

    /// Drop every callback and block further invocations.
    ///
    /// Returns once callbacks already running on other threads have finished.
    pub(crate) fn close(&self) {
        self.list.lock().entries.clear();
        self.gate.close();
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        !self.gate.is_open()
    }

    pub(crate) fn len(&self) -> usize {
        self.list.lock().entries.len()
    }

    fn token(&self, id: u64) -> SubscriptionToken {
        let weak: Weak<Mutex<SubscriberList<F>>> = Arc::downgrade(&self.list);
        SubscriptionToken {
            id,
            list: weak as Weak<dyn Revoke>,
        }
    }
}

/// Handle for one registration.
///
/// Dropping the token leaves the callback registered; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "keep the token to be able to unsubscribe"]
pub struct SubscriptionToken {
    id: u64,
    list: Weak<dyn Revoke>,
}

impl SubscriptionToken {
    /// Remove this callback. Returns whether it was still registered.
    pub fn unsubscribe(self) -> bool {
        self.list
            .upgrade()
            .map(|list| list.revoke(self.id))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionToken")
            .field("id", &self.id)
            .finish()
    }
}

/// Run a subscriber callback, logging instead of unwinding on panic.
///
/// One failing subscriber must not stop the others or kill the timer task
/// that fired it.
pub(crate) fn invoke_guarded(channel: &str, callback: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!("[{channel}] subscriber panicked: {reason}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Cb = dyn Fn(usize) + Send + Sync;

    #[test]
    fn test_unsubscribe_removes_only_that_callback() {
        let subs: Subscribers<Cb> = Subscribers::new();
        let first = subs.add(Arc::new(|_| {}));
        let _second = subs.add(Arc::new(|_| {}));
        assert_eq!(subs.len(), 2);

        assert!(first.unsubscribe());
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn test_unsubscribe_after_owner_dropped() {
        let subs: Subscribers<Cb> = Subscribers::new();
        let token = subs.add(Arc::new(|_| {}));
        drop(subs);
        assert!(!token.unsubscribe());
    }

    #[test]
    fn test_unsubscribe_after_close() {
        let subs: Subscribers<Cb> = Subscribers::new();
        let token = subs.add(Arc::new(|_| {}));
        subs.close();
        assert!(subs.is_closed());
        assert!(!token.unsubscribe());
    }

    #[test]
    fn test_replace_keeps_single_subscriber() {
        let subs: Subscribers<Cb> = Subscribers::new();
        let stale = Arc::new(AtomicUsize::new(0));
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&stale);
        let old = subs.replace(Arc::new(move |n| {
            counter.fetch_add(n, Ordering::SeqCst);
        }));
        let counter = Arc::clone(&hits);
        let _new = subs.replace(Arc::new(move |n| {
            counter.fetch_add(n, Ordering::SeqCst);
        }));

        for cb in subs.snapshot() {
            cb(3);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(stale.load(Ordering::SeqCst), 0);
        // The replaced token no longer matches anything.
        assert!(!old.unsubscribe());
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn test_invoke_guarded_swallows_panics() {
        let ran = Arc::new(AtomicUsize::new(0));
        invoke_guarded("test", || panic!("boom"));
        let counter = Arc::clone(&ran);
        invoke_guarded("test", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_inside_callback_stops_the_rest() {
        let subs: Subscribers<Cb> = Subscribers::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let closer = subs.clone();
        let _first = subs.add(Arc::new(move |_| closer.close()));
        let counter = Arc::clone(&hits);
        let _second = subs.add(Arc::new(move |n| {
            counter.fetch_add(n, Ordering::SeqCst);
        }));

        subs.each("test", |cb| cb(1));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(subs.is_closed());
        assert!(!subs.run("test", || panic!("closed gate ran a callback")));
    }

    #[test]
    fn test_close_waits_for_running_callback() {
        let subs: Subscribers<Cb> = Subscribers::new();
        let late = Arc::new(AtomicUsize::new(0));

        let _slow = subs.add(Arc::new(|_| {
            std::thread::sleep(std::time::Duration::from_millis(200));
        }));
        let counter = Arc::clone(&late);
        let _fast = subs.add(Arc::new(move |n| {
            counter.fetch_add(n, Ordering::SeqCst);
        }));

        let firing = subs.clone();
        let worker = std::thread::spawn(move || firing.each("test", |cb| cb(1)));

        std::thread::sleep(std::time::Duration::from_millis(50));
        subs.close();
        let after_close = late.load(Ordering::SeqCst);

        worker.join().unwrap();
        assert_eq!(after_close, 0);
        assert_eq!(late.load(Ordering::SeqCst), 0);
    }
}
