//! Timer-driven debouncing for watch channels.
//!
//! Each key owns at most one pending timer. A new event for the key aborts
//! the pending timer and arms a fresh one, so subscribers only hear about a
//! key once it has been quiet for the whole window, and then only with the
//! most recent event. Events in between are counted but not replayed.
//!
//! Timers are tokio tasks. Every arm bumps a sequence number stored next to
//! the timer; a timer that already woke up when it was replaced sees a
//! different sequence and does nothing.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::subscription::{Subscribers, SubscriptionToken};

type KeyedCallback<K, E> = dyn Fn(&K, &E) + Send + Sync;

/// Pending firing for one key.
struct PendingFire<E> {
    seq: u64,
    latest: E,
    /// Events coalesced into this firing.
    observed: usize,
    timer: JoinHandle<()>,
}

struct ChannelState<K, E> {
    timers: HashMap<K, PendingFire<E>>,
    next_seq: u64,
    disposed: bool,
}

/// Debounce lane with an independent window per key.
pub struct KeyedDebounceChannel<K, E> {
    name: &'static str,
    window: Duration,
    runtime: Handle,
    state: Arc<Mutex<ChannelState<K, E>>>,
    subscribers: Subscribers<KeyedCallback<K, E>>,
}

impl<K, E> KeyedDebounceChannel<K, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create a channel bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(name: &'static str, window: Duration) -> Self {
        Self::with_runtime(name, window, Handle::current())
    }

    /// Create a channel that arms its timers on `runtime`.
    pub fn with_runtime(name: &'static str, window: Duration, runtime: Handle) -> Self {
        Self {
            name,
            window,
            runtime,
            state: Arc::new(Mutex::new(ChannelState {
                timers: HashMap::new(),
                next_seq: 0,
                disposed: false,
            })),
            subscribers: Subscribers::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Register a callback fired with `(key, latest event)` after each quiet period.
    pub fn register(
        &self,
        callback: impl Fn(&K, &E) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.subscribers.add(Arc::new(callback))
    }

    /// Record an event for `key`, restarting that key's window.
    ///
    /// No-op after [`dispose`](Self::dispose).
    pub fn notify(&self, key: K, event: E) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }

        state.next_seq += 1;
        let seq = state.next_seq;

        let observed = match state.timers.remove(&key) {
            Some(previous) => {
                previous.timer.abort();
                previous.observed + 1
            }
            None => 1,
        };

        let timer = self.arm(key.clone(), seq);
        state.timers.insert(
            key,
            PendingFire {
                seq,
                latest: event,
                observed,
                timer,
            },
        );
    }

    /// Drop the pending firing for `key`, if any.
    pub fn cancel(&self, key: &K) -> bool {
        let mut state = self.state.lock();
        match state.timers.remove(key) {
            Some(pending) => {
                pending.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Keys with a timer currently armed.
    pub fn pending_count(&self) -> usize {
        self.state.lock().timers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Abort every pending timer and drop every subscriber.
    ///
    /// Later `notify` calls are ignored, and a timer that already woke up
    /// finds the channel disposed and returns without firing. A firing in
    /// progress on another thread is waited for; its remaining subscribers
    /// are skipped.
    pub fn dispose(&self) {
        let pending: Vec<PendingFire<E>> = {
            let mut state = self.state.lock();
            state.disposed = true;
            state.timers.drain().map(|(_, pending)| pending).collect()
        };
        for fire in pending {
            fire.timer.abort();
        }
        self.subscribers.close();
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    fn arm(&self, key: K, seq: u64) -> JoinHandle<()> {
        let state = Arc::downgrade(&self.state);
        let subscribers = self.subscribers.clone();
        let window = self.window;
        let name = self.name;

        self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            fire(name, &state, &subscribers, key, seq);
        })
    }
}

fn fire<K, E>(
    name: &'static str,
    state: &Weak<Mutex<ChannelState<K, E>>>,
    subscribers: &Subscribers<KeyedCallback<K, E>>,
    key: K,
    seq: u64,
) where
    K: Eq + Hash + Debug + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let Some(state) = state.upgrade() else {
        return;
    };

    let pending = {
        let mut state = state.lock();
        let current = state.timers.get(&key).map(|pending| pending.seq);
        if state.disposed || current != Some(seq) {
            return;
        }
        state.timers.remove(&key)
    };
    let Some(pending) = pending else {
        return;
    };

    crate::debug_event!(
        name,
        "fire",
        "{key:?} after {} event(s)",
        pending.observed
    );

    subscribers.each(name, |callback| callback(&key, &pending.latest));
}

/// Debounce lane that coalesces every event into a single timer.
pub struct DebounceChannel<E> {
    inner: KeyedDebounceChannel<(), E>,
}

impl<E: Send + Sync + 'static> DebounceChannel<E> {
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(name: &'static str, window: Duration) -> Self {
        Self {
            inner: KeyedDebounceChannel::new(name, window),
        }
    }

    pub fn with_runtime(name: &'static str, window: Duration, runtime: Handle) -> Self {
        Self {
            inner: KeyedDebounceChannel::with_runtime(name, window, runtime),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn window(&self) -> Duration {
        self.inner.window()
    }

    pub fn register(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionToken {
        self.inner.register(move |_, event| callback(event))
    }

    pub fn notify(&self, event: E) {
        self.inner.notify((), event);
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending_count() > 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, Arc<Mutex<Vec<T>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Arc::clone(&log), log)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_with_latest() {
        let channel = DebounceChannel::new("test", Duration::from_millis(200));
        let (log, seen) = recorder::<u32>();
        let _token = channel.register(move |n| log.lock().push(*n));

        for n in 1..=5 {
            channel.notify(n);
            sleep(Duration::from_millis(50)).await;
        }
        assert!(seen.lock().is_empty());

        sleep(Duration::from_millis(250)).await;
        assert_eq!(*seen.lock(), vec![5]);
        assert!(!channel.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_restarts_on_each_event() {
        let channel = DebounceChannel::new("test", Duration::from_millis(300));
        let (log, seen) = recorder::<&'static str>();
        let _token = channel.register(move |e| log.lock().push(*e));

        channel.notify("a");
        sleep(Duration::from_millis(200)).await;
        channel.notify("b");
        sleep(Duration::from_millis(200)).await;
        // 400ms since the first event, 200ms since the second.
        assert!(seen.lock().is_empty());

        sleep(Duration::from_millis(150)).await;
        assert_eq!(*seen.lock(), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_fire_independently() {
        let channel: KeyedDebounceChannel<String, u32> =
            KeyedDebounceChannel::new("decks", Duration::from_millis(300));
        let (log, seen) = recorder::<(String, u32)>();
        let _token = channel.register(move |key, n| log.lock().push((key.clone(), *n)));

        channel.notify("alpha".to_string(), 1);
        sleep(Duration::from_millis(100)).await;
        channel.notify("beta".to_string(), 10);
        channel.notify("alpha".to_string(), 2);
        assert_eq!(channel.pending_count(), 2);

        sleep(Duration::from_millis(350)).await;
        let mut fired = seen.lock().clone();
        fired.sort();
        assert_eq!(
            fired,
            vec![("alpha".to_string(), 2), ("beta".to_string(), 10)]
        );
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_subscriber_fires_once() {
        let channel = DebounceChannel::new("test", Duration::from_millis(100));
        let (first_log, first) = recorder::<u8>();
        let (second_log, second) = recorder::<u8>();
        let _a = channel.register(move |n| first_log.lock().push(*n));
        let _b = channel.register(move |n| second_log.lock().push(*n));

        channel.notify(7);
        sleep(Duration::from_millis(150)).await;

        assert_eq!(*first.lock(), vec![7]);
        assert_eq!(*second.lock(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_leaves_others() {
        let channel = DebounceChannel::new("test", Duration::from_millis(100));
        let (kept_log, kept) = recorder::<u8>();
        let (gone_log, gone) = recorder::<u8>();
        let _kept = channel.register(move |n| kept_log.lock().push(*n));
        let removed = channel.register(move |n| gone_log.lock().push(*n));

        assert!(removed.unsubscribe());
        channel.notify(1);
        sleep(Duration::from_millis(150)).await;

        assert_eq!(*kept.lock(), vec![1]);
        assert!(gone.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_subscriber_does_not_block_others() {
        let channel = DebounceChannel::new("test", Duration::from_millis(100));
        let (log, seen) = recorder::<u8>();
        let _bad = channel.register(|_| panic!("subscriber failure"));
        let _good = channel.register(move |n| log.lock().push(*n));

        channel.notify(4);
        sleep(Duration::from_millis(150)).await;
        assert_eq!(*seen.lock(), vec![4]);

        // The channel keeps working after a panic.
        channel.notify(5);
        sleep(Duration::from_millis(150)).await;
        assert_eq!(*seen.lock(), vec![4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_key() {
        let channel: KeyedDebounceChannel<&'static str, u8> =
            KeyedDebounceChannel::new("test", Duration::from_millis(100));
        let (log, seen) = recorder::<u8>();
        let _token = channel.register(move |_, n| log.lock().push(*n));

        channel.notify("a", 1);
        channel.notify("b", 2);
        assert!(channel.cancel(&"a"));
        assert!(!channel.cancel(&"missing"));

        sleep(Duration::from_millis(150)).await;
        assert_eq!(*seen.lock(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_everything() {
        let channel = DebounceChannel::new("test", Duration::from_millis(100));
        let (log, seen) = recorder::<u8>();
        let token = channel.register(move |n| log.lock().push(*n));

        channel.notify(1);
        channel.dispose();
        channel.notify(2);
        sleep(Duration::from_secs(5)).await;

        assert!(seen.lock().is_empty());
        assert!(channel.is_disposed());
        assert!(!token.unsubscribe());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispose_during_firing_skips_remaining_subscribers() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let channel = Arc::new(DebounceChannel::new("test", Duration::from_millis(50)));
        let late = Arc::new(AtomicUsize::new(0));

        let _slow = channel.register(|_: &u8| std::thread::sleep(Duration::from_millis(300)));
        let counter = Arc::clone(&late);
        let _counting = channel.register(move |_: &u8| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.notify(1);

        let disposer = Arc::clone(&channel);
        let counter = Arc::clone(&late);
        let at_dispose = tokio::task::spawn_blocking(move || {
            std::thread::sleep(Duration::from_millis(150));
            disposer.dispose();
            counter.load(Ordering::SeqCst)
        })
        .await
        .unwrap();

        sleep(Duration::from_millis(400)).await;
        assert_eq!(at_dispose, 0);
        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert!(channel.is_disposed());
    }
}
