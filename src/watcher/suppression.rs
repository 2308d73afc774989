//! Keyed, self-expiring suppression of the next refresh.
//!
//! When the host itself writes a watched file (saving the theme editor,
//! regenerating a deck template) the resulting filesystem event must not be
//! treated as an external edit. The writer arms a key before saving; the
//! multiplexer consumes it when the echo arrives. If the echo never comes
//! (the OS coalesced it away, or the write was a no-op) the entry expires on
//! its own so the channel is never muted indefinitely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Default lifetime of an armed suppression.
pub const DEFAULT_SUPPRESSION_TTL: Duration = Duration::from_millis(1000);

struct SuppressionEntry {
    seq: u64,
    expiry: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, SuppressionEntry>,
    next_seq: u64,
    disposed: bool,
}

pub struct SuppressionRegistry {
    ttl: Duration,
    runtime: Handle,
    state: Arc<Mutex<RegistryState>>,
}

impl SuppressionRegistry {
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(ttl: Duration) -> Self {
        Self::with_runtime(ttl, Handle::current())
    }

    pub fn with_runtime(ttl: Duration, runtime: Handle) -> Self {
        Self {
            ttl,
            runtime,
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Suppress the next event for `key`, replacing any armed entry.
    pub fn arm(&self, key: &str) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }

        if let Some(previous) = state.entries.remove(key) {
            previous.expiry.abort();
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        let expiry = self.spawn_expiry(key.to_string(), seq);
        state
            .entries
            .insert(key.to_string(), SuppressionEntry { seq, expiry });

        crate::debug_event!("suppress", "armed", "{key}");
    }

    /// Clear `key` if armed. Returns true when the caller should swallow the event.
    pub fn consume(&self, key: &str) -> bool {
        let entry = self.state.lock().entries.remove(key);
        match entry {
            Some(entry) => {
                entry.expiry.abort();
                crate::debug_event!("suppress", "consumed", "{key}");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn armed_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Cancel every expiry timer and forget every entry.
    pub fn dispose(&self) {
        let entries: Vec<SuppressionEntry> = {
            let mut state = self.state.lock();
            state.disposed = true;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.expiry.abort();
        }
    }

    fn spawn_expiry(&self, key: String, seq: u64) -> JoinHandle<()> {
        let state = Arc::downgrade(&self.state);
        let ttl = self.ttl;

        self.runtime.spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(state) = state.upgrade() else {
                return;
            };
            let mut state = state.lock();
            if state.entries.get(&key).map(|entry| entry.seq) == Some(seq) {
                state.entries.remove(&key);
                crate::debug_event!("suppress", "expired", "{key}");
            }
        })
    }
}

impl std::fmt::Debug for SuppressionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SuppressionRegistry")
            .field("ttl", &self.ttl)
            .field("armed", &state.entries.keys().collect::<Vec<_>>())
            .field("disposed", &state.disposed)
            .finish()
    }
}
