//! Watch multiplexer: two directory subscriptions fanned out to six channels.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use notify::{Event, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::classify::{PathCategory, classify};
use super::debouncer::{DebounceChannel, KeyedDebounceChannel};
use super::error::WatchError;
use super::event::ChangeEvent;
use super::subscription::SubscriptionToken;
use super::suppression::{DEFAULT_SUPPRESSION_TTL, SuppressionRegistry};

/// Suppression key used by the theme editor before it saves `theme.json`.
pub const THEME_SUPPRESSION_KEY: &str = "theme-editor";

/// Suppression key for deck template regeneration.
pub const DECK_TEMPLATE_SUPPRESSION_KEY: &str = "deck-templates";

/// Debounce windows for each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTiming {
    pub refresh: Duration,
    pub deck_files: Duration,
    pub brand_assets: Duration,
    pub plan: Duration,
    pub deck_templates: Duration,
    pub theme: Duration,
    pub suppression_ttl: Duration,
}

impl Default for ChannelTiming {
    fn default() -> Self {
        Self {
            refresh: Duration::from_millis(200),
            deck_files: Duration::from_millis(300),
            brand_assets: Duration::from_millis(200),
            plan: Duration::from_millis(300),
            deck_templates: Duration::from_millis(300),
            theme: Duration::from_millis(300),
            suppression_ttl: DEFAULT_SUPPRESSION_TTL,
        }
    }
}

/// OS watchers and the task pumping their events into the channels.
#[derive(Default)]
struct WatchSubscriptions {
    watchers: Vec<(PathBuf, notify::RecommendedWatcher)>,
    pump: Option<JoinHandle<()>>,
}

impl WatchSubscriptions {
    fn release(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        for (root, watcher) in self.watchers.drain(..) {
            drop(watcher);
            crate::debug_event!("watcher", "released", "{}", root.display());
        }
    }
}

struct Inner {
    runtime: Handle,
    refresh: DebounceChannel<ChangeEvent>,
    deck_files: KeyedDebounceChannel<String, ChangeEvent>,
    brand_assets: DebounceChannel<ChangeEvent>,
    plan: DebounceChannel<ChangeEvent>,
    deck_templates: DebounceChannel<ChangeEvent>,
    theme: DebounceChannel<ChangeEvent>,
    suppression: SuppressionRegistry,
    subscriptions: Mutex<WatchSubscriptions>,
    disposed: AtomicBool,
}

impl Inner {
    fn dispatch(&self, event: ChangeEvent) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        // Legacy consumers only want "something changed".
        self.refresh.notify(event.clone());

        let class = classify(&event.path);
        match class.category {
            PathCategory::Slide | PathCategory::Manifest => {
                let Some(deck_id) = class.deck_id else {
                    crate::debug_event!("watcher", "no deck", "{}", event.path.display());
                    return;
                };
                if self.suppression.consume(&deck_id) {
                    crate::debug_event!("watcher", "suppressed", "deck {deck_id}");
                    return;
                }
                self.deck_files.notify(deck_id, event);
            }
            PathCategory::BrandAsset => self.brand_assets.notify(event),
            PathCategory::Plan => self.plan.notify(event),
            PathCategory::DeckTemplate => {
                if self.suppression.consume(DECK_TEMPLATE_SUPPRESSION_KEY) {
                    crate::debug_event!("watcher", "suppressed", "deck templates");
                    return;
                }
                self.deck_templates.notify(event);
            }
            PathCategory::Theme => {
                if self.suppression.consume(THEME_SUPPRESSION_KEY) {
                    crate::debug_event!("watcher", "suppressed", "theme");
                    return;
                }
                self.theme.notify(event);
            }
            PathCategory::None => {
                crate::debug_event!(
                    "watcher",
                    "unmatched",
                    "{:?} {}",
                    event.kind,
                    event.path.display()
                );
            }
        }
    }

    fn handle_notify(&self, res: notify::Result<Event>) {
        match res {
            Ok(event) => {
                for change in ChangeEvent::from_notify(event) {
                    self.dispatch(change);
                }
            }
            Err(e) => {
                tracing::error!("[watcher] file watch error: {e}");
            }
        }
    }
}

/// Fans raw workspace events out to independently debounced channels.
///
/// Cloning yields another handle to the same multiplexer.
#[derive(Clone)]
pub struct WatchMultiplexer {
    inner: Arc<Inner>,
}

impl WatchMultiplexer {
    /// Create a builder for configuring the multiplexer.
    pub fn builder() -> WatchMultiplexerBuilder {
        WatchMultiplexerBuilder::new()
    }

    /// Multiplexer with the given timing on the current runtime.
    pub fn new(timing: ChannelTiming) -> Result<Self, WatchError> {
        Self::builder().timing(timing).build()
    }

    /// Subscribe to the configuration and output trees.
    ///
    /// Missing roots are skipped with a warning, so a fresh workspace without
    /// an `output/` directory still gets configuration events. Calling this
    /// again replaces the previous subscriptions.
    pub fn watch(&self, config_root: &Path, output_root: &Path) -> Result<(), WatchError> {
        if self.is_disposed() {
            return Err(WatchError::Disposed);
        }

        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(100);

        let mut watchers = Vec::new();
        for root in [config_root, output_root] {
            if !root.exists() {
                tracing::warn!("[watcher] {} does not exist, not watching", root.display());
                continue;
            }

            let tx = tx.clone();
            let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
                let _ = tx.blocking_send(res);
            })?;
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: root.to_path_buf(),
                    reason: e.to_string(),
                })?;

            crate::log_event!("watcher", "watching", "{}", root.display());
            watchers.push((root.to_path_buf(), watcher));
        }
        drop(tx);

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let pump = self.inner.runtime.spawn(async move {
            while let Some(res) = rx.recv().await {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.handle_notify(res);
            }
        });

        let mut subscriptions = self.inner.subscriptions.lock();
        subscriptions.release();
        subscriptions.watchers = watchers;
        subscriptions.pump = Some(pump);
        Ok(())
    }

    /// Feed one change through classification and debouncing.
    ///
    /// The OS watchers call this for every event; hosts with their own
    /// watch API can call it directly.
    pub fn dispatch(&self, event: ChangeEvent) {
        self.inner.dispatch(event);
    }

    /// Any change in either tree (200ms window).
    pub fn on_refresh(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.inner.refresh.register(callback)
    }

    /// Slide html or manifest change, debounced per deck (300ms window).
    pub fn on_deck_file_change(
        &self,
        callback: impl Fn(&str, &ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.inner
            .deck_files
            .register(move |deck_id: &String, event| callback(deck_id, event))
    }

    /// Brand asset change (200ms window).
    pub fn on_brand_assets_change(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.inner.brand_assets.register(callback)
    }

    /// Plan file change; the event carries the plan's path (300ms window).
    pub fn on_plan_change(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.inner.plan.register(callback)
    }

    /// Deck template change (300ms window).
    pub fn on_deck_templates_change(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.inner.deck_templates.register(callback)
    }

    /// Theme file change (300ms window).
    pub fn on_theme_change(
        &self,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.inner.theme.register(callback)
    }

    /// Swallow the next qualifying event for `key`.
    ///
    /// Keys are deck ids for the per-deck channel, [`THEME_SUPPRESSION_KEY`]
    /// for the theme channel and [`DECK_TEMPLATE_SUPPRESSION_KEY`] for deck
    /// templates.
    pub fn suppress_next_refresh(&self, key: &str) {
        self.inner.suppression.arm(key);
    }

    pub fn suppress_next_deck_template_refresh(&self) {
        self.inner.suppression.arm(DECK_TEMPLATE_SUPPRESSION_KEY);
    }

    /// Watched roots currently subscribed.
    pub fn watched_roots(&self) -> Vec<PathBuf> {
        self.inner
            .subscriptions
            .lock()
            .watchers
            .iter()
            .map(|(root, _)| root.clone())
            .collect()
    }

    /// Cancel every timer and suppression, release the OS watchers and drop
    /// every registration. No callback fires after this returns.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.subscriptions.lock().release();

        self.inner.refresh.dispose();
        self.inner.deck_files.dispose();
        self.inner.brand_assets.dispose();
        self.inner.plan.dispose();
        self.inner.deck_templates.dispose();
        self.inner.theme.dispose();
        self.inner.suppression.dispose();

        crate::log_event!("watcher", "disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

/// Builder for constructing a WatchMultiplexer.
pub struct WatchMultiplexerBuilder {
    timing: ChannelTiming,
    runtime: Option<Handle>,
}

impl WatchMultiplexerBuilder {
    /// Create a new builder with default timing.
    pub fn new() -> Self {
        Self {
            timing: ChannelTiming::default(),
            runtime: None,
        }
    }

    /// Set every channel window.
    pub fn timing(mut self, timing: ChannelTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Run timers on this runtime instead of the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the WatchMultiplexer.
    pub fn build(self) -> Result<WatchMultiplexer, WatchError> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| WatchError::InitFailed {
                reason: format!("no tokio runtime: {e}"),
            })?,
        };
        let timing = self.timing;
        let channel = |name, window| DebounceChannel::with_runtime(name, window, runtime.clone());

        let inner = Inner {
            refresh: channel("refresh", timing.refresh),
            deck_files: KeyedDebounceChannel::with_runtime(
                "deck-files",
                timing.deck_files,
                runtime.clone(),
            ),
            brand_assets: channel("brand-assets", timing.brand_assets),
            plan: channel("plan", timing.plan),
            deck_templates: channel("deck-templates", timing.deck_templates),
            theme: channel("theme", timing.theme),
            suppression: SuppressionRegistry::with_runtime(timing.suppression_ttl, runtime.clone()),
            subscriptions: Mutex::new(WatchSubscriptions::default()),
            disposed: AtomicBool::new(false),
            runtime,
        };

        Ok(WatchMultiplexer {
            inner: Arc::new(inner),
        })
    }
}

impl Default for WatchMultiplexerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
