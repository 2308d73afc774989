//! Build progress inference.
//!
//! The content generator never reports progress directly. The tracker
//! infers it from slide files appearing under the deck's `slides/`
//! directory, as delivered by the multiplexer's per-deck channel.
//!
//! Because that channel is debounced, two slides written within one window
//! arrive as a single event for the later file. The earlier slide stays
//! Building until another qualifying write for the deck arrives. There is
//! deliberately no directory-listing reconciliation here.
//!
//! One tracker follows one build at a time. `is_building` takes a deck id
//! only to answer "is *this* deck the one being built".

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;

use super::catalog::{DeckCatalog, DeckDetail, DeckSlideState};
use super::error::BuildError;
use super::types::{BuildMode, BuildProgress, BuildSlideStatus, BuildStatus, SlideBuildStatus};
use crate::watcher::classify;
use crate::watcher::{ChangeKind, Subscribers, SubscriptionToken, WatchMultiplexer};

type ProgressCallback = dyn Fn(&BuildProgress) + Send + Sync;

#[derive(Default)]
struct TrackerState {
    progress: Option<BuildProgress>,
    /// Slides recorded as built by file events during this build.
    built: HashSet<u32>,
}

struct TrackerInner {
    catalog: Arc<dyn DeckCatalog>,
    state: Mutex<TrackerState>,
    observer: Subscribers<ProgressCallback>,
    deck_subscription: Mutex<Option<SubscriptionToken>>,
}

/// State machine for the single in-flight build.
///
/// Cloning yields another handle to the same tracker.
#[derive(Clone)]
pub struct BuildProgressTracker {
    inner: Arc<TrackerInner>,
}

impl BuildProgressTracker {
    pub fn new(catalog: Arc<dyn DeckCatalog>) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                catalog,
                state: Mutex::new(TrackerState::default()),
                observer: Subscribers::new(),
                deck_subscription: Mutex::new(None),
            }),
        }
    }

    /// Follow the multiplexer's per-deck channel.
    ///
    /// Deletions are not evidence of a slide being produced and are skipped.
    /// Attaching again replaces the previous subscription.
    pub fn attach(&self, multiplexer: &WatchMultiplexer) {
        let weak: Weak<TrackerInner> = Arc::downgrade(&self.inner);
        let token = multiplexer.on_deck_file_change(move |_deck_id, event| {
            if event.kind == ChangeKind::Deleted {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                BuildProgressTracker { inner }.handle_file_change(&event.path);
            }
        });

        if let Some(previous) = self.inner.deck_subscription.lock().replace(token) {
            previous.unsubscribe();
        }
    }

    /// Begin tracking a build of `deck_id`.
    ///
    /// Call this before triggering the generator, so the first slide write
    /// lands after the new progress is installed.
    pub async fn start_build(
        &self,
        deck_id: &str,
        mode: BuildMode,
        build_id: Option<String>,
    ) -> Result<BuildProgress, BuildError> {
        // Cleared before the lookup; a failed lookup leaves it cleared.
        self.inner.state.lock().built.clear();

        let detail = self
            .inner
            .catalog
            .deck_detail(deck_id)
            .await?
            .ok_or_else(|| BuildError::DeckNotFound {
                deck_id: deck_id.to_string(),
            })?;

        if let BuildMode::One(target) = mode {
            if !detail.slides.iter().any(|slide| slide.number == target) {
                return Err(BuildError::SlideNotFound {
                    deck_id: deck_id.to_string(),
                    slide: target,
                });
            }
        }

        let progress = BuildProgress {
            deck_id: deck_id.to_string(),
            deck_name: detail.name.clone(),
            build_id,
            mode,
            status: BuildStatus::Building,
            slides: initial_slides(&detail, mode),
            started_at: Utc::now(),
            completed_at: None,
        };

        self.inner.state.lock().progress = Some(progress.clone());

        crate::log_event!(
            "build",
            "started",
            "{deck_id} ({mode}, {} slides)",
            progress.slides.len()
        );
        self.publish(&progress);
        Ok(progress)
    }

    /// Record a slide file appearing on disk.
    pub fn handle_file_change(&self, path: &Path) {
        let Some(number) = classify::slide_number(path) else {
            return;
        };

        let snapshot = {
            let mut state = self.inner.state.lock();
            let TrackerState { progress, built } = &mut *state;

            let Some(progress) = progress.as_mut().filter(|p| p.is_active()) else {
                crate::debug_event!("build", "ignored", "no active build for {}", path.display());
                return;
            };
            if let Some(deck_id) = classify::deck_id(path) {
                if deck_id != progress.deck_id {
                    crate::debug_event!("build", "ignored", "{deck_id} is not {}", progress.deck_id);
                    return;
                }
            }
            if built.contains(&number) {
                crate::debug_event!("build", "duplicate", "slide {number}");
                return;
            }
            let Some(slide) = progress.slides.iter_mut().find(|s| s.number == number) else {
                crate::debug_event!("build", "ignored", "unknown slide {number}");
                return;
            };

            slide.status = SlideBuildStatus::Built;
            slide.html_path = Some(path.to_path_buf());
            slide.error_message = None;
            built.insert(number);

            // Both modes move on to the next unbuilt slide.
            if let Some(next) = progress
                .slides
                .iter_mut()
                .find(|s| s.status == SlideBuildStatus::Pending)
            {
                next.status = SlideBuildStatus::Building;
            }

            if progress.all_settled() {
                progress.status = BuildStatus::Complete;
                progress.completed_at = Some(Utc::now());
                crate::log_event!("build", "complete", "{}", progress.deck_id);
            } else {
                crate::log_event!("build", "built", "{} slide {number}", progress.deck_id);
            }

            progress.clone()
        };

        self.publish(&snapshot);
    }

    /// Mark a slide as failed. The build's overall status is unchanged.
    pub fn mark_slide_error(&self, slide_number: u32, message: impl Into<String>) {
        let message = message.into();
        let snapshot = {
            let mut state = self.inner.state.lock();
            let Some(progress) = state.progress.as_mut() else {
                return;
            };
            let Some(slide) = progress
                .slides
                .iter_mut()
                .find(|s| s.number == slide_number)
            else {
                crate::debug_event!("build", "ignored", "error for unknown slide {slide_number}");
                return;
            };
            if slide.status == SlideBuildStatus::Built {
                crate::debug_event!("build", "ignored", "slide {slide_number} already built");
                return;
            }

            tracing::warn!("[build] slide {slide_number} failed: {message}");
            slide.status = SlideBuildStatus::Error;
            slide.error_message = Some(message);
            progress.clone()
        };

        self.publish(&snapshot);
    }

    /// Stop tracking the active build.
    ///
    /// Building slides go back to Pending so a later build resumes them.
    /// Returns `None` when no build is active. The generator itself keeps
    /// running; its later writes are ignored.
    pub fn cancel_build(&self) -> Option<BuildProgress> {
        let snapshot = {
            let mut state = self.inner.state.lock();
            let progress = state.progress.as_mut().filter(|p| p.is_active())?;

            progress.status = BuildStatus::Cancelled;
            progress.completed_at = Some(Utc::now());
            for slide in &mut progress.slides {
                if slide.status == SlideBuildStatus::Building {
                    slide.status = SlideBuildStatus::Pending;
                }
            }
            progress.clone()
        };

        crate::log_event!("build", "cancelled", "{}", snapshot.deck_id);
        self.publish(&snapshot);
        Some(snapshot)
    }

    /// Snapshot of the tracked build, if any.
    pub fn progress(&self) -> Option<BuildProgress> {
        self.inner.state.lock().progress.clone()
    }

    /// Whether a build is running, optionally for a specific deck.
    pub fn is_building(&self, deck_id: Option<&str>) -> bool {
        let state = self.inner.state.lock();
        match state.progress.as_ref() {
            Some(progress) if progress.is_active() => {
                deck_id.is_none_or(|id| id == progress.deck_id)
            }
            _ => false,
        }
    }

    /// Set the progress observer, replacing any previous one.
    ///
    /// If a build is active, the observer is called immediately with it.
    /// A finished build is only visible through [`progress`](Self::progress).
    pub fn on_progress(
        &self,
        callback: impl Fn(&BuildProgress) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        let callback: Arc<ProgressCallback> = Arc::new(callback);
        let token = self.inner.observer.replace(Arc::clone(&callback));

        if let Some(current) = self.progress().filter(|p| p.is_active()) {
            self.inner.observer.run("build", || callback(&current));
        }
        token
    }

    /// Forget the tracked build.
    pub fn clear_build(&self) {
        let mut state = self.inner.state.lock();
        state.progress = None;
        state.built.clear();
    }

    /// Forget everything and detach from the multiplexer.
    ///
    /// Waits for an observer call running on another thread. No observer
    /// call starts after this returns.
    pub fn dispose(&self) {
        self.clear_build();
        if let Some(token) = self.inner.deck_subscription.lock().take() {
            token.unsubscribe();
        }
        self.inner.observer.close();
    }

    fn publish(&self, progress: &BuildProgress) {
        self.inner
            .observer
            .each("build", |callback| callback(progress));
    }
}

/// Slide statuses at the start of a build.
///
/// `All`: built slides stay Built, the first unbuilt slide is Building.
/// `One`: only the target is Building; the rest keep their persisted state.
fn initial_slides(detail: &DeckDetail, mode: BuildMode) -> Vec<BuildSlideStatus> {
    let mut building_assigned = false;

    detail
        .slides
        .iter()
        .map(|slide| {
            let persisted = match slide.status {
                DeckSlideState::Built => SlideBuildStatus::Built,
                DeckSlideState::Pending => SlideBuildStatus::Pending,
            };
            let status = match mode {
                BuildMode::All if persisted == SlideBuildStatus::Built => persisted,
                BuildMode::All if !building_assigned => {
                    building_assigned = true;
                    SlideBuildStatus::Building
                }
                BuildMode::All => SlideBuildStatus::Pending,
                BuildMode::One(target) if target == slide.number => SlideBuildStatus::Building,
                BuildMode::One(_) => persisted,
            };

            BuildSlideStatus {
                number: slide.number,
                name: slide.display_name(),
                status,
                html_path: slide.html_path.clone(),
                thumbnail_uri: slide.thumbnail_uri.clone(),
                error_message: None,
            }
        })
        .collect()
}
