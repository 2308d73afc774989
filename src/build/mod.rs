//! Build progress tracking.
//!
//! Infers which slides of a deck have been produced by watching the deck's
//! `slides/` directory through the multiplexer.

pub mod catalog;
mod error;
mod tracker;
mod types;

pub use catalog::{DeckCatalog, DeckDetail, DeckSlide, DeckSlideState, FsDeckCatalog};
pub use error::{BuildError, CatalogError};
pub use tracker::BuildProgressTracker;
pub use types::{BuildMode, BuildProgress, BuildSlideStatus, BuildStatus, SlideBuildStatus};
