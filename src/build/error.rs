//! Error types for build tracking and the deck catalog.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from a deck catalog lookup.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read deck catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Deck catalog unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors from starting a build.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Deck not found: {deck_id}")]
    DeckNotFound { deck_id: String },

    #[error("Deck {deck_id} has no slide {slide}")]
    SlideNotFound { deck_id: String, slide: u32 },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
