pub mod build;
pub mod cli;
pub mod config;
pub mod logging;
pub mod studio;
pub mod watcher;

pub use build::{
    BuildError, BuildMode, BuildProgress, BuildProgressTracker, BuildSlideStatus, BuildStatus,
    CatalogError, DeckCatalog, DeckDetail, DeckSlide, DeckSlideState, FsDeckCatalog,
    SlideBuildStatus,
};
pub use config::Settings;
pub use studio::Studio;
pub use watcher::{
    ChangeEvent, ChangeKind, ChannelTiming, PathCategory, PathClass, SubscriptionToken,
    WatchError, WatchMultiplexer, classify,
};
