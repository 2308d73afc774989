//! Workspace watching with per-channel debouncing.
//!
//! This module provides a single multiplexer that watches the configuration
//! and output trees and routes events to independently debounced channels.
//!
//! # Architecture
//!
//! ```text
//! WatchMultiplexer
//!   - notify watcher on config/   -+
//!   - notify watcher on output/   -+-> classify -> SuppressionRegistry gate
//!                                              |
//!   +----------+-----------+-------+-----+----------------+---------+
//!   |          |           |             |                |         |
//! refresh  deck-files   brand-assets   plan   deck-templates   theme
//! (200ms)  (per deck,    (200ms)      (300ms)    (300ms)      (300ms)
//!           300ms)
//! ```

pub mod classify;
mod debouncer;
mod error;
mod event;
mod multiplexer;
mod subscription;
mod suppression;

pub use classify::{PathCategory, PathClass, classify};
pub use debouncer::{DebounceChannel, KeyedDebounceChannel};
pub use error::WatchError;
pub use event::{ChangeEvent, ChangeKind};
pub use multiplexer::{
    ChannelTiming, DECK_TEMPLATE_SUPPRESSION_KEY, THEME_SUPPRESSION_KEY, WatchMultiplexer,
    WatchMultiplexerBuilder,
};
pub use subscription::SubscriptionToken;
pub use suppression::{DEFAULT_SUPPRESSION_TTL, SuppressionRegistry};

pub(crate) use subscription::Subscribers;
