//! Build progress snapshot types.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Overall state of a tracked build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Building,
    Complete,
    Cancelled,
    /// Reserved for reporting; slide failures alone never set it.
    Error,
}

/// State of one slide within a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideBuildStatus {
    Pending,
    Building,
    Built,
    Error,
}

impl SlideBuildStatus {
    /// Built or Error: nothing more is expected for this slide.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Built | Self::Error)
    }
}

/// Which slides a build run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Every slide not yet built, in order.
    All,
    /// A single slide, by number.
    One(u32),
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all slides"),
            Self::One(number) => write!(f, "slide {number}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSlideStatus {
    pub number: u32,
    pub name: String,
    pub status: SlideBuildStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Inferred progress of the in-flight build.
///
/// Observers receive clones; the tracker's copy is the only one it mutates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildProgress {
    pub deck_id: String,
    pub deck_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
    pub mode: BuildMode,
    pub status: BuildStatus,
    pub slides: Vec<BuildSlideStatus>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl BuildProgress {
    pub fn slide(&self, number: u32) -> Option<&BuildSlideStatus> {
        self.slides.iter().find(|slide| slide.number == number)
    }

    /// Slide statuses in deck order.
    pub fn statuses(&self) -> Vec<SlideBuildStatus> {
        self.slides.iter().map(|slide| slide.status).collect()
    }

    pub fn count(&self, status: SlideBuildStatus) -> usize {
        self.slides.iter().filter(|s| s.status == status).count()
    }

    /// Every slide is Built or Error.
    pub fn all_settled(&self) -> bool {
        self.slides.iter().all(|slide| slide.status.is_settled())
    }

    pub fn is_active(&self) -> bool {
        self.status == BuildStatus::Building
    }
}
