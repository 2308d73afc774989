//! Deck metadata collaborator.
//!
//! The tracker only reads from the catalog: which slides a deck has and
//! which of them are already built. [`FsDeckCatalog`] answers that from the
//! output tree itself, for hosts that have no richer metadata store.
//!
//! # Manifest format
//!
//! ```json
//! {
//!   "name": "Q3 Review",
//!   "slides": [
//!     { "number": 1, "intent": "Title", "thumbnail": "thumbs/1.png" },
//!     { "number": 2, "intent": "Revenue by region" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::error::CatalogError;
use crate::watcher::classify::{self, SLIDES_SEGMENT};

/// Persisted state of a slide, as the catalog sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeckSlideState {
    Pending,
    Built,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckSlide {
    pub number: u32,
    pub status: DeckSlideState,
    #[serde(default)]
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_uri: Option<String>,
}

impl DeckSlide {
    /// Display name: the slide's intent, or `Slide <n>` when it has none.
    pub fn display_name(&self) -> String {
        if self.intent.trim().is_empty() {
            format!("Slide {}", self.number)
        } else {
            self.intent.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckDetail {
    pub name: String,
    pub slides: Vec<DeckSlide>,
}

/// Read-only source of deck metadata.
#[async_trait]
pub trait DeckCatalog: Send + Sync {
    /// Slides and persisted statuses for `deck_id`, or `None` if the deck is unknown.
    async fn deck_detail(&self, deck_id: &str) -> Result<Option<DeckDetail>, CatalogError>;
}

/// Catalog backed by `<output>/**/<deck>/slides/`.
#[derive(Debug, Clone)]
pub struct FsDeckCatalog {
    output_root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    name: Option<String>,
    #[serde(default)]
    slides: Vec<ManifestSlide>,
}

#[derive(Debug, Deserialize)]
struct ManifestSlide {
    number: u32,
    name: Option<String>,
    intent: Option<String>,
    thumbnail: Option<String>,
}

impl FsDeckCatalog {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Locate `<deck_id>/slides` anywhere below the output root.
    pub fn find_slides_dir(&self, deck_id: &str) -> Option<PathBuf> {
        if !self.output_root.is_dir() {
            return None;
        }
        WalkDir::new(&self.output_root)
            .min_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .find(|entry| {
                entry.file_name() == SLIDES_SEGMENT
                    && entry
                        .path()
                        .parent()
                        .and_then(Path::file_name)
                        .is_some_and(|name| name == deck_id)
            })
            .map(|entry| entry.into_path())
    }

    fn load(&self, deck_id: &str) -> Result<Option<DeckDetail>, CatalogError> {
        let Some(slides_dir) = self.find_slides_dir(deck_id) else {
            return Ok(None);
        };

        let manifest_path = slides_dir.join("manifest.json");
        let manifest = if manifest_path.is_file() {
            let content = std::fs::read_to_string(&manifest_path)?;
            let parsed: ManifestFile =
                serde_json::from_str(&content).map_err(|source| CatalogError::Manifest {
                    path: manifest_path.clone(),
                    source,
                })?;
            Some(parsed)
        } else {
            None
        };

        let (name, mut entries) = match manifest {
            Some(manifest) => (
                manifest.name,
                manifest
                    .slides
                    .into_iter()
                    .map(|s| (s.number, s.intent.or(s.name), s.thumbnail))
                    .collect::<Vec<_>>(),
            ),
            None => (None, discover_slides(&slides_dir)?),
        };
        entries.sort_by_key(|(number, _, _)| *number);
        entries.dedup_by_key(|(number, _, _)| *number);

        let slides = entries
            .into_iter()
            .map(|(number, intent, thumbnail)| {
                let html = slides_dir.join(format!("slide-{number}.html"));
                let built = html.is_file();
                DeckSlide {
                    number,
                    status: if built {
                        DeckSlideState::Built
                    } else {
                        DeckSlideState::Pending
                    },
                    intent: intent.unwrap_or_default(),
                    html_path: built.then_some(html),
                    thumbnail_uri: thumbnail,
                }
            })
            .collect();

        Ok(Some(DeckDetail {
            name: name.unwrap_or_else(|| deck_id.to_string()),
            slides,
        }))
    }
}

/// Slide numbers from the html files present, for decks without a manifest.
fn discover_slides(
    slides_dir: &Path,
) -> Result<Vec<(u32, Option<String>, Option<String>)>, CatalogError> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(slides_dir)? {
        let path = entry?.path();
        if let Some(number) = classify::slide_number(&path) {
            found.push((number, None, None));
        }
    }
    Ok(found)
}

#[async_trait]
impl DeckCatalog for FsDeckCatalog {
    async fn deck_detail(&self, deck_id: &str) -> Result<Option<DeckDetail>, CatalogError> {
        let catalog = self.clone();
        let deck_id = deck_id.to_string();
        tokio::task::spawn_blocking(move || catalog.load(&deck_id))
            .await
            .map_err(|e| CatalogError::Unavailable {
                reason: e.to_string(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn deck_dir(root: &Path, rel: &str) -> PathBuf {
        let dir = root.join(rel).join("slides");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_manifest_deck_with_built_slide() {
        let temp = TempDir::new().unwrap();
        let slides = deck_dir(temp.path(), "client/q3");
        fs::write(
            slides.join("manifest.json"),
            r#"{"name":"Q3 Review","slides":[{"number":2,"intent":"Revenue"},{"number":1,"intent":"Title","thumbnail":"t1.png"}]}"#,
        )
        .unwrap();
        fs::write(slides.join("slide-1.html"), "<html></html>").unwrap();

        let catalog = FsDeckCatalog::new(temp.path());
        let detail = catalog.deck_detail("q3").await.unwrap().unwrap();

        assert_eq!(detail.name, "Q3 Review");
        assert_eq!(detail.slides.len(), 2);
        assert_eq!(detail.slides[0].number, 1);
        assert_eq!(detail.slides[0].status, DeckSlideState::Built);
        assert_eq!(detail.slides[0].thumbnail_uri.as_deref(), Some("t1.png"));
        assert_eq!(detail.slides[1].status, DeckSlideState::Pending);
        assert_eq!(detail.slides[1].display_name(), "Revenue");
    }

    #[tokio::test]
    async fn test_deck_without_manifest_uses_html_files() {
        let temp = TempDir::new().unwrap();
        let slides = deck_dir(temp.path(), "pitch");
        fs::write(slides.join("slide-3.html"), "").unwrap();
        fs::write(slides.join("slide-1.html"), "").unwrap();
        fs::write(slides.join("notes.md"), "").unwrap();

        let detail = FsDeckCatalog::new(temp.path())
            .deck_detail("pitch")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(detail.name, "pitch");
        let numbers: Vec<u32> = detail.slides.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert!(detail.slides.iter().all(|s| s.status == DeckSlideState::Built));
        assert_eq!(detail.slides[0].display_name(), "Slide 1");
    }

    #[tokio::test]
    async fn test_unknown_deck_is_none() {
        let temp = TempDir::new().unwrap();
        deck_dir(temp.path(), "known");

        let catalog = FsDeckCatalog::new(temp.path());
        assert!(catalog.deck_detail("unknown").await.unwrap().is_none());
        assert!(
            FsDeckCatalog::new(temp.path().join("missing"))
                .deck_detail("known")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_invalid_manifest_is_an_error() {
        let temp = TempDir::new().unwrap();
        let slides = deck_dir(temp.path(), "broken");
        fs::write(slides.join("manifest.json"), "{ not json").unwrap();

        let err = FsDeckCatalog::new(temp.path())
            .deck_detail("broken")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Manifest { .. }));
    }
}
