//! Path classification for workspace events.
//!
//! Maps a path to the semantic category the multiplexer routes on, and
//! extracts the deck identifier for files under `output/**/<deck>/slides/`.
//! Everything here is pure string work on the path: no filesystem access,
//! and an unrecognized path is [`PathCategory::None`], never an error.
//!
//! Separators are normalized to `/` first, so `C:\ws\output\...` classifies
//! the same as `/ws/output/...`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Root directory segment that generated decks live under.
pub const OUTPUT_SEGMENT: &str = "output";

/// Directory segment holding a deck's rendered slides.
pub const SLIDES_SEGMENT: &str = "slides";

/// Theme file, matched as an exact path suffix.
pub const THEME_SUFFIX: &str = "config/theme.json";

/// Brand asset directory, matched by substring.
pub const BRAND_ASSETS_DIR: &str = "config/catalog/brand-assets";

/// Deck template directory, matched by substring.
pub const DECK_TEMPLATES_DIR: &str = "config/catalog/deck-templates";

const MANIFEST_FILE: &str = "manifest.json";

static SLIDE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^slide-(\d+)\.html$").expect("slide pattern is valid"));

/// Semantic category of a workspace path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathCategory {
    Slide,
    Manifest,
    Plan,
    Theme,
    BrandAsset,
    DeckTemplate,
    None,
}

impl PathCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slide => "slide",
            Self::Manifest => "manifest",
            Self::Plan => "plan",
            Self::Theme => "theme",
            Self::BrandAsset => "brand-asset",
            Self::DeckTemplate => "deck-template",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for PathCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathClass {
    pub category: PathCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deck_id: Option<String>,
}

impl PathClass {
    /// Slide html or manifest that belongs to an identifiable deck.
    pub fn is_deck_file(&self) -> bool {
        matches!(self.category, PathCategory::Slide | PathCategory::Manifest)
            && self.deck_id.is_some()
    }
}

/// Classify a path into its category and deck id.
///
/// Configuration-tree categories are checked first, so a `manifest.json`
/// inside a deck template is a template file rather than a deck manifest.
pub fn classify(path: &Path) -> PathClass {
    let normalized = normalize(path);

    let category = if is_theme_str(&normalized) {
        PathCategory::Theme
    } else if normalized.contains(BRAND_ASSETS_DIR) {
        PathCategory::BrandAsset
    } else if normalized.contains(DECK_TEMPLATES_DIR) {
        PathCategory::DeckTemplate
    } else if slide_number_str(file_name(&normalized)).is_some() {
        PathCategory::Slide
    } else if file_name(&normalized).eq_ignore_ascii_case(MANIFEST_FILE) {
        PathCategory::Manifest
    } else if is_plan_str(&normalized) {
        PathCategory::Plan
    } else {
        PathCategory::None
    };

    let deck_id = match category {
        PathCategory::Slide | PathCategory::Manifest | PathCategory::Plan => {
            deck_id_str(&normalized)
        }
        _ => None,
    };

    PathClass { category, deck_id }
}

/// `slide-<digits>.html`, case-insensitive.
pub fn is_slide_file(path: &Path) -> bool {
    slide_number(path).is_some()
}

/// `manifest.json`, case-insensitive.
pub fn is_manifest(path: &Path) -> bool {
    file_name(&normalize(path)).eq_ignore_ascii_case(MANIFEST_FILE)
}

/// `plan.yaml` or `plan.yml` somewhere under an `output` directory.
pub fn is_plan_file(path: &Path) -> bool {
    is_plan_str(&normalize(path))
}

/// Ends with `config/theme.json`.
pub fn is_theme_file(path: &Path) -> bool {
    is_theme_str(&normalize(path))
}

pub fn is_brand_asset(path: &Path) -> bool {
    normalize(path).contains(BRAND_ASSETS_DIR)
}

pub fn is_deck_template(path: &Path) -> bool {
    normalize(path).contains(DECK_TEMPLATES_DIR)
}

/// Slide number encoded in a `slide-<n>.html` file name.
pub fn slide_number(path: &Path) -> Option<u32> {
    slide_number_str(file_name(&normalize(path)))
}

/// Deck id: the segment right before `slides`, below an `output` root.
///
/// Decks may sit in nested folders (`output/client/q3/my-deck/slides/...`);
/// only the final component before `slides` is the id.
pub fn deck_id(path: &Path) -> Option<String> {
    deck_id_str(&normalize(path))
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn file_name(normalized: &str) -> &str {
    normalized.rsplit('/').next().unwrap_or(normalized)
}

fn segments(normalized: &str) -> Vec<&str> {
    normalized.split('/').filter(|s| !s.is_empty()).collect()
}

fn slide_number_str(name: &str) -> Option<u32> {
    SLIDE_FILE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

fn is_plan_str(normalized: &str) -> bool {
    let name = file_name(normalized).to_ascii_lowercase();
    (name == "plan.yaml" || name == "plan.yml")
        && segments(normalized).contains(&OUTPUT_SEGMENT)
}

fn is_theme_str(normalized: &str) -> bool {
    normalized == THEME_SUFFIX || normalized.ends_with(&format!("/{THEME_SUFFIX}"))
}

fn deck_id_str(normalized: &str) -> Option<String> {
    let segs = segments(normalized);
    let output = segs.iter().position(|s| *s == OUTPUT_SEGMENT)?;

    // `slides` must be a directory (not the last segment) with a deck
    // folder between it and `output`.
    let slides = segs
        .iter()
        .enumerate()
        .rev()
        .find(|(i, s)| **s == SLIDES_SEGMENT && *i + 1 < segs.len() && *i > output + 1)
        .map(|(i, _)| i)?;

    Some(segs[slides - 1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slide_under_output() {
        let class = classify(Path::new("/ws/output/my-deck/slides/slide-12.html"));
        assert_eq!(class.category, PathCategory::Slide);
        assert_eq!(class.deck_id.as_deref(), Some("my-deck"));
        assert!(class.is_deck_file());
    }

    #[test]
    fn test_manifest_in_nested_folder() {
        let class = classify(Path::new("/ws/output/folder/my-deck/slides/manifest.json"));
        assert_eq!(class.category, PathCategory::Manifest);
        assert_eq!(class.deck_id.as_deref(), Some("my-deck"));
    }

    #[test]
    fn test_slide_names_are_case_insensitive() {
        assert_eq!(
            slide_number(Path::new("/ws/output/d/slides/SLIDE-3.HTML")),
            Some(3)
        );
        assert!(is_manifest(Path::new("/ws/output/d/slides/Manifest.JSON")));
        assert!(!is_slide_file(Path::new("/ws/output/d/slides/slide-.html")));
        assert!(!is_slide_file(Path::new("/ws/output/d/slides/slide-3.htm")));
        assert!(!is_slide_file(Path::new("/ws/output/d/slides/my-slide-3.html")));
    }

    #[test]
    fn test_slide_number_overflow_is_not_a_slide() {
        assert_eq!(
            slide_number(Path::new("slide-99999999999999999999.html")),
            None
        );
    }

    #[test]
    fn test_bare_slide_name_has_no_deck() {
        let class = classify(Path::new("slide-2.html"));
        assert_eq!(class.category, PathCategory::Slide);
        assert_eq!(class.deck_id, None);
        assert!(!class.is_deck_file());
    }

    #[test]
    fn test_plan_requires_output_segment() {
        assert!(is_plan_file(Path::new("/ws/output/my-deck/plan.yaml")));
        assert!(is_plan_file(Path::new("/ws/output/my-deck/PLAN.YML")));
        assert!(!is_plan_file(Path::new("/ws/drafts/my-deck/plan.yaml")));
        assert_eq!(
            classify(Path::new("/ws/drafts/plan.yaml")).category,
            PathCategory::None
        );
    }

    #[test]
    fn test_config_tree_categories() {
        assert_eq!(
            classify(Path::new("/ws/config/theme.json")).category,
            PathCategory::Theme
        );
        assert_eq!(
            classify(Path::new("/ws/config/catalog/brand-assets/logos/logo.svg")).category,
            PathCategory::BrandAsset
        );
        assert_eq!(
            classify(Path::new("/ws/config/catalog/deck-templates/pitch/manifest.json")).category,
            PathCategory::DeckTemplate
        );
        assert_eq!(
            classify(Path::new("/ws/config/other-theme.json")).category,
            PathCategory::None
        );
    }

    #[test]
    fn test_windows_separators() {
        let class = classify(Path::new(r"C:\ws\output\my-deck\slides\slide-1.html"));
        assert_eq!(class.category, PathCategory::Slide);
        assert_eq!(class.deck_id.as_deref(), Some("my-deck"));
        assert!(is_theme_file(Path::new(r"C:\ws\config\theme.json")));
    }

    #[test]
    fn test_deck_id_needs_output_root() {
        assert_eq!(deck_id(Path::new("/ws/build/my-deck/slides/slide-1.html")), None);
        assert_eq!(deck_id(Path::new("/ws/output/slides/slide-1.html")), None);
        assert_eq!(deck_id(Path::new("/ws/output/my-deck/slides")), None);
    }

    #[test]
    fn test_unrecognized_paths() {
        for path in ["", "/", "/ws/readme.md", "/ws/output/my-deck/notes.txt"] {
            assert_eq!(classify(Path::new(path)).category, PathCategory::None);
        }
    }
}
