//! Layered configuration for the workspace watcher.
//!
//! Sources, in increasing precedence:
//! - Built-in defaults
//! - `.deckwatch/settings.toml`, found by walking up from the current directory
//! - Environment variables
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DECKWATCH_` and use double
//! underscores to separate nested levels:
//! - `DECKWATCH_WATCH__DECK_MS=500` sets `watch.deck_ms`
//! - `DECKWATCH_WATCH__OUTPUT_DIR=build` sets `watch.output_dir`
//! - `DECKWATCH_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::watcher::ChannelTiming;

/// Directory holding the settings file, relative to the workspace root.
pub const CONFIG_DIR_NAME: &str = ".deckwatch";
pub const SETTINGS_FILE_NAME: &str = "settings.toml";
const ENV_PREFIX: &str = "DECKWATCH_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .deckwatch is located)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Watched trees and debounce windows
    #[serde(default)]
    pub watch: WatchSettings,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    /// Configuration tree, relative to the workspace root unless absolute
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Generated output tree, relative to the workspace root unless absolute
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    /// Per-deck slide channel window
    #[serde(default = "default_deck_ms")]
    pub deck_ms: u64,

    #[serde(default = "default_brand_assets_ms")]
    pub brand_assets_ms: u64,

    #[serde(default = "default_plan_ms")]
    pub plan_ms: u64,

    #[serde(default = "default_deck_templates_ms")]
    pub deck_templates_ms: u64,

    #[serde(default = "default_theme_ms")]
    pub theme_ms: u64,

    /// How long an unconsumed suppression stays armed
    #[serde(default = "default_suppression_ttl_ms")]
    pub suppression_ttl_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level applied to every target without an override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `deckwatch::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_config_dir() -> PathBuf {
    PathBuf::from("config")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_refresh_ms() -> u64 {
    200
}
fn default_deck_ms() -> u64 {
    300
}
fn default_brand_assets_ms() -> u64 {
    200
}
fn default_plan_ms() -> u64 {
    300
}
fn default_deck_templates_ms() -> u64 {
    300
}
fn default_theme_ms() -> u64 {
    300
}
fn default_suppression_ttl_ms() -> u64 {
    1000
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            watch: WatchSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            output_dir: default_output_dir(),
            refresh_ms: default_refresh_ms(),
            deck_ms: default_deck_ms(),
            brand_assets_ms: default_brand_assets_ms(),
            plan_ms: default_plan_ms(),
            deck_templates_ms: default_deck_templates_ms(),
            theme_ms: default_theme_ms(),
            suppression_ttl_ms: default_suppression_ttl_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WatchSettings {
    /// Debounce windows for the multiplexer.
    pub fn timing(&self) -> ChannelTiming {
        ChannelTiming {
            refresh: Duration::from_millis(self.refresh_ms),
            deck_files: Duration::from_millis(self.deck_ms),
            brand_assets: Duration::from_millis(self.brand_assets_ms),
            plan: Duration::from_millis(self.plan_ms),
            deck_templates: Duration::from_millis(self.deck_templates_ms),
            theme: Duration::from_millis(self.theme_ms),
            suppression_ttl: Duration::from_millis(self.suppression_ttl_ms),
        }
    }

    pub fn config_root(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.config_dir)
    }

    pub fn output_root(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.output_dir)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| Path::new(CONFIG_DIR_NAME).join(SETTINGS_FILE_NAME));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file.
    ///
    /// When the file sits in a `.deckwatch` directory and no workspace root is
    /// configured, that directory's parent becomes the workspace root.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        let path = path.as_ref();
        Self::figment(path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = workspace_of_config_file(path);
                }
                settings
            })
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names.
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find `.deckwatch/settings.toml` from the current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    /// Get the workspace root directory (where .deckwatch is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        find_workspace_root(&current)
    }

    /// The configured workspace root, falling back to the current directory.
    pub fn resolved_workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let current_dir = std::env::current_dir()?;
        Self::init_config_file_in(&current_dir, force)
    }

    /// Create a default settings file under `workspace`
    pub fn init_config_file_in(
        workspace: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = workspace.join(CONFIG_DIR_NAME).join(SETTINGS_FILE_NAME);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let settings = Settings {
            workspace_root: Some(workspace.to_path_buf()),
            ..Settings::default()
        };
        settings.save(&config_path)?;

        Ok(config_path)
    }
}

/// Nearest ancestor of `start` (inclusive) containing a `.deckwatch` directory.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|ancestor| ancestor.join(CONFIG_DIR_NAME).is_dir())
        .map(Path::to_path_buf)
}

fn workspace_of_config_file(path: &Path) -> Option<PathBuf> {
    let dir = path.parent()?;
    if dir.file_name()? == CONFIG_DIR_NAME {
        dir.parent().map(Path::to_path_buf)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.watch.config_dir, PathBuf::from("config"));
        assert_eq!(settings.watch.output_dir, PathBuf::from("output"));
        assert_eq!(settings.logging.default, "warn");

        let timing = settings.watch.timing();
        assert_eq!(timing.refresh, Duration::from_millis(200));
        assert_eq!(timing.deck_files, Duration::from_millis(300));
        assert_eq!(timing.brand_assets, Duration::from_millis(200));
        assert_eq!(timing.suppression_ttl, Duration::from_millis(1000));
    }

    #[test]
    fn test_default_timing_matches_multiplexer_defaults() {
        assert_eq!(WatchSettings::default().timing(), ChannelTiming::default());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[watch]
output_dir = "build/out"
deck_ms = 750
theme_ms = 50

[logging]
default = "info"

[logging.modules]
"deckwatch::build" = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.watch.output_dir, PathBuf::from("build/out"));
        assert_eq!(settings.watch.deck_ms, 750);
        assert_eq!(settings.watch.timing().theme, Duration::from_millis(50));
        // Untouched values keep their defaults
        assert_eq!(settings.watch.config_dir, PathBuf::from("config"));
        assert_eq!(settings.watch.plan_ms, 300);
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["deckwatch::build"], "debug");
        assert!(settings.workspace_root.is_none());
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.watch.refresh_ms = 20;
        settings.watch.suppression_ttl_ms = 5000;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.watch.refresh_ms, 20);
        assert_eq!(loaded.watch.suppression_ttl_ms, 5000);
    }

    #[test]
    fn test_init_config_file_in() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file_in(temp_dir.path(), false).unwrap();
        assert_eq!(path, temp_dir.path().join(".deckwatch/settings.toml"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("version = 1"));
        assert!(content.contains("[watch]"));

        // Refuses to overwrite without force
        assert!(Settings::init_config_file_in(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file_in(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_workspace_root_from_config_location() {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join(".deckwatch");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("settings.toml"), "[watch]\ndeck_ms = 10\n").unwrap();

        let settings = Settings::load_from(config_dir.join("settings.toml")).unwrap();
        assert_eq!(settings.workspace_root.as_deref(), Some(temp_dir.path()));
        assert_eq!(
            settings.watch.output_root(&settings.resolved_workspace_root()),
            temp_dir.path().join("output")
        );
    }

    #[test]
    fn test_find_workspace_root_walks_up() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join(".deckwatch")).unwrap();
        let nested = temp_dir.path().join("output/client/deck/slides");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_workspace_root(&nested).as_deref(),
            Some(temp_dir.path())
        );
    }
}
