use deckwatch::Settings;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_workspace_file_and_env_override() {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().canonicalize().unwrap();
    let config_dir = workspace.join(".deckwatch");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("settings.toml"),
        "[watch]\ndeck_ms = 400\nplan_ms = 100\n",
    )
    .unwrap();

    // Load from a nested directory; the workspace is found by walking up.
    let nested = workspace.join("output/acme");
    fs::create_dir_all(&nested).unwrap();
    let original_dir = env::current_dir().unwrap();
    env::set_current_dir(&nested).unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("DECKWATCH_WATCH__PLAN_MS", "900");
    }

    let settings = Settings::load();

    unsafe {
        env::remove_var("DECKWATCH_WATCH__PLAN_MS");
    }
    env::set_current_dir(original_dir).unwrap();

    let settings = settings.unwrap();
    // Config file value is used when no env var
    assert_eq!(settings.watch.deck_ms, 400);
    // Environment variable overrides config file
    assert_eq!(settings.watch.plan_ms, 900);
    assert_eq!(settings.workspace_root.as_deref(), Some(workspace.as_path()));
}

#[test]
fn test_env_override_for_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("custom.toml");
    fs::write(&config_path, "[logging]\ndefault = \"info\"\n").unwrap();

    unsafe {
        env::set_var("DECKWATCH_LOGGING__DEFAULT", "debug");
    }
    let settings = Settings::load_from(&config_path);
    unsafe {
        env::remove_var("DECKWATCH_LOGGING__DEFAULT");
    }

    assert_eq!(settings.unwrap().logging.default, "debug");
}
