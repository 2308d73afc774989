//! Watch command.

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::studio::Studio;
use crate::watcher::ChangeEvent;

fn report(channel: &str, event: &ChangeEvent) {
    println!(
        "{} {:<14} {:?} {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        channel,
        event.kind,
        event.path.display()
    );
}

/// Run watch command - print every channel firing until Ctrl-C.
pub async fn run(settings: &Settings) -> Result<()> {
    let studio = Studio::new(settings)?;
    let mux = studio.multiplexer();

    let _tokens = [
        mux.on_refresh(|event| report("refresh", event)),
        mux.on_deck_file_change(|deck_id, event| report(&format!("deck:{deck_id}"), event)),
        mux.on_brand_assets_change(|event| report("brand-assets", event)),
        mux.on_plan_change(|event| report("plan", event)),
        mux.on_deck_templates_change(|event| report("deck-templates", event)),
        mux.on_theme_change(|event| report("theme", event)),
    ];

    studio.start()?;
    let roots = mux.watched_roots();
    if roots.is_empty() {
        eprintln!(
            "Warning: neither {} nor {} exists; nothing to watch",
            studio.config_root().display(),
            studio.output_root().display()
        );
    }
    for root in &roots {
        eprintln!("Watching {}", root.display());
    }
    eprintln!("Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    studio.dispose();
    Ok(())
}
