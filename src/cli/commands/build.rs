//! Build command.

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::build::{BuildMode, BuildProgress, BuildStatus, SlideBuildStatus};
use crate::config::Settings;
use crate::studio::Studio;

fn print_progress(progress: &BuildProgress, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(progress)?);
        return Ok(());
    }

    let status = match progress.status {
        BuildStatus::Building => "building",
        BuildStatus::Complete => "complete",
        BuildStatus::Cancelled => "cancelled",
        BuildStatus::Error => "error",
    };
    println!(
        "{} [{status}] {}/{} built, {} building, {} failed",
        progress.deck_name,
        progress.count(SlideBuildStatus::Built),
        progress.slides.len(),
        progress.count(SlideBuildStatus::Building),
        progress.count(SlideBuildStatus::Error),
    );
    for slide in &progress.slides {
        if slide.status == SlideBuildStatus::Building {
            println!("  -> {} {}", slide.number, slide.name);
        }
    }
    Ok(())
}

/// A single-slide build keeps tracking the rest of the deck; the command
/// only waits for the requested slide.
fn target_settled(progress: &BuildProgress, mode: BuildMode) -> bool {
    match mode {
        BuildMode::One(number) => progress
            .slide(number)
            .is_some_and(|slide| slide.status.is_settled()),
        BuildMode::All => false,
    }
}

/// Run build command - follow a deck build until it completes or Ctrl-C.
pub async fn run(
    settings: &Settings,
    deck: &str,
    slide: Option<u32>,
    build_id: Option<String>,
    json: bool,
) -> Result<()> {
    let studio = Studio::new(settings)?;
    let (tx, mut rx) = mpsc::unbounded_channel::<BuildProgress>();
    let _observer = studio.tracker().on_progress(move |progress| {
        let _ = tx.send(progress.clone());
    });

    studio.start()?;
    let mode = slide.map_or(BuildMode::All, BuildMode::One);
    let started = studio
        .tracker()
        .start_build(deck, mode, build_id)
        .await
        .with_context(|| format!("failed to start tracking {deck}"))?;

    if mode == BuildMode::All && started.all_settled() {
        if !json {
            println!("Every slide of {} is already built.", started.deck_name);
        }
        studio.dispose();
        return Ok(());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(progress) = rx.recv() => {
                print_progress(&progress, json)?;
                if !progress.is_active() || target_settled(&progress, mode) {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                if let Some(cancelled) = studio.tracker().cancel_build() {
                    print_progress(&cancelled, json)?;
                }
                break;
            }
        }
    }

    studio.dispose();
    Ok(())
}
