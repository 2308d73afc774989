//! Classify command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::watcher::{PathClass, classify};

#[derive(Serialize)]
struct Classified<'a> {
    path: &'a Path,
    #[serde(flatten)]
    class: PathClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    slide: Option<u32>,
}

/// Run classify command - print the category of each path.
pub fn run(paths: &[PathBuf], json: bool) -> Result<()> {
    let classified: Vec<Classified<'_>> = paths
        .iter()
        .map(|path| Classified {
            path,
            class: classify(path),
            slide: crate::watcher::classify::slide_number(path),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&classified)?);
        return Ok(());
    }

    for entry in &classified {
        let deck = entry.class.deck_id.as_deref().unwrap_or("-");
        println!(
            "{:<14} {:<20} {}",
            entry.class.category,
            deck,
            entry.path.display()
        );
    }
    Ok(())
}
