//! Replay command: run a recorded event file through the store

use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::warn;

use tether::config::Config;
use tether::store::{AgentStore, StoreEvent, StoreSnapshot};
use tether::stream::{FeedFormat, decode_feed, read_lines};

/// Decode every record of `file`, apply it, and print the final snapshot as JSON
pub async fn replay_command(config: &Config, file: &Path, format: Option<FeedFormat>) -> Result<()> {
    let format = format.unwrap_or_else(|| guess_format(file));
    let reader = File::open(file)
        .await
        .with_context(|| format!("Failed to open event file: {}", file.display()))?;

    let mut store = AgentStore::new(config.sync.clone());
    let mut decoded = 0usize;
    let mut malformed = 0usize;

    let mut feed = decode_feed(read_lines(BufReader::new(reader)), format);
    while let Some(item) = feed.next().await {
        match item {
            Ok(envelope) => {
                store.dispatch(StoreEvent::Agent(envelope));
                decoded += 1;
            }
            Err(e) => {
                warn!(error = %e, "skipping record");
                malformed += 1;
            }
        }
    }

    let snapshot = store.snapshot();
    let (applied, duplicates) = applied_and_duplicates(&snapshot);
    eprintln!(
        "Decoded {} records ({} malformed): {} applied, {} duplicates",
        decoded, malformed, applied, duplicates
    );
    let json = serde_json::to_string_pretty(&snapshot)
        .context("Failed to serialize snapshot")?;
    println!("{}", json);
    Ok(())
}

/// Events the trackers applied and dropped as duplicates, over all sessions
fn applied_and_duplicates(snapshot: &StoreSnapshot) -> (u64, u64) {
    snapshot.sessions.values().fold((0, 0), |(applied, duplicates), session| {
        (
            applied + session.applied_events,
            duplicates + session.duplicate_events,
        )
    })
}

fn guess_format(file: &Path) -> FeedFormat {
    match file.extension().and_then(|e| e.to_str()) {
        Some("ndjson") | Some("jsonl") => FeedFormat::Ndjson,
        _ => FeedFormat::Sse,
    }
}
