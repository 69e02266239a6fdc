//! `foldline replay`: fold a session log offline.

use std::path::PathBuf;

use foldline_agent::{EventLog, SliceRegistry, fold_events};
use foldline_core::store::EventStore;
use foldline_store::FileEventStore;

pub async fn run(file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileEventStore::new(&file);
    let events = store.load_events().await?;
    let log = EventLog::from_events(events)?;
    let state = fold_events(&SliceRegistry::empty(), log.events())?;

    eprintln!("  Replayed {} events from {}", log.len(), file.display());
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
