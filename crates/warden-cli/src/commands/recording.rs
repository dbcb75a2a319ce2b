use anyhow::Result;
use chrono::DateTime;
use colored::Colorize;
use comfy_table::{Cell, Table};
use serde_json::json;
use std::io::Write;
use std::time::Duration;

use crate::cli::RecordingCommands;
use crate::output::{OutputFormat, json::print_json, table::print_table};
use warden_core::WardenCore;
use warden_core::models::EventKind;
use warden_core::recording::VerifiedRecording;

/// Longest pause honoured during a realtime replay.
const MAX_REPLAY_GAP: Duration = Duration::from_secs(2);

pub async fn run(core: &WardenCore, command: RecordingCommands, format: OutputFormat) -> Result<()> {
    match command {
        RecordingCommands::List => list_recordings(core, format),
        RecordingCommands::Verify { session_id } => verify(core, &session_id, format).await,
        RecordingCommands::Replay {
            session_id,
            realtime,
            input,
        } => replay(core, &session_id, realtime, input).await,
    }
}

fn list_recordings(core: &WardenCore, format: OutputFormat) -> Result<()> {
    let ids = core.storage.recordings.list_ids()?;

    if format.is_json() {
        return print_json(&ids);
    }

    if ids.is_empty() {
        println!("No recordings.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Session", "Format", "Duration (s)"]);
    for id in ids {
        // Listing does not verify; `recording verify` does.
        let Some(row) = core.storage.recordings.get_unverified(&id)? else {
            continue;
        };
        table.add_row(vec![
            Cell::new(&row.session_id),
            Cell::new(&row.format),
            Cell::new(row.duration),
        ]);
    }
    print_table(table)
}

async fn verify(core: &WardenCore, session_id: &str, format: OutputFormat) -> Result<()> {
    let recording = core.broker.recorders().get_recording(session_id).await?;

    if format.is_json() {
        return print_json(&json!({
            "session_id": recording.session_id,
            "verified": true,
            "checksum": recording.checksum,
            "duration": recording.duration,
            "events": recording.payload.events.len(),
        }));
    }

    print_summary(&recording);
    Ok(())
}

fn print_summary(recording: &VerifiedRecording) {
    let payload = &recording.payload;
    let started = DateTime::from_timestamp(payload.timestamp, 0)
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| payload.timestamp.to_string());

    println!("{} {}", "VERIFIED".green().bold(), recording.session_id);
    println!("  Checksum: {}", recording.checksum);
    println!("  Started:  {started}");
    println!("  Duration: {}s", recording.duration);
    println!("  Terminal: {}x{}", payload.width, payload.height);
    println!(
        "  Events:   {} input, {} output",
        payload.events_of(EventKind::Input).count(),
        payload.events_of(EventKind::Output).count()
    );
}

async fn replay(core: &WardenCore, session_id: &str, realtime: bool, input: bool) -> Result<()> {
    let recording = core.broker.recorders().get_recording(session_id).await?;
    let mut stdout = std::io::stdout();
    let mut last = 0u64;

    for event in recording.payload.replay_events() {
        if realtime {
            let gap = Duration::from_millis(event.time.saturating_sub(last));
            tokio::time::sleep(gap.min(MAX_REPLAY_GAP)).await;
            last = event.time;
        }
        match event.kind {
            EventKind::Output => stdout.write_all(event.data.as_bytes())?,
            EventKind::Input if input => {
                write!(stdout, "{}", event.data.escape_debug().to_string().cyan())?
            }
            EventKind::Input => {}
        }
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
