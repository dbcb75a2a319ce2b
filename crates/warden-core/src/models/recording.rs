//! Session recording models.
//!
//! The serialized [`RecordingPayload`] is the one at-rest schema Warden
//! defines. Changing its shape requires bumping [`RECORDING_VERSION`] and
//! migrating stored recordings.

use serde::{Deserialize, Serialize};

/// Schema version written into every payload.
pub const RECORDING_VERSION: u32 = 2;

/// Format tag stored next to the payload.
pub const RECORDING_FORMAT: &str = "warden-cast";

/// Direction of a recorded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Input,
    Output,
}

/// One captured chunk of terminal traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingEvent {
    /// Milliseconds since the recording started
    pub time: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: String,
}

/// The sealed body of a recording; the checksum covers its serialized bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingPayload {
    pub version: u32,
    pub width: u16,
    pub height: u16,
    /// Unix timestamp (seconds) of the recording start
    pub timestamp: i64,
    pub events: Vec<RecordingEvent>,
}

impl RecordingPayload {
    /// Events of both directions interleaved by time.
    ///
    /// Insertion order across directions carries no meaning; the sort is
    /// stable so each direction keeps its arrival order.
    pub fn replay_events(&self) -> Vec<&RecordingEvent> {
        let mut events: Vec<&RecordingEvent> = self.events.iter().collect();
        events.sort_by_key(|event| event.time);
        events
    }

    /// Events of one direction in arrival order.
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &RecordingEvent> {
        self.events.iter().filter(move |event| event.kind == kind)
    }
}

/// Row persisted when a recorder stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecording {
    pub session_id: String,
    /// Serialized [`RecordingPayload`], exactly the bytes that were hashed
    pub data: String,
    pub format: String,
    /// Whole seconds between start and stop
    pub duration: u64,
    /// Lowercase hex SHA-256 of `data`
    pub checksum: String,
}
