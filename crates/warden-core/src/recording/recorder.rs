//! Per-session terminal recorder.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::integrity::checksum;
use crate::clock::Clock;
use crate::error::{RecordingError, RecordingResult};
use crate::models::{
    EventKind, RECORDING_FORMAT, RECORDING_VERSION, RecordingEvent, RecordingPayload,
    StoredRecording,
};
use crate::store::RecordingStore;

#[derive(Debug, Default)]
struct RecorderState {
    started_at: Option<DateTime<Utc>>,
    active: bool,
    events: Vec<RecordingEvent>,
}

/// Captures timestamped input and output for one session and seals it on
/// [`SessionRecorder::stop`].
pub struct SessionRecorder {
    session_id: String,
    width: u16,
    height: u16,
    store: Arc<dyn RecordingStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<RecorderState>,
}

impl SessionRecorder {
    pub fn new(
        session_id: impl Into<String>,
        width: u16,
        height: u16,
        store: Arc<dyn RecordingStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            width,
            height,
            store,
            clock,
            state: Mutex::new(RecorderState::default()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Reset the buffer and start recording from now.
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.started_at = Some(self.clock.now());
        state.events.clear();
        state.active = true;
        debug!(session_id = %self.session_id, "Recording started");
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn record_input(&self, data: &str) {
        self.record(EventKind::Input, data);
    }

    pub fn record_output(&self, data: &str) {
        self.record(EventKind::Output, data);
    }

    /// Ignored unless recording.
    fn record(&self, kind: EventKind, data: &str) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let (true, Some(started_at)) = (state.active, state.started_at) else {
            return;
        };
        let time = (now - started_at).num_milliseconds().max(0) as u64;
        state.events.push(RecordingEvent {
            time,
            kind,
            data: data.to_string(),
        });
    }

    /// Seal and persist the recording.
    ///
    /// Returns `Ok(None)` when the recorder was not active, so stopping twice
    /// is harmless. When the store fails the events are put back and the
    /// recorder stays active, so a later `stop` can retry.
    pub async fn stop(&self) -> RecordingResult<Option<StoredRecording>> {
        let now = self.clock.now();
        let (started_at, events) = {
            let mut state = self.state.lock();
            if !state.active {
                return Ok(None);
            }
            state.active = false;
            let Some(started_at) = state.started_at else {
                return Ok(None);
            };
            (started_at, std::mem::take(&mut state.events))
        };

        let payload = RecordingPayload {
            version: RECORDING_VERSION,
            width: self.width,
            height: self.height,
            timestamp: started_at.timestamp(),
            events,
        };
        let recording = match self.persist(&payload, started_at, now).await {
            Ok(recording) => recording,
            Err(RecordingError::AlreadyExists(id)) => {
                return Err(RecordingError::AlreadyExists(id));
            }
            Err(e) => {
                warn!(
                    session_id = %self.session_id,
                    error = %e,
                    "Recording not sealed, keeping events"
                );
                let mut state = self.state.lock();
                let mut events = payload.events;
                events.append(&mut state.events);
                state.events = events;
                state.active = true;
                return Err(e);
            }
        };

        info!(
            target: "warden::audit",
            session_id = %self.session_id,
            events = payload.events.len(),
            duration = recording.duration,
            checksum = %recording.checksum,
            "Recording sealed"
        );
        Ok(Some(recording))
    }

    async fn persist(
        &self,
        payload: &RecordingPayload,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RecordingResult<StoredRecording> {
        let data = serde_json::to_string(payload)?;
        let recording = StoredRecording {
            session_id: self.session_id.clone(),
            checksum: checksum(&data),
            data,
            format: RECORDING_FORMAT.to_string(),
            duration: (now - started_at).num_seconds().max(0) as u64,
        };

        if !self.store.put_recording(&recording).await? {
            return Err(RecordingError::AlreadyExists(self.session_id.clone()));
        }
        Ok(recording)
    }
}
