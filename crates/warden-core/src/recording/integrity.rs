//! Checksums and verified reads of stored recordings.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{RecordingError, RecordingResult};
use crate::models::{RECORDING_VERSION, RecordingPayload, StoredRecording};
use crate::store::RecordingStore;

/// Lowercase hex SHA-256 of `data`.
pub fn checksum(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// A recording whose checksum matched its stored bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedRecording {
    pub session_id: String,
    pub format: String,
    pub duration: u64,
    pub checksum: String,
    pub payload: RecordingPayload,
}

/// Check a stored row and decode its payload.
///
/// The payload is only parsed after the checksum matched.
pub fn verify(recording: StoredRecording) -> RecordingResult<VerifiedRecording> {
    let actual = checksum(&recording.data);
    if actual != recording.checksum {
        warn!(
            target: "warden::audit",
            session_id = %recording.session_id,
            expected = %recording.checksum,
            actual = %actual,
            "Recording failed integrity check"
        );
        return Err(RecordingError::Integrity {
            session_id: recording.session_id,
            expected: recording.checksum,
            actual,
        });
    }

    let payload: RecordingPayload = serde_json::from_str(&recording.data)?;
    if payload.version != RECORDING_VERSION {
        return Err(RecordingError::UnsupportedVersion {
            found: payload.version,
            expected: RECORDING_VERSION,
        });
    }

    Ok(VerifiedRecording {
        session_id: recording.session_id,
        format: recording.format,
        duration: recording.duration,
        checksum: recording.checksum,
        payload,
    })
}

/// Load a recording and verify it before returning anything.
pub async fn get_recording(
    store: &dyn RecordingStore,
    session_id: &str,
) -> RecordingResult<VerifiedRecording> {
    let recording = store
        .get_recording(session_id)
        .await?
        .ok_or_else(|| RecordingError::NotFound(session_id.to_string()))?;
    verify(recording)
}
