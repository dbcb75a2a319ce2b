//! Typed session recording storage wrapper.

use crate::models::StoredRecording;
use anyhow::Result;
use redb::Database;
use std::sync::Arc;

/// Typed recording storage wrapper around warden-storage::SessionRecordingStorage.
///
/// Recordings are write-once: [`SessionRecordingStorage::create`] never
/// replaces an existing row.
#[derive(Debug, Clone)]
pub struct SessionRecordingStorage {
    inner: warden_storage::SessionRecordingStorage,
}

impl SessionRecordingStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        Ok(Self {
            inner: warden_storage::SessionRecordingStorage::new(db)?,
        })
    }

    /// Persist a recording; returns false if one exists for the session
    pub fn create(&self, recording: &StoredRecording) -> Result<bool> {
        let json = serde_json::to_vec(recording)?;
        self.inner.insert_new_raw(&recording.session_id, &json)
    }

    /// Get a recording row without verifying it
    pub fn get_unverified(&self, session_id: &str) -> Result<Option<StoredRecording>> {
        match self.inner.get_raw(session_id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Session IDs with a stored recording
    pub fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .list_raw()?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Overwrite the raw row, bypassing write-once.
    #[cfg(test)]
    pub(crate) fn put_raw_unchecked(&self, session_id: &str, data: &[u8]) -> Result<()> {
        self.inner.put_raw(session_id, data)
    }

    #[cfg(test)]
    pub(crate) fn get_raw(&self, session_id: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get_raw(session_id)
    }
}
