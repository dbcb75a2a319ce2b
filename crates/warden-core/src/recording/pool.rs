//! Live recorders keyed by session id.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

use super::integrity::{VerifiedRecording, get_recording};
use super::recorder::SessionRecorder;
use crate::clock::Clock;
use crate::connection::TerminalSize;
use crate::error::RecordingResult;
use crate::models::StoredRecording;
use crate::store::RecordingStore;

pub struct RecorderPool {
    recorders: DashMap<String, Arc<SessionRecorder>>,
    store: Arc<dyn RecordingStore>,
    clock: Arc<dyn Clock>,
    enabled: bool,
}

impl RecorderPool {
    pub fn new(store: Arc<dyn RecordingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            recorders: DashMap::new(),
            store,
            clock,
            enabled: true,
        }
    }

    /// With recording disabled, [`Self::start`] never creates recorders.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Create and start the session's recorder. An existing recorder for the
    /// session is returned as is.
    pub fn start(&self, session_id: &str, size: TerminalSize) -> Option<Arc<SessionRecorder>> {
        if !self.enabled {
            return None;
        }
        let recorder = self
            .recorders
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let recorder = SessionRecorder::new(
                    session_id,
                    size.cols,
                    size.rows,
                    self.store.clone(),
                    self.clock.clone(),
                );
                recorder.start();
                Arc::new(recorder)
            })
            .clone();
        Some(recorder)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionRecorder>> {
        self.recorders.get(session_id).map(|entry| entry.clone())
    }

    pub fn record_input(&self, session_id: &str, data: &str) {
        if let Some(recorder) = self.recorders.get(session_id) {
            recorder.record_input(data);
        }
    }

    pub fn record_output(&self, session_id: &str, data: &str) {
        if let Some(recorder) = self.recorders.get(session_id) {
            recorder.record_output(data);
        }
    }

    /// Stop the session's recorder and drop it from the pool. Stopping an
    /// unknown session returns `Ok(None)`. A recorder whose recording could
    /// not be written stays in the pool with its events.
    pub async fn stop(&self, session_id: &str) -> RecordingResult<Option<StoredRecording>> {
        let Some((_, recorder)) = self.recorders.remove(session_id) else {
            return Ok(None);
        };
        let result = recorder.stop().await;
        if result.is_err() && recorder.is_active() {
            self.recorders
                .entry(session_id.to_string())
                .or_insert(recorder);
        }
        result
    }

    /// Stop every recorder, logging failures.
    pub async fn stop_all(&self) -> usize {
        let session_ids: Vec<String> = self
            .recorders
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let mut stopped = 0;
        for session_id in session_ids {
            match self.stop(&session_id).await {
                Ok(Some(_)) => stopped += 1,
                Ok(None) => {}
                Err(e) => warn!(session_id = %session_id, error = %e, "Failed to seal recording"),
            }
        }
        stopped
    }

    /// Verified read of a stored recording.
    pub async fn get_recording(&self, session_id: &str) -> RecordingResult<VerifiedRecording> {
        get_recording(self.store.as_ref(), session_id).await
    }

    pub fn len(&self) -> usize {
        self.recorders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::EventKind;
    use crate::storage::Storage;
    use crate::storage::testkit::create_test_storage;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Fails the first `failures` writes.
    struct FlakyStore {
        inner: Arc<Storage>,
        failures: Mutex<u32>,
    }

    #[async_trait]
    impl RecordingStore for FlakyStore {
        async fn put_recording(&self, recording: &StoredRecording) -> anyhow::Result<bool> {
            {
                let mut failures = self.failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    anyhow::bail!("disk full");
                }
            }
            self.inner.put_recording(recording).await
        }

        async fn get_recording(&self, session_id: &str) -> anyhow::Result<Option<StoredRecording>> {
            self.inner.get_recording(session_id).await
        }
    }

    #[tokio::test]
    async fn test_stop_removes_recorder() {
        let (storage, _temp_dir) = create_test_storage();
        let pool = RecorderPool::new(storage, Arc::new(SystemClock));

        pool.start("s1", TerminalSize::default()).unwrap();
        pool.record_input("s1", "id\r");
        pool.record_output("s1", "uid=1000\r\n");
        assert_eq!(pool.len(), 1);

        let stored = pool.stop("s1").await.unwrap().unwrap();
        assert_eq!(stored.session_id, "s1");
        assert!(pool.is_empty());
        assert!(pool.stop("s1").await.unwrap().is_none());

        let verified = pool.get_recording("s1").await.unwrap();
        assert_eq!(verified.payload.events_of(EventKind::Input).count(), 1);
        assert_eq!((verified.payload.width, verified.payload.height), (80, 24));
    }

    #[tokio::test]
    async fn test_start_is_per_session() {
        let (storage, _temp_dir) = create_test_storage();
        let pool = RecorderPool::new(storage, Arc::new(SystemClock));

        let a = pool.start("s1", TerminalSize::default()).unwrap();
        a.record_input("x");
        let again = pool.start("s1", TerminalSize::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(again.event_count(), 1);

        pool.start("s2", TerminalSize::default()).unwrap();
        pool.record_output("s2", "y");
        assert_eq!(a.event_count(), 1);
        assert_eq!(pool.stop_all().await, 2);
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_recorder_for_retry() {
        let (storage, _temp_dir) = create_test_storage();
        let store = Arc::new(FlakyStore {
            inner: storage,
            failures: Mutex::new(1),
        });
        let pool = RecorderPool::new(store, Arc::new(SystemClock));

        pool.start("s1", TerminalSize::default()).unwrap();
        pool.record_input("s1", "uptime\r");
        assert!(pool.stop("s1").await.is_err());
        assert_eq!(pool.len(), 1);

        // Still recording after the failure.
        pool.record_output("s1", "up 3 days\r\n");

        let stored = pool.stop("s1").await.unwrap().unwrap();
        assert!(pool.is_empty());
        let verified = pool.get_recording("s1").await.unwrap();
        assert_eq!(verified.checksum, stored.checksum);
        let data: Vec<_> = verified.payload.events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["uptime\r", "up 3 days\r\n"]);
    }

    #[tokio::test]
    async fn test_unknown_session_is_ignored() {
        let (storage, _temp_dir) = create_test_storage();
        let pool = RecorderPool::new(storage, Arc::new(SystemClock));
        pool.record_input("ghost", "x");
        pool.record_output("ghost", "y");
        assert!(pool.stop("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disabled_pool_records_nothing() {
        let (storage, _temp_dir) = create_test_storage();
        let pool = RecorderPool::new(storage, Arc::new(SystemClock)).with_enabled(false);
        assert!(pool.start("s1", TerminalSize::default()).is_none());
        assert!(pool.is_empty());
    }
}
