//! Typed approval request storage wrapper.

use crate::models::{ApprovalRequest, ApprovalStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use redb::Database;
use std::sync::Arc;

/// Outcome of a conditional status update.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalUpdate {
    Updated(ApprovalRequest),
    /// The stored status was not the expected one; nothing was written
    Conflict(ApprovalRequest),
    Missing,
}

/// Typed approval request storage wrapper around warden-storage::ApprovalRequestStorage.
#[derive(Debug, Clone)]
pub struct ApprovalRequestStorage {
    inner: warden_storage::ApprovalRequestStorage,
}

impl ApprovalRequestStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        Ok(Self {
            inner: warden_storage::ApprovalRequestStorage::new(db)?,
        })
    }

    /// Create a new request (fails if the ID already exists)
    pub fn create(&self, request: &ApprovalRequest) -> Result<()> {
        let json = serde_json::to_vec(request)?;
        if !self.inner.insert_new_raw(&request.id, &json)? {
            return Err(anyhow::anyhow!(
                "Approval request {} already exists",
                request.id
            ));
        }
        Ok(())
    }

    /// Get a request by ID
    pub fn get(&self, id: &str) -> Result<Option<ApprovalRequest>> {
        match self.inner.get_raw(id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// List all requests, newest first
    pub fn list(&self) -> Result<Vec<ApprovalRequest>> {
        let mut requests = self
            .inner
            .list_raw()?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice::<ApprovalRequest>(&bytes))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    /// Replace a request only if its stored status is still `expected`.
    pub fn update_if_status(
        &self,
        next: &ApprovalRequest,
        expected: ApprovalStatus,
    ) -> Result<ConditionalUpdate> {
        let mut conflict = None;
        let written = self.inner.update_raw(&next.id, |current| {
            let current: ApprovalRequest = serde_json::from_slice(current)?;
            if current.status != expected {
                conflict = Some(current);
                return Ok(None);
            }
            Ok(Some(serde_json::to_vec(next)?))
        })?;

        match (written, conflict) {
            (Some(_), _) => Ok(ConditionalUpdate::Updated(next.clone())),
            (None, Some(current)) => Ok(ConditionalUpdate::Conflict(current)),
            (None, None) => Ok(ConditionalUpdate::Missing),
        }
    }

    /// Move every PENDING request whose expiry is not after `now` to EXPIRED.
    ///
    /// Runs as one transaction and returns the requests that were expired.
    pub fn expire_pending(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalRequest>> {
        let mut expired = Vec::new();
        self.inner.update_all_raw(|_, bytes| {
            let request: ApprovalRequest = serde_json::from_slice(bytes)?;
            if request.status != ApprovalStatus::Pending || !request.is_past_due(now) {
                return Ok(None);
            }
            let next = request.expire()?;
            let json = serde_json::to_vec(&next)?;
            expired.push(next);
            Ok(Some(json))
        })?;
        Ok(expired)
    }

    /// Delete a request
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApprovalAction;
    use chrono::Duration;
    use tempfile::tempdir;

    fn setup() -> (ApprovalRequestStorage, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Arc::new(Database::create(db_path).unwrap());
        let storage = ApprovalRequestStorage::new(db).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_create_duplicate_fails() {
        let (storage, _temp_dir) = setup();
        let request = ApprovalRequest::new("u1", "s1", "deploy", Utc::now(), Duration::hours(8));
        storage.create(&request).unwrap();
        assert!(storage.create(&request).is_err());
    }

    #[test]
    fn test_update_if_status_detects_conflict() {
        let (storage, _temp_dir) = setup();
        let now = Utc::now();
        let request = ApprovalRequest::new("u1", "s1", "deploy", now, Duration::hours(8));
        storage.create(&request).unwrap();

        let approved = request
            .decide(ApprovalAction::Approve, "boss", None, now)
            .unwrap();
        let first = storage
            .update_if_status(&approved, ApprovalStatus::Pending)
            .unwrap();
        assert_eq!(first, ConditionalUpdate::Updated(approved.clone()));

        let rejected = request
            .decide(ApprovalAction::Reject, "other", None, now)
            .unwrap();
        let second = storage
            .update_if_status(&rejected, ApprovalStatus::Pending)
            .unwrap();
        assert_eq!(second, ConditionalUpdate::Conflict(approved));
        assert_eq!(
            storage.get(&request.id).unwrap().unwrap().status,
            ApprovalStatus::Approved
        );
    }

    #[test]
    fn test_update_if_status_missing() {
        let (storage, _temp_dir) = setup();
        let request = ApprovalRequest::new("u1", "s1", "deploy", Utc::now(), Duration::hours(8));
        let outcome = storage
            .update_if_status(&request, ApprovalStatus::Pending)
            .unwrap();
        assert_eq!(outcome, ConditionalUpdate::Missing);
    }

    #[test]
    fn test_expire_pending_only_touches_past_due() {
        let (storage, _temp_dir) = setup();
        let now = Utc::now();
        let stale = ApprovalRequest::new("u1", "s1", "old", now - Duration::hours(9), Duration::hours(8));
        let fresh = ApprovalRequest::new("u1", "s1", "new", now, Duration::hours(8));
        let decided = ApprovalRequest::new("u2", "s1", "done", now - Duration::hours(9), Duration::hours(8))
            .decide(ApprovalAction::Approve, "boss", None, now - Duration::hours(9))
            .unwrap();
        for request in [&stale, &fresh, &decided] {
            storage.create(request).unwrap();
        }

        let expired = storage.expire_pending(now).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale.id);
        assert_eq!(
            storage.get(&decided.id).unwrap().unwrap().status,
            ApprovalStatus::Approved
        );

        assert!(storage.expire_pending(now).unwrap().is_empty());
    }
}
