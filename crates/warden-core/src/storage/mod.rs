//! Storage layer with typed wrappers around warden-storage.
//!
//! This module provides type-safe access to the storage layer by wrapping
//! the byte-level APIs from warden-storage with Rust types from our models,
//! and implements the persistence collaborator traits from [`crate::store`].

pub mod approval;
pub mod policy;
pub mod recording;
pub mod server;
pub mod user;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::Database;
use std::sync::Arc;

use crate::models::{ApprovalRequest, ApprovalStatus, Policy, Server, StoredRecording, User};
use crate::store::{AccessDirectory, ApprovalFilter, ApprovalStore, RecordingStore};

pub use approval::{ApprovalRequestStorage, ConditionalUpdate};
pub use policy::PolicyStorage;
pub use recording::SessionRecordingStorage;
pub use server::ServerStorage;
pub use user::UserStorage;

/// Central storage manager that initializes all storage subsystems.
///
/// Provides typed access to all storage components through wrapper types
/// that convert between Rust models and byte-level storage.
pub struct Storage {
    db: Arc<Database>,
    pub servers: ServerStorage,
    pub users: UserStorage,
    pub policies: PolicyStorage,
    pub approvals: ApprovalRequestStorage,
    pub recordings: SessionRecordingStorage,
}

impl Storage {
    /// Create a new storage instance at the given path.
    pub fn new(path: &str) -> Result<Self> {
        let db = Arc::new(Database::create(path)?);
        Self::from_db(db)
    }

    /// Wrap an already opened database.
    pub fn from_db(db: Arc<Database>) -> Result<Self> {
        let servers = ServerStorage::new(db.clone())?;
        let users = UserStorage::new(db.clone())?;
        let policies = PolicyStorage::new(db.clone())?;
        let approvals = ApprovalRequestStorage::new(db.clone())?;
        let recordings = SessionRecordingStorage::new(db.clone())?;

        Ok(Self {
            db,
            servers,
            users,
            policies,
            approvals,
            recordings,
        })
    }

    /// Get a reference to the underlying database
    pub fn get_db(&self) -> Arc<Database> {
        self.db.clone()
    }
}

#[async_trait]
impl AccessDirectory for Storage {
    async fn server(&self, id: &str) -> Result<Option<Server>> {
        self.servers.get(id)
    }

    async fn user(&self, id: &str) -> Result<Option<User>> {
        self.users.get(id)
    }

    async fn policies_for_server(&self, server_id: &str) -> Result<Vec<Policy>> {
        self.policies.list_active_for_server(server_id)
    }
}

#[async_trait]
impl ApprovalStore for Storage {
    async fn insert_request(&self, request: &ApprovalRequest) -> Result<()> {
        self.approvals.create(request)
    }

    async fn get_request(&self, id: &str) -> Result<Option<ApprovalRequest>> {
        self.approvals.get(id)
    }

    async fn update_request_if(
        &self,
        next: &ApprovalRequest,
        expected: ApprovalStatus,
    ) -> Result<ConditionalUpdate> {
        self.approvals.update_if_status(next, expected)
    }

    async fn list_requests(&self, filter: &ApprovalFilter) -> Result<Vec<ApprovalRequest>> {
        Ok(self
            .approvals
            .list()?
            .into_iter()
            .filter(|request| filter.matches(request))
            .collect())
    }

    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalRequest>> {
        self.approvals.expire_pending(now)
    }
}

#[async_trait]
impl RecordingStore for Storage {
    async fn put_recording(&self, recording: &StoredRecording) -> Result<bool> {
        self.recordings.create(recording)
    }

    async fn get_recording(&self, session_id: &str) -> Result<Option<StoredRecording>> {
        self.recordings.get_unverified(session_id)
    }
}


#[cfg(test)]
mod tests {
    use super::testkit::create_test_storage;
    use super::*;
    use crate::models::Role;
    use chrono::Duration;

    #[tokio::test]
    async fn test_directory_lookups() {
        let (storage, _temp_dir) = create_test_storage();
        storage
            .servers
            .put(&Server::new("srv-1", "web-1", "10.0.0.1", "deploy"))
            .unwrap();
        storage
            .users
            .put(&User::new("u1", "alice", Role::Developer))
            .unwrap();

        assert_eq!(storage.server("srv-1").await.unwrap().unwrap().host, "10.0.0.1");
        assert_eq!(storage.user("u1").await.unwrap().unwrap().role, Role::Developer);
        assert!(storage.server("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_requests_filter() {
        let (storage, _temp_dir) = create_test_storage();
        let now = Utc::now();
        for (user, server) in [("u1", "s1"), ("u1", "s2"), ("u2", "s1")] {
            storage
                .insert_request(&ApprovalRequest::new(user, server, "x", now, Duration::hours(1)))
                .await
                .unwrap();
        }

        let filter = ApprovalFilter {
            requester_id: Some("u1".to_string()),
            ..Default::default()
        };
        assert_eq!(storage.list_requests(&filter).await.unwrap().len(), 2);

        let filter = ApprovalFilter {
            server_id: Some("s1".to_string()),
            status: Some(ApprovalStatus::Pending),
            ..Default::default()
        };
        assert_eq!(storage.list_requests(&filter).await.unwrap().len(), 2);

        let filter = ApprovalFilter {
            status: Some(ApprovalStatus::Approved),
            ..Default::default()
        };
        assert!(storage.list_requests(&filter).await.unwrap().is_empty());
    }
}
