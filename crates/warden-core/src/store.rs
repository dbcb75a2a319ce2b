//! Persistence collaborator interfaces.
//!
//! The core only talks to storage through these traits; [`crate::storage::Storage`]
//! implements all of them on top of redb.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ApprovalRequest, ApprovalStatus, Policy, Server, StoredRecording, User};
use crate::storage::ConditionalUpdate;

/// Read access to servers, users and their policies.
#[async_trait]
pub trait AccessDirectory: Send + Sync {
    async fn server(&self, id: &str) -> Result<Option<Server>>;

    async fn user(&self, id: &str) -> Result<Option<User>>;

    /// Active policies attached to the server, unordered.
    async fn policies_for_server(&self, server_id: &str) -> Result<Vec<Policy>>;
}

/// Selection for [`ApprovalStore::list_requests`]; `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct ApprovalFilter {
    pub status: Option<ApprovalStatus>,
    pub requester_id: Option<String>,
    pub server_id: Option<String>,
}

impl ApprovalFilter {
    pub fn matches(&self, request: &ApprovalRequest) -> bool {
        self.status.is_none_or(|status| request.status == status)
            && self
                .requester_id
                .as_deref()
                .is_none_or(|id| request.requester_id == id)
            && self
                .server_id
                .as_deref()
                .is_none_or(|id| request.server_id == id)
    }
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn insert_request(&self, request: &ApprovalRequest) -> Result<()>;

    async fn get_request(&self, id: &str) -> Result<Option<ApprovalRequest>>;

    /// Compare-and-set on status: writes `next` only if the stored request is
    /// still in `expected`.
    async fn update_request_if(
        &self,
        next: &ApprovalRequest,
        expected: ApprovalStatus,
    ) -> Result<ConditionalUpdate>;

    async fn list_requests(&self, filter: &ApprovalFilter) -> Result<Vec<ApprovalRequest>>;

    /// Expire every PENDING request due at `now`, atomically.
    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalRequest>>;
}

#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// Returns false when a recording already exists for the session.
    async fn put_recording(&self, recording: &StoredRecording) -> Result<bool>;

    async fn get_recording(&self, session_id: &str) -> Result<Option<StoredRecording>>;
}
