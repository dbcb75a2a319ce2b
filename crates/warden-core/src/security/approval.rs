//! Approval workflow for elevated server access.
//!
//! Requests are created PENDING and decided exactly once. Status changes are
//! written with a compare-and-set on the stored status, so two approvers
//! racing on the same request cannot both win.

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{ApprovalError, ApprovalResult};
use crate::models::{ApprovalAction, ApprovalRequest, ApprovalStatus};
use crate::storage::ConditionalUpdate;
use crate::store::{AccessDirectory, ApprovalFilter, ApprovalStore};

/// Default lifetime of a new request, in hours.
pub const DEFAULT_APPROVAL_HOURS: u32 = 8;
/// Default upper bound on a requested lifetime, in hours.
pub const MAX_APPROVAL_HOURS: u32 = 7 * 24;

/// Callback trait for approval notifications.
///
/// Implement this to hand requests to a notification channel (email, chat).
/// Callback failures are logged and never fail the workflow operation.
#[async_trait]
pub trait ApprovalCallback: Send + Sync {
    /// Called when a new approval request is created.
    async fn request_created(&self, request: &ApprovalRequest) -> anyhow::Result<()>;

    /// Called when a request is approved, rejected or expired.
    async fn on_resolved(&self, request: &ApprovalRequest) -> anyhow::Result<()> {
        let _ = request;
        Ok(())
    }
}

/// An approver's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl From<ApprovalDecision> for ApprovalAction {
    fn from(decision: ApprovalDecision) -> Self {
        match decision {
            ApprovalDecision::Approve => ApprovalAction::Approve,
            ApprovalDecision::Reject => ApprovalAction::Reject,
        }
    }
}

pub struct ApprovalWorkflow {
    store: Arc<dyn ApprovalStore>,
    clock: Arc<dyn Clock>,

    /// When set, approvers are checked against users and policies
    directory: Option<Arc<dyn AccessDirectory>>,

    callback: Option<Arc<dyn ApprovalCallback>>,

    default_duration_hours: u32,
    max_duration_hours: u32,
}

impl ApprovalWorkflow {
    pub fn new(store: Arc<dyn ApprovalStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            directory: None,
            callback: None,
            default_duration_hours: DEFAULT_APPROVAL_HOURS,
            max_duration_hours: MAX_APPROVAL_HOURS,
        }
    }

    /// Require approvers to be active users allowed by the server's policies.
    pub fn with_directory(mut self, directory: Arc<dyn AccessDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ApprovalCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_default_duration(mut self, hours: u32) -> Self {
        self.default_duration_hours = hours.max(1);
        self
    }

    pub fn with_max_duration(mut self, hours: u32) -> Self {
        self.max_duration_hours = hours.max(1);
        self
    }

    /// Create a PENDING request expiring `duration_hours` from now (default 8).
    ///
    /// The lifetime must be between one hour and the configured maximum.
    pub async fn create_approval_request(
        &self,
        requester_id: &str,
        server_id: &str,
        purpose: &str,
        duration_hours: Option<u32>,
    ) -> ApprovalResult<ApprovalRequest> {
        let hours = duration_hours.unwrap_or(self.default_duration_hours);
        let max = self.max_duration_hours;
        if hours == 0 || hours > max {
            return Err(ApprovalError::InvalidDuration { hours, max });
        }

        let now = self.clock.now();
        let duration = Duration::hours(i64::from(hours));
        if now.checked_add_signed(duration).is_none() {
            return Err(ApprovalError::InvalidDuration { hours, max });
        }
        let request = ApprovalRequest::new(requester_id, server_id, purpose, now, duration);
        self.store.insert_request(&request).await?;

        info!(
            target: "warden::audit",
            request_id = %request.id,
            requester_id,
            server_id,
            expires_at = %request.expires_at,
            "Approval requested"
        );

        if let Some(callback) = &self.callback
            && let Err(e) = callback.request_created(&request).await
        {
            warn!(request_id = %request.id, error = %e, "Approval callback failed");
        }

        Ok(request)
    }

    /// Approve or reject a PENDING request.
    ///
    /// Fails with [`ApprovalError::NotPending`] on a request that was already
    /// decided or expired, including one that lost a concurrent race. A
    /// pending request already past its expiry is expired instead of decided.
    pub async fn process_approval(
        &self,
        request_id: &str,
        approver_id: &str,
        decision: ApprovalDecision,
        notes: Option<String>,
    ) -> ApprovalResult<ApprovalRequest> {
        let current = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| ApprovalError::NotFound(request_id.to_string()))?;

        if current.status.is_terminal() {
            return Err(ApprovalError::NotPending {
                id: current.id,
                status: current.status,
            });
        }

        let now = self.clock.now();
        if current.is_past_due(now) {
            let expired = current.expire().map_err(not_pending(&current.id))?;
            self.write(&expired).await?;
            return Err(ApprovalError::NotPending {
                id: expired.id,
                status: ApprovalStatus::Expired,
            });
        }

        self.authorize(&current, approver_id).await?;

        let next = current
            .decide(decision.into(), approver_id, notes, now)
            .map_err(not_pending(&current.id))?;
        let decided = self.write(&next).await?;

        info!(
            target: "warden::audit",
            request_id = %decided.id,
            requester_id = %decided.requester_id,
            server_id = %decided.server_id,
            approver_id,
            status = %decided.status,
            "Approval decided"
        );
        self.notify_resolved(&decided).await;

        Ok(decided)
    }

    /// Compare-and-set from PENDING.
    async fn write(&self, next: &ApprovalRequest) -> ApprovalResult<ApprovalRequest> {
        match self
            .store
            .update_request_if(next, ApprovalStatus::Pending)
            .await?
        {
            ConditionalUpdate::Updated(request) => Ok(request),
            ConditionalUpdate::Conflict(current) => Err(ApprovalError::NotPending {
                id: current.id,
                status: current.status,
            }),
            ConditionalUpdate::Missing => Err(ApprovalError::NotFound(next.id.clone())),
        }
    }

    /// With a directory configured, the approver must be an active user other
    /// than the requester, holding ADMIN or an approver role of an active
    /// approval-gated policy on the server.
    async fn authorize(&self, request: &ApprovalRequest, approver_id: &str) -> ApprovalResult<()> {
        let Some(directory) = &self.directory else {
            return Ok(());
        };

        if approver_id == request.requester_id {
            return Err(ApprovalError::NotAuthorized(
                "requesters cannot approve their own requests".to_string(),
            ));
        }

        let approver = match directory.user(approver_id).await? {
            Some(user) if user.is_active => user,
            _ => {
                return Err(ApprovalError::NotAuthorized(format!(
                    "unknown or inactive approver {approver_id}"
                )));
            }
        };
        if approver.role.is_admin() {
            return Ok(());
        }

        let policies = directory.policies_for_server(&request.server_id).await?;
        let allowed = policies
            .iter()
            .filter(|policy| policy.is_active && policy.require_approval)
            .any(|policy| policy.approver_roles.contains(&approver.role));
        if allowed {
            Ok(())
        } else {
            Err(ApprovalError::NotAuthorized(format!(
                "role {} cannot approve access to {}",
                approver.role, request.server_id
            )))
        }
    }

    /// True iff an APPROVED, unexpired request exists for the pair.
    pub async fn has_valid_approval(&self, user_id: &str, server_id: &str) -> ApprovalResult<bool> {
        let filter = ApprovalFilter {
            status: Some(ApprovalStatus::Approved),
            requester_id: Some(user_id.to_string()),
            server_id: Some(server_id.to_string()),
        };
        let now = self.clock.now();
        let requests = self.store.list_requests(&filter).await?;
        Ok(requests.iter().any(|request| request.grants_access_at(now)))
    }

    /// Expire every PENDING request past its expiry. Returns the number of
    /// requests expired; a second run right after finds nothing.
    pub async fn expire_old_requests(&self) -> ApprovalResult<usize> {
        let expired = self.store.expire_pending(self.clock.now()).await?;

        if expired.is_empty() {
            debug!("No approval requests to expire");
        } else {
            info!(target: "warden::audit", count = expired.len(), "Expired approval requests");
            for request in &expired {
                self.notify_resolved(request).await;
            }
        }

        Ok(expired.len())
    }

    pub async fn get_request(&self, request_id: &str) -> ApprovalResult<ApprovalRequest> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or_else(|| ApprovalError::NotFound(request_id.to_string()))
    }

    /// Requests matching `filter`, newest first.
    pub async fn list_requests(&self, filter: &ApprovalFilter) -> ApprovalResult<Vec<ApprovalRequest>> {
        let mut requests = self.store.list_requests(filter).await?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(requests)
    }

    /// Run [`Self::expire_old_requests`] every `interval` until the returned
    /// handle is aborted.
    pub fn spawn_expiry_sweeper(self: Arc<Self>, interval: std::time::Duration) -> SweeperHandle {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.expire_old_requests().await {
                    warn!(error = %e, "Approval expiry sweep failed");
                }
            }
        });
        SweeperHandle { handle }
    }

    async fn notify_resolved(&self, request: &ApprovalRequest) {
        if let Some(callback) = &self.callback
            && let Err(e) = callback.on_resolved(request).await
        {
            warn!(request_id = %request.id, error = %e, "Approval callback failed");
        }
    }
}

fn not_pending(id: &str) -> impl FnOnce(crate::models::InvalidTransition) -> ApprovalError + '_ {
    move |e| ApprovalError::NotPending {
        id: id.to_string(),
        status: e.from,
    }
}

/// Background expiry sweep; stops when dropped.
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
