//! Approval request models and the approval state machine.
//!
//! ```text
//!            approve
//!   PENDING ─────────► APPROVED
//!      │  \   reject
//!      │   ──────────► REJECTED
//!      │      expire
//!      └─────────────► EXPIRED
//! ```
//!
//! Every status change goes through [`ApprovalStatus::transition`]; terminal
//! states reject all actions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    /// Awaiting an approver decision
    #[default]
    Pending,
    /// An approver granted the request
    Approved,
    /// An approver refused the request
    Rejected,
    /// Swept after `expires_at` passed without a decision
    Expired,
}

/// Something that can happen to an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    Expire,
}

/// Attempted a transition the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action:?} a request that is {from}")]
pub struct InvalidTransition {
    pub from: ApprovalStatus,
    pub action: ApprovalAction,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    /// The only place a status changes.
    pub fn transition(self, action: ApprovalAction) -> Result<ApprovalStatus, InvalidTransition> {
        match (self, action) {
            (ApprovalStatus::Pending, ApprovalAction::Approve) => Ok(ApprovalStatus::Approved),
            (ApprovalStatus::Pending, ApprovalAction::Reject) => Ok(ApprovalStatus::Rejected),
            (ApprovalStatus::Pending, ApprovalAction::Expire) => Ok(ApprovalStatus::Expired),
            (from, action) => Err(InvalidTransition { from, action }),
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
            ApprovalStatus::Expired => "EXPIRED",
        };
        f.write_str(label)
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ApprovalStatus::Pending),
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            "EXPIRED" => Ok(ApprovalStatus::Expired),
            other => Err(format!("Unknown approval status: {other}")),
        }
    }
}

/// Persisted elevation request for one (requester, server) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub requester_id: String,
    pub server_id: String,
    pub purpose: String,
    pub status: ApprovalStatus,

    /// Set once an approver decides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_id: Option<String>,

    /// When the approver decided (approve or reject)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ApprovalRequest {
    /// Create a new pending request that expires `duration` after `now`,
    /// saturating at the latest representable time.
    pub fn new(
        requester_id: impl Into<String>,
        server_id: impl Into<String>,
        purpose: impl Into<String>,
        now: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            requester_id: requester_id.into(),
            server_id: server_id.into(),
            purpose: purpose.into(),
            status: ApprovalStatus::Pending,
            approver_id: None,
            approved_at: None,
            created_at: now,
            expires_at: now
                .checked_add_signed(duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            notes: None,
        }
    }

    /// True once `expires_at` is no longer in the future.
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Approved and not yet expired.
    pub fn grants_access_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Approved && self.expires_at > now
    }

    /// Apply an approver decision, returning the updated request.
    pub fn decide(
        &self,
        action: ApprovalAction,
        approver_id: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, InvalidTransition> {
        let status = self.status.transition(action)?;
        let mut next = self.clone();
        next.status = status;
        next.approver_id = Some(approver_id.to_string());
        next.approved_at = Some(now);
        next.notes = notes;
        Ok(next)
    }

    /// Apply the expiry sweep, returning the updated request.
    pub fn expire(&self) -> Result<ApprovalRequest, InvalidTransition> {
        let status = self.status.transition(ApprovalAction::Expire)?;
        let mut next = self.clone();
        next.status = status;
        Ok(next)
    }
}
