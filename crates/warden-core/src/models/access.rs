//! Access request and decision types exchanged with the policy engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::policy::{CommandMode, Policy};

/// Role held by a requester.
///
/// `Admin` is the top administrative role and bypasses policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Operator,
    Developer,
    Viewer,
    User,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Operator => "OPERATOR",
            Role::Developer => "DEVELOPER",
            Role::Viewer => "VIEWER",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "OPERATOR" => Ok(Role::Operator),
            "DEVELOPER" => Ok(Role::Developer),
            "VIEWER" => Ok(Role::Viewer),
            "USER" => Ok(Role::User),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// A single connection attempt. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequest {
    pub requester_id: String,
    pub requester_role: Role,
    pub target_server_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl AccessRequest {
    pub fn new(
        requester_id: impl Into<String>,
        requester_role: Role,
        target_server_id: impl Into<String>,
    ) -> Self {
        Self {
            requester_id: requester_id.into(),
            requester_role,
            target_server_id: target_server_id.into(),
            client_ip: None,
            purpose: None,
        }
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }
}

/// Limits attached to a granted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restrictions {
    /// How the command filter treats commands typed in the session
    pub command_mode: CommandMode,

    /// Viewers may watch but their input is never forwarded
    pub read_only: bool,

    /// Extra filter patterns taken from the matching policy
    #[serde(default)]
    pub command_patterns: Vec<String>,

    /// Version of the policy the patterns were taken from
    pub policy_version: u64,
}

/// Outcome of a policy evaluation. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Whether the connection may be opened
    pub allowed: bool,

    /// Human-readable explanation, safe to show to the requester
    pub reason: String,

    /// True when the matching policy needs an approval that does not exist yet
    pub requires_approval: bool,

    /// Policy that produced the decision, if any
    pub policy_id: Option<String>,

    /// Session limits for granted access
    pub restrictions: Option<Restrictions>,
}

impl AccessDecision {
    /// Administrative override: granted without consulting any policy.
    pub fn admin_override() -> Self {
        Self {
            allowed: true,
            reason: "Administrative access".to_string(),
            requires_approval: false,
            policy_id: None,
            restrictions: None,
        }
    }

    /// Denied with no approval path.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            requires_approval: false,
            policy_id: None,
            restrictions: None,
        }
    }

    /// Denied until an approval request for the pair is granted.
    pub fn approval_required(policy: &Policy) -> Self {
        Self {
            allowed: false,
            reason: format!("Access requires prior approval (policy: {})", policy.name),
            requires_approval: true,
            policy_id: Some(policy.id.clone()),
            restrictions: None,
        }
    }

    /// Granted by a matching policy.
    pub fn granted(policy: &Policy, role: Role, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            requires_approval: false,
            policy_id: Some(policy.id.clone()),
            restrictions: Some(Restrictions {
                command_mode: policy.command_mode,
                read_only: role == Role::Viewer,
                command_patterns: policy.command_patterns.clone(),
                policy_version: policy.version,
            }),
        }
    }
}
