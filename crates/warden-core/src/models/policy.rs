//! Access policy models.
//!
//! A policy grants (or gates behind approval) shell access to the servers it
//! is attached to, restricted by role, weekday and time of day. Policies are
//! evaluated highest `priority` first; see [`crate::security::select_policy`].

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::access::Role;

/// How a session's command filter treats unmatched commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandMode {
    /// Everything is allowed except blacklisted shapes
    #[default]
    Blacklist,
    /// Only whitelisted commands are allowed
    Whitelist,
}

impl fmt::Display for CommandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandMode::Blacklist => f.write_str("BLACKLIST"),
            CommandMode::Whitelist => f.write_str("WHITELIST"),
        }
    }
}

impl FromStr for CommandMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BLACKLIST" => Ok(CommandMode::Blacklist),
            "WHITELIST" => Ok(CommandMode::Whitelist),
            other => Err(format!("Unknown command mode: {other}")),
        }
    }
}

/// Admin-authored access policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Evaluated highest first
    pub priority: i32,

    pub is_active: bool,

    /// Servers this policy is attached to
    #[serde(default)]
    pub server_ids: Vec<String>,

    /// Empty means any role
    #[serde(default)]
    pub allowed_roles: BTreeSet<Role>,

    /// Weekdays 0-6 with 0 = Sunday. Empty means any day
    #[serde(default)]
    pub allowed_days: BTreeSet<u8>,

    /// "HH:MM", set together with `allowed_end_time`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_start_time: Option<String>,

    /// "HH:MM", set together with `allowed_start_time`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_end_time: Option<String>,

    #[serde(default)]
    pub command_mode: CommandMode,

    /// Appended to the built-in pattern set of `command_mode`
    #[serde(default)]
    pub command_patterns: Vec<String>,

    #[serde(default)]
    pub require_approval: bool,

    /// Roles allowed to decide approval requests gated by this policy
    #[serde(default)]
    pub approver_roles: BTreeSet<Role>,

    /// Bumped whenever the command filter inputs change
    #[serde(default = "default_version")]
    pub version: u64,
}

fn default_version() -> u64 {
    1
}

/// Parsed `allowed_start_time`/`allowed_end_time` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Inclusive on both bounds, at minute precision. A window whose start is
    /// after its end wraps past midnight.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let time = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time);
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

/// Why a policy did not match a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyMiss {
    Inactive,
    Role,
    Day,
    Time,
    /// Time window is malformed; never matches
    InvalidWindow(String),
}

impl Policy {
    /// Create an active, unrestricted blacklist policy.
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            priority,
            is_active: true,
            server_ids: Vec::new(),
            allowed_roles: BTreeSet::new(),
            allowed_days: BTreeSet::new(),
            allowed_start_time: None,
            allowed_end_time: None,
            command_mode: CommandMode::Blacklist,
            command_patterns: Vec::new(),
            require_approval: false,
            approver_roles: BTreeSet::new(),
            version: default_version(),
        }
    }

    pub fn attached_to(mut self, server_id: impl Into<String>) -> Self {
        self.server_ids.push(server_id.into());
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.allowed_roles = roles.into_iter().collect();
        self
    }

    pub fn with_days(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.allowed_days = days.into_iter().collect();
        self
    }

    pub fn with_window(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.allowed_start_time = Some(start.into());
        self.allowed_end_time = Some(end.into());
        self
    }

    pub fn with_command_mode(mut self, mode: CommandMode) -> Self {
        self.command_mode = mode;
        self
    }

    pub fn with_patterns(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn requiring_approval(mut self, approver_roles: impl IntoIterator<Item = Role>) -> Self {
        self.require_approval = true;
        self.approver_roles = approver_roles.into_iter().collect();
        self
    }

    pub fn is_attached_to(&self, server_id: &str) -> bool {
        self.server_ids.iter().any(|id| id == server_id)
    }

    /// Parse the configured time window, if any.
    pub fn time_window(&self) -> Result<Option<TimeWindow>, String> {
        match (&self.allowed_start_time, &self.allowed_end_time) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => Ok(Some(TimeWindow {
                start: parse_hhmm(start)?,
                end: parse_hhmm(end)?,
            })),
            _ => Err("start and end time must be set together".to_string()),
        }
    }

    /// Check role, weekday and time window against a local timestamp.
    ///
    /// `Ok(())` means the policy is the match for the request; every `Err`
    /// means evaluation moves on to the next policy.
    pub fn applies_to(&self, role: Role, local_now: NaiveDateTime) -> Result<(), PolicyMiss> {
        if !self.is_active {
            return Err(PolicyMiss::Inactive);
        }

        if !self.allowed_roles.is_empty() && !self.allowed_roles.contains(&role) {
            return Err(PolicyMiss::Role);
        }

        let weekday = local_now.weekday().num_days_from_sunday() as u8;
        if !self.allowed_days.is_empty() && !self.allowed_days.contains(&weekday) {
            return Err(PolicyMiss::Day);
        }

        match self.time_window() {
            Ok(Some(window)) if !window.contains(local_now.time()) => Err(PolicyMiss::Time),
            Ok(_) => Ok(()),
            Err(reason) => Err(PolicyMiss::InvalidWindow(reason)),
        }
    }
}

fn parse_hhmm(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| format!("invalid time '{value}': {e}"))
}
