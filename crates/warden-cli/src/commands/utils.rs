use anyhow::{Result, bail};
use chrono::{DateTime, Local, Utc};
use colored::{ColoredString, Colorize};
use warden_core::models::{ApprovalRequest, ApprovalStatus};

pub fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

pub fn status_label(status: ApprovalStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        ApprovalStatus::Pending => label.yellow(),
        ApprovalStatus::Approved => label.green(),
        ApprovalStatus::Rejected => label.red(),
        ApprovalStatus::Expired => label.dimmed(),
    }
}

/// Resolve a full request id from an exact id or a unique prefix.
pub fn resolve_request_id(requests: &[ApprovalRequest], id: &str) -> Result<String> {
    // Try exact match first
    if requests.iter().any(|request| request.id == id) {
        return Ok(id.to_string());
    }

    // Try prefix match
    let matches: Vec<&ApprovalRequest> = requests
        .iter()
        .filter(|request| request.id.starts_with(id))
        .collect();

    match matches.as_slice() {
        [] => bail!("Approval request not found: {id}"),
        [request] => Ok(request.id.clone()),
        _ => bail!("Approval id '{id}' is ambiguous"),
    }
}
