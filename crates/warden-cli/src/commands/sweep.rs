use anyhow::Result;
use serde_json::json;
use tracing::info;

use crate::output::{OutputFormat, json::print_json};
use warden_core::WardenCore;

/// Sweep once, or keep the periodic sweeper running until Ctrl-C.
pub async fn run(core: &WardenCore, once: bool, format: OutputFormat) -> Result<()> {
    if once {
        let expired = core.approvals.expire_old_requests().await?;
        if format.is_json() {
            return print_json(&json!({ "expired": expired }));
        }
        println!("Expired {expired} approval request(s).");
        return Ok(());
    }

    let sweeper = core.spawn_expiry_sweeper();
    info!(
        interval_secs = core.config.approval.sweep_interval_secs,
        "Approval expiry sweeper running; press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;
    sweeper.abort();
    info!("Approval expiry sweeper stopped");
    Ok(())
}
