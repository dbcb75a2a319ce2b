use anyhow::Result;
use comfy_table::{Cell, Table};
use serde_json::json;

use crate::cli::{ApprovalCommands, DecideArgs};
use crate::commands::utils::{format_time, resolve_request_id, short_id, status_label};
use crate::output::{OutputFormat, json::print_json, table::print_table};
use warden_core::WardenCore;
use warden_core::models::ApprovalStatus;
use warden_core::security::ApprovalDecision;
use warden_core::store::ApprovalFilter;

pub async fn run(core: &WardenCore, command: ApprovalCommands, format: OutputFormat) -> Result<()> {
    match command {
        ApprovalCommands::List {
            status,
            requester,
            server,
        } => {
            let filter = ApprovalFilter {
                status,
                requester_id: requester,
                server_id: server,
            };
            list_requests(core, &filter, format).await
        }
        ApprovalCommands::Request {
            user,
            server,
            purpose,
            hours,
        } => create_request(core, &user, &server, &purpose, hours, format).await,
        ApprovalCommands::Approve(args) => decide(core, args, ApprovalDecision::Approve, format).await,
        ApprovalCommands::Reject(args) => decide(core, args, ApprovalDecision::Reject, format).await,
        ApprovalCommands::Expire => expire(core, format).await,
    }
}

async fn list_requests(core: &WardenCore, filter: &ApprovalFilter, format: OutputFormat) -> Result<()> {
    let requests = core.approvals.list_requests(filter).await?;

    if format.is_json() {
        return print_json(&requests);
    }

    if requests.is_empty() {
        println!("No approval requests.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "ID", "Status", "Requester", "Server", "Purpose", "Approver", "Expires",
    ]);

    for request in requests {
        table.add_row(vec![
            Cell::new(short_id(&request.id)),
            Cell::new(request.status),
            Cell::new(&request.requester_id),
            Cell::new(&request.server_id),
            Cell::new(&request.purpose),
            Cell::new(request.approver_id.as_deref().unwrap_or("-")),
            Cell::new(format_time(request.expires_at)),
        ]);
    }

    print_table(table)
}

async fn create_request(
    core: &WardenCore,
    user: &str,
    server: &str,
    purpose: &str,
    hours: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let request = core
        .approvals
        .create_approval_request(user, server, purpose, hours)
        .await?;

    if format.is_json() {
        return print_json(&request);
    }

    println!("Approval requested: {}", request.id);
    println!("  Expires: {}", format_time(request.expires_at));
    Ok(())
}

async fn decide(
    core: &WardenCore,
    args: DecideArgs,
    decision: ApprovalDecision,
    format: OutputFormat,
) -> Result<()> {
    let pending = core
        .approvals
        .list_requests(&ApprovalFilter {
            status: Some(ApprovalStatus::Pending),
            ..Default::default()
        })
        .await?;
    // Decided requests are still addressable by full id for a clear error.
    let id = resolve_request_id(&pending, &args.id).unwrap_or(args.id);

    let request = core
        .approvals
        .process_approval(&id, &args.approver, decision, args.notes)
        .await?;

    if format.is_json() {
        return print_json(&request);
    }

    println!(
        "Approval {}: {}",
        short_id(&request.id),
        status_label(request.status)
    );
    Ok(())
}

async fn expire(core: &WardenCore, format: OutputFormat) -> Result<()> {
    let expired = core.approvals.expire_old_requests().await?;

    if format.is_json() {
        return print_json(&json!({ "expired": expired }));
    }

    println!("Expired {expired} approval request(s).");
    Ok(())
}
