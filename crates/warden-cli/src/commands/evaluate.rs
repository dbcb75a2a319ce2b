use anyhow::Result;
use colored::Colorize;

use crate::cli::EvaluateArgs;
use crate::output::{OutputFormat, json::print_json};
use warden_core::WardenCore;
use warden_core::models::{AccessRequest, Role};

pub async fn run(core: &WardenCore, args: EvaluateArgs, format: OutputFormat) -> Result<()> {
    // Without --role, claim the directory role; unknown users are denied by
    // the engine either way.
    let role = match args.role {
        Some(role) => role,
        None => core
            .storage
            .users
            .get(&args.user)?
            .map(|user| user.role)
            .unwrap_or(Role::User),
    };

    let mut request = AccessRequest::new(&args.user, role, &args.server);
    if let Some(purpose) = args.purpose {
        request = request.with_purpose(purpose);
    }
    if let Some(client_ip) = args.client_ip {
        request = request.with_client_ip(client_ip);
    }

    let decision = core.engine.evaluate(&request).await;

    if format.is_json() {
        return print_json(&decision);
    }

    let verdict = if decision.allowed {
        "GRANTED".green().bold()
    } else if decision.requires_approval {
        "APPROVAL REQUIRED".yellow().bold()
    } else {
        "DENIED".red().bold()
    };
    println!("{verdict} {}", decision.reason);
    if let Some(policy_id) = &decision.policy_id {
        println!("  Policy:     {policy_id}");
    }
    if let Some(restrictions) = &decision.restrictions {
        println!("  Mode:       {}", restrictions.command_mode);
        println!("  Read-only:  {}", restrictions.read_only);
        if !restrictions.command_patterns.is_empty() {
            println!("  Patterns:   {}", restrictions.command_patterns.join(", "));
        }
    }
    if decision.requires_approval {
        println!(
            "\n  Request it with: {} warden approvals request --user {} --server {} --purpose <text>",
            "$".dimmed(),
            args.user,
            args.server
        );
    }
    Ok(())
}
