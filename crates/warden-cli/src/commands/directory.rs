//! Directory seeding: servers, users and policies.

use anyhow::{Result, bail};
use comfy_table::{Cell, Table};
use serde_json::json;

use crate::cli::{PolicyAddArgs, PolicyCommands, ServerCommands, UserCommands};
use crate::output::{OutputFormat, json::print_json, table::print_table};
use warden_core::WardenCore;
use warden_core::models::{Policy, Server, User};

pub fn server(core: &WardenCore, command: ServerCommands, format: OutputFormat) -> Result<()> {
    let servers = &core.storage.servers;
    match command {
        ServerCommands::List => {
            let list = servers.list()?;
            if format.is_json() {
                return print_json(&list);
            }
            if list.is_empty() {
                println!("No servers.");
                return Ok(());
            }
            let mut table = Table::new();
            table.set_header(vec!["ID", "Name", "Address", "Login", "Active"]);
            for server in list {
                table.add_row(vec![
                    Cell::new(&server.id),
                    Cell::new(&server.name),
                    Cell::new(format!("{}:{}", server.host, server.port)),
                    Cell::new(&server.username),
                    Cell::new(server.is_active),
                ]);
            }
            print_table(table)
        }
        ServerCommands::Add {
            id,
            name,
            host,
            port,
            username,
            inactive,
        } => {
            let mut server = Server::new(id, name, host, username);
            server.port = port;
            server.is_active = !inactive;
            servers.put(&server)?;
            if format.is_json() {
                return print_json(&server);
            }
            println!("Server saved: {}", server.id);
            Ok(())
        }
        ServerCommands::Remove { id } => removed("Server", &id, servers.delete(&id)?, format),
    }
}

pub fn user(core: &WardenCore, command: UserCommands, format: OutputFormat) -> Result<()> {
    let users = &core.storage.users;
    match command {
        UserCommands::List => {
            let list = users.list()?;
            if format.is_json() {
                return print_json(&list);
            }
            if list.is_empty() {
                println!("No users.");
                return Ok(());
            }
            let mut table = Table::new();
            table.set_header(vec!["ID", "Username", "Role", "Active"]);
            for user in list {
                table.add_row(vec![
                    Cell::new(&user.id),
                    Cell::new(&user.username),
                    Cell::new(user.role),
                    Cell::new(user.is_active),
                ]);
            }
            print_table(table)
        }
        UserCommands::Add {
            id,
            username,
            role,
            inactive,
        } => {
            let mut user = User::new(id, username, role);
            user.is_active = !inactive;
            users.put(&user)?;
            if format.is_json() {
                return print_json(&user);
            }
            println!("User saved: {}", user.id);
            Ok(())
        }
        UserCommands::Remove { id } => removed("User", &id, users.delete(&id)?, format),
    }
}

pub fn policy(core: &WardenCore, command: PolicyCommands, format: OutputFormat) -> Result<()> {
    let policies = &core.storage.policies;
    match command {
        PolicyCommands::List => {
            let mut list = policies.list()?;
            list.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
            if format.is_json() {
                return print_json(&list);
            }
            if list.is_empty() {
                println!("No policies.");
                return Ok(());
            }
            let mut table = Table::new();
            table.set_header(vec![
                "ID", "Name", "Priority", "Servers", "Roles", "Mode", "Approval", "Version",
                "Active",
            ]);
            for policy in list {
                let roles: Vec<String> = policy.allowed_roles.iter().map(|r| r.to_string()).collect();
                let approval = if policy.require_approval {
                    let approvers: Vec<String> =
                        policy.approver_roles.iter().map(|r| r.to_string()).collect();
                    approvers.join(",")
                } else {
                    "-".to_string()
                };
                table.add_row(vec![
                    Cell::new(&policy.id),
                    Cell::new(&policy.name),
                    Cell::new(policy.priority),
                    Cell::new(policy.server_ids.join(",")),
                    Cell::new(if roles.is_empty() { "*".to_string() } else { roles.join(",") }),
                    Cell::new(policy.command_mode),
                    Cell::new(approval),
                    Cell::new(policy.version),
                    Cell::new(policy.is_active),
                ]);
            }
            print_table(table)
        }
        PolicyCommands::Add(args) => {
            let policy = build_policy(args)?;
            let saved = policies.put(&policy)?;
            if format.is_json() {
                return print_json(&saved);
            }
            println!("Policy saved: {} (version {})", saved.id, saved.version);
            Ok(())
        }
        PolicyCommands::Remove { id } => removed("Policy", &id, policies.delete(&id)?, format),
    }
}

fn build_policy(args: PolicyAddArgs) -> Result<Policy> {
    let mut policy = Policy::new(args.id, args.name, args.priority)
        .with_roles(args.roles)
        .with_days(args.days)
        .with_command_mode(args.mode)
        .with_patterns(args.patterns);
    for server_id in args.servers {
        policy = policy.attached_to(server_id);
    }
    if let (Some(start), Some(end)) = (args.start, args.end) {
        policy = policy.with_window(start, end);
    }
    if !args.approver_roles.is_empty() {
        policy = policy.requiring_approval(args.approver_roles);
    }
    policy.description = args.description;
    policy.is_active = !args.inactive;

    // Stored anyway would never match; refuse it up front.
    if let Err(reason) = policy.time_window() {
        bail!("Invalid time window: {reason}");
    }
    Ok(policy)
}

fn removed(kind: &str, id: &str, existed: bool, format: OutputFormat) -> Result<()> {
    if format.is_json() {
        return print_json(&json!({ "id": id, "removed": existed }));
    }
    if !existed {
        bail!("{kind} not found: {id}");
    }
    println!("{kind} removed: {id}");
    Ok(())
}
