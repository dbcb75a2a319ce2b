use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::output::OutputFormat;
use warden_core::models::{ApprovalStatus, CommandMode, Role};

#[derive(Parser)]
#[command(name = "warden")]
#[command(version, about = "Warden - zero-trust SSH access broker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/warden/config.toml)
    #[arg(long, global = true, env = "WARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(long, global = true, env = "WARDEN_DB_PATH")]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Check a command against a filter without touching the database
    Check(CheckArgs),

    /// Evaluate an access request against the stored policies
    Evaluate(EvaluateArgs),

    /// Approval requests
    Approvals {
        #[command(subcommand)]
        command: ApprovalCommands,
    },

    /// Session recordings
    Recording {
        #[command(subcommand)]
        command: RecordingCommands,
    },

    /// Expire overdue approval requests
    Sweep {
        /// Sweep once and exit instead of running until interrupted
        #[arg(long)]
        once: bool,
    },

    /// Managed servers
    Server {
        #[command(subcommand)]
        command: ServerCommands,
    },

    /// Users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Access policies
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },
}

#[derive(Args)]
pub struct CheckArgs {
    /// Command line to check
    pub command: String,

    /// Filter mode
    #[arg(long, default_value = "BLACKLIST")]
    pub mode: CommandMode,

    /// Custom pattern (repeatable)
    #[arg(long = "pattern")]
    pub patterns: Vec<String>,
}

#[derive(Args)]
pub struct EvaluateArgs {
    /// Requesting user id
    #[arg(long)]
    pub user: String,

    /// Target server id
    #[arg(long)]
    pub server: String,

    /// Claimed role (defaults to the user's directory role)
    #[arg(long)]
    pub role: Option<Role>,

    #[arg(long)]
    pub purpose: Option<String>,

    #[arg(long)]
    pub client_ip: Option<String>,
}

#[derive(Subcommand)]
pub enum ApprovalCommands {
    /// List approval requests
    List {
        #[arg(long)]
        status: Option<ApprovalStatus>,

        #[arg(long)]
        requester: Option<String>,

        #[arg(long)]
        server: Option<String>,
    },

    /// Request approval for access to a server
    Request {
        #[arg(long)]
        user: String,

        #[arg(long)]
        server: String,

        #[arg(long)]
        purpose: String,

        /// Lifetime in hours (defaults to the configured duration)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        hours: Option<u32>,
    },

    /// Approve a pending request
    Approve(DecideArgs),

    /// Reject a pending request
    Reject(DecideArgs),

    /// Expire overdue pending requests now
    Expire,
}

#[derive(Args)]
pub struct DecideArgs {
    /// Request ID (or unique prefix)
    pub id: String,

    /// Deciding user id
    #[arg(long)]
    pub approver: String,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Subcommand)]
pub enum RecordingCommands {
    /// List stored recordings
    List,

    /// Verify a recording's checksum
    Verify { session_id: String },

    /// Print a verified recording's output to the terminal
    Replay {
        session_id: String,

        /// Reproduce the original timing
        #[arg(long)]
        realtime: bool,

        /// Include recorded input
        #[arg(long)]
        input: bool,
    },
}

#[derive(Subcommand)]
pub enum ServerCommands {
    /// List servers
    List,

    /// Add or replace a server
    Add {
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        host: String,

        #[arg(long, default_value_t = 22)]
        port: u16,

        /// Remote login account
        #[arg(long)]
        username: String,

        /// Register the server as inactive
        #[arg(long)]
        inactive: bool,
    },

    /// Remove a server
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// List users
    List,

    /// Add or replace a user
    Add {
        id: String,

        #[arg(long)]
        username: String,

        #[arg(long)]
        role: Role,

        /// Register the user as inactive
        #[arg(long)]
        inactive: bool,
    },

    /// Remove a user
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// List policies
    List,

    /// Add or replace a policy
    Add(PolicyAddArgs),

    /// Remove a policy
    Remove { id: String },
}

#[derive(Args)]
pub struct PolicyAddArgs {
    pub id: String,

    #[arg(long)]
    pub name: String,

    #[arg(long, default_value_t = 0)]
    pub priority: i32,

    #[arg(long)]
    pub description: Option<String>,

    /// Attached server id (repeatable)
    #[arg(long = "server")]
    pub servers: Vec<String>,

    /// Allowed role (repeatable; none allows every role)
    #[arg(long = "role")]
    pub roles: Vec<Role>,

    /// Allowed weekday, 0 = Sunday (repeatable; none allows every day)
    #[arg(long = "day", value_parser = clap::value_parser!(u8).range(0..=6))]
    pub days: Vec<u8>,

    /// Window start, HH:MM
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// Window end, HH:MM
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    #[arg(long, default_value = "BLACKLIST")]
    pub mode: CommandMode,

    /// Command pattern (repeatable)
    #[arg(long = "pattern")]
    pub patterns: Vec<String>,

    /// Gate access behind approval by one of these roles (repeatable)
    #[arg(long = "approver-role")]
    pub approver_roles: Vec<Role>,

    /// Register the policy as inactive
    #[arg(long)]
    pub inactive: bool,
}
