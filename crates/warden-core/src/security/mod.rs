//! Access control for brokered sessions.
//!
//! - [`policy_engine`]: decides whether a connection may be opened
//! - [`approval`]: elevation requests and their state machine
//! - [`filter`]: allow/deny and risk scoring for typed commands
//! - [`prompt`]: turns terminal keystrokes into command lines

pub mod approval;
pub mod cache;
pub mod filter;
pub mod policy_engine;
pub mod prompt;
pub mod shell_parser;

pub use approval::{ApprovalCallback, ApprovalDecision, ApprovalWorkflow, SweeperHandle};
pub use cache::FilterCache;
pub use filter::{CommandFilter, risk_score};
pub use policy_engine::{PolicyEngine, select_policy};
pub use prompt::{InputSegment, LineBuffer, command_readings, extract_command};
pub use shell_parser::{ShellAnalysis, analyze_command};
