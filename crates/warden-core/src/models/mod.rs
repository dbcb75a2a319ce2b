//! Domain models shared by the policy engine, approval workflow, command
//! filter and session recorder.

pub mod access;
pub mod approval;
pub mod command;
pub mod directory;
pub mod policy;
pub mod recording;

pub use access::{AccessDecision, AccessRequest, Restrictions, Role};
pub use approval::{ApprovalAction, ApprovalRequest, ApprovalStatus, InvalidTransition};
pub use command::CommandCheckResult;
pub use directory::{Server, User};
pub use policy::{CommandMode, Policy, PolicyMiss, TimeWindow};
pub use recording::{
    EventKind, RECORDING_FORMAT, RECORDING_VERSION, RecordingEvent, RecordingPayload,
    StoredRecording,
};
