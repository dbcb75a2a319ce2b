//! Warden Storage - Low-level storage abstraction layer
//!
//! This crate provides the persistence layer for Warden, using redb as the
//! embedded database. It exposes byte-level APIs; the typed wrappers and the
//! JSON encoding of records live in warden-core.
//!
//! # Tables
//!
//! - `servers` - Managed servers
//! - `users` - Requesters and approvers
//! - `access_policies` - Admin-authored access policies
//! - `approval_requests` - Elevation requests and their status
//! - `session_recordings` - Sealed, checksummed terminal recordings

pub mod approval_request;
pub mod policy;
pub mod server;
pub mod session_recording;
pub mod user;

mod simple_storage;

pub use approval_request::ApprovalRequestStorage;
pub use policy::PolicyStorage;
pub use server::ServerStorage;
pub use session_recording::SessionRecordingStorage;
pub use simple_storage::SimpleStorage;
pub use user::UserStorage;
