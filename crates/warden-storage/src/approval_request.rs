//! Approval request storage - byte-level API for elevation requests.
//!
//! Status transitions go through [`ApprovalRequestStorage::update_raw`] and
//! [`ApprovalRequestStorage::update_all_raw`] so that the check of the
//! current status and the write of the next one share a transaction.

use crate::define_simple_storage;

define_simple_storage! {
    /// Low-level approval request storage with byte-level API
    pub struct ApprovalRequestStorage { table: "approval_requests" }
}
