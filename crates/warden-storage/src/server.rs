//! Server storage - byte-level API for managed server records.

use crate::define_simple_storage;

define_simple_storage! {
    /// Low-level server storage with byte-level API
    pub struct ServerStorage { table: "servers" }
}
