//! Access policy storage - byte-level API for admin-authored policies.

use crate::define_simple_storage;

define_simple_storage! {
    /// Low-level access policy storage with byte-level API
    pub struct PolicyStorage { table: "access_policies" }
}
