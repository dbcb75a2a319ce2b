use crate::define_simple_storage;

define_simple_storage! {
    /// Byte-level user storage.
    pub struct UserStorage { table: "users" }
}
