//! Session recording storage - byte-level API for sealed terminal recordings.

use crate::define_simple_storage;

define_simple_storage! {
    /// Low-level session recording storage with byte-level API
    pub struct SessionRecordingStorage { table: "session_recordings" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::Database;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_insert_new_raw_refuses_overwrite() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Arc::new(Database::create(db_path).unwrap());
        let storage = SessionRecordingStorage::new(db).unwrap();

        assert!(storage.insert_new_raw("session-001", b"first").unwrap());
        assert!(!storage.insert_new_raw("session-001", b"second").unwrap());

        let stored = storage.get_raw("session-001").unwrap().unwrap();
        assert_eq!(stored, b"first");
    }

    #[test]
    fn test_list_and_delete() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Arc::new(Database::create(db_path).unwrap());
        let storage = SessionRecordingStorage::new(db).unwrap();

        storage.put_raw("session-001", b"data1").unwrap();
        storage.put_raw("session-002", b"data2").unwrap();
        assert_eq!(storage.list_raw().unwrap().len(), 2);
        assert_eq!(storage.count().unwrap(), 2);

        assert!(storage.delete("session-001").unwrap());
        assert!(!storage.delete("session-001").unwrap());
        assert!(storage.get_raw("session-001").unwrap().is_none());
    }
}
