//! Typed access policy storage wrapper.

use crate::models::Policy;
use anyhow::Result;
use redb::Database;
use std::sync::Arc;

/// Typed policy storage wrapper around warden-storage::PolicyStorage.
#[derive(Debug, Clone)]
pub struct PolicyStorage {
    inner: warden_storage::PolicyStorage,
}

impl PolicyStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        Ok(Self {
            inner: warden_storage::PolicyStorage::new(db)?,
        })
    }

    /// Insert or replace a policy.
    ///
    /// When an existing policy's command mode or patterns change, the stored
    /// version is bumped past the previous one so cached filters are rebuilt.
    pub fn put(&self, policy: &Policy) -> Result<Policy> {
        let mut policy = policy.clone();
        if let Some(previous) = self.get(&policy.id)? {
            let filter_changed = previous.command_mode != policy.command_mode
                || previous.command_patterns != policy.command_patterns;
            if filter_changed && policy.version <= previous.version {
                policy.version = previous.version + 1;
            }
        }
        let json = serde_json::to_vec(&policy)?;
        self.inner.put_raw(&policy.id, &json)?;
        Ok(policy)
    }

    /// Get a policy by ID
    pub fn get(&self, id: &str) -> Result<Option<Policy>> {
        match self.inner.get_raw(id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// List all policies
    pub fn list(&self) -> Result<Vec<Policy>> {
        let policies = self
            .inner
            .list_raw()?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice::<Policy>(&bytes))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(policies)
    }

    /// Active policies attached to a server, in no particular order
    pub fn list_active_for_server(&self, server_id: &str) -> Result<Vec<Policy>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|policy| policy.is_active && policy.is_attached_to(server_id))
            .collect())
    }

    /// Delete a policy
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommandMode;
    use tempfile::tempdir;

    fn setup() -> (PolicyStorage, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Arc::new(Database::create(db_path).unwrap());
        let storage = PolicyStorage::new(db).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_put_bumps_version_on_pattern_change() {
        let (storage, _temp_dir) = setup();
        let policy = Policy::new("p1", "Ops", 10).with_patterns(["^git push"]);
        assert_eq!(storage.put(&policy).unwrap().version, 1);

        let renamed = Policy {
            name: "Operations".to_string(),
            ..policy.clone()
        };
        assert_eq!(storage.put(&renamed).unwrap().version, 1);

        let repatterned = policy.clone().with_patterns(["^git push", "^npm publish"]);
        assert_eq!(storage.put(&repatterned).unwrap().version, 2);

        let remoded = repatterned.with_command_mode(CommandMode::Whitelist);
        assert_eq!(storage.put(&remoded).unwrap().version, 3);
        assert_eq!(storage.get("p1").unwrap().unwrap().version, 3);
    }

    #[test]
    fn test_list_active_for_server() {
        let (storage, _temp_dir) = setup();
        storage
            .put(&Policy::new("p1", "A", 1).attached_to("srv-1"))
            .unwrap();
        storage
            .put(&Policy::new("p2", "B", 1).attached_to("srv-2"))
            .unwrap();
        let mut inactive = Policy::new("p3", "C", 1).attached_to("srv-1");
        inactive.is_active = false;
        storage.put(&inactive).unwrap();

        let policies = storage.list_active_for_server("srv-1").unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].id, "p1");
    }
}
