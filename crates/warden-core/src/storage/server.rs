//! Typed server storage wrapper.

use crate::models::Server;
use anyhow::Result;
use redb::Database;
use std::sync::Arc;

/// Typed server storage wrapper around warden-storage::ServerStorage.
#[derive(Debug, Clone)]
pub struct ServerStorage {
    inner: warden_storage::ServerStorage,
}

impl ServerStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        Ok(Self {
            inner: warden_storage::ServerStorage::new(db)?,
        })
    }

    /// Insert or replace a server
    pub fn put(&self, server: &Server) -> Result<()> {
        let json = serde_json::to_vec(server)?;
        self.inner.put_raw(&server.id, &json)
    }

    /// Get a server by ID
    pub fn get(&self, id: &str) -> Result<Option<Server>> {
        match self.inner.get_raw(id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// List all servers sorted by name
    pub fn list(&self) -> Result<Vec<Server>> {
        let mut servers = self
            .inner
            .list_raw()?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice::<Server>(&bytes))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(servers)
    }

    /// Delete a server
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id)
    }
}
