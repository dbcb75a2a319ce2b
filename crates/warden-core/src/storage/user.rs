//! Typed user storage wrapper.

use crate::models::User;
use anyhow::Result;
use redb::Database;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct UserStorage {
    inner: warden_storage::UserStorage,
}

impl UserStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        Ok(Self {
            inner: warden_storage::UserStorage::new(db)?,
        })
    }

    pub fn put(&self, user: &User) -> Result<()> {
        let json = serde_json::to_vec(user)?;
        self.inner.put_raw(&user.id, &json)
    }

    pub fn get(&self, id: &str) -> Result<Option<User>> {
        match self.inner.get_raw(id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list(&self) -> Result<Vec<User>> {
        let mut users = self
            .inner
            .list_raw()?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice::<User>(&bytes))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id)
    }
}
