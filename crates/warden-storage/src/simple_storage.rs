use anyhow::Result;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::sync::Arc;

/// A single redb table of JSON blobs keyed by record id.
///
/// Each helper below commits in its own write transaction.
pub trait SimpleStorage: Send + Sync {
    /// Backing table.
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]>;

    /// Shared database handle.
    fn db(&self) -> &Arc<Database>;

    /// Insert or overwrite the blob for `id`.
    fn put_raw(&self, id: &str, data: &[u8]) -> Result<()> {
        let write_txn = self.db().begin_write()?;
        {
            let mut table = write_txn.open_table(Self::TABLE)?;
            table.insert(id, data)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Store raw bytes only if the ID is not present yet.
    ///
    /// Returns false (and writes nothing) when an entry already exists.
    fn insert_new_raw(&self, id: &str, data: &[u8]) -> Result<bool> {
        let write_txn = self.db().begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(Self::TABLE)?;
            if table.get(id)?.is_some() {
                false
            } else {
                table.insert(id, data)?;
                true
            }
        };
        write_txn.commit()?;
        Ok(inserted)
    }

    /// Blob for `id`, if any.
    fn get_raw(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db().begin_read()?;
        let table = read_txn.open_table(Self::TABLE)?;

        if let Some(value) = table.get(id)? {
            Ok(Some(value.value().to_vec()))
        } else {
            Ok(None)
        }
    }

    /// Every (id, blob) pair in key order.
    fn list_raw(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let read_txn = self.db().begin_read()?;
        let table = read_txn.open_table(Self::TABLE)?;

        let mut items = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            items.push((key.value().to_string(), value.value().to_vec()));
        }

        Ok(items)
    }

    /// Atomically rewrite one entry.
    ///
    /// `update` receives the current bytes and returns the replacement, or
    /// `None` to leave the entry untouched. Returns the bytes that were
    /// written, or `None` if the entry is missing or was left unchanged.
    fn update_raw<F>(&self, id: &str, update: F) -> Result<Option<Vec<u8>>>
    where
        F: FnOnce(&[u8]) -> Result<Option<Vec<u8>>>,
    {
        let write_txn = self.db().begin_write()?;
        let written = {
            let mut table = write_txn.open_table(Self::TABLE)?;
            let current = table.get(id)?.map(|value| value.value().to_vec());
            match current {
                Some(bytes) => match update(&bytes)? {
                    Some(next) => {
                        table.insert(id, next.as_slice())?;
                        Some(next)
                    }
                    None => None,
                },
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(written)
    }

    /// Atomically rewrite every entry selected by `update`.
    ///
    /// Returns the number of entries that were rewritten.
    fn update_all_raw<F>(&self, mut update: F) -> Result<usize>
    where
        F: FnMut(&str, &[u8]) -> Result<Option<Vec<u8>>>,
    {
        let write_txn = self.db().begin_write()?;
        let count = {
            let mut table = write_txn.open_table(Self::TABLE)?;
            let mut replacements = Vec::new();
            for item in table.iter()? {
                let (key, value) = item?;
                if let Some(next) = update(key.value(), value.value())? {
                    replacements.push((key.value().to_string(), next));
                }
            }
            for (id, next) in &replacements {
                table.insert(id.as_str(), next.as_slice())?;
            }
            replacements.len()
        };
        write_txn.commit()?;
        if count > 0 {
            tracing::debug!(table = %Self::TABLE, count, "Rewrote entries");
        }
        Ok(count)
    }

    /// Remove `id`. True when something was removed.
    fn delete(&self, id: &str) -> Result<bool> {
        let write_txn = self.db().begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(Self::TABLE)?;
            table.remove(id)?.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Whether `id` is stored.
    fn exists(&self, id: &str) -> Result<bool> {
        let read_txn = self.db().begin_read()?;
        let table = read_txn.open_table(Self::TABLE)?;
        Ok(table.get(id)?.is_some())
    }

    /// Number of stored records.
    fn count(&self) -> Result<usize> {
        let read_txn = self.db().begin_read()?;
        let table = read_txn.open_table(Self::TABLE)?;
        Ok(table.len()? as usize)
    }
}

/// Declares a table-backed store and its `SimpleStorage` impl.
#[macro_export]
macro_rules! define_simple_storage {
    ( $(#[$meta:meta])* $vis:vis struct $name:ident { table: $table_name:literal } ) => {
        const TABLE: redb::TableDefinition<'static, &'static str, &'static [u8]> =
            redb::TableDefinition::new($table_name);

        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            db: std::sync::Arc<redb::Database>,
        }

        impl $name {
            pub fn new(db: std::sync::Arc<redb::Database>) -> anyhow::Result<Self> {
                let write_txn = db.begin_write()?;
                write_txn.open_table(TABLE)?;
                write_txn.commit()?;

                Ok(Self { db })
            }

            pub fn put_raw(&self, id: &str, data: &[u8]) -> anyhow::Result<()> {
                <Self as $crate::SimpleStorage>::put_raw(self, id, data)
            }

            pub fn insert_new_raw(&self, id: &str, data: &[u8]) -> anyhow::Result<bool> {
                <Self as $crate::SimpleStorage>::insert_new_raw(self, id, data)
            }

            pub fn get_raw(&self, id: &str) -> anyhow::Result<Option<Vec<u8>>> {
                <Self as $crate::SimpleStorage>::get_raw(self, id)
            }

            pub fn list_raw(&self) -> anyhow::Result<Vec<(String, Vec<u8>)>> {
                <Self as $crate::SimpleStorage>::list_raw(self)
            }

            pub fn update_raw<F>(&self, id: &str, update: F) -> anyhow::Result<Option<Vec<u8>>>
            where
                F: FnOnce(&[u8]) -> anyhow::Result<Option<Vec<u8>>>,
            {
                <Self as $crate::SimpleStorage>::update_raw(self, id, update)
            }

            pub fn update_all_raw<F>(&self, update: F) -> anyhow::Result<usize>
            where
                F: FnMut(&str, &[u8]) -> anyhow::Result<Option<Vec<u8>>>,
            {
                <Self as $crate::SimpleStorage>::update_all_raw(self, update)
            }

            pub fn delete(&self, id: &str) -> anyhow::Result<bool> {
                <Self as $crate::SimpleStorage>::delete(self, id)
            }

            pub fn exists(&self, id: &str) -> anyhow::Result<bool> {
                <Self as $crate::SimpleStorage>::exists(self, id)
            }

            pub fn count(&self) -> anyhow::Result<usize> {
                <Self as $crate::SimpleStorage>::count(self)
            }
        }

        impl $crate::SimpleStorage for $name {
            const TABLE: redb::TableDefinition<'static, &'static str, &'static [u8]> = TABLE;

            fn db(&self) -> &std::sync::Arc<redb::Database> {
                &self.db
            }
        }
    };
}
