//! Persistence for domain records.
//!
//! Both backends store every collection as JSON documents keyed by id:
//! - `SqliteStore`: the workspace database (`tutord.sqlite3`), one table per
//!   collection.
//! - `LocalStore`: demo mode, a localStorage emulation where each collection is
//!   one JSON-array string under its fixed key.
//!
//! Writes go through `WriteBatch` so cascades are applied atomically.

mod local;
mod sqlite;

pub use local::{LocalStorage, LocalStore, LOCAL_STORAGE_FILE};
pub use sqlite::{SqliteStore, DB_FILE};

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::StorageMode;
use crate::model::{Collection, Record};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt data in {collection}: {source}")]
    Corrupt {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub enum WriteOp {
    Put {
        collection: Collection,
        id: String,
        body: Value,
    },
    Delete {
        collection: Collection,
        id: String,
    },
}

/// Ordered set of writes committed as one unit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Record>(&mut self, record: &T) -> Result<&mut Self, StoreError> {
        let body = serde_json::to_value(record)?;
        self.ops.push(WriteOp::Put {
            collection: T::COLLECTION,
            id: record.id().to_string(),
            body,
        });
        Ok(self)
    }

    pub fn delete<T: Record>(&mut self, id: &str) -> &mut Self {
        self.delete_in(T::COLLECTION, id)
    }

    pub fn delete_in(&mut self, collection: Collection, id: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            collection,
            id: id.to_string(),
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

pub trait Store {
    fn mode(&self) -> StorageMode;

    /// File holding all persisted state, used for backups.
    fn data_file(&self) -> &Path;

    /// Records of one collection in insertion order.
    fn load_all(&self, collection: Collection) -> Result<Vec<Value>, StoreError>;

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError>;

    /// Applies every op or none of them.
    fn commit(&mut self, batch: &WriteBatch) -> Result<(), StoreError>;
}

pub fn open_store(workspace: &Path, mode: StorageMode) -> Result<Box<dyn Store>, StoreError> {
    std::fs::create_dir_all(workspace)?;
    let store: Box<dyn Store> = match mode {
        StorageMode::Sqlite => Box::new(SqliteStore::open(workspace)?),
        StorageMode::Demo => Box::new(LocalStore::open(workspace)?),
    };
    tracing::info!(
        workspace = %workspace.display(),
        mode = mode.as_str(),
        "storage opened"
    );
    Ok(store)
}

pub fn data_file_for(workspace: &Path, mode: StorageMode) -> PathBuf {
    match mode {
        StorageMode::Sqlite => workspace.join(DB_FILE),
        StorageMode::Demo => workspace.join(LOCAL_STORAGE_FILE),
    }
}

pub fn list<T: Record>(store: &dyn Store) -> Result<Vec<T>, StoreError> {
    store
        .load_all(T::COLLECTION)?
        .into_iter()
        .map(decode::<T>)
        .collect()
}

pub fn find<T: Record>(store: &dyn Store, id: &str) -> Result<Option<T>, StoreError> {
    store.get(T::COLLECTION, id)?.map(decode::<T>).transpose()
}

pub fn save<T: Record>(store: &mut dyn Store, record: &T) -> Result<(), StoreError> {
    let mut batch = WriteBatch::new();
    batch.put(record)?;
    store.commit(&batch)
}

pub fn decode<T: Record>(value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
        collection: T::COLLECTION.key(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Classroom;

    fn room(id: &str, name: &str) -> Classroom {
        Classroom {
            id: id.into(),
            name: name.into(),
            capacity: 12,
            location: None,
            equipment: vec![],
            active: true,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn exercise(store: &mut dyn Store) {
        save(store, &room("r1", "Blue")).expect("save r1");
        save(store, &room("r2", "Green")).expect("save r2");
        save(store, &room("r1", "Blue Room")).expect("update r1");

        let rooms: Vec<Classroom> = list(store).expect("list");
        let names: Vec<_> = rooms.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Blue Room", "Green"]);

        let mut batch = WriteBatch::new();
        batch.delete::<Classroom>("r1");
        batch.put(&room("r3", "Red")).expect("put r3");
        store.commit(&batch).expect("commit");

        assert!(find::<Classroom>(store, "r1").expect("find").is_none());
        assert_eq!(
            find::<Classroom>(store, "r3").expect("find").map(|r| r.name),
            Some("Red".to_string())
        );
    }

    #[test]
    fn sqlite_store_crud() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = open_store(dir.path(), StorageMode::Sqlite).expect("open");
        exercise(store.as_mut());
    }

    #[test]
    fn local_store_crud_and_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let mut store = open_store(dir.path(), StorageMode::Demo).expect("open");
            exercise(store.as_mut());
        }
        let store = open_store(dir.path(), StorageMode::Demo).expect("reopen");
        let rooms: Vec<Classroom> = list(store.as_ref()).expect("list");
        assert_eq!(rooms.len(), 2);
    }
}
