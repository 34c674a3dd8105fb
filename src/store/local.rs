//! Demo-mode persistence that behaves like browser `localStorage`.
//!
//! # Invariants
//! - Every value is a string; collections are JSON arrays serialized under
//!   their fixed key (`classes`, `classrooms`, `attendance-records`, ...).
//! - The backing file is replaced atomically (temp file + rename).
//! - A failed commit leaves both memory and disk at the previous state.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{Store, StoreError, WriteBatch, WriteOp};
use crate::config::StorageMode;
use crate::model::Collection;

pub const LOCAL_STORAGE_FILE: &str = "local-storage.json";

/// String key/value map persisted as one JSON object.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
    items: BTreeMap<String, String>,
}

impl LocalStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let items = if path.is_file() {
            let text = std::fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                    collection: "localStorage",
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, items })
    }

    pub fn get_item(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn set_item(&mut self, key: &str, value: String) {
        self.items.insert(key.to_string(), value);
    }

    pub fn remove_item(&mut self, key: &str) -> Option<String> {
        self.items.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(serde_json::to_string_pretty(&self.items)?.as_bytes())?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

pub struct LocalStore {
    storage: LocalStorage,
}

impl LocalStore {
    pub fn open(workspace: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            storage: LocalStorage::open(workspace.join(LOCAL_STORAGE_FILE))?,
        })
    }

    fn read_array(storage: &LocalStorage, collection: Collection) -> Result<Vec<Value>, StoreError> {
        match storage.get_item(collection.key()) {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(raw).map_err(|source| StoreError::Corrupt {
                collection: collection.key(),
                source,
            }),
        }
    }
}

fn record_id(v: &Value) -> Option<&str> {
    v.get("id").and_then(|id| id.as_str())
}

impl Store for LocalStore {
    fn mode(&self) -> StorageMode {
        StorageMode::Demo
    }

    fn data_file(&self) -> &Path {
        self.storage.path()
    }

    fn load_all(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        Self::read_array(&self.storage, collection)
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(Self::read_array(&self.storage, collection)?
            .into_iter()
            .find(|v| record_id(v) == Some(id)))
    }

    fn commit(&mut self, batch: &WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut next = self.storage.clone();
        let mut touched: BTreeMap<&'static str, Vec<Value>> = BTreeMap::new();
        for op in batch.ops() {
            let collection = match op {
                WriteOp::Put { collection, .. } | WriteOp::Delete { collection, .. } => *collection,
            };
            if !touched.contains_key(collection.key()) {
                touched.insert(collection.key(), Self::read_array(&next, collection)?);
            }
            let Some(rows) = touched.get_mut(collection.key()) else {
                continue;
            };
            match op {
                WriteOp::Put { id, body, .. } => {
                    match rows.iter_mut().find(|v| record_id(v) == Some(id.as_str())) {
                        Some(existing) => *existing = body.clone(),
                        None => rows.push(body.clone()),
                    }
                }
                WriteOp::Delete { id, .. } => {
                    rows.retain(|v| record_id(v) != Some(id.as_str()));
                }
            }
        }
        for (key, rows) in touched {
            next.set_item(key, serde_json::to_string(&rows)?);
        }
        next.persist()?;
        self.storage = next;
        tracing::debug!(ops = batch.len(), "local storage batch committed");
        Ok(())
    }
}
