use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use super::{Store, StoreError, WriteBatch, WriteOp};
use crate::config::StorageMode;
use crate::db;
use crate::model::Collection;

pub const DB_FILE: &str = "tutord.sqlite3";

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> Result<Self, StoreError> {
        let path = workspace.join(DB_FILE);
        let conn = db::open_db(&path).map_err(|e| match e.downcast::<rusqlite::Error>() {
            Ok(sql) => StoreError::Sqlite(sql),
            Err(other) => StoreError::Io(std::io::Error::other(other.to_string())),
        })?;
        Ok(Self { conn, path })
    }
}

fn timestamp(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

impl Store for SqliteStore {
    fn mode(&self) -> StorageMode {
        StorageMode::Sqlite
    }

    fn data_file(&self) -> &Path {
        &self.path
    }

    fn load_all(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT body FROM {} ORDER BY rowid", collection.table()))?;
        let raw = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        raw.iter()
            .map(|s| {
                serde_json::from_str(s).map_err(|source| StoreError::Corrupt {
                    collection: collection.key(),
                    source,
                })
            })
            .collect()
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT body FROM {} WHERE id = ?", collection.table()),
                [id],
                |r| r.get(0),
            )
            .optional()?;
        raw.map(|s| {
            serde_json::from_str(&s).map_err(|source| StoreError::Corrupt {
                collection: collection.key(),
                source,
            })
        })
        .transpose()
    }

    fn commit(&mut self, batch: &WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for op in batch.ops() {
            match op {
                WriteOp::Put {
                    collection,
                    id,
                    body,
                } => {
                    tx.execute(
                        &format!(
                            "INSERT INTO {}(id, body, created_at, updated_at) VALUES(?, ?, ?, ?)
                             ON CONFLICT(id) DO UPDATE SET
                               body = excluded.body,
                               updated_at = excluded.updated_at",
                            collection.table()
                        ),
                        (
                            id,
                            serde_json::to_string(body)?,
                            timestamp(body, "createdAt"),
                            timestamp(body, "updatedAt"),
                        ),
                    )?;
                }
                WriteOp::Delete { collection, id } => {
                    tx.execute(
                        &format!("DELETE FROM {} WHERE id = ?", collection.table()),
                        [id],
                    )?;
                }
            }
        }
        tx.commit()?;
        tracing::debug!(ops = batch.len(), "sqlite batch committed");
        Ok(())
    }
}
