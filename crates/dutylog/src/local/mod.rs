//! Local fallback store: an ordered list of journal records kept in one named
//! SQLite slot

use crate::error::JournalError;
use crate::journal::assemble::local::OFFLINE_FLAG;
use crate::journal::assemble::LocalRecord;
use crate::journal::{RecordRef, LOCAL_ID_PREFIX};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error};

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_offline.sql");

/// Slot holding the offline journal list.
pub const OFFLINE_SLOT: &str = "daily_journal_offline_data";

pub struct LocalStore {
    db: Mutex<Connection>,
}

impl LocalStore {
    /// Opens (or creates) the store at `path` and initializes the schema.
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        let conn = Connection::open(path)
            .map_err(|e| JournalError::local(format!("cannot open {}: {e}", path.display())))?;
        Self::with_connection(conn)
    }

    /// A store that lives only as long as this value.
    pub fn in_memory() -> Result<Self, JournalError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, JournalError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, JournalError> {
        self.db
            .lock()
            .map_err(|_| JournalError::local("local store lock poisoned"))
    }

    fn read_slot(db: &Connection) -> Result<Vec<LocalRecord>, JournalError> {
        let raw: Option<String> = db
            .query_row(
                "SELECT value FROM local_slots WHERE name = ?1",
                [OFFLINE_SLOT],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                error!(slot = OFFLINE_SLOT, error = %e, "Local slot holds unreadable data");
                JournalError::local(format!("slot {OFFLINE_SLOT} is corrupt: {e}"))
            }),
        }
    }

    fn write_slot(db: &Connection, records: &[LocalRecord]) -> Result<(), JournalError> {
        let value = serde_json::to_string(records)
            .map_err(|e| JournalError::local(format!("cannot serialize local records: {e}")))?;

        db.execute(
            "INSERT INTO local_slots (name, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (OFFLINE_SLOT, value),
        )?;
        Ok(())
    }

    /// Appends a record, stamping a fresh `offline_<millis>` id, the creation
    /// time and the offline flag. Returns the new id.
    pub fn append(&self, mut record: LocalRecord) -> Result<RecordRef, JournalError> {
        let db = self.lock()?;
        let mut records = Self::read_slot(&db)?;

        let now = Utc::now();
        let mut stamp = now.timestamp_millis();
        let id = loop {
            let candidate = format!("{LOCAL_ID_PREFIX}{stamp}");
            if !records.iter().any(|r| r.id() == Some(candidate.as_str())) {
                break candidate;
            }
            stamp += 1;
        };

        record.insert("id", Value::String(id.clone()));
        record.insert("created_at", Value::String(now.to_rfc3339()));
        record.insert(OFFLINE_FLAG, Value::Bool(true));
        records.push(record);
        Self::write_slot(&db, &records)?;

        debug!(journal_id = %id, total = records.len(), "Record appended to local store");
        Ok(RecordRef::Local(id))
    }

    /// All records in insertion order.
    pub fn list(&self) -> Result<Vec<LocalRecord>, JournalError> {
        let db = self.lock()?;
        Self::read_slot(&db)
    }

    pub fn get(&self, id: &str) -> Result<Option<LocalRecord>, JournalError> {
        Ok(self.list()?.into_iter().find(|r| r.id() == Some(id)))
    }

    /// Shallow-merges `patch` over the record and stamps `updated_at`. The id
    /// and offline flag are kept. Returns false if no record has this id.
    pub fn update(&self, id: &str, patch: LocalRecord) -> Result<bool, JournalError> {
        let db = self.lock()?;
        let mut records = Self::read_slot(&db)?;

        let Some(record) = records.iter_mut().find(|r| r.id() == Some(id)) else {
            return Ok(false);
        };
        let offline = record.as_map().get(OFFLINE_FLAG).cloned();
        record.merge(patch);
        record.insert("id", Value::String(id.to_string()));
        if let Some(offline) = offline {
            record.insert(OFFLINE_FLAG, offline);
        }
        record.insert("updated_at", Value::String(Utc::now().to_rfc3339()));

        Self::write_slot(&db, &records)?;
        debug!(journal_id = %id, "Local record updated");
        Ok(true)
    }

    /// Removes the record. Returns false if no record has this id.
    pub fn remove(&self, id: &str) -> Result<bool, JournalError> {
        let db = self.lock()?;
        let mut records = Self::read_slot(&db)?;

        let before = records.len();
        records.retain(|r| r.id() != Some(id));
        if records.len() == before {
            return Ok(false);
        }

        Self::write_slot(&db, &records)?;
        debug!(journal_id = %id, "Local record removed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(date: &str) -> LocalRecord {
        let mut record = LocalRecord::default();
        record.insert("date", json!(date));
        record.insert("class_name", json!("1a"));
        record
    }

    #[test]
    fn test_append_stamps_identity() {
        let store = LocalStore::in_memory().unwrap();
        let first = store.append(record("2025-04-15")).unwrap();
        let second = store.append(record("2025-04-16")).unwrap();

        assert!(first.is_local());
        assert!(first.as_str().starts_with("offline_"));
        assert_ne!(first, second);

        let stored = store.list().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id(), Some(first.as_str()));
        assert_eq!(stored[0].as_map()["isOffline"], json!(true));
        assert!(stored[0].as_map()["created_at"].is_string());
    }

    #[test]
    fn test_update_merges_and_keeps_identity() {
        let store = LocalStore::in_memory().unwrap();
        let id = store.append(record("2025-04-15")).unwrap();

        let mut patch = LocalRecord::default();
        patch.insert("id", json!("hijacked"));
        patch.insert("isOffline", json!(false));
        patch.insert("daily_comment", json!("quiet day"));
        assert!(store.update(id.as_str(), patch).unwrap());

        let stored = store.get(id.as_str()).unwrap().unwrap();
        assert_eq!(stored.id(), Some(id.as_str()));
        assert_eq!(stored.as_map()["isOffline"], json!(true));
        assert_eq!(stored.as_map()["daily_comment"], json!("quiet day"));
        assert_eq!(stored.as_map()["date"], json!("2025-04-15"));
        let updated_at = stored.as_map()["updated_at"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(updated_at).is_ok());
        assert!(stored.as_map()["created_at"].is_string());

        assert!(!store.update("offline_0", LocalRecord::default()).unwrap());
    }

    #[test]
    fn test_remove() {
        let store = LocalStore::in_memory().unwrap();
        let id = store.append(record("2025-04-15")).unwrap();

        assert!(store.remove(id.as_str()).unwrap());
        assert!(!store.remove(id.as_str()).unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.sqlite3");

        let id = LocalStore::open(&path)
            .unwrap()
            .append(record("2025-04-15"))
            .unwrap();

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.list().unwrap()[0].id(), Some(id.as_str()));
    }

    #[test]
    fn test_corrupt_slot_is_storage_error() {
        let store = LocalStore::in_memory().unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO local_slots (name, value, updated_at) VALUES (?1, 'not json', '')",
                [OFFLINE_SLOT],
            )
            .unwrap();

        assert!(matches!(
            store.list(),
            Err(JournalError::LocalStorage { .. })
        ));
    }
}
