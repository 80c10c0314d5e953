//! redb-backed session store with per-entry TTL.
//!
//! Records are `expires_at_millis (8 bytes BE) ++ payload`. Expired entries
//! are treated as absent and deleted lazily on the next read.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};

use facteur_ports::session::{SessionError, SessionStore};

const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

const DEFAULT_PREFIX: &str = "facteur";

/// Embedded session store. Safe for concurrent callers; redb serialises
/// writers internally.
#[derive(Clone)]
pub struct RedbSessionStore {
    db: Arc<Database>,
    prefix: String,
}

impl RedbSessionStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let db = Database::create(path)
            .map_err(|err| SessionError::Backend(format!("open database: {err}")))?;

        // Make sure the table exists so first reads do not fail.
        let txn = db
            .begin_write()
            .map_err(|err| SessionError::Backend(format!("begin write: {err}")))?;
        txn.open_table(SESSIONS)
            .map_err(|err| SessionError::Backend(format!("open table: {err}")))?;
        txn.commit()
            .map_err(|err| SessionError::Backend(format!("commit: {err}")))?;

        Ok(Self {
            db: Arc::new(db),
            prefix: DEFAULT_PREFIX.to_string(),
        })
    }

    /// Override the key prefix (defaults to the service name).
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.trim_end_matches(':').to_string();
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn now_millis() -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }

    fn encode(expires_at: u64, value: &[u8]) -> Vec<u8> {
        let mut record = Vec::with_capacity(8 + value.len());
        record.extend_from_slice(&expires_at.to_be_bytes());
        record.extend_from_slice(value);
        record
    }

    fn decode(record: &[u8]) -> Result<(u64, Vec<u8>), SessionError> {
        if record.len() < 8 {
            return Err(SessionError::Backend("truncated record".to_string()));
        }
        let mut expiry = [0u8; 8];
        expiry.copy_from_slice(&record[..8]);
        Ok((u64::from_be_bytes(expiry), record[8..].to_vec()))
    }

    fn remove(&self, full_key: &str) -> Result<(), SessionError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|err| SessionError::Backend(format!("begin write: {err}")))?;
        {
            let mut table = txn
                .open_table(SESSIONS)
                .map_err(|err| SessionError::Backend(format!("open table: {err}")))?;
            table
                .remove(full_key)
                .map_err(|err| SessionError::Backend(format!("remove key: {err}")))?;
        }
        txn.commit()
            .map_err(|err| SessionError::Backend(format!("commit: {err}")))
    }
}

#[async_trait]
impl SessionStore for RedbSessionStore {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), SessionError> {
        let expires_at = Self::now_millis().saturating_add(ttl.as_millis() as u64);
        let record = Self::encode(expires_at, value);
        let full_key = self.key(key);

        let txn = self
            .db
            .begin_write()
            .map_err(|err| SessionError::Backend(format!("begin write: {err}")))?;
        {
            let mut table = txn
                .open_table(SESSIONS)
                .map_err(|err| SessionError::Backend(format!("open table: {err}")))?;
            table
                .insert(full_key.as_str(), record.as_slice())
                .map_err(|err| SessionError::Backend(format!("set key: {err}")))?;
        }
        txn.commit()
            .map_err(|err| SessionError::Backend(format!("commit: {err}")))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, SessionError> {
        let full_key = self.key(key);

        let record = {
            let txn = self
                .db
                .begin_read()
                .map_err(|err| SessionError::Backend(format!("begin read: {err}")))?;
            let table = txn
                .open_table(SESSIONS)
                .map_err(|err| SessionError::Backend(format!("open table: {err}")))?;
            table
                .get(full_key.as_str())
                .map_err(|err| SessionError::Backend(format!("get key: {err}")))?
                .map(|guard| guard.value().to_vec())
        };

        let Some(record) = record else {
            return Err(SessionError::NotFound);
        };

        let (expires_at, value) = Self::decode(&record)?;
        if expires_at <= Self::now_millis() {
            self.remove(&full_key)?;
            return Err(SessionError::NotFound);
        }

        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.remove(&self.key(key))
    }
}
