//! Sled-based command store
//!
//! Durable home of the recovery records. Sled is pure Rust and crash-safe;
//! every write is flushed before it is acknowledged so that a record that
//! was reported as persisted survives a process crash.

use crate::backend::CommandStoreSync;
use serde::{Deserialize, Serialize};
use shardbal_core::command::PersistedCommandRecord;
use shardbal_core::error::{BalancerError, Result};
use shardbal_core::types::RequestId;
use std::path::Path;
use tracing::{debug, info};

/// Tree holding the outstanding balancer commands
const COMMANDS_TREE: &str = "balancer_commands";

/// On-disk envelope; `seq` restores arrival order on scan
#[derive(Debug, Serialize, Deserialize)]
struct StoredCommand {
    seq: u64,
    record: PersistedCommandRecord,
}

fn storage_err(e: sled::Error) -> BalancerError {
    BalancerError::Storage(e.to_string())
}

/// Sled-based command store
pub struct SledCommandStore {
    db: sled::Db,
    commands: sled::Tree,
}

impl SledCommandStore {
    /// Open or create a command store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!(path = ?path.as_ref(), "Opening Sled command store");

        let db = sled::open(path.as_ref())
            .map_err(|e| BalancerError::Storage(format!("Failed to open Sled: {}", e)))?;

        Self::from_db(db)
    }

    /// Open an in-memory store (for testing)
    pub fn open_temporary() -> Result<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|e| BalancerError::Storage(format!("Failed to open Sled: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let commands = db.open_tree(COMMANDS_TREE).map_err(storage_err)?;
        Ok(Self { db, commands })
    }

    fn decode(bytes: &[u8]) -> Result<StoredCommand> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl CommandStoreSync for SledCommandStore {
    fn insert(&self, record: PersistedCommandRecord) -> Result<()> {
        let request_id = record.request_id;
        let seq = self.db.generate_id().map_err(storage_err)?;
        let encoded = bincode::serialize(&StoredCommand { seq, record })?;

        self.commands
            .compare_and_swap(request_id.as_bytes(), None::<&[u8]>, Some(encoded))
            .map_err(storage_err)?
            .map_err(|_| BalancerError::Storage(format!("duplicate request id {}", request_id)))?;

        self.commands.flush().map_err(storage_err)?;

        debug!(request_id = %request_id, seq, "Persisted balancer command");
        Ok(())
    }

    fn delete(&self, request_id: RequestId) -> Result<bool> {
        let removed = self
            .commands
            .remove(request_id.as_bytes())
            .map_err(storage_err)?;

        if removed.is_some() {
            self.commands.flush().map_err(storage_err)?;
            debug!(request_id = %request_id, "Deleted balancer command");
        }

        Ok(removed.is_some())
    }

    fn get(&self, request_id: RequestId) -> Result<Option<PersistedCommandRecord>> {
        match self
            .commands
            .get(request_id.as_bytes())
            .map_err(storage_err)?
        {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?.record)),
            None => Ok(None),
        }
    }

    fn scan_all(&self) -> Result<Vec<PersistedCommandRecord>> {
        let mut stored = Vec::new();

        for item in self.commands.iter() {
            let (_, value) = item.map_err(storage_err)?;
            stored.push(Self::decode(&value)?);
        }

        stored.sort_by_key(|s| s.seq);
        Ok(stored.into_iter().map(|s| s.record).collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.commands.len())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}
