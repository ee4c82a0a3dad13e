//! In-memory command store
//!
//! Used for testing and development. Not persistent.

use crate::backend::CommandStoreSync;
use parking_lot::RwLock;
use shardbal_core::command::PersistedCommandRecord;
use shardbal_core::error::{BalancerError, Result};
use shardbal_core::types::RequestId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// In-memory command store
pub struct MemoryCommandStore {
    /// Records in insertion order
    records: RwLock<Vec<PersistedCommandRecord>>,

    /// Injected write failures
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,

    /// Operation counters
    inserts: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryCommandStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            fail_inserts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            inserts: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Make subsequent inserts fail with a storage error
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent deletes fail with a storage error
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Successful inserts so far
    pub fn insert_count(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Successful deletes so far
    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Snapshot of the stored records
    pub fn records(&self) -> Vec<PersistedCommandRecord> {
        self.records.read().clone()
    }
}

impl Default for MemoryCommandStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandStoreSync for MemoryCommandStore {
    fn insert(&self, record: PersistedCommandRecord) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(BalancerError::Storage(
                "injected insert failure".to_string(),
            ));
        }

        let mut records = self.records.write();
        if records.iter().any(|r| r.request_id == record.request_id) {
            return Err(BalancerError::Storage(format!(
                "duplicate request id {}",
                record.request_id
            )));
        }

        records.push(record);
        self.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self, request_id: RequestId) -> Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BalancerError::Storage(
                "injected delete failure".to_string(),
            ));
        }

        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.request_id != request_id);

        if records.len() < before {
            self.deletes.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn get(&self, request_id: RequestId) -> Result<Option<PersistedCommandRecord>> {
        let records = self.records.read();
        Ok(records.iter().find(|r| r.request_id == request_id).cloned())
    }

    fn scan_all(&self) -> Result<Vec<PersistedCommandRecord>> {
        Ok(self.records())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }

    fn flush(&self) -> Result<()> {
        // No-op for in-memory storage
        Ok(())
    }
}
