//! Distributed lock adapter
//!
//! Structural balancer commands take the collection's distributed lock
//! before they are dispatched so that they never race concurrent DDL.
//! Acquisition is a bounded attempt: contention is reported as
//! `LockBusy` instead of being waited out.

use async_trait::async_trait;
use parking_lot::Mutex;
use shardbal_core::error::{BalancerError, Result};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// A held distributed lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistLock {
    name: String,
    lock_id: Uuid,
    why: String,
}

impl DistLock {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lock_id(&self) -> Uuid {
        self.lock_id
    }

    pub fn why(&self) -> &str {
        &self.why
    }
}

/// Cluster-wide lock service scoped by resource name
#[async_trait]
pub trait DistLockManager: Send + Sync {
    /// Try to take `name`, waiting at most `timeout` for a contended lock
    async fn try_lock(&self, name: &str, why: &str, timeout: Duration) -> Result<DistLock>;

    /// Release a lock previously returned by `try_lock`
    async fn unlock(&self, lock: DistLock) -> Result<()>;
}

/// Process-local lock manager
pub struct LocalDistLockManager {
    locks: Mutex<HashMap<String, DistLock>>,
    retry_interval: Duration,
}

impl LocalDistLockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            retry_interval: Duration::from_millis(10),
        }
    }

    /// Whether anyone currently holds `name`
    pub fn is_locked(&self, name: &str) -> bool {
        self.locks.lock().contains_key(name)
    }

    /// Current holder of `name`
    pub fn holder(&self, name: &str) -> Option<DistLock> {
        self.locks.lock().get(name).cloned()
    }

    fn acquire_once(&self, name: &str, why: &str) -> Option<DistLock> {
        let mut locks = self.locks.lock();
        if locks.contains_key(name) {
            return None;
        }

        let lock = DistLock {
            name: name.to_string(),
            lock_id: Uuid::new_v4(),
            why: why.to_string(),
        };
        locks.insert(name.to_string(), lock.clone());
        Some(lock)
    }
}

impl Default for LocalDistLockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistLockManager for LocalDistLockManager {
    async fn try_lock(&self, name: &str, why: &str, timeout: Duration) -> Result<DistLock> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(lock) = self.acquire_once(name, why) {
                debug!(name, why, lock_id = %lock.lock_id, "Acquired dist lock");
                return Ok(lock);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(name, "Dist lock busy");
                return Err(BalancerError::LockBusy(name.to_string()));
            }

            tokio::time::sleep(self.retry_interval.min(deadline - now)).await;
        }
    }

    async fn unlock(&self, lock: DistLock) -> Result<()> {
        let mut locks = self.locks.lock();

        match locks.get(&lock.name) {
            Some(held) if held.lock_id == lock.lock_id => {
                locks.remove(&lock.name);
                debug!(name = %lock.name, lock_id = %lock.lock_id, "Released dist lock");
            }
            _ => {
                warn!(
                    name = %lock.name,
                    lock_id = %lock.lock_id,
                    "Released a dist lock that was not held"
                );
            }
        }

        Ok(())
    }
}
