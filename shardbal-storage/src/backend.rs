//! Command store traits
//!
//! Defines the interface every recovery-record store must follow.

use shardbal_core::command::PersistedCommandRecord;
use shardbal_core::error::Result;
use shardbal_core::types::RequestId;
use std::future::Future;
use std::pin::Pin;

/// Async store of outstanding balancer commands
///
/// All implementations must be Send + Sync for use from the scheduler worker.
pub trait CommandStore: Send + Sync {
    /// Persist a record; fails if a record with the same request id exists
    fn insert<'a>(
        &'a self,
        record: PersistedCommandRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Remove a record, returning whether it existed
    fn delete<'a>(
        &'a self,
        request_id: RequestId,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// All surviving records, in insertion order
    fn scan_all<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PersistedCommandRecord>>> + Send + 'a>>;

    /// Number of surviving records
    fn count<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>>;

    /// Flush any pending writes to disk
    fn flush<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Synchronous command store (for simpler implementations)
pub trait CommandStoreSync: Send + Sync {
    fn insert(&self, record: PersistedCommandRecord) -> Result<()>;

    fn delete(&self, request_id: RequestId) -> Result<bool>;

    fn get(&self, request_id: RequestId) -> Result<Option<PersistedCommandRecord>>;

    fn scan_all(&self) -> Result<Vec<PersistedCommandRecord>>;

    fn count(&self) -> Result<usize>;

    fn flush(&self) -> Result<()>;
}

/// Wrapper to convert sync store to async
pub struct AsyncWrapper<T: CommandStoreSync>(pub T);

impl<T: CommandStoreSync> AsyncWrapper<T> {
    pub fn new(inner: T) -> Self {
        Self(inner)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }
}

impl<T: CommandStoreSync + 'static> CommandStore for AsyncWrapper<T> {
    fn insert<'a>(
        &'a self,
        record: PersistedCommandRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { self.0.insert(record) })
    }

    fn delete<'a>(
        &'a self,
        request_id: RequestId,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move { self.0.delete(request_id) })
    }

    fn scan_all<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PersistedCommandRecord>>> + Send + 'a>> {
        Box::pin(async move { self.0.scan_all() })
    }

    fn count<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>> {
        Box::pin(async move { self.0.count() })
    }

    fn flush<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { self.0.flush() })
    }
}
