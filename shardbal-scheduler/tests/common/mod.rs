//! Shared fixture for scheduler integration tests
//!
//! Two shards (`shard0` on TestHost0:12345, `shard1` on TestHost1:12346),
//! an in-memory command store, a process-local lock manager and a scripted
//! transport that records every command it is asked to send.

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use shardbal_core::chunk::{key_doc, ChunkInfo, ChunkRange, ChunkVersion};
use shardbal_core::error::TransportError;
use shardbal_core::types::{HostAndPort, Namespace, ShardId};
use shardbal_scheduler::{
    BalancerCommandsScheduler, DistLockManager, LocalDistLockManager, RemoteCommandTransport,
    SchedulerConfig, StaticShardRegistry,
};
use shardbal_storage::{AsyncWrapper, MemoryCommandStore};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const NSS: &str = "testDb.testColl";

pub fn shard0() -> ShardId {
    ShardId::new("shard0")
}

pub fn shard1() -> ShardId {
    ShardId::new("shard1")
}

pub fn host0() -> HostAndPort {
    HostAndPort::new("TestHost0", 12345)
}

pub fn host1() -> HostAndPort {
    HostAndPort::new("TestHost1", 12346)
}

pub fn nss() -> Namespace {
    Namespace::parse(NSS).unwrap()
}

/// Chunk `[{x: min}, {x: min + 10})` owned by `shard`
pub fn make_chunk(min: i64, shard: ShardId) -> ChunkInfo {
    ChunkInfo::new(
        ChunkRange::new(key_doc("x", min), key_doc("x", min + 10)),
        shard,
        ChunkVersion::new(1, 1, uuid::Uuid::new_v4(), 10),
    )
}

/// A command as seen by the transport
#[derive(Debug, Clone)]
pub struct SentCommand {
    pub host: HostAndPort,
    pub command: Bytes,
}

/// Transport answering from a script; `{"ok": true}` once the script runs out
pub struct MockTransport {
    replies: Mutex<VecDeque<Result<Bytes, TransportError>>>,
    sent: Mutex<Vec<SentCommand>>,
    delay: Mutex<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn push_reply(&self, reply: &'static str) {
        self.replies
            .lock()
            .push_back(Ok(Bytes::from_static(reply.as_bytes())));
    }

    pub fn push_error(&self, error: TransportError) {
        self.replies.lock().push_back(Err(error));
    }

    /// Hold every reply for `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait::async_trait]
impl RemoteCommandTransport for MockTransport {
    async fn send(&self, host: &HostAndPort, command: Bytes) -> Result<Bytes, TransportError> {
        self.sent.lock().push(SentCommand {
            host: host.clone(),
            command,
        });

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Bytes::from_static(br#"{"ok": true}"#)))
    }
}

pub struct Fixture {
    pub config: SchedulerConfig,
    pub store: Arc<AsyncWrapper<MemoryCommandStore>>,
    pub locks: Arc<LocalDistLockManager>,
    pub registry: Arc<StaticShardRegistry>,
    pub transport: Arc<MockTransport>,
    pub scheduler: BalancerCommandsScheduler,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let store = Arc::new(AsyncWrapper::new(MemoryCommandStore::new()));
        let locks = Arc::new(LocalDistLockManager::new());
        let registry = Arc::new(StaticShardRegistry::with_shards([
            (shard0(), host0()),
            (shard1(), host1()),
        ]));
        let transport = Arc::new(MockTransport::new());

        let scheduler = BalancerCommandsScheduler::new(
            &config,
            store.clone(),
            locks.clone(),
            registry.clone(),
            transport.clone(),
        );

        Self {
            config,
            store,
            locks,
            registry,
            transport,
            scheduler,
        }
    }

    /// A second scheduler sharing this fixture's store, locks and shards
    pub fn new_scheduler(&self) -> BalancerCommandsScheduler {
        BalancerCommandsScheduler::new(
            &self.config,
            self.store.clone(),
            self.locks.clone(),
            self.registry.clone(),
            self.transport.clone(),
        )
    }

    pub fn persisted_count(&self) -> usize {
        self.store.inner().records().len()
    }

    /// Whether an outside party can take the collection lock right now
    pub async fn dist_lock_is_free(&self) -> bool {
        match self
            .locks
            .try_lock(NSS, &format!("Test acquisition of distLock for {NSS}"), Duration::ZERO)
            .await
        {
            Ok(lock) => {
                self.locks.unlock(lock).await.unwrap();
                true
            }
            Err(_) => false,
        }
    }
}

/// Poll `check` until it holds, failing the test after five seconds
pub async fn wait_until(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
