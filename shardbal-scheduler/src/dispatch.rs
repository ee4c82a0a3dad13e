//! Remote dispatch adapter
//!
//! Translates a command descriptor into a transport call and the reply
//! back into a typed payload. The shard is resolved to a host at dispatch
//! time, so a shard that does not exist fails before any network attempt.

use bytes::Bytes;
use parking_lot::RwLock;
use shardbal_core::command::CommandDescriptor;
use shardbal_core::error::{BalancerError, Result, TransportError, TransportErrorCode};
use shardbal_core::reply::{decode_reply, CommandPayload};
use shardbal_core::types::{HostAndPort, ShardId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Resolves shard ids to the host that should receive commands
#[async_trait::async_trait]
pub trait ShardTargeter: Send + Sync {
    async fn find_host(&self, shard: &ShardId) -> Result<HostAndPort>;
}

/// Sends one serialized command to a host; a single attempt, no retries
#[async_trait::async_trait]
pub trait RemoteCommandTransport: Send + Sync {
    async fn send(
        &self,
        host: &HostAndPort,
        command: Bytes,
    ) -> std::result::Result<Bytes, TransportError>;
}

/// Shard registry backed by a static shard → host map
pub struct StaticShardRegistry {
    hosts: RwLock<HashMap<ShardId, HostAndPort>>,
}

impl StaticShardRegistry {
    pub fn new() -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_shards(shards: impl IntoIterator<Item = (ShardId, HostAndPort)>) -> Self {
        Self {
            hosts: RwLock::new(shards.into_iter().collect()),
        }
    }

    /// Register or re-point a shard
    pub fn set_host(&self, shard: ShardId, host: HostAndPort) {
        self.hosts.write().insert(shard, host);
    }

    /// Forget a shard (e.g. after it was removed from the cluster)
    pub fn remove(&self, shard: &ShardId) -> Option<HostAndPort> {
        self.hosts.write().remove(shard)
    }
}

impl Default for StaticShardRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ShardTargeter for StaticShardRegistry {
    async fn find_host(&self, shard: &ShardId) -> Result<HostAndPort> {
        self.hosts
            .read()
            .get(shard)
            .cloned()
            .ok_or_else(|| BalancerError::ShardNotFound(shard.to_string()))
    }
}

/// Dispatches descriptors through a targeter and a transport
pub struct CommandDispatcher {
    targeter: Arc<dyn ShardTargeter>,
    transport: Arc<dyn RemoteCommandTransport>,
    dispatch_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(
        targeter: Arc<dyn ShardTargeter>,
        transport: Arc<dyn RemoteCommandTransport>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            targeter,
            transport,
            dispatch_timeout,
        }
    }

    /// Send the descriptor's command to its target and decode the reply
    #[instrument(
        skip(self, descriptor),
        fields(request_id = %descriptor.request_id(), target = %descriptor.target())
    )]
    pub async fn dispatch(&self, descriptor: &CommandDescriptor) -> Result<CommandPayload> {
        let host = self.targeter.find_host(descriptor.target()).await?;

        debug!(host = %host, kind = %descriptor.kind(), "Sending balancer command");

        let reply = match timeout(
            self.dispatch_timeout,
            self.transport.send(&host, descriptor.remote_command().clone()),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(host = %host, error = %e, "Transport error");
                return Err(e.into());
            }
            Err(_) => {
                warn!(host = %host, timeout = ?self.dispatch_timeout, "Dispatch timed out");
                return Err(TransportError::new(
                    TransportErrorCode::ExceededTimeLimit,
                    format!("no reply from {} within {:?}", host, self.dispatch_timeout),
                )
                .into());
            }
        };

        decode_reply(descriptor.kind(), &reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use shardbal_core::chunk::{key_doc, ChunkRange, ChunkVersion, KeyPattern};
    use shardbal_core::command::{CommandInfo, DataSizeCommandInfo};
    use shardbal_core::error::ErrorKind;
    use shardbal_core::types::{Namespace, RequestId};

    struct FixedTransport {
        reply: std::result::Result<Bytes, TransportError>,
        delay: Duration,
        sent: Mutex<Vec<HostAndPort>>,
    }

    #[async_trait::async_trait]
    impl RemoteCommandTransport for FixedTransport {
        async fn send(
            &self,
            host: &HostAndPort,
            _command: Bytes,
        ) -> std::result::Result<Bytes, TransportError> {
            self.sent.lock().push(host.clone());
            tokio::time::sleep(self.delay).await;
            self.reply.clone()
        }
    }

    fn data_size(shard: &str) -> CommandDescriptor {
        let info = CommandInfo::DataSize(DataSizeCommandInfo {
            nss: Namespace::parse("testDb.testColl").unwrap(),
            shard: ShardId::new(shard),
            range: ChunkRange::new(key_doc("x", 0), key_doc("x", 10)),
            version: ChunkVersion::new(1, 1, uuid::Uuid::new_v4(), 10),
            key_pattern: KeyPattern::ascending("x"),
            estimated_value: false,
        });
        CommandDescriptor::new(RequestId::new(), &info).unwrap()
    }

    fn dispatcher(transport: Arc<FixedTransport>, limit: Duration) -> CommandDispatcher {
        let registry = StaticShardRegistry::with_shards([(
            ShardId::new("shard0"),
            HostAndPort::new("TestHost0", 12345),
        )]);
        CommandDispatcher::new(Arc::new(registry), transport, limit)
    }

    fn transport(
        reply: std::result::Result<Bytes, TransportError>,
        delay: Duration,
    ) -> Arc<FixedTransport> {
        Arc::new(FixedTransport {
            reply,
            delay,
            sent: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_dispatch_decodes_payload() {
        let transport = transport(
            Ok(Bytes::from_static(br#"{"ok": 1, "size": 156, "numObjects": 25}"#)),
            Duration::ZERO,
        );
        let dispatcher = dispatcher(transport.clone(), Duration::from_secs(5));

        let payload = dispatcher.dispatch(&data_size("shard0")).await.unwrap();
        assert_eq!(
            payload,
            CommandPayload::DataSize {
                size: 156,
                num_objects: 25
            }
        );
        assert_eq!(transport.sent.lock().as_slice(), &[HostAndPort::new("TestHost0", 12345)]);
    }

    #[tokio::test]
    async fn test_unknown_shard_never_reaches_transport() {
        let transport = transport(Ok(Bytes::from_static(br#"{"ok": 1}"#)), Duration::ZERO);
        let dispatcher = dispatcher(transport.clone(), Duration::from_secs(5));

        let err = dispatcher.dispatch(&data_size("nonexistent")).await.unwrap_err();
        assert_eq!(err, BalancerError::ShardNotFound("nonexistent".to_string()));
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_timeout() {
        let transport = transport(Ok(Bytes::from_static(br#"{"ok": 1}"#)), Duration::from_secs(10));
        let dispatcher = dispatcher(transport, Duration::from_millis(20));

        let err = dispatcher.dispatch(&data_size("shard0")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(matches!(
            err,
            BalancerError::Transport(TransportError {
                code: TransportErrorCode::ExceededTimeLimit,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_registry_updates() {
        let registry = StaticShardRegistry::new();
        let shard = ShardId::new("shard1");
        assert!(registry.find_host(&shard).await.is_err());

        registry.set_host(shard.clone(), HostAndPort::new("TestHost1", 12346));
        assert_eq!(
            registry.find_host(&shard).await.unwrap(),
            HostAndPort::new("TestHost1", 12346)
        );

        registry.remove(&shard);
        assert!(registry.find_host(&shard).await.is_err());
    }
}
