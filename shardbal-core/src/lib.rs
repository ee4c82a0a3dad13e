//! shardbal Core Library
//!
//! Shared types for the balancer command scheduler:
//! - Identifiers (request ids, shard ids, namespaces, hosts)
//! - Chunk ranges, versions and key patterns
//! - Command descriptors, their wire encodings and recovery records
//! - Shard reply decoding
//! - Common error handling

pub mod chunk;
pub mod command;
pub mod error;
pub mod reply;
pub mod types;

pub use chunk::{key_doc, ChunkInfo, ChunkRange, ChunkVersion, Document, KeyPattern};
pub use command::{
    CommandDescriptor, CommandInfo, CommandKind, DataSizeCommandInfo, ForceJumbo,
    MergeChunksCommandInfo, MoveChunkCommandInfo, MoveChunkSettings, PersistedCommandRecord,
    SecondaryThrottle, SplitChunkCommandInfo, SplitVectorCommandInfo, SplitVectorSettings,
    DEFAULT_MAX_CHUNK_SIZE_BYTES,
};
pub use error::{BalancerError, ErrorKind, Result, TransportError, TransportErrorCode};
pub use reply::{decode_reply, CommandPayload};
pub use types::{HostAndPort, Namespace, RequestId, ShardId};
