//! Balancer command descriptors
//!
//! A `CommandInfo` is the typed description of one remote operation. It is
//! turned into an immutable `CommandDescriptor` at submission time, which
//! carries the serialized wire payload. The payload is computed exactly
//! once: persistence and crash-recovery replay always reuse these bytes.

use crate::chunk::{ChunkRange, ChunkVersion, Document, KeyPattern};
use crate::error::{BalancerError, Result};
use crate::types::{Namespace, RequestId, ShardId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default chunk size limit handed to moveChunk (128 MB)
pub const DEFAULT_MAX_CHUNK_SIZE_BYTES: u64 = 128 * 1024 * 1024;

/// The five remote operations the scheduler knows how to issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    MoveChunk,
    MergeChunk,
    SplitChunk,
    SplitVector,
    DataSize,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        CommandKind::MoveChunk,
        CommandKind::MergeChunk,
        CommandKind::SplitChunk,
        CommandKind::SplitVector,
        CommandKind::DataSize,
    ];

    /// Name of the command field in the wire document
    pub fn command_name(&self) -> &'static str {
        match self {
            CommandKind::MoveChunk => "moveChunk",
            CommandKind::MergeChunk => "mergeChunks",
            CommandKind::SplitChunk => "splitChunk",
            CommandKind::SplitVector => "splitVector",
            CommandKind::DataSize => "dataSize",
        }
    }

    /// Structural changes exclude concurrent DDL; read-only probes don't
    pub fn requires_distributed_lock(&self) -> bool {
        matches!(
            self,
            CommandKind::MoveChunk | CommandKind::MergeChunk | CommandKind::SplitChunk
        )
    }

    pub fn from_command_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.command_name() == name)
    }

    /// Recover the kind of an already-serialized command document
    pub fn detect(remote_command: &[u8]) -> Result<Self> {
        let doc: Document = serde_json::from_slice(remote_command)?;
        doc.keys()
            .find_map(|key| Self::from_command_name(key))
            .ok_or_else(|| {
                BalancerError::Serialization("remote command names no known operation".to_string())
            })
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_name())
    }
}

/// Replication throttling while a migration copies documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecondaryThrottle {
    #[default]
    Default,
    On,
    Off,
}

/// Whether a jumbo chunk may be moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ForceJumbo {
    #[default]
    DoNotForce,
    ForceManual,
    ForceBalancer,
}

/// Per-request moveChunk tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveChunkSettings {
    pub max_chunk_size_bytes: u64,
    pub secondary_throttle: SecondaryThrottle,
    pub wait_for_delete: bool,
    pub force_jumbo: ForceJumbo,
}

impl Default for MoveChunkSettings {
    fn default() -> Self {
        Self {
            max_chunk_size_bytes: DEFAULT_MAX_CHUNK_SIZE_BYTES,
            secondary_throttle: SecondaryThrottle::Default,
            wait_for_delete: false,
            force_jumbo: ForceJumbo::DoNotForce,
        }
    }
}

/// Limits for a splitVector computation; unset fields use the shard's defaults
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SplitVectorSettings {
    pub max_split_points: Option<u64>,
    pub max_chunk_objects: Option<u64>,
    pub max_chunk_size_bytes: Option<u64>,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveChunkCommandInfo {
    pub nss: Namespace,
    pub from_shard: ShardId,
    pub to_shard: ShardId,
    pub range: ChunkRange,
    pub version: ChunkVersion,
    pub settings: MoveChunkSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeChunksCommandInfo {
    pub nss: Namespace,
    pub shard: ShardId,
    pub range: ChunkRange,
    pub version: ChunkVersion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitChunkCommandInfo {
    pub nss: Namespace,
    pub shard: ShardId,
    pub range: ChunkRange,
    pub version: ChunkVersion,
    pub key_pattern: KeyPattern,
    pub split_points: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitVectorCommandInfo {
    pub nss: Namespace,
    pub shard: ShardId,
    pub range: ChunkRange,
    pub key_pattern: KeyPattern,
    pub settings: SplitVectorSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSizeCommandInfo {
    pub nss: Namespace,
    pub shard: ShardId,
    pub range: ChunkRange,
    pub version: ChunkVersion,
    pub key_pattern: KeyPattern,
    pub estimated_value: bool,
}

// ===== Wire Documents =====

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveChunkWire<'a> {
    move_chunk: &'a Namespace,
    from_shard: &'a ShardId,
    to_shard: &'a ShardId,
    min: &'a Document,
    max: &'a Document,
    max_chunk_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    secondary_throttle: Option<bool>,
    wait_for_delete: bool,
    force_jumbo: ForceJumbo,
    chunk_version: &'a ChunkVersion,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MergeChunksWire<'a> {
    merge_chunks: &'a Namespace,
    bounds: [&'a Document; 2],
    shard_name: &'a ShardId,
    chunk_version: &'a ChunkVersion,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SplitChunkWire<'a> {
    split_chunk: &'a Namespace,
    from: &'a ShardId,
    key_pattern: &'a KeyPattern,
    min: &'a Document,
    max: &'a Document,
    split_keys: &'a [Document],
    chunk_version: &'a ChunkVersion,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SplitVectorWire<'a> {
    split_vector: &'a Namespace,
    key_pattern: &'a KeyPattern,
    min: &'a Document,
    max: &'a Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_split_points: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_chunk_objects: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_chunk_size_bytes: Option<u64>,
    force: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataSizeWire<'a> {
    data_size: &'a Namespace,
    key_pattern: &'a KeyPattern,
    min: &'a Document,
    max: &'a Document,
    estimate: bool,
    chunk_version: &'a ChunkVersion,
}

/// Typed description of a remote balancer operation
#[derive(Debug, Clone, PartialEq)]
pub enum CommandInfo {
    MoveChunk(MoveChunkCommandInfo),
    MergeChunks(MergeChunksCommandInfo),
    SplitChunk(SplitChunkCommandInfo),
    SplitVector(SplitVectorCommandInfo),
    DataSize(DataSizeCommandInfo),
}

impl CommandInfo {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandInfo::MoveChunk(_) => CommandKind::MoveChunk,
            CommandInfo::MergeChunks(_) => CommandKind::MergeChunk,
            CommandInfo::SplitChunk(_) => CommandKind::SplitChunk,
            CommandInfo::SplitVector(_) => CommandKind::SplitVector,
            CommandInfo::DataSize(_) => CommandKind::DataSize,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        match self {
            CommandInfo::MoveChunk(info) => &info.nss,
            CommandInfo::MergeChunks(info) => &info.nss,
            CommandInfo::SplitChunk(info) => &info.nss,
            CommandInfo::SplitVector(info) => &info.nss,
            CommandInfo::DataSize(info) => &info.nss,
        }
    }

    /// The shard the command is sent to (the donor, for moveChunk)
    pub fn target(&self) -> &ShardId {
        match self {
            CommandInfo::MoveChunk(info) => &info.from_shard,
            CommandInfo::MergeChunks(info) => &info.shard,
            CommandInfo::SplitChunk(info) => &info.shard,
            CommandInfo::SplitVector(info) => &info.shard,
            CommandInfo::DataSize(info) => &info.shard,
        }
    }

    pub fn requires_distributed_lock(&self) -> bool {
        self.kind().requires_distributed_lock()
    }

    /// Encode the wire document sent to the target shard
    pub fn serialize(&self) -> Result<Bytes> {
        let encoded = match self {
            CommandInfo::MoveChunk(info) => serde_json::to_vec(&MoveChunkWire {
                move_chunk: &info.nss,
                from_shard: &info.from_shard,
                to_shard: &info.to_shard,
                min: &info.range.min,
                max: &info.range.max,
                max_chunk_size_bytes: info.settings.max_chunk_size_bytes,
                secondary_throttle: match info.settings.secondary_throttle {
                    SecondaryThrottle::Default => None,
                    SecondaryThrottle::On => Some(true),
                    SecondaryThrottle::Off => Some(false),
                },
                wait_for_delete: info.settings.wait_for_delete,
                force_jumbo: info.settings.force_jumbo,
                chunk_version: &info.version,
            })?,
            CommandInfo::MergeChunks(info) => serde_json::to_vec(&MergeChunksWire {
                merge_chunks: &info.nss,
                bounds: [&info.range.min, &info.range.max],
                shard_name: &info.shard,
                chunk_version: &info.version,
            })?,
            CommandInfo::SplitChunk(info) => serde_json::to_vec(&SplitChunkWire {
                split_chunk: &info.nss,
                from: &info.shard,
                key_pattern: &info.key_pattern,
                min: &info.range.min,
                max: &info.range.max,
                split_keys: &info.split_points,
                chunk_version: &info.version,
            })?,
            CommandInfo::SplitVector(info) => serde_json::to_vec(&SplitVectorWire {
                split_vector: &info.nss,
                key_pattern: &info.key_pattern,
                min: &info.range.min,
                max: &info.range.max,
                max_split_points: info.settings.max_split_points,
                max_chunk_objects: info.settings.max_chunk_objects,
                max_chunk_size_bytes: info.settings.max_chunk_size_bytes,
                force: info.settings.force,
            })?,
            CommandInfo::DataSize(info) => serde_json::to_vec(&DataSizeWire {
                data_size: &info.nss,
                key_pattern: &info.key_pattern,
                min: &info.range.min,
                max: &info.range.max,
                estimate: info.estimated_value,
                chunk_version: &info.version,
            })?,
        };
        Ok(Bytes::from(encoded))
    }
}

/// Durable recovery record of an outstanding command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCommandRecord {
    pub request_id: RequestId,
    pub nss: Namespace,
    pub target: ShardId,
    pub remote_command: Bytes,
    pub requires_distributed_lock: bool,
}

/// Immutable, fully serialized command as handled by the scheduler worker
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    request_id: RequestId,
    kind: CommandKind,
    namespace: Namespace,
    target: ShardId,
    remote_command: Bytes,
    requires_distributed_lock: bool,
}

impl CommandDescriptor {
    /// Serialize `info` once and bind it to `request_id`
    pub fn new(request_id: RequestId, info: &CommandInfo) -> Result<Self> {
        Ok(Self {
            request_id,
            kind: info.kind(),
            namespace: info.namespace().clone(),
            target: info.target().clone(),
            remote_command: info.serialize()?,
            requires_distributed_lock: info.requires_distributed_lock(),
        })
    }

    /// Rebuild a descriptor verbatim from its recovery record
    pub fn from_record(record: &PersistedCommandRecord) -> Result<Self> {
        Ok(Self {
            request_id: record.request_id,
            kind: CommandKind::detect(&record.remote_command)?,
            namespace: record.nss.clone(),
            target: record.target.clone(),
            remote_command: record.remote_command.clone(),
            requires_distributed_lock: record.requires_distributed_lock,
        })
    }

    pub fn to_record(&self) -> PersistedCommandRecord {
        PersistedCommandRecord {
            request_id: self.request_id,
            nss: self.namespace.clone(),
            target: self.target.clone(),
            remote_command: self.remote_command.clone(),
            requires_distributed_lock: self.requires_distributed_lock,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn target(&self) -> &ShardId {
        &self.target
    }

    pub fn remote_command(&self) -> &Bytes {
        &self.remote_command
    }

    pub fn requires_distributed_lock(&self) -> bool {
        self.requires_distributed_lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::key_doc;
    use serde_json::json;
    use uuid::Uuid;

    fn nss() -> Namespace {
        Namespace::parse("testDb.testColl").unwrap()
    }

    fn range() -> ChunkRange {
        ChunkRange::new(key_doc("x", 0), key_doc("x", 10))
    }

    fn version() -> ChunkVersion {
        ChunkVersion::new(1, 1, Uuid::new_v4(), 10)
    }

    fn move_chunk() -> CommandInfo {
        CommandInfo::MoveChunk(MoveChunkCommandInfo {
            nss: nss(),
            from_shard: ShardId::new("shard0"),
            to_shard: ShardId::new("shard1"),
            range: range(),
            version: version(),
            settings: MoveChunkSettings::default(),
        })
    }

    #[test]
    fn test_move_chunk_wire_document() {
        let bytes = move_chunk().serialize().unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(doc["moveChunk"], "testDb.testColl");
        assert_eq!(doc["fromShard"], "shard0");
        assert_eq!(doc["toShard"], "shard1");
        assert_eq!(doc["min"], json!({"x": 0}));
        assert_eq!(doc["max"], json!({"x": 10}));
        assert_eq!(doc["maxChunkSizeBytes"], DEFAULT_MAX_CHUNK_SIZE_BYTES);
        assert!(doc.get("secondaryThrottle").is_none());
        assert_eq!(doc["forceJumbo"], "doNotForce");
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let info = move_chunk();
        assert_eq!(info.serialize().unwrap(), info.serialize().unwrap());
    }

    #[test]
    fn test_lock_requirement_by_kind() {
        assert!(CommandKind::MoveChunk.requires_distributed_lock());
        assert!(CommandKind::MergeChunk.requires_distributed_lock());
        assert!(CommandKind::SplitChunk.requires_distributed_lock());
        assert!(!CommandKind::SplitVector.requires_distributed_lock());
        assert!(!CommandKind::DataSize.requires_distributed_lock());
    }

    #[test]
    fn test_detect_kind_from_payload() {
        let split_vector = CommandInfo::SplitVector(SplitVectorCommandInfo {
            nss: nss(),
            shard: ShardId::new("shard0"),
            range: range(),
            key_pattern: KeyPattern::ascending("x"),
            settings: SplitVectorSettings {
                max_split_points: Some(4),
                ..Default::default()
            },
        });
        let bytes = split_vector.serialize().unwrap();
        assert_eq!(CommandKind::detect(&bytes).unwrap(), CommandKind::SplitVector);

        // splitKeys must not be confused with a command name
        let split_chunk = CommandInfo::SplitChunk(SplitChunkCommandInfo {
            nss: nss(),
            shard: ShardId::new("shard0"),
            range: range(),
            version: version(),
            key_pattern: KeyPattern::ascending("x"),
            split_points: vec![key_doc("x", 5)],
        });
        let bytes = split_chunk.serialize().unwrap();
        assert_eq!(CommandKind::detect(&bytes).unwrap(), CommandKind::SplitChunk);

        assert!(CommandKind::detect(br#"{"ping": 1}"#).is_err());
        assert!(CommandKind::detect(b"not json").is_err());
    }

    #[test]
    fn test_descriptor_record_round_trip_keeps_bytes() {
        let info = move_chunk();
        let descriptor = CommandDescriptor::new(RequestId::new(), &info).unwrap();
        assert_eq!(descriptor.kind(), CommandKind::MoveChunk);
        assert_eq!(descriptor.target(), &ShardId::new("shard0"));
        assert!(descriptor.requires_distributed_lock());

        let record = descriptor.to_record();
        let recovered = CommandDescriptor::from_record(&record).unwrap();
        assert_eq!(recovered, descriptor);
        assert_eq!(recovered.remote_command(), descriptor.remote_command());
    }

    #[test]
    fn test_compound_key_keeps_field_order_on_the_wire() {
        let mut pattern = Document::new();
        pattern.insert("b".to_string(), json!(1));
        pattern.insert("a".to_string(), json!(1));
        let mut min = Document::new();
        min.insert("b".to_string(), json!(0));
        min.insert("a".to_string(), json!(0));
        let mut max = Document::new();
        max.insert("b".to_string(), json!(10));
        max.insert("a".to_string(), json!(0));

        let info = CommandInfo::SplitVector(SplitVectorCommandInfo {
            nss: nss(),
            shard: ShardId::new("shard0"),
            range: ChunkRange::new(min, max),
            key_pattern: KeyPattern(pattern),
            settings: SplitVectorSettings::default(),
        });
        let wire = String::from_utf8(info.serialize().unwrap().to_vec()).unwrap();

        assert!(wire.starts_with(r#"{"splitVector":"testDb.testColl""#));
        assert!(wire.contains(r#""keyPattern":{"b":1,"a":1}"#));
        assert!(wire.contains(r#""min":{"b":0,"a":0}"#));
        assert!(wire.contains(r#""max":{"b":10,"a":0}"#));
    }

    #[test]
    fn test_merge_chunks_bounds() {
        let info = CommandInfo::MergeChunks(MergeChunksCommandInfo {
            nss: nss(),
            shard: ShardId::new("shard0"),
            range: ChunkRange::new(key_doc("x", 0), key_doc("x", 20)),
            version: version(),
        });
        let doc: serde_json::Value = serde_json::from_slice(&info.serialize().unwrap()).unwrap();
        assert_eq!(doc["mergeChunks"], "testDb.testColl");
        assert_eq!(doc["bounds"], json!([{"x": 0}, {"x": 20}]));
        assert_eq!(doc["shardName"], "shard0");
    }
}
