//! Chunk types
//!
//! A chunk is a contiguous key range of a sharded collection owned by a
//! single shard. Keys are documents (`{"x": 5}`), represented as JSON maps.

use crate::types::ShardId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A key document (`{"x": 5}`); field order is significant for compound keys
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Build a single-field key document
pub fn key_doc(field: &str, value: impl Into<serde_json::Value>) -> Document {
    let mut doc = Document::new();
    doc.insert(field.to_string(), value.into());
    doc
}

/// Shard key pattern (`{"x": 1}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPattern(pub Document);

impl KeyPattern {
    /// Ascending pattern on a single field
    pub fn ascending(field: &str) -> Self {
        Self(key_doc(field, 1))
    }
}

/// Placement version of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkVersion {
    pub major: u32,
    pub minor: u32,
    /// Collection epoch
    pub epoch: Uuid,
    /// Collection timestamp
    pub timestamp: u64,
}

impl ChunkVersion {
    pub fn new(major: u32, minor: u32, epoch: Uuid, timestamp: u64) -> Self {
        Self {
            major,
            minor,
            epoch,
            timestamp,
        }
    }
}

impl fmt::Display for ChunkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}||{}", self.major, self.minor, self.epoch)
    }
}

/// Key range `[min, max)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub min: Document,
    pub max: Document,
}

impl ChunkRange {
    pub fn new(min: Document, max: Document) -> Self {
        Self { min, max }
    }
}

/// A chunk as known to the config metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub range: ChunkRange,
    pub shard: ShardId,
    pub version: ChunkVersion,
}

impl ChunkInfo {
    pub fn new(range: ChunkRange, shard: ShardId, version: ChunkVersion) -> Self {
        Self {
            range,
            shard,
            version,
        }
    }
}
