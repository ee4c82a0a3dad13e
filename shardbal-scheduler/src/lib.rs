//! shardbal Scheduler Library
//!
//! This crate schedules balancer commands against shards.
//!
//! The scheduler accepts chunk commands from the balancer and:
//! - Persists each command as a recovery record before dispatch
//! - Takes the collection's distributed lock for structural commands
//! - Sends the command to the owning shard and decodes its reply
//! - Replays surviving recovery records after a restart

pub mod config;
pub mod dispatch;
pub mod lock;
pub mod response;
pub mod scheduler;

// Re-export main types
pub use config::{ConfigError, SchedulerConfig};
pub use dispatch::{CommandDispatcher, RemoteCommandTransport, ShardTargeter, StaticShardRegistry};
pub use lock::{DistLock, DistLockManager, LocalDistLockManager};
pub use response::{response_channel, CommandOutcome, ResponseHandle, ResponseResolver};
pub use scheduler::{BalancerCommandsScheduler, SchedulerState, WorkerPausePoint};
