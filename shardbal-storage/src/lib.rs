//! shardbal Storage Backend
//!
//! Durable record of outstanding balancer commands:
//! - `CommandStore` trait for pluggable stores
//! - `SledCommandStore` for production use
//! - `MemoryCommandStore` for testing

pub mod backend;
pub mod memory;
pub mod sled_backend;

pub use backend::{AsyncWrapper, CommandStore, CommandStoreSync};
pub use memory::MemoryCommandStore;
pub use sled_backend::SledCommandStore;
