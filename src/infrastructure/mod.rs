//! Adapters implementing the domain ports.

pub mod in_memory;
pub mod lock_table;
pub mod memory_queue;
#[cfg(feature = "queue-redis")]
pub mod redis;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
