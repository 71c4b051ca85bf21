//! Storage contracts: the snapshot cache and the durable subscriber store

pub mod memory;
pub mod redis;

pub use self::memory::{MemorySnapshotCache, MemorySubscriberStore};
pub use self::redis::{RedisSnapshotCache, RedisSubscriberStore};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::shared::errors::StorageError;
use crate::shared::types::{MonitorParams, SubscriberRecord, Ticker};

/// TTL-bounded cache for exchange snapshots.
///
/// Expiry is hard: after the TTL a `get` must return `None`. There is no
/// locking across readers — a redundant fetch race inside one TTL window
/// is acceptable, the cache is a freshness bound, not a capacity bound.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, exchange_name: &str) -> Result<Option<Vec<Ticker>>, StorageError>;

    async fn set(
        &self,
        exchange_name: &str,
        data: &[Ticker],
        ttl: Duration,
    ) -> Result<(), StorageError>;
}

/// Durable per-subscriber state. Field-level updates must never clobber
/// sibling fields; `upsert` seeds the monitoring flag and parameters only
/// when absent, so re-running `/start` does not disable a live session.
/// `set_enabled`/`set_params` for an unknown id are no-ops — records are
/// created by `upsert` only.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn upsert(&self, user_id: i64, chat_id: i64, username: &str)
        -> Result<(), StorageError>;

    async fn get(&self, user_id: i64) -> Result<Option<SubscriberRecord>, StorageError>;

    async fn set_enabled(&self, user_id: i64, enabled: bool) -> Result<(), StorageError>;

    async fn set_params(&self, user_id: i64, params: MonitorParams) -> Result<(), StorageError>;

    async fn list_all(&self) -> Result<HashMap<i64, SubscriberRecord>, StorageError>;
}
