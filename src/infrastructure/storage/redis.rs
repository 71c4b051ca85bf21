//! Redis-backed storage adapters.
//!
//! Layout:
//! - `exchange_data:<exchangeName>` — JSON snapshot, SET with EX = TTL
//! - `subscriber:<id>` — hash with fields `chat_id`, `username`,
//!   `is_monitoring_active`, `check_interval_secs`, `threshold_pct`
//! - `subscribers` — set of all known subscriber ids
//!
//! The connection manager re-establishes dropped connections before
//! failing an operation, so a transient outage is retried on use.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::shared::errors::StorageError;
use crate::shared::types::{MonitorParams, SubscriberRecord, Ticker};

use super::{SnapshotCache, SubscriberStore};

const CACHE_PREFIX: &str = "exchange_data:";
const SUBSCRIBER_PREFIX: &str = "subscriber:";
const SUBSCRIBER_SET: &str = "subscribers";

pub struct RedisSnapshotCache {
    conn: ConnectionManager,
}

impl RedisSnapshotCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn get(&self, exchange_name: &str) -> Result<Option<Vec<Ticker>>, StorageError> {
        let key = format!("{}{}", CACHE_PREFIX, exchange_name);
        let mut conn = self.conn.clone();

        let raw: Option<String> = conn.get(&key).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        // A corrupt entry counts as a miss, the caller refetches
        match serde_json::from_str(&raw) {
            Ok(tickers) => Ok(Some(tickers)),
            Err(e) => {
                warn!("Повреждённая запись кэша для '{}': {}", exchange_name, e);
                Ok(None)
            }
        }
    }

    async fn set(
        &self,
        exchange_name: &str,
        data: &[Ticker],
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let key = format!("{}{}", CACHE_PREFIX, exchange_name);
        let payload = serde_json::to_string(data)?;
        let mut conn = self.conn.clone();

        conn.set_ex::<_, _, ()>(&key, payload, ttl.as_secs()).await?;
        debug!(
            "Снимок '{}' сохранён в кэше (TTL {} сек)",
            exchange_name,
            ttl.as_secs()
        );
        Ok(())
    }
}

pub struct RedisSubscriberStore {
    conn: ConnectionManager,
    default_params: MonitorParams,
}

impl RedisSubscriberStore {
    pub fn new(conn: ConnectionManager, default_params: MonitorParams) -> Self {
        Self {
            conn,
            default_params,
        }
    }

    fn key(user_id: i64) -> String {
        format!("{}{}", SUBSCRIBER_PREFIX, user_id)
    }

    fn record_from_hash(
        &self,
        user_id: i64,
        fields: HashMap<String, String>,
    ) -> Option<SubscriberRecord> {
        let chat_id = fields.get("chat_id")?.parse().ok()?;
        let username = fields.get("username").cloned().unwrap_or_default();
        let is_monitoring_active = fields
            .get("is_monitoring_active")
            .map(|v| v == "1")
            .unwrap_or(false);

        // Records written before per-subscriber config fall back to defaults
        let check_interval_secs = fields
            .get("check_interval_secs")
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.default_params.check_interval_secs);
        let threshold_pct = fields
            .get("threshold_pct")
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.default_params.threshold_pct);

        Some(SubscriberRecord {
            user_id,
            chat_id,
            username,
            is_monitoring_active,
            params: MonitorParams {
                check_interval_secs,
                threshold_pct,
            },
        })
    }
}

#[async_trait]
impl SubscriberStore for RedisSubscriberStore {
    async fn upsert(
        &self,
        user_id: i64,
        chat_id: i64,
        username: &str,
    ) -> Result<(), StorageError> {
        let key = Self::key(user_id);
        let mut conn = self.conn.clone();

        // Identity fields: last write wins
        conn.hset::<_, _, _, ()>(&key, "chat_id", chat_id).await?;
        conn.hset::<_, _, _, ()>(&key, "username", username).await?;

        // State and parameters are seeded only when absent
        conn.hset_nx::<_, _, _, ()>(&key, "is_monitoring_active", "0")
            .await?;
        conn.hset_nx::<_, _, _, ()>(
            &key,
            "check_interval_secs",
            self.default_params.check_interval_secs,
        )
        .await?;
        conn.hset_nx::<_, _, _, ()>(&key, "threshold_pct", self.default_params.threshold_pct)
            .await?;

        conn.sadd::<_, _, ()>(SUBSCRIBER_SET, user_id).await?;
        Ok(())
    }

    async fn get(&self, user_id: i64) -> Result<Option<SubscriberRecord>, StorageError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(Self::key(user_id)).await?;

        if fields.is_empty() {
            return Ok(None);
        }
        Ok(self.record_from_hash(user_id, fields))
    }

    async fn set_enabled(&self, user_id: i64, enabled: bool) -> Result<(), StorageError> {
        let key = Self::key(user_id);
        let mut conn = self.conn.clone();

        // Unknown ids are a no-op, no partial hash outside the registry
        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Ok(());
        }

        conn.hset::<_, _, _, ()>(&key, "is_monitoring_active", if enabled { "1" } else { "0" })
            .await?;
        Ok(())
    }

    async fn set_params(&self, user_id: i64, params: MonitorParams) -> Result<(), StorageError> {
        let key = Self::key(user_id);
        let mut conn = self.conn.clone();

        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Ok(());
        }

        conn.hset::<_, _, _, ()>(&key, "check_interval_secs", params.check_interval_secs)
            .await?;
        conn.hset::<_, _, _, ()>(&key, "threshold_pct", params.threshold_pct)
            .await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<HashMap<i64, SubscriberRecord>, StorageError> {
        let mut conn = self.conn.clone();
        let ids: Vec<i64> = conn.smembers(SUBSCRIBER_SET).await?;

        let mut records = HashMap::with_capacity(ids.len());
        for user_id in ids {
            if let Some(record) = self.get(user_id).await? {
                records.insert(user_id, record);
            }
        }
        Ok(records)
    }
}
