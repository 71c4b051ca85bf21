//! In-memory storage backends for tests and `--memory-store` runs.
//!
//! Same contracts as the Redis adapters, minus durability. TTL expiry
//! uses the tokio clock, so tests can drive it with a paused runtime.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::shared::errors::StorageError;
use crate::shared::types::{MonitorParams, SubscriberRecord, Ticker};

use super::{SnapshotCache, SubscriberStore};

#[derive(Default)]
pub struct MemorySnapshotCache {
    entries: RwLock<HashMap<String, (Vec<Ticker>, Instant)>>,
}

impl MemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotCache for MemorySnapshotCache {
    async fn get(&self, exchange_name: &str) -> Result<Option<Vec<Ticker>>, StorageError> {
        let now = Instant::now();

        {
            let entries = self.entries.read().await;
            match entries.get(exchange_name) {
                Some((data, expires_at)) if now < *expires_at => {
                    return Ok(Some(data.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired entry, drop it
        self.entries.write().await.remove(exchange_name);
        Ok(None)
    }

    async fn set(
        &self,
        exchange_name: &str,
        data: &[Ticker],
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(exchange_name.to_string(), (data.to_vec(), expires_at));
        Ok(())
    }
}

pub struct MemorySubscriberStore {
    records: RwLock<HashMap<i64, SubscriberRecord>>,
    default_params: MonitorParams,
}

impl MemorySubscriberStore {
    pub fn new(default_params: MonitorParams) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            default_params,
        }
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn upsert(
        &self,
        user_id: i64,
        chat_id: i64,
        username: &str,
    ) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        records
            .entry(user_id)
            .and_modify(|record| {
                record.chat_id = chat_id;
                record.username = username.to_string();
            })
            .or_insert_with(|| SubscriberRecord {
                user_id,
                chat_id,
                username: username.to_string(),
                is_monitoring_active: false,
                params: self.default_params,
            });
        Ok(())
    }

    async fn get(&self, user_id: i64) -> Result<Option<SubscriberRecord>, StorageError> {
        Ok(self.records.read().await.get(&user_id).cloned())
    }

    async fn set_enabled(&self, user_id: i64, enabled: bool) -> Result<(), StorageError> {
        if let Some(record) = self.records.write().await.get_mut(&user_id) {
            record.is_monitoring_active = enabled;
        }
        Ok(())
    }

    async fn set_params(&self, user_id: i64, params: MonitorParams) -> Result<(), StorageError> {
        if let Some(record) = self.records.write().await.get_mut(&user_id) {
            record.params = params;
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<HashMap<i64, SubscriberRecord>, StorageError> {
        Ok(self.records.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Vec<Ticker> {
        vec![Ticker {
            symbol: "BTCUSDT".to_string(),
            last_price: 105.0,
            reference_price: Some(100.0),
        }]
    }

    #[tokio::test(start_paused = true)]
    async fn cache_returns_data_before_ttl_and_nothing_after() {
        let cache = MemorySnapshotCache::new();
        let data = snapshot();
        cache
            .set("Bybit", &data, Duration::from_secs(300))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("Bybit").await.unwrap(), Some(data));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("Bybit").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cache_miss_for_unknown_key() {
        let cache = MemorySnapshotCache::new();
        assert_eq!(cache.get("KuCoin").await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_seeds_flag_and_params_only_when_absent() {
        let store = MemorySubscriberStore::new(MonitorParams::default());
        store.upsert(1, 100, "alice").await.unwrap();
        store.set_enabled(1, true).await.unwrap();
        store
            .set_params(
                1,
                MonitorParams {
                    check_interval_secs: 30,
                    threshold_pct: 2.5,
                },
            )
            .await
            .unwrap();

        // Re-initialization updates identity fields only
        store.upsert(1, 200, "alice_renamed").await.unwrap();

        let record = store.get(1).await.unwrap().unwrap();
        assert_eq!(record.chat_id, 200);
        assert_eq!(record.username, "alice_renamed");
        assert!(record.is_monitoring_active);
        assert_eq!(record.params.check_interval_secs, 30);
        assert_eq!(record.params.threshold_pct, 2.5);
    }

    #[tokio::test]
    async fn set_enabled_does_not_clobber_other_fields() {
        let store = MemorySubscriberStore::new(MonitorParams::default());
        store.upsert(7, 700, "bob").await.unwrap();
        store.set_enabled(7, true).await.unwrap();

        let record = store.get(7).await.unwrap().unwrap();
        assert_eq!(record.chat_id, 700);
        assert_eq!(record.username, "bob");
        assert!(record.is_monitoring_active);
    }

    #[tokio::test]
    async fn updates_for_unknown_ids_are_noops() {
        let store = MemorySubscriberStore::new(MonitorParams::default());
        store.set_enabled(99, true).await.unwrap();
        store
            .set_params(
                99,
                MonitorParams {
                    check_interval_secs: 1,
                    threshold_pct: 0.0,
                },
            )
            .await
            .unwrap();

        assert_eq!(store.get(99).await.unwrap(), None);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_all_returns_every_record() {
        let store = MemorySubscriberStore::new(MonitorParams::default());
        store.upsert(1, 100, "alice").await.unwrap();
        store.upsert(2, 200, "bob").await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key(&1));
        assert!(all.contains_key(&2));
    }
}
