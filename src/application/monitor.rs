//! Monitoring controller - per-subscriber polling task lifecycle.
//!
//! The controller owns a session table mapping subscriber ids to live
//! polling tasks. Start/stop/configure are serialized by the table's
//! mutex; the polling tasks themselves never take it, so awaiting a
//! join while holding the lock cannot deadlock. Cancellation is
//! cooperative: a token checked at loop-top and raced against the
//! inter-cycle sleep, with `stop_monitoring` awaiting full termination.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exchanges::Exchange;
use crate::infrastructure::storage::{SnapshotCache, SubscriberStore};
use crate::infrastructure::telegram::NotificationSink;
use crate::shared::errors::{AppError, ValidationError};
use crate::shared::types::{MonitorParams, SignificantChange, Ticker};

/// Outcome of a start/stop request, rendered for the chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Started,
    AlreadyRunning,
    Stopped,
    AlreadyStopped,
    NotInitialized,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MonitorStatus::Started => "✅ Мониторинг криптовалют успешно запущен!",
            MonitorStatus::AlreadyRunning => {
                "⚠️ Мониторинг уже запущен. Нет необходимости запускать его повторно."
            }
            MonitorStatus::Stopped => "🛑 Мониторинг криптовалют успешно остановлен!",
            MonitorStatus::AlreadyStopped => {
                "⚠️ Мониторинг уже остановлен. Нет необходимости останавливать его повторно."
            }
            MonitorStatus::NotInitialized => "Ошибка: сначала отправьте команду /start.",
        };
        f.write_str(text)
    }
}

/// Live polling task bound to one subscriber
struct MonitorSession {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    params: Arc<RwLock<MonitorParams>>,
    started_at: DateTime<Utc>,
}

pub struct MonitorController {
    exchanges: Vec<Arc<dyn Exchange>>,
    cache: Arc<dyn SnapshotCache>,
    store: Arc<dyn SubscriberStore>,
    sink: Arc<dyn NotificationSink>,
    cache_ttl: Duration,
    sessions: Mutex<HashMap<i64, MonitorSession>>,
}

impl MonitorController {
    pub fn new(
        exchanges: Vec<Arc<dyn Exchange>>,
        cache: Arc<dyn SnapshotCache>,
        store: Arc<dyn SubscriberStore>,
        sink: Arc<dyn NotificationSink>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            exchanges,
            cache,
            store,
            sink,
            cache_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Upsert the subscriber record. Identity fields are overwritten,
    /// the monitoring flag and parameters are seeded only when absent.
    pub async fn initialize_subscriber(
        &self,
        user_id: i64,
        chat_id: i64,
        username: &str,
    ) -> Result<(), AppError> {
        self.store.upsert(user_id, chat_id, username).await?;
        info!(
            "Пользователь инициализирован: user_id={}, chat_id={}, username={}",
            user_id, chat_id, username
        );
        Ok(())
    }

    /// Idempotent start: a live, unfinished task short-circuits to
    /// `AlreadyRunning` without spawning a duplicate.
    pub async fn start_monitoring(&self, user_id: i64) -> Result<MonitorStatus, AppError> {
        let mut sessions = self.sessions.lock().await;

        if let Some(session) = sessions.get(&user_id) {
            if !session.handle.is_finished() {
                info!(
                    "Попытка повторного запуска мониторинга для пользователя {}",
                    user_id
                );
                // Re-assert the persisted intent, cheap reconciliation
                self.store.set_enabled(user_id, true).await?;
                return Ok(MonitorStatus::AlreadyRunning);
            }
        }

        let Some(record) = self.store.get(user_id).await? else {
            warn!(
                "Запуск мониторинга без инициализации: user_id={}",
                user_id
            );
            return Ok(MonitorStatus::NotInitialized);
        };

        // Intent is persisted before the task is spawned
        self.store.set_enabled(user_id, true).await?;

        let params = Arc::new(RwLock::new(record.params));
        let cancel = CancellationToken::new();
        let ctx = LoopCtx {
            user_id,
            chat_id: record.chat_id,
            exchanges: self.exchanges.clone(),
            cache: Arc::clone(&self.cache),
            sink: Arc::clone(&self.sink),
            params: Arc::clone(&params),
            cache_ttl: self.cache_ttl,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(run_monitor_loop(ctx));

        sessions.insert(
            user_id,
            MonitorSession {
                cancel,
                handle,
                params,
                started_at: Utc::now(),
            },
        );
        info!("Запуск мониторинга для пользователя {}", user_id);
        Ok(MonitorStatus::Started)
    }

    /// Idempotent stop: cancels the task and awaits its termination, so
    /// the caller observes the stop as synchronous.
    pub async fn stop_monitoring(&self, user_id: i64) -> Result<MonitorStatus, AppError> {
        let mut sessions = self.sessions.lock().await;

        match sessions.remove(&user_id) {
            Some(session) if !session.handle.is_finished() => {
                session.cancel.cancel();
                if let Err(e) = session.handle.await {
                    warn!(
                        "Задача мониторинга пользователя {} завершилась с ошибкой: {}",
                        user_id, e
                    );
                }
                self.store.set_enabled(user_id, false).await?;
                info!("Мониторинг остановлен для пользователя {}", user_id);
                Ok(MonitorStatus::Stopped)
            }
            _ => {
                info!(
                    "Попытка повторной остановки мониторинга для пользователя {}",
                    user_id
                );
                self.store.set_enabled(user_id, false).await?;
                Ok(MonitorStatus::AlreadyStopped)
            }
        }
    }

    /// Validate and apply new monitoring parameters. A running loop
    /// picks them up from the next cycle; a sleep in progress is not
    /// interrupted.
    pub async fn update_config(
        &self,
        user_id: i64,
        interval_secs: u64,
        threshold_pct: f64,
    ) -> Result<(), AppError> {
        if interval_secs == 0 {
            return Err(ValidationError::InvalidInterval.into());
        }
        if !(threshold_pct >= 0.0) {
            return Err(ValidationError::InvalidThreshold(threshold_pct).into());
        }

        let params = MonitorParams {
            check_interval_secs: interval_secs,
            threshold_pct,
        };

        {
            let sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get(&user_id) {
                *session.params.write().await = params;
            }
        }
        self.store.set_params(user_id, params).await?;

        info!(
            "Обновлены параметры мониторинга для {}: интервал = {} сек, порог = {}%",
            user_id, interval_secs, threshold_pct
        );
        Ok(())
    }

    /// Render the monitoring status for the subscriber's chat. The
    /// in-memory session table is authoritative for the active flag.
    pub async fn status_text(&self, user_id: i64) -> Result<String, AppError> {
        let record = self.store.get(user_id).await?;
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(&user_id)
            .filter(|s| !s.handle.is_finished());

        let active = session.is_some();
        let params = match session {
            Some(s) => *s.params.read().await,
            None => record.map(|r| r.params).unwrap_or_default(),
        };

        let mut text = format!(
            "📊 <b>Статус мониторинга</b>\n\
             Активен: {}\n\
             Интервал проверки: {} сек\n\
             Порог изменения цены: {}%",
            if active { "Да" } else { "Нет" },
            params.check_interval_secs,
            params.threshold_pct
        );
        if let Some(s) = session {
            let uptime = Utc::now().signed_duration_since(s.started_at);
            text.push_str(&format!("\nВремя работы: {} мин", uptime.num_minutes()));
        }
        Ok(text)
    }

    /// Look up a coin across all configured exchanges (through the
    /// cache), case-insensitive prefix match, first hit wins.
    pub async fn coin_info(&self, symbol: &str) -> String {
        let query = symbol.trim().to_uppercase();

        let snapshots =
            futures::future::join_all(self.exchanges.iter().map(|exchange| async move {
                let data =
                    load_snapshot(exchange.as_ref(), self.cache.as_ref(), self.cache_ttl).await;
                (exchange.name(), data)
            }))
            .await;

        for (exchange_name, snapshot) in snapshots {
            if let Some(ticker) = snapshot
                .iter()
                .find(|t| t.symbol.to_uppercase().starts_with(&query))
            {
                let change = match ticker.price_change() {
                    Some(c) => format!("{:.2}%", c),
                    None => "нет данных".to_string(),
                };
                return format!(
                    "💰 <b>{}</b> на бирже <b>{}</b>\n\
                     Текущая цена: {}\n\
                     Изменение за 24ч: {}",
                    ticker.symbol, exchange_name, ticker.last_price, change
                );
            }
        }

        format!("Монета <b>{}</b> не найдена на подключённых биржах.", query)
    }

    /// Reconcile persisted intent with live state at startup: spawn a
    /// task for every subscriber whose flag survived the restart. A
    /// failure for one subscriber never aborts the rest.
    pub async fn restore_active_sessions(&self) -> Result<(), AppError> {
        let all = self.store.list_all().await?;
        info!(
            "Восстановление сессий: {} подписчиков в хранилище",
            all.len()
        );

        let mut restored = 0usize;
        for (user_id, record) in all {
            if !record.is_monitoring_active {
                continue;
            }
            match self.start_monitoring(user_id).await {
                Ok(MonitorStatus::Started) => restored += 1,
                Ok(status) => warn!(
                    "Сессия пользователя {} не восстановлена: {:?}",
                    user_id, status
                ),
                Err(e) => error!(
                    "Ошибка при перезапуске мониторинга для пользователя {}: {}",
                    user_id, e
                ),
            }
        }
        info!("✅ Восстановлено активных сессий: {}", restored);
        Ok(())
    }

    /// Cancel and await every live session. The persisted flags stay
    /// set, so the next startup resumes them.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        info!("🛑 Остановка всех сессий мониторинга ({})", sessions.len());
        for (user_id, session) in sessions.drain() {
            session.cancel.cancel();
            if let Err(e) = session.handle.await {
                warn!(
                    "Задача мониторинга пользователя {} завершилась с ошибкой: {}",
                    user_id, e
                );
            }
        }
    }

    /// Number of live (unfinished) polling tasks
    pub async fn active_sessions(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| !s.handle.is_finished())
            .count()
    }
}

/// Everything one polling task needs, cloned out of the controller so
/// the task never touches the session table.
struct LoopCtx {
    user_id: i64,
    chat_id: i64,
    exchanges: Vec<Arc<dyn Exchange>>,
    cache: Arc<dyn SnapshotCache>,
    sink: Arc<dyn NotificationSink>,
    params: Arc<RwLock<MonitorParams>>,
    cache_ttl: Duration,
    cancel: CancellationToken,
}

/// The per-subscriber polling coroutine: read snapshots through the
/// cache, filter against the subscriber's own threshold, notify, sleep.
/// Exchange outages degrade to empty snapshots — a bad cycle never
/// terminates the loop.
async fn run_monitor_loop(ctx: LoopCtx) {
    if ctx.chat_id == 0 {
        warn!("Не найден chat_id для пользователя {}", ctx.user_id);
        return;
    }

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        let threshold = ctx.params.read().await.threshold_pct;
        for exchange in &ctx.exchanges {
            debug!("Получение данных с биржи {}...", exchange.name());
            let snapshot =
                load_snapshot(exchange.as_ref(), ctx.cache.as_ref(), ctx.cache_ttl).await;
            let changes = exchange.filter_significant_changes(&snapshot, threshold);

            if changes.is_empty() {
                ctx.sink
                    .deliver(ctx.chat_id, &render_no_changes(exchange.name()))
                    .await;
            } else {
                for change in &changes {
                    ctx.sink
                        .deliver(ctx.chat_id, &render_change(exchange.name(), change))
                        .await;
                }
            }
        }

        // The interval is re-read each cycle so /conf takes effect from
        // the next cycle onward
        let interval = Duration::from_secs(ctx.params.read().await.check_interval_secs);
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!("Цикл мониторинга для пользователя {} завершён", ctx.user_id);
}

/// Read-through cache access. A miss fetches fresh data and populates
/// the cache; a cache outage degrades to a direct fetch so Redis being
/// down cannot stall monitoring.
async fn load_snapshot(
    exchange: &dyn Exchange,
    cache: &dyn SnapshotCache,
    ttl: Duration,
) -> Vec<Ticker> {
    match cache.get(exchange.name()).await {
        Ok(Some(data)) => {
            debug!("Снимок '{}' взят из кэша", exchange.name());
            return data;
        }
        Ok(None) => {}
        Err(e) => {
            warn!(
                "Кэш недоступен для '{}', прямой запрос: {}",
                exchange.name(),
                e
            );
            return exchange.fetch_market_data().await;
        }
    }

    let data = exchange.fetch_market_data().await;
    if let Err(e) = cache.set(exchange.name(), &data, ttl).await {
        warn!(
            "Не удалось сохранить снимок '{}' в кэш: {}",
            exchange.name(),
            e
        );
    }
    data
}

fn render_change(exchange_name: &str, change: &SignificantChange) -> String {
    format!(
        "🚨 На бирже <b>{}</b> монета <b>{}</b> изменилась на {:.2}%! Текущая цена: {:.2}",
        exchange_name, change.symbol, change.price_change, change.last_price
    )
}

fn render_no_changes(exchange_name: &str) -> String {
    format!(
        "На бирже <b>{}</b> существенных изменений в ценах криптовалют не обнаружено.",
        exchange_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use crate::infrastructure::storage::{MemorySnapshotCache, MemorySubscriberStore};
    use crate::shared::errors::StorageError;
    use crate::shared::types::SubscriberRecord;

    struct StubExchange {
        exchange_name: &'static str,
        tickers: Vec<Ticker>,
        fetch_calls: AtomicUsize,
    }

    impl StubExchange {
        fn new(exchange_name: &'static str, tickers: Vec<Ticker>) -> Self {
            Self {
                exchange_name,
                tickers,
                fetch_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Exchange for StubExchange {
        fn name(&self) -> &'static str {
            self.exchange_name
        }

        async fn fetch_market_data(&self) -> Vec<Ticker> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.tickers.clone()
        }
    }

    struct RecordingSink {
        messages: StdMutex<Vec<(i64, String)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                messages: StdMutex::new(Vec::new()),
            }
        }

        fn messages(&self) -> Vec<(i64, String)> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, chat_id: i64, text: &str) {
            self.messages
                .lock()
                .unwrap()
                .push((chat_id, text.to_string()));
        }
    }

    /// Cache whose every operation fails, as when Redis is down
    struct FailingCache;

    #[async_trait]
    impl SnapshotCache for FailingCache {
        async fn get(&self, _exchange_name: &str) -> Result<Option<Vec<Ticker>>, StorageError> {
            Err(StorageError::Unavailable("connection refused".to_string()))
        }

        async fn set(
            &self,
            _exchange_name: &str,
            _data: &[Ticker],
            _ttl: Duration,
        ) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("connection refused".to_string()))
        }
    }

    /// Store whose `get` fails for one subscriber, everything else
    /// delegates to the in-memory store.
    struct FailingStore {
        inner: MemorySubscriberStore,
        fail_get_for: i64,
    }

    #[async_trait]
    impl SubscriberStore for FailingStore {
        async fn upsert(
            &self,
            user_id: i64,
            chat_id: i64,
            username: &str,
        ) -> Result<(), StorageError> {
            self.inner.upsert(user_id, chat_id, username).await
        }

        async fn get(&self, user_id: i64) -> Result<Option<SubscriberRecord>, StorageError> {
            if user_id == self.fail_get_for {
                return Err(StorageError::Unavailable("connection refused".to_string()));
            }
            self.inner.get(user_id).await
        }

        async fn set_enabled(&self, user_id: i64, enabled: bool) -> Result<(), StorageError> {
            self.inner.set_enabled(user_id, enabled).await
        }

        async fn set_params(
            &self,
            user_id: i64,
            params: MonitorParams,
        ) -> Result<(), StorageError> {
            self.inner.set_params(user_id, params).await
        }

        async fn list_all(&self) -> Result<HashMap<i64, SubscriberRecord>, StorageError> {
            self.inner.list_all().await
        }
    }

    fn moving_ticker() -> Ticker {
        Ticker {
            symbol: "BTCUSDT".to_string(),
            last_price: 110.0,
            reference_price: Some(100.0),
        }
    }

    fn quiet_ticker() -> Ticker {
        Ticker {
            symbol: "BTCUSDT".to_string(),
            last_price: 100.5,
            reference_price: Some(100.0),
        }
    }

    struct Harness {
        controller: MonitorController,
        exchange: Arc<StubExchange>,
        sink: Arc<RecordingSink>,
        store: Arc<MemorySubscriberStore>,
    }

    fn harness(tickers: Vec<Ticker>) -> Harness {
        let exchange = Arc::new(StubExchange::new("StubEx", tickers));
        let sink = Arc::new(RecordingSink::new());
        let store = Arc::new(MemorySubscriberStore::new(MonitorParams::default()));
        let controller = MonitorController::new(
            vec![exchange.clone()],
            Arc::new(MemorySnapshotCache::new()),
            store.clone(),
            sink.clone(),
            Duration::from_secs(300),
        );
        Harness {
            controller,
            exchange,
            sink,
            store,
        }
    }

    #[tokio::test]
    async fn start_twice_keeps_exactly_one_task() {
        let h = harness(vec![moving_ticker()]);
        h.controller
            .initialize_subscriber(1, 100, "alice")
            .await
            .unwrap();

        let first = h.controller.start_monitoring(1).await.unwrap();
        let second = h.controller.start_monitoring(1).await.unwrap();

        assert_eq!(first, MonitorStatus::Started);
        assert_eq!(second, MonitorStatus::AlreadyRunning);
        assert_eq!(h.controller.active_sessions().await, 1);
        assert!(h.store.get(1).await.unwrap().unwrap().is_monitoring_active);

        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn stop_without_a_running_task_is_already_stopped() {
        let h = harness(vec![]);
        h.controller
            .initialize_subscriber(1, 100, "alice")
            .await
            .unwrap();

        let status = h.controller.stop_monitoring(1).await.unwrap();
        assert_eq!(status, MonitorStatus::AlreadyStopped);
        assert!(!h.store.get(1).await.unwrap().unwrap().is_monitoring_active);
    }

    #[tokio::test]
    async fn stop_awaits_task_termination_and_clears_the_flag() {
        let h = harness(vec![moving_ticker()]);
        h.controller
            .initialize_subscriber(1, 100, "alice")
            .await
            .unwrap();
        h.controller.start_monitoring(1).await.unwrap();

        // Let the first cycle deliver, then stop during the sleep
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = h.controller.stop_monitoring(1).await.unwrap();

        assert_eq!(status, MonitorStatus::Stopped);
        assert_eq!(h.controller.active_sessions().await, 0);
        assert!(!h.store.get(1).await.unwrap().unwrap().is_monitoring_active);

        // No new cycle after cancellation
        let delivered = h.sink.messages().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.sink.messages().len(), delivered);
    }

    #[tokio::test]
    async fn start_without_initialization_is_rejected() {
        let h = harness(vec![]);
        let status = h.controller.start_monitoring(42).await.unwrap();
        assert_eq!(status, MonitorStatus::NotInitialized);
        assert_eq!(h.controller.active_sessions().await, 0);
    }

    #[tokio::test]
    async fn first_cycle_notifies_about_significant_changes() {
        let h = harness(vec![moving_ticker()]);
        h.controller
            .initialize_subscriber(1, 100, "alice")
            .await
            .unwrap();
        h.controller.start_monitoring(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let messages = h.sink.messages();
        assert!(!messages.is_empty());
        assert_eq!(messages[0].0, 100);
        assert!(messages[0].1.contains("🚨"));
        assert!(messages[0].1.contains("BTCUSDT"));

        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn quiet_cycle_sends_a_single_no_changes_notice() {
        let h = harness(vec![quiet_ticker()]);
        h.controller
            .initialize_subscriber(1, 100, "alice")
            .await
            .unwrap();
        h.controller.start_monitoring(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let messages = h.sink.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("существенных изменений"));

        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn cache_is_shared_across_subscribers() {
        let h = harness(vec![moving_ticker()]);
        h.controller
            .initialize_subscriber(1, 100, "alice")
            .await
            .unwrap();
        h.controller
            .initialize_subscriber(2, 200, "bob")
            .await
            .unwrap();

        h.controller.start_monitoring(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.controller.start_monitoring(2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Second subscriber's cycle hits the cached snapshot
        assert_eq!(h.exchange.fetch_calls.load(Ordering::SeqCst), 1);

        let chats: Vec<i64> = h.sink.messages().iter().map(|(chat, _)| *chat).collect();
        assert!(chats.contains(&100));
        assert!(chats.contains(&200));

        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn cache_outage_degrades_to_a_direct_fetch() {
        let exchange = Arc::new(StubExchange::new("StubEx", vec![moving_ticker()]));
        let sink = Arc::new(RecordingSink::new());
        let store = Arc::new(MemorySubscriberStore::new(MonitorParams::default()));
        let controller = MonitorController::new(
            vec![exchange.clone()],
            Arc::new(FailingCache),
            store,
            sink.clone(),
            Duration::from_secs(300),
        );

        controller
            .initialize_subscriber(1, 100, "alice")
            .await
            .unwrap();
        controller.start_monitoring(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The snapshot is fetched directly and the cycle still notifies
        assert!(exchange.fetch_calls.load(Ordering::SeqCst) >= 1);
        let messages = sink.messages();
        assert!(!messages.is_empty());
        assert!(messages[0].1.contains("🚨"));

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn restore_spawns_tasks_for_enabled_subscribers_only() {
        let h = harness(vec![quiet_ticker()]);
        h.store.upsert(1, 100, "alice").await.unwrap();
        h.store.set_enabled(1, true).await.unwrap();
        h.store.upsert(2, 200, "bob").await.unwrap();
        h.store.upsert(3, 300, "carol").await.unwrap();
        h.store.set_enabled(3, true).await.unwrap();

        h.controller.restore_active_sessions().await.unwrap();
        assert_eq!(h.controller.active_sessions().await, 2);

        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn restore_failure_for_one_subscriber_does_not_abort_the_rest() {
        let inner = MemorySubscriberStore::new(MonitorParams::default());
        inner.upsert(1, 100, "alice").await.unwrap();
        inner.set_enabled(1, true).await.unwrap();
        inner.upsert(2, 200, "bob").await.unwrap();
        inner.set_enabled(2, true).await.unwrap();

        let store = Arc::new(FailingStore {
            inner,
            fail_get_for: 1,
        });
        let controller = MonitorController::new(
            vec![Arc::new(StubExchange::new("StubEx", vec![quiet_ticker()]))],
            Arc::new(MemorySnapshotCache::new()),
            store,
            Arc::new(RecordingSink::new()),
            Duration::from_secs(300),
        );

        controller.restore_active_sessions().await.unwrap();
        assert_eq!(controller.active_sessions().await, 1);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn update_config_validates_its_input() {
        let h = harness(vec![]);
        h.controller
            .initialize_subscriber(1, 100, "alice")
            .await
            .unwrap();

        let err = h.controller.update_config(1, 0, 5.0).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::InvalidInterval)
        ));

        let err = h.controller.update_config(1, 60, -1.0).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::InvalidThreshold(_))
        ));

        // Failed validation must not mutate the persisted parameters
        let record = h.store.get(1).await.unwrap().unwrap();
        assert_eq!(record.params, MonitorParams::default());
    }

    #[tokio::test]
    async fn update_config_applies_to_a_live_session() {
        let h = harness(vec![quiet_ticker()]);
        h.controller
            .initialize_subscriber(1, 100, "alice")
            .await
            .unwrap();
        h.controller.start_monitoring(1).await.unwrap();

        h.controller.update_config(1, 30, 2.5).await.unwrap();

        let record = h.store.get(1).await.unwrap().unwrap();
        assert_eq!(record.params.check_interval_secs, 30);
        assert_eq!(record.params.threshold_pct, 2.5);

        let status = h.controller.status_text(1).await.unwrap();
        assert!(status.contains("Активен: Да"));
        assert!(status.contains("30 сек"));
        assert!(status.contains("2.5%"));

        h.controller.shutdown().await;
    }

    #[tokio::test]
    async fn status_without_a_session_reports_inactive() {
        let h = harness(vec![]);
        h.controller
            .initialize_subscriber(1, 100, "alice")
            .await
            .unwrap();

        let status = h.controller.status_text(1).await.unwrap();
        assert!(status.contains("Активен: Нет"));
        assert!(status.contains("60 сек"));
    }

    #[tokio::test]
    async fn coin_info_finds_a_symbol_case_insensitively() {
        let h = harness(vec![moving_ticker()]);
        let info = h.controller.coin_info("btc").await;
        assert!(info.contains("BTCUSDT"));
        assert!(info.contains("StubEx"));

        let missing = h.controller.coin_info("DOGE").await;
        assert!(missing.contains("не найдена"));
    }
}
