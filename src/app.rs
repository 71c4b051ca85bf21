//! Wiring and process lifecycle: build collaborators, restore persisted
//! sessions, run the bot loop until Ctrl-C, shut down gracefully.

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::bot::Bot;
use crate::application::monitor::MonitorController;
use crate::exchanges::{BybitExchange, Exchange, KucoinExchange};
use crate::infrastructure::storage::{
    MemorySnapshotCache, MemorySubscriberStore, RedisSnapshotCache, RedisSubscriberStore,
    SnapshotCache, SubscriberStore,
};
use crate::infrastructure::telegram::{TelegramApi, TelegramSink};
use crate::shared::config::Config;

pub async fn run(config: Config, use_memory_store: bool) -> Result<()> {
    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let api = Arc::new(TelegramApi::new(
        http_client.clone(),
        &config.telegram_bot_token,
    ));

    // Fail fast on a bad token
    let me = api.get_me().await.context("Telegram getMe probe failed")?;
    info!(
        "🤖 Бот @{} запущен",
        me.username.as_deref().unwrap_or("<без имени>")
    );

    let exchanges: Vec<Arc<dyn Exchange>> = vec![
        Arc::new(BybitExchange::new(http_client.clone())),
        Arc::new(KucoinExchange::new(http_client)),
    ];

    let (cache, store): (Arc<dyn SnapshotCache>, Arc<dyn SubscriberStore>) = if use_memory_store {
        info!("Используется волатильное хранилище в памяти (--memory-store)");
        (
            Arc::new(MemorySnapshotCache::new()),
            Arc::new(MemorySubscriberStore::new(config.default_params())),
        )
    } else {
        let client = redis::Client::open(config.redis_url.as_str())
            .context("invalid Redis URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to Redis")?;
        info!("Подключение к Redis установлено: {}", config.redis_url);
        (
            Arc::new(RedisSnapshotCache::new(conn.clone())),
            Arc::new(RedisSubscriberStore::new(conn, config.default_params())),
        )
    };

    let sink = Arc::new(TelegramSink::new(Arc::clone(&api)));
    let controller = Arc::new(MonitorController::new(
        exchanges,
        cache,
        store,
        sink,
        config.cache_ttl(),
    ));

    controller.restore_active_sessions().await?;

    let bot = Bot::new(api, Arc::clone(&controller));
    let cancel = CancellationToken::new();

    tokio::select! {
        _ = bot.run(cancel.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Получен сигнал остановки");
            cancel.cancel();
        }
    }

    controller.shutdown().await;
    info!("Bot stopped.");
    Ok(())
}
