//! Telegram command surface: long-poll loop, command parsing, dispatch.
//!
//! The bot holds an injected `Arc<MonitorController>` — no ambient
//! global monitor handle. Every command maps 1:1 to a controller
//! operation; replies go straight back over the Bot API.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::application::monitor::MonitorController;
use crate::infrastructure::telegram::{Message, TelegramApi};
use crate::shared::errors::AppError;

const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

const WELCOME_TEXT: &str = "Привет! Я бот, который следит за резкими изменениями цен \
криптовалют. Используй /help, чтобы узнать доступные команды.";

const HELP_TEXT: &str = "<b>Список команд:</b>\n\n\
/start - Начать работу с ботом\n\
/help - Вывести список команд\n\
/status - Показать текущий статус мониторинга\n\
/coin <b>{coin_name}</b> - Получить информацию о криптовалюте\n\
Например, /coin BTC покажет последние данные о биткоине.\n\
/conf <b>{interval}</b> <b>{threshold}</b> - Установить новые параметры мониторинга:\n\
    - <b>{interval}</b> - Интервал проверки цен в секундах\n\
    - <b>{threshold}</b> - Порог изменения цены в процентах\n\
/start_monitor - Запустить мониторинг криптовалют\n\
/stop_monitor - Остановить мониторинг криптовалют\n";

const CONF_USAGE_TEXT: &str =
    "Ошибка: укажите интервал и порог изменения корректно.\nПример: /conf 60 5";

const STORAGE_DOWN_TEXT: &str = "⚠️ Хранилище временно недоступно, попробуйте позже.";

/// Parsed chat command
#[derive(Debug, Clone, PartialEq)]
pub enum BotCommand {
    Start,
    Help,
    Status,
    Coin(String),
    CoinUsage,
    Conf { interval_secs: u64, threshold_pct: f64 },
    ConfUsage,
    StartMonitor,
    StopMonitor,
    Unknown(String),
}

impl BotCommand {
    /// Parse a message text into a command. Non-command text yields
    /// `None`; a `@botname` suffix on the command is tolerated.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let mut parts = text.split_whitespace();
        let command = parts.next()?;
        let command = command.split('@').next().unwrap_or(command);

        let parsed = match command {
            "/start" => BotCommand::Start,
            "/help" => BotCommand::Help,
            "/status" => BotCommand::Status,
            "/coin" => match parts.next() {
                Some(symbol) => BotCommand::Coin(symbol.to_string()),
                None => BotCommand::CoinUsage,
            },
            "/conf" => {
                let interval = parts.next().and_then(|v| v.parse::<u64>().ok());
                let threshold = parts.next().and_then(|v| v.parse::<f64>().ok());
                match (interval, threshold) {
                    (Some(interval_secs), Some(threshold_pct)) => BotCommand::Conf {
                        interval_secs,
                        threshold_pct,
                    },
                    _ => BotCommand::ConfUsage,
                }
            }
            "/start_monitor" => BotCommand::StartMonitor,
            "/stop_monitor" => BotCommand::StopMonitor,
            other => BotCommand::Unknown(other.to_string()),
        };
        Some(parsed)
    }
}

pub struct Bot {
    api: Arc<TelegramApi>,
    controller: Arc<MonitorController>,
}

impl Bot {
    pub fn new(api: Arc<TelegramApi>, controller: Arc<MonitorController>) -> Self {
        Self { api, controller }
    }

    /// Long-poll `getUpdates` until cancelled. Transport failures are
    /// logged and retried after a short delay.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut offset = 0i64;

        loop {
            let updates = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.api.get_updates(offset, POLL_TIMEOUT_SECS) => result,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(e) => {
                    error!("Ошибка получения обновлений: {}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => continue,
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Some(message) = update.message {
                    self.handle_message(message).await;
                }
            }
        }

        info!("Цикл обработки команд остановлен");
    }

    async fn handle_message(&self, message: Message) {
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let Some(command) = BotCommand::parse(text) else {
            return;
        };

        let chat_id = message.chat.id;
        let user = message.from.as_ref();
        let user_id = user.map(|u| u.id).unwrap_or(chat_id);
        let username = user
            .and_then(|u| u.username.clone().or_else(|| u.first_name.clone()))
            .unwrap_or_default();

        info!(
            "Команда {:?} от пользователя {} (чат {})",
            command, user_id, chat_id
        );

        let reply = self
            .dispatch(command, user_id, chat_id, &username)
            .await
            .unwrap_or_else(|e| match e {
                AppError::Storage(err) => {
                    error!("Ошибка хранилища при обработке команды: {}", err);
                    STORAGE_DOWN_TEXT.to_string()
                }
                AppError::Validation(err) => err.to_string(),
                other => {
                    error!("Ошибка при обработке команды: {}", other);
                    "Произошла ошибка, попробуйте позже.".to_string()
                }
            });

        if let Err(e) = self.api.send_message(chat_id, &reply).await {
            warn!("Не удалось ответить в чат {}: {}", chat_id, e);
        }
    }

    async fn dispatch(
        &self,
        command: BotCommand,
        user_id: i64,
        chat_id: i64,
        username: &str,
    ) -> Result<String, AppError> {
        match command {
            BotCommand::Start => {
                self.controller
                    .initialize_subscriber(user_id, chat_id, username)
                    .await?;
                Ok(WELCOME_TEXT.to_string())
            }
            BotCommand::Help => Ok(HELP_TEXT.to_string()),
            BotCommand::Status => self.controller.status_text(user_id).await,
            BotCommand::Coin(symbol) => Ok(self.controller.coin_info(&symbol).await),
            BotCommand::CoinUsage => {
                Ok("Укажите символ монеты. Пример: /coin BTC".to_string())
            }
            BotCommand::Conf {
                interval_secs,
                threshold_pct,
            } => {
                self.controller
                    .update_config(user_id, interval_secs, threshold_pct)
                    .await?;
                Ok(format!(
                    "Настройки обновлены: интервал = {} сек, порог изменения = {}%.",
                    interval_secs, threshold_pct
                ))
            }
            BotCommand::ConfUsage => Ok(CONF_USAGE_TEXT.to_string()),
            BotCommand::StartMonitor => {
                // Keep the chat destination fresh before spawning
                self.controller
                    .initialize_subscriber(user_id, chat_id, username)
                    .await?;
                let status = self.controller.start_monitoring(user_id).await?;
                Ok(status.to_string())
            }
            BotCommand::StopMonitor => {
                let status = self.controller.stop_monitoring(user_id).await?;
                Ok(status.to_string())
            }
            BotCommand::Unknown(command) => Ok(format!(
                "Неизвестная команда {}. Используйте /help для списка команд.",
                command
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_commands() {
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/help"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("/status"), Some(BotCommand::Status));
        assert_eq!(
            BotCommand::parse("/start_monitor"),
            Some(BotCommand::StartMonitor)
        );
        assert_eq!(
            BotCommand::parse("/stop_monitor"),
            Some(BotCommand::StopMonitor)
        );
    }

    #[test]
    fn parses_commands_with_bot_name_suffix() {
        assert_eq!(
            BotCommand::parse("/status@pricepulse_bot"),
            Some(BotCommand::Status)
        );
    }

    #[test]
    fn parses_coin_with_an_argument() {
        assert_eq!(
            BotCommand::parse("/coin BTC"),
            Some(BotCommand::Coin("BTC".to_string()))
        );
        assert_eq!(BotCommand::parse("/coin"), Some(BotCommand::CoinUsage));
    }

    #[test]
    fn parses_conf_arguments() {
        assert_eq!(
            BotCommand::parse("/conf 60 5"),
            Some(BotCommand::Conf {
                interval_secs: 60,
                threshold_pct: 5.0
            })
        );
        assert_eq!(BotCommand::parse("/conf 60"), Some(BotCommand::ConfUsage));
        assert_eq!(
            BotCommand::parse("/conf abc 5"),
            Some(BotCommand::ConfUsage)
        );
    }

    #[test]
    fn non_commands_are_ignored() {
        assert_eq!(BotCommand::parse("hello there"), None);
        assert_eq!(BotCommand::parse(""), None);
    }

    #[test]
    fn unknown_commands_are_flagged() {
        assert_eq!(
            BotCommand::parse("/frobnicate"),
            Some(BotCommand::Unknown("/frobnicate".to_string()))
        );
    }
}
