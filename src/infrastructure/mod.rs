//! Infrastructure - storage backends and the Telegram transport

pub mod storage;
pub mod telegram;
