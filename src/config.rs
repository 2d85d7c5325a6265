use std::sync::Arc;

use anyhow::Context;

use crate::bot::TelegramClient;
use crate::state::AppState;

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

pub struct AppConfig {
    pub database_url: String,
    pub bot_token: String,
    pub admin_telegram_id: i64,
    pub bind_addr: String,
    pub port: u16,
    pub telegram_api_url: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let bot_token =
            std::env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;

        let admin_telegram_id = std::env::var("ADMIN_TELEGRAM_ID")
            .context("ADMIN_TELEGRAM_ID must be set")?
            .parse::<i64>()
            .context("ADMIN_TELEGRAM_ID must be a numeric telegram id")?;

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().context("PORT must be a valid port number")?,
            Err(_) => 3000,
        };

        let telegram_api_url = std::env::var("TELEGRAM_API_URL")
            .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_URL.to_string());

        Ok(Self {
            database_url,
            bot_token,
            admin_telegram_id,
            bind_addr,
            port,
            telegram_api_url,
        })
    }

    pub async fn create_app_state(&self) -> anyhow::Result<AppState> {
        let chat = Arc::new(TelegramClient::new(&self.telegram_api_url, &self.bot_token));
        AppState::new(
            &self.database_url,
            chat,
            self.admin_telegram_id,
            &self.bot_token,
        )
        .await
        .context("Failed to initialize AppState")
    }
}
