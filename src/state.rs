use std::sync::Arc;

use anyhow::Result;
use common::{CreditDesk, Database};

use crate::bot::{ChatClient, SessionViews};

pub struct AppState {
    pub db: Database,
    pub credits: CreditDesk,
    pub views: SessionViews,
    pub chat: Arc<dyn ChatClient>,
    pub admin_id: i64,
    pub bot_token: String,
}

impl AppState {
    pub async fn new(
        database_url: &str,
        chat: Arc<dyn ChatClient>,
        admin_id: i64,
        bot_token: &str,
    ) -> Result<Self> {
        let db = Database::new(database_url).await?;
        log::info!("Database initialized successfully!");
        Ok(Self::with_database(db, chat, admin_id, bot_token))
    }

    pub fn with_database(
        db: Database,
        chat: Arc<dyn ChatClient>,
        admin_id: i64,
        bot_token: &str,
    ) -> Self {
        AppState {
            db,
            credits: CreditDesk::new(),
            views: SessionViews::new(),
            chat,
            admin_id,
            bot_token: bot_token.to_string(),
        }
    }

    pub fn is_admin(&self, telegram_id: i64) -> bool {
        telegram_id == self.admin_id
    }
}
