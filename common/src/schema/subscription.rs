use serde::Serialize;

/// Someone to notify when a tipster publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Subscriber {
    pub user_id: i64,
    pub telegram_id: i64,
}

/// A tipster row in a subscriber's list, flagged when already followed.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TipsterEntry {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub subscribed: bool,
}

impl TipsterEntry {
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(name) => name.clone(),
            None => format!("tipster{}", self.id),
        }
    }
}
