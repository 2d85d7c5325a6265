use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, sqlite::SqliteRow};

use crate::money::from_cents;
use crate::schema::TipResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum BetStatus {
    Confirmed,
    Win,
    Lose,
}

impl From<TipResult> for BetStatus {
    fn from(result: TipResult) -> Self {
        match result {
            TipResult::Win => BetStatus::Win,
            TipResult::Lose => BetStatus::Lose,
        }
    }
}

/// A subscriber's stake on a tip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: i64,
    pub user_id: i64,
    pub tip_id: i64,
    pub stake: Decimal,
    pub potential_win: Decimal,
    pub status: BetStatus,
    pub created_at: Option<NaiveDateTime>,
    pub settled_at: Option<NaiveDateTime>,
}

impl<'r> FromRow<'r, SqliteRow> for Bet {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Bet {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            tip_id: row.try_get("tip_id")?,
            stake: from_cents(row.try_get("stake_cents")?),
            potential_win: from_cents(row.try_get("potential_win_cents")?),
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            settled_at: row.try_get("settled_at")?,
        })
    }
}
