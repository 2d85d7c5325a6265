use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, sqlite::SqliteRow};

use crate::money::from_cents;

pub const DEFAULT_CURRENCY: &str = "FAKE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: i64,
    pub balance: Decimal,
    pub currency: String,
    pub updated_at: Option<NaiveDateTime>,
}

impl<'r> FromRow<'r, SqliteRow> for Wallet {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Wallet {
            user_id: row.try_get("user_id")?,
            balance: from_cents(row.try_get("balance_cents")?),
            currency: row.try_get("currency")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Stored balance next to the sum of the user's transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub user_id: i64,
    pub balance: Decimal,
    pub ledger_total: Decimal,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.balance == self.ledger_total
    }
}
