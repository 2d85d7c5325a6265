use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, sqlite::SqliteRow};

use crate::money::from_cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    AdminCredit,
    AdminDebit,
    BetEscrow,
    TipsterEscrow,
    BetWin,
    TipsterPayout,
    BetConsolation,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionKind::AdminCredit => "ADMIN_CREDIT",
            TransactionKind::AdminDebit => "ADMIN_DEBIT",
            TransactionKind::BetEscrow => "BET_ESCROW",
            TransactionKind::TipsterEscrow => "TIPSTER_ESCROW",
            TransactionKind::BetWin => "BET_WIN",
            TransactionKind::TipsterPayout => "TIPSTER_PAYOUT",
            TransactionKind::BetConsolation => "BET_CONSOLATION",
        };
        f.write_str(name)
    }
}

/// Immutable audit row, one per balance mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub reference: String,
    pub created_at: Option<NaiveDateTime>,
}

impl<'r> FromRow<'r, SqliteRow> for Transaction {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Transaction {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            amount: from_cents(row.try_get("amount_cents")?),
            kind: row.try_get("kind")?,
            reference: row.try_get("reference")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

pub fn tip_reference(tip_id: i64) -> String {
    format!("tip:{tip_id}")
}

pub const ADMIN_REFERENCE: &str = "admin";
