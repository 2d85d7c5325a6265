use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use fancy_regex::Regex;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, sqlite::SqliteRow};

use crate::ValidationError;
use crate::money::{from_cents, parse_decimal, round_cents};

pub const BOOKING_CODE_LEN: usize = 7;
pub const MAX_ODDS: u32 = 1_000;
pub const MAX_STAKE: u32 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum TipStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum TipResult {
    Win,
    Lose,
}

impl FromStr for TipResult {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WIN" => Ok(TipResult::Win),
            "LOSE" => Ok(TipResult::Lose),
            other => Err(ValidationError::UnknownResult(other.to_string())),
        }
    }
}

impl fmt::Display for TipResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TipResult::Win => f.write_str("WIN"),
            TipResult::Lose => f.write_str("LOSE"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tip {
    pub id: i64,
    pub tipster_id: i64,
    pub booking_code: String,
    pub odds: Decimal,
    pub recommended_stake: Decimal,
    pub status: TipStatus,
    pub result: Option<TipResult>,
    pub created_at: Option<NaiveDateTime>,
    pub closed_at: Option<NaiveDateTime>,
}

impl Tip {
    pub fn is_open(&self) -> bool {
        self.status == TipStatus::Open
    }
}

impl<'r> FromRow<'r, SqliteRow> for Tip {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let odds: String = row.try_get("odds")?;
        Ok(Tip {
            id: row.try_get("id")?,
            tipster_id: row.try_get("tipster_id")?,
            booking_code: row.try_get("booking_code")?,
            odds: Decimal::from_str(&odds).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            recommended_stake: from_cents(row.try_get("recommended_stake_cents")?),
            status: row.try_get("status")?,
            result: row.try_get("result")?,
            created_at: row.try_get("created_at")?,
            closed_at: row.try_get("closed_at")?,
        })
    }
}

/// An open tip together with its tipster's display name.
#[derive(Debug, Clone, Serialize)]
pub struct TipListing {
    pub tip: Tip,
    pub tipster_name: String,
}

/// A validated tip publication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipDraft {
    pub booking_code: String,
    pub odds: Decimal,
    pub recommended_stake: Decimal,
}

impl TipDraft {
    pub fn new(
        booking_code: &str,
        odds: Decimal,
        recommended_stake: Decimal,
    ) -> Result<Self, ValidationError> {
        validate_booking_code(booking_code)?;
        if odds <= Decimal::ONE || odds > Decimal::from(MAX_ODDS) {
            return Err(ValidationError::OddsOutOfRange { max: MAX_ODDS });
        }
        let recommended_stake = validate_stake(recommended_stake)?;

        Ok(TipDraft {
            booking_code: booking_code.to_string(),
            odds,
            recommended_stake,
        })
    }

    /// Parses the `BookingCode odds stake` payload of a publish command.
    /// Fields may be separated by whitespace or semicolons.
    pub fn parse(payload: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = payload
            .split(|c: char| c.is_whitespace() || c == ';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let [booking_code, odds, stake] = parts.as_slice() else {
            return Err(ValidationError::TipFormat);
        };

        validate_booking_code(booking_code)?;
        let odds = parse_decimal("Odds", odds)?;
        let stake = parse_decimal("Stake", stake)?;
        TipDraft::new(booking_code, odds, stake)
    }

    /// Balance the tipster must hold to cover one bet at the recommended stake.
    pub fn cover_required(&self) -> Decimal {
        round_cents(self.recommended_stake * self.odds)
    }
}

/// Rounds `stake` to cents and checks the rounded amount is in range.
pub fn validate_stake(stake: Decimal) -> Result<Decimal, ValidationError> {
    let stake = round_cents(stake);
    if stake <= Decimal::ZERO || stake > Decimal::from(MAX_STAKE) {
        return Err(ValidationError::StakeOutOfRange { max: MAX_STAKE });
    }
    Ok(stake)
}

fn validate_booking_code(code: &str) -> Result<(), ValidationError> {
    static RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").ok());

    let actual = code.chars().count();
    if actual != BOOKING_CODE_LEN {
        return Err(ValidationError::BookingCodeLength {
            expected: BOOKING_CODE_LEN,
            actual,
        });
    }
    match &*RE {
        Some(re) if re.is_match(code).unwrap_or(false) => Ok(()),
        _ => Err(ValidationError::BookingCodeCharset),
    }
}
