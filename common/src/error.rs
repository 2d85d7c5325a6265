use std::fmt;

use rust_decimal::Decimal;

/// Malformed input, rejected before any storage is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Wrong format. Use: /newtip BookingCode odds stake")]
    TipFormat,
    #[error("Booking code must have exactly {expected} characters (got {actual}).")]
    BookingCodeLength { expected: usize, actual: usize },
    #[error("Booking code may only contain letters and digits.")]
    BookingCodeCharset,
    #[error("{field} must be a valid number (decimals allowed, e.g. 2.10, 100.50).")]
    NotANumber { field: &'static str },
    #[error("Odds must be greater than 1 and at most {max}.")]
    OddsOutOfRange { max: u32 },
    #[error("Stake must be greater than 0 and at most {max}.")]
    StakeOutOfRange { max: u32 },
    #[error("Amount must be a whole number.")]
    NotAnInteger,
    #[error("Enter a positive integer {min}-{max}.")]
    AmountOutOfRange { min: i64, max: i64 },
    #[error("Unknown tip result `{0}`, expected WIN or LOSE.")]
    UnknownResult(String),
    #[error("Unknown role `{0}`, expected USER or TIPSTER.")]
    UnknownRole(String),
    #[error("Unknown credit action `{0}`, expected ADD or REMOVE.")]
    UnknownCreditAction(String),
}

/// Which side of a bet failed a sufficiency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Bettor,
    Tipster,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Bettor => f.write_str("bettor"),
            Party::Tipster => f.write_str("tipster"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Wallet,
    Tip,
    Bet,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::User => f.write_str("user"),
            Entity::Wallet => f.write_str("wallet"),
            Entity::Tip => f.write_str("tip"),
            Entity::Bet => f.write_str("bet"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{party} balance {available} does not cover {required}")]
    InsufficientBalance {
        party: Party,
        required: Decimal,
        available: Decimal,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },
    #[error("tip {0} is no longer open")]
    TipNotOpen(i64),
    #[error("user {user_id} already holds a confirmed bet on tip {tip_id}")]
    DuplicateBet { user_id: i64, tip_id: i64 },
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        LedgerError::NotFound { entity, id }
    }

    /// Text safe to show to the chat user. Storage details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::Validation(e) => e.to_string(),
            LedgerError::InsufficientBalance {
                party: Party::Bettor,
                ..
            } => "Not enough balance!".to_string(),
            LedgerError::InsufficientBalance {
                party: Party::Tipster,
                ..
            } => "Tipster doesn't have enough balance!".to_string(),
            LedgerError::NotFound { entity, .. } => {
                let mut name = entity.to_string();
                if let Some(first) = name.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                format!("{name} not found.")
            }
            LedgerError::TipNotOpen(_) => "Tip is no longer available!".to_string(),
            LedgerError::DuplicateBet { .. } => "You have already played this tip!".to_string(),
            LedgerError::Forbidden(reason) => reason.to_string(),
            LedgerError::Storage(_) => "Something went wrong. Please try again later.".to_string(),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn user_messages_are_distinct_per_party() {
        let bettor = LedgerError::InsufficientBalance {
            party: Party::Bettor,
            required: dec!(20),
            available: dec!(5),
        };
        let tipster = LedgerError::InsufficientBalance {
            party: Party::Tipster,
            required: dec!(20),
            available: dec!(5),
        };
        assert_ne!(bettor.user_message(), tipster.user_message());
    }

    #[test]
    fn storage_errors_are_not_echoed() {
        let err = LedgerError::Storage(sqlx::Error::PoolTimedOut);
        assert!(!err.user_message().contains("pool"));
        assert_eq!(
            LedgerError::not_found(Entity::Tip, 3).user_message(),
            "Tip not found."
        );
    }
}
