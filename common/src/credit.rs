use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::money::parse_decimal;
use crate::schema::{ADMIN_REFERENCE, TransactionKind, User};
use crate::{Database, Entity, LedgerError, LedgerResult, ValidationError, ledger};

pub const CREDIT_MIN: i64 = 1;
pub const CREDIT_MAX: i64 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CreditAction {
    Add,
    Remove,
}

impl CreditAction {
    pub fn signed(self, amount: i64) -> i64 {
        match self {
            CreditAction::Add => amount,
            CreditAction::Remove => -amount,
        }
    }

    pub fn kind(self) -> TransactionKind {
        match self {
            CreditAction::Add => TransactionKind::AdminCredit,
            CreditAction::Remove => TransactionKind::AdminDebit,
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            CreditAction::Add => "ADDED",
            CreditAction::Remove => "REMOVED",
        }
    }
}

impl FromStr for CreditAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(CreditAction::Add),
            "REMOVE" => Ok(CreditAction::Remove),
            other => Err(ValidationError::UnknownCreditAction(other.to_string())),
        }
    }
}

impl fmt::Display for CreditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreditAction::Add => f.write_str("ADD"),
            CreditAction::Remove => f.write_str("REMOVE"),
        }
    }
}

/// Target and direction awaiting the admin's numeric amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCredit {
    pub target_user_id: i64,
    pub action: CreditAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditReceipt {
    pub user: User,
    pub action: CreditAction,
    pub amount: i64,
    pub balance: Decimal,
}

impl CreditReceipt {
    pub fn went_negative(&self) -> bool {
        self.action == CreditAction::Remove && self.balance < Decimal::ZERO
    }
}

/// Parses the admin's amount message: a whole number in `CREDIT_MIN..=CREDIT_MAX`.
pub fn parse_credit_amount(raw: &str) -> Result<i64, ValidationError> {
    let raw = raw.trim();
    let amount = match raw.parse::<i64>() {
        Ok(amount) => amount,
        Err(_) => {
            return match parse_decimal("Amount", raw) {
                Ok(_) => Err(ValidationError::NotAnInteger),
                Err(e) => Err(e),
            };
        }
    };
    if !(CREDIT_MIN..=CREDIT_MAX).contains(&amount) {
        return Err(ValidationError::AmountOutOfRange {
            min: CREDIT_MIN,
            max: CREDIT_MAX,
        });
    }
    Ok(amount)
}

/// Pending credit operations, at most one per admin.
#[derive(Default)]
pub struct CreditDesk {
    pending: Mutex<HashMap<i64, PendingCredit>>,
}

impl CreditDesk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or replaces) the admin's pending operation.
    pub async fn open(&self, admin_id: i64, target_user_id: i64, action: CreditAction) {
        let pending = PendingCredit {
            target_user_id,
            action,
        };
        let replaced = self.pending.lock().await.insert(admin_id, pending);
        if let Some(previous) = replaced {
            log::debug!(
                "Admin {} replaced pending {} for user {}",
                admin_id,
                previous.action,
                previous.target_user_id
            );
        }
        log::info!(
            "Admin {} awaiting {} amount for user {}",
            admin_id,
            action,
            target_user_id
        );
    }

    pub async fn pending_for(&self, admin_id: i64) -> Option<PendingCredit> {
        self.pending.lock().await.get(&admin_id).copied()
    }

    /// Feeds the admin's next message into their pending operation.
    ///
    /// Returns `None` when the admin has nothing pending, so unrelated
    /// numeric messages are ignored. Invalid input keeps the operation open
    /// for a retry; once an amount parses, the operation is consumed whether
    /// the ledger write succeeds or not.
    pub async fn submit(
        &self,
        db: &Database,
        admin_id: i64,
        raw: &str,
    ) -> Option<LedgerResult<CreditReceipt>> {
        let (pending, amount) = {
            let mut guard = self.pending.lock().await;
            let pending = *guard.get(&admin_id)?;
            let amount = match parse_credit_amount(raw) {
                Ok(amount) => amount,
                Err(e) => {
                    log::debug!("Admin {} sent invalid amount {:?}: {}", admin_id, raw, e);
                    return Some(Err(e.into()));
                }
            };
            guard.remove(&admin_id);
            (pending, amount)
        };

        Some(
            db.adjust_balance(pending.target_user_id, pending.action, amount)
                .await,
        )
    }
}

impl Database {
    /// Admin override: applies `amount` credits in `action`'s direction.
    /// Debits may push the balance below zero.
    pub async fn adjust_balance(
        &self,
        user_id: i64,
        action: CreditAction,
        amount: i64,
    ) -> LedgerResult<CreditReceipt> {
        let mut tx = self.begin().await?;
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::not_found(Entity::User, user_id))?;

        let balance = ledger::apply_delta(
            &mut tx,
            user_id,
            Decimal::from(action.signed(amount)),
            action.kind(),
            ADMIN_REFERENCE,
        )
        .await?;
        tx.commit().await?;

        let receipt = CreditReceipt {
            user,
            action,
            amount,
            balance,
        };
        if receipt.went_negative() {
            log::warn!("Admin debit left user {} at {}", user_id, balance);
        } else {
            log::info!(
                "Admin {} {} credits for user {}, balance {}",
                action,
                amount,
                user_id,
                balance
            );
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Role;
    use crate::tips::tests::funded;
    use rust_decimal_macros::dec;

    const ADMIN: i64 = 9000;

    #[test]
    fn amount_parsing_distinguishes_reasons() {
        assert_eq!(parse_credit_amount(" 500 "), Ok(500));
        assert_eq!(parse_credit_amount("12.5"), Err(ValidationError::NotAnInteger));
        assert!(matches!(
            parse_credit_amount("-5"),
            Err(ValidationError::AmountOutOfRange { .. })
        ));
        assert!(matches!(
            parse_credit_amount("1000000"),
            Err(ValidationError::AmountOutOfRange { .. })
        ));
        assert!(matches!(
            parse_credit_amount("lots"),
            Err(ValidationError::NotANumber { .. })
        ));
    }

    #[tokio::test]
    async fn add_writes_one_admin_credit_row() {
        let db = Database::in_memory().await.unwrap();
        let user = funded(&db, 1, Role::User, 100).await;
        let desk = CreditDesk::new();

        desk.open(ADMIN, user.id, CreditAction::Add).await;
        let receipt = desk.submit(&db, ADMIN, "500").await.unwrap().unwrap();

        assert_eq!(receipt.balance, dec!(600));
        assert!(desk.pending_for(ADMIN).await.is_none());
        let log = db.transactions_of(user.id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].kind, TransactionKind::AdminCredit);
        assert_eq!(log[1].amount, dec!(500));
        assert_eq!(log[1].reference, ADMIN_REFERENCE);
    }

    #[tokio::test]
    async fn invalid_input_keeps_pending_and_balance() {
        let db = Database::in_memory().await.unwrap();
        let user = funded(&db, 1, Role::User, 100).await;
        let desk = CreditDesk::new();
        desk.open(ADMIN, user.id, CreditAction::Add).await;

        for raw in ["12.5", "-5", "abc", "0"] {
            let outcome = desk.submit(&db, ADMIN, raw).await.unwrap();
            assert!(matches!(outcome, Err(LedgerError::Validation(_))), "{raw}");
        }

        assert_eq!(db.balance_of(user.id).await.unwrap(), dec!(100));
        assert_eq!(
            desk.pending_for(ADMIN).await,
            Some(PendingCredit {
                target_user_id: user.id,
                action: CreditAction::Add
            })
        );
        let receipt = desk.submit(&db, ADMIN, "5").await.unwrap().unwrap();
        assert_eq!(receipt.balance, dec!(105));
    }

    #[tokio::test]
    async fn remove_may_go_negative_and_is_flagged() {
        let db = Database::in_memory().await.unwrap();
        let user = funded(&db, 1, Role::User, 100).await;
        let desk = CreditDesk::new();

        desk.open(ADMIN, user.id, CreditAction::Remove).await;
        let receipt = desk.submit(&db, ADMIN, "150").await.unwrap().unwrap();

        assert_eq!(receipt.balance, dec!(-50));
        assert!(receipt.went_negative());
        let log = db.transactions_of(user.id).await.unwrap();
        assert_eq!(log[1].kind, TransactionKind::AdminDebit);
        assert_eq!(log[1].amount, dec!(-150));
    }

    #[tokio::test]
    async fn failed_write_still_clears_pending() {
        let db = Database::in_memory().await.unwrap();
        let desk = CreditDesk::new();

        desk.open(ADMIN, 404, CreditAction::Add).await;
        let outcome = desk.submit(&db, ADMIN, "10").await.unwrap();

        assert!(matches!(outcome, Err(LedgerError::NotFound { .. })));
        assert!(desk.pending_for(ADMIN).await.is_none());
    }

    #[tokio::test]
    async fn numbers_without_pending_or_from_other_admins_are_ignored() {
        let db = Database::in_memory().await.unwrap();
        let user = funded(&db, 1, Role::User, 100).await;
        let desk = CreditDesk::new();

        assert!(desk.submit(&db, ADMIN, "500").await.is_none());

        desk.open(ADMIN, user.id, CreditAction::Add).await;
        assert!(desk.submit(&db, ADMIN + 1, "500").await.is_none());
        assert!(desk.pending_for(ADMIN).await.is_some());
        assert_eq!(db.balance_of(user.id).await.unwrap(), dec!(100));
    }
}
