use rust_decimal::Decimal;

use crate::money::from_cents;
use crate::schema::{
    DEFAULT_CURRENCY, Reconciliation, Registration, Role, Transaction, User, Wallet,
};
use crate::{Database, Entity, LedgerError, LedgerResult, ledger};

/// Rows shown per list view.
pub const LIST_LIMIT: i64 = 20;

impl Database {
    /// Returns the user for `telegram_id`, creating user and wallet together
    /// on first contact.
    pub async fn register_user(
        &self,
        telegram_id: i64,
        username: Option<&str>,
    ) -> LedgerResult<Registration> {
        let mut tx = self.begin().await?;

        let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE telegram_id = ?")
            .bind(telegram_id)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(user) = existing {
            return Ok(Registration {
                user,
                created: false,
            });
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (telegram_id, username, role, status, requested_role)
            VALUES (?, ?, 'USER', 'PENDING', NULL)
            RETURNING *
            "#,
        )
        .bind(telegram_id)
        .bind(username)
        .fetch_one(&mut *tx)
        .await?;
        ledger::open_wallet(&mut tx, user.id, DEFAULT_CURRENCY).await?;
        tx.commit().await?;

        log::info!("Registered user {} (telegram {})", user.id, telegram_id);
        Ok(Registration {
            user,
            created: true,
        })
    }

    pub async fn user(&self, user_id: i64) -> LedgerResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(LedgerError::not_found(Entity::User, user_id))
    }

    pub async fn user_by_telegram(&self, telegram_id: i64) -> LedgerResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE telegram_id = ?")
            .bind(telegram_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    pub async fn request_role(&self, telegram_id: i64, role: Role) -> LedgerResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET requested_role = ?, updated_at = CURRENT_TIMESTAMP
            WHERE telegram_id = ?
            RETURNING *
            "#,
        )
        .bind(role)
        .bind(telegram_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(LedgerError::not_found(Entity::User, telegram_id))
    }

    /// PENDING -> APPROVED with `role`. Fails with `NotFound` when the user is
    /// missing or no longer pending.
    pub async fn approve_user(&self, user_id: i64, role: Role) -> LedgerResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET status = 'APPROVED', role = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(role)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(LedgerError::not_found(Entity::User, user_id))?;
        log::info!("Approved user {} as {}", user.id, role);
        Ok(user)
    }

    pub async fn reject_user(&self, user_id: i64) -> LedgerResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET status = 'REJECTED', updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(LedgerError::not_found(Entity::User, user_id))?;
        log::info!("Rejected user {}", user.id);
        Ok(user)
    }

    pub async fn pending_users(&self) -> LedgerResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users WHERE status = 'PENDING'
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(LIST_LIMIT)
        .fetch_all(self.pool())
        .await?;
        Ok(users)
    }

    pub async fn approved_users(&self, role: Role) -> LedgerResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users WHERE status = 'APPROVED' AND role = ?
            ORDER BY username IS NULL, username, created_at DESC
            LIMIT ?
            "#,
        )
        .bind(role)
        .bind(LIST_LIMIT)
        .fetch_all(self.pool())
        .await?;
        Ok(users)
    }

    pub async fn wallet(&self, user_id: i64) -> LedgerResult<Wallet> {
        sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(LedgerError::not_found(Entity::Wallet, user_id))
    }

    pub async fn balance_of(&self, user_id: i64) -> LedgerResult<Decimal> {
        let mut conn = self.pool().acquire().await?;
        ledger::balance_of(&mut conn, user_id).await
    }

    pub async fn transactions_of(&self, user_id: i64) -> LedgerResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn all_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions ORDER BY id ASC")
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    /// Compares every wallet against the sum of its transaction log.
    pub async fn reconcile(&self) -> LedgerResult<Vec<Reconciliation>> {
        let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT w.user_id, w.balance_cents, COALESCE(SUM(t.amount_cents), 0)
            FROM wallets w
            LEFT JOIN transactions t ON t.user_id = w.user_id
            GROUP BY w.user_id, w.balance_cents
            ORDER BY w.user_id
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, balance, total)| Reconciliation {
                user_id,
                balance: from_cents(balance),
                ledger_total: from_cents(total),
            })
            .collect())
    }
}
