//! Ledger engine: the only code that writes `wallets.balance_cents`.
//!
//! Every function here runs on the caller's open transaction and pairs the
//! balance change with exactly one `transactions` row, so a rollback of the
//! enclosing unit of work discards both.

use rust_decimal::Decimal;
use sqlx::SqliteConnection;

use crate::money::{from_cents, to_cents};
use crate::schema::{TransactionKind, Wallet};
use crate::{Entity, LedgerError, LedgerResult, Party};

/// Creates the zero-balance wallet for a freshly inserted user.
pub async fn open_wallet(
    conn: &mut SqliteConnection,
    user_id: i64,
    currency: &str,
) -> LedgerResult<Wallet> {
    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        INSERT INTO wallets (user_id, balance_cents, currency)
        VALUES (?, 0, ?)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(currency)
    .fetch_one(&mut *conn)
    .await?;
    log::debug!("Opened {} wallet for user {}", currency, user_id);
    Ok(wallet)
}

/// Adds `amount` (signed) to the user's balance and records it.
/// Does not guard against going negative.
pub async fn apply_delta(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: Decimal,
    kind: TransactionKind,
    reference: &str,
) -> LedgerResult<Decimal> {
    let cents = to_cents(amount)?;
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE wallets
        SET balance_cents = balance_cents + ?, updated_at = CURRENT_TIMESTAMP
        WHERE user_id = ?
        RETURNING balance_cents
        "#,
    )
    .bind(cents)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(balance) = balance else {
        return Err(LedgerError::not_found(Entity::Wallet, user_id));
    };

    record(conn, user_id, cents, kind, reference).await?;
    let balance = from_cents(balance);
    log::debug!(
        "Ledger {} {} for user {} ({}), balance {}",
        kind,
        from_cents(cents),
        user_id,
        reference,
        balance
    );
    Ok(balance)
}

/// Debits `amount` only if the balance covers it. The check and the update
/// are one statement, so no concurrent writer can slip in between.
pub async fn apply_covered_debit(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: Decimal,
    kind: TransactionKind,
    reference: &str,
    party: Party,
) -> LedgerResult<Decimal> {
    let cents = to_cents(amount)?;
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE wallets
        SET balance_cents = balance_cents - ?, updated_at = CURRENT_TIMESTAMP
        WHERE user_id = ? AND balance_cents >= ?
        RETURNING balance_cents
        "#,
    )
    .bind(cents)
    .bind(user_id)
    .bind(cents)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(balance) = balance else {
        let available = balance_of(conn, user_id).await?;
        return Err(LedgerError::InsufficientBalance {
            party,
            required: from_cents(cents),
            available,
        });
    };

    record(conn, user_id, -cents, kind, reference).await?;
    let balance = from_cents(balance);
    log::debug!(
        "Ledger {} -{} for {} {} ({}), balance {}",
        kind,
        from_cents(cents),
        party,
        user_id,
        reference,
        balance
    );
    Ok(balance)
}

pub async fn balance_of(conn: &mut SqliteConnection, user_id: i64) -> LedgerResult<Decimal> {
    let cents: Option<i64> =
        sqlx::query_scalar("SELECT balance_cents FROM wallets WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
    cents
        .map(from_cents)
        .ok_or(LedgerError::not_found(Entity::Wallet, user_id))
}

async fn record(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount_cents: i64,
    kind: TransactionKind,
    reference: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO transactions (user_id, amount_cents, kind, reference)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(amount_cents)
    .bind(kind)
    .bind(reference)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
