use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::money::{from_cents, round_cents};
use crate::schema::{BetStatus, TipResult, TransactionKind, tip_reference};
use crate::{Database, Entity, LedgerError, LedgerResult, ledger};

/// Multiplier on a losing bettor's refund (1.04).
pub const CONSOLATION_FACTOR: Decimal = Decimal::from_parts(104, 0, 0, false, 2);

/// One bettor's credit from a settlement.
#[derive(Debug, Clone, Serialize)]
pub struct Payout {
    pub bet_id: i64,
    pub user_id: i64,
    pub telegram_id: i64,
    pub stake: Decimal,
    pub amount: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub tip_id: i64,
    pub result: TipResult,
    pub odds: Decimal,
    pub tipster_id: i64,
    pub tipster_telegram_id: i64,
    pub tipster_payout: Decimal,
    pub tipster_balance: Decimal,
    pub payouts: Vec<Payout>,
}

#[derive(Debug, Clone, Serialize)]
pub enum SettleOutcome {
    Settled(Settlement),
    /// The tip was no longer OPEN; nothing was written.
    AlreadySettled(i64),
}

#[derive(sqlx::FromRow)]
struct ClosedTip {
    tipster_id: i64,
    odds: String,
}

#[derive(sqlx::FromRow)]
struct ConfirmedBet {
    id: i64,
    user_id: i64,
    telegram_id: i64,
    stake_cents: i64,
    potential_win_cents: i64,
}

impl Database {
    /// Closes an OPEN tip with `result` and pays out every confirmed bet in
    /// one unit of work. The OPEN -> CLOSED update runs first; a concurrent
    /// second attempt matches zero rows and reports `AlreadySettled`.
    pub async fn settle_tip(&self, tip_id: i64, result: TipResult) -> LedgerResult<SettleOutcome> {
        let mut tx = self.begin().await?;

        let closed = sqlx::query_as::<_, ClosedTip>(
            r#"
            UPDATE tips SET status = 'CLOSED', result = ?, closed_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = 'OPEN'
            RETURNING tipster_id, odds
            "#,
        )
        .bind(result)
        .bind(tip_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(closed) = closed else {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tips WHERE id = ?)")
                .bind(tip_id)
                .fetch_one(&mut *tx)
                .await?;
            if !exists {
                return Err(LedgerError::not_found(Entity::Tip, tip_id));
            }
            log::info!("Tip {} already settled, ignoring {}", tip_id, result);
            return Ok(SettleOutcome::AlreadySettled(tip_id));
        };
        let odds = Decimal::from_str(&closed.odds)
            .map_err(|e| LedgerError::Storage(sqlx::Error::Decode(Box::new(e))))?;

        let bets = sqlx::query_as::<_, ConfirmedBet>(
            r#"
            SELECT b.id, b.user_id, u.telegram_id, b.stake_cents, b.potential_win_cents
            FROM bets b
            JOIN users u ON u.id = b.user_id
            WHERE b.tip_id = ? AND b.status = 'CONFIRMED'
            ORDER BY b.id
            "#,
        )
        .bind(tip_id)
        .fetch_all(&mut *tx)
        .await?;

        let reference = tip_reference(tip_id);
        let mut payouts = Vec::with_capacity(bets.len());
        let mut tipster_payout = Decimal::ZERO;

        for bet in bets {
            let (amount, kind) = match result {
                TipResult::Win => (from_cents(bet.potential_win_cents), TransactionKind::BetWin),
                // Rounded once from the stake, not from the rounded escrow.
                TipResult::Lose => (
                    round_cents(from_cents(bet.stake_cents) * odds * CONSOLATION_FACTOR),
                    TransactionKind::BetConsolation,
                ),
            };
            let balance = ledger::apply_delta(&mut tx, bet.user_id, amount, kind, &reference).await?;
            if result == TipResult::Win {
                tipster_payout += amount;
            }
            payouts.push(Payout {
                bet_id: bet.id,
                user_id: bet.user_id,
                telegram_id: bet.telegram_id,
                stake: from_cents(bet.stake_cents),
                amount,
                balance,
            });
        }

        // On LOSE the tipster's escrow stays forfeited.
        let tipster_balance = if tipster_payout > Decimal::ZERO {
            ledger::apply_delta(
                &mut tx,
                closed.tipster_id,
                tipster_payout,
                TransactionKind::TipsterPayout,
                &reference,
            )
            .await?
        } else {
            ledger::balance_of(&mut tx, closed.tipster_id).await?
        };

        sqlx::query(
            r#"
            UPDATE bets SET status = ?, settled_at = CURRENT_TIMESTAMP
            WHERE tip_id = ? AND status = 'CONFIRMED'
            "#,
        )
        .bind(BetStatus::from(result))
        .bind(tip_id)
        .execute(&mut *tx)
        .await?;

        let tipster_telegram_id: i64 = sqlx::query_scalar("SELECT telegram_id FROM users WHERE id = ?")
            .bind(closed.tipster_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        log::info!(
            "Settled tip {} as {}: {} bets, tipster {} payout {}",
            tip_id,
            result,
            payouts.len(),
            closed.tipster_id,
            tipster_payout
        );

        Ok(SettleOutcome::Settled(Settlement {
            tip_id,
            result,
            odds,
            tipster_id: closed.tipster_id,
            tipster_telegram_id,
            tipster_payout,
            tipster_balance,
            payouts,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::testing::on_disk;
    use crate::schema::{Role, TipStatus, User};
    use crate::tips::tests::{funded, open_tip};
    use rust_decimal_macros::dec;

    struct Fixture {
        db: Database,
        tipster: User,
        u1: User,
        u2: User,
        tip_id: i64,
    }

    /// Bets of 10 and 5 at odds 2.0, all wallets funded with 1000.
    async fn two_bets() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let tipster = funded(&db, 1, Role::Tipster, 1000).await;
        let u1 = funded(&db, 2, Role::User, 1000).await;
        let u2 = funded(&db, 3, Role::User, 1000).await;
        let tip = open_tip(&db, &tipster, dec!(2.0)).await;
        db.confirm_bet(u1.id, tip.id, dec!(10)).await.unwrap();
        db.confirm_bet(u2.id, tip.id, dec!(5)).await.unwrap();
        Fixture {
            db,
            tipster,
            u1,
            u2,
            tip_id: tip.id,
        }
    }

    async fn tx_count(db: &Database) -> usize {
        db.all_transactions().await.unwrap().len()
    }

    #[tokio::test]
    async fn win_pays_bettors_and_tipster_the_sum() {
        let f = two_bets().await;
        // after escrow: u1 980, u2 990, tipster 1000 - 20 - 10
        assert_eq!(f.db.balance_of(f.tipster.id).await.unwrap(), dec!(970));

        let SettleOutcome::Settled(s) = f.db.settle_tip(f.tip_id, TipResult::Win).await.unwrap() else {
            panic!("expected settlement");
        };

        assert_eq!(s.payouts.len(), 2);
        assert_eq!(s.payouts[0].amount, dec!(20));
        assert_eq!(s.payouts[1].amount, dec!(10));
        assert_eq!(s.tipster_payout, dec!(30));
        assert_eq!(f.db.balance_of(f.u1.id).await.unwrap(), dec!(1000));
        assert_eq!(f.db.balance_of(f.u2.id).await.unwrap(), dec!(1000));
        assert_eq!(f.db.balance_of(f.tipster.id).await.unwrap(), dec!(1000));
        assert_eq!(s.tipster_balance, dec!(1000));

        for bet in f.db.bets_for_tip(f.tip_id).await.unwrap() {
            assert_eq!(bet.status, BetStatus::Win);
        }
        let tip = f.db.tip(f.tip_id).await.unwrap();
        assert_eq!(tip.status, TipStatus::Closed);
        assert_eq!(tip.result, Some(TipResult::Win));
    }

    #[tokio::test]
    async fn lose_refunds_with_consolation_and_keeps_tipster_escrow() {
        let f = two_bets().await;
        let tipster_before = f.db.balance_of(f.tipster.id).await.unwrap();

        let SettleOutcome::Settled(s) = f.db.settle_tip(f.tip_id, TipResult::Lose).await.unwrap() else {
            panic!("expected settlement");
        };

        assert_eq!(s.payouts[0].amount, dec!(20.8));
        assert_eq!(s.payouts[1].amount, dec!(10.4));
        assert_eq!(s.tipster_payout, dec!(0));
        assert_eq!(f.db.balance_of(f.u1.id).await.unwrap(), dec!(1000.8));
        assert_eq!(f.db.balance_of(f.u2.id).await.unwrap(), dec!(1000.4));
        assert_eq!(f.db.balance_of(f.tipster.id).await.unwrap(), tipster_before);

        let kinds: Vec<TransactionKind> = f
            .db
            .transactions_of(f.u1.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(kinds.last(), Some(&TransactionKind::BetConsolation));
        for bet in f.db.bets_for_tip(f.tip_id).await.unwrap() {
            assert_eq!(bet.status, BetStatus::Lose);
        }
    }

    #[tokio::test]
    async fn consolation_rounds_the_exact_product_once() {
        let db = Database::in_memory().await.unwrap();
        let tipster = funded(&db, 1, Role::Tipster, 100).await;
        let bettor = funded(&db, 2, Role::User, 100).await;
        let tip = open_tip(&db, &tipster, dec!(1.1)).await;
        // escrow 1.25 x 1.1 = 1.375, held as 1.38
        let bet = db.confirm_bet(bettor.id, tip.id, dec!(1.25)).await.unwrap();
        assert_eq!(bet.escrow, dec!(1.38));

        let SettleOutcome::Settled(s) = db.settle_tip(tip.id, TipResult::Lose).await.unwrap() else {
            panic!("expected settlement");
        };
        // 1.375 x 1.04 = 1.43, where 1.38 x 1.04 would give 1.44
        assert_eq!(s.payouts[0].amount, dec!(1.43));
        assert_eq!(db.balance_of(bettor.id).await.unwrap(), dec!(100.05));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_settlements_on_disk_apply_once() {
        let db = Arc::new(on_disk("settle-race").await);
        let tipster = funded(&db, 1, Role::Tipster, 1000).await;
        let u1 = funded(&db, 2, Role::User, 1000).await;
        let tip = open_tip(&db, &tipster, dec!(2)).await;
        db.confirm_bet(u1.id, tip.id, dec!(10)).await.unwrap();
        let rows_before = tx_count(&db).await;

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let db = db.clone();
                let tip_id = tip.id;
                tokio::spawn(async move { db.settle_tip(tip_id, TipResult::Win).await })
            })
            .collect();
        let mut settled = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                SettleOutcome::Settled(_) => settled += 1,
                SettleOutcome::AlreadySettled(id) => assert_eq!(id, tip.id),
            }
        }

        assert_eq!(settled, 1);
        // one bettor credit plus one tipster payout
        assert_eq!(tx_count(&db).await, rows_before + 2);
        assert_eq!(db.balance_of(u1.id).await.unwrap(), dec!(1000));
    }

    #[tokio::test]
    async fn second_settlement_is_a_no_op() {
        let f = two_bets().await;
        f.db.settle_tip(f.tip_id, TipResult::Win).await.unwrap();
        let rows = tx_count(&f.db).await;
        let balance = f.db.balance_of(f.u1.id).await.unwrap();

        let again = f.db.settle_tip(f.tip_id, TipResult::Lose).await.unwrap();
        assert!(matches!(again, SettleOutcome::AlreadySettled(id) if id == f.tip_id));
        assert_eq!(tx_count(&f.db).await, rows);
        assert_eq!(f.db.balance_of(f.u1.id).await.unwrap(), balance);
        assert_eq!(f.db.tip(f.tip_id).await.unwrap().result, Some(TipResult::Win));
    }

    #[tokio::test]
    async fn concurrent_settlements_apply_once() {
        let f = two_bets().await;
        let rows_before = tx_count(&f.db).await;

        let (a, b) = tokio::join!(
            f.db.settle_tip(f.tip_id, TipResult::Win),
            f.db.settle_tip(f.tip_id, TipResult::Win)
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        let settled = outcomes
            .iter()
            .filter(|o| matches!(o, SettleOutcome::Settled(_)))
            .count();
        assert_eq!(settled, 1);
        // two bettor credits plus one tipster payout
        assert_eq!(tx_count(&f.db).await, rows_before + 3);
    }

    #[tokio::test]
    async fn tip_without_bets_still_closes() {
        let db = Database::in_memory().await.unwrap();
        let tipster = funded(&db, 1, Role::Tipster, 100).await;
        let tip = open_tip(&db, &tipster, dec!(3)).await;

        let SettleOutcome::Settled(s) = db.settle_tip(tip.id, TipResult::Win).await.unwrap() else {
            panic!("expected settlement");
        };
        assert!(s.payouts.is_empty());
        assert_eq!(s.tipster_payout, dec!(0));
        assert_eq!(db.balance_of(tipster.id).await.unwrap(), dec!(100));
        assert_eq!(db.transactions_of(tipster.id).await.unwrap().len(), 1);
        assert!(!db.tip(tip.id).await.unwrap().is_open());
    }

    #[tokio::test]
    async fn unknown_tip_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        assert!(matches!(
            db.settle_tip(77, TipResult::Lose).await,
            Err(LedgerError::NotFound {
                entity: Entity::Tip,
                id: 77
            })
        ));
    }

    #[tokio::test]
    async fn ledger_reconciles_after_full_cycle() {
        let f = two_bets().await;
        f.db.settle_tip(f.tip_id, TipResult::Lose).await.unwrap();

        let report = f.db.reconcile().await.unwrap();
        assert_eq!(report.len(), 3);
        assert!(report.iter().all(|r| r.is_balanced()));
    }
}
