use rust_decimal::Decimal;
use serde::Serialize;

use crate::accounts::LIST_LIMIT;
use crate::money::{round_cents, to_cents};
use crate::schema::{
    Bet, Subscriber, Tip, TipDraft, TipListing, TransactionKind, User, tip_reference,
    validate_stake,
};
use crate::{Database, Entity, LedgerError, LedgerResult, Party, ledger};

/// A freshly opened tip and the subscribers who should hear about it.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedTip {
    pub tip: Tip,
    pub audience: Vec<Subscriber>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BetConfirmation {
    pub bet: Bet,
    pub escrow: Decimal,
    pub bettor_balance: Decimal,
    pub tipster_balance: Decimal,
}

impl Database {
    /// Opens a tip. Nothing is debited here: the tipster's balance only has
    /// to cover one bet at the recommended stake.
    pub async fn publish_tip(&self, tipster: &User, draft: &TipDraft) -> LedgerResult<PublishedTip> {
        if !(tipster.is_approved() && tipster.is_tipster()) {
            return Err(LedgerError::Forbidden(
                "You do not have permission to publish tips.",
            ));
        }

        let mut tx = self.begin().await?;

        let required = draft.cover_required();
        let available = ledger::balance_of(&mut tx, tipster.id).await?;
        if available < required {
            return Err(LedgerError::InsufficientBalance {
                party: Party::Tipster,
                required,
                available,
            });
        }

        let tip = sqlx::query_as::<_, Tip>(
            r#"
            INSERT INTO tips (tipster_id, booking_code, odds, recommended_stake_cents, status)
            VALUES (?, ?, ?, ?, 'OPEN')
            RETURNING *
            "#,
        )
        .bind(tipster.id)
        .bind(&draft.booking_code)
        .bind(draft.odds.to_string())
        .bind(to_cents(draft.recommended_stake)?)
        .fetch_one(&mut *tx)
        .await?;

        // Only subscribers able to escrow the recommended bet are notified.
        let audience = sqlx::query_as::<_, Subscriber>(
            r#"
            SELECT u.id AS user_id, u.telegram_id
            FROM subscriptions s
            JOIN users u ON u.id = s.user_id
            JOIN wallets w ON w.user_id = u.id
            WHERE s.tipster_id = ? AND u.status = 'APPROVED' AND w.balance_cents >= ?
            ORDER BY u.id
            "#,
        )
        .bind(tipster.id)
        .bind(to_cents(required)?)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        log::info!(
            "Tipster {} opened tip {} ({} @ {}), {} subscribers to notify",
            tipster.id,
            tip.id,
            tip.booking_code,
            tip.odds,
            audience.len()
        );
        Ok(PublishedTip { tip, audience })
    }

    /// Records a bet and escrows `stake x odds` from both bettor and tipster.
    /// Either both debits and the bet row land, or nothing does.
    pub async fn confirm_bet(
        &self,
        user_id: i64,
        tip_id: i64,
        stake: Decimal,
    ) -> LedgerResult<BetConfirmation> {
        let stake = validate_stake(stake)?;

        let mut tx = self.begin().await?;

        let tip = sqlx::query_as::<_, Tip>("SELECT * FROM tips WHERE id = ?")
            .bind(tip_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::not_found(Entity::Tip, tip_id))?;
        if !tip.is_open() {
            return Err(LedgerError::TipNotOpen(tip_id));
        }

        let bettor = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::not_found(Entity::User, user_id))?;
        if !bettor.is_approved() {
            return Err(LedgerError::Forbidden("Your account is not approved."));
        }
        if bettor.id == tip.tipster_id {
            return Err(LedgerError::Forbidden("You cannot play your own tip."));
        }

        let already: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM bets WHERE user_id = ? AND tip_id = ? AND status = 'CONFIRMED')",
        )
        .bind(user_id)
        .bind(tip_id)
        .fetch_one(&mut *tx)
        .await?;
        if already {
            return Err(LedgerError::DuplicateBet { user_id, tip_id });
        }

        let escrow = round_cents(stake * tip.odds);
        let reference = tip_reference(tip_id);
        let bettor_balance = ledger::apply_covered_debit(
            &mut tx,
            user_id,
            escrow,
            TransactionKind::BetEscrow,
            &reference,
            Party::Bettor,
        )
        .await?;
        let tipster_balance = ledger::apply_covered_debit(
            &mut tx,
            tip.tipster_id,
            escrow,
            TransactionKind::TipsterEscrow,
            &reference,
            Party::Tipster,
        )
        .await?;

        let bet = sqlx::query_as::<_, Bet>(
            r#"
            INSERT INTO bets (user_id, tip_id, stake_cents, potential_win_cents, status)
            VALUES (?, ?, ?, ?, 'CONFIRMED')
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(tip_id)
        .bind(to_cents(stake)?)
        .bind(to_cents(escrow)?)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                LedgerError::DuplicateBet { user_id, tip_id }
            }
            _ => LedgerError::Storage(e),
        })?;

        tx.commit().await?;
        log::info!(
            "User {} confirmed bet {} on tip {}: stake {}, escrow {} each side",
            user_id,
            bet.id,
            tip_id,
            stake,
            escrow
        );
        Ok(BetConfirmation {
            bet,
            escrow,
            bettor_balance,
            tipster_balance,
        })
    }

    pub async fn tip(&self, tip_id: i64) -> LedgerResult<Tip> {
        sqlx::query_as::<_, Tip>("SELECT * FROM tips WHERE id = ?")
            .bind(tip_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(LedgerError::not_found(Entity::Tip, tip_id))
    }

    /// A tip with its tipster's display name.
    pub async fn tip_listing(&self, tip_id: i64) -> LedgerResult<TipListing> {
        let tip = self.tip(tip_id).await?;
        let tipster = self.user(tip.tipster_id).await?;
        Ok(TipListing {
            tip,
            tipster_name: tipster.display_name(),
        })
    }

    pub async fn open_tips(&self) -> LedgerResult<Vec<TipListing>> {
        let tips = sqlx::query_as::<_, Tip>(
            r#"
            SELECT * FROM tips WHERE status = 'OPEN'
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(LIST_LIMIT)
        .fetch_all(self.pool())
        .await?;

        let mut listings = Vec::with_capacity(tips.len());
        for tip in tips {
            let tipster = self.user(tip.tipster_id).await?;
            listings.push(TipListing {
                tip,
                tipster_name: tipster.display_name(),
            });
        }
        Ok(listings)
    }

    pub async fn bets_for_tip(&self, tip_id: i64) -> LedgerResult<Vec<Bet>> {
        let bets = sqlx::query_as::<_, Bet>("SELECT * FROM bets WHERE tip_id = ? ORDER BY id")
            .bind(tip_id)
            .fetch_all(self.pool())
            .await?;
        Ok(bets)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ValidationError;
    use crate::db::testing::on_disk;
    use crate::schema::{BetStatus, Role, TipStatus, TransactionKind};
    use rust_decimal_macros::dec;

    /// Approved account funded through an admin credit.
    pub(crate) async fn funded(db: &Database, telegram_id: i64, role: Role, amount: i64) -> User {
        let user = db.register_user(telegram_id, None).await.unwrap().user;
        let user = db.approve_user(user.id, role).await.unwrap();
        if amount > 0 {
            db.adjust_balance(user.id, crate::CreditAction::Add, amount)
                .await
                .unwrap();
        }
        user
    }

    pub(crate) async fn open_tip(db: &Database, tipster: &User, odds: Decimal) -> Tip {
        let draft = TipDraft::new("AB12CD3", odds, dec!(10)).unwrap();
        db.publish_tip(tipster, &draft).await.unwrap().tip
    }

    #[tokio::test]
    async fn publishing_checks_cover_but_debits_nothing() {
        let db = Database::in_memory().await.unwrap();
        let tipster = funded(&db, 1, Role::Tipster, 100).await;

        let published = db
            .publish_tip(&tipster, &TipDraft::new("AB12CD3", dec!(2.5), dec!(40)).unwrap())
            .await
            .unwrap();
        assert_eq!(published.tip.status, TipStatus::Open);
        assert_eq!(db.balance_of(tipster.id).await.unwrap(), dec!(100));

        let err = db
            .publish_tip(&tipster, &TipDraft::new("AB12CD4", dec!(2.6), dec!(40)).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                party: Party::Tipster,
                ..
            }
        ));
        assert_eq!(db.open_tips().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn only_approved_tipsters_publish() {
        let db = Database::in_memory().await.unwrap();
        let user = funded(&db, 1, Role::User, 100).await;
        let draft = TipDraft::new("AB12CD3", dec!(2), dec!(10)).unwrap();
        assert!(matches!(
            db.publish_tip(&user, &draft).await,
            Err(LedgerError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn audience_is_subscribers_who_can_cover() {
        let db = Database::in_memory().await.unwrap();
        let tipster = funded(&db, 1, Role::Tipster, 1000).await;
        let rich = funded(&db, 2, Role::User, 100).await;
        let poor = funded(&db, 3, Role::User, 5).await;
        let stranger = funded(&db, 4, Role::User, 100).await;
        db.subscribe(&rich, tipster.id).await.unwrap();
        db.subscribe(&poor, tipster.id).await.unwrap();

        let published = db
            .publish_tip(&tipster, &TipDraft::new("AB12CD3", dec!(2), dec!(10)).unwrap())
            .await
            .unwrap();
        let audience: Vec<i64> = published.audience.iter().map(|s| s.user_id).collect();
        assert_eq!(audience, vec![rich.id]);
        assert!(!audience.contains(&stranger.id));
    }

    #[tokio::test]
    async fn confirmation_escrows_from_both_sides() {
        let db = Database::in_memory().await.unwrap();
        let tipster = funded(&db, 1, Role::Tipster, 500).await;
        let bettor = funded(&db, 2, Role::User, 300).await;
        let tip = open_tip(&db, &tipster, dec!(2.5)).await;

        let before = db.balance_of(bettor.id).await.unwrap() + db.balance_of(tipster.id).await.unwrap();
        let confirmation = db.confirm_bet(bettor.id, tip.id, dec!(40)).await.unwrap();
        let after = db.balance_of(bettor.id).await.unwrap() + db.balance_of(tipster.id).await.unwrap();

        assert_eq!(confirmation.escrow, dec!(100));
        assert_eq!(after, before - dec!(2) * dec!(40) * dec!(2.5));
        assert_eq!(confirmation.bettor_balance, dec!(200));
        assert_eq!(confirmation.tipster_balance, dec!(400));
        assert_eq!(confirmation.bet.status, BetStatus::Confirmed);
        assert_eq!(confirmation.bet.potential_win, dec!(100));

        let kinds: Vec<TransactionKind> = db
            .transactions_of(tipster.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![TransactionKind::AdminCredit, TransactionKind::TipsterEscrow]
        );
    }

    #[tokio::test]
    async fn second_bet_on_same_tip_is_rejected_without_balance_change() {
        let db = Database::in_memory().await.unwrap();
        let tipster = funded(&db, 1, Role::Tipster, 500).await;
        let bettor = funded(&db, 2, Role::User, 300).await;
        let tip = open_tip(&db, &tipster, dec!(2)).await;

        db.confirm_bet(bettor.id, tip.id, dec!(10)).await.unwrap();
        let bettor_before = db.balance_of(bettor.id).await.unwrap();
        let tipster_before = db.balance_of(tipster.id).await.unwrap();

        let err = db.confirm_bet(bettor.id, tip.id, dec!(10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateBet { .. }));
        assert_eq!(db.balance_of(bettor.id).await.unwrap(), bettor_before);
        assert_eq!(db.balance_of(tipster.id).await.unwrap(), tipster_before);
        assert_eq!(db.bets_for_tip(tip.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sub_cent_stake_is_rejected_before_escrow() {
        let db = Database::in_memory().await.unwrap();
        let tipster = funded(&db, 1, Role::Tipster, 500).await;
        let bettor = funded(&db, 2, Role::User, 300).await;
        let tip = open_tip(&db, &tipster, dec!(2)).await;

        let err = db.confirm_bet(bettor.id, tip.id, dec!(0.004)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::StakeOutOfRange { .. })
        ));
        assert!(db.bets_for_tip(tip.id).await.unwrap().is_empty());
        assert_eq!(db.transactions_of(bettor.id).await.unwrap().len(), 1);

        // The slot is still free for a real stake.
        db.confirm_bet(bettor.id, tip.id, dec!(10)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bets_from_distinct_users_all_land() {
        let db = Arc::new(on_disk("distinct-bettors").await);
        let tipster = funded(&db, 1, Role::Tipster, 1000).await;
        let tip = open_tip(&db, &tipster, dec!(2)).await;
        let mut bettors = Vec::new();
        for telegram_id in 10..18 {
            bettors.push(funded(&db, telegram_id, Role::User, 100).await);
        }

        let handles: Vec<_> = bettors
            .iter()
            .map(|bettor| {
                let db = db.clone();
                let (user_id, tip_id) = (bettor.id, tip.id);
                tokio::spawn(async move { db.confirm_bet(user_id, tip_id, dec!(10)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(db.bets_for_tip(tip.id).await.unwrap().len(), 8);
        assert_eq!(db.balance_of(tipster.id).await.unwrap(), dec!(840));
        for bettor in &bettors {
            assert_eq!(db.balance_of(bettor.id).await.unwrap(), dec!(80));
        }
        assert!(db.reconcile().await.unwrap().iter().all(|r| r.is_balanced()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_repeat_bets_confirm_once() {
        let db = Arc::new(on_disk("repeat-bets").await);
        let tipster = funded(&db, 1, Role::Tipster, 1000).await;
        let bettor = funded(&db, 2, Role::User, 1000).await;
        let tip = open_tip(&db, &tipster, dec!(2)).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let (user_id, tip_id) = (bettor.id, tip.id);
                tokio::spawn(async move { db.confirm_bet(user_id, tip_id, dec!(10)).await })
            })
            .collect();
        let mut confirmed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => confirmed += 1,
                Err(e) => assert!(matches!(e, LedgerError::DuplicateBet { .. }), "{e}"),
            }
        }

        assert_eq!(confirmed, 1);
        assert_eq!(db.balance_of(bettor.id).await.unwrap(), dec!(980));
        assert_eq!(db.balance_of(tipster.id).await.unwrap(), dec!(980));
    }

    #[tokio::test]
    async fn tipster_shortfall_rolls_back_bettor_debit() {
        let db = Database::in_memory().await.unwrap();
        let tipster = funded(&db, 1, Role::Tipster, 25).await;
        let bettor = funded(&db, 2, Role::User, 300).await;
        let tip = open_tip(&db, &tipster, dec!(2)).await;

        let err = db.confirm_bet(bettor.id, tip.id, dec!(20)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                party: Party::Tipster,
                ..
            }
        ));
        assert_eq!(db.balance_of(bettor.id).await.unwrap(), dec!(300));
        assert_eq!(db.transactions_of(bettor.id).await.unwrap().len(), 1);
        assert!(db.bets_for_tip(tip.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bettor_must_cover_stake_times_odds() {
        let db = Database::in_memory().await.unwrap();
        let tipster = funded(&db, 1, Role::Tipster, 500).await;
        let bettor = funded(&db, 2, Role::User, 15).await;
        let tip = open_tip(&db, &tipster, dec!(2)).await;

        let err = db.confirm_bet(bettor.id, tip.id, dec!(10)).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                party: Party::Bettor,
                ..
            }
        ));
        assert_eq!(db.balance_of(tipster.id).await.unwrap(), dec!(500));
    }

    #[tokio::test]
    async fn closed_or_missing_tips_refuse_bets() {
        let db = Database::in_memory().await.unwrap();
        let tipster = funded(&db, 1, Role::Tipster, 500).await;
        let bettor = funded(&db, 2, Role::User, 300).await;
        let tip = open_tip(&db, &tipster, dec!(2)).await;
        db.settle_tip(tip.id, crate::schema::TipResult::Lose)
            .await
            .unwrap();

        assert!(matches!(
            db.confirm_bet(bettor.id, tip.id, dec!(10)).await,
            Err(LedgerError::TipNotOpen(_))
        ));
        assert!(matches!(
            db.confirm_bet(bettor.id, 999, dec!(10)).await,
            Err(LedgerError::NotFound {
                entity: Entity::Tip,
                ..
            })
        ));
        assert!(matches!(
            db.confirm_bet(bettor.id, tip.id, dec!(0)).await,
            Err(LedgerError::Validation(_))
        ));
    }
}
