use crate::accounts::LIST_LIMIT;
use crate::schema::{Role, TipsterEntry, User};
use crate::{Database, Entity, LedgerError, LedgerResult};

impl Database {
    /// Follows an approved tipster. Only approved non-tipsters may subscribe;
    /// repeating a subscription is a no-op.
    pub async fn subscribe(&self, subscriber: &User, tipster_id: i64) -> LedgerResult<User> {
        ensure_can_subscribe(subscriber)?;
        let tipster = self.user(tipster_id).await?;
        if !(tipster.is_approved() && tipster.is_tipster()) {
            return Err(LedgerError::not_found(Entity::User, tipster_id));
        }

        sqlx::query(
            r#"
            INSERT INTO subscriptions (tipster_id, user_id) VALUES (?, ?)
            ON CONFLICT (tipster_id, user_id) DO NOTHING
            "#,
        )
        .bind(tipster_id)
        .bind(subscriber.id)
        .execute(self.pool())
        .await?;
        log::debug!("User {} subscribed to tipster {}", subscriber.id, tipster_id);
        Ok(tipster)
    }

    /// Returns false when there was no subscription to remove.
    pub async fn unsubscribe(&self, subscriber: &User, tipster_id: i64) -> LedgerResult<bool> {
        ensure_can_subscribe(subscriber)?;
        let removed = sqlx::query("DELETE FROM subscriptions WHERE tipster_id = ? AND user_id = ?")
            .bind(tipster_id)
            .bind(subscriber.id)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(removed > 0)
    }

    /// Approved tipsters, each flagged with whether `user_id` follows them.
    pub async fn tipsters_for(&self, user_id: i64) -> LedgerResult<Vec<TipsterEntry>> {
        let entries = sqlx::query_as::<_, TipsterEntry>(
            r#"
            SELECT u.id, u.telegram_id, u.username,
                   EXISTS (
                       SELECT 1 FROM subscriptions s
                       WHERE s.tipster_id = u.id AND s.user_id = ?
                   ) AS subscribed
            FROM users u
            WHERE u.role = ? AND u.status = 'APPROVED'
            ORDER BY u.username IS NULL, u.username, u.created_at ASC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(Role::Tipster)
        .bind(LIST_LIMIT)
        .fetch_all(self.pool())
        .await?;
        Ok(entries)
    }
}

fn ensure_can_subscribe(user: &User) -> LedgerResult<()> {
    if !user.is_approved() || user.is_tipster() {
        return Err(LedgerError::Forbidden(
            "You're not approved or you're a tipster.",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn approved(db: &Database, telegram_id: i64, role: Role) -> User {
        let user = db.register_user(telegram_id, None).await.unwrap().user;
        db.approve_user(user.id, role).await.unwrap()
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_and_listed() {
        let db = Database::in_memory().await.unwrap();
        let tipster = approved(&db, 1, Role::Tipster).await;
        let fan = approved(&db, 2, Role::User).await;

        db.subscribe(&fan, tipster.id).await.unwrap();
        db.subscribe(&fan, tipster.id).await.unwrap();

        let list = db.tipsters_for(fan.id).await.unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].subscribed);

        assert!(db.unsubscribe(&fan, tipster.id).await.unwrap());
        assert!(!db.unsubscribe(&fan, tipster.id).await.unwrap());
        assert!(!db.tipsters_for(fan.id).await.unwrap()[0].subscribed);
    }

    #[tokio::test]
    async fn tipsters_and_pending_users_cannot_subscribe() {
        let db = Database::in_memory().await.unwrap();
        let tipster = approved(&db, 1, Role::Tipster).await;
        let other_tipster = approved(&db, 2, Role::Tipster).await;
        let pending = db.register_user(3, None).await.unwrap().user;

        assert!(matches!(
            db.subscribe(&other_tipster, tipster.id).await,
            Err(LedgerError::Forbidden(_))
        ));
        assert!(matches!(
            db.subscribe(&pending, tipster.id).await,
            Err(LedgerError::Forbidden(_))
        ));
    }
}
