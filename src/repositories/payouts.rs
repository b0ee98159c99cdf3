use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{postgres::PgStore, PayoutRepository, RepositoryError};
use crate::models::{
    payouts::{ActivityType, NewPayout, Payout, PayoutStatus},
    transfers::Transfer,
    users::User,
};

#[derive(sqlx::FromRow)]
struct PayoutRow {
    id: i64,
    user_id: i64,
    activity_type: String,
    checkpoint_id: i64,
    amount: Decimal,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PayoutRow> for Payout {
    type Error = RepositoryError;

    fn try_from(row: PayoutRow) -> Result<Self, Self::Error> {
        Ok(Payout {
            id: row.id,
            user_id: row.user_id,
            activity_type: row.activity_type.parse().map_err(RepositoryError::Decode)?,
            checkpoint_id: row.checkpoint_id,
            amount: row.amount,
            status: row.status.parse().map_err(RepositoryError::Decode)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl PayoutRepository for PgStore {
    async fn get_last_checkpoint(
        &self,
        user_id: i64,
        activity_type: ActivityType,
    ) -> Result<i64, RepositoryError> {
        let checkpoint: Option<i64> = sqlx::query_scalar(
            r#"
                SELECT checkpoint_id FROM payouts
                WHERE user_id = $1 AND activity_type = $2
                ORDER BY id DESC LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(activity_type.as_str())
        .fetch_optional(&self.conn)
        .await?;

        Ok(checkpoint.unwrap_or(0))
    }

    async fn get_signup_candidates(
        &self,
        referral_code: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<User>, RepositoryError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE referrer_code = $1 AND id > $2 ORDER BY id LIMIT $3",
        )
        .bind(referral_code)
        .bind(after_id)
        .bind(limit as i64)
        .fetch_all(&self.conn)
        .await?;

        Ok(users)
    }

    async fn get_transaction_candidates(
        &self,
        sender_ids: &[i64],
        min_amount: Decimal,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<Transfer>, RepositoryError> {
        if sender_ids.is_empty() {
            return Ok(Vec::new());
        }

        let transfers = sqlx::query_as::<_, Transfer>(
            r#"
                SELECT * FROM transfers
                WHERE sender_id = ANY($1) AND amount > $2 AND id > $3
                ORDER BY id LIMIT $4
            "#,
        )
        .bind(sender_ids)
        .bind(min_amount)
        .bind(after_id)
        .bind(limit as i64)
        .fetch_all(&self.conn)
        .await?;

        Ok(transfers)
    }

    async fn insert_payout(&self, payout: NewPayout) -> Result<Option<Payout>, RepositoryError> {
        let row = sqlx::query_as::<_, PayoutRow>(
            r#"
                INSERT INTO payouts (user_id, activity_type, checkpoint_id, amount, status)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT ON CONSTRAINT payouts_batch_key DO NOTHING
                RETURNING *
            "#,
        )
        .bind(payout.user_id)
        .bind(payout.activity_type.as_str())
        .bind(payout.checkpoint_id)
        .bind(payout.amount)
        .bind(PayoutStatus::Pending.as_str())
        .fetch_optional(&self.conn)
        .await?;

        row.map(Payout::try_from).transpose()
    }

    async fn get_payouts(&self, user_id: i64) -> Result<Vec<Payout>, RepositoryError> {
        let rows =
            sqlx::query_as::<_, PayoutRow>("SELECT * FROM payouts WHERE user_id = $1 ORDER BY id")
                .bind(user_id)
                .fetch_all(&self.conn)
                .await?;

        rows.into_iter().map(Payout::try_from).collect()
    }
}
