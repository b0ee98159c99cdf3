use async_trait::async_trait;

use super::{
    postgres::{lock_sequence, PgStore, USER_SEQUENCE_LOCK},
    RepositoryError, UserRepository,
};
use crate::models::users::{NewUser, User};

#[async_trait]
impl UserRepository for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tx = self.conn.begin().await?;
        lock_sequence(&mut tx, USER_SEQUENCE_LOCK).await?;

        let user = sqlx::query_as::<_, User>(
            r#"
                INSERT INTO users (username, password_hash, referral_code, referrer_code)
                VALUES ($1, $2, $3, $4)
                RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.referral_code)
        .bind(&user.referrer_code)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(user)
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    async fn get_user_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE referral_code = $1")
            .bind(code)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user)
    }

    async fn get_referred_users(&self, referral_code: &str) -> Result<Vec<User>, RepositoryError> {
        let users =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE referrer_code = $1 ORDER BY id")
                .bind(referral_code)
                .fetch_all(&self.conn)
                .await?;

        Ok(users)
    }
}
