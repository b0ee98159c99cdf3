use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use super::{
    postgres::{lock_sequence, PgStore, TRANSFER_SEQUENCE_LOCK},
    LedgerRepository, RepositoryError,
};
use crate::models::{
    transfers::{NewTransfer, Transfer},
    wallets::{Direction, WalletEntry},
};

#[derive(sqlx::FromRow)]
struct WalletEntryRow {
    id: i64,
    user_id: i64,
    direction: String,
    transfer_reference: String,
    amount: Decimal,
    closing_balance: Decimal,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<WalletEntryRow> for WalletEntry {
    type Error = RepositoryError;

    fn try_from(row: WalletEntryRow) -> Result<Self, Self::Error> {
        Ok(WalletEntry {
            id: row.id,
            user_id: row.user_id,
            direction: row.direction.parse().map_err(RepositoryError::Decode)?,
            transfer_reference: row.transfer_reference,
            amount: row.amount,
            closing_balance: row.closing_balance,
            created_at: row.created_at,
        })
    }
}

async fn latest_balance(conn: &mut PgConnection, user_id: i64) -> Result<Decimal, sqlx::Error> {
    let balance: Option<Decimal> = sqlx::query_scalar(
        "SELECT closing_balance FROM wallet_entries WHERE user_id = $1 ORDER BY id DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(balance.unwrap_or(Decimal::ZERO))
}

async fn insert_entry(
    conn: &mut PgConnection,
    user_id: i64,
    direction: Direction,
    reference: &str,
    amount: Decimal,
    closing_balance: Decimal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO wallet_entries
            (user_id, direction, transfer_reference, amount, closing_balance)
            VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(direction.as_str())
    .bind(reference)
    .bind(amount)
    .bind(closing_balance)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl LedgerRepository for PgStore {
    async fn execute_transfer(&self, transfer: NewTransfer) -> Result<Transfer, RepositoryError> {
        let mut accounts = vec![transfer.sender_id, transfer.recipient_id];
        accounts.sort_unstable();
        accounts.dedup();

        // Dropping `tx` without commit rolls everything back.
        let mut tx = self.conn.begin().await?;

        // Row locks on both owners serialize every transfer touching either
        // account. Ascending order keeps two opposite transfers from deadlocking.
        let locked: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE")
                .bind(&accounts)
                .fetch_all(&mut *tx)
                .await?;

        if let Some(missing) = accounts.iter().find(|id| !locked.contains(id)) {
            return Err(RepositoryError::NotFound(format!("user {missing}")));
        }

        let sender_balance = latest_balance(&mut tx, transfer.sender_id).await?;
        if sender_balance < transfer.amount {
            return Err(RepositoryError::InsufficientFunds {
                balance: sender_balance,
                requested: transfer.amount,
            });
        }

        let sender_closing = sender_balance - transfer.amount;
        let recipient_balance = if transfer.sender_id == transfer.recipient_id {
            sender_closing
        } else {
            latest_balance(&mut tx, transfer.recipient_id).await?
        };

        lock_sequence(&mut tx, TRANSFER_SEQUENCE_LOCK).await?;

        let created = sqlx::query_as::<_, Transfer>(
            r#"
                INSERT INTO transfers (reference, sender_id, recipient_id, amount, description)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            "#,
        )
        .bind(&transfer.reference)
        .bind(transfer.sender_id)
        .bind(transfer.recipient_id)
        .bind(transfer.amount)
        .bind(&transfer.description)
        .fetch_one(&mut *tx)
        .await?;

        insert_entry(
            &mut tx,
            created.sender_id,
            Direction::Debit,
            &created.reference,
            created.amount,
            sender_closing,
        )
        .await?;

        insert_entry(
            &mut tx,
            created.recipient_id,
            Direction::Credit,
            &created.reference,
            created.amount,
            recipient_balance + created.amount,
        )
        .await?;

        tx.commit().await?;

        Ok(created)
    }

    async fn get_balance(&self, user_id: i64) -> Result<Decimal, RepositoryError> {
        let mut conn = self.conn.acquire().await?;
        let balance = latest_balance(&mut conn, user_id).await?;

        Ok(balance)
    }

    async fn get_wallet_entries(&self, user_id: i64) -> Result<Vec<WalletEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, WalletEntryRow>(
            "SELECT * FROM wallet_entries WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        rows.into_iter().map(WalletEntry::try_from).collect()
    }
}
