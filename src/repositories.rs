use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{
    payouts::{ActivityType, NewPayout, Payout},
    transfers::{NewTransfer, Transfer},
    users::{NewUser, User},
    wallets::WalletEntry,
};

mod ledger;
pub mod memory;
mod payouts;
pub mod postgres;
mod users;

pub const USERNAME_CONSTRAINT: &str = "users_username_key";
pub const REFERRAL_CODE_CONSTRAINT: &str = "users_referral_code_key";
pub const TRANSFER_REFERENCE_CONSTRAINT: &str = "transfers_reference_key";
pub const PAYOUT_BATCH_CONSTRAINT: &str = "payouts_batch_key";

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("Could not decode row: {0}")]
    Decode(String),
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or_default().to_string();
                return RepositoryError::UniqueViolation(constraint);
            }
        }

        RepositoryError::Database(err)
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError>;

    async fn get_user_by_referral_code(&self, code: &str)
        -> Result<Option<User>, RepositoryError>;

    /// Users whose referrer code equals `referral_code`, ascending by id.
    async fn get_referred_users(&self, referral_code: &str) -> Result<Vec<User>, RepositoryError>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Reads both balances, checks the sender can cover `amount` and writes the
    /// transfer row plus its debit and credit entries as one isolated unit.
    /// Nothing is written when any step fails.
    async fn execute_transfer(&self, transfer: NewTransfer) -> Result<Transfer, RepositoryError>;

    async fn get_balance(&self, user_id: i64) -> Result<Decimal, RepositoryError>;

    async fn get_wallet_entries(&self, user_id: i64) -> Result<Vec<WalletEntry>, RepositoryError>;
}

#[async_trait]
pub trait PayoutRepository: Send + Sync {
    /// Checkpoint of the newest payout for the pair, `0` when none exists.
    async fn get_last_checkpoint(
        &self,
        user_id: i64,
        activity_type: ActivityType,
    ) -> Result<i64, RepositoryError>;

    async fn get_signup_candidates(
        &self,
        referral_code: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<User>, RepositoryError>;

    async fn get_transaction_candidates(
        &self,
        sender_ids: &[i64],
        min_amount: Decimal,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<Transfer>, RepositoryError>;

    /// Returns `None` when a payout for the same batch already exists.
    async fn insert_payout(&self, payout: NewPayout) -> Result<Option<Payout>, RepositoryError>;

    async fn get_payouts(&self, user_id: i64) -> Result<Vec<Payout>, RepositoryError>;
}

pub trait Store: UserRepository + LedgerRepository + PayoutRepository {}

impl<T> Store for T where T: UserRepository + LedgerRepository + PayoutRepository {}

pub type SharedStore = Arc<dyn Store>;
