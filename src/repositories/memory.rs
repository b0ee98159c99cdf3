//! In-process store with the same semantics as the Postgres schema: unique
//! usernames, referral codes, transfer references and payout batches. Every
//! operation runs under one lock, so a transfer's balance reads and its writes
//! form a single isolated unit.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{
    LedgerRepository, PayoutRepository, RepositoryError, UserRepository,
    PAYOUT_BATCH_CONSTRAINT, REFERRAL_CODE_CONSTRAINT, TRANSFER_REFERENCE_CONSTRAINT,
    USERNAME_CONSTRAINT,
};
use crate::models::{
    payouts::{ActivityType, NewPayout, Payout, PayoutStatus},
    transfers::{NewTransfer, Transfer},
    users::{NewUser, User},
    wallets::{Direction, WalletEntry},
};

pub const OPENING_BALANCE_REFERENCE: &str = "opening-balance";

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    transfers: Vec<Transfer>,
    entries: Vec<WalletEntry>,
    payouts: Vec<Payout>,
}

impl MemoryState {
    fn balance_of(&self, user_id: i64) -> Decimal {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.user_id == user_id)
            .map(|entry| entry.closing_balance)
            .unwrap_or(Decimal::ZERO)
    }

    fn push_entry(
        &mut self,
        user_id: i64,
        direction: Direction,
        reference: &str,
        amount: Decimal,
        closing_balance: Decimal,
    ) {
        let entry = WalletEntry {
            id: self.entries.len() as i64 + 1,
            user_id,
            direction,
            transfer_reference: reference.to_string(),
            amount,
            closing_balance,
            created_at: Utc::now(),
        };
        self.entries.push(entry);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test and local-run seam: credits `amount` to a user with an entry that
    /// no transfer produced. Real entries only come from `execute_transfer`,
    /// and `PgStore` has no counterpart, so this never runs against Postgres.
    pub async fn credit_opening_balance(
        &self,
        user_id: i64,
        amount: Decimal,
    ) -> Result<Decimal, RepositoryError> {
        let mut state = self.state.lock().await;
        if !state.users.iter().any(|user| user.id == user_id) {
            return Err(RepositoryError::NotFound(format!("user {user_id}")));
        }

        let closing = state.balance_of(user_id) + amount;
        state.push_entry(
            user_id,
            Direction::Credit,
            OPENING_BALANCE_REFERENCE,
            amount,
            closing,
        );

        Ok(closing)
    }

    pub async fn transfer_count(&self) -> usize {
        self.state.lock().await.transfers.len()
    }

    pub async fn entry_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;

        if state.users.iter().any(|u| u.username == user.username) {
            return Err(RepositoryError::UniqueViolation(USERNAME_CONSTRAINT.to_string()));
        }
        if state.users.iter().any(|u| u.referral_code == user.referral_code) {
            return Err(RepositoryError::UniqueViolation(
                REFERRAL_CODE_CONSTRAINT.to_string(),
            ));
        }

        let now = Utc::now();
        let created = User {
            id: state.users.len() as i64 + 1,
            username: user.username,
            password_hash: user.password_hash,
            referral_code: user.referral_code,
            referrer_code: user.referrer_code,
            created_at: now,
            updated_at: now,
        };
        state.users.push(created.clone());

        Ok(created)
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let state = self.state.lock().await;

        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let state = self.state.lock().await;

        Ok(state.users.iter().find(|u| u.referral_code == code).cloned())
    }

    async fn get_referred_users(&self, referral_code: &str) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.lock().await;

        Ok(state
            .users
            .iter()
            .filter(|u| u.referrer_code.as_deref() == Some(referral_code))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn execute_transfer(&self, transfer: NewTransfer) -> Result<Transfer, RepositoryError> {
        let mut state = self.state.lock().await;

        for id in [transfer.sender_id, transfer.recipient_id] {
            if !state.users.iter().any(|user| user.id == id) {
                return Err(RepositoryError::NotFound(format!("user {id}")));
            }
        }
        if state
            .transfers
            .iter()
            .any(|t| t.reference == transfer.reference)
        {
            return Err(RepositoryError::UniqueViolation(
                TRANSFER_REFERENCE_CONSTRAINT.to_string(),
            ));
        }

        let sender_balance = state.balance_of(transfer.sender_id);
        if sender_balance < transfer.amount {
            return Err(RepositoryError::InsufficientFunds {
                balance: sender_balance,
                requested: transfer.amount,
            });
        }

        let now = Utc::now();
        let created = Transfer {
            id: state.transfers.len() as i64 + 1,
            reference: transfer.reference,
            sender_id: transfer.sender_id,
            recipient_id: transfer.recipient_id,
            amount: transfer.amount,
            description: transfer.description,
            created_at: now,
            updated_at: now,
        };

        let sender_closing = sender_balance - created.amount;
        state.push_entry(
            created.sender_id,
            Direction::Debit,
            &created.reference,
            created.amount,
            sender_closing,
        );
        // Read after the debit so a self transfer nets out to the same balance.
        let recipient_closing = state.balance_of(created.recipient_id) + created.amount;
        state.push_entry(
            created.recipient_id,
            Direction::Credit,
            &created.reference,
            created.amount,
            recipient_closing,
        );
        state.transfers.push(created.clone());

        Ok(created)
    }

    async fn get_balance(&self, user_id: i64) -> Result<Decimal, RepositoryError> {
        Ok(self.state.lock().await.balance_of(user_id))
    }

    async fn get_wallet_entries(&self, user_id: i64) -> Result<Vec<WalletEntry>, RepositoryError> {
        let state = self.state.lock().await;

        Ok(state
            .entries
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PayoutRepository for MemoryStore {
    async fn get_last_checkpoint(
        &self,
        user_id: i64,
        activity_type: ActivityType,
    ) -> Result<i64, RepositoryError> {
        let state = self.state.lock().await;

        Ok(state
            .payouts
            .iter()
            .rev()
            .find(|p| p.user_id == user_id && p.activity_type == activity_type)
            .map(|p| p.checkpoint_id)
            .unwrap_or(0))
    }

    async fn get_signup_candidates(
        &self,
        referral_code: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.lock().await;

        Ok(state
            .users
            .iter()
            .filter(|u| u.id > after_id && u.referrer_code.as_deref() == Some(referral_code))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_transaction_candidates(
        &self,
        sender_ids: &[i64],
        min_amount: Decimal,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<Transfer>, RepositoryError> {
        let state = self.state.lock().await;

        Ok(state
            .transfers
            .iter()
            .filter(|t| t.id > after_id && t.amount > min_amount && sender_ids.contains(&t.sender_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_payout(&self, payout: NewPayout) -> Result<Option<Payout>, RepositoryError> {
        let mut state = self.state.lock().await;

        if state.payouts.iter().any(|p| {
            p.user_id == payout.user_id
                && p.activity_type == payout.activity_type
                && p.checkpoint_id == payout.checkpoint_id
        }) {
            log::debug!(
                "Skipping payout insert, {} already holds this batch.",
                PAYOUT_BATCH_CONSTRAINT
            );
            return Ok(None);
        }

        let now = Utc::now();
        let created = Payout {
            id: state.payouts.len() as i64 + 1,
            user_id: payout.user_id,
            activity_type: payout.activity_type,
            checkpoint_id: payout.checkpoint_id,
            amount: payout.amount,
            status: PayoutStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.payouts.push(created.clone());

        Ok(Some(created))
    }

    async fn get_payouts(&self, user_id: i64) -> Result<Vec<Payout>, RepositoryError> {
        let state = self.state.lock().await;

        Ok(state
            .payouts
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }
}
