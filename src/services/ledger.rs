use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};

use super::{events::ReferralEvent, RequestHandler, Service, ServiceError};
use crate::{
    models::{
        transfers::{NewTransfer, Transfer},
        wallets::Wallet,
    },
    repositories::{RepositoryError, SharedStore, TRANSFER_REFERENCE_CONSTRAINT},
    utils,
};

/// Largest number of fractional digits an amount may carry.
pub const AMOUNT_SCALE: u32 = 2;

pub enum LedgerRequest {
    Transfer {
        sender_id: i64,
        recipient_id: i64,
        amount: Decimal,
        description: String,
        response: oneshot::Sender<Result<Transfer, ServiceError>>,
    },
    GetWallet {
        user_id: i64,
        response: oneshot::Sender<Result<Wallet, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct LedgerRequestHandler {
    store: SharedStore,
    event_channel: mpsc::Sender<ReferralEvent>,
}

impl LedgerRequestHandler {
    pub fn new(store: SharedStore, event_channel: mpsc::Sender<ReferralEvent>) -> Self {
        LedgerRequestHandler {
            store,
            event_channel,
        }
    }

    pub async fn transfer(
        &self,
        sender_id: i64,
        recipient_id: i64,
        amount: Decimal,
        description: String,
    ) -> Result<Transfer, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        if amount.normalize().scale() > AMOUNT_SCALE {
            return Err(ServiceError::Validation(format!(
                "amount cannot have more than {AMOUNT_SCALE} decimal places"
            )));
        }

        for attempt in 1..=utils::MAX_CODE_ATTEMPTS {
            let result = self
                .store
                .execute_transfer(NewTransfer {
                    reference: utils::generate_transfer_reference(),
                    sender_id,
                    recipient_id,
                    amount,
                    description: description.clone(),
                })
                .await;

            match result {
                Ok(transfer) => {
                    log::info!(
                        "Transfer {} committed: {} from user {} to user {}.",
                        transfer.reference,
                        transfer.amount,
                        transfer.sender_id,
                        transfer.recipient_id
                    );
                    self.dispatch(ReferralEvent::Transfer(transfer.clone()));
                    return Ok(transfer);
                }
                Err(RepositoryError::UniqueViolation(constraint))
                    if constraint == TRANSFER_REFERENCE_CONSTRAINT =>
                {
                    log::warn!(
                        "Transfer reference collision, retrying ({attempt}/{}).",
                        utils::MAX_CODE_ATTEMPTS
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Internal(
            "could not allocate a unique transfer reference".to_string(),
        ))
    }

    pub async fn wallet(&self, user_id: i64) -> Result<Wallet, ServiceError> {
        if self.store.get_user_by_id(user_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("user {user_id}")));
        }

        let entries = self.store.get_wallet_entries(user_id).await?;
        let balance = entries
            .last()
            .map(|entry| entry.closing_balance)
            .unwrap_or(Decimal::ZERO);

        Ok(Wallet {
            user_id,
            balance,
            entries,
        })
    }

    /// Queues the event without waiting on the event service.
    fn dispatch(&self, event: ReferralEvent) {
        let event_channel = self.event_channel.clone();

        tokio::spawn(async move {
            if let Err(e) = event_channel.send(event).await {
                log::error!("Failed to queue transfer event: {}", e);
            }
        });
    }
}

#[async_trait]
impl RequestHandler<LedgerRequest> for LedgerRequestHandler {
    async fn handle_request(&self, request: LedgerRequest) {
        match request {
            LedgerRequest::Transfer {
                sender_id,
                recipient_id,
                amount,
                description,
                response,
            } => {
                let transfer = self
                    .transfer(sender_id, recipient_id, amount, description)
                    .await;
                let _ = response.send(transfer);
            }
            LedgerRequest::GetWallet { user_id, response } => {
                let wallet = self.wallet(user_id).await;
                let _ = response.send(wallet);
            }
        }
    }
}

pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        LedgerService {}
    }
}

#[async_trait]
impl Service<LedgerRequest, LedgerRequestHandler> for LedgerService {}
