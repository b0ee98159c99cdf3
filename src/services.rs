use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::repositories::{RepositoryError, SharedStore};
use crate::settings::Settings;

pub mod events;
pub mod http;
pub mod ledger;
pub mod payouts;
pub mod referrals;
pub mod users;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => ServiceError::NotFound(what),
            RepositoryError::InsufficientFunds { balance, requested } => {
                ServiceError::InsufficientFunds { balance, requested }
            }
            RepositoryError::UniqueViolation(constraint) => ServiceError::Conflict(constraint),
            other => ServiceError::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    /// Pulls requests until every sender is dropped. Each request is handled
    /// on its own task, so a slow request never holds up the queue.
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Senders into the running services, handed to the HTTP layer.
#[derive(Clone)]
pub struct ServiceChannels {
    pub user_channel: mpsc::Sender<users::UserRequest>,
    pub ledger_channel: mpsc::Sender<ledger::LedgerRequest>,
}

/// Spawns the event, user and ledger services on the current runtime.
pub fn spawn_services(store: SharedStore, settings: &Settings) -> ServiceChannels {
    let queue_size = settings.events.queue_size;
    let (event_tx, mut event_rx) = mpsc::channel(queue_size);
    let (user_tx, mut user_rx) = mpsc::channel(queue_size);
    let (ledger_tx, mut ledger_rx) = mpsc::channel(queue_size);

    let resolver = referrals::ReferralResolver::new(store.clone());
    let engine = payouts::PayoutEngine::new(
        store.clone(),
        resolver.clone(),
        settings.rewards.min_amount_for_referral,
    );

    log::info!("Starting event service.");
    let mut event_service = events::EventService::new();
    let event_handler = events::EventRequestHandler::new(resolver.clone(), engine.clone());
    tokio::spawn(async move {
        event_service.run(event_handler, &mut event_rx).await;
    });

    log::info!("Starting user service.");
    let mut user_service = users::UserService::new();
    let user_handler = users::UserRequestHandler::new(
        store.clone(),
        resolver,
        engine,
        settings.security.bcrypt_cost,
        event_tx.clone(),
    );
    tokio::spawn(async move {
        user_service.run(user_handler, &mut user_rx).await;
    });

    log::info!("Starting ledger service.");
    let mut ledger_service = ledger::LedgerService::new();
    let ledger_handler = ledger::LedgerRequestHandler::new(store, event_tx);
    tokio::spawn(async move {
        ledger_service.run(ledger_handler, &mut ledger_rx).await;
    });

    ServiceChannels {
        user_channel: user_tx,
        ledger_channel: ledger_tx,
    }
}

pub async fn start_services(store: SharedStore, settings: Settings) -> Result<(), anyhow::Error> {
    let channels = spawn_services(store, &settings);

    log::info!("Starting HTTP server.");
    http::start_http_server(&settings.server.listen, channels).await
}
