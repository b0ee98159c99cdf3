use async_trait::async_trait;

use super::{
    payouts::PayoutEngine, referrals::ReferralResolver, RequestHandler, Service, ServiceError,
};
use crate::models::{
    payouts::{ActivityType, Evaluation},
    transfers::Transfer,
    users::User,
};

/// Activity that may complete a referrer's batch. Queued after the triggering
/// write has committed.
#[derive(Clone, Debug)]
pub enum ReferralEvent {
    Signup(User),
    Transfer(Transfer),
}

#[derive(Clone)]
pub struct EventRequestHandler {
    resolver: ReferralResolver,
    engine: PayoutEngine,
}

impl EventRequestHandler {
    pub fn new(resolver: ReferralResolver, engine: PayoutEngine) -> Self {
        EventRequestHandler { resolver, engine }
    }

    /// `Ok(None)` when the acting user has no referrer.
    pub async fn process(&self, event: ReferralEvent) -> Result<Option<Evaluation>, ServiceError> {
        let (referrer, activity_type) = match event {
            ReferralEvent::Signup(user) => {
                (self.resolver.referrer_of(&user).await?, ActivityType::Signups)
            }
            ReferralEvent::Transfer(transfer) => (
                self.resolver.referrer_of_user(transfer.sender_id).await?,
                ActivityType::Transactions,
            ),
        };

        let Some(referrer) = referrer else {
            return Ok(None);
        };

        let evaluation = self.engine.evaluate(&referrer, activity_type).await?;
        Ok(Some(evaluation))
    }
}

#[async_trait]
impl RequestHandler<ReferralEvent> for EventRequestHandler {
    /// Best effort: failures are logged and dropped, never retried.
    async fn handle_request(&self, event: ReferralEvent) {
        match self.process(event).await {
            Ok(Some(evaluation)) if evaluation.triggered => {
                if let Some(payout) = evaluation.payout {
                    log::info!("Recorded pending payout: {:?}", payout);
                }
            }
            Ok(_) => {}
            Err(ServiceError::NotFound(what)) => {
                log::debug!("Nothing to evaluate, {} does not exist.", what);
            }
            Err(e) => {
                log::error!("Failed to evaluate referral event: {}", e);
            }
        }
    }
}

pub struct EventService;

impl EventService {
    pub fn new() -> Self {
        EventService {}
    }
}

#[async_trait]
impl Service<ReferralEvent, EventRequestHandler> for EventService {}
