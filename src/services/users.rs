use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::{
    events::ReferralEvent, payouts::PayoutEngine, referrals::ReferralResolver, RequestHandler,
    Service, ServiceError,
};
use crate::{
    models::{
        payouts::Payout,
        users::{NewUser, User, UserDetails},
    },
    repositories::{RepositoryError, SharedStore, REFERRAL_CODE_CONSTRAINT, USERNAME_CONSTRAINT},
    utils,
};

pub enum UserRequest {
    CreateUser {
        username: String,
        password: String,
        referrer_code: Option<String>,
        response: oneshot::Sender<Result<User, ServiceError>>,
    },
    GetUserDetails {
        id: i64,
        response: oneshot::Sender<Result<UserDetails, ServiceError>>,
    },
    GetReferrals {
        referral_code: String,
        response: oneshot::Sender<Result<(User, Vec<User>), ServiceError>>,
    },
    GetPayouts {
        id: i64,
        response: oneshot::Sender<Result<Vec<Payout>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    store: SharedStore,
    resolver: ReferralResolver,
    engine: PayoutEngine,
    bcrypt_cost: u32,
    event_channel: mpsc::Sender<ReferralEvent>,
}

impl UserRequestHandler {
    pub fn new(
        store: SharedStore,
        resolver: ReferralResolver,
        engine: PayoutEngine,
        bcrypt_cost: u32,
        event_channel: mpsc::Sender<ReferralEvent>,
    ) -> Self {
        UserRequestHandler {
            store,
            resolver,
            engine,
            bcrypt_cost,
            event_channel,
        }
    }

    pub async fn create_user(
        &self,
        username: String,
        password: String,
        referrer_code: Option<String>,
    ) -> Result<User, ServiceError> {
        let username = username.trim().to_string();
        if username.is_empty() || password.is_empty() {
            return Err(ServiceError::Validation(
                "username and/or password cannot be blank".to_string(),
            ));
        }

        let referrer_code = referrer_code
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty());
        let password_hash = self.hash_password(password).await?;

        for attempt in 1..=utils::MAX_CODE_ATTEMPTS {
            let result = self
                .store
                .insert_user(NewUser {
                    username: username.clone(),
                    password_hash: password_hash.clone(),
                    referral_code: utils::generate_referral_code(),
                    referrer_code: referrer_code.clone(),
                })
                .await;

            match result {
                Ok(user) => {
                    log::info!(
                        "Created user {} ({}) with referral code {}.",
                        user.id,
                        user.username,
                        user.referral_code
                    );
                    self.dispatch(ReferralEvent::Signup(user.clone()));
                    return Ok(user);
                }
                Err(RepositoryError::UniqueViolation(constraint))
                    if constraint == REFERRAL_CODE_CONSTRAINT =>
                {
                    log::warn!(
                        "Referral code collision, retrying ({attempt}/{}).",
                        utils::MAX_CODE_ATTEMPTS
                    );
                }
                Err(RepositoryError::UniqueViolation(constraint))
                    if constraint == USERNAME_CONSTRAINT =>
                {
                    return Err(ServiceError::Conflict(format!(
                        "username {username} is already taken"
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Internal(
            "could not allocate a unique referral code".to_string(),
        ))
    }

    pub async fn get_user_details(&self, id: i64) -> Result<UserDetails, ServiceError> {
        let user = self.resolver.user_by_id(id).await?;
        // A dangling referrer code is shown as no referrer.
        let referrer = match self.resolver.referrer_of(&user).await {
            Ok(referrer) => referrer,
            Err(ServiceError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(UserDetails { user, referrer })
    }

    pub async fn get_referrals(
        &self,
        referral_code: &str,
    ) -> Result<(User, Vec<User>), ServiceError> {
        let owner = self.resolver.user_by_referral_code(referral_code).await?;
        let referred = self.resolver.referred_users(&owner.referral_code).await?;

        Ok((owner, referred))
    }

    pub async fn get_payouts(&self, id: i64) -> Result<Vec<Payout>, ServiceError> {
        let user = self.resolver.user_by_id(id).await?;

        self.engine.payouts_for(user.id).await
    }

    async fn hash_password(&self, password: String) -> Result<String, ServiceError> {
        let cost = self.bcrypt_cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .map_err(|e| ServiceError::Internal(format!("Could not hash password: {e}")))
    }

    /// Queues the event without waiting on the event service.
    fn dispatch(&self, event: ReferralEvent) {
        let event_channel = self.event_channel.clone();

        tokio::spawn(async move {
            if let Err(e) = event_channel.send(event).await {
                log::error!("Failed to queue signup event: {}", e);
            }
        });
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::CreateUser {
                username,
                password,
                referrer_code,
                response,
            } => {
                let user = self.create_user(username, password, referrer_code).await;
                let _ = response.send(user);
            }
            UserRequest::GetUserDetails { id, response } => {
                let details = self.get_user_details(id).await;
                let _ = response.send(details);
            }
            UserRequest::GetReferrals {
                referral_code,
                response,
            } => {
                let referrals = self.get_referrals(&referral_code).await;
                let _ = response.send(referrals);
            }
            UserRequest::GetPayouts { id, response } => {
                let payouts = self.get_payouts(id).await;
                let _ = response.send(payouts);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
