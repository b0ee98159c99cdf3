use super::ServiceError;
use crate::{models::users::User, repositories::SharedStore};

/// Walks the referral graph one hop at a time. The graph is assumed acyclic;
/// nothing here checks it.
#[derive(Clone)]
pub struct ReferralResolver {
    store: SharedStore,
}

impl ReferralResolver {
    pub fn new(store: SharedStore) -> Self {
        ReferralResolver { store }
    }

    /// `Ok(None)` when the user signed up without a referrer code,
    /// `NotFound` when the code they gave belongs to nobody.
    pub async fn referrer_of(&self, user: &User) -> Result<Option<User>, ServiceError> {
        let Some(code) = user.referrer_code() else {
            return Ok(None);
        };

        self.store
            .get_user_by_referral_code(code)
            .await?
            .map(Some)
            .ok_or_else(|| ServiceError::NotFound(format!("referrer with code {code}")))
    }

    pub async fn referrer_of_user(&self, user_id: i64) -> Result<Option<User>, ServiceError> {
        let user = self.user_by_id(user_id).await?;

        self.referrer_of(&user).await
    }

    pub async fn referred_users(&self, referral_code: &str) -> Result<Vec<User>, ServiceError> {
        if referral_code.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self.store.get_referred_users(referral_code).await?)
    }

    pub async fn user_by_referral_code(&self, code: &str) -> Result<User, ServiceError> {
        self.store
            .get_user_by_referral_code(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user with referral code {code}")))
    }

    pub async fn user_by_id(&self, user_id: i64) -> Result<User, ServiceError> {
        self.store
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user {user_id}")))
    }
}
