use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{referrals::ReferralResolver, ServiceError};
use crate::{
    models::{
        payouts::{ActivityType, Evaluation, NewPayout, Payout, MIN_REFERRALS, REFERRAL_BONUS},
        users::User,
    },
    repositories::SharedStore,
};

type EvaluationKey = (i64, ActivityType);

/// Turns every complete batch of referred activity into one pending payout.
///
/// Qualifying entities are consumed in ascending id order, `MIN_REFERRALS` at a
/// time. The checkpoint stored on a payout is the id of the last entity of its
/// batch, and the next evaluation only looks past it, so batches never overlap
/// and an entity is never rewarded twice.
///
/// Evaluations of the same `(user, activity)` pair take a per-key lock, which
/// stops two concurrent events from both reading the same checkpoint and both
/// paying out the same batch. The store's unique batch constraint covers the
/// case of several processes sharing one database.
#[derive(Clone)]
pub struct PayoutEngine {
    store: SharedStore,
    resolver: ReferralResolver,
    min_amount_for_referral: Decimal,
    locks: Arc<DashMap<EvaluationKey, Arc<Mutex<()>>>>,
}

impl PayoutEngine {
    pub fn new(
        store: SharedStore,
        resolver: ReferralResolver,
        min_amount_for_referral: Decimal,
    ) -> Self {
        PayoutEngine {
            store,
            resolver,
            min_amount_for_referral,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub async fn evaluate(
        &self,
        referrer: &User,
        activity_type: ActivityType,
    ) -> Result<Evaluation, ServiceError> {
        if referrer.referral_code.is_empty() {
            return Ok(Evaluation::skipped());
        }

        let lock = self
            .locks
            .entry((referrer.id, activity_type))
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let last_checkpoint = self
            .store
            .get_last_checkpoint(referrer.id, activity_type)
            .await?;
        let candidates = self
            .candidates(referrer, activity_type, last_checkpoint)
            .await?;

        log::debug!(
            "Evaluating {} payout for user {}: checkpoint {}, candidates {:?}",
            activity_type,
            referrer.id,
            last_checkpoint,
            candidates
        );

        if candidates.len() < MIN_REFERRALS {
            return Ok(Evaluation::skipped());
        }

        let checkpoint_id = candidates[MIN_REFERRALS - 1];
        let inserted = self
            .store
            .insert_payout(NewPayout {
                user_id: referrer.id,
                activity_type,
                checkpoint_id,
                amount: Decimal::from(REFERRAL_BONUS),
            })
            .await?;

        match inserted {
            Some(payout) => {
                log::info!(
                    "Payout due: user {} ({}) earned {} for {} up to checkpoint {}.",
                    referrer.id,
                    referrer.username,
                    payout.amount,
                    activity_type,
                    checkpoint_id
                );
                Ok(Evaluation::triggered(payout))
            }
            None => {
                log::warn!(
                    "Batch ending at {} was already paid to user {} for {}.",
                    checkpoint_id,
                    referrer.id,
                    activity_type
                );
                Ok(Evaluation::skipped())
            }
        }
    }

    pub async fn payouts_for(&self, user_id: i64) -> Result<Vec<Payout>, ServiceError> {
        Ok(self.store.get_payouts(user_id).await?)
    }

    /// Ids of the next qualifying entities past `after_id`, ascending, at most
    /// `MIN_REFERRALS` of them.
    async fn candidates(
        &self,
        referrer: &User,
        activity_type: ActivityType,
        after_id: i64,
    ) -> Result<Vec<i64>, ServiceError> {
        let ids = match activity_type {
            ActivityType::Signups => self
                .store
                .get_signup_candidates(&referrer.referral_code, after_id, MIN_REFERRALS)
                .await?
                .iter()
                .map(|user| user.id)
                .collect(),
            ActivityType::Transactions => {
                let senders: Vec<i64> = self
                    .resolver
                    .referred_users(&referrer.referral_code)
                    .await?
                    .iter()
                    .map(|user| user.id)
                    .collect();

                self.store
                    .get_transaction_candidates(
                        &senders,
                        self.min_amount_for_referral,
                        after_id,
                        MIN_REFERRALS,
                    )
                    .await?
                    .iter()
                    .map(|transfer| transfer.id)
                    .collect()
            }
        };

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::{
        models::{payouts::PayoutStatus, transfers::NewTransfer, users::NewUser},
        repositories::{memory::MemoryStore, LedgerRepository, PayoutRepository, UserRepository},
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: PayoutEngine,
        referrer: User,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let resolver = ReferralResolver::new(store.clone());
            let engine = PayoutEngine::new(store.clone(), resolver, dec!(200));
            let referrer = store
                .insert_user(new_user("referrer", "REF001", None))
                .await
                .unwrap();

            Fixture {
                store,
                engine,
                referrer,
            }
        }

        async fn signup(&self, name: &str, referrer_code: Option<&str>) -> User {
            let code = format!("C{name}");
            self.store
                .insert_user(new_user(name, &code, referrer_code))
                .await
                .unwrap()
        }

        async fn referred_signup(&self, name: &str) -> User {
            let code = self.referrer.referral_code.clone();
            self.signup(name, Some(code.as_str())).await
        }

        async fn transfer(&self, sender: &User, recipient: &User, amount: Decimal) -> i64 {
            self.store
                .execute_transfer(NewTransfer {
                    reference: crate::utils::generate_transfer_reference(),
                    sender_id: sender.id,
                    recipient_id: recipient.id,
                    amount,
                    description: String::new(),
                })
                .await
                .unwrap()
                .id
        }

        async fn evaluate(&self, activity_type: ActivityType) -> Evaluation {
            self.engine
                .evaluate(&self.referrer, activity_type)
                .await
                .unwrap()
        }

        async fn payout_count(&self) -> usize {
            self.store.get_payouts(self.referrer.id).await.unwrap().len()
        }
    }

    fn new_user(name: &str, code: &str, referrer_code: Option<&str>) -> NewUser {
        NewUser {
            username: name.to_string(),
            password_hash: "hash".to_string(),
            referral_code: code.to_string(),
            referrer_code: referrer_code.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn three_signups_trigger_one_pending_bonus() {
        let fx = Fixture::new().await;
        fx.referred_signup("a").await;
        fx.referred_signup("b").await;
        let third = fx.referred_signup("c").await;

        let evaluation = fx.evaluate(ActivityType::Signups).await;

        assert!(evaluation.triggered);
        let payout = evaluation.payout.unwrap();
        assert_eq!(payout.user_id, fx.referrer.id);
        assert_eq!(payout.amount, dec!(50));
        assert_eq!(payout.status, PayoutStatus::Pending);
        assert_eq!(payout.activity_type, ActivityType::Signups);
        assert_eq!(payout.checkpoint_id, third.id);
    }

    #[tokio::test]
    async fn partial_batch_writes_nothing() {
        let fx = Fixture::new().await;
        fx.referred_signup("a").await;
        assert!(!fx.evaluate(ActivityType::Signups).await.triggered);

        fx.referred_signup("b").await;
        let evaluation = fx.evaluate(ActivityType::Signups).await;

        assert!(!evaluation.triggered);
        assert!(evaluation.payout.is_none());
        assert_eq!(fx.payout_count().await, 0);
    }

    #[tokio::test]
    async fn signups_of_other_referrers_do_not_count() {
        let fx = Fixture::new().await;
        fx.signup("x", None).await;
        fx.signup("y", Some("OTHER1")).await;
        fx.referred_signup("a").await;
        fx.referred_signup("b").await;

        assert!(!fx.evaluate(ActivityType::Signups).await.triggered);
    }

    #[tokio::test]
    async fn batches_never_overlap() {
        let fx = Fixture::new().await;
        for name in ["a", "b", "c"] {
            fx.referred_signup(name).await;
        }
        let first = fx.evaluate(ActivityType::Signups).await;
        assert!(first.triggered);

        fx.referred_signup("d").await;
        assert!(!fx.evaluate(ActivityType::Signups).await.triggered);
        fx.referred_signup("e").await;
        assert!(!fx.evaluate(ActivityType::Signups).await.triggered);

        let sixth = fx.referred_signup("f").await;
        let second = fx.evaluate(ActivityType::Signups).await;

        assert!(second.triggered);
        assert_eq!(second.payout.unwrap().checkpoint_id, sixth.id);
        assert_eq!(fx.payout_count().await, 2);
    }

    #[tokio::test]
    async fn re_evaluation_without_new_activity_is_idempotent() {
        let fx = Fixture::new().await;
        for name in ["a", "b", "c"] {
            fx.referred_signup(name).await;
        }

        assert!(fx.evaluate(ActivityType::Signups).await.triggered);
        for _ in 0..5 {
            assert!(!fx.evaluate(ActivityType::Signups).await.triggered);
        }
        assert_eq!(fx.payout_count().await, 1);
    }

    #[tokio::test]
    async fn late_evaluation_rewards_one_batch_at_a_time() {
        let fx = Fixture::new().await;
        let mut users = Vec::new();
        for name in ["a", "b", "c", "d", "e", "f", "g"] {
            users.push(fx.referred_signup(name).await);
        }

        let first = fx.evaluate(ActivityType::Signups).await.payout.unwrap();
        let second = fx.evaluate(ActivityType::Signups).await.payout.unwrap();
        let third = fx.evaluate(ActivityType::Signups).await;

        assert_eq!(first.checkpoint_id, users[2].id);
        assert_eq!(second.checkpoint_id, users[5].id);
        assert!(!third.triggered);
    }

    #[tokio::test]
    async fn transfers_at_or_below_threshold_never_count() {
        let fx = Fixture::new().await;
        let friend = fx.referred_signup("friend").await;
        let shop = fx.signup("shop", None).await;
        fx.store
            .credit_opening_balance(friend.id, dec!(10000))
            .await
            .unwrap();

        for _ in 0..5 {
            fx.transfer(&friend, &shop, dec!(200)).await;
            fx.transfer(&friend, &shop, dec!(15)).await;
        }

        assert!(!fx.evaluate(ActivityType::Transactions).await.triggered);
        assert_eq!(fx.payout_count().await, 0);
    }

    #[tokio::test]
    async fn above_threshold_transfers_by_referred_users_trigger_a_bonus() {
        let fx = Fixture::new().await;
        let friend = fx.referred_signup("friend").await;
        let other = fx.referred_signup("other").await;
        let stranger = fx.signup("stranger", None).await;
        for user in [&friend, &other, &stranger] {
            fx.store
                .credit_opening_balance(user.id, dec!(5000))
                .await
                .unwrap();
        }

        fx.transfer(&stranger, &friend, dec!(900)).await;
        fx.transfer(&friend, &stranger, dec!(200.01)).await;
        fx.transfer(&friend, &stranger, dec!(50)).await;
        fx.transfer(&other, &stranger, dec!(300)).await;
        assert!(!fx.evaluate(ActivityType::Transactions).await.triggered);

        let third = fx.transfer(&other, &friend, dec!(201)).await;
        let evaluation = fx.evaluate(ActivityType::Transactions).await;

        assert!(evaluation.triggered);
        let payout = evaluation.payout.unwrap();
        assert_eq!(payout.activity_type, ActivityType::Transactions);
        assert_eq!(payout.checkpoint_id, third);
    }

    #[tokio::test]
    async fn signup_and_transaction_checkpoints_are_independent() {
        let fx = Fixture::new().await;
        let a = fx.referred_signup("a").await;
        let b = fx.referred_signup("b").await;
        fx.referred_signup("c").await;
        fx.store.credit_opening_balance(a.id, dec!(1000)).await.unwrap();
        for _ in 0..3 {
            fx.transfer(&a, &b, dec!(250)).await;
        }

        assert!(fx.evaluate(ActivityType::Signups).await.triggered);
        assert!(fx.evaluate(ActivityType::Transactions).await.triggered);
        assert!(!fx.evaluate(ActivityType::Signups).await.triggered);
        assert!(!fx.evaluate(ActivityType::Transactions).await.triggered);
        assert_eq!(fx.payout_count().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_evaluations_pay_a_batch_once() {
        let fx = Fixture::new().await;
        for name in ["a", "b", "c"] {
            fx.referred_signup(name).await;
        }

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let engine = fx.engine.clone();
            let referrer = fx.referrer.clone();
            tasks.push(tokio::spawn(async move {
                engine
                    .evaluate(&referrer, ActivityType::Signups)
                    .await
                    .unwrap()
                    .triggered
            }));
        }

        let mut triggered = 0;
        for task in tasks {
            if task.await.unwrap() {
                triggered += 1;
            }
        }

        assert_eq!(triggered, 1);
        assert_eq!(fx.payout_count().await, 1);
    }
}
