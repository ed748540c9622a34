use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    data_formats::SubscriptionUpdateRequest,
    db_helpers::{Store, StoreResult},
    errors::RequestError,
    models::Role,
    payment::PaymentProvider,
};

/// Spawn the subscription expiry sweeper.
///
/// Every `interval` it demotes users whose premium term has lapsed. Errors
/// are logged and the next tick tries again.
pub fn start(
    store: Arc<dyn Store>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_loop(store, interval, cancel).await;
    })
}

async fn run_loop(store: Arc<dyn Store>, interval: Duration, cancel: CancellationToken) {
    tracing::info!("Subscription sweeper started (interval={:?})", interval);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = cancel.cancelled() => {
                tracing::info!("Subscription sweeper shutting down");
                return;
            }
        }

        if let Err(e) = sweep_once(store.as_ref(), Utc::now()).await {
            tracing::error!("Subscription sweep error: {:#}", e);
        }
    }
}

/// Run a single sweep against `now`. Returns how many users were demoted.
pub async fn sweep_once(store: &dyn Store, now: DateTime<Utc>) -> StoreResult<u64> {
    let demoted = store.demote_expired_premium(now).await?;
    if demoted > 0 {
        tracing::info!("Updated {} users to role \"user\"", demoted);
    }
    Ok(demoted)
}

/// Checks a premium grant made by the user themselves. Only `premium` may be
/// set, with an expiry no further than `max_term` from `now`, and it must be
/// backed by a paid intent that has not been redeemed before.
#[tracing::instrument(skip(store, payments, update, max_term, now))]
pub async fn redeem_purchase(
    store: &dyn Store,
    payments: &dyn PaymentProvider,
    user_id: i64,
    update: &SubscriptionUpdateRequest,
    max_term: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<(), RequestError> {
    if matches!(update.role, Some(role) if role != Role::Premium) {
        return Err(RequestError::Forbidden("forbidden access"));
    }
    let Some(expiry) = update.premium_taken else {
        return Err(RequestError::Validation(
            "premiumTaken is required when granting premium",
        ));
    };
    if expiry > now + max_term {
        return Err(RequestError::Validation(
            "premiumTaken is beyond the purchased term",
        ));
    }
    let Some(intent_id) = update.payment_intent_id.as_deref() else {
        return Err(RequestError::Forbidden("A completed payment is required"));
    };

    let paid = payments.payment_succeeded(intent_id).await.map_err(|e| {
        tracing::error!("Could not confirm payment {}: {:#}", intent_id, e);
        RequestError::ServerError
    })?;
    if !paid {
        return Err(RequestError::Forbidden("Payment has not been completed"));
    }
    if !store.redeem_payment(intent_id, user_id).await? {
        return Err(RequestError::Forbidden("Payment has already been redeemed"));
    }
    tracing::info!("Premium purchased until {}", expiry);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use crate::{
        data_formats::{
            CreateArticleRequest, CreatePublisherRequest, CreateUserRequest,
            ProfileUpdateRequest, WriteResult,
        },
        db_helpers::{ArticleContent, ArticleFilter, MemoryStore, StoreError},
        models::{Article, Publisher, User},
    };

    /// Wraps a `MemoryStore` whose first `failures` sweeps hit a database
    /// error.
    struct FlakySweepStore {
        inner: MemoryStore,
        failures: AtomicUsize,
        sweeps: AtomicUsize,
    }

    #[async_trait]
    impl Store for FlakySweepStore {
        async fn demote_expired_premium(&self, now: DateTime<Utc>) -> StoreResult<u64> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.demote_expired_premium(now).await
        }

        async fn list_users(&self) -> StoreResult<Vec<User>> {
            self.inner.list_users().await
        }
        async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
            self.inner.get_user_by_email(email).await
        }
        async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
            self.inner.get_user_by_id(id).await
        }
        async fn insert_user(&self, user: &CreateUserRequest) -> StoreResult<Option<i64>> {
            self.inner.insert_user(user).await
        }
        async fn update_profile(
            &self,
            email: &str,
            update: &ProfileUpdateRequest,
        ) -> StoreResult<WriteResult> {
            self.inner.update_profile(email, update).await
        }
        async fn update_subscription(
            &self,
            id: i64,
            update: &SubscriptionUpdateRequest,
        ) -> StoreResult<WriteResult> {
            self.inner.update_subscription(id, update).await
        }
        async fn set_role(&self, id: i64, role: Role) -> StoreResult<WriteResult> {
            self.inner.set_role(id, role).await
        }
        async fn delete_user(&self, id: i64) -> StoreResult<u64> {
            self.inner.delete_user(id).await
        }
        async fn redeem_payment(&self, intent_id: &str, user_id: i64) -> StoreResult<bool> {
            self.inner.redeem_payment(intent_id, user_id).await
        }
        async fn list_articles(&self, filter: &ArticleFilter) -> StoreResult<Vec<Article>> {
            self.inner.list_articles(filter).await
        }
        async fn get_article(&self, id: i64) -> StoreResult<Option<Article>> {
            self.inner.get_article(id).await
        }
        async fn record_article_view(&self, id: i64) -> StoreResult<Option<Article>> {
            self.inner.record_article_view(id).await
        }
        async fn count_articles_by_author(&self, email: &str) -> StoreResult<i64> {
            self.inner.count_articles_by_author(email).await
        }
        async fn insert_article(&self, article: &CreateArticleRequest) -> StoreResult<i64> {
            self.inner.insert_article(article).await
        }
        async fn approve_article(&self, id: i64) -> StoreResult<WriteResult> {
            self.inner.approve_article(id).await
        }
        async fn decline_article(
            &self,
            id: i64,
            reason: Option<&str>,
        ) -> StoreResult<WriteResult> {
            self.inner.decline_article(id, reason).await
        }
        async fn update_article_content(
            &self,
            id: i64,
            content: &ArticleContent,
        ) -> StoreResult<WriteResult> {
            self.inner.update_article_content(id, content).await
        }
        async fn mark_article_premium(&self, id: i64) -> StoreResult<WriteResult> {
            self.inner.mark_article_premium(id).await
        }
        async fn delete_article(&self, id: i64) -> StoreResult<u64> {
            self.inner.delete_article(id).await
        }
        async fn list_publishers(&self) -> StoreResult<Vec<Publisher>> {
            self.inner.list_publishers().await
        }
        async fn get_publisher_by_name(&self, name: &str) -> StoreResult<Option<Publisher>> {
            self.inner.get_publisher_by_name(name).await
        }
        async fn insert_publisher(&self, publisher: &CreatePublisherRequest) -> StoreResult<i64> {
            self.inner.insert_publisher(publisher).await
        }
    }

    /// Reports the listed intents as paid.
    struct PaidIntents(&'static [&'static str]);

    #[async_trait]
    impl PaymentProvider for PaidIntents {
        async fn create_payment_intent(&self, amount: i64) -> anyhow::Result<String> {
            Ok(format!("pi_{}_secret", amount))
        }

        async fn payment_succeeded(&self, intent_id: &str) -> anyhow::Result<bool> {
            Ok(self.0.contains(&intent_id))
        }
    }

    fn premium_user(email: &str, premium_taken: Option<DateTime<Utc>>) -> User {
        User {
            id: 0,
            email: email.to_string(),
            name: None,
            photo: None,
            phone: None,
            address: None,
            role: Role::Premium,
            premium_taken,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sweep_demotes_only_lapsed_terms() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let expired = store
            .put_user(premium_user("old@x.com", Some(now - ChronoDuration::days(1))))
            .await;
        let boundary = store.put_user(premium_user("edge@x.com", Some(now))).await;
        let active = store
            .put_user(premium_user("new@x.com", Some(now + ChronoDuration::days(1))))
            .await;

        assert_eq!(sweep_once(&store, now).await.unwrap(), 2);

        for id in [expired, boundary] {
            let user = store.get_user_by_id(id).await.unwrap().unwrap();
            assert_eq!(user.role, Role::User);
            assert!(user.premium_taken.is_none());
        }
        let user = store.get_user_by_id(active).await.unwrap().unwrap();
        assert_eq!(user.role, Role::Premium);
        assert!(user.premium_taken.is_some());

        // Already demoted users no longer match.
        assert_eq!(sweep_once(&store, now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweeper_runs_on_schedule_and_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let id = store
            .put_user(premium_user(
                "old@x.com",
                Some(Utc::now() - ChronoDuration::days(1)),
            ))
            .await;

        let cancel = CancellationToken::new();
        let handle = start(store.clone(), Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();

        let user = store.get_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.role, Role::User);
    }

    #[tokio::test]
    async fn sweeper_keeps_running_after_a_failed_sweep() {
        let store = Arc::new(FlakySweepStore {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(1),
            sweeps: AtomicUsize::new(0),
        });
        let id = store
            .inner
            .put_user(premium_user(
                "old@x.com",
                Some(Utc::now() - ChronoDuration::days(1)),
            ))
            .await;

        let cancel = CancellationToken::new();
        let handle = start(store.clone(), Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!handle.is_finished());
        assert!(store.sweeps.load(Ordering::SeqCst) >= 2);
        let user = store.inner.get_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.role, Role::User);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    fn purchase(expiry: DateTime<Utc>, intent: Option<&str>) -> SubscriptionUpdateRequest {
        SubscriptionUpdateRequest {
            role: Some(Role::Premium),
            premium_taken: Some(expiry),
            payment_intent_id: intent.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn purchases_need_a_paid_unredeemed_intent() {
        let store = MemoryStore::new();
        let payments = PaidIntents(&["pi_paid"]);
        let now = Utc::now();
        let term = ChronoDuration::days(30);
        let expiry = now + ChronoDuration::days(10);

        let unpaid = purchase(expiry, None);
        let result = redeem_purchase(&store, &payments, 1, &unpaid, term, now).await;
        assert!(matches!(result, Err(RequestError::Forbidden(_))));

        let pending = purchase(expiry, Some("pi_pending"));
        let result = redeem_purchase(&store, &payments, 1, &pending, term, now).await;
        assert!(matches!(result, Err(RequestError::Forbidden(_))));

        let paid = purchase(expiry, Some("pi_paid"));
        redeem_purchase(&store, &payments, 1, &paid, term, now)
            .await
            .unwrap();

        // The same intent cannot pay twice.
        let again = redeem_purchase(&store, &payments, 1, &paid, term, now).await;
        assert!(matches!(again, Err(RequestError::Forbidden(_))));
    }

    #[tokio::test]
    async fn purchases_are_limited_to_premium_within_the_term() {
        let store = MemoryStore::new();
        let payments = PaidIntents(&["pi_paid"]);
        let now = Utc::now();
        let term = ChronoDuration::days(30);

        let too_long = purchase(now + ChronoDuration::days(31), Some("pi_paid"));
        let result = redeem_purchase(&store, &payments, 1, &too_long, term, now).await;
        assert!(matches!(result, Err(RequestError::Validation(_))));

        let admin = SubscriptionUpdateRequest {
            role: Some(Role::Admin),
            ..purchase(now + ChronoDuration::days(1), Some("pi_paid"))
        };
        let result = redeem_purchase(&store, &payments, 1, &admin, term, now).await;
        assert!(matches!(result, Err(RequestError::Forbidden(_))));

        // Rejected attempts leave the intent redeemable.
        assert!(store.redeem_payment("pi_paid", 1).await.unwrap());
    }
}
