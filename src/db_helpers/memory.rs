//! In-memory store used by tests and local experiments.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    data_formats::{
        CreateArticleRequest, CreatePublisherRequest, CreateUserRequest, ProfileUpdateRequest,
        SubscriptionUpdateRequest, WriteResult,
    },
    models::{Article, ArticleStatus, Publisher, Role, User},
};

use super::{ArticleContent, ArticleFilter, Store, StoreResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<BTreeMap<i64, User>>,
    articles: RwLock<BTreeMap<i64, Article>>,
    publishers: RwLock<BTreeMap<i64, Publisher>>,
    redeemed_payments: RwLock<BTreeMap<String, i64>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Stores a user as given, bypassing the sign-in defaults.
    pub async fn put_user(&self, mut user: User) -> i64 {
        if user.id == 0 {
            user.id = self.next_id();
        }
        let id = user.id;
        self.users.write().await.insert(id, user);
        id
    }
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn written(matched: bool, changed: bool) -> WriteResult {
    WriteResult {
        matched_count: matched as u64,
        modified_count: (matched && changed) as u64,
    }
}

fn matches(article: &Article, filter: &ArticleFilter) -> bool {
    if let Some(status) = filter.status {
        let keep = match status {
            ArticleStatus::Approved => article.is_approved,
            ArticleStatus::Pending => !article.is_approved && !article.is_declined,
            ArticleStatus::Declined => article.is_declined,
        };
        if !keep {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        if !article
            .title
            .to_lowercase()
            .contains(&search.to_lowercase())
        {
            return false;
        }
    }
    if let Some(publisher) = &filter.publisher {
        if &article.publisher != publisher {
            return false;
        }
    }
    if !filter.tags.is_empty() && !article.tags.iter().any(|tag| filter.tags.contains(tag)) {
        return false;
    }
    if let Some(email) = &filter.author_email {
        if &article.author_email != email {
            return false;
        }
    }
    true
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn insert_user(&self, user: &CreateUserRequest) -> StoreResult<Option<i64>> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Ok(None);
        }
        let id = self.next_id();
        users.insert(
            id,
            User {
                id,
                email: user.email.clone(),
                name: user.name.clone(),
                photo: user.photo.clone(),
                phone: user.phone.clone(),
                address: user.address.clone(),
                role: Role::User,
                premium_taken: None,
                created_at: Utc::now(),
            },
        );
        Ok(Some(id))
    }

    async fn update_profile(
        &self,
        email: &str,
        update: &ProfileUpdateRequest,
    ) -> StoreResult<WriteResult> {
        let mut users = self.users.write().await;
        let Some(user) = users.values_mut().find(|u| u.email == email) else {
            return Ok(written(false, false));
        };
        let mut changed = false;
        for (field, value) in [
            (&mut user.name, &update.name),
            (&mut user.photo, &update.photo),
            (&mut user.phone, &update.phone),
            (&mut user.address, &update.address),
        ] {
            if value.is_some() && field != value {
                *field = value.clone();
                changed = true;
            }
        }
        Ok(written(true, changed))
    }

    async fn update_subscription(
        &self,
        id: i64,
        update: &SubscriptionUpdateRequest,
    ) -> StoreResult<WriteResult> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(written(false, false));
        };
        let mut changed = false;
        if update.premium_taken.is_some() && user.premium_taken != update.premium_taken {
            user.premium_taken = update.premium_taken;
            changed = true;
        }
        for (field, value) in [
            (&mut user.name, &update.name),
            (&mut user.photo, &update.photo),
        ] {
            if value.is_some() && field != value {
                *field = value.clone();
                changed = true;
            }
        }
        if let Some(role) = update.role {
            changed |= user.role != role;
            user.role = role;
        }
        Ok(written(true, changed))
    }

    async fn set_role(&self, id: i64, role: Role) -> StoreResult<WriteResult> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(written(false, false));
        };
        let changed = user.role != role;
        user.role = role;
        Ok(written(true, changed))
    }

    async fn delete_user(&self, id: i64) -> StoreResult<u64> {
        Ok(self.users.write().await.remove(&id).is_some() as u64)
    }

    async fn demote_expired_premium(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut users = self.users.write().await;
        let mut demoted = 0;
        for user in users.values_mut() {
            if matches!(user.premium_taken, Some(expiry) if expiry <= now) {
                user.role = Role::User;
                user.premium_taken = None;
                demoted += 1;
            }
        }
        Ok(demoted)
    }

    async fn redeem_payment(&self, intent_id: &str, user_id: i64) -> StoreResult<bool> {
        let mut redeemed = self.redeemed_payments.write().await;
        if redeemed.contains_key(intent_id) {
            return Ok(false);
        }
        redeemed.insert(intent_id.to_string(), user_id);
        Ok(true)
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> StoreResult<Vec<Article>> {
        let articles = self.articles.read().await;
        Ok(articles
            .values()
            .filter(|article| matches(article, filter))
            .cloned()
            .collect())
    }

    async fn get_article(&self, id: i64) -> StoreResult<Option<Article>> {
        Ok(self.articles.read().await.get(&id).cloned())
    }

    async fn record_article_view(&self, id: i64) -> StoreResult<Option<Article>> {
        let mut articles = self.articles.write().await;
        Ok(articles.get_mut(&id).map(|article| {
            article.views += 1;
            article.clone()
        }))
    }

    async fn count_articles_by_author(&self, email: &str) -> StoreResult<i64> {
        let articles = self.articles.read().await;
        Ok(articles
            .values()
            .filter(|article| article.author_email == email)
            .count() as i64)
    }

    async fn insert_article(&self, article: &CreateArticleRequest) -> StoreResult<i64> {
        let id = self.next_id();
        self.articles.write().await.insert(
            id,
            Article {
                id,
                title: article.title.clone(),
                description: article.description.clone(),
                image: article.image.clone(),
                publisher: article.publisher.clone(),
                tags: normalize_tags(&article.tags),
                author_email: article.author_email.clone(),
                is_approved: false,
                is_declined: false,
                decline_reason: None,
                is_premium: false,
                views: 0,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn approve_article(&self, id: i64) -> StoreResult<WriteResult> {
        let mut articles = self.articles.write().await;
        let Some(article) = articles.get_mut(&id) else {
            return Ok(written(false, false));
        };
        article.is_approved = true;
        article.is_declined = false;
        article.decline_reason = None;
        Ok(written(true, true))
    }

    async fn decline_article(&self, id: i64, reason: Option<&str>) -> StoreResult<WriteResult> {
        let mut articles = self.articles.write().await;
        let Some(article) = articles.get_mut(&id) else {
            return Ok(written(false, false));
        };
        article.is_approved = false;
        article.is_declined = true;
        article.decline_reason = reason.map(str::to_string);
        Ok(written(true, true))
    }

    async fn update_article_content(
        &self,
        id: i64,
        content: &ArticleContent,
    ) -> StoreResult<WriteResult> {
        let mut articles = self.articles.write().await;
        let Some(article) = articles.get_mut(&id) else {
            return Ok(written(false, false));
        };
        article.title = content.title.clone();
        article.description = content.description.clone();
        article.image = content.image.clone();
        article.publisher = content.publisher.clone();
        article.tags = normalize_tags(&content.tags);
        Ok(written(true, true))
    }

    async fn mark_article_premium(&self, id: i64) -> StoreResult<WriteResult> {
        let mut articles = self.articles.write().await;
        let Some(article) = articles.get_mut(&id) else {
            return Ok(written(false, false));
        };
        article.is_premium = true;
        Ok(written(true, true))
    }

    async fn delete_article(&self, id: i64) -> StoreResult<u64> {
        Ok(self.articles.write().await.remove(&id).is_some() as u64)
    }

    async fn list_publishers(&self) -> StoreResult<Vec<Publisher>> {
        Ok(self.publishers.read().await.values().cloned().collect())
    }

    async fn get_publisher_by_name(&self, name: &str) -> StoreResult<Option<Publisher>> {
        let publishers = self.publishers.read().await;
        Ok(publishers.values().find(|p| p.name == name).cloned())
    }

    async fn insert_publisher(&self, publisher: &CreatePublisherRequest) -> StoreResult<i64> {
        let id = self.next_id();
        self.publishers.write().await.insert(
            id,
            Publisher {
                id,
                name: publisher.name.clone(),
                logo: publisher.logo.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }
}
