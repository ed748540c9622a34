use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    data_formats::{
        CreateArticleRequest, CreatePublisherRequest, CreateUserRequest, ProfileUpdateRequest,
        SubscriptionUpdateRequest, WriteResult,
    },
    models::{Article, ArticleStatus, Publisher, Role, User},
};

mod article_helpers;
mod error;
mod memory;
mod publisher_helpers;
mod user_helpers;

pub use error::*;
pub use memory::MemoryStore;

/// Filters for listing articles. Empty fields do not constrain the result.
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
    pub publisher: Option<String>,
    /// Matches articles carrying at least one of these tags.
    pub tags: Vec<String>,
    pub status: Option<ArticleStatus>,
    pub author_email: Option<String>,
}

/// Validated content fields written by an article edit.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleContent {
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub publisher: String,
    pub tags: Vec<String>,
}

/// Collection-scoped persistence operations used by handlers, the admission
/// rule and the subscription sweeper.
#[async_trait]
pub trait Store: Send + Sync {
    // ----------------- Users -----------------
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    /// Returns `None` without writing when the email is already registered.
    async fn insert_user(&self, user: &CreateUserRequest) -> StoreResult<Option<i64>>;
    async fn update_profile(
        &self,
        email: &str,
        update: &ProfileUpdateRequest,
    ) -> StoreResult<WriteResult>;
    async fn update_subscription(
        &self,
        id: i64,
        update: &SubscriptionUpdateRequest,
    ) -> StoreResult<WriteResult>;
    async fn set_role(&self, id: i64, role: Role) -> StoreResult<WriteResult>;
    async fn delete_user(&self, id: i64) -> StoreResult<u64>;
    /// Resets every user whose `premium_taken` is at or before `now` to the
    /// plain `user` role and clears the expiry. Returns the affected count.
    async fn demote_expired_premium(&self, now: DateTime<Utc>) -> StoreResult<u64>;
    /// Records that `intent_id` paid for `user_id`'s premium. Returns `false`
    /// when the intent was already redeemed.
    async fn redeem_payment(&self, intent_id: &str, user_id: i64) -> StoreResult<bool>;

    // ----------------- Articles -----------------
    async fn list_articles(&self, filter: &ArticleFilter) -> StoreResult<Vec<Article>>;
    async fn get_article(&self, id: i64) -> StoreResult<Option<Article>>;
    /// Increments `views` and returns the article as it is after the read.
    async fn record_article_view(&self, id: i64) -> StoreResult<Option<Article>>;
    async fn count_articles_by_author(&self, email: &str) -> StoreResult<i64>;
    async fn insert_article(&self, article: &CreateArticleRequest) -> StoreResult<i64>;
    async fn approve_article(&self, id: i64) -> StoreResult<WriteResult>;
    async fn decline_article(&self, id: i64, reason: Option<&str>) -> StoreResult<WriteResult>;
    async fn update_article_content(
        &self,
        id: i64,
        content: &ArticleContent,
    ) -> StoreResult<WriteResult>;
    async fn mark_article_premium(&self, id: i64) -> StoreResult<WriteResult>;
    async fn delete_article(&self, id: i64) -> StoreResult<u64>;

    // ----------------- Publishers -----------------
    async fn list_publishers(&self) -> StoreResult<Vec<Publisher>>;
    async fn get_publisher_by_name(&self, name: &str) -> StoreResult<Option<Publisher>>;
    async fn insert_publisher(&self, publisher: &CreatePublisherRequest) -> StoreResult<i64>;
}

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        user_helpers::list_users(&self.pool).await
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        user_helpers::get_user_by_email(&self.pool, email).await
    }

    async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        user_helpers::get_user_by_id(&self.pool, id).await
    }

    async fn insert_user(&self, user: &CreateUserRequest) -> StoreResult<Option<i64>> {
        user_helpers::insert_user(&self.pool, user).await
    }

    async fn update_profile(
        &self,
        email: &str,
        update: &ProfileUpdateRequest,
    ) -> StoreResult<WriteResult> {
        user_helpers::update_profile_in_db(&self.pool, email, update).await
    }

    async fn update_subscription(
        &self,
        id: i64,
        update: &SubscriptionUpdateRequest,
    ) -> StoreResult<WriteResult> {
        user_helpers::update_subscription_in_db(&self.pool, id, update).await
    }

    async fn set_role(&self, id: i64, role: Role) -> StoreResult<WriteResult> {
        user_helpers::set_role_in_db(&self.pool, id, role).await
    }

    async fn delete_user(&self, id: i64) -> StoreResult<u64> {
        user_helpers::delete_user_in_db(&self.pool, id).await
    }

    async fn demote_expired_premium(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        user_helpers::demote_expired_premium_in_db(&self.pool, now).await
    }

    async fn redeem_payment(&self, intent_id: &str, user_id: i64) -> StoreResult<bool> {
        user_helpers::redeem_payment_in_db(&self.pool, intent_id, user_id).await
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> StoreResult<Vec<Article>> {
        article_helpers::list_articles_in_db(&self.pool, filter).await
    }

    async fn get_article(&self, id: i64) -> StoreResult<Option<Article>> {
        article_helpers::get_article_in_db(&self.pool, id).await
    }

    async fn record_article_view(&self, id: i64) -> StoreResult<Option<Article>> {
        article_helpers::record_article_view_in_db(&self.pool, id).await
    }

    async fn count_articles_by_author(&self, email: &str) -> StoreResult<i64> {
        article_helpers::count_articles_by_author(&self.pool, email).await
    }

    async fn insert_article(&self, article: &CreateArticleRequest) -> StoreResult<i64> {
        article_helpers::insert_article_in_db(&self.pool, article).await
    }

    async fn approve_article(&self, id: i64) -> StoreResult<WriteResult> {
        article_helpers::approve_article_in_db(&self.pool, id).await
    }

    async fn decline_article(&self, id: i64, reason: Option<&str>) -> StoreResult<WriteResult> {
        article_helpers::decline_article_in_db(&self.pool, id, reason).await
    }

    async fn update_article_content(
        &self,
        id: i64,
        content: &ArticleContent,
    ) -> StoreResult<WriteResult> {
        article_helpers::update_article_content_in_db(&self.pool, id, content).await
    }

    async fn mark_article_premium(&self, id: i64) -> StoreResult<WriteResult> {
        article_helpers::mark_article_premium_in_db(&self.pool, id).await
    }

    async fn delete_article(&self, id: i64) -> StoreResult<u64> {
        article_helpers::delete_article_in_db(&self.pool, id).await
    }

    async fn list_publishers(&self) -> StoreResult<Vec<Publisher>> {
        publisher_helpers::list_publishers_in_db(&self.pool).await
    }

    async fn get_publisher_by_name(&self, name: &str) -> StoreResult<Option<Publisher>> {
        publisher_helpers::get_publisher_by_name(&self.pool, name).await
    }

    async fn insert_publisher(&self, publisher: &CreatePublisherRequest) -> StoreResult<i64> {
        publisher_helpers::insert_publisher_in_db(&self.pool, publisher).await
    }
}

/// Builds a clause list out of optional string parameters, binding only the
/// ones that are present.
struct QueryBuilder {
    query: String,
    params: Vec<String>,
    seperator: &'static str,
    counter: usize,
}

impl QueryBuilder {
    fn new(initial: impl Into<String>, seperator: &'static str) -> Self {
        Self {
            query: initial.into(),
            params: vec![],
            seperator,
            counter: 0,
        }
    }

    /// `clause` must contain exactly one `?` placeholder.
    fn add_param(mut self, clause: &str, param: Option<String>) -> Self {
        if let Some(value) = param {
            self.push_clause(clause);
            self.params.push(value);
        }
        self
    }

    /// Adds a clause that carries no parameter.
    fn add_clause(mut self, clause: &str, enabled: bool) -> Self {
        if enabled {
            self.push_clause(clause);
        }
        self
    }

    /// `template` must contain a single `{}` that is replaced by one
    /// placeholder per value.
    fn add_any_of(mut self, template: &str, values: &[String]) -> Self {
        if !values.is_empty() {
            let placeholders = vec!["?"; values.len()].join(", ");
            self.push_clause(&template.replacen("{}", &placeholders, 1));
            self.params.extend(values.iter().cloned());
        }
        self
    }

    fn push_clause(&mut self, clause: &str) {
        self.query.push_str(clause);
        self.query.push_str(self.seperator);
        self.counter += 1;
    }

    fn is_empty(&self) -> bool {
        self.counter == 0
    }

    fn trim(mut self) -> Self {
        self.query = self.query.trim_end_matches(self.seperator).to_string();
        self
    }

    fn build(mut self) -> (String, Vec<String>) {
        self = self.trim();
        (self.query, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_builder_skips_missing_params() {
        let (query, params) = QueryBuilder::new("UPDATE users SET ", ", ")
            .add_param("name = ?", Some("Ada".to_string()))
            .add_param("photo = ?", None)
            .add_param("phone = ?", Some("555".to_string()))
            .build();
        assert_eq!(query, "UPDATE users SET name = ?, phone = ?");
        assert_eq!(params, vec!["Ada", "555"]);
    }

    #[test]
    fn query_builder_expands_any_of() {
        let builder = QueryBuilder::new("", " AND ")
            .add_clause("is_approved = 1", true)
            .add_any_of("tag IN ({})", &["a".to_string(), "b".to_string()]);
        assert!(!builder.is_empty());
        let (query, params) = builder.build();
        assert_eq!(query, "is_approved = 1 AND tag IN (?, ?)");
        assert_eq!(params.len(), 2);
    }
}
