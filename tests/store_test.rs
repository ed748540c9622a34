use chrono::{Duration, Utc};
use insightly::data_formats::{
    CreateArticleRequest, CreatePublisherRequest, CreateUserRequest, ProfileUpdateRequest,
    SubscriptionUpdateRequest,
};
use insightly::db_helpers::{ArticleContent, ArticleFilter, SqliteStore, Store};
use insightly::models::{ArticleStatus, Role};
use insightly::run_migrations;
use sqlx::sqlite::SqlitePoolOptions;

async fn store() -> SqliteStore {
    // One connection, otherwise every connection gets its own in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    SqliteStore::new(pool)
}

fn new_user(email: &str) -> CreateUserRequest {
    CreateUserRequest {
        email: email.to_string(),
        name: Some("Reader".to_string()),
        ..Default::default()
    }
}

fn new_article(email: &str, title: &str, publisher: &str, tags: &[&str]) -> CreateArticleRequest {
    CreateArticleRequest {
        author_email: email.to_string(),
        title: title.to_string(),
        description: "Body".to_string(),
        image: None,
        publisher: publisher.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn titles(articles: &[insightly::models::Article]) -> Vec<&str> {
    articles.iter().map(|a| a.title.as_str()).collect()
}

#[tokio::test]
async fn users_are_unique_by_email() {
    let store = store().await;
    let id = store.insert_user(&new_user("u@x.com")).await.unwrap();
    assert!(id.is_some());
    assert!(store.insert_user(&new_user("u@x.com")).await.unwrap().is_none());

    let users = store.list_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].role, Role::User);
    assert_eq!(users[0].name.as_deref(), Some("Reader"));
    assert_eq!(Some(users[0].id), id);
}

#[tokio::test]
async fn profile_and_role_writes_report_counts() {
    let store = store().await;
    let id = store
        .insert_user(&new_user("u@x.com"))
        .await
        .unwrap()
        .unwrap();

    let result = store
        .update_profile(
            "u@x.com",
            &ProfileUpdateRequest {
                phone: Some("555".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!((result.matched_count, result.modified_count), (1, 1));

    let result = store
        .update_profile("u@x.com", &ProfileUpdateRequest::default())
        .await
        .unwrap();
    assert_eq!((result.matched_count, result.modified_count), (1, 0));

    // Same value again: matched, not modified.
    let result = store
        .update_profile(
            "u@x.com",
            &ProfileUpdateRequest {
                phone: Some("555".to_string()),
                name: Some("Reader".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!((result.matched_count, result.modified_count), (1, 0));

    let unchanged = SubscriptionUpdateRequest {
        name: Some("Reader".to_string()),
        ..Default::default()
    };
    let result = store.update_subscription(id, &unchanged).await.unwrap();
    assert_eq!((result.matched_count, result.modified_count), (1, 0));
    let renamed = SubscriptionUpdateRequest {
        name: Some("Ada".to_string()),
        ..Default::default()
    };
    let result = store.update_subscription(id, &renamed).await.unwrap();
    assert_eq!((result.matched_count, result.modified_count), (1, 1));

    let result = store
        .update_profile("ghost@x.com", &ProfileUpdateRequest::default())
        .await
        .unwrap();
    assert_eq!(result.matched_count, 0);

    let result = store.set_role(id, Role::Admin).await.unwrap();
    assert_eq!((result.matched_count, result.modified_count), (1, 1));
    let result = store.set_role(id, Role::Admin).await.unwrap();
    assert_eq!((result.matched_count, result.modified_count), (1, 0));

    let user = store.get_user_by_email("u@x.com").await.unwrap().unwrap();
    assert_eq!(user.phone.as_deref(), Some("555"));
    assert!(user.is_admin());

    assert_eq!(store.delete_user(id).await.unwrap(), 1);
    assert_eq!(store.delete_user(id).await.unwrap(), 0);
    assert!(store.get_user_by_id(id).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_premium_terms_are_demoted() {
    let store = store().await;
    let now = Utc::now();
    let terms = [
        ("old@x.com", now - Duration::days(1)),
        ("edge@x.com", now),
        ("new@x.com", now + Duration::days(1)),
    ];
    let mut ids = vec![];
    for (email, premium_taken) in terms {
        let id = store.insert_user(&new_user(email)).await.unwrap().unwrap();
        let result = store
            .update_subscription(
                id,
                &SubscriptionUpdateRequest {
                    role: Some(Role::Premium),
                    premium_taken: Some(premium_taken),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.modified_count, 1);
        ids.push(id);
    }
    store.insert_user(&new_user("plain@x.com")).await.unwrap();

    assert_eq!(store.demote_expired_premium(now).await.unwrap(), 2);

    for id in &ids[..2] {
        let user = store.get_user_by_id(*id).await.unwrap().unwrap();
        assert_eq!(user.role, Role::User);
        assert!(user.premium_taken.is_none());
    }
    let active = store.get_user_by_id(ids[2]).await.unwrap().unwrap();
    assert_eq!(active.role, Role::Premium);
    assert!(active.is_premium_at(now));

    assert_eq!(store.demote_expired_premium(now).await.unwrap(), 0);
}

#[tokio::test]
async fn articles_start_pending_and_count_views() {
    let store = store().await;
    let id = store
        .insert_article(&new_article("u@x.com", "A1", "Daily", &["tech", "news", "tech"]))
        .await
        .unwrap();

    let article = store.get_article(id).await.unwrap().unwrap();
    assert_eq!(article.status(), ArticleStatus::Pending);
    assert_eq!(article.tags, vec!["news", "tech"]);
    assert_eq!(article.views, 0);

    assert_eq!(store.record_article_view(id).await.unwrap().unwrap().views, 1);
    assert_eq!(store.record_article_view(id).await.unwrap().unwrap().views, 2);
    assert!(store.record_article_view(id + 1).await.unwrap().is_none());
    assert_eq!(store.count_articles_by_author("u@x.com").await.unwrap(), 1);
}

#[tokio::test]
async fn moderation_and_content_updates() {
    let store = store().await;
    let id = store
        .insert_article(&new_article("u@x.com", "A1", "Daily", &["old"]))
        .await
        .unwrap();

    store.decline_article(id, Some("Needs sources")).await.unwrap();
    let article = store.get_article(id).await.unwrap().unwrap();
    assert_eq!(article.status(), ArticleStatus::Declined);
    assert_eq!(article.decline_reason.as_deref(), Some("Needs sources"));

    let result = store.approve_article(id).await.unwrap();
    assert_eq!(result.matched_count, 1);
    let article = store.get_article(id).await.unwrap().unwrap();
    assert!(article.is_approved && !article.is_declined);
    assert!(article.decline_reason.is_none());

    store.mark_article_premium(id).await.unwrap();
    let result = store
        .update_article_content(
            id,
            &ArticleContent {
                title: "A1 revised".to_string(),
                description: "New body".to_string(),
                image: Some("https://img.example/a.png".to_string()),
                publisher: "Weekly".to_string(),
                tags: vec!["rust".to_string()],
            },
        )
        .await
        .unwrap();
    assert_eq!(result.modified_count, 1);

    let article = store.get_article(id).await.unwrap().unwrap();
    assert_eq!(article.title, "A1 revised");
    assert_eq!(article.publisher, "Weekly");
    assert_eq!(article.tags, vec!["rust"]);
    assert!(article.is_premium);

    assert_eq!(store.approve_article(id + 1).await.unwrap().matched_count, 0);
    assert_eq!(store.delete_article(id).await.unwrap(), 1);
    assert!(store.get_article(id).await.unwrap().is_none());
}

#[tokio::test]
async fn article_filters_combine() {
    let store = store().await;
    let rust = store
        .insert_article(&new_article("a@x.com", "Rust in Production", "Daily", &["rust", "tech"]))
        .await
        .unwrap();
    store
        .insert_article(&new_article("b@x.com", "Election night", "Weekly", &["politics"]))
        .await
        .unwrap();
    store
        .insert_article(&new_article("a@x.com", "100% trusted", "Daily", &["tech"]))
        .await
        .unwrap();
    store.approve_article(rust).await.unwrap();

    let all = store.list_articles(&ArticleFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let filter = ArticleFilter {
        search: Some("RUST".to_string()),
        ..Default::default()
    };
    let found = store.list_articles(&filter).await.unwrap();
    assert_eq!(titles(&found), vec!["Rust in Production", "100% trusted"]);

    // `%` is matched literally.
    let filter = ArticleFilter {
        search: Some("0%".to_string()),
        ..Default::default()
    };
    assert_eq!(titles(&store.list_articles(&filter).await.unwrap()), vec!["100% trusted"]);

    let filter = ArticleFilter {
        tags: vec!["politics".to_string(), "rust".to_string()],
        ..Default::default()
    };
    assert_eq!(store.list_articles(&filter).await.unwrap().len(), 2);

    let filter = ArticleFilter {
        publisher: Some("Daily".to_string()),
        status: Some(ArticleStatus::Pending),
        author_email: Some("a@x.com".to_string()),
        ..Default::default()
    };
    assert_eq!(titles(&store.list_articles(&filter).await.unwrap()), vec!["100% trusted"]);

    let filter = ArticleFilter {
        status: Some(ArticleStatus::Approved),
        ..Default::default()
    };
    assert_eq!(titles(&store.list_articles(&filter).await.unwrap()), vec!["Rust in Production"]);
}

#[tokio::test]
async fn publishers_are_found_by_name() {
    let store = store().await;
    let id = store
        .insert_publisher(&CreatePublisherRequest {
            name: "Daily".to_string(),
            logo: Some("https://img.example/daily.png".to_string()),
        })
        .await
        .unwrap();

    let publisher = store.get_publisher_by_name("Daily").await.unwrap().unwrap();
    assert_eq!(publisher.id, id);
    assert!(store.get_publisher_by_name("daily").await.unwrap().is_none());
    assert_eq!(store.list_publishers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn payments_are_redeemed_once() {
    let store = store().await;
    assert!(store.redeem_payment("pi_paid", 1).await.unwrap());
    assert!(!store.redeem_payment("pi_paid", 2).await.unwrap());
    assert!(store.redeem_payment("pi_other", 1).await.unwrap());
}
