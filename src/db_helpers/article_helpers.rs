use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};

use crate::{
    data_formats::{CreateArticleRequest, WriteResult},
    models::{Article, ArticleStatus},
};

use super::{ArticleContent, ArticleFilter, QueryBuilder, StoreResult};

/// Separator used when tags are folded into a single column. Tags come from
/// comma separated query strings, so a control character is used instead.
const TAG_SEPARATOR: char = '\u{1f}';

const ARTICLE_QUERY: &str = r#"
            SELECT articles.id                                  AS "id",
                   title                                        AS "title",
                   description                                  AS "description",
                   image                                        AS "image",
                   publisher                                    AS "publisher",
                   author_email                                 AS "author_email",
                   is_approved                                  AS "is_approved",
                   is_declined                                  AS "is_declined",
                   decline_reason                               AS "decline_reason",
                   is_premium                                   AS "is_premium",
                   views                                        AS "views",
                   articles.created_at                          AS "created_at",
                   (SELECT Group_concat(article_tags.tag, char(31))
                    FROM   article_tags
                    WHERE  article_tags.article_id = articles.id) AS "tag_list"
            FROM   articles
"#;

#[derive(Debug, sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    description: String,
    image: Option<String>,
    publisher: String,
    author_email: String,
    is_approved: bool,
    is_declined: bool,
    decline_reason: Option<String>,
    is_premium: bool,
    views: i64,
    created_at: DateTime<Utc>,
    tag_list: Option<String>,
}

impl From<ArticleRow> for Article {
    fn from(
        ArticleRow {
            id,
            title,
            description,
            image,
            publisher,
            author_email,
            is_approved,
            is_declined,
            decline_reason,
            is_premium,
            views,
            created_at,
            tag_list,
        }: ArticleRow,
    ) -> Self {
        let mut tags: Vec<String> = tag_list
            .map(|list| list.split(TAG_SEPARATOR).map(str::to_string).collect())
            .unwrap_or_default();
        tags.sort();
        Article {
            id,
            title,
            description,
            image,
            publisher,
            tags,
            author_email,
            is_approved,
            is_declined,
            decline_reason,
            is_premium,
            views,
            created_at,
        }
    }
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub async fn list_articles_in_db(
    pool: &SqlitePool,
    ArticleFilter {
        search,
        publisher,
        tags,
        status,
        author_email,
    }: &ArticleFilter,
) -> StoreResult<Vec<Article>> {
    let (conditions, params) = QueryBuilder::new(String::new(), " AND ")
        .add_clause(
            "is_approved = 1",
            *status == Some(ArticleStatus::Approved),
        )
        .add_clause(
            "is_approved = 0 AND is_declined = 0",
            *status == Some(ArticleStatus::Pending),
        )
        .add_clause(
            "is_declined = 1",
            *status == Some(ArticleStatus::Declined),
        )
        .add_param(
            "title LIKE ? ESCAPE '\\'",
            search.as_deref().map(like_pattern),
        )
        .add_param("publisher = ?", publisher.clone())
        .add_any_of(
            "articles.id IN (SELECT article_id FROM article_tags WHERE tag IN ({}))",
            tags,
        )
        .add_param("author_email = ?", author_email.clone())
        .build();

    let query = if conditions.is_empty() {
        format!("{} ORDER BY articles.id", ARTICLE_QUERY)
    } else {
        format!(
            "{} WHERE {} ORDER BY articles.id",
            ARTICLE_QUERY, conditions
        )
    };

    let mut query = sqlx::query_as::<Sqlite, ArticleRow>(&query);
    for param in params {
        query = query.bind(param);
    }
    let articles = query.fetch_all(pool).await?;
    Ok(articles.into_iter().map(Article::from).collect())
}

pub async fn get_article_in_db(pool: &SqlitePool, id: i64) -> StoreResult<Option<Article>> {
    let query = format!("{} WHERE articles.id = $1", ARTICLE_QUERY);
    let article = sqlx::query_as::<Sqlite, ArticleRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(article.map(Article::from))
}

pub async fn record_article_view_in_db(
    pool: &SqlitePool,
    id: i64,
) -> StoreResult<Option<Article>> {
    let mut tx = pool.begin().await?;
    let updated = sqlx::query("UPDATE articles SET views = views + 1 WHERE id = $1")
        .bind(id)
        .execute(&mut tx)
        .await?
        .rows_affected();
    tx.commit().await?;

    if updated == 0 {
        return Ok(None);
    }
    get_article_in_db(pool, id).await
}

pub async fn count_articles_by_author(pool: &SqlitePool, email: &str) -> StoreResult<i64> {
    let count = sqlx::query_scalar::<Sqlite, i64>(
        "SELECT COUNT(*) FROM articles WHERE author_email = $1",
    )
    .bind(email)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn insert_article_in_db(
    pool: &SqlitePool,
    CreateArticleRequest {
        author_email,
        title,
        description,
        image,
        publisher,
        tags,
    }: &CreateArticleRequest,
) -> StoreResult<i64> {
    let mut tx = pool.begin().await?;
    let id = sqlx::query_scalar::<Sqlite, i64>(
        r#"
        INSERT INTO articles (title, description, image, publisher, author_email, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(image)
    .bind(publisher)
    .bind(author_email)
    .bind(Utc::now())
    .fetch_one(&mut tx)
    .await?;

    for tag in tags {
        sqlx::query("INSERT OR IGNORE INTO article_tags (article_id, tag) VALUES ($1, $2)")
            .bind(id)
            .bind(tag)
            .execute(&mut tx)
            .await?;
    }

    tx.commit().await?;
    Ok(id)
}

async fn update_article_flags(
    pool: &SqlitePool,
    query: &str,
    id: i64,
) -> StoreResult<WriteResult> {
    let mut tx = pool.begin().await?;
    let affected = sqlx::query(query)
        .bind(id)
        .execute(&mut tx)
        .await?
        .rows_affected();
    tx.commit().await?;
    Ok(WriteResult {
        matched_count: affected,
        modified_count: affected,
    })
}

pub async fn approve_article_in_db(pool: &SqlitePool, id: i64) -> StoreResult<WriteResult> {
    update_article_flags(
        pool,
        "UPDATE articles SET is_approved = 1, is_declined = 0, decline_reason = NULL WHERE id = $1",
        id,
    )
    .await
}

pub async fn mark_article_premium_in_db(pool: &SqlitePool, id: i64) -> StoreResult<WriteResult> {
    update_article_flags(pool, "UPDATE articles SET is_premium = 1 WHERE id = $1", id).await
}

pub async fn decline_article_in_db(
    pool: &SqlitePool,
    id: i64,
    reason: Option<&str>,
) -> StoreResult<WriteResult> {
    let mut tx = pool.begin().await?;
    let affected = sqlx::query(
        r#"
        UPDATE articles
        SET is_approved = 0, is_declined = 1, decline_reason = $1
        WHERE id = $2
        "#,
    )
    .bind(reason)
    .bind(id)
    .execute(&mut tx)
    .await?
    .rows_affected();
    tx.commit().await?;
    Ok(WriteResult {
        matched_count: affected,
        modified_count: affected,
    })
}

pub async fn update_article_content_in_db(
    pool: &SqlitePool,
    id: i64,
    ArticleContent {
        title,
        description,
        image,
        publisher,
        tags,
    }: &ArticleContent,
) -> StoreResult<WriteResult> {
    let mut tx = pool.begin().await?;
    let affected = sqlx::query(
        r#"
        UPDATE articles
        SET title = $1, description = $2, image = $3, publisher = $4
        WHERE id = $5
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(image)
    .bind(publisher)
    .bind(id)
    .execute(&mut tx)
    .await?
    .rows_affected();

    if affected > 0 {
        sqlx::query("DELETE FROM article_tags WHERE article_id = $1")
            .bind(id)
            .execute(&mut tx)
            .await?;
        for tag in tags {
            sqlx::query("INSERT OR IGNORE INTO article_tags (article_id, tag) VALUES ($1, $2)")
                .bind(id)
                .bind(tag)
                .execute(&mut tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(WriteResult {
        matched_count: affected,
        modified_count: affected,
    })
}

pub async fn delete_article_in_db(pool: &SqlitePool, id: i64) -> StoreResult<u64> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM article_tags WHERE article_id = $1")
        .bind(id)
        .execute(&mut tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM articles WHERE id = $1")
        .bind(id)
        .execute(&mut tx)
        .await?
        .rows_affected();
    tx.commit().await?;
    Ok(deleted)
}
