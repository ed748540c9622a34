use chrono::Utc;
use sqlx::{Sqlite, SqlitePool};

use crate::{data_formats::CreatePublisherRequest, models::Publisher};

use super::StoreResult;

pub async fn list_publishers_in_db(pool: &SqlitePool) -> StoreResult<Vec<Publisher>> {
    let publishers = sqlx::query_as::<Sqlite, Publisher>(
        "SELECT id, name, logo, created_at FROM publishers ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(publishers)
}

pub async fn get_publisher_by_name(
    pool: &SqlitePool,
    name: &str,
) -> StoreResult<Option<Publisher>> {
    let publisher = sqlx::query_as::<Sqlite, Publisher>(
        "SELECT id, name, logo, created_at FROM publishers WHERE name = $1 LIMIT 1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(publisher)
}

pub async fn insert_publisher_in_db(
    pool: &SqlitePool,
    publisher: &CreatePublisherRequest,
) -> StoreResult<i64> {
    let mut tx = pool.begin().await?;
    let id = sqlx::query_scalar::<Sqlite, i64>(
        r#"
        INSERT INTO publishers (name, logo, created_at)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(&publisher.name)
    .bind(&publisher.logo)
    .bind(Utc::now())
    .fetch_one(&mut tx)
    .await?;
    tx.commit().await?;
    Ok(id)
}
