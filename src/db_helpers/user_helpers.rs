use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool};

use crate::{
    data_formats::{CreateUserRequest, ProfileUpdateRequest, SubscriptionUpdateRequest, WriteResult},
    models::{Role, User},
};

use super::{QueryBuilder, StoreResult};

const USER_COLUMNS: &str =
    "id, email, name, photo, phone, address, role, premium_taken, created_at";

pub async fn list_users(pool: &SqlitePool) -> StoreResult<Vec<User>> {
    let query = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
    let users = sqlx::query_as::<Sqlite, User>(&query)
        .fetch_all(pool)
        .await?;
    Ok(users)
}

pub async fn get_user_by_email(pool: &SqlitePool, email: &str) -> StoreResult<Option<User>> {
    let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
    let user = sqlx::query_as::<Sqlite, User>(&query)
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn get_user_by_id(pool: &SqlitePool, id: i64) -> StoreResult<Option<User>> {
    let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    let user = sqlx::query_as::<Sqlite, User>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn insert_user(pool: &SqlitePool, user: &CreateUserRequest) -> StoreResult<Option<i64>> {
    let mut tx = pool.begin().await?;
    let id = sqlx::query_scalar::<Sqlite, i64>(
        r#"
        INSERT INTO users (email, name, photo, phone, address, role, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (email) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.photo)
    .bind(&user.phone)
    .bind(&user.address)
    .bind(Role::User)
    .bind(Utc::now())
    .fetch_optional(&mut tx)
    .await?;
    tx.commit().await?;
    Ok(id)
}

/// Rows whose stored values already equal the update are matched but not
/// modified.
pub async fn update_profile_in_db(
    pool: &SqlitePool,
    email: &str,
    ProfileUpdateRequest {
        name,
        photo,
        phone,
        address,
    }: &ProfileUpdateRequest,
) -> StoreResult<WriteResult> {
    let builder = QueryBuilder::new("UPDATE users SET ", ", ")
        .add_param("name = ?", name.clone())
        .add_param("photo = ?", photo.clone())
        .add_param("phone = ?", phone.clone())
        .add_param("address = ?", address.clone());

    if builder.is_empty() {
        return Ok(WriteResult {
            matched_count: get_user_by_email(pool, email).await?.is_some() as u64,
            modified_count: 0,
        });
    }

    let (changes, change_params) = QueryBuilder::new(String::new(), " OR ")
        .add_param("name IS NOT ?", name.clone())
        .add_param("photo IS NOT ?", photo.clone())
        .add_param("phone IS NOT ?", phone.clone())
        .add_param("address IS NOT ?", address.clone())
        .build();
    let (query, mut params) = builder
        .trim()
        .add_param(" WHERE email = ?", Some(email.to_string()))
        .build();
    let query = format!("{} AND ({})", query, changes);
    params.extend(change_params);

    let mut tx = pool.begin().await?;
    let mut query = sqlx::query(&query);
    for param in params {
        query = query.bind(param);
    }
    let modified = query.execute(&mut tx).await?.rows_affected();
    tx.commit().await?;

    let matched = if modified > 0 {
        modified
    } else {
        get_user_by_email(pool, email).await?.is_some() as u64
    };
    Ok(WriteResult {
        matched_count: matched,
        modified_count: modified,
    })
}

pub async fn update_subscription_in_db(
    pool: &SqlitePool,
    id: i64,
    update: &SubscriptionUpdateRequest,
) -> StoreResult<WriteResult> {
    if !update.has_changes() {
        return Ok(WriteResult {
            matched_count: get_user_by_id(pool, id).await?.is_some() as u64,
            modified_count: 0,
        });
    }

    let mut tx = pool.begin().await?;
    let modified = sqlx::query(
        r#"
        UPDATE users
        SET premium_taken = COALESCE($1, premium_taken),
            name          = COALESCE($2, name),
            photo         = COALESCE($3, photo),
            role          = COALESCE($4, role)
        WHERE id = $5
          AND (($1 IS NOT NULL AND premium_taken IS NOT $1)
            OR ($2 IS NOT NULL AND name IS NOT $2)
            OR ($3 IS NOT NULL AND photo IS NOT $3)
            OR ($4 IS NOT NULL AND role IS NOT $4))
        "#,
    )
    .bind(update.premium_taken)
    .bind(&update.name)
    .bind(&update.photo)
    .bind(update.role)
    .bind(id)
    .execute(&mut tx)
    .await?
    .rows_affected();
    tx.commit().await?;

    let matched = if modified > 0 {
        modified
    } else {
        get_user_by_id(pool, id).await?.is_some() as u64
    };
    Ok(WriteResult {
        matched_count: matched,
        modified_count: modified,
    })
}

pub async fn set_role_in_db(pool: &SqlitePool, id: i64, role: Role) -> StoreResult<WriteResult> {
    let mut tx = pool.begin().await?;
    let matched = sqlx::query_scalar::<Sqlite, i64>("SELECT COUNT(*) FROM users WHERE id = $1")
        .bind(id)
        .fetch_one(&mut tx)
        .await?;
    let modified = sqlx::query("UPDATE users SET role = $1 WHERE id = $2 AND role != $1")
        .bind(role)
        .bind(id)
        .execute(&mut tx)
        .await?
        .rows_affected();
    tx.commit().await?;

    Ok(WriteResult {
        matched_count: matched as u64,
        modified_count: modified,
    })
}

pub async fn delete_user_in_db(pool: &SqlitePool, id: i64) -> StoreResult<u64> {
    let mut tx = pool.begin().await?;
    let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&mut tx)
        .await?
        .rows_affected();
    tx.commit().await?;
    Ok(deleted)
}

pub async fn demote_expired_premium_in_db(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> StoreResult<u64> {
    let mut tx = pool.begin().await?;
    let demoted = sqlx::query(
        r#"
        UPDATE users
        SET role = $1, premium_taken = NULL
        WHERE premium_taken IS NOT NULL AND premium_taken <= $2
        "#,
    )
    .bind(Role::User)
    .bind(now)
    .execute(&mut tx)
    .await?
    .rows_affected();
    tx.commit().await?;
    Ok(demoted)
}

pub async fn redeem_payment_in_db(
    pool: &SqlitePool,
    intent_id: &str,
    user_id: i64,
) -> StoreResult<bool> {
    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        r#"
        INSERT INTO redeemed_payments (intent_id, user_id, redeemed_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (intent_id) DO NOTHING
        "#,
    )
    .bind(intent_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(&mut tx)
    .await?
    .rows_affected();
    tx.commit().await?;
    Ok(inserted == 1)
}
