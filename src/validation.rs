//! Field checks and cross-collection reference checks shared by the handlers.

use crate::{
    data_formats::{ProfileUpdateRequest, SubscriptionUpdateRequest, UpdateArticleRequest},
    db_helpers::{ArticleContent, Store},
    errors::RequestError,
    models::{Role, User},
};

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Empty profile fields leave the stored value untouched.
pub fn normalize_profile_update(
    ProfileUpdateRequest {
        name,
        photo,
        phone,
        address,
    }: ProfileUpdateRequest,
) -> ProfileUpdateRequest {
    ProfileUpdateRequest {
        name: non_blank(name),
        photo: non_blank(photo),
        phone: non_blank(phone),
        address: non_blank(address),
    }
}

pub fn validate_article_content(
    UpdateArticleRequest {
        title,
        description,
        image,
        publisher,
        tags,
    }: UpdateArticleRequest,
) -> Result<ArticleContent, RequestError> {
    match (non_blank(title), non_blank(description), non_blank(publisher), tags) {
        (Some(title), Some(description), Some(publisher), Some(tags)) => Ok(ArticleContent {
            title,
            description,
            image,
            publisher,
            tags,
        }),
        _ => Err(RequestError::Validation(
            "Invalid data. All fields are required.",
        )),
    }
}

/// Publishers are referenced by name and nothing below this layer keeps the
/// reference valid.
pub async fn ensure_publisher_exists(store: &dyn Store, name: &str) -> Result<(), RequestError> {
    match store.get_publisher_by_name(name).await? {
        Some(_) => Ok(()),
        None => Err(RequestError::NotFound("Publisher not found.")),
    }
}

pub async fn validate_article_update(
    store: &dyn Store,
    request: UpdateArticleRequest,
) -> Result<ArticleContent, RequestError> {
    let content = validate_article_content(request)?;
    ensure_publisher_exists(store, &content.publisher).await?;
    Ok(content)
}

/// A premium role needs an expiry, either supplied now or already stored.
pub fn validate_subscription_update(
    user: &User,
    update: &SubscriptionUpdateRequest,
) -> Result<(), RequestError> {
    if update.role == Some(Role::Premium)
        && update.premium_taken.is_none()
        && user.premium_taken.is_none()
    {
        return Err(RequestError::Validation(
            "premiumTaken is required when granting premium",
        ));
    }
    Ok(())
}

pub fn validate_payment_amount(amount: Option<i64>) -> Result<i64, RequestError> {
    match amount {
        Some(amount) if amount > 0 => Ok(amount),
        _ => Err(RequestError::Validation("amount must be a positive integer")),
    }
}
