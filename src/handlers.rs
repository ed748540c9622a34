use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode, Uri},
    Extension, Json,
};
use chrono::Utc;

use crate::{
    admission::admit_article,
    authentication::{check_issuer_key, get_jwt_token, AdminUser, Caller},
    data_formats::*,
    errors::RequestError,
    models::{Article, Publisher, Role, User},
    subscription::redeem_purchase,
    validation::{
        normalize_profile_update, validate_article_update, validate_payment_amount,
        validate_subscription_update,
    },
    AppState,
};

type JsonResult<T> = Result<Json<T>, RequestError>;

// ----------------- Helper Handlers -----------------
pub async fn root() -> &'static str {
    "Insightly is running"
}

pub async fn alive() -> &'static str {
    "alive"
}

pub async fn not_found(uri: Uri) -> Result<(), (StatusCode, String)> {
    Err((
        StatusCode::NOT_FOUND,
        format!("URL {} provided was not found", uri),
    ))
}

async fn user_by_id(state: &AppState, id: i64) -> Result<User, RequestError> {
    state
        .store
        .get_user_by_id(id)
        .await?
        .ok_or(RequestError::NotFound("User not found"))
}

async fn article_by_id(state: &AppState, id: i64) -> Result<Article, RequestError> {
    state
        .store
        .get_article(id)
        .await?
        .ok_or(RequestError::NotFound("Article not found."))
}

// ----------------- Token Handlers -----------------
pub async fn issue_token(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(request): Json<TokenRequest>,
) -> JsonResult<TokenResponse> {
    check_issuer_key(&headers, &state.auth)?;
    let user = state
        .store
        .get_user_by_email(&request.email)
        .await?
        .ok_or(RequestError::NotFound("User not found"))?;
    let token = get_jwt_token(&user.email, &state.auth).map_err(|e| {
        tracing::error!("Could not generate token: {:#}", e);
        RequestError::ServerError
    })?;
    Ok(Json(TokenResponse { token }))
}

// ----------------- User Handlers -----------------
pub async fn list_users(
    _: AdminUser,
    Extension(state): Extension<AppState>,
) -> JsonResult<Vec<User>> {
    Ok(Json(state.store.list_users().await?))
}

pub async fn get_user_by_email(
    caller: Caller,
    Extension(state): Extension<AppState>,
    Path(email): Path<String>,
) -> JsonResult<User> {
    caller.ensure_can_act_for(&state, &email).await?;
    let user = state
        .store
        .get_user_by_email(&email)
        .await?
        .ok_or(RequestError::NotFound("User not found"))?;
    Ok(Json(user))
}

pub async fn create_user(
    Extension(state): Extension<AppState>,
    Json(user): Json<CreateUserRequest>,
) -> JsonResult<InsertResult> {
    if user.email.trim().is_empty() {
        return Err(RequestError::Validation("email is required"));
    }
    let result = match state.store.insert_user(&user).await? {
        Some(id) => {
            tracing::info!("Registered user {}", user.email);
            InsertResult::inserted(id)
        }
        None => InsertResult::skipped("user already exists"),
    };
    Ok(Json(result))
}

pub async fn update_profile(
    caller: Caller,
    Extension(state): Extension<AppState>,
    Path(email): Path<String>,
    Json(update): Json<ProfileUpdateRequest>,
) -> JsonResult<MessageWrapper> {
    caller.ensure_can_act_for(&state, &email).await?;
    let update = normalize_profile_update(update);
    let result = state.store.update_profile(&email, &update).await?;
    if result.matched_count == 0 {
        return Err(RequestError::NotFound("User not found"));
    }
    let message = if result.modified_count == 1 {
        "Profile updated successfully"
    } else {
        "No changes made to the profile"
    };
    Ok(Json(MessageWrapper::new(message)))
}

pub async fn delete_user(
    _: AdminUser,
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> JsonResult<DeleteResult> {
    let deleted_count = state.store.delete_user(id).await?;
    Ok(Json(DeleteResult { deleted_count }))
}

pub async fn get_subscription_status(
    caller: Caller,
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> JsonResult<SubscriptionStatusResponse> {
    let user = user_by_id(&state, id).await?;
    caller.ensure_can_act_for(&state, &user.email).await?;
    Ok(Json(SubscriptionStatusResponse::new(&user, Utc::now())))
}

pub async fn update_subscription(
    caller: Caller,
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<SubscriptionUpdateRequest>,
) -> JsonResult<UserUpdatedResponse> {
    let user = user_by_id(&state, id).await?;
    caller.ensure_can_act_for(&state, &user.email).await?;
    let is_admin = caller.is_admin(&state).await?;
    if update.role == Some(Role::Admin) && !is_admin {
        return Err(RequestError::Forbidden("forbidden access"));
    }
    validate_subscription_update(&user, &update)?;
    if update.touches_subscription() && !is_admin {
        redeem_purchase(
            state.store.as_ref(),
            state.payments.as_ref(),
            id,
            &update,
            state.premium_max_term,
            Utc::now(),
        )
        .await?;
    }

    let result = state.store.update_subscription(id, &update).await?;
    if result.matched_count == 0 {
        return Err(RequestError::NotFound("User not found"));
    }
    Ok(Json(UserUpdatedResponse {
        message: "User updated successfully".to_string(),
        updated_fields: update,
    }))
}

pub async fn check_admin(
    Extension(state): Extension<AppState>,
    Path(email): Path<String>,
) -> JsonResult<AdminCheckResponse> {
    let admin = state
        .store
        .get_user_by_email(&email)
        .await?
        .map_or(false, |user| user.is_admin());
    Ok(Json(AdminCheckResponse { admin }))
}

pub async fn make_admin(
    AdminUser(admin): AdminUser,
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> JsonResult<WriteResult> {
    let result = state.store.set_role(id, Role::Admin).await?;
    if result.modified_count > 0 {
        tracing::info!("User {} promoted to admin by {:?}", id, admin);
    }
    Ok(Json(result))
}
// ----------------- End User Handlers -----------------

// ----------------- Article Handlers -----------------
pub async fn list_articles(
    Extension(state): Extension<AppState>,
    Query(params): Query<ArticleQueryParams>,
) -> JsonResult<Vec<Article>> {
    let articles = state.store.list_articles(&params.into()).await?;
    Ok(Json(articles))
}

pub async fn get_article(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> JsonResult<Article> {
    let article = state
        .store
        .record_article_view(id)
        .await?
        .ok_or(RequestError::NotFound("Article not found."))?;
    Ok(Json(article))
}

pub async fn get_decline_reason(
    caller: Caller,
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> JsonResult<DeclineReasonResponse> {
    let article = article_by_id(&state, id).await?;
    caller
        .ensure_can_act_for(&state, &article.author_email)
        .await?;
    Ok(Json(DeclineReasonResponse::new(article)))
}

pub async fn create_article(
    Caller(caller): Caller,
    Extension(state): Extension<AppState>,
    Json(article): Json<CreateArticleRequest>,
) -> JsonResult<ArticleCreatedResponse> {
    if let Some(email) = caller {
        if email != article.author_email {
            return Err(RequestError::Forbidden("forbidden access"));
        }
    }
    let article_id = admit_article(state.store.as_ref(), &article).await?;
    Ok(Json(ArticleCreatedResponse {
        message: "Article published successfully".to_string(),
        article_id,
    }))
}

pub async fn approve_article(
    _: AdminUser,
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> JsonResult<WriteResult> {
    Ok(Json(state.store.approve_article(id).await?))
}

pub async fn decline_article(
    _: AdminUser,
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<DeclineArticleRequest>,
) -> JsonResult<WriteResult> {
    let result = state
        .store
        .decline_article(id, request.reason.as_deref())
        .await?;
    Ok(Json(result))
}

pub async fn update_article(
    caller: Caller,
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateArticleRequest>,
) -> JsonResult<MessageWrapper> {
    let content = validate_article_update(state.store.as_ref(), request).await?;
    let article = article_by_id(&state, id).await?;
    caller
        .ensure_can_act_for(&state, &article.author_email)
        .await?;

    let result = state.store.update_article_content(id, &content).await?;
    if result.matched_count == 0 {
        return Err(RequestError::NotFound("Article not found."));
    }
    Ok(Json(MessageWrapper::new("Article updated successfully.")))
}

pub async fn mark_article_premium(
    _: AdminUser,
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> JsonResult<WriteResult> {
    Ok(Json(state.store.mark_article_premium(id).await?))
}

pub async fn delete_article(
    _: AdminUser,
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> JsonResult<DeleteResult> {
    let deleted_count = state.store.delete_article(id).await?;
    Ok(Json(DeleteResult { deleted_count }))
}

// ----------------- Publisher Handlers -----------------
pub async fn list_publishers(Extension(state): Extension<AppState>) -> JsonResult<Vec<Publisher>> {
    Ok(Json(state.store.list_publishers().await?))
}

pub async fn create_publisher(
    _: AdminUser,
    Extension(state): Extension<AppState>,
    Json(publisher): Json<CreatePublisherRequest>,
) -> JsonResult<InsertResult> {
    if publisher.name.trim().is_empty() {
        return Err(RequestError::Validation("name is required"));
    }
    let id = state.store.insert_publisher(&publisher).await?;
    Ok(Json(InsertResult::inserted(id)))
}

// ----------------- Payment Handlers -----------------
pub async fn create_payment_intent(
    _: Caller,
    Extension(state): Extension<AppState>,
    Json(request): Json<PaymentIntentRequest>,
) -> JsonResult<PaymentIntentResponse> {
    let amount = validate_payment_amount(request.amount)?;
    let client_secret = state
        .payments
        .create_payment_intent(amount)
        .await
        .map_err(|e| {
            tracing::error!("Error creating payment intent: {:#}", e);
            RequestError::PaymentFailed
        })?;
    Ok(Json(PaymentIntentResponse { client_secret }))
}
