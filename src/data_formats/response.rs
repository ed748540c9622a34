use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Article, Role, User};

use super::request::SubscriptionUpdateRequest;

#[derive(Deserialize, Serialize, Debug)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct AdminCheckResponse {
    pub admin: bool,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub is_premium: bool,
    pub premium_taken: Option<DateTime<Utc>>,
    pub role: Role,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdatedResponse {
    pub message: String,
    pub updated_fields: SubscriptionUpdateRequest,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ArticleCreatedResponse {
    pub message: String,
    pub article_id: i64,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeclineReasonResponse {
    #[serde(rename = "_id")]
    pub id: i64,
    pub decline_reason: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}

impl SubscriptionStatusResponse {
    pub fn new(user: &User, now: DateTime<Utc>) -> Self {
        SubscriptionStatusResponse {
            is_premium: user.is_premium_at(now),
            premium_taken: user.premium_taken,
            role: user.role,
        }
    }
}

impl DeclineReasonResponse {
    pub fn new(Article { id, decline_reason, .. }: Article) -> Self {
        DeclineReasonResponse { id, decline_reason }
    }
}
