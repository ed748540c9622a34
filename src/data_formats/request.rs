use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Role;

// ----------------- User Request -----------------
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TokenRequest {
    pub email: String,
}

/// Sent by the client on first sign-in. Any role in the payload is ignored.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    pub photo: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriptionUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium_taken: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Paid intent backing a self-service premium purchase.
    #[serde(skip_serializing)]
    pub payment_intent_id: Option<String>,
}

impl SubscriptionUpdateRequest {
    pub fn touches_subscription(&self) -> bool {
        self.role.is_some() || self.premium_taken.is_some()
    }

    pub fn has_changes(&self) -> bool {
        self.touches_subscription() || self.name.is_some() || self.photo.is_some()
    }
}

// ----------------- Article Request -----------------
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateArticleRequest {
    pub author_email: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    pub publisher: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct UpdateArticleRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub publisher: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DeclineArticleRequest {
    pub reason: Option<String>,
}

// ----------------- Publisher Request -----------------
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CreatePublisherRequest {
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
}

// ----------------- Payment Request -----------------
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct PaymentIntentRequest {
    /// In the smallest currency unit (cents for usd).
    pub amount: Option<i64>,
}
