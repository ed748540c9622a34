use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Premium,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub photo: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub premium_taken: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A user is premium while `premium_taken` lies in the future, whatever
    /// `role` currently says.
    pub fn is_premium_at(&self, now: DateTime<Utc>) -> bool {
        self.premium_taken.map_or(false, |expiry| expiry > now)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(rename = "_id")]
    pub id: i64,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub publisher: String,
    pub tags: Vec<String>,
    pub author_email: String,
    pub is_approved: bool,
    pub is_declined: bool,
    pub decline_reason: Option<String>,
    pub is_premium: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Approved,
    Pending,
    Declined,
}

impl Article {
    pub fn status(&self) -> ArticleStatus {
        if self.is_approved {
            ArticleStatus::Approved
        } else if self.is_declined {
            ArticleStatus::Declined
        } else {
            ArticleStatus::Pending
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Publisher {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
}
