use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct MessageWrapper {
    pub message: String,
}

/// `inserted_id` is null when the write was skipped, `message` says why.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsertResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub inserted_id: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy, Default)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
}

impl InsertResult {
    pub fn inserted(id: i64) -> Self {
        InsertResult {
            message: None,
            inserted_id: Some(id),
        }
    }

    pub fn skipped(message: &str) -> Self {
        InsertResult {
            message: Some(message.to_string()),
            inserted_id: None,
        }
    }
}

impl MessageWrapper {
    pub fn new(message: &str) -> Self {
        MessageWrapper {
            message: message.to_string(),
        }
    }
}
