use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::{db_helpers::StoreError, JsonResponse};

#[derive(Debug)]
pub enum RequestError {
    NotFound(&'static str),
    NotAuthorized(&'static str),
    Forbidden(&'static str),
    Validation(&'static str),
    PaymentFailed,
    ServerError,
    DatabaseError(StoreError),
}

/// Every failure body carries a human readable `message`, except payment
/// failures which answer with `error`.
#[derive(Debug, Serialize)]
pub struct RequestErrorJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RequestErrorJson {
    pub fn message(message: &str) -> RequestErrorJson {
        RequestErrorJson {
            message: Some(message.to_string()),
            error: None,
        }
    }

    pub fn error(error: &str) -> RequestErrorJson {
        RequestErrorJson {
            message: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<StoreError> for RequestError {
    fn from(value: StoreError) -> Self {
        Self::DatabaseError(value)
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> axum::response::Response {
        self.to_json_response().into_response()
    }
}

impl RequestError {
    pub fn to_json_response(&self) -> JsonResponse<RequestErrorJson> {
        let (status_code, json) = match self {
            RequestError::NotFound(message) => {
                (StatusCode::NOT_FOUND, RequestErrorJson::message(message))
            }
            RequestError::NotAuthorized(message) => {
                (StatusCode::UNAUTHORIZED, RequestErrorJson::message(message))
            }
            RequestError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, RequestErrorJson::message(message))
            }
            RequestError::Validation(message) => {
                (StatusCode::BAD_REQUEST, RequestErrorJson::message(message))
            }
            RequestError::PaymentFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                RequestErrorJson::error("Failed to create payment intent"),
            ),
            RequestError::ServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                RequestErrorJson::message("Internal server error"),
            ),
            RequestError::DatabaseError(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    RequestErrorJson::message("Internal server error"),
                )
            }
        };
        (status_code, Json(json))
    }
}
