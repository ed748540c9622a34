use anyhow::{Context, Result};
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use axum::Extension;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::{config::Config, errors::RequestError, AppState};

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub enabled: bool,
    pub jwt_secret: String,
    pub token_lifetime: time::Duration,
    /// Presented by the sign-in backend in `X-Issuer-Key` when asking for a
    /// token.
    pub issuer_key: String,
}

pub const ISSUER_KEY_HEADER: &str = "X-Issuer-Key";

impl AuthConfig {
    pub fn from_config(config: &Config) -> Self {
        AuthConfig {
            enabled: config.auth_enabled,
            jwt_secret: config.jwt_secret.clone(),
            token_lifetime: time::Duration::hours(config.jwt_expiration_hours),
            issuer_key: config.token_issuer_key.clone(),
        }
    }

    /// Open access, as the service behaved before tokens were enforced.
    pub fn disabled() -> Self {
        AuthConfig {
            enabled: false,
            jwt_secret: String::new(),
            token_lifetime: time::Duration::hours(1),
            issuer_key: String::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AuthClaim {
    email: String,
    exp: i64,
}

/// The caller behind a request. Holds `None` when authentication is
/// disabled, in which case every ownership check passes.
pub struct Caller(pub Option<String>);

/// A caller whose account has the admin role.
pub struct AdminUser(pub Option<String>);

async fn app_state<S>(parts: &mut Parts, state: &S) -> Result<AppState, RequestError>
where
    S: Send + Sync,
{
    let Extension(app_state) = Extension::<AppState>::from_request_parts(parts, state)
        .await
        .map_err(|_| RequestError::ServerError)?;
    Ok(app_state)
}

fn bearer_token(parts: &Parts) -> Result<&str, RequestError> {
    let header = parts
        .headers
        .get("Authorization")
        .ok_or(RequestError::NotAuthorized("unauthorized access"))?;
    let header = header.to_str().map_err(|_| {
        tracing::debug!("Authorization header is not valid ascii");
        RequestError::NotAuthorized("unauthorized access")
    })?;
    header
        .strip_prefix("Bearer ")
        .ok_or(RequestError::NotAuthorized("unauthorized access"))
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = RequestError;
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = app_state(parts, state).await?;
        if !app_state.auth.enabled {
            return Ok(Caller(None));
        }
        let email = verify_jwt_token(bearer_token(parts)?, &app_state.auth)?;
        Ok(Caller(Some(email)))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = RequestError;
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = app_state(parts, state).await?;
        let Caller(caller) = Caller::from_request_parts(parts, state).await?;
        let Some(email) = caller else {
            return Ok(AdminUser(None));
        };
        match app_state.store.get_user_by_email(&email).await? {
            Some(user) if user.is_admin() => Ok(AdminUser(Some(email))),
            _ => Err(RequestError::Forbidden("forbidden access")),
        }
    }
}

impl Caller {
    /// Lets the request through when the caller is `email` itself or an
    /// admin.
    pub async fn ensure_can_act_for(
        &self,
        state: &AppState,
        email: &str,
    ) -> Result<(), RequestError> {
        let Some(caller) = &self.0 else {
            return Ok(());
        };
        if caller == email || self.is_admin(state).await? {
            Ok(())
        } else {
            Err(RequestError::Forbidden("forbidden access"))
        }
    }

    pub async fn is_admin(&self, state: &AppState) -> Result<bool, RequestError> {
        match &self.0 {
            None => Ok(true),
            Some(caller) => Ok(state
                .store
                .get_user_by_email(caller)
                .await?
                .map_or(false, |user| user.is_admin())),
        }
    }
}

/// Only the sign-in backend, which has already proven the user's identity,
/// may ask for tokens.
pub fn check_issuer_key(headers: &HeaderMap, auth: &AuthConfig) -> Result<(), RequestError> {
    if !auth.enabled {
        return Ok(());
    }
    let is_valid = headers
        .get(ISSUER_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|key| key.as_bytes().ct_eq(auth.issuer_key.as_bytes()).into())
        .unwrap_or(false);
    if is_valid {
        Ok(())
    } else {
        Err(RequestError::NotAuthorized("unauthorized access"))
    }
}

pub fn get_jwt_token(email: &str, auth: &AuthConfig) -> Result<String> {
    let expiry_date = OffsetDateTime::now_utc() + auth.token_lifetime;
    let claim = AuthClaim {
        email: email.to_string(),
        exp: expiry_date.unix_timestamp(),
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claim,
        &jsonwebtoken::EncodingKey::from_secret(auth.jwt_secret.as_ref()),
    )
    .context("Failed to generate jwt token")
}

pub fn verify_jwt_token(token: &str, auth: &AuthConfig) -> Result<String, RequestError> {
    let token_data = jsonwebtoken::decode::<AuthClaim>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(auth.jwt_secret.as_ref()),
        &jsonwebtoken::Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Error verifying token: {}", e);
        RequestError::NotAuthorized("unauthorized access")
    })?;
    let claim = token_data.claims;
    if claim.exp < OffsetDateTime::now_utc().unix_timestamp() {
        return Err(RequestError::NotAuthorized("Token expired"));
    }
    Ok(claim.email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AuthConfig {
        AuthConfig {
            enabled: true,
            jwt_secret: "test-secret".to_string(),
            token_lifetime: time::Duration::hours(1),
            issuer_key: "issuer".to_string(),
        }
    }

    #[test]
    fn token_issuance_needs_the_issuer_key() {
        let mut headers = HeaderMap::new();
        assert!(check_issuer_key(&headers, &auth()).is_err());

        headers.insert(ISSUER_KEY_HEADER, "wrong".parse().unwrap());
        assert!(matches!(
            check_issuer_key(&headers, &auth()),
            Err(RequestError::NotAuthorized(_))
        ));

        headers.insert(ISSUER_KEY_HEADER, "issuer".parse().unwrap());
        assert!(check_issuer_key(&headers, &auth()).is_ok());

        // Open mode issues tokens to anyone.
        assert!(check_issuer_key(&HeaderMap::new(), &AuthConfig::disabled()).is_ok());
    }

    #[test]
    fn issued_tokens_verify_to_the_same_email() {
        let token = get_jwt_token("u@x.com", &auth()).unwrap();
        assert_eq!(verify_jwt_token(&token, &auth()).unwrap(), "u@x.com");
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = get_jwt_token("u@x.com", &auth()).unwrap();
        let other = AuthConfig {
            jwt_secret: "other".to_string(),
            ..auth()
        };
        assert!(matches!(
            verify_jwt_token(&token, &other),
            Err(RequestError::NotAuthorized(_))
        ));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let expired = AuthConfig {
            token_lifetime: time::Duration::hours(-2),
            ..auth()
        };
        let token = get_jwt_token("u@x.com", &expired).unwrap();
        assert!(verify_jwt_token(&token, &auth()).is_err());
    }
}
