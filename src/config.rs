//! Server configuration.

use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database URL.
    pub database_url: String,
    /// Whether requests must carry a valid token.
    pub auth_enabled: bool,
    /// HMAC secret used to sign tokens.
    pub jwt_secret: String,
    /// Token lifetime in hours.
    pub jwt_expiration_hours: i64,
    /// Shared secret the sign-in backend presents to obtain tokens.
    pub token_issuer_key: String,
    /// Stripe secret key. Payments are disabled without it.
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    pub payment_currency: String,
    /// Longest premium term a paying user may grant themselves.
    pub premium_max_term_days: i64,
    /// Period of the subscription expiry sweep.
    pub sweep_interval_secs: u64,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, value)),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let auth_enabled = parse_flag("AUTH_ENABLED", true);
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_default();
        if auth_enabled && jwt_secret.is_empty() {
            bail!("JWT_SECRET is required when AUTH_ENABLED is true");
        }
        let token_issuer_key = env::var("TOKEN_ISSUER_KEY").unwrap_or_default();
        if auth_enabled && token_issuer_key.is_empty() {
            bail!("TOKEN_ISSUER_KEY is required when AUTH_ENABLED is true");
        }

        let premium_max_term_days = parse_var("PREMIUM_MAX_TERM_DAYS", 30)?;
        if premium_max_term_days <= 0 {
            bail!("PREMIUM_MAX_TERM_DAYS must be greater than zero");
        }

        let sweep_interval_secs = parse_var("SUBSCRIPTION_SWEEP_INTERVAL_SECS", 60)?;
        if sweep_interval_secs == 0 {
            bail!("SUBSCRIPTION_SWEEP_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("PORT", 5000)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://insightly.db".to_string()),
            auth_enabled,
            jwt_secret,
            jwt_expiration_hours: parse_var("JWT_EXPIRATION_HOURS", 1)?,
            token_issuer_key,
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok().filter(|k| !k.is_empty()),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            payment_currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            premium_max_term_days,
            sweep_interval_secs,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Returns the server address.
    pub fn server_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid server address {}:{}", self.host, self.port))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn premium_max_term(&self) -> chrono::Duration {
        chrono::Duration::days(self.premium_max_term_days)
    }
}
