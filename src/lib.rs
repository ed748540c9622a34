pub mod admission;
pub mod authentication;
pub mod config;
pub mod data_formats;
pub mod db_helpers;
pub mod errors;
mod handlers;
pub mod models;
pub mod payment;
pub mod subscription;
pub mod validation;

use std::sync::Arc;

use anyhow::Context;
pub use anyhow::Result;
use axum::http::StatusCode;
use axum::{routing::*, Extension, Json, Router};
use handlers::*;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    authentication::AuthConfig,
    config::Config,
    db_helpers::{SqliteStore, Store},
    payment::{DisabledPayments, PaymentProvider, StripeClient},
};

pub type JsonResponse<T> = (StatusCode, Json<T>);

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub payments: Arc<dyn PaymentProvider>,
    pub auth: AuthConfig,
    /// Longest term a self-service premium purchase may set.
    pub premium_max_term: chrono::Duration,
}

pub async fn run_app(config: Config) -> Result<()> {
    let address = config.server_addr()?;
    let pool = init_db(&config.database_url).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let payments: Arc<dyn PaymentProvider> = match &config.stripe_secret_key {
        Some(key) => Arc::new(StripeClient::new(
            key.clone(),
            config.stripe_api_base.clone(),
            config.payment_currency.clone(),
        )?),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY is not set, payment intents are disabled");
            Arc::new(DisabledPayments)
        }
    };

    if !config.auth_enabled {
        tracing::warn!("Authentication is disabled, every route is open");
    }

    let state = AppState {
        store: store.clone(),
        payments,
        auth: AuthConfig::from_config(&config),
        premium_max_term: config.premium_max_term(),
    };

    let cancel = CancellationToken::new();
    let sweeper = subscription::start(store, config.sweep_interval(), cancel.clone());

    tracing::info!("Insightly is running on {}", address);
    let shutdown = cancel.clone();
    let served = axum::Server::bind(&address)
        .serve(make_app(state).into_make_service())
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
                _ = shutdown.cancelled() => {}
            }
        })
        .await;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!("Subscription sweeper task failed: {}", e);
    }
    served.context("Server error")?;
    Ok(())
}

pub async fn init_db(db_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        tracing::info!("Creating database {}", db_url);
        Sqlite::create_database(db_url)
            .await
            .with_context(|| format!("Failed to create database {}", db_url))?;
    } else {
        tracing::info!("Database already exists");
    }
    let pool = SqlitePoolOptions::new()
        .connect(db_url)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    tracing::info!("Running Migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations completed");
    Ok(())
}

/// The router with its state, CORS and request tracing attached.
pub fn make_app(state: AppState) -> Router {
    make_router()
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub fn make_router() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/check_health", get(alive))
        .route("/jwt", post(issue_token))
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:key",
            get(get_user_by_email)
                .patch(update_profile)
                .delete(delete_user),
        )
        .route(
            "/users/subscription/:id",
            get(get_subscription_status).patch(update_subscription),
        )
        .route("/users/admin/:key", get(check_admin).patch(make_admin))
        .route("/articles", get(list_articles).post(create_article))
        .route("/articles/:id", get(get_article).delete(delete_article))
        .route("/articles/decline-reason/:id", get(get_decline_reason))
        .route("/articles/approve/:id", patch(approve_article))
        .route("/articles/decline/:id", patch(decline_article))
        .route("/articles/update/:id", patch(update_article))
        .route("/articles/premium/:id", patch(mark_article_premium))
        .route("/publishers", get(list_publishers).post(create_publisher))
        .route("/create-payment-intent", post(create_payment_intent))
        .fallback(not_found)
}
