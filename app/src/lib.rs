//! # Lotto App
//!
//! Wires the lottery together for production: configuration from the
//! environment, a `PostgreSQL` pool, the migrated store and the
//! [`LotteryService`] that retries transaction conflicts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;

pub use config::Config;

use lotto_core::LotteryError;
use lotto_postgres::PostgresLotteryStore;
use lotto_runtime::LotteryService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while starting or stopping the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// The connection pool could not be created.
    #[error("Database connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    /// Migrations failed to apply.
    #[error("Migration failed: {0}")]
    Migration(#[source] LotteryError),

    /// A configuration value is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// A running lottery backed by `PostgreSQL`.
pub struct LotteryApp {
    config: Config,
    service: LotteryService<PostgresLotteryStore>,
}

impl LotteryApp {
    /// Connects, migrates and builds the service.
    ///
    /// # Errors
    ///
    /// - [`AppError::Config`] if the prize table is invalid
    /// - [`AppError::Connect`] if the pool cannot reach the database
    /// - [`AppError::Migration`] if the schema cannot be applied
    pub async fn bootstrap(config: Config) -> Result<Self, AppError> {
        let prizes = config
            .prize_table()
            .map_err(|e| AppError::Config(e.to_string()))?;

        info!(
            max_connections = config.postgres.max_connections,
            "Connecting to PostgreSQL..."
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.postgres.max_connections)
            .min_connections(config.postgres.min_connections)
            .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
            .idle_timeout(Some(Duration::from_secs(config.postgres.idle_timeout)))
            .connect(&config.postgres.url)
            .await
            .map_err(AppError::Connect)?;

        let store = PostgresLotteryStore::new(pool, config.store_config());
        store.migrate().await.map_err(AppError::Migration)?;
        info!("✓ Schema migrated");

        let service = LotteryService::new(Arc::new(store))
            .with_retry_policy(config.retry_policy())
            .with_prizes(prizes);

        Ok(Self { config, service })
    }

    /// The lottery operations.
    #[must_use]
    pub const fn service(&self) -> &LotteryService<PostgresLotteryStore> {
        &self.service
    }

    /// Configuration the app was started with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Closes the pool, waiting at most the configured shutdown timeout for
    /// in-flight transactions.
    pub async fn shutdown(self) {
        let timeout = self.config.shutdown_timeout();
        let pool = self.service.store().pool().clone();
        if tokio::time::timeout(timeout, pool.close()).await.is_err() {
            warn!(timeout_secs = timeout.as_secs(), "Pool did not close before timeout");
        } else {
            info!("✓ Database pool closed");
        }
    }
}

impl std::fmt::Debug for LotteryApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LotteryApp")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
