//! `PostgreSQL` lottery store.
//!
//! This crate provides the production [`LotteryStore`](lotto_core::LotteryStore)
//! over `sqlx`. It supports:
//!
//! - Purchases that lock tickets in ascending id order and debit the buyer atomically
//! - Settlement that replaces the reward set and reclassifies pending lines in one transaction
//! - Exactly-once claims guarded by a row lock on the purchase line
//! - Per-transaction `lock_timeout` / `statement_timeout`, surfaced as retryable conflicts
//! - Embedded schema migrations
//!
//! # Example
//!
//! ```ignore
//! use lotto_postgres::{PostgresLotteryStore, StoreConfig};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresLotteryStore::connect("postgres://localhost/lotto", StoreConfig::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod error;
mod store;

pub use config::StoreConfig;
pub use error::map_sqlx_error;
pub use store::PostgresLotteryStore;
