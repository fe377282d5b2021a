//! # Lotto Testing
//!
//! Testing utilities for the lottery crates.
//!
//! This crate provides:
//! - [`InMemoryLotteryStore`]: a `LotteryStore` with the same semantics as the `PostgreSQL` one
//! - [`LotteryFixture`]: builder for seeded stores
//! - [`FixedClock`] / [`test_clock`]: deterministic time
//!
//! ## Example
//!
//! ```
//! use lotto_core::{LotteryStore, Money, PurchaseRequest, TicketId, UserId};
//! use lotto_testing::LotteryFixture;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LotteryFixture::new().ticket(10, "123456", 80).account(1, 100).build();
//! let receipt = store
//!     .purchase(PurchaseRequest::new(UserId::new(1), [TicketId::new(10)])?)
//!     .await?;
//! assert_eq!(receipt.total_price, Money::from_major(80));
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod in_memory_store;

use chrono::{DateTime, Utc};
use lotto_core::environment::Clock;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use lotto_testing::mocks::FixedClock;
    /// use lotto_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

pub use fixtures::LotteryFixture;
pub use in_memory_store::InMemoryLotteryStore;
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }
}
