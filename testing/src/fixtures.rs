//! Builders for common lottery test scenarios.

use crate::in_memory_store::InMemoryLotteryStore;
use lotto_core::{Money, TicketId, TicketNumber, UserId};

/// Fluent builder for a seeded [`InMemoryLotteryStore`].
///
/// Prices and balances are given in major units.
///
/// # Example
///
/// ```
/// use lotto_testing::LotteryFixture;
///
/// let store = LotteryFixture::new()
///     .ticket(10, "123456", 80)
///     .ticket(11, "654321", 80)
///     .account(1, 100)
///     .build();
/// assert!(store.ticket(lotto_core::TicketId::new(10)).is_some());
/// ```
#[derive(Debug, Default)]
pub struct LotteryFixture {
    tickets: Vec<(TicketId, TicketNumber, Money)>,
    accounts: Vec<(UserId, Money)>,
}

impl LotteryFixture {
    /// Starts an empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an available ticket.
    ///
    /// # Panics
    ///
    /// Panics if `number` is not a 6-digit ticket number.
    #[must_use]
    #[allow(clippy::expect_used)] // Fixture input is hardcoded by the test author
    pub fn ticket(mut self, id: i64, number: &str, price: i64) -> Self {
        let number = TicketNumber::parse(number).expect("fixture ticket number must be 6 digits");
        self.tickets
            .push((TicketId::new(id), number, Money::from_major(price)));
        self
    }

    /// Adds `count` available tickets with ids `first_id..` and numbers
    /// derived from the id (`000042` for id 42).
    #[must_use]
    pub fn tickets(mut self, first_id: i64, count: i64, price: i64) -> Self {
        for id in first_id..first_id + count {
            let raw = format!("{:06}", id.rem_euclid(1_000_000));
            if let Ok(number) = TicketNumber::parse(&raw) {
                self.tickets
                    .push((TicketId::new(id), number, Money::from_major(price)));
            }
        }
        self
    }

    /// Opens an account.
    #[must_use]
    pub fn account(mut self, user_id: i64, balance: i64) -> Self {
        self.accounts
            .push((UserId::new(user_id), Money::from_major(balance)));
        self
    }

    /// Builds the store.
    #[must_use]
    pub fn build(self) -> InMemoryLotteryStore {
        let store = InMemoryLotteryStore::new();
        for (id, number, price) in self.tickets {
            store.insert_ticket(id, number, price);
        }
        for (user_id, balance) in self.accounts {
            store.open_account(user_id, balance);
        }
        store
    }
}
