//! Storage abstraction for the lottery core.
//!
//! A [`LotteryStore`] runs each operation as one atomic unit: it either
//! commits everything the operation writes or nothing. Business decisions
//! are delegated to the pure functions in [`crate::purchase`],
//! [`crate::draw`] and [`crate::claim`], so every backend applies the same
//! rules.
//!
//! # Implementations
//!
//! - `PostgresLotteryStore` (in `lotto-postgres`): row locks inside `sqlx` transactions
//! - `InMemoryLotteryStore` (in `lotto-testing`): one mutex around the whole state

use crate::claim::ClaimReceipt;
use crate::draw::{DrawAssignments, RewardEntry, SettlementSummary};
use crate::error::Result;
use crate::purchase::{PurchaseReceipt, PurchaseRequest, Quote};
use crate::types::{Money, OwnedTicket, TicketId, TicketNumber, UserId};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`LotteryStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Transactional store behind the purchase, settlement and claim operations.
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the trait stays usable
/// as `Arc<dyn LotteryStore>`.
///
/// Dropping a returned future before it completes must leave the store
/// exactly as it was.
pub trait LotteryStore: Send + Sync {
    /// Reserves the requested tickets, records the order and debits the buyer.
    ///
    /// Tickets are locked in ascending id order.
    ///
    /// # Errors
    ///
    /// - `UserNotFound`: no account for the buyer
    /// - `TicketsUnavailable`: some tickets missing or already sold
    /// - `InsufficientFunds`: balance below the order total
    /// - `TransactionConflict`: lock timeout or deadlock, nothing committed
    fn purchase(&self, request: PurchaseRequest) -> StoreFuture<'_, PurchaseReceipt>;

    /// Replaces the active reward set and settles every pending line.
    ///
    /// # Errors
    ///
    /// - `TicketNotFound`: a tier references an unknown ticket
    /// - `TransactionConflict`: lock timeout or deadlock, nothing committed
    fn settle(&self, draw: DrawAssignments) -> StoreFuture<'_, SettlementSummary>;

    /// Pays out the prize of the user's winning line for `number`, once.
    ///
    /// # Errors
    ///
    /// - `TicketNotFound`: no ticket carries `number`
    /// - `NotOwner`: the user never bought a ticket with `number`
    /// - `NotAWinningTicket`: the line is pending or lost
    /// - `AlreadyClaimed`: the prize was paid before
    /// - `TransactionConflict`: lock timeout or deadlock, nothing committed
    fn claim(&self, user_id: UserId, number: TicketNumber) -> StoreFuture<'_, ClaimReceipt>;

    /// Every ticket the user bought, ordered by purchase line.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    fn list_owned_tickets(&self, user_id: UserId) -> StoreFuture<'_, Vec<OwnedTicket>>;

    /// Prices a cart without reserving anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    fn quote(&self, ticket_ids: Vec<TicketId>) -> StoreFuture<'_, Quote>;

    /// The active reward set, ordered by tier. Empty before the first draw.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage read fails.
    fn current_rewards(&self) -> StoreFuture<'_, Vec<RewardEntry>>;

    /// The user's current balance.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if the user has no account.
    fn balance(&self, user_id: UserId) -> StoreFuture<'_, Money>;
}
