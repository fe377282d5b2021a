//! Error taxonomy for the lottery core.
//!
//! Every operation either commits fully or fails with one of these variants.
//! Callers tell retryable failures apart from terminal ones with
//! [`LotteryError::is_retryable`]: only [`LotteryError::TransactionConflict`]
//! is worth retrying, everything else means the request itself is invalid.

use crate::types::{Money, TicketId, TicketNumber, UserId};
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the lottery crates.
pub type Result<T> = std::result::Result<T, LotteryError>;

/// How a missing ticket was looked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketLookup {
    /// Looked up by primary key.
    Id(TicketId),
    /// Looked up by its printed 6-digit number.
    Number(TicketNumber),
}

impl fmt::Display for TicketLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Number(number) => write!(f, "number {number}"),
        }
    }
}

/// Errors produced by the purchase, settlement and claim operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LotteryError {
    /// Some requested tickets are no longer available.
    ///
    /// Recoverable: the caller can re-quote and retry with a different set.
    #[error("Tickets not available: {}", format_ids(.missing))]
    TicketsUnavailable {
        /// Every requested id that could not be locked as available, ascending.
        missing: Vec<TicketId>,
    },

    /// The buyer's balance does not cover the order total.
    #[error("Insufficient funds: balance {balance} < required {required}")]
    InsufficientFunds {
        /// Balance at the time of the attempt.
        balance: Money,
        /// Total price of the requested tickets.
        required: Money,
    },

    /// No account exists for the user.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// The referenced ticket does not exist.
    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketLookup),

    /// The user never purchased a ticket with this number.
    #[error("User {user_id} does not own ticket {number}")]
    NotOwner {
        /// Claiming user.
        user_id: UserId,
        /// Ticket number being claimed.
        number: TicketNumber,
    },

    /// The purchase line did not win in the draw that settled it (or is unsettled).
    #[error("Ticket {0} is not a winning ticket")]
    NotAWinningTicket(TicketNumber),

    /// The prize for this line has already been paid out.
    #[error("Prize for ticket {0} has already been claimed")]
    AlreadyClaimed(TicketNumber),

    /// The purchase request named no tickets.
    #[error("Purchase request contains no ticket ids")]
    EmptyRequest,

    /// Text that is not a 6-digit ticket number.
    #[error("Invalid ticket number: {0:?}")]
    InvalidTicketNumber(String),

    /// Draw assignments or prize amounts are malformed.
    #[error("Invalid draw: {0}")]
    InvalidDraw(String),

    /// Lock wait timed out, deadlock victim, or serialization failure.
    ///
    /// The transaction was rolled back in full; retrying with backoff is safe.
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    /// Unexpected storage failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl LotteryError {
    /// Whether the failed operation can be retried unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionConflict(_))
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TicketsUnavailable { .. } => "tickets_unavailable",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::UserNotFound(_) => "user_not_found",
            Self::TicketNotFound(_) => "ticket_not_found",
            Self::NotOwner { .. } => "not_owner",
            Self::NotAWinningTicket(_) => "not_a_winning_ticket",
            Self::AlreadyClaimed(_) => "already_claimed",
            Self::EmptyRequest => "empty_request",
            Self::InvalidTicketNumber(_) => "invalid_ticket_number",
            Self::InvalidDraw(_) => "invalid_draw",
            Self::TransactionConflict(_) => "transaction_conflict",
            Self::Database(_) => "database",
        }
    }
}

fn format_ids(ids: &[TicketId]) -> String {
    let joined = ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{joined}]")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(LotteryError::TransactionConflict("deadlock".into()).is_retryable());
        assert!(!LotteryError::EmptyRequest.is_retryable());
        assert!(!LotteryError::Database("boom".into()).is_retryable());
        assert!(
            !LotteryError::TicketsUnavailable {
                missing: vec![TicketId::new(1)]
            }
            .is_retryable()
        );
    }

    #[test]
    fn unavailable_message_names_every_ticket() {
        let err = LotteryError::TicketsUnavailable {
            missing: vec![TicketId::new(10), TicketId::new(12)],
        };
        assert_eq!(err.to_string(), "Tickets not available: [10, 12]");
    }

    #[test]
    fn not_found_message_names_lookup() {
        let err = LotteryError::TicketNotFound(TicketLookup::Number(
            TicketNumber::parse("123456").unwrap(),
        ));
        assert_eq!(err.to_string(), "Ticket not found: number 123456");
        assert_eq!(err.kind(), "ticket_not_found");
    }
}
