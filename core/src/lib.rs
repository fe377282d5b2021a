//! # Lotto Core
//!
//! Domain types, business rules and the storage trait for a lottery that
//! sells numbered tickets, settles prize draws and pays out winners.
//!
//! ## Components
//!
//! - **Ticket inventory**: [`types::Ticket`] and its `Available → Sold` status
//! - **Account ledger**: [`types::Account`], a non-negative balance per user
//! - **Purchase coordinator**: [`purchase::PurchasePlan`] decides, the store commits
//! - **Prize settlement**: [`draw::ActiveDraw`] classifies, the store replaces the reward set
//! - **Claim processor**: [`claim::evaluate_claim`] decides, the store pays once
//!
//! ## Architecture
//!
//! Functional core, imperative shell: everything here is pure and
//! synchronous. The [`store::LotteryStore`] trait is the shell boundary;
//! its implementations own the transactions and locks.
//!
//! ```text
//! request ──► PurchaseRequest::new ──► store.purchase
//!                                        │ lock tickets (ascending id)
//!                                        │ PurchasePlan::build
//!                                        │ write order, lines, debit
//!                                        ▼
//!                                   PurchaseReceipt
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod claim;
pub mod draw;
pub mod environment;
pub mod error;
pub mod purchase;
pub mod store;
pub mod types;

pub use claim::{ClaimReceipt, evaluate_claim, select_claim_line};
pub use draw::{
    ActiveDraw, DrawAssignments, LineVerdict, PrizeMatch, PrizeTable, RewardEntry,
    SettlementSummary,
};
pub use error::{LotteryError, Result, TicketLookup};
pub use purchase::{
    PurchaseLineItem, PurchasePlan, PurchaseReceipt, PurchaseRequest, Quote, QuoteItem,
    collapse_ticket_ids,
};
pub use store::{LotteryStore, StoreFuture};
pub use types::*;
