//! Purchase requests, the purchase decision, quotes and receipts.
//!
//! [`PurchasePlan::build`] is the whole decision a purchase transaction makes
//! between locking the tickets and writing the order: which requested tickets
//! are missing, what the total is, and whether the buyer can pay for it.

use crate::error::{LotteryError, Result};
use crate::types::{
    LineId, Money, OrderId, Ticket, TicketId, TicketNumber, TicketStatus, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Collapses duplicate ids and sorts them ascending (the lock order).
#[must_use]
pub fn collapse_ticket_ids(ids: impl IntoIterator<Item = TicketId>) -> Vec<TicketId> {
    ids.into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Ids in `requested` that are not in `found`, keeping `requested` order.
#[must_use]
pub fn missing_ticket_ids(
    requested: &[TicketId],
    found: impl IntoIterator<Item = TicketId>,
) -> Vec<TicketId> {
    let found: BTreeSet<_> = found.into_iter().collect();
    requested
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect()
}

/// A validated purchase request: non-empty, de-duplicated, ascending ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    user_id: UserId,
    ticket_ids: Vec<TicketId>,
}

impl PurchaseRequest {
    /// Validates a raw request.
    ///
    /// Asking for the same ticket twice is a single request for it.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::EmptyRequest`] if no ids are given.
    pub fn new(user_id: UserId, ticket_ids: impl IntoIterator<Item = TicketId>) -> Result<Self> {
        let ticket_ids = collapse_ticket_ids(ticket_ids);
        if ticket_ids.is_empty() {
            return Err(LotteryError::EmptyRequest);
        }
        Ok(Self {
            user_id,
            ticket_ids,
        })
    }

    /// Buyer.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Requested tickets, ascending and unique.
    #[must_use]
    pub fn ticket_ids(&self) -> &[TicketId] {
        &self.ticket_ids
    }
}

/// Outcome of a successful purchase decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchasePlan {
    /// Tickets to sell, ascending by id.
    pub tickets: Vec<Ticket>,
    /// Sum of their prices.
    pub total_price: Money,
    /// Balance after the debit.
    pub balance_after: Money,
}

impl PurchasePlan {
    /// Decides a purchase from the rows locked inside the transaction.
    ///
    /// `locked` may contain tickets in any order and status; only available
    /// tickets that were requested count.
    ///
    /// # Errors
    ///
    /// - [`LotteryError::TicketsUnavailable`] naming every requested id that
    ///   is not among the available locked tickets
    /// - [`LotteryError::InsufficientFunds`] if `balance` is below the total
    pub fn build(request: &PurchaseRequest, balance: Money, locked: Vec<Ticket>) -> Result<Self> {
        let mut tickets: Vec<Ticket> = locked
            .into_iter()
            .filter(|t| {
                t.status == TicketStatus::Available && request.ticket_ids.binary_search(&t.id).is_ok()
            })
            .collect();
        tickets.sort_by_key(|t| t.id);
        tickets.dedup_by_key(|t| t.id);

        let missing = missing_ticket_ids(&request.ticket_ids, tickets.iter().map(|t| t.id));
        if !missing.is_empty() {
            return Err(LotteryError::TicketsUnavailable { missing });
        }

        let total_price = Money::checked_sum(tickets.iter().map(|t| t.price))
            .ok_or_else(|| LotteryError::Database("order total overflows".to_string()))?;
        if balance < total_price {
            return Err(LotteryError::InsufficientFunds {
                balance,
                required: total_price,
            });
        }
        let balance_after = balance
            .checked_sub(total_price)
            .ok_or_else(|| LotteryError::Database("balance underflow".to_string()))?;

        Ok(Self {
            tickets,
            total_price,
            balance_after,
        })
    }
}

/// One purchased ticket on a receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLineItem {
    /// Created purchase line.
    pub line_id: LineId,
    /// Ticket id.
    pub ticket_id: TicketId,
    /// Printed number.
    pub number: TicketNumber,
    /// Price paid.
    pub price: Money,
}

/// Result of a committed purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    /// Created order.
    pub order_id: OrderId,
    /// Buyer.
    pub user_id: UserId,
    /// Line items sorted by ticket id.
    pub lines: Vec<PurchaseLineItem>,
    /// Order total.
    pub total_price: Money,
    /// Buyer's balance after the debit.
    pub balance_after: Money,
    /// Commit time.
    pub created_at: DateTime<Utc>,
}

/// A priced ticket on a quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteItem {
    /// Ticket id.
    pub ticket_id: TicketId,
    /// Printed number.
    pub number: TicketNumber,
    /// Current price.
    pub price: Money,
}

/// Read-only price check of a cart. Nothing is reserved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Available tickets, ascending by id.
    pub items: Vec<QuoteItem>,
    /// Sum of their prices.
    pub total_price: Money,
    /// Requested ids that are missing or already sold.
    pub not_available: Vec<TicketId>,
}

impl Quote {
    /// Builds a quote for `requested` from whatever tickets were found.
    #[must_use]
    pub fn build(requested: &[TicketId], found: Vec<Ticket>) -> Self {
        let requested = collapse_ticket_ids(requested.iter().copied());
        let mut items: Vec<QuoteItem> = found
            .into_iter()
            .filter(|t| t.status == TicketStatus::Available && requested.binary_search(&t.id).is_ok())
            .map(|t| QuoteItem {
                ticket_id: t.id,
                number: t.number,
                price: t.price,
            })
            .collect();
        items.sort_by_key(|i| i.ticket_id);
        items.dedup_by_key(|i| i.ticket_id);

        let not_available = missing_ticket_ids(&requested, items.iter().map(|i| i.ticket_id));
        let total_price = items.iter().map(|i| i.price).sum();
        Self {
            items,
            total_price,
            not_available,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ticket(id: i64, number: &str, price: i64) -> Ticket {
        Ticket::available(
            TicketId::new(id),
            TicketNumber::parse(number).unwrap(),
            Money::from_major(price),
        )
    }

    fn ids(raw: &[i64]) -> Vec<TicketId> {
        raw.iter().copied().map(TicketId::new).collect()
    }

    #[test]
    fn duplicates_collapse_into_one_request() {
        let request = PurchaseRequest::new(UserId::new(1), ids(&[11, 10, 11, 10])).unwrap();
        assert_eq!(request.ticket_ids(), ids(&[10, 11]).as_slice());
    }

    #[test]
    fn empty_request_rejected() {
        assert_eq!(
            PurchaseRequest::new(UserId::new(1), Vec::new()),
            Err(LotteryError::EmptyRequest)
        );
    }

    #[test]
    fn plan_debits_the_total() {
        let request = PurchaseRequest::new(UserId::new(1), ids(&[10])).unwrap();
        let plan = PurchasePlan::build(
            &request,
            Money::from_major(100),
            vec![ticket(10, "123456", 80)],
        )
        .unwrap();
        assert_eq!(plan.total_price, Money::from_major(80));
        assert_eq!(plan.balance_after, Money::from_major(20));
        assert_eq!(plan.tickets.len(), 1);
    }

    #[test]
    fn plan_names_every_missing_ticket() {
        let request = PurchaseRequest::new(UserId::new(1), ids(&[10, 11, 12])).unwrap();
        let mut sold = ticket(12, "000012", 80);
        sold.status = TicketStatus::Sold;
        let err = PurchasePlan::build(
            &request,
            Money::from_major(1000),
            vec![ticket(10, "123456", 80), sold],
        )
        .unwrap_err();
        assert_eq!(
            err,
            LotteryError::TicketsUnavailable {
                missing: ids(&[11, 12])
            }
        );
    }

    #[test]
    fn plan_rejects_short_balance() {
        let request = PurchaseRequest::new(UserId::new(1), ids(&[10, 11])).unwrap();
        let err = PurchasePlan::build(
            &request,
            Money::from_major(100),
            vec![ticket(11, "654321", 80), ticket(10, "123456", 80)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            LotteryError::InsufficientFunds {
                balance: Money::from_major(100),
                required: Money::from_major(160),
            }
        );
    }

    #[test]
    fn exact_balance_is_enough() {
        let request = PurchaseRequest::new(UserId::new(1), ids(&[10])).unwrap();
        let plan =
            PurchasePlan::build(&request, Money::from_major(80), vec![ticket(10, "123456", 80)])
                .unwrap();
        assert_eq!(plan.balance_after, Money::ZERO);
    }

    #[test]
    fn plan_ignores_unrequested_rows() {
        let request = PurchaseRequest::new(UserId::new(1), ids(&[10])).unwrap();
        let plan = PurchasePlan::build(
            &request,
            Money::from_major(500),
            vec![ticket(10, "123456", 80), ticket(99, "999999", 80)],
        )
        .unwrap();
        assert_eq!(plan.tickets.iter().map(|t| t.id).collect::<Vec<_>>(), ids(&[10]));
    }

    #[test]
    fn plan_rejects_overflowing_total() {
        let request = PurchaseRequest::new(UserId::new(1), ids(&[10, 11])).unwrap();
        let huge = |id| {
            Ticket::available(
                TicketId::new(id),
                TicketNumber::parse("123456").unwrap(),
                Money::from_minor(i64::MAX),
            )
        };
        let err = PurchasePlan::build(
            &request,
            Money::from_minor(i64::MAX),
            vec![huge(10), huge(11)],
        )
        .unwrap_err();
        assert_eq!(err, LotteryError::Database("order total overflows".to_string()));
    }

    #[test]
    fn quote_reports_unavailable_without_failing() {
        let mut sold = ticket(11, "654321", 80);
        sold.status = TicketStatus::Sold;
        let quote = Quote::build(
            &ids(&[12, 10, 11, 10]),
            vec![sold, ticket(10, "123456", 80)],
        );
        assert_eq!(quote.items.len(), 1);
        assert_eq!(quote.items[0].ticket_id, TicketId::new(10));
        assert_eq!(quote.total_price, Money::from_major(80));
        assert_eq!(quote.not_available, ids(&[11, 12]));
    }

    proptest! {
        #[test]
        fn collapsed_ids_are_sorted_and_unique(raw in proptest::collection::vec(0_i64..50, 0..40)) {
            let collapsed = collapse_ticket_ids(raw.iter().copied().map(TicketId::new));
            prop_assert!(collapsed.windows(2).all(|w| w[0] < w[1]));
            for id in &raw {
                prop_assert!(collapsed.contains(&TicketId::new(*id)));
            }
        }
    }
}
