//! Operation facade over a [`LotteryStore`].

use crate::metrics::{ClaimMetrics, OperationMetrics, PurchaseMetrics, SettlementMetrics};
use crate::retry::{RetryPolicy, retry_on_conflict};
use lotto_core::{
    ActiveDraw, ClaimReceipt, DrawAssignments, LotteryStore, Money, OwnedTicket, PrizeMatch,
    PrizeTable, PurchaseReceipt, PurchaseRequest, Quote, Result, RewardEntry, SettlementSummary,
    Tier, TicketId, TicketNumber, UserId,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// The lottery operations a transport layer exposes.
///
/// Validates raw input, runs the store call with retry on transaction
/// conflicts, and records tracing spans and business metrics. All
/// transactional work happens in the store.
///
/// # Example
///
/// ```
/// use lotto_core::{Money, TicketId, UserId};
/// use lotto_runtime::LotteryService;
/// use lotto_testing::LotteryFixture;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = LotteryFixture::new().ticket(10, "123456", 80).account(1, 100).build();
/// let service = LotteryService::new(Arc::new(store));
///
/// let receipt = service.purchase(UserId::new(1), vec![TicketId::new(10)]).await?;
/// assert_eq!(receipt.balance_after, Money::from_major(20));
/// # Ok(())
/// # }
/// ```
pub struct LotteryService<S: ?Sized> {
    store: Arc<S>,
    retry: RetryPolicy,
    prizes: PrizeTable,
}

impl<S: ?Sized> Clone for LotteryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry.clone(),
            prizes: self.prizes,
        }
    }
}

impl<S: ?Sized> std::fmt::Debug for LotteryService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LotteryService")
            .field("retry", &self.retry)
            .field("prizes", &self.prizes)
            .finish_non_exhaustive()
    }
}

/// Runs `fut` and records its wall time under `operation`.
async fn timed<T>(operation: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    let started = Instant::now();
    let result = fut.await;
    OperationMetrics::record_duration(operation, started.elapsed());
    result
}

impl<S: LotteryStore + ?Sized> LotteryService<S> {
    /// Creates a service with the default retry policy and prize table.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            prizes: PrizeTable::default(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the prizes paid by [`Self::settle`].
    #[must_use]
    pub const fn with_prizes(mut self, prizes: PrizeTable) -> Self {
        self.prizes = prizes;
        self
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Prizes paid by [`Self::settle`].
    #[must_use]
    pub const fn prizes(&self) -> &PrizeTable {
        &self.prizes
    }

    /// Buys `ticket_ids` for `user_id`. Duplicate ids count once.
    ///
    /// # Errors
    ///
    /// `EmptyRequest`, `UserNotFound`, `TicketsUnavailable`,
    /// `InsufficientFunds`, or `TransactionConflict` once retries run out.
    #[tracing::instrument(
        skip(self, ticket_ids),
        fields(user_id = %user_id, ticket_count = tracing::field::Empty)
    )]
    pub async fn purchase(
        &self,
        user_id: UserId,
        ticket_ids: Vec<TicketId>,
    ) -> Result<PurchaseReceipt> {
        let result = timed("purchase", async move {
            let request = PurchaseRequest::new(user_id, ticket_ids)?;
            tracing::Span::current().record("ticket_count", request.ticket_ids().len());
            let store = &*self.store;
            retry_on_conflict(&self.retry, "purchase", move || {
                store.purchase(request.clone())
            })
            .await
        })
        .await;

        PurchaseMetrics::record(&result);
        match &result {
            Ok(receipt) => {
                PurchaseMetrics::record_sale(receipt.lines.len(), receipt.total_price.minor());
                tracing::info!(
                    order_id = %receipt.order_id,
                    total = %receipt.total_price,
                    balance_after = %receipt.balance_after,
                    "Purchase committed"
                );
            }
            Err(err) => tracing::warn!(error = %err, kind = err.kind(), "Purchase rejected"),
        }
        result
    }

    /// Settles a draw given one ticket per tier, paying the configured prizes.
    ///
    /// # Errors
    ///
    /// `InvalidDraw` unless every tier is assigned exactly once, otherwise
    /// as [`Self::settle_draw`].
    pub async fn settle(
        &self,
        assignments: Vec<(Tier, TicketId)>,
    ) -> Result<SettlementSummary> {
        let draw = DrawAssignments::from_tiers(assignments)?.with_prizes(self.prizes);
        self.settle_draw(draw).await
    }

    /// Replaces the reward set and settles every pending line.
    ///
    /// # Errors
    ///
    /// `TicketNotFound` for an unknown referenced ticket, or
    /// `TransactionConflict` once retries run out.
    #[tracing::instrument(skip(self, draw), fields(tickets = ?draw.ticket_ids()))]
    pub async fn settle_draw(&self, draw: DrawAssignments) -> Result<SettlementSummary> {
        let store = &*self.store;
        let result = timed(
            "settle",
            retry_on_conflict(&self.retry, "settle", move || store.settle(draw.clone())),
        )
        .await;

        match &result {
            Ok(summary) => {
                SettlementMetrics::record(summary);
                tracing::info!(
                    lines_reclassified = summary.lines_reclassified,
                    lines_won = summary.lines_won,
                    lines_lost = summary.lines_lost,
                    "Settlement committed"
                );
            }
            Err(err) => tracing::warn!(error = %err, kind = err.kind(), "Settlement rejected"),
        }
        result
    }

    /// Pays out the prize of `user_id`'s winning ticket `number`.
    ///
    /// # Errors
    ///
    /// `InvalidTicketNumber`, `TicketNotFound`, `NotOwner`,
    /// `NotAWinningTicket`, `AlreadyClaimed`, or `TransactionConflict` once
    /// retries run out.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn claim(&self, user_id: UserId, number: &str) -> Result<ClaimReceipt> {
        let result = timed("claim", async move {
            let number = TicketNumber::parse(number)?;
            let store = &*self.store;
            retry_on_conflict(&self.retry, "claim", move || {
                store.claim(user_id, number.clone())
            })
            .await
        })
        .await;

        ClaimMetrics::record(&result);
        match &result {
            Ok(receipt) => {
                ClaimMetrics::record_payout(receipt.prize_amount.minor());
                tracing::info!(
                    line_id = %receipt.line_id,
                    tier = receipt.tier.number(),
                    prize = %receipt.prize_amount,
                    "Claim paid"
                );
            }
            Err(err) => tracing::warn!(error = %err, kind = err.kind(), "Claim rejected"),
        }
        result
    }

    /// Tickets bought by `user_id`, in purchase order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_owned_tickets(&self, user_id: UserId) -> Result<Vec<OwnedTicket>> {
        let store = &*self.store;
        timed(
            "list_owned_tickets",
            retry_on_conflict(&self.retry, "list_owned_tickets", move || {
                store.list_owned_tickets(user_id)
            }),
        )
        .await
    }

    /// Prices a cart without reserving it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    #[tracing::instrument(skip(self, ticket_ids), fields(ticket_count = ticket_ids.len()))]
    pub async fn quote(&self, ticket_ids: Vec<TicketId>) -> Result<Quote> {
        let store = &*self.store;
        timed(
            "quote",
            retry_on_conflict(&self.retry, "quote", move || store.quote(ticket_ids.clone())),
        )
        .await
    }

    /// The active reward set, by tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    #[tracing::instrument(skip(self))]
    pub async fn current_rewards(&self) -> Result<Vec<RewardEntry>> {
        let store = &*self.store;
        timed(
            "current_rewards",
            retry_on_conflict(&self.retry, "current_rewards", move || {
                store.current_rewards()
            }),
        )
        .await
    }

    /// What `number` would win under the active draw, without touching any line.
    ///
    /// `None` when it wins nothing or no draw has been settled yet.
    ///
    /// # Errors
    ///
    /// `InvalidTicketNumber`, or an error if the reward set cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn check_number(&self, number: &str) -> Result<Option<PrizeMatch>> {
        let number = TicketNumber::parse(number)?;
        let rewards = self.current_rewards().await?;
        Ok(ActiveDraw::from_rewards(&rewards)?.and_then(|draw| draw.check(&number)))
    }

    /// `user_id`'s balance.
    ///
    /// # Errors
    ///
    /// `UserNotFound` if the user has no account.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn balance(&self, user_id: UserId) -> Result<Money> {
        let store = &*self.store;
        timed(
            "balance",
            retry_on_conflict(&self.retry, "balance", move || store.balance(user_id)),
        )
        .await
    }
}
