//! In-memory lottery store for fast, deterministic testing.
//!
//! Every operation runs to completion under a single mutex, so operations are
//! atomic and serialised the way row locks make them in `PostgreSQL`. The
//! business decisions come from `lotto-core`, the same functions the
//! `PostgreSQL` store calls.

use chrono::{DateTime, Utc};
use lotto_core::environment::Clock;
use lotto_core::{
    ActiveDraw, ClaimReceipt, ClaimStatus, DrawAssignments, LineId, LotteryError, LotteryStore,
    Money, OrderId, OwnedTicket, PurchaseLine, PurchaseLineItem, PurchaseOrder, PurchasePlan,
    PurchaseReceipt, PurchaseRequest, Quote, Result, Reward, RewardEntry, RewardId,
    SettlementStatus, SettlementSummary, StoreFuture, Ticket, TicketId, TicketLookup,
    TicketNumber, TicketStatus, UserId, evaluate_claim, select_claim_line,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    tickets: BTreeMap<TicketId, Ticket>,
    accounts: BTreeMap<UserId, Money>,
    orders: BTreeMap<OrderId, PurchaseOrder>,
    lines: BTreeMap<LineId, PurchaseLine>,
    rewards: Vec<Reward>,
    next_order: i64,
    next_line: i64,
    next_reward: i64,
    injected_conflicts: usize,
}

impl State {
    /// Consumes one injected conflict, if any are pending.
    fn take_conflict(&mut self, operation: &str) -> Result<()> {
        if self.injected_conflicts > 0 {
            self.injected_conflicts -= 1;
            return Err(LotteryError::TransactionConflict(format!(
                "injected lock timeout during {operation}"
            )));
        }
        Ok(())
    }

    fn balance(&self, user_id: UserId) -> Result<Money> {
        self.accounts
            .get(&user_id)
            .copied()
            .ok_or(LotteryError::UserNotFound(user_id))
    }

    fn owner_of(&self, line: &PurchaseLine) -> Option<UserId> {
        self.orders.get(&line.order_id).map(|o| o.user_id)
    }

    fn purchase(&mut self, request: &PurchaseRequest, now: DateTime<Utc>) -> Result<PurchaseReceipt> {
        self.take_conflict("purchase")?;
        let balance = self.balance(request.user_id())?;

        let locked = request
            .ticket_ids()
            .iter()
            .filter_map(|id| self.tickets.get(id))
            .filter(|t| t.status == TicketStatus::Available)
            .cloned()
            .collect();
        let plan = PurchasePlan::build(request, balance, locked)?;

        self.next_order += 1;
        let order_id = OrderId::new(self.next_order);
        self.orders.insert(
            order_id,
            PurchaseOrder {
                id: order_id,
                user_id: request.user_id(),
                total_price: plan.total_price,
                created_at: now,
            },
        );

        let mut items = Vec::with_capacity(plan.tickets.len());
        for ticket in &plan.tickets {
            self.next_line += 1;
            let line_id = LineId::new(self.next_line);
            self.lines.insert(
                line_id,
                PurchaseLine {
                    id: line_id,
                    order_id,
                    ticket_id: ticket.id,
                    settlement: SettlementStatus::Pending,
                    prize: None,
                    claim: ClaimStatus::Unclaimed,
                },
            );
            if let Some(stored) = self.tickets.get_mut(&ticket.id) {
                stored.status = TicketStatus::Sold;
            }
            items.push(PurchaseLineItem {
                line_id,
                ticket_id: ticket.id,
                number: ticket.number.clone(),
                price: ticket.price,
            });
        }
        self.accounts.insert(request.user_id(), plan.balance_after);

        Ok(PurchaseReceipt {
            order_id,
            user_id: request.user_id(),
            lines: items,
            total_price: plan.total_price,
            balance_after: plan.balance_after,
            created_at: now,
        })
    }

    fn settle(&mut self, draw: &DrawAssignments) -> Result<SettlementSummary> {
        self.take_conflict("settle")?;
        let numbers: BTreeMap<TicketId, TicketNumber> = draw
            .ticket_ids()
            .into_iter()
            .filter_map(|id| self.tickets.get(&id).map(|t| (id, t.number.clone())))
            .collect();
        let active = draw.resolve(&numbers)?;

        let mut rewards = Vec::with_capacity(5);
        for (tier, ticket_id, prize) in draw.entries() {
            self.next_reward += 1;
            rewards.push(Reward {
                id: RewardId::new(self.next_reward),
                tier,
                ticket_id,
                prize,
            });
        }
        self.rewards = rewards;

        let mut verdicts = Vec::new();
        for line in self.lines.values_mut() {
            if line.settlement != SettlementStatus::Pending {
                continue;
            }
            let Some(ticket) = self.tickets.get(&line.ticket_id) else {
                continue;
            };
            let verdict = active.verdict(line.id, &ticket.number);
            line.settlement = verdict.status;
            line.prize = verdict.prize;
            verdicts.push(verdict);
        }

        Ok(SettlementSummary::tally(self.rewards.len() as u64, &verdicts))
    }

    fn claim(&mut self, user_id: UserId, number: &TicketNumber) -> Result<ClaimReceipt> {
        self.take_conflict("claim")?;
        if !self.tickets.values().any(|t| &t.number == number) {
            return Err(LotteryError::TicketNotFound(TicketLookup::Number(number.clone())));
        }

        let owned: Vec<PurchaseLine> = self
            .lines
            .values()
            .filter(|l| self.owner_of(l) == Some(user_id))
            .filter(|l| {
                self.tickets
                    .get(&l.ticket_id)
                    .is_some_and(|t| &t.number == number)
            })
            .cloned()
            .collect();
        let line = select_claim_line(&owned).ok_or_else(|| LotteryError::NotOwner {
            user_id,
            number: number.clone(),
        })?;

        let (tier, prize) = evaluate_claim(line, number)?;
        let balance = self.balance(user_id)?;
        let balance_after = balance
            .checked_add(prize)
            .ok_or_else(|| LotteryError::Database("balance overflow".to_string()))?;

        if let Some(stored) = self.lines.get_mut(&line.id) {
            stored.claim = ClaimStatus::Claimed;
        }
        self.accounts.insert(user_id, balance_after);

        Ok(ClaimReceipt {
            line_id: line.id,
            ticket_id: line.ticket_id,
            tier,
            prize_amount: prize,
            balance_after,
        })
    }

    fn owned_tickets(&self, user_id: UserId) -> Vec<OwnedTicket> {
        self.lines
            .values()
            .filter(|l| self.owner_of(l) == Some(user_id))
            .filter_map(|l| {
                self.tickets.get(&l.ticket_id).map(|t| OwnedTicket {
                    line_id: l.id,
                    order_id: l.order_id,
                    ticket_id: t.id,
                    number: t.number.clone(),
                    settlement: l.settlement,
                    claim: l.claim,
                })
            })
            .collect()
    }

    fn reward_entries(&self) -> Vec<RewardEntry> {
        let mut entries: Vec<RewardEntry> = self
            .rewards
            .iter()
            .filter_map(|r| {
                self.tickets.get(&r.ticket_id).map(|t| RewardEntry {
                    tier: r.tier,
                    prize: r.prize,
                    ticket_id: r.ticket_id,
                    number: t.number.clone(),
                })
            })
            .collect();
        entries.sort_by_key(|e| e.tier);
        entries
    }
}

/// In-memory [`LotteryStore`].
///
/// Cloning shares the underlying state, so clones can be handed to
/// concurrent tasks.
///
/// # Example
///
/// ```
/// use lotto_core::{LotteryStore, Money, PurchaseRequest, TicketId, TicketNumber, UserId};
/// use lotto_testing::InMemoryLotteryStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryLotteryStore::new();
/// store.insert_ticket(TicketId::new(10), TicketNumber::parse("123456")?, Money::from_major(80));
/// store.open_account(UserId::new(1), Money::from_major(100));
///
/// let receipt = store
///     .purchase(PurchaseRequest::new(UserId::new(1), [TicketId::new(10)])?)
///     .await?;
/// assert_eq!(receipt.balance_after, Money::from_major(20));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryLotteryStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLotteryStore {
    /// Creates an empty store stamped by [`crate::test_clock`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(crate::test_clock()))
    }

    /// Creates an empty store using `clock` for order timestamps.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds an available ticket, replacing any ticket with the same id.
    pub fn insert_ticket(&self, id: TicketId, number: TicketNumber, price: Money) {
        self.lock()
            .tickets
            .insert(id, Ticket::available(id, number, price));
    }

    /// Opens (or resets) an account with the given balance.
    pub fn open_account(&self, user_id: UserId, balance: Money) {
        self.lock().accounts.insert(user_id, balance);
    }

    /// Makes the next `count` operations fail with `TransactionConflict`
    /// before touching any state.
    pub fn inject_conflicts(&self, count: usize) {
        self.lock().injected_conflicts = count;
    }

    /// Snapshot of a ticket.
    #[must_use]
    pub fn ticket(&self, id: TicketId) -> Option<Ticket> {
        self.lock().tickets.get(&id).cloned()
    }

    /// Snapshot of all purchase lines, ascending by id.
    #[must_use]
    pub fn lines(&self) -> Vec<PurchaseLine> {
        self.lock().lines.values().cloned().collect()
    }

    /// Snapshot of all orders, ascending by id.
    #[must_use]
    pub fn orders(&self) -> Vec<PurchaseOrder> {
        self.lock().orders.values().cloned().collect()
    }

    /// Snapshot of the active reward rows.
    #[must_use]
    pub fn rewards(&self) -> Vec<Reward> {
        self.lock().rewards.clone()
    }

    /// The active draw rebuilt from the reward set, if one was settled.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored reward set is inconsistent.
    pub fn active_draw(&self) -> Result<Option<ActiveDraw>> {
        ActiveDraw::from_rewards(&self.lock().reward_entries())
    }
}

impl Default for InMemoryLotteryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryLotteryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLotteryStore").finish_non_exhaustive()
    }
}

impl LotteryStore for InMemoryLotteryStore {
    fn purchase(&self, request: PurchaseRequest) -> StoreFuture<'_, PurchaseReceipt> {
        Box::pin(async move {
            let now = self.clock.now();
            self.lock().purchase(&request, now)
        })
    }

    fn settle(&self, draw: DrawAssignments) -> StoreFuture<'_, SettlementSummary> {
        Box::pin(async move { self.lock().settle(&draw) })
    }

    fn claim(&self, user_id: UserId, number: TicketNumber) -> StoreFuture<'_, ClaimReceipt> {
        Box::pin(async move { self.lock().claim(user_id, &number) })
    }

    fn list_owned_tickets(&self, user_id: UserId) -> StoreFuture<'_, Vec<OwnedTicket>> {
        Box::pin(async move { Ok(self.lock().owned_tickets(user_id)) })
    }

    fn quote(&self, ticket_ids: Vec<TicketId>) -> StoreFuture<'_, Quote> {
        Box::pin(async move {
            let state = self.lock();
            let found = ticket_ids
                .iter()
                .filter_map(|id| state.tickets.get(id))
                .cloned()
                .collect();
            Ok(Quote::build(&ticket_ids, found))
        })
    }

    fn current_rewards(&self) -> StoreFuture<'_, Vec<RewardEntry>> {
        Box::pin(async move { Ok(self.lock().reward_entries()) })
    }

    fn balance(&self, user_id: UserId) -> StoreFuture<'_, Money> {
        Box::pin(async move { self.lock().balance(user_id) })
    }
}
