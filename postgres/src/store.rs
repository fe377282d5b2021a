//! `PostgreSQL` implementation of [`LotteryStore`].
//!
//! Every mutating operation is one transaction under `READ COMMITTED` with
//! explicit row locks, taken in a single global order:
//!
//! ```text
//! rewards (table lock) → tickets → purchase_lines → accounts
//! ```
//!
//! Within a table, rows are locked in ascending primary-key order. Two
//! transactions therefore never wait on each other in a cycle, and a
//! blocked transaction gives up after `lock_timeout` instead of hanging.

use crate::config::StoreConfig;
use crate::error::map_sqlx_error;
use chrono::{DateTime, Utc};
use lotto_core::environment::{Clock, SystemClock};
use lotto_core::{
    ClaimReceipt, ClaimStatus, DrawAssignments, LineId, LotteryError, LotteryStore, Money,
    OrderId, OwnedTicket, PurchaseLine, PurchaseLineItem, PurchasePlan, PurchaseReceipt,
    PurchaseRequest, Quote, Result, RewardEntry, SettlementStatus, SettlementSummary,
    StoreFuture, Ticket, TicketId, TicketLookup, TicketNumber, TicketStatus, Tier, UserId,
    evaluate_claim, select_claim_line,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct TicketRow {
    ticket_id: i64,
    number: String,
    price: i64,
    status: String,
    created_by: Option<i64>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = LotteryError;

    fn try_from(row: TicketRow) -> Result<Self> {
        Ok(Self {
            id: TicketId::new(row.ticket_id),
            number: stored_number(&row.number)?,
            price: Money::from_minor(row.price),
            status: TicketStatus::parse(&row.status)?,
            created_by: row.created_by.map(UserId::new),
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineRow {
    line_id: i64,
    order_id: i64,
    ticket_id: i64,
    settlement_status: String,
    prize_tier: Option<i16>,
    prize_amount: Option<i64>,
    claim_status: String,
}

impl TryFrom<LineRow> for PurchaseLine {
    type Error = LotteryError;

    fn try_from(row: LineRow) -> Result<Self> {
        Ok(Self {
            id: LineId::new(row.line_id),
            order_id: OrderId::new(row.order_id),
            ticket_id: TicketId::new(row.ticket_id),
            settlement: settlement_from_columns(&row.settlement_status, row.prize_tier)?,
            prize: row.prize_amount.map(Money::from_minor),
            claim: ClaimStatus::parse(&row.claim_status)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OwnedRow {
    line_id: i64,
    order_id: i64,
    ticket_id: i64,
    number: String,
    settlement_status: String,
    prize_tier: Option<i16>,
    claim_status: String,
}

impl TryFrom<OwnedRow> for OwnedTicket {
    type Error = LotteryError;

    fn try_from(row: OwnedRow) -> Result<Self> {
        Ok(Self {
            line_id: LineId::new(row.line_id),
            order_id: OrderId::new(row.order_id),
            ticket_id: TicketId::new(row.ticket_id),
            number: stored_number(&row.number)?,
            settlement: settlement_from_columns(&row.settlement_status, row.prize_tier)?,
            claim: ClaimStatus::parse(&row.claim_status)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RewardRow {
    prize_tier: i16,
    prize_amount: i64,
    ticket_id: i64,
    number: String,
}

impl TryFrom<RewardRow> for RewardEntry {
    type Error = LotteryError;

    fn try_from(row: RewardRow) -> Result<Self> {
        Ok(Self {
            tier: stored_tier(row.prize_tier)?,
            prize: Money::from_minor(row.prize_amount),
            ticket_id: TicketId::new(row.ticket_id),
            number: stored_number(&row.number)?,
        })
    }
}

fn stored_number(raw: &str) -> Result<TicketNumber> {
    TicketNumber::parse(raw)
        .map_err(|_| LotteryError::Database(format!("Invalid stored ticket number: {raw:?}")))
}

fn stored_tier(raw: i16) -> Result<Tier> {
    u8::try_from(raw)
        .ok()
        .and_then(|n| Tier::try_from(n).ok())
        .ok_or_else(|| LotteryError::Database(format!("Invalid stored prize tier: {raw}")))
}

fn settlement_from_columns(status: &str, tier: Option<i16>) -> Result<SettlementStatus> {
    let tier = tier.map(stored_tier).transpose()?;
    SettlementStatus::from_parts(status, tier.map(Tier::number))
}

fn ids(ticket_ids: &[TicketId]) -> Vec<i64> {
    ticket_ids.iter().map(|id| id.get()).collect()
}

/// Locks the requested tickets in ascending id order and returns them in any
/// status; the caller decides which are still available.
async fn lock_tickets(
    tx: &mut Transaction<'static, Postgres>,
    ticket_ids: &[TicketId],
) -> Result<Vec<Ticket>> {
    let rows: Vec<TicketRow> = sqlx::query_as(
        "SELECT ticket_id, number, price, status, created_by
         FROM tickets
         WHERE ticket_id = ANY($1)
         ORDER BY ticket_id
         FOR UPDATE",
    )
    .bind(ids(ticket_ids))
    .fetch_all(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    rows.into_iter().map(Ticket::try_from).collect()
}

/// Flips already-locked tickets from available to sold.
async fn mark_sold(tx: &mut Transaction<'static, Postgres>, ticket_ids: &[i64]) -> Result<()> {
    sqlx::query("UPDATE tickets SET status = 'sold' WHERE ticket_id = ANY($1) AND status = 'available'")
        .bind(ticket_ids)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

// ============================================================================
// Store
// ============================================================================

/// `PostgreSQL`-backed lottery store.
///
/// # Example
///
/// ```no_run
/// use lotto_core::{LotteryStore, PurchaseRequest, TicketId, UserId};
/// use lotto_postgres::{PostgresLotteryStore, StoreConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresLotteryStore::connect("postgres://localhost/lotto", StoreConfig::default()).await?;
/// store.migrate().await?;
///
/// let request = PurchaseRequest::new(UserId::new(1), [TicketId::new(10)])?;
/// let receipt = store.purchase(request).await?;
/// println!("order {} total {}", receipt.order_id, receipt.total_price);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresLotteryStore {
    pool: PgPool,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PostgresLotteryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresLotteryStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PostgresLotteryStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool, config: StoreConfig) -> Self {
        Self {
            pool,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Connect with a small default pool.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, config: StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| LotteryError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool, config))
    }

    /// Replace the clock used to stamp orders.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run the schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LotteryError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Transaction settings.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Adds a ticket to the inventory as available.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::Database`] if the id is taken or the insert fails.
    pub async fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        sqlx::query(
            "INSERT INTO tickets (ticket_id, number, price, status, created_by)
             VALUES ($1, $2, $3, 'available', $4)",
        )
        .bind(ticket.id.get())
        .bind(ticket.number.as_str())
        .bind(ticket.price.minor())
        .bind(ticket.created_by.map(UserId::get))
        .execute(&self.pool)
        .await
        .map_err(|e| LotteryError::Database(e.to_string()))?;
        Ok(())
    }

    /// Opens an account, or resets the balance of an existing one.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::Database`] if the balance is negative or the
    /// write fails.
    pub async fn open_account(&self, user_id: UserId, balance: Money) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts (user_id, balance) VALUES ($1, $2)
             ON CONFLICT (user_id) DO UPDATE SET balance = EXCLUDED.balance",
        )
        .bind(user_id.get())
        .bind(balance.minor())
        .execute(&self.pool)
        .await
        .map_err(|e| LotteryError::Database(e.to_string()))?;
        Ok(())
    }

    /// Begins a transaction with the configured lock and statement timeouts.
    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        sqlx::query("SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $2, true)")
            .bind(self.config.lock_timeout_setting())
            .bind(self.config.statement_timeout_setting())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(tx)
    }

    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.user_id(), ticket_count = request.ticket_ids().len())
    )]
    async fn purchase_tx(&self, request: &PurchaseRequest, now: DateTime<Utc>) -> Result<PurchaseReceipt> {
        let mut tx = self.begin().await?;
        let user_id = request.user_id();

        let locked = lock_tickets(&mut tx, request.ticket_ids()).await?;

        let balance: Option<(i64,)> =
            sqlx::query_as("SELECT balance FROM accounts WHERE user_id = $1 FOR UPDATE")
                .bind(user_id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        let balance = balance
            .map(|(minor,)| Money::from_minor(minor))
            .ok_or(LotteryError::UserNotFound(user_id))?;

        let plan = PurchasePlan::build(request, balance, locked)?;
        let sold: Vec<i64> = plan.tickets.iter().map(|t| t.id.get()).collect();

        let (order_id,): (i64,) = sqlx::query_as(
            "INSERT INTO purchase_orders (user_id, total_price, created_at)
             VALUES ($1, $2, $3)
             RETURNING order_id",
        )
        .bind(user_id.get())
        .bind(plan.total_price.minor())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let line_ids: Vec<(i64, i64)> = sqlx::query_as(
            "INSERT INTO purchase_lines (order_id, ticket_id)
             SELECT $1, t FROM UNNEST($2::bigint[]) AS t ORDER BY t
             RETURNING ticket_id, line_id",
        )
        .bind(order_id)
        .bind(&sold)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let line_ids: BTreeMap<i64, i64> = line_ids.into_iter().collect();

        mark_sold(&mut tx, &sold).await?;

        let (balance_after,): (i64,) = sqlx::query_as(
            "UPDATE accounts SET balance = balance - $2 WHERE user_id = $1 RETURNING balance",
        )
        .bind(user_id.get())
        .bind(plan.total_price.minor())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let lines = plan
            .tickets
            .into_iter()
            .map(|ticket| -> Result<PurchaseLineItem> {
                let line_id = line_ids.get(&ticket.id.get()).copied().ok_or_else(|| {
                    LotteryError::Database(format!("no purchase line for ticket {}", ticket.id))
                })?;
                Ok(PurchaseLineItem {
                    line_id: LineId::new(line_id),
                    ticket_id: ticket.id,
                    number: ticket.number,
                    price: ticket.price,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(order_id, "Purchase transaction committed");
        Ok(PurchaseReceipt {
            order_id: OrderId::new(order_id),
            user_id,
            lines,
            total_price: plan.total_price,
            balance_after: Money::from_minor(balance_after),
            created_at: now,
        })
    }

    #[tracing::instrument(skip(self, draw))]
    async fn settle_tx(&self, draw: &DrawAssignments) -> Result<SettlementSummary> {
        let mut tx = self.begin().await?;

        // Serialises settlements and blocks claim-time reads of a half-written set.
        sqlx::query("LOCK TABLE rewards IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let referenced: Vec<(i64, String)> =
            sqlx::query_as("SELECT ticket_id, number FROM tickets WHERE ticket_id = ANY($1)")
                .bind(ids(&draw.ticket_ids()))
                .fetch_all(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        let numbers = referenced
            .into_iter()
            .map(|(id, number)| -> Result<(TicketId, TicketNumber)> {
                Ok((TicketId::new(id), stored_number(&number)?))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        let active = draw.resolve(&numbers)?;

        sqlx::query("DELETE FROM rewards")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let tiers: Vec<i16> = draw.entries().map(|(tier, _, _)| i16::from(tier.number())).collect();
        let tickets: Vec<i64> = draw.entries().map(|(_, ticket, _)| ticket.get()).collect();
        let prizes: Vec<i64> = draw.entries().map(|(_, _, prize)| prize.minor()).collect();
        sqlx::query(
            "INSERT INTO rewards (prize_tier, ticket_id, prize_amount)
             SELECT * FROM UNNEST($1::smallint[], $2::bigint[], $3::bigint[])",
        )
        .bind(&tiers)
        .bind(&tickets)
        .bind(&prizes)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let pending: Vec<(i64, String)> = sqlx::query_as(
            "SELECT pl.line_id, t.number
             FROM purchase_lines pl
             JOIN tickets t ON t.ticket_id = pl.ticket_id
             WHERE pl.settlement_status = 'pending'
             ORDER BY pl.line_id
             FOR UPDATE OF pl",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let verdicts = pending
            .into_iter()
            .map(|(line_id, number)| -> Result<_> {
                Ok(active.verdict(LineId::new(line_id), &stored_number(&number)?))
            })
            .collect::<Result<Vec<_>>>()?;

        if !verdicts.is_empty() {
            let line_ids: Vec<i64> = verdicts.iter().map(|v| v.line_id.get()).collect();
            let statuses: Vec<&str> = verdicts.iter().map(|v| v.status.as_str()).collect();
            // Tier 0 and prize 0 stand in for NULL; arrays of NULLable values do not bind.
            let tiers: Vec<i16> = verdicts
                .iter()
                .map(|v| v.status.tier().map_or(0, |t| i16::from(t.number())))
                .collect();
            let prizes: Vec<i64> = verdicts
                .iter()
                .map(|v| v.prize.map_or(0, Money::minor))
                .collect();

            sqlx::query(
                "UPDATE purchase_lines AS pl
                 SET settlement_status = v.status,
                     prize_tier = NULLIF(v.tier, 0),
                     prize_amount = CASE WHEN v.tier = 0 THEN NULL ELSE v.prize END
                 FROM UNNEST($1::bigint[], $2::text[], $3::smallint[], $4::bigint[])
                     AS v(line_id, status, tier, prize)
                 WHERE pl.line_id = v.line_id",
            )
            .bind(&line_ids)
            .bind(&statuses)
            .bind(&tiers)
            .bind(&prizes)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(SettlementSummary::tally(Tier::ALL.len() as u64, &verdicts))
    }

    #[tracing::instrument(skip(self), fields(user_id = %user_id, number = %number))]
    async fn claim_tx(&self, user_id: UserId, number: &TicketNumber) -> Result<ClaimReceipt> {
        let mut tx = self.begin().await?;

        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM tickets WHERE number = $1)")
                .bind(number.as_str())
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        if !exists {
            return Err(LotteryError::TicketNotFound(TicketLookup::Number(number.clone())));
        }

        let rows: Vec<LineRow> = sqlx::query_as(
            "SELECT pl.line_id, pl.order_id, pl.ticket_id, pl.settlement_status,
                    pl.prize_tier, pl.prize_amount, pl.claim_status
             FROM purchase_lines pl
             JOIN purchase_orders po ON po.order_id = pl.order_id
             JOIN tickets t ON t.ticket_id = pl.ticket_id
             WHERE po.user_id = $1 AND t.number = $2
             ORDER BY pl.line_id
             FOR UPDATE OF pl",
        )
        .bind(user_id.get())
        .bind(number.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let lines = rows
            .into_iter()
            .map(PurchaseLine::try_from)
            .collect::<Result<Vec<_>>>()?;

        let line = select_claim_line(&lines).ok_or_else(|| LotteryError::NotOwner {
            user_id,
            number: number.clone(),
        })?;
        let (tier, prize) = evaluate_claim(line, number)?;

        sqlx::query("UPDATE purchase_lines SET claim_status = 'claimed' WHERE line_id = $1")
            .bind(line.id.get())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let balance_after: Option<(i64,)> = sqlx::query_as(
            "UPDATE accounts SET balance = balance + $2 WHERE user_id = $1 RETURNING balance",
        )
        .bind(user_id.get())
        .bind(prize.minor())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let (balance_after,) = balance_after.ok_or(LotteryError::UserNotFound(user_id))?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(ClaimReceipt {
            line_id: line.id,
            ticket_id: line.ticket_id,
            tier,
            prize_amount: prize,
            balance_after: Money::from_minor(balance_after),
        })
    }

    async fn owned_tickets(&self, user_id: UserId) -> Result<Vec<OwnedTicket>> {
        let rows: Vec<OwnedRow> = sqlx::query_as(
            "SELECT pl.line_id, pl.order_id, pl.ticket_id, t.number,
                    pl.settlement_status, pl.prize_tier, pl.claim_status
             FROM purchase_lines pl
             JOIN purchase_orders po ON po.order_id = pl.order_id
             JOIN tickets t ON t.ticket_id = pl.ticket_id
             WHERE po.user_id = $1
             ORDER BY pl.line_id",
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(OwnedTicket::try_from).collect()
    }

    async fn quote_tickets(&self, ticket_ids: &[TicketId]) -> Result<Quote> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            "SELECT ticket_id, number, price, status, created_by
             FROM tickets WHERE ticket_id = ANY($1)",
        )
        .bind(ids(ticket_ids))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        let found = rows
            .into_iter()
            .map(Ticket::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Quote::build(ticket_ids, found))
    }

    async fn reward_entries(&self) -> Result<Vec<RewardEntry>> {
        let rows: Vec<RewardRow> = sqlx::query_as(
            "SELECT r.prize_tier, r.prize_amount, r.ticket_id, t.number
             FROM rewards r
             JOIN tickets t ON t.ticket_id = r.ticket_id
             ORDER BY r.prize_tier",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(RewardEntry::try_from).collect()
    }

    async fn account_balance(&self, user_id: UserId) -> Result<Money> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM accounts WHERE user_id = $1")
            .bind(user_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(|(minor,)| Money::from_minor(minor))
            .ok_or(LotteryError::UserNotFound(user_id))
    }
}

impl LotteryStore for PostgresLotteryStore {
    fn purchase(&self, request: PurchaseRequest) -> StoreFuture<'_, PurchaseReceipt> {
        Box::pin(async move {
            let now = self.clock.now();
            self.purchase_tx(&request, now).await
        })
    }

    fn settle(&self, draw: DrawAssignments) -> StoreFuture<'_, SettlementSummary> {
        Box::pin(async move { self.settle_tx(&draw).await })
    }

    fn claim(&self, user_id: UserId, number: TicketNumber) -> StoreFuture<'_, ClaimReceipt> {
        Box::pin(async move { self.claim_tx(user_id, &number).await })
    }

    fn list_owned_tickets(&self, user_id: UserId) -> StoreFuture<'_, Vec<OwnedTicket>> {
        Box::pin(async move { self.owned_tickets(user_id).await })
    }

    fn quote(&self, ticket_ids: Vec<TicketId>) -> StoreFuture<'_, Quote> {
        Box::pin(async move { self.quote_tickets(&ticket_ids).await })
    }

    fn current_rewards(&self) -> StoreFuture<'_, Vec<RewardEntry>> {
        Box::pin(async move { self.reward_entries().await })
    }

    fn balance(&self, user_id: UserId) -> StoreFuture<'_, Money> {
        Box::pin(async move { self.account_balance(user_id).await })
    }
}
