//! Draw input and prize-settlement rules.
//!
//! A draw names one ticket per tier plus a prize table. Once the reference
//! numbers are resolved, [`ActiveDraw`] classifies any ticket number:
//!
//! ```text
//! tiers 1-3  exact six-digit match        (lowest tier wins)
//! tier 4     last three digits match
//! tier 5     last two digits match
//! otherwise  lost
//! ```
//!
//! Nothing in here touches storage; both store backends feed resolved
//! numbers in and persist the verdicts that come out.

use crate::error::{LotteryError, Result};
use crate::types::{LineId, Money, SettlementStatus, Tier, TicketId, TicketNumber};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Prize table
// ============================================================================

/// Prize amount for each tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[Money; 5]")]
pub struct PrizeTable([Money; 5]);

impl TryFrom<[Money; 5]> for PrizeTable {
    type Error = LotteryError;

    fn try_from(amounts: [Money; 5]) -> Result<Self> {
        Self::new(amounts)
    }
}

impl PrizeTable {
    /// Creates a table from amounts in tier order.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::InvalidDraw`] if any amount is negative.
    pub fn new(amounts: [Money; 5]) -> Result<Self> {
        if let Some(tier) = Tier::ALL.into_iter().find(|t| amounts[t.index()].is_negative()) {
            return Err(LotteryError::InvalidDraw(format!(
                "prize for {tier} is negative"
            )));
        }
        Ok(Self(amounts))
    }

    /// Prize paid for `tier`.
    #[must_use]
    pub const fn prize(&self, tier: Tier) -> Money {
        self.0[tier.index()]
    }

    /// Replaces the prize of a single tier.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::InvalidDraw`] if `amount` is negative.
    pub fn with_prize(mut self, tier: Tier, amount: Money) -> Result<Self> {
        self.0[tier.index()] = amount;
        Self::new(self.0)
    }
}

impl Default for PrizeTable {
    fn default() -> Self {
        Self([
            Money::from_major(999_999),
            Money::from_major(200_000),
            Money::from_major(50_000),
            Money::from_major(30_000),
            Money::from_major(10_000),
        ])
    }
}

// ============================================================================
// Draw assignments
// ============================================================================

/// Input of a settlement: one ticket per tier and the prizes to pay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawAssignments {
    tickets: [TicketId; 5],
    prizes: PrizeTable,
}

impl DrawAssignments {
    /// Creates assignments from tickets in tier order, with the default prizes.
    #[must_use]
    pub fn new(tickets: [TicketId; 5]) -> Self {
        Self {
            tickets,
            prizes: PrizeTable::default(),
        }
    }

    /// Creates assignments from `(tier, ticket)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::InvalidDraw`] unless every tier appears exactly once.
    pub fn from_tiers(pairs: impl IntoIterator<Item = (Tier, TicketId)>) -> Result<Self> {
        let mut slots: [Option<TicketId>; 5] = [None; 5];
        for (tier, ticket) in pairs {
            let slot = &mut slots[tier.index()];
            if slot.is_some() {
                return Err(LotteryError::InvalidDraw(format!(
                    "{tier} assigned more than once"
                )));
            }
            *slot = Some(ticket);
        }

        let mut tickets = [TicketId::new(0); 5];
        for tier in Tier::ALL {
            tickets[tier.index()] = slots[tier.index()]
                .ok_or_else(|| LotteryError::InvalidDraw(format!("{tier} has no ticket")))?;
        }
        Ok(Self::new(tickets))
    }

    /// Replaces the prize table.
    #[must_use]
    pub const fn with_prizes(mut self, prizes: PrizeTable) -> Self {
        self.prizes = prizes;
        self
    }

    /// Ticket assigned to `tier`.
    #[must_use]
    pub const fn ticket(&self, tier: Tier) -> TicketId {
        self.tickets[tier.index()]
    }

    /// The prize table.
    #[must_use]
    pub const fn prizes(&self) -> &PrizeTable {
        &self.prizes
    }

    /// `(tier, ticket, prize)` for every tier, in tier order.
    pub fn entries(&self) -> impl Iterator<Item = (Tier, TicketId, Money)> + '_ {
        Tier::ALL
            .into_iter()
            .map(|tier| (tier, self.ticket(tier), self.prizes.prize(tier)))
    }

    /// Distinct referenced tickets, ascending.
    #[must_use]
    pub fn ticket_ids(&self) -> Vec<TicketId> {
        let mut ids = self.tickets.to_vec();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Pairs each tier with its resolved ticket number.
    ///
    /// `numbers` maps the referenced ticket ids to their numbers, as read
    /// from the inventory inside the settlement transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::TicketNotFound`] for the lowest referenced id
    /// missing from `numbers`.
    pub fn resolve(&self, numbers: &BTreeMap<TicketId, TicketNumber>) -> Result<ActiveDraw> {
        if let Some(missing) = self.ticket_ids().into_iter().find(|id| !numbers.contains_key(id)) {
            return Err(LotteryError::TicketNotFound(
                crate::error::TicketLookup::Id(missing),
            ));
        }

        let mut references = Vec::with_capacity(Tier::ALL.len());
        for tier in Tier::ALL {
            let number = numbers.get(&self.ticket(tier)).cloned().ok_or_else(|| {
                LotteryError::TicketNotFound(crate::error::TicketLookup::Id(self.ticket(tier)))
            })?;
            references.push(RewardEntry {
                tier,
                prize: self.prizes.prize(tier),
                ticket_id: self.ticket(tier),
                number,
            });
        }
        ActiveDraw::from_rewards(&references)?
            .ok_or_else(|| LotteryError::InvalidDraw("draw resolved to no rewards".to_string()))
    }
}

// ============================================================================
// Active draw
// ============================================================================

/// One row of the published reward set, with the ticket number resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntry {
    /// Tier.
    pub tier: Tier,
    /// Prize for the tier.
    pub prize: Money,
    /// Winning (or reference) ticket.
    pub ticket_id: TicketId,
    /// Its number.
    pub number: TicketNumber,
}

/// A tier hit and what it pays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeMatch {
    /// Winning tier.
    pub tier: Tier,
    /// Prize for that tier.
    pub prize: Money,
}

/// Settlement result for one purchase line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineVerdict {
    /// The line.
    pub line_id: LineId,
    /// `Won(tier)` or `Lost`, never `Pending`.
    pub status: SettlementStatus,
    /// Prize recorded for a win.
    pub prize: Option<Money>,
}

/// The reference numbers and prizes of a single draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveDraw {
    numbers: [TicketNumber; 5],
    prizes: PrizeTable,
}

impl ActiveDraw {
    /// Creates a draw from reference numbers in tier order.
    #[must_use]
    pub const fn new(numbers: [TicketNumber; 5], prizes: PrizeTable) -> Self {
        Self { numbers, prizes }
    }

    /// Rebuilds the draw from a published reward set.
    ///
    /// Returns `Ok(None)` when no draw has been published yet.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::InvalidDraw`] if the set is partial or names
    /// a tier twice.
    pub fn from_rewards(rewards: &[RewardEntry]) -> Result<Option<Self>> {
        if rewards.is_empty() {
            return Ok(None);
        }

        let mut numbers: [Option<TicketNumber>; 5] = Default::default();
        let mut prizes = [Money::ZERO; 5];
        for reward in rewards {
            let slot = &mut numbers[reward.tier.index()];
            if slot.is_some() {
                return Err(LotteryError::InvalidDraw(format!(
                    "reward set names {} more than once",
                    reward.tier
                )));
            }
            *slot = Some(reward.number.clone());
            prizes[reward.tier.index()] = reward.prize;
        }

        let [Some(first), Some(second), Some(third), Some(fourth), Some(fifth)] = numbers else {
            return Err(LotteryError::InvalidDraw(format!(
                "reward set has {} of 5 tiers",
                rewards.len()
            )));
        };
        Ok(Some(Self::new(
            [first, second, third, fourth, fifth],
            PrizeTable::new(prizes)?,
        )))
    }

    /// Reference number of `tier`.
    #[must_use]
    pub const fn reference(&self, tier: Tier) -> &TicketNumber {
        &self.numbers[tier.index()]
    }

    /// The prize table.
    #[must_use]
    pub const fn prizes(&self) -> &PrizeTable {
        &self.prizes
    }

    /// First tier whose rule matches `number`, in priority order.
    #[must_use]
    pub fn classify(&self, number: &TicketNumber) -> Option<Tier> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.rule().matches(number, self.reference(*tier)))
    }

    /// Tier and prize for `number`, if it wins.
    #[must_use]
    pub fn check(&self, number: &TicketNumber) -> Option<PrizeMatch> {
        self.classify(number).map(|tier| PrizeMatch {
            tier,
            prize: self.prizes.prize(tier),
        })
    }

    /// Settles one pending line holding `number`.
    #[must_use]
    pub fn verdict(&self, line_id: LineId, number: &TicketNumber) -> LineVerdict {
        match self.check(number) {
            Some(hit) => LineVerdict {
                line_id,
                status: SettlementStatus::Won(hit.tier),
                prize: Some(hit.prize),
            },
            None => LineVerdict {
                line_id,
                status: SettlementStatus::Lost,
                prize: None,
            },
        }
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Outcome of a settlement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    /// Rewards inserted (always 5).
    pub reward_count: u64,
    /// Pending lines that received a verdict.
    pub lines_reclassified: u64,
    /// Lines settled as won.
    pub lines_won: u64,
    /// Lines settled as lost.
    pub lines_lost: u64,
    /// Winning lines per tier.
    pub winners_by_tier: BTreeMap<Tier, u64>,
}

impl SettlementSummary {
    /// Tallies the verdicts of one settlement.
    #[must_use]
    pub fn tally(reward_count: u64, verdicts: &[LineVerdict]) -> Self {
        let mut summary = Self {
            reward_count,
            ..Self::default()
        };
        for verdict in verdicts {
            summary.lines_reclassified += 1;
            match verdict.status.tier() {
                Some(tier) => {
                    summary.lines_won += 1;
                    *summary.winners_by_tier.entry(tier).or_insert(0) += 1;
                }
                None => summary.lines_lost += 1,
            }
        }
        summary
    }
}
