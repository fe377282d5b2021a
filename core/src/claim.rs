//! Claim decision for cashing in a winning line.

use crate::error::{LotteryError, Result};
use crate::types::{ClaimStatus, LineId, Money, PurchaseLine, SettlementStatus, Tier, TicketId, TicketNumber};
use serde::{Deserialize, Serialize};

/// Result of a committed claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    /// Line that was paid out.
    pub line_id: LineId,
    /// Its ticket.
    pub ticket_id: TicketId,
    /// Winning tier.
    pub tier: Tier,
    /// Amount credited.
    pub prize_amount: Money,
    /// Claimant's balance after the credit.
    pub balance_after: Money,
}

/// Picks which of the user's lines holding the claimed number to act on.
///
/// Ticket numbers are not unique, so a user may hold several lines with the
/// same number: the first claimable one wins, otherwise the lowest line id.
#[must_use]
pub fn select_claim_line(lines: &[PurchaseLine]) -> Option<&PurchaseLine> {
    let claimable = lines
        .iter()
        .filter(|l| {
            matches!(l.settlement, SettlementStatus::Won(_)) && l.claim == ClaimStatus::Unclaimed
        })
        .min_by_key(|l| l.id);
    claimable.or_else(|| lines.iter().min_by_key(|l| l.id))
}

/// Validates that `line` can be paid out and returns its tier and prize.
///
/// # Errors
///
/// - [`LotteryError::NotAWinningTicket`] if the line is pending or lost
/// - [`LotteryError::AlreadyClaimed`] if the prize was paid before
/// - [`LotteryError::Database`] if a won line carries no prize
pub fn evaluate_claim(line: &PurchaseLine, number: &TicketNumber) -> Result<(Tier, Money)> {
    let SettlementStatus::Won(tier) = line.settlement else {
        return Err(LotteryError::NotAWinningTicket(number.clone()));
    };
    if line.claim == ClaimStatus::Claimed {
        return Err(LotteryError::AlreadyClaimed(number.clone()));
    }
    let prize = line.prize.ok_or_else(|| {
        LotteryError::Database(format!("won line {} has no recorded prize", line.id))
    })?;
    Ok((tier, prize))
}
