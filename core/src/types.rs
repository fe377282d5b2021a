//! Domain types for the lottery core.
//!
//! Value objects (identifiers, money, ticket numbers, tiers), the status
//! enums of the ticket and purchase-line state machines, and the persisted
//! entities themselves.

use crate::error::LotteryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database identifier.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw database identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Primary key of a ticket. Ascending order is the lock order.
    TicketId
);
numeric_id!(
    /// Identifier of a registered user (and of their account).
    UserId
);
numeric_id!(
    /// Primary key of a purchase order.
    OrderId
);
numeric_id!(
    /// Primary key of a purchase line.
    LineId
);
numeric_id!(
    /// Primary key of a reward row.
    RewardId
);

// ============================================================================
// Money
// ============================================================================

/// Money amount in minor units (hundredths), never floating point.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Creates an amount from whole major units (`from_major(80)` is 80.00).
    ///
    /// Saturates at the `i64` bounds; use [`Money::checked_from_major`] for
    /// untrusted input.
    #[must_use]
    pub const fn from_major(major: i64) -> Self {
        Self(major.saturating_mul(100))
    }

    /// Creates an amount from whole major units, `None` if it does not fit.
    #[must_use]
    pub const fn checked_from_major(major: i64) -> Option<Self> {
        match major.checked_mul(100) {
            Some(minor) => Some(Self(minor)),
            None => None,
        }
    }

    /// Returns the amount in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Whether the amount is below zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Adds two amounts, `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Subtracts `other`, `None` on overflow.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(diff) => Some(Self(diff)),
            None => None,
        }
    }

    /// Sums amounts, `None` on overflow.
    #[must_use]
    pub fn checked_sum(amounts: impl IntoIterator<Item = Self>) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, m| acc.checked_add(m))
    }
}

/// Saturating; totals that must be exact go through [`Money::checked_sum`].
impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.fold(0_i64, |acc, m| acc.saturating_add(m.0)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

// ============================================================================
// Ticket numbers
// ============================================================================

/// A printed 6-digit ticket number such as `"123456"`.
///
/// Not unique across tickets; only the ticket id is.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketNumber(String);

impl TicketNumber {
    /// Number of digits in every ticket number.
    pub const LEN: usize = 6;

    /// Parses a ticket number.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::InvalidTicketNumber`] unless `raw` is exactly
    /// six ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, LotteryError> {
        if raw.len() == Self::LEN && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(LotteryError::InvalidTicketNumber(raw.to_string()))
        }
    }

    /// The number as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing `digits` characters (all six when `digits >= 6`).
    #[must_use]
    pub fn suffix(&self, digits: usize) -> &str {
        &self.0[Self::LEN - digits.min(Self::LEN)..]
    }
}

impl FromStr for TicketNumber {
    type Err = LotteryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TicketNumber {
    type Error = LotteryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TicketNumber> for String {
    fn from(number: TicketNumber) -> Self {
        number.0
    }
}

impl AsRef<str> for TicketNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Prize tiers
// ============================================================================

/// Prize rank. `First` is the highest value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Tier 1: exact match.
    First = 1,
    /// Tier 2: exact match.
    Second = 2,
    /// Tier 3: exact match.
    Third = 3,
    /// Tier 4: last three digits.
    Fourth = 4,
    /// Tier 5: last two digits.
    Fifth = 5,
}

impl Tier {
    /// All tiers in matching-priority order.
    pub const ALL: [Self; 5] = [
        Self::First,
        Self::Second,
        Self::Third,
        Self::Fourth,
        Self::Fifth,
    ];

    /// The tier as 1..=5.
    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Zero-based position in [`Tier::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    /// How a purchased number is compared with this tier's reference number.
    #[must_use]
    pub const fn rule(self) -> MatchRule {
        match self {
            Self::First | Self::Second | Self::Third => MatchRule::Exact,
            Self::Fourth => MatchRule::LastDigits(3),
            Self::Fifth => MatchRule::LastDigits(2),
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = LotteryError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            3 => Ok(Self::Third),
            4 => Ok(Self::Fourth),
            5 => Ok(Self::Fifth),
            other => Err(LotteryError::InvalidDraw(format!(
                "prize tier must be 1..=5, got {other}"
            ))),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.number()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {}", self.number())
    }
}

/// Digit-matching rule of a tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchRule {
    /// All six digits must match.
    Exact,
    /// The trailing `n` digits must match.
    LastDigits(usize),
}

impl MatchRule {
    /// Whether `candidate` matches `reference` under this rule.
    #[must_use]
    pub fn matches(self, candidate: &TicketNumber, reference: &TicketNumber) -> bool {
        match self {
            Self::Exact => candidate == reference,
            Self::LastDigits(n) => candidate.suffix(n) == reference.suffix(n),
        }
    }
}

// ============================================================================
// Status machines
// ============================================================================

/// Availability of a ticket. Only `Available → Sold` happens in this core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// On sale.
    Available,
    /// Part of a committed purchase.
    Sold,
}

impl TicketStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Sold => "sold",
        }
    }

    /// Parses the database representation.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::Database`] for unknown values.
    pub fn parse(s: &str) -> Result<Self, LotteryError> {
        match s {
            "available" => Ok(Self::Available),
            "sold" => Ok(Self::Sold),
            _ => Err(LotteryError::Database(format!("Invalid ticket status: {s}"))),
        }
    }
}

/// Settlement outcome of a purchase line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Not yet settled by any draw.
    Pending,
    /// Won at the given tier.
    Won(Tier),
    /// Settled without a prize.
    Lost,
}

impl SettlementStatus {
    /// Database representation of the status column (the tier lives in its own column).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Won(_) => "won",
            Self::Lost => "lost",
        }
    }

    /// The winning tier, if any.
    #[must_use]
    pub const fn tier(&self) -> Option<Tier> {
        match self {
            Self::Won(tier) => Some(*tier),
            Self::Pending | Self::Lost => None,
        }
    }

    /// Rebuilds a status from its status and tier columns.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::Database`] for unknown values or a `won`
    /// row without a valid tier.
    pub fn from_parts(status: &str, tier: Option<u8>) -> Result<Self, LotteryError> {
        match (status, tier) {
            ("pending", _) => Ok(Self::Pending),
            ("lost", _) => Ok(Self::Lost),
            ("won", Some(tier)) => Tier::try_from(tier)
                .map(Self::Won)
                .map_err(|e| LotteryError::Database(e.to_string())),
            ("won", None) => Err(LotteryError::Database(
                "won purchase line has no prize tier".to_string(),
            )),
            _ => Err(LotteryError::Database(format!(
                "Invalid settlement status: {status}"
            ))),
        }
    }
}

/// Whether a line's prize has been paid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Not paid out.
    Unclaimed,
    /// Paid out; terminal.
    Claimed,
}

impl ClaimStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unclaimed => "unclaimed",
            Self::Claimed => "claimed",
        }
    }

    /// Parses the database representation.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::Database`] for unknown values.
    pub fn parse(s: &str) -> Result<Self, LotteryError> {
        match s {
            "unclaimed" => Ok(Self::Unclaimed),
            "claimed" => Ok(Self::Claimed),
            _ => Err(LotteryError::Database(format!("Invalid claim status: {s}"))),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A purchasable ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Primary key.
    pub id: TicketId,
    /// Printed number.
    pub number: TicketNumber,
    /// Sale price.
    pub price: Money,
    /// Availability.
    pub status: TicketStatus,
    /// Admin who seeded the ticket, if recorded.
    pub created_by: Option<UserId>,
}

impl Ticket {
    /// Creates an available ticket.
    #[must_use]
    pub const fn available(id: TicketId, number: TicketNumber, price: Money) -> Self {
        Self {
            id,
            number,
            price,
            status: TicketStatus::Available,
            created_by: None,
        }
    }
}

/// A user's spendable balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Owner.
    pub user_id: UserId,
    /// Never negative.
    pub balance: Money,
}

/// Header of a committed purchase. Immutable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    /// Primary key.
    pub id: OrderId,
    /// Buyer.
    pub user_id: UserId,
    /// Sum of ticket prices at purchase time.
    pub total_price: Money,
    /// Commit time.
    pub created_at: DateTime<Utc>,
}

/// One ticket within an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    /// Primary key.
    pub id: LineId,
    /// Parent order.
    pub order_id: OrderId,
    /// Purchased ticket.
    pub ticket_id: TicketId,
    /// Settlement outcome.
    pub settlement: SettlementStatus,
    /// Prize recorded when the line settled as won.
    pub prize: Option<Money>,
    /// Payout state.
    pub claim: ClaimStatus,
}

/// One row of the active reward set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    /// Primary key.
    pub id: RewardId,
    /// Tier this row pays.
    pub tier: Tier,
    /// Winning (or reference) ticket.
    pub ticket_id: TicketId,
    /// Prize for the tier.
    pub prize: Money,
}

/// A ticket as seen by its owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedTicket {
    /// Purchase line.
    pub line_id: LineId,
    /// Order containing the line.
    pub order_id: OrderId,
    /// Ticket id.
    pub ticket_id: TicketId,
    /// Printed number.
    pub number: TicketNumber,
    /// Settlement outcome.
    pub settlement: SettlementStatus,
    /// Payout state.
    pub claim: ClaimStatus,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn money_display() {
        assert_eq!(Money::from_major(80).to_string(), "80.00");
        assert_eq!(Money::from_minor(1050).to_string(), "10.50");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
    }

    #[test]
    fn money_sum_and_checked_ops() {
        let total: Money = [Money::from_major(80), Money::from_major(80)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_major(160));
        assert_eq!(
            Money::from_major(100).checked_sub(total),
            Some(Money::from_major(-60))
        );
        assert_eq!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)), None);
    }

    #[test]
    fn major_units_out_of_range() {
        assert_eq!(Money::checked_from_major(80), Some(Money::from_minor(8_000)));
        assert_eq!(Money::checked_from_major(i64::MAX / 100 + 1), None);
        assert_eq!(Money::from_major(i64::MAX), Money::from_minor(i64::MAX));
        assert_eq!(
            Money::checked_sum([Money::from_minor(i64::MAX), Money::from_minor(1)]),
            None
        );
        assert_eq!(Money::checked_sum([]), Some(Money::ZERO));
    }

    #[test]
    fn ticket_number_validation() {
        assert!(TicketNumber::parse("123456").is_ok());
        assert!(TicketNumber::parse("12345").is_err());
        assert!(TicketNumber::parse("1234567").is_err());
        assert!(TicketNumber::parse("12a456").is_err());
        assert!(TicketNumber::parse("").is_err());
        assert!(TicketNumber::parse("１２３４５").is_err());
    }

    #[test]
    fn ticket_number_suffix() {
        let number = TicketNumber::parse("987456").unwrap();
        assert_eq!(number.suffix(3), "456");
        assert_eq!(number.suffix(2), "56");
        assert_eq!(number.suffix(6), "987456");
        assert_eq!(number.suffix(9), "987456");
    }

    #[test]
    fn ticket_number_serde_validates() {
        let ok: TicketNumber = serde_json::from_str("\"000001\"").unwrap();
        assert_eq!(ok.as_str(), "000001");
        assert!(serde_json::from_str::<TicketNumber>("\"abc\"").is_err());
    }

    #[test]
    fn tier_conversion() {
        for tier in Tier::ALL {
            assert_eq!(Tier::try_from(tier.number()).unwrap(), tier);
        }
        assert!(Tier::try_from(0).is_err());
        assert!(Tier::try_from(6).is_err());
        assert_eq!(Tier::Fourth.index(), 3);
    }

    #[test]
    fn match_rules() {
        let a = TicketNumber::parse("987456").unwrap();
        let b = TicketNumber::parse("222456").unwrap();
        assert!(!MatchRule::Exact.matches(&a, &b));
        assert!(MatchRule::LastDigits(3).matches(&a, &b));
        assert!(MatchRule::LastDigits(2).matches(&a, &b));
        assert!(!MatchRule::LastDigits(4).matches(&a, &b));
    }

    #[test]
    fn settlement_status_from_parts() {
        assert_eq!(
            SettlementStatus::from_parts("won", Some(4)).unwrap(),
            SettlementStatus::Won(Tier::Fourth)
        );
        assert_eq!(
            SettlementStatus::from_parts("pending", None).unwrap(),
            SettlementStatus::Pending
        );
        assert!(SettlementStatus::from_parts("won", None).is_err());
        assert!(SettlementStatus::from_parts("won", Some(9)).is_err());
        assert!(SettlementStatus::from_parts("maybe", None).is_err());
    }

    #[test]
    fn status_strings_parse_back() {
        for status in [TicketStatus::Available, TicketStatus::Sold] {
            assert_eq!(TicketStatus::parse(status.as_str()).unwrap(), status);
        }
        for status in [ClaimStatus::Unclaimed, ClaimStatus::Claimed] {
            assert_eq!(ClaimStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(TicketStatus::parse("sell").is_err());
    }
}
