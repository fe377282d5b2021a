//! Behavioural tests for the in-memory lottery store.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use lotto_core::{
    ClaimStatus, DrawAssignments, LotteryError, LotteryStore, Money, PrizeTable, PurchaseRequest,
    SettlementStatus, Tier, TicketId, TicketLookup, TicketNumber, TicketStatus, UserId,
};
use lotto_testing::{InMemoryLotteryStore, LotteryFixture};

fn ids(raw: &[i64]) -> Vec<TicketId> {
    raw.iter().copied().map(TicketId::new).collect()
}

fn num(raw: &str) -> TicketNumber {
    TicketNumber::parse(raw).unwrap()
}

async fn buy(store: &InMemoryLotteryStore, user: i64, tickets: &[i64]) -> lotto_core::Result<()> {
    let request = PurchaseRequest::new(UserId::new(user), ids(tickets))?;
    store.purchase(request).await.map(|_| ())
}

/// Reference tickets 1..=5 for the five tiers plus three sold lines.
fn settled_fixture() -> InMemoryLotteryStore {
    LotteryFixture::new()
        .ticket(1, "111111", 10)
        .ticket(2, "444444", 10)
        .ticket(3, "777777", 10)
        .ticket(4, "222456", 10)
        .ticket(5, "333333", 10)
        .ticket(20, "987456", 10)
        .ticket(21, "555533", 10)
        .ticket(22, "000000", 10)
        .account(1, 100)
        .account(2, 100)
        .build()
}

fn tier4_prize_draw() -> DrawAssignments {
    let prizes = PrizeTable::default()
        .with_prize(Tier::Fourth, Money::from_major(4000))
        .unwrap();
    DrawAssignments::new(ids(&[1, 2, 3, 4, 5]).try_into().unwrap()).with_prizes(prizes)
}

// ============================================================================
// Purchase
// ============================================================================

#[tokio::test]
async fn purchase_debits_and_marks_sold() {
    let store = LotteryFixture::new()
        .ticket(10, "123456", 80)
        .ticket(11, "654321", 80)
        .account(1, 100)
        .account(2, 100)
        .build();

    let receipt = store
        .purchase(PurchaseRequest::new(UserId::new(1), ids(&[10])).unwrap())
        .await
        .unwrap();
    assert_eq!(receipt.total_price, Money::from_major(80));
    assert_eq!(receipt.balance_after, Money::from_major(20));
    assert_eq!(receipt.lines.len(), 1);
    assert_eq!(receipt.lines[0].number, num("123456"));
    assert_eq!(store.ticket(TicketId::new(10)).unwrap().status, TicketStatus::Sold);

    let second = buy(&store, 2, &[10]).await;
    assert_eq!(
        second,
        Err(LotteryError::TicketsUnavailable {
            missing: ids(&[10])
        })
    );
    assert_eq!(
        store.balance(UserId::new(2)).await.unwrap(),
        Money::from_major(100)
    );
}

#[tokio::test]
async fn concurrent_buyers_never_share_a_ticket() {
    let mut fixture = LotteryFixture::new().ticket(10, "123456", 80);
    for user in 1..=16 {
        fixture = fixture.account(user, 100);
    }
    let store = fixture.build();

    let handles: Vec<_> = (1..=16)
        .map(|user| {
            let store = store.clone();
            tokio::spawn(async move { buy(&store, user, &[10]).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => winners += 1,
            Err(err) => assert_eq!(
                err,
                LotteryError::TicketsUnavailable {
                    missing: ids(&[10])
                }
            ),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(store.orders().len(), 1);
    assert_eq!(store.lines().len(), 1);
}

#[tokio::test]
async fn overlapping_carts_race_cleanly() {
    let store = LotteryFixture::new()
        .tickets(10, 4, 10)
        .account(1, 1000)
        .account(2, 1000)
        .build();

    let a = {
        let store = store.clone();
        tokio::spawn(async move { buy(&store, 1, &[10, 11, 12]).await })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move { buy(&store, 2, &[13, 12]).await })
    };
    let outcomes = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    let sold_lines = store.lines().len();
    assert!(sold_lines == 3 || sold_lines == 2);
}

#[tokio::test]
async fn insufficient_funds_leaves_no_trace() {
    let store = LotteryFixture::new()
        .ticket(10, "123456", 80)
        .ticket(11, "654321", 80)
        .account(1, 100)
        .build();

    let err = buy(&store, 1, &[10, 11]).await.unwrap_err();
    assert_eq!(
        err,
        LotteryError::InsufficientFunds {
            balance: Money::from_major(100),
            required: Money::from_major(160),
        }
    );
    assert!(store.orders().is_empty());
    assert!(store.lines().is_empty());
    assert_eq!(
        store.ticket(TicketId::new(10)).unwrap().status,
        TicketStatus::Available
    );
    assert_eq!(
        store.balance(UserId::new(1)).await.unwrap(),
        Money::from_major(100)
    );
}

#[tokio::test]
async fn unknown_buyer_is_rejected() {
    let store = LotteryFixture::new().ticket(10, "123456", 80).build();
    assert_eq!(
        buy(&store, 9, &[10]).await,
        Err(LotteryError::UserNotFound(UserId::new(9)))
    );
}

#[tokio::test]
async fn partially_missing_cart_names_missing_ids() {
    let store = LotteryFixture::new()
        .ticket(10, "123456", 80)
        .account(1, 1000)
        .build();
    assert_eq!(
        buy(&store, 1, &[12, 10, 11]).await,
        Err(LotteryError::TicketsUnavailable {
            missing: ids(&[11, 12])
        })
    );
}

#[tokio::test]
async fn injected_conflict_commits_nothing() {
    let store = LotteryFixture::new()
        .ticket(10, "123456", 80)
        .account(1, 100)
        .build();
    store.inject_conflicts(1);

    let err = buy(&store, 1, &[10]).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(store.orders().is_empty());

    buy(&store, 1, &[10]).await.unwrap();
    assert_eq!(store.orders().len(), 1);
}

// ============================================================================
// Settlement
// ============================================================================

#[tokio::test]
async fn settlement_classifies_every_pending_line() {
    let store = settled_fixture();
    buy(&store, 1, &[20, 21, 22]).await.unwrap();

    let summary = store.settle(tier4_prize_draw()).await.unwrap();
    assert_eq!(summary.reward_count, 5);
    assert_eq!(summary.lines_reclassified, 3);
    assert_eq!(summary.lines_won, 2);
    assert_eq!(summary.lines_lost, 1);

    let owned = store.list_owned_tickets(UserId::new(1)).await.unwrap();
    let status_of = |number: &str| {
        owned
            .iter()
            .find(|t| t.number == num(number))
            .unwrap()
            .settlement
    };
    assert_eq!(status_of("987456"), SettlementStatus::Won(Tier::Fourth));
    assert_eq!(status_of("555533"), SettlementStatus::Won(Tier::Fifth));
    assert_eq!(status_of("000000"), SettlementStatus::Lost);
    assert!(
        store
            .lines()
            .iter()
            .all(|l| l.settlement != SettlementStatus::Pending)
    );
}

#[tokio::test]
async fn settlement_replaces_reward_set() {
    let store = settled_fixture();
    store.settle(tier4_prize_draw()).await.unwrap();
    store
        .settle(DrawAssignments::new(ids(&[5, 4, 3, 2, 1]).try_into().unwrap()))
        .await
        .unwrap();

    let rewards = store.current_rewards().await.unwrap();
    assert_eq!(rewards.len(), 5);
    assert_eq!(rewards[0].tier, Tier::First);
    assert_eq!(rewards[0].number, num("333333"));
    assert_eq!(store.rewards().len(), 5);

    let active = store.active_draw().unwrap().unwrap();
    assert_eq!(active.reference(Tier::Fifth), &num("111111"));
}

#[tokio::test]
async fn settled_lines_keep_their_verdict() {
    let store = settled_fixture();
    buy(&store, 1, &[20]).await.unwrap();
    store.settle(tier4_prize_draw()).await.unwrap();

    // A later draw in which "987456" no longer wins leaves the earlier verdict.
    let summary = store
        .settle(DrawAssignments::new(ids(&[5, 4, 3, 2, 1]).try_into().unwrap()))
        .await
        .unwrap();
    assert_eq!(summary.lines_reclassified, 0);
    assert_eq!(
        store.lines()[0].settlement,
        SettlementStatus::Won(Tier::Fourth)
    );
}

#[tokio::test]
async fn settlement_with_unknown_ticket_changes_nothing() {
    let store = settled_fixture();
    buy(&store, 1, &[20]).await.unwrap();

    let err = store
        .settle(DrawAssignments::new(ids(&[1, 2, 3, 4, 99]).try_into().unwrap()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LotteryError::TicketNotFound(TicketLookup::Id(TicketId::new(99)))
    );
    assert!(store.current_rewards().await.unwrap().is_empty());
    assert_eq!(store.lines()[0].settlement, SettlementStatus::Pending);
}

// ============================================================================
// Claim
// ============================================================================

#[tokio::test]
async fn claim_pays_exactly_once() {
    let store = settled_fixture();
    buy(&store, 1, &[20]).await.unwrap();
    store.settle(tier4_prize_draw()).await.unwrap();
    let before = store.balance(UserId::new(1)).await.unwrap();

    let receipt = store
        .claim(UserId::new(1), num("987456"))
        .await
        .unwrap();
    assert_eq!(receipt.tier, Tier::Fourth);
    assert_eq!(receipt.prize_amount, Money::from_major(4000));
    assert_eq!(
        receipt.balance_after,
        before.checked_add(Money::from_major(4000)).unwrap()
    );
    assert_eq!(store.lines()[0].claim, ClaimStatus::Claimed);

    let again = store.claim(UserId::new(1), num("987456")).await;
    assert_eq!(again, Err(LotteryError::AlreadyClaimed(num("987456"))));
    assert_eq!(
        store.balance(UserId::new(1)).await.unwrap(),
        receipt.balance_after
    );
}

#[tokio::test]
async fn concurrent_claims_pay_once() {
    let store = settled_fixture();
    buy(&store, 1, &[20]).await.unwrap();
    store.settle(tier4_prize_draw()).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.claim(UserId::new(1), num("987456")).await })
        })
        .collect();
    let mut paid = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            paid += 1;
        }
    }
    assert_eq!(paid, 1);
}

#[tokio::test]
async fn claim_rejections() {
    let store = settled_fixture();
    buy(&store, 1, &[20, 22]).await.unwrap();

    // Pending lines are not winners yet.
    assert_eq!(
        store.claim(UserId::new(1), num("987456")).await,
        Err(LotteryError::NotAWinningTicket(num("987456")))
    );

    store.settle(tier4_prize_draw()).await.unwrap();
    assert_eq!(
        store.claim(UserId::new(1), num("000000")).await,
        Err(LotteryError::NotAWinningTicket(num("000000")))
    );
    assert_eq!(
        store.claim(UserId::new(2), num("987456")).await,
        Err(LotteryError::NotOwner {
            user_id: UserId::new(2),
            number: num("987456"),
        })
    );
    assert_eq!(
        store.claim(UserId::new(1), num("121212")).await,
        Err(LotteryError::TicketNotFound(TicketLookup::Number(num(
            "121212"
        ))))
    );
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn owned_tickets_for_unknown_user_is_empty() {
    let store = settled_fixture();
    assert!(
        store
            .list_owned_tickets(UserId::new(42))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn owned_tickets_follow_purchase_order() {
    let store = settled_fixture();
    buy(&store, 1, &[22]).await.unwrap();
    buy(&store, 1, &[21, 20]).await.unwrap();

    let owned = store.list_owned_tickets(UserId::new(1)).await.unwrap();
    let numbers: Vec<_> = owned.iter().map(|t| t.number.as_str().to_string()).collect();
    assert_eq!(numbers, ["000000", "987456", "555533"]);
    assert!(owned.iter().all(|t| t.claim == ClaimStatus::Unclaimed));
    assert_eq!(owned[1].order_id, owned[2].order_id);
    assert_ne!(owned[0].order_id, owned[1].order_id);
}

#[tokio::test]
async fn quote_reserves_nothing() {
    let store = LotteryFixture::new()
        .ticket(10, "123456", 80)
        .ticket(11, "654321", 40)
        .account(1, 1000)
        .build();
    buy(&store, 1, &[11]).await.unwrap();

    let quote = store.quote(ids(&[10, 11, 12])).await.unwrap();
    assert_eq!(quote.total_price, Money::from_major(80));
    assert_eq!(quote.not_available, ids(&[11, 12]));
    assert_eq!(
        store.ticket(TicketId::new(10)).unwrap().status,
        TicketStatus::Available
    );
}

#[tokio::test]
async fn rewards_empty_before_first_draw() {
    let store = settled_fixture();
    assert!(store.current_rewards().await.unwrap().is_empty());
    assert!(store.active_draw().unwrap().is_none());
}
