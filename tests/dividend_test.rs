mod common;

use chrono::Utc;
use common::{Harness, harness, ngn};
use proptoken::domain::dividend::{DistributionStatus, DividendPaymentStatus};
use proptoken::domain::money::Amount;
use proptoken::domain::property::User;
use proptoken::error::PlatformError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn holders(h: &Harness, count: usize) -> Vec<User> {
    let mut users = Vec::new();
    for i in 0..count {
        users.push(h.user(&format!("holder{}", i)).await);
    }
    users
}

#[tokio::test]
async fn test_frozen_wallets_fail_alone_and_retry_pays_once() {
    let h = harness();
    let users = holders(&h, 5).await;
    let stakes: Vec<(Uuid, u64)> = users.iter().map(|u| (u.id, 2)).collect();
    let campaign = h.minted_campaign(&stakes).await;
    for user in &users[..2] {
        h.services
            .wallets
            .set_frozen(user.id, true, Utc::now())
            .await
            .unwrap();
    }

    let (distribution, payments) = h
        .services
        .dividends
        .create_distribution(campaign.id, ngn(dec!(1000)), Utc::now())
        .await
        .unwrap();
    assert_eq!(payments.len(), 5);
    assert!(payments.iter().all(|p| p.amount.value() == dec!(200)));

    let processed = h
        .services
        .dividends
        .process_distribution(distribution.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(processed.successful_payments, 3);
    assert_eq!(processed.failed_payments, 2);
    assert_eq!(processed.status, DistributionStatus::PartiallyCompleted);
    for user in &users[2..] {
        assert_eq!(h.balance(user.id).await, dec!(200));
    }

    let failed: Vec<_> = h
        .services
        .dividends
        .payments(distribution.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.status == DividendPaymentStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|p| p.failure_reason.is_some()));

    // Still frozen: nothing changes and nobody is paid twice.
    let rerun = h
        .services
        .dividends
        .process_distribution(distribution.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(rerun.successful_payments, 3);
    assert_eq!(rerun.failed_payments, 2);
    for user in &users[2..] {
        assert_eq!(h.balance(user.id).await, dec!(200));
    }

    for user in &users[..2] {
        h.services
            .wallets
            .set_frozen(user.id, false, Utc::now())
            .await
            .unwrap();
    }
    let completed = h
        .services
        .dividends
        .process_distribution(distribution.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(completed.status, DistributionStatus::Completed);
    assert_eq!(completed.successful_payments, 5);
    assert_eq!(completed.failed_payments, 0);
    assert!(completed.completed_at.is_some());

    let mut paid = Decimal::ZERO;
    for user in &users {
        let balance = h.balance(user.id).await;
        assert_eq!(balance, dec!(200));
        paid += balance;
    }
    assert_eq!(paid, dec!(1000));
    assert!(
        h.ledger
            .audit_events()
            .contains(&"dividends_distributed".to_string())
    );
}

#[tokio::test]
async fn test_uneven_split_sums_to_total() {
    let h = harness();
    let users = holders(&h, 3).await;
    let campaign = h
        .minted_campaign(&[(users[0].id, 1), (users[1].id, 1), (users[2].id, 1)])
        .await;

    let (distribution, payments) = h
        .services
        .dividends
        .create_distribution(campaign.id, ngn(dec!(100)), Utc::now())
        .await
        .unwrap();
    let total: Decimal = payments.iter().map(|p| p.amount.value()).sum();
    assert_eq!(total, dec!(100));
    assert_eq!(distribution.total_tokens, 3);
}

#[tokio::test]
async fn test_largest_dividend_splits_without_overflow() {
    let h = harness();
    let users = holders(&h, 3).await;
    let campaign = h
        .minted_campaign(&[(users[0].id, 1), (users[1].id, 1), (users[2].id, 1)])
        .await;

    assert!(matches!(
        Amount::new(Decimal::MAX),
        Err(PlatformError::ValidationError(_))
    ));
    let (distribution, payments) = h
        .services
        .dividends
        .create_distribution(campaign.id, ngn(Amount::MAX), Utc::now())
        .await
        .unwrap();
    let total: Decimal = payments.iter().map(|p| p.amount.value()).sum();
    assert_eq!(total, Amount::MAX);
    assert_eq!(distribution.total_amount.value(), Amount::MAX);
}

#[tokio::test]
async fn test_claim_pays_own_row_once() {
    let h = harness();
    let users = holders(&h, 2).await;
    let campaign = h
        .minted_campaign(&[(users[0].id, 3), (users[1].id, 1)])
        .await;
    let (distribution, payments) = h
        .services
        .dividends
        .create_distribution(campaign.id, ngn(dec!(400)), Utc::now())
        .await
        .unwrap();
    let own = payments
        .iter()
        .find(|p| p.recipient_id == users[0].id)
        .unwrap();
    assert_eq!(own.amount.value(), dec!(300));

    let other = h
        .services
        .dividends
        .claim(own.id, users[1].id, Utc::now())
        .await;
    assert!(matches!(other, Err(PlatformError::Unauthorized(_))));

    let claimed = h
        .services
        .dividends
        .claim(own.id, users[0].id, Utc::now())
        .await
        .unwrap();
    assert_eq!(claimed.status, DividendPaymentStatus::Completed);
    assert_eq!(h.balance(users[0].id).await, dec!(300));

    let repeat = h
        .services
        .dividends
        .claim(own.id, users[0].id, Utc::now())
        .await;
    assert!(matches!(repeat, Err(PlatformError::Conflict(_))));
    assert_eq!(h.balance(users[0].id).await, dec!(300));

    let distribution = h.services.dividends.get(distribution.id).await.unwrap();
    assert_eq!(distribution.status, DistributionStatus::Pending);
    assert_eq!(distribution.successful_payments, 1);
}

#[tokio::test]
async fn test_distribution_requires_minted_campaign() {
    let h = harness();
    let now = Utc::now();
    let campaign = h.campaign(10, dec!(1000), dec!(0), now).await;
    let result = h
        .services
        .dividends
        .create_distribution(campaign.id, ngn(dec!(100)), now)
        .await;
    assert!(matches!(result, Err(PlatformError::InvalidState(_))));
}
