use super::record_store::RecordStore;
use super::records::{KvBackend, RowWrite, Table};
use crate::error::{PlatformError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

type Rows = HashMap<Table, BTreeMap<String, Vec<u8>>>;

/// Row storage held in process memory.
///
/// Ideal for tests and single-process demos where persistence is not required.
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<Rows>,
}

fn poisoned() -> PlatformError {
    PlatformError::InternalError(Box::new(std::io::Error::other(
        "In-memory table lock poisoned",
    )))
}

impl KvBackend for MemoryBackend {
    fn read(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.get(&table).and_then(|rows| rows.get(key)).cloned())
    }

    fn scan(&self, table: Table) -> Result<Vec<(String, Vec<u8>)>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .get(&table)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn commit(&self, writes: Vec<RowWrite>) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        for write in writes {
            tables
                .entry(write.table)
                .or_default()
                .insert(write.key, write.value);
        }
        Ok(())
    }
}

/// The platform database kept entirely in memory.
pub type InMemoryDatabase = RecordStore<MemoryBackend>;

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::with_backend(MemoryBackend::default())
    }
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dividend::{DistributionStatus, DividendDistribution};
    use crate::domain::governance::{
        GovernanceProposal, NewProposal, ProposalStatus, Vote, VoteChoice,
    };
    use crate::domain::investment::{PaymentMethod, PaymentStatus, ReservationRequest};
    use crate::domain::money::{Amount, Balance};
    use crate::domain::ports::{
        DividendStore, GovernanceStore, InvestmentStore, PropertyStore, TreasuryStore, UserStore,
        WalletStore,
    };
    use crate::domain::property::{NewProperty, NewUser, Property, User};
    use crate::domain::tokenization::{NewTokenization, Tokenization, TokenizationStatus};
    use crate::domain::treasury::NewWithdrawal;
    use crate::domain::wallet::WalletStatus;
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn user(db: &InMemoryDatabase, name: &str) -> Uuid {
        let user = User::new(
            NewUser {
                email: format!("{}@example.com", name),
                display_name: name.to_string(),
            },
            Utc::now(),
        )
        .unwrap();
        let id = user.id;
        db.insert_user(user).await.unwrap();
        id
    }

    async fn campaign(db: &InMemoryDatabase, supply: u64, now: DateTime<Utc>) -> Tokenization {
        let owner = user(db, "owner").await;
        let mut property = Property::new(
            NewProperty {
                owner_id: owner,
                title: "Lekki Heights".to_string(),
                location: "Lagos".to_string(),
                valuation: dec!(100000000),
            },
            now,
        )
        .unwrap();
        property.review(true).unwrap();
        db.insert_property(property.clone()).await.unwrap();
        let tokenization = Tokenization::new(
            NewTokenization {
                property_id: property.id,
                token_name: "Lekki Heights".to_string(),
                token_symbol: "LKH".to_string(),
                total_supply: supply,
                price_per_token: Amount::new(dec!(1000)).unwrap(),
                funding_start: now - Duration::days(1),
                funding_end: now + Duration::days(30),
                minimum_raise: dec!(1000),
                target_raise: dec!(1000) * Decimal::from(supply),
            },
            now,
        )
        .unwrap();
        db.insert_tokenization(tokenization.clone()).await.unwrap();
        tokenization
    }

    fn reservation(
        t: &Tokenization,
        investor: Uuid,
        naira: Decimal,
        now: DateTime<Utc>,
    ) -> ReservationRequest {
        ReservationRequest {
            tokenization_id: t.id,
            investor_id: investor,
            amount: Amount::new(naira).unwrap(),
            payment_method: PaymentMethod::Gateway,
            now,
            ttl: Duration::minutes(15),
        }
    }

    #[tokio::test]
    async fn test_reservation_holds_units() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let investor = user(&db, "ada").await;

        let inv = db
            .create_investment_with_reservation(reservation(&t, investor, dec!(3500), now))
            .await
            .unwrap();
        assert_eq!(inv.tokens, 3);
        assert_eq!(inv.amount.value(), dec!(3000));

        let stored = db.get_tokenization(t.id).await.unwrap().unwrap();
        assert_eq!(stored.tokens_reserved, 3);
        assert_eq!(stored.remaining_tokens(), 7);
    }

    #[tokio::test]
    async fn test_reservation_rejects_oversell() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let t = campaign(&db, 5, now).await;
        let investor = user(&db, "ada").await;

        db.create_investment_with_reservation(reservation(&t, investor, dec!(4000), now))
            .await
            .unwrap();
        let result = db
            .create_investment_with_reservation(reservation(&t, investor, dec!(2000), now))
            .await;
        assert!(matches!(
            result,
            Err(PlatformError::InsufficientSupply {
                remaining: 1,
                requested: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_expired_holds_released_on_next_reservation() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let t = campaign(&db, 5, now).await;
        let investor = user(&db, "ada").await;

        let stale = db
            .create_investment_with_reservation(reservation(&t, investor, dec!(5000), now))
            .await
            .unwrap();
        let later = now + Duration::minutes(20);
        db.create_investment_with_reservation(reservation(&t, investor, dec!(5000), later))
            .await
            .unwrap();

        let stale = db.get_investment(stale.id).await.unwrap().unwrap();
        assert_eq!(stale.payment_status, PaymentStatus::Expired);
        let stored = db.get_tokenization(t.id).await.unwrap().unwrap();
        assert_eq!(stored.tokens_reserved, 5);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversell() {
        let db = Arc::new(InMemoryDatabase::new());
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let investor = user(&db, "ada").await;

        let mut handles = Vec::new();
        for _ in 0..25 {
            let db = db.clone();
            let request = reservation(&t, investor, dec!(1000), now);
            handles.push(tokio::spawn(async move {
                db.create_investment_with_reservation(request).await
            }));
        }
        let mut reserved = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                reserved += 1;
            }
        }
        assert_eq!(reserved, 10);
        let stored = db.get_tokenization(t.id).await.unwrap().unwrap();
        assert_eq!(stored.tokens_reserved, 10);
        assert_eq!(stored.remaining_tokens(), 0);
    }

    #[tokio::test]
    async fn test_confirm_after_expiry_releases_hold() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let investor = user(&db, "ada").await;
        let inv = db
            .create_investment_with_reservation(reservation(&t, investor, dec!(2000), now))
            .await
            .unwrap();

        let result = db.confirm_investment(inv.id, now + Duration::minutes(16)).await;
        assert!(matches!(result, Err(PlatformError::ReservationExpired(_))));
        let stored = db.get_tokenization(t.id).await.unwrap().unwrap();
        assert_eq!(stored.tokens_reserved, 0);
        assert_eq!(stored.tokens_sold, 0);
    }

    #[tokio::test]
    async fn test_confirm_and_complete_is_idempotent() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let investor = user(&db, "ada").await;
        let inv = db
            .create_investment_with_reservation(reservation(&t, investor, dec!(2000), now))
            .await
            .unwrap();

        db.confirm_investment(inv.id, now).await.unwrap();
        db.complete_investment(inv.id, now).await.unwrap();
        db.complete_investment(inv.id, now).await.unwrap();

        let holding = db.get_holding(investor, t.id).await.unwrap().unwrap();
        assert_eq!(holding.tokens, 2);
        let stored = db.get_tokenization(t.id).await.unwrap().unwrap();
        assert_eq!(stored.tokens_sold, 2);
        assert_eq!(stored.current_raise, dec!(2000));
        assert_eq!(db.list_chat_members(t.property_id).await.unwrap().len(), 1);
        assert_eq!(db.list_notifications(investor).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wallet_reference_replay_is_noop() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let ada = user(&db, "ada").await;
        let amount = Amount::new(dec!(500)).unwrap();

        let first = db
            .credit_wallet(ada, amount, "ref-1".to_string(), now)
            .await
            .unwrap();
        let second = db
            .credit_wallet(ada, amount, "ref-1".to_string(), now)
            .await
            .unwrap();
        assert!(first.was_applied());
        assert!(!second.was_applied());
        assert_eq!(second.wallet().balance, Balance::new(dec!(500)));

        let reuse = db
            .debit_wallet(ada, amount, "ref-1".to_string(), now)
            .await;
        assert!(matches!(reuse, Err(PlatformError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_debit_without_wallet_is_insufficient() {
        let db = InMemoryDatabase::new();
        let ada = user(&db, "ada").await;
        let result = db
            .debit_wallet(ada, Amount::new(dec!(1)).unwrap(), "d-1".to_string(), Utc::now())
            .await;
        assert!(matches!(
            result,
            Err(PlatformError::InsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_dividend_payment_cannot_be_paid_twice() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let ada = user(&db, "ada").await;
        let inv = db
            .create_investment_with_reservation(reservation(&t, ada, dec!(4000), now))
            .await
            .unwrap();
        db.confirm_investment(inv.id, now).await.unwrap();
        db.complete_investment(inv.id, now).await.unwrap();

        let holdings = db.list_holdings(t.id).await.unwrap();
        let (distribution, payments) =
            DividendDistribution::plan(t.id, Amount::new(dec!(100)).unwrap(), &holdings, now)
                .unwrap();
        db.create_distribution(distribution.clone(), payments.clone())
            .await
            .unwrap();

        db.pay_dividend(payments[0].id, now).await.unwrap();
        let again = db.pay_dividend(payments[0].id, now).await;
        assert!(matches!(again, Err(PlatformError::Conflict(_))));

        let wallet = db.get_wallet(ada).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(100)));
        let finalized = db.finalize_distribution(distribution.id, now).await.unwrap();
        assert_eq!(finalized.status, DistributionStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_procedure_writes_nothing() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let ada = user(&db, "ada").await;
        db.set_wallet_status(ada, WalletStatus::Frozen, now)
            .await
            .unwrap();

        let result = db
            .credit_wallet(ada, Amount::new(dec!(10)).unwrap(), "frozen-1".to_string(), now)
            .await;
        assert!(matches!(result, Err(PlatformError::WalletFrozen(_))));
        assert!(db.get_wallet_entry("frozen-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_open_campaign_rejected() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let mut duplicate = t.clone();
        duplicate.id = Uuid::new_v4();
        let result = db.insert_tokenization(duplicate).await;
        assert!(matches!(result, Err(PlatformError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_concurrent_minting_claimed_once() {
        let db = Arc::new(InMemoryDatabase::new());
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let ada = user(&db, "ada").await;
        let inv = db
            .create_investment_with_reservation(reservation(&t, ada, dec!(2000), now))
            .await
            .unwrap();
        db.confirm_investment(inv.id, now).await.unwrap();
        db.close_funding(t.id, now + Duration::days(31)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            let id = t.id;
            handles.push(tokio::spawn(async move { db.begin_minting(id).await }));
        }
        let mut claimed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => claimed += 1,
                Err(e) => assert!(matches!(e, PlatformError::InvalidState(_))),
            }
        }
        assert_eq!(claimed, 1);
        let stored = db.get_tokenization(t.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TokenizationStatus::Minting);

        db.abort_minting(t.id).await.unwrap();
        db.begin_minting(t.id).await.unwrap();
        let minted = db.finish_minting(t.id, "0.0.77".to_string()).await.unwrap();
        assert_eq!(minted.token_id.as_deref(), Some("0.0.77"));
    }

    #[tokio::test]
    async fn test_concurrent_transfer_claims_hand_out_one() {
        let db = Arc::new(InMemoryDatabase::new());
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let ada = user(&db, "ada").await;
        let inv = db
            .create_investment_with_reservation(reservation(&t, ada, dec!(2000), now))
            .await
            .unwrap();
        db.confirm_investment(inv.id, now).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            let id = inv.id;
            handles.push(tokio::spawn(async move { db.claim_token_transfer(id).await }));
        }
        let mut claimed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);

        db.release_claim(inv.id).await.unwrap();
        assert!(db.claim_token_transfer(inv.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refund_refused_while_campaign_is_live() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let ada = user(&db, "ada").await;
        let inv = db
            .create_investment_with_reservation(reservation(&t, ada, dec!(2000), now))
            .await
            .unwrap();
        db.confirm_investment(inv.id, now).await.unwrap();
        db.complete_investment(inv.id, now).await.unwrap();

        let result = db.mark_refund_pending(inv.id, now).await;
        assert!(matches!(result, Err(PlatformError::InvalidState(_))));
        let stored = db.get_investment(inv.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Confirmed);
        assert!(!stored.in_flight);
        let tokenization = db.get_tokenization(t.id).await.unwrap().unwrap();
        assert_eq!(tokenization.tokens_sold, 2);
        let holding = db.get_holding(ada, t.id).await.unwrap().unwrap();
        assert_eq!(holding.tokens, 2);
    }

    #[tokio::test]
    async fn test_refund_claim_blocks_second_caller() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let ada = user(&db, "ada").await;
        let inv = db
            .create_investment_with_reservation(reservation(&t, ada, dec!(1000), now))
            .await
            .unwrap();
        db.set_payment_reference(inv.id, inv.id.to_string())
            .await
            .unwrap();
        db.release_expired_reservations(now + Duration::minutes(20))
            .await
            .unwrap();

        let claimed = db.mark_refund_pending(inv.id, now).await.unwrap();
        assert_eq!(claimed.payment_status, PaymentStatus::RefundPending);
        assert!(claimed.in_flight);
        let second = db.mark_refund_pending(inv.id, now).await;
        assert!(matches!(second, Err(PlatformError::Conflict(_))));

        db.release_claim(inv.id).await.unwrap();
        db.mark_refund_pending(inv.id, now).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_hold_without_payment_is_not_refunded() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let ada = user(&db, "ada").await;
        let inv = db
            .create_investment_with_reservation(reservation(&t, ada, dec!(1000), now))
            .await
            .unwrap();
        db.release_expired_reservations(now + Duration::minutes(20))
            .await
            .unwrap();

        let result = db.mark_refund_pending(inv.id, now).await;
        assert!(matches!(result, Err(PlatformError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_proposal_funds_flow_to_withdrawal() {
        let db = InMemoryDatabase::new();
        let now = Utc::now();
        let t = campaign(&db, 10, now).await;
        let ada = user(&db, "ada").await;
        let bola = user(&db, "bola").await;
        let inv = db
            .create_investment_with_reservation(reservation(&t, ada, dec!(6000), now))
            .await
            .unwrap();
        db.confirm_investment(inv.id, now).await.unwrap();
        db.complete_investment(inv.id, now).await.unwrap();

        db.configure_treasury(t.id, [ada, bola].into(), 2, now)
            .await
            .unwrap();
        db.deposit_treasury(t.id, Amount::new(dec!(50000)).unwrap(), now)
            .await
            .unwrap();

        let proposal = GovernanceProposal::new(
            NewProposal {
                tokenization_id: t.id,
                proposer_id: ada,
                title: "Roof".to_string(),
                description: String::new(),
                budget: Amount::new(dec!(20000)).unwrap(),
                voting_start: now,
                voting_end: now + Duration::days(3),
                quorum_bps: 5_000,
                approval_bps: 5_000,
            },
            now,
        )
        .unwrap();
        db.insert_proposal(proposal.clone()).await.unwrap();
        db.record_vote(Vote {
            proposal_id: proposal.id,
            voter_id: ada,
            choice: VoteChoice::For,
            weight: 0,
            cast_at: now,
        })
        .await
        .unwrap();
        let passed = db
            .finalize_proposal(proposal.id, now + Duration::days(4))
            .await
            .unwrap();
        assert_eq!(passed.status, ProposalStatus::Passed);
        let (_, treasury) = db
            .lock_proposal_funds(proposal.id, now + Duration::days(4))
            .await
            .unwrap();
        assert_eq!(treasury.locked, Balance::new(dec!(20000)));

        let withdrawal = db
            .request_withdrawal(
                NewWithdrawal {
                    tokenization_id: t.id,
                    proposal_id: Some(proposal.id),
                    recipient_id: bola,
                    amount: Amount::new(dec!(20000)).unwrap(),
                    reason: "Roof repairs".to_string(),
                    requested_by: ada,
                },
                now,
            )
            .await
            .unwrap();
        assert!(matches!(
            db.execute_withdrawal(withdrawal.id, now).await,
            Err(PlatformError::InsufficientApprovals { .. })
        ));
        db.approve_withdrawal(withdrawal.id, bola).await.unwrap();
        db.execute_withdrawal(withdrawal.id, now).await.unwrap();

        let wallet = db.get_wallet(bola).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Balance::new(dec!(20000)));
        let proposal = db.get_proposal(proposal.id).await.unwrap().unwrap();
        assert_eq!(proposal.status, ProposalStatus::Executed);
        let treasury = db.get_treasury(t.id).await.unwrap().unwrap();
        assert_eq!(treasury.locked, Balance::ZERO);
        assert_eq!(treasury.available, Balance::new(dec!(30000)));
    }
}
