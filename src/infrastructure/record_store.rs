//! The platform database: every port method runs as one unit of work over a
//! [`KvBackend`]. Mutating procedures are serialized by a single write lock,
//! which is what keeps concurrent reservations from overselling supply and
//! concurrent payouts from paying a row twice.

use super::records::{
    KvBackend, Record, UnitOfWork, chat_member_key, holding_key, vote_key,
};
use crate::domain::dividend::{DividendDistribution, DividendPayment};
use crate::domain::governance::{GovernanceProposal, ProposalStatus, Vote};
use crate::domain::investment::{Investment, PaymentStatus, ReservationRequest, TokenHolding};
use crate::domain::money::Amount;
use crate::domain::ports::{
    DividendStore, GovernanceStore, InvestmentStore, PropertyStore, TreasuryStore, UserStore,
    WalletStore,
};
use crate::domain::property::{ChatMember, Notification, Property, User};
use crate::domain::tokenization::{Tokenization, TokenizationStatus};
use crate::domain::treasury::{NewWithdrawal, Treasury, TreasuryWithdrawal};
use crate::domain::wallet::{
    EntryDirection, TopUpStatus, Wallet, WalletEntry, WalletMovement, WalletStatus, WalletTopUp,
};
use crate::error::{PlatformError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// The platform database over any [`KvBackend`].
///
/// Reads go straight to the backend. Every mutating port method runs as a
/// closure over a [`UnitOfWork`] while holding `write_lock`, and its writes
/// are committed as one batch.
pub struct RecordStore<B: KvBackend> {
    backend: B,
    write_lock: Mutex<()>,
}

impl<B: KvBackend> RecordStore<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    fn read<T: Record>(&self, key: &str) -> Result<Option<T>> {
        UnitOfWork::new(&self.backend).get(key)
    }

    fn scan<T: Record>(&self) -> Result<Vec<T>> {
        UnitOfWork::new(&self.backend).scan()
    }

    async fn transact<T, F>(&self, procedure: F) -> Result<T>
    where
        F: FnOnce(&mut UnitOfWork<'_, B>) -> Result<T> + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut uow = UnitOfWork::new(&self.backend);
        let output = procedure(&mut uow)?;
        self.backend.commit(uow.into_writes())?;
        Ok(output)
    }
}

fn release_hold(tokenization: &mut Tokenization, investment: &Investment) {
    tokenization.tokens_reserved = tokenization.tokens_reserved.saturating_sub(investment.tokens);
}

/// Expires the lapsed holds of one tokenization and returns their units.
fn release_stale_holds<B: KvBackend>(
    uow: &mut UnitOfWork<'_, B>,
    tokenization: &mut Tokenization,
    now: DateTime<Utc>,
) -> Result<()> {
    let stale: Vec<Investment> = uow
        .scan::<Investment>()?
        .into_iter()
        .filter(|i| i.tokenization_id == tokenization.id && i.is_reservation_expired(now))
        .collect();
    for mut investment in stale {
        investment.expire()?;
        release_hold(tokenization, &investment);
        uow.put(&investment)?;
    }
    Ok(())
}

fn apply_wallet_movement<B: KvBackend>(
    uow: &mut UnitOfWork<'_, B>,
    user_id: Uuid,
    amount: Amount,
    reference: String,
    direction: EntryDirection,
    now: DateTime<Utc>,
) -> Result<WalletMovement> {
    if let Some(entry) = uow.get::<WalletEntry>(&reference)? {
        if entry.user_id != user_id || entry.direction != direction || entry.amount != amount {
            return Err(PlatformError::Conflict(format!(
                "Wallet reference {} was already used for a different movement",
                reference
            )));
        }
        let wallet = uow.require::<Wallet>(&user_id.to_string())?;
        return Ok(WalletMovement::Duplicate(wallet));
    }

    uow.require::<User>(&user_id.to_string())?;
    let mut wallet = uow
        .get::<Wallet>(&user_id.to_string())?
        .unwrap_or_else(|| Wallet::new(user_id, now));
    match direction {
        EntryDirection::Credit => wallet.credit(amount, now)?,
        EntryDirection::Debit => wallet.debit(amount, now)?,
    }
    uow.put(&wallet)?;
    uow.put(&WalletEntry {
        reference,
        user_id,
        direction,
        amount,
        created_at: now,
    })?;
    Ok(WalletMovement::Applied(wallet))
}

#[async_trait]
impl<B: KvBackend> UserStore for RecordStore<B> {
    async fn insert_user(&self, user: User) -> Result<()> {
        self.transact(move |uow| uow.insert_new(&user)).await
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.read(&id.to_string())
    }

    async fn assign_ledger_account(&self, user_id: Uuid, account_id: String) -> Result<String> {
        self.transact(move |uow| {
            let mut user = uow.require::<User>(&user_id.to_string())?;
            if let Some(existing) = &user.ledger_account_id {
                return Ok(existing.clone());
            }
            user.ledger_account_id = Some(account_id.clone());
            uow.put(&user)?;
            Ok(account_id)
        })
        .await
    }
}

#[async_trait]
impl<B: KvBackend> PropertyStore for RecordStore<B> {
    async fn insert_property(&self, property: Property) -> Result<()> {
        self.transact(move |uow| {
            uow.require::<User>(&property.owner_id.to_string())?;
            uow.insert_new(&property)
        })
        .await
    }

    async fn get_property(&self, id: Uuid) -> Result<Option<Property>> {
        self.read(&id.to_string())
    }

    async fn update_property(&self, property: Property) -> Result<()> {
        self.transact(move |uow| {
            uow.require::<Property>(&property.id.to_string())?;
            uow.put(&property)
        })
        .await
    }

    async fn insert_tokenization(&self, tokenization: Tokenization) -> Result<()> {
        self.transact(move |uow| {
            uow.require::<Property>(&tokenization.property_id.to_string())?;
            let open = uow.scan::<Tokenization>()?.into_iter().any(|t| {
                t.property_id == tokenization.property_id
                    && matches!(
                        t.status,
                        TokenizationStatus::Upcoming
                            | TokenizationStatus::Active
                            | TokenizationStatus::MintingReady
                            | TokenizationStatus::Minting
                    )
            });
            if open {
                return Err(PlatformError::Conflict(format!(
                    "Property {} already has an open tokenization",
                    tokenization.property_id
                )));
            }
            uow.insert_new(&tokenization)
        })
        .await
    }

    async fn get_tokenization(&self, id: Uuid) -> Result<Option<Tokenization>> {
        self.read(&id.to_string())
    }

    async fn list_tokenizations(&self) -> Result<Vec<Tokenization>> {
        self.scan()
    }

    async fn activate_tokenization(&self, id: Uuid, now: DateTime<Utc>) -> Result<Tokenization> {
        self.transact(move |uow| {
            let mut tokenization = uow.require::<Tokenization>(&id.to_string())?;
            tokenization.activate(now)?;
            uow.put(&tokenization)?;
            Ok(tokenization)
        })
        .await
    }

    async fn close_funding(&self, id: Uuid, now: DateTime<Utc>) -> Result<Tokenization> {
        self.transact(move |uow| {
            let mut tokenization = uow.require::<Tokenization>(&id.to_string())?;
            release_stale_holds(uow, &mut tokenization, now)?;
            if tokenization.tokens_reserved > 0 {
                return Err(PlatformError::InvalidState(format!(
                    "{} units are still held by live reservations",
                    tokenization.tokens_reserved
                )));
            }
            tokenization.close_funding(now)?;
            uow.put(&tokenization)?;
            Ok(tokenization)
        })
        .await
    }

    async fn begin_minting(&self, id: Uuid) -> Result<Tokenization> {
        self.transact(move |uow| {
            let mut tokenization = uow.require::<Tokenization>(&id.to_string())?;
            tokenization.begin_minting()?;
            uow.put(&tokenization)?;
            Ok(tokenization)
        })
        .await
    }

    async fn abort_minting(&self, id: Uuid) -> Result<Tokenization> {
        self.transact(move |uow| {
            let mut tokenization = uow.require::<Tokenization>(&id.to_string())?;
            tokenization.abort_minting()?;
            uow.put(&tokenization)?;
            Ok(tokenization)
        })
        .await
    }

    async fn finish_minting(&self, id: Uuid, token_id: String) -> Result<Tokenization> {
        self.transact(move |uow| {
            let mut tokenization = uow.require::<Tokenization>(&id.to_string())?;
            tokenization.mark_minted(token_id)?;
            uow.put(&tokenization)?;
            Ok(tokenization)
        })
        .await
    }

    async fn finish_token_distribution(&self, id: Uuid) -> Result<Tokenization> {
        self.transact(move |uow| {
            let mut tokenization = uow.require::<Tokenization>(&id.to_string())?;
            if tokenization.status == TokenizationStatus::Distributed {
                return Ok(tokenization);
            }
            let waiting = uow
                .scan::<Investment>()?
                .into_iter()
                .any(|i| i.tokenization_id == id && i.payment_status == PaymentStatus::Confirmed);
            if !waiting {
                tokenization.mark_distributed()?;
                uow.put(&tokenization)?;
            }
            Ok(tokenization)
        })
        .await
    }
}

#[async_trait]
impl<B: KvBackend> InvestmentStore for RecordStore<B> {
    async fn create_investment_with_reservation(
        &self,
        request: ReservationRequest,
    ) -> Result<Investment> {
        self.transact(move |uow| {
            let mut tokenization =
                uow.require::<Tokenization>(&request.tokenization_id.to_string())?;
            uow.require::<User>(&request.investor_id.to_string())?;

            release_stale_holds(uow, &mut tokenization, request.now)?;

            if !tokenization.is_accepting_investments(request.now) {
                return Err(PlatformError::InvalidState(format!(
                    "Tokenization {} is not accepting investments",
                    tokenization.id
                )));
            }
            let tokens = tokenization.tokens_for(request.amount)?;
            if tokens == 0 {
                return Err(PlatformError::ValidationError(format!(
                    "Amount is below the price of one token ({})",
                    tokenization.price_per_token
                )));
            }
            let remaining = tokenization.remaining_tokens();
            if tokens > remaining {
                return Err(PlatformError::InsufficientSupply {
                    remaining,
                    requested: tokens,
                });
            }

            let charged =
                Amount::new(tokenization.price_per_token.value() * Decimal::from(tokens))?;
            tokenization.tokens_reserved += tokens;
            let investment = Investment {
                id: Uuid::new_v4(),
                investor_id: request.investor_id,
                tokenization_id: tokenization.id,
                amount: charged,
                tokens,
                payment_method: request.payment_method,
                payment_status: PaymentStatus::Pending,
                reservation_expires_at: request.now + request.ttl,
                payment_reference: None,
                completed: false,
                ledger_transaction_id: None,
                failure_reason: None,
                in_flight: false,
                created_at: request.now,
                confirmed_at: None,
            };
            uow.put(&tokenization)?;
            uow.insert_new(&investment)?;
            debug!(
                investment = %investment.id,
                tokens,
                remaining = tokenization.remaining_tokens(),
                "reserved tokens"
            );
            Ok(investment)
        })
        .await
    }

    async fn get_investment(&self, id: Uuid) -> Result<Option<Investment>> {
        self.read(&id.to_string())
    }

    async fn list_investments(&self, tokenization_id: Uuid) -> Result<Vec<Investment>> {
        let mut investments: Vec<Investment> = self
            .scan::<Investment>()?
            .into_iter()
            .filter(|i| i.tokenization_id == tokenization_id)
            .collect();
        investments.sort_by_key(|i| i.created_at);
        Ok(investments)
    }

    async fn set_payment_reference(&self, id: Uuid, reference: String) -> Result<Investment> {
        self.transact(move |uow| {
            let mut investment = uow.require::<Investment>(&id.to_string())?;
            investment.payment_reference = Some(reference);
            uow.put(&investment)?;
            Ok(investment)
        })
        .await
    }

    async fn confirm_investment(&self, id: Uuid, now: DateTime<Utc>) -> Result<Investment> {
        let investment = self
            .transact(move |uow| {
                let mut investment = uow.require::<Investment>(&id.to_string())?;
                if investment.payment_status == PaymentStatus::Expired {
                    return Ok(investment);
                }
                let mut tokenization =
                    uow.require::<Tokenization>(&investment.tokenization_id.to_string())?;
                if investment.is_reservation_expired(now) {
                    investment.expire()?;
                    release_hold(&mut tokenization, &investment);
                } else {
                    investment.confirm(now)?;
                    release_hold(&mut tokenization, &investment);
                    tokenization.tokens_sold += investment.tokens;
                    tokenization.current_raise += investment.amount.value();
                }
                uow.put(&tokenization)?;
                uow.put(&investment)?;
                Ok(investment)
            })
            .await?;

        if investment.payment_status == PaymentStatus::Expired {
            return Err(PlatformError::ReservationExpired(investment.id));
        }
        Ok(investment)
    }

    async fn release_expired_reservation(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Investment>> {
        self.transact(move |uow| {
            let mut investment = uow.require::<Investment>(&id.to_string())?;
            if !investment.is_reservation_expired(now) {
                return Ok(None);
            }
            let mut tokenization =
                uow.require::<Tokenization>(&investment.tokenization_id.to_string())?;
            investment.expire()?;
            release_hold(&mut tokenization, &investment);
            uow.put(&tokenization)?;
            uow.put(&investment)?;
            Ok(Some(investment))
        })
        .await
    }

    async fn release_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Investment>> {
        let released = self
            .transact(move |uow| {
                let mut released = Vec::new();
                let mut tokenizations: HashMap<Uuid, Tokenization> = HashMap::new();
                for mut investment in uow.scan::<Investment>()? {
                    if !investment.is_reservation_expired(now) {
                        continue;
                    }
                    let tokenization = match tokenizations.entry(investment.tokenization_id) {
                        Entry::Occupied(e) => e.into_mut(),
                        Entry::Vacant(e) => e.insert(
                            uow.require::<Tokenization>(&investment.tokenization_id.to_string())?,
                        ),
                    };
                    investment.expire()?;
                    release_hold(tokenization, &investment);
                    uow.put(&investment)?;
                    released.push(investment);
                }
                for tokenization in tokenizations.values() {
                    uow.put(tokenization)?;
                }
                Ok(released)
            })
            .await?;
        if !released.is_empty() {
            info!(count = released.len(), "released expired reservations");
        }
        Ok(released)
    }

    async fn fail_investment(
        &self,
        id: Uuid,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Investment> {
        self.transact(move |uow| {
            let mut investment = uow.require::<Investment>(&id.to_string())?;
            let mut tokenization =
                uow.require::<Tokenization>(&investment.tokenization_id.to_string())?;
            investment.fail(reason.clone())?;
            release_hold(&mut tokenization, &investment);
            uow.put(&Notification::new(
                investment.investor_id,
                "Payment failed",
                format!(
                    "Your investment of {} in {} could not be completed: {}",
                    investment.amount, tokenization.token_symbol, reason
                ),
                now,
            ))?;
            uow.put(&tokenization)?;
            uow.put(&investment)?;
            Ok(investment)
        })
        .await
    }

    async fn complete_investment(&self, id: Uuid, now: DateTime<Utc>) -> Result<Investment> {
        self.transact(move |uow| {
            let mut investment = uow.require::<Investment>(&id.to_string())?;
            if !investment.is_settled() {
                return Err(PlatformError::InvalidState(format!(
                    "Investment {} is not confirmed",
                    investment.id
                )));
            }
            if investment.completed {
                return Ok(investment);
            }
            let tokenization =
                uow.require::<Tokenization>(&investment.tokenization_id.to_string())?;

            let key = holding_key(investment.tokenization_id, investment.investor_id);
            let mut holding = uow.get::<TokenHolding>(&key)?.unwrap_or_else(|| {
                TokenHolding::new(investment.investor_id, investment.tokenization_id, now)
            });
            holding.tokens += investment.tokens;
            holding.updated_at = now;
            uow.put(&holding)?;

            let member_key = chat_member_key(tokenization.property_id, investment.investor_id);
            if uow.get::<ChatMember>(&member_key)?.is_none() {
                uow.put(&ChatMember {
                    property_id: tokenization.property_id,
                    user_id: investment.investor_id,
                    joined_at: now,
                })?;
            }

            uow.put(&Notification::new(
                investment.investor_id,
                "Investment confirmed",
                format!(
                    "You now hold {} {} tokens ({} paid)",
                    holding.tokens, tokenization.token_symbol, investment.amount
                ),
                now,
            ))?;

            investment.completed = true;
            uow.put(&investment)?;
            Ok(investment)
        })
        .await
    }

    async fn mark_refund_pending(&self, id: Uuid, now: DateTime<Utc>) -> Result<Investment> {
        self.transact(move |uow| {
            let mut investment = uow.require::<Investment>(&id.to_string())?;
            let was_confirmed = investment.payment_status == PaymentStatus::Confirmed;
            let mut tokenization =
                uow.require::<Tokenization>(&investment.tokenization_id.to_string())?;
            if was_confirmed && tokenization.status != TokenizationStatus::Failed {
                return Err(PlatformError::InvalidState(format!(
                    "Tokenization {} is {:?}; only failed campaigns are refunded",
                    tokenization.id, tokenization.status
                )));
            }
            if investment.payment_status == PaymentStatus::Expired
                && investment.payment_reference.is_none()
            {
                return Err(PlatformError::InvalidState(format!(
                    "Investment {} expired before any payment was taken",
                    investment.id
                )));
            }
            investment.claim_refund()?;

            if was_confirmed {
                tokenization.tokens_sold =
                    tokenization.tokens_sold.saturating_sub(investment.tokens);
                tokenization.current_raise -= investment.amount.value();
                uow.put(&tokenization)?;
            }
            if investment.completed {
                let key = holding_key(investment.tokenization_id, investment.investor_id);
                if let Some(mut holding) = uow.get::<TokenHolding>(&key)? {
                    holding.tokens = holding.tokens.saturating_sub(investment.tokens);
                    holding.updated_at = now;
                    uow.put(&holding)?;
                }
                investment.completed = false;
            }
            uow.put(&investment)?;
            Ok(investment)
        })
        .await
    }

    async fn mark_refunded(&self, id: Uuid, now: DateTime<Utc>) -> Result<Investment> {
        self.transact(move |uow| {
            let mut investment = uow.require::<Investment>(&id.to_string())?;
            investment.mark_refunded()?;
            uow.put(&Notification::new(
                investment.investor_id,
                "Refund processed",
                format!("{} has been refunded", investment.amount),
                now,
            ))?;
            uow.put(&investment)?;
            Ok(investment)
        })
        .await
    }

    async fn claim_token_transfer(&self, id: Uuid) -> Result<Option<Investment>> {
        self.transact(move |uow| {
            let mut investment = uow.require::<Investment>(&id.to_string())?;
            if !investment.claim_token_transfer()? {
                return Ok(None);
            }
            uow.put(&investment)?;
            Ok(Some(investment))
        })
        .await
    }

    async fn release_claim(&self, id: Uuid) -> Result<Investment> {
        self.transact(move |uow| {
            let mut investment = uow.require::<Investment>(&id.to_string())?;
            investment.release_claim();
            uow.put(&investment)?;
            Ok(investment)
        })
        .await
    }

    async fn mark_tokens_distributed(&self, id: Uuid, ledger_tx: String) -> Result<Investment> {
        self.transact(move |uow| {
            let mut investment = uow.require::<Investment>(&id.to_string())?;
            investment.mark_tokens_distributed(ledger_tx)?;
            uow.put(&investment)?;
            Ok(investment)
        })
        .await
    }

    async fn get_holding(
        &self,
        user_id: Uuid,
        tokenization_id: Uuid,
    ) -> Result<Option<TokenHolding>> {
        self.read(&holding_key(tokenization_id, user_id))
    }

    async fn list_holdings(&self, tokenization_id: Uuid) -> Result<Vec<TokenHolding>> {
        Ok(self
            .scan::<TokenHolding>()?
            .into_iter()
            .filter(|h| h.tokenization_id == tokenization_id)
            .collect())
    }

    async fn notify(&self, notification: Notification) -> Result<()> {
        self.transact(move |uow| uow.put(&notification)).await
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let mut notifications: Vec<Notification> = self
            .scan::<Notification>()?
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect();
        notifications.sort_by_key(|n| n.created_at);
        Ok(notifications)
    }

    async fn list_chat_members(&self, property_id: Uuid) -> Result<Vec<ChatMember>> {
        Ok(self
            .scan::<ChatMember>()?
            .into_iter()
            .filter(|m| m.property_id == property_id)
            .collect())
    }
}

#[async_trait]
impl<B: KvBackend> WalletStore for RecordStore<B> {
    async fn get_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>> {
        self.read(&user_id.to_string())
    }

    async fn set_wallet_status(
        &self,
        user_id: Uuid,
        status: WalletStatus,
        now: DateTime<Utc>,
    ) -> Result<Wallet> {
        self.transact(move |uow| {
            uow.require::<User>(&user_id.to_string())?;
            let mut wallet = uow
                .get::<Wallet>(&user_id.to_string())?
                .unwrap_or_else(|| Wallet::new(user_id, now));
            wallet.status = status;
            wallet.updated_at = now;
            uow.put(&wallet)?;
            Ok(wallet)
        })
        .await
    }

    async fn credit_wallet(
        &self,
        user_id: Uuid,
        amount: Amount,
        reference: String,
        now: DateTime<Utc>,
    ) -> Result<WalletMovement> {
        self.transact(move |uow| {
            apply_wallet_movement(uow, user_id, amount, reference, EntryDirection::Credit, now)
        })
        .await
    }

    async fn debit_wallet(
        &self,
        user_id: Uuid,
        amount: Amount,
        reference: String,
        now: DateTime<Utc>,
    ) -> Result<WalletMovement> {
        self.transact(move |uow| {
            apply_wallet_movement(uow, user_id, amount, reference, EntryDirection::Debit, now)
        })
        .await
    }

    async fn get_wallet_entry(&self, reference: &str) -> Result<Option<WalletEntry>> {
        self.read(reference)
    }

    async fn insert_top_up(&self, top_up: WalletTopUp) -> Result<()> {
        self.transact(move |uow| {
            uow.require::<User>(&top_up.user_id.to_string())?;
            uow.insert_new(&top_up)
        })
        .await
    }

    async fn get_top_up(&self, reference: &str) -> Result<Option<WalletTopUp>> {
        self.read(reference)
    }

    async fn settle_top_up(&self, reference: &str, now: DateTime<Utc>) -> Result<WalletTopUp> {
        let reference = reference.to_string();
        self.transact(move |uow| {
            let mut top_up = uow.require::<WalletTopUp>(&reference)?;
            match top_up.status {
                TopUpStatus::Credited => return Ok(top_up),
                TopUpStatus::Failed => {
                    return Err(PlatformError::InvalidState(format!(
                        "Top-up {} already failed",
                        reference
                    )));
                }
                TopUpStatus::Pending => {}
            }
            apply_wallet_movement(
                uow,
                top_up.user_id,
                top_up.amount,
                reference.clone(),
                EntryDirection::Credit,
                now,
            )?;
            top_up.status = TopUpStatus::Credited;
            uow.put(&top_up)?;
            Ok(top_up)
        })
        .await
    }

    async fn fail_top_up(&self, reference: &str) -> Result<WalletTopUp> {
        let reference = reference.to_string();
        self.transact(move |uow| {
            let mut top_up = uow.require::<WalletTopUp>(&reference)?;
            if top_up.status == TopUpStatus::Credited {
                return Err(PlatformError::InvalidState(format!(
                    "Top-up {} was already credited",
                    reference
                )));
            }
            top_up.status = TopUpStatus::Failed;
            uow.put(&top_up)?;
            Ok(top_up)
        })
        .await
    }
}

#[async_trait]
impl<B: KvBackend> DividendStore for RecordStore<B> {
    async fn create_distribution(
        &self,
        distribution: DividendDistribution,
        payments: Vec<DividendPayment>,
    ) -> Result<()> {
        self.transact(move |uow| {
            uow.require::<Tokenization>(&distribution.tokenization_id.to_string())?;
            let total: Decimal = payments.iter().map(|p| p.amount.value()).sum();
            if total != distribution.total_amount.value() {
                return Err(PlatformError::ValidationError(format!(
                    "Payments sum to {} but the distribution is {}",
                    total,
                    distribution.total_amount.value()
                )));
            }
            uow.insert_new(&distribution)?;
            for payment in &payments {
                uow.insert_new(payment)?;
            }
            Ok(())
        })
        .await
    }

    async fn get_distribution(&self, id: Uuid) -> Result<Option<DividendDistribution>> {
        self.read(&id.to_string())
    }

    async fn list_distributions(&self, tokenization_id: Uuid) -> Result<Vec<DividendDistribution>> {
        let mut distributions: Vec<DividendDistribution> = self
            .scan::<DividendDistribution>()?
            .into_iter()
            .filter(|d| d.tokenization_id == tokenization_id)
            .collect();
        distributions.sort_by_key(|d| d.created_at);
        Ok(distributions)
    }

    async fn list_dividend_payments(&self, distribution_id: Uuid) -> Result<Vec<DividendPayment>> {
        let mut payments: Vec<DividendPayment> = self
            .scan::<DividendPayment>()?
            .into_iter()
            .filter(|p| p.distribution_id == distribution_id)
            .collect();
        payments.sort_by_key(|p| p.recipient_id);
        Ok(payments)
    }

    async fn get_dividend_payment(&self, id: Uuid) -> Result<Option<DividendPayment>> {
        self.read(&id.to_string())
    }

    async fn pay_dividend(&self, payment_id: Uuid, now: DateTime<Utc>) -> Result<DividendPayment> {
        self.transact(move |uow| {
            let mut payment = uow.require::<DividendPayment>(&payment_id.to_string())?;
            if !payment.is_payable() {
                return Err(PlatformError::Conflict(format!(
                    "Dividend payment {} was already paid",
                    payment.id
                )));
            }
            apply_wallet_movement(
                uow,
                payment.recipient_id,
                payment.amount,
                payment.wallet_reference(),
                EntryDirection::Credit,
                now,
            )?;
            payment.complete(now)?;
            uow.put(&payment)?;
            Ok(payment)
        })
        .await
    }

    async fn mark_dividend_failed(
        &self,
        payment_id: Uuid,
        reason: String,
    ) -> Result<DividendPayment> {
        self.transact(move |uow| {
            let mut payment = uow.require::<DividendPayment>(&payment_id.to_string())?;
            payment.fail(reason);
            uow.put(&payment)?;
            Ok(payment)
        })
        .await
    }

    async fn finalize_distribution(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<DividendDistribution> {
        self.transact(move |uow| {
            let mut distribution = uow.require::<DividendDistribution>(&id.to_string())?;
            let payments: Vec<DividendPayment> = uow
                .scan::<DividendPayment>()?
                .into_iter()
                .filter(|p| p.distribution_id == id)
                .collect();
            distribution.settle(&payments, now);
            uow.put(&distribution)?;
            Ok(distribution)
        })
        .await
    }
}

#[async_trait]
impl<B: KvBackend> GovernanceStore for RecordStore<B> {
    async fn insert_proposal(&self, proposal: GovernanceProposal) -> Result<()> {
        self.transact(move |uow| {
            uow.require::<Tokenization>(&proposal.tokenization_id.to_string())?;
            uow.insert_new(&proposal)
        })
        .await
    }

    async fn get_proposal(&self, id: Uuid) -> Result<Option<GovernanceProposal>> {
        self.read(&id.to_string())
    }

    async fn record_vote(&self, vote: Vote) -> Result<GovernanceProposal> {
        self.transact(move |uow| {
            let mut proposal = uow.require::<GovernanceProposal>(&vote.proposal_id.to_string())?;
            if uow
                .get::<Vote>(&vote_key(vote.proposal_id, vote.voter_id))?
                .is_some()
            {
                return Err(PlatformError::Conflict(format!(
                    "{} already voted on proposal {}",
                    vote.voter_id, vote.proposal_id
                )));
            }
            let weight = uow
                .get::<TokenHolding>(&holding_key(proposal.tokenization_id, vote.voter_id))?
                .map(|h| h.tokens)
                .unwrap_or(0);
            let vote = Vote { weight, ..vote };
            proposal.tally(&vote)?;
            uow.put(&vote)?;
            uow.put(&proposal)?;
            Ok(proposal)
        })
        .await
    }

    async fn finalize_proposal(&self, id: Uuid, now: DateTime<Utc>) -> Result<GovernanceProposal> {
        self.transact(move |uow| {
            let mut proposal = uow.require::<GovernanceProposal>(&id.to_string())?;
            let tokenization =
                uow.require::<Tokenization>(&proposal.tokenization_id.to_string())?;
            proposal.finalize(tokenization.tokens_sold, now)?;
            uow.put(&proposal)?;
            Ok(proposal)
        })
        .await
    }

    async fn lock_proposal_funds(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(GovernanceProposal, Treasury)> {
        self.transact(move |uow| {
            let mut proposal = uow.require::<GovernanceProposal>(&id.to_string())?;
            let mut treasury = uow.require::<Treasury>(&proposal.tokenization_id.to_string())?;
            proposal.mark_funds_locked()?;
            treasury.lock(proposal.budget, now)?;
            uow.put(&proposal)?;
            uow.put(&treasury)?;
            Ok((proposal, treasury))
        })
        .await
    }
}

#[async_trait]
impl<B: KvBackend> TreasuryStore for RecordStore<B> {
    async fn get_treasury(&self, tokenization_id: Uuid) -> Result<Option<Treasury>> {
        self.read(&tokenization_id.to_string())
    }

    async fn configure_treasury(
        &self,
        tokenization_id: Uuid,
        signers: BTreeSet<Uuid>,
        threshold: usize,
        now: DateTime<Utc>,
    ) -> Result<Treasury> {
        self.transact(move |uow| {
            uow.require::<Tokenization>(&tokenization_id.to_string())?;
            for signer in &signers {
                uow.require::<User>(&signer.to_string())?;
            }
            let mut treasury = uow
                .get::<Treasury>(&tokenization_id.to_string())?
                .unwrap_or_else(|| Treasury::new(tokenization_id, now));
            treasury.configure_signers(signers, threshold)?;
            treasury.updated_at = now;
            uow.put(&treasury)?;
            Ok(treasury)
        })
        .await
    }

    async fn deposit_treasury(
        &self,
        tokenization_id: Uuid,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<Treasury> {
        self.transact(move |uow| {
            uow.require::<Tokenization>(&tokenization_id.to_string())?;
            let mut treasury = uow
                .get::<Treasury>(&tokenization_id.to_string())?
                .unwrap_or_else(|| Treasury::new(tokenization_id, now));
            treasury.deposit(amount, now);
            uow.put(&treasury)?;
            Ok(treasury)
        })
        .await
    }

    async fn request_withdrawal(
        &self,
        draft: NewWithdrawal,
        now: DateTime<Utc>,
    ) -> Result<TreasuryWithdrawal> {
        self.transact(move |uow| {
            let treasury = uow.require::<Treasury>(&draft.tokenization_id.to_string())?;
            uow.require::<User>(&draft.recipient_id.to_string())?;
            if let Some(proposal_id) = draft.proposal_id {
                let proposal = uow.require::<GovernanceProposal>(&proposal_id.to_string())?;
                if proposal.tokenization_id != draft.tokenization_id
                    || proposal.status != ProposalStatus::Passed
                    || !proposal.funds_locked
                {
                    return Err(PlatformError::InvalidState(format!(
                        "Proposal {} has no locked funds for this treasury",
                        proposal_id
                    )));
                }
                if draft.amount > proposal.budget {
                    return Err(PlatformError::ValidationError(format!(
                        "Withdrawal exceeds the proposal budget of {}",
                        proposal.budget
                    )));
                }
            }
            let withdrawal = TreasuryWithdrawal::request(draft, &treasury, now)?;
            uow.insert_new(&withdrawal)?;
            Ok(withdrawal)
        })
        .await
    }

    async fn get_withdrawal(&self, id: Uuid) -> Result<Option<TreasuryWithdrawal>> {
        self.read(&id.to_string())
    }

    async fn approve_withdrawal(&self, id: Uuid, signer: Uuid) -> Result<TreasuryWithdrawal> {
        self.transact(move |uow| {
            let mut withdrawal = uow.require::<TreasuryWithdrawal>(&id.to_string())?;
            let treasury = uow.require::<Treasury>(&withdrawal.tokenization_id.to_string())?;
            withdrawal.approve(signer, &treasury)?;
            uow.put(&withdrawal)?;
            Ok(withdrawal)
        })
        .await
    }

    async fn execute_withdrawal(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TreasuryWithdrawal> {
        self.transact(move |uow| {
            let mut withdrawal = uow.require::<TreasuryWithdrawal>(&id.to_string())?;
            let mut treasury = uow.require::<Treasury>(&withdrawal.tokenization_id.to_string())?;
            withdrawal.ensure_executable(&treasury)?;
            let proposal = match withdrawal.proposal_id {
                Some(proposal_id) => {
                    let mut proposal =
                        uow.require::<GovernanceProposal>(&proposal_id.to_string())?;
                    proposal.mark_executed()?;
                    treasury.settle_locked(proposal.budget, withdrawal.amount, now)?;
                    Some(proposal)
                }
                None => {
                    treasury.release(withdrawal.amount, now)?;
                    None
                }
            };
            apply_wallet_movement(
                uow,
                withdrawal.recipient_id,
                withdrawal.amount,
                format!("treasury:{}", withdrawal.id),
                EntryDirection::Credit,
                now,
            )?;
            if let Some(proposal) = &proposal {
                uow.put(proposal)?;
            }
            withdrawal.mark_executed(now);
            uow.put(&treasury)?;
            uow.put(&withdrawal)?;
            Ok(withdrawal)
        })
        .await
    }
}
