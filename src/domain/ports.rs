//! Seams to the outside world: the platform database (with its atomic
//! procedures), the fiat payment gateway and the distributed ledger.

use super::dividend::{DividendDistribution, DividendPayment};
use super::governance::{GovernanceProposal, Vote};
use super::investment::{Investment, ReservationRequest, TokenHolding};
use super::money::Amount;
use super::property::{ChatMember, Notification, Property, User};
use super::tokenization::Tokenization;
use super::treasury::{NewWithdrawal, Treasury, TreasuryWithdrawal};
use super::wallet::{Wallet, WalletEntry, WalletMovement, WalletStatus, WalletTopUp};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: User) -> Result<()>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    /// Records the user's ledger account unless one is already recorded;
    /// returns the account that is on file afterwards.
    async fn assign_ledger_account(&self, user_id: Uuid, account_id: String) -> Result<String>;
}

#[async_trait]
pub trait PropertyStore: Send + Sync {
    async fn insert_property(&self, property: Property) -> Result<()>;
    async fn get_property(&self, id: Uuid) -> Result<Option<Property>>;
    async fn update_property(&self, property: Property) -> Result<()>;
    /// Rejects a second open campaign on the same property.
    async fn insert_tokenization(&self, tokenization: Tokenization) -> Result<()>;
    async fn get_tokenization(&self, id: Uuid) -> Result<Option<Tokenization>>;
    async fn list_tokenizations(&self) -> Result<Vec<Tokenization>>;
    async fn activate_tokenization(&self, id: Uuid, now: DateTime<Utc>) -> Result<Tokenization>;
    /// Releases the campaign's expired holds, then ends funding. Live holds
    /// block closing.
    async fn close_funding(&self, id: Uuid, now: DateTime<Utc>) -> Result<Tokenization>;
    /// Claims a `MintingReady` campaign for minting; a second caller is refused.
    async fn begin_minting(&self, id: Uuid) -> Result<Tokenization>;
    async fn abort_minting(&self, id: Uuid) -> Result<Tokenization>;
    async fn finish_minting(&self, id: Uuid, token_id: String) -> Result<Tokenization>;
    /// Marks a minted campaign distributed once no confirmed investment is
    /// still waiting for its units; otherwise returns it unchanged.
    async fn finish_token_distribution(&self, id: Uuid) -> Result<Tokenization>;
}

#[async_trait]
pub trait InvestmentStore: Send + Sync {
    /// Releases expired holds on the tokenization, checks the remaining
    /// supply and creates a pending investment holding the units.
    async fn create_investment_with_reservation(
        &self,
        request: ReservationRequest,
    ) -> Result<Investment>;
    async fn get_investment(&self, id: Uuid) -> Result<Option<Investment>>;
    async fn list_investments(&self, tokenization_id: Uuid) -> Result<Vec<Investment>>;
    async fn set_payment_reference(&self, id: Uuid, reference: String) -> Result<Investment>;
    /// Moves held units to sold. An expired hold is released instead and
    /// `ReservationExpired` is returned.
    async fn confirm_investment(&self, id: Uuid, now: DateTime<Utc>) -> Result<Investment>;
    /// Returns the investment if its hold was expired and has now been released.
    async fn release_expired_reservation(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Investment>>;
    async fn release_expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Investment>>;
    /// Marks a pending investment failed, releasing its hold.
    async fn fail_investment(
        &self,
        id: Uuid,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Investment>;
    /// Credits the holding, joins the property chat room and notifies the
    /// investor. Repeated calls are no-ops.
    async fn complete_investment(&self, id: Uuid, now: DateTime<Utc>) -> Result<Investment>;
    /// Claims the refund for the caller and reverses the sale. Confirmed
    /// investments are refundable only once their campaign has failed; an
    /// expired hold is refundable when its payment landed late. A refund
    /// already being worked on is a `Conflict`.
    async fn mark_refund_pending(&self, id: Uuid, now: DateTime<Utc>) -> Result<Investment>;
    async fn mark_refunded(&self, id: Uuid, now: DateTime<Utc>) -> Result<Investment>;
    /// Claims the ledger transfer of a confirmed investment. `None` when the
    /// units are delivered or another caller holds the claim.
    async fn claim_token_transfer(&self, id: Uuid) -> Result<Option<Investment>>;
    /// Drops a transfer or refund claim after the external call failed.
    async fn release_claim(&self, id: Uuid) -> Result<Investment>;
    async fn mark_tokens_distributed(&self, id: Uuid, ledger_tx: String) -> Result<Investment>;
    async fn get_holding(&self, user_id: Uuid, tokenization_id: Uuid)
    -> Result<Option<TokenHolding>>;
    async fn list_holdings(&self, tokenization_id: Uuid) -> Result<Vec<TokenHolding>>;
    async fn notify(&self, notification: Notification) -> Result<()>;
    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>>;
    async fn list_chat_members(&self, property_id: Uuid) -> Result<Vec<ChatMember>>;
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn get_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>>;
    async fn set_wallet_status(
        &self,
        user_id: Uuid,
        status: WalletStatus,
        now: DateTime<Utc>,
    ) -> Result<Wallet>;
    /// Journals the credit under `reference`; a known reference is a no-op.
    async fn credit_wallet(
        &self,
        user_id: Uuid,
        amount: Amount,
        reference: String,
        now: DateTime<Utc>,
    ) -> Result<WalletMovement>;
    async fn debit_wallet(
        &self,
        user_id: Uuid,
        amount: Amount,
        reference: String,
        now: DateTime<Utc>,
    ) -> Result<WalletMovement>;
    async fn get_wallet_entry(&self, reference: &str) -> Result<Option<WalletEntry>>;
    async fn insert_top_up(&self, top_up: WalletTopUp) -> Result<()>;
    async fn get_top_up(&self, reference: &str) -> Result<Option<WalletTopUp>>;
    /// Credits the wallet under the top-up reference and marks it credited.
    async fn settle_top_up(&self, reference: &str, now: DateTime<Utc>) -> Result<WalletTopUp>;
    async fn fail_top_up(&self, reference: &str) -> Result<WalletTopUp>;
}

#[async_trait]
pub trait DividendStore: Send + Sync {
    async fn create_distribution(
        &self,
        distribution: DividendDistribution,
        payments: Vec<DividendPayment>,
    ) -> Result<()>;
    async fn get_distribution(&self, id: Uuid) -> Result<Option<DividendDistribution>>;
    async fn list_distributions(&self, tokenization_id: Uuid) -> Result<Vec<DividendDistribution>>;
    async fn list_dividend_payments(&self, distribution_id: Uuid) -> Result<Vec<DividendPayment>>;
    async fn get_dividend_payment(&self, id: Uuid) -> Result<Option<DividendPayment>>;
    /// Credits the recipient's wallet and completes the row in one step.
    /// Completed rows are rejected with `Conflict`.
    async fn pay_dividend(&self, payment_id: Uuid, now: DateTime<Utc>) -> Result<DividendPayment>;
    async fn mark_dividend_failed(&self, payment_id: Uuid, reason: String)
    -> Result<DividendPayment>;
    async fn finalize_distribution(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<DividendDistribution>;
}

#[async_trait]
pub trait GovernanceStore: Send + Sync {
    async fn insert_proposal(&self, proposal: GovernanceProposal) -> Result<()>;
    async fn get_proposal(&self, id: Uuid) -> Result<Option<GovernanceProposal>>;
    /// Weighs the vote by the voter's current holding; one vote per holder.
    async fn record_vote(&self, vote: Vote) -> Result<GovernanceProposal>;
    async fn finalize_proposal(&self, id: Uuid, now: DateTime<Utc>) -> Result<GovernanceProposal>;
    /// Moves the proposal budget from available to locked treasury funds.
    async fn lock_proposal_funds(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(GovernanceProposal, Treasury)>;
}

#[async_trait]
pub trait TreasuryStore: Send + Sync {
    async fn get_treasury(&self, tokenization_id: Uuid) -> Result<Option<Treasury>>;
    async fn configure_treasury(
        &self,
        tokenization_id: Uuid,
        signers: BTreeSet<Uuid>,
        threshold: usize,
        now: DateTime<Utc>,
    ) -> Result<Treasury>;
    async fn deposit_treasury(
        &self,
        tokenization_id: Uuid,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<Treasury>;
    async fn request_withdrawal(
        &self,
        draft: NewWithdrawal,
        now: DateTime<Utc>,
    ) -> Result<TreasuryWithdrawal>;
    async fn get_withdrawal(&self, id: Uuid) -> Result<Option<TreasuryWithdrawal>>;
    async fn approve_withdrawal(&self, id: Uuid, signer: Uuid) -> Result<TreasuryWithdrawal>;
    /// Refuses below the signer threshold; otherwise pays the recipient's
    /// wallet. A proposal-linked withdrawal executes the proposal and
    /// returns its unspent budget from `locked` to `available`.
    async fn execute_withdrawal(&self, id: Uuid, now: DateTime<Utc>)
    -> Result<TreasuryWithdrawal>;
}

/// Everything the services need from the platform database.
pub trait Database:
    UserStore
    + PropertyStore
    + InvestmentStore
    + WalletStore
    + DividendStore
    + GovernanceStore
    + TreasuryStore
{
}

impl<T> Database for T where
    T: UserStore
        + PropertyStore
        + InvestmentStore
        + WalletStore
        + DividendStore
        + GovernanceStore
        + TreasuryStore
{
}

pub type DatabaseRef = Arc<dyn Database>;

// ---- payment gateway ----

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub email: String,
    pub amount: Amount,
    /// Idempotency reference; the gateway rejects reuse.
    pub reference: String,
    pub callback_url: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckoutSession {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentStatus {
    Success,
    Failed,
    Abandoned,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentVerification {
    pub reference: String,
    pub status: GatewayPaymentStatus,
    /// NGN actually captured.
    pub amount: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundReceipt {
    pub reference: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    /// Gateway-side bank recipient.
    pub recipient_code: String,
    pub amount: Amount,
    pub reference: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferReceipt {
    pub transfer_code: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: CheckoutRequest) -> Result<CheckoutSession>;
    async fn verify(&self, reference: &str) -> Result<PaymentVerification>;
    async fn refund(&self, reference: &str, amount: Amount) -> Result<RefundReceipt>;
    async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt>;
}

pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;

// ---- distributed ledger ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerAccount {
    pub account_id: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenDefinition {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    /// Optional text memo recorded with the token.
    pub memo: String,
}

/// Account, fungible-token, topic and file services plus mirror reads.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn create_account(&self) -> Result<LedgerAccount>;
    async fn create_token(&self, definition: TokenDefinition) -> Result<String>;
    /// Returns the ledger transaction id.
    async fn mint_tokens(&self, token_id: &str, amount: u64) -> Result<String>;
    async fn transfer_tokens(&self, token_id: &str, to_account: &str, amount: u64)
    -> Result<String>;
    /// Appends to an append-only topic and returns the sequence number.
    async fn submit_message(&self, topic_id: &str, message: String) -> Result<u64>;
    async fn store_file(&self, contents: Vec<u8>) -> Result<String>;
    async fn token_balance(&self, account_id: &str, token_id: &str) -> Result<u64>;
}

pub type LedgerClientRef = Arc<dyn LedgerClient>;
