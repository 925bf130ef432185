//! HTTP request handlers.
//!
//! Each handler extracts the request, calls one application service and
//! wraps the result in the `{success, data, error}` envelope.

use super::AppState;
use super::response::{ApiResult, JsonBody, PathParam, created, ok};
use crate::application::BatchOutcome;
use crate::application::investments::{InvestRequest, PaymentOutcome, Reservation};
use crate::application::tokenizations::HoldingReconciliation;
use crate::application::wallets::{BankWithdrawal, TopUpSession};
use crate::domain::dividend::{DividendDistribution, DividendPayment};
use crate::domain::governance::{GovernanceProposal, NewProposal, VoteChoice};
use crate::domain::investment::Investment;
use crate::domain::money::Amount;
use crate::domain::property::{NewProperty, NewUser, Notification, Property, User};
use crate::domain::tokenization::{NewTokenization, Tokenization};
use crate::domain::treasury::{NewWithdrawal, Treasury, TreasuryWithdrawal};
use crate::domain::wallet::{Wallet, WalletTopUp};
use axum::body::Bytes;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct ReviewBody {
    pub approve: bool,
}

#[derive(Deserialize)]
pub struct AmountBody {
    pub amount: Amount,
}

#[derive(Deserialize)]
pub struct BankWithdrawalBody {
    pub amount: Amount,
    pub recipient_code: String,
}

#[derive(Deserialize)]
pub struct WalletStatusBody {
    pub frozen: bool,
}

#[derive(Deserialize)]
pub struct ClaimBody {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct VoteBody {
    pub voter_id: Uuid,
    pub choice: VoteChoice,
}

#[derive(Deserialize)]
pub struct SignersBody {
    pub signers: BTreeSet<Uuid>,
    pub threshold: usize,
}

#[derive(Deserialize)]
pub struct ApprovalBody {
    pub signer_id: Uuid,
}

#[derive(Serialize)]
pub struct CreatedDistribution {
    pub distribution: DividendDistribution,
    pub payments: Vec<DividendPayment>,
}

#[derive(Serialize)]
pub struct LockedFunds {
    pub proposal: GovernanceProposal,
    pub treasury: Treasury,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VerifiedPayment {
    Investment(PaymentOutcome),
    TopUp(WalletTopUp),
}

pub async fn health() -> &'static str {
    "ok"
}

// ---- users & properties ----

pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<NewUser>,
) -> ApiResult<User> {
    created(state.services.properties.register_user(body, Utc::now()).await?)
}

pub async fn get_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<User> {
    ok(state.services.properties.user(id).await?)
}

pub async fn list_notifications(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Vec<Notification>> {
    ok(state.services.properties.notifications(id).await?)
}

pub async fn submit_property(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<NewProperty>,
) -> ApiResult<Property> {
    created(state.services.properties.submit(body, Utc::now()).await?)
}

pub async fn get_property(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Property> {
    ok(state.services.properties.get(id).await?)
}

pub async fn review_property(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<ReviewBody>,
) -> ApiResult<Property> {
    ok(state.services.properties.review(id, body.approve).await?)
}

/// Raw document bytes in the body; the file name comes from the path.
pub async fn upload_document(
    State(state): State<AppState>,
    PathParam((id, name)): PathParam<(Uuid, String)>,
    body: Bytes,
) -> ApiResult<Property> {
    created(
        state
            .services
            .properties
            .attach_document(id, name, body.to_vec(), Utc::now())
            .await?,
    )
}

// ---- tokenizations ----

pub async fn create_tokenization(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<NewTokenization>,
) -> ApiResult<Tokenization> {
    created(state.services.tokenizations.create(body, Utc::now()).await?)
}

pub async fn list_tokenizations(State(state): State<AppState>) -> ApiResult<Vec<Tokenization>> {
    ok(state.services.tokenizations.list().await?)
}

pub async fn get_tokenization(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Tokenization> {
    ok(state.services.tokenizations.get(id).await?)
}

pub async fn activate_tokenization(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Tokenization> {
    ok(state.services.tokenizations.activate(id, Utc::now()).await?)
}

pub async fn close_funding(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Tokenization> {
    ok(state.services.tokenizations.close_funding(id, Utc::now()).await?)
}

pub async fn mint_tokens(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Tokenization> {
    ok(state.services.tokenizations.mint(id).await?)
}

pub async fn distribute_tokens(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<BatchOutcome> {
    ok(state.services.tokenizations.distribute_tokens(id).await?)
}

pub async fn refund_tokenization(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<BatchOutcome> {
    ok(state
        .services
        .investments
        .refund_failed_tokenization(id, Utc::now())
        .await?)
}

pub async fn reconcile_holding(
    State(state): State<AppState>,
    PathParam((id, user_id)): PathParam<(Uuid, Uuid)>,
) -> ApiResult<HoldingReconciliation> {
    ok(state
        .services
        .tokenizations
        .reconcile_holding(user_id, id)
        .await?)
}

// ---- investments & payments ----

pub async fn invest(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<InvestRequest>,
) -> ApiResult<Reservation> {
    created(state.services.investments.reserve(body, Utc::now()).await?)
}

pub async fn get_investment(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Investment> {
    ok(state.services.investments.get(id).await?)
}

pub async fn refund_investment(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Investment> {
    ok(state
        .services
        .investments
        .refund_investment(id, Utc::now())
        .await?)
}

/// Gateway callback target. Top-up references carry their own prefix;
/// everything else is an investment id.
pub async fn verify_payment(
    State(state): State<AppState>,
    PathParam(reference): PathParam<String>,
) -> ApiResult<VerifiedPayment> {
    let now = Utc::now();
    if WalletTopUp::is_top_up_reference(&reference) {
        let top_up = state.services.wallets.verify_top_up(&reference, now).await?;
        return ok(VerifiedPayment::TopUp(top_up));
    }
    let outcome = state
        .services
        .investments
        .verify_payment(&reference, now)
        .await?;
    ok(VerifiedPayment::Investment(outcome))
}

pub async fn sweep_reservations(State(state): State<AppState>) -> ApiResult<Vec<Investment>> {
    ok(state.services.reservations.sweep(Utc::now()).await?)
}

// ---- wallets ----

pub async fn get_wallet(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Wallet> {
    ok(state.services.wallets.wallet(id, Utc::now()).await?)
}

pub async fn set_wallet_status(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<WalletStatusBody>,
) -> ApiResult<Wallet> {
    ok(state
        .services
        .wallets
        .set_frozen(id, body.frozen, Utc::now())
        .await?)
}

pub async fn start_top_up(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<AmountBody>,
) -> ApiResult<TopUpSession> {
    created(
        state
            .services
            .wallets
            .start_top_up(id, body.amount, Utc::now())
            .await?,
    )
}

pub async fn withdraw_to_bank(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<BankWithdrawalBody>,
) -> ApiResult<BankWithdrawal> {
    ok(state
        .services
        .wallets
        .withdraw_to_bank(id, body.amount, body.recipient_code, Utc::now())
        .await?)
}

// ---- dividends ----

pub async fn create_distribution(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<AmountBody>,
) -> ApiResult<CreatedDistribution> {
    let (distribution, payments) = state
        .services
        .dividends
        .create_distribution(id, body.amount, Utc::now())
        .await?;
    created(CreatedDistribution {
        distribution,
        payments,
    })
}

pub async fn get_distribution(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<DividendDistribution> {
    ok(state.services.dividends.get(id).await?)
}

pub async fn list_dividend_payments(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Vec<DividendPayment>> {
    ok(state.services.dividends.payments(id).await?)
}

pub async fn process_distribution(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<DividendDistribution> {
    ok(state
        .services
        .dividends
        .process_distribution(id, Utc::now())
        .await?)
}

pub async fn claim_dividend(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<ClaimBody>,
) -> ApiResult<DividendPayment> {
    ok(state
        .services
        .dividends
        .claim(id, body.user_id, Utc::now())
        .await?)
}

// ---- governance ----

pub async fn create_proposal(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<NewProposal>,
) -> ApiResult<GovernanceProposal> {
    created(
        state
            .services
            .governance
            .create_proposal(body, Utc::now())
            .await?,
    )
}

pub async fn get_proposal(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<GovernanceProposal> {
    ok(state.services.governance.get(id).await?)
}

pub async fn cast_vote(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<VoteBody>,
) -> ApiResult<GovernanceProposal> {
    ok(state
        .services
        .governance
        .cast_vote(id, body.voter_id, body.choice, Utc::now())
        .await?)
}

pub async fn finalize_proposal(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<GovernanceProposal> {
    ok(state.services.governance.finalize(id, Utc::now()).await?)
}

pub async fn lock_proposal_funds(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<LockedFunds> {
    let (proposal, treasury) = state
        .services
        .governance
        .lock_funds(id, Utc::now())
        .await?;
    ok(LockedFunds { proposal, treasury })
}

// ---- treasury ----

pub async fn get_treasury(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Treasury> {
    ok(state.services.treasury.get(id).await?)
}

pub async fn configure_treasury(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<SignersBody>,
) -> ApiResult<Treasury> {
    ok(state
        .services
        .treasury
        .configure(id, body.signers, body.threshold, Utc::now())
        .await?)
}

pub async fn deposit_treasury(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<AmountBody>,
) -> ApiResult<Treasury> {
    ok(state
        .services
        .treasury
        .deposit(id, body.amount, Utc::now())
        .await?)
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<NewWithdrawal>,
) -> ApiResult<TreasuryWithdrawal> {
    created(
        state
            .services
            .treasury
            .request_withdrawal(body, Utc::now())
            .await?,
    )
}

pub async fn get_withdrawal(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<TreasuryWithdrawal> {
    ok(state.services.treasury.withdrawal(id).await?)
}

pub async fn approve_withdrawal(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<ApprovalBody>,
) -> ApiResult<TreasuryWithdrawal> {
    ok(state.services.treasury.approve(id, body.signer_id).await?)
}

pub async fn execute_withdrawal(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<TreasuryWithdrawal> {
    ok(state.services.treasury.execute(id, Utc::now()).await?)
}
