use super::audit::AuditTrail;
use super::{BatchOutcome, Settings};
use crate::domain::investment::{Investment, PaymentMethod, PaymentStatus, ReservationRequest};
use crate::domain::money::Amount;
use crate::domain::ports::{
    CheckoutRequest, CheckoutSession, DatabaseRef, GatewayPaymentStatus, PaymentGatewayRef,
};
use crate::domain::tokenization::TokenizationStatus;
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct InvestRequest {
    pub tokenization_id: Uuid,
    pub investor_id: Uuid,
    pub amount: Amount,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reservation {
    pub investment: Investment,
    /// Present on the gateway rail; the payer completes checkout there.
    pub checkout: Option<CheckoutSession>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "investment")]
pub enum PaymentOutcome {
    Confirmed(Investment),
    AlreadyConfirmed(Investment),
    Pending(Investment),
    Failed(Investment),
    /// Captured after the hold expired; the money went back to the payer.
    Refunded(Investment),
}

impl PaymentOutcome {
    pub fn investment(&self) -> &Investment {
        match self {
            Self::Confirmed(i)
            | Self::AlreadyConfirmed(i)
            | Self::Pending(i)
            | Self::Failed(i)
            | Self::Refunded(i) => i,
        }
    }
}

/// Reserves units and settles them on either payment rail.
pub struct InvestmentService {
    db: DatabaseRef,
    gateway: PaymentGatewayRef,
    audit: Arc<AuditTrail>,
    settings: Settings,
}

fn wallet_debit_reference(id: Uuid) -> String {
    format!("investment:{}", id)
}

fn wallet_refund_reference(id: Uuid) -> String {
    format!("investment-refund:{}", id)
}

impl InvestmentService {
    pub fn new(
        db: DatabaseRef,
        gateway: PaymentGatewayRef,
        audit: Arc<AuditTrail>,
        settings: Settings,
    ) -> Self {
        Self {
            db,
            gateway,
            audit,
            settings,
        }
    }

    pub async fn reserve(&self, request: InvestRequest, now: DateTime<Utc>) -> Result<Reservation> {
        let investor = self
            .db
            .get_user(request.investor_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("User", request.investor_id))?;

        let investment = self
            .db
            .create_investment_with_reservation(ReservationRequest {
                tokenization_id: request.tokenization_id,
                investor_id: request.investor_id,
                amount: request.amount,
                payment_method: request.payment_method,
                now,
                ttl: self.settings.reservation_ttl,
            })
            .await?;
        info!(
            investment = %investment.id,
            tokens = investment.tokens,
            method = ?investment.payment_method,
            "reservation created"
        );

        match investment.payment_method {
            PaymentMethod::Gateway => self.open_checkout(investment, &investor.email, now).await,
            PaymentMethod::Wallet => self.settle_from_wallet(investment, now).await,
        }
    }

    async fn open_checkout(
        &self,
        investment: Investment,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        let reference = investment.id.to_string();
        let checkout = self
            .gateway
            .initialize(CheckoutRequest {
                email: email.to_string(),
                amount: investment.amount,
                reference: reference.clone(),
                callback_url: self.settings.callback_url.clone(),
                metadata: json!({
                    "investment_id": investment.id,
                    "tokenization_id": investment.tokenization_id,
                    "tokens": investment.tokens,
                }),
            })
            .await;

        match checkout {
            Ok(session) => {
                let investment = self.db.set_payment_reference(investment.id, reference).await?;
                Ok(Reservation {
                    investment,
                    checkout: Some(session),
                })
            }
            Err(e) => {
                warn!(investment = %investment.id, error = %e, "checkout initialization failed");
                self.db
                    .fail_investment(investment.id, e.to_string(), now)
                    .await?;
                Err(e)
            }
        }
    }

    async fn settle_from_wallet(
        &self,
        investment: Investment,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        let debit_reference = wallet_debit_reference(investment.id);
        if let Err(e) = self
            .db
            .debit_wallet(
                investment.investor_id,
                investment.amount,
                debit_reference.clone(),
                now,
            )
            .await
        {
            self.db
                .fail_investment(investment.id, e.to_string(), now)
                .await?;
            return Err(e);
        }
        self.db
            .set_payment_reference(investment.id, debit_reference)
            .await?;

        let confirmed = match self.db.confirm_investment(investment.id, now).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                warn!(
                    investment = %investment.id,
                    error = %e,
                    "confirmation failed; refunding wallet"
                );
                self.db
                    .credit_wallet(
                        investment.investor_id,
                        investment.amount,
                        wallet_refund_reference(investment.id),
                        now,
                    )
                    .await?;
                return Err(e);
            }
        };
        let completed = self.db.complete_investment(confirmed.id, now).await?;
        self.record_confirmation(&completed).await;
        Ok(Reservation {
            investment: completed,
            checkout: None,
        })
    }

    /// Settles a gateway payment by its reference (the investment id).
    pub async fn verify_payment(
        &self,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentOutcome> {
        let id = Uuid::parse_str(reference).map_err(|_| {
            PlatformError::ValidationError(format!("Unknown payment reference: {}", reference))
        })?;
        let investment = self
            .db
            .get_investment(id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Investment", id))?;

        if investment.payment_method != PaymentMethod::Gateway {
            return Err(PlatformError::ValidationError(format!(
                "Investment {} was not paid through the gateway",
                id
            )));
        }

        match investment.payment_status {
            PaymentStatus::Confirmed | PaymentStatus::TokensDistributed => {
                let investment = self.db.complete_investment(id, now).await?;
                return Ok(PaymentOutcome::AlreadyConfirmed(investment));
            }
            PaymentStatus::Pending | PaymentStatus::Expired => {}
            PaymentStatus::RefundPending | PaymentStatus::Refunded => {
                return Ok(PaymentOutcome::Refunded(investment));
            }
            PaymentStatus::Failed => return Ok(PaymentOutcome::Failed(investment)),
        }

        let verification = self.gateway.verify(reference).await?;
        match verification.status {
            GatewayPaymentStatus::Success => {
                if verification.amount < investment.amount.value() {
                    let reason = format!(
                        "Captured {} but {} was due",
                        verification.amount, investment.amount
                    );
                    if investment.payment_status == PaymentStatus::Pending {
                        let failed = self.db.fail_investment(id, reason, now).await?;
                        return Ok(PaymentOutcome::Failed(failed));
                    }
                    return Ok(PaymentOutcome::Failed(investment));
                }
                self.settle_captured(investment, now).await
            }
            GatewayPaymentStatus::Failed | GatewayPaymentStatus::Abandoned => {
                if investment.payment_status == PaymentStatus::Pending {
                    let reason = format!("Gateway reported {:?}", verification.status);
                    let failed = self.db.fail_investment(id, reason, now).await?;
                    return Ok(PaymentOutcome::Failed(failed));
                }
                Ok(PaymentOutcome::Failed(investment))
            }
            GatewayPaymentStatus::Pending => Ok(PaymentOutcome::Pending(investment)),
        }
    }

    async fn settle_captured(
        &self,
        investment: Investment,
        now: DateTime<Utc>,
    ) -> Result<PaymentOutcome> {
        match self.db.confirm_investment(investment.id, now).await {
            Ok(confirmed) => {
                let completed = self.db.complete_investment(confirmed.id, now).await?;
                self.record_confirmation(&completed).await;
                Ok(PaymentOutcome::Confirmed(completed))
            }
            Err(PlatformError::ReservationExpired(_)) => {
                warn!(
                    investment = %investment.id,
                    "payment captured after the hold expired; refunding"
                );
                match self.refund_investment(investment.id, now).await {
                    Ok(refunded) => Ok(PaymentOutcome::Refunded(refunded)),
                    Err(PlatformError::Conflict(_)) => {
                        Ok(PaymentOutcome::Refunded(self.get(investment.id).await?))
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the money of an investment in a failed campaign, or of an
    /// expired hold whose payment landed late, on the rail it came from.
    /// The refund is claimed first, so concurrent callers return the money
    /// once; a failed attempt drops the claim and can be retried.
    pub async fn refund_investment(&self, id: Uuid, now: DateTime<Utc>) -> Result<Investment> {
        let investment = self.db.mark_refund_pending(id, now).await?;
        if let Err(e) = self.return_funds(&investment, now).await {
            warn!(investment = %id, error = %e, "refund attempt failed");
            self.db.release_claim(id).await?;
            return Err(e);
        }
        let refunded = self.db.mark_refunded(id, now).await?;
        self.audit
            .record(
                "investment_refunded",
                json!({ "investment_id": refunded.id, "amount": refunded.amount }),
            )
            .await;
        Ok(refunded)
    }

    async fn return_funds(&self, investment: &Investment, now: DateTime<Utc>) -> Result<()> {
        match investment.payment_method {
            PaymentMethod::Gateway => {
                let reference = investment
                    .payment_reference
                    .clone()
                    .unwrap_or_else(|| investment.id.to_string());
                self.gateway.refund(&reference, investment.amount).await?;
            }
            PaymentMethod::Wallet => {
                self.db
                    .credit_wallet(
                        investment.investor_id,
                        investment.amount,
                        wallet_refund_reference(investment.id),
                        now,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Refunds every settled investment of a campaign that missed its
    /// minimum raise. One failing refund does not stop the others.
    pub async fn refund_failed_tokenization(
        &self,
        tokenization_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome> {
        let tokenization = self
            .db
            .get_tokenization(tokenization_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Tokenization", tokenization_id))?;
        if tokenization.status != TokenizationStatus::Failed {
            return Err(PlatformError::InvalidState(format!(
                "Tokenization {} has not failed",
                tokenization_id
            )));
        }

        let mut outcome = BatchOutcome::default();
        for investment in self.db.list_investments(tokenization_id).await? {
            if !matches!(
                investment.payment_status,
                PaymentStatus::Confirmed | PaymentStatus::RefundPending
            ) {
                continue;
            }
            match self.refund_investment(investment.id, now).await {
                Ok(_) => outcome.success(),
                Err(e) => {
                    warn!(investment = %investment.id, error = %e, "refund failed");
                    outcome.failure(investment.id, e);
                }
            }
        }
        info!(
            tokenization = %tokenization_id,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "refund batch finished"
        );
        Ok(outcome)
    }

    pub async fn get(&self, id: Uuid) -> Result<Investment> {
        self.db
            .get_investment(id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Investment", id))
    }

    async fn record_confirmation(&self, investment: &Investment) {
        info!(investment = %investment.id, "investment confirmed");
        self.audit
            .record(
                "investment_confirmed",
                json!({
                    "investment_id": investment.id,
                    "tokenization_id": investment.tokenization_id,
                    "investor_id": investment.investor_id,
                    "tokens": investment.tokens,
                    "amount": investment.amount,
                }),
            )
            .await;
    }
}
