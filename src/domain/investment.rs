use crate::domain::money::Amount;
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Hosted checkout on the fiat payment gateway.
    Gateway,
    /// Internal NGN wallet balance.
    Wallet,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    TokensDistributed,
    Failed,
    Expired,
    RefundPending,
    Refunded,
}

/// A purchase of tokenization units, created together with its reservation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Investment {
    pub id: Uuid,
    pub investor_id: Uuid,
    pub tokenization_id: Uuid,
    pub amount: Amount,
    pub tokens: u64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub reservation_expires_at: DateTime<Utc>,
    pub payment_reference: Option<String>,
    /// Set once the holding, chat membership and notification are written.
    pub completed: bool,
    pub ledger_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    /// A ledger transfer or gateway refund for this investment is under way.
    #[serde(default)]
    pub in_flight: bool,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Investment {
    pub fn is_reservation_live(&self, now: DateTime<Utc>) -> bool {
        self.payment_status == PaymentStatus::Pending && now <= self.reservation_expires_at
    }

    pub fn is_reservation_expired(&self, now: DateTime<Utc>) -> bool {
        self.payment_status == PaymentStatus::Pending && now > self.reservation_expires_at
    }

    /// Payment has been captured and units are owed to the investor.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.payment_status,
            PaymentStatus::Confirmed | PaymentStatus::TokensDistributed
        )
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.payment_status != PaymentStatus::Pending {
            return Err(self.transition_error("confirm"));
        }
        if now > self.reservation_expires_at {
            return Err(PlatformError::ReservationExpired(self.id));
        }
        self.payment_status = PaymentStatus::Confirmed;
        self.confirmed_at = Some(now);
        Ok(())
    }

    pub fn expire(&mut self) -> Result<()> {
        if self.payment_status != PaymentStatus::Pending {
            return Err(self.transition_error("expire"));
        }
        self.payment_status = PaymentStatus::Expired;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        if self.payment_status != PaymentStatus::Pending {
            return Err(self.transition_error("fail"));
        }
        self.payment_status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Claims the ledger transfer for the caller. `false` means the units
    /// are already delivered or another caller is delivering them.
    pub fn claim_token_transfer(&mut self) -> Result<bool> {
        match self.payment_status {
            PaymentStatus::TokensDistributed => Ok(false),
            PaymentStatus::Confirmed if self.in_flight => Ok(false),
            PaymentStatus::Confirmed => {
                self.in_flight = true;
                Ok(true)
            }
            _ => Err(self.transition_error("distribute tokens for")),
        }
    }

    pub fn mark_tokens_distributed(&mut self, ledger_tx: String) -> Result<()> {
        if self.payment_status != PaymentStatus::Confirmed {
            return Err(self.transition_error("distribute tokens for"));
        }
        self.payment_status = PaymentStatus::TokensDistributed;
        self.ledger_transaction_id = Some(ledger_tx);
        self.in_flight = false;
        Ok(())
    }

    /// Moves a confirmed or late-paid expired investment to refund-pending
    /// and claims the refund for the caller. A pending refund nobody is
    /// working on can be claimed again.
    pub fn claim_refund(&mut self) -> Result<()> {
        match self.payment_status {
            PaymentStatus::Confirmed | PaymentStatus::Expired => {
                self.payment_status = PaymentStatus::RefundPending;
            }
            PaymentStatus::RefundPending if !self.in_flight => {}
            PaymentStatus::RefundPending => {
                return Err(PlatformError::Conflict(format!(
                    "Refund of investment {} is already in progress",
                    self.id
                )));
            }
            _ => return Err(self.transition_error("refund")),
        }
        self.in_flight = true;
        Ok(())
    }

    pub fn mark_refunded(&mut self) -> Result<()> {
        if self.payment_status != PaymentStatus::RefundPending {
            return Err(self.transition_error("mark refunded"));
        }
        self.payment_status = PaymentStatus::Refunded;
        self.in_flight = false;
        Ok(())
    }

    /// Gives up a claim after the external call failed.
    pub fn release_claim(&mut self) {
        self.in_flight = false;
    }

    fn transition_error(&self, action: &str) -> PlatformError {
        PlatformError::InvalidState(format!(
            "Cannot {} investment {} in status {:?}",
            action, self.id, self.payment_status
        ))
    }
}

/// Input to the reservation procedure.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub tokenization_id: Uuid,
    pub investor_id: Uuid,
    pub amount: Amount,
    pub payment_method: PaymentMethod,
    pub now: DateTime<Utc>,
    pub ttl: chrono::Duration,
}

/// Running unit balance for one (user, tokenization) pair.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TokenHolding {
    pub user_id: Uuid,
    pub tokenization_id: Uuid,
    pub tokens: u64,
    pub updated_at: DateTime<Utc>,
}

impl TokenHolding {
    pub fn new(user_id: Uuid, tokenization_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            tokenization_id,
            tokens: 0,
            updated_at: now,
        }
    }
}
