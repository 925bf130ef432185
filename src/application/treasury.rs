use super::audit::AuditTrail;
use crate::domain::money::Amount;
use crate::domain::ports::DatabaseRef;
use crate::domain::treasury::{NewWithdrawal, Treasury, TreasuryWithdrawal};
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// N-of-M signer controlled property treasury.
pub struct TreasuryService {
    db: DatabaseRef,
    audit: Arc<AuditTrail>,
}

impl TreasuryService {
    pub fn new(db: DatabaseRef, audit: Arc<AuditTrail>) -> Self {
        Self { db, audit }
    }

    pub async fn get(&self, tokenization_id: Uuid) -> Result<Treasury> {
        self.db
            .get_treasury(tokenization_id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Treasury", tokenization_id))
    }

    pub async fn configure(
        &self,
        tokenization_id: Uuid,
        signers: BTreeSet<Uuid>,
        threshold: usize,
        now: DateTime<Utc>,
    ) -> Result<Treasury> {
        let treasury = self
            .db
            .configure_treasury(tokenization_id, signers, threshold, now)
            .await?;
        info!(
            tokenization = %tokenization_id,
            signers = treasury.signers.len(),
            threshold,
            "treasury signers configured"
        );
        Ok(treasury)
    }

    pub async fn deposit(
        &self,
        tokenization_id: Uuid,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<Treasury> {
        let treasury = self.db.deposit_treasury(tokenization_id, amount, now).await?;
        self.audit
            .record(
                "treasury_deposit",
                json!({ "tokenization_id": tokenization_id, "amount": amount }),
            )
            .await;
        Ok(treasury)
    }

    pub async fn request_withdrawal(
        &self,
        draft: NewWithdrawal,
        now: DateTime<Utc>,
    ) -> Result<TreasuryWithdrawal> {
        let withdrawal = self.db.request_withdrawal(draft, now).await?;
        info!(withdrawal = %withdrawal.id, amount = %withdrawal.amount, "withdrawal requested");
        Ok(withdrawal)
    }

    pub async fn approve(&self, id: Uuid, signer: Uuid) -> Result<TreasuryWithdrawal> {
        self.db.approve_withdrawal(id, signer).await
    }

    /// Pays the recipient's wallet once enough signers have approved.
    pub async fn execute(&self, id: Uuid, now: DateTime<Utc>) -> Result<TreasuryWithdrawal> {
        let withdrawal = self.db.execute_withdrawal(id, now).await?;
        info!(withdrawal = %id, recipient = %withdrawal.recipient_id, "withdrawal executed");
        self.audit
            .record(
                "treasury_withdrawal_executed",
                json!({
                    "withdrawal_id": id,
                    "tokenization_id": withdrawal.tokenization_id,
                    "recipient_id": withdrawal.recipient_id,
                    "amount": withdrawal.amount,
                    "approvals": withdrawal.approvals,
                }),
            )
            .await;
        Ok(withdrawal)
    }

    pub async fn withdrawal(&self, id: Uuid) -> Result<TreasuryWithdrawal> {
        self.db
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Withdrawal", id))
    }
}
